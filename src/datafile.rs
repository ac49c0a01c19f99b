//! Per-file records inside a group payload.
//!
//! # Record header (0x40 fixed bytes + filename, padded to `header_size`)
//!
//! ```text
//! Offset  Size  Field
//!    0      4   ext            extension, no leading dot, NUL-padded
//!    4      4   file_size      header + data + tail padding  (LE u32)
//!    8      4   data_size      payload bytes                 (LE u32)
//!   12      4   header_size    0x40 + name, 16-aligned       (LE u32)
//!   16      4   filename_size  name bytes incl. NUL          (LE u32)
//!   20      4   constant       = 1                           (LE u32)
//!   24     40   reserved       zero
//!   64    var   filename       NUL-terminated, zero-padded to header_size
//! ```
//!
//! `file_size` and `header_size` are both multiples of 0x10; the payload
//! follows the header and is zero-padded up to `file_size`.
//!
//! Not every record carries this header.  A payload whose first byte falls
//! outside the printable lowercase-extension range is a *headerless* blob,
//! and a payload starting with `NIFL` is a chain of NIFL chunks; both kinds
//! are carried opaquely and get synthesized names.

use std::path::Path;

use crate::error::IceError;

pub const FIXED_HEADER_SIZE: usize = 0x40;
pub const MIN_HEADER_SIZE: u32 = 0x50;
const FILENAME_OFFSET: usize = 0x40;

fn round_up(value: usize, multiple: usize) -> usize {
    (value + multiple - 1) / multiple * multiple
}

/// A payload starting with the NIFL chunk magic.
pub fn is_nifl(data: &[u8]) -> bool {
    data.starts_with(b"NIFL")
}

/// First-byte test for a record with no header.  Extensions are lowercase
/// ASCII, so a first byte outside `0x20..=0x40` and `0x5B..=0x7D` cannot
/// open a record header.
pub fn is_headerless(data: &[u8]) -> bool {
    match data.first() {
        None => false,
        Some(&c) => c < 0x20 || (c > 0x40 && c < 0x5B) || c > 0x7D,
    }
}

// ── Header ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFileHeader {
    pub ext: [u8; 4],
    pub file_size: u32,
    pub data_size: u32,
    pub header_size: u32,
    pub filename_size: u32,
    pub name: String,
}

impl DataFileHeader {
    /// Build a header for a payload of `data_len` bytes stored under
    /// `name`, applying the 0x10-alignment rules.
    pub fn new(name: &str, data_len: usize) -> Result<Self, IceError> {
        let ext_str = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        let mut ext = [0u8; 4];
        for (dst, src) in ext.iter_mut().zip(ext_str.bytes()) {
            *dst = src;
        }

        let filename_size = name.len() + 1; // trailing NUL
        let header_size = round_up(FIXED_HEADER_SIZE + filename_size, 0x10);
        let file_size = round_up(data_len + header_size, 0x10);

        let file_size = u32::try_from(file_size)
            .map_err(|_| IceError::InvalidInput(format!("file {name:?} is too large")))?;

        Ok(Self {
            ext,
            file_size,
            data_size: data_len as u32,
            header_size: header_size as u32,
            filename_size: filename_size as u32,
            name: name.to_owned(),
        })
    }

    /// Bytes of zero padding between payload end and `file_size`.
    pub fn pad_size(&self) -> u32 {
        self.file_size - self.header_size - self.data_size
    }

    /// Append the encoded header (fixed part, filename, zero padding up to
    /// `header_size`) to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        let start = out.len();
        out.extend_from_slice(&self.ext);
        out.extend_from_slice(&self.file_size.to_le_bytes());
        out.extend_from_slice(&self.data_size.to_le_bytes());
        out.extend_from_slice(&self.header_size.to_le_bytes());
        out.extend_from_slice(&self.filename_size.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&[0u8; 40]);
        out.extend_from_slice(self.name.as_bytes());
        out.resize(start + self.header_size as usize, 0);
    }

    /// Decode and validate a record header from the start of `raw`.
    pub fn decode(raw: &[u8]) -> Result<Self, IceError> {
        if raw.len() < FIXED_HEADER_SIZE {
            return Err(IceError::UnexpectedEof("data file header"));
        }

        let ext: [u8; 4] = raw[0..4].try_into().unwrap();
        let file_size = u32::from_le_bytes(raw[4..8].try_into().unwrap());
        let data_size = u32::from_le_bytes(raw[8..12].try_into().unwrap());
        let header_size = u32::from_le_bytes(raw[12..16].try_into().unwrap());
        let filename_size = u32::from_le_bytes(raw[16..20].try_into().unwrap());

        if header_size < MIN_HEADER_SIZE {
            return Err(IceError::MalformedRecord(format!(
                "header size {header_size:#x} below minimum {MIN_HEADER_SIZE:#x}"
            )));
        }
        if file_size < header_size || data_size > file_size - header_size {
            return Err(IceError::MalformedRecord(format!(
                "sizes are inconsistent (file {file_size:#x}, header {header_size:#x}, data {data_size:#x})"
            )));
        }
        let name_end = FILENAME_OFFSET + filename_size as usize;
        if name_end > header_size as usize {
            return Err(IceError::MalformedRecord(format!(
                "filename ({filename_size} bytes) overruns the {header_size:#x}-byte header"
            )));
        }
        if raw.len() < name_end {
            return Err(IceError::UnexpectedEof("data file name"));
        }

        let name_bytes = &raw[FILENAME_OFFSET..name_end];
        let trimmed = match name_bytes.iter().rposition(|&b| b != 0) {
            Some(last) => &name_bytes[..=last],
            None => &[],
        };
        let name = std::str::from_utf8(trimmed)
            .map_err(|_| IceError::MalformedRecord("filename is not valid UTF-8".into()))?
            .to_owned();

        Ok(Self { ext, file_size, data_size, header_size, filename_size, name })
    }
}

// ── Record ───────────────────────────────────────────────────────────────────

/// One file inside a group: the raw record bytes plus the decoded header
/// when the record has one.  Writing a record back emits `raw` verbatim,
/// so split and combine are exact inverses.
#[derive(Debug, Clone)]
pub struct DataFile {
    raw: Vec<u8>,
    index: usize,
    header: Option<DataFileHeader>,
}

impl DataFile {
    /// Build a normal record from a name and payload (the pack path).
    pub fn new(name: &str, data: &[u8]) -> Result<Self, IceError> {
        let header = DataFileHeader::new(name, data.len())?;
        let mut raw = Vec::with_capacity(header.file_size as usize);
        header.write_to(&mut raw);
        raw.extend_from_slice(data);
        raw.resize(header.file_size as usize, 0);
        Ok(Self { raw, index: 0, header: Some(header) })
    }

    /// Wrap a record whose header has already been decoded.
    pub(crate) fn with_header(raw: Vec<u8>, index: usize, header: DataFileHeader) -> Self {
        Self { raw, index, header: Some(header) }
    }

    /// Wrap an opaque record (NIFL chunk or headerless blob).
    pub(crate) fn nameless(raw: Vec<u8>, index: usize) -> Self {
        Self { raw, index, header: None }
    }

    /// The record's filename: from the header when present, synthesized
    /// from the payload shape otherwise.
    pub fn name(&self) -> String {
        if let Some(header) = &self.header {
            return header.name.clone();
        }
        if self.raw.is_empty() {
            return String::new();
        }
        if is_nifl(&self.raw) {
            format!("unnamed_NIFL_{}.bin", self.index)
        } else {
            format!("unnamed_{}.bin", self.index)
        }
    }

    /// The payload bytes (header and tail padding stripped when present).
    pub fn data(&self) -> &[u8] {
        match &self.header {
            Some(h) => {
                let start = h.header_size as usize;
                &self.raw[start..start + h.data_size as usize]
            }
            None => &self.raw,
        }
    }

    /// The full record bytes as stored inside the group.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn header(&self) -> Option<&DataFileHeader> {
        self.header.as_ref()
    }
}

impl PartialEq for DataFile {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for DataFile {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn header_sizes_are_aligned() {
        let header = DataFileHeader::new("weapon_model.aqp", 1234).unwrap();
        assert_eq!(header.header_size % 0x10, 0);
        assert_eq!(header.file_size % 0x10, 0);
        assert_eq!(&header.ext, b"aqp\0");
        assert_eq!(header.filename_size, 17);
        assert!(header.pad_size() < 0x10);
    }

    #[test]
    fn extension_is_truncated_to_four_bytes() {
        let header = DataFileHeader::new("notes.markdown", 1).unwrap();
        assert_eq!(&header.ext, b"mark");
    }

    #[test]
    fn record_roundtrip() {
        let file = DataFile::new("a.bin", b"hello").unwrap();
        assert_eq!(file.raw().len() % 0x10, 0);

        let header = DataFileHeader::decode(file.raw()).unwrap();
        assert_eq!(header.name, "a.bin");
        assert_eq!(header.data_size, 5);
        assert_eq!(file.name(), "a.bin");
        assert_eq!(file.data(), b"hello");
    }

    #[test]
    fn rejects_short_header_size() {
        let file = DataFile::new("a.bin", b"x").unwrap();
        let raw = file.raw().to_vec();
        let mut bad = raw.clone();
        bad[12..16].copy_from_slice(&0x40u32.to_le_bytes());
        assert!(matches!(
            DataFileHeader::decode(&bad),
            Err(IceError::MalformedRecord(_))
        ));

        // data_size larger than the space between header and file end
        bad = raw;
        bad[8..12].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            DataFileHeader::decode(&bad),
            Err(IceError::MalformedRecord(_))
        ));
    }

    #[test]
    fn truncated_record_is_eof() {
        assert!(matches!(
            DataFileHeader::decode(&[0u8; 0x10]),
            Err(IceError::UnexpectedEof(_))
        ));
    }

    #[test]
    fn headerless_predicate_boundaries() {
        assert!(is_headerless(&[0x1F]));
        assert!(is_headerless(&[b'A']));
        assert!(is_headerless(&[0x7E]));
        assert!(is_headerless(&[0x00]));
        assert!(!is_headerless(&[b' ']));
        assert!(!is_headerless(&[b'@']));
        assert!(!is_headerless(&[b'[']));
        assert!(!is_headerless(&[b'a']));
        assert!(!is_headerless(&[b'}']));
        assert!(!is_headerless(b""));
    }

    #[test]
    fn nifl_predicate() {
        assert!(is_nifl(b"NIFL\x01\x00"));
        assert!(!is_nifl(b"NOF0"));
    }

    proptest! {
        #[test]
        fn header_roundtrip_random_names(
            stem in "[a-z0-9_]{1,24}",
            ext in "[a-z0-9]{1,4}",
            data_len in 0usize..4096,
        ) {
            let name = format!("{stem}.{ext}");
            let header = DataFileHeader::new(&name, data_len).unwrap();
            prop_assert_eq!(header.header_size % 0x10, 0);
            prop_assert_eq!(header.file_size % 0x10, 0);

            let mut raw = Vec::new();
            header.write_to(&mut raw);
            raw.resize(header.file_size as usize, 0);
            let parsed = DataFileHeader::decode(&raw).unwrap();
            prop_assert_eq!(parsed, header);
        }
    }
}
