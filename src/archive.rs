//! [`IceFile`] — the read/write façade and the v3/v4 on-disk layouts.
//!
//! # Version 4 layout
//!
//! ```text
//! Offset  Size   Region
//! 0x000   0x020  archive header
//! 0x020   0x100  encryption-keys region (random when encrypted, else zero)
//! 0x120   0x030  group headers: group1 (0x10) + group2 (0x10) + tail (0x10)
//! 0x150    ...   group 1 stored bytes, then group 2 stored bytes
//! ```
//!
//! The 0x30-byte group-headers region is Blowfish-encrypted as a whole
//! under the derived headers key when the archive is encrypted.  Its final
//! 0x10 bytes carry `(group1 original_size, group2 original_size, 8 zero
//! bytes)` in files we write; observed archives sometimes hold other
//! values there, so reads treat the tail as opaque.
//!
//! # Version 3 layout
//!
//! ```text
//! Offset  Size   Region
//! 0x000   0x020  archive header
//! 0x020   0x020  group headers (group1, group2)
//! 0x040   0x010  group data info: group1_size | group2_size | reserved | key
//! 0x050   0x010  embedded metadata: magic_ff | crc32 | flags | file_size
//! 0x060   0x030  padding
//! 0x090    ...   group 1 stored bytes, then group 2 stored bytes
//! ```
//!
//! v3 has no separate keys region: the Blowfish key is `group1_size` when
//! that field is nonzero, otherwise an XOR fold of the header sizes and
//! the info key word.  v3 decryption is the single Blowfish pass (no
//! floatage, no second pass).

use std::io::{Read, Write};
use std::path::Path;

use crate::codec::{self, CompressMode, CompressOptions, DEFAULT_KRAKEN_LEVEL};
use crate::crypto::{self, GroupKeys, KeySet, MAGIC_NUMBERS_SIZE};
use crate::datafile::DataFile;
use crate::error::IceError;
use crate::group::{combine_group, encrypt_group, extract_group, split_group};
use crate::header::{
    read_exact_ctx, ArchiveHeader, EmbeddedMetadata, GroupDataInfo, GroupHeader, FLAG_ENCRYPTED,
    FLAG_KRAKEN,
};

/// Payload size boundary for the second Blowfish pass in v4 archives.
pub const SECOND_PASS_THRESHOLD: usize = 0x19000;

/// Offset of the first stored group byte in a v4 archive.
pub const V4_DATA_OFFSET: usize = 0x150;
/// Offset of the first stored group byte in a v3 archive.
pub const V3_DATA_OFFSET: usize = 0x90;

const GROUP_HEADERS_REGION: usize = 0x30;

// ── Version tag ──────────────────────────────────────────────────────────────

/// The on-disk layout variants this build can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceVersion {
    V3,
    V4,
}

impl IceVersion {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            3 => Some(Self::V3),
            4 => Some(Self::V4),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Self::V3 => 3,
            Self::V4 => 4,
        }
    }
}

// ── Write options ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    pub compression: CompressOptions,
    pub encrypt: bool,
}

// ── IceFile ──────────────────────────────────────────────────────────────────

/// An ICE archive held in memory: the parsed header and the two ordered
/// file groups.  Group headers, CRCs, flags, and sizes are all recomputed
/// on write; only the file lists are authoritative.
#[derive(Debug, Clone)]
pub struct IceFile {
    pub header: ArchiveHeader,
    pub group1_header: Option<GroupHeader>,
    pub group2_header: Option<GroupHeader>,
    pub group1_files: Vec<DataFile>,
    pub group2_files: Vec<DataFile>,
}

impl IceFile {
    pub fn new(version: IceVersion) -> Self {
        Self {
            header: ArchiveHeader::new(version.as_u32()),
            group1_header: None,
            group2_header: None,
            group1_files: Vec::new(),
            group2_files: Vec::new(),
        }
    }

    /// Read an archive of any supported version.
    pub fn read<R: Read>(r: &mut R) -> Result<Self, IceError> {
        let header = ArchiveHeader::read(r)?;
        match header.version {
            3 => Self::read_v3_after_header(header, r),
            4 => Self::read_v4_after_header(header, r),
            v => Err(IceError::UnsupportedVersion(v)),
        }
    }

    /// Read an archive from a file on disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, IceError> {
        let bytes = std::fs::read(path)?;
        Self::read(&mut bytes.as_slice())
    }

    /// Write the archive in its header's version.
    pub fn write<W: Write>(&self, w: &mut W, options: WriteOptions) -> Result<(), IceError> {
        match self.header.version {
            3 => self.write_v3(w, options),
            4 => self.write_v4(w, options),
            v => Err(IceError::UnsupportedVersion(v)),
        }
    }

    fn stored_options(header: &ArchiveHeader) -> CompressOptions {
        if header.is_kraken() {
            CompressOptions::kraken(DEFAULT_KRAKEN_LEVEL)
        } else {
            CompressOptions::prs()
        }
    }

    // ── Version 4 ────────────────────────────────────────────────────────────

    fn read_v4_after_header<R: Read>(header: ArchiveHeader, r: &mut R) -> Result<Self, IceError> {
        let encrypted = header.is_encrypted();
        let options = Self::stored_options(&header);

        let mut magic_numbers = [0u8; MAGIC_NUMBERS_SIZE];
        read_exact_ctx(r, &mut magic_numbers, "encryption-keys region")?;
        let keys = crypto::derive_keys(&magic_numbers, header.file_size);

        let mut region = [0u8; GROUP_HEADERS_REGION];
        read_exact_ctx(r, &mut region, "group headers")?;
        if encrypted {
            crypto::blowfish_decrypt(&mut region, keys.group_headers_key)?;
        }

        let mut cur = &region[..];
        let group1_header = GroupHeader::read(&mut cur)?;
        let group2_header = GroupHeader::read(&mut cur)?;
        // The remaining 0x10 bytes of the region are opaque.

        let group1_data = extract_group(
            &group1_header,
            r,
            options,
            encrypted,
            Some(keys.group1_keys),
            SECOND_PASS_THRESHOLD,
            false,
        )?;
        let group2_data = extract_group(
            &group2_header,
            r,
            options,
            encrypted,
            Some(keys.group2_keys),
            SECOND_PASS_THRESHOLD,
            false,
        )?;

        Ok(Self {
            group1_files: split_group(&group1_header, &group1_data)?,
            group2_files: split_group(&group2_header, &group2_data)?,
            group1_header: Some(group1_header),
            group2_header: Some(group2_header),
            header,
        })
    }

    fn write_v4<W: Write>(&self, w: &mut W, options: WriteOptions) -> Result<(), IceError> {
        let plain1 = combine_group(&self.group1_files);
        let plain2 = combine_group(&self.group2_files);

        let (group1_header, mut stored1) =
            build_group(&plain1, self.group1_files.len() as u32, options.compression);
        let (group2_header, mut stored2) =
            build_group(&plain2, self.group2_files.len() as u32, options.compression);

        let file_size = archive_size(V4_DATA_OFFSET, stored1.len(), stored2.len())?;
        let header = self.build_header(4, &stored1, &stored2, file_size, options);

        let mut region = [0u8; GROUP_HEADERS_REGION];
        {
            let mut cur = &mut region[..];
            group1_header.write(&mut cur)?;
            group2_header.write(&mut cur)?;
        }
        region[0x20..0x24].copy_from_slice(&group1_header.original_size.to_le_bytes());
        region[0x24..0x28].copy_from_slice(&group2_header.original_size.to_le_bytes());

        let mut magic_numbers = [0u8; MAGIC_NUMBERS_SIZE];
        if options.encrypt {
            // Keys derive purely from the keys region and the file size,
            // so a random region yields a KeySet the reader re-derives.
            getrandom::getrandom(&mut magic_numbers)
                .map_err(|e| IceError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
            let keys: KeySet = crypto::derive_keys(&magic_numbers, file_size);

            crypto::blowfish_encrypt(&mut region, keys.group_headers_key)?;
            encrypt_group(&mut stored1, keys.group1_keys, SECOND_PASS_THRESHOLD)?;
            encrypt_group(&mut stored2, keys.group2_keys, SECOND_PASS_THRESHOLD)?;
        }

        header.write(w)?;
        w.write_all(&magic_numbers)?;
        w.write_all(&region)?;
        w.write_all(&stored1)?;
        w.write_all(&stored2)?;
        Ok(())
    }

    // ── Version 3 ────────────────────────────────────────────────────────────

    fn read_v3_after_header<R: Read>(header: ArchiveHeader, r: &mut R) -> Result<Self, IceError> {
        let encrypted = header.is_encrypted();
        let options = Self::stored_options(&header);

        let group1_header = GroupHeader::read(r)?;
        let group2_header = GroupHeader::read(r)?;
        let info = GroupDataInfo::read(r)?;
        let _metadata = EmbeddedMetadata::read(r)?;
        let mut padding = [0u8; 0x30];
        read_exact_ctx(r, &mut padding, "header padding")?;

        let key = if info.group1_size != 0 {
            info.group1_size
        } else if encrypted {
            group1_header.original_size
                ^ group2_header.original_size
                ^ info.group2_size
                ^ info.key
                ^ 0xC8D7_469A
        } else {
            0
        };
        let keys = GroupKeys {
            primary: key.to_le_bytes(),
            secondary: [0u8; 4], // v3 never runs the second pass
        };

        let group1_data =
            extract_group(&group1_header, r, options, encrypted, Some(keys), 0, true)?;
        let group2_data =
            extract_group(&group2_header, r, options, encrypted, Some(keys), 0, true)?;

        Ok(Self {
            group1_files: split_group(&group1_header, &group1_data)?,
            group2_files: split_group(&group2_header, &group2_data)?,
            group1_header: Some(group1_header),
            group2_header: Some(group2_header),
            header,
        })
    }

    fn write_v3<W: Write>(&self, w: &mut W, options: WriteOptions) -> Result<(), IceError> {
        if options.encrypt {
            // The key-dependent fields of observed v3 archives are not
            // reproducible from the derivation rules alone.
            return Err(IceError::EncryptionNotSupported("version 3 archives"));
        }

        let plain1 = combine_group(&self.group1_files);
        let plain2 = combine_group(&self.group2_files);

        let (group1_header, stored1) =
            build_group(&plain1, self.group1_files.len() as u32, options.compression);
        let (group2_header, stored2) =
            build_group(&plain2, self.group2_files.len() as u32, options.compression);

        let file_size = archive_size(V3_DATA_OFFSET, stored1.len(), stored2.len())?;
        let header = self.build_header(3, &stored1, &stored2, file_size, options);

        let info = GroupDataInfo {
            group1_size: stored1.len() as u32,
            group2_size: stored2.len() as u32,
            reserved: 0,
            key: 0,
        };
        let metadata = EmbeddedMetadata {
            magic_ff: header.magic_ff,
            crc32: header.crc32,
            flags: header.flags,
            file_size,
        };

        header.write(w)?;
        group1_header.write(w)?;
        group2_header.write(w)?;
        info.write(w)?;
        metadata.write(w)?;
        w.write_all(&[0u8; 0x30])?;
        w.write_all(&stored1)?;
        w.write_all(&stored2)?;
        Ok(())
    }

    // ── Shared write helpers ─────────────────────────────────────────────────

    fn build_header(
        &self,
        version: u32,
        stored1: &[u8],
        stored2: &[u8],
        file_size: u32,
        options: WriteOptions,
    ) -> ArchiveHeader {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(stored1);
        hasher.update(stored2);

        let mut flags = 0;
        if options.encrypt {
            flags |= FLAG_ENCRYPTED;
        }
        if options.compression.mode == CompressMode::Kraken {
            flags |= FLAG_KRAKEN;
        }

        let mut header = ArchiveHeader::new(version);
        header.crc32 = hasher.finalize();
        header.flags = flags;
        header.file_size = file_size;
        header
    }
}

/// Combine-stage output for one group: its header and stored bytes.
fn build_group(plain: &[u8], file_count: u32, compression: CompressOptions) -> (GroupHeader, Vec<u8>) {
    let stored = codec::compress(plain, compression);
    let compressed_size = if compression.mode != CompressMode::None {
        stored.len() as u32
    } else {
        0
    };
    let header = GroupHeader {
        original_size: plain.len() as u32,
        compressed_size,
        file_count,
        crc32: crc32fast::hash(&stored),
    };
    (header, stored)
}

fn archive_size(data_offset: usize, stored1: usize, stored2: usize) -> Result<u32, IceError> {
    u32::try_from(data_offset + stored1 + stored2)
        .map_err(|_| IceError::InvalidInput("archive exceeds the 4 GiB size field".into()))
}

// ── Repack ───────────────────────────────────────────────────────────────────

/// Read an archive of any supported version and write it back as
/// `version` with the requested options, preserving both file lists.
pub fn repack<R: Read, W: Write>(
    source: &mut R,
    sink: &mut W,
    version: IceVersion,
    options: WriteOptions,
) -> Result<(), IceError> {
    let parsed = IceFile::read(source)?;
    let mut out = IceFile::new(version);
    out.group1_files = parsed.group1_files;
    out.group2_files = parsed.group2_files;
    out.write(sink, options)
}
