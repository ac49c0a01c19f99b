//! Archive and group headers — fixed little-endian records.
//!
//! # Archive header (0x20 bytes, all fields little-endian)
//!
//! ```text
//! Offset  Size  Field
//!    0      4   signature  = "ICE\0"
//!    4      4   padding    (ignored on read, zero on write)
//!    8      4   version    3 or 4                      (LE u32)
//!   12      4   magic_80   = 0x80                      (LE u32)
//!   16      4   magic_ff   = 0xFF                      (LE u32)
//!   20      4   crc32      over both stored payloads   (LE u32)
//!   24      4   flags      0x01=encrypted 0x08=kraken  (LE u32)
//!   28      4   file_size  archive bytes on disk       (LE u32)
//! ```
//!
//! The archive CRC32 covers the concatenation of the two stored group
//! payloads — post-compression, pre-encryption.
//!
//! # Group header (0x10 bytes)
//!
//! `original_size | compressed_size | file_count | crc32`, all LE u32.
//! `compressed_size == 0` means the group is stored uncompressed and the
//! CRC covers the plaintext; otherwise it covers the compressed bytes.
//!
//! Version 3 archives carry two trailer records between the group headers
//! and the payloads; see [`GroupDataInfo`] and [`EmbeddedMetadata`].

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::IceError;

pub const ICE_SIGNATURE: [u8; 4] = *b"ICE\0";
pub const ARCHIVE_HEADER_SIZE: usize = 0x20;
pub const GROUP_HEADER_SIZE: usize = 0x10;

/// Flag bit: both groups are floatage + Blowfish encrypted.
pub const FLAG_ENCRYPTED: u32 = 0x01;
/// Flag bit: compressed payloads use the kraken slot (PRS otherwise).
pub const FLAG_KRAKEN: u32 = 0x08;

/// `read_exact` that reports a truncated region by name instead of a bare
/// IO error.
pub(crate) fn read_exact_ctx<R: Read>(
    r: &mut R,
    buf: &mut [u8],
    what: &'static str,
) -> Result<(), IceError> {
    r.read_exact(buf).map_err(|e| eof_ctx(e, what))
}

fn eof_ctx(e: io::Error, what: &'static str) -> IceError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof => IceError::UnexpectedEof(what),
        _ => IceError::Io(e),
    }
}

// ── Archive header ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ArchiveHeader {
    pub version: u32,
    pub magic_80: u32,
    pub magic_ff: u32,
    pub crc32: u32,
    pub flags: u32,
    pub file_size: u32,
}

impl ArchiveHeader {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            magic_80: 0x80,
            magic_ff: 0xFF,
            crc32: 0,
            flags: 0,
            file_size: 0,
        }
    }

    /// Read and validate the 0x20-byte archive header.
    ///
    /// Signature and the two magic constants are exact; any mismatch aborts
    /// the read before group data is touched.
    pub fn read<R: Read>(r: &mut R) -> Result<Self, IceError> {
        let mut signature = [0u8; 4];
        read_exact_ctx(r, &mut signature, "archive header")?;
        if signature != ICE_SIGNATURE {
            return Err(IceError::NotAnArchive);
        }

        let header = Self::read_fields(r).map_err(|e| eof_ctx(e, "archive header"))?;
        if header.magic_80 != 0x80 || header.magic_ff != 0xFF {
            return Err(IceError::MalformedHeader(format!(
                "magic constants {:#x}/{:#x} (expected 0x80/0xff)",
                header.magic_80, header.magic_ff,
            )));
        }

        Ok(header)
    }

    fn read_fields<R: Read>(r: &mut R) -> io::Result<Self> {
        let _padding = r.read_u32::<LittleEndian>()?;
        Ok(Self {
            version: r.read_u32::<LittleEndian>()?,
            magic_80: r.read_u32::<LittleEndian>()?,
            magic_ff: r.read_u32::<LittleEndian>()?,
            crc32: r.read_u32::<LittleEndian>()?,
            flags: r.read_u32::<LittleEndian>()?,
            file_size: r.read_u32::<LittleEndian>()?,
        })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&ICE_SIGNATURE)?;
        w.write_u32::<LittleEndian>(0)?; // padding
        w.write_u32::<LittleEndian>(self.version)?;
        w.write_u32::<LittleEndian>(self.magic_80)?;
        w.write_u32::<LittleEndian>(self.magic_ff)?;
        w.write_u32::<LittleEndian>(self.crc32)?;
        w.write_u32::<LittleEndian>(self.flags)?;
        w.write_u32::<LittleEndian>(self.file_size)
    }

    #[inline]
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    #[inline]
    pub fn is_kraken(&self) -> bool {
        self.flags & FLAG_KRAKEN != 0
    }
}

// ── Group header ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupHeader {
    pub original_size: u32,
    pub compressed_size: u32,
    pub file_count: u32,
    pub crc32: u32,
}

impl GroupHeader {
    pub fn read<R: Read>(r: &mut R) -> Result<Self, IceError> {
        Self::read_fields(r).map_err(|e| eof_ctx(e, "group header"))
    }

    fn read_fields<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(Self {
            original_size: r.read_u32::<LittleEndian>()?,
            compressed_size: r.read_u32::<LittleEndian>()?,
            file_count: r.read_u32::<LittleEndian>()?,
            crc32: r.read_u32::<LittleEndian>()?,
        })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.original_size)?;
        w.write_u32::<LittleEndian>(self.compressed_size)?;
        w.write_u32::<LittleEndian>(self.file_count)?;
        w.write_u32::<LittleEndian>(self.crc32)
    }

    /// Bytes the group actually occupies on disk.
    #[inline]
    pub fn stored_size(&self) -> u32 {
        if self.compressed_size != 0 {
            self.compressed_size
        } else {
            self.original_size
        }
    }
}

// ── Version-3 trailers ───────────────────────────────────────────────────────

/// Stored sizes and key word following the group headers in a v3 archive
/// (0x10 bytes: `group1_size | group2_size | reserved | key`).
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupDataInfo {
    pub group1_size: u32,
    pub group2_size: u32,
    pub reserved: u32,
    pub key: u32,
}

impl GroupDataInfo {
    pub fn read<R: Read>(r: &mut R) -> Result<Self, IceError> {
        let parse = |r: &mut R| -> io::Result<Self> {
            Ok(Self {
                group1_size: r.read_u32::<LittleEndian>()?,
                group2_size: r.read_u32::<LittleEndian>()?,
                reserved: r.read_u32::<LittleEndian>()?,
                key: r.read_u32::<LittleEndian>()?,
            })
        };
        parse(r).map_err(|e| eof_ctx(e, "group data info"))
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.group1_size)?;
        w.write_u32::<LittleEndian>(self.group2_size)?;
        w.write_u32::<LittleEndian>(self.reserved)?;
        w.write_u32::<LittleEndian>(self.key)
    }
}

/// Copy of the archive-level metadata embedded in a v3 header sequence
/// (0x10 bytes: `magic_ff | crc32 | flags | file_size`).
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedMetadata {
    pub magic_ff: u32,
    pub crc32: u32,
    pub flags: u32,
    pub file_size: u32,
}

impl EmbeddedMetadata {
    pub fn read<R: Read>(r: &mut R) -> Result<Self, IceError> {
        let parse = |r: &mut R| -> io::Result<Self> {
            Ok(Self {
                magic_ff: r.read_u32::<LittleEndian>()?,
                crc32: r.read_u32::<LittleEndian>()?,
                flags: r.read_u32::<LittleEndian>()?,
                file_size: r.read_u32::<LittleEndian>()?,
            })
        };
        parse(r).map_err(|e| eof_ctx(e, "embedded metadata"))
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.magic_ff)?;
        w.write_u32::<LittleEndian>(self.crc32)?;
        w.write_u32::<LittleEndian>(self.flags)?;
        w.write_u32::<LittleEndian>(self.file_size)
    }
}
