//! Compression dispatch for group payloads.
//!
//! An archive compresses each group as one unit with one of two codecs:
//! the kraken slot (a general-purpose LZ oracle exposing
//! `compress(data, level)` / `decompress(data, out_size)`) or [`prs`],
//! the game's own bit-packed LZ.  When PRS is used inside an archive,
//! every stored byte is additionally XORed with `0x95`; the mask belongs
//! to the archive layer, not to the codec, and is applied here.
//!
//! Mode and level travel as a plain [`CompressOptions`] value; CLI strings
//! are parsed at the boundary (`none | 0..9 | kraken | prs`, a bare digit
//! selecting kraken at that level).

pub mod prs;

use std::str::FromStr;

use crate::error::IceError;

pub const DEFAULT_KRAKEN_LEVEL: u8 = 3;

/// Byte mask applied over PRS-compressed payloads inside an archive.
pub const PRS_MASK: u8 = 0x95;

// ── Options ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressMode {
    #[default]
    None,
    Kraken,
    Prs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressOptions {
    pub mode: CompressMode,
    pub level: u8,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self { mode: CompressMode::None, level: DEFAULT_KRAKEN_LEVEL }
    }
}

impl CompressOptions {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn kraken(level: u8) -> Self {
        Self { mode: CompressMode::Kraken, level }
    }

    pub fn prs() -> Self {
        Self { mode: CompressMode::Prs, level: 0 }
    }
}

impl FromStr for CompressOptions {
    type Err = IceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::none()),
            "kraken" => Ok(Self::kraken(DEFAULT_KRAKEN_LEVEL)),
            "prs" => Ok(Self::prs()),
            other => match other.parse::<u8>() {
                Ok(level) if level <= 9 => Ok(Self::kraken(level)),
                _ => Err(IceError::InvalidInput(format!(
                    "unknown compression mode {s:?} (expected none, 0..9, kraken, or prs)"
                ))),
            },
        }
    }
}

// ── Group payload dispatch ───────────────────────────────────────────────────

/// Compress a group payload under the selected mode.  An empty payload
/// stays empty regardless of mode.
pub fn compress(data: &[u8], options: CompressOptions) -> Vec<u8> {
    if data.is_empty() {
        return Vec::new();
    }
    match options.mode {
        CompressMode::None => data.to_vec(),
        CompressMode::Kraken => kraken_compress(data, options.level),
        CompressMode::Prs => {
            let mut out = prs::compress(data);
            for b in &mut out {
                *b ^= PRS_MASK;
            }
            out
        }
    }
}

/// Decompress a stored group payload back to `out_size` plaintext bytes.
pub fn decompress(data: &[u8], out_size: usize, options: CompressOptions) -> Result<Vec<u8>, IceError> {
    match options.mode {
        CompressMode::None => Ok(data.to_vec()),
        CompressMode::Kraken => kraken_decompress(data, out_size),
        CompressMode::Prs => {
            let unmasked: Vec<u8> = data.iter().map(|b| b ^ PRS_MASK).collect();
            Ok(prs::decompress(&unmasked, out_size))
        }
    }
}

// ── Kraken oracle ────────────────────────────────────────────────────────────

/// Kraken-slot compression.  The slot is bound to the lz4 block codec;
/// the level is accepted for oracle parity and ignored by the backend.
pub fn kraken_compress(data: &[u8], _level: u8) -> Vec<u8> {
    lz4_flex::block::compress(data)
}

/// Kraken-slot decompression to exactly `out_size` bytes.
pub fn kraken_decompress(data: &[u8], out_size: usize) -> Result<Vec<u8>, IceError> {
    let out = lz4_flex::block::decompress(data, out_size)
        .map_err(|e| IceError::DecompressionFailed(e.to_string()))?;
    if out.len() != out_size {
        return Err(IceError::DecompressionFailed(format!(
            "expected {out_size} bytes, got {}",
            out.len()
        )));
    }
    Ok(out)
}
