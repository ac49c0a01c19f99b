//! Group codec: the encrypt/compress envelope around a group's payload and
//! the record splitter/combiner.
//!
//! On read a group goes through `stored bytes → decrypt → decompress →
//! split into records`; writing runs the same stages mirrored.  The split
//! step dispatches on the decompressed payload's first bytes:
//!
//! - `NIFL` — a chain of NIFL chunks, each sized by walking its NOF0
//!   pointer table; a non-NIFL remainder is kept as one trailing nameless
//!   blob.
//! - headerless first byte — a single opaque blob (`file_count` must be 1).
//! - anything else — `file_count` records each opening with a
//!   [`DataFileHeader`].

use std::io::Read;

use crate::codec::{self, CompressOptions};
use crate::crypto::{self, GroupKeys, FLOATAGE_SHIFT};
use crate::datafile::{is_headerless, is_nifl, DataFile, DataFileHeader};
use crate::error::IceError;
use crate::header::{read_exact_ctx, GroupHeader};

// ── Envelope ─────────────────────────────────────────────────────────────────

/// Read one group's stored bytes from `r` and peel encryption and
/// compression, yielding the plaintext payload.
pub fn extract_group<R: Read>(
    header: &GroupHeader,
    r: &mut R,
    options: CompressOptions,
    encrypted: bool,
    keys: Option<GroupKeys>,
    second_pass_threshold: usize,
    v3: bool,
) -> Result<Vec<u8>, IceError> {
    if header.stored_size() == 0 {
        return Ok(Vec::new());
    }

    let mut data = vec![0u8; header.stored_size() as usize];
    read_exact_ctx(r, &mut data, "group payload")?;

    if encrypted {
        let keys = keys
            .ok_or_else(|| IceError::DecryptionFailed("no keys for an encrypted group".into()))?;
        decrypt_group(&mut data, keys, second_pass_threshold, v3)?;
    }

    if header.compressed_size != 0 {
        data = codec::decompress(&data, header.original_size as usize, options)?;
    }

    Ok(data)
}

/// Decrypt a stored group payload in place.
///
/// v4: floatage under the primary key, a Blowfish pass under the primary
/// key, and a second pass under the secondary key for payloads of at most
/// `second_pass_threshold` bytes.  v3 uses the single Blowfish pass only.
pub fn decrypt_group(
    data: &mut [u8],
    keys: GroupKeys,
    second_pass_threshold: usize,
    v3: bool,
) -> Result<(), IceError> {
    if !v3 {
        crypto::floatage(data, keys.primary, FLOATAGE_SHIFT);
    }

    crypto::blowfish_decrypt(data, keys.primary)?;

    if !v3 && data.len() <= second_pass_threshold {
        crypto::blowfish_decrypt(data, keys.secondary)?;
    }

    Ok(())
}

/// Mirror of [`decrypt_group`] for the v4 write path.
pub fn encrypt_group(
    data: &mut [u8],
    keys: GroupKeys,
    second_pass_threshold: usize,
) -> Result<(), IceError> {
    if data.len() <= second_pass_threshold {
        crypto::blowfish_encrypt(data, keys.secondary)?;
    }

    crypto::blowfish_encrypt(data, keys.primary)?;
    crypto::floatage(data, keys.primary, FLOATAGE_SHIFT);

    Ok(())
}

// ── Split / combine ──────────────────────────────────────────────────────────

/// Split a plaintext group payload into its records, dispatching on the
/// payload shape.
pub fn split_group(header: &GroupHeader, data: &[u8]) -> Result<Vec<DataFile>, IceError> {
    if data.is_empty() {
        return Ok(Vec::new());
    }

    if is_nifl(data) {
        split_nifl_group(header, data)
    } else if is_headerless(data) {
        split_headerless_group(header, data)
    } else {
        split_normal_group(header, data)
    }
}

fn split_nifl_group(header: &GroupHeader, data: &[u8]) -> Result<Vec<DataFile>, IceError> {
    let mut files = Vec::new();
    let mut pos = 0usize;

    for index in 0..header.file_count as usize {
        if data.len() - pos < 4 || &data[pos..pos + 4] != b"NIFL" {
            // Remaining bytes form one trailing nameless blob.
            files.push(DataFile::nameless(data[pos..].to_vec(), index));
            break;
        }

        if data.len() - pos < 0x18 {
            return Err(IceError::UnexpectedEof("NIFL chunk header"));
        }
        let body = i32::from_le_bytes(data[pos + 0x14..pos + 0x18].try_into().unwrap());
        if body < 0 {
            return Err(IceError::MalformedRecord(format!(
                "NIFL body size {body:#x}"
            )));
        }
        let body = body as usize;

        // The NOF0 pointer table sits right after the body; its length
        // field is followed by the tag+size pair and 0x10 alignment, then
        // an 0x10-byte NEND trailer closes the chunk.
        let nof0_at = pos + 0x08 + body;
        if data.len() < nof0_at + 4 {
            return Err(IceError::UnexpectedEof("NOF0 length"));
        }
        let nof0 = i32::from_le_bytes(data[nof0_at..nof0_at + 4].try_into().unwrap());
        if nof0 < 0 {
            return Err(IceError::MalformedRecord(format!(
                "NOF0 length {nof0:#x}"
            )));
        }
        let mut nof0 = nof0 as usize + 8;
        nof0 += 0x10 - nof0 % 0x10;

        let total = body + nof0 + 0x10;
        if data.len() - pos < total {
            return Err(IceError::UnexpectedEof("NIFL chunk"));
        }

        files.push(DataFile::nameless(data[pos..pos + total].to_vec(), index));
        pos += total;
    }

    Ok(files)
}

fn split_headerless_group(header: &GroupHeader, data: &[u8]) -> Result<Vec<DataFile>, IceError> {
    if header.file_count != 1 {
        return Err(IceError::MalformedRecord(format!(
            "expected a single nameless file but the group lists {}",
            header.file_count
        )));
    }
    Ok(vec![DataFile::nameless(data.to_vec(), 0)])
}

fn split_normal_group(header: &GroupHeader, data: &[u8]) -> Result<Vec<DataFile>, IceError> {
    let mut files = Vec::new();
    let mut pos = 0usize;

    for index in 0..header.file_count as usize {
        let record_header = DataFileHeader::decode(&data[pos..])?;
        let total = record_header.file_size as usize;
        if data.len() - pos < total {
            return Err(IceError::UnexpectedEof("data file record"));
        }
        files.push(DataFile::with_header(
            data[pos..pos + total].to_vec(),
            index,
            record_header,
        ));
        pos += total;
    }

    Ok(files)
}

/// Concatenate records (headers included) back into a group payload.
pub fn combine_group(files: &[DataFile]) -> Vec<u8> {
    let mut out = Vec::with_capacity(files.iter().map(|f| f.raw().len()).sum());
    for file in files {
        out.extend_from_slice(file.raw());
    }
    out
}
