//! Floatage cipher, Blowfish ECB wrapper, and the derived key schedule.
//!
//! Encrypted archives layer two ciphers over each group payload:
//! a byte-wise "floatage" XOR substitution keyed by a 32-bit word, and
//! Blowfish in ECB mode under 4-byte keys derived from the 0x100-byte
//! encryption-keys region that follows the v4 archive header.
//!
//! Key derivation is a pure function of `(magic_numbers, file_size)`; it
//! holds no module state, so a writer that generates a fresh keys region
//! derives exactly the keys a later reader will.
//!
//! Decrypt pipeline per group (v4): floatage under the primary key, one
//! Blowfish pass under the primary key, and — for payloads at or below the
//! second-pass threshold — a second Blowfish pass under the secondary key.
//! Version 3 skips floatage and the second pass.

use blowfish::cipher::{Block, BlockDecrypt, BlockEncrypt, KeyInit};
use blowfish::BlowfishLE;

use crate::error::IceError;

/// Size of the encryption-keys region in a v4 archive.
pub const MAGIC_NUMBERS_SIZE: usize = 0x100;

/// Default bit shift of the floatage XOR mask.
pub const FLOATAGE_SHIFT: u32 = 16;

const BLOCK_SIZE: usize = 8;

// ── Key material ─────────────────────────────────────────────────────────────

/// Primary/secondary Blowfish keys for one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupKeys {
    pub primary: [u8; 4],
    pub secondary: [u8; 4],
}

/// Derived key material for a v4 archive.  Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySet {
    pub group_headers_key: [u8; 4],
    pub group1_keys: GroupKeys,
    pub group2_keys: GroupKeys,
}

// ── Floatage cipher ──────────────────────────────────────────────────────────

/// Apply the floatage substitution in place.
///
/// The mask is `((k >> shift) ^ k) & 0xFF`; bytes equal to zero or to the
/// mask itself pass through unchanged.  The transform is involutive, so the
/// same call encrypts and decrypts.
pub fn floatage(data: &mut [u8], key: [u8; 4], shift: u32) {
    let k = u32::from_le_bytes(key);
    let mask = ((k >> shift) ^ k) as u8;
    for b in data.iter_mut() {
        if *b != 0 && *b != mask {
            *b ^= mask;
        }
    }
}

// ── Blowfish wrapper ─────────────────────────────────────────────────────────

fn cipher_for(key: [u8; 4]) -> Result<BlowfishLE, IceError> {
    BlowfishLE::new_from_slice(&key)
        .map_err(|e| IceError::DecryptionFailed(format!("cipher rejected key: {e}")))
}

/// Decrypt the 8-byte-aligned head of `data` in place with Blowfish ECB.
///
/// Blocks are processed as pairs of little-endian words.  The trailing
/// `len % 8` bytes are left untouched in both directions — a quirk of the
/// format that must be preserved for bit-for-bit compatibility.
pub fn blowfish_decrypt(data: &mut [u8], key: [u8; 4]) -> Result<(), IceError> {
    let cipher = cipher_for(key)?;
    let head = data.len() - data.len() % BLOCK_SIZE;
    for chunk in data[..head].chunks_exact_mut(BLOCK_SIZE) {
        cipher.decrypt_block(Block::<BlowfishLE>::from_mut_slice(chunk));
    }
    Ok(())
}

/// Encrypt the 8-byte-aligned head of `data` in place; the tail remainder
/// passes through, mirroring [`blowfish_decrypt`].
pub fn blowfish_encrypt(data: &mut [u8], key: [u8; 4]) -> Result<(), IceError> {
    let cipher = cipher_for(key)?;
    let head = data.len() - data.len() % BLOCK_SIZE;
    for chunk in data[..head].chunks_exact_mut(BLOCK_SIZE) {
        cipher.encrypt_block(Block::<BlowfishLE>::from_mut_slice(chunk));
    }
    Ok(())
}

// ── Key schedule ─────────────────────────────────────────────────────────────

/// Derive the archive's [`KeySet`] from the encryption-keys region and the
/// total file size.
pub fn derive_keys(magic_numbers: &[u8; MAGIC_NUMBERS_SIZE], file_size: u32) -> KeySet {
    let int_6c = u32::from_le_bytes(magic_numbers[0x6C..0x70].try_into().unwrap());
    let crc = crc32fast::hash(&magic_numbers[0x7C..0xDC]);
    let seed = crc ^ int_6c ^ file_size ^ 0x4352_F5C2;

    let key = get_key(magic_numbers, seed);
    let group1_a = calc_blowfish_keys(magic_numbers, key);
    let group1_b = get_key(magic_numbers, group1_a);
    let group2_a = group1_a.rotate_right(15);
    let group2_b = group1_b.rotate_right(15);
    let headers = group1_a.rotate_right(19);

    KeySet {
        group_headers_key: headers.to_le_bytes(),
        group1_keys: GroupKeys {
            primary: group1_a.to_le_bytes(),
            secondary: group1_b.to_le_bytes(),
        },
        group2_keys: GroupKeys {
            primary: group2_a.to_le_bytes(),
            secondary: group2_b.to_le_bytes(),
        },
    }
}

/// Mix a 32-bit word through the keys blob: four blob bytes picked by the
/// word's own bytes, each rotated, reassembled into a new word.
fn get_key(blob: &[u8], t: u32) -> u32 {
    let n1 = (t as u8).wrapping_add(93) as usize;
    let n2 = ((t >> 8) as u8).wrapping_add(63) as usize;
    let n3 = ((t >> 16) as u8).wrapping_add(69) as usize;
    let n4 = ((t >> 24) as u8).wrapping_sub(58) as usize;

    let byte = |i: usize, rot: u32| blob[i].rotate_left(rot) as u32;

    (byte(n2, 7) << 24) | (byte(n4, 6) << 16) | (byte(n1, 5) << 8) | byte(n3, 5)
}

fn calc_blowfish_keys(blob: &[u8], t: u32) -> u32 {
    let mut t = 0x8E02_C25C ^ t;

    // Divide-by-7 via magic multiplier; rounds == (t % 7) + 2.
    let q = ((0x2492_4925u64 * t as u64) >> 32) as u32;
    let r = (((t - q) >> 1) + q) >> 2;
    let rounds = t - r * 7 + 2;

    for _ in 0..rounds {
        t = get_key(blob, t);
    }

    t ^ 0x4352_F5C2 ^ 0xCD50_3798
}
