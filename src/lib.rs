//! # icepack — reader and writer for ICE game-asset archives
//!
//! Format guarantees (frozen across versions 3 and 4):
//! - All numeric fields are little-endian; the signature is `"ICE\0"`
//! - An archive holds exactly two ordered file groups, each compressed
//!   and encrypted as one unit
//! - The archive CRC32 covers the stored (post-compress, pre-encrypt)
//!   payloads of both groups; each group header carries its own CRC32
//! - v4 places a 0x100-byte encryption-keys region before the group
//!   headers; v3 places the group headers first and folds its key out of
//!   the header fields
//! - Encryption is floatage XOR + Blowfish ECB under keys derived purely
//!   from `(keys region, file size)`; the unaligned Blowfish tail passes
//!   through untouched
//! - Compressed groups use the kraken slot or PRS; PRS bytes are stored
//!   XOR-0x95 masked
//!
//! Archives are bounded and handled fully in memory; reading and writing
//! are single-threaded and synchronous.

pub mod archive;
pub mod codec;
pub mod crypto;
pub mod datafile;
pub mod error;
pub mod group;
pub mod header;
pub mod pack;
pub mod unpack;

// Flat re-exports for the most common types.
pub use archive::{repack, IceFile, IceVersion, WriteOptions, SECOND_PASS_THRESHOLD};
pub use codec::{CompressMode, CompressOptions};
pub use crypto::{derive_keys, GroupKeys, KeySet};
pub use datafile::{DataFile, DataFileHeader};
pub use error::IceError;
pub use header::{ArchiveHeader, GroupHeader};
pub use pack::pack;
pub use unpack::unpack;
