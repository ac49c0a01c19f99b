use std::fs;

use icepack::codec::{self, prs, CompressOptions};
use icepack::{
    pack::pack, unpack::unpack, DataFile, IceError, IceFile, IceVersion, WriteOptions,
};

const V4_DATA_OFFSET: usize = 0x150;
const V3_DATA_OFFSET: usize = 0x90;

fn pseudo_random(len: usize, mut seed: u32) -> Vec<u8> {
    (0..len)
        .map(|_| {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (seed >> 24) as u8
        })
        .collect()
}

fn names(files: &[DataFile]) -> Vec<String> {
    files.iter().map(|f| f.name()).collect()
}

fn write_archive(ice: &IceFile, options: WriteOptions) -> Vec<u8> {
    let mut bytes = Vec::new();
    ice.write(&mut bytes, options).unwrap();
    bytes
}

// ── Version 4 ────────────────────────────────────────────────────────────────

#[test]
fn v4_plain_roundtrip() {
    let mut ice = IceFile::new(IceVersion::V4);
    ice.group2_files.push(DataFile::new("a.bin", b"hello").unwrap());
    ice.group2_files.push(DataFile::new("b.txt", b"world!").unwrap());

    let bytes = write_archive(&ice, WriteOptions::default());

    let combined: usize = ice.group2_files.iter().map(|f| f.raw().len()).sum();
    assert_eq!(bytes.len(), V4_DATA_OFFSET + combined);
    // Unencrypted archives carry a zeroed keys region.
    assert!(bytes[0x20..0x120].iter().all(|&b| b == 0));

    let parsed = IceFile::read(&mut bytes.as_slice()).unwrap();
    assert_eq!(parsed.header.file_size as usize, bytes.len());
    assert!(parsed.group1_files.is_empty());
    assert_eq!(names(&parsed.group2_files), ["a.bin", "b.txt"]);
    assert_eq!(parsed.group2_files[0].data(), b"hello");
    assert_eq!(parsed.group2_files[1].data(), b"world!");
    assert_eq!(parsed.group2_files, ice.group2_files);
}

#[test]
fn v4_kraken_roundtrip() {
    let payload = pseudo_random(4096, 0xACE1);
    let mut ice = IceFile::new(IceVersion::V4);
    ice.group2_files.push(DataFile::new("x.dat", &payload).unwrap());

    let options = WriteOptions { compression: CompressOptions::kraken(3), encrypt: false };
    let bytes = write_archive(&ice, options);

    let parsed = IceFile::read(&mut bytes.as_slice()).unwrap();
    let group2 = parsed.group2_header.unwrap();
    assert!(group2.compressed_size > 0);
    assert!(parsed.header.is_kraken());
    assert_eq!(parsed.group2_files[0].data(), &payload[..]);
}

#[test]
fn v4_prs_payloads_are_stored_masked() {
    let payload: Vec<u8> = [vec![0u8; 256], vec![0xFFu8; 256]].concat();
    let mut ice = IceFile::new(IceVersion::V4);
    ice.group2_files.push(DataFile::new("p.bin", &payload).unwrap());

    let options = WriteOptions { compression: CompressOptions::prs(), encrypt: false };
    let bytes = write_archive(&ice, options);

    let parsed = IceFile::read(&mut bytes.as_slice()).unwrap();
    assert!(!parsed.header.is_kraken());
    assert!(parsed.group2_header.unwrap().compressed_size > 0);
    assert_eq!(parsed.group2_files[0].data(), &payload[..]);

    // Stored bytes are the PRS stream under the 0x95 mask.
    let group_plain = icepack::group::combine_group(&ice.group2_files);
    let prs_stream = prs::compress(&group_plain);
    let stored = &bytes[V4_DATA_OFFSET..];
    assert_eq!(stored.len(), prs_stream.len());
    assert_eq!(stored[0], prs_stream[0] ^ codec::PRS_MASK);
    assert_eq!(stored, &codec::compress(&group_plain, CompressOptions::prs())[..]);
}

#[test]
fn v4_encrypted_roundtrip() {
    let mut ice = IceFile::new(IceVersion::V4);
    ice.group1_files.push(DataFile::new("keys.bin", b"group one data").unwrap());
    ice.group2_files.push(DataFile::new("body.bin", &pseudo_random(2000, 7)).unwrap());

    let options = WriteOptions { compression: CompressOptions::none(), encrypt: true };
    let bytes = write_archive(&ice, options);

    let plain_bytes = write_archive(&ice, WriteOptions::default());
    assert!(bytes[V4_DATA_OFFSET..] != plain_bytes[V4_DATA_OFFSET..]);

    let parsed = IceFile::read(&mut bytes.as_slice()).unwrap();
    assert!(parsed.header.is_encrypted());
    assert_eq!(parsed.group1_files, ice.group1_files);
    assert_eq!(parsed.group2_files, ice.group2_files);
}

#[test]
fn v4_encrypted_kraken_roundtrip() {
    let payload = b"repetitive repetitive repetitive payload ".repeat(64);
    let mut ice = IceFile::new(IceVersion::V4);
    ice.group2_files.push(DataFile::new("text.txt", &payload).unwrap());

    let options = WriteOptions { compression: CompressOptions::kraken(3), encrypt: true };
    let bytes = write_archive(&ice, options);

    let parsed = IceFile::read(&mut bytes.as_slice()).unwrap();
    assert!(parsed.header.is_encrypted() && parsed.header.is_kraken());
    assert_eq!(parsed.group2_files[0].data(), &payload[..]);
}

#[test]
fn v4_encrypted_group_above_second_pass_threshold() {
    // Uncompressed stored size beyond 0x19000 exercises the single-pass
    // branch of the cipher pipeline.
    let payload = pseudo_random(0x1A000, 99);
    let mut ice = IceFile::new(IceVersion::V4);
    ice.group2_files.push(DataFile::new("big.dat", &payload).unwrap());

    let options = WriteOptions { compression: CompressOptions::none(), encrypt: true };
    let bytes = write_archive(&ice, options);

    let parsed = IceFile::read(&mut bytes.as_slice()).unwrap();
    assert_eq!(parsed.group2_files[0].data(), &payload[..]);
}

#[test]
fn v4_crc_fields_cover_stored_bytes() {
    let mut ice = IceFile::new(IceVersion::V4);
    ice.group1_files.push(DataFile::new("one.bin", b"1111").unwrap());
    ice.group2_files.push(DataFile::new("two.bin", b"22222222").unwrap());

    let bytes = write_archive(&ice, WriteOptions::default());
    let parsed = IceFile::read(&mut bytes.as_slice()).unwrap();

    let g1 = parsed.group1_header.unwrap();
    let g2 = parsed.group2_header.unwrap();
    let stored1 = &bytes[V4_DATA_OFFSET..V4_DATA_OFFSET + g1.stored_size() as usize];
    let stored2 = &bytes[V4_DATA_OFFSET + g1.stored_size() as usize..];

    assert_eq!(g1.crc32, crc32fast::hash(stored1));
    assert_eq!(g2.crc32, crc32fast::hash(stored2));

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(stored1);
    hasher.update(stored2);
    assert_eq!(parsed.header.crc32, hasher.finalize());
}

// ── Version 3 ────────────────────────────────────────────────────────────────

#[test]
fn v3_roundtrip() {
    let mut ice = IceFile::new(IceVersion::V3);
    ice.group1_files.push(DataFile::new("first.bin", b"alpha").unwrap());
    ice.group2_files.push(DataFile::new("second.bin", b"beta").unwrap());

    let bytes = write_archive(&ice, WriteOptions::default());

    let combined: usize =
        ice.group1_files.iter().chain(&ice.group2_files).map(|f| f.raw().len()).sum();
    assert_eq!(bytes.len(), V3_DATA_OFFSET + combined);

    let parsed = IceFile::read(&mut bytes.as_slice()).unwrap();
    assert_eq!(parsed.header.version, 3);
    assert_eq!(parsed.group1_files, ice.group1_files);
    assert_eq!(parsed.group2_files, ice.group2_files);
}

#[test]
fn v3_hand_built_stream_parses() {
    let record1 = DataFile::new("first.bin", b"alpha").unwrap();
    let record2 = DataFile::new("second.bin", b"beta").unwrap();
    let stored1 = record1.raw();
    let stored2 = record2.raw();
    let file_size = (V3_DATA_OFFSET + stored1.len() + stored2.len()) as u32;

    let mut bytes = Vec::new();
    // archive header
    bytes.extend_from_slice(b"ICE\0");
    bytes.extend_from_slice(&[0u8; 4]);
    bytes.extend_from_slice(&3u32.to_le_bytes());
    bytes.extend_from_slice(&0x80u32.to_le_bytes());
    bytes.extend_from_slice(&0xFFu32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes()); // crc (unchecked on read)
    bytes.extend_from_slice(&0u32.to_le_bytes()); // flags: plain
    bytes.extend_from_slice(&file_size.to_le_bytes());
    // group headers
    for stored in [stored1, stored2] {
        bytes.extend_from_slice(&(stored.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&crc32fast::hash(stored).to_le_bytes());
    }
    // group data info with group1_size != 0, embedded metadata, padding
    bytes.extend_from_slice(&(stored1.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&(stored2.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&[0u8; 8]);
    bytes.extend_from_slice(&0xFFu32.to_le_bytes());
    bytes.extend_from_slice(&[0u8; 12]);
    bytes.extend_from_slice(&[0u8; 0x30]);
    bytes.extend_from_slice(stored1);
    bytes.extend_from_slice(stored2);

    let parsed = IceFile::read(&mut bytes.as_slice()).unwrap();
    assert_eq!(names(&parsed.group1_files), ["first.bin"]);
    assert_eq!(names(&parsed.group2_files), ["second.bin"]);
    assert_eq!(parsed.group1_files[0].data(), b"alpha");
    assert_eq!(parsed.group2_files[0].data(), b"beta");
}

// ── Repack ───────────────────────────────────────────────────────────────────

#[test]
fn repack_changes_version_and_compression() {
    let mut ice = IceFile::new(IceVersion::V4);
    ice.group1_files.push(DataFile::new("a.bin", b"aaaaaaaaaaaaaaaa").unwrap());
    ice.group2_files.push(DataFile::new("b.bin", b"bbbbbbbbbbbbbbbb").unwrap());
    let source = write_archive(&ice, WriteOptions::default());

    let mut repacked = Vec::new();
    let options = WriteOptions { compression: CompressOptions::prs(), encrypt: false };
    icepack::repack(&mut source.as_slice(), &mut repacked, IceVersion::V3, options).unwrap();

    let parsed = IceFile::read(&mut repacked.as_slice()).unwrap();
    assert_eq!(parsed.header.version, 3);
    assert_eq!(parsed.group1_files, ice.group1_files);
    assert_eq!(parsed.group2_files, ice.group2_files);
}

#[test]
fn repack_decrypts_into_plain_v4() {
    let mut ice = IceFile::new(IceVersion::V4);
    ice.group2_files.push(DataFile::new("a.bin", b"secret payload").unwrap());
    let options = WriteOptions { compression: CompressOptions::kraken(5), encrypt: true };
    let source = write_archive(&ice, options);

    let mut repacked = Vec::new();
    icepack::repack(
        &mut source.as_slice(),
        &mut repacked,
        IceVersion::V4,
        WriteOptions::default(),
    )
    .unwrap();

    let parsed = IceFile::read(&mut repacked.as_slice()).unwrap();
    assert!(!parsed.header.is_encrypted());
    assert_eq!(parsed.group2_files, ice.group2_files);
}

// ── Filesystem pack/unpack ───────────────────────────────────────────────────

#[test]
fn pack_then_unpack_directory_tree() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("input/group1")).unwrap();
    fs::write(root.join("input/group1/icon.dds"), b"icon bytes").unwrap();
    fs::write(root.join("input/model.aqp"), pseudo_random(500, 3)).unwrap();
    fs::write(root.join("input/table.bin"), b"table bytes").unwrap();

    let mut sink = fs::File::create(root.join("out.ice")).unwrap();
    let options = WriteOptions { compression: CompressOptions::kraken(3), encrypt: false };
    let (packed1, packed2) = pack(
        &mut sink,
        &[root.join("input")],
        IceVersion::V4,
        options,
        &[],
        &[],
    )
    .unwrap();
    assert_eq!(packed1.len(), 1);
    assert_eq!(packed2.len(), 2);
    drop(sink);

    let ice = IceFile::open(root.join("out.ice")).unwrap();
    let written = unpack(&ice, &root.join("extracted"), true, false).unwrap();
    assert_eq!(written.len(), 3);
    assert_eq!(
        fs::read(root.join("extracted/group1/icon.dds")).unwrap(),
        b"icon bytes"
    );
    assert_eq!(
        fs::read(root.join("extracted/group2/model.aqp")).unwrap(),
        pseudo_random(500, 3)
    );
}

#[test]
fn pack_with_no_files_is_invalid_input() {
    let mut sink = Vec::new();
    let err = pack(
        &mut sink,
        &[],
        IceVersion::V4,
        WriteOptions::default(),
        &[],
        &[],
    )
    .unwrap_err();
    assert!(matches!(err, IceError::InvalidInput(_)));
}

// ── Error paths ──────────────────────────────────────────────────────────────

#[test]
fn garbage_is_not_an_archive() {
    let bytes = b"PNG\x00not an ice archive at all........".to_vec();
    assert!(matches!(
        IceFile::read(&mut bytes.as_slice()),
        Err(IceError::NotAnArchive)
    ));
}

#[test]
fn truncated_archive_is_eof() {
    let mut ice = IceFile::new(IceVersion::V4);
    ice.group2_files.push(DataFile::new("a.bin", b"hello").unwrap());
    let bytes = write_archive(&ice, WriteOptions::default());

    for cut in [0x10, 0x40, 0x130, bytes.len() - 1] {
        assert!(matches!(
            IceFile::read(&mut &bytes[..cut]),
            Err(IceError::UnexpectedEof(_))
        ));
    }
}

#[test]
fn corrupt_record_count_is_malformed() {
    let mut ice = IceFile::new(IceVersion::V4);
    ice.group2_files.push(DataFile::new("a.bin", b"hello").unwrap());
    let mut bytes = write_archive(&ice, WriteOptions::default());

    // Bump group 2's file_count inside the plain group-headers region.
    let count_offset = 0x120 + 0x10 + 8;
    bytes[count_offset] = 2;
    let result = IceFile::read(&mut bytes.as_slice());
    assert!(matches!(
        result,
        Err(IceError::UnexpectedEof(_) | IceError::MalformedRecord(_))
    ));
}
