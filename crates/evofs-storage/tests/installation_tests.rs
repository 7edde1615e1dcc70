//! End-to-end tests over installations written to temporary directories

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use evofs_formats::catalog::header::PACKING_CUTOVER_FILETIME;
use evofs_formats::fixtures::{CatalogBuilder, FixtureEntry, VolumeBuilder};
use evofs_formats::{Catalog, Codec, FormatVersion};
use evofs_storage::{ErrorKind, Layout, VfsConfig, VfsError, VirtualFileSystem, VolumeState};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use md5::{Digest, Md5};
use pretty_assertions::assert_eq;
use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

const CHUNK: u32 = 0x1000;

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + i / 0x100) as u8).collect()
}

/// Runs of 64 equal bytes, small enough under zlib and LZ4
fn compressible(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i / 64) as u8).collect()
}

fn md5_of(data: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(&Md5::digest(data));
    out
}

fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn lz4(data: &[u8]) -> Vec<u8> {
    let mut out = (data.len() as u32).to_le_bytes().to_vec();
    out.extend_from_slice(&lz4_flex::block::compress(data));
    out
}

fn write(dir: &Path, name: &str, data: &[u8]) {
    fs::write(dir.join(name), data).unwrap();
}

fn read_all(vfs: &VirtualFileSystem, name: &str) -> Vec<u8> {
    let mut reader = vfs.open_reader(name).unwrap();
    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    out
}

#[test]
fn store_entry_spanning_two_raw_chunks() {
    let dir = TempDir::new().unwrap();
    let data = payload(2 * CHUNK as usize);
    write(
        dir.path(),
        "game000.dat",
        &VolumeBuilder::new(CHUNK).raw_payload(&data).build().unwrap(),
    );
    write(
        dir.path(),
        "game.ndx",
        &CatalogBuilder::new()
            .codec(Codec::Store)
            .chunk_size(CHUNK)
            .entry("track/spain.bin", 0, 0x800, 0x1800)
            .build()
            .unwrap(),
    );

    let vfs = VirtualFileSystem::open(dir.path()).unwrap();
    let mut reader = vfs.open_reader("TRACK\\SPAIN.BIN").unwrap();

    let mut buf = vec![0u8; 0x1500];
    reader.read_exact(&mut buf).unwrap();
    assert_eq!(buf, data[0x800..0x1D00].to_vec());

    let mut rest = Vec::new();
    reader.read_to_end(&mut rest).unwrap();
    assert_eq!(rest, data[0x1D00..0x2000].to_vec());
}

#[test]
fn zlib_chunk_followed_by_raw_chunk() {
    let dir = TempDir::new().unwrap();
    let data = compressible(2 * CHUNK as usize);
    let first = zlib(&data[..CHUNK as usize]);
    assert!(first.len() < CHUNK as usize);

    write(
        dir.path(),
        "game000.dat",
        &VolumeBuilder::new(CHUNK)
            .chunk(first)
            .chunk(data[CHUNK as usize..].to_vec())
            .build()
            .unwrap(),
    );
    write(
        dir.path(),
        "game.ndx",
        &CatalogBuilder::new()
            .codec(Codec::Zlib)
            .chunk_size(CHUNK)
            .push(
                FixtureEntry::new("cars/f40.bin", 0, 0x10, 0x1FF0)
                    .with_checksum(md5_of(&data[0x10..])),
            )
            .build()
            .unwrap(),
    );

    let vfs = VirtualFileSystem::open(dir.path()).unwrap();
    assert_eq!(read_all(&vfs, "cars/f40.bin"), data[0x10..].to_vec());

    let out = TempDir::new().unwrap();
    let path = vfs.extract_file("cars/f40.bin", out.path()).unwrap();
    assert_eq!(fs::read(path).unwrap(), data[0x10..].to_vec());
}

#[test]
fn lz4_chunks_with_short_tail() {
    let dir = TempDir::new().unwrap();
    let data = compressible(0x2800);
    let chunks: Vec<Vec<u8>> = data.chunks(CHUNK as usize).map(lz4).collect();
    assert!(chunks.iter().all(|c| c.len() < CHUNK as usize));

    let mut volume = VolumeBuilder::new(CHUNK);
    for chunk in chunks {
        volume = volume.chunk(chunk);
    }
    write(dir.path(), "game000.dat", &volume.build().unwrap());
    write(
        dir.path(),
        "game.ndx",
        &CatalogBuilder::new()
            .codec(Codec::Lz4)
            .chunk_size(CHUNK)
            .entry("a.bin", 0, 0, 0x1000)
            .entry("b.bin", 0, 0x1000, 0x1800)
            .build()
            .unwrap(),
    );

    let vfs = VirtualFileSystem::open(dir.path()).unwrap();
    assert_eq!(read_all(&vfs, "a.bin"), data[..0x1000].to_vec());
    assert_eq!(read_all(&vfs, "b.bin"), data[0x1000..].to_vec());

    // Backward seek re-resolves an earlier chunk
    let mut reader = vfs.open_reader("b.bin").unwrap();
    reader.seek(SeekFrom::Start(0x1400)).unwrap();
    let mut tail = [0u8; 0x10];
    reader.read_exact(&mut tail).unwrap();
    reader.seek(SeekFrom::Start(0x20)).unwrap();
    let mut head = [0u8; 0x10];
    reader.read_exact(&mut head).unwrap();
    assert_eq!(&tail, &data[0x2400..0x2410]);
    assert_eq!(&head, &data[0x1020..0x1030]);
}

#[test]
fn flipped_payload_byte_fails_integrity() {
    let dir = TempDir::new().unwrap();
    let data = payload(CHUNK as usize);
    let volume = VolumeBuilder::new(CHUNK).raw_payload(&data);
    let data_base = volume.data_base() as usize;

    let mut bytes = volume.build().unwrap();
    bytes[data_base + 0x42] ^= 0xFF;
    write(dir.path(), "game000.dat", &bytes);
    write(
        dir.path(),
        "game.ndx",
        &CatalogBuilder::new()
            .chunk_size(CHUNK)
            .push(FixtureEntry::new("menu.bin", 0, 0, CHUNK).with_checksum(md5_of(&data)))
            .build()
            .unwrap(),
    );

    let out = TempDir::new().unwrap();
    let vfs = VirtualFileSystem::open_with_config(
        VfsConfig::new(dir.path()).with_verify_checksums(true),
    )
    .unwrap();
    let err = vfs.extract_file("menu.bin", out.path()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integrity);
    assert!(err.is_recoverable());
    assert!(!out.path().join("menu.bin").exists());

    let lenient = VirtualFileSystem::open_with_config(
        VfsConfig::new(dir.path()).with_verify_checksums(false),
    )
    .unwrap();
    let path = lenient.extract_file("menu.bin", out.path()).unwrap();
    assert_eq!(fs::read(path).unwrap()[0x42], data[0x42] ^ 0xFF);
}

#[test]
fn batch_leaves_no_file_for_checksum_mismatch() {
    let dir = TempDir::new().unwrap();
    let data = payload(CHUNK as usize);
    write(
        dir.path(),
        "game000.dat",
        &VolumeBuilder::new(CHUNK).raw_payload(&data).build().unwrap(),
    );
    write(
        dir.path(),
        "game.ndx",
        &CatalogBuilder::new()
            .chunk_size(CHUNK)
            .push(FixtureEntry::new("bad.bin", 0, 0, CHUNK).with_checksum([0x11; 16]))
            .push(FixtureEntry::new("good.bin", 0, 0, CHUNK).with_checksum(md5_of(&data)))
            .build()
            .unwrap(),
    );

    let out = TempDir::new().unwrap();
    let vfs = VirtualFileSystem::open_with_config(
        VfsConfig::new(dir.path()).with_verify_checksums(true),
    )
    .unwrap();
    let report = vfs.extract_all_to_directory(out.path()).unwrap();

    assert_eq!(report.extracted, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].name, "bad.bin");
    assert_eq!(report.skipped[0].kind, ErrorKind::Integrity);
    assert!(!out.path().join("bad.bin").exists());
    assert!(!out.path().join("bad.bin.partial").exists());
    assert_eq!(fs::read(out.path().join("good.bin")).unwrap(), data);
}

#[test]
fn batch_skips_missing_volume_and_unsafe_names() {
    let dir = TempDir::new().unwrap();
    let data = payload(CHUNK as usize);
    write(
        dir.path(),
        "game000.dat",
        &VolumeBuilder::new(CHUNK).raw_payload(&data).build().unwrap(),
    );
    write(
        dir.path(),
        "game.ndx",
        &CatalogBuilder::new()
            .chunk_size(CHUNK)
            .volume_count(2)
            .entry("audio/engine.bin", 0, 0, 0x100)
            .entry("audio/crowd.bin", 1, 0, 0x100)
            .entry("../escape.bin", 0, 0x100, 0x10)
            .entry("ui/hud.bin", 0, 0x200, 0x80)
            .build()
            .unwrap(),
    );

    let vfs = VirtualFileSystem::open(dir.path()).unwrap();
    let out = TempDir::new().unwrap();
    let report = vfs.extract_all_to_directory(out.path()).unwrap();

    assert_eq!(report.extracted, 2);
    assert_eq!(report.bytes_written, 0x180);
    assert!(!report.is_complete());

    let mut skipped: Vec<(&str, ErrorKind)> = report
        .skipped
        .iter()
        .map(|s| (s.name.as_str(), s.kind))
        .collect();
    skipped.sort_by(|a, b| a.0.cmp(b.0));
    assert_eq!(
        skipped,
        vec![
            ("../escape.bin", ErrorKind::InvalidPath),
            ("audio/crowd.bin", ErrorKind::NotFound),
        ]
    );

    assert_eq!(
        fs::read(out.path().join("audio/engine.bin")).unwrap(),
        data[..0x100].to_vec()
    );
    assert_eq!(
        fs::read(out.path().join("ui/hud.bin")).unwrap(),
        data[0x200..0x280].to_vec()
    );
    assert!(!out.path().join("audio/crowd.bin").exists());
    assert_eq!(vfs.volume_state(1), Some(VolumeState::Missing));
}

#[test]
fn extract_all_into_memory_sinks() {
    let dir = TempDir::new().unwrap();
    let data = payload(CHUNK as usize);
    write(
        dir.path(),
        "game000.dat",
        &VolumeBuilder::new(CHUNK).raw_payload(&data).build().unwrap(),
    );
    write(
        dir.path(),
        "game.ndx",
        &CatalogBuilder::new()
            .chunk_size(CHUNK)
            .entry("b.bin", 0, 0x10, 0x10)
            .entry("a.bin", 0, 0, 0x10)
            .build()
            .unwrap(),
    );

    let vfs = VirtualFileSystem::open(dir.path()).unwrap();
    let mut order = Vec::new();
    let report = vfs
        .extract_all(
            |entry| {
                order.push(entry.name.clone());
                Ok(Vec::new())
            },
            true,
        )
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.extracted, 2);
    assert_eq!(order, vec!["a.bin".to_string(), "b.bin".to_string()]);
}

#[test]
fn unknown_name_is_not_found() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "game.ndx",
        &CatalogBuilder::new().entry("a.bin", 0, 0, 1).build().unwrap(),
    );

    let vfs = VirtualFileSystem::open(dir.path()).unwrap();
    let err = vfs.open_reader("missing.bin").unwrap_err();
    assert!(matches!(err, VfsError::EntryNotFound(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let out = TempDir::new().unwrap();
    assert!(vfs.extract_file("missing.bin", out.path()).is_err());
    assert_eq!(vfs.volume_state(0), Some(VolumeState::Unopened));
}

#[test]
fn every_entry_is_found_by_name_and_hash() {
    let dir = TempDir::new().unwrap();
    let names: Vec<String> = (0..64).map(|i| format!("pack/{i:02}/data.bin")).collect();

    let mut builder = CatalogBuilder::new().volume_count(3);
    for (i, name) in names.iter().enumerate() {
        builder = builder.entry(name, (i % 3) as u16, (i as u64) * 0x40, 0x40);
    }
    write(dir.path(), "game.ndx", &builder.build().unwrap());

    let vfs = VirtualFileSystem::open(dir.path()).unwrap();
    let catalog = vfs.catalog();
    for name in &names {
        let entry = vfs.resolve(name).unwrap();
        assert_eq!(&entry.name, name);

        let hash = catalog.hash_name(name);
        let by_hash = catalog.find_by_hash(hash, entry.offset).unwrap();
        assert_eq!(by_hash, entry);
    }
    assert_eq!(vfs.list().len(), names.len());
}

#[test]
fn early_combined_data_file() {
    let dir = TempDir::new().unwrap();
    let chunk = 0x100;
    let data = payload(0x300);
    let catalog = CatalogBuilder::early()
        .chunk_size(chunk)
        .entry("boot.bin", 0, 0x80, 0x200)
        .build()
        .unwrap();
    write(
        dir.path(),
        "game.dat",
        &VolumeBuilder::new(chunk)
            .version(FormatVersion::Early)
            .raw_payload(&data)
            .embedded_catalog(catalog)
            .build()
            .unwrap(),
    );

    let vfs = VirtualFileSystem::open(dir.path()).unwrap();
    assert_eq!(vfs.layout(), Layout::Combined);
    assert_eq!(vfs.volume_count(), 1);
    assert_eq!(vfs.volume_path(0), dir.path().join("game.dat"));
    assert_eq!(vfs.catalog().header().version, FormatVersion::Early);

    let entry = vfs.resolve("boot.bin").unwrap();
    assert!(entry.checksum.is_none());
    assert_eq!(read_all(&vfs, "boot.bin"), data[0x80..0x280].to_vec());
}

#[test]
fn separate_catalog_wins_over_combined_file() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "game.ndx",
        &CatalogBuilder::new().entry("split.bin", 0, 0, 1).build().unwrap(),
    );
    write(dir.path(), "game.dat", b"not a volume");

    let vfs = VirtualFileSystem::open(dir.path()).unwrap();
    assert_eq!(vfs.layout(), Layout::Split);
    assert!(vfs.resolve("split.bin").is_ok());
}

#[test]
fn packing_follows_catalog_timestamp() {
    let raw = (0x40u64 << 16) | 1;

    let narrow = CatalogBuilder::new()
        .timestamp(PACKING_CUTOVER_FILETIME - 1)
        .raw_entry("x.bin", raw, 4, None)
        .build()
        .unwrap();
    let narrow_catalog = Catalog::parse(&narrow).unwrap();
    let entry = &narrow_catalog.entries()[0];
    assert_eq!((entry.volume_index, entry.offset), (1, 0x40 << 8));

    let wide = CatalogBuilder::new()
        .timestamp(PACKING_CUTOVER_FILETIME)
        .raw_entry("x.bin", raw, 4, None)
        .build()
        .unwrap();
    let wide_catalog = Catalog::parse(&wide).unwrap();
    let entry = &wide_catalog.entries()[0];
    assert_eq!((entry.volume_index, entry.offset), (1, 0x40));
}

#[test]
fn pre_cutover_installation_reads_high_volume() {
    let dir = TempDir::new().unwrap();
    let data = payload(CHUNK as usize);
    write(
        dir.path(),
        "game003.dat",
        &VolumeBuilder::new(CHUNK).raw_payload(&data).build().unwrap(),
    );
    write(
        dir.path(),
        "game.ndx",
        &CatalogBuilder::new()
            .timestamp(PACKING_CUTOVER_FILETIME - 1)
            .chunk_size(CHUNK)
            .volume_count(4)
            .entry("late.bin", 3, 0x300, 0x40)
            .build()
            .unwrap(),
    );

    let vfs = VirtualFileSystem::open(dir.path()).unwrap();
    assert_eq!(read_all(&vfs, "late.bin"), data[0x300..0x340].to_vec());
    assert_eq!(vfs.volume_state(3), Some(VolumeState::Open));
    assert_eq!(vfs.volume_state(0), Some(VolumeState::Unopened));
}

#[test]
fn readers_share_a_volume_across_threads() {
    let dir = TempDir::new().unwrap();
    let data = payload(8 * CHUNK as usize);
    write(
        dir.path(),
        "game000.dat",
        &VolumeBuilder::new(CHUNK).raw_payload(&data).build().unwrap(),
    );

    let mut builder = CatalogBuilder::new().chunk_size(CHUNK);
    for i in 0..8u64 {
        builder = builder.entry(&format!("slice{i}.bin"), 0, i * 0x1000 + 0x80, 0xF00);
    }
    write(dir.path(), "game.ndx", &builder.build().unwrap());

    let vfs = Arc::new(VirtualFileSystem::open(dir.path()).unwrap());
    let data = Arc::new(data);

    let handles: Vec<_> = (0..8u64)
        .map(|i| {
            let vfs = Arc::clone(&vfs);
            let data = Arc::clone(&data);
            thread::spawn(move || {
                let start = (i * 0x1000 + 0x80) as usize;
                for _ in 0..16 {
                    let got = read_all(&vfs, &format!("slice{i}.bin"));
                    assert_eq!(got, data[start..start + 0xF00].to_vec());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(vfs.volume_state(0), Some(VolumeState::Open));
}

#[test]
fn corrupt_catalog_refuses_to_open() {
    let dir = TempDir::new().unwrap();
    let mut catalog = CatalogBuilder::new().entry("a.bin", 0, 0, 1).build().unwrap();
    catalog.truncate(catalog.len() - 10);
    write(dir.path(), "game.ndx", &catalog);

    let err = VirtualFileSystem::open(dir.path()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Corruption);
}
