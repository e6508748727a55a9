use std::fs;
use std::path::PathBuf;

use fatvol::dir::encode_timestamp;
use fatvol::{FatVolume, FileDisk, FileInfo, VolumeError};

const BYTES_PER_SECTOR: usize = 512;
const SECTORS_PER_CLUSTER: u8 = 1;
const RESERVED_SECTORS: u16 = 1;
const NUM_FATS: u8 = 2;
const ROOT_ENTRIES: u16 = 16;
const FAT_SECTORS: u16 = 1;
// 1 boot + 2 FAT + 1 root + 64 data sectors
const TOTAL_SECTORS: u16 = 68;
const DATA_CLUSTERS: u32 = 64;
// one FAT sector holds 256 entries; 2 are reserved by the format
const FREE_ENTRIES: u32 = 254;

fn image_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("fatvol_tests");
    fs::create_dir_all(&dir).unwrap();
    dir.join(format!("{name}.img"))
}

fn put_u16(image: &mut [u8], offset: usize, value: u16) {
    image[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(image: &mut [u8], offset: usize, value: u32) {
    image[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Lay out an empty FAT16 volume the way formatting tools do: boot sector,
/// identical FAT copies with the reserved head entries, zeroed root
/// directory and data region.
fn build_image(name: &str) -> PathBuf {
    let path = image_path(name);
    let mut image = vec![0u8; TOTAL_SECTORS as usize * BYTES_PER_SECTOR];

    image[0..3].copy_from_slice(&[0xEB, 0x3C, 0x90]);
    image[3..11].copy_from_slice(b"MSDOS5.0");
    put_u16(&mut image, 11, BYTES_PER_SECTOR as u16);
    image[13] = SECTORS_PER_CLUSTER;
    put_u16(&mut image, 14, RESERVED_SECTORS);
    image[16] = NUM_FATS;
    put_u16(&mut image, 17, ROOT_ENTRIES);
    put_u16(&mut image, 19, TOTAL_SECTORS);
    image[21] = 0xF8;
    put_u16(&mut image, 22, FAT_SECTORS);
    put_u16(&mut image, 24, 32);
    put_u16(&mut image, 26, 2);
    image[36] = 0x80;
    image[38] = 0x29;
    put_u32(&mut image, 39, 0x1234_5678);
    image[43..54].copy_from_slice(b"NO NAME    ");
    image[54..62].copy_from_slice(b"FAT16   ");
    image[510] = 0x55;
    image[511] = 0xAA;

    for copy in 0..NUM_FATS as usize {
        let fat = (RESERVED_SECTORS as usize + copy * FAT_SECTORS as usize) * BYTES_PER_SECTOR;
        put_u16(&mut image, fat, 0xFFF8);
        put_u16(&mut image, fat + 2, 0xFFFF);
    }

    fs::write(&path, &image).unwrap();
    path
}

fn clock_a() -> u32 {
    encode_timestamp(2024, 6, 1, 12, 30, 40)
}

fn clock_b() -> u32 {
    encode_timestamp(2025, 2, 14, 8, 5, 2)
}

fn open(path: &PathBuf) -> FatVolume<FileDisk> {
    FatVolume::open(FileDisk::open(path).unwrap(), clock_a).unwrap()
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

#[test]
fn open_derives_geometry() {
    let path = build_image("geometry");
    let volume = open(&path);
    let geometry = volume.geometry();
    assert_eq!(geometry.cluster_size, 512);
    assert_eq!(geometry.fat_entries, 256);
    assert_eq!(geometry.root_offset, 3 * 512);
    assert_eq!(geometry.first_data_sector, 4);
    assert_eq!(geometry.cluster_count, DATA_CLUSTERS);
    assert_eq!(volume.bpb().root_entry_count, ROOT_ENTRIES);
    assert_eq!(volume.free_clusters(), FREE_ENTRIES);
    assert!(volume.list().is_empty());
}

#[test]
fn open_rejects_garbage() {
    let path = image_path("garbage");
    fs::write(&path, vec![0u8; TOTAL_SECTORS as usize * BYTES_PER_SECTOR]).unwrap();
    let result = FatVolume::open(FileDisk::open(&path).unwrap(), clock_a);
    assert!(matches!(result, Err(VolumeError::CorruptVolume(_))));
}

#[test]
fn open_rejects_truncated_image() {
    let path = image_path("truncated");
    fs::write(&path, vec![0u8; 100]).unwrap();
    let result = FatVolume::open(FileDisk::open(&path).unwrap(), clock_a);
    assert!(matches!(result, Err(VolumeError::CorruptVolume("boot sector"))));
}

#[test]
fn create_and_read_round_trip_across_cluster_boundaries() {
    let path = build_image("roundtrip");
    let mut volume = open(&path);

    let sizes = [0usize, 1, 511, 512, 513, 1300, 2048, 5000];
    for (index, &size) in sizes.iter().enumerate() {
        let name = format!("FILE{index}.BIN");
        let content = pattern(size, index as u8);
        volume.create(&name, &content).unwrap();
        assert_eq!(volume.read(&name).unwrap(), content, "size {size}");
    }

    let clusters_used: u32 = sizes
        .iter()
        .map(|&size| (size.div_ceil(512)).max(1) as u32)
        .sum();
    assert_eq!(volume.free_clusters(), FREE_ENTRIES - clusters_used);
}

#[test]
fn zero_byte_file_still_reserves_one_cluster() {
    let path = build_image("zerobyte");
    let mut volume = open(&path);

    volume.create("EMPTY.DAT", &[]).unwrap();
    assert_eq!(volume.free_clusters(), FREE_ENTRIES - 1);
    assert_eq!(volume.read("EMPTY.DAT").unwrap(), Vec::<u8>::new());
    assert_eq!(volume.attributes("EMPTY.DAT").unwrap().size, 0);

    volume.delete("EMPTY.DAT").unwrap();
    assert_eq!(volume.free_clusters(), FREE_ENTRIES);
}

#[test]
fn end_to_end_scenario() {
    let path = build_image("scenario");
    let mut volume = open(&path);
    let content = pattern(1300, 7);

    volume.create("DATA.TXT", &content).unwrap();
    // ceil(1300 / 512) = 3 clusters
    assert_eq!(volume.free_clusters(), FREE_ENTRIES - 3);

    let listing = volume.list();
    assert_eq!(listing, vec![FileInfo { name: "DATA.TXT".into(), size: 1300 }]);

    let read_back = volume.read("DATA.TXT").unwrap();
    assert_eq!(read_back.len(), 1300);
    assert_eq!(read_back, content);

    volume.delete("DATA.TXT").unwrap();
    assert!(volume.list().is_empty());
    assert_eq!(volume.free_clusters(), FREE_ENTRIES);

    // the released clusters reallocate cleanly
    volume.create("DATA2.TXT", &content).unwrap();
    assert_eq!(volume.free_clusters(), FREE_ENTRIES - 3);
    assert_eq!(volume.read("DATA2.TXT").unwrap(), content);
}

#[test]
fn create_rejects_duplicates() {
    let path = build_image("duplicate");
    let mut volume = open(&path);

    volume.create("SAME.TXT", b"one").unwrap();
    let free_before = volume.free_clusters();
    assert!(matches!(volume.create("same.txt", b"two"), Err(VolumeError::AlreadyExists)));
    assert_eq!(volume.free_clusters(), free_before);
    assert_eq!(volume.read("SAME.TXT").unwrap(), b"one");
}

#[test]
fn create_fails_when_directory_is_full() {
    let path = build_image("dirfull");
    let mut volume = open(&path);

    for index in 0..ROOT_ENTRIES {
        volume.create(&format!("F{index}.TXT"), b"x").unwrap();
    }
    assert!(matches!(volume.create("LAST.TXT", b"x"), Err(VolumeError::DirectoryFull)));
    assert_eq!(volume.list().len(), ROOT_ENTRIES as usize);
}

#[test]
fn create_without_free_clusters_rolls_back() {
    let path = build_image("nospace");
    let mut volume = open(&path);

    // one more cluster than the table can hand out
    let oversized = vec![0xABu8; (FREE_ENTRIES as usize + 1) * 512];
    assert!(matches!(volume.create("BIG.BIN", &oversized), Err(VolumeError::NoFreeSpace)));
    assert_eq!(volume.free_clusters(), FREE_ENTRIES);
    assert!(volume.list().is_empty());

    // the rollback left the table usable
    volume.create("SMALL.BIN", b"fits").unwrap();
    assert_eq!(volume.read("SMALL.BIN").unwrap(), b"fits");
}

#[test]
fn delete_then_lookup_fails() {
    let path = build_image("delete");
    let mut volume = open(&path);

    volume.create("GONE.TXT", b"short lived").unwrap();
    volume.delete("GONE.TXT").unwrap();

    assert!(matches!(volume.read("GONE.TXT"), Err(VolumeError::NotFound)));
    assert!(matches!(volume.delete("GONE.TXT"), Err(VolumeError::NotFound)));
    assert!(matches!(volume.attributes("GONE.TXT"), Err(VolumeError::NotFound)));
}

#[test]
fn deleted_slot_is_reused_first() {
    let path = build_image("slotreuse");
    let mut volume = open(&path);

    volume.create("A.TXT", b"aaa").unwrap();
    volume.create("B.TXT", b"bbb").unwrap();
    volume.delete("A.TXT").unwrap();
    volume.create("C.TXT", b"ccc").unwrap();

    // listing follows slot order, so C landed in A's old slot
    let names: Vec<String> = volume.list().into_iter().map(|f| f.name).collect();
    assert_eq!(names, vec!["C.TXT".to_string(), "B.TXT".to_string()]);
}

#[test]
fn rename_moves_the_name_and_keeps_content() {
    let path = build_image("rename");
    let mut volume = open(&path);

    volume.create("OLD.TXT", b"rename me").unwrap();
    volume.rename("OLD.TXT", "NEW.TXT").unwrap();

    assert!(matches!(volume.read("OLD.TXT"), Err(VolumeError::NotFound)));
    assert_eq!(volume.read("NEW.TXT").unwrap(), b"rename me");
}

#[test]
fn rename_rejects_collisions_and_leaves_entries_alone() {
    let path = build_image("renameclash");
    let mut volume = open(&path);

    volume.create("A.TXT", b"aaa").unwrap();
    volume.create("B.TXT", b"bbb").unwrap();

    assert!(matches!(volume.rename("A.TXT", "B.TXT"), Err(VolumeError::AlreadyExists)));
    assert_eq!(volume.read("A.TXT").unwrap(), b"aaa");
    assert_eq!(volume.read("B.TXT").unwrap(), b"bbb");

    assert!(matches!(volume.rename("MISSING.TXT", "X.TXT"), Err(VolumeError::NotFound)));
}

#[test]
fn rename_to_own_name_is_rejected() {
    let path = build_image("selfrename");
    let mut volume = open(&path);

    volume.create("SELF.TXT", b"self").unwrap();
    // the collision scan does not exclude the source entry
    assert!(matches!(volume.rename("SELF.TXT", "self.txt"), Err(VolumeError::AlreadyExists)));
    assert_eq!(volume.read("SELF.TXT").unwrap(), b"self");
}

#[test]
fn rename_refreshes_the_modification_stamp() {
    let path = build_image("renamestamp");

    let mut volume = open(&path);
    volume.create("STAMP.TXT", b"stamped").unwrap();
    drop(volume.close());

    let mut volume = FatVolume::open(FileDisk::open(&path).unwrap(), clock_b).unwrap();
    volume.rename("STAMP.TXT", "STAMP2.TXT").unwrap();

    let attributes = volume.attributes("STAMP2.TXT").unwrap();
    let created = attributes.created_date;
    let modified = attributes.modified_date;
    assert_eq!((created.year(), created.month(), created.day()), (2024, 6, 1));
    assert_eq!((modified.year(), modified.month(), modified.day()), (2025, 2, 14));
    assert_eq!(attributes.modified_time.hours(), 8);
    assert_eq!(attributes.modified_time.seconds(), 2);
}

#[test]
fn attributes_decode_stamps_and_flags() {
    let path = build_image("attributes");
    let mut volume = open(&path);

    volume.create("META.BIN", &pattern(700, 3)).unwrap();
    let attributes = volume.attributes("META.BIN").unwrap();

    assert_eq!(attributes.name, "META.BIN");
    assert_eq!(attributes.size, 700);
    assert!(attributes.archive);
    assert!(!attributes.read_only);
    assert!(!attributes.hidden);
    assert!(!attributes.system);

    let date = attributes.created_date;
    let time = attributes.created_time;
    assert_eq!((date.year(), date.month(), date.day()), (2024, 6, 1));
    assert_eq!((time.hours(), time.minutes(), time.seconds()), (12, 30, 40));
    assert_eq!(attributes.modified_date, attributes.created_date);
    assert_eq!(attributes.accessed_date, attributes.created_date);
}

#[test]
fn state_survives_reopen() {
    let path = build_image("persistence");

    {
        let mut volume = open(&path);
        volume.create("KEEP.BIN", &pattern(1500, 9)).unwrap();
        drop(volume.close());
    }

    let mut volume = FatVolume::open_path(&path).unwrap();
    assert_eq!(volume.read("KEEP.BIN").unwrap(), pattern(1500, 9));
    assert_eq!(volume.free_clusters(), FREE_ENTRIES - 3);
}

#[test]
fn fat_copies_stay_identical_on_disk() {
    let path = build_image("fatcopies");
    let mut volume = open(&path);
    volume.create("TWIN.BIN", &pattern(900, 1)).unwrap();
    drop(volume.close());

    let image = fs::read(&path).unwrap();
    let fat0 = &image[512..1024];
    let fat1 = &image[1024..1536];
    assert_eq!(fat0, fat1);
}

#[test]
fn read_reports_chain_cycles() {
    let path = build_image("cycle");
    let mut volume = open(&path);
    volume.create("LOOP.BIN", &pattern(600, 5)).unwrap();
    drop(volume.close());

    // point the second cluster of the chain back at itself in FAT copy 0:
    // the file starts at cluster 2, so its second cluster is 3
    let mut image = fs::read(&path).unwrap();
    let entry_offset = 512 + 3 * 2;
    image[entry_offset..entry_offset + 2].copy_from_slice(&3u16.to_le_bytes());
    fs::write(&path, &image).unwrap();

    let mut volume = open(&path);
    assert!(matches!(volume.read("LOOP.BIN"), Err(VolumeError::ChainCorruption(_))));
}

#[test]
fn read_reports_dangling_chains() {
    let path = build_image("dangling");
    let mut volume = open(&path);
    volume.create("DANGLE.BIN", &pattern(600, 6)).unwrap();
    drop(volume.close());

    // free the second cluster out from under the file
    let mut image = fs::read(&path).unwrap();
    let entry_offset = 512 + 3 * 2;
    image[entry_offset..entry_offset + 2].copy_from_slice(&0u16.to_le_bytes());
    fs::write(&path, &image).unwrap();

    let mut volume = open(&path);
    assert!(matches!(volume.read("DANGLE.BIN"), Err(VolumeError::ChainCorruption(_))));
}
