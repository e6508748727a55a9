use crate::bpb::Geometry;
use crate::disk::DiskIO;
use crate::{structural, VolumeError};

pub const ATTR_READ_ONLY: u8 = 0x01;
pub const ATTR_HIDDEN: u8 = 0x02;
pub const ATTR_SYSTEM: u8 = 0x04;
pub const ATTR_VOLUME_ID: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;

pub const DIR_ENTRY_SIZE: usize = 32;

/// Lead name byte of a slot that has never held an entry.
const LEAD_NEVER_USED: u8 = 0x00;
/// Lead name byte of a deleted entry; the rest of the slot is left as-is.
const LEAD_DELETED: u8 = 0xE5;

/// On-disk representation of a file in the root directory: a fixed 32-byte
/// record. Multi-byte fields are little-endian.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    name: [u8; 8],
    ext: [u8; 3],
    attributes: u8,
    reserved: u8,
    /// Fine resolution of creation time, in 10ms units. Unused here but
    /// preserved across rewrites.
    create_time_tenth: u8,
    create_time: FileTime,
    create_date: FileDate,
    access_date: FileDate,
    /// High half of the first cluster; always zero on FAT16.
    first_cluster_high: u16,
    modify_time: FileTime,
    modify_date: FileDate,
    first_cluster: u16,
    size: u32,
}

impl DirEntry {
    /// A fresh regular-file entry carrying the archive attribute and the
    /// same stamp on creation, modification, and access fields.
    pub fn new_file(
        name: &[u8; 8],
        ext: &[u8; 3],
        first_cluster: u16,
        size: u32,
        date: FileDate,
        time: FileTime,
    ) -> Self {
        Self {
            name: *name,
            ext: *ext,
            attributes: ATTR_ARCHIVE,
            reserved: 0,
            create_time_tenth: 0,
            create_time: time,
            create_date: date,
            access_date: date,
            first_cluster_high: 0,
            modify_time: time,
            modify_date: date,
            first_cluster,
            size,
        }
    }

    pub fn from_bytes(raw: &[u8; DIR_ENTRY_SIZE]) -> Self {
        let le16 = |at: usize| u16::from_le_bytes([raw[at], raw[at + 1]]);
        let mut name = [0u8; 8];
        name.copy_from_slice(&raw[0..8]);
        let mut ext = [0u8; 3];
        ext.copy_from_slice(&raw[8..11]);
        Self {
            name,
            ext,
            attributes: raw[11],
            reserved: raw[12],
            create_time_tenth: raw[13],
            create_time: FileTime(le16(14)),
            create_date: FileDate(le16(16)),
            access_date: FileDate(le16(18)),
            first_cluster_high: le16(20),
            modify_time: FileTime(le16(22)),
            modify_date: FileDate(le16(24)),
            first_cluster: le16(26),
            size: u32::from_le_bytes([raw[28], raw[29], raw[30], raw[31]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; DIR_ENTRY_SIZE] {
        let mut raw = [0u8; DIR_ENTRY_SIZE];
        raw[0..8].copy_from_slice(&self.name);
        raw[8..11].copy_from_slice(&self.ext);
        raw[11] = self.attributes;
        raw[12] = self.reserved;
        raw[13] = self.create_time_tenth;
        raw[14..16].copy_from_slice(&self.create_time.0.to_le_bytes());
        raw[16..18].copy_from_slice(&self.create_date.0.to_le_bytes());
        raw[18..20].copy_from_slice(&self.access_date.0.to_le_bytes());
        raw[20..22].copy_from_slice(&self.first_cluster_high.to_le_bytes());
        raw[22..24].copy_from_slice(&self.modify_time.0.to_le_bytes());
        raw[24..26].copy_from_slice(&self.modify_date.0.to_le_bytes());
        raw[26..28].copy_from_slice(&self.first_cluster.to_le_bytes());
        raw[28..32].copy_from_slice(&self.size.to_le_bytes());
        raw
    }

    pub fn is_never_used(&self) -> bool {
        self.name[0] == LEAD_NEVER_USED
    }

    pub fn is_deleted(&self) -> bool {
        self.name[0] == LEAD_DELETED
    }

    /// Free slots are claimable by create: never used or deleted.
    pub fn is_free(&self) -> bool {
        self.is_never_used() || self.is_deleted()
    }

    pub fn is_volume_label(&self) -> bool {
        self.attributes & ATTR_VOLUME_ID != 0
    }

    pub fn is_directory(&self) -> bool {
        self.attributes & ATTR_DIRECTORY != 0
    }

    /// Regular files are the only entries visible to lookup, listing, and
    /// the file operations.
    pub fn is_regular(&self) -> bool {
        !self.is_free() && !self.is_volume_label() && !self.is_directory()
    }

    /// Exact match on the 11 normalized name bytes.
    pub fn matches(&self, name: &[u8; 8], ext: &[u8; 3]) -> bool {
        self.name == *name && self.ext == *ext
    }

    pub fn full_name(&self) -> String {
        display_name(&self.name, &self.ext)
    }

    pub fn attributes(&self) -> u8 {
        self.attributes
    }

    pub fn first_cluster(&self) -> u16 {
        self.first_cluster
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn create_stamp(&self) -> (FileDate, FileTime) {
        (self.create_date, self.create_time)
    }

    pub fn modify_stamp(&self) -> (FileDate, FileTime) {
        (self.modify_date, self.modify_time)
    }

    pub fn access_date(&self) -> FileDate {
        self.access_date
    }

    pub fn set_name(&mut self, name: &[u8; 8], ext: &[u8; 3]) {
        self.name = *name;
        self.ext = *ext;
    }

    pub fn touch_modified(&mut self, date: FileDate, time: FileTime) {
        self.modify_date = date;
        self.modify_time = time;
    }

    /// Logical destruction: only the lead byte changes, the slot is not
    /// compacted away.
    pub fn mark_deleted(&mut self) {
        self.name[0] = LEAD_DELETED;
    }
}

/// Convert a free-form name into the fixed 8.3 uppercase, space-padded
/// form: split at the last period, truncate to 8 and 3 characters. Lossy
/// for longer inputs; only the normalized form round-trips.
pub fn short_name(input: &str) -> ([u8; 8], [u8; 3]) {
    let (stem, ext) = match input.rsplit_once('.') {
        Some(pair) => pair,
        None => (input, ""),
    };
    let mut short_stem = [0x20u8; 8];
    let mut short_ext = [0x20u8; 3];
    for (slot, byte) in short_stem.iter_mut().zip(stem.bytes()) {
        *slot = byte.to_ascii_uppercase();
    }
    for (slot, byte) in short_ext.iter_mut().zip(ext.bytes()) {
        *slot = byte.to_ascii_uppercase();
    }
    (short_stem, short_ext)
}

/// Human-readable form of a stored 8.3 name: padding trimmed, the period
/// reinserted only when the extension is non-empty.
pub fn display_name(name: &[u8; 8], ext: &[u8; 3]) -> String {
    let stem_len = name.iter().position(|&b| b == 0x20).unwrap_or(8);
    let ext_len = ext.iter().position(|&b| b == 0x20).unwrap_or(3);
    let mut readable = String::with_capacity(12);
    readable.push_str(&String::from_utf8_lossy(&name[..stem_len]));
    if ext_len > 0 {
        readable.push('.');
        readable.push_str(&String::from_utf8_lossy(&ext[..ext_len]));
    }
    readable
}

/// Packed FAT time: hours in bits 11-15, minutes in 5-10, 2-second units
/// in 0-4.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FileTime(u16);

impl FileTime {
    pub fn from_parts(hours: u8, minutes: u8, seconds: u8) -> Self {
        let packed = ((hours as u16) << 11) | ((minutes as u16 & 0x3f) << 5) | ((seconds as u16) >> 1);
        FileTime(packed)
    }

    pub fn hours(&self) -> u16 {
        self.0 >> 11
    }

    pub fn minutes(&self) -> u16 {
        (self.0 >> 5) & 0x3f
    }

    /// Seconds come back in the even granularity the format stores.
    pub fn seconds(&self) -> u16 {
        (self.0 & 0x1f) << 1
    }

    pub fn from_raw(raw: u16) -> Self {
        FileTime(raw)
    }

    pub fn raw(&self) -> u16 {
        self.0
    }
}

/// Packed FAT date: year offset from 1980 in bits 9-15, month in 5-8, day
/// in 0-4.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FileDate(u16);

impl FileDate {
    pub fn from_parts(year: u16, month: u8, day: u8) -> Self {
        let year_offset = if year >= 1980 { year - 1980 } else { 0 };
        let packed = ((year_offset & 0x7f) << 9) | ((month as u16 & 0xf) << 5) | (day as u16 & 0x1f);
        FileDate(packed)
    }

    pub fn year(&self) -> u16 {
        ((self.0 >> 9) & 0x7f) + 1980
    }

    pub fn month(&self) -> u16 {
        (self.0 >> 5) & 0xf
    }

    pub fn day(&self) -> u16 {
        self.0 & 0x1f
    }

    pub fn from_raw(raw: u16) -> Self {
        FileDate(raw)
    }

    pub fn raw(&self) -> u16 {
        self.0
    }
}

const DAYS_PER_QUADRENNIUM: u32 = 366 + 3 * 365;
const MONTH_DAYS: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Seconds since 1980-01-01 00:00:00 for the given calendar fields.
/// 1980 opens a leap quadrennium, so the scheme holds through 2099.
pub fn encode_timestamp(year: u16, month: u16, day: u16, hours: u16, minutes: u16, seconds: u16) -> u32 {
    let offset_years = (year.max(1980) - 1980) as u32;
    let mut days = (offset_years / 4) * DAYS_PER_QUADRENNIUM;
    let year_in_quad = offset_years % 4;
    if year_in_quad > 0 {
        days += 366 + (year_in_quad - 1) * 365;
    }
    let leap = year_in_quad == 0;
    for passed in 0..(month.saturating_sub(1) as usize).min(11) {
        days += MONTH_DAYS[passed];
        if passed == 1 && leap {
            days += 1;
        }
    }
    days += day.saturating_sub(1) as u32;
    days * 86_400 + hours as u32 * 3_600 + minutes as u32 * 60 + seconds as u32
}

/// Calendar fields for a seconds-since-1980 stamp, packed as FAT date and
/// time.
pub fn decode_timestamp(stamp: u32) -> (FileDate, FileTime) {
    let mut days = stamp / 86_400;
    let clock = stamp % 86_400;

    let quads = days / DAYS_PER_QUADRENNIUM;
    days %= DAYS_PER_QUADRENNIUM;
    let mut year_in_quad = 0;
    if days >= 366 {
        year_in_quad = 1 + (days - 366) / 365;
        days = (days - 366) % 365;
    }
    let year = 1980 + quads * 4 + year_in_quad;
    let leap = year_in_quad == 0;

    let mut month = 0usize;
    loop {
        let mut length = MONTH_DAYS[month];
        if month == 1 && leap {
            length += 1;
        }
        if days < length {
            break;
        }
        days -= length;
        month += 1;
    }

    let date = FileDate::from_parts(year as u16, month as u8 + 1, days as u8 + 1);
    let time = FileTime::from_parts(
        (clock / 3_600) as u8,
        ((clock / 60) % 60) as u8,
        (clock % 60) as u8,
    );
    (date, time)
}

/// Seconds between the Unix epoch and 1980-01-01, the FAT epoch.
const FAT_EPOCH_OFFSET: u64 = 315_532_800;

/// Current host time as seconds since 1980-01-01, the unit volume clocks
/// report in.
pub fn system_clock() -> u32 {
    match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs().saturating_sub(FAT_EPOCH_OFFSET) as u32,
        Err(_) => 0,
    }
}

/// In-memory mirror of the fixed-capacity root directory. Loaded and
/// persisted as one contiguous block at the offset the geometry computes.
pub struct RootDirectory {
    entries: Vec<DirEntry>,
    offset: u64,
}

impl RootDirectory {
    pub fn load<D: DiskIO>(disk: &mut D, geometry: &Geometry) -> Result<Self, VolumeError> {
        let capacity = geometry.root_entry_count as usize;
        let mut raw = vec![0u8; capacity * DIR_ENTRY_SIZE];
        disk.read_at(geometry.root_offset, &mut raw)
            .map_err(|err| structural("root directory", err))?;
        let entries = raw
            .chunks_exact(DIR_ENTRY_SIZE)
            .map(|chunk| {
                let mut block = [0u8; DIR_ENTRY_SIZE];
                block.copy_from_slice(chunk);
                DirEntry::from_bytes(&block)
            })
            .collect();
        Ok(Self { entries, offset: geometry.root_offset })
    }

    pub fn persist<D: DiskIO>(&self, disk: &mut D) -> Result<(), VolumeError> {
        let mut raw = Vec::with_capacity(self.entries.len() * DIR_ENTRY_SIZE);
        for entry in &self.entries {
            raw.extend_from_slice(&entry.to_bytes());
        }
        disk.write_at(self.offset, &raw)?;
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, index: usize) -> &DirEntry {
        &self.entries[index]
    }

    pub fn entry_mut(&mut self, index: usize) -> &mut DirEntry {
        &mut self.entries[index]
    }

    /// First regular entry matching the normalized name. Every slot is
    /// scanned: the table has fixed capacity, so a never-used slot does not
    /// terminate the search.
    pub fn find(&self, name: &str) -> Option<usize> {
        let (stem, ext) = short_name(name);
        self.entries
            .iter()
            .position(|entry| entry.is_regular() && entry.matches(&stem, &ext))
    }

    /// First never-used or deleted slot, in forward scan order.
    pub fn find_free_slot(&self) -> Option<usize> {
        self.entries.iter().position(|entry| entry.is_free())
    }

    pub fn regular_entries(&self) -> impl Iterator<Item = &DirEntry> {
        self.entries.iter().filter(|entry| entry.is_regular())
    }
}
