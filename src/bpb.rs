use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::VolumeError;

/// The BPB fields occupy the first 62 bytes of the boot sector.
const BPB_SIZE: usize = 62;

/// Boot parameter block: the geometry snapshot stored in the first sector.
/// All multi-byte fields are little-endian on disk. Never mutated after
/// load; every offset the engine computes derives from these fields.
#[derive(Copy, Clone, Debug)]
pub struct BiosParamBlock {
    pub oem_name: [u8; 8],
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub root_entry_count: u16,
    pub total_sectors_16: u16,
    pub media_type: u8,
    pub fat_size_16: u16,
    pub sectors_per_track: u16,
    pub num_heads: u16,
    pub hidden_sectors: u32,
    pub total_sectors_32: u32,
    pub drive_number: u8,
    pub boot_signature: u8,
    pub volume_id: u32,
    pub volume_label: [u8; 11],
    pub fs_type: [u8; 8],
}

impl BiosParamBlock {
    /// Parse and validate a boot sector. The engine does not repair a
    /// damaged boot sector; anything syntactically off fails the open.
    pub fn parse(sector: &[u8]) -> Result<Self, VolumeError> {
        if sector.len() < BPB_SIZE {
            log::debug!("boot sector is {} bytes, expected at least {}", sector.len(), BPB_SIZE);
            return Err(VolumeError::CorruptVolume("boot sector shorter than the BPB"));
        }

        let mut cursor = Cursor::new(sector);
        let mut jmp_boot = [0u8; 3];
        cursor.read_exact(&mut jmp_boot)?;
        let mut oem_name = [0u8; 8];
        cursor.read_exact(&mut oem_name)?;

        let bpb = BiosParamBlock {
            oem_name,
            bytes_per_sector: cursor.read_u16::<LittleEndian>()?,
            sectors_per_cluster: cursor.read_u8()?,
            reserved_sectors: cursor.read_u16::<LittleEndian>()?,
            num_fats: cursor.read_u8()?,
            root_entry_count: cursor.read_u16::<LittleEndian>()?,
            total_sectors_16: cursor.read_u16::<LittleEndian>()?,
            media_type: cursor.read_u8()?,
            fat_size_16: cursor.read_u16::<LittleEndian>()?,
            sectors_per_track: cursor.read_u16::<LittleEndian>()?,
            num_heads: cursor.read_u16::<LittleEndian>()?,
            hidden_sectors: cursor.read_u32::<LittleEndian>()?,
            total_sectors_32: cursor.read_u32::<LittleEndian>()?,
            drive_number: cursor.read_u8()?,
            boot_signature: {
                cursor.read_u8()?; // reserved
                cursor.read_u8()?
            },
            volume_id: cursor.read_u32::<LittleEndian>()?,
            volume_label: {
                let mut label = [0u8; 11];
                cursor.read_exact(&mut label)?;
                label
            },
            fs_type: {
                let mut fs_type = [0u8; 8];
                cursor.read_exact(&mut fs_type)?;
                fs_type
            },
        };

        if jmp_boot[0] != 0xEB && jmp_boot[0] != 0xE9 {
            log::debug!("bad jump instruction 0x{:02X} at boot sector start", jmp_boot[0]);
            return Err(VolumeError::CorruptVolume("boot sector has no jump instruction"));
        }
        if bpb.bytes_per_sector == 0 {
            log::debug!("invalid bytes_per_sector: 0");
            return Err(VolumeError::CorruptVolume("bytes per sector is zero"));
        }
        if bpb.sectors_per_cluster == 0 {
            log::debug!("invalid sectors_per_cluster: 0");
            return Err(VolumeError::CorruptVolume("sectors per cluster is zero"));
        }
        if bpb.num_fats == 0 {
            log::debug!("invalid num_fats: 0 (expected 1 or 2)");
            return Err(VolumeError::CorruptVolume("volume carries no FAT copy"));
        }
        if bpb.root_entry_count == 0 {
            log::debug!("invalid root_entry_count: 0");
            return Err(VolumeError::CorruptVolume("root directory has no capacity"));
        }
        if bpb.fat_size_16 == 0 {
            log::debug!("invalid fat_size_16: 0");
            return Err(VolumeError::CorruptVolume("FAT size is zero"));
        }
        if bpb.total_sectors_16 == 0 && bpb.total_sectors_32 == 0 {
            log::debug!("both total sector fields are zero");
            return Err(VolumeError::CorruptVolume("volume reports zero sectors"));
        }

        Ok(bpb)
    }

    /// Total sector count; the 32-bit field is authoritative when the
    /// 16-bit one is zero.
    pub fn total_sectors(&self) -> u32 {
        if self.total_sectors_16 != 0 {
            self.total_sectors_16 as u32
        } else {
            self.total_sectors_32
        }
    }

    /// Derive every offset and count the engine needs. Pure arithmetic on
    /// the BPB fields; no I/O.
    pub fn geometry(&self) -> Geometry {
        let bytes_per_sector = self.bytes_per_sector as u32;
        let sectors_per_cluster = self.sectors_per_cluster as u32;
        let fat_size_sectors = self.fat_size_16 as u32;
        let root_entry_count = self.root_entry_count as u32;

        let fat_size_bytes = fat_size_sectors * bytes_per_sector;
        let root_dir_sectors =
            (root_entry_count * 32 + bytes_per_sector - 1) / bytes_per_sector;
        let root_start_sector =
            self.reserved_sectors as u32 + self.num_fats as u32 * fat_size_sectors;
        let first_data_sector = root_start_sector + root_dir_sectors;
        let total_sectors = self.total_sectors();
        let data_sectors = total_sectors.saturating_sub(first_data_sector);

        Geometry {
            bytes_per_sector,
            sectors_per_cluster,
            cluster_size: sectors_per_cluster * bytes_per_sector,
            fat_offset: self.reserved_sectors as u64 * bytes_per_sector as u64,
            fat_size_bytes,
            fat_copies: self.num_fats,
            fat_entries: fat_size_bytes / 2,
            root_offset: root_start_sector as u64 * bytes_per_sector as u64,
            root_entry_count,
            root_dir_sectors,
            first_data_sector,
            total_sectors,
            data_sectors,
            cluster_count: data_sectors / sectors_per_cluster,
        }
    }
}

/// Derived layout of one volume: byte offsets and counts for the FAT
/// copies, the root directory, and the data region.
#[derive(Copy, Clone, Debug)]
pub struct Geometry {
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
    /// Bytes per cluster, the allocation granularity.
    pub cluster_size: u32,
    /// Byte offset of FAT copy 0.
    pub fat_offset: u64,
    pub fat_size_bytes: u32,
    pub fat_copies: u8,
    /// 16-bit entries per FAT copy.
    pub fat_entries: u32,
    /// Byte offset of the root directory, right after the last FAT copy.
    pub root_offset: u64,
    pub root_entry_count: u32,
    pub root_dir_sectors: u32,
    pub first_data_sector: u32,
    pub total_sectors: u32,
    pub data_sectors: u32,
    /// Data clusters addressable from cluster index 2.
    pub cluster_count: u32,
}

impl Geometry {
    /// Byte offset of FAT copy `copy`.
    pub fn fat_copy_offset(&self, copy: u8) -> u64 {
        self.fat_offset + copy as u64 * self.fat_size_bytes as u64
    }

    /// Byte offset of data cluster `cluster` (valid from index 2).
    pub fn cluster_offset(&self, cluster: u16) -> u64 {
        let sector = self.first_data_sector as u64
            + (cluster as u64 - 2) * self.sectors_per_cluster as u64;
        sector * self.bytes_per_sector as u64
    }
}
