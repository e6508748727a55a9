use std::path::Path;

use crate::bpb::{BiosParamBlock, Geometry};
use crate::dir::{
    decode_timestamp, short_name, system_clock, DirEntry, FileDate, FileTime, RootDirectory,
    ATTR_ARCHIVE, ATTR_HIDDEN, ATTR_READ_ONLY, ATTR_SYSTEM,
};
use crate::disk::{DiskIO, FileDisk};
use crate::table::AllocationTable;
use crate::{structural, VolumeError};

/// One root-directory file as the listing reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub size: u32,
}

/// Decoded metadata of a single file.
#[derive(Debug, Clone)]
pub struct FileAttributes {
    pub name: String,
    pub size: u32,
    pub read_only: bool,
    pub hidden: bool,
    pub system: bool,
    pub archive: bool,
    pub created_date: FileDate,
    pub created_time: FileTime,
    pub modified_date: FileDate,
    pub modified_time: FileTime,
    pub accessed_date: FileDate,
}

/// A mounted FAT16 volume: the open image, its geometry, and in-memory
/// mirrors of the FAT and the root directory. One session owns a volume;
/// nothing here locks the image against a second opener, and a
/// multi-threaded host must serialize calls against one volume externally.
///
/// Every mutating operation persists the affected tables before returning,
/// so the image tracks the in-memory state operation by operation.
pub struct FatVolume<D: DiskIO> {
    disk: D,
    bpb: BiosParamBlock,
    geometry: Geometry,
    table: AllocationTable,
    root: RootDirectory,
    clock: fn() -> u32,
}

impl FatVolume<FileDisk> {
    /// Open an image file on the host, stamping mutations with the system
    /// clock.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, VolumeError> {
        let disk = FileDisk::open(path)?;
        FatVolume::open(disk, system_clock)
    }
}

impl<D: DiskIO> FatVolume<D> {
    /// Load the boot sector, the FAT, and the root directory, and derive
    /// the volume geometry. `clock` reports seconds since 1980-01-01 and
    /// stamps create/rename times.
    pub fn open(mut disk: D, clock: fn() -> u32) -> Result<Self, VolumeError> {
        let mut sector = [0u8; 512];
        disk.read_at(0, &mut sector)
            .map_err(|err| structural("boot sector", err))?;
        let bpb = BiosParamBlock::parse(&sector)?;
        let geometry = bpb.geometry();
        let table = AllocationTable::load(&mut disk, &geometry)?;
        let root = RootDirectory::load(&mut disk, &geometry)?;

        log::info!(
            "volume open: {} bytes/sector, {} sectors/cluster, {} FAT copies, {} root entries, first data sector {}, {} data clusters",
            geometry.bytes_per_sector,
            geometry.sectors_per_cluster,
            geometry.fat_copies,
            geometry.root_entry_count,
            geometry.first_data_sector,
            geometry.cluster_count,
        );

        Ok(Self { disk, bpb, geometry, table, root, clock })
    }

    pub fn bpb(&self) -> &BiosParamBlock {
        &self.bpb
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Clusters currently free in the allocation table.
    pub fn free_clusters(&self) -> u32 {
        self.table.free_clusters()
    }

    /// Every regular file in the root directory, in slot order.
    pub fn list(&self) -> Vec<FileInfo> {
        self.root
            .regular_entries()
            .map(|entry| FileInfo { name: entry.full_name(), size: entry.size() })
            .collect()
    }

    /// Full content of a file. A zero-size entry yields empty content
    /// without touching its chain; otherwise the chain is walked and only
    /// `size` bytes are emitted, dropping the final cluster's tail.
    pub fn read(&mut self, name: &str) -> Result<Vec<u8>, VolumeError> {
        let index = self.root.find(name).ok_or(VolumeError::NotFound)?;
        let entry = *self.root.entry(index);
        let size = entry.size() as usize;
        if size == 0 {
            return Ok(Vec::new());
        }

        let chain = self.table.walk(entry.first_cluster())?;
        let cluster_size = self.geometry.cluster_size as usize;
        let mut content = Vec::with_capacity(size);
        let mut block = vec![0u8; cluster_size];
        for &cluster in &chain {
            if content.len() >= size {
                break;
            }
            self.disk.read_at(self.geometry.cluster_offset(cluster), &mut block)?;
            let wanted = cluster_size.min(size - content.len());
            content.extend_from_slice(&block[..wanted]);
        }
        Ok(content)
    }

    /// Decoded timestamps and attribute flags for one file.
    pub fn attributes(&self, name: &str) -> Result<FileAttributes, VolumeError> {
        let index = self.root.find(name).ok_or(VolumeError::NotFound)?;
        let entry = self.root.entry(index);
        let (created_date, created_time) = entry.create_stamp();
        let (modified_date, modified_time) = entry.modify_stamp();
        let attributes = entry.attributes();
        Ok(FileAttributes {
            name: entry.full_name(),
            size: entry.size(),
            read_only: attributes & ATTR_READ_ONLY != 0,
            hidden: attributes & ATTR_HIDDEN != 0,
            system: attributes & ATTR_SYSTEM != 0,
            archive: attributes & ATTR_ARCHIVE != 0,
            created_date,
            created_time,
            modified_date,
            modified_time,
            accessed_date: entry.access_date(),
        })
    }

    /// Give a file a new name and refresh its modification stamp. The
    /// collision scan does not exclude the source entry, so renaming a file
    /// to its own normalized name is rejected too.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), VolumeError> {
        let index = self.root.find(old).ok_or(VolumeError::NotFound)?;
        if self.root.find(new).is_some() {
            return Err(VolumeError::AlreadyExists);
        }

        let (stem, ext) = short_name(new);
        let (date, time) = decode_timestamp((self.clock)());
        let entry = self.root.entry_mut(index);
        entry.set_name(&stem, &ext);
        entry.touch_modified(date, time);
        self.root.persist(&mut self.disk)?;
        log::debug!("renamed {:?} to {:?}", old, new);
        Ok(())
    }

    /// Release a file's chain and mark its slot deleted.
    pub fn delete(&mut self, name: &str) -> Result<(), VolumeError> {
        let index = self.root.find(name).ok_or(VolumeError::NotFound)?;
        let first_cluster = self.root.entry(index).first_cluster();
        self.table.release(first_cluster);
        self.root.entry_mut(index).mark_deleted();
        self.flush()?;
        log::debug!("deleted {:?}", name);
        Ok(())
    }

    /// Store `content` as a new root-directory file. Data clusters land on
    /// disk before the FAT and the directory entry do, so a failure midway
    /// leaves no entry pointing at half-written content. A zero-byte file
    /// still reserves one cluster.
    pub fn create(&mut self, name: &str, content: &[u8]) -> Result<(), VolumeError> {
        if self.root.find(name).is_some() {
            return Err(VolumeError::AlreadyExists);
        }
        let slot = self.root.find_free_slot().ok_or(VolumeError::DirectoryFull)?;

        let cluster_size = self.geometry.cluster_size as usize;
        let needed = ((content.len() + cluster_size - 1) / cluster_size).max(1);
        let chain = self.table.allocate_chain(needed)?;

        let mut block = vec![0u8; cluster_size];
        for (slice_index, &cluster) in chain.iter().enumerate() {
            let start = (slice_index * cluster_size).min(content.len());
            let end = ((slice_index + 1) * cluster_size).min(content.len());
            block[..end - start].copy_from_slice(&content[start..end]);
            block[end - start..].fill(0);
            if let Err(err) = self.disk.write_at(self.geometry.cluster_offset(cluster), &block) {
                self.table.release(chain[0]);
                return Err(err.into());
            }
        }

        let (stem, ext) = short_name(name);
        let (date, time) = decode_timestamp((self.clock)());
        *self.root.entry_mut(slot) =
            DirEntry::new_file(&stem, &ext, chain[0], content.len() as u32, date, time);
        self.flush()?;
        log::debug!("created {:?} ({} bytes, {} clusters)", name, content.len(), chain.len());
        Ok(())
    }

    /// Persist the FAT (every copy) and the root directory together.
    pub fn flush(&mut self) -> Result<(), VolumeError> {
        self.table.persist(&mut self.disk)?;
        self.root.persist(&mut self.disk)?;
        Ok(())
    }

    /// Drop the in-memory tables and hand the image handle back. No flush
    /// happens here; every mutating operation already flushed.
    pub fn close(self) -> D {
        self.disk
    }
}
