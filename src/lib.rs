pub mod bpb;
pub mod dir;
pub mod disk;
pub mod fs;
pub mod table;

pub use crate::bpb::{BiosParamBlock, Geometry};
pub use crate::dir::{FileDate, FileTime};
pub use crate::disk::{DiskIO, FileDisk};
pub use crate::fs::{FatVolume, FileAttributes, FileInfo};

use thiserror::Error;

/// Failure modes of volume operations. Every operation either completes or
/// reports one of these; nothing is retried or swallowed.
#[derive(Debug, Error)]
pub enum VolumeError {
    /// A seek, read, or write against the image failed or was short. The
    /// on-disk state may be partially written if the failure happened in the
    /// middle of a multi-region write.
    #[error("volume I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// The boot sector, FAT, or root directory did not load at the expected
    /// size. Fatal to opening the volume.
    #[error("volume structure did not load: {0}")]
    CorruptVolume(&'static str),
    #[error("no such file in the root directory")]
    NotFound,
    #[error("a file with that name already exists")]
    AlreadyExists,
    #[error("root directory has no free entry")]
    DirectoryFull,
    #[error("not enough free clusters")]
    NoFreeSpace,
    /// A cluster walk hit an out-of-range index, a dangling free link, a bad
    /// cluster, or ran past the step bound; the FAT is cyclic or inconsistent.
    #[error("cluster chain is corrupt: {0}")]
    ChainCorruption(&'static str),
}

/// Short reads on structural regions mean the image is truncated or
/// mis-sized, not that the host I/O layer failed.
pub(crate) fn structural(region: &'static str, err: std::io::Error) -> VolumeError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        VolumeError::CorruptVolume(region)
    } else {
        VolumeError::Io(err)
    }
}
