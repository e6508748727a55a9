use std::fs::OpenOptions;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Trait abstracting raw image read/write operations. The engine treats the
/// volume as a flat byte range; every transfer is exact-length or an error,
/// never a short count.
pub trait DiskIO {
    fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> io::Result<()>;
    fn write_at(&mut self, offset: u64, buffer: &[u8]) -> io::Result<()>;
}

/// DiskIO implementation backed by an image file on the host.
pub struct FileDisk {
    file: std::fs::File,
}

impl FileDisk {
    /// Open an existing image for read and update. The image is never
    /// created here; formatting is someone else's job.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { file })
    }
}

impl DiskIO for FileDisk {
    fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buffer)
    }

    fn write_at(&mut self, offset: u64, buffer: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buffer)
    }
}

/// In-memory disk for unit tests.
#[cfg(test)]
pub(crate) struct MemDisk {
    pub bytes: Vec<u8>,
}

#[cfg(test)]
impl DiskIO for MemDisk {
    fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> io::Result<()> {
        let start = offset as usize;
        let end = start + buffer.len();
        if end > self.bytes.len() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "read past image end"));
        }
        buffer.copy_from_slice(&self.bytes[start..end]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buffer: &[u8]) -> io::Result<()> {
        let start = offset as usize;
        let end = start + buffer.len();
        if end > self.bytes.len() {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "write past image end"));
        }
        self.bytes[start..end].copy_from_slice(buffer);
        Ok(())
    }
}
