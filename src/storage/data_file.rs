use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::error::{Error, ErrorKind, Result};

/// Lustre/POSIX striping is an external collaborator (spec.md §1):
/// the engine calls it once per file create with `(stripe_size,
/// stripe_count)` and otherwise knows nothing about it.
pub trait StripingHint: Send + Sync {
    fn on_create(&self, path: &Path, stripe_size: u64, stripe_count: u32);
}

pub struct NoStriping;

impl StripingHint for NoStriping {
    fn on_create(&self, _path: &Path, _stripe_size: u64, _stripe_count: u32) {}
}

#[derive(Debug, Clone, Copy)]
pub enum HandleKind {
    Plain,
    LustreStriped { stripe_size: u64, stripe_count: u32 },
    /// Asynchronous I/O is not implemented by this core engine; it is
    /// surfaced to callers as `NotImplemented` rather than silently
    /// degraded to synchronous I/O (spec.md §9 open questions).
    Aio,
}

/// Append-only handle to a `.data` file plus random-access reads for
/// retrieval. One handle per archiver session per data path (spec.md
/// §4.6); any number of readers may open the same file independently.
pub struct DataHandle {
    pub path: PathBuf,
    file: File,
    offset: u64,
}

impl DataHandle {
    pub fn create_for_append(path: PathBuf, kind: HandleKind, striping: &Arc<dyn StripingHint>) -> Result<Self> {
        if matches!(kind, HandleKind::Aio) {
            return Err(Error::new(ErrorKind::NotImplemented, "asynchronous data handles are not implemented"));
        }
        let is_new = !path.exists();
        let file = OpenOptions::new().create(true).append(true).read(true).open(&path)?;
        let offset = file.metadata()?.len();
        if is_new {
            if let HandleKind::LustreStriped { stripe_size, stripe_count } = kind {
                striping.on_create(&path, stripe_size, stripe_count);
            }
        }
        Ok(DataHandle { path, file, offset })
    }

    /// Append `bytes`, returning `(offset, length)` of the write.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(u64, u64)> {
        let offset = self.offset;
        self.file.write_all(bytes)?;
        self.offset += bytes.len() as u64;
        Ok((offset, bytes.len() as u64))
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Random-access read via a read-only `mmap`, falling back to a
    /// plain seek+read when the slice falls outside the current file
    /// size (e.g. a concurrent writer hasn't synced yet).
    pub fn read_at(path: &Path, offset: u64, length: u64) -> Result<Vec<u8>> {
        let file = File::open(path)?;
        let end = offset.checked_add(length).ok_or_else(|| Error::new(ErrorKind::Parse, "field range overflows u64"))?;
        let file_len = file.metadata()?.len();
        if end > file_len {
            return Err(Error::new(ErrorKind::Parse, "field range extends past end of data file"));
        }
        if length == 0 {
            return Ok(Vec::new());
        }
        let map = unsafe { memmap2::Mmap::map(&file)? };
        Ok(map[offset as usize..end as usize].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_read_at_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.data");
        let striping: Arc<dyn StripingHint> = Arc::new(NoStriping);
        let mut handle = DataHandle::create_for_append(path.clone(), HandleKind::Plain, &striping).unwrap();
        let (o1, l1) = handle.append(b"hello").unwrap();
        let (o2, _l2) = handle.append(b"world!").unwrap();
        handle.sync().unwrap();
        assert_eq!(o1, 0);
        assert_eq!(o2, 5);
        assert_eq!(DataHandle::read_at(&path, o1, l1).unwrap(), b"hello");
        assert_eq!(DataHandle::read_at(&path, o2, 6).unwrap(), b"world!");
    }

    #[test]
    fn aio_handle_is_not_implemented() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.data");
        let striping: Arc<dyn StripingHint> = Arc::new(NoStriping);
        let err = DataHandle::create_for_append(path, HandleKind::Aio, &striping).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotImplemented);
    }
}
