use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::error::{Error, ErrorKind, Result};

/// Bidirectional table between file paths (or remote endpoint strings)
/// and compact integer IDs, spec.md §3/§4.3/§6.
///
/// Serialisation: `u32 count; { u32 id; u32 len; len bytes of path }*`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    read_only: bool,
    next_id: u32,
    id_to_path: BTreeMap<u32, String>,
    path_to_id: HashMap<String, u32>,
}

impl FileStore {
    pub fn new(dir: PathBuf, read_only: bool) -> Self {
        FileStore { dir, read_only, next_id: 0, id_to_path: BTreeMap::new(), path_to_id: HashMap::new() }
    }

    pub fn load(dir: PathBuf, blob_path: &Path, read_only: bool) -> Result<Self> {
        if !blob_path.exists() {
            return Ok(Self::new(dir, read_only));
        }
        let data = fs::read(blob_path)?;
        Self::decode(dir, &data, read_only)
    }

    pub fn save(&self, blob_path: &Path) -> Result<()> {
        if self.read_only {
            return Err(Error::new(ErrorKind::InvalidState, "FileStore is read-only"));
        }
        fs::write(blob_path, self.encode())?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_path.is_empty()
    }

    /// Idempotent, O(log n) via the reverse map.
    pub fn insert(&mut self, path: &Path) -> Result<u32> {
        let relative = self.relativize(path);
        self.insert_raw(relative)
    }

    /// Insert a raw stored string directly (e.g. a `host:port:path`
    /// remote endpoint) without path relativisation.
    pub fn insert_raw(&mut self, stored: String) -> Result<u32> {
        if self.read_only {
            return Err(Error::new(ErrorKind::InvalidState, "FileStore is read-only"));
        }
        if let Some(&id) = self.path_to_id.get(&stored) {
            return Ok(id);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.id_to_path.insert(id, stored.clone());
        self.path_to_id.insert(stored, id);
        Ok(id)
    }

    pub fn get(&self, id: u32) -> Option<PathBuf> {
        self.id_to_path.get(&id).map(|p| self.resolve(p))
    }

    pub fn get_raw(&self, id: u32) -> Option<&str> {
        self.id_to_path.get(&id).map(|s| s.as_str())
    }

    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.id_to_path.keys().copied()
    }

    fn relativize(&self, path: &Path) -> String {
        match path.strip_prefix(&self.dir) {
            Ok(rel) => rel.to_string_lossy().to_string(),
            Err(_) => path.to_string_lossy().to_string(),
        }
    }

    fn resolve(&self, stored: &str) -> PathBuf {
        let p = Path::new(stored);
        if p.is_absolute() { p.to_path_buf() } else { self.dir.join(p) }
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(self.id_to_path.len() as u32).to_le_bytes());
        for (id, path) in &self.id_to_path {
            buf.extend_from_slice(&id.to_le_bytes());
            let bytes = path.as_bytes();
            buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            buf.extend_from_slice(bytes);
        }
        buf
    }

    fn decode(dir: PathBuf, data: &[u8], read_only: bool) -> Result<Self> {
        fn read_u32(data: &[u8], cursor: &mut usize) -> Result<u32> {
            if *cursor + 4 > data.len() {
                return Err(Error::new(ErrorKind::Parse, "truncated FileStore blob"));
            }
            let v = u32::from_le_bytes(data[*cursor..*cursor + 4].try_into().unwrap());
            *cursor += 4;
            Ok(v)
        }

        let mut cursor = 0usize;
        let count = read_u32(data, &mut cursor)?;
        let mut id_to_path = BTreeMap::new();
        let mut path_to_id = HashMap::new();
        let mut next_id = 0u32;
        for _ in 0..count {
            let id = read_u32(data, &mut cursor)?;
            let len = read_u32(data, &mut cursor)? as usize;
            if cursor + len > data.len() {
                return Err(Error::new(ErrorKind::Parse, "truncated FileStore path"));
            }
            let s = String::from_utf8(data[cursor..cursor + len].to_vec())
                .map_err(|_| Error::new(ErrorKind::Parse, "FileStore path is not valid UTF-8"))?;
            cursor += len;
            next_id = next_id.max(id + 1);
            id_to_path.insert(id, s.clone());
            path_to_id.insert(s, id);
        }
        Ok(FileStore { dir, read_only, next_id, id_to_path, path_to_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent_and_relativizes() {
        let dir = PathBuf::from("/db/root");
        let mut fs_ = FileStore::new(dir.clone(), false);
        let id1 = fs_.insert(&dir.join("x.data")).unwrap();
        let id2 = fs_.insert(&dir.join("x.data")).unwrap();
        assert_eq!(id1, id2);
        assert_eq!(fs_.get_raw(id1), Some("x.data"));
        assert_eq!(fs_.get(id1), Some(dir.join("x.data")));
    }

    #[test]
    fn round_trips_through_bytes() {
        let dir = PathBuf::from("/db/root");
        let mut fs_ = FileStore::new(dir.clone(), false);
        fs_.insert(&dir.join("a.data")).unwrap();
        fs_.insert(&dir.join("b.data")).unwrap();
        let bytes = fs_.encode();
        let reloaded = FileStore::decode(dir, &bytes, true).unwrap();
        assert_eq!(reloaded.get_raw(0), Some("a.data"));
        assert_eq!(reloaded.get_raw(1), Some("b.data"));
        assert!(reloaded.insert_raw("c".into()).is_err());
    }
}
