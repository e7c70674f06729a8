use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::key::Key;

/// Observed keyword -> value-set for all data keys stored under one
/// index, spec.md §4.2/§4.7: datum-level request expansion prunes
/// against these sets instead of enumerating the filesystem.
#[derive(Debug, Clone, Default)]
pub struct IndexAxis {
    values: HashMap<String, HashSet<String>>,
}

impl IndexAxis {
    pub fn new() -> Self {
        IndexAxis { values: HashMap::new() }
    }

    pub fn observe(&mut self, key: &Key) {
        for kw in key.keywords() {
            if let Some(v) = key.get(kw) {
                self.values.entry(kw.to_string()).or_default().insert(v.to_string());
            }
        }
    }

    pub fn values_for(&self, keyword: &str) -> Option<&HashSet<String>> {
        self.values.get(keyword)
    }

    pub fn as_map(&self) -> &HashMap<String, HashSet<String>> {
        &self.values
    }

    /// Axes aren't part of the bit-exact on-disk formats spec.md §3
    /// describes; they're this engine's own bookkeeping so retrieval can
    /// prune datum-level candidates without listing a directory
    /// (spec.md §4.2/§4.7). Persisted alongside the B-tree as
    /// `<fingerprint>.axis`: `u32 keyword_count; { len,bytes keyword;
    /// u32 value_count; { len,bytes value }* }*`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(IndexAxis::new());
        }
        let data = fs::read(path)?;
        decode(&data)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.encode())?;
        Ok(())
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(self.values.len() as u32).to_le_bytes());
        for (kw, vals) in &self.values {
            write_str(&mut buf, kw);
            buf.extend_from_slice(&(vals.len() as u32).to_le_bytes());
            for v in vals {
                write_str(&mut buf, v);
            }
        }
        buf
    }
}

fn write_str(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn read_str(data: &[u8], cursor: &mut usize) -> Result<String> {
    read_u32(data, cursor).and_then(|len| {
        let len = len as usize;
        if *cursor + len > data.len() {
            return Err(Error::new(ErrorKind::Parse, "truncated axis string"));
        }
        let s = String::from_utf8(data[*cursor..*cursor + len].to_vec())
            .map_err(|_| Error::new(ErrorKind::Parse, "axis string is not valid UTF-8"))?;
        *cursor += len;
        Ok(s)
    })
}

fn read_u32(data: &[u8], cursor: &mut usize) -> Result<u32> {
    if *cursor + 4 > data.len() {
        return Err(Error::new(ErrorKind::Parse, "truncated axis blob"));
    }
    let v = u32::from_le_bytes(data[*cursor..*cursor + 4].try_into().unwrap());
    *cursor += 4;
    Ok(v)
}

fn decode(data: &[u8]) -> Result<IndexAxis> {
    let mut cursor = 0usize;
    let kw_count = read_u32(data, &mut cursor)?;
    let mut values = HashMap::new();
    for _ in 0..kw_count {
        let kw = read_str(data, &mut cursor)?;
        let val_count = read_u32(data, &mut cursor)?;
        let mut set = HashSet::new();
        for _ in 0..val_count {
            set.insert(read_str(data, &mut cursor)?);
        }
        values.insert(kw, set);
    }
    Ok(IndexAxis { values })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::key::TypeRegistry;

    #[test]
    fn observe_accumulates_distinct_values() {
        let registry = TypeRegistry::new();
        let mut axis = IndexAxis::new();
        let mut k1 = Key::new();
        k1.set(&registry, "param", "2t").unwrap();
        let mut k2 = Key::new();
        k2.set(&registry, "param", "msl").unwrap();
        axis.observe(&k1);
        axis.observe(&k2);
        let values = axis.values_for("param").unwrap();
        assert!(values.contains("2t"));
        assert!(values.contains("msl"));
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.axis");
        let registry = TypeRegistry::new();
        let mut axis = IndexAxis::new();
        let mut k = Key::new();
        k.set(&registry, "param", "2t").unwrap();
        axis.observe(&k);
        axis.save(&path).unwrap();

        let reloaded = IndexAxis::load(&path).unwrap();
        assert!(reloaded.values_for("param").unwrap().contains("2t"));
    }
}
