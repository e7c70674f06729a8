use crate::core::error::{Error, ErrorKind, Result};

/// Packed on-disk form of a field's physical location, stored as the
/// fixed 32-byte value half of a B-tree leaf record.
///
/// Layout: `file_id: u32, offset: u64, length: u64, flags: u32, reserved: [u8; 8]`.
/// The low byte of `flags` is the `FieldLocation` variant discriminator.
pub const FIELD_REF_SIZE: usize = 32;

const TAG_LOCAL: u8 = 0;
const TAG_REMOTE: u8 = 1;
const TAG_ADOPTED_FOREIGN: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRef {
    pub file_id: u32,
    pub offset: u64,
    pub length: u64,
    pub flags: u32,
}

impl FieldRef {
    pub fn local(file_id: u32, offset: u64, length: u64) -> Self {
        FieldRef { file_id, offset, length, flags: TAG_LOCAL as u32 }
    }

    pub fn remote(file_id: u32, offset: u64, length: u64) -> Self {
        FieldRef { file_id, offset, length, flags: TAG_REMOTE as u32 }
    }

    pub fn adopted_foreign(file_id: u32, offset: u64, length: u64) -> Self {
        FieldRef { file_id, offset, length, flags: TAG_ADOPTED_FOREIGN as u32 }
    }

    pub fn tag(&self) -> u8 {
        (self.flags & 0xFF) as u8
    }

    pub fn encode(&self) -> [u8; FIELD_REF_SIZE] {
        let mut buf = [0u8; FIELD_REF_SIZE];
        buf[0..4].copy_from_slice(&self.file_id.to_le_bytes());
        buf[4..12].copy_from_slice(&self.offset.to_le_bytes());
        buf[12..20].copy_from_slice(&self.length.to_le_bytes());
        buf[20..24].copy_from_slice(&self.flags.to_le_bytes());
        // buf[24..32] reserved, left zeroed
        buf
    }

    pub fn decode(buf: &[u8; FIELD_REF_SIZE]) -> Self {
        FieldRef {
            file_id: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            offset: u64::from_le_bytes(buf[4..12].try_into().unwrap()),
            length: u64::from_le_bytes(buf[12..20].try_into().unwrap()),
            flags: u32::from_le_bytes(buf[20..24].try_into().unwrap()),
        }
    }
}

/// Resolved field location: a `FieldRef` plus the path (or remote
/// endpoint) it resolves to via the owning database's `FileStore`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldLocation {
    Local { path: String, offset: u64, length: u64 },
    Remote { host: String, port: u16, path: String, offset: u64, length: u64 },
    AdoptedForeign { path: String, offset: u64, length: u64 },
    InMemory { bytes: Vec<u8> },
}

impl FieldLocation {
    pub fn length(&self) -> u64 {
        match self {
            FieldLocation::Local { length, .. }
            | FieldLocation::Remote { length, .. }
            | FieldLocation::AdoptedForeign { length, .. } => *length,
            FieldLocation::InMemory { bytes } => bytes.len() as u64,
        }
    }
}

/// A value object for retrieval: for each keyword, the admissible set
/// of values (possibly many, to be expanded by the schema).
#[derive(Debug, Clone, Default)]
pub struct Request {
    values: Vec<(String, Vec<String>)>,
}

impl Request {
    pub fn new() -> Self {
        Request { values: Vec::new() }
    }

    pub fn set(&mut self, keyword: impl Into<String>, values: Vec<String>) {
        let keyword = keyword.into();
        if let Some(entry) = self.values.iter_mut().find(|(k, _)| *k == keyword) {
            entry.1 = values;
        } else {
            self.values.push((keyword, values));
        }
    }

    pub fn get(&self, keyword: &str) -> Option<&[String]> {
        self.values.iter().find(|(k, _)| k == keyword).map(|(_, v)| v.as_slice())
    }

    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(k, _)| k.as_str())
    }
}

/// Parse a remote location path of the form `host:port:relative/path`,
/// the convention `FileStore` uses to embed remote endpoints in what is
/// otherwise just a path string (see spec.md §3 FieldLocation).
pub fn split_remote_path(stored: &str) -> Result<(String, u16, String)> {
    let mut parts = stored.splitn(3, ':');
    let host = parts.next().ok_or_else(|| Error::new(ErrorKind::Parse, "missing host in remote path"))?;
    let port: u16 = parts
        .next()
        .ok_or_else(|| Error::new(ErrorKind::Parse, "missing port in remote path"))?
        .parse()
        .map_err(|_| Error::new(ErrorKind::Parse, "invalid port in remote path"))?;
    let rest = parts.next().ok_or_else(|| Error::new(ErrorKind::Parse, "missing path in remote path"))?;
    Ok((host.to_string(), port, rest.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_ref_round_trips() {
        let fr = FieldRef::local(7, 1024, 256);
        let encoded = fr.encode();
        assert_eq!(encoded.len(), FIELD_REF_SIZE);
        let decoded = FieldRef::decode(&encoded);
        assert_eq!(fr, decoded);
        assert_eq!(decoded.tag(), 0);
    }
}
