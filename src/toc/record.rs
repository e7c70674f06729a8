use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::error::{Error, ErrorKind, Result};

pub const RECORD_SIZE: usize = 4096;
const HEAD_SIZE: usize = 128;
const METADATA_SIZE: usize = 32;
const MARKER_SIZE: usize = 2;
pub const PAYLOAD_SIZE: usize = RECORD_SIZE - HEAD_SIZE - METADATA_SIZE - MARKER_SIZE;
const MARKER: [u8; MARKER_SIZE] = [0xFF, 0xFF];

pub const CURRENT_TAG_VERSION: u8 = 1;
pub const CURRENT_FDB_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Init,
    Index,
    Clear,
    Wipe,
    Sub,
}

impl Tag {
    fn to_byte(self) -> u8 {
        match self {
            Tag::Init => b't',
            Tag::Index => b'i',
            Tag::Clear => b'c',
            Tag::Wipe => b'w',
            Tag::Sub => b's',
        }
    }

    fn from_byte(b: u8) -> Option<Tag> {
        match b {
            b't' => Some(Tag::Init),
            b'i' => Some(Tag::Index),
            b'c' => Some(Tag::Clear),
            b'w' => Some(Tag::Wipe),
            b's' => Some(Tag::Sub),
            _ => None,
        }
    }
}

/// One fixed 4096-byte slot in a TOC file, spec.md §3: "Head (128B):
/// tag, tag_version, fdb_version, timestamp, pid, uid, hostname; then
/// 32 bytes of tag-specific metadata, a payload, and a 2-byte marker
/// `0xFFFF` that must terminate every valid record."
///
/// Head layout: tag:1, tag_version:1, reserved:2, fdb_version:4,
/// timestamp_secs:8, timestamp_micros:8, pid:4, uid:4, hostname:64,
/// reserved:32 = 128 bytes.
#[derive(Debug, Clone)]
pub struct TocRecord {
    pub tag: Tag,
    pub tag_version: u8,
    pub fdb_version: u32,
    pub timestamp_secs: i64,
    pub timestamp_micros: i64,
    pub pid: u32,
    pub uid: u32,
    pub hostname: String,
    pub metadata: [u8; METADATA_SIZE],
    pub payload: Vec<u8>,
}

impl TocRecord {
    pub fn new(tag: Tag, metadata: [u8; METADATA_SIZE], payload: Vec<u8>) -> Result<Self> {
        if payload.len() > PAYLOAD_SIZE {
            return Err(Error::new(ErrorKind::InvalidArgument, format!("TOC payload of {} bytes exceeds {PAYLOAD_SIZE}", payload.len())));
        }
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Ok(TocRecord {
            tag,
            tag_version: CURRENT_TAG_VERSION,
            fdb_version: CURRENT_FDB_VERSION,
            timestamp_secs: now.as_secs() as i64,
            timestamp_micros: now.subsec_micros() as i64,
            pid: std::process::id(),
            uid: current_uid(),
            hostname: hostname(),
            metadata,
            payload,
        })
    }

    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        let mut cursor = 0usize;

        buf[cursor] = self.tag.to_byte();
        cursor += 1;
        buf[cursor] = self.tag_version;
        cursor += 1;
        cursor += 2; // reserved

        buf[cursor..cursor + 4].copy_from_slice(&self.fdb_version.to_le_bytes());
        cursor += 4;

        buf[cursor..cursor + 8].copy_from_slice(&self.timestamp_secs.to_le_bytes());
        cursor += 8;
        buf[cursor..cursor + 8].copy_from_slice(&self.timestamp_micros.to_le_bytes());
        cursor += 8;

        buf[cursor..cursor + 4].copy_from_slice(&self.pid.to_le_bytes());
        cursor += 4;
        buf[cursor..cursor + 4].copy_from_slice(&self.uid.to_le_bytes());
        cursor += 4;

        let host_bytes = self.hostname.as_bytes();
        let n = host_bytes.len().min(64);
        buf[cursor..cursor + n].copy_from_slice(&host_bytes[..n]);
        cursor += 64;

        cursor += 32; // Head reserved tail
        debug_assert_eq!(cursor, HEAD_SIZE);

        buf[cursor..cursor + METADATA_SIZE].copy_from_slice(&self.metadata);
        cursor += METADATA_SIZE;

        let payload_len = self.payload.len().min(PAYLOAD_SIZE);
        buf[cursor..cursor + payload_len].copy_from_slice(&self.payload[..payload_len]);
        cursor += PAYLOAD_SIZE;

        buf[cursor..cursor + MARKER_SIZE].copy_from_slice(&MARKER);
        buf
    }

    /// Decodes one 4096-byte slot. Returns `Ok(None)` when the marker is
    /// absent or the tag byte is unrecognised *and* the caller has
    /// signalled (via `is_last_slot`) that this is the final slot in the
    /// file — a torn write from a process that died mid-append, which
    /// spec.md §4.5 says iteration should silently stop on. The same
    /// condition at any earlier slot is reported as `TocCorrupt`
    /// (spec.md §7), since valid records exist after it.
    pub fn decode(buf: &[u8; RECORD_SIZE], is_last_slot: bool) -> Result<Option<Self>> {
        let marker_ok = buf[RECORD_SIZE - MARKER_SIZE..] == MARKER;
        let tag = Tag::from_byte(buf[0]);

        if !marker_ok || tag.is_none() {
            if is_last_slot {
                return Ok(None);
            }
            return Err(Error::new(ErrorKind::TocCorrupt, "TOC record marker or tag invalid before end of file"));
        }
        let tag = tag.unwrap();

        let mut cursor = 1usize;
        let tag_version = buf[cursor];
        cursor += 1;
        cursor += 2; // reserved

        if tag_version > CURRENT_TAG_VERSION {
            return Err(Error::new(ErrorKind::TocVersionTooNew, format!("TOC record tag_version {tag_version} newer than supported {CURRENT_TAG_VERSION}")));
        }

        let fdb_version = u32::from_le_bytes(buf[cursor..cursor + 4].try_into().unwrap());
        cursor += 4;

        let timestamp_secs = i64::from_le_bytes(buf[cursor..cursor + 8].try_into().unwrap());
        cursor += 8;
        let timestamp_micros = i64::from_le_bytes(buf[cursor..cursor + 8].try_into().unwrap());
        cursor += 8;

        let pid = u32::from_le_bytes(buf[cursor..cursor + 4].try_into().unwrap());
        cursor += 4;
        let uid = u32::from_le_bytes(buf[cursor..cursor + 4].try_into().unwrap());
        cursor += 4;

        let host_end = buf[cursor..cursor + 64].iter().position(|&b| b == 0).map(|p| cursor + p).unwrap_or(cursor + 64);
        let hostname = String::from_utf8_lossy(&buf[cursor..host_end]).into_owned();
        cursor += 64;

        cursor += 32;
        debug_assert_eq!(cursor, HEAD_SIZE);

        let mut metadata = [0u8; METADATA_SIZE];
        metadata.copy_from_slice(&buf[cursor..cursor + METADATA_SIZE]);
        cursor += METADATA_SIZE;

        let payload = buf[cursor..cursor + PAYLOAD_SIZE].to_vec();

        Ok(Some(TocRecord {
            tag,
            tag_version,
            fdb_version,
            timestamp_secs,
            timestamp_micros,
            pid,
            uid,
            hostname,
            metadata,
            payload,
        }))
    }

    /// Human-readable timestamp for logging and TOC dumps; the raw
    /// `timestamp_secs`/`timestamp_micros` fields remain the on-disk
    /// source of truth.
    pub fn timestamp(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp(self.timestamp_secs, (self.timestamp_micros.max(0) as u32) * 1000).unwrap_or_default()
    }
}

fn current_uid() -> u32 {
    #[cfg(unix)]
    {
        unsafe { libc::getuid() }
    }
    #[cfg(not(unix))]
    {
        0
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_round_trips() {
        let rec = TocRecord::new(Tag::Index, [7u8; METADATA_SIZE], b"hello".to_vec()).unwrap();
        let encoded = rec.encode();
        assert_eq!(encoded.len(), RECORD_SIZE);
        let decoded = TocRecord::decode(&encoded, false).unwrap().unwrap();
        assert_eq!(decoded.tag, Tag::Index);
        assert_eq!(&decoded.payload[..5], b"hello");
        assert_eq!(decoded.metadata, [7u8; METADATA_SIZE]);
        assert!(decoded.timestamp().timestamp() > 0);
    }

    #[test]
    fn torn_write_at_last_slot_is_tolerated() {
        let buf = [0u8; RECORD_SIZE];
        let decoded = TocRecord::decode(&buf, true).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn torn_write_mid_file_is_corrupt() {
        let buf = [0u8; RECORD_SIZE];
        let err = TocRecord::decode(&buf, false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TocCorrupt);
    }

    #[test]
    fn future_tag_version_is_rejected() {
        let rec = TocRecord::new(Tag::Index, [0u8; METADATA_SIZE], vec![]).unwrap();
        let mut encoded = rec.encode();
        encoded[1] = CURRENT_TAG_VERSION + 1;
        let err = TocRecord::decode(&encoded, false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TocVersionTooNew);
    }
}
