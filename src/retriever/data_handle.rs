use std::io::{self, Read};

use crate::core::error::{Error, ErrorKind};
use crate::core::types::FieldLocation;
use crate::storage::data_file::DataHandle;

/// Streams the concatenated bytes of a list of resolved field
/// locations, in the order retrieval produced them (spec.md §4.7:
/// "the result is a single byte stream concatenating every matched
/// field, in schema-declared keyword order").
pub struct CompositeReader {
    locations: std::vec::IntoIter<FieldLocation>,
    current: Option<io::Cursor<Vec<u8>>>,
}

impl CompositeReader {
    pub fn new(locations: Vec<FieldLocation>) -> Self {
        CompositeReader { locations: locations.into_iter(), current: None }
    }

    fn load(location: FieldLocation) -> io::Result<Vec<u8>> {
        match location {
            FieldLocation::Local { path, offset, length } | FieldLocation::AdoptedForeign { path, offset, length } => {
                DataHandle::read_at(std::path::Path::new(&path), offset, length).map_err(to_io)
            }
            FieldLocation::InMemory { bytes } => Ok(bytes),
            FieldLocation::Remote { host, port, .. } => Err(to_io(Error::new(
                ErrorKind::NotImplemented,
                format!("remote field retrieval from {host}:{port} is not implemented"),
            ))),
        }
    }
}

fn to_io(e: Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}

impl Read for CompositeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if let Some(cursor) = self.current.as_mut() {
                let n = cursor.read(buf)?;
                if n > 0 {
                    return Ok(n);
                }
                self.current = None;
            }
            match self.locations.next() {
                None => return Ok(0),
                Some(location) => {
                    let bytes = Self::load(location)?;
                    self.current = Some(io::Cursor::new(bytes));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenates_in_memory_locations_in_order() {
        let locations = vec![
            FieldLocation::InMemory { bytes: b"abc".to_vec() },
            FieldLocation::InMemory { bytes: b"def".to_vec() },
        ];
        let mut reader = CompositeReader::new(locations);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abcdef");
    }
}
