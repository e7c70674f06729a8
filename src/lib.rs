//! Append-only catalogue engine for GRIB-like scientific fields
//! addressed by a semantic key (class, stream, date, time, param, ...)
//! rather than a path. A schema decomposes each key into a
//! database/index/datum hierarchy; an `Archiver` commits fields under
//! that hierarchy and a `Retriever` expands a request back into the
//! matching fields.

pub mod archiver;
pub mod core;
pub mod filestore;
pub mod index;
pub mod retriever;
pub mod schema;
pub mod session;
pub mod storage;
pub mod toc;
pub mod visitors;
