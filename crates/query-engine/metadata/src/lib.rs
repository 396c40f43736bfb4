//! Metadata about the connected database and the shape of query results.

pub mod metadata;
