//! Metadata information regarding the database and tracked information.

pub mod database;
pub mod result;

// re-export without modules
pub use database::*;
pub use result::*;

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Identifies a database connection without carrying its credentials.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct ConnectionFingerprint(String);

impl ConnectionFingerprint {
    pub fn new(database_type: DatabaseType, connection_uri: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        database_type.hash(&mut hasher);
        connection_uri.hash(&mut hasher);
        ConnectionFingerprint(format!("{database_type}-{:016x}", hasher.finish()))
    }
}

impl fmt::Debug for ConnectionFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ConnectionFingerprint(fingerprint) = self;
        write!(f, "{fingerprint}")
    }
}

impl fmt::Display for ConnectionFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The tables and columns of one connection, as seen at `built_at`.
///
/// A snapshot is never modified after it is built; a refresh produces a new one.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize, JsonSchema)]
pub struct SchemaSnapshot {
    pub fingerprint: ConnectionFingerprint,
    pub database_type: DatabaseType,
    pub tables: TablesInfo,
    pub built_at: DateTime<Utc>,
}

impl SchemaSnapshot {
    pub fn new(
        fingerprint: ConnectionFingerprint,
        database_type: DatabaseType,
        tables: TablesInfo,
    ) -> Self {
        SchemaSnapshot {
            fingerprint,
            database_type,
            tables,
            built_at: Utc::now(),
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.get(name)
    }

    /// Does any table in the snapshot have a column with this name?
    pub fn has_column_anywhere(&self, name: &str) -> bool {
        let TablesInfo(tables) = &self.tables;
        tables.values().any(|table| table.column(name).is_some())
    }
}
