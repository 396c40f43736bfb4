//! Database connection settings.

use query_engine_metadata::metadata::DatabaseType;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::values::{ConnectionUri, Secret};

pub const DEFAULT_CONNECTION_URI_VARIABLE: &str = "NL_SQL_DATABASE_URL";

/// Database connection settings.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConnectionSettings {
    /// Which kind of database to connect to.
    pub db_type: DatabaseType,
    /// Connection string for the database.
    pub connection_uri: ConnectionUri,
    /// The schema whose tables are exposed. Defaults to `public` on
    /// PostgreSQL and to the connected database on MySQL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
}

impl DatabaseConnectionSettings {
    pub fn empty() -> Self {
        Self {
            db_type: DatabaseType::Postgresql,
            connection_uri: ConnectionUri(Secret::from_environment(
                DEFAULT_CONNECTION_URI_VARIABLE,
            )),
            schema_name: None,
        }
    }
}
