//! Metadata information regarding the database and tracked information.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use enum_iterator::Sequence;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The kinds of database we can connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    Postgresql,
    Mysql,
}

impl DatabaseType {
    /// The name used when talking about this dialect, e.g. in prompts.
    pub fn dialect_name(self) -> &'static str {
        match self {
            DatabaseType::Postgresql => "PostgreSQL",
            DatabaseType::Mysql => "MySQL",
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseType::Postgresql => write!(f, "postgresql"),
            DatabaseType::Mysql => write!(f, "mysql"),
        }
    }
}

/// The scalar types we distinguish, across both supported dialects.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Sequence, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    Boolean,
    Integer,
    Float,
    Decimal,
    Text,
    Date,
    Time,
    Timestamp,
    TimestampWithTimeZone,
    Json,
    Uuid,
    Binary,
    Any,
}

impl ScalarType {
    /// Map a type name to a scalar type.
    ///
    /// Accepts both the `data_type` column of `information_schema.columns`
    /// (`character varying`, `timestamp without time zone`, `int`, `datetime`)
    /// and the type names reported by the drivers for result columns
    /// (`INT8`, `FLOAT8`, `BPCHAR`, `TIMESTAMPTZ`, `BIGINT UNSIGNED`).
    pub fn from_database_type(name: &str) -> ScalarType {
        let lowered = name.trim().to_lowercase();
        // drop length/precision arguments and the unsigned marker
        let base = lowered
            .split('(')
            .next()
            .unwrap_or_default()
            .trim_end_matches(" unsigned")
            .trim();

        match base {
            "bool" | "boolean" => ScalarType::Boolean,
            "int2" | "int4" | "int8" | "smallint" | "integer" | "int" | "bigint" | "tinyint"
            | "mediumint" | "serial" | "bigserial" | "smallserial" | "year" | "oid" => {
                ScalarType::Integer
            }
            "float4" | "float8" | "real" | "double precision" | "double" | "float" => {
                ScalarType::Float
            }
            "numeric" | "decimal" | "money" => ScalarType::Decimal,
            "text" | "varchar" | "character varying" | "char" | "character" | "bpchar"
            | "name" | "citext" | "tinytext" | "mediumtext" | "longtext" | "enum" | "set" => {
                ScalarType::Text
            }
            "date" => ScalarType::Date,
            "time" | "time without time zone" | "time with time zone" | "timetz" => {
                ScalarType::Time
            }
            "timestamp" | "timestamp without time zone" | "datetime" => ScalarType::Timestamp,
            "timestamptz" | "timestamp with time zone" => ScalarType::TimestampWithTimeZone,
            "json" | "jsonb" => ScalarType::Json,
            "uuid" => ScalarType::Uuid,
            "bytea" | "blob" | "tinyblob" | "mediumblob" | "longblob" | "binary" | "varbinary"
            | "bit" => ScalarType::Binary,
            _ => ScalarType::Any,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ScalarType::Integer | ScalarType::Float | ScalarType::Decimal
        )
    }

    pub fn is_temporal(self) -> bool {
        matches!(
            self,
            ScalarType::Date
                | ScalarType::Time
                | ScalarType::Timestamp
                | ScalarType::TimestampWithTimeZone
        )
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::Boolean => "boolean",
            ScalarType::Integer => "integer",
            ScalarType::Float => "float",
            ScalarType::Decimal => "decimal",
            ScalarType::Text => "text",
            ScalarType::Date => "date",
            ScalarType::Time => "time",
            ScalarType::Timestamp => "timestamp",
            ScalarType::TimestampWithTimeZone => "timestamp with time zone",
            ScalarType::Json => "json",
            ScalarType::Uuid => "uuid",
            ScalarType::Binary => "binary",
            ScalarType::Any => "any",
        };
        write!(f, "{name}")
    }
}

/// Mapping from a "table" name to its information.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct TablesInfo(pub BTreeMap<String, TableInfo>);

impl TablesInfo {
    pub fn empty() -> Self {
        TablesInfo(BTreeMap::new())
    }

    /// Look a table up by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&TableInfo> {
        let TablesInfo(tables) = self;
        tables
            .get(name)
            .or_else(|| tables.values().find(|t| t.table_name.eq_ignore_ascii_case(name)))
    }
}

/// Information about a database table (or any other kind of relation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TableInfo {
    pub schema_name: String,
    pub table_name: String,
    pub columns: BTreeMap<String, ColumnInfo>,
    #[serde(default)]
    pub foreign_relations: ForeignRelations,
}

impl TableInfo {
    /// Look a column up by name, ignoring case.
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns
            .get(name)
            .or_else(|| self.columns.values().find(|c| c.name.eq_ignore_ascii_case(name)))
    }
}

/// Can this column contain null values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub enum Nullable {
    #[default]
    Nullable,
    NonNullable,
}

/// Information about a database column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnInfo {
    pub name: String,
    pub r#type: ScalarType,
    #[serde(default)]
    pub nullable: Nullable,
}

/// A mapping from the name of a foreign key constraint to its value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ForeignRelations(pub BTreeMap<String, ForeignRelation>);

/// A foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ForeignRelation {
    pub foreign_table: String,
    pub column_mapping: BTreeMap<String, String>,
}

impl ForeignRelations {
    /// The local column names taking part in any foreign key.
    pub fn local_columns(&self) -> BTreeSet<&str> {
        let ForeignRelations(relations) = self;
        relations
            .values()
            .flat_map(|relation| relation.column_mapping.keys().map(String::as_str))
            .collect()
    }
}
