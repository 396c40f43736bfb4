//! A small DVD-rental schema.

use std::collections::BTreeMap;

use query_engine_metadata::metadata::{
    ColumnInfo, ConnectionFingerprint, DatabaseType, ForeignRelation, ForeignRelations,
    Nullable, ScalarType, SchemaSnapshot, TableInfo, TablesInfo,
};

pub const RENTAL_CONNECTION_URI: &str = "memory://rental";

fn foreign_key(
    constraint: &str,
    foreign_table: &str,
    mapping: &[(&str, &str)],
) -> (String, ForeignRelation) {
    (
        constraint.to_string(),
        ForeignRelation {
            foreign_table: foreign_table.to_string(),
            column_mapping: mapping
                .iter()
                .map(|(local, foreign)| ((*local).to_string(), (*foreign).to_string()))
                .collect(),
        },
    )
}

fn table(
    schema_name: &str,
    table_name: &str,
    columns: &[(&str, ScalarType)],
    foreign_keys: Vec<(String, ForeignRelation)>,
) -> (String, TableInfo) {
    let columns = columns
        .iter()
        .map(|(name, scalar_type)| {
            (
                (*name).to_string(),
                ColumnInfo {
                    name: (*name).to_string(),
                    r#type: *scalar_type,
                    nullable: if name.ends_with("_id") {
                        Nullable::NonNullable
                    } else {
                        Nullable::Nullable
                    },
                },
            )
        })
        .collect();
    let foreign_relations = foreign_keys.into_iter().collect();
    (
        table_name.to_string(),
        TableInfo {
            schema_name: schema_name.to_string(),
            table_name: table_name.to_string(),
            columns,
            foreign_relations: ForeignRelations(foreign_relations),
        },
    )
}

/// Rentals, customers, payments and the film catalogue.
pub fn rental_schema(database_type: DatabaseType) -> SchemaSnapshot {
    use ScalarType::{Boolean, Date, Decimal, Integer, Text, Timestamp};

    let schema_name = match database_type {
        DatabaseType::Postgresql => "public",
        DatabaseType::Mysql => "sakila",
    };

    let tables: BTreeMap<String, TableInfo> = [
        table(
            schema_name,
            "rental",
            &[
                ("rental_id", Integer),
                ("rental_date", Timestamp),
                ("inventory_id", Integer),
                ("customer_id", Integer),
                ("return_date", Timestamp),
                ("staff_id", Integer),
                ("store_id", Integer),
            ],
            vec![
                foreign_key("rental_customer_id_fkey", "customer", &[("customer_id", "customer_id")]),
                foreign_key("rental_inventory_id_fkey", "inventory", &[("inventory_id", "inventory_id")]),
                foreign_key("rental_store_id_fkey", "store", &[("store_id", "store_id")]),
            ],
        ),
        table(
            schema_name,
            "customer",
            &[
                ("customer_id", Integer),
                ("store_id", Integer),
                ("first_name", Text),
                ("last_name", Text),
                ("email", Text),
                ("active", Boolean),
                ("create_date", Date),
            ],
            vec![foreign_key("customer_store_id_fkey", "store", &[("store_id", "store_id")])],
        ),
        table(
            schema_name,
            "payment",
            &[
                ("payment_id", Integer),
                ("customer_id", Integer),
                ("staff_id", Integer),
                ("rental_id", Integer),
                ("amount", Decimal),
                ("payment_date", Timestamp),
            ],
            vec![
                foreign_key("payment_customer_id_fkey", "customer", &[("customer_id", "customer_id")]),
                foreign_key("payment_rental_id_fkey", "rental", &[("rental_id", "rental_id")]),
            ],
        ),
        table(
            schema_name,
            "store",
            &[
                ("store_id", Integer),
                ("manager_staff_id", Integer),
                ("address_id", Integer),
            ],
            vec![],
        ),
        table(
            schema_name,
            "film",
            &[
                ("film_id", Integer),
                ("title", Text),
                ("release_year", Integer),
                ("rental_rate", Decimal),
                ("length", Integer),
                ("rating", Text),
            ],
            vec![],
        ),
        table(
            schema_name,
            "inventory",
            &[
                ("inventory_id", Integer),
                ("film_id", Integer),
                ("store_id", Integer),
            ],
            vec![
                foreign_key("inventory_film_id_fkey", "film", &[("film_id", "film_id")]),
                foreign_key("inventory_store_id_fkey", "store", &[("store_id", "store_id")]),
            ],
        ),
        table(
            schema_name,
            "category",
            &[("category_id", Integer), ("name", Text)],
            vec![],
        ),
        table(
            schema_name,
            "film_category",
            &[("film_id", Integer), ("category_id", Integer)],
            vec![
                foreign_key("film_category_film_id_fkey", "film", &[("film_id", "film_id")]),
                foreign_key(
                    "film_category_category_id_fkey",
                    "category",
                    &[("category_id", "category_id")],
                ),
            ],
        ),
    ]
    .into_iter()
    .collect();

    SchemaSnapshot::new(
        ConnectionFingerprint::new(database_type, RENTAL_CONNECTION_URI),
        database_type,
        TablesInfo(tables),
    )
}
