mod common;

use query_engine_execution::{
    introspect, DriverError, DriverErrorKind, Executor, SchemaCache, SchemaIntrospectionError,
};
use query_engine_metadata::metadata::{
    Column, ConnectionFingerprint, DatabaseType, ForeignRelations, Nullable, ScalarType,
    TablesInfo, Value,
};
use similar_asserts::assert_eq;
use tests_common::driver::MemoryDriver;

use common::executor;

fn text(cells: &[&str]) -> Vec<Value> {
    cells.iter().map(|cell| Value::Text((*cell).to_string())).collect()
}

fn catalog_driver() -> MemoryDriver {
    MemoryDriver::new(DatabaseType::Postgresql)
        .respond_to(
            "information_schema.columns",
            vec![
                Column::new("table_name", ScalarType::Text),
                Column::new("column_name", ScalarType::Text),
                Column::new("udt_name", ScalarType::Text),
                Column::new("is_nullable", ScalarType::Text),
            ],
            vec![
                text(&["customer", "customer_id", "int4", "NO"]),
                text(&["customer", "email", "varchar", "YES"]),
                text(&["rental", "rental_id", "int4", "NO"]),
                text(&["rental", "rental_date", "timestamp", "NO"]),
                text(&["rental", "customer_id", "int2", "NO"]),
            ],
        )
        .respond_to(
            "referential_constraints",
            vec![
                Column::new("constraint_name", ScalarType::Text),
                Column::new("table_name", ScalarType::Text),
                Column::new("column_name", ScalarType::Text),
                Column::new("foreign_table_name", ScalarType::Text),
                Column::new("foreign_column_name", ScalarType::Text),
            ],
            vec![text(&[
                "rental_customer_id_fkey",
                "rental",
                "customer_id",
                "customer",
                "customer_id",
            ])],
        )
}

fn fingerprint() -> ConnectionFingerprint {
    ConnectionFingerprint::new(DatabaseType::Postgresql, "memory://catalog")
}

#[tokio::test]
async fn catalog_rows_become_a_snapshot() {
    let driver = catalog_driver();
    let snapshot = introspect(&executor(&driver, 10), None, fingerprint())
        .await
        .unwrap();

    assert_eq!(snapshot.fingerprint, fingerprint());
    assert_eq!(snapshot.database_type, DatabaseType::Postgresql);
    let TablesInfo(tables) = &snapshot.tables;
    assert_eq!(
        tables.keys().cloned().collect::<Vec<_>>(),
        vec!["customer".to_string(), "rental".to_string()]
    );

    let rental = snapshot.table("RENTAL").unwrap();
    assert_eq!(rental.schema_name, "public");
    assert_eq!(
        rental.column("rental_date").unwrap().r#type,
        ScalarType::Timestamp
    );
    assert_eq!(
        rental.column("customer_id").unwrap().nullable,
        Nullable::NonNullable
    );
    let ForeignRelations(relations) = &rental.foreign_relations;
    assert_eq!(
        relations["rental_customer_id_fkey"]
            .column_mapping
            .get("customer_id")
            .map(String::as_str),
        Some("customer_id")
    );

    let executed = driver.executed();
    assert_eq!(executed.len(), 2);
    assert!(executed[0].contains("table_schema = 'public'"));
}

#[tokio::test]
async fn configured_schema_is_used() {
    let driver = catalog_driver();
    let snapshot = introspect(&executor(&driver, 10), Some("dvd"), fingerprint())
        .await
        .unwrap();

    assert!(driver.executed()[0].contains("table_schema = 'dvd'"));
    assert_eq!(snapshot.table("customer").unwrap().schema_name, "dvd");
}

#[tokio::test]
async fn permission_failures_are_reported_as_such() {
    let driver = MemoryDriver::new(DatabaseType::Postgresql).fail_on(
        "information_schema",
        DriverError::new(DriverErrorKind::Permission, "permission denied for schema dvd"),
    );

    let error = introspect(&executor(&driver, 10), None, fingerprint())
        .await
        .unwrap_err();

    assert!(matches!(error, SchemaIntrospectionError::Permission(_)));
}

#[tokio::test]
async fn unreachable_database_is_a_connection_failure() {
    let driver = MemoryDriver::new(DatabaseType::Postgresql).with_failing_connects(2);

    let error = introspect(&executor(&driver, 10), None, fingerprint())
        .await
        .unwrap_err();

    assert!(matches!(error, SchemaIntrospectionError::Connection(_)));
}

#[tokio::test]
async fn cache_introspects_once_until_refreshed() {
    let driver = catalog_driver();
    let executor: Executor = executor(&driver, 10);
    let cache = SchemaCache::new();

    let first = cache
        .get_or_introspect(&executor, None, &fingerprint())
        .await
        .unwrap();
    let second = cache
        .get_or_introspect(&executor, None, &fingerprint())
        .await
        .unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(driver.executed().len(), 2);

    let refreshed = cache.refresh(&executor, None, &fingerprint()).await.unwrap();
    assert!(!std::sync::Arc::ptr_eq(&first, &refreshed));
    assert_eq!(driver.executed().len(), 4);

    assert!(cache.invalidate(&fingerprint()).await);
    assert!(!cache.invalidate(&fingerprint()).await);
    assert!(cache.get(&fingerprint()).await.is_none());
}

#[tokio::test]
async fn failed_refresh_keeps_the_old_snapshot() {
    let healthy = catalog_driver();
    let cache = SchemaCache::new();
    cache
        .get_or_introspect(&executor(&healthy, 10), None, &fingerprint())
        .await
        .unwrap();

    let broken = MemoryDriver::new(DatabaseType::Postgresql).with_failing_connects(2);
    assert!(cache
        .refresh(&executor(&broken, 10), None, &fingerprint())
        .await
        .is_err());
    assert!(cache.get(&fingerprint()).await.is_some());
}
