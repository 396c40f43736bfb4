//! Running approved statements against the database.
//!
//! Connections come from the pool a [`driver::Driver`] owns. The
//! [`executor::Executor`] applies the timeout, the row cap and cancellation,
//! and decides whether a connection may be reused.

pub mod cancel;
pub mod driver;
pub mod error;
pub mod executor;
pub mod explain;
pub mod introspection;
pub mod metrics;
pub mod sqlx_driver;

pub use cancel::CancelHandle;
pub use driver::{Driver, DriverConnection, PoolStatus, RowSink};
pub use error::{DriverError, DriverErrorKind, ExecutionError, PoolError, SchemaIntrospectionError};
pub use executor::Executor;
pub use introspection::{introspect, SchemaCache};
pub use metrics::{initialise_metrics, update_pool_metrics, Metrics};
pub use sqlx_driver::SqlxDriver;
