//! Test doubles and fixtures shared by the crates' integration tests.

pub mod completion;
pub mod driver;
pub mod schema;
