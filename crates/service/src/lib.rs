//! Answer natural-language questions about a database over HTTP.
//!
//! A question goes through generation, validation, execution and chart
//! selection in [`pipeline::Pipeline`]; failures come out of
//! [`classifier::classify`] as errors that are safe to show.

pub mod classifier;
pub mod error;
pub mod pipeline;
pub mod routes;
pub mod state;
