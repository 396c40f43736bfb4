//! Metrics setup and update for the query pipeline.

use std::time::Duration;

use prometheus::core::{AtomicF64, AtomicI64, AtomicU64, GenericCounter, GenericGauge};

use crate::driver::Driver;

#[derive(Debug, Clone)]
pub struct Metrics {
    pub query_total: GenericCounter<AtomicU64>,
    pub rejected_total: GenericCounter<AtomicU64>,
    pub generation_failure_total: GenericCounter<AtomicU64>,
    pub timeout_total: GenericCounter<AtomicU64>,
    pub pool_size: GenericGauge<AtomicI64>,
    pub pool_idle_count: GenericGauge<AtomicI64>,
    pub pool_active_count: GenericGauge<AtomicI64>,
    pub pool_max_connections: GenericGauge<AtomicI64>,
    pub pool_acquire_timeout: GenericGauge<AtomicF64>,
    pub pool_max_lifetime: GenericGauge<AtomicF64>,
    pub pool_idle_timeout: GenericGauge<AtomicF64>,
}

/// Create a new int counter metric and register it with the provided Prometheus Registry
fn add_int_counter_metric(
    metrics_registry: &mut prometheus::Registry,
    metric_name: &str,
    metric_description: &str,
) -> Result<GenericCounter<AtomicU64>, prometheus::Error> {
    let int_counter =
        prometheus::IntCounter::with_opts(prometheus::Opts::new(metric_name, metric_description))?;
    metrics_registry.register(Box::new(int_counter.clone()))?;
    Ok(int_counter)
}

/// Create a new int gauge metric and register it with the provided Prometheus Registry
fn add_int_gauge_metric(
    metrics_registry: &mut prometheus::Registry,
    metric_name: &str,
    metric_description: &str,
) -> Result<GenericGauge<AtomicI64>, prometheus::Error> {
    let int_gauge =
        prometheus::IntGauge::with_opts(prometheus::Opts::new(metric_name, metric_description))?;
    metrics_registry.register(Box::new(int_gauge.clone()))?;
    Ok(int_gauge)
}

/// Create a new gauge metric and register it with the provided Prometheus Registry
fn add_gauge_metric(
    metrics_registry: &mut prometheus::Registry,
    metric_name: &str,
    metric_description: &str,
) -> Result<GenericGauge<AtomicF64>, prometheus::Error> {
    let gauge =
        prometheus::Gauge::with_opts(prometheus::Opts::new(metric_name, metric_description))?;
    metrics_registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

/// Setup counters and gauges used to produce Prometheus metrics
pub fn initialise_metrics(
    metrics_registry: &mut prometheus::Registry,
) -> Result<Metrics, prometheus::Error> {
    let query_total = add_int_counter_metric(
        metrics_registry,
        "nl_sql_query_total",
        "Total questions answered with a result.",
    )?;

    let rejected_total = add_int_counter_metric(
        metrics_registry,
        "nl_sql_rejected_total",
        "Total generated statements rejected by the validator.",
    )?;

    let generation_failure_total = add_int_counter_metric(
        metrics_registry,
        "nl_sql_generation_failure_total",
        "Total questions for which no usable SQL was generated.",
    )?;

    let timeout_total = add_int_counter_metric(
        metrics_registry,
        "nl_sql_timeout_total",
        "Total statements stopped by the query timeout.",
    )?;

    let pool_size = add_int_gauge_metric(
        metrics_registry,
        "nl_sql_pool_size",
        "The number of connections currently open. This includes idle connections.",
    )?;

    let pool_idle_count = add_int_gauge_metric(
        metrics_registry,
        "nl_sql_pool_idle",
        "The number of connections open and idle (not in use).",
    )?;

    let pool_active_count = add_int_gauge_metric(
        metrics_registry,
        "nl_sql_pool_active",
        "The number of connections checked out. This does not include idle connections.",
    )?;

    let pool_max_connections = add_int_gauge_metric(
        metrics_registry,
        "nl_sql_pool_max_connections",
        "The maximum number of connections that this pool may open.",
    )?;

    let pool_acquire_timeout = add_gauge_metric(
        metrics_registry,
        "nl_sql_pool_acquire_timeout",
        "The maximum amount of time to spend waiting for a connection, in seconds.",
    )?;

    let pool_idle_timeout = add_gauge_metric(
        metrics_registry,
        "nl_sql_pool_idle_timeout",
        "The maximum idle duration for individual connections, in seconds.",
    )?;

    let pool_max_lifetime = add_gauge_metric(
        metrics_registry,
        "nl_sql_pool_max_lifetime",
        "The maximum lifetime of individual connections, in seconds.",
    )?;

    Ok(Metrics {
        query_total,
        rejected_total,
        generation_failure_total,
        timeout_total,
        pool_size,
        pool_idle_count,
        pool_active_count,
        pool_max_connections,
        pool_acquire_timeout,
        pool_max_lifetime,
        pool_idle_timeout,
    })
}

// update all pool gauges
pub fn update_pool_metrics(driver: &dyn Driver, metrics: &Metrics) {
    let status = driver.pool_status();
    metrics
        .pool_size
        .set(i64::try_from(status.size).unwrap_or(i64::MAX));
    metrics
        .pool_idle_count
        .set(i64::try_from(status.idle).unwrap_or(i64::MAX));
    metrics
        .pool_active_count
        .set(i64::try_from(status.active).unwrap_or(i64::MAX));
    metrics
        .pool_max_connections
        .set(i64::try_from(status.max_connections).unwrap_or(i64::MAX));

    metrics
        .pool_acquire_timeout
        .set(status.acquire_timeout.as_secs_f64());

    // if nothing is set, return 0
    metrics.pool_idle_timeout.set(
        status
            .idle_timeout
            .unwrap_or(Duration::ZERO)
            .as_secs_f64(),
    );

    // if nothing is set, return 0
    metrics.pool_max_lifetime.set(
        status
            .max_lifetime
            .unwrap_or(Duration::ZERO)
            .as_secs_f64(),
    );
}
