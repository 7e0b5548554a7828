use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use tracing::error;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref RUNS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "collector_runs_total",
        "Total pipeline runs started"
    ))
    .unwrap();
    pub static ref RUN_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "collector_run_failures_total",
        "Total pipeline runs that ended with a fatal error"
    ))
    .unwrap();
    pub static ref MEASUREMENTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "collector_measurements_total",
        "Total temperature measurements extracted"
    ))
    .unwrap();
    pub static ref CONVERSION_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "collector_conversion_failures_total",
        "Total status values dropped because they could not be converted"
    ))
    .unwrap();
    pub static ref WRITE_RETRIES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "collector_write_retries_total",
        "Total transport-level retries of time-series writes"
    ))
    .unwrap();
    pub static ref RUN_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "collector_run_latency_seconds",
            "Time taken by one pipeline run"
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0])
    )
    .unwrap();
    pub static ref BATCH_SIZE: Gauge = Gauge::with_opts(Opts::new(
        "collector_batch_size",
        "Number of measurements in the last write batch"
    ))
    .unwrap();
}

pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(RUNS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RUN_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(MEASUREMENTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CONVERSION_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WRITE_RETRIES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RUN_LATENCY_SECONDS.clone()))?;
    REGISTRY.register(Box::new(BATCH_SIZE.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
