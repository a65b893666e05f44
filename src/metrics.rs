//! Metrics collection and export module

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder};

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Counters
    pub blocks_analyzed: IntCounter,
    pub slots_skipped: IntCounter,
    pub fetch_retries: IntCounter,
    pub batches_emitted: IntCounter,
    pub batches_skipped: IntCounter,
    pub price_unavailable: IntCounter,
    pub sink_failures: IntCounter,

    // Gauges
    pub window_len: IntGauge,
    pub last_slot: IntGauge,
    pub loop_state: IntGauge,

    // Histograms
    pub fetch_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let blocks_analyzed = IntCounter::with_opts(Opts::new(
            "blocks_analyzed_total",
            "Blocks reduced to per-block statistics",
        ))?;

        let slots_skipped = IntCounter::with_opts(Opts::new(
            "slots_skipped_total",
            "Slots that produced no record (missing block, empty block or fetch failure)",
        ))?;

        let fetch_retries = IntCounter::with_opts(Opts::new(
            "fetch_retries_total",
            "Block fetch attempts beyond the first",
        ))?;

        let batches_emitted = IntCounter::with_opts(Opts::new(
            "batches_emitted_total",
            "Batch reports published to sinks",
        ))?;

        let batches_skipped = IntCounter::with_opts(Opts::new(
            "batches_skipped_total",
            "Batches without qualifying records",
        ))?;

        let price_unavailable = IntCounter::with_opts(Opts::new(
            "price_unavailable_total",
            "Batches published without a reference price",
        ))?;

        let sink_failures =
            IntCounter::with_opts(Opts::new("sink_failures_total", "Failed sink writes"))?;

        let window_len = IntGauge::with_opts(Opts::new(
            "window_len",
            "Entries currently held by the per-block window",
        ))?;

        let last_slot =
            IntGauge::with_opts(Opts::new("last_slot", "Most recently analyzed slot"))?;

        let loop_state = IntGauge::with_opts(Opts::new(
            "loop_state",
            "Poll loop state (0 initializing, 1 steady, 2 stopped)",
        ))?;

        let fetch_latency = Histogram::with_opts(
            HistogramOpts::new("fetch_latency_seconds", "Block fetch latency including retries")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0]),
        )?;

        // Register all metrics
        registry.register(Box::new(blocks_analyzed.clone()))?;
        registry.register(Box::new(slots_skipped.clone()))?;
        registry.register(Box::new(fetch_retries.clone()))?;
        registry.register(Box::new(batches_emitted.clone()))?;
        registry.register(Box::new(batches_skipped.clone()))?;
        registry.register(Box::new(price_unavailable.clone()))?;
        registry.register(Box::new(sink_failures.clone()))?;
        registry.register(Box::new(window_len.clone()))?;
        registry.register(Box::new(last_slot.clone()))?;
        registry.register(Box::new(loop_state.clone()))?;
        registry.register(Box::new(fetch_latency.clone()))?;

        Ok(Self {
            registry,
            blocks_analyzed,
            slots_skipped,
            fetch_retries,
            batches_emitted,
            batches_skipped,
            price_unavailable,
            sink_failures,
            window_len,
            last_slot,
            loop_state,
            fetch_latency,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render every registered metric in the Prometheus text format
    pub fn encode_text(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}
