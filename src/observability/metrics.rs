//! Prometheus metrics for the relay.

use anyhow::Result;
use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};

/// Outcome label values for `chatrelay_chat_requests_total`.
pub const OUTCOMES: &[&str] = &[
    "ok",
    "invalid_request",
    "storage_unavailable",
    "generation_failed",
];

/// Relay metrics, registered in a private registry so tests and multiple
/// gateways in one process never collide on the global default.
#[derive(Clone)]
pub struct RelayMetrics {
    registry: Registry,
    chat_requests: IntCounterVec,
    generation_seconds: Histogram,
}

impl RelayMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let chat_requests = IntCounterVec::new(
            Opts::new(
                "chatrelay_chat_requests_total",
                "Chat requests handled, by outcome",
            ),
            &["outcome"],
        )?;
        let generation_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "chatrelay_generation_seconds",
                "Latency of generation provider calls",
            )
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;

        registry.register(Box::new(chat_requests.clone()))?;
        registry.register(Box::new(generation_seconds.clone()))?;

        // Pre-create every outcome series so dashboards see zeros, not gaps.
        for outcome in OUTCOMES {
            let _ = chat_requests.with_label_values(&[*outcome]);
        }

        Ok(Self {
            registry,
            chat_requests,
            generation_seconds,
        })
    }

    pub fn record_chat(&self, outcome: &str) {
        self.chat_requests.with_label_values(&[outcome]).inc();
    }

    pub fn observe_generation(&self, seconds: f64) {
        self.generation_seconds.observe(seconds);
    }

    pub fn chat_count(&self, outcome: &str) -> u64 {
        self.chat_requests.with_label_values(&[outcome]).get()
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String> {
        let mut out = String::new();
        TextEncoder::new().encode_utf8(&self.registry.gather(), &mut out)?;
        Ok(out)
    }
}
