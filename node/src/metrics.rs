//! # Prometheus Metrics
//!
//! Ledger and registry counters, scraped at `/metrics` on the metrics port.
//! Everything lives in a dedicated [`prometheus::Registry`] under the
//! `attest` namespace.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    pub blocks_created_total: IntCounter,
    /// Height of the tip; genesis is 0.
    pub chain_height: IntGauge,
    pub mining_duration_seconds: Histogram,
    pub mining_timeouts_total: IntCounter,
    pub certificates_issued_total: IntCounter,
    pub certificates_revoked_total: IntCounter,
    pub copyrights_registered_total: IntCounter,
    pub copyright_transfers_total: IntCounter,
}

fn counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounter> {
    let c = IntCounter::new(name, help)?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

impl NodeMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("attest".into()), None)?;

        let chain_height = IntGauge::new("chain_height", "Height of the latest block")?;
        registry.register(Box::new(chain_height.clone()))?;

        let mining_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "mining_duration_seconds",
                "Wall-clock time spent mining a block",
            )
            .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;
        registry.register(Box::new(mining_duration_seconds.clone()))?;

        Ok(Self {
            blocks_created_total: counter(
                &registry,
                "blocks_created_total",
                "Blocks appended through the API",
            )?,
            mining_timeouts_total: counter(
                &registry,
                "mining_timeouts_total",
                "Block creations that ran out of mining time",
            )?,
            certificates_issued_total: counter(
                &registry,
                "certificates_issued_total",
                "Access certificates issued",
            )?,
            certificates_revoked_total: counter(
                &registry,
                "certificates_revoked_total",
                "Access certificates revoked",
            )?,
            copyrights_registered_total: counter(
                &registry,
                "copyrights_registered_total",
                "Copyright records registered",
            )?,
            copyright_transfers_total: counter(
                &registry,
                "copyright_transfers_total",
                "Copyright ownership transfers",
            )?,
            chain_height,
            mining_duration_seconds,
            registry,
        })
    }

    /// Record a successful append that left the chain at `height`.
    pub fn record_block(&self, height: usize, mining: Duration) {
        self.blocks_created_total.inc();
        self.chain_height.set(height as i64);
        self.mining_duration_seconds.observe(mining.as_secs_f64());
    }

    /// Prometheus text exposition format.
    pub fn encode(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// `GET /metrics`.
pub async fn metrics_handler(State(metrics): State<SharedMetrics>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
