//! Health and metrics server for the trial runner.
//!
//! Provides:
//! - `/healthz` - Liveness check (always returns 200 if server is running)
//! - `/readyz` - Readiness check (200 once the runner is connected and running trials)
//! - `/metrics` - Prometheus metrics endpoint

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::sync::RwLock;
use tracing::info;

use crate::platform::ResourceClass;

/// Labels for kill attempts (resource class + result)
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct KillLabels {
    pub class: String,
    pub result: String,
}

impl EncodeLabelSet for KillLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("class", self.class.as_str()).encode(encoder.encode_label())?;
        ("result", self.result.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for trial outcomes
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct OutcomeLabels {
    pub class: String,
    pub outcome: String,
}

impl EncodeLabelSet for OutcomeLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("class", self.class.as_str()).encode(encoder.encode_label())?;
        ("outcome", self.outcome.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Metrics recorded while trials run
pub struct TrialMetrics {
    /// Kill attempts by class and result
    pub kills_total: Family<KillLabels, Counter>,
    /// Finished trials by class and outcome (passed, skipped, or a failure reason)
    pub trials_total: Family<OutcomeLabels, Counter>,
    /// Time from starting the wait to the OSD set running
    pub convergence_duration_seconds: Histogram,
    /// OSD pods expected after the current expansion
    pub osd_pods_desired: Gauge,
    /// OSD pods before the current expansion
    pub osd_pods_baseline: Gauge,
    registry: Registry,
}

impl Default for TrialMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TrialMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let kills_total = Family::<KillLabels, Counter>::default();
        registry.register(
            "expansion_trial_kills",
            "Total number of resource kill attempts",
            kills_total.clone(),
        );

        let trials_total = Family::<OutcomeLabels, Counter>::default();
        registry.register(
            "expansion_trial_trials",
            "Total number of finished expansion trials",
            trials_total.clone(),
        );

        let convergence_duration_seconds = Histogram::new(exponential_buckets(5.0, 2.0, 10));
        registry.register(
            "expansion_trial_convergence_duration_seconds",
            "Time for the expanded OSD set to reach Running",
            convergence_duration_seconds.clone(),
        );

        let osd_pods_desired = Gauge::default();
        registry.register(
            "expansion_trial_osd_pods_desired",
            "OSD pods expected after expansion",
            osd_pods_desired.clone(),
        );

        let osd_pods_baseline = Gauge::default();
        registry.register(
            "expansion_trial_osd_pods_baseline",
            "OSD pods before expansion",
            osd_pods_baseline.clone(),
        );

        Self {
            kills_total,
            trials_total,
            convergence_duration_seconds,
            osd_pods_desired,
            osd_pods_baseline,
            registry,
        }
    }

    pub fn record_kill(&self, class: ResourceClass, succeeded: bool) {
        let labels = KillLabels {
            class: class.to_string(),
            result: if succeeded { "deleted" } else { "failed" }.to_string(),
        };
        self.kills_total.get_or_create(&labels).inc();
    }

    pub fn record_outcome(&self, class: ResourceClass, outcome: &str) {
        let labels = OutcomeLabels {
            class: class.to_string(),
            outcome: outcome.to_string(),
        };
        self.trials_total.get_or_create(&labels).inc();
    }

    pub fn record_convergence(&self, duration_secs: f64) {
        self.convergence_duration_seconds.observe(duration_secs);
    }

    pub fn set_osd_pods(&self, baseline: i64, desired: i64) {
        self.osd_pods_baseline.set(baseline);
        self.osd_pods_desired.set(desired);
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

/// Shared state for the health server
pub struct HealthState {
    ready: RwLock<bool>,
    pub metrics: Arc<TrialMetrics>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (starts as not ready)
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Arc::new(TrialMetrics::new()),
        }
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Serve health endpoints and metrics on `0.0.0.0:port`.
pub async fn run_health_server(state: Arc<HealthState>, port: u16) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "Starting health server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
