//! Prometheus metrics collection for formatter-relay
//!
//! This module provides metrics instrumentation for tracking:
//! - Model attempts by tool and outcome
//! - Cascade outcomes by tool
//! - Stream establishment latency by tool
//! - Relay outcomes and relayed bytes by tool
//!
//! Metrics are exposed via the `/metrics` endpoint in Prometheus text format.

use crate::error::AttemptError;
use crate::tools::ToolKind;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Result of one model attempt, as a bounded label set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Established,
    Transport,
    Auth,
    RateLimited,
    Status,
    Upstream,
    Decode,
    Timeout,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Established => "established",
            AttemptOutcome::Transport => "transport",
            AttemptOutcome::Auth => "auth",
            AttemptOutcome::RateLimited => "rate_limited",
            AttemptOutcome::Status => "status",
            AttemptOutcome::Upstream => "upstream",
            AttemptOutcome::Decode => "decode",
            AttemptOutcome::Timeout => "timeout",
        }
    }

    pub fn from_error(error: &AttemptError) -> Self {
        match error {
            AttemptError::Transport { .. } => AttemptOutcome::Transport,
            AttemptError::Status { status, .. } => match status {
                401 | 403 => AttemptOutcome::Auth,
                429 => AttemptOutcome::RateLimited,
                _ => AttemptOutcome::Status,
            },
            AttemptError::Upstream { .. } => AttemptOutcome::Upstream,
            AttemptError::Decode { .. } => AttemptOutcome::Decode,
            AttemptError::Timeout { .. } => AttemptOutcome::Timeout,
        }
    }
}

/// How a cascade ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeOutcome {
    Streamed,
    Exhausted,
    NotConfigured,
}

impl CascadeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CascadeOutcome::Streamed => "streamed",
            CascadeOutcome::Exhausted => "exhausted",
            CascadeOutcome::NotConfigured => "not_configured",
        }
    }
}

/// How a relayed body ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Upstream finished and every byte was handed to the server
    Completed,
    /// Upstream failed after the response had started
    Truncated,
    /// The caller went away before upstream finished
    Cancelled,
}

impl RelayOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayOutcome::Completed => "completed",
            RelayOutcome::Truncated => "truncated",
            RelayOutcome::Cancelled => "cancelled",
        }
    }
}

/// Metrics collector for formatter-relay
///
/// Cloning is cheap; all clones record into the same registry.
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    attempts_total: IntCounterVec,
    cascades_total: IntCounterVec,
    establish_duration: HistogramVec,
    relays_total: IntCounterVec,
    relayed_bytes: IntCounterVec,
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// Registers all metrics with a new Prometheus registry.
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Cardinality: 4 tools x 8 outcomes
        let attempts_total = IntCounterVec::new(
            Opts::new(
                "formatter_relay_attempts_total",
                "Model attempts by tool and outcome",
            ),
            &["tool", "outcome"],
        )?;

        let cascades_total = IntCounterVec::new(
            Opts::new(
                "formatter_relay_cascades_total",
                "Model cascades by tool and final outcome",
            ),
            &["tool", "outcome"],
        )?;

        let establish_duration = HistogramVec::new(
            HistogramOpts::new(
                "formatter_relay_establish_duration_ms",
                "Time from cascade start to the first upstream event, in milliseconds",
            )
            .buckets(vec![
                50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0,
            ]),
            &["tool"],
        )?;

        let relays_total = IntCounterVec::new(
            Opts::new(
                "formatter_relay_relays_total",
                "Relayed response bodies by tool and outcome. \
                Truncated relays ended with an upstream failure after the 200 was sent.",
            ),
            &["tool", "outcome"],
        )?;

        let relayed_bytes = IntCounterVec::new(
            Opts::new(
                "formatter_relay_relayed_bytes_total",
                "Bytes of model output relayed to callers by tool",
            ),
            &["tool"],
        )?;

        registry.register(Box::new(attempts_total.clone()))?;
        registry.register(Box::new(cascades_total.clone()))?;
        registry.register(Box::new(establish_duration.clone()))?;
        registry.register(Box::new(relays_total.clone()))?;
        registry.register(Box::new(relayed_bytes.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            attempts_total,
            cascades_total,
            establish_duration,
            relays_total,
            relayed_bytes,
        })
    }

    pub fn record_attempt(&self, tool: ToolKind, outcome: AttemptOutcome) {
        self.attempts_total
            .with_label_values(&[tool.as_str(), outcome.as_str()])
            .inc();
    }

    pub fn record_cascade(&self, tool: ToolKind, outcome: CascadeOutcome) {
        self.cascades_total
            .with_label_values(&[tool.as_str(), outcome.as_str()])
            .inc();
    }

    /// Record stream establishment latency
    ///
    /// # Errors
    ///
    /// Returns an error if `duration_ms` is NaN, infinite or negative; such
    /// values would corrupt the histogram.
    pub fn record_establish_duration(
        &self,
        tool: ToolKind,
        duration_ms: f64,
    ) -> Result<(), prometheus::Error> {
        if !duration_ms.is_finite() || duration_ms < 0.0 {
            return Err(prometheus::Error::Msg(format!(
                "Histogram value must be finite and non-negative, got: {duration_ms}"
            )));
        }
        self.establish_duration
            .get_metric_with_label_values(&[tool.as_str()])?
            .observe(duration_ms);
        Ok(())
    }

    pub fn record_relay(&self, tool: ToolKind, outcome: RelayOutcome, bytes: u64) {
        self.relays_total
            .with_label_values(&[tool.as_str(), outcome.as_str()])
            .inc();
        if bytes > 0 {
            self.relayed_bytes
                .with_label_values(&[tool.as_str()])
                .inc_by(bytes);
        }
    }

    /// Total attempts recorded for `tool`, across outcomes
    pub fn attempts_count(&self, tool: ToolKind) -> u64 {
        self.counter_sum("formatter_relay_attempts_total", &[("tool", tool.as_str())])
    }

    pub fn attempt_outcome_count(&self, tool: ToolKind, outcome: AttemptOutcome) -> u64 {
        self.counter_sum(
            "formatter_relay_attempts_total",
            &[("tool", tool.as_str()), ("outcome", outcome.as_str())],
        )
    }

    pub fn cascade_outcome_count(&self, tool: ToolKind, outcome: CascadeOutcome) -> u64 {
        self.counter_sum(
            "formatter_relay_cascades_total",
            &[("tool", tool.as_str()), ("outcome", outcome.as_str())],
        )
    }

    pub fn relay_outcome_count(&self, tool: ToolKind, outcome: RelayOutcome) -> u64 {
        self.counter_sum(
            "formatter_relay_relays_total",
            &[("tool", tool.as_str()), ("outcome", outcome.as_str())],
        )
    }

    pub fn relayed_bytes_count(&self, tool: ToolKind) -> u64 {
        self.counter_sum(
            "formatter_relay_relayed_bytes_total",
            &[("tool", tool.as_str())],
        )
    }

    /// Sum of a counter family over the series matching every `(label, value)`
    fn counter_sum(&self, family: &str, labels: &[(&str, &str)]) -> u64 {
        self.registry
            .gather()
            .iter()
            .find(|mf| mf.name() == family)
            .map(|mf| {
                mf.get_metric()
                    .iter()
                    .filter(|m| {
                        labels.iter().all(|(name, value)| {
                            m.get_label()
                                .iter()
                                .any(|l| l.name() == *name && l.value() == *value)
                        })
                    })
                    .map(|m| m.get_counter().value.unwrap_or(0.0) as u64)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Gather all metrics and encode them in Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns an error if metric encoding fails.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();
        let metric_count = metric_families.len();

        tracing::debug!(
            metric_family_count = metric_count,
            "Encoding metrics to Prometheus text format"
        );

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    metric_family_count = metric_count,
                    "Prometheus text encoder failed"
                );
                e
            })?;

        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!(
                "Failed to convert metrics to UTF-8 at byte {}: {e}",
                e.utf8_error().valid_up_to()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_metrics_new_creates_registry() {
        let metrics = Metrics::new().expect("Failed to create metrics");

        metrics.record_attempt(ToolKind::Format, AttemptOutcome::Established);
        metrics.record_cascade(ToolKind::Format, CascadeOutcome::Streamed);
        metrics
            .record_establish_duration(ToolKind::Format, 120.0)
            .expect("Test operation should succeed");
        metrics.record_relay(ToolKind::Format, RelayOutcome::Completed, 10);

        let names: Vec<String> = metrics
            .registry
            .gather()
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(names.len(), 5, "Expected 5 metric families: {names:?}");
        assert!(names.contains(&"formatter_relay_attempts_total".to_string()));
        assert!(names.contains(&"formatter_relay_cascades_total".to_string()));
        assert!(names.contains(&"formatter_relay_establish_duration_ms".to_string()));
        assert!(names.contains(&"formatter_relay_relays_total".to_string()));
        assert!(names.contains(&"formatter_relay_relayed_bytes_total".to_string()));
    }

    #[test]
    fn test_attempt_counts_are_per_tool() {
        let metrics = Metrics::new().unwrap();
        metrics.record_attempt(ToolKind::Format, AttemptOutcome::Auth);
        metrics.record_attempt(ToolKind::Format, AttemptOutcome::Established);
        metrics.record_attempt(ToolKind::OracleQueryCleaner, AttemptOutcome::Timeout);

        assert_eq!(metrics.attempts_count(ToolKind::Format), 2);
        assert_eq!(metrics.attempts_count(ToolKind::OracleQueryCleaner), 1);
        assert_eq!(metrics.attempts_count(ToolKind::OptimizeOracle), 0);
        assert_eq!(
            metrics.attempt_outcome_count(ToolKind::Format, AttemptOutcome::Auth),
            1
        );
    }

    #[test]
    fn test_relay_records_outcome_and_bytes() {
        let metrics = Metrics::new().unwrap();
        metrics.record_relay(ToolKind::OptimizeOracle, RelayOutcome::Truncated, 7);
        metrics.record_relay(ToolKind::OptimizeOracle, RelayOutcome::Completed, 5);
        metrics.record_relay(ToolKind::OptimizeOracle, RelayOutcome::Cancelled, 0);

        assert_eq!(
            metrics.relay_outcome_count(ToolKind::OptimizeOracle, RelayOutcome::Truncated),
            1
        );
        assert_eq!(metrics.relayed_bytes_count(ToolKind::OptimizeOracle), 12);
    }

    #[test]
    fn test_outcome_from_error() {
        let status = |status| AttemptError::Status {
            provider: "p".into(),
            status,
            body: String::new(),
        };
        assert_eq!(AttemptOutcome::from_error(&status(401)), AttemptOutcome::Auth);
        assert_eq!(AttemptOutcome::from_error(&status(403)), AttemptOutcome::Auth);
        assert_eq!(
            AttemptOutcome::from_error(&status(429)),
            AttemptOutcome::RateLimited
        );
        assert_eq!(AttemptOutcome::from_error(&status(503)), AttemptOutcome::Status);
        assert_eq!(
            AttemptOutcome::from_error(&AttemptError::Timeout {
                provider: "p".into(),
                timeout: Duration::from_secs(1),
            }),
            AttemptOutcome::Timeout
        );
    }

    #[test]
    fn test_outcome_labels_match_error_kinds() {
        let err = AttemptError::Status {
            provider: "p".into(),
            status: 429,
            body: String::new(),
        };
        assert_eq!(AttemptOutcome::from_error(&err).as_str(), err.kind());
    }

    #[test]
    fn test_histogram_rejects_invalid_values() {
        let metrics = Metrics::new().unwrap();
        assert!(
            metrics
                .record_establish_duration(ToolKind::Format, f64::NAN)
                .is_err()
        );
        assert!(
            metrics
                .record_establish_duration(ToolKind::Format, f64::INFINITY)
                .is_err()
        );
        assert!(
            metrics
                .record_establish_duration(ToolKind::Format, -1.0)
                .is_err()
        );
        assert!(metrics.record_establish_duration(ToolKind::Format, 0.0).is_ok());
    }

    #[test]
    fn test_gather_produces_prometheus_text_format() {
        let metrics = Metrics::new().unwrap();
        metrics.record_cascade(ToolKind::ExecutionPlanExplainer, CascadeOutcome::Exhausted);

        let output = metrics.gather().expect("Failed to gather test metrics");
        assert!(output.contains("# TYPE formatter_relay_cascades_total counter"));
        assert!(output.contains("tool=\"execution-plan-explainer\""));
        assert!(output.contains("outcome=\"exhausted\""));
    }

    #[test]
    fn test_concurrent_metric_recording() {
        let metrics = Metrics::new().unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = metrics.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        metrics.record_attempt(ToolKind::Format, AttemptOutcome::Established);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.attempts_count(ToolKind::Format), 800);
    }
}
