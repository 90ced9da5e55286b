//! Metrics definitions for the Fireface auth client.
//!
//! All metrics follow Prometheus naming conventions:
//! - `fireface_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded by code:
//! - `status`: 2 values (success, error)
//! - `trigger`: 4 values (warm_up, stale, unknown_key, missing)
//! - `outcome`: 9 values (success, key_set_unavailable, one per `VerifyError` variant)

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Why a key-set fetch was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    /// Eager fetch at client construction.
    WarmUp,
    /// Cached set older than the minimum refresh interval.
    Stale,
    /// Token named a `kid` the cache does not hold.
    UnknownKey,
    /// No set was cached yet.
    Missing,
}

impl RefreshTrigger {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RefreshTrigger::WarmUp => "warm_up",
            RefreshTrigger::Stale => "stale",
            RefreshTrigger::UnknownKey => "unknown_key",
            RefreshTrigger::Missing => "missing",
        }
    }
}

/// Record a key-set fetch attempt.
///
/// Metric: `fireface_jwks_refresh_total`, `fireface_jwks_refresh_duration_seconds`
/// Labels: `status`, `trigger`
pub fn record_jwks_refresh(success: bool, trigger: RefreshTrigger, duration: Duration) {
    let status = if success { "success" } else { "error" };

    histogram!("fireface_jwks_refresh_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());

    counter!("fireface_jwks_refresh_total",
        "status" => status,
        "trigger" => trigger.as_str()
    )
    .increment(1);
}

/// Set the number of keys in the current snapshot.
///
/// Metric: `fireface_jwks_keys`
#[allow(clippy::cast_precision_loss)]
pub fn set_jwks_keys(count: usize) {
    gauge!("fireface_jwks_keys").set(count as f64);
}

/// Record a token verification.
///
/// Metric: `fireface_token_verifications_total`,
/// `fireface_token_verification_duration_seconds`
/// Labels: `outcome` (`success` or `VerifyError::outcome_label`)
pub fn record_token_verification(outcome: &'static str, duration: Duration) {
    histogram!("fireface_token_verification_duration_seconds", "outcome" => outcome)
        .record(duration.as_secs_f64());

    counter!("fireface_token_verifications_total", "outcome" => outcome).increment(1);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};
    use metrics_util::MetricKind;

    fn label<'a>(labels: &'a [(String, String)], name: &str) -> Option<&'a str> {
        labels
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_refresh_and_verification_metrics_are_recorded() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_jwks_refresh(true, RefreshTrigger::WarmUp, Duration::from_millis(20));
            record_jwks_refresh(false, RefreshTrigger::Stale, Duration::from_millis(5));
            set_jwks_keys(3);
            record_token_verification("success", Duration::from_micros(300));
            record_token_verification("expired", Duration::from_micros(200));
            record_token_verification("expired", Duration::from_micros(250));
        });

        let metrics = snapshotter.snapshot().into_vec();

        let mut refresh_counters = Vec::new();
        let mut expired = 0;
        let mut keys_gauge = None;
        for (key, _, _, value) in metrics {
            let name = key.key().name().to_string();
            let labels: Vec<(String, String)> = key
                .key()
                .labels()
                .map(|l| (l.key().to_string(), l.value().to_string()))
                .collect();

            match (key.kind(), name.as_str(), value) {
                (MetricKind::Counter, "fireface_jwks_refresh_total", DebugValue::Counter(n)) => {
                    refresh_counters.push((
                        label(&labels, "status").unwrap().to_string(),
                        label(&labels, "trigger").unwrap().to_string(),
                        n,
                    ));
                }
                (
                    MetricKind::Counter,
                    "fireface_token_verifications_total",
                    DebugValue::Counter(n),
                ) if label(&labels, "outcome") == Some("expired") => expired = n,
                (MetricKind::Gauge, "fireface_jwks_keys", DebugValue::Gauge(v)) => {
                    keys_gauge = Some(v.into_inner());
                }
                _ => {}
            }
        }

        refresh_counters.sort();
        assert_eq!(
            refresh_counters,
            vec![
                ("error".to_string(), "stale".to_string(), 1),
                ("success".to_string(), "warm_up".to_string(), 1),
            ]
        );
        assert_eq!(expired, 2);
        assert_eq!(keys_gauge, Some(3.0));
    }

    #[test]
    fn test_trigger_labels_are_distinct() {
        let labels = [
            RefreshTrigger::WarmUp,
            RefreshTrigger::Stale,
            RefreshTrigger::UnknownKey,
            RefreshTrigger::Missing,
        ]
        .map(RefreshTrigger::as_str);
        let unique: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(unique.len(), labels.len());
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_jwks_refresh(true, RefreshTrigger::Missing, Duration::ZERO);
        set_jwks_keys(0);
        record_token_verification("success", Duration::ZERO);
    }
}
