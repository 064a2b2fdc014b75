//! Adaptive Core bridge
//!
//! Packages a decision as an [`AdaptiveEvent`] for the quantum-adaptive risk
//! core. `created_at` is wall-clock time for audit trails only and never
//! enters a contract hash.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::contract::EvaluationResponse;
use crate::value::{Map, Value};

/// Layer tag carried by every event from this crate
pub const ADN_LAYER_NAME: &str = "ADN_v2";

/// Feedback value until the adaptive core reports back
pub const DEFAULT_FEEDBACK: &str = "unknown";

/// Event in the adaptive core's risk-event shape
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdaptiveEvent {
    pub event_id: String,
    pub layer: String,
    pub decision: String,
    pub fingerprint: String,

    /// Adaptive signal in [0, 1]
    pub severity: f64,

    /// Serialized as RFC 3339
    pub created_at: DateTime<Utc>,

    pub feedback: String,

    /// `node_id`, `reason`, then caller extras (extras win on collision)
    pub metadata: Map,
}

/// Inputs for [`build_adaptive_event`]
#[derive(Debug, Clone)]
pub struct AdnSignal {
    pub event_id: String,
    pub decision: String,
    pub severity: f64,
    pub fingerprint: String,
    pub node_id: Option<String>,
    pub reason: Option<String>,
    pub extra_meta: Map,

    /// Fixed timestamp; `None` means now
    pub created_at: Option<DateTime<Utc>>,
}

impl AdnSignal {
    pub fn new(
        event_id: impl Into<String>,
        decision: impl fmt::Display,
        severity: f64,
        fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            decision: decision.to_string(),
            severity,
            fingerprint: fingerprint.into(),
            node_id: None,
            reason: None,
            extra_meta: Map::new(),
            created_at: None,
        }
    }

    /// Signal for a contract response: request id, decision and context hash
    pub fn from_response(response: &EvaluationResponse, severity: f64) -> Self {
        let reason = response
            .reason_codes
            .first()
            .map(|code| code.as_str().to_string());
        let mut signal = Self::new(
            response.request_id.clone().unwrap_or_default(),
            response.decision,
            severity,
            response.context_hash.clone(),
        );
        signal.reason = reason;
        signal
    }

    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra_meta.insert(key.into(), value.into());
        self
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }
}

/// Clamp to [0, 1]; NaN reads as maximum severity
fn clamp_severity(severity: f64) -> f64 {
    if severity.is_nan() {
        1.0
    } else {
        severity.clamp(0.0, 1.0)
    }
}

/// Build an adaptive event from a signal
pub fn build_adaptive_event(signal: AdnSignal) -> AdaptiveEvent {
    let mut metadata = Map::new();
    if let Some(node_id) = signal.node_id {
        metadata.insert("node_id".to_string(), Value::String(node_id));
    }
    if let Some(reason) = signal.reason {
        metadata.insert("reason".to_string(), Value::String(reason));
    }
    metadata.extend(signal.extra_meta);

    AdaptiveEvent {
        event_id: signal.event_id,
        layer: ADN_LAYER_NAME.to_string(),
        decision: signal.decision,
        fingerprint: signal.fingerprint,
        severity: clamp_severity(signal.severity),
        created_at: signal.created_at.unwrap_or_else(Utc::now),
        feedback: DEFAULT_FEEDBACK.to_string(),
        metadata,
    }
}

// =============================================================================
// SINKS
// =============================================================================

/// Destination for adaptive events
pub trait AdaptiveSink {
    fn send(&mut self, event: &AdaptiveEvent);
}

impl<F> AdaptiveSink for F
where
    F: FnMut(&AdaptiveEvent),
{
    fn send(&mut self, event: &AdaptiveEvent) {
        self(event)
    }
}

/// Sink that writes events to the debug log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl AdaptiveSink for TracingSink {
    fn send(&mut self, event: &AdaptiveEvent) {
        debug!(
            "Adaptive event {} [{}] decision={} severity={:.3} fp={}",
            event.event_id, event.layer, event.decision, event.severity, event.fingerprint
        );
    }
}

/// Build and send an event; does nothing and returns `None` without a sink
pub fn emit_adaptive_event(
    sink: Option<&mut dyn AdaptiveSink>,
    signal: AdnSignal,
) -> Option<AdaptiveEvent> {
    let sink = sink?;
    let event = build_adaptive_event(signal);
    sink.send(&event);
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::Decision;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_build_event_fields() {
        let event = build_adaptive_event(
            AdnSignal::new("e1", "ALLOW", 0.5, "fp")
                .with_node_id("node-a")
                .with_reason("ok")
                .with_extra("x", 1i64)
                .at(fixed_time()),
        );

        assert_eq!(event.event_id, "e1");
        assert_eq!(event.layer, ADN_LAYER_NAME);
        assert_eq!(event.decision, "ALLOW");
        assert_eq!(event.severity, 0.5);
        assert_eq!(event.fingerprint, "fp");
        assert_eq!(event.feedback, "unknown");
        assert_eq!(event.metadata["node_id"], Value::from("node-a"));
        assert_eq!(event.metadata["reason"], Value::from("ok"));
        assert_eq!(event.metadata["x"], Value::Int(1));
        assert_eq!(event.created_at, fixed_time());
    }

    #[test]
    fn test_decision_enum_stringifies() {
        let event = build_adaptive_event(AdnSignal::new("e", Decision::Block, 0.9, "fp"));
        assert_eq!(event.decision, "BLOCK");
    }

    #[test]
    fn test_severity_is_clamped() {
        let high = build_adaptive_event(AdnSignal::new("a", "BLOCK", 7.0, "fp"));
        let low = build_adaptive_event(AdnSignal::new("b", "ALLOW", -1.0, "fp"));
        let nan = build_adaptive_event(AdnSignal::new("c", "ALLOW", f64::NAN, "fp"));

        assert_eq!(high.severity, 1.0);
        assert_eq!(low.severity, 0.0);
        assert_eq!(nan.severity, 1.0);
    }

    #[test]
    fn test_metadata_not_shared_between_events() {
        let mut e1 = build_adaptive_event(AdnSignal::new("a", "WARN", 0.1, "fp1").at(fixed_time()));
        let e2 = build_adaptive_event(AdnSignal::new("b", "WARN", 0.2, "fp2").at(fixed_time()));

        e1.metadata.insert("mutate".to_string(), Value::Bool(true));
        assert!(e1.metadata.contains_key("mutate"));
        assert!(!e2.metadata.contains_key("mutate"));
    }

    #[test]
    fn test_emit_without_sink() {
        assert!(emit_adaptive_event(None, AdnSignal::new("a", "ALLOW", 0.0, "fp")).is_none());
    }

    #[test]
    fn test_emit_to_closure_sink() {
        let mut seen = Vec::new();
        let mut sink = |event: &AdaptiveEvent| seen.push(event.event_id.clone());

        let event = emit_adaptive_event(Some(&mut sink), AdnSignal::new("req-1", "WARN", 0.6, "fp"));
        assert!(event.is_some());
        assert_eq!(seen, vec!["req-1".to_string()]);
    }

    #[test]
    fn test_created_at_serializes_as_rfc3339() {
        let event = build_adaptive_event(AdnSignal::new("a", "ALLOW", 0.0, "fp").at(fixed_time()));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["created_at"], "2025-01-01T00:00:00Z");
    }
}
