//! Metrics Collection
//!
//! Counters and gauges for the defense service, exported as Prometheus text
//! or JSON.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::contract::EvaluationResponse;
use crate::decision::Decision;
use crate::reason::ReasonCode;
use crate::types::{LockdownState, NodeDefenseState, RiskLevel};

/// Metrics collector for the defense service
#[derive(Default)]
pub struct Metrics {
    /// Start time for uptime calculation
    start_time: Option<Instant>,

    /// Total evaluation requests
    pub evaluations: AtomicU64,

    pub decisions_allow: AtomicU64,
    pub decisions_warn: AtomicU64,
    pub decisions_block: AtomicU64,
    pub decisions_error: AtomicU64,

    // Rejections by reason code
    pub errors_invalid_request: AtomicU64,
    pub errors_schema_version: AtomicU64,
    pub errors_unknown_key: AtomicU64,
    pub errors_bad_number: AtomicU64,

    /// Lockdown actions emitted (enter and lift)
    pub lockdown_actions: AtomicU64,

    /// Current risk level (0=NORMAL, 1=ELEVATED, 2=CRITICAL)
    pub risk_level: AtomicU64,

    /// Current lockdown state (0=NONE, 1=PARTIAL, 2=FULL)
    pub lockdown_state: AtomicU64,

    /// Events in the active window
    pub active_events: AtomicU64,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }

    /// Count one evaluation and its outcome
    pub fn record_response(&self, response: &EvaluationResponse) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);

        let counter = match response.decision {
            Decision::Allow => &self.decisions_allow,
            Decision::Warn => &self.decisions_warn,
            Decision::Block => &self.decisions_block,
            Decision::Error => &self.decisions_error,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        for code in &response.reason_codes {
            let counter = match code {
                ReasonCode::Ok => continue,
                ReasonCode::InvalidRequest => &self.errors_invalid_request,
                ReasonCode::SchemaVersion => &self.errors_schema_version,
                ReasonCode::UnknownKey => &self.errors_unknown_key,
                ReasonCode::BadNumber => &self.errors_bad_number,
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }

        self.lockdown_actions
            .fetch_add(response.actions.len() as u64, Ordering::Relaxed);
    }

    /// Update gauges from the node state
    pub fn observe_state(&self, state: &NodeDefenseState) {
        let risk = match state.risk_level {
            RiskLevel::Normal => 0,
            RiskLevel::Elevated => 1,
            RiskLevel::Critical => 2,
        };
        let lockdown = match state.lockdown_state {
            LockdownState::None => 0,
            LockdownState::Partial => 1,
            LockdownState::Full => 2,
        };

        self.risk_level.store(risk, Ordering::Relaxed);
        self.lockdown_state.store(lockdown, Ordering::Relaxed);
        self.active_events
            .store(state.active_events.len() as u64, Ordering::Relaxed);
    }

    /// Export metrics in Prometheus format
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "# HELP adn_uptime_seconds Service uptime in seconds\n\
             # TYPE adn_uptime_seconds gauge\n\
             adn_uptime_seconds {}\n\n",
            self.uptime_secs()
        ));

        output.push_str(&format!(
            "# HELP adn_evaluations_total Evaluation requests\n\
             # TYPE adn_evaluations_total counter\n\
             adn_evaluations_total {}\n\n",
            self.evaluations.load(Ordering::Relaxed)
        ));

        // Decisions
        output.push_str(
            "# HELP adn_decisions_total Decisions by outcome\n\
             # TYPE adn_decisions_total counter\n",
        );
        for (label, counter) in [
            ("ALLOW", &self.decisions_allow),
            ("WARN", &self.decisions_warn),
            ("BLOCK", &self.decisions_block),
            ("ERROR", &self.decisions_error),
        ] {
            output.push_str(&format!(
                "adn_decisions_total{{decision=\"{}\"}} {}\n",
                label,
                counter.load(Ordering::Relaxed)
            ));
        }
        output.push('\n');

        // Rejections
        output.push_str(
            "# HELP adn_errors_total Rejected requests by reason code\n\
             # TYPE adn_errors_total counter\n",
        );
        for (code, counter) in [
            (ReasonCode::InvalidRequest, &self.errors_invalid_request),
            (ReasonCode::SchemaVersion, &self.errors_schema_version),
            (ReasonCode::UnknownKey, &self.errors_unknown_key),
            (ReasonCode::BadNumber, &self.errors_bad_number),
        ] {
            output.push_str(&format!(
                "adn_errors_total{{code=\"{}\"}} {}\n",
                code,
                counter.load(Ordering::Relaxed)
            ));
        }
        output.push('\n');

        output.push_str(&format!(
            "# HELP adn_lockdown_actions_total Lockdown actions emitted\n\
             # TYPE adn_lockdown_actions_total counter\n\
             adn_lockdown_actions_total {}\n\n",
            self.lockdown_actions.load(Ordering::Relaxed)
        ));

        // Node state
        output.push_str(&format!(
            "# HELP adn_risk_level Current risk level (0=NORMAL, 1=ELEVATED, 2=CRITICAL)\n\
             # TYPE adn_risk_level gauge\n\
             adn_risk_level {}\n\n",
            self.risk_level.load(Ordering::Relaxed)
        ));

        output.push_str(&format!(
            "# HELP adn_lockdown_state Current lockdown state (0=NONE, 1=PARTIAL, 2=FULL)\n\
             # TYPE adn_lockdown_state gauge\n\
             adn_lockdown_state {}\n\n",
            self.lockdown_state.load(Ordering::Relaxed)
        ));

        output.push_str(&format!(
            "# HELP adn_active_events Events in the active window\n\
             # TYPE adn_active_events gauge\n\
             adn_active_events {}\n\n",
            self.active_events.load(Ordering::Relaxed)
        ));

        output
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "uptime_secs": self.uptime_secs(),
            "evaluations": self.evaluations.load(Ordering::Relaxed),
            "decisions": {
                "allow": self.decisions_allow.load(Ordering::Relaxed),
                "warn": self.decisions_warn.load(Ordering::Relaxed),
                "block": self.decisions_block.load(Ordering::Relaxed),
                "error": self.decisions_error.load(Ordering::Relaxed),
            },
            "errors": {
                "invalid_request": self.errors_invalid_request.load(Ordering::Relaxed),
                "schema_version": self.errors_schema_version.load(Ordering::Relaxed),
                "unknown_key": self.errors_unknown_key.load(Ordering::Relaxed),
                "bad_number": self.errors_bad_number.load(Ordering::Relaxed),
            },
            "lockdown_actions": self.lockdown_actions.load(Ordering::Relaxed),
            "node": {
                "risk_level": self.risk_level.load(Ordering::Relaxed),
                "lockdown_state": self.lockdown_state.load(Ordering::Relaxed),
                "active_events": self.active_events.load(Ordering::Relaxed),
            },
        })
    }
}
