//! Core types for node defense
//!
//! Risk and lockdown levels, the validated event record, action descriptors
//! and the per-node state threaded through every evaluation.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::value::{Map, Value};

// =============================================================================
// RISK & LOCKDOWN LEVELS
// =============================================================================

/// Aggregate risk classification, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    /// Average severity below the partial-lock threshold
    Normal,

    /// Average severity at or above the partial-lock threshold
    Elevated,

    /// Average severity at or above the lockdown threshold
    Critical,
}

impl RiskLevel {
    pub const fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Normal => "NORMAL",
            RiskLevel::Elevated => "ELEVATED",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operational restriction applied to the node, ordered by restrictiveness
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockdownState {
    /// Normal operation
    None,

    /// Reduced RPC and withdrawal limits
    Partial,

    /// RPC disabled, withdrawals frozen
    Full,
}

impl LockdownState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            LockdownState::None => "NONE",
            LockdownState::Partial => "PARTIAL",
            LockdownState::Full => "FULL",
        }
    }

    /// Is any restriction in force?
    pub fn is_locked(&self) -> bool {
        !matches!(self, LockdownState::None)
    }
}

impl std::fmt::Display for LockdownState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// EVENTS
// =============================================================================

/// One observed security-relevant occurrence (RPC abuse, reorg warning, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefenseEvent {
    /// Event kind, e.g. `rpc_abuse`, `REORG_WARNING`
    pub event_type: String,

    /// Severity in [0, 1]
    pub severity: f64,

    /// Producer of the event, e.g. `sentinel`, `dqsn`, `local`
    pub source: String,

    /// Free-form details; empty when the producer sent none
    #[serde(default)]
    pub metadata: Map,
}

impl DefenseEvent {
    pub fn new(event_type: impl Into<String>, severity: f64, source: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            severity,
            source: source.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Value form used for fingerprinting
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("event_type".to_string(), Value::from(self.event_type.as_str()));
        map.insert("severity".to_string(), Value::Float(self.severity));
        map.insert("source".to_string(), Value::from(self.source.as_str()));
        map.insert("metadata".to_string(), Value::Object(self.metadata.clone()));
        Value::Object(map)
    }
}

// =============================================================================
// ACTIONS
// =============================================================================

/// Kinds of defensive action the state machine can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    EnterPartialLockdown,
    EnterFullLockdown,
    LiftLockdown,
}

impl ActionType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActionType::EnterPartialLockdown => "ENTER_PARTIAL_LOCKDOWN",
            ActionType::EnterFullLockdown => "ENTER_FULL_LOCKDOWN",
            ActionType::LiftLockdown => "LIFT_LOCKDOWN",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Intended effect, described as data. Never executed by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefenseAction {
    pub action_type: ActionType,

    /// Human-readable cause, includes the average severity
    pub reason: String,

    #[serde(default)]
    pub metadata: Option<Map>,
}

impl DefenseAction {
    pub fn new(action_type: ActionType, reason: impl Into<String>) -> Self {
        Self {
            action_type,
            reason: reason.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Map) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Value form used for fingerprinting and responses
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("action_type".to_string(), Value::from(self.action_type.as_str()));
        map.insert("reason".to_string(), Value::from(self.reason.as_str()));
        map.insert(
            "metadata".to_string(),
            self.metadata.clone().map(Value::Object).unwrap_or(Value::Null),
        );
        Value::Object(map)
    }
}

// =============================================================================
// NODE STATE
// =============================================================================

/// Per-node defense state.
///
/// The only entity that lives across calls. The caller owns it, keeps one per
/// node, and serializes access (single writer).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeDefenseState {
    pub risk_level: RiskLevel,

    pub lockdown_state: LockdownState,

    /// Retained history used for averaging, oldest first
    pub active_events: VecDeque<DefenseEvent>,

    /// Actions produced by the most recent evaluation only
    pub last_actions: Vec<DefenseAction>,
}

impl Default for NodeDefenseState {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeDefenseState {
    /// Fresh NORMAL / NONE state
    pub fn new() -> Self {
        Self {
            risk_level: RiskLevel::Normal,
            lockdown_state: LockdownState::None,
            active_events: VecDeque::new(),
            last_actions: Vec::new(),
        }
    }

    /// Arithmetic mean severity over the retained window (0.0 when empty)
    pub fn avg_severity(&self) -> f64 {
        if self.active_events.is_empty() {
            return 0.0;
        }
        let total: f64 = self.active_events.iter().map(|e| e.severity).sum();
        total / self.active_events.len() as f64
    }

    /// Value form for fingerprints. The retained window is embedded so two
    /// states that decide alike but diverge later never share a hash.
    pub fn summary_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("risk_level".to_string(), Value::from(self.risk_level.as_str()));
        map.insert(
            "lockdown_state".to_string(),
            Value::from(self.lockdown_state.as_str()),
        );
        map.insert(
            "active_event_count".to_string(),
            Value::Int(self.active_events.len() as i64),
        );
        map.insert(
            "active_events".to_string(),
            Value::Array(self.active_events.iter().map(DefenseEvent::to_value).collect()),
        );
        map.insert(
            "actions".to_string(),
            Value::Array(self.last_actions.iter().map(DefenseAction::to_value).collect()),
        );
        Value::Object(map)
    }
}
