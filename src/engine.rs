//! Defense State Machine
//!
//! Folds a batch of validated events into the node's [`NodeDefenseState`]:
//! recomputes the aggregate risk level over the retained event window and
//! moves the lockdown state, emitting action descriptors on edges only.
//!
//! ## Transitions (new risk × previous lockdown)
//!
//! ```text
//!              NONE               PARTIAL            FULL
//! CRITICAL  →  FULL  (enter)      FULL  (enter)      FULL  (-)
//! ELEVATED  →  PARTIAL (enter)    PARTIAL (-)        FULL  (-)
//! NORMAL    →  NONE  (-)          NONE  (lift)       NONE  (lift)
//! ```
//!
//! FULL is never downgraded to PARTIAL on easing risk: leaving FULL requires
//! the average to fall back to NORMAL.

use tracing::{debug, info, warn};

use crate::config::NodeDefenseConfig;
use crate::types::{
    ActionType, DefenseAction, DefenseEvent, LockdownState, NodeDefenseState, RiskLevel,
};
use crate::value::{Map, Value};

/// Classify an average severity against the configured thresholds
pub fn classify(avg_severity: f64, config: &NodeDefenseConfig) -> RiskLevel {
    if avg_severity >= config.lockdown_threshold {
        RiskLevel::Critical
    } else if avg_severity >= config.partial_lock_threshold {
        RiskLevel::Elevated
    } else {
        RiskLevel::Normal
    }
}

/// Evaluate a batch against an optional prior state and return the result.
///
/// A missing state starts from a fresh NORMAL / NONE instance.
pub fn evaluate_defense(
    events: &[DefenseEvent],
    config: &NodeDefenseConfig,
    state: Option<NodeDefenseState>,
) -> NodeDefenseState {
    let mut state = state.unwrap_or_default();
    state.apply(events, config);
    state
}

impl NodeDefenseState {
    /// Fold one event batch into this state, in place.
    ///
    /// Returns the actions produced by this call (also stored in
    /// `last_actions`). Never fails; input is assumed validated.
    pub fn apply(&mut self, events: &[DefenseEvent], config: &NodeDefenseConfig) -> &[DefenseAction] {
        if events.is_empty() {
            // No new information, not an all-clear
            self.last_actions.clear();
            debug!("Empty event batch, state unchanged");
            return &self.last_actions;
        }

        self.active_events.extend(events.iter().cloned());
        let window = config.max_active_events.max(1);
        let mut evicted = 0usize;
        while self.active_events.len() > window {
            self.active_events.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            debug!("Evicted {} events from active window (max {})", evicted, window);
        }

        let avg_severity = self.avg_severity();
        let risk = classify(avg_severity, config);
        let previous = self.lockdown_state;

        let mut actions = Vec::new();
        match risk {
            RiskLevel::Critical => {
                if previous != LockdownState::Full {
                    self.lockdown_state = LockdownState::Full;
                    actions.push(transition_action(
                        ActionType::EnterFullLockdown,
                        format!("Average severity {:.3} reached lockdown threshold", avg_severity),
                        avg_severity,
                        previous,
                        LockdownState::Full,
                    ));
                }
            }
            RiskLevel::Elevated => {
                if previous == LockdownState::None {
                    self.lockdown_state = LockdownState::Partial;
                    actions.push(transition_action(
                        ActionType::EnterPartialLockdown,
                        format!("Average severity {:.3} reached partial lock threshold", avg_severity),
                        avg_severity,
                        previous,
                        LockdownState::Partial,
                    ));
                }
            }
            RiskLevel::Normal => {
                if previous != LockdownState::None {
                    actions.push(transition_action(
                        ActionType::LiftLockdown,
                        format!("Average severity {:.3} back to normal", avg_severity),
                        avg_severity,
                        previous,
                        LockdownState::None,
                    ));
                }
                self.lockdown_state = LockdownState::None;
            }
        }

        self.risk_level = risk;
        self.last_actions = actions;

        match self.last_actions.first().map(|a| a.action_type) {
            Some(ActionType::EnterFullLockdown) | Some(ActionType::EnterPartialLockdown) => {
                warn!(
                    "🛡️ Lockdown {} → {} (risk={}, avg={:.3}, window={})",
                    previous,
                    self.lockdown_state,
                    risk,
                    avg_severity,
                    self.active_events.len()
                );
            }
            Some(ActionType::LiftLockdown) => {
                info!(
                    "Lockdown lifted {} → {} (avg={:.3})",
                    previous, self.lockdown_state, avg_severity
                );
            }
            None => {
                debug!(
                    "Risk {} (avg={:.3}), lockdown stays {}",
                    risk, avg_severity, self.lockdown_state
                );
            }
        }

        &self.last_actions
    }
}

fn transition_action(
    action_type: ActionType,
    reason: String,
    avg_severity: f64,
    from: LockdownState,
    to: LockdownState,
) -> DefenseAction {
    let mut metadata = Map::new();
    metadata.insert("avg_severity".to_string(), Value::Float(avg_severity));
    metadata.insert("previous_lockdown_state".to_string(), Value::from(from.as_str()));
    metadata.insert("lockdown_state".to_string(), Value::from(to.as_str()));
    DefenseAction::new(action_type, reason).with_metadata(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(severity: f64) -> DefenseEvent {
        DefenseEvent::new("test", severity, "unit")
    }

    #[test]
    fn test_classify_boundaries() {
        let config = NodeDefenseConfig::default();
        assert_eq!(classify(0.75, &config), RiskLevel::Critical);
        assert_eq!(classify(0.7499, &config), RiskLevel::Elevated);
        assert_eq!(classify(0.5, &config), RiskLevel::Elevated);
        assert_eq!(classify(0.4999, &config), RiskLevel::Normal);
        assert_eq!(classify(0.0, &config), RiskLevel::Normal);
    }

    #[test]
    fn test_partial_lockdown_scenario() {
        let events = vec![
            DefenseEvent::new("rpc_abuse", 0.6, "local"),
            DefenseEvent::new("sentinel_alert", 0.5, "sentinel"),
        ];
        let state = evaluate_defense(&events, &NodeDefenseConfig::default(), None);

        assert_eq!(state.risk_level, RiskLevel::Elevated);
        assert_eq!(state.lockdown_state, LockdownState::Partial);
        assert_eq!(state.last_actions.len(), 1);
        assert_eq!(state.last_actions[0].action_type, ActionType::EnterPartialLockdown);
    }

    #[test]
    fn test_full_lockdown_scenario() {
        let events = vec![
            DefenseEvent::new("dqsn_critical", 0.9, "dqsn"),
            DefenseEvent::new("rpc_abuse", 0.85, "local"),
        ];
        let state = evaluate_defense(&events, &NodeDefenseConfig::default(), None);

        assert_eq!(state.risk_level, RiskLevel::Critical);
        assert_eq!(state.lockdown_state, LockdownState::Full);
        assert_eq!(state.last_actions.len(), 1);
        assert_eq!(state.last_actions[0].action_type, ActionType::EnterFullLockdown);
        assert!(state.last_actions[0].reason.contains("0.875"));
    }

    #[test]
    fn test_full_lockdown_is_idempotent() {
        let config = NodeDefenseConfig::default();
        let mut state = NodeDefenseState::new();

        state.apply(&[ev(0.9), ev(0.85)], &config);
        assert_eq!(state.last_actions.len(), 1);

        let actions = state.apply(&[ev(0.95)], &config);
        assert!(actions.is_empty());
        assert_eq!(state.lockdown_state, LockdownState::Full);
        assert_eq!(state.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn test_full_never_downgrades_to_partial() {
        let config = NodeDefenseConfig::default();
        let mut state = evaluate_defense(&[ev(0.9)], &config, None);

        // average falls to ELEVATED: (0.9 + 0.3) / 2 = 0.6
        state.apply(&[ev(0.3)], &config);
        assert_eq!(state.risk_level, RiskLevel::Elevated);
        assert_eq!(state.lockdown_state, LockdownState::Full);
        assert!(state.last_actions.is_empty());
    }

    #[test]
    fn test_partial_escalates_to_full() {
        let config = NodeDefenseConfig::default();
        let mut state = evaluate_defense(&[ev(0.6)], &config, None);
        assert_eq!(state.lockdown_state, LockdownState::Partial);

        state.apply(&[ev(1.0), ev(1.0)], &config);
        assert_eq!(state.lockdown_state, LockdownState::Full);
        assert_eq!(state.last_actions[0].action_type, ActionType::EnterFullLockdown);
        assert_eq!(
            state.last_actions[0].metadata.as_ref().unwrap()["previous_lockdown_state"],
            Value::from("PARTIAL")
        );
    }

    #[test]
    fn test_lift_from_partial() {
        let config = NodeDefenseConfig::default();
        let mut state = evaluate_defense(&[ev(0.6)], &config, None);

        // (0.6 + 0.0 + 0.0) / 3 = 0.2
        state.apply(&[ev(0.0), ev(0.0)], &config);
        assert_eq!(state.risk_level, RiskLevel::Normal);
        assert_eq!(state.lockdown_state, LockdownState::None);
        assert_eq!(state.last_actions.len(), 1);
        assert_eq!(state.last_actions[0].action_type, ActionType::LiftLockdown);
    }

    #[test]
    fn test_lift_from_full() {
        let config = NodeDefenseConfig::default();
        let mut state = evaluate_defense(&[ev(0.8)], &config, None);
        assert_eq!(state.lockdown_state, LockdownState::Full);

        state.apply(&[ev(0.0), ev(0.0), ev(0.0)], &config);
        assert_eq!(state.lockdown_state, LockdownState::None);
        assert_eq!(state.last_actions[0].action_type, ActionType::LiftLockdown);
    }

    #[test]
    fn test_normal_without_lockdown_emits_nothing() {
        let state = evaluate_defense(&[ev(0.1)], &NodeDefenseConfig::default(), None);
        assert_eq!(state.risk_level, RiskLevel::Normal);
        assert!(state.last_actions.is_empty());
    }

    #[test]
    fn test_empty_batch_only_clears_actions() {
        let config = NodeDefenseConfig::default();
        let mut state = evaluate_defense(&[ev(0.6)], &config, None);
        let before = state.clone();

        state.apply(&[], &config);
        assert!(state.last_actions.is_empty());
        assert_eq!(state.risk_level, before.risk_level);
        assert_eq!(state.lockdown_state, before.lockdown_state);
        assert_eq!(state.active_events, before.active_events);
    }

    #[test]
    fn test_average_covers_history() {
        let config = NodeDefenseConfig::default();
        let mut state = evaluate_defense(&[ev(0.1), ev(0.1), ev(0.1)], &config, None);

        // a single 0.9 batch is diluted by history: (0.3 + 0.9) / 4 = 0.3
        state.apply(&[ev(0.9)], &config);
        assert_eq!(state.risk_level, RiskLevel::Normal);
        assert_eq!(state.active_events.len(), 4);
    }

    #[test]
    fn test_window_evicts_oldest() {
        let config = NodeDefenseConfig {
            max_active_events: 2,
            ..NodeDefenseConfig::default()
        };
        let mut state = evaluate_defense(&[ev(0.0), ev(0.0)], &config, None);

        // old zeros evicted, only the two 0.9 remain
        state.apply(&[ev(0.9), ev(0.9)], &config);
        assert_eq!(state.active_events.len(), 2);
        assert_eq!(state.risk_level, RiskLevel::Critical);
        assert_eq!(state.lockdown_state, LockdownState::Full);
    }
}
