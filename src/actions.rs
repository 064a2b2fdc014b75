//! Node actions
//!
//! Turns the defense state into the concrete RPC policy a node should run
//! with, and defines the seam where real executors plug in. The core itself
//! never touches a node.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::NodeDefenseConfig;
use crate::types::{ActionType, DefenseAction, LockdownState, NodeDefenseState};

/// Rate-limit divisor applied during PARTIAL lockdown
pub const PARTIAL_RATE_DIVISOR: u32 = 10;

/// RPC and withdrawal limits derived from the lockdown state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcPolicy {
    pub rpc_enabled: bool,

    /// Requests per minute
    pub rpc_rate_limit: u32,

    pub max_withdrawals_per_min: u32,

    /// Operator-facing notes, prefixed with the lockdown tag
    pub notes: Vec<String>,
}

/// Derive the RPC policy for the state's current lockdown level
pub fn build_rpc_policy_from_state(state: &NodeDefenseState, config: &NodeDefenseConfig) -> RpcPolicy {
    match state.lockdown_state {
        LockdownState::None => RpcPolicy {
            rpc_enabled: true,
            rpc_rate_limit: config.rpc_rate_limit,
            max_withdrawals_per_min: config.max_withdrawals_per_min,
            notes: Vec::new(),
        },
        LockdownState::Partial => RpcPolicy {
            rpc_enabled: true,
            rpc_rate_limit: (config.rpc_rate_limit / PARTIAL_RATE_DIVISOR).max(1),
            max_withdrawals_per_min: config.max_withdrawals_per_min / 2,
            notes: vec![format!(
                "PARTIAL_LOCKDOWN: RPC throttled, withdrawals halved (risk={})",
                state.risk_level
            )],
        },
        LockdownState::Full => RpcPolicy {
            rpc_enabled: false,
            rpc_rate_limit: 0,
            max_withdrawals_per_min: 0,
            notes: vec![format!(
                "FULL_LOCKDOWN: RPC disabled, withdrawals frozen (risk={})",
                state.risk_level
            )],
        },
    }
}

// =============================================================================
// EXECUTORS
// =============================================================================

/// Applies defense actions to a real node (RPC toggles, config reloads, ...)
pub trait ActionExecutor {
    fn apply(&mut self, actions: &[DefenseAction], policy: &RpcPolicy);
}

/// Executor that only logs intent
#[derive(Debug, Default)]
pub struct LoggingExecutor {
    applied: u64,
}

impl LoggingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of actions logged so far
    pub fn applied(&self) -> u64 {
        self.applied
    }
}

impl ActionExecutor for LoggingExecutor {
    fn apply(&mut self, actions: &[DefenseAction], policy: &RpcPolicy) {
        for action in actions {
            self.applied += 1;
            match action.action_type {
                ActionType::LiftLockdown => {
                    info!("🔓 {}: {}", action.action_type, action.reason)
                }
                _ => warn!("🔒 {}: {}", action.action_type, action.reason),
            }
        }

        if !actions.is_empty() {
            info!(
                "RPC policy: enabled={}, rate={}/min, withdrawals={}/min",
                policy.rpc_enabled, policy.rpc_rate_limit, policy.max_withdrawals_per_min
            );
        }
    }
}
