//! Decision Mapper
//!
//! Coarse tag consumed by node-management layers. Risk level and lockdown
//! state each escalate independently, so a held lockdown keeps the decision
//! restrictive even while momentary risk reads NORMAL.

use serde::{Deserialize, Serialize};

use crate::types::{LockdownState, NodeDefenseState, RiskLevel};

/// Externally consumed decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Allow,
    Warn,
    Block,

    /// Fail-closed contract error; never produced by [`decide`]
    Error,
}

impl Decision {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Decision::Allow => "ALLOW",
            Decision::Warn => "WARN",
            Decision::Block => "BLOCK",
            Decision::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a state to its decision
pub fn decide(state: &NodeDefenseState) -> Decision {
    decide_levels(state.risk_level, state.lockdown_state)
}

/// Map a (risk, lockdown) pair to its decision
pub fn decide_levels(risk: RiskLevel, lockdown: LockdownState) -> Decision {
    if risk == RiskLevel::Critical || lockdown == LockdownState::Full {
        Decision::Block
    } else if risk == RiskLevel::Elevated || lockdown == LockdownState::Partial {
        Decision::Warn
    } else {
        Decision::Allow
    }
}
