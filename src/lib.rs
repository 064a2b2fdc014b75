//! ADN Node Defense
//!
//! Fail-closed defense core for a blockchain node: validates event batches
//! under a strict versioned contract, folds them into a per-node lockdown
//! state machine, and answers with a deterministic, fingerprinted decision.
//!
//! ## Pipeline
//!
//! ```text
//! raw request ──► validator ──► contract binding ──► state machine ──► decision
//!                    │                                    │               │
//!                    └──── ERROR + reason code ◄──────────┴── fingerprint ┘
//! ```
//!
//! The core is synchronous and owns no state: the caller keeps one
//! [`NodeDefenseState`] per node and threads it through [`AdnV3::evaluate`].
//! The `api` module wraps exactly that in an HTTP service.

pub mod actions;
pub mod adaptive;
pub mod api;
pub mod config;
pub mod contract;
pub mod decision;
pub mod engine;
pub mod fingerprint;
pub mod reason;
pub mod types;
pub mod validator;
pub mod value;

#[cfg(test)]
mod tests;

pub use actions::{build_rpc_policy_from_state, ActionExecutor, LoggingExecutor, RpcPolicy};
pub use adaptive::{build_adaptive_event, emit_adaptive_event, AdaptiveEvent, AdaptiveSink, AdnSignal};
pub use config::{NodeDefenseConfig, ServiceConfig, CONTRACT_VERSION};
pub use contract::{AdnV3, EvaluationResponse};
pub use decision::{decide, Decision};
pub use engine::evaluate_defense;
pub use fingerprint::{canonical_bytes, canonical_sha256, FingerprintError};
pub use reason::{ContractError, ReasonCode};
pub use types::{ActionType, DefenseAction, DefenseEvent, LockdownState, NodeDefenseState, RiskLevel};
pub use validator::{validate, AdnV3Request};
pub use value::{Map, Value};
