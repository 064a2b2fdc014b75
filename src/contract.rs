//! Contract Facade (v3)
//!
//! One fail-closed entry point: validate → bind to contract → state machine
//! → decision → fingerprint. Every failure, anticipated or not, comes back as
//! an `ERROR` envelope; nothing propagates to the caller.
//!
//! The caller's [`NodeDefenseState`] is only replaced once the whole pipeline
//! succeeded, so a rejected request never touches it.

use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

use crate::config::{ConfigError, NodeDefenseConfig, CONTRACT_VERSION, DEFAULT_COMPONENT};
use crate::decision::{decide, Decision};
use crate::fingerprint::{self, FingerprintError};
use crate::reason::{ContractError, ReasonCode};
use crate::types::{DefenseAction, LockdownState, NodeDefenseState, RiskLevel};
use crate::validator::{self, AdnV3Request};
use crate::value::{Map, Value};

// =============================================================================
// RESPONSE ENVELOPE
// =============================================================================

/// Risk section of a successful response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskSummary {
    pub level: RiskLevel,
    pub lockdown_state: LockdownState,
}

/// Response metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseMeta {
    /// Always true: this contract fails closed
    pub fail_closed: bool,

    /// Fingerprint of the config used; absent on error envelopes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,

    /// Free-text accompaniment to an error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Evaluation response envelope
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResponse {
    pub decision: Decision,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_version: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskSummary>,

    pub actions: Vec<DefenseAction>,

    pub reason_codes: Vec<ReasonCode>,

    /// SHA-256 over request + resulting state (success) or the error envelope
    pub context_hash: String,

    pub meta: ResponseMeta,
}

impl EvaluationResponse {
    pub fn is_error(&self) -> bool {
        self.decision == Decision::Error
    }

    /// Error envelope for input that never reached the validator
    /// (e.g. a body that is not JSON at all)
    pub fn rejected(code: ReasonCode, detail: impl Into<String>) -> Self {
        error_response(&Value::Null, &ContractError::new(code, detail))
    }
}

// =============================================================================
// PIPELINE ERRORS
// =============================================================================

/// Anything that can stop an evaluation
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error("fingerprint failed: {0}")]
    Fingerprint(#[from] FingerprintError),

    #[error("defense config rejected: {0}")]
    Config(#[from] ConfigError),

    #[error("internal fault: {0}")]
    Internal(String),
}

impl EvaluationError {
    /// Reason code surfaced for this failure
    pub fn code(&self) -> ReasonCode {
        match self {
            EvaluationError::Contract(e) => e.code,
            // Unanticipated faults are downgraded to a plain invalid request
            EvaluationError::Config(_)
            | EvaluationError::Fingerprint(_)
            | EvaluationError::Internal(_) => {
                ReasonCode::InvalidRequest
            }
        }
    }

    fn into_contract_error(self) -> ContractError {
        match self {
            EvaluationError::Contract(e) => e,
            other => ContractError::new(other.code(), other.to_string()),
        }
    }
}

// =============================================================================
// FACADE
// =============================================================================

/// ADN v3 contract evaluator
#[derive(Debug, Clone)]
pub struct AdnV3 {
    config: NodeDefenseConfig,
    component: String,
}

impl Default for AdnV3 {
    fn default() -> Self {
        Self::new(NodeDefenseConfig::default())
    }
}

impl AdnV3 {
    pub fn new(config: NodeDefenseConfig) -> Self {
        Self {
            config,
            component: DEFAULT_COMPONENT.to_string(),
        }
    }

    /// Accept requests addressed to another component name. Stored trimmed,
    /// like the request side.
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = component.into().trim().to_string();
        self
    }

    pub fn config(&self) -> &NodeDefenseConfig {
        &self.config
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    /// Config fingerprint for status output, or the lossy
    /// `{"_": "unavailable"}` marker. Evaluations never use the marker: an
    /// unrepresentable config fails them closed.
    pub fn config_fingerprint(&self) -> Value {
        config_fingerprint_or_unavailable(&self.config)
    }

    /// Evaluate a raw request against the caller's state.
    ///
    /// On success `state` is replaced with the new state; on any error it is
    /// left exactly as it was.
    pub fn evaluate(&self, raw: &Value, state: &mut NodeDefenseState) -> EvaluationResponse {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run(raw, state)))
            .unwrap_or_else(|_| Err(EvaluationError::Internal("evaluation panicked".to_string())));

        match outcome {
            Ok((response, next_state)) => {
                *state = next_state;
                debug!(
                    "Request {} → {} (risk={}, lockdown={})",
                    response.request_id.as_deref().unwrap_or("-"),
                    response.decision,
                    state.risk_level,
                    state.lockdown_state
                );
                response
            }
            Err(err) => {
                let err = err.into_contract_error();
                warn!("Request rejected fail-closed: {}", err);
                error_response(raw, &err)
            }
        }
    }

    /// Evaluate JSON text. Text that does not parse is an invalid request;
    /// JSON has no NaN/Infinity literals, so the bad-number guard only ever
    /// fires for in-process callers.
    pub fn evaluate_json(&self, text: &str, state: &mut NodeDefenseState) -> EvaluationResponse {
        match Value::from_json_str(text) {
            Ok(raw) => self.evaluate(&raw, state),
            Err(e) => {
                warn!("Request body is not valid JSON: {}", e);
                EvaluationResponse::rejected(
                    ReasonCode::InvalidRequest,
                    format!("request is not valid JSON: {}", e),
                )
            }
        }
    }

    /// Evaluate against a fresh state, returning the response and the new state
    pub fn evaluate_fresh(&self, raw: &Value) -> (EvaluationResponse, NodeDefenseState) {
        let mut state = NodeDefenseState::new();
        let response = self.evaluate(raw, &mut state);
        (response, state)
    }

    fn run(
        &self,
        raw: &Value,
        state: &NodeDefenseState,
    ) -> Result<(EvaluationResponse, NodeDefenseState), EvaluationError> {
        // NaN thresholds would classify everything as NORMAL
        self.config.validate()?;

        let request = validator::validate(raw)?;
        self.bind(&request)?;

        let mut next = state.clone();
        next.apply(request.events(), &self.config);
        let decision = decide(&next);

        let config_hash = fingerprint::canonical_sha256(&self.config.to_value())?;
        let context = context_value(&request, &next, &config_hash);
        let context_hash = fingerprint::canonical_sha256(&context)?;

        let response = EvaluationResponse {
            decision,
            contract_version: Some(request.contract_version()),
            component: Some(request.component().to_string()),
            request_id: Some(request.request_id().to_string()),
            risk: Some(RiskSummary {
                level: next.risk_level,
                lockdown_state: next.lockdown_state,
            }),
            actions: next.last_actions.clone(),
            reason_codes: vec![ReasonCode::Ok],
            context_hash,
            meta: ResponseMeta {
                fail_closed: true,
                config_hash: Some(config_hash),
                detail: None,
            },
        };

        Ok((response, next))
    }

    /// Contract binding: version and addressee
    fn bind(&self, request: &AdnV3Request) -> Result<(), ContractError> {
        if request.contract_version() != CONTRACT_VERSION {
            return Err(ContractError::schema_version(
                request.contract_version(),
                CONTRACT_VERSION,
            ));
        }
        if request.component() != self.component {
            return Err(ContractError::invalid_request(format!(
                "component '{}' does not match '{}'",
                request.component(),
                self.component
            )));
        }
        Ok(())
    }
}

/// Config fingerprint as a hex string value, or the lossy marker when the
/// config is not representable (non-finite thresholds)
pub fn config_fingerprint_or_unavailable(config: &NodeDefenseConfig) -> Value {
    match fingerprint::canonical_sha256(&config.to_value()) {
        Ok(hash) => Value::String(hash),
        Err(e) => {
            warn!("Config fingerprint unavailable ({}); audit trail is degraded", e);
            fingerprint::unavailable_marker()
        }
    }
}

fn context_value(
    request: &AdnV3Request,
    state: &NodeDefenseState,
    config_hash: &str,
) -> Value {
    let mut map = Map::new();
    map.insert("request".to_string(), request.to_value());
    map.insert("state".to_string(), state.summary_value());
    map.insert("config".to_string(), Value::from(config_hash));
    Value::Object(map)
}

/// Build the ERROR envelope, echoing whatever correlation fields the raw
/// request carried with the right type
fn error_response(raw: &Value, err: &ContractError) -> EvaluationResponse {
    let raw_map = raw.as_object();
    let echo_text = |key: &str| {
        raw_map
            .and_then(|m| m.get(key))
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };
    let contract_version = raw_map
        .and_then(|m| m.get("contract_version"))
        .and_then(Value::as_i64);
    let component = echo_text("component");
    let request_id = echo_text("request_id");

    let mut context = Map::new();
    context.insert("decision".to_string(), Value::from(Decision::Error.as_str()));
    context.insert(
        "reason_codes".to_string(),
        Value::Array(vec![Value::from(err.code.as_str())]),
    );
    if let Some(v) = contract_version {
        context.insert("contract_version".to_string(), Value::Int(v));
    }
    if let Some(c) = &component {
        context.insert("component".to_string(), Value::from(c.as_str()));
    }
    if let Some(r) = &request_id {
        context.insert("request_id".to_string(), Value::from(r.as_str()));
    }
    let context_hash = fingerprint::canonical_sha256(&Value::Object(context))
        .unwrap_or_else(|_| fingerprint::sha256_hex(err.code.as_str().as_bytes()));

    EvaluationResponse {
        decision: Decision::Error,
        contract_version,
        component,
        request_id,
        risk: None,
        actions: Vec::new(),
        reason_codes: vec![err.code],
        context_hash,
        meta: ResponseMeta {
            fail_closed: true,
            config_hash: None,
            detail: Some(err.detail.clone()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::is_sha256_hex;
    use crate::types::{ActionType, DefenseEvent};
    use serde_json::json;

    fn raw(v: serde_json::Value) -> Value {
        Value::from(v)
    }

    fn request(id: &str, events: serde_json::Value) -> Value {
        raw(json!({
            "contract_version": 3,
            "component": "adn",
            "request_id": id,
            "events": events,
        }))
    }

    #[test]
    fn test_happy_path() {
        let v3 = AdnV3::default();
        let (resp, _) = v3.evaluate_fresh(&request(
            "happy",
            json!([{"event_type": "PING", "severity": 0.1, "source": "dqsn", "metadata": {"a": 1}}]),
        ));

        assert_eq!(resp.decision, Decision::Allow);
        assert_eq!(resp.contract_version, Some(3));
        assert_eq!(resp.component.as_deref(), Some("adn"));
        assert_eq!(resp.request_id.as_deref(), Some("happy"));
        assert_eq!(resp.reason_codes, vec![ReasonCode::Ok]);
        assert!(resp.meta.fail_closed);
        assert!(is_sha256_hex(&resp.context_hash));
        assert!(resp.meta.config_hash.is_some());
    }

    #[test]
    fn test_component_mismatch_fails_closed() {
        let v3 = AdnV3::default();
        let (resp, _) = v3.evaluate_fresh(&raw(json!({
            "contract_version": 3, "component": "not-adn", "request_id": "cmp", "events": [],
        })));

        assert_eq!(resp.decision, Decision::Error);
        assert!(resp.meta.fail_closed);
        assert_eq!(resp.reason_codes, vec![ReasonCode::InvalidRequest]);
        assert_eq!(resp.request_id.as_deref(), Some("cmp"));
    }

    #[test]
    fn test_schema_version_mismatch() {
        let v3 = AdnV3::default();
        let (resp, _) = v3.evaluate_fresh(&raw(json!({
            "contract_version": 2, "component": "adn", "request_id": "v2", "events": [],
        })));

        assert_eq!(resp.reason_codes, vec![ReasonCode::SchemaVersion]);
        assert_eq!(resp.contract_version, Some(2));
    }

    #[test]
    fn test_custom_component() {
        let v3 = AdnV3::default().with_component("dgb-adn");
        let (resp, _) = v3.evaluate_fresh(&raw(json!({
            "contract_version": 3, "component": "dgb-adn", "request_id": "c", "events": [],
        })));
        assert!(!resp.is_error());
    }

    #[test]
    fn test_error_leaves_state_untouched() {
        let v3 = AdnV3::default();
        let mut state = NodeDefenseState::new();
        v3.evaluate(
            &request("a", json!([{"event_type": "x", "severity": 0.6, "source": "s"}])),
            &mut state,
        );
        let before = state.clone();

        let resp = v3.evaluate(
            &request("b", json!([{"event_type": "x", "severity": 5.0, "source": "s"}])),
            &mut state,
        );
        assert!(resp.is_error());
        assert_eq!(state, before);
    }

    #[test]
    fn test_internal_fault_is_normalized() {
        // A caller-built state carrying a NaN severity cannot be fingerprinted
        let v3 = AdnV3::default();
        let mut state = NodeDefenseState::new();
        state.lockdown_state = LockdownState::Partial;
        state
            .active_events
            .push_back(DefenseEvent::new("corrupt", f64::NAN, "caller"));
        let before = state.clone();

        let resp = v3.evaluate(
            &request("nan-state", json!([{"event_type": "x", "severity": 0.1, "source": "s"}])),
            &mut state,
        );

        assert_eq!(resp.decision, Decision::Error);
        assert_eq!(resp.reason_codes, vec![ReasonCode::InvalidRequest]);
        assert!(resp.meta.fail_closed);
        assert_eq!(state.lockdown_state, before.lockdown_state);
        assert_eq!(state.active_events.len(), before.active_events.len());
    }

    #[test]
    fn test_rejected_envelope() {
        let resp = EvaluationResponse::rejected(ReasonCode::InvalidRequest, "body is not JSON");
        assert!(resp.is_error());
        assert!(is_sha256_hex(&resp.context_hash));
        assert_eq!(resp.meta.detail.as_deref(), Some("body is not JSON"));
        assert!(resp.request_id.is_none());
    }

    #[test]
    fn test_evaluate_json_text() {
        let v3 = AdnV3::default();
        let mut state = NodeDefenseState::new();

        let resp = v3.evaluate_json("{not json", &mut state);
        assert_eq!(resp.reason_codes, vec![ReasonCode::InvalidRequest]);

        let resp = v3.evaluate_json(
            r#"{"contract_version":3,"component":"adn","request_id":"t","events":[]}"#,
            &mut state,
        );
        assert_eq!(resp.decision, Decision::Allow);
    }

    #[test]
    fn test_config_fingerprint_marker_for_status() {
        let config = NodeDefenseConfig {
            lockdown_threshold: f64::NAN,
            ..NodeDefenseConfig::default()
        };
        assert!(fingerprint::is_unavailable_marker(
            &config_fingerprint_or_unavailable(&config)
        ));
        assert!(fingerprint::is_unavailable_marker(
            &AdnV3::new(config).config_fingerprint()
        ));
    }

    #[test]
    fn test_invalid_config_fails_closed() {
        let config = NodeDefenseConfig {
            lockdown_threshold: f64::NAN,
            partial_lock_threshold: f64::NAN,
            ..NodeDefenseConfig::default()
        };
        let v3 = AdnV3::new(config);
        let mut state = NodeDefenseState::new();

        let resp = v3.evaluate(
            &request(
                "nan-config",
                json!([
                    {"event_type": "dqsn_critical", "severity": 1.0, "source": "dqsn"},
                    {"event_type": "rpc_abuse", "severity": 0.95, "source": "local"},
                ]),
            ),
            &mut state,
        );

        assert_eq!(resp.decision, Decision::Error);
        assert_eq!(resp.reason_codes, vec![ReasonCode::InvalidRequest]);
        assert!(resp.meta.fail_closed);
        assert!(resp.risk.is_none());
        assert_eq!(state, NodeDefenseState::new());
    }

    #[test]
    fn test_inverted_thresholds_fail_closed() {
        let config = NodeDefenseConfig {
            partial_lock_threshold: 0.9,
            lockdown_threshold: 0.3,
            ..NodeDefenseConfig::default()
        };
        let (resp, _) = AdnV3::new(config).evaluate_fresh(&request("inverted", json!([])));
        assert!(resp.is_error());
    }

    #[test]
    fn test_configured_component_is_trimmed() {
        let v3 = AdnV3::default().with_component("  adn ");
        assert_eq!(v3.component(), "adn");

        let (resp, _) = v3.evaluate_fresh(&request("trim", json!([])));
        assert!(!resp.is_error());
    }

    #[test]
    fn test_success_carries_config_hash() {
        let (resp, _) = AdnV3::default().evaluate_fresh(&request("cfg", json!([])));
        let hash = resp.meta.config_hash.unwrap();
        assert!(is_sha256_hex(&hash));
    }

    #[test]
    fn test_response_json_shape() {
        let v3 = AdnV3::default();
        let (resp, _) = v3.evaluate_fresh(&request(
            "shape",
            json!([
                {"event_type": "dqsn_critical", "severity": 0.9, "source": "dqsn"},
                {"event_type": "rpc_abuse", "severity": 0.85, "source": "local"},
            ]),
        ));
        let json = serde_json::to_value(&resp).unwrap();

        assert_eq!(json["decision"], "BLOCK");
        assert_eq!(json["risk"]["level"], "CRITICAL");
        assert_eq!(json["risk"]["lockdown_state"], "FULL");
        assert_eq!(json["actions"][0]["action_type"], ActionType::EnterFullLockdown.as_str());
        assert_eq!(json["reason_codes"][0], "ADN_OK");
        assert_eq!(json["meta"]["fail_closed"], true);
        assert_eq!(json["context_hash"].as_str().unwrap().len(), 64);
    }
}
