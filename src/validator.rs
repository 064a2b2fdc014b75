//! Event & Request Validator
//!
//! Turns an untyped [`Value`] into an immutable [`AdnV3Request`], or rejects it
//! with exactly one reason code. Rules run in a fixed order and the first
//! violation aborts:
//!
//! 1. Request must be a mapping                         → INVALID_REQUEST
//! 2. Only the four contract keys at top level          → UNKNOWN_KEY
//! 3. No NaN / ±Infinity anywhere in the payload        → BAD_NUMBER
//! 4. `contract_version` int, `component` / `request_id` non-blank → INVALID_REQUEST
//! 5. `events` is a list of well-formed event mappings  → INVALID_REQUEST / UNKNOWN_KEY
//!
//! Nothing is coerced: out-of-range severity is rejected, not clamped.

use tracing::debug;

use crate::reason::ContractError;
use crate::types::DefenseEvent;
use crate::value::{Map, Value};

/// Allowed top-level request keys
pub const REQUEST_KEYS: [&str; 4] = ["contract_version", "component", "request_id", "events"];

/// Allowed keys inside one event record
pub const EVENT_KEYS: [&str; 4] = ["event_type", "severity", "source", "metadata"];

/// A validated, frozen request
#[derive(Debug, Clone, PartialEq)]
pub struct AdnV3Request {
    contract_version: i64,
    component: String,
    request_id: String,
    events: Vec<DefenseEvent>,
}

impl AdnV3Request {
    pub fn contract_version(&self) -> i64 {
        self.contract_version
    }

    /// Trimmed component name
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Trimmed request id
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn events(&self) -> &[DefenseEvent] {
        &self.events
    }

    /// Value form used for the context fingerprint
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("contract_version".to_string(), Value::Int(self.contract_version));
        map.insert("component".to_string(), Value::from(self.component.as_str()));
        map.insert("request_id".to_string(), Value::from(self.request_id.as_str()));
        map.insert(
            "events".to_string(),
            Value::Array(self.events.iter().map(DefenseEvent::to_value).collect()),
        );
        Value::Object(map)
    }
}

/// Validate a raw request
pub fn validate(raw: &Value) -> Result<AdnV3Request, ContractError> {
    // Rule 1
    let map = raw.as_object().ok_or_else(|| {
        ContractError::invalid_request(format!("request must be an object, got {}", raw.kind()))
    })?;

    // Rule 2
    reject_unknown_keys(map, &REQUEST_KEYS)?;

    // Rule 3: before any field-level check
    if raw.contains_bad_number() {
        debug!("Rejecting request: non-finite number in payload");
        return Err(ContractError::bad_number());
    }

    // Rule 4
    let contract_version = map
        .get("contract_version")
        .and_then(Value::as_i64)
        .ok_or_else(|| ContractError::invalid_request("contract_version must be an integer"))?;
    let component = required_text(map, "component")?;
    let request_id = required_text(map, "request_id")?;

    // Rule 5
    let raw_events = map
        .get("events")
        .and_then(Value::as_array)
        .ok_or_else(|| ContractError::invalid_request("events must be a list"))?;

    if let Some(pos) = raw_events.iter().position(|e| e.as_object().is_none()) {
        return Err(ContractError::invalid_request(format!(
            "events[{}] must be an object",
            pos
        )));
    }

    let events = raw_events
        .iter()
        .enumerate()
        .map(|(i, e)| parse_event(i, e))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(AdnV3Request {
        contract_version,
        component,
        request_id,
        events,
    })
}

/// Parse one event record (already known to be a mapping)
fn parse_event(index: usize, raw: &Value) -> Result<DefenseEvent, ContractError> {
    let map = raw
        .as_object()
        .ok_or_else(|| ContractError::invalid_request(format!("events[{}] must be an object", index)))?;

    reject_unknown_keys(map, &EVENT_KEYS)?;

    let event_type = required_text(map, "event_type")
        .map_err(|e| at_index(index, e))?;
    let source = required_text(map, "source").map_err(|e| at_index(index, e))?;

    let severity = map.get("severity").and_then(Value::as_f64).ok_or_else(|| {
        ContractError::invalid_request(format!("events[{}].severity must be a number", index))
    })?;
    if !(0.0..=1.0).contains(&severity) {
        return Err(ContractError::invalid_request(format!(
            "events[{}].severity {} outside [0, 1]",
            index, severity
        )));
    }

    let metadata = match map.get("metadata") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(meta)) => meta.clone(),
        Some(other) => {
            return Err(ContractError::invalid_request(format!(
                "events[{}].metadata must be an object, got {}",
                index,
                other.kind()
            )))
        }
    };

    Ok(DefenseEvent {
        event_type: event_type.to_string(),
        severity,
        source: source.to_string(),
        metadata,
    })
}

fn reject_unknown_keys(map: &Map, allowed: &[&str]) -> Result<(), ContractError> {
    match map.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(key) => Err(ContractError::unknown_key(key)),
        None => Ok(()),
    }
}

/// Non-blank string field, returned trimmed
fn required_text(map: &Map, key: &str) -> Result<String, ContractError> {
    match map.get(key).and_then(Value::as_str).map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(ContractError::invalid_request(format!(
            "{} must be a non-blank string",
            key
        ))),
    }
}

fn at_index(index: usize, err: ContractError) -> ContractError {
    ContractError::new(err.code, format!("events[{}].{}", index, err.detail))
}
