//! Reason Codes
//!
//! Closed taxonomy of fail-closed codes shared by validation and decisioning.
//! Every rejection in the crate resolves to exactly one of these codes; the
//! accompanying detail text is for humans and never replaces the code.

use serde::{Deserialize, Serialize};

/// Machine-readable outcome code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReasonCode {
    /// Success / neutral
    #[serde(rename = "ADN_OK")]
    Ok,

    /// Request shape or field types are wrong
    #[serde(rename = "ADN_ERROR_INVALID_REQUEST")]
    InvalidRequest,

    /// Contract version is not the one this build speaks
    #[serde(rename = "ADN_ERROR_SCHEMA_VERSION")]
    SchemaVersion,

    /// A key outside the allow-list was present
    #[serde(rename = "ADN_ERROR_UNKNOWN_KEY")]
    UnknownKey,

    /// NaN or Infinity found somewhere in the payload
    #[serde(rename = "ADN_ERROR_BAD_NUMBER")]
    BadNumber,
}

impl ReasonCode {
    /// Canonical wire string
    pub const fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::Ok => "ADN_OK",
            ReasonCode::InvalidRequest => "ADN_ERROR_INVALID_REQUEST",
            ReasonCode::SchemaVersion => "ADN_ERROR_SCHEMA_VERSION",
            ReasonCode::UnknownKey => "ADN_ERROR_UNKNOWN_KEY",
            ReasonCode::BadNumber => "ADN_ERROR_BAD_NUMBER",
        }
    }

    /// Is this a failure code?
    pub fn is_error(&self) -> bool {
        !matches!(self, ReasonCode::Ok)
    }

    /// All codes, in declaration order
    pub fn all() -> Vec<ReasonCode> {
        vec![
            ReasonCode::Ok,
            ReasonCode::InvalidRequest,
            ReasonCode::SchemaVersion,
            ReasonCode::UnknownKey,
            ReasonCode::BadNumber,
        ]
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// A contract violation: one reason code plus optional detail
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {detail}")]
pub struct ContractError {
    /// The taxonomy code surfaced to callers
    pub code: ReasonCode,
    /// Human-readable context (never parsed)
    pub detail: String,
}

impl ContractError {
    pub fn new(code: ReasonCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }

    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self::new(ReasonCode::InvalidRequest, detail)
    }

    pub fn unknown_key(key: &str) -> Self {
        Self::new(ReasonCode::UnknownKey, format!("unexpected key '{}'", key))
    }

    pub fn bad_number() -> Self {
        Self::new(ReasonCode::BadNumber, "NaN or Infinity in payload")
    }

    pub fn schema_version(found: i64, expected: i64) -> Self {
        Self::new(
            ReasonCode::SchemaVersion,
            format!("contract_version {} not supported (expected {})", found, expected),
        )
    }
}
