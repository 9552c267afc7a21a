//! Strongly-typed identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one relay session: `doc-<unix-millis>-<9 hex chars>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let random = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("doc-{}-{}", millis, &random[..9]))
    }

    /// Accept an externally supplied id only if it has the generated shape.
    pub fn from_string(s: String) -> Result<Self, &'static str> {
        if s.is_empty() {
            return Err("SessionId cannot be empty");
        }
        let (millis, suffix) = s
            .strip_prefix("doc-")
            .and_then(|rest| rest.split_once('-'))
            .ok_or("SessionId must look like doc-<millis>-<suffix>")?;
        if millis.is_empty() || !millis.bytes().all(|b| b.is_ascii_digit()) {
            return Err("SessionId timestamp must be decimal millis");
        }
        if suffix.len() != 9 || !suffix.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err("SessionId suffix must be 9 lowercase hex chars");
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
