//! Close metadata and the close-code taxonomy.
//!
//! Only [`CLOSE_NORMAL`] and [`CLOSE_GOING_AWAY`] end a channel for good.
//! Every other code, including the locally synthesized [`CLOSE_ABNORMAL`],
//! means the connection was lost and should be re-established.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{CLOSE_ABNORMAL, CLOSE_GOING_AWAY, CLOSE_NO_STATUS, CLOSE_NORMAL};

/// Why a connection closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseInfo {
    pub code: u16,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
}

impl CloseInfo {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// A voluntary close with code 1000.
    pub fn normal(reason: impl Into<String>) -> Self {
        Self::new(CLOSE_NORMAL, reason)
    }

    /// A connection lost without a close handshake (1006).
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self::new(CLOSE_ABNORMAL, reason)
    }

    /// A close frame that carried no status code (1005).
    pub fn no_status() -> Self {
        Self::new(CLOSE_NO_STATUS, "")
    }

    /// Returns `true` when the close was voluntary and must not trigger
    /// reconnection.
    pub fn is_terminal(&self) -> bool {
        is_terminal_code(self.code)
    }
}

impl fmt::Display for CloseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "code {}", self.code)
        } else {
            write!(f, "code {}: {}", self.code, self.reason)
        }
    }
}

/// Returns `true` for close codes that end a channel without reconnecting.
pub fn is_terminal_code(code: u16) -> bool {
    matches!(code, CLOSE_NORMAL | CLOSE_GOING_AWAY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_and_going_away_are_terminal() {
        assert!(is_terminal_code(1000));
        assert!(is_terminal_code(1001));
        assert!(CloseInfo::normal("bye").is_terminal());
    }

    #[test]
    fn everything_else_reconnects() {
        for code in [1002, 1003, 1005, 1006, 1008, 1011, 1012, 4000, 4999] {
            assert!(!is_terminal_code(code), "code {code} should reconnect");
        }
        assert!(!CloseInfo::abnormal("reset").is_terminal());
        assert!(!CloseInfo::no_status().is_terminal());
    }

    #[test]
    fn display_includes_reason_when_present() {
        assert_eq!(CloseInfo::new(1006, "").to_string(), "code 1006");
        assert_eq!(
            CloseInfo::normal("client disconnect").to_string(),
            "code 1000: client disconnect"
        );
    }

    #[test]
    fn empty_reason_omitted_from_json() {
        let json = serde_json::to_string(&CloseInfo::no_status()).unwrap();
        assert_eq!(json, r#"{"code":1005}"#);
        let parsed: CloseInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, CloseInfo::no_status());
    }
}
