//! Events - presence / telephony 側から届くライフサイクルイベント
//!
//! JSON での形:
//! ```json
//! {"event": "agent_login"}
//! {"event": "call_started", "phone": "19274718724"}
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::PhoneNumber;

/// PacingEvent は engine の 5 つの handler に 1:1 で対応
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PacingEvent {
    AgentLogin,
    AgentLogout,
    CallStarted { phone: PhoneNumber },
    CallFailed { phone: PhoneNumber },
    CallEnded { phone: PhoneNumber },
}

impl PacingEvent {
    /// ログ用の短い名前
    pub fn name(&self) -> &'static str {
        match self {
            Self::AgentLogin => "agent_login",
            Self::AgentLogout => "agent_logout",
            Self::CallStarted { .. } => "call_started",
            Self::CallFailed { .. } => "call_failed",
            Self::CallEnded { .. } => "call_ended",
        }
    }

    pub fn phone(&self) -> Option<&PhoneNumber> {
        match self {
            Self::AgentLogin | Self::AgentLogout => None,
            Self::CallStarted { phone }
            | Self::CallFailed { phone }
            | Self::CallEnded { phone } => Some(phone),
        }
    }
}

impl fmt::Display for PacingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.phone() {
            Some(phone) => write!(f, "{}({})", self.name(), phone),
            None => f.write_str(self.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_parse_from_tagged_json() {
        let login: PacingEvent = serde_json::from_str(r#"{"event":"agent_login"}"#).unwrap();
        assert_eq!(login, PacingEvent::AgentLogin);

        let started: PacingEvent =
            serde_json::from_str(r#"{"event":"call_started","phone":"19274718724"}"#).unwrap();
        assert_eq!(
            started,
            PacingEvent::CallStarted {
                phone: PhoneNumber::from("19274718724")
            }
        );
        assert_eq!(started.to_string(), "call_started(19274718724)");
    }

    #[test]
    fn unknown_event_is_rejected() {
        let parsed = serde_json::from_str::<PacingEvent>(r#"{"event":"call_parked"}"#);
        assert!(parsed.is_err());
    }
}
