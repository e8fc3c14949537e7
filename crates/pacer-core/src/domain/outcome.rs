//! Outcome model: what a dial operation resolved to.

use serde::{Deserialize, Serialize};

use super::errors::DialError;
use super::ids::{AgentId, DialId, PhoneNumber};

/// Success marker returned by the transport.
///
/// Serialized as SCREAMING_SNAKE_CASE to match the telephony status names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DialOutcome {
    /// The carrier accepted the call and the lead's phone is ringing.
    Dialing,
}

/// Result of one dial task, routed either back to the cycle that launched it
/// (first to resolve) or to the session's failure reactor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialReport {
    pub dial_id: DialId,
    pub agent_id: AgentId,
    pub phone: PhoneNumber,
    pub result: Result<DialOutcome, DialError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dial_outcome_serializes_as_status_name() {
        let s = serde_json::to_string(&DialOutcome::Dialing).unwrap();
        assert_eq!(s, "\"DIALING\"");
    }
}
