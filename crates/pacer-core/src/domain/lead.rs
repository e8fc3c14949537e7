//! Lead-side records owned by the lead store.
//!
//! The engine only ever references these by `(AgentId, PhoneNumber)`; the
//! store is the single writer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AgentId, PhoneNumber};

/// A phone number eligible to be dialed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub phone_number: PhoneNumber,
    pub called: bool,
    pub owning_agent: Option<AgentId>,
}

impl Lead {
    pub fn new(phone_number: PhoneNumber) -> Self {
        Self {
            phone_number,
            called: false,
            owning_agent: None,
        }
    }

    /// Hand the lead to `agent` (consumed from the available pool).
    pub fn assign_to(&mut self, agent: AgentId) {
        self.called = true;
        self.owning_agent = Some(agent);
    }
}

/// One lead currently being dialed on behalf of one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallingAttempt {
    pub agent_id: AgentId,
    pub phone_number: PhoneNumber,
    pub created_at: DateTime<Utc>,
}

/// The single lead an agent is connected to (post pickup).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveCall {
    pub agent_id: AgentId,
    pub phone_number: PhoneNumber,
    pub connected_at: DateTime<Utc>,
}

/// History entry: the transport actually placed a dial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadCalled {
    pub agent_id: AgentId,
    pub phone_number: PhoneNumber,
    pub dialed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_marks_lead_called() {
        let mut lead = Lead::new(PhoneNumber::from("11231231234"));
        assert!(!lead.called);
        assert_eq!(lead.owning_agent, None);

        lead.assign_to(AgentId::from("123"));
        assert!(lead.called);
        assert_eq!(lead.owning_agent, Some(AgentId::from("123")));
    }
}
