//! Errors - エラー型と分類
//!
//! - `StoreError`: lead store が返すエラー（`LeadStore` 実装が生成する）
//! - `DialError`: transport の失敗。呼び出し元には返らず `on_call_failed` 経路に乗る
//! - `PacingError`: engine の handler が event source に返すエラー

use thiserror::Error;

use super::ids::{AgentId, PhoneNumber};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("no new leads found")]
    NoLeadsAvailable,

    #[error("no calling attempt for agent {agent_id} and lead {phone}")]
    AttemptNotFound {
        agent_id: AgentId,
        phone: PhoneNumber,
    },

    #[error("lead {phone} is already being called by agent {agent_id}")]
    DuplicateAttempt {
        agent_id: AgentId,
        phone: PhoneNumber,
    },

    #[error("lead {phone} is the active call of agent {agent_id}")]
    ActiveCallConflict {
        agent_id: AgentId,
        phone: PhoneNumber,
    },

    #[error("agent {agent_id} is already on a call")]
    ActiveCallExists { agent_id: AgentId },

    #[error("agent {agent_id} is not on a call")]
    ActiveCallNotFound { agent_id: AgentId },

    /// Backend failure (connection lost, write rejected, ...).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A dial that did not reach the lead.
///
/// This is an outcome, not an exception: it feeds `on_call_failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DialError {
    #[error("dial to {phone} rejected: {reason}")]
    Rejected { phone: PhoneNumber, reason: String },

    #[error("lead {phone} unreachable")]
    Unreachable { phone: PhoneNumber },
}

/// Error surfaced synchronously to the event source.
#[derive(Debug, Error)]
pub enum PacingError {
    #[error("no lead available to dial for agent {agent_id}")]
    NoLeadsAvailable { agent_id: AgentId },

    #[error("[{operation}] store operation failed for agent {agent_id}: {source}")]
    StoreOperationFailed {
        operation: &'static str,
        agent_id: AgentId,
        #[source]
        source: StoreError,
    },
}

impl PacingError {
    pub(crate) fn store(operation: &'static str, agent_id: &AgentId, source: StoreError) -> Self {
        Self::StoreOperationFailed {
            operation,
            agent_id: agent_id.clone(),
            source,
        }
    }

    /// The store error behind this failure, if any.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::StoreOperationFailed { source, .. } => Some(source),
            Self::NoLeadsAvailable { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn store_failure_message_names_operation_and_agent() {
        let err = PacingError::store(
            "on_call_started",
            &AgentId::from("123"),
            StoreError::AttemptNotFound {
                agent_id: AgentId::from("123"),
                phone: PhoneNumber::from("19274718724"),
            },
        );

        let msg = err.to_string();
        assert!(msg.starts_with("[on_call_started]"));
        assert!(msg.contains("agent 123"));
        assert!(err.source().is_some());
        assert!(matches!(
            err.store_error(),
            Some(StoreError::AttemptNotFound { .. })
        ));
    }
}
