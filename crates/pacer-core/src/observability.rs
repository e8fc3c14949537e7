//! Status views for operators and tests.

use serde::{Deserialize, Serialize};

use crate::domain::{ActiveCall, AgentId, CallingAttempt};

/// Store-wide record counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCounts {
    pub available_leads: usize,
    pub assigned_leads: usize,
    pub calling_attempts: usize,
    pub active_calls: usize,
    pub leads_called: usize,
}

/// What one agent's engine currently looks like.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub agent_id: AgentId,
    pub dial_ratio: usize,
    pub session_open: bool,
    pub outstanding_dials: usize,
    pub available_leads: usize,
    pub calling_attempts: Vec<CallingAttempt>,
    pub active_call: Option<ActiveCall>,
}

/// Summary returned by `on_agent_logout`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutSummary {
    pub attempts_cleared: usize,
    pub active_call_cleared: bool,
}

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Safe to call from many tests; only the first call wins.
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pacer_core=debug")),
        )
        .with_test_writer()
        .try_init();
}
