//! In-memory lead store implementation.
//!
//! 開発・テスト・シミュレーション用。状態は 1 つの `tokio::sync::Mutex` の中にあり、
//! 各操作はロック内で完結するので count → insert のような読み書きも
//! 操作単位ではアトミックです。latency は必ずロックの外で待ちます。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{
    ActiveCall, AgentId, CallingAttempt, Lead, LeadCalled, PhoneNumber, StoreError,
};
use crate::observability::StoreCounts;
use crate::ports::{Clock, Latency, LeadStore, NoLatency, SystemClock};

/// Seed data of the demo deployment.
pub const DEFAULT_SEED_LEADS: [&str; 4] = [
    "11231231234",
    "12325828324",
    "14719284724",
    "19274718724",
];

/// In-memory store state.
#[derive(Default)]
struct InMemoryStoreState {
    /// Leads not yet handed out. Acquisition pops from the back.
    available: Vec<Lead>,

    /// Leads already handed to an agent.
    assigned: Vec<Lead>,

    /// Calling attempts of every agent, in insertion order.
    calling: Vec<CallingAttempt>,

    /// At most one active call per agent.
    on_call: HashMap<AgentId, ActiveCall>,

    /// Dial history.
    leads_called: Vec<LeadCalled>,
}

impl InMemoryStoreState {
    fn has_attempt(&self, agent: &AgentId, phone: &PhoneNumber) -> bool {
        self.calling
            .iter()
            .any(|a| &a.agent_id == agent && &a.phone_number == phone)
    }

    fn attempts_of<'a>(&'a self, agent: &'a AgentId) -> impl Iterator<Item = &'a CallingAttempt> {
        self.calling.iter().filter(move |a| &a.agent_id == agent)
    }

    fn counts(&self) -> StoreCounts {
        StoreCounts {
            available_leads: self.available.len(),
            assigned_leads: self.assigned.len(),
            calling_attempts: self.calling.len(),
            active_calls: self.on_call.len(),
            leads_called: self.leads_called.len(),
        }
    }
}

/// In-memory `LeadStore`.
#[derive(Clone)]
pub struct InMemoryLeadStore {
    state: Arc<Mutex<InMemoryStoreState>>,
    latency: Arc<dyn Latency>,
    clock: Arc<dyn Clock>,
}

impl InMemoryLeadStore {
    pub fn new<I, P>(seed: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PhoneNumber>,
    {
        let available = seed.into_iter().map(|p| Lead::new(p.into())).collect();
        Self {
            state: Arc::new(Mutex::new(InMemoryStoreState {
                available,
                ..Default::default()
            })),
            latency: Arc::new(NoLatency),
            clock: Arc::new(SystemClock),
        }
    }

    /// Store seeded with `DEFAULT_SEED_LEADS`.
    pub fn with_default_leads() -> Self {
        Self::new(DEFAULT_SEED_LEADS)
    }

    pub fn with_latency(mut self, latency: Arc<dyn Latency>) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Add leads to the available pool (upstream lead acquisition).
    pub async fn add_leads<I, P>(&self, leads: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PhoneNumber>,
    {
        let mut state = self.state.lock().await;
        state
            .available
            .extend(leads.into_iter().map(|p| Lead::new(p.into())));
    }

    pub async fn counts(&self) -> StoreCounts {
        self.state.lock().await.counts()
    }

    /// Calling attempts across every agent.
    pub async fn all_calling_attempts(&self) -> Vec<CallingAttempt> {
        self.state.lock().await.calling.clone()
    }

    pub async fn leads_called(&self) -> Vec<LeadCalled> {
        self.state.lock().await.leads_called.clone()
    }

    pub async fn assigned_leads(&self) -> Vec<Lead> {
        self.state.lock().await.assigned.clone()
    }
}

impl std::fmt::Debug for InMemoryLeadStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryLeadStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl LeadStore for InMemoryLeadStore {
    async fn acquire_lead(&self, agent: &AgentId) -> Result<Lead, StoreError> {
        self.latency.pause().await;
        let mut state = self.state.lock().await;
        let Some(mut lead) = state.available.pop() else {
            return Err(StoreError::NoLeadsAvailable);
        };
        lead.assign_to(agent.clone());
        state.assigned.push(lead.clone());
        Ok(lead)
    }

    async fn available_leads(&self) -> Result<usize, StoreError> {
        self.latency.pause().await;
        Ok(self.state.lock().await.available.len())
    }

    async fn insert_calling_attempt(
        &self,
        agent: &AgentId,
        phone: &PhoneNumber,
    ) -> Result<CallingAttempt, StoreError> {
        self.latency.pause().await;
        let mut state = self.state.lock().await;
        if state.has_attempt(agent, phone) {
            return Err(StoreError::DuplicateAttempt {
                agent_id: agent.clone(),
                phone: phone.clone(),
            });
        }
        if state
            .on_call
            .get(agent)
            .is_some_and(|call| &call.phone_number == phone)
        {
            return Err(StoreError::ActiveCallConflict {
                agent_id: agent.clone(),
                phone: phone.clone(),
            });
        }
        let attempt = CallingAttempt {
            agent_id: agent.clone(),
            phone_number: phone.clone(),
            created_at: self.clock.now(),
        };
        state.calling.push(attempt.clone());
        Ok(attempt)
    }

    async fn remove_calling_attempt(
        &self,
        agent: &AgentId,
        phone: &PhoneNumber,
    ) -> Result<(), StoreError> {
        self.latency.pause().await;
        let mut state = self.state.lock().await;
        let before = state.calling.len();
        state
            .calling
            .retain(|a| &a.agent_id != agent || &a.phone_number != phone);
        if state.calling.len() == before {
            return Err(StoreError::AttemptNotFound {
                agent_id: agent.clone(),
                phone: phone.clone(),
            });
        }
        Ok(())
    }

    async fn clear_calling_attempts(&self, agent: &AgentId) -> Result<usize, StoreError> {
        self.latency.pause().await;
        let mut state = self.state.lock().await;
        let before = state.calling.len();
        state.calling.retain(|a| &a.agent_id != agent);
        Ok(before - state.calling.len())
    }

    async fn count_calling_attempts(&self, agent: &AgentId) -> Result<usize, StoreError> {
        self.latency.pause().await;
        Ok(self.state.lock().await.attempts_of(agent).count())
    }

    async fn list_calling_attempts(
        &self,
        agent: &AgentId,
    ) -> Result<Vec<CallingAttempt>, StoreError> {
        self.latency.pause().await;
        Ok(self.state.lock().await.attempts_of(agent).cloned().collect())
    }

    async fn insert_active_call(
        &self,
        agent: &AgentId,
        phone: &PhoneNumber,
    ) -> Result<ActiveCall, StoreError> {
        self.latency.pause().await;
        let mut state = self.state.lock().await;
        if state.on_call.contains_key(agent) {
            return Err(StoreError::ActiveCallExists {
                agent_id: agent.clone(),
            });
        }
        let call = ActiveCall {
            agent_id: agent.clone(),
            phone_number: phone.clone(),
            connected_at: self.clock.now(),
        };
        state.on_call.insert(agent.clone(), call.clone());
        Ok(call)
    }

    async fn remove_active_call(&self, agent: &AgentId) -> Result<ActiveCall, StoreError> {
        self.latency.pause().await;
        self.state
            .lock()
            .await
            .on_call
            .remove(agent)
            .ok_or_else(|| StoreError::ActiveCallNotFound {
                agent_id: agent.clone(),
            })
    }

    async fn clear_active_call(&self, agent: &AgentId) -> Result<bool, StoreError> {
        self.latency.pause().await;
        Ok(self.state.lock().await.on_call.remove(agent).is_some())
    }

    async fn active_call(&self, agent: &AgentId) -> Result<Option<ActiveCall>, StoreError> {
        self.latency.pause().await;
        Ok(self.state.lock().await.on_call.get(agent).cloned())
    }

    async fn record_lead_called(
        &self,
        agent: &AgentId,
        phone: &PhoneNumber,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let dialed_at = self.clock.now();
        state.leads_called.push(LeadCalled {
            agent_id: agent.clone(),
            phone_number: phone.clone(),
            dialed_at,
        });
        Ok(())
    }
}
