//! SimulatedTransport - 開発用の dial transport
//!
//! 実際の発信はせず、latency を待ってから:
//! - 失敗リストにある番号 → `DialError::Rejected`
//! - それ以外 → store の発信履歴に記録して `DialOutcome::Dialing`

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{AgentId, DialError, DialOutcome, PhoneNumber};
use crate::ports::{DialTransport, Latency, LeadStore, NoLatency};

pub struct SimulatedTransport {
    store: Arc<dyn LeadStore>,
    latency: Arc<dyn Latency>,
    failing: HashSet<PhoneNumber>,
    /// Overrides `latency` for specific numbers (lets tests pin resolution order).
    phone_latency: HashMap<PhoneNumber, Duration>,
    dials: AtomicUsize,
}

impl SimulatedTransport {
    pub fn new(store: Arc<dyn LeadStore>) -> Self {
        Self {
            store,
            latency: Arc::new(NoLatency),
            failing: HashSet::new(),
            phone_latency: HashMap::new(),
            dials: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Arc<dyn Latency>) -> Self {
        self.latency = latency;
        self
    }

    /// Numbers whose dial always fails.
    pub fn with_failing<I, P>(mut self, phones: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PhoneNumber>,
    {
        self.failing.extend(phones.into_iter().map(Into::into));
        self
    }

    pub fn with_phone_latency(mut self, phone: impl Into<PhoneNumber>, delay: Duration) -> Self {
        self.phone_latency.insert(phone.into(), delay);
        self
    }

    /// How many times `dial` has been entered.
    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DialTransport for SimulatedTransport {
    async fn dial(&self, agent: &AgentId, phone: &PhoneNumber) -> Result<DialOutcome, DialError> {
        self.dials.fetch_add(1, Ordering::SeqCst);

        match self.phone_latency.get(phone) {
            Some(delay) => tokio::time::sleep(*delay).await,
            None => self.latency.pause().await,
        }

        if self.failing.contains(phone) {
            return Err(DialError::Rejected {
                phone: phone.clone(),
                reason: "carrier rejected the call".to_string(),
            });
        }

        // 履歴の書き込み失敗は dial の失敗ではない
        if let Err(e) = self.store.record_lead_called(agent, phone).await {
            tracing::warn!(
                agent_id = %agent,
                phone = %phone,
                error = %e,
                "failed to record dialed lead"
            );
        }
        Ok(DialOutcome::Dialing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryLeadStore;

    #[tokio::test]
    async fn successful_dial_is_recorded() {
        let store = InMemoryLeadStore::with_default_leads();
        let transport = SimulatedTransport::new(Arc::new(store.clone()));

        let outcome = transport
            .dial(&AgentId::from("123"), &PhoneNumber::from("11231231234"))
            .await
            .unwrap();

        assert_eq!(outcome, DialOutcome::Dialing);
        assert_eq!(transport.dial_count(), 1);
        let history = store.leads_called().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].phone_number, PhoneNumber::from("11231231234"));
    }

    #[tokio::test]
    async fn failing_number_is_rejected_and_not_recorded() {
        let store = InMemoryLeadStore::with_default_leads();
        let transport =
            SimulatedTransport::new(Arc::new(store.clone())).with_failing(["14719284724"]);

        let err = transport
            .dial(&AgentId::from("123"), &PhoneNumber::from("14719284724"))
            .await
            .unwrap_err();

        assert!(matches!(err, DialError::Rejected { .. }));
        assert!(store.leads_called().await.is_empty());
    }
}
