//! PacingEngine - agent 1 人分の pacing state machine
//!
//! engine 自体は永続状態を持たず、attempt / active call はすべて `LeadStore` にある。
//! engine が持つのは:
//! - 注入された `PacingConfig`（dial ratio など）
//! - ログイン中の `Session`（shutdown シグナル + failure reactor）
//! - 発信中（未解決）の番号の集合（同じ lead を同時に二重発信しないため）
//! - 直近に起動した dial task の handle（観測・待ち合わせ用）
//!
//! # Dial cycle
//! 1. replenish: `dial_ratio - 現在の attempt 数` だけ lead を取って attempt を作る
//! 2. dispatch: 現在の attempt 全部（新しく作った分だけではない）を並行に dial する。
//!    ただしまだ発信中のものは飛ばす
//! 3. 最初に解決した 1 本を待つ。成功なら終わり、失敗ならその attempt を消して 1 に戻る
//!
//! 失敗 → 再 replenish は再帰ではなくループで回すので、失敗が続いてもスタックは伸びない。

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::builder::EngineBuilder;
use super::dispatch::{Dispatcher, InFlight};
use super::session::{PendingReports, Session, SessionHandle};
use crate::config::{LeadShortagePolicy, PacingConfig};
use crate::domain::{AgentId, DialId, PacingError, PacingEvent, PhoneNumber, StoreError};
use crate::observability::{AgentSnapshot, LogoutSummary};
use crate::ports::{DialTransport, IdGenerator, LeadStore};

/// Event-driven dialer for a single agent.
///
/// Cloning is cheap; clones share the same session and state.
#[derive(Clone)]
pub struct PacingEngine {
    inner: Arc<EngineInner>,
}

pub(crate) struct EngineInner {
    agent_id: AgentId,
    config: PacingConfig,
    store: Arc<dyn LeadStore>,
    transport: Arc<dyn DialTransport>,
    ids: Arc<dyn IdGenerator>,

    /// Serialises count → acquire → insert across concurrent cycles.
    replenish_lock: Mutex<()>,
    session: Mutex<Option<Session>>,
    /// Attempts whose dial has not resolved yet.
    in_flight: InFlight,
    /// Dial tasks not yet known to be finished.
    tasks: Mutex<Vec<JoinHandle<()>>>,
    pending_reports: PendingReports,
}

impl PacingEngine {
    pub fn builder(agent_id: impl Into<AgentId>) -> EngineBuilder {
        EngineBuilder::new(agent_id.into())
    }

    pub(crate) fn from_parts(
        agent_id: AgentId,
        config: PacingConfig,
        store: Arc<dyn LeadStore>,
        transport: Arc<dyn DialTransport>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                agent_id,
                config,
                store,
                transport,
                ids,
                replenish_lock: Mutex::new(()),
                session: Mutex::new(None),
                in_flight: Arc::new(Mutex::new(HashSet::new())),
                tasks: Mutex::new(Vec::new()),
                pending_reports: PendingReports::new(),
            }),
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.inner.agent_id
    }

    pub fn config(&self) -> &PacingConfig {
        &self.inner.config
    }

    /// Open a session and dial up to `dial_ratio` leads.
    pub async fn on_agent_login(&self) -> Result<(), PacingError> {
        tracing::info!(agent_id = %self.inner.agent_id, "agent logged in");
        self.inner.ensure_session().await;
        self.inner.run_dial_cycle().await
    }

    /// Close the session and clear every attempt and the active call.
    ///
    /// Idempotent: logging out twice succeeds with an empty summary.
    pub async fn on_agent_logout(&self) -> Result<LogoutSummary, PacingError> {
        self.inner.logout().await
    }

    /// A lead picked up. Returns whether it became the agent's active call.
    pub async fn on_call_started(&self, phone: &PhoneNumber) -> Result<bool, PacingError> {
        self.inner.call_started(phone).await
    }

    /// A lead's dial failed: drop it and dial a replacement.
    pub async fn on_call_failed(&self, phone: &PhoneNumber) -> Result<(), PacingError> {
        self.inner.call_failed(phone).await
    }

    /// The agent hung up: free them and resume dialing.
    pub async fn on_call_ended(&self, phone: &PhoneNumber) -> Result<(), PacingError> {
        self.inner.call_ended(phone).await
    }

    /// Route an event to its handler.
    pub async fn handle(&self, event: &PacingEvent) -> Result<(), PacingError> {
        tracing::debug!(agent_id = %self.inner.agent_id, %event, "handling event");
        match event {
            PacingEvent::AgentLogin => self.on_agent_login().await,
            PacingEvent::AgentLogout => self.on_agent_logout().await.map(|_| ()),
            PacingEvent::CallStarted { phone } => self.on_call_started(phone).await.map(|_| ()),
            PacingEvent::CallFailed { phone } => self.on_call_failed(phone).await,
            PacingEvent::CallEnded { phone } => self.on_call_ended(phone).await,
        }
    }

    pub async fn snapshot(&self) -> Result<AgentSnapshot, PacingError> {
        self.inner.snapshot().await
    }

    /// Whether a session is open (logged in and not logged out).
    pub async fn is_session_open(&self) -> bool {
        self.inner
            .session
            .lock()
            .await
            .as_ref()
            .is_some_and(Session::is_running)
    }

    /// Wait until every dial launched so far has resolved and every detached
    /// failure has been replaced.
    pub async fn wait_for_outstanding_dials(&self) {
        loop {
            // pending を先に読む: reactor は pending > 0 の間しか task を増やさない
            let idle = self.inner.pending_reports.count() == 0;
            let handles = std::mem::take(&mut *self.inner.tasks.lock().await);
            if idle && handles.is_empty() {
                return;
            }
            for handle in handles {
                let _ = handle.await;
            }
            self.inner.pending_reports.idle().await;
        }
    }
}

impl EngineInner {
    async fn ensure_session(self: &Arc<Self>) {
        let mut session = self.session.lock().await;
        if session.as_ref().is_some_and(Session::is_running) {
            return;
        }
        self.in_flight.lock().await.clear();
        *session = Some(Session::open(
            Arc::downgrade(self),
            self.agent_id.clone(),
            self.pending_reports.clone(),
        ));
        tracing::info!(agent_id = %self.agent_id, "pacing session opened");
    }

    async fn session_handle(&self) -> Option<SessionHandle> {
        self.session.lock().await.as_ref().map(Session::handle)
    }

    async fn logout(&self) -> Result<LogoutSummary, PacingError> {
        if let Some(session) = self.session.lock().await.take() {
            session.close();
            tracing::info!(agent_id = %self.agent_id, "pacing session closed");
        }

        // cycle の途中で閉じた場合、その replenish が終わるのを待ってから消す
        let _guard = self.replenish_lock.lock().await;
        self.in_flight.lock().await.clear();

        let attempts_cleared = self
            .store
            .clear_calling_attempts(&self.agent_id)
            .await
            .map_err(|e| PacingError::store("on_agent_logout", &self.agent_id, e))?;
        let active_call_cleared = self
            .store
            .clear_active_call(&self.agent_id)
            .await
            .map_err(|e| PacingError::store("on_agent_logout", &self.agent_id, e))?;

        tracing::info!(
            agent_id = %self.agent_id,
            attempts_cleared,
            active_call_cleared,
            "agent logged out"
        );
        Ok(LogoutSummary {
            attempts_cleared,
            active_call_cleared,
        })
    }

    async fn call_started(&self, phone: &PhoneNumber) -> Result<bool, PacingError> {
        self.remove_attempt("on_call_started", phone).await?;

        let on_call = self
            .store
            .active_call(&self.agent_id)
            .await
            .map_err(|e| PacingError::store("on_call_started", &self.agent_id, e))?;
        if let Some(call) = on_call {
            tracing::warn!(
                agent_id = %self.agent_id,
                phone = %phone,
                active = %call.phone_number,
                "agent already on a call; not connecting lead"
            );
            return Ok(false);
        }

        self.store
            .insert_active_call(&self.agent_id, phone)
            .await
            .map_err(|e| PacingError::store("on_call_started", &self.agent_id, e))?;
        tracing::info!(agent_id = %self.agent_id, phone = %phone, "call started");
        Ok(true)
    }

    async fn call_ended(self: &Arc<Self>, phone: &PhoneNumber) -> Result<(), PacingError> {
        let ended = self
            .store
            .remove_active_call(&self.agent_id)
            .await
            .map_err(|e| PacingError::store("on_call_ended", &self.agent_id, e))?;
        if &ended.phone_number != phone {
            tracing::warn!(
                agent_id = %self.agent_id,
                phone = %phone,
                active = %ended.phone_number,
                "ended call does not match the active call"
            );
        }
        tracing::info!(agent_id = %self.agent_id, phone = %phone, "call ended");

        self.ensure_session().await;
        self.run_dial_cycle().await
    }

    async fn call_failed(self: &Arc<Self>, phone: &PhoneNumber) -> Result<(), PacingError> {
        self.remove_attempt("on_call_failed", phone).await?;
        tracing::info!(agent_id = %self.agent_id, phone = %phone, "call failed; replacing lead");

        self.ensure_session().await;
        self.run_dial_cycle().await
    }

    /// `on_call_failed` without reopening a closed session; the reactor calls this.
    pub(crate) async fn replace_failed_lead(
        self: &Arc<Self>,
        phone: &PhoneNumber,
    ) -> Result<(), PacingError> {
        if !self.discard_failed(phone).await? {
            return Ok(());
        }
        self.run_dial_cycle().await
    }

    /// Drop the attempt behind a failed dial. `false` if it is already gone.
    ///
    /// 発信中でない attempt は次の cycle で再発信されるので、同じ attempt の
    /// 失敗が 2 回届くことがある。置き換えは最初の 1 回だけ。
    async fn discard_failed(&self, phone: &PhoneNumber) -> Result<bool, PacingError> {
        match self.remove_attempt("on_call_failed", phone).await {
            Ok(()) => Ok(true),
            Err(PacingError::StoreOperationFailed {
                source: StoreError::AttemptNotFound { .. },
                ..
            }) => {
                tracing::debug!(
                    agent_id = %self.agent_id,
                    phone = %phone,
                    "failed attempt already removed; not replacing it again"
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Strict single-attempt removal.
    async fn remove_attempt(
        &self,
        operation: &'static str,
        phone: &PhoneNumber,
    ) -> Result<(), PacingError> {
        self.in_flight.lock().await.remove(phone);
        self.store
            .remove_calling_attempt(&self.agent_id, phone)
            .await
            .map_err(|e| PacingError::store(operation, &self.agent_id, e))
    }

    async fn run_dial_cycle(self: &Arc<Self>) -> Result<(), PacingError> {
        loop {
            let Some(session) = self.session_handle().await else {
                tracing::debug!(agent_id = %self.agent_id, "no open session; skipping dial cycle");
                return Ok(());
            };

            let created = self.replenish(&session).await?;

            let dials = self.dispatchable_attempts().await?;
            let dispatcher = Dispatcher {
                agent_id: &self.agent_id,
                dial_ratio: self.config.dial_ratio,
                transport: &self.transport,
                session: &session,
                pending_reports: &self.pending_reports,
                in_flight: &self.in_flight,
            };
            let (batch, handles) = dispatcher.launch(dials);
            self.track(handles).await;

            tracing::info!(
                agent_id = %self.agent_id,
                created,
                launched = batch.launched(),
                "dial cycle dispatched"
            );

            let Some(first) = batch.first_resolved().await else {
                return Ok(());
            };
            match &first.result {
                Ok(outcome) => {
                    tracing::debug!(
                        agent_id = %self.agent_id,
                        dial_id = %first.dial_id,
                        phone = %first.phone,
                        ?outcome,
                        "first dial of cycle resolved"
                    );
                    return Ok(());
                }
                Err(error) => {
                    tracing::info!(
                        agent_id = %self.agent_id,
                        dial_id = %first.dial_id,
                        phone = %first.phone,
                        error = %error,
                        "first dial of cycle failed; replacing lead"
                    );
                    if !self.discard_failed(&first.phone).await? {
                        // 別の経路がもう置き換えた
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Top the agent's attempts up to `dial_ratio`. Returns how many were created.
    ///
    /// Attempts created before a failure are kept.
    async fn replenish(&self, session: &SessionHandle) -> Result<usize, PacingError> {
        let _guard = self.replenish_lock.lock().await;

        let current = self
            .store
            .count_calling_attempts(&self.agent_id)
            .await
            .map_err(|e| PacingError::store("dial", &self.agent_id, e))?;
        let deficit = self.config.dial_ratio.saturating_sub(current);

        let mut created = 0;
        for _ in 0..deficit {
            if session.is_closed() {
                break;
            }
            let lead = match self.store.acquire_lead(&self.agent_id).await {
                Ok(lead) => lead,
                Err(StoreError::NoLeadsAvailable) => match self.config.on_lead_shortage {
                    LeadShortagePolicy::Tolerate => {
                        tracing::warn!(
                            agent_id = %self.agent_id,
                            created,
                            deficit,
                            "lead pool exhausted; dialing fewer leads than the dial ratio"
                        );
                        break;
                    }
                    LeadShortagePolicy::Fail => {
                        return Err(PacingError::NoLeadsAvailable {
                            agent_id: self.agent_id.clone(),
                        });
                    }
                },
                Err(e) => return Err(PacingError::store("dial", &self.agent_id, e)),
            };
            self.store
                .insert_calling_attempt(&self.agent_id, &lead.phone_number)
                .await
                .map_err(|e| PacingError::store("dial", &self.agent_id, e))?;
            created += 1;
        }
        Ok(created)
    }

    /// Every current attempt except those still being dialed, each tagged with
    /// a fresh dial id and marked in flight.
    async fn dispatchable_attempts(&self) -> Result<Vec<(DialId, PhoneNumber)>, PacingError> {
        let attempts = self
            .store
            .list_calling_attempts(&self.agent_id)
            .await
            .map_err(|e| PacingError::store("dial", &self.agent_id, e))?;

        let mut in_flight = self.in_flight.lock().await;
        Ok(attempts
            .into_iter()
            .filter(|a| in_flight.insert(a.phone_number.clone()))
            .map(|a| (self.ids.generate_dial_id(), a.phone_number))
            .collect())
    }

    async fn track(&self, handles: Vec<JoinHandle<()>>) {
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|h| !h.is_finished());
        tasks.extend(handles);
    }

    async fn snapshot(&self) -> Result<AgentSnapshot, PacingError> {
        let calling_attempts = self
            .store
            .list_calling_attempts(&self.agent_id)
            .await
            .map_err(|e| PacingError::store("snapshot", &self.agent_id, e))?;
        let active_call = self
            .store
            .active_call(&self.agent_id)
            .await
            .map_err(|e| PacingError::store("snapshot", &self.agent_id, e))?;
        let available_leads = self
            .store
            .available_leads()
            .await
            .map_err(|e| PacingError::store("snapshot", &self.agent_id, e))?;
        let session_open = self
            .session
            .lock()
            .await
            .as_ref()
            .is_some_and(Session::is_running);
        let outstanding_dials = self
            .tasks
            .lock()
            .await
            .iter()
            .filter(|h| !h.is_finished())
            .count();

        Ok(AgentSnapshot {
            agent_id: self.agent_id.clone(),
            dial_ratio: self.config.dial_ratio,
            session_open,
            outstanding_dials,
            available_leads,
            calling_attempts,
            active_call,
        })
    }
}
