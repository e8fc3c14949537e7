//! Session - agent のログイン中だけ生きる shutdown シグナルと failure reactor
//!
//! - `shutdown_tx` に `true` を送る（または drop する）と、未解決の dial task と
//!   reactor がそろって止まる
//! - dial task のうち cycle の「最初の 1 本」以外の結果は `reports_tx` 経由で
//!   reactor に届き、失敗はそれぞれ `on_call_failed` と同じ経路で置き換えられる

use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::engine::EngineInner;
use crate::domain::{AgentId, DialReport};

pub(crate) struct Session {
    shutdown_tx: watch::Sender<bool>,
    reports_tx: mpsc::UnboundedSender<DialReport>,
    reactor: JoinHandle<()>,
}

/// Cheap clone of what a dial cycle needs from the session.
#[derive(Clone)]
pub(crate) struct SessionHandle {
    pub(crate) shutdown_rx: watch::Receiver<bool>,
    pub(crate) reports_tx: mpsc::UnboundedSender<DialReport>,
}

impl SessionHandle {
    /// Logged out, or the engine went away.
    pub(crate) fn is_closed(&self) -> bool {
        *self.shutdown_rx.borrow() || self.reports_tx.is_closed()
    }
}

/// Reports handed to the reactor but not yet handled.
///
/// A `watch` so that waiters wake when the count drops back to zero.
#[derive(Clone)]
pub(crate) struct PendingReports(Arc<watch::Sender<usize>>);

impl PendingReports {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self(Arc::new(tx))
    }

    pub(crate) fn add(&self) {
        self.0.send_modify(|n| *n += 1);
    }

    pub(crate) fn done(&self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }

    pub(crate) fn count(&self) -> usize {
        *self.0.borrow()
    }

    /// Resolves once nothing is pending.
    pub(crate) async fn idle(&self) {
        let mut rx = self.0.subscribe();
        // sender は self が持っているので Err にはならない
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Session {
    /// Spawn the reactor for `engine`.
    ///
    /// The reactor holds only a `Weak` so that dropping the engine ends it.
    pub(crate) fn open(
        engine: Weak<EngineInner>,
        agent_id: AgentId,
        pending: PendingReports,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();

        let reactor = tokio::spawn(reactor_loop(
            engine,
            agent_id,
            reports_rx,
            shutdown_rx,
            pending,
        ));

        Self {
            shutdown_tx,
            reports_tx,
            reactor,
        }
    }

    pub(crate) fn handle(&self) -> SessionHandle {
        SessionHandle {
            shutdown_rx: self.shutdown_tx.subscribe(),
            reports_tx: self.reports_tx.clone(),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.reactor.is_finished()
    }

    /// Request shutdown. In-flight dials drop their results; the reactor stops
    /// after the report it is currently handling.
    pub(crate) fn close(self) {
        // receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }
}

async fn reactor_loop(
    engine: Weak<EngineInner>,
    agent_id: AgentId,
    mut reports_rx: mpsc::UnboundedReceiver<DialReport>,
    mut shutdown_rx: watch::Receiver<bool>,
    pending: PendingReports,
) {
    tracing::debug!(agent_id = %agent_id, "failure reactor started");

    loop {
        let report = tokio::select! {
            biased;
            _ = shutdown_rx.wait_for(|closed| *closed) => break,
            report = reports_rx.recv() => report,
        };
        let Some(report) = report else {
            break;
        };

        match &report.result {
            Ok(outcome) => {
                tracing::debug!(
                    agent_id = %agent_id,
                    dial_id = %report.dial_id,
                    phone = %report.phone,
                    ?outcome,
                    "detached dial resolved"
                );
            }
            Err(error) => {
                let Some(engine) = engine.upgrade() else {
                    pending.done();
                    break;
                };
                tracing::info!(
                    agent_id = %agent_id,
                    dial_id = %report.dial_id,
                    phone = %report.phone,
                    error = %error,
                    "detached dial failed; replacing lead"
                );
                // 呼び出し元の handler はもう返っているので、ここではログに残すしかない
                if let Err(e) = engine.replace_failed_lead(&report.phone).await {
                    tracing::warn!(
                        agent_id = %agent_id,
                        phone = %report.phone,
                        error = %e,
                        "failed to replace lead after detached dial failure"
                    );
                }
            }
        }
        pending.done();
    }

    // 止まった後に残っている報告は捨てる
    reports_rx.close();
    while reports_rx.try_recv().is_ok() {
        pending.done();
    }
    tracing::debug!(agent_id = %agent_id, "failure reactor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn idle_wakes_waiter_once_reports_drain() {
        let pending = PendingReports::new();
        pending.add();
        pending.add();

        let waiter = tokio::spawn({
            let pending = pending.clone();
            async move { pending.idle().await }
        });

        pending.done();
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        pending.done();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.count(), 0);
    }

    #[tokio::test]
    async fn idle_returns_immediately_when_nothing_pending() {
        let pending = PendingReports::new();
        tokio::time::timeout(Duration::from_millis(100), pending.idle())
            .await
            .unwrap();
    }
}
