//! Dispatch - 1 回の dial cycle で起動する dial task 群
//!
//! # フロー
//! 1. 起動する attempt ごとに 1 本 `tokio::spawn`（`dial_ratio` 個の permit を持つ
//!    Semaphore で同時実行数を制限）
//! 2. 最初に解決した task の結果だけが oneshot で cycle に返る
//! 3. 残りは cycle が返った後も走り続け、結果は session の reactor に届く
//! 4. session が閉じたら未解決の task は結果を捨てて終わる
//!
//! 発信中の番号は `InFlight` に入り、task が解決（またはキャンセル）した時点で
//! 結果を送る前に外れる。

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore, oneshot};
use tokio::task::JoinHandle;

use super::session::{PendingReports, SessionHandle};
use crate::domain::{AgentId, DialId, DialReport, PhoneNumber};
use crate::ports::DialTransport;

type FirstSlot = Arc<Mutex<Option<oneshot::Sender<DialReport>>>>;

/// Phones with a dial task that has not resolved yet.
pub(crate) type InFlight = Arc<Mutex<HashSet<PhoneNumber>>>;

/// The batch as seen by the cycle that launched it.
pub(crate) struct DialBatch {
    first_rx: Option<oneshot::Receiver<DialReport>>,
    launched: usize,
}

impl DialBatch {
    fn empty() -> Self {
        Self {
            first_rx: None,
            launched: 0,
        }
    }

    pub(crate) fn launched(&self) -> usize {
        self.launched
    }

    /// Wait for the first dial of the batch to resolve.
    ///
    /// `None` if nothing was launched, or every task was cancelled.
    pub(crate) async fn first_resolved(self) -> Option<DialReport> {
        self.first_rx?.await.ok()
    }
}

/// Everything a batch needs, borrowed from the engine.
pub(crate) struct Dispatcher<'a> {
    pub(crate) agent_id: &'a AgentId,
    pub(crate) dial_ratio: usize,
    pub(crate) transport: &'a Arc<dyn DialTransport>,
    pub(crate) session: &'a SessionHandle,
    pub(crate) pending_reports: &'a PendingReports,
    pub(crate) in_flight: &'a InFlight,
}

impl Dispatcher<'_> {
    /// Spawn one dial task per `(dial_id, phone)`.
    ///
    /// The caller has already put every phone into `in_flight`.
    pub(crate) fn launch(
        &self,
        dials: Vec<(DialId, PhoneNumber)>,
    ) -> (DialBatch, Vec<JoinHandle<()>>) {
        if dials.is_empty() {
            return (DialBatch::empty(), Vec::new());
        }

        let (first_tx, first_rx) = oneshot::channel();
        let first: FirstSlot = Arc::new(Mutex::new(Some(first_tx)));
        let semaphore = Arc::new(Semaphore::new(self.dial_ratio));

        let launched = dials.len();
        let mut handles = Vec::with_capacity(launched);
        for (dial_id, phone) in dials {
            let task = DialTask {
                dial_id,
                agent_id: self.agent_id.clone(),
                phone,
                transport: Arc::clone(self.transport),
                semaphore: Arc::clone(&semaphore),
                first: Arc::clone(&first),
                session: self.session.clone(),
                pending_reports: self.pending_reports.clone(),
                in_flight: Arc::clone(self.in_flight),
            };
            handles.push(tokio::spawn(task.run()));
        }

        (
            DialBatch {
                first_rx: Some(first_rx),
                launched,
            },
            handles,
        )
    }
}

struct DialTask {
    dial_id: DialId,
    agent_id: AgentId,
    phone: PhoneNumber,
    transport: Arc<dyn DialTransport>,
    semaphore: Arc<Semaphore>,
    first: FirstSlot,
    session: SessionHandle,
    pending_reports: PendingReports,
    in_flight: InFlight,
}

impl DialTask {
    async fn run(self) {
        let mut shutdown_rx = self.session.shutdown_rx.clone();
        let dial = async {
            let _permit = Arc::clone(&self.semaphore).acquire_owned().await.ok()?;
            tracing::debug!(
                agent_id = %self.agent_id,
                dial_id = %self.dial_id,
                phone = %self.phone,
                "dialing lead"
            );
            Some(self.transport.dial(&self.agent_id, &self.phone).await)
        };

        let result = tokio::select! {
            biased;
            _ = shutdown_rx.wait_for(|closed| *closed) => None,
            result = dial => result,
        };
        self.in_flight.lock().await.remove(&self.phone);

        let Some(result) = result else {
            tracing::debug!(
                agent_id = %self.agent_id,
                dial_id = %self.dial_id,
                phone = %self.phone,
                "dial cancelled"
            );
            return;
        };

        let report = DialReport {
            dial_id: self.dial_id,
            agent_id: self.agent_id.clone(),
            phone: self.phone.clone(),
            result,
        };
        self.route(report).await;
    }

    /// First resolution goes back to the cycle; everything else to the reactor.
    async fn route(&self, report: DialReport) {
        let first_tx = self.first.lock().await.take();
        let report = match first_tx {
            Some(tx) => match tx.send(report) {
                Ok(()) => return,
                // the cycle stopped waiting; fall through to the reactor
                Err(report) => report,
            },
            None => report,
        };

        self.pending_reports.add();
        if let Err(mpsc_err) = self.session.reports_tx.send(report) {
            self.pending_reports.done();
            tracing::debug!(
                agent_id = %self.agent_id,
                phone = %mpsc_err.0.phone,
                "session closed; dropping dial report"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DialError, DialOutcome};
    use crate::ports::{IdGenerator, SystemClock, UlidGenerator};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::{mpsc, watch};

    /// Fails every number that starts with "9", after `delay`.
    struct SlowTransport {
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl DialTransport for SlowTransport {
        async fn dial(
            &self,
            _agent: &AgentId,
            phone: &PhoneNumber,
        ) -> Result<DialOutcome, DialError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if phone.as_str().starts_with('9') {
                Err(DialError::Unreachable {
                    phone: phone.clone(),
                })
            } else {
                Ok(DialOutcome::Dialing)
            }
        }
    }

    fn dials(phones: &[&str]) -> Vec<(DialId, PhoneNumber)> {
        let ids = UlidGenerator::new(SystemClock);
        phones
            .iter()
            .map(|p| (ids.generate_dial_id(), PhoneNumber::from(*p)))
            .collect()
    }

    fn phones_in_flight(phones: &[&str]) -> InFlight {
        Arc::new(Mutex::new(phones.iter().map(|p| PhoneNumber::from(*p)).collect()))
    }

    fn session() -> (
        watch::Sender<bool>,
        mpsc::UnboundedReceiver<DialReport>,
        SessionHandle,
    ) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        (
            shutdown_tx,
            reports_rx,
            SessionHandle {
                shutdown_rx,
                reports_tx,
            },
        )
    }

    #[tokio::test]
    async fn first_result_goes_to_cycle_and_rest_to_reactor() {
        let transport: Arc<dyn DialTransport> = Arc::new(SlowTransport {
            delay: Duration::from_millis(5),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let (_shutdown_tx, mut reports_rx, session) = session();
        let pending = PendingReports::new();
        let agent = AgentId::from("123");
        let in_flight = phones_in_flight(&["1", "9"]);
        let dispatcher = Dispatcher {
            agent_id: &agent,
            dial_ratio: 2,
            transport: &transport,
            session: &session,
            pending_reports: &pending,
            in_flight: &in_flight,
        };

        let (batch, handles) = dispatcher.launch(dials(&["1", "9"]));
        assert_eq!(batch.launched(), 2);

        let first = batch.first_resolved().await.unwrap();
        for h in handles {
            h.await.unwrap();
        }
        let second = reports_rx.recv().await.unwrap();

        let mut phones = vec![first.phone.clone(), second.phone.clone()];
        phones.sort();
        assert_eq!(phones, vec![PhoneNumber::from("1"), PhoneNumber::from("9")]);
        assert_eq!(pending.count(), 1);
        assert!(in_flight.lock().await.is_empty());
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_dial_ratio() {
        let slow = Arc::new(SlowTransport {
            delay: Duration::from_millis(10),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let transport: Arc<dyn DialTransport> = slow.clone();
        let (_shutdown_tx, _reports_rx, session) = session();
        let pending = PendingReports::new();
        let agent = AgentId::from("123");
        let in_flight = phones_in_flight(&["1", "2", "3", "4", "5"]);
        let dispatcher = Dispatcher {
            agent_id: &agent,
            dial_ratio: 2,
            transport: &transport,
            session: &session,
            pending_reports: &pending,
            in_flight: &in_flight,
        };

        let (_batch, handles) = dispatcher.launch(dials(&["1", "2", "3", "4", "5"]));
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(slow.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn closed_session_cancels_outstanding_dials() {
        let transport: Arc<dyn DialTransport> = Arc::new(SlowTransport {
            delay: Duration::from_secs(30),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let (shutdown_tx, mut reports_rx, session) = session();
        let pending = PendingReports::new();
        let agent = AgentId::from("123");
        let in_flight = phones_in_flight(&["1", "2"]);
        let dispatcher = Dispatcher {
            agent_id: &agent,
            dial_ratio: 2,
            transport: &transport,
            session: &session,
            pending_reports: &pending,
            in_flight: &in_flight,
        };

        let (batch, handles) = dispatcher.launch(dials(&["1", "2"]));
        shutdown_tx.send(true).unwrap();

        assert!(batch.first_resolved().await.is_none());
        for h in handles {
            tokio::time::timeout(Duration::from_secs(1), h)
                .await
                .unwrap()
                .unwrap();
        }
        assert!(reports_rx.try_recv().is_err());
        assert!(in_flight.lock().await.is_empty());
    }

    #[tokio::test]
    async fn empty_batch_resolves_to_none() {
        let transport: Arc<dyn DialTransport> = Arc::new(SlowTransport {
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let (_shutdown_tx, _reports_rx, session) = session();
        let pending = PendingReports::new();
        let agent = AgentId::from("123");
        let in_flight = phones_in_flight(&[]);
        let dispatcher = Dispatcher {
            agent_id: &agent,
            dial_ratio: 2,
            transport: &transport,
            session: &session,
            pending_reports: &pending,
            in_flight: &in_flight,
        };

        let (batch, handles) = dispatcher.launch(Vec::new());
        assert_eq!(batch.launched(), 0);
        assert!(handles.is_empty());
        assert!(batch.first_resolved().await.is_none());
    }
}
