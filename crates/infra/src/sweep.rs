//! Expiry sweep: the periodic task that auto-expires overdue lots.
//!
//! A sweep scans the lot read model for Available lots whose expiry date
//! has passed and expires each one through the engine, exactly as a manual
//! `MarkExpired` would, with `Actor::System`. Idempotency falls out of the
//! state machine: already-terminal lots never produce another event, so a
//! second sweep appends nothing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};

use larder_core::Actor;
use larder_events::{EventBus, EventEnvelope};
use larder_inventory::{LotId, LotStatus};

use crate::engine::{EngineError, LifecycleEngine};
use crate::event_store::EventStore;
use crate::projections::{LotLedgerProjection, LotRecord};
use crate::read_model::ReadModelStore;

/// What one sweep run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Lots transitioned to Expired by this run.
    pub expired: Vec<LotId>,
    /// Overdue lots that were already terminal or lost a race to a
    /// concurrent manual transition.
    pub skipped: usize,
}

/// Outcome of asking for a sweep run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    Completed(SweepReport),
    /// Another sweep is in flight; only one may be active at a time.
    AlreadyRunning,
}

/// Periodic expiry sweeper.
pub struct ExpirySweeper<S, B, LS>
where
    S: EventStore,
    B: EventBus<EventEnvelope<serde_json::Value>>,
    LS: ReadModelStore<LotId, LotRecord>,
{
    engine: Arc<LifecycleEngine<S, B>>,
    lots: Arc<LotLedgerProjection<LS>>,
    in_flight: AtomicBool,
}

impl<S, B, LS> ExpirySweeper<S, B, LS>
where
    S: EventStore,
    B: EventBus<EventEnvelope<serde_json::Value>>,
    LS: ReadModelStore<LotId, LotRecord>,
{
    pub fn new(engine: Arc<LifecycleEngine<S, B>>, lots: Arc<LotLedgerProjection<LS>>) -> Self {
        Self {
            engine,
            lots,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Run a single sweep at `now`.
    ///
    /// Returns `AlreadyRunning` without scanning if a sweep is in flight.
    pub fn run_once(&self, now: DateTime<Utc>) -> Result<SweepOutcome, EngineError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(SweepOutcome::AlreadyRunning);
        }

        let result = self.sweep(now);
        self.in_flight.store(false, Ordering::Release);
        result.map(SweepOutcome::Completed)
    }

    fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, EngineError> {
        let mut due: Vec<LotRecord> = self
            .lots
            .list()
            .into_iter()
            .filter(|record| record.status == LotStatus::Available && record.expiry_at <= now)
            .collect();
        due.sort_by_key(|record| record.expiry_at);

        let mut report = SweepReport::default();
        for record in due {
            match self.engine.mark_expired(record.lot_id, Actor::System, now) {
                Ok(outcome) => {
                    if outcome.event.is_some() {
                        report.expired.push(record.lot_id);
                    } else {
                        report.skipped += 1;
                    }
                }
                // Lost the race to a manual transition, or the read model
                // row was stale. Either way the lot is already settled.
                Err(
                    EngineError::InvalidTransition(_)
                    | EngineError::ConcurrentModification(_)
                    | EngineError::NotFound,
                ) => {
                    report.skipped += 1;
                }
                Err(other) => return Err(other),
            }
        }

        tracing::info!(
            expired = report.expired.len(),
            skipped = report.skipped,
            "expiry sweep completed"
        );

        Ok(report)
    }
}

/// Handle to a background sweep loop. Dropping it detaches the loop; call
/// [`SweepHandle::shutdown`] for an orderly stop.
pub struct SweepHandle {
    shutdown_tx: mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

impl SweepHandle {
    pub fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.thread.join();
    }
}

impl<S, B, LS> ExpirySweeper<S, B, LS>
where
    S: EventStore + 'static,
    B: EventBus<EventEnvelope<serde_json::Value>> + 'static,
    LS: ReadModelStore<LotId, LotRecord> + 'static,
{
    /// Spawn a background thread sweeping every `interval`.
    pub fn spawn_periodic(sweeper: Arc<Self>, interval: Duration) -> SweepHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let thread = std::thread::spawn(move || {
            loop {
                match shutdown_rx.recv_timeout(interval) {
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        if let Err(e) = sweeper.run_once(Utc::now()) {
                            tracing::warn!(error = %e, "expiry sweep failed");
                        }
                    }
                    Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        SweepHandle {
            shutdown_tx,
            thread,
        }
    }
}
