use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use larder_catalog::FoodItemId;
use larder_core::AggregateId;
use larder_events::EventEnvelope;
use larder_inventory::{LotEvent, LotId, LotStatus, lot};

use crate::read_model::ReadModelStore;

/// Queryable lot read model: the cached current state of one stock lot.
///
/// Derivable cache only: the lot's event stream is the system of record,
/// and [`crate::reporting::ReportingFacade::verify_lot_consistency`] checks
/// the two never drift apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotRecord {
    pub lot_id: LotId,
    pub food_item_id: FoodItemId,
    pub quantity: i64,
    pub purchased_at: DateTime<Utc>,
    pub expiry_at: DateTime<Utc>,
    pub status: LotStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Error)]
pub enum LotProjectionError {
    #[error("failed to deserialize lot event: {0}")]
    Deserialize(String),

    #[error("stream mismatch: {0}")]
    StreamMismatch(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Lot ledger projection.
///
/// Consumes published envelopes (JSON payloads) and maintains the lot read
/// model. Read models are disposable and rebuildable from the event stream.
#[derive(Debug)]
pub struct LotLedgerProjection<S>
where
    S: ReadModelStore<LotId, LotRecord>,
{
    store: S,
    cursors: RwLock<HashMap<AggregateId, u64>>,
}

impl<S> LotLedgerProjection<S>
where
    S: ReadModelStore<LotId, LotRecord>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    /// Query the read model for one lot.
    pub fn get(&self, lot_id: &LotId) -> Option<LotRecord> {
        self.store.get(lot_id)
    }

    /// List all lot records (disposable read model).
    pub fn list(&self) -> Vec<LotRecord> {
        self.store.list()
    }

    /// Apply a published envelope into the projection.
    ///
    /// - Ignores envelopes from non-lot streams (the bus broadcasts catalog
    ///   events too)
    /// - Enforces monotonic sequence per lot stream
    /// - Idempotent for at-least-once delivery (replays <= cursor are
    ///   ignored)
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), LotProjectionError> {
        if envelope.aggregate_type() != lot::AGGREGATE_TYPE {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if let Ok(mut cursors) = self.cursors.write() {
            let last = *cursors.get(&aggregate_id).unwrap_or(&0);

            if seq == 0 {
                return Err(LotProjectionError::NonMonotonicSequence { last, found: seq });
            }

            if seq <= last {
                // Duplicate or replay; safe to ignore.
                return Ok(());
            }

            if seq != last + 1 && last != 0 {
                return Err(LotProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let event: LotEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| LotProjectionError::Deserialize(e.to_string()))?;

            if event.lot_id().0 != aggregate_id {
                return Err(LotProjectionError::StreamMismatch(
                    "event lot_id does not match envelope aggregate_id".to_string(),
                ));
            }

            self.apply_event(&event);

            // Advance cursor after successful apply.
            cursors.insert(aggregate_id, seq);
        }

        Ok(())
    }

    fn apply_event(&self, event: &LotEvent) {
        match event {
            LotEvent::Added(e) => {
                self.store.upsert(
                    e.lot_id,
                    LotRecord {
                        lot_id: e.lot_id,
                        food_item_id: e.food_item_id,
                        quantity: e.quantity,
                        purchased_at: e.purchased_at,
                        expiry_at: e.expiry_at,
                        status: LotStatus::Available,
                        notes: e.notes.clone(),
                    },
                );
            }
            LotEvent::QuantityAdjusted(e) => {
                if let Some(mut record) = self.store.get(&e.lot_id) {
                    record.quantity += e.quantity_delta;
                    self.store.upsert(e.lot_id, record);
                }
            }
            LotEvent::Consumed(e) => {
                self.retire(e.lot_id, e.quantity_delta, LotStatus::Consumed);
            }
            LotEvent::Expired(e) => {
                self.retire(e.lot_id, e.quantity_delta, LotStatus::Expired);
            }
            LotEvent::Removed(e) => {
                self.retire(e.lot_id, e.quantity_delta, LotStatus::Removed);
            }
        }
    }

    fn retire(&self, lot_id: LotId, quantity_delta: i64, status: LotStatus) {
        if let Some(mut record) = self.store.get(&lot_id) {
            record.quantity += quantity_delta;
            record.status = status;
            self.store.upsert(lot_id, record);
        }
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), LotProjectionError> {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }
        self.store.clear();

        let mut envs: Vec<_> = envelopes.into_iter().collect();

        // Deterministic replay order: stream, then sequence.
        envs.sort_by_key(|e| (*e.aggregate_id().as_uuid().as_bytes(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}
