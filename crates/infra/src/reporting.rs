//! Query/reporting façade: read-only views over lots and their history.
//!
//! Reads are lock-free snapshot reads of the read models and may trail an
//! in-flight write by one projection hop; nothing here mutates state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use larder_catalog::FoodItemId;
use larder_core::{Actor, Aggregate};
use larder_events::Event;
use larder_inventory::{ExpiryRisk, LotAction, LotEvent, LotId, LotStatus, StockLot, days_left};

use crate::event_store::{EventStore, EventStoreError};
use crate::projections::{CatalogProjection, FoodItemRecord, LotLedgerProjection, LotRecord};
use crate::read_model::ReadModelStore;

#[derive(Debug, Error)]
pub enum ReportingError {
    #[error("failed to decode stored event: {0}")]
    Deserialize(String),

    #[error("storage unavailable: {0}")]
    Storage(String),
}

impl From<EventStoreError> for ReportingError {
    fn from(value: EventStoreError) -> Self {
        ReportingError::Storage(value.to_string())
    }
}

/// One row of the expiring-soon report.
#[derive(Debug, Clone)]
pub struct ExpiringLot {
    pub lot: LotRecord,
    /// Display name from the catalog read model, if it has caught up.
    pub food_item_name: Option<String>,
    pub days_left: i64,
    pub risk: ExpiryRisk,
}

/// One entry of a lot's action history, oldest first.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub event_id: Uuid,
    pub sequence_number: u64,
    pub lot_id: LotId,
    pub action: LotAction,
    pub quantity_delta: i64,
    pub occurred_at: DateTime<Utc>,
    pub actor: Actor,
}

/// Outcome of replaying a lot's log against its cached read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LotConsistency {
    Consistent {
        status: LotStatus,
        quantity: i64,
    },
    Divergent {
        cached: Option<(LotStatus, i64)>,
        replayed: (LotStatus, i64),
    },
    /// No stream exists for this lot id.
    UnknownLot,
}

/// Read-only reporting façade composed from the event store and the two
/// projections.
pub struct ReportingFacade<ES, LS, CS>
where
    ES: EventStore,
    LS: ReadModelStore<LotId, LotRecord>,
    CS: ReadModelStore<FoodItemId, FoodItemRecord>,
{
    store: ES,
    lots: Arc<LotLedgerProjection<LS>>,
    catalog: Arc<CatalogProjection<CS>>,
}

impl<ES, LS, CS> ReportingFacade<ES, LS, CS>
where
    ES: EventStore,
    LS: ReadModelStore<LotId, LotRecord>,
    CS: ReadModelStore<FoodItemId, FoodItemRecord>,
{
    pub fn new(
        store: ES,
        lots: Arc<LotLedgerProjection<LS>>,
        catalog: Arc<CatalogProjection<CS>>,
    ) -> Self {
        Self {
            store,
            lots,
            catalog,
        }
    }

    /// Current snapshot of one lot.
    pub fn get_lot(&self, lot_id: &LotId) -> Option<LotRecord> {
        self.lots.get(lot_id)
    }

    /// All food item definitions (catalog management listing).
    pub fn list_food_items(&self) -> Vec<FoodItemRecord> {
        self.catalog.list()
    }

    /// Available lots at High or Medium risk within `threshold_days`,
    /// ascending by expiry date.
    pub fn list_expiring_soon(&self, threshold_days: i64, now: DateTime<Utc>) -> Vec<ExpiringLot> {
        let mut expiring: Vec<ExpiringLot> = self
            .lots
            .list()
            .into_iter()
            .filter(|record| record.status == LotStatus::Available)
            .filter_map(|record| {
                let risk = larder_inventory::risk::classify(record.status, record.expiry_at, now);
                if !matches!(risk, ExpiryRisk::High | ExpiryRisk::Medium) {
                    return None;
                }

                let left = days_left(record.expiry_at, now);
                if left > threshold_days {
                    return None;
                }

                let food_item_name = self
                    .catalog
                    .get(&record.food_item_id)
                    .map(|item| item.name);

                Some(ExpiringLot {
                    lot: record,
                    food_item_name,
                    days_left: left,
                    risk,
                })
            })
            .collect();

        expiring.sort_by_key(|e| e.lot.expiry_at);
        expiring
    }

    /// Ordered action history for a lot, oldest first.
    ///
    /// Decoded straight from the event stream; this is the audit trail the
    /// cached lot state derives from.
    pub fn history(&self, lot_id: &LotId) -> Result<Vec<HistoryEntry>, ReportingError> {
        let stream = self.store.load_stream(lot_id.0)?;

        stream
            .into_iter()
            .map(|stored| {
                let event: LotEvent = serde_json::from_value(stored.payload)
                    .map_err(|e| ReportingError::Deserialize(e.to_string()))?;

                Ok(HistoryEntry {
                    event_id: stored.event_id,
                    sequence_number: stored.sequence_number,
                    lot_id: event.lot_id(),
                    action: event.action(),
                    quantity_delta: event.quantity_delta(),
                    occurred_at: event.occurred_at(),
                    actor: event.actor(),
                })
            })
            .collect()
    }

    /// Aggregate Available quantity across all lots of one food item.
    pub fn catalog_usage(&self, food_item_id: &FoodItemId) -> i64 {
        self.lots
            .list()
            .into_iter()
            .filter(|record| {
                record.food_item_id == *food_item_id && record.status == LotStatus::Available
            })
            .map(|record| record.quantity)
            .sum()
    }

    /// Replay a lot's full log and compare the derived (status, quantity)
    /// with the cached read model.
    ///
    /// The cached state is a materialized projection of the stream; any
    /// divergence means a projection bug, and the stream wins.
    pub fn verify_lot_consistency(&self, lot_id: &LotId) -> Result<LotConsistency, ReportingError> {
        let stream = self.store.load_stream(lot_id.0)?;
        if stream.is_empty() {
            return Ok(LotConsistency::UnknownLot);
        }

        let mut replayed = StockLot::empty(*lot_id);
        for stored in stream {
            let event: LotEvent = serde_json::from_value(stored.payload)
                .map_err(|e| ReportingError::Deserialize(e.to_string()))?;
            replayed.apply(&event);
        }

        let derived = (replayed.status(), replayed.quantity());
        let cached = self
            .lots
            .get(lot_id)
            .map(|record| (record.status, record.quantity));

        match cached {
            Some(c) if c == derived => Ok(LotConsistency::Consistent {
                status: derived.0,
                quantity: derived.1,
            }),
            other => Ok(LotConsistency::Divergent {
                cached: other,
                replayed: derived,
            }),
        }
    }
}
