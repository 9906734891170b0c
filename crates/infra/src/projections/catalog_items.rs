use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use larder_catalog::{Category, FoodItemEvent, FoodItemId, food_item};
use larder_core::AggregateId;
use larder_events::EventEnvelope;

use crate::read_model::ReadModelStore;

/// Queryable catalog read model: one food item definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoodItemRecord {
    pub food_item_id: FoodItemId,
    pub name: String,
    pub category: Category,
    pub default_expiration_days: u32,
    pub cost_per_unit_cents: u64,
}

#[derive(Debug, Error)]
pub enum CatalogProjectionError {
    #[error("failed to deserialize food item event: {0}")]
    Deserialize(String),

    #[error("stream mismatch: {0}")]
    StreamMismatch(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Catalog projection.
///
/// Maintains the food item read model used by reporting (names, categories,
/// costs for display). Disposable; rebuildable from the event stream.
#[derive(Debug)]
pub struct CatalogProjection<S>
where
    S: ReadModelStore<FoodItemId, FoodItemRecord>,
{
    store: S,
    cursors: RwLock<HashMap<AggregateId, u64>>,
}

impl<S> CatalogProjection<S>
where
    S: ReadModelStore<FoodItemId, FoodItemRecord>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, food_item_id: &FoodItemId) -> Option<FoodItemRecord> {
        self.store.get(food_item_id)
    }

    pub fn list(&self) -> Vec<FoodItemRecord> {
        self.store.list()
    }

    /// Apply a published envelope into the projection.
    ///
    /// Same contract as the lot ledger: non-catalog envelopes are ignored,
    /// sequences are monotonic per stream, replays are no-ops.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), CatalogProjectionError> {
        if envelope.aggregate_type() != food_item::AGGREGATE_TYPE {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if let Ok(mut cursors) = self.cursors.write() {
            let last = *cursors.get(&aggregate_id).unwrap_or(&0);

            if seq == 0 {
                return Err(CatalogProjectionError::NonMonotonicSequence { last, found: seq });
            }

            if seq <= last {
                return Ok(());
            }

            if seq != last + 1 && last != 0 {
                return Err(CatalogProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let event: FoodItemEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| CatalogProjectionError::Deserialize(e.to_string()))?;

            let food_item_id = match &event {
                FoodItemEvent::FoodItemDefined(e) => e.food_item_id,
                FoodItemEvent::FoodItemCorrected(e) => e.food_item_id,
            };

            if food_item_id.0 != aggregate_id {
                return Err(CatalogProjectionError::StreamMismatch(
                    "event food_item_id does not match envelope aggregate_id".to_string(),
                ));
            }

            match event {
                FoodItemEvent::FoodItemDefined(e) => {
                    self.store.upsert(
                        e.food_item_id,
                        FoodItemRecord {
                            food_item_id: e.food_item_id,
                            name: e.name,
                            category: e.category,
                            default_expiration_days: e.default_expiration_days,
                            cost_per_unit_cents: e.cost_per_unit_cents,
                        },
                    );
                }
                FoodItemEvent::FoodItemCorrected(e) => {
                    if let Some(mut record) = self.store.get(&e.food_item_id) {
                        record.name = e.name;
                        record.category = e.category;
                        record.default_expiration_days = e.default_expiration_days;
                        record.cost_per_unit_cents = e.cost_per_unit_cents;
                        self.store.upsert(e.food_item_id, record);
                    }
                }
            }

            cursors.insert(aggregate_id, seq);
        }

        Ok(())
    }
}
