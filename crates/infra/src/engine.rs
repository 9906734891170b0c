//! Lifecycle engine: the command execution pipeline.
//!
//! The sole authority for applying state transitions. Every command runs
//! the same pipeline:
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the aggregate's event stream
//!   ↓
//! 2. Rehydrate state (apply historical events)
//!   ↓
//! 3. Handle the command (pure decision logic, produces events)
//!   ↓
//! 4. Append events (optimistic concurrency check, atomic batch)
//!   ↓
//! 5. Publish committed events to the bus (projections)
//! ```
//!
//! Validation happens entirely in step 3, before anything is written, so a
//! failed command never leaves partial state. Step 4 is the per-lot
//! serialization point: two writers racing on one lot conflict on the
//! expected stream version, and exactly one append wins.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use uuid::Uuid;

use larder_catalog::{
    Category, CorrectFoodItem, DefineFoodItem, FoodItem, FoodItemCommand, FoodItemId, food_item,
};
use larder_core::{Actor, Aggregate, AggregateId, DomainError, ExpectedVersion};
use larder_events::{Command, EventBus, EventEnvelope};
use larder_inventory::{
    AdjustQuantity, CreateLot, LotCommand, LotId, MarkConsumed, MarkExpired, RemoveLot, StockLot,
    lot,
};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// Engine-level error: the domain error kinds plus infrastructure outcomes.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown food item: {0}")]
    UnknownFoodItem(String),

    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("invalid date range: {0}")]
    InvalidDateRange(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found")]
    NotFound,

    /// Another writer mutated the same lot first. Retryable by the caller.
    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    /// The underlying store failed. Surfaced verbatim, never retried here.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("failed to decode stored event: {0}")]
    Deserialize(String),

    /// Publication failed after a successful append (at-least-once; the
    /// events are durable and can be republished).
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::UnknownFoodItem(msg) => EngineError::UnknownFoodItem(msg),
            DomainError::InvalidQuantity(msg) => EngineError::InvalidQuantity(msg),
            DomainError::InvalidDateRange(msg) => EngineError::InvalidDateRange(msg),
            DomainError::InvalidTransition(msg) => EngineError::InvalidTransition(msg),
            DomainError::Validation(msg) => EngineError::Validation(msg),
            DomainError::NotFound => EngineError::NotFound,
            DomainError::Conflict(msg) => EngineError::ConcurrentModification(msg),
        }
    }
}

impl From<EventStoreError> for EngineError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => EngineError::ConcurrentModification(msg),
            EventStoreError::AggregateTypeMismatch(msg)
            | EventStoreError::InvalidAppend(msg)
            | EventStoreError::Unavailable(msg) => EngineError::StorageUnavailable(msg),
        }
    }
}

/// Parameters for defining a new catalog item.
#[derive(Debug, Clone)]
pub struct NewFoodItem {
    pub name: String,
    pub category: Category,
    pub default_expiration_days: u32,
    pub cost_per_unit_cents: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Parameters for creating a new stock lot.
#[derive(Debug, Clone)]
pub struct NewLot {
    pub food_item_id: FoodItemId,
    pub quantity: i64,
    pub purchased_at: DateTime<Utc>,
    pub expiry_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Result of a lot command: the updated snapshot plus the committed log
/// entry. `event` is `None` for accepted no-ops (adjusting to the current
/// quantity, removing an already-terminal lot).
#[derive(Debug, Clone)]
pub struct LotCommandOutcome {
    pub lot: StockLot,
    pub event: Option<StoredEvent>,
}

/// Result of a catalog command.
#[derive(Debug, Clone)]
pub struct CatalogCommandOutcome {
    pub item: FoodItem,
    pub event: Option<StoredEvent>,
}

/// The lifecycle engine.
///
/// Composes an [`EventStore`] and an [`EventBus`]; domain decision logic
/// stays in the aggregates. A conflicting append surfaces
/// [`EngineError::ConcurrentModification`] immediately by default so the
/// caller decides whether to retry; [`LifecycleEngine::with_conflict_retries`]
/// lets the engine reload and re-execute the command a bounded number of
/// times first.
#[derive(Debug)]
pub struct LifecycleEngine<S, B> {
    store: S,
    bus: B,
    conflict_retries: u32,
}

impl<S, B> LifecycleEngine<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store,
            bus,
            conflict_retries: 0,
        }
    }

    /// Re-execute a conflicted command up to `retries` times before
    /// surfacing `ConcurrentModification`.
    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S, B> LifecycleEngine<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<serde_json::Value>>,
{
    /// Define a new food item in the catalog.
    pub fn define_food_item(
        &self,
        definition: NewFoodItem,
    ) -> Result<CatalogCommandOutcome, EngineError> {
        let food_item_id = FoodItemId::new(AggregateId::new());
        let command = FoodItemCommand::DefineFoodItem(DefineFoodItem {
            food_item_id,
            name: definition.name,
            category: definition.category,
            default_expiration_days: definition.default_expiration_days,
            cost_per_unit_cents: definition.cost_per_unit_cents,
            occurred_at: definition.occurred_at,
        });
        self.dispatch_food_item(command)
    }

    /// Administratively correct an existing food item definition.
    pub fn correct_food_item(
        &self,
        correction: CorrectFoodItem,
    ) -> Result<CatalogCommandOutcome, EngineError> {
        self.dispatch_food_item(FoodItemCommand::CorrectFoodItem(correction))
    }

    /// Create a new stock lot in Available state.
    ///
    /// Emits `Added` with `quantity_delta = +quantity`.
    pub fn create_lot(&self, new_lot: NewLot) -> Result<LotCommandOutcome, EngineError> {
        self.ensure_food_item_exists(new_lot.food_item_id)?;

        let lot_id = LotId::new(AggregateId::new());
        let command = LotCommand::CreateLot(CreateLot {
            lot_id,
            food_item_id: new_lot.food_item_id,
            quantity: new_lot.quantity,
            purchased_at: new_lot.purchased_at,
            expiry_at: new_lot.expiry_at,
            notes: new_lot.notes,
            actor: new_lot.actor,
            occurred_at: new_lot.occurred_at,
        });
        self.dispatch_lot(command)
    }

    /// Set an Available lot's quantity. Zero fully consumes the lot.
    pub fn adjust_quantity(
        &self,
        lot_id: LotId,
        new_quantity: i64,
        actor: Actor,
        occurred_at: DateTime<Utc>,
    ) -> Result<LotCommandOutcome, EngineError> {
        self.dispatch_lot(LotCommand::AdjustQuantity(AdjustQuantity {
            lot_id,
            new_quantity,
            actor,
            occurred_at,
        }))
    }

    /// Transition an Available lot to Consumed, retiring remaining stock.
    pub fn mark_consumed(
        &self,
        lot_id: LotId,
        actor: Actor,
        occurred_at: DateTime<Utc>,
    ) -> Result<LotCommandOutcome, EngineError> {
        self.dispatch_lot(LotCommand::MarkConsumed(MarkConsumed {
            lot_id,
            actor,
            occurred_at,
        }))
    }

    /// Transition an Available lot to Expired, retiring remaining stock.
    pub fn mark_expired(
        &self,
        lot_id: LotId,
        actor: Actor,
        occurred_at: DateTime<Utc>,
    ) -> Result<LotCommandOutcome, EngineError> {
        self.dispatch_lot(LotCommand::MarkExpired(MarkExpired {
            lot_id,
            actor,
            occurred_at,
        }))
    }

    /// Remove an Available lot. Removing an already-terminal lot is an
    /// accepted no-op (cleanup of expired lots).
    pub fn remove(
        &self,
        lot_id: LotId,
        actor: Actor,
        occurred_at: DateTime<Utc>,
    ) -> Result<LotCommandOutcome, EngineError> {
        self.dispatch_lot(LotCommand::RemoveLot(RemoveLot {
            lot_id,
            actor,
            occurred_at,
        }))
    }

    fn dispatch_lot(&self, command: LotCommand) -> Result<LotCommandOutcome, EngineError> {
        let (lot, committed) = self.dispatch(lot::AGGREGATE_TYPE, command, |id| {
            StockLot::empty(LotId::new(id))
        })?;
        Ok(LotCommandOutcome {
            lot,
            event: committed.into_iter().next(),
        })
    }

    fn dispatch_food_item(
        &self,
        command: FoodItemCommand,
    ) -> Result<CatalogCommandOutcome, EngineError> {
        let (item, committed) = self.dispatch(food_item::AGGREGATE_TYPE, command, |id| {
            FoodItem::empty(FoodItemId::new(id))
        })?;
        Ok(CatalogCommandOutcome {
            item,
            event: committed.into_iter().next(),
        })
    }

    /// Referential validity for `create_lot`: the food item's stream must
    /// exist. Checked against the store (not a projection) so a just-defined
    /// item is visible immediately.
    fn ensure_food_item_exists(&self, food_item_id: FoodItemId) -> Result<(), EngineError> {
        let stream = self.store.load_stream(food_item_id.0)?;
        let defined = stream
            .first()
            .map(|e| e.aggregate_type == food_item::AGGREGATE_TYPE)
            .unwrap_or(false);

        if defined {
            Ok(())
        } else {
            Err(EngineError::UnknownFoodItem(food_item_id.to_string()))
        }
    }

    /// Run a command through the full pipeline against its target stream.
    fn dispatch<A>(
        &self,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl Fn(AggregateId) -> A,
    ) -> Result<(A, Vec<StoredEvent>), EngineError>
    where
        A: Aggregate<Error = DomainError>,
        A::Command: Command,
        A::Event: larder_events::Event + Serialize + DeserializeOwned,
    {
        let aggregate_id = command.target_aggregate_id();
        let mut attempt: u32 = 0;

        loop {
            // 1) Load history
            let history = self.store.load_stream(aggregate_id)?;
            validate_loaded_stream(aggregate_id, &history)?;
            let expected = ExpectedVersion::Exact(stream_version(&history));

            // 2) Rehydrate aggregate
            let mut aggregate = make_aggregate(aggregate_id);
            apply_history::<A>(&mut aggregate, &history)?;

            // 3) Decide events (no mutation)
            let decided = aggregate.handle(&command).map_err(EngineError::from)?;
            if decided.is_empty() {
                return Ok((aggregate, vec![]));
            }

            // 4) Persist (append-only, optimistic)
            let uncommitted = decided
                .iter()
                .map(|ev| {
                    UncommittedEvent::from_typed(aggregate_id, aggregate_type, Uuid::now_v7(), ev)
                })
                .collect::<Result<Vec<_>, _>>()?;

            match self.store.append(uncommitted, expected) {
                Ok(committed) => {
                    for event in &decided {
                        aggregate.apply(event);
                    }

                    // 5) Publish committed events (after append)
                    for stored in &committed {
                        self.bus
                            .publish(stored.to_envelope())
                            .map_err(|e| EngineError::Publish(format!("{e:?}")))?;
                    }

                    return Ok((aggregate, committed));
                }
                Err(EventStoreError::Concurrency(msg)) => {
                    if attempt >= self.conflict_retries {
                        return Err(EngineError::ConcurrentModification(msg));
                    }
                    attempt += 1;
                    tracing::debug!(%aggregate_id, attempt, "append conflicted, re-executing command");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), EngineError> {
    // Ensure the backend returned the right stream, monotonically ordered.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(EngineError::StorageUnavailable(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number == 0 || e.sequence_number <= last {
            return Err(EngineError::StorageUnavailable(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            )));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), EngineError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    // Ensure deterministic ordering.
    let mut sorted = history.to_vec();
    sorted.sort_by_key(|e| e.sequence_number);

    for stored in sorted {
        let event: A::Event = serde_json::from_value(stored.payload)
            .map_err(|e| EngineError::Deserialize(e.to_string()))?;
        aggregate.apply(&event);
    }

    Ok(())
}
