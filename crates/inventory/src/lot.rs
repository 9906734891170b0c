use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use larder_catalog::FoodItemId;
use larder_core::{Actor, Aggregate, AggregateId, AggregateRoot, DomainError};
use larder_events::{Command, Event};

/// Aggregate type identifier for stock lot streams.
pub const AGGREGATE_TYPE: &str = "inventory.lot";

/// Stock lot identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LotId(pub AggregateId);

impl LotId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for LotId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Lot status lifecycle.
///
/// `Available` is the only non-terminal state. Transitions are monotonic:
/// once a lot is Consumed, Expired or Removed it accepts no further
/// mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LotStatus {
    Available,
    Consumed,
    Expired,
    Removed,
}

impl LotStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LotStatus::Available)
    }
}

impl core::fmt::Display for LotStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            LotStatus::Available => "Available",
            LotStatus::Consumed => "Consumed",
            LotStatus::Expired => "Expired",
            LotStatus::Removed => "Removed",
        };
        f.write_str(s)
    }
}

/// The action a lot event records (the log entry's verb).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LotAction {
    Added,
    QuantityAdjusted,
    Consumed,
    Expired,
    Removed,
}

impl core::fmt::Display for LotAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            LotAction::Added => "Added",
            LotAction::QuantityAdjusted => "QuantityAdjusted",
            LotAction::Consumed => "Consumed",
            LotAction::Expired => "Expired",
            LotAction::Removed => "Removed",
        };
        f.write_str(s)
    }
}

/// Aggregate root: StockLot.
///
/// A discrete purchased batch of a food item with its own quantity and
/// expiry date. Current state is always the replay of the lot's event
/// stream; nothing here is independent truth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLot {
    id: LotId,
    food_item_id: Option<FoodItemId>,
    quantity: i64,
    purchased_at: DateTime<Utc>,
    expiry_at: DateTime<Utc>,
    status: LotStatus,
    notes: Option<String>,
    version: u64,
    created: bool,
}

impl StockLot {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: LotId) -> Self {
        Self {
            id,
            food_item_id: None,
            quantity: 0,
            purchased_at: DateTime::<Utc>::MIN_UTC,
            expiry_at: DateTime::<Utc>::MIN_UTC,
            status: LotStatus::Available,
            notes: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> LotId {
        self.id
    }

    pub fn food_item_id(&self) -> Option<FoodItemId> {
        self.food_item_id
    }

    /// Remaining units. Positive while Available; zero once retired.
    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn purchased_at(&self) -> DateTime<Utc> {
        self.purchased_at
    }

    pub fn expiry_at(&self) -> DateTime<Utc> {
        self.expiry_at
    }

    pub fn status(&self) -> LotStatus {
        self.status
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    /// Whether the lot should be picked up by an expiry sweep at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == LotStatus::Available && self.expiry_at <= now
    }

    /// Derived expiry-risk classification. Reporting only; never mutates.
    pub fn risk(&self, now: DateTime<Utc>) -> crate::risk::ExpiryRisk {
        crate::risk::classify(self.status, self.expiry_at, now)
    }
}

impl AggregateRoot for StockLot {
    type Id = LotId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateLot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLot {
    pub lot_id: LotId,
    pub food_item_id: FoodItemId,
    pub quantity: i64,
    pub purchased_at: DateTime<Utc>,
    pub expiry_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustQuantity (Available lots only; 0 fully consumes the lot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustQuantity {
    pub lot_id: LotId,
    pub new_quantity: i64,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkConsumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkConsumed {
    pub lot_id: LotId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkExpired (manual, or issued by the expiry sweep).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkExpired {
    pub lot_id: LotId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveLot (manual removal / cleanup).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLot {
    pub lot_id: LotId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LotCommand {
    CreateLot(CreateLot),
    AdjustQuantity(AdjustQuantity),
    MarkConsumed(MarkConsumed),
    MarkExpired(MarkExpired),
    RemoveLot(RemoveLot),
}

impl Command for LotCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        match self {
            LotCommand::CreateLot(cmd) => cmd.lot_id.0,
            LotCommand::AdjustQuantity(cmd) => cmd.lot_id.0,
            LotCommand::MarkConsumed(cmd) => cmd.lot_id.0,
            LotCommand::MarkExpired(cmd) => cmd.lot_id.0,
            LotCommand::RemoveLot(cmd) => cmd.lot_id.0,
        }
    }
}

/// Event: lot added to inventory (`quantity_delta = +quantity`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotAdded {
    pub lot_id: LotId,
    pub food_item_id: FoodItemId,
    pub quantity: i64,
    pub purchased_at: DateTime<Utc>,
    pub expiry_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: quantity adjusted while Available (signed delta, never zero).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotQuantityAdjusted {
    pub lot_id: LotId,
    pub quantity_delta: i64,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: remaining stock consumed (`quantity_delta = -remaining`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotConsumed {
    pub lot_id: LotId,
    pub quantity_delta: i64,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: lot expired (`quantity_delta = -remaining`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotExpired {
    pub lot_id: LotId,
    pub quantity_delta: i64,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: lot removed (`quantity_delta = -remaining`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotRemoved {
    pub lot_id: LotId,
    pub quantity_delta: i64,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LotEvent {
    Added(LotAdded),
    QuantityAdjusted(LotQuantityAdjusted),
    Consumed(LotConsumed),
    Expired(LotExpired),
    Removed(LotRemoved),
}

impl LotEvent {
    pub fn lot_id(&self) -> LotId {
        match self {
            LotEvent::Added(e) => e.lot_id,
            LotEvent::QuantityAdjusted(e) => e.lot_id,
            LotEvent::Consumed(e) => e.lot_id,
            LotEvent::Expired(e) => e.lot_id,
            LotEvent::Removed(e) => e.lot_id,
        }
    }

    /// Signed change in remaining units recorded by this log entry.
    pub fn quantity_delta(&self) -> i64 {
        match self {
            LotEvent::Added(e) => e.quantity,
            LotEvent::QuantityAdjusted(e) => e.quantity_delta,
            LotEvent::Consumed(e) => e.quantity_delta,
            LotEvent::Expired(e) => e.quantity_delta,
            LotEvent::Removed(e) => e.quantity_delta,
        }
    }

    pub fn actor(&self) -> Actor {
        match self {
            LotEvent::Added(e) => e.actor,
            LotEvent::QuantityAdjusted(e) => e.actor,
            LotEvent::Consumed(e) => e.actor,
            LotEvent::Expired(e) => e.actor,
            LotEvent::Removed(e) => e.actor,
        }
    }

    pub fn action(&self) -> LotAction {
        match self {
            LotEvent::Added(_) => LotAction::Added,
            LotEvent::QuantityAdjusted(_) => LotAction::QuantityAdjusted,
            LotEvent::Consumed(_) => LotAction::Consumed,
            LotEvent::Expired(_) => LotAction::Expired,
            LotEvent::Removed(_) => LotAction::Removed,
        }
    }
}

impl Event for LotEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LotEvent::Added(_) => "inventory.lot.added",
            LotEvent::QuantityAdjusted(_) => "inventory.lot.quantity_adjusted",
            LotEvent::Consumed(_) => "inventory.lot.consumed",
            LotEvent::Expired(_) => "inventory.lot.expired",
            LotEvent::Removed(_) => "inventory.lot.removed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LotEvent::Added(e) => e.occurred_at,
            LotEvent::QuantityAdjusted(e) => e.occurred_at,
            LotEvent::Consumed(e) => e.occurred_at,
            LotEvent::Expired(e) => e.occurred_at,
            LotEvent::Removed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for StockLot {
    type Command = LotCommand;
    type Event = LotEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LotEvent::Added(e) => {
                self.id = e.lot_id;
                self.food_item_id = Some(e.food_item_id);
                self.quantity = e.quantity;
                self.purchased_at = e.purchased_at;
                self.expiry_at = e.expiry_at;
                self.status = LotStatus::Available;
                self.notes = e.notes.clone();
                self.created = true;
            }
            LotEvent::QuantityAdjusted(e) => {
                self.quantity += e.quantity_delta;
            }
            LotEvent::Consumed(e) => {
                self.quantity += e.quantity_delta;
                self.status = LotStatus::Consumed;
            }
            LotEvent::Expired(e) => {
                self.quantity += e.quantity_delta;
                self.status = LotStatus::Expired;
            }
            LotEvent::Removed(e) => {
                self.quantity += e.quantity_delta;
                self.status = LotStatus::Removed;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LotCommand::CreateLot(cmd) => self.handle_create(cmd),
            LotCommand::AdjustQuantity(cmd) => self.handle_adjust(cmd),
            LotCommand::MarkConsumed(cmd) => self.handle_consume(cmd),
            LotCommand::MarkExpired(cmd) => self.handle_expire(cmd),
            LotCommand::RemoveLot(cmd) => self.handle_remove(cmd),
        }
    }
}

impl StockLot {
    fn ensure_lot_id(&self, lot_id: LotId) -> Result<(), DomainError> {
        if self.id != lot_id {
            return Err(DomainError::validation("lot_id mismatch"));
        }
        Ok(())
    }

    fn ensure_available(&self, attempted: LotAction) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::invalid_transition(format!(
                "{attempted} is not allowed on a {} lot",
                self.status
            )));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateLot) -> Result<Vec<LotEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("lot already exists"));
        }
        if cmd.quantity <= 0 {
            return Err(DomainError::invalid_quantity(format!(
                "quantity must be positive, got {}",
                cmd.quantity
            )));
        }
        if cmd.expiry_at < cmd.purchased_at {
            return Err(DomainError::invalid_date_range(format!(
                "expiry_at ({}) precedes purchased_at ({})",
                cmd.expiry_at, cmd.purchased_at
            )));
        }

        Ok(vec![LotEvent::Added(LotAdded {
            lot_id: cmd.lot_id,
            food_item_id: cmd.food_item_id,
            quantity: cmd.quantity,
            purchased_at: cmd.purchased_at,
            expiry_at: cmd.expiry_at,
            notes: cmd.notes.clone(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust(&self, cmd: &AdjustQuantity) -> Result<Vec<LotEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_lot_id(cmd.lot_id)?;
        self.ensure_available(LotAction::QuantityAdjusted)?;

        if cmd.new_quantity < 0 {
            return Err(DomainError::invalid_quantity(format!(
                "quantity cannot be negative, got {}",
                cmd.new_quantity
            )));
        }

        let delta = cmd.new_quantity - self.quantity;
        if delta == 0 {
            // Unchanged quantity is a no-op: no event, no state change.
            return Ok(vec![]);
        }

        if cmd.new_quantity == 0 {
            // Fully used up: the lot transitions to Consumed.
            return Ok(vec![LotEvent::Consumed(LotConsumed {
                lot_id: cmd.lot_id,
                quantity_delta: -self.quantity,
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            })]);
        }

        Ok(vec![LotEvent::QuantityAdjusted(LotQuantityAdjusted {
            lot_id: cmd.lot_id,
            quantity_delta: delta,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_consume(&self, cmd: &MarkConsumed) -> Result<Vec<LotEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_lot_id(cmd.lot_id)?;
        self.ensure_available(LotAction::Consumed)?;

        Ok(vec![LotEvent::Consumed(LotConsumed {
            lot_id: cmd.lot_id,
            quantity_delta: -self.quantity,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_expire(&self, cmd: &MarkExpired) -> Result<Vec<LotEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_lot_id(cmd.lot_id)?;
        self.ensure_available(LotAction::Expired)?;

        Ok(vec![LotEvent::Expired(LotExpired {
            lot_id: cmd.lot_id,
            quantity_delta: -self.quantity,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove(&self, cmd: &RemoveLot) -> Result<Vec<LotEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_lot_id(cmd.lot_id)?;

        // Cleaning up a lot that already reached a terminal state (e.g. an
        // Expired lot) is a no-op rather than an error.
        if self.status.is_terminal() {
            return Ok(vec![]);
        }

        Ok(vec![LotEvent::Removed(LotRemoved {
            lot_id: cmd.lot_id,
            quantity_delta: -self.quantity,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use larder_core::UserId;

    fn test_lot_id() -> LotId {
        LotId::new(AggregateId::new())
    }

    fn test_food_item_id() -> FoodItemId {
        FoodItemId::new(AggregateId::new())
    }

    fn test_actor() -> Actor {
        Actor::User(UserId::new())
    }

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn create_cmd(lot_id: LotId, quantity: i64) -> CreateLot {
        CreateLot {
            lot_id,
            food_item_id: test_food_item_id(),
            quantity,
            purchased_at: ts(2025, 11, 18),
            expiry_at: ts(2025, 11, 25),
            notes: Some("Fresh from market".to_string()),
            actor: test_actor(),
            occurred_at: ts(2025, 11, 18),
        }
    }

    fn available_lot(lot_id: LotId, quantity: i64) -> StockLot {
        let mut lot = StockLot::empty(lot_id);
        let events = lot
            .handle(&LotCommand::CreateLot(create_cmd(lot_id, quantity)))
            .unwrap();
        lot.apply(&events[0]);
        lot
    }

    #[test]
    fn create_lot_emits_added_event_with_positive_delta() {
        let lot_id = test_lot_id();
        let lot = StockLot::empty(lot_id);
        let cmd = create_cmd(lot_id, 5);

        let events = lot.handle(&LotCommand::CreateLot(cmd.clone())).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action(), LotAction::Added);
        assert_eq!(events[0].quantity_delta(), 5);
        assert_eq!(events[0].lot_id(), lot_id);

        match &events[0] {
            LotEvent::Added(e) => {
                assert_eq!(e.food_item_id, cmd.food_item_id);
                assert_eq!(e.notes.as_deref(), Some("Fresh from market"));
            }
            _ => panic!("Expected Added event"),
        }
    }

    #[test]
    fn create_lot_rejects_non_positive_quantity() {
        let lot_id = test_lot_id();
        let lot = StockLot::empty(lot_id);

        for quantity in [0, -3] {
            let err = lot
                .handle(&LotCommand::CreateLot(create_cmd(lot_id, quantity)))
                .unwrap_err();
            assert!(matches!(err, DomainError::InvalidQuantity(_)));
        }
    }

    #[test]
    fn create_lot_rejects_expiry_before_purchase() {
        let lot_id = test_lot_id();
        let lot = StockLot::empty(lot_id);
        let cmd = CreateLot {
            purchased_at: ts(2025, 11, 25),
            expiry_at: ts(2025, 11, 18),
            ..create_cmd(lot_id, 5)
        };

        let err = lot.handle(&LotCommand::CreateLot(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidDateRange(_)));
    }

    #[test]
    fn create_lot_rejects_duplicate_creation() {
        let lot_id = test_lot_id();
        let lot = available_lot(lot_id, 5);

        let err = lot
            .handle(&LotCommand::CreateLot(create_cmd(lot_id, 5)))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn adjust_quantity_emits_signed_delta() {
        let lot_id = test_lot_id();
        let mut lot = available_lot(lot_id, 5);

        let down = AdjustQuantity {
            lot_id,
            new_quantity: 3,
            actor: test_actor(),
            occurred_at: ts(2025, 11, 19),
        };
        let events = lot.handle(&LotCommand::AdjustQuantity(down)).unwrap();
        assert_eq!(events[0].action(), LotAction::QuantityAdjusted);
        assert_eq!(events[0].quantity_delta(), -2);
        lot.apply(&events[0]);
        assert_eq!(lot.quantity(), 3);

        let up = AdjustQuantity {
            lot_id,
            new_quantity: 7,
            actor: test_actor(),
            occurred_at: ts(2025, 11, 20),
        };
        let events = lot.handle(&LotCommand::AdjustQuantity(up)).unwrap();
        assert_eq!(events[0].quantity_delta(), 4);
        lot.apply(&events[0]);
        assert_eq!(lot.quantity(), 7);
        assert_eq!(lot.status(), LotStatus::Available);
    }

    #[test]
    fn adjust_to_zero_transitions_to_consumed() {
        let lot_id = test_lot_id();
        let mut lot = available_lot(lot_id, 5);

        let cmd = AdjustQuantity {
            lot_id,
            new_quantity: 0,
            actor: test_actor(),
            occurred_at: ts(2025, 11, 21),
        };
        let events = lot.handle(&LotCommand::AdjustQuantity(cmd)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action(), LotAction::Consumed);
        assert_eq!(events[0].quantity_delta(), -5);

        lot.apply(&events[0]);
        assert_eq!(lot.status(), LotStatus::Consumed);
        assert_eq!(lot.quantity(), 0);
    }

    #[test]
    fn adjust_to_same_quantity_is_a_noop() {
        let lot_id = test_lot_id();
        let lot = available_lot(lot_id, 5);

        let cmd = AdjustQuantity {
            lot_id,
            new_quantity: 5,
            actor: test_actor(),
            occurred_at: ts(2025, 11, 21),
        };
        let events = lot.handle(&LotCommand::AdjustQuantity(cmd)).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn adjust_rejects_negative_quantity() {
        let lot_id = test_lot_id();
        let lot = available_lot(lot_id, 5);

        let cmd = AdjustQuantity {
            lot_id,
            new_quantity: -1,
            actor: test_actor(),
            occurred_at: ts(2025, 11, 21),
        };
        let err = lot.handle(&LotCommand::AdjustQuantity(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity(_)));
    }

    #[test]
    fn mark_consumed_retires_remaining_stock() {
        let lot_id = test_lot_id();
        let mut lot = available_lot(lot_id, 4);

        let cmd = MarkConsumed {
            lot_id,
            actor: test_actor(),
            occurred_at: ts(2025, 11, 22),
        };
        let events = lot.handle(&LotCommand::MarkConsumed(cmd)).unwrap();
        assert_eq!(events[0].action(), LotAction::Consumed);
        assert_eq!(events[0].quantity_delta(), -4);

        lot.apply(&events[0]);
        assert_eq!(lot.status(), LotStatus::Consumed);
        assert_eq!(lot.quantity(), 0);
    }

    #[test]
    fn mark_expired_retires_remaining_stock() {
        let lot_id = test_lot_id();
        let mut lot = available_lot(lot_id, 5);

        let cmd = MarkExpired {
            lot_id,
            actor: Actor::System,
            occurred_at: ts(2025, 11, 26),
        };
        let events = lot.handle(&LotCommand::MarkExpired(cmd)).unwrap();
        assert_eq!(events[0].action(), LotAction::Expired);
        assert_eq!(events[0].quantity_delta(), -5);
        assert_eq!(events[0].actor(), Actor::System);

        lot.apply(&events[0]);
        assert_eq!(lot.status(), LotStatus::Expired);
    }

    #[test]
    fn remove_from_available_emits_removed() {
        let lot_id = test_lot_id();
        let mut lot = available_lot(lot_id, 2);

        let cmd = RemoveLot {
            lot_id,
            actor: test_actor(),
            occurred_at: ts(2025, 11, 22),
        };
        let events = lot.handle(&LotCommand::RemoveLot(cmd)).unwrap();
        assert_eq!(events[0].action(), LotAction::Removed);
        assert_eq!(events[0].quantity_delta(), -2);

        lot.apply(&events[0]);
        assert_eq!(lot.status(), LotStatus::Removed);
    }

    #[test]
    fn remove_on_terminal_lot_is_a_noop() {
        let lot_id = test_lot_id();
        let mut lot = available_lot(lot_id, 5);

        let expire = MarkExpired {
            lot_id,
            actor: Actor::System,
            occurred_at: ts(2025, 11, 26),
        };
        let events = lot.handle(&LotCommand::MarkExpired(expire)).unwrap();
        lot.apply(&events[0]);

        let remove = RemoveLot {
            lot_id,
            actor: test_actor(),
            occurred_at: ts(2025, 11, 27),
        };
        let events = lot.handle(&LotCommand::RemoveLot(remove)).unwrap();
        assert!(events.is_empty());
        assert_eq!(lot.status(), LotStatus::Expired);
    }

    #[test]
    fn terminal_lots_accept_no_further_transitions() {
        let lot_id = test_lot_id();
        let mut lot = available_lot(lot_id, 5);

        let consume = MarkConsumed {
            lot_id,
            actor: test_actor(),
            occurred_at: ts(2025, 11, 22),
        };
        let events = lot.handle(&LotCommand::MarkConsumed(consume.clone())).unwrap();
        lot.apply(&events[0]);

        let adjust = AdjustQuantity {
            lot_id,
            new_quantity: 3,
            actor: test_actor(),
            occurred_at: ts(2025, 11, 23),
        };
        let expire = MarkExpired {
            lot_id,
            actor: Actor::System,
            occurred_at: ts(2025, 11, 23),
        };

        for cmd in [
            LotCommand::AdjustQuantity(adjust),
            LotCommand::MarkConsumed(consume),
            LotCommand::MarkExpired(expire),
        ] {
            let err = lot.handle(&cmd).unwrap_err();
            assert!(matches!(err, DomainError::InvalidTransition(_)), "{cmd:?}");
        }
    }

    #[test]
    fn commands_on_unknown_lot_are_not_found() {
        let lot_id = test_lot_id();
        let lot = StockLot::empty(lot_id);

        let cmd = MarkConsumed {
            lot_id,
            actor: test_actor(),
            occurred_at: ts(2025, 11, 22),
        };
        let err = lot.handle(&LotCommand::MarkConsumed(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::NotFound));
    }

    #[test]
    fn replaying_deltas_reconstructs_quantity_and_status() {
        let lot_id = test_lot_id();
        let mut lot = StockLot::empty(lot_id);
        let mut log: Vec<LotEvent> = Vec::new();

        let commands = [
            LotCommand::CreateLot(create_cmd(lot_id, 5)),
            LotCommand::AdjustQuantity(AdjustQuantity {
                lot_id,
                new_quantity: 8,
                actor: test_actor(),
                occurred_at: ts(2025, 11, 19),
            }),
            LotCommand::AdjustQuantity(AdjustQuantity {
                lot_id,
                new_quantity: 2,
                actor: test_actor(),
                occurred_at: ts(2025, 11, 20),
            }),
            LotCommand::MarkConsumed(MarkConsumed {
                lot_id,
                actor: test_actor(),
                occurred_at: ts(2025, 11, 21),
            }),
        ];

        for cmd in &commands {
            for event in lot.handle(cmd).unwrap() {
                lot.apply(&event);
                log.push(event);
            }
        }

        let delta_sum: i64 = log.iter().map(LotEvent::quantity_delta).sum();
        assert_eq!(delta_sum, lot.quantity());
        assert_eq!(lot.quantity(), 0);
        assert_eq!(lot.status(), LotStatus::Consumed);
        assert_eq!(lot.version(), log.len() as u64);
    }

    #[test]
    fn risk_reads_through_to_classification() {
        let lot_id = test_lot_id();
        let mut lot = available_lot(lot_id, 5);

        assert_eq!(lot.risk(ts(2025, 11, 23)), crate::risk::ExpiryRisk::High);
        assert!(!lot.is_expired_at(ts(2025, 11, 24)));
        assert!(lot.is_expired_at(ts(2025, 11, 26)));

        let cmd = MarkExpired {
            lot_id,
            actor: Actor::System,
            occurred_at: ts(2025, 11, 26),
        };
        let events = lot.handle(&LotCommand::MarkExpired(cmd)).unwrap();
        assert!(events[0].actor().is_system());
        lot.apply(&events[0]);

        assert_eq!(lot.risk(ts(2025, 11, 27)), crate::risk::ExpiryRisk::NotApplicable);
    }

    #[test]
    fn command_targets_lot_stream() {
        let lot_id = test_lot_id();
        let cmd = LotCommand::CreateLot(create_cmd(lot_id, 5));
        assert_eq!(cmd.target_aggregate_id(), lot_id.0);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn arbitrary_seeded(lot_id: LotId, seed: u8) -> LotCommand {
            match seed % 4 {
                0 => LotCommand::AdjustQuantity(AdjustQuantity {
                    lot_id,
                    new_quantity: (seed / 4) as i64,
                    actor: Actor::System,
                    occurred_at: ts(2025, 11, 20),
                }),
                1 => LotCommand::MarkConsumed(MarkConsumed {
                    lot_id,
                    actor: Actor::System,
                    occurred_at: ts(2025, 11, 20),
                }),
                2 => LotCommand::MarkExpired(MarkExpired {
                    lot_id,
                    actor: Actor::System,
                    occurred_at: ts(2025, 11, 20),
                }),
                _ => LotCommand::RemoveLot(RemoveLot {
                    lot_id,
                    actor: Actor::System,
                    occurred_at: ts(2025, 11, 20),
                }),
            }
        }

        proptest! {
            /// Status is monotonic: once terminal, no command ever produces
            /// another event for the lot.
            #[test]
            fn status_is_monotonic(
                initial in 1i64..20,
                commands in proptest::collection::vec(any::<u8>(), 1..30)
            ) {
                let lot_id = test_lot_id();
                let mut lot = available_lot(lot_id, initial);
                let mut terminal_seen = false;

                for seed in commands {
                    let cmd = arbitrary_seeded(lot_id, seed);

                    match lot.handle(&cmd) {
                        Ok(events) => {
                            if terminal_seen {
                                prop_assert!(
                                    events.is_empty(),
                                    "terminal lot produced events: {events:?}"
                                );
                            }
                            for event in events {
                                lot.apply(&event);
                            }
                        }
                        Err(_) => {}
                    }

                    if lot.status().is_terminal() {
                        terminal_seen = true;
                    }
                }
            }

            /// Folding quantity deltas over any accepted command sequence
            /// reconstructs the stored quantity exactly.
            #[test]
            fn delta_sum_matches_stored_quantity(
                initial in 1i64..50,
                commands in proptest::collection::vec(any::<u8>(), 0..30)
            ) {
                let lot_id = test_lot_id();
                let mut lot = StockLot::empty(lot_id);
                let mut delta_sum = 0i64;

                let create = LotCommand::CreateLot(create_cmd(lot_id, initial));
                for event in lot.handle(&create).unwrap() {
                    delta_sum += event.quantity_delta();
                    lot.apply(&event);
                }

                for seed in commands {
                    let cmd = arbitrary_seeded(lot_id, seed);
                    if let Ok(events) = lot.handle(&cmd) {
                        for event in events {
                            delta_sum += event.quantity_delta();
                            lot.apply(&event);
                        }
                    }
                }

                prop_assert_eq!(delta_sum, lot.quantity());
                if lot.status().is_terminal() {
                    prop_assert_eq!(lot.quantity(), 0);
                }
            }

            /// Handle never mutates: calling it twice yields identical
            /// events and leaves state untouched.
            #[test]
            fn handle_is_pure(initial in 1i64..20, target in 0i64..20) {
                let lot_id = test_lot_id();
                let lot = available_lot(lot_id, initial);
                let before = lot.clone();

                let cmd = LotCommand::AdjustQuantity(AdjustQuantity {
                    lot_id,
                    new_quantity: target,
                    actor: Actor::System,
                    occurred_at: ts(2025, 11, 20),
                });

                let events1 = lot.handle(&cmd);
                let events2 = lot.handle(&cmd);

                prop_assert_eq!(&before, &lot);
                prop_assert_eq!(events1, events2);
            }
        }
    }
}
