use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use larder_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use larder_events::{Command, Event};

/// Aggregate type identifier for food item streams.
pub const AGGREGATE_TYPE: &str = "catalog.food_item";

/// Food item identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FoodItemId(pub AggregateId);

impl FoodItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for FoodItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Food category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Vegetable,
    Meat,
    Dairy,
    Drinks,
    Snacks,
    FastFood,
    Grain,
    Other,
}

/// Aggregate root: FoodItem (catalog definition).
///
/// A food item is never deleted; lots reference it by id for as long as
/// they live. Edits happen only through administrative correction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoodItem {
    id: FoodItemId,
    name: String,
    category: Category,
    default_expiration_days: u32,
    cost_per_unit_cents: u64,
    version: u64,
    created: bool,
}

impl FoodItem {
    /// Create an empty, not-yet-defined aggregate instance for rehydration.
    pub fn empty(id: FoodItemId) -> Self {
        Self {
            id,
            name: String::new(),
            category: Category::Other,
            default_expiration_days: 0,
            cost_per_unit_cents: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> FoodItemId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Typical shelf life in days, used to prefill a new lot's expiry date.
    pub fn default_expiration_days(&self) -> u32 {
        self.default_expiration_days
    }

    /// Cost in the smallest currency unit (cents).
    pub fn cost_per_unit_cents(&self) -> u64 {
        self.cost_per_unit_cents
    }

    pub fn is_defined(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for FoodItem {
    type Id = FoodItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: DefineFoodItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefineFoodItem {
    pub food_item_id: FoodItemId,
    pub name: String,
    pub category: Category,
    pub default_expiration_days: u32,
    pub cost_per_unit_cents: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CorrectFoodItem (administrative correction of a definition).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectFoodItem {
    pub food_item_id: FoodItemId,
    pub name: String,
    pub category: Category,
    pub default_expiration_days: u32,
    pub cost_per_unit_cents: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FoodItemCommand {
    DefineFoodItem(DefineFoodItem),
    CorrectFoodItem(CorrectFoodItem),
}

impl Command for FoodItemCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        match self {
            FoodItemCommand::DefineFoodItem(cmd) => cmd.food_item_id.0,
            FoodItemCommand::CorrectFoodItem(cmd) => cmd.food_item_id.0,
        }
    }
}

/// Event: FoodItemDefined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoodItemDefined {
    pub food_item_id: FoodItemId,
    pub name: String,
    pub category: Category,
    pub default_expiration_days: u32,
    pub cost_per_unit_cents: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: FoodItemCorrected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoodItemCorrected {
    pub food_item_id: FoodItemId,
    pub name: String,
    pub category: Category,
    pub default_expiration_days: u32,
    pub cost_per_unit_cents: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FoodItemEvent {
    FoodItemDefined(FoodItemDefined),
    FoodItemCorrected(FoodItemCorrected),
}

impl Event for FoodItemEvent {
    fn event_type(&self) -> &'static str {
        match self {
            FoodItemEvent::FoodItemDefined(_) => "catalog.food_item.defined",
            FoodItemEvent::FoodItemCorrected(_) => "catalog.food_item.corrected",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            FoodItemEvent::FoodItemDefined(e) => e.occurred_at,
            FoodItemEvent::FoodItemCorrected(e) => e.occurred_at,
        }
    }
}

impl Aggregate for FoodItem {
    type Command = FoodItemCommand;
    type Event = FoodItemEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            FoodItemEvent::FoodItemDefined(e) => {
                self.id = e.food_item_id;
                self.name = e.name.clone();
                self.category = e.category;
                self.default_expiration_days = e.default_expiration_days;
                self.cost_per_unit_cents = e.cost_per_unit_cents;
                self.created = true;
            }
            FoodItemEvent::FoodItemCorrected(e) => {
                self.name = e.name.clone();
                self.category = e.category;
                self.default_expiration_days = e.default_expiration_days;
                self.cost_per_unit_cents = e.cost_per_unit_cents;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            FoodItemCommand::DefineFoodItem(cmd) => self.handle_define(cmd),
            FoodItemCommand::CorrectFoodItem(cmd) => self.handle_correct(cmd),
        }
    }
}

impl FoodItem {
    fn ensure_food_item_id(&self, food_item_id: FoodItemId) -> Result<(), DomainError> {
        if self.id != food_item_id {
            return Err(DomainError::validation("food_item_id mismatch"));
        }
        Ok(())
    }

    fn validate_definition(
        name: &str,
        default_expiration_days: u32,
    ) -> Result<(), DomainError> {
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if default_expiration_days == 0 {
            return Err(DomainError::validation(
                "default_expiration_days must be positive",
            ));
        }
        Ok(())
    }

    fn handle_define(&self, cmd: &DefineFoodItem) -> Result<Vec<FoodItemEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("food item already defined"));
        }
        Self::validate_definition(&cmd.name, cmd.default_expiration_days)?;

        Ok(vec![FoodItemEvent::FoodItemDefined(FoodItemDefined {
            food_item_id: cmd.food_item_id,
            name: cmd.name.clone(),
            category: cmd.category,
            default_expiration_days: cmd.default_expiration_days,
            cost_per_unit_cents: cmd.cost_per_unit_cents,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_correct(&self, cmd: &CorrectFoodItem) -> Result<Vec<FoodItemEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_food_item_id(cmd.food_item_id)?;
        Self::validate_definition(&cmd.name, cmd.default_expiration_days)?;

        Ok(vec![FoodItemEvent::FoodItemCorrected(FoodItemCorrected {
            food_item_id: cmd.food_item_id,
            name: cmd.name.clone(),
            category: cmd.category,
            default_expiration_days: cmd.default_expiration_days,
            cost_per_unit_cents: cmd.cost_per_unit_cents,
            occurred_at: cmd.occurred_at,
        })])
    }
}
