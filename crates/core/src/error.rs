//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic business failures only (validation, invariants, conflicts).
/// Infrastructure concerns (storage, publication) live in the infra layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A lot references a food item the catalog has never defined.
    #[error("unknown food item: {0}")]
    UnknownFoodItem(String),

    /// A quantity was zero or negative where a positive value is required,
    /// or an adjustment targeted a negative quantity.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// A lot's expiry date precedes its purchase date.
    #[error("invalid date range: {0}")]
    InvalidDateRange(String),

    /// A mutation was attempted on a terminal lot, or the transition is
    /// undefined for the lot's current status.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// A value failed validation (e.g. malformed or empty input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A requested aggregate was never created.
    #[error("not found")]
    NotFound,

    /// A conflict occurred (stale version / duplicate creation).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn unknown_food_item(msg: impl Into<String>) -> Self {
        Self::UnknownFoodItem(msg.into())
    }

    pub fn invalid_quantity(msg: impl Into<String>) -> Self {
        Self::InvalidQuantity(msg.into())
    }

    pub fn invalid_date_range(msg: impl Into<String>) -> Self {
        Self::InvalidDateRange(msg.into())
    }

    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidTransition(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
