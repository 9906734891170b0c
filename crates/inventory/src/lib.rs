//! Inventory domain module (event-sourced).
//!
//! This crate contains the stock-lot lifecycle rules: the `StockLot` state
//! machine (Available → Consumed/Expired/Removed), its commands and events,
//! and the pure expiry-risk computation. No IO, no HTTP, no storage.

pub mod lot;
pub mod risk;

pub use lot::{
    AdjustQuantity, CreateLot, LotAction, LotAdded, LotCommand, LotConsumed, LotEvent, LotExpired,
    LotId, LotQuantityAdjusted, LotRemoved, LotStatus, MarkConsumed, MarkExpired, RemoveLot,
    StockLot,
};
pub use risk::{ExpiryRisk, days_left};
