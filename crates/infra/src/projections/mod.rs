//! Projection implementations (read model builders).
//!
//! Projections consume published envelopes and build query-optimized read
//! models. All projections are:
//! - **Rebuildable**: reconstructed from the event stream at any time
//! - **Idempotent**: safe for at-least-once delivery (per-stream cursors)

pub mod catalog_items;
pub mod lot_ledger;

pub use catalog_items::{CatalogProjection, CatalogProjectionError, FoodItemRecord};
pub use lot_ledger::{LotLedgerProjection, LotProjectionError, LotRecord};
