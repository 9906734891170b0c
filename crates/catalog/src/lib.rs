//! Catalog domain module (event-sourced).
//!
//! This crate contains business rules for food item definitions, implemented
//! purely as deterministic domain logic (no IO, no HTTP, no storage).

pub mod food_item;

pub use food_item::{
    Category, CorrectFoodItem, DefineFoodItem, FoodItem, FoodItemCommand, FoodItemCorrected,
    FoodItemDefined, FoodItemEvent, FoodItemId,
};
