//! Tracing/logging (shared setup).
//!
//! The lifecycle core performs no logging of its own beyond event
//! recording; processes and tests that want structured logs call
//! [`init`] once at startup.

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, layers).
pub mod tracing;
