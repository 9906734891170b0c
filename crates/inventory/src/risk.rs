//! Expiry-risk classification (pure, reporting-only).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lot::LotStatus;

const MS_PER_DAY: i64 = 86_400_000;

/// How soon a lot will expire. Drives UI warnings only; never mutates state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryRisk {
    /// The lot is already in a terminal state; risk does not apply.
    NotApplicable,
    /// More than seven days left.
    Low,
    /// Four to seven days left.
    Medium,
    /// One to three days left.
    High,
    /// Past its expiry date but still Available; the sweep should have
    /// expired it already.
    Overdue,
}

/// Whole days until expiry, rounded up.
///
/// `ceil((expiry_at - now) / 1 day)` in millisecond arithmetic; zero or
/// negative means the expiry moment has passed.
pub fn days_left(expiry_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let ms = expiry_at.signed_duration_since(now).num_milliseconds();
    // Equivalent to `ms.div_ceil(MS_PER_DAY)`; written out because signed
    // `i64::div_ceil` is still unstable. MS_PER_DAY is positive, so a nonzero
    // positive remainder is the only case that rounds up toward +infinity.
    let quotient = ms / MS_PER_DAY;
    if ms % MS_PER_DAY > 0 {
        quotient + 1
    } else {
        quotient
    }
}

/// Classify a lot's expiry risk at `now`.
pub fn classify(status: LotStatus, expiry_at: DateTime<Utc>, now: DateTime<Utc>) -> ExpiryRisk {
    if status.is_terminal() {
        return ExpiryRisk::NotApplicable;
    }

    match days_left(expiry_at, now) {
        d if d <= 0 => ExpiryRisk::Overdue,
        d if d <= 3 => ExpiryRisk::High,
        d if d <= 7 => ExpiryRisk::Medium,
        _ => ExpiryRisk::Low,
    }
}
