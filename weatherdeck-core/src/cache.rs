//! Reuse-versus-refetch decision.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::model::LocationRecord;

/// Cached weather younger than this is served without a network call.
pub const FRESH_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Per-event signals that force a refetch regardless of age.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Overrides {
    /// The user explicitly re-triggered geolocation for the current-location slot.
    pub geo: bool,
    /// Hour boundary, post-idle visibility or an explicit refresh.
    pub hour_boundary: bool,
}

impl Overrides {
    pub fn any(&self) -> bool {
        self.geo || self.hour_boundary
    }
}

/// True when `record` may be reused as-is.
pub fn should_use_cache(
    record: Option<&LocationRecord>,
    overrides: Overrides,
    now: DateTime<Utc>,
) -> bool {
    let Some(record) = record else {
        return false;
    };
    !overrides.any() && is_fresh(record.last_updated, now)
}

/// Age strictly below [`FRESH_WINDOW`]. A timestamp in the future counts as fresh.
pub fn is_fresh(last_updated: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(last_updated).num_milliseconds() < FRESH_WINDOW.as_millis() as i64
}

/// Age strictly above [`FRESH_WINDOW`]; used for the return-after-absence check.
pub fn is_past_window(last: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(last).num_milliseconds() > FRESH_WINDOW.as_millis() as i64
}
