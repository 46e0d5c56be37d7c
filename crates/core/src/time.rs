//! Timestamp helpers shared across the workspace.

use chrono::{DateTime, Utc};

/// Current UTC instant, stamped as RFC3339.
///
/// Centralized so every component (audit emitter, cron trigger,
/// process store) renders timestamps identically.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Render a UTC instant as RFC3339, matching the wire format used by
/// the audit subject and the cron trigger's `trigger_data.datetime`.
#[must_use]
pub fn to_rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}
