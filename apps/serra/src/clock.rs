//! Wall clock access. The core never reads the time itself.

use serra_core::Timestamp;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as a [`Timestamp`]. A clock set before 1970 reads as 0.
pub fn unix_now() -> Timestamp {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    Timestamp::from_unix_secs(secs)
}
