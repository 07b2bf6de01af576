//! Status-tracked credentials: sessions and the access tokens issued within
//! them.

pub mod access_token;
pub mod generator;
pub mod session;

pub use generator::{generate_id, generate_token};

use chrono::{DateTime, Duration, Utc};

/// Instant `ttl_seconds` after `now`, or `None` when it does not fit in a
/// timestamp.
pub fn expiry_after(now: DateTime<Utc>, ttl_seconds: u64) -> Option<DateTime<Utc>> {
    let seconds = i64::try_from(ttl_seconds).ok()?;
    now.checked_add_signed(Duration::try_seconds(seconds)?)
}
