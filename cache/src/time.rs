use std::time::{SystemTime, UNIX_EPOCH};

/// The current wall-clock time in whole seconds since the Unix epoch.
///
/// Expirations are stored in the remote store and read back by other
/// processes, so they use wall-clock time rather than a process-local
/// `Instant`.
#[inline]
pub(crate) fn now_secs() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map_or(0, |d| d.as_secs())
}

/// The absolute expiration for an entry written now with the given TTL.
#[inline]
pub(crate) fn expires_in(ttl_secs: u64) -> u64 {
  now_secs().saturating_add(ttl_secs)
}

/// Seconds left until `expires_at`. Negative once the entry is past due.
#[inline]
pub(crate) fn remaining_secs(expires_at: u64) -> i64 {
  expires_at as i64 - now_secs() as i64
}
