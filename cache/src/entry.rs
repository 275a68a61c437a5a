use serde::{Deserialize, Serialize};

/// A cached value together with its logical expiration.
///
/// The expiration is advisory: it only decides when a background refresh is
/// due. Physical removal is left to the store's own TTL, which is always set
/// to at least the remaining logical lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedEntry<V> {
  /// The user's value.
  pub value: V,
  /// Expiration in seconds since the Unix epoch.
  pub expires_at: u64,
}

impl<V> CachedEntry<V> {
  pub fn new(value: V, expires_at: u64) -> Self {
    Self { value, expires_at }
  }

  /// Consumes the entry, returning the value.
  #[inline]
  pub fn into_value(self) -> V {
    self.value
  }
}

/// A raw store payload counts as absent when it is empty or only whitespace.
#[inline]
pub(crate) fn is_blank(raw: &[u8]) -> bool {
  raw.iter().all(u8::is_ascii_whitespace)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn blank_payloads() {
    assert!(is_blank(b""));
    assert!(is_blank(b"  \t\r\n"));
    assert!(!is_blank(b" {} "));
  }
}
