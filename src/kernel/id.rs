//! Identity types for the connector graph.
//!
//! Ids are process-wide and strictly increasing. `ConnectorId` doubles as the
//! total order used whenever two connection lists are locked together, so
//! `a.connect(b)` and `b.connect(a)` racing on different threads always take
//! the locks in the same sequence.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONNECTOR_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a connector, assigned once at construction.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectorId(pub u64);

impl ConnectorId {
    /// Allocate the next id.
    pub fn next() -> Self {
        Self(NEXT_CONNECTOR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for ConnectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectorId({})", self.0)
    }
}

impl fmt::Display for ConnectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Token returned by every subscription; hand it back to unsubscribe.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    pub fn next() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_ids_increase() {
        let a = ConnectorId::next();
        let b = ConnectorId::next();
        assert!(a < b);
    }

    #[test]
    fn test_subscription_ids_unique() {
        let a = SubscriptionId::next();
        let b = SubscriptionId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_debug_format() {
        assert_eq!(format!("{}", ConnectorId(7)), "ConnectorId(7)");
    }
}
