//! Subscriber registry
//!
//! The set of chat ids currently opted in to the daily campaign.
//! Insertion is idempotent and there is no unsubscribe.

use dashmap::DashSet;

use crate::SubscriberId;

/// Opted-in subscriber set, shared across the campaign tasks.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    ids: DashSet<SubscriberId>,
}

impl SubscriberRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self { ids: DashSet::new() }
    }

    /// Idempotent insert. Returns true if the id was not registered before.
    pub fn add(&self, id: SubscriberId) -> bool {
        self.ids.insert(id)
    }

    /// Check membership
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.ids.contains(&id)
    }

    /// Snapshot of all subscriber ids.
    ///
    /// Safe to iterate while other tasks keep mutating the registry;
    /// the returned vector does not track later changes.
    pub fn list_all(&self) -> Vec<SubscriberId> {
        self.ids.iter().map(|id| *id).collect()
    }

    /// Number of registered subscribers
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_idempotent() {
        let registry = SubscriberRegistry::new();
        assert!(registry.add(42));
        assert!(!registry.add(42));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_list_all_is_a_snapshot() {
        let registry = SubscriberRegistry::new();
        registry.add(1);
        registry.add(2);

        let snapshot = registry.list_all();
        registry.add(3);

        assert_eq!(snapshot.len(), 2);
        assert_eq!(registry.len(), 3);
        assert!(registry.contains(3));
    }
}
