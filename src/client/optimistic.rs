use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct Pending<V> {
    revision: u64,
    value: V,
}

/// Confirmed values with an overlay of local edits awaiting acknowledgement.
///
/// Every `apply` gets a fresh revision. Only the acknowledgement for the latest
/// revision of a key promotes it, so a slow ack for an older edit never hides a
/// newer one.
#[derive(Debug, Clone)]
pub struct Optimistic<K, V> {
    confirmed: BTreeMap<K, V>,
    pending: BTreeMap<K, Pending<V>>,
    next_revision: u64,
}

impl<K: Ord, V> Default for Optimistic<K, V> {
    fn default() -> Self {
        Self { confirmed: BTreeMap::new(), pending: BTreeMap::new(), next_revision: 1 }
    }
}

impl<K: Ord + Clone, V> Optimistic<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_confirmed(confirmed: BTreeMap<K, V>) -> Self {
        Self { confirmed, ..Self::default() }
    }

    pub fn apply(&mut self, key: K, value: V) -> u64 {
        let revision = self.next_revision;
        self.next_revision += 1;
        self.pending.insert(key, Pending { revision, value });
        revision
    }

    /// Promotes the pending value when `revision` is still the latest edit.
    pub fn confirm(&mut self, key: &K, revision: u64) -> bool {
        match self.pending.get(key) {
            Some(pending) if pending.revision == revision => {}
            _ => return false,
        }
        match self.pending.remove(key) {
            Some(pending) => {
                self.confirmed.insert(key.clone(), pending.value);
                true
            }
            None => false,
        }
    }

    /// Drops the pending value when `revision` is still the latest edit.
    pub fn revert(&mut self, key: &K, revision: u64) -> bool {
        if self.pending.get(key).is_some_and(|pending| pending.revision == revision) {
            self.pending.remove(key);
            true
        } else {
            false
        }
    }

    pub fn revert_all(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    /// Local view: the pending edit if any, else the confirmed value.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.pending.get(key).map(|pending| &pending.value).or_else(|| self.confirmed.get(key))
    }

    pub fn confirmed(&self, key: &K) -> Option<&V> {
        self.confirmed.get(key)
    }

    pub fn pending(&self, key: &K) -> Option<(u64, &V)> {
        self.pending.get(key).map(|pending| (pending.revision, &pending.value))
    }

    pub fn pending_keys(&self) -> impl Iterator<Item = &K> {
        self.pending.keys()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_then_confirm_promotes_value() {
        let mut overlay = Optimistic::new();
        let revision = overlay.apply("q1", "draft");

        assert_eq!(overlay.get(&"q1"), Some(&"draft"));
        assert_eq!(overlay.confirmed(&"q1"), None);

        assert!(overlay.confirm(&"q1", revision));
        assert_eq!(overlay.confirmed(&"q1"), Some(&"draft"));
        assert_eq!(overlay.pending_len(), 0);
    }

    #[test]
    fn stale_ack_keeps_newer_edit_pending() {
        let mut overlay = Optimistic::new();
        let first = overlay.apply("q1", "a");
        let second = overlay.apply("q1", "ab");

        assert!(!overlay.confirm(&"q1", first));
        assert_eq!(overlay.pending(&"q1"), Some((second, &"ab")));

        assert!(overlay.confirm(&"q1", second));
        assert_eq!(overlay.get(&"q1"), Some(&"ab"));
    }

    #[test]
    fn revert_restores_confirmed_value() {
        let mut overlay = Optimistic::with_confirmed(BTreeMap::from([("q1", "saved")]));
        let revision = overlay.apply("q1", "unsaved");
        overlay.apply("q2", "other");

        assert!(overlay.revert(&"q1", revision));
        assert_eq!(overlay.get(&"q1"), Some(&"saved"));
        assert_eq!(overlay.revert_all(), 1);
        assert_eq!(overlay.get(&"q2"), None);
    }
}
