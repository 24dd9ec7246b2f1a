use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::domain::rule::{rule_key, Rule, RULE_KEY_PREFIX};

use super::codec;
use super::error::StoreError;
use super::traits::{require_name, AddOutcome, RuleListing, RuleStore};

/// In-memory rule store.
///
/// Holds encoded records in an ordered map so it behaves like the etcd
/// store: same key layout, same conditional write, same decode path.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with rules (for testing).
    pub fn with_rules(rules: impl IntoIterator<Item = Rule>) -> Self {
        let store = Self::new();
        {
            let mut entries = store.entries.lock();
            for rule in rules {
                entries.insert(rule.key(), codec::encode(&rule));
            }
        }
        store
    }

    /// Store raw bytes under a key, bypassing the codec (for testing).
    pub fn insert_raw(&self, key: impl Into<String>, value: Vec<u8>) {
        self.entries.lock().insert(key.into(), value);
    }

    /// Make every operation fail with a timeout (for testing).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_online(&self, operation: &'static str) -> Result<(), StoreError> {
        if self.offline.load(Ordering::Relaxed) {
            return Err(StoreError::Timeout {
                operation,
                after: Duration::ZERO,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn add(&self, rule: &Rule, override_existing: bool) -> Result<AddOutcome, StoreError> {
        rule.validate().map_err(StoreError::Validation)?;
        self.check_online("add")?;

        let key = rule.key();
        let mut entries = self.entries.lock();
        let exists = entries.contains_key(&key);

        if exists != override_existing {
            return Err(StoreError::Conflict {
                name: rule.name.clone(),
                override_existing,
            });
        }

        entries.insert(key, codec::encode(rule));

        Ok(if override_existing {
            AddOutcome::Replaced
        } else {
            AddOutcome::Created
        })
    }

    async fn get(&self, name: &str) -> Result<Rule, StoreError> {
        require_name(name)?;
        self.check_online("get")?;

        let key = rule_key(name);
        let entries = self.entries.lock();
        match entries.get(&key) {
            Some(bytes) => codec::decode(&key, bytes),
            None => Err(StoreError::NotFound(name.to_string())),
        }
    }

    async fn list(&self, limit: u64) -> Result<RuleListing, StoreError> {
        self.check_online("list")?;

        let entries = self.entries.lock();
        let matching = entries
            .iter()
            .filter(|(key, _)| key.starts_with(RULE_KEY_PREFIX));

        let total = matching.clone().count() as u64;
        let take = if limit == 0 { usize::MAX } else { limit as usize };

        let rules = matching
            .take(take)
            .map(|(key, bytes)| codec::decode(key, bytes))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RuleListing { rules, total })
    }

    async fn delete(&self, name: &str) -> Result<u64, StoreError> {
        require_name(name)?;
        self.check_online("delete")?;

        let removed = self.entries.lock().remove(&rule_key(name));
        Ok(u64::from(removed.is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn rule(name: &str) -> Rule {
        Rule::new(name, "^default$", vec!["^nginx".to_string()])
    }

    #[tokio::test]
    async fn test_add_conflict_on_create() {
        let store = MemoryStore::new();

        let first = store.add(&rule("r1"), false).await;
        let second = store.add(&rule("r1"), false).await;

        assert_eq!(assert_ok!(first), AddOutcome::Created);
        assert!(matches!(
            assert_err!(second),
            StoreError::Conflict { override_existing: false, .. }
        ));
    }

    #[tokio::test]
    async fn test_override_requires_existing_rule() {
        let store = MemoryStore::new();

        let missing = store.add(&rule("r1"), true).await;
        assert!(matches!(
            missing,
            Err(StoreError::Conflict { override_existing: true, .. })
        ));
        assert!(store.is_empty());

        store.add(&rule("r1"), false).await.unwrap();
        let updated = rule("r1").with_decision(true, "updated");
        assert_eq!(store.add(&updated, true).await.unwrap(), AddOutcome::Replaced);
        assert_eq!(store.get("r1").await.unwrap().reason, "updated");
    }

    #[tokio::test]
    async fn test_add_validates_rule() {
        let store = MemoryStore::new();
        let invalid = Rule::new("r1", "^default$", vec![]);

        assert!(matches!(
            store.add(&invalid, false).await,
            Err(StoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = MemoryStore::new();

        assert!(matches!(store.get("nope").await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.get("").await, Err(StoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::with_rules([rule("r1")]);

        assert_eq!(store.delete("r1").await.unwrap(), 1);
        assert_eq!(store.delete("r1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_requires_name() {
        let store = MemoryStore::with_rules([rule("r1")]);

        let err = assert_err!(store.delete("").await);
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_get_fails_on_corrupt_record() {
        let store = MemoryStore::new();
        store.insert_raw("rule/broken", vec![0xff, 0xff, 0xff]);

        let err = assert_err!(store.get("broken").await);
        assert!(matches!(err, StoreError::CorruptRecord { ref key, .. } if key == "rule/broken"));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_list_pagination() {
        let store = MemoryStore::with_rules(["e", "c", "a", "d", "b"].map(rule));

        let page = store.list(2).await.unwrap();
        let names: Vec<_> = page.rules.iter().map(|r| r.name.as_str()).collect();

        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(page.total, 5);
        assert!(page.is_truncated());

        let all = store.list(0).await.unwrap();
        assert_eq!(all.rules.len(), 5);
        assert!(!all.is_truncated());

        let oversized = store.list(10).await.unwrap();
        assert_eq!(oversized.rules.len(), 5);
        assert_eq!(oversized.total, 5);
    }

    #[tokio::test]
    async fn test_list_fails_on_corrupt_record() {
        let store = MemoryStore::with_rules([rule("a"), rule("c")]);
        store.insert_raw("rule/b", vec![0xff, 0xff, 0xff]);

        let err = store.list(0).await.unwrap_err();
        assert!(matches!(err, StoreError::CorruptRecord { ref key, .. } if key == "rule/b"));
    }

    #[tokio::test]
    async fn test_list_ignores_other_keys() {
        let store = MemoryStore::with_rules([rule("a")]);
        store.insert_raw("config/banner", b"hello".to_vec());

        let listing = store.list(0).await.unwrap();
        assert_eq!(listing.total, 1);
    }

    #[tokio::test]
    async fn test_offline_store_times_out() {
        let store = MemoryStore::with_rules([rule("a")]);
        store.set_offline(true);

        let err = store.list(0).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
