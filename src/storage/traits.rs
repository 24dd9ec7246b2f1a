use async_trait::async_trait;
use std::fmt::Debug;

use crate::domain::Rule;

use super::error::StoreError;

/// Result of a successful conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The rule did not exist and was created
    Created,
    /// An existing rule was overwritten
    Replaced,
}

/// One page of rules in ascending name order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleListing {
    pub rules: Vec<Rule>,

    /// Number of stored rules matching the prefix, regardless of the limit
    pub total: u64,
}

impl RuleListing {
    /// True if more rules are stored than were returned.
    pub fn is_truncated(&self) -> bool {
        (self.rules.len() as u64) < self.total
    }
}

/// Rule persistence operations.
///
/// Implementations must return listings ordered ascending by rule name and
/// must perform `add` as a single conditional write.
#[async_trait]
pub trait RuleStore: Send + Sync + Debug {
    /// Write a rule.
    ///
    /// Without `override_existing` the write only succeeds if no rule with the
    /// same name exists; with it, only if one does. A failed precondition is
    /// reported as [`StoreError::Conflict`].
    async fn add(&self, rule: &Rule, override_existing: bool) -> Result<AddOutcome, StoreError>;

    /// Point lookup by exact name.
    async fn get(&self, name: &str) -> Result<Rule, StoreError>;

    /// List rules, at most `limit` of them when `limit > 0`.
    async fn list(&self, limit: u64) -> Result<RuleListing, StoreError>;

    /// Delete a rule by name, returning the number of removed keys.
    async fn delete(&self, name: &str) -> Result<u64, StoreError>;
}

pub(crate) fn require_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() {
        return Err(StoreError::Validation("rule name is empty".to_string()));
    }
    Ok(())
}
