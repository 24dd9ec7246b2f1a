//! Binary rule records.
//!
//! Rules are stored as protobuf messages. Field tags are part of the
//! persisted format and must never be renumbered.

use prost::Message;
use std::collections::BTreeMap;

use crate::domain::Rule;

use super::error::StoreError;

/// Persisted form of a [`Rule`].
#[derive(Clone, PartialEq, Message)]
pub struct RuleRecord {
    #[prost(string, tag = "1")]
    pub name: String,

    #[prost(message, repeated, tag = "2")]
    pub containers: Vec<ContainerRecord>,

    #[prost(bool, tag = "3")]
    pub allowed: bool,

    #[prost(btree_map = "string, string", tag = "4")]
    pub annotations: BTreeMap<String, String>,

    #[prost(string, tag = "5")]
    pub namespace: String,

    #[prost(string, tag = "6")]
    pub reason: String,
}

/// One permitted image pattern.
#[derive(Clone, PartialEq, Message)]
pub struct ContainerRecord {
    #[prost(string, tag = "1")]
    pub image: String,
}

impl From<&Rule> for RuleRecord {
    fn from(rule: &Rule) -> Self {
        RuleRecord {
            name: rule.name.clone(),
            containers: rule
                .image_patterns
                .iter()
                .map(|image| ContainerRecord {
                    image: image.clone(),
                })
                .collect(),
            allowed: rule.allowed,
            annotations: rule.annotations.clone(),
            namespace: rule.namespace.clone(),
            reason: rule.reason.clone(),
        }
    }
}

impl From<RuleRecord> for Rule {
    fn from(record: RuleRecord) -> Self {
        Rule {
            name: record.name,
            namespace: record.namespace,
            image_patterns: record.containers.into_iter().map(|c| c.image).collect(),
            annotations: record.annotations,
            allowed: record.allowed,
            reason: record.reason,
        }
    }
}

/// Encode a rule into its stored byte form.
pub fn encode(rule: &Rule) -> Vec<u8> {
    RuleRecord::from(rule).encode_to_vec()
}

/// Decode a stored value. `key` is only used for error reporting.
pub fn decode(key: &str, bytes: &[u8]) -> Result<Rule, StoreError> {
    RuleRecord::decode(bytes)
        .map(Rule::from)
        .map_err(|source| StoreError::CorruptRecord {
            key: key.to_string(),
            source,
        })
}
