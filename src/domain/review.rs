use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Reason returned when no stored rule matches a request.
pub const DEFAULT_DENY_REASON: &str = "no matching rule";

/// Engine-facing view of an image review.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewRequest {
    /// Container images requested for launch
    pub images: Vec<String>,

    /// Target namespace
    pub namespace: String,

    /// Pod annotations
    pub annotations: BTreeMap<String, String>,
}

impl ReviewRequest {
    pub fn new(namespace: impl Into<String>, images: Vec<String>) -> Self {
        ReviewRequest {
            images,
            namespace: namespace.into(),
            annotations: BTreeMap::new(),
        }
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

/// Outcome of evaluating a review against the rule set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    pub reason: String,

    /// Name of the rule that decided, absent for the default deny
    #[serde(skip)]
    pub matched_rule: Option<String>,
}

impl Decision {
    /// Decision taken from a matching rule.
    pub fn from_rule(name: &str, allowed: bool, reason: &str) -> Self {
        Decision {
            allowed,
            reason: reason.to_string(),
            matched_rule: Some(name.to_string()),
        }
    }

    /// Decision returned when nothing matched.
    pub fn default_deny() -> Self {
        Decision {
            allowed: false,
            reason: DEFAULT_DENY_REASON.to_string(),
            matched_rule: None,
        }
    }

    #[inline]
    pub fn is_default(&self) -> bool {
        self.matched_rule.is_none()
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.allowed { "ALLOW" } else { "DENY" };
        match &self.matched_rule {
            Some(rule) => write!(f, "{} ({})", verdict, rule),
            None => write!(f, "{} (default)", verdict),
        }
    }
}
