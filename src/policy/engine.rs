use std::sync::Arc;
use tracing::debug;

use crate::domain::{Decision, ReviewRequest, Rule};
use crate::storage::{RuleStore, StoreError};

use super::matcher::{PatternMatcher, RegexMatcher};

/// Evaluates review requests against the stored rule set.
///
/// The engine holds no rule state of its own: every review reads the full
/// rule set from the store, so a decision always reflects the store contents
/// at the time of the call. Rules are tried in ascending name order and the
/// first rule whose image, annotation and namespace predicates all hold
/// decides. If none holds the request is denied.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    store: Arc<dyn RuleStore>,
    matcher: Arc<dyn PatternMatcher>,
}

impl DecisionEngine {
    pub fn new(store: Arc<dyn RuleStore>, matcher: Arc<dyn PatternMatcher>) -> Self {
        DecisionEngine { store, matcher }
    }

    /// Engine using regular expression matching.
    pub fn with_regex(store: Arc<dyn RuleStore>) -> Self {
        Self::new(store, Arc::new(RegexMatcher::new()))
    }

    pub fn store(&self) -> &Arc<dyn RuleStore> {
        &self.store
    }

    /// Evaluations that hit a stored pattern which does not compile.
    pub fn invalid_patterns(&self) -> u64 {
        self.matcher.invalid_patterns()
    }

    /// Decide a review request.
    ///
    /// Fails only if the rule set cannot be read.
    pub async fn review(&self, request: &ReviewRequest) -> Result<Decision, StoreError> {
        let mut rules = self.store.list(0).await?.rules;

        // Priority is name order regardless of what the backend returns.
        rules.sort_by(|a, b| a.name.cmp(&b.name));

        for rule in &rules {
            if self.rule_matches(rule, request) {
                debug!(rule = %rule.name, allowed = rule.allowed, "Rule matched");
                return Ok(Decision::from_rule(&rule.name, rule.allowed, &rule.reason));
            }
        }

        Ok(Decision::default_deny())
    }

    /// Whether all three predicates of `rule` hold for `request`.
    pub fn rule_matches(&self, rule: &Rule, request: &ReviewRequest) -> bool {
        let image = self.image_matches(rule, request);
        let annotations = self.annotations_match(rule, request);
        let namespace = self.matcher.matches(&rule.namespace, &request.namespace);

        image && annotations && namespace
    }

    /// At least one requested image matches at least one image pattern.
    fn image_matches(&self, rule: &Rule, request: &ReviewRequest) -> bool {
        request.images.iter().any(|image| {
            rule.image_patterns
                .iter()
                .any(|pattern| self.matcher.matches(pattern, image))
        })
    }

    /// Every request annotation `key=value` matches some `keypattern=valuepattern`.
    ///
    /// An annotation-less rule matches an annotation-less request. A request
    /// without annotations does not match a rule that defines some.
    fn annotations_match(&self, rule: &Rule, request: &ReviewRequest) -> bool {
        if request.annotations.is_empty() {
            return rule.annotations.is_empty();
        }

        let patterns: Vec<String> = rule
            .annotations
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();

        request.annotations.iter().all(|(key, value)| {
            let subject = format!("{}={}", key, value);
            patterns
                .iter()
                .any(|pattern| self.matcher.matches(pattern, &subject))
        })
    }
}
