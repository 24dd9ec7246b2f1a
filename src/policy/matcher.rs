use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

/// Strategy used to test a stored pattern against a request value.
pub trait PatternMatcher: Send + Sync + Debug {
    /// Whether `value` matches `pattern`.
    ///
    /// A pattern that cannot be compiled never matches.
    fn matches(&self, pattern: &str, value: &str) -> bool;

    /// Number of evaluations that hit a pattern which does not compile.
    fn invalid_patterns(&self) -> u64 {
        0
    }
}

/// Unanchored regular expression search.
///
/// Invalid patterns are logged at `warn` the first time they are seen and at
/// `debug` afterwards, since the same stored rule is re-read on every review.
#[derive(Debug, Default)]
pub struct RegexMatcher {
    invalid_patterns: AtomicU64,
    reported: Mutex<HashSet<String>>,
}

impl RegexMatcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PatternMatcher for RegexMatcher {
    fn matches(&self, pattern: &str, value: &str) -> bool {
        match Regex::new(pattern) {
            Ok(re) => re.is_match(value),
            Err(e) => {
                self.invalid_patterns.fetch_add(1, Ordering::Relaxed);
                if self.reported.lock().insert(pattern.to_string()) {
                    tracing::warn!(
                        pattern,
                        error = %e,
                        "failed to compile rule pattern; treating as non-match"
                    );
                } else {
                    tracing::debug!(pattern, "skipping invalid rule pattern");
                }
                false
            }
        }
    }

    fn invalid_patterns(&self) -> u64 {
        self.invalid_patterns.load(Ordering::Relaxed)
    }
}
