pub mod engine;
pub mod loader;
pub mod matcher;

pub use engine::DecisionEngine;
pub use loader::{load_rule, RuleFileError};
pub use matcher::{PatternMatcher, RegexMatcher};
