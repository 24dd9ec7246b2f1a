use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::domain::Rule;

/// Errors that can occur while reading a rule file.
#[derive(Error, Debug)]
pub enum RuleFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Load a single rule from a YAML file.
pub fn load_rule(path: impl AsRef<Path>) -> Result<Rule, RuleFileError> {
    let content = fs::read_to_string(path)?;
    parse_rule(&content)
}

/// Parse and validate a YAML rule document.
pub fn parse_rule(content: &str) -> Result<Rule, RuleFileError> {
    let rule: Rule = serde_yaml::from_str(content)?;
    rule.validate().map_err(RuleFileError::Validation)?;
    Ok(rule)
}
