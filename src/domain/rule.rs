use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key prefix under which rules are stored.
pub const RULE_KEY_PREFIX: &str = "rule/";

/// Operator-defined admission rule.
///
/// All patterns are regular expressions evaluated with search (unanchored)
/// semantics. Rules are evaluated in ascending `name` order and the first
/// matching rule decides the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rule {
    /// Unique rule name, used as the storage key suffix
    pub name: String,

    /// Pattern matched against the request namespace
    #[serde(default)]
    pub namespace: String,

    /// Patterns matched against each container image of the request
    #[serde(
        default,
        rename = "containers",
        alias = "images",
        with = "container_patterns"
    )]
    pub image_patterns: Vec<String>,

    /// Annotation key pattern -> annotation value pattern
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    /// Decision returned when this rule matches
    #[serde(default)]
    pub allowed: bool,

    /// Reason returned alongside the decision
    #[serde(default)]
    pub reason: String,
}

impl Rule {
    /// Create a rule with the required fields set.
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        image_patterns: Vec<String>,
    ) -> Self {
        Rule {
            name: name.into(),
            namespace: namespace.into(),
            image_patterns,
            ..Default::default()
        }
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn with_decision(mut self, allowed: bool, reason: impl Into<String>) -> Self {
        self.allowed = allowed;
        self.reason = reason.into();
        self
    }

    /// Storage key relative to the configured store prefix.
    pub fn key(&self) -> String {
        rule_key(&self.name)
    }

    /// Check the fields required when creating a rule.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("rule name is empty".to_string());
        }
        if self.image_patterns.is_empty() {
            return Err(format!("rule \"{}\" has no image patterns", self.name));
        }
        if self.namespace.is_empty() {
            return Err(format!("rule \"{}\" has no namespace pattern", self.name));
        }
        Ok(())
    }
}

/// Image patterns in rule files.
///
/// Written as `containers: [{image: <pattern>}]`. Reading also accepts a
/// plain list of patterns.
mod container_patterns {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize)]
    struct Container<'a> {
        image: &'a str,
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Entry {
        Pattern(String),
        Container { image: String },
    }

    pub fn serialize<S: Serializer>(patterns: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(patterns.iter().map(|image| Container { image }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        let entries = Vec::<Entry>::deserialize(deserializer)?;
        Ok(entries
            .into_iter()
            .map(|entry| match entry {
                Entry::Pattern(pattern) | Entry::Container { image: pattern } => pattern,
            })
            .collect())
    }
}

/// Build the storage key for a rule name.
pub fn rule_key(name: &str) -> String {
    format!("{}{}", RULE_KEY_PREFIX, name)
}

/// Parse `key=value` annotation arguments into a pattern map.
///
/// Splits on the first `=`, so value patterns may themselves contain `=`.
pub fn parse_annotations<I, S>(items: I) -> Result<BTreeMap<String, String>, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut result = BTreeMap::new();
    for item in items {
        let item = item.as_ref();
        match item.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                result.insert(key.to_string(), value.to_string());
            }
            _ => return Err(format!("cannot parse annotation \"{}\", expected key=value", item)),
        }
    }
    Ok(result)
}
