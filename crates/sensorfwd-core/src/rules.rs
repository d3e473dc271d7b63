//! Topic rule table.
//!
//! Rules are loaded from a JSON document mapping an exact topic to the rule
//! for that topic:
//!
//! ```json
//! {
//!   "sensors/outside/humidity": {
//!     "type": "float",
//!     "tags": "{\"loc\": \"outside\"}",
//!     "measurement": "humidity"
//!   }
//! }
//! ```
//!
//! `tags` may be a JSON object or a string holding a JSON object literal.
//! A rule that fails to load is skipped and logged; the rest of the table
//! still loads.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

/// Declared type of a topic's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// Decimal floating-point number
    Float,
    /// Signed 64-bit integer
    Integer,
    /// Raw text
    String,
}

impl ValueType {
    /// Parse the configuration spelling of a value type.
    #[must_use]
    pub fn from_config(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "float" => Some(Self::Float),
            "int" | "integer" => Some(Self::Integer),
            "str" | "string" => Some(Self::String),
            _ => None,
        }
    }

    /// Configuration spelling of this value type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Integer => "int",
            Self::String => "str",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How to coerce and tag messages received on one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRule {
    /// Exact topic this rule applies to
    pub topic: String,
    /// Declared payload type; `None` forwards the raw payload as text
    pub value_type: Option<ValueType>,
    /// Tags attached to every record built from this rule
    pub tags: BTreeMap<String, String>,
    /// Measurement name override; defaults to the topic
    pub measurement: Option<String>,
}

impl TopicRule {
    /// Create a rule with no type, no tags and the topic as measurement.
    #[must_use]
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            value_type: None,
            tags: BTreeMap::new(),
            measurement: None,
        }
    }

    /// Set the declared value type.
    #[must_use]
    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    /// Add a tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Override the measurement name.
    #[must_use]
    pub fn with_measurement(mut self, measurement: impl Into<String>) -> Self {
        self.measurement = Some(measurement.into());
        self
    }

    /// Measurement name records built from this rule are written under.
    #[must_use]
    pub fn measurement_name(&self) -> &str {
        self.measurement.as_deref().unwrap_or(&self.topic)
    }
}

/// Rule as written in the rules file.
#[derive(Debug, Deserialize)]
struct RuleSpec {
    #[serde(default, rename = "type", alias = "format", alias = "valueType")]
    value_type: Option<Value>,
    #[serde(default)]
    tags: Option<Value>,
    #[serde(default, alias = "measurementName")]
    measurement: Option<String>,
}

/// Immutable lookup from exact topic to rule.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: HashMap<String, TopicRule>,
}

impl RuleTable {
    /// Build a table from already constructed rules.
    ///
    /// Rules with an invalid topic are skipped, and the first rule wins when
    /// a topic is repeated.
    #[must_use]
    pub fn from_rules(rules: impl IntoIterator<Item = TopicRule>) -> Self {
        let mut table = HashMap::new();
        for rule in rules {
            if let Err(err) = validate_topic(&rule.topic) {
                tracing::warn!(error = %err, "Skipping rule");
                continue;
            }
            if table.contains_key(&rule.topic) {
                tracing::warn!(topic = %rule.topic, "Duplicate rule for topic, keeping the first");
                continue;
            }
            table.insert(rule.topic.clone(), rule);
        }
        Self { rules: table }
    }

    /// Parse a rules document.
    ///
    /// # Errors
    ///
    /// Returns error if the document is not a JSON object. Individual rules
    /// that fail to parse are logged and skipped.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let document: Value =
            serde_json::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let Value::Object(entries) = document else {
            return Err(ConfigError::NotAnObject);
        };

        let mut rules = Vec::with_capacity(entries.len());
        for (topic, spec) in entries {
            match parse_rule(&topic, spec) {
                Ok(rule) => rules.push(rule),
                Err(err) => tracing::warn!(topic = %topic, error = %err, "Skipping rule"),
            }
        }

        let table = Self::from_rules(rules);
        tracing::debug!(rules = table.len(), "Loaded topic rules");
        Ok(table)
    }

    /// Read and parse a rules file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not a JSON object.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&input)
    }

    /// Fail if no rule was loaded.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Empty`] if the table has no rules.
    pub fn require_non_empty(self) -> Result<Self, ConfigError> {
        if self.rules.is_empty() {
            Err(ConfigError::Empty)
        } else {
            Ok(self)
        }
    }

    /// Look up the rule for an exact topic.
    #[must_use]
    pub fn lookup(&self, topic: &str) -> Option<&TopicRule> {
        self.rules.get(topic)
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the table has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Configured topics in sorted order.
    #[must_use]
    pub fn topics(&self) -> Vec<&str> {
        let mut topics: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        topics.sort_unstable();
        topics
    }
}

fn parse_rule(topic: &str, spec: Value) -> Result<TopicRule, RuleError> {
    validate_topic(topic)?;

    let spec: RuleSpec =
        serde_json::from_value(spec).map_err(|e| RuleError::Malformed(e.to_string()))?;

    let value_type = match spec.value_type {
        None => {
            tracing::warn!(topic, "Type missing for topic, forwarding raw payload");
            None
        }
        Some(raw) => {
            let parsed = raw.as_str().and_then(ValueType::from_config);
            if parsed.is_none() {
                tracing::warn!(
                    topic,
                    value_type = %raw,
                    "Unknown type for topic, forwarding raw payload"
                );
            }
            parsed
        }
    };

    let tags = match spec.tags {
        Some(tags) => parse_tags(tags)?,
        None => BTreeMap::new(),
    };

    let measurement = spec.measurement.filter(|m| !m.is_empty());

    Ok(TopicRule {
        topic: topic.to_string(),
        value_type,
        tags,
        measurement,
    })
}

/// Parse a tag set given either as an object or as a string holding an object literal.
fn parse_tags(raw: Value) -> Result<BTreeMap<String, String>, RuleError> {
    let object = match raw {
        Value::Null => return Ok(BTreeMap::new()),
        Value::Object(object) => object,
        Value::String(literal) => match serde_json::from_str::<Value>(&literal) {
            Ok(Value::Object(object)) => object,
            Ok(_) => return Err(RuleError::InvalidTags(format!("{literal}: not an object"))),
            Err(e) => return Err(RuleError::InvalidTags(format!("{literal}: {e}"))),
        },
        other => return Err(RuleError::InvalidTags(format!("{other}: not an object"))),
    };

    tags_from_object(object)
}

fn tags_from_object(object: Map<String, Value>) -> Result<BTreeMap<String, String>, RuleError> {
    let mut tags = BTreeMap::new();
    for (key, value) in object {
        let value = match value {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return Err(RuleError::InvalidTags(format!("tag '{key}' is not a scalar"))),
        };
        if key.is_empty() || key.ends_with('\\') || value.ends_with('\\') {
            return Err(RuleError::InvalidTags(format!(
                "tag '{key}' has an empty key or ends in a backslash"
            )));
        }
        tags.insert(key, value);
    }
    Ok(tags)
}

fn validate_topic(topic: &str) -> Result<(), RuleError> {
    if topic.is_empty() || topic.contains(['+', '#']) {
        return Err(RuleError::InvalidTopic(topic.to_string()));
    }
    Ok(())
}

/// Errors loading the rule table as a whole.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Rules file could not be read
    #[error("failed to read rules: {0}")]
    Read(String),
    /// Rules document is not valid JSON
    #[error("rules parse error: {0}")]
    Parse(String),
    /// Rules document is not a JSON object
    #[error("rules must be a JSON object mapping topic to rule")]
    NotAnObject,
    /// No rule survived loading
    #[error("no topic rules configured")]
    Empty,
}

/// Errors loading a single rule.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RuleError {
    /// Topic is empty or contains wildcards
    #[error("invalid topic '{0}': rules need an exact topic")]
    InvalidTopic(String),
    /// Tags are not a JSON object of scalars
    #[error("invalid tags: {0}")]
    InvalidTags(String),
    /// Rule object has the wrong shape
    #[error("malformed rule: {0}")]
    Malformed(String),
}
