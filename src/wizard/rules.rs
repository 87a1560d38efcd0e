//! Typed validation rules.
//!
//! Rule strings such as `"required|min:5|max:100"` are parsed once when a
//! wizard is configured. Validation then dispatches on [`Rule`] without
//! touching the original strings again.

use serde::{Deserialize, Serialize};

use crate::wizard::config::{ConfigError, UnknownRulePolicy};

/// A single validation rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Required,
    Email,
    Numeric,
    Url,
    /// Minimum length in characters
    MinLen(usize),
    /// Maximum length in characters
    MaxLen(usize),
    MinValue(f64),
    MaxValue(f64),
}

impl Rule {
    /// Parse one rule token (`required`, `min:5`, ...).
    ///
    /// Returns `None` for names this crate does not know, and for known
    /// names whose argument is missing or not a number.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        let (name, arg) = match token.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (token, None),
        };

        match (name, arg) {
            ("required", None) => Some(Rule::Required),
            ("email", None) => Some(Rule::Email),
            ("numeric", None) => Some(Rule::Numeric),
            ("url", None) => Some(Rule::Url),
            ("min", Some(n)) => n.parse().ok().map(Rule::MinLen),
            ("max", Some(n)) => n.parse().ok().map(Rule::MaxLen),
            ("min_value", Some(n)) => n.parse().ok().map(Rule::MinValue),
            ("max_value", Some(n)) => n.parse().ok().map(Rule::MaxValue),
            _ => None,
        }
    }

    /// Message used when the rule carries no custom message
    pub fn default_message(&self, field: &str) -> String {
        match self {
            Rule::Required => format!("The {} field is required.", field),
            Rule::Email => format!("The {} field must be a valid email address.", field),
            Rule::Numeric => format!("The {} field must be numeric.", field),
            Rule::Url => format!("The {} field must be a valid URL.", field),
            Rule::MinLen(n) => format!("The {} field must be at least {} characters.", field, n),
            Rule::MaxLen(n) => format!("The {} field must not exceed {} characters.", field, n),
            Rule::MinValue(n) => format!("The {} field must be at least {}.", field, n),
            Rule::MaxValue(n) => format!("The {} field must not exceed {}.", field, n),
        }
    }
}

/// A rule plus an optional message overriding the default one.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSpec {
    pub rule: Rule,
    pub message: Option<String>,
}

impl RuleSpec {
    pub fn new(rule: Rule) -> Self {
        Self {
            rule,
            message: None,
        }
    }

    pub fn with_message(rule: Rule, message: impl Into<String>) -> Self {
        Self {
            rule,
            message: Some(message.into()),
        }
    }

    /// Message to report for `field` when this rule fails
    pub fn message_for(&self, field: &str) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| self.rule.default_message(field))
    }
}

/// Rule descriptors as they appear in configuration, before parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleDescriptor {
    /// A bare rule (`"email"`), a rule with an argument (`"min:5"`) or a
    /// pipe-joined list (`"required|min:5"`)
    Text(String),
    /// A rule with a custom failure message
    WithMessage { rule: String, message: String },
}

impl RuleDescriptor {
    pub fn text(rule: impl Into<String>) -> Self {
        RuleDescriptor::Text(rule.into())
    }

    pub fn with_message(rule: impl Into<String>, message: impl Into<String>) -> Self {
        RuleDescriptor::WithMessage {
            rule: rule.into(),
            message: message.into(),
        }
    }
}

/// The rule list for one field in configuration: either one string or a list
/// of descriptors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldRules {
    Pipe(String),
    List(Vec<RuleDescriptor>),
}

impl From<&str> for FieldRules {
    fn from(value: &str) -> Self {
        FieldRules::Pipe(value.to_string())
    }
}

impl From<Vec<RuleDescriptor>> for FieldRules {
    fn from(value: Vec<RuleDescriptor>) -> Self {
        FieldRules::List(value)
    }
}

impl FieldRules {
    /// Parse into typed rules, in declaration order.
    ///
    /// Unknown tokens are dropped under [`UnknownRulePolicy::Ignore`] and
    /// rejected under [`UnknownRulePolicy::Reject`].
    pub fn parse(
        &self,
        step: &str,
        field: &str,
        policy: UnknownRulePolicy,
    ) -> Result<Vec<RuleSpec>, ConfigError> {
        let descriptors: Vec<RuleDescriptor> = match self {
            FieldRules::Pipe(s) => vec![RuleDescriptor::Text(s.clone())],
            FieldRules::List(list) => list.clone(),
        };

        let mut specs = Vec::new();
        for descriptor in descriptors {
            match descriptor {
                RuleDescriptor::Text(text) => {
                    for token in text.split('|').filter(|t| !t.trim().is_empty()) {
                        if let Some(rule) = resolve(token, step, field, policy)? {
                            specs.push(RuleSpec::new(rule));
                        }
                    }
                }
                RuleDescriptor::WithMessage { rule, message } => {
                    if let Some(rule) = resolve(&rule, step, field, policy)? {
                        specs.push(RuleSpec::with_message(rule, message));
                    }
                }
            }
        }
        Ok(specs)
    }
}

fn resolve(
    token: &str,
    step: &str,
    field: &str,
    policy: UnknownRulePolicy,
) -> Result<Option<Rule>, ConfigError> {
    match Rule::parse(token) {
        Some(rule) => Ok(Some(rule)),
        None => match policy {
            UnknownRulePolicy::Ignore => {
                tracing::debug!(step, field, rule = token.trim(), "Ignoring unknown rule");
                Ok(None)
            }
            UnknownRulePolicy::Reject => Err(ConfigError::UnknownRule {
                step: step.to_string(),
                field: field.to_string(),
                rule: token.trim().to_string(),
            }),
        },
    }
}
