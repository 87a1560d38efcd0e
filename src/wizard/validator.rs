//! Rule-based validation of submitted step data.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::wizard::request::{FieldValue, StepData};
use crate::wizard::rules::{Rule, RuleSpec};
use crate::wizard::step::StepId;

/// Field name to failure messages. Empty means valid.
pub type ValidationErrors = BTreeMap<String, Vec<String>>;

/// Ordered field rules for one step
pub type StepRules = Vec<(String, Vec<RuleSpec>)>;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
    )
    .expect("email pattern is valid")
});

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://[^\s/?#@]+(?:@[^\s/?#]+)?(?:[/?#]\S*)?$")
        .expect("url pattern is valid")
});

/// Validates step data against registered rules.
#[derive(Debug, Default, Clone)]
pub struct Validator {
    rules: HashMap<StepId, StepRules>,
    errors: ValidationErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the rules for a step
    pub fn set_rules(&mut self, step: StepId, rules: StepRules) {
        self.rules.insert(step, rules);
    }

    pub fn rules_for(&self, step: &StepId) -> Option<&StepRules> {
        self.rules.get(step)
    }

    /// Validate `data` for `step`.
    ///
    /// Replaces the previous error set. Every rule of every field runs, so a
    /// field can collect several messages. Steps without rules always pass.
    pub fn validate(&mut self, step: &StepId, data: &StepData) -> bool {
        self.errors.clear();

        let Some(rules) = self.rules.get(step) else {
            return true;
        };

        for (field, specs) in rules {
            let value = data.get(field);
            for spec in specs {
                if !rule_passes(&spec.rule, value) {
                    self.errors
                        .entry(field.clone())
                        .or_default()
                        .push(spec.message_for(field));
                }
            }
        }

        if !self.errors.is_empty() {
            tracing::debug!(step = %step, fields = self.errors.len(), "Step validation failed");
        }

        self.errors.is_empty()
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn field_errors(&self, field: &str) -> &[String] {
        self.errors.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_field_errors(&self, field: &str) -> bool {
        !self.field_errors(field).is_empty()
    }

    pub fn first_field_error(&self, field: &str) -> Option<&str> {
        self.field_errors(field).first().map(String::as_str)
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    /// All messages as one list, fields in name order
    pub fn all_errors(&self) -> Vec<String> {
        self.errors.values().flatten().cloned().collect()
    }
}

/// Loose emptiness: missing, `""` and `"0"` all count as empty
fn is_empty(value: Option<&FieldValue>) -> bool {
    match value {
        None => true,
        Some(FieldValue::Text(s)) => s.is_empty() || s == "0",
        Some(FieldValue::File(_)) => false,
    }
}

fn rule_passes(rule: &Rule, value: Option<&FieldValue>) -> bool {
    if let Rule::Required = rule {
        return match value {
            Some(FieldValue::Text(s)) => !s.is_empty(),
            Some(FieldValue::File(_)) => true,
            None => false,
        };
    }

    // Every other rule holds vacuously on empty input
    if is_empty(value) {
        return true;
    }

    let Some(text) = value.and_then(FieldValue::as_text) else {
        // File references pass through unchecked
        return true;
    };

    match rule {
        Rule::Required => true,
        Rule::Email => EMAIL_RE.is_match(text),
        Rule::Numeric => parse_number(text).is_some(),
        Rule::Url => URL_RE.is_match(text),
        Rule::MinLen(n) => text.chars().count() >= *n,
        Rule::MaxLen(n) => text.chars().count() <= *n,
        Rule::MinValue(n) => parse_number(text).is_some_and(|v| v >= *n),
        Rule::MaxValue(n) => parse_number(text).is_some_and(|v| v <= *n),
    }
}

/// Parse a decimal number, allowing surrounding whitespace and an exponent
/// but not `inf`/`nan` spellings.
fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty()
        || !trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
    {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::request::{step_data, FileRef};
    use crate::wizard::rules::FieldRules;
    use crate::wizard::config::UnknownRulePolicy;

    fn rules(pairs: &[(&str, &str)]) -> StepRules {
        pairs
            .iter()
            .map(|(field, text)| {
                let specs = FieldRules::from(*text)
                    .parse("1", field, UnknownRulePolicy::Ignore)
                    .unwrap();
                (field.to_string(), specs)
            })
            .collect()
    }

    fn validator(pairs: &[(&str, &str)]) -> Validator {
        let mut v = Validator::new();
        v.set_rules(StepId::from(1), rules(pairs));
        v
    }

    #[test]
    fn test_no_rules_is_valid() {
        let mut v = Validator::new();
        assert!(v.validate(&StepId::from(1), &StepData::new()));
        assert!(v.errors().is_empty());
    }

    #[test]
    fn test_required_treats_zero_as_present() {
        let mut v = validator(&[("count", "required")]);
        assert!(v.validate(&StepId::from(1), &step_data([("count", "0")])));
        assert!(!v.validate(&StepId::from(1), &step_data([("count", "")])));
        assert!(!v.validate(&StepId::from(1), &StepData::new()));
        assert_eq!(
            v.first_field_error("count"),
            Some("The count field is required.")
        );
    }

    #[test]
    fn test_optional_rules_pass_on_empty() {
        let mut v = validator(&[("email", "email|min:5"), ("age", "numeric|min_value:18")]);
        assert!(v.validate(&StepId::from(1), &StepData::new()));
        assert!(v.validate(&StepId::from(1), &step_data([("email", ""), ("age", "0")])));
    }

    #[test]
    fn test_all_rules_run_without_short_circuit() {
        let mut v = validator(&[("title", "required|min:5|email")]);
        assert!(!v.validate(&StepId::from(1), &step_data([("title", "abc")])));
        assert_eq!(v.field_errors("title").len(), 2);
        assert!(v.has_field_errors("title"));
    }

    #[test]
    fn test_errors_overwritten_each_call() {
        let mut v = validator(&[("title", "required")]);
        assert!(!v.validate(&StepId::from(1), &StepData::new()));
        assert!(v.validate(&StepId::from(1), &step_data([("title", "ok")])));
        assert!(v.errors().is_empty());
    }

    #[test]
    fn test_email_and_url() {
        let mut v = validator(&[("email", "email"), ("site", "url")]);
        assert!(v.validate(
            &StepId::from(1),
            &step_data([("email", "a.b@example.com"), ("site", "https://example.com/x?y=1")])
        ));
        assert!(!v.validate(
            &StepId::from(1),
            &step_data([("email", "invalid-email"), ("site", "example.com")])
        ));
        assert_eq!(v.all_errors().len(), 2);
    }

    #[test]
    fn test_numeric_and_bounds() {
        let mut v = validator(&[("age", "numeric|min_value:18|max_value:65")]);
        assert!(v.validate(&StepId::from(1), &step_data([("age", "30")])));
        assert!(v.validate(&StepId::from(1), &step_data([("age", " 18.0")])));
        assert!(!v.validate(&StepId::from(1), &step_data([("age", "70")])));
        assert!(!v.validate(&StepId::from(1), &step_data([("age", "abc")])));
        // numeric, min_value and max_value each fail on a non-number
        assert_eq!(v.field_errors("age").len(), 3);
        assert!(!v.validate(&StepId::from(1), &step_data([("age", "inf")])));
    }

    #[test]
    fn test_length_counts_characters() {
        let mut v = validator(&[("name", "min:3|max:4")]);
        assert!(v.validate(&StepId::from(1), &step_data([("name", "äöü")])));
        assert!(!v.validate(&StepId::from(1), &step_data([("name", "ab")])));
        assert!(!v.validate(&StepId::from(1), &step_data([("name", "abcde")])));
    }

    #[test]
    fn test_file_values_pass_through() {
        let mut v = validator(&[("cv", "required|email|max:2")]);
        let mut data = StepData::new();
        data.insert(
            "cv".to_string(),
            FieldValue::File(FileRef {
                name: "cv.pdf".to_string(),
                handle: "/tmp/upload-1".to_string(),
                size: Some(1024),
                content_type: None,
            }),
        );
        assert!(v.validate(&StepId::from(1), &data));
    }

    #[test]
    fn test_add_and_clear_errors() {
        let mut v = Validator::new();
        v.add_error("email", "taken");
        assert_eq!(v.all_errors(), vec!["taken".to_string()]);
        v.clear_errors();
        assert!(v.errors().is_empty());
    }
}
