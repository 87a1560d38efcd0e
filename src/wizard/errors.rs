//! Recoverable errors produced by a transition.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const NAVIGATION_NOT_ALLOWED: &str = "Navigation between steps is not allowed";
pub const INVALID_TARGET_STEP: &str = "Invalid target step";
pub const COMPLETE_OFF_LAST_STEP: &str = "Form can only be completed from the last step";
pub const STEP_PROCESSING_FAILED: &str = "Step processing failed";
pub const FINAL_STEP_PROCESSING_FAILED: &str = "Final step processing failed";

/// Errors to show with the re-rendered step.
///
/// `fields` holds validator messages per field; `messages` holds everything
/// else (handler, navigation and record hook failures).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormErrors {
    #[serde(default)]
    pub fields: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub messages: Vec<String>,
}

impl FormErrors {
    pub fn is_empty(&self) -> bool {
        self.fields.values().all(Vec::is_empty) && self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.fields.clear();
        self.messages.clear();
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub fn field(&self, name: &str) -> &[String] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_field(&self, name: &str) -> bool {
        !self.field(name).is_empty()
    }

    /// Field messages (by field name) followed by general messages
    pub fn all(&self) -> Vec<String> {
        self.fields
            .values()
            .flatten()
            .chain(self.messages.iter())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.fields.values().map(Vec::len).sum::<usize>() + self.messages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_orders_fields_then_messages() {
        let mut errors = FormErrors::default();
        errors.push("handler said no");
        errors
            .fields
            .insert("title".to_string(), vec!["required".to_string()]);

        assert_eq!(errors.all(), vec!["required", "handler said no"]);
        assert_eq!(errors.len(), 2);
        assert!(errors.has_field("title"));

        errors.clear();
        assert!(errors.is_empty());
    }
}
