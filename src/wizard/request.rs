//! Submitted form requests.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::wizard::step::StepId;

/// Keys consumed by the wizard itself and never stored as step data
pub const ACTION_KEY: &str = "action";
pub const TARGET_STEP_KEY: &str = "target_step";
pub const CSRF_TOKEN_KEY: &str = "csrf_token";

/// Field values submitted for one step, keyed by field name
pub type StepData = BTreeMap<String, FieldValue>;

/// Reference to an uploaded file. The wizard stores it as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRef {
    pub name: String,
    /// Host-specific handle (temporary path, upload id, ...)
    pub handle: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// A submitted field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    File(FileRef),
}

impl FieldValue {
    /// Text content, `None` for file references
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::File(_) => None,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, FieldValue::File(_))
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::File(file) => f.write_str(&file.name),
        }
    }
}

/// Build step data from `(name, value)` pairs of text fields
pub fn step_data<I, K, V>(pairs: I) -> StepData
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), FieldValue::Text(v.into())))
        .collect()
}

/// Errors raised while interpreting a submitted request
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    #[error("unknown form action '{0}'")]
    UnknownAction(String),
}

/// The transition a request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormAction {
    #[default]
    Next,
    Prev,
    Save,
    Goto,
    Complete,
}

impl FormAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormAction::Next => "next",
            FormAction::Prev => "prev",
            FormAction::Save => "save",
            FormAction::Goto => "goto",
            FormAction::Complete => "complete",
        }
    }
}

impl fmt::Display for FormAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormAction {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "next" => Ok(FormAction::Next),
            "prev" | "previous" => Ok(FormAction::Prev),
            "save" => Ok(FormAction::Save),
            "goto" => Ok(FormAction::Goto),
            "complete" => Ok(FormAction::Complete),
            other => Err(RequestError::UnknownAction(other.to_string())),
        }
    }
}

/// One submission to the wizard
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FormRequest {
    pub action: FormAction,
    pub target_step: Option<StepId>,
    pub data: StepData,
}

impl FormRequest {
    pub fn new(action: FormAction, data: StepData) -> Self {
        Self {
            action,
            target_step: None,
            data,
        }
    }

    pub fn next(data: StepData) -> Self {
        Self::new(FormAction::Next, data)
    }

    pub fn prev() -> Self {
        Self::new(FormAction::Prev, StepData::new())
    }

    pub fn save(data: StepData) -> Self {
        Self::new(FormAction::Save, data)
    }

    pub fn complete(data: StepData) -> Self {
        Self::new(FormAction::Complete, data)
    }

    pub fn goto(target: impl Into<StepId>, data: StepData) -> Self {
        Self {
            action: FormAction::Goto,
            target_step: Some(target.into()),
            data,
        }
    }

    /// Build a request from a raw submitted field map, as a browser posts it.
    ///
    /// `action` defaults to `next`. The control keys (`action`,
    /// `target_step`, `csrf_token`) are removed from the step data.
    pub fn from_fields<I, K, V>(fields: I) -> Result<Self, RequestError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut data = step_data(fields);

        let action = match data.remove(ACTION_KEY) {
            Some(value) => value.to_string().parse()?,
            None => FormAction::default(),
        };
        let target_step = data
            .remove(TARGET_STEP_KEY)
            .map(|v| v.to_string())
            .filter(|s| !s.trim().is_empty())
            .map(|s| StepId::from(s.trim()));
        data.remove(CSRF_TOKEN_KEY);

        Ok(Self {
            action,
            target_step,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_fields_strips_control_keys() {
        let req = FormRequest::from_fields([
            ("action", "goto"),
            ("target_step", "3"),
            ("csrf_token", "abc"),
            ("title", "Hello"),
        ])
        .unwrap();

        assert_eq!(req.action, FormAction::Goto);
        assert_eq!(req.target_step, Some(StepId::from(3)));
        assert_eq!(req.data.len(), 1);
        assert_eq!(req.data["title"], FieldValue::from("Hello"));
    }

    #[test]
    fn test_action_defaults_to_next() {
        let req = FormRequest::from_fields([("title", "x")]).unwrap();
        assert_eq!(req.action, FormAction::Next);
        assert!(req.target_step.is_none());
    }

    #[test]
    fn test_unknown_action_rejected() {
        let err = FormRequest::from_fields([("action", "launch")]).unwrap_err();
        assert_eq!(err, RequestError::UnknownAction("launch".to_string()));
    }

    #[test]
    fn test_field_value_deserializes_text_and_file() {
        let data: StepData = serde_json::from_str(
            r#"{"title": "a", "cv": {"name": "cv.pdf", "handle": "/tmp/up1"}}"#,
        )
        .unwrap();
        assert_eq!(data["title"].as_text(), Some("a"));
        assert!(data["cv"].is_file());
    }
}
