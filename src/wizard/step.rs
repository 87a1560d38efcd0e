//! Step identifiers.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Opaque token naming a step of a wizard.
///
/// Steps may be configured with integers or strings. Integers are stored in
/// their decimal form so `StepId::from(2)` and `StepId::from("2")` name the
/// same step, both in memory and in persisted session records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepId(String);

impl StepId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for StepId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&String> for StepId {
    fn from(value: &String) -> Self {
        Self(value.clone())
    }
}

macro_rules! step_id_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for StepId {
            fn from(value: $t) -> Self {
                Self(value.to_string())
            }
        })*
    };
}

step_id_from_int!(u8, u16, u32, u64, usize, i32, i64);

impl Serialize for StepId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for StepId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Int(n) => StepId::from(n),
            Raw::Text(s) => StepId::from(s),
        })
    }
}
