use crate::errors::FlowError;
use crate::input::FieldValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Accumulated values for a flow, keyed by field name
pub type FormValue = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRegistration {
    pub field: String,
    pub is_required: bool,
}

/// One step of a flow. Names are unique within a flow and appear in the URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldRegistration>,
}

impl Step {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            fields: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn required(self, field: &str) -> Self {
        self.field(field, true)
    }

    pub fn optional(self, field: &str) -> Self {
        self.field(field, false)
    }

    fn field(mut self, field: &str, is_required: bool) -> Self {
        self.fields.push(FieldRegistration {
            field: field.to_string(),
            is_required,
        });
        self
    }
}

/// An active error, inline when `field` is set, a step banner otherwise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepError {
    #[serde(default)]
    pub field: Option<String>,
    pub error: FlowError,
}

impl StepError {
    pub fn field(field: impl Into<String>, error: FlowError) -> Self {
        Self {
            field: Some(field.into()),
            error,
        }
    }

    pub fn step(error: FlowError) -> Self {
        Self { field: None, error }
    }
}
