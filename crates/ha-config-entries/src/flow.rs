//! Config flow results
//!
//! A config or options flow step either shows a form (possibly with
//! per-field errors), finishes by creating an entry, or aborts.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::entry::ConfigEntry;

/// Error key for errors not tied to a single field
pub const BASE_ERROR: &str = "base";

/// Form field schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl FormField {
    pub fn required(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            required: true,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, field_type)
        }
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Result of a flow step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowResult {
    /// Show (or re-show) a form
    Form {
        step_id: String,
        data_schema: Vec<FormField>,
        errors: HashMap<String, String>,
    },
    /// Finish the flow; for an options flow `data` holds the new options
    CreateEntry {
        title: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        unique_id: Option<String>,
        data: HashMap<String, serde_json::Value>,
    },
    /// Stop the flow without creating anything
    Abort { reason: String },
}

impl FlowResult {
    /// Build the config entry a finished config flow describes
    pub fn into_entry(self, domain: &str) -> Option<ConfigEntry> {
        match self {
            FlowResult::CreateEntry {
                title,
                unique_id,
                data,
            } => {
                let mut entry = ConfigEntry::new(domain, title).with_data(data);
                entry.unique_id = unique_id;
                Some(entry)
            }
            _ => None,
        }
    }

    /// Errors shown on a form, empty for other results
    pub fn errors(&self) -> HashMap<String, String> {
        match self {
            FlowResult::Form { errors, .. } => errors.clone(),
            _ => HashMap::new(),
        }
    }
}
