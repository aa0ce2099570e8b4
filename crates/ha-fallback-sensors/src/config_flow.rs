//! Config and options flow
//!
//! The user step creates a config entry for one fallback sensor; the
//! options step edits it afterwards. Both return a [`FlowResult`] the
//! caller shows or applies.

use ha_config_entries::{
    ConfigEntries, ConfigEntriesResult, ConfigEntry, ConfigEntryUpdate, FlowResult, FormField,
    BASE_ERROR,
};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::debug;

use crate::config::FallbackSensorConfig;
use crate::consts::{
    ABORT_ALREADY_CONFIGURED, CONF_ENTITIES, CONF_HYSTERESIS_DELAY, CONF_NAME, CONF_UNIQUE_ID,
    DEFAULT_NAME, DOMAIN, ERROR_INVALID_CONFIG, ERROR_MIN_ENTITIES, MIN_ENTITIES,
};

pub const STEP_USER: &str = "user";
pub const STEP_INIT: &str = "init";

/// Number of entities in flow input, counting a lone string as one
fn entity_count(input: &Map<String, Value>) -> usize {
    match input.get(CONF_ENTITIES) {
        Some(Value::Array(entities)) => entities.len(),
        Some(Value::String(_)) => 1,
        _ => 0,
    }
}

/// Field errors for flow input, empty when it is acceptable
fn validate_input(config: Map<String, Value>) -> HashMap<String, String> {
    let mut errors = HashMap::new();

    if entity_count(&config) < MIN_ENTITIES {
        errors.insert(CONF_ENTITIES.to_string(), ERROR_MIN_ENTITIES.to_string());
        return errors;
    }

    if let Err(e) = FallbackSensorConfig::from_json(config).and_then(|c| c.validate()) {
        debug!("Rejected fallback sensor flow input: {}", e);
        errors.insert(BASE_ERROR.to_string(), ERROR_INVALID_CONFIG.to_string());
    }

    errors
}

fn user_form(errors: HashMap<String, String>) -> FlowResult {
    FlowResult::Form {
        step_id: STEP_USER.to_string(),
        data_schema: vec![
            FormField::required(CONF_NAME, "string").with_default(json!(DEFAULT_NAME)),
            FormField::required(CONF_ENTITIES, "entity_list"),
            FormField::optional(CONF_UNIQUE_ID, "string"),
            FormField::optional(CONF_HYSTERESIS_DELAY, "integer").with_default(json!(0)),
        ],
        errors,
    }
}

/// Initial step of the config flow
///
/// Without input the empty form is shown. Input with fewer than two
/// entities or that otherwise fails validation re-shows the form with
/// errors; a `unique_id` already used by another entry aborts.
pub fn step_user(entries: &ConfigEntries, user_input: Option<Map<String, Value>>) -> FlowResult {
    let Some(input) = user_input else {
        return user_form(HashMap::new());
    };

    let errors = validate_input(input.clone());
    if !errors.is_empty() {
        return user_form(errors);
    }

    let unique_id = input
        .get(CONF_UNIQUE_ID)
        .and_then(Value::as_str)
        .map(str::to_string);
    if let Some(unique_id) = &unique_id {
        if entries.get_by_unique_id(DOMAIN, unique_id).is_some() {
            return FlowResult::Abort {
                reason: ABORT_ALREADY_CONFIGURED.to_string(),
            };
        }
    }

    let title = input
        .get(CONF_NAME)
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_NAME)
        .to_string();

    FlowResult::CreateEntry {
        title,
        unique_id,
        data: input.into_iter().collect(),
    }
}

/// Options step, pre-filled from the entry's current configuration
pub fn step_init(entry: &ConfigEntry, user_input: Option<Map<String, Value>>) -> FlowResult {
    let current = entry.merged_config();

    let mut errors = HashMap::new();
    if let Some(input) = user_input {
        let mut merged = current.clone();
        merged.extend(input.clone());

        errors = validate_input(merged);
        if entity_count(&input) < MIN_ENTITIES {
            errors.insert(CONF_ENTITIES.to_string(), ERROR_MIN_ENTITIES.to_string());
        }
        if errors.is_empty() {
            return FlowResult::CreateEntry {
                title: String::new(),
                unique_id: None,
                data: input.into_iter().collect(),
            };
        }
    }

    let current_name = current
        .get(CONF_NAME)
        .cloned()
        .unwrap_or_else(|| json!(DEFAULT_NAME));
    let current_entities = current
        .get(CONF_ENTITIES)
        .cloned()
        .unwrap_or_else(|| json!([]));
    let current_delay = current
        .get(CONF_HYSTERESIS_DELAY)
        .cloned()
        .unwrap_or_else(|| json!(0));

    FlowResult::Form {
        step_id: STEP_INIT.to_string(),
        data_schema: vec![
            FormField::required(CONF_NAME, "string").with_default(current_name),
            FormField::required(CONF_ENTITIES, "entity_list").with_default(current_entities),
            FormField::optional(CONF_HYSTERESIS_DELAY, "integer").with_default(current_delay),
        ],
        errors,
    }
}

/// Add the entry a finished user step describes and set it up
///
/// Returns `None` for results that don't create an entry.
pub async fn create_entry(
    entries: &ConfigEntries,
    result: FlowResult,
) -> ConfigEntriesResult<Option<ConfigEntry>> {
    let Some(entry) = result.into_entry(DOMAIN) else {
        return Ok(None);
    };

    let entry = entries.add(entry).await?;
    entries.setup(&entry.entry_id).await?;
    Ok(entries.get(&entry.entry_id))
}

/// Store the options a finished options step produced
///
/// A loaded entry is reloaded with the new configuration.
pub async fn apply_options(
    entries: &ConfigEntries,
    entry_id: &str,
    result: FlowResult,
) -> ConfigEntriesResult<Option<ConfigEntry>> {
    let FlowResult::CreateEntry { data, .. } = result else {
        return Ok(None);
    };

    let entry = entries
        .update(entry_id, ConfigEntryUpdate::new().options(data))
        .await?;
    Ok(Some(entry))
}
