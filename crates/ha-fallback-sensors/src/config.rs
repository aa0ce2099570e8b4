//! Fallback sensor configuration
//!
//! The same shape is read from a YAML `sensor:` platform entry and from a
//! config entry (`data` overlaid with `options`). [`FallbackSensorConfig`]
//! is the raw form, [`SensorSettings`] the validated one.

use ha_config_entries::ConfigEntry;
use ha_core::EntityId;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::conditions::{ConditionConfig, ConditionSet};
use crate::consts::{MAX_HYSTERESIS_DELAY, MIN_ENTITIES};
use crate::error::{FallbackConfigError, FallbackConfigResult};

/// Raw fallback sensor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackSensorConfig {
    pub name: String,

    /// Source entities in priority order; a single string is accepted
    #[serde(deserialize_with = "ensure_list")]
    pub entities: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,

    /// Seconds a new candidate must stay stable before switching
    #[serde(default)]
    pub hysteresis_delay: u64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ConditionConfig>,
}

/// Accept either a list of strings or a single string
fn ensure_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(entity) => vec![entity],
        OneOrMany::Many(entities) => entities,
    })
}

impl FallbackSensorConfig {
    /// Parse one YAML platform config
    pub fn from_yaml(value: serde_yaml::Value) -> FallbackConfigResult<Self> {
        Ok(serde_yaml::from_value(value)?)
    }

    /// Parse a JSON object such as config flow input
    pub fn from_json(
        value: serde_json::Map<String, serde_json::Value>,
    ) -> FallbackConfigResult<Self> {
        Ok(serde_json::from_value(serde_json::Value::Object(value))?)
    }

    /// Parse a config entry; `unique_id` falls back to the entry id
    pub fn from_entry(entry: &ConfigEntry) -> FallbackConfigResult<Self> {
        let mut config = Self::from_json(entry.merged_config())?;
        if config.unique_id.is_none() {
            config.unique_id = Some(entry.entry_id.clone());
        }
        Ok(config)
    }

    /// Check every rule and compile conditions
    pub fn validate(&self) -> FallbackConfigResult<SensorSettings> {
        if self.entities.len() < MIN_ENTITIES {
            return Err(FallbackConfigError::TooFewEntities {
                count: self.entities.len(),
            });
        }

        let mut seen = HashSet::new();
        let mut entities = Vec::with_capacity(self.entities.len());
        for raw in &self.entities {
            let entity_id: EntityId =
                raw.parse()
                    .map_err(|source| FallbackConfigError::InvalidEntityId {
                        entity_id: raw.clone(),
                        source,
                    })?;
            if !seen.insert(entity_id.clone()) {
                return Err(FallbackConfigError::DuplicateEntity(raw.clone()));
            }
            entities.push(entity_id);
        }

        if self.hysteresis_delay > MAX_HYSTERESIS_DELAY {
            return Err(FallbackConfigError::HysteresisOutOfRange {
                delay: self.hysteresis_delay,
            });
        }

        let conditions = ConditionSet::compile(&self.conditions, entities.len())?;

        Ok(SensorSettings {
            name: self.name.clone(),
            entities,
            unique_id: self.unique_id.clone(),
            hysteresis_delay: Duration::from_secs(self.hysteresis_delay),
            conditions,
        })
    }
}

/// Validated configuration of one fallback sensor
#[derive(Debug, Clone)]
pub struct SensorSettings {
    pub name: String,
    pub entities: Vec<EntityId>,
    pub unique_id: Option<String>,
    pub hysteresis_delay: Duration,
    pub conditions: ConditionSet,
}
