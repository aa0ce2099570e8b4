//! Configuration error types

use ha_core::EntityIdError;
use thiserror::Error;

use crate::consts::{MAX_HYSTERESIS_DELAY, MIN_ENTITIES};

/// Errors that prevent a fallback sensor from being created
#[derive(Debug, Error)]
pub enum FallbackConfigError {
    #[error("At least {} source entities are required, got {count}", MIN_ENTITIES)]
    TooFewEntities { count: usize },

    #[error("Invalid source entity '{entity_id}': {source}")]
    InvalidEntityId {
        entity_id: String,
        #[source]
        source: EntityIdError,
    },

    #[error("Source entity '{0}' is listed more than once")]
    DuplicateEntity(String),

    #[error("hysteresis_delay must be between 0 and {} seconds, got {delay}", MAX_HYSTERESIS_DELAY)]
    HysteresisOutOfRange { delay: u64 },

    #[error("Condition {condition}: invalid regex '{pattern}': {source}")]
    InvalidRegex {
        condition: usize,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Condition {condition}: range needs at least one of min or max")]
    EmptyRange { condition: usize },

    #[error("Condition {condition}: min {min} is greater than max {max}")]
    InvertedRange { condition: usize, min: f64, max: f64 },

    #[error("Condition {condition}: index {index} is out of range for {sources} sources")]
    ConditionIndexOutOfRange {
        condition: usize,
        index: usize,
        sources: usize,
    },

    #[error("Fallback sensor '{entity_id}' cannot be one of its own sources")]
    SelfReference { entity_id: String },

    #[error("unique_id '{0}' is already used by another fallback sensor")]
    DuplicateUniqueId(String),

    #[error("Could not build sensor entity id from name '{name}': {source}")]
    InvalidName {
        name: String,
        #[source]
        source: EntityIdError,
    },

    #[error("Invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid entry configuration: {0}")]
    Json(#[from] serde_json::Error),
}

pub type FallbackConfigResult<T> = Result<T, FallbackConfigError>;
