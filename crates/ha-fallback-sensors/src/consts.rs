//! Constants for the fallback sensors integration

/// Integration domain, also the `platform:` value in YAML
pub const DOMAIN: &str = "fallback_sensors";

/// Entity domain of the sensors this integration creates
pub const SENSOR_DOMAIN: &str = "sensor";

// Configuration keys
pub const CONF_NAME: &str = "name";
pub const CONF_ENTITIES: &str = "entities";
pub const CONF_UNIQUE_ID: &str = "unique_id";
pub const CONF_HYSTERESIS_DELAY: &str = "hysteresis_delay";
pub const CONF_CONDITIONS: &str = "conditions";

// State attributes
pub const ATTR_CURRENT_SOURCE: &str = "current_source";
pub const ATTR_SOURCE_ENTITIES: &str = "source_entities";
pub const ATTR_SOURCE_INDEX: &str = "source_index";
pub const ATTR_FALLBACK_COUNT: &str = "fallback_count";
pub const ATTR_LAST_FALLBACK_TIME: &str = "last_fallback_time";

/// Name offered by the config flow form
pub const DEFAULT_NAME: &str = "Fallback Sensor";

/// Object id used when the name slugifies to nothing
pub const DEFAULT_OBJECT_ID: &str = "fallback_sensor";

/// Upper bound for `hysteresis_delay`, in seconds
pub const MAX_HYSTERESIS_DELAY: u64 = 300;

/// Minimum number of source entities
pub const MIN_ENTITIES: usize = 2;

/// Attributes copied from the active source onto the fallback sensor
pub const INHERITED_ATTRIBUTES: [&str; 4] = [
    ha_core::attrs::UNIT_OF_MEASUREMENT,
    ha_core::attrs::DEVICE_CLASS,
    ha_core::attrs::STATE_CLASS,
    ha_core::attrs::ICON,
];

// Config flow errors and abort reasons
pub const ERROR_MIN_ENTITIES: &str = "min_entities";
pub const ERROR_INVALID_CONFIG: &str = "invalid_config";
pub const ABORT_ALREADY_CONFIGURED: &str = "already_configured";
