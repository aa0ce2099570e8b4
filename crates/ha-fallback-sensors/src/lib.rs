//! Fallback sensors
//!
//! A sensor platform that aggregates several source entities into one
//! virtual sensor. The sensor follows the first source that is available
//! and passes its value conditions, optionally waiting for a new pick to
//! stay stable for a hysteresis delay before switching.
//!
//! # Key Types
//!
//! - [`ConditionSet`] - Range and regex rules a source value must pass
//! - [`Selector`] - Active source index with hysteresis
//! - [`FallbackSensor`] - The entity, driven through explicit handlers
//! - [`FallbackSensors`] - Sets sensors up from YAML and config entries
//!
//! # Example
//!
//! ```yaml
//! sensor:
//!   - platform: fallback_sensors
//!     name: Outdoor Temperature
//!     entities:
//!       - sensor.outdoor_primary
//!       - sensor.outdoor_backup
//!     hysteresis_delay: 30
//!     conditions:
//!       - type: range
//!         min: -40
//!         max: 60
//! ```

pub mod conditions;
pub mod config;
pub mod config_flow;
pub mod consts;
pub mod error;
pub mod runtime;
pub mod selector;
pub mod sensor;
pub mod setup;

pub use conditions::{Condition, ConditionConfig, ConditionSet, ScopedCondition};
pub use config::{FallbackSensorConfig, SensorSettings};
pub use consts::DOMAIN;
pub use error::{FallbackConfigError, FallbackConfigResult};
pub use runtime::FallbackSensorHandle;
pub use selector::{select_source, PendingSwitch, Selector, Transition};
pub use sensor::FallbackSensor;
pub use setup::FallbackSensors;
