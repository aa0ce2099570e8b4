//! YAML configuration loading
//!
//! Loads `configuration.yaml` with the custom tags users expect:
//!
//! - `!include path` - Include another YAML file
//! - `!secret key` - Substitute from secrets.yaml
//! - `!env_var VAR` - Environment variable substitution
//!
//! and extracts the per-platform blocks (`sensor: - platform: ...`) that
//! integrations are set up from.
//!
//! # Example
//!
//! ```ignore
//! use ha_config::{load_yaml, platform_configs};
//!
//! let config = load_yaml("/config", "configuration.yaml")?;
//! for sensor in platform_configs(&config, "sensor", "fallback_sensors") {
//!     // deserialize and set up
//! }
//! ```

mod error;
mod loader;
mod platform;
mod secrets;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, load_yaml_string, YamlLoader};
pub use platform::{platform_configs, CONF_PLATFORM};
pub use secrets::Secrets;

// Re-export serde_yaml::Value for convenience
pub use serde_yaml::Value;
