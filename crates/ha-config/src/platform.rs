//! Extraction of platform blocks from a loaded configuration
//!
//! A platform can be configured under the plain component key or under a
//! numbered/labelled variant of it, each holding one block or a list:
//!
//! ```yaml
//! sensor:
//!   - platform: fallback_sensors
//!     name: Outdoor
//! sensor 2:
//!   platform: fallback_sensors
//!   name: Indoor
//! ```

use serde_yaml::Value;
use tracing::trace;

/// Key naming the platform inside a component block
pub const CONF_PLATFORM: &str = "platform";

/// Collect every block of `component` whose `platform` equals `platform`
pub fn platform_configs(config: &Value, component: &str, platform: &str) -> Vec<Value> {
    let Some(root) = config.as_mapping() else {
        return Vec::new();
    };

    let mut found = Vec::new();
    for (key, value) in root {
        let Some(key) = key.as_str() else { continue };
        if !is_component_key(key, component) {
            continue;
        }

        let blocks: Vec<&Value> = match value {
            Value::Sequence(seq) => seq.iter().collect(),
            Value::Mapping(_) => vec![value],
            _ => Vec::new(),
        };

        for block in blocks {
            if block.get(CONF_PLATFORM).and_then(Value::as_str) == Some(platform) {
                trace!(key, platform, "Found platform block");
                found.push(block.clone());
            }
        }
    }

    found
}

fn is_component_key(key: &str, component: &str) -> bool {
    match key.strip_prefix(component) {
        Some("") => true,
        Some(rest) => rest.starts_with(' '),
        None => false,
    }
}
