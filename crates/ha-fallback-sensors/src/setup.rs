//! Integration setup
//!
//! [`FallbackSensors`] creates sensors from YAML platform configs and from
//! config entries, keeps their handles and tears them down again.

use dashmap::DashMap;
use ha_config::{platform_configs, Value as YamlValue};
use ha_config_entries::{ConfigEntries, ConfigEntry, UpdateAction};
use ha_core::EntityId;
use ha_event_bus::EventBus;
use ha_state_machine::StateMachine;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

use crate::config::{FallbackSensorConfig, SensorSettings};
use crate::consts::{DEFAULT_OBJECT_ID, DOMAIN, SENSOR_DOMAIN};
use crate::error::{FallbackConfigError, FallbackConfigResult};
use crate::runtime::{self, FallbackSensorHandle};
use crate::sensor::FallbackSensor;

/// The fallback sensors integration
pub struct FallbackSensors {
    bus: Arc<EventBus>,
    states: Arc<StateMachine>,
    /// Sensors from YAML, keyed by entity_id
    platform_sensors: DashMap<String, FallbackSensorHandle>,
    /// Sensors from config entries, keyed by entry_id
    entry_sensors: DashMap<String, FallbackSensorHandle>,
}

impl FallbackSensors {
    pub fn new(bus: Arc<EventBus>, states: Arc<StateMachine>) -> Self {
        Self {
            bus,
            states,
            platform_sensors: DashMap::new(),
            entry_sensors: DashMap::new(),
        }
    }

    /// Wire entry setup, unload and reload-on-update into the config entries
    /// manager
    pub fn register(self: &Arc<Self>, entries: &ConfigEntries) {
        let integration = Arc::clone(self);
        entries.register_setup_handler(
            DOMAIN,
            Arc::new(move |entry: &ConfigEntry| {
                integration
                    .setup_entry(entry)
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            }),
        );

        let integration = Arc::clone(self);
        entries.register_unload_handler(
            DOMAIN,
            Arc::new(move |entry: &ConfigEntry| integration.unload_entry(&entry.entry_id)),
        );

        entries.register_update_listener(
            DOMAIN,
            Arc::new(|entry: &ConfigEntry| {
                debug!("Reloading fallback sensors config entry: {}", entry.entry_id);
                UpdateAction::Reload
            }),
        );
    }

    /// Set up every `fallback_sensors` platform entry of a loaded
    /// `configuration.yaml`, returning how many sensors were created
    ///
    /// Invalid entries are logged and skipped.
    pub fn setup_yaml(&self, config: &YamlValue) -> usize {
        let mut count = 0;
        for platform_config in platform_configs(config, SENSOR_DOMAIN, DOMAIN) {
            match self.setup_platform(platform_config) {
                Ok(_) => count += 1,
                Err(e) => error!("Invalid fallback sensor configuration: {}", e),
            }
        }

        if count > 0 {
            info!("Set up {} fallback sensors from YAML", count);
        }
        count
    }

    /// Set up one sensor from a YAML platform config
    pub fn setup_platform(&self, config: YamlValue) -> FallbackConfigResult<EntityId> {
        let settings = FallbackSensorConfig::from_yaml(config)?.validate()?;
        debug!(
            "Setting up fallback sensor '{}' with entities: {:?}",
            settings.name, settings.entities
        );

        let handle = self.start(settings)?;
        let entity_id = handle.entity_id().clone();
        self.platform_sensors.insert(entity_id.to_string(), handle);
        Ok(entity_id)
    }

    /// Set up the sensor of a config entry
    #[instrument(skip(self, entry), fields(entry_id = %entry.entry_id))]
    pub fn setup_entry(&self, entry: &ConfigEntry) -> FallbackConfigResult<EntityId> {
        let settings = FallbackSensorConfig::from_entry(entry)?.validate()?;
        debug!(
            "Setting up fallback sensor '{}' from config entry with entities: {:?}",
            settings.name, settings.entities
        );

        let handle = self.start(settings)?;
        let entity_id = handle.entity_id().clone();
        self.entry_sensors.insert(entry.entry_id.clone(), handle);
        Ok(entity_id)
    }

    /// Remove the sensor of a config entry; `false` if it had none
    pub fn unload_entry(&self, entry_id: &str) -> bool {
        debug!("Unloading fallback sensors config entry: {}", entry_id);
        match self.entry_sensors.remove(entry_id) {
            Some((_, handle)) => {
                handle.remove();
                true
            }
            None => false,
        }
    }

    /// Remove every YAML sensor
    pub fn unload_platform(&self) {
        let keys: Vec<String> = self
            .platform_sensors
            .iter()
            .map(|r| r.key().clone())
            .collect();
        for key in keys {
            if let Some((_, handle)) = self.platform_sensors.remove(&key) {
                handle.remove();
            }
        }
    }

    /// Entity id of the sensor created for a config entry
    pub fn entry_entity_id(&self, entry_id: &str) -> Option<EntityId> {
        self.entry_sensors
            .get(entry_id)
            .map(|h| h.entity_id().clone())
    }

    /// Number of running sensors
    pub fn sensor_count(&self) -> usize {
        self.platform_sensors.len() + self.entry_sensors.len()
    }

    fn start(&self, settings: SensorSettings) -> FallbackConfigResult<FallbackSensorHandle> {
        if let Some(unique_id) = &settings.unique_id {
            if self.unique_id_in_use(unique_id) {
                return Err(FallbackConfigError::DuplicateUniqueId(unique_id.clone()));
            }
        }

        let entity_id = self.free_entity_id(&settings.name)?;
        if settings.entities.contains(&entity_id) {
            return Err(FallbackConfigError::SelfReference {
                entity_id: entity_id.to_string(),
            });
        }

        let sensor = FallbackSensor::new(entity_id, settings, self.states.clone());
        Ok(runtime::spawn(sensor, &self.bus, self.states.clone()))
    }

    fn unique_id_in_use(&self, unique_id: &str) -> bool {
        self.platform_sensors
            .iter()
            .chain(self.entry_sensors.iter())
            .any(|h| h.unique_id() == Some(unique_id))
    }

    /// `sensor.<slug>`, with `_2`, `_3`, ... appended while the id is taken
    fn free_entity_id(&self, name: &str) -> FallbackConfigResult<EntityId> {
        let base = EntityId::from_name(SENSOR_DOMAIN, name, DEFAULT_OBJECT_ID).map_err(
            |source| FallbackConfigError::InvalidName {
                name: name.to_string(),
                source,
            },
        )?;

        let mut candidate = base.clone();
        let mut suffix = 2;
        while self.states.contains(&candidate.to_string()) {
            candidate = base.with_suffix(suffix);
            suffix += 1;
        }
        Ok(candidate)
    }
}
