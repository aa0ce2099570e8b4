//! Test Home Assistant instance
//!
//! Provides an isolated host (event bus, state machine, config entries) with
//! the fallback sensors integration registered.

#![allow(dead_code)]

use ha_config_entries::{ConfigEntries, Storage};
use ha_core::{Context, EntityId, State};
use ha_event_bus::EventBus;
use ha_fallback_sensors::FallbackSensors;
use ha_state_machine::StateMachine;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub struct TestHomeAssistant {
    pub bus: Arc<EventBus>,
    pub states: Arc<StateMachine>,
    pub entries: Arc<ConfigEntries>,
    pub fallback: Arc<FallbackSensors>,
    config_dir: TempDir,
}

impl TestHomeAssistant {
    pub fn new() -> Self {
        Self::with_bus(EventBus::new())
    }

    /// Host whose subscribers lag after `capacity` unread events
    pub fn with_bus_capacity(capacity: usize) -> Self {
        Self::with_bus(EventBus::with_capacity(capacity))
    }

    fn with_bus(bus: EventBus) -> Self {
        let config_dir = TempDir::new().expect("Failed to create temp dir");
        let bus = Arc::new(bus);
        let states = Arc::new(StateMachine::new(bus.clone()));
        let entries = Arc::new(ConfigEntries::new(Arc::new(Storage::new(config_dir.path()))));
        let fallback = Arc::new(FallbackSensors::new(bus.clone(), states.clone()));
        fallback.register(&entries);

        Self {
            bus,
            states,
            entries,
            fallback,
            config_dir,
        }
    }

    pub fn config_dir(&self) -> &std::path::Path {
        self.config_dir.path()
    }

    /// Set the state of an entity
    pub fn set_state(&self, entity_id: &str, state: &str) -> State {
        self.set_state_with(entity_id, state, HashMap::new())
    }

    pub fn set_state_with(
        &self,
        entity_id: &str,
        state: &str,
        attributes: HashMap<String, Value>,
    ) -> State {
        let entity_id: EntityId = entity_id.parse().expect("Invalid entity_id");
        self.states.set(entity_id, state, attributes, Context::new())
    }

    pub fn get_state(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id)
    }

    /// Get an attribute of an entity, `Value::Null` if absent
    pub fn attribute(&self, entity_id: &str, key: &str) -> Value {
        self.states
            .get(entity_id)
            .and_then(|s| s.attributes.get(key).cloned())
            .unwrap_or(Value::Null)
    }

    /// Assert that an entity is in a specific state
    pub fn assert_state(&self, entity_id: &str, expected: &str) {
        let state = self.states.get(entity_id).map(|s| s.state);
        assert_eq!(
            state.as_deref(),
            Some(expected),
            "Expected entity {} to be in state '{}', but was {:?}",
            entity_id,
            expected,
            state
        );
    }

    /// Let sensor tasks process everything fired so far
    ///
    /// Tests run with a paused clock, so this only moves time forward by a
    /// millisecond once every runnable task went idle.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    /// Advance the paused clock, running any timers that come due
    pub async fn advance(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

impl Default for TestHomeAssistant {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse an inline YAML platform config
pub fn yaml(s: &str) -> serde_yaml::Value {
    serde_yaml::from_str(s).expect("Invalid YAML")
}
