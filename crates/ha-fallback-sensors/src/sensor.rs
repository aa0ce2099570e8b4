//! The fallback sensor entity
//!
//! A [`FallbackSensor`] owns its selector state. It never listens for
//! anything itself; whoever drives it (see [`crate::runtime`]) calls
//! [`FallbackSensor::handle_source_change`] when a source changed and
//! [`FallbackSensor::handle_timer`] when the pending switch is due.

use chrono::SecondsFormat;
use ha_core::{attrs, Context, EntityId, State, STATE_UNAVAILABLE};
use ha_state_machine::StateMachine;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::SensorSettings;
use crate::consts::{
    ATTR_CURRENT_SOURCE, ATTR_FALLBACK_COUNT, ATTR_LAST_FALLBACK_TIME, ATTR_SOURCE_ENTITIES,
    ATTR_SOURCE_INDEX, INHERITED_ATTRIBUTES,
};
use crate::selector::{is_eligible, select_source, Selector, Transition};

/// Virtual sensor exposing the value of the first valid source
pub struct FallbackSensor {
    entity_id: EntityId,
    settings: SensorSettings,
    states: Arc<StateMachine>,
    selector: Selector,
    /// Last value taken from a source, `None` once every source is gone
    value: Option<String>,
    /// Display attributes copied from the last source that fed `value`
    inherited: HashMap<String, Value>,
    /// Cleared on removal; held across every write
    registered: Arc<Mutex<bool>>,
}

impl FallbackSensor {
    pub fn new(entity_id: EntityId, settings: SensorSettings, states: Arc<StateMachine>) -> Self {
        let selector = Selector::new(settings.hysteresis_delay);
        Self {
            entity_id,
            settings,
            states,
            selector,
            value: None,
            inherited: HashMap::new(),
            registered: Arc::new(Mutex::new(true)),
        }
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn unique_id(&self) -> Option<&str> {
        self.settings.unique_id.as_deref()
    }

    pub fn source_entities(&self) -> &[EntityId] {
        &self.settings.entities
    }

    /// Re-evaluate after a source changed and write the new state
    pub fn handle_source_change(&mut self, now: Instant) -> State {
        self.update_from_sources(now);
        self.write_state()
    }

    /// Re-evaluate once the pending switch deadline passed and write the
    /// new state
    pub fn handle_timer(&mut self, now: Instant) -> State {
        debug!(entity_id = %self.entity_id, "Hysteresis timer fired");
        self.update_from_sources(now);
        self.write_state()
    }

    /// Flag shared with whoever removes the sensor, see [`remove_state`]
    pub fn registration(&self) -> Arc<Mutex<bool>> {
        Arc::clone(&self.registered)
    }

    /// When the pending switch is due, if there is one
    pub fn pending_deadline(&self) -> Option<Instant> {
        self.selector.deadline()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.selector.current_index()
    }

    pub fn fallback_count(&self) -> u64 {
        self.selector.fallback_count()
    }

    /// Current value as written to the state machine
    pub fn native_value(&self) -> &str {
        self.value.as_deref().unwrap_or(STATE_UNAVAILABLE)
    }

    fn update_from_sources(&mut self, now: Instant) {
        let sources: Vec<Option<State>> = self
            .settings
            .entities
            .iter()
            .map(|id| self.states.get(&id.to_string()))
            .collect();

        let candidate = select_source(&sources, &self.settings.conditions);

        match self.selector.evaluate(candidate, now) {
            Transition::Initial(index) => {
                debug!(
                    entity_id = %self.entity_id,
                    source = ?index.map(|i| self.settings.entities[i].to_string()),
                    "Initial source selected"
                );
            }
            Transition::Switched { from, to: Some(to) } => {
                info!(
                    "Fallback sensor '{}' switched from {} to '{}'",
                    self.settings.name,
                    from.map_or_else(
                        || "no source".to_string(),
                        |i| format!("'{}'", self.settings.entities[i])
                    ),
                    self.settings.entities[to]
                );
            }
            Transition::Switched { to: None, .. } => {
                warn!(
                    "No available source for fallback sensor '{}'",
                    self.settings.name
                );
            }
            Transition::Deferred {
                candidate,
                deadline,
            } => {
                debug!(
                    entity_id = %self.entity_id,
                    ?candidate,
                    wait = ?deadline.saturating_duration_since(now),
                    "Switch pending"
                );
            }
            Transition::Unchanged => {}
        }

        match self.selector.current_index() {
            Some(index) => {
                // While a switch is pending the retained source may itself
                // be invalid; keep the last value then
                if let Some(state) = &sources[index] {
                    if is_eligible(index, state, &self.settings.conditions) {
                        self.value = Some(state.state.clone());
                        self.copy_attributes_from(state);
                    }
                }
            }
            None => self.value = None,
        }
    }

    fn copy_attributes_from(&mut self, state: &State) {
        for key in INHERITED_ATTRIBUTES {
            match state.attributes.get(key) {
                Some(value) if !value.is_null() => {
                    self.inherited.insert(key.to_string(), value.clone());
                }
                _ => {
                    self.inherited.remove(key);
                }
            }
        }
    }

    /// Diagnostic attributes describing the selection
    pub fn extra_state_attributes(&self) -> HashMap<String, Value> {
        let index = self.selector.current_index();
        let current_source = index.map(|i| self.settings.entities[i].to_string());
        let last_fallback_time = self
            .selector
            .last_fallback_time()
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Micros, false));

        HashMap::from([
            (ATTR_CURRENT_SOURCE.to_string(), json!(current_source)),
            (
                ATTR_SOURCE_ENTITIES.to_string(),
                json!(self
                    .settings
                    .entities
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()),
            ),
            (ATTR_SOURCE_INDEX.to_string(), json!(index)),
            (
                ATTR_FALLBACK_COUNT.to_string(),
                json!(self.selector.fallback_count()),
            ),
            (ATTR_LAST_FALLBACK_TIME.to_string(), json!(last_fallback_time)),
        ])
    }

    /// Full attribute set written with the state
    pub fn state_attributes(&self) -> HashMap<String, Value> {
        let mut attributes = self.inherited.clone();
        attributes.insert(attrs::FRIENDLY_NAME.to_string(), json!(self.settings.name));
        attributes.extend(self.extra_state_attributes());
        attributes
    }

    /// Write the current state to the state machine
    ///
    /// Once the sensor was removed nothing is written and the computed state
    /// is only returned.
    pub fn write_state(&self) -> State {
        let registered = self
            .registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !*registered {
            trace!(entity_id = %self.entity_id, "Sensor removed, skipping write");
            return State::new(
                self.entity_id.clone(),
                self.native_value(),
                self.state_attributes(),
                Context::new(),
            );
        }

        self.states.set(
            self.entity_id.clone(),
            self.native_value(),
            self.state_attributes(),
            Context::new(),
        )
    }
}

/// Remove a sensor's state for good
///
/// Takes the sensor's write lock, so a write running concurrently on another
/// thread either lands before the removal or is skipped.
pub fn remove_state(
    states: &StateMachine,
    entity_id: &EntityId,
    registration: &Mutex<bool>,
) -> Option<State> {
    let mut registered = registration.lock().unwrap_or_else(PoisonError::into_inner);
    *registered = false;
    states.remove(entity_id, Context::new())
}
