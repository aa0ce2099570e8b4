//! Event bus with typed pub/sub
//!
//! The EventBus is the message broker of the host. The state machine fires
//! `state_changed` events on it and integrations subscribe, either to a
//! whole event type or, through [`EventBus::track_state_change`], to state
//! changes of a fixed set of entities.

use dashmap::DashMap;
use ha_core::events::StateChangedData;
use ha_core::{Context, EntityId, Event, EventData, EventType};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

pub use tokio::sync::broadcast::error::RecvError;

/// Default channel capacity for event subscriptions
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// The event bus for publishing and subscribing to events
pub struct EventBus {
    /// Map of event types to their broadcast senders
    listeners: DashMap<EventType, broadcast::Sender<Event<serde_json::Value>>>,
    /// Special sender for MATCH_ALL subscribers
    match_all_sender: broadcast::Sender<Event<serde_json::Value>>,
    capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with specified channel capacity
    ///
    /// A subscriber that falls more than `capacity` events behind receives
    /// [`RecvError::Lagged`].
    pub fn with_capacity(capacity: usize) -> Self {
        let (match_all_sender, _) = broadcast::channel(capacity);
        Self {
            listeners: DashMap::new(),
            match_all_sender,
            capacity,
        }
    }

    /// Subscribe to events of a specific type (`*` for all events)
    pub fn subscribe(
        &self,
        event_type: impl Into<EventType>,
    ) -> broadcast::Receiver<Event<serde_json::Value>> {
        let event_type = event_type.into();
        trace!(event_type = %event_type, "Subscribing to event type");

        if event_type.is_match_all() {
            return self.match_all_sender.subscribe();
        }

        self.listeners
            .entry(event_type)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Subscribe to events carrying typed data
    pub fn subscribe_typed<T: EventData + serde::de::DeserializeOwned>(
        &self,
    ) -> TypedEventReceiver<T> {
        TypedEventReceiver::new(self.subscribe(T::event_type()))
    }

    /// Subscribe to state changes of the given entities only
    ///
    /// The subscription is live as soon as this returns; changes fired
    /// afterwards are never missed (unless the receiver lags).
    pub fn track_state_change(
        &self,
        entity_ids: impl IntoIterator<Item = EntityId>,
    ) -> StateChangeTracker {
        let entity_ids: HashSet<EntityId> = entity_ids.into_iter().collect();
        debug!(count = entity_ids.len(), "Tracking state changes");
        StateChangeTracker {
            rx: self.subscribe_typed(),
            entity_ids,
        }
    }

    /// Fire an event to subscribers of its type and to MATCH_ALL subscribers
    pub fn fire(&self, event: Event<serde_json::Value>) {
        trace!(event_type = %event.event_type, "Firing event");

        if let Some(sender) = self.listeners.get(&event.event_type) {
            // A send error only means there are no live receivers
            let _ = sender.send(event.clone());
        }

        let _ = self.match_all_sender.send(event);
    }

    /// Fire a typed event
    pub fn fire_typed<T: EventData + serde::Serialize>(&self, data: T, context: Context) {
        let json_data = serde_json::to_value(&data).unwrap_or_default();
        self.fire(Event::new(T::event_type(), json_data, context));
    }

    /// Number of event types with at least one subscription ever made
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A receiver for typed events
pub struct TypedEventReceiver<T> {
    rx: broadcast::Receiver<Event<serde_json::Value>>,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: EventData + serde::de::DeserializeOwned> TypedEventReceiver<T> {
    fn new(rx: broadcast::Receiver<Event<serde_json::Value>>) -> Self {
        Self {
            rx,
            _phantom: std::marker::PhantomData,
        }
    }

    /// Receive the next event whose data deserializes into `T`
    pub async fn recv(&mut self) -> Result<Event<T>, RecvError> {
        loop {
            let event = self.rx.recv().await?;
            match serde_json::from_value::<T>(event.data.clone()) {
                Ok(data) => return Ok(event.map_data(data)),
                Err(e) => trace!(error = %e, "Skipping event with unexpected payload"),
            }
        }
    }
}

/// Filtered `state_changed` subscription for a fixed set of entities
pub struct StateChangeTracker {
    rx: TypedEventReceiver<StateChangedData>,
    entity_ids: HashSet<EntityId>,
}

impl StateChangeTracker {
    /// Receive the next state change of a tracked entity
    pub async fn recv(&mut self) -> Result<Event<StateChangedData>, RecvError> {
        loop {
            let event = self.rx.recv().await?;
            if self.entity_ids.contains(&event.data.entity_id) {
                return Ok(event);
            }
        }
    }

    /// Check whether an entity is tracked
    pub fn is_tracking(&self, entity_id: &EntityId) -> bool {
        self.entity_ids.contains(entity_id)
    }
}

/// Thread-safe wrapper for EventBus
pub type SharedEventBus = Arc<EventBus>;
