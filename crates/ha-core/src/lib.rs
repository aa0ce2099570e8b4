//! Core types for the fallback sensors host
//!
//! This crate provides the fundamental types the host and its integrations
//! exchange: EntityId, State, Event and Context, plus the well-known state
//! values and attribute keys that sensors copy between each other.

mod context;
mod entity_id;
mod event;
mod state;

pub use context::Context;
pub use entity_id::{slugify, EntityId, EntityIdError};
pub use event::{Event, EventData, EventOrigin, EventType};
pub use state::State;

/// State value of an entity that currently cannot be reached
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// State value of an entity whose value is not known yet
pub const STATE_UNKNOWN: &str = "unknown";

/// Well-known state attribute keys
pub mod attrs {
    pub const FRIENDLY_NAME: &str = "friendly_name";
    pub const UNIT_OF_MEASUREMENT: &str = "unit_of_measurement";
    pub const DEVICE_CLASS: &str = "device_class";
    pub const STATE_CLASS: &str = "state_class";
    pub const ICON: &str = "icon";
}

/// Standard event types
pub mod events {
    use super::*;

    /// Event type for state changes
    pub const STATE_CHANGED: &str = "state_changed";

    /// Data for STATE_CHANGED events
    ///
    /// `new_state` is `None` when the entity was removed, `old_state` is
    /// `None` when it was added.
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct StateChangedData {
        pub entity_id: EntityId,
        pub old_state: Option<State>,
        pub new_state: Option<State>,
    }

    impl EventData for StateChangedData {
        fn event_type() -> &'static str {
            STATE_CHANGED
        }
    }
}
