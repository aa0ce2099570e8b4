//! Config Entries
//!
//! Config entries represent UI-created integration instances and manage
//! their lifecycle (setup, unload, reload).
//!
//! # Key Types
//!
//! - [`ConfigEntry`] - A single integration configuration
//! - [`ConfigEntryState`] - Lifecycle state of an entry
//! - [`ConfigEntries`] - Manager for all config entries
//! - [`FlowResult`] - Outcome of a config or options flow step
//!
//! # Storage
//!
//! Config entries are persisted in `.storage/core.config_entries` with
//! version tracking for migrations.

pub mod entry;
pub mod flow;
pub mod lifecycle;
pub mod manager;
pub mod storage;

pub use entry::{ConfigEntry, ConfigEntryDisabledBy, ConfigEntrySource, ConfigEntryUpdate};
pub use flow::{FlowResult, FormField, BASE_ERROR};
pub use lifecycle::{ConfigEntryState, InvalidTransition};
pub use manager::{
    ConfigEntries, ConfigEntriesData, ConfigEntriesError, ConfigEntriesResult, SetupHandler,
    UnloadHandler, UpdateAction, UpdateListener, STORAGE_KEY, STORAGE_MINOR_VERSION,
    STORAGE_VERSION,
};
pub use storage::{Storage, StorageError, StorageFile, StorageResult};
