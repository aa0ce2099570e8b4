//! Config Entries Manager
//!
//! Manages the lifecycle of configuration entries.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::entry::{ConfigEntry, ConfigEntryUpdate};
use crate::lifecycle::{ConfigEntryState, InvalidTransition};
use crate::storage::{Storage, StorageError, StorageFile, StorageResult};

/// Storage key for config entries
pub const STORAGE_KEY: &str = "core.config_entries";
/// Current storage version
pub const STORAGE_VERSION: u32 = 1;
/// Current minor version
pub const STORAGE_MINOR_VERSION: u32 = 1;

/// Config entries errors
#[derive(Debug, Error)]
pub enum ConfigEntriesError {
    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Entry already exists for domain {domain} with unique_id {unique_id}")]
    AlreadyExists { domain: String, unique_id: String },

    #[error("Cannot unload entry in state {0:?}")]
    CannotUnload(ConfigEntryState),

    #[error("Setup failed: {0}")]
    SetupFailed(String),

    #[error("Unload failed for entry {0}")]
    UnloadFailed(String),

    #[error(transparent)]
    InvalidState(#[from] InvalidTransition),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type ConfigEntriesResult<T> = Result<T, ConfigEntriesError>;

/// Config entries data for storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigEntriesData {
    pub entries: Vec<ConfigEntry>,
}

/// Sets up an integration instance for an entry
pub type SetupHandler = Arc<dyn Fn(&ConfigEntry) -> Result<(), String> + Send + Sync + 'static>;

/// Tears an entry's integration instance down; `false` means it refused
pub type UnloadHandler = Arc<dyn Fn(&ConfigEntry) -> bool + Send + Sync + 'static>;

/// Called after an entry's data or options changed
pub type UpdateListener = Arc<dyn Fn(&ConfigEntry) -> UpdateAction + Send + Sync + 'static>;

/// What the manager should do once an update listener ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateAction {
    None,
    /// Unload and set the entry up again from its new configuration
    Reload,
}

/// Config Entries Manager
///
/// Owns every entry, persists them to `.storage/core.config_entries` and
/// drives setup/unload through the handlers integrations register per
/// domain.
pub struct ConfigEntries {
    storage: Arc<Storage>,

    /// Primary index: entry_id -> ConfigEntry
    entries: DashMap<String, ConfigEntry>,

    /// Index: domain -> set of entry_ids
    by_domain: DashMap<String, HashSet<String>>,

    /// Index: (domain, unique_id) -> entry_id
    by_unique_id: DashMap<(String, String), String>,

    /// Serializes setup and unload
    setup_lock: Mutex<()>,

    setup_handlers: DashMap<String, SetupHandler>,
    unload_handlers: DashMap<String, UnloadHandler>,
    update_listeners: DashMap<String, UpdateListener>,
}

impl ConfigEntries {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            entries: DashMap::new(),
            by_domain: DashMap::new(),
            by_unique_id: DashMap::new(),
            setup_lock: Mutex::new(()),
            setup_handlers: DashMap::new(),
            unload_handlers: DashMap::new(),
            update_listeners: DashMap::new(),
        }
    }

    /// Load entries from storage
    pub async fn load(&self) -> StorageResult<()> {
        if let Some(storage_file) = self.storage.load::<ConfigEntriesData>(STORAGE_KEY).await? {
            info!(
                "Loading {} config entries from storage (v{}.{})",
                storage_file.data.entries.len(),
                storage_file.version,
                storage_file.minor_version
            );

            for entry in storage_file.data.entries {
                self.index_entry(&entry);
            }
        }
        Ok(())
    }

    /// Save entries to storage
    pub async fn save(&self) -> StorageResult<()> {
        let data = ConfigEntriesData {
            entries: self.entries.iter().map(|r| r.value().clone()).collect(),
        };

        let storage_file =
            StorageFile::new(STORAGE_KEY, data, STORAGE_VERSION, STORAGE_MINOR_VERSION);

        self.storage.save(&storage_file).await?;
        debug!("Saved {} config entries to storage", self.entries.len());
        Ok(())
    }

    fn index_entry(&self, entry: &ConfigEntry) {
        let entry_id = entry.entry_id.clone();

        self.entries.insert(entry_id.clone(), entry.clone());

        self.by_domain
            .entry(entry.domain.clone())
            .or_default()
            .insert(entry_id.clone());

        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id
                .insert((entry.domain.clone(), unique_id.clone()), entry_id);
        }
    }

    fn unindex_entry(&self, entry: &ConfigEntry) {
        if let Some(mut ids) = self.by_domain.get_mut(&entry.domain) {
            ids.remove(&entry.entry_id);
        }

        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id
                .remove(&(entry.domain.clone(), unique_id.clone()));
        }

        self.entries.remove(&entry.entry_id);
    }

    /// Get an entry by ID
    pub fn get(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries.get(entry_id).map(|r| r.value().clone())
    }

    /// Get all entries for a domain
    pub fn get_by_domain(&self, domain: &str) -> Vec<ConfigEntry> {
        self.by_domain
            .get(domain)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    /// Get loaded entries for a domain
    pub fn get_loaded_by_domain(&self, domain: &str) -> Vec<ConfigEntry> {
        self.get_by_domain(domain)
            .into_iter()
            .filter(|e| e.is_loaded())
            .collect()
    }

    /// Get entry by unique_id
    pub fn get_by_unique_id(&self, domain: &str, unique_id: &str) -> Option<ConfigEntry> {
        self.by_unique_id
            .get(&(domain.to_string(), unique_id.to_string()))
            .and_then(|entry_id| self.get(&entry_id))
    }

    /// Add a new config entry
    pub async fn add(&self, entry: ConfigEntry) -> ConfigEntriesResult<ConfigEntry> {
        if let Some(ref unique_id) = entry.unique_id {
            if self.get_by_unique_id(&entry.domain, unique_id).is_some() {
                return Err(ConfigEntriesError::AlreadyExists {
                    domain: entry.domain.clone(),
                    unique_id: unique_id.clone(),
                });
            }
        }

        self.index_entry(&entry);
        self.save().await?;

        info!(
            "Added config entry: {} ({}) [{}]",
            entry.title, entry.domain, entry.entry_id
        );

        Ok(entry)
    }

    /// Update an existing entry
    ///
    /// When data or options change, the domain's update listener runs and
    /// may ask for the entry to be reloaded.
    pub async fn update(
        &self,
        entry_id: &str,
        update: ConfigEntryUpdate,
    ) -> ConfigEntriesResult<ConfigEntry> {
        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        let changes_config = update.changes_config();

        self.unindex_entry(&entry);

        let mut updated = entry;
        if let Some(title) = update.title {
            updated.title = title;
        }
        if let Some(data) = update.data {
            updated.data = data;
        }
        if let Some(options) = update.options {
            updated.options = options;
        }
        updated.modified_at = Utc::now();

        self.index_entry(&updated);
        self.save().await?;

        debug!("Updated config entry: {}", entry_id);

        if changes_config {
            let listener = self
                .update_listeners
                .get(&updated.domain)
                .map(|l| l.value().clone());

            if let Some(listener) = listener {
                if listener(&updated) == UpdateAction::Reload && updated.is_loaded() {
                    info!("Reloading entry {} after update", entry_id);
                    self.reload(entry_id).await?;
                }
            }
        }

        Ok(self.get(entry_id).unwrap_or(updated))
    }

    /// Remove an entry, unloading it first if needed
    pub async fn remove(&self, entry_id: &str) -> ConfigEntriesResult<ConfigEntry> {
        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        if matches!(
            entry.state,
            ConfigEntryState::Loaded | ConfigEntryState::SetupError
        ) {
            self.unload(entry_id).await?;
        }

        self.unindex_entry(&entry);
        self.save().await?;

        info!(
            "Removed config entry: {} ({}) [{}]",
            entry.title, entry.domain, entry_id
        );

        Ok(entry)
    }

    fn set_state(
        &self,
        entry_id: &str,
        state: ConfigEntryState,
        reason: Option<String>,
    ) -> ConfigEntriesResult<()> {
        let mut entry = self
            .entries
            .get_mut(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        entry.try_set_state(state, reason)?;
        debug!("Entry {} state changed to {:?}", entry_id, state);
        Ok(())
    }

    /// Register a setup handler for a domain
    pub fn register_setup_handler(&self, domain: &str, handler: SetupHandler) {
        self.setup_handlers.insert(domain.to_string(), handler);
        debug!("Registered setup handler for domain: {}", domain);
    }

    /// Register an unload handler for a domain
    pub fn register_unload_handler(&self, domain: &str, handler: UnloadHandler) {
        self.unload_handlers.insert(domain.to_string(), handler);
        debug!("Registered unload handler for domain: {}", domain);
    }

    /// Register the update listener for a domain, replacing any previous one
    pub fn register_update_listener(&self, domain: &str, listener: UpdateListener) {
        self.update_listeners.insert(domain.to_string(), listener);
        debug!("Registered update listener for domain: {}", domain);
    }

    /// Setup an entry (call integration's setup)
    pub async fn setup(&self, entry_id: &str) -> ConfigEntriesResult<()> {
        let _lock = self.setup_lock.lock().await;

        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        if entry.is_disabled() {
            debug!("Skipping setup for disabled entry: {}", entry_id);
            return Ok(());
        }

        self.set_state(entry_id, ConfigEntryState::SetupInProgress, None)?;

        let handler = self
            .setup_handlers
            .get(&entry.domain)
            .map(|h| h.value().clone());

        match handler {
            Some(handler) => match handler(&entry) {
                Ok(()) => {
                    self.set_state(entry_id, ConfigEntryState::Loaded, None)?;
                    info!("Setup completed for entry: {} ({})", entry.title, entry_id);
                }
                Err(reason) => {
                    warn!("Setup failed for entry {}: {}", entry_id, reason);
                    self.set_state(entry_id, ConfigEntryState::SetupError, Some(reason.clone()))?;
                    return Err(ConfigEntriesError::SetupFailed(reason));
                }
            },
            None => {
                self.set_state(entry_id, ConfigEntryState::Loaded, None)?;
                debug!(
                    "No setup handler for domain {}, marking as loaded",
                    entry.domain
                );
            }
        }

        Ok(())
    }

    /// Unload an entry
    ///
    /// Unloading an entry that was never set up is a no-op.
    pub async fn unload(&self, entry_id: &str) -> ConfigEntriesResult<()> {
        let _lock = self.setup_lock.lock().await;

        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        if !entry.state.is_recoverable() {
            return Err(ConfigEntriesError::CannotUnload(entry.state));
        }
        if entry.state == ConfigEntryState::NotLoaded {
            return Ok(());
        }

        let was_loaded = entry.is_loaded();
        self.set_state(entry_id, ConfigEntryState::UnloadInProgress, None)?;

        let handler = self
            .unload_handlers
            .get(&entry.domain)
            .map(|h| h.value().clone());

        // An entry stuck in SetupError has nothing running to tear down
        let unloaded = match handler {
            Some(handler) if was_loaded => handler(&entry),
            _ => true,
        };

        if !unloaded {
            warn!("Integration refused to unload entry {}", entry_id);
            self.set_state(
                entry_id,
                ConfigEntryState::FailedUnload,
                Some("unload handler returned false".to_string()),
            )?;
            return Err(ConfigEntriesError::UnloadFailed(entry_id.to_string()));
        }

        self.set_state(entry_id, ConfigEntryState::NotLoaded, None)?;
        info!("Unloaded entry: {} ({})", entry.title, entry_id);
        Ok(())
    }

    /// Reload an entry (unload + setup)
    pub async fn reload(&self, entry_id: &str) -> ConfigEntriesResult<()> {
        self.unload(entry_id).await?;
        self.setup(entry_id).await
    }

    /// Get all entry IDs
    pub fn entry_ids(&self) -> Vec<String> {
        self.entries.iter().map(|r| r.key().clone()).collect()
    }

    /// Get count of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Setup all entries, returning each entry's outcome
    pub async fn setup_all(&self) -> Vec<(String, ConfigEntriesResult<()>)> {
        let mut results = Vec::new();

        for entry_id in self.entry_ids() {
            let result = self.setup(&entry_id).await;
            results.push((entry_id, result));
        }

        results
    }

    /// Unload every loaded entry
    pub async fn unload_all(&self) {
        for entry_id in self.entry_ids() {
            let loaded = self.get(&entry_id).is_some_and(|e| e.is_loaded());
            if loaded {
                if let Err(e) = self.unload(&entry_id).await {
                    warn!("Failed to unload entry {}: {}", entry_id, e);
                }
            }
        }
    }
}
