//! Fallback sensors server
//!
//! Runs a minimal host with the fallback sensors integration: sensors from
//! `configuration.yaml` and from stored config entries are set up, then the
//! process runs until Ctrl-C.

use anyhow::{Context as _, Result};
use ha_config::load_yaml;
use ha_config_entries::{ConfigEntries, Storage};
use ha_event_bus::EventBus;
use ha_fallback_sensors::FallbackSensors;
use ha_state_machine::StateMachine;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const CONFIG_FILE: &str = "configuration.yaml";

/// The running host
pub struct HomeAssistant {
    pub config_dir: PathBuf,
    pub bus: Arc<EventBus>,
    pub states: Arc<StateMachine>,
    pub entries: Arc<ConfigEntries>,
    pub fallback: Arc<FallbackSensors>,
}

impl HomeAssistant {
    pub fn new(config_dir: PathBuf) -> Self {
        let bus = Arc::new(EventBus::new());
        let states = Arc::new(StateMachine::new(bus.clone()));
        let entries = Arc::new(ConfigEntries::new(Arc::new(Storage::new(&config_dir))));
        let fallback = Arc::new(FallbackSensors::new(bus.clone(), states.clone()));
        fallback.register(&entries);

        Self {
            config_dir,
            bus,
            states,
            entries,
            fallback,
        }
    }

    /// Set up YAML sensors and stored config entries
    pub async fn start(&self) -> Result<()> {
        let config_path = self.config_dir.join(CONFIG_FILE);
        if config_path.exists() {
            let config = load_yaml(&self.config_dir, CONFIG_FILE)
                .with_context(|| format!("Failed to load {}", config_path.display()))?;
            self.fallback.setup_yaml(&config);
        } else {
            warn!("No {} found in {}", CONFIG_FILE, self.config_dir.display());
        }

        self.entries
            .load()
            .await
            .context("Failed to load config entries")?;
        for (entry_id, result) in self.entries.setup_all().await {
            if let Err(e) = result {
                warn!("Config entry {} failed to set up: {}", entry_id, e);
            }
        }

        info!(
            "{} fallback sensors running, {} entities known, {} bus listeners",
            self.fallback.sensor_count(),
            self.states.entity_count(),
            self.bus.listener_count()
        );
        Ok(())
    }

    /// Unload every sensor
    pub async fn stop(&self) {
        self.entries.unload_all().await;
        self.fallback.unload_platform();
    }
}

/// Config directory from the first argument, `HASS_CONFIG`, or `./config`
fn config_dir() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("HASS_CONFIG").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_dir = config_dir();
    info!("Starting fallback sensors with config dir {}", config_dir.display());

    let hass = HomeAssistant::new(config_dir);
    hass.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    hass.stop().await;

    Ok(())
}
