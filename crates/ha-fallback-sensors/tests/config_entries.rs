//! Fallback sensors created, reconfigured and removed through config entries

mod common;

use common::TestHomeAssistant;
use ha_config_entries::{ConfigEntriesError, ConfigEntry, ConfigEntryState, FlowResult};
use ha_fallback_sensors::config_flow::{apply_options, create_entry, step_init, step_user};
use ha_fallback_sensors::DOMAIN;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::time::Duration;

fn input(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        _ => panic!("flow input must be an object"),
    }
}

async fn create_power_entry(hass: &TestHomeAssistant) -> ConfigEntry {
    let result = step_user(
        &hass.entries,
        input(json!({
            "name": "Power",
            "entities": ["sensor.grid", "sensor.inverter"]
        })),
    );
    create_entry(&hass.entries, result).await.unwrap().unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_flow_creates_loaded_sensor() {
    let hass = TestHomeAssistant::new();
    hass.set_state("sensor.grid", "unavailable");
    hass.set_state("sensor.inverter", "1500");

    let entry = create_power_entry(&hass).await;

    assert_eq!(entry.title, "Power");
    assert_eq!(entry.state, ConfigEntryState::Loaded);
    assert_eq!(
        hass.fallback.entry_entity_id(&entry.entry_id).unwrap().to_string(),
        "sensor.power"
    );
    hass.assert_state("sensor.power", "1500");
    assert_eq!(
        hass.attribute("sensor.power", "source_entities"),
        json!(["sensor.grid", "sensor.inverter"])
    );

    hass.set_state("sensor.grid", "900");
    hass.settle().await;
    hass.assert_state("sensor.power", "900");
}

#[tokio::test(start_paused = true)]
async fn test_entry_unique_id_defaults_to_entry_id() {
    let hass = TestHomeAssistant::new();
    let entry = create_power_entry(&hass).await;

    // A YAML sensor reusing the entry id as unique_id collides with it
    let result = hass.fallback.setup_platform(common::yaml(&format!(
        "name: Other\nunique_id: '{}'\nentities: [sensor.a, sensor.b]\n",
        entry.entry_id
    )));
    assert!(result.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_flow_aborts_on_configured_unique_id() {
    let hass = TestHomeAssistant::new();
    let data = json!({
        "name": "Power",
        "entities": ["sensor.grid", "sensor.inverter"],
        "unique_id": "power"
    });

    let first = step_user(&hass.entries, input(data.clone()));
    create_entry(&hass.entries, first).await.unwrap().unwrap();

    let second = step_user(&hass.entries, input(data));
    assert_eq!(
        second,
        FlowResult::Abort {
            reason: "already_configured".to_string()
        }
    );
    assert!(create_entry(&hass.entries, second).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_options_update_reloads_sensor() {
    let hass = TestHomeAssistant::new();
    hass.set_state("sensor.grid", "100");
    hass.set_state("sensor.inverter", "200");
    hass.set_state("sensor.battery", "300");

    let entry = create_power_entry(&hass).await;
    hass.assert_state("sensor.power", "100");

    let options = step_init(
        &entry,
        input(json!({
            "name": "Power",
            "entities": ["sensor.battery", "sensor.grid"],
            "hysteresis_delay": 5
        })),
    );
    let updated = apply_options(&hass.entries, &entry.entry_id, options)
        .await
        .unwrap()
        .unwrap();

    assert!(updated.is_loaded());
    hass.assert_state("sensor.power", "300");
    assert_eq!(
        hass.attribute("sensor.power", "source_entities"),
        json!(["sensor.battery", "sensor.grid"])
    );
    // The reloaded sensor starts counting from zero
    assert_eq!(hass.attribute("sensor.power", "fallback_count"), json!(0));

    // The new hysteresis delay is in effect
    hass.set_state("sensor.battery", "unavailable");
    hass.settle().await;
    hass.assert_state("sensor.power", "300");
    hass.advance(Duration::from_secs(6)).await;
    hass.assert_state("sensor.power", "100");
}

#[tokio::test(start_paused = true)]
async fn test_remove_entry_removes_sensor() {
    let hass = TestHomeAssistant::new();
    hass.set_state("sensor.grid", "100");

    let entry = create_power_entry(&hass).await;
    hass.assert_state("sensor.power", "100");

    hass.entries.remove(&entry.entry_id).await.unwrap();

    assert!(hass.get_state("sensor.power").is_none());
    assert!(hass.fallback.entry_entity_id(&entry.entry_id).is_none());
    assert_eq!(hass.fallback.sensor_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_stored_entry_fails_setup() {
    let hass = TestHomeAssistant::new();

    let entry = ConfigEntry::new(DOMAIN, "Broken").with_data(HashMap::from([
        ("name".to_string(), json!("Broken")),
        ("entities".to_string(), json!(["sensor.only"])),
    ]));
    let entry = hass.entries.add(entry).await.unwrap();

    let result = hass.entries.setup(&entry.entry_id).await;
    assert!(matches!(result, Err(ConfigEntriesError::SetupFailed(_))));

    let stored = hass.entries.get(&entry.entry_id).unwrap();
    assert_eq!(stored.state, ConfigEntryState::SetupError);
    assert!(stored.reason.unwrap().contains("At least 2"));
    assert!(hass.get_state("sensor.broken").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_entries_survive_restart() {
    let hass = TestHomeAssistant::new();
    hass.set_state("sensor.grid", "100");
    let entry = create_power_entry(&hass).await;

    hass.entries.unload_all().await;
    assert!(hass.get_state("sensor.power").is_none());

    let restarted = ha_config_entries::ConfigEntries::new(std::sync::Arc::new(
        ha_config_entries::Storage::new(hass.config_dir()),
    ));
    hass.fallback.register(&restarted);
    restarted.load().await.unwrap();

    let results = restarted.setup_all().await;
    assert_eq!(results.len(), 1);
    assert!(results[0].1.is_ok());
    assert!(restarted.get(&entry.entry_id).unwrap().is_loaded());
    hass.assert_state("sensor.power", "100");
}
