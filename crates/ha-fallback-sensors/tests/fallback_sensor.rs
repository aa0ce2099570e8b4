//! Fallback sensor behaviour against a live host

mod common;

use common::{yaml, TestHomeAssistant};
use ha_core::{Context, EntityId};
use ha_fallback_sensors::FallbackConfigError;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const SENSOR: &str = "sensor.outdoor_temperature";

#[tokio::test(start_paused = true)]
async fn test_follows_first_available_source() {
    let hass = TestHomeAssistant::new();
    hass.set_state("sensor.a", "unavailable");
    hass.set_state("sensor.b", "21.5");
    hass.set_state("sensor.c", "22");

    let entity_id = hass
        .fallback
        .setup_platform(yaml(
            "name: Outdoor Temperature\nentities: [sensor.a, sensor.b, sensor.c]\n",
        ))
        .unwrap();
    assert_eq!(entity_id.to_string(), SENSOR);
    hass.assert_state(SENSOR, "21.5");
    assert_eq!(hass.attribute(SENSOR, "source_index"), json!(1));

    hass.set_state("sensor.a", "19");
    hass.settle().await;
    hass.assert_state(SENSOR, "19");
    assert_eq!(hass.attribute(SENSOR, "current_source"), json!("sensor.a"));
    assert_eq!(hass.attribute(SENSOR, "fallback_count"), json!(1));

    // Updates of lower-priority sources don't change anything
    hass.set_state("sensor.c", "30");
    hass.settle().await;
    hass.assert_state(SENSOR, "19");
    assert_eq!(hass.attribute(SENSOR, "fallback_count"), json!(1));
}

#[tokio::test(start_paused = true)]
async fn test_range_condition_picks_second_source() {
    let hass = TestHomeAssistant::new();
    hass.set_state("sensor.a", "unavailable");
    hass.set_state("sensor.b", "21.5");
    hass.set_state("sensor.c", "10");

    hass.fallback
        .setup_platform(yaml(
            r#"
name: Outdoor Temperature
entities: [sensor.a, sensor.b, sensor.c]
conditions:
  - type: range
    min: 15
    max: 30
"#,
        ))
        .unwrap();

    hass.assert_state(SENSOR, "21.5");

    // B leaves the range, C is below it too
    hass.set_state("sensor.b", "45");
    hass.settle().await;
    hass.assert_state(SENSOR, "unavailable");

    hass.set_state("sensor.c", "16");
    hass.settle().await;
    hass.assert_state(SENSOR, "16");
    assert_eq!(hass.attribute(SENSOR, "source_index"), json!(2));
}

#[tokio::test(start_paused = true)]
async fn test_hysteresis_ignores_short_flips() {
    let hass = TestHomeAssistant::new();
    hass.set_state("sensor.a", "10");
    hass.set_state("sensor.b", "20");

    hass.fallback
        .setup_platform(yaml(
            "name: Outdoor Temperature\nentities: [sensor.a, sensor.b]\nhysteresis_delay: 5\n",
        ))
        .unwrap();

    // A -> B -> A within 3 seconds
    hass.set_state("sensor.a", "unavailable");
    hass.settle().await;
    hass.assert_state(SENSOR, "10");

    hass.advance(Duration::from_secs(3)).await;
    hass.set_state("sensor.a", "11");
    hass.settle().await;
    hass.assert_state(SENSOR, "11");

    // The cancelled deadline never fires
    hass.advance(Duration::from_secs(10)).await;
    hass.assert_state(SENSOR, "11");
    assert_eq!(hass.attribute(SENSOR, "current_source"), json!("sensor.a"));
    assert_eq!(hass.attribute(SENSOR, "fallback_count"), json!(0));
}

#[tokio::test(start_paused = true)]
async fn test_hysteresis_switches_after_delay() {
    let hass = TestHomeAssistant::new();
    hass.set_state("sensor.a", "10");
    hass.set_state("sensor.b", "20");

    hass.fallback
        .setup_platform(yaml(
            "name: Outdoor Temperature\nentities: [sensor.a, sensor.b]\nhysteresis_delay: 5\n",
        ))
        .unwrap();

    hass.set_state("sensor.a", "unavailable");
    hass.settle().await;

    hass.advance(Duration::from_secs(4)).await;
    hass.assert_state(SENSOR, "10");

    hass.advance(Duration::from_secs(2)).await;
    hass.assert_state(SENSOR, "20");
    assert_eq!(hass.attribute(SENSOR, "current_source"), json!("sensor.b"));
    assert_eq!(hass.attribute(SENSOR, "fallback_count"), json!(1));
    assert!(hass.attribute(SENSOR, "last_fallback_time").is_string());
}

#[tokio::test(start_paused = true)]
async fn test_all_sources_unavailable() {
    let hass = TestHomeAssistant::new();
    hass.set_state_with(
        "sensor.a",
        "5",
        HashMap::from([
            ("unit_of_measurement".to_string(), json!("kW")),
            ("device_class".to_string(), json!("power")),
        ]),
    );
    hass.set_state("sensor.b", "4");

    hass.fallback
        .setup_platform(yaml("name: Grid Power\nentities: [sensor.a, sensor.b]\n"))
        .unwrap();

    hass.set_state("sensor.b", "unavailable");
    hass.set_state("sensor.a", "unknown");
    hass.settle().await;

    let sensor = "sensor.grid_power";
    hass.assert_state(sensor, "unavailable");
    assert_eq!(hass.attribute(sensor, "current_source"), json!(null));
    assert_eq!(hass.attribute(sensor, "source_index"), json!(null));
    assert_eq!(hass.attribute(sensor, "unit_of_measurement"), json!("kW"));
    assert_eq!(hass.attribute(sensor, "device_class"), json!("power"));
    assert_eq!(hass.attribute(sensor, "friendly_name"), json!("Grid Power"));
    assert_eq!(hass.attribute(sensor, "fallback_count"), json!(1));
}

#[tokio::test(start_paused = true)]
async fn test_recovers_after_lagging() {
    let hass = TestHomeAssistant::with_bus_capacity(4);
    hass.set_state("sensor.a", "0");
    hass.set_state("sensor.b", "100");

    hass.fallback
        .setup_platform(yaml("name: Counter\nentities: [sensor.a, sensor.b]\n"))
        .unwrap();

    for i in 1..=20 {
        hass.set_state("sensor.a", &i.to_string());
    }
    hass.settle().await;

    hass.assert_state("sensor.counter", "20");
}

#[tokio::test(start_paused = true)]
async fn test_entity_id_collisions_get_suffix() {
    let hass = TestHomeAssistant::new();

    let first = hass
        .fallback
        .setup_platform(yaml("name: Power\nentities: [sensor.a, sensor.b]\n"))
        .unwrap();
    let second = hass
        .fallback
        .setup_platform(yaml("name: Power\nentities: [sensor.c, sensor.d]\n"))
        .unwrap();
    let unnamed = hass
        .fallback
        .setup_platform(yaml("name: '!!!'\nentities: [sensor.c, sensor.d]\n"))
        .unwrap();

    assert_eq!(first.to_string(), "sensor.power");
    assert_eq!(second.to_string(), "sensor.power_2");
    assert_eq!(unnamed.to_string(), "sensor.fallback_sensor");
    assert_eq!(hass.fallback.sensor_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_configs_create_nothing() {
    let hass = TestHomeAssistant::new();

    let too_few = hass
        .fallback
        .setup_platform(yaml("name: X\nentities: [sensor.a]\n"));
    assert!(matches!(
        too_few,
        Err(FallbackConfigError::TooFewEntities { count: 1 })
    ));

    let bad_regex = hass.fallback.setup_platform(yaml(
        "name: X\nentities: [sensor.a, sensor.b]\nconditions:\n  - type: regex\n    pattern: '[unclosed'\n",
    ));
    assert!(matches!(
        bad_regex,
        Err(FallbackConfigError::InvalidRegex { .. })
    ));

    let unknown_type = hass.fallback.setup_platform(yaml(
        "name: X\nentities: [sensor.a, sensor.b]\nconditions:\n  - type: threshold\n",
    ));
    assert!(matches!(unknown_type, Err(FallbackConfigError::Yaml(_))));

    assert_eq!(hass.fallback.sensor_count(), 0);
    assert!(hass.get_state("sensor.x").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_unique_id_rejected() {
    let hass = TestHomeAssistant::new();

    hass.fallback
        .setup_platform(yaml(
            "name: One\nunique_id: shared\nentities: [sensor.a, sensor.b]\n",
        ))
        .unwrap();
    let second = hass.fallback.setup_platform(yaml(
        "name: Two\nunique_id: shared\nentities: [sensor.a, sensor.b]\n",
    ));

    assert!(matches!(
        second,
        Err(FallbackConfigError::DuplicateUniqueId(id)) if id == "shared"
    ));
    assert!(hass.get_state("sensor.two").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_setup_yaml_and_unload_platform() {
    let hass = TestHomeAssistant::new();
    hass.set_state("sensor.a", "1");

    let config = ha_config::load_yaml_string(
        hass.config_dir(),
        r#"
sensor:
  - platform: fallback_sensors
    name: First
    entities: [sensor.a, sensor.b]
  - platform: template
    name: Not Ours
  - platform: fallback_sensors
    name: Broken
    entities: sensor.a
sensor extra:
  platform: fallback_sensors
  name: Second
  entities: [sensor.b, sensor.a]
"#,
        "configuration.yaml",
    )
    .unwrap();

    assert_eq!(hass.fallback.setup_yaml(&config), 2);
    hass.assert_state("sensor.first", "1");
    hass.assert_state("sensor.second", "1");
    assert!(hass.get_state("sensor.broken").is_none());

    hass.fallback.unload_platform();
    assert!(hass.get_state("sensor.first").is_none());
    assert!(hass.get_state("sensor.second").is_none());
    assert_eq!(hass.fallback.sensor_count(), 0);

    // Stopped sensors no longer react
    hass.set_state("sensor.a", "2");
    hass.settle().await;
    assert!(hass.get_state("sensor.first").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_sensor_cannot_be_its_own_source() {
    let hass = TestHomeAssistant::new();
    hass.set_state("sensor.b", "1");

    let result = hass
        .fallback
        .setup_platform(yaml("name: Loop\nentities: [sensor.loop, sensor.b]\n"));

    assert!(matches!(
        result,
        Err(FallbackConfigError::SelfReference { entity_id }) if entity_id == "sensor.loop"
    ));
    assert!(hass.get_state("sensor.loop").is_none());
    assert_eq!(hass.fallback.sensor_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_sensors_sourcing_each_other_settle() {
    let hass = TestHomeAssistant::new();
    hass.set_state("sensor.x", "1");
    hass.set_state("sensor.y", "2");

    let mirrors: Vec<EntityId> = vec![
        "sensor.mirror_a".parse().unwrap(),
        "sensor.mirror_b".parse().unwrap(),
    ];
    let mut tracker = hass.bus.track_state_change(mirrors);

    hass.fallback
        .setup_platform(yaml("name: Mirror A\nentities: [sensor.mirror_b, sensor.x]\n"))
        .unwrap();
    hass.fallback
        .setup_platform(yaml("name: Mirror B\nentities: [sensor.mirror_a, sensor.y]\n"))
        .unwrap();
    hass.settle().await;

    let mut events = 0;
    while let Ok(Ok(_)) = tokio::time::timeout(Duration::from_millis(50), tracker.recv()).await {
        events += 1;
    }

    // Initial write of each sensor plus Mirror A moving onto Mirror B
    assert_eq!(events, 3);
    hass.assert_state("sensor.mirror_a", "1");
    hass.assert_state("sensor.mirror_b", "1");
    assert_eq!(
        hass.attribute("sensor.mirror_a", "current_source"),
        json!("sensor.mirror_b")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unload_while_sources_update() {
    let hass = TestHomeAssistant::new();
    let running = Arc::new(AtomicBool::new(true));

    let writer = tokio::spawn({
        let states = hass.states.clone();
        let running = running.clone();
        async move {
            let entity_id: EntityId = "sensor.b".parse().unwrap();
            let mut value = 0u64;
            while running.load(Ordering::Relaxed) {
                states.set(
                    entity_id.clone(),
                    value.to_string(),
                    HashMap::new(),
                    Context::new(),
                );
                value += 1;
                tokio::task::yield_now().await;
            }
        }
    });

    for round in 0..100 {
        let entity_id = hass
            .fallback
            .setup_platform(yaml("name: Busy\nentities: [sensor.a, sensor.b]\n"))
            .unwrap();
        assert_eq!(entity_id.to_string(), "sensor.busy", "round {}", round);

        tokio::time::sleep(Duration::from_millis(1)).await;
        hass.fallback.unload_platform();
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert!(
            hass.get_state("sensor.busy").is_none(),
            "sensor.busy came back after unload in round {}",
            round
        );
    }

    running.store(false, Ordering::Relaxed);
    writer.await.unwrap();
    assert_eq!(hass.fallback.sensor_count(), 0);
}
