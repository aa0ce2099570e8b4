//! Per-sensor task
//!
//! Each fallback sensor runs in its own tokio task that waits on either a
//! source state change or the pending hysteresis deadline, whichever comes
//! first. The task owns the sensor, so selector state needs no locking.

use ha_core::EntityId;
use ha_event_bus::{EventBus, RecvError, StateChangeTracker};
use ha_state_machine::StateMachine;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::sensor::{self, FallbackSensor};

/// Handle to a running fallback sensor
pub struct FallbackSensorHandle {
    entity_id: EntityId,
    unique_id: Option<String>,
    states: Arc<StateMachine>,
    registration: Arc<Mutex<bool>>,
    task: JoinHandle<()>,
}

impl FallbackSensorHandle {
    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn unique_id(&self) -> Option<&str> {
        self.unique_id.as_deref()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the sensor and remove its state
    ///
    /// The task may still be running a write on another worker when this is
    /// called; the sensor's registration lock keeps that write from landing
    /// after the removal.
    pub fn remove(self) {
        sensor::remove_state(&self.states, &self.entity_id, &self.registration);
        self.task.abort();
        info!(entity_id = %self.entity_id, "Removed fallback sensor");
    }
}

/// Start a fallback sensor
///
/// Subscribes to the sources, writes the initial state, then hands the
/// sensor to its own task. Must be called from within a tokio runtime.
pub fn spawn(
    mut sensor: FallbackSensor,
    bus: &EventBus,
    states: Arc<StateMachine>,
) -> FallbackSensorHandle {
    let tracker = bus.track_state_change(sensor.source_entities().iter().cloned());
    sensor.handle_source_change(Instant::now());

    let entity_id = sensor.entity_id().clone();
    let unique_id = sensor.unique_id().map(str::to_string);
    let registration = sensor.registration();

    info!(
        entity_id = %entity_id,
        sources = sensor.source_entities().len(),
        "Fallback sensor '{}' added",
        sensor.name()
    );

    let task = tokio::spawn(run(sensor, tracker));

    FallbackSensorHandle {
        entity_id,
        unique_id,
        states,
        registration,
        task,
    }
}

async fn run(mut sensor: FallbackSensor, mut tracker: StateChangeTracker) {
    loop {
        let deadline = sensor.pending_deadline();

        tokio::select! {
            event = tracker.recv() => match event {
                Ok(event) => {
                    trace!(
                        entity_id = %sensor.entity_id(),
                        source = %event.data.entity_id,
                        "Source changed"
                    );
                    sensor.handle_source_change(Instant::now());
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        entity_id = %sensor.entity_id(),
                        skipped,
                        "Missed source updates, re-evaluating"
                    );
                    sensor.handle_source_change(Instant::now());
                }
                Err(RecvError::Closed) => {
                    debug!(entity_id = %sensor.entity_id(), "Event bus closed");
                    break;
                }
            },
            _ = sleep_until(deadline) => {
                sensor.handle_timer(Instant::now());
            }
        }
    }
}

/// Sleep until `deadline`, or forever without one
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
