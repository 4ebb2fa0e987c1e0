//! Test doubles for the manager's collaborators
//!
//! [`RecordingSink`] captures every frame written by the engine and
//! [`ManualScheduler`] runs timers only when the test advances its clock, so
//! retry behaviour can be asserted without sleeping.

#![cfg(any(test, feature = "test-utils"))]

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::protocol::{Frame, FrameDecoder};
use crate::scheduler::{Scheduler, Task, TimerHandle};
use crate::sink::ByteSink;
use crate::types::{FieldType, RawFieldDefinition, RawObjectDefinition};

/// Sink that keeps every frame it is given.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    frames: Arc<Mutex<Vec<Bytes>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames written so far, oldest first.
    pub fn frames(&self) -> Vec<Bytes> {
        self.frames.lock().clone()
    }

    /// Remove and return every recorded frame.
    pub fn take(&self) -> Vec<Bytes> {
        std::mem::take(&mut *self.frames.lock())
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    /// Recorded frames parsed back through a fresh decoder.
    pub fn decoded(&self) -> Vec<Frame> {
        let mut decoder = FrameDecoder::new();
        self.frames.lock().iter().flat_map(|bytes| decoder.push(bytes)).collect()
    }
}

impl ByteSink for RecordingSink {
    fn write(&self, frame: Bytes) {
        self.frames.lock().push(frame);
    }
}

struct ManualTimer {
    due: Duration,
    seq: u64,
    handle: TimerHandle,
    task: Task,
}

#[derive(Default)]
struct ManualClock {
    now: Duration,
    next_seq: u64,
    timers: Vec<ManualTimer>,
}

/// Scheduler driven by an explicit virtual clock.
///
/// Timers due at the same instant run in the order they were scheduled.
/// Tasks run without the scheduler's lock held, so they may schedule again.
#[derive(Default)]
pub struct ManualScheduler {
    clock: Mutex<ManualClock>,
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let clock = self.clock.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &clock.now)
            .field("timers", &clock.timers.len())
            .finish()
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation.
    pub fn now(&self) -> Duration {
        self.clock.lock().now
    }

    /// Timers scheduled and neither fired nor cancelled.
    pub fn pending_timers(&self) -> usize {
        self.clock.lock().timers.iter().filter(|timer| !timer.handle.is_cancelled()).count()
    }

    /// Move the clock forward, firing every timer that falls due on the way.
    pub fn advance(&self, by: Duration) {
        let target = self.clock.lock().now + by;
        loop {
            let next = {
                let mut clock = self.clock.lock();
                clock.timers.retain(|timer| !timer.handle.is_cancelled());
                let earliest = clock
                    .timers
                    .iter()
                    .enumerate()
                    .filter(|(_, timer)| timer.due <= target)
                    .min_by_key(|(_, timer)| (timer.due, timer.seq))
                    .map(|(index, _)| index);
                match earliest {
                    Some(index) => {
                        let timer = clock.timers.swap_remove(index);
                        clock.now = timer.due;
                        Some(timer)
                    }
                    None => {
                        clock.now = target;
                        None
                    }
                }
            };
            match next {
                Some(timer) if !timer.handle.is_cancelled() => (timer.task)(),
                Some(_) => {}
                None => break,
            }
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_after(&self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::default();
        let mut clock = self.clock.lock();
        let seq = clock.next_seq;
        clock.next_seq += 1;
        let due = clock.now + delay;
        clock.timers.push(ManualTimer { due, seq, handle: handle.clone(), task });
        handle
    }
}

/// Raw record built from `(name, type, elements)` triples.
pub fn raw_definition(
    name: &str,
    object_id: u32,
    fields: &[(&str, FieldType, u32)],
) -> RawObjectDefinition {
    RawObjectDefinition {
        name: name.to_string(),
        object_id,
        fields: fields
            .iter()
            .map(|(field, field_type, count)| RawFieldDefinition::new(*field, *field_type, *count))
            .collect(),
    }
}

/// Id of the `AttitudeActual` sample object.
pub const ATTITUDE_ID: u32 = 0x33DA_D5E6;
/// Id of the `FlightStatus` sample object.
pub const FLIGHT_STATUS_ID: u32 = 0x0ED7_9A04;

/// A small definition set shaped like real flight controller objects.
pub fn sample_definitions() -> Vec<RawObjectDefinition> {
    vec![
        raw_definition(
            "AttitudeActual",
            ATTITUDE_ID,
            &[
                ("q1", FieldType::Float32, 1),
                ("q2", FieldType::Float32, 1),
                ("q3", FieldType::Float32, 1),
                ("q4", FieldType::Float32, 1),
                ("Roll", FieldType::Float32, 1),
                ("Pitch", FieldType::Float32, 1),
                ("Yaw", FieldType::Float32, 1),
            ],
        ),
        raw_definition(
            "FlightStatus",
            FLIGHT_STATUS_ID,
            &[
                ("Armed", FieldType::Enum8, 1),
                ("FlightMode", FieldType::Enum8, 1),
                ("ControlSource", FieldType::UInt8, 1),
                ("Switches", FieldType::Int16, 3),
            ],
        ),
    ]
}
