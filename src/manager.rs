//! Object manager: instance cache, request correlation and update dispatch.
//!
//! Per object id the manager is in one of three states: no instance yet, a
//! cached instance, or a pending request. A pending request holds the
//! callbacks waiting for the object and a single retry timer that
//! retransmits the request until an OBJ frame for that id arrives or every
//! waiter has cancelled.
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use uavtalk::protocol::{Frame, FrameType};
//! use uavtalk::scheduler::{Scheduler, Task, TimerHandle};
//! use uavtalk::types::{FieldType, RawFieldDefinition, RawObjectDefinition};
//! use uavtalk::{ChannelSink, GetObject, ManagerConfig, ObjectManager};
//!
//! // Retries are irrelevant here
//! struct NoRetry;
//! impl Scheduler for NoRetry {
//!     fn schedule_after(&self, _: Duration, _: Task) -> TimerHandle {
//!         TimerHandle::default()
//!     }
//! }
//!
//! let (sink, mut wire) = ChannelSink::new();
//! let manager = ObjectManager::new(ManagerConfig::default(), Arc::new(sink), Arc::new(NoRetry));
//! let foo = RawObjectDefinition {
//!     name: "Foo".into(),
//!     object_id: 10,
//!     fields: vec![RawFieldDefinition::new("Value", FieldType::UInt16, 1)],
//! };
//! assert!(manager.load(vec![foo], || {}).is_empty());
//! assert!(manager.ready());
//!
//! // Nothing cached yet: the request goes out immediately
//! let pending = manager.get_object("Foo", |foo| println!("{:?}", foo.get("Value")), false).unwrap();
//! assert!(matches!(pending, GetObject::Pending(_)));
//! assert_eq!(wire.try_recv().unwrap(), Frame::request(10));
//!
//! // The reply resolves the waiter and fills the cache
//! manager.feed(&Frame::encode(FrameType::Obj, 10, 0, &[0x34, 0x12]).unwrap());
//! let foo = manager.get_cached_instance("Foo").unwrap();
//! assert_eq!(foo.get("Value").and_then(|v| v.as_i64()), Some(0x1234));
//! ```

use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, oneshot};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, trace, warn};

use crate::config::ManagerConfig;
use crate::protocol::{DecoderStats, Frame, FrameDecoder, FrameType};
use crate::registry::{LoadTracker, LoadUnit, ObjectKey, ObjectTable};
use crate::scheduler::{Scheduler, TimerHandle};
use crate::sink::ByteSink;
use crate::types::{Instance, ObjectDefinition, RawObjectDefinition};
use crate::{Result, UavTalkError};

/// Capacity of the update broadcast; slow subscribers skip older updates.
const UPDATE_CHANNEL_CAPACITY: usize = 256;

type Callback = Box<dyn FnOnce(Arc<Instance>) + Send>;

/// Outcome of [`ObjectManager::get_object`].
#[derive(Debug)]
pub enum GetObject {
    /// The cached instance; the callback has already run.
    Cached(Arc<Instance>),
    /// The callback is queued until the object arrives.
    Pending(RequestHandle),
}

impl GetObject {
    pub fn cached(&self) -> Option<&Arc<Instance>> {
        match self {
            GetObject::Cached(instance) => Some(instance),
            GetObject::Pending(_) => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, GetObject::Pending(_))
    }
}

/// Counters describing manager activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerStats {
    /// Frames handed to the manager after the table became ready
    pub frames_dispatched: u64,
    /// OBJ frames decoded into the cache
    pub objects_received: u64,
    /// Frames dropped: not ready, unknown id or undecodable payload
    pub frames_dropped: u64,
    /// OBJ_REQ frames written, retries included
    pub requests_sent: u64,
    pub retries: u64,
    pub updates_sent: u64,
}

struct Waiter {
    ticket: u64,
    callback: Callback,
}

struct PendingRequest {
    waiters: Vec<Waiter>,
    timer: TimerHandle,
    /// Distinguishes request cycles for the same id so a stale tick is a no-op
    generation: u64,
}

#[derive(Default)]
struct State {
    table: ObjectTable,
    pending: HashMap<u32, PendingRequest>,
    warned: HashSet<u32>,
    next_ticket: u64,
    next_generation: u64,
    stats: ManagerStats,
}

struct Shared {
    config: ManagerConfig,
    state: Mutex<State>,
    decoder: Mutex<FrameDecoder>,
    loader: Arc<LoadTracker>,
    sink: Arc<dyn ByteSink>,
    scheduler: Arc<dyn Scheduler>,
    updates: broadcast::Sender<Arc<Instance>>,
}

impl Shared {
    fn arm_retry(self: &Arc<Self>, object_id: u32, generation: u64) -> TimerHandle {
        let shared = Arc::downgrade(self);
        self.scheduler.schedule_after(
            self.config.retry_interval,
            Box::new(move || {
                if let Some(shared) = shared.upgrade() {
                    shared.retry_tick(object_id, generation);
                }
            }),
        )
    }

    fn retry_tick(self: &Arc<Self>, object_id: u32, generation: u64) {
        let resend = {
            let mut state = self.state.lock();
            let State { pending, stats, .. } = &mut *state;
            match pending.get_mut(&object_id) {
                Some(request) if request.generation == generation && !request.waiters.is_empty() => {
                    request.timer = self.arm_retry(object_id, generation);
                    stats.requests_sent += 1;
                    stats.retries += 1;
                    true
                }
                _ => false,
            }
        };

        if resend {
            debug!("Retrying request for object {:#010x}", object_id);
            self.sink.write(Frame::request(object_id));
        } else {
            trace!("Retry timer for object {:#010x} lapsed", object_id);
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        for request in self.state.get_mut().pending.values() {
            request.timer.cancel();
        }
    }
}

/// Handle to one queued `get_object` callback.
///
/// Dropping the handle leaves the callback queued; call
/// [`cancel`](Self::cancel) to abandon it.
#[derive(Debug)]
pub struct RequestHandle {
    shared: Weak<Shared>,
    object_id: u32,
    ticket: u64,
}

impl RequestHandle {
    pub fn object_id(&self) -> u32 {
        self.object_id
    }

    /// Remove the callback from its pending list.
    ///
    /// When it was the last waiter the request is abandoned and its retry
    /// timer cancelled. Returns false if the callback already ran or was
    /// already cancelled.
    pub fn cancel(&self) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        let mut state = shared.state.lock();
        let Entry::Occupied(mut entry) = state.pending.entry(self.object_id) else {
            return false;
        };
        let waiters = &mut entry.get_mut().waiters;
        let Some(position) = waiters.iter().position(|waiter| waiter.ticket == self.ticket) else {
            return false;
        };
        // Dropped outside the lock
        let removed = waiters.remove(position);
        if waiters.is_empty() {
            let request = entry.remove();
            request.timer.cancel();
            debug!("Abandoned request for object {:#010x}", self.object_id);
        }
        drop(state);
        drop(removed);
        true
    }
}

/// Cancels a pending request when the owning future is dropped early.
struct CancelOnDrop(Option<RequestHandle>);

impl CancelOnDrop {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.cancel();
        }
    }
}

/// Owner of the object table, the pending requests and the inbound decoder.
///
/// Cloning is cheap; clones share the same state. All mutations are
/// serialized behind one lock, and user callbacks always run with no lock
/// held so they may call back into the manager.
#[derive(Clone)]
pub struct ObjectManager {
    shared: Arc<Shared>,
}

impl fmt::Debug for ObjectManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("ObjectManager")
            .field("definitions", &state.table.len())
            .field("pending", &state.pending.len())
            .field("ready", &self.shared.loader.ready())
            .finish()
    }
}

impl ObjectManager {
    pub fn new(config: ManagerConfig, sink: Arc<dyn ByteSink>, scheduler: Arc<dyn Scheduler>) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let decoder = FrameDecoder::with_policy(config.checksum_policy);
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(State::default()),
                decoder: Mutex::new(decoder),
                loader: LoadTracker::new(),
                sink,
                scheduler,
                updates,
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    /// Register a batch of definitions and report readiness through `on_ready`.
    ///
    /// Every record is attempted; the errors of those that failed are logged
    /// and returned. Failures do not hold back readiness.
    pub fn load<I>(&self, records: I, on_ready: impl FnOnce() + Send + 'static) -> Vec<UavTalkError>
    where
        I: IntoIterator<Item = RawObjectDefinition>,
    {
        let load = self.begin_load();
        self.on_ready(on_ready);

        let mut errors = Vec::new();
        let mut loaded = 0usize;
        for record in records {
            let _unit = self.load_unit();
            match self.register(&record) {
                Ok(_) => loaded += 1,
                Err(e) => {
                    warn!("Failed to load definition '{}': {}", record.name, e);
                    errors.push(e);
                }
            }
        }
        info!("Loaded {} object definitions ({} failed)", loaded, errors.len());
        load.complete();
        errors
    }

    /// Open an asynchronous load. The table turns ready once the returned
    /// unit and every unit from [`load_unit`](Self::load_unit) have completed.
    pub fn begin_load(&self) -> LoadUnit {
        self.shared.loader.begin()
    }

    /// Account for one more unit of load work, such as one definition file.
    pub fn load_unit(&self) -> LoadUnit {
        self.shared.loader.unit()
    }

    /// Register one definition together with its metadata object.
    pub fn register(&self, record: &RawObjectDefinition) -> Result<Arc<ObjectDefinition>> {
        self.shared.state.lock().table.register(record)
    }

    /// Run `callback` once loading completes, or now if it already has.
    pub fn on_ready(&self, callback: impl FnOnce() + Send + 'static) {
        self.shared.loader.on_ready(callback);
    }

    pub fn ready(&self) -> bool {
        self.shared.loader.ready()
    }

    pub fn definition(&self, key: impl Into<ObjectKey>) -> Option<Arc<ObjectDefinition>> {
        self.shared.state.lock().table.lookup(&key.into()).cloned()
    }

    /// Number of registered definitions, metadata included.
    pub fn definition_count(&self) -> usize {
        self.shared.state.lock().table.len()
    }

    /// Get an object, from the cache or by requesting it from the remote side.
    ///
    /// With a cached instance and `force_refresh` unset, `callback` runs
    /// before this returns. Otherwise it is queued and runs when the next OBJ
    /// frame for the object is decoded. The first queued callback transmits
    /// a request and arms the retry timer; later ones join that request.
    pub fn get_object<F>(&self, key: impl Into<ObjectKey>, callback: F, force_refresh: bool) -> Result<GetObject>
    where
        F: FnOnce(Arc<Instance>) + Send + 'static,
    {
        let key = key.into();
        let mut state = self.shared.state.lock();
        let object_id = state
            .table
            .lookup(&key)
            .map(|definition| definition.object_id())
            .ok_or_else(|| UavTalkError::unknown_object(&key))?;

        if !force_refresh && let Some(instance) = state.table.cached(object_id).cloned() {
            drop(state);
            trace!("Serving {} from cache", instance.name());
            callback(Arc::clone(&instance));
            return Ok(GetObject::Cached(instance));
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        let waiter = Waiter { ticket, callback: Box::new(callback) };

        let State { pending, next_generation, stats, .. } = &mut *state;
        let send_request = match pending.entry(object_id) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().waiters.push(waiter);
                trace!("Joined pending request for {} ({} waiting)", key, entry.get().waiters.len());
                false
            }
            Entry::Vacant(entry) => {
                let generation = *next_generation;
                *next_generation += 1;
                let timer = self.shared.arm_retry(object_id, generation);
                entry.insert(PendingRequest { waiters: vec![waiter], timer, generation });
                stats.requests_sent += 1;
                true
            }
        };
        drop(state);

        if send_request {
            debug!("Requesting {} ({:#010x})", key, object_id);
            self.shared.sink.write(Frame::request(object_id));
        }

        Ok(GetObject::Pending(RequestHandle { shared: Arc::downgrade(&self.shared), object_id, ticket }))
    }

    /// Async form of [`get_object`](Self::get_object).
    ///
    /// Dropping the future before it resolves cancels its request.
    pub async fn fetch(&self, key: impl Into<ObjectKey>, force_refresh: bool) -> Result<Arc<Instance>> {
        let key = key.into();
        let (tx, rx) = oneshot::channel();
        let outcome = self.get_object(
            key.clone(),
            move |instance| {
                let _ = tx.send(instance);
            },
            force_refresh,
        )?;

        match outcome {
            GetObject::Cached(instance) => Ok(instance),
            GetObject::Pending(handle) => {
                let guard = CancelOnDrop(Some(handle));
                let result = rx.await;
                guard.disarm();
                result.map_err(|_| UavTalkError::Cancelled { key: key.to_string() })
            }
        }
    }

    /// Last instance received for an object, without touching the link.
    pub fn get_cached_instance(&self, key: impl Into<ObjectKey>) -> Option<Arc<Instance>> {
        let state = self.shared.state.lock();
        let object_id = state.table.lookup(&key.into())?.object_id();
        state.table.cached(object_id).cloned()
    }

    /// Callbacks currently waiting on an object.
    pub fn pending_requests(&self, key: impl Into<ObjectKey>) -> usize {
        let state = self.shared.state.lock();
        state
            .table
            .lookup(&key.into())
            .and_then(|definition| state.pending.get(&definition.object_id()))
            .map_or(0, |request| request.waiters.len())
    }

    /// Serialize an instance and transmit it as an OBJ frame.
    ///
    /// Nothing acknowledges the update and the local cache is not changed;
    /// the cache only mirrors what the remote side reports.
    pub fn update_object(&self, instance: &Instance) -> Result<()> {
        let frame = {
            let mut state = self.shared.state.lock();
            let definition = state
                .table
                .lookup_by_id(instance.object_id())
                .ok_or_else(|| UavTalkError::unknown_object(ObjectKey::Id(instance.object_id())))?;
            if definition.layout().as_ref() != instance.layout() {
                return Err(UavTalkError::serialization(
                    format!("pack {}", definition.name()),
                    "instance layout does not match the registered definition",
                ));
            }
            let payload = instance.encode()?;
            let frame = Frame::encode(FrameType::Obj, instance.object_id(), instance.instance_id(), &payload)?;
            state.stats.updates_sent += 1;
            frame
        };

        debug!("Sending update for {} ({} bytes)", instance.name(), frame.len());
        self.shared.sink.write(frame);
        Ok(())
    }

    /// Transmit a single request for an object without waiting for it.
    pub fn request_object(&self, key: impl Into<ObjectKey>) -> Result<()> {
        let key = key.into();
        let object_id = {
            let mut state = self.shared.state.lock();
            let object_id = state
                .table
                .lookup(&key)
                .map(|definition| definition.object_id())
                .ok_or_else(|| UavTalkError::unknown_object(&key))?;
            state.stats.requests_sent += 1;
            object_id
        };
        self.shared.sink.write(Frame::request(object_id));
        Ok(())
    }

    /// Handle a chunk of bytes received from the transport.
    pub fn feed(&self, bytes: &[u8]) {
        let frames = self.shared.decoder.lock().push(bytes);
        for frame in frames {
            self.on_frame_decoded(frame);
        }
    }

    /// Apply one decoded frame.
    pub fn on_frame_decoded(&self, frame: Frame) {
        if !self.ready() {
            trace!("Ignoring frame for {:#010x}: object table not ready", frame.object_id);
            self.shared.state.lock().stats.frames_dropped += 1;
            return;
        }

        let mut state = self.shared.state.lock();
        state.stats.frames_dispatched += 1;

        let Some(definition) = state.table.lookup_by_id(frame.object_id).cloned() else {
            state.stats.frames_dropped += 1;
            if state.warned.insert(frame.object_id) {
                warn!("Dropping frame for unknown object {:#010x}", frame.object_id);
            } else {
                trace!("Dropping frame for unknown object {:#010x}", frame.object_id);
            }
            return;
        };

        if frame.frame_type != FrameType::Obj {
            trace!("Ignoring {:?} frame for {}", frame.frame_type, definition.name());
            return;
        }

        let instance = match definition.decode(frame.instance_id, &frame.payload) {
            Ok(instance) => Arc::new(instance),
            Err(e) => {
                state.stats.frames_dropped += 1;
                warn!("Dropping frame: {}", e);
                return;
            }
        };

        state.table.store(Arc::clone(&instance));
        state.stats.objects_received += 1;
        let waiters = match state.pending.remove(&frame.object_id) {
            Some(request) => {
                request.timer.cancel();
                request.waiters
            }
            None => Vec::new(),
        };
        drop(state);

        trace!("Updated {} ({} waiting)", instance.name(), waiters.len());
        let _ = self.shared.updates.send(Arc::clone(&instance));
        for waiter in waiters {
            (waiter.callback)(Arc::clone(&instance));
        }
    }

    /// Stream of every instance decoded from now on.
    ///
    /// A subscriber that falls more than a few hundred updates behind skips
    /// the ones it missed.
    pub fn subscribe(&self) -> impl Stream<Item = Arc<Instance>> + Send + 'static {
        BroadcastStream::new(self.shared.updates.subscribe()).filter_map(|update| match update {
            Ok(instance) => Some(instance),
            Err(e) => {
                debug!("Update subscriber fell behind: {}", e);
                None
            }
        })
    }

    pub fn stats(&self) -> ManagerStats {
        self.shared.state.lock().stats
    }

    pub fn decoder_stats(&self) -> DecoderStats {
        self.shared.decoder.lock().stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FrameType;
    use crate::test_utils::{ManualScheduler, RecordingSink, raw_definition};
    use crate::types::FieldType;
    use std::time::Duration;

    const FOO: u32 = 10;

    struct Harness {
        manager: ObjectManager,
        sink: RecordingSink,
        scheduler: Arc<ManualScheduler>,
    }

    fn harness() -> Harness {
        let _ = tracing_subscriber::fmt::try_init();
        let sink = RecordingSink::new();
        let scheduler = Arc::new(ManualScheduler::new());
        let manager = ObjectManager::new(
            ManagerConfig::default(),
            Arc::new(sink.clone()),
            Arc::clone(&scheduler) as Arc<dyn Scheduler>,
        );
        let errors = manager.load(
            vec![raw_definition("Foo", FOO, &[("Value", FieldType::UInt16, 1), ("Gain", FieldType::Float32, 1)])],
            || {},
        );
        assert!(errors.is_empty());
        Harness { manager, sink, scheduler }
    }

    fn foo_frame(value: u16) -> bytes::Bytes {
        let mut payload = value.to_le_bytes().to_vec();
        payload.extend_from_slice(&1.5f32.to_le_bytes());
        Frame::encode(FrameType::Obj, FOO, 0, &payload).unwrap()
    }

    fn recorder() -> (Arc<Mutex<Vec<(usize, u16)>>>, impl Fn(usize) -> Callback) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&calls);
        let make = move |label: usize| -> Callback {
            let log = Arc::clone(&log);
            Box::new(move |instance: Arc<Instance>| {
                let value = instance.get("Value").and_then(|v| v.as_i64()).unwrap() as u16;
                log.lock().push((label, value));
            })
        };
        (calls, make)
    }

    fn requests(sink: &RecordingSink) -> usize {
        sink.decoded().iter().filter(|frame| frame.frame_type == FrameType::ObjReq).count()
    }

    #[test]
    fn three_waiters_share_one_request() {
        let h = harness();
        let (calls, make) = recorder();

        for label in 0..3 {
            let outcome = h.manager.get_object(FOO, make(label), false).unwrap();
            assert!(outcome.is_pending());
        }
        assert_eq!(requests(&h.sink), 1);
        assert_eq!(h.scheduler.pending_timers(), 1);
        assert_eq!(h.manager.pending_requests("Foo"), 3);

        h.manager.feed(&foo_frame(42));
        assert_eq!(*calls.lock(), [(0, 42), (1, 42), (2, 42)]);
        assert_eq!(h.scheduler.pending_timers(), 0);
        assert_eq!(h.manager.pending_requests(FOO), 0);

        // Cached now: synchronous answer, nothing on the wire
        h.sink.take();
        let outcome = h.manager.get_object("Foo", make(3), false).unwrap();
        assert_eq!(outcome.cached().and_then(|i| i.get("Value")), Some(42u16.into()));
        assert_eq!(calls.lock().last(), Some(&(3, 42)));
        assert!(h.sink.is_empty());
    }

    #[test]
    fn retries_until_resolved() {
        let h = harness();
        let (calls, make) = recorder();
        let _ = h.manager.get_object(FOO, make(0), false).unwrap();

        h.scheduler.advance(Duration::from_millis(999));
        assert_eq!(requests(&h.sink), 1);
        h.scheduler.advance(Duration::from_millis(1));
        assert_eq!(requests(&h.sink), 2);
        h.scheduler.advance(Duration::from_millis(3000));
        assert_eq!(requests(&h.sink), 5);
        assert_eq!(h.scheduler.pending_timers(), 1);
        assert_eq!(h.manager.stats().retries, 4);

        h.manager.feed(&foo_frame(7));
        assert_eq!(*calls.lock(), [(0, 7)]);
        h.scheduler.advance(Duration::from_secs(10));
        assert_eq!(requests(&h.sink), 5);
    }

    #[test]
    fn force_refresh_bypasses_cache() {
        let h = harness();
        h.manager.feed(&foo_frame(1));
        let (calls, make) = recorder();

        let outcome = h.manager.get_object(FOO, make(0), true).unwrap();
        assert!(outcome.is_pending());
        assert!(calls.lock().is_empty());
        assert_eq!(requests(&h.sink), 1);

        h.manager.feed(&foo_frame(2));
        assert_eq!(*calls.lock(), [(0, 2)]);
    }

    #[test]
    fn frames_before_ready_have_no_effect() {
        let sink = RecordingSink::new();
        let scheduler = Arc::new(ManualScheduler::new());
        let manager = ObjectManager::new(ManagerConfig::default(), Arc::new(sink.clone()), scheduler);

        let load = manager.begin_load();
        manager.register(&raw_definition("Foo", FOO, &[("Value", FieldType::UInt16, 1), ("Gain", FieldType::Float32, 1)])).unwrap();
        let (calls, make) = recorder();
        let _ = manager.get_object(FOO, make(0), false).unwrap();

        manager.feed(&foo_frame(5));
        assert!(manager.get_cached_instance(FOO).is_none());
        assert!(calls.lock().is_empty());
        assert_eq!(manager.pending_requests(FOO), 1);

        load.complete();
        assert!(manager.ready());
        manager.feed(&foo_frame(6));
        assert_eq!(*calls.lock(), [(0, 6)]);
    }

    #[test]
    fn later_load_reports_ready_after_its_records() {
        let h = harness();
        assert!(h.manager.ready());

        let seen = Arc::new(Mutex::new(None));
        let observed = Arc::clone(&seen);
        let manager = h.manager.clone();
        let errors = h.manager.load(vec![raw_definition("Bar", 40, &[("Level", FieldType::Int8, 2)])], move || {
            *observed.lock() = Some(manager.definition("Bar").is_some());
        });
        assert!(errors.is_empty());
        assert_eq!(*seen.lock(), Some(true));
        assert!(h.manager.ready());

        // An open unit of a third load closes the gate again
        let unit = h.manager.begin_load();
        assert!(!h.manager.ready());
        h.manager.feed(&foo_frame(3));
        assert!(h.manager.get_cached_instance(FOO).is_none());
        unit.complete();
        h.manager.feed(&foo_frame(3));
        assert!(h.manager.get_cached_instance(FOO).is_some());
    }

    #[test]
    fn unknown_objects_are_dropped() {
        let h = harness();
        let stray = Frame::encode(FrameType::Obj, 0xDEAD, 0, &[1, 2, 3]).unwrap();
        h.manager.feed(&stray);
        h.manager.feed(&stray);
        assert_eq!(h.manager.stats().frames_dropped, 2);

        // Warned once per id
        h.manager.feed(&Frame::encode(FrameType::Obj, 0xBEEF, 0, &[]).unwrap());
        {
            let state = h.manager.shared.state.lock();
            assert_eq!(state.warned.len(), 2);
            assert!(state.warned.contains(&0xDEAD) && state.warned.contains(&0xBEEF));
        }
        assert_eq!(h.manager.stats().frames_dropped, 3);
        assert!(h.manager.get_cached_instance(0xDEADu32).is_none());
        assert!(matches!(
            h.manager.get_object(0xDEADu32, |_| {}, false),
            Err(UavTalkError::UnknownObject { .. })
        ));
    }

    #[test]
    fn short_payload_keeps_request_pending() {
        let h = harness();
        let (calls, make) = recorder();
        let _ = h.manager.get_object(FOO, make(0), false).unwrap();

        h.manager.feed(&Frame::encode(FrameType::Obj, FOO, 0, &[1, 2, 3]).unwrap());
        assert!(calls.lock().is_empty());
        assert!(h.manager.get_cached_instance(FOO).is_none());
        assert_eq!(h.manager.pending_requests(FOO), 1);

        h.scheduler.advance(Duration::from_millis(1000));
        assert_eq!(requests(&h.sink), 2);
    }

    #[test]
    fn surplus_payload_bytes_are_ignored() {
        let h = harness();
        let mut payload = foo_frame(9)[10..16].to_vec();
        payload.extend_from_slice(&[0xEE; 4]);
        h.manager.feed(&Frame::encode(FrameType::Obj, FOO, 0, &payload).unwrap());
        let cached = h.manager.get_cached_instance(FOO).unwrap();
        assert_eq!(cached.get("Value"), Some(9u16.into()));
    }

    #[test]
    fn non_obj_frames_do_not_resolve() {
        let h = harness();
        let (calls, make) = recorder();
        let _ = h.manager.get_object(FOO, make(0), false).unwrap();
        h.manager.feed(&Frame::encode(FrameType::Ack, FOO, 0, &[]).unwrap());
        assert!(calls.lock().is_empty());
        assert_eq!(h.manager.pending_requests(FOO), 1);
    }

    #[test]
    fn callback_may_start_a_new_cycle() {
        let h = harness();
        let manager = h.manager.clone();
        let inner = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&inner);

        let _ = h
            .manager
            .get_object(
                FOO,
                move |_| {
                    let outcome = manager.get_object(FOO, |_| {}, true).unwrap();
                    *slot.lock() = Some(outcome.is_pending());
                },
                false,
            )
            .unwrap();

        h.manager.feed(&foo_frame(1));
        assert_eq!(*inner.lock(), Some(true));
        assert_eq!(h.manager.pending_requests(FOO), 1);
        assert_eq!(requests(&h.sink), 2);
        assert_eq!(h.scheduler.pending_timers(), 1);
    }

    #[test]
    fn cancelling_last_waiter_stops_retries() {
        let h = harness();
        let (calls, make) = recorder();
        let first = h.manager.get_object(FOO, make(0), false).unwrap();
        let second = h.manager.get_object(FOO, make(1), false).unwrap();
        let (GetObject::Pending(first), GetObject::Pending(second)) = (first, second) else {
            panic!("expected pending requests");
        };

        assert!(first.cancel());
        assert!(!first.cancel());
        assert_eq!(h.scheduler.pending_timers(), 1);

        assert!(second.cancel());
        assert_eq!(h.scheduler.pending_timers(), 0);
        h.scheduler.advance(Duration::from_secs(5));
        assert_eq!(requests(&h.sink), 1);

        h.manager.feed(&foo_frame(3));
        assert!(calls.lock().is_empty());
        assert!(h.manager.get_cached_instance(FOO).is_some());
    }

    #[test]
    fn update_sends_obj_frame() {
        let h = harness();
        let definition = h.manager.definition("Foo").unwrap();
        let mut instance = definition.default_instance();
        instance.set("Value", 0x0102u16).unwrap();
        instance.set_instance_id(4);
        h.manager.update_object(&instance).unwrap();

        let frames = h.sink.decoded();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame_type, FrameType::Obj);
        assert_eq!(frames[0].instance_id, 4);
        assert_eq!(&frames[0].payload[..2], &[0x02, 0x01]);
        assert!(h.manager.get_cached_instance(FOO).is_none());
        assert_eq!(h.manager.stats().updates_sent, 1);
    }

    #[test]
    fn metadata_objects_are_requestable() {
        let h = harness();
        h.manager.request_object("Foo.Metadata").unwrap();
        let frames = h.sink.decoded();
        assert_eq!(frames[0].object_id, FOO + 1);
        assert!(h.manager.request_object("Bar").is_err());
    }

    #[tokio::test]
    async fn fetch_resolves_from_feed() {
        let h = harness();
        let manager = h.manager.clone();
        let fetch = tokio::spawn(async move { manager.fetch("Foo", false).await });
        while h.manager.pending_requests(FOO) == 0 {
            tokio::task::yield_now().await;
        }
        h.manager.feed(&foo_frame(11));
        let instance = fetch.await.unwrap().unwrap();
        assert_eq!(instance.get("Value"), Some(11u16.into()));
    }

    #[tokio::test]
    async fn dropped_fetch_cancels_request() {
        let h = harness();
        let fetch = h.manager.fetch(FOO, false);
        let timed_out = tokio::time::timeout(Duration::from_millis(10), fetch).await;
        assert!(timed_out.is_err());
        assert_eq!(h.manager.pending_requests(FOO), 0);
        assert_eq!(h.scheduler.pending_timers(), 0);
    }

    #[tokio::test]
    async fn subscribers_see_every_update() {
        let h = harness();
        let mut updates = Box::pin(h.manager.subscribe());
        h.manager.feed(&foo_frame(1));
        h.manager.feed(&foo_frame(2));
        let first = updates.next().await.unwrap();
        let second = updates.next().await.unwrap();
        assert_eq!(first.get("Value"), Some(1u16.into()));
        assert_eq!(second.get("Value"), Some(2u16.into()));
    }
}
