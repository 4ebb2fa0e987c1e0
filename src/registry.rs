//! Object definition table and load completion tracking.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::types::{Instance, ObjectDefinition, RawObjectDefinition};
use crate::{Result, UavTalkError};

/// Lookup key accepted wherever an object can be named.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectKey {
    Id(u32),
    Name(String),
}

impl From<u32> for ObjectKey {
    fn from(id: u32) -> Self {
        ObjectKey::Id(id)
    }
}

impl From<&str> for ObjectKey {
    fn from(name: &str) -> Self {
        ObjectKey::Name(name.to_string())
    }
}

impl From<String> for ObjectKey {
    fn from(name: String) -> Self {
        ObjectKey::Name(name)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKey::Id(id) => write!(f, "{id:#010x}"),
            ObjectKey::Name(name) => f.write_str(name),
        }
    }
}

/// In-memory table of object definitions indexed by id and by name, with the
/// last known instance of each object.
#[derive(Debug, Default)]
pub struct ObjectTable {
    by_id: HashMap<u32, Arc<ObjectDefinition>>,
    by_name: HashMap<String, u32>,
    instances: HashMap<u32, Arc<Instance>>,
}

impl ObjectTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a raw record and register it together with its metadata object.
    ///
    /// Nothing is registered when validation of either definition fails.
    pub fn register(&mut self, raw: &RawObjectDefinition) -> Result<Arc<ObjectDefinition>> {
        let definition = ObjectDefinition::from_raw(raw)?;
        let metadata = definition.metadata_for()?;
        self.check_free(&definition)?;
        self.check_free(&metadata)?;

        let definition = Arc::new(definition);
        self.insert(Arc::clone(&definition));
        self.insert(Arc::new(metadata));
        debug!("Registered {} ({:#010x}) and its metadata", definition.name(), definition.object_id());
        Ok(definition)
    }

    fn check_free(&self, definition: &ObjectDefinition) -> Result<()> {
        if self.by_id.contains_key(&definition.object_id()) || self.by_name.contains_key(definition.name()) {
            return Err(UavTalkError::DuplicateObject {
                object_id: definition.object_id(),
                name: definition.name().to_string(),
            });
        }
        Ok(())
    }

    fn insert(&mut self, definition: Arc<ObjectDefinition>) {
        self.by_name.insert(definition.name().to_string(), definition.object_id());
        self.by_id.insert(definition.object_id(), definition);
    }

    pub fn lookup_by_id(&self, object_id: u32) -> Option<&Arc<ObjectDefinition>> {
        self.by_id.get(&object_id)
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<&Arc<ObjectDefinition>> {
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }

    pub fn lookup(&self, key: &ObjectKey) -> Option<&Arc<ObjectDefinition>> {
        match key {
            ObjectKey::Id(id) => self.lookup_by_id(*id),
            ObjectKey::Name(name) => self.lookup_by_name(name),
        }
    }

    /// Last known instance of an object.
    pub fn cached(&self, object_id: u32) -> Option<&Arc<Instance>> {
        self.instances.get(&object_id)
    }

    /// Overwrite the cached instance of an object.
    pub fn store(&mut self, instance: Arc<Instance>) {
        self.instances.insert(instance.object_id(), instance);
    }

    /// Number of registered definitions, metadata included.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Registered definitions in no particular order.
    pub fn definitions(&self) -> impl Iterator<Item = &Arc<ObjectDefinition>> {
        self.by_id.values()
    }
}

type ReadyCallback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct TrackerState {
    pending: usize,
    started: bool,
    ready: bool,
    callbacks: Vec<ReadyCallback>,
}

/// Completion counter gating readiness of the object table.
///
/// Each load opens with [`begin`](Self::begin), whose guard stands for the
/// load as a whole. Each unit of work (typically one definition file) holds a
/// [`LoadUnit`] that decrements the counter when dropped, whether the unit
/// succeeded, failed or panicked. The tracker is ready while no unit opened
/// since the first `begin` is outstanding. A later load clears readiness
/// until its own units have completed.
#[derive(Default)]
pub struct LoadTracker {
    state: Mutex<TrackerState>,
}

impl fmt::Debug for LoadTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LoadTracker")
            .field("pending", &state.pending)
            .field("ready", &state.ready)
            .finish()
    }
}

impl LoadTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Open a load: returns the guard standing for the load as a whole.
    ///
    /// Callbacks registered with `on_ready` while the load is open run once,
    /// when its last unit completes.
    pub fn begin(self: &Arc<Self>) -> LoadUnit {
        let mut state = self.state.lock();
        state.started = true;
        self.open(&mut state)
    }

    /// Account for one more unit of work.
    pub fn unit(self: &Arc<Self>) -> LoadUnit {
        let mut state = self.state.lock();
        self.open(&mut state)
    }

    fn open(self: &Arc<Self>, state: &mut TrackerState) -> LoadUnit {
        if state.ready {
            debug!("Object table reopened for loading");
            state.ready = false;
        }
        state.pending += 1;
        LoadUnit { tracker: Arc::clone(self) }
    }

    /// Whether every unit opened so far has completed.
    pub fn ready(&self) -> bool {
        self.state.lock().ready
    }

    /// Units still outstanding.
    pub fn pending(&self) -> usize {
        self.state.lock().pending
    }

    /// Run `callback` once the table is ready (immediately if it already is).
    pub fn on_ready(&self, callback: impl FnOnce() + Send + 'static) {
        {
            let mut state = self.state.lock();
            if !state.ready {
                state.callbacks.push(Box::new(callback));
                return;
            }
        }
        callback();
    }

    fn complete_unit(&self) {
        let callbacks = {
            let mut state = self.state.lock();
            state.pending = state.pending.saturating_sub(1);
            if state.pending > 0 || !state.started {
                return;
            }
            state.ready = true;
            std::mem::take(&mut state.callbacks)
        };
        info!("Object table ready");
        for callback in callbacks {
            callback();
        }
    }
}

/// Guard for one unit of load work; completes the unit when dropped.
#[must_use = "dropping a LoadUnit immediately completes it"]
#[derive(Debug)]
pub struct LoadUnit {
    tracker: Arc<LoadTracker>,
}

impl LoadUnit {
    /// Complete the unit explicitly.
    pub fn complete(self) {}
}

impl Drop for LoadUnit {
    fn drop(&mut self) {
        self.tracker.complete_unit();
    }
}
