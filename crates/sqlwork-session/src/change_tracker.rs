//! Snapshot store for tracked entities.
//!
//! A snapshot is the serialized state of an entity at the moment it entered
//! an object scope. It is decoded lazily, the first time a diff needs the
//! old side, and the decoded value is cached for the snapshot's lifetime.

use crate::ObjectKey;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlwork_core::{Error, Result, ScopeError, ScopeErrorKind};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use std::time::Instant;

/// Snapshot of an object's state at a point in time.
pub struct ObjectSnapshot {
    /// Serialized original state (JSON bytes).
    data: Vec<u8>,
    /// Timestamp when snapshot was taken.
    taken_at: Instant,
    /// Decoded form, filled on first use.
    decoded: OnceLock<Box<dyn Any + Send + Sync>>,
}

impl ObjectSnapshot {
    /// Create a new snapshot from serialized data.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            taken_at: Instant::now(),
            decoded: OnceLock::new(),
        }
    }

    /// Serialize `value` into a snapshot.
    pub fn capture<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::new(serde_json::to_vec(value)?))
    }

    /// Get the snapshot data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get the timestamp when the snapshot was taken.
    pub fn taken_at(&self) -> Instant {
        self.taken_at
    }

    /// Whether the snapshot has been decoded yet.
    pub fn is_decoded(&self) -> bool {
        self.decoded.get().is_some()
    }

    /// Decode the snapshot as `T`, reusing the cached value after the first
    /// call.
    pub fn decode<T>(&self) -> Result<&T>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        if self.decoded.get().is_none() {
            let value: T = serde_json::from_slice(&self.data)?;
            tracing::trace!(
                model = std::any::type_name::<T>(),
                snapshot_bytes = self.data.len(),
                "Decoded object snapshot"
            );
            // A concurrent initializer is impossible here: snapshots are only
            // reachable through the owning scope.
            let _ = self.decoded.set(Box::new(value));
        }

        self.decoded
            .get()
            .and_then(|boxed| boxed.downcast_ref::<T>())
            .ok_or_else(|| {
                Error::Scope(ScopeError::new(
                    ScopeErrorKind::SnapshotMismatch,
                    format!(
                        "snapshot was decoded as a different type than {}",
                        std::any::type_name::<T>()
                    ),
                ))
            })
    }

    /// Decode a fresh, owned copy of the snapshot.
    pub fn restore<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.data)?)
    }
}

impl std::fmt::Debug for ObjectSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectSnapshot")
            .field("bytes", &self.data.len())
            .field("taken_at", &self.taken_at)
            .field("decoded", &self.is_decoded())
            .finish()
    }
}

/// Holds one snapshot per tracked entity of a scope frame.
///
/// An entity that did not exist before the frame is registered without a
/// snapshot; its prior state is "absent" and it diffs as entirely new.
#[derive(Debug)]
pub struct ChangeTracker {
    /// Original snapshots by object key.
    snapshots: HashMap<ObjectKey, ObjectSnapshot>,
    /// Tracked objects with no prior state.
    new_objects: HashSet<ObjectKey>,
}

impl ChangeTracker {
    /// Create a new empty change tracker.
    pub fn new() -> Self {
        Self {
            snapshots: HashMap::new(),
            new_objects: HashSet::new(),
        }
    }

    /// Take a snapshot of an object, replacing any previous one.
    #[tracing::instrument(level = "trace", skip(self, obj))]
    pub fn snapshot<T: Serialize>(&mut self, key: ObjectKey, obj: &T) -> Result<()> {
        let snapshot = ObjectSnapshot::capture(obj)?;
        tracing::trace!(
            model = std::any::type_name::<T>(),
            serial = key.serial(),
            snapshot_bytes = snapshot.data().len(),
            "Taking object snapshot"
        );
        self.new_objects.remove(&key);
        self.snapshots.insert(key, snapshot);
        Ok(())
    }

    /// Track an object that has no prior state.
    pub fn mark_new(&mut self, key: ObjectKey) {
        tracing::trace!(serial = key.serial(), "Tracking new object without snapshot");
        self.snapshots.remove(&key);
        self.new_objects.insert(key);
    }

    /// Whether the object was tracked without a prior state.
    pub fn is_new(&self, key: &ObjectKey) -> bool {
        self.new_objects.contains(key)
    }

    /// Whether the object is tracked here, with or without a snapshot.
    pub fn is_tracked(&self, key: &ObjectKey) -> bool {
        self.has_snapshot(key) || self.is_new(key)
    }

    /// Take a snapshot from raw bytes.
    pub fn snapshot_raw(&mut self, key: ObjectKey, data: Vec<u8>) {
        self.new_objects.remove(&key);
        self.snapshots.insert(key, ObjectSnapshot::new(data));
    }

    /// Check if an object has a snapshot.
    pub fn has_snapshot(&self, key: &ObjectKey) -> bool {
        self.snapshots.contains_key(key)
    }

    /// Get the snapshot for an object.
    pub fn get_snapshot(&self, key: &ObjectKey) -> Option<&ObjectSnapshot> {
        self.snapshots.get(key)
    }

    /// The decoded prior state of an object, if it has a snapshot.
    pub fn snapshot_of<T>(&self, key: &ObjectKey) -> Result<Option<&T>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.snapshots
            .get(key)
            .map(ObjectSnapshot::decode::<T>)
            .transpose()
    }

    /// Update the snapshot after a commit, when the object is tracked here.
    /// A new object gains its first snapshot.
    ///
    /// Returns `false` when the object was not tracked here.
    pub fn refresh<T: Serialize>(&mut self, key: ObjectKey, obj: &T) -> Result<bool> {
        if !self.is_tracked(&key) {
            return Ok(false);
        }
        self.snapshot(key, obj)?;
        Ok(true)
    }

    /// Stop tracking an object, returning its snapshot if it had one.
    pub fn discard(&mut self, key: &ObjectKey) -> Option<ObjectSnapshot> {
        self.new_objects.remove(key);
        self.snapshots.remove(key)
    }

    /// Clear all snapshots.
    pub fn clear_all(&mut self) {
        self.snapshots.clear();
        self.new_objects.clear();
    }

    /// Get count of tracked objects.
    pub fn len(&self) -> usize {
        self.snapshots.len() + self.new_objects.len()
    }

    /// Check if tracking any objects.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty() && self.new_objects.is_empty()
    }
}

impl Default for ChangeTracker {
    fn default() -> Self {
        Self::new()
    }
}
