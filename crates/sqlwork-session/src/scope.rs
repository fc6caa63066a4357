//! Object scopes: the explicit unit-of-work context.
//!
//! An [`ObjectScope`] owns a stack of frames. Each [`begin`](ObjectScope::begin)
//! pushes a frame with its own snapshot store; [`end`](ObjectScope::end) pops
//! it. Entities enter the innermost frame through [`track`](ObjectScope::track)
//! ([`track_new`](ObjectScope::track_new) for one not yet in the database,
//! [`attach`](ObjectScope::attach) for one an outer frame already tracks)
//! and leave it through commit or rollback.
//!
//! A scope is a plain owned value. It is not shared between threads; two
//! units of work use two scopes.

use crate::ObjectKey;
use crate::change_tracker::ChangeTracker;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlwork_core::{Error, Result, ScopeError, ScopeErrorKind};
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;

/// What a commit does with the changes it finds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeTrackingMode {
    /// Build the batch and execute it.
    #[default]
    Automatic,
    /// Build the batch and log it without executing.
    Debug,
    /// Build nothing; only the snapshot bookkeeping runs.
    Manual,
}

impl ChangeTrackingMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ChangeTrackingMode::Automatic => "automatic",
            ChangeTrackingMode::Debug => "debug",
            ChangeTrackingMode::Manual => "manual",
        }
    }
}

impl fmt::Display for ChangeTrackingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeTrackingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "automatic" | "auto" => Ok(ChangeTrackingMode::Automatic),
            "debug" => Ok(ChangeTrackingMode::Debug),
            "manual" | "off" => Ok(ChangeTrackingMode::Manual),
            other => Err(Error::InvalidArgument(format!(
                "unknown change tracking mode: {other}"
            ))),
        }
    }
}

/// Options for one scope frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopeOptions {
    pub change_tracking: ChangeTrackingMode,
    /// Everything committed in this frame is new: all nodes are inserts.
    pub is_new: bool,
    /// Open a transaction vote that successful commits complete.
    pub transactional: bool,
}

impl ScopeOptions {
    /// Create new default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the change tracking mode (builder pattern).
    #[must_use]
    pub fn change_tracking(mut self, mode: ChangeTrackingMode) -> Self {
        self.change_tracking = mode;
        self
    }

    /// Set the `is_new` option (builder pattern).
    #[must_use]
    pub fn is_new(mut self, value: bool) -> Self {
        self.is_new = value;
        self
    }

    /// Set the `transactional` option (builder pattern).
    #[must_use]
    pub fn transactional(mut self, value: bool) -> Self {
        self.transactional = value;
        self
    }
}

/// Completion vote of the transaction that surrounds a frame.
///
/// The connection owns the real transaction; the vote records whether
/// this frame's work succeeded and may be committed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionVote {
    completed: bool,
}

impl TransactionVote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn complete(&mut self) {
        self.completed = true;
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

/// Lifecycle of a tracked entity within its frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackingState {
    /// Entered the frame, nothing persisted yet.
    Tracked,
    /// A commit is in flight.
    Committing,
    /// Changes persisted and snapshot removed.
    Committed,
    /// Live values restored from the snapshot and snapshot removed.
    RolledBack,
}

/// An entity handed out by [`ObjectScope::track`].
///
/// Derefs to the entity, so it is edited in place; the key ties it to its
/// snapshot.
#[derive(Debug, Clone)]
pub struct Tracked<T> {
    key: ObjectKey,
    value: T,
}

impl<T> Tracked<T> {
    pub fn key(&self) -> ObjectKey {
        self.key
    }

    pub fn inner(&self) -> &T {
        &self.value
    }

    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.value
    }

    /// Stop tracking and take the entity back. Its snapshot, if any,
    /// stays in the scope until the frame ends.
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Tracked<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

/// What ending a frame left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeSummary {
    /// Depth of the frame that ended (1 for the outermost).
    pub depth: usize,
    pub committed: usize,
    pub rolled_back: usize,
    /// Snapshots dropped without a commit or rollback.
    pub discarded: usize,
    /// Whether the transaction vote completed; `None` for a
    /// non-transactional frame.
    pub transaction_completed: Option<bool>,
}

#[derive(Debug)]
pub(crate) struct Frame {
    pub(crate) options: ScopeOptions,
    pub(crate) tracker: ChangeTracker,
    pub(crate) transaction: Option<TransactionVote>,
    pub(crate) states: HashMap<ObjectKey, TrackingState>,
}

/// The unit-of-work context: a stack of scope frames.
#[derive(Debug, Default)]
pub struct ObjectScope {
    pub(crate) frames: Vec<Frame>,
    next_serial: u64,
}

pub(crate) fn no_active_scope(operation: &str) -> Error {
    Error::Scope(ScopeError::new(
        ScopeErrorKind::NoActiveScope,
        format!("{operation} requires an active object scope"),
    ))
}

pub(crate) fn not_tracked(key: ObjectKey) -> Error {
    Error::Scope(ScopeError::new(
        ScopeErrorKind::NotTracked,
        format!(
            "object {} has no snapshot in the current scope",
            key.serial()
        ),
    ))
}

impl ObjectScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a frame. Returns the new depth.
    pub fn begin(&mut self, options: ScopeOptions) -> usize {
        self.frames.push(Frame {
            options,
            tracker: ChangeTracker::new(),
            transaction: options.transactional.then(TransactionVote::new),
            states: HashMap::new(),
        });
        tracing::debug!(
            depth = self.frames.len(),
            mode = %options.change_tracking,
            is_new = options.is_new,
            transactional = options.transactional,
            "Object scope opened"
        );
        self.frames.len()
    }

    /// Close the innermost frame, dropping any snapshots it still holds.
    pub fn end(&mut self) -> Result<ScopeSummary> {
        let depth = self.frames.len();
        let frame = self.frames.pop().ok_or_else(|| no_active_scope("end"))?;

        let count = |state| frame.states.values().filter(|s| **s == state).count();
        let summary = ScopeSummary {
            depth,
            committed: count(TrackingState::Committed),
            rolled_back: count(TrackingState::RolledBack),
            discarded: frame.tracker.len(),
            transaction_completed: frame.transaction.map(|t| t.is_completed()),
        };

        if summary.discarded > 0 {
            tracing::warn!(
                depth,
                discarded = summary.discarded,
                "Object scope ended with uncommitted snapshots"
            );
        }
        if summary.transaction_completed == Some(false) {
            tracing::warn!(depth, "Object scope ended without completing its transaction");
        }
        tracing::debug!(
            depth,
            committed = summary.committed,
            rolled_back = summary.rolled_back,
            "Object scope closed"
        );
        Ok(summary)
    }

    /// Number of open frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// More than one frame is open.
    pub fn is_nested(&self) -> bool {
        self.frames.len() > 1
    }

    /// Options of the innermost frame.
    pub fn options(&self) -> Option<&ScopeOptions> {
        self.frames.last().map(|f| &f.options)
    }

    /// Transaction vote of the innermost frame.
    pub fn transaction(&self) -> Option<&TransactionVote> {
        self.frames.last().and_then(|f| f.transaction.as_ref())
    }

    pub(crate) fn innermost_mut(&mut self, operation: &str) -> Result<&mut Frame> {
        self.frames
            .last_mut()
            .ok_or_else(|| no_active_scope(operation))
    }

    fn innermost(&self, operation: &str) -> Result<&Frame> {
        self.frames.last().ok_or_else(|| no_active_scope(operation))
    }

    /// Start tracking `entity` in the innermost frame.
    pub fn track<T>(&mut self, entity: T) -> Result<Tracked<T>>
    where
        T: Serialize + 'static,
    {
        let key = ObjectKey::of::<T>(self.next_serial);
        let frame = self.innermost_mut("track")?;
        frame.tracker.snapshot(key, &entity)?;
        frame.states.insert(key, TrackingState::Tracked);
        self.next_serial += 1;
        Ok(Tracked { key, value: entity })
    }

    /// Start tracking an entity that does not exist in the database yet.
    ///
    /// No snapshot is taken: the entity's prior state is absent, so its
    /// first commit inserts the whole graph.
    pub fn track_new<T: 'static>(&mut self, entity: T) -> Result<Tracked<T>> {
        let key = ObjectKey::of::<T>(self.next_serial);
        let frame = self.innermost_mut("track")?;
        frame.tracker.mark_new(key);
        frame.states.insert(key, TrackingState::Tracked);
        self.next_serial += 1;
        Ok(Tracked { key, value: entity })
    }

    /// Capture a snapshot of an already tracked entity in the innermost
    /// frame, typically one tracked by an outer frame.
    pub fn attach<T>(&mut self, tracked: &Tracked<T>) -> Result<()>
    where
        T: Serialize,
    {
        let frame = self.innermost_mut("attach")?;
        if frame.tracker.is_tracked(&tracked.key) {
            return Err(Error::Scope(ScopeError::new(
                ScopeErrorKind::AlreadyTracked,
                format!(
                    "object {} already has a snapshot in this scope",
                    tracked.key.serial()
                ),
            )));
        }
        frame.tracker.snapshot(tracked.key, &tracked.value)?;
        frame.states.insert(tracked.key, TrackingState::Tracked);
        Ok(())
    }

    /// The entity as it was when the innermost frame captured it.
    pub fn old<T>(&self, tracked: &Tracked<T>) -> Result<Option<&T>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.innermost("old")?.tracker.snapshot_of::<T>(&tracked.key)
    }

    /// State of a key in the innermost frame that knows it.
    pub fn state_of(&self, key: ObjectKey) -> Option<TrackingState> {
        self.frames
            .iter()
            .rev()
            .find_map(|f| f.states.get(&key).copied())
    }

    /// Overwrite the live entity with its snapshot and drop the snapshot.
    ///
    /// An entity tracked with [`track_new`](Self::track_new) has nothing to
    /// restore; it is released and keeps its live values.
    pub fn rollback<T>(&mut self, tracked: &mut Tracked<T>) -> Result<()>
    where
        T: DeserializeOwned,
    {
        let key = tracked.key;
        let frame = self.innermost_mut("rollback")?;
        if frame.tracker.is_new(&key) {
            frame.tracker.discard(&key);
            frame.states.insert(key, TrackingState::RolledBack);
            tracing::debug!(serial = key.serial(), "Released new object on rollback");
            return Ok(());
        }
        let restored: T = frame
            .tracker
            .get_snapshot(&key)
            .ok_or_else(|| not_tracked(key))?
            .restore()?;
        tracked.value = restored;
        frame.tracker.discard(&key);
        frame.states.insert(key, TrackingState::RolledBack);
        tracing::debug!(serial = key.serial(), "Rolled back tracked object");
        Ok(())
    }
}
