//! Change tracking and batched commits for sqlwork.
//!
//! `sqlwork-session` is the **unit-of-work layer**. An entity enters an
//! [`ObjectScope`], which captures a snapshot of it. On commit the scope
//! diffs the live graph against that snapshot, turns the resulting
//! [`ChangeTree`] into one SQL batch, executes it through a
//! [`Connection`](sqlwork_core::Connection) and writes server-generated keys
//! back into the graph.
//!
//! # Pipeline
//!
//! - **Change detection** ([`diff`]): recursive comparison of an entity graph
//!   against its snapshot, with nested lists reconciled by content identity.
//! - **Traversal** ([`traversal`]): parent-first selection of inserts and
//!   updates, child-first selection of deletes.
//! - **Statement building** ([`build_commit`]): inserts, updates and deletes
//!   rendered through a [`SqlDialect`](sqlwork_dialect::SqlDialect), with a
//!   correlation table reporting generated keys.
//! - **Commit** ([`ObjectScope::commit`]): execute, correlate, cascade and
//!   clean up.
//!
//! # Example
//!
//! ```ignore
//! let mut scope = ObjectScope::new();
//! scope.begin(ScopeOptions::default());
//!
//! let mut customer = scope.track(customer)?;
//! customer.name = "Acme Inc".to_string();
//!
//! match scope.commit(&cx, &conn, &mut customer).await {
//!     Outcome::Ok(summary) => tracing::info!(updates = summary.updates, "saved"),
//!     Outcome::Err(e) => return Err(e),
//!     Outcome::Cancelled(_) | Outcome::Panicked(_) => { /* ... */ }
//! }
//! scope.end()?;
//! ```

pub mod cascade;
pub mod change_tracker;
pub mod change_tree;
pub mod commit;
pub mod diff;
pub mod scope;
pub mod statement;
pub mod traversal;

#[cfg(test)]
pub(crate) mod fixtures;

pub use cascade::cascade;
pub use change_tracker::{ChangeTracker, ObjectSnapshot};
pub use change_tree::{ChangeNode, ChangeState, ChangeTree, EntityRef, NodeId, NodeValue};
pub use commit::CommitSummary;
pub use diff::{DiffOptions, diff};
pub use scope::{
    ChangeTrackingMode, ObjectScope, ScopeOptions, ScopeSummary, Tracked, TrackingState,
    TransactionVote,
};
pub use statement::{CommitStatement, CorrelationRow, build_commit};
pub use traversal::{changes, child_first, parent_first};

use std::any::TypeId;

/// Identity of a tracked object inside an [`ObjectScope`].
///
/// Keys are handed out by the scope when an entity starts being tracked;
/// the serial is unique per scope, the type id keeps snapshots of different
/// entity types apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    /// Type identifier for the entity type.
    type_id: TypeId,
    /// Scope-assigned serial number.
    serial: u64,
}

impl ObjectKey {
    /// Create a key from a type and serial.
    pub fn new(type_id: TypeId, serial: u64) -> Self {
        Self { type_id, serial }
    }

    /// Key for an entity of type `T`.
    pub fn of<T: 'static>(serial: u64) -> Self {
        Self::new(TypeId::of::<T>(), serial)
    }

    /// Get the serial number.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Get the type identifier.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }
}
