//! Change detection between a live entity graph and its snapshot.
//!
//! [`diff`] walks every property of an entity, comparing scalars by value,
//! recursing into nested entities and reconciling nested lists by content
//! identity. The result is a [`ChangeTree`] the statement builder turns into
//! SQL.
//!
//! Key changes are special: an entity whose primary key changed cannot be
//! updated in place without breaking rows that reference it, so the
//! detector replaces its dirty properties with an insert of the current
//! object and a delete of the old one.

use crate::change_tree::{ChangeState, ChangeTree, Draft, NodeValue};
use indexmap::IndexMap;
use sqlwork_core::{
    Entity, EntityPath, Error, PathStep, Property, PropertyInfo, PropertyKind, Result, Value,
};
use std::collections::{HashMap, HashSet};

/// Options for a diff.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffOptions {
    /// Treat everything as new, as in a scope opened for fresh objects.
    pub force_new: bool,
}

impl DiffOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether every node is forced to `New`.
    pub fn force_new(mut self, value: bool) -> Self {
        self.force_new = value;
        self
    }
}

/// Compare `current` against `old` and build the change tree.
///
/// Either side may be absent: no old side means the whole graph is new.
/// Both sides absent is an invalid argument.
#[tracing::instrument(level = "debug", skip_all, fields(force_new = options.force_new))]
pub fn diff<'a>(
    current: Option<&'a dyn Entity>,
    old: Option<&'a dyn Entity>,
    options: &DiffOptions,
) -> Result<ChangeTree<'a>> {
    if current.is_none() && old.is_none() {
        return Err(Error::InvalidArgument(
            "current and old cannot both be absent".to_string(),
        ));
    }

    let mut detector = Detector {
        options: *options,
        visited: HashSet::new(),
    };
    let root = detector.compare_objects(current, old, Some(EntityPath::new()), true);
    let tree = ChangeTree::from_draft(root);

    tracing::debug!(
        root_state = %tree.root().state,
        nodes = tree.len(),
        new = tree.count(ChangeState::New),
        dirty = tree.count(ChangeState::Dirty),
        deleted = tree.count(ChangeState::Deleted),
        "Diff complete"
    );
    Ok(tree)
}

struct Detector {
    options: DiffOptions,
    /// (current, old) identity pairs already compared.
    visited: HashSet<(Identity, Identity)>,
}

/// Address plus table: a nested entity stored at offset zero shares its
/// parent's address.
type Identity = (usize, &'static str);

fn identity(entity: Option<&dyn Entity>) -> Identity {
    entity.map_or((0, ""), |e| {
        (std::ptr::from_ref(e).cast::<()>().addr(), e.table_name())
    })
}

fn scalar_of(property: Option<&Property<'_>>) -> Value {
    match property {
        Some(Property::Scalar(value)) => value.clone(),
        _ => Value::Null,
    }
}

fn entity_of<'a>(property: Option<&Property<'a>>) -> Option<&'a dyn Entity> {
    match property {
        Some(Property::Entity(entity)) => *entity,
        _ => None,
    }
}

fn list_of<'a>(property: Option<&Property<'a>>) -> Vec<&'a dyn Entity> {
    match property {
        Some(Property::List(items)) => items.clone(),
        _ => Vec::new(),
    }
}

fn child_path(path: Option<&EntityPath>, property: &'static str, index: usize) -> Option<EntityPath> {
    path.map(|p| {
        let mut next = p.clone();
        next.push(PathStep { property, index });
        next
    })
}

impl Detector {
    /// A pair already compared in this diff. Revisits are unchanged.
    fn seen(&self, current: Option<&dyn Entity>, old: Option<&dyn Entity>) -> bool {
        let seen = self.visited.contains(&(identity(current), identity(old)));
        if seen {
            tracing::trace!("Entity pair already visited; treating as unchanged");
        }
        seen
    }

    /// Diff one entity pair. `path` locates `current` under the tracked
    /// root and is `None` when the current side is not part of the live
    /// graph.
    fn compare_objects<'a>(
        &mut self,
        current: Option<&'a dyn Entity>,
        old: Option<&'a dyn Entity>,
        path: Option<EntityPath>,
        is_tree_root: bool,
    ) -> Draft<'a> {
        let Some(subject) = current.or(old) else {
            return Draft::new(NodeValue::Empty, ChangeState::Clean);
        };
        let path = if current.is_some() { path } else { None };
        let mut root = Draft::object(subject, path.clone(), ChangeState::Clean);

        if !self.visited.insert((identity(current), identity(old))) {
            tracing::trace!(
                table = subject.table_name(),
                "Entity pair already visited; treating as unchanged"
            );
            return root;
        }

        for property in subject.properties() {
            let current_value = current.and_then(|c| c.property(property.name));
            let old_value = old.and_then(|o| o.property(property.name));
            let current_present = current_value.as_ref().is_some_and(|v| !v.is_absent());
            let old_present = old_value.as_ref().is_some_and(|v| !v.is_absent());
            if !current_present && !old_present {
                continue;
            }

            let mut node = Draft::for_property(property);

            match property.kind {
                PropertyKind::Scalar | PropertyKind::SimpleList => {
                    if self.options.force_new || root.state == ChangeState::DirtyPrimaryKey {
                        continue;
                    }
                    let current_scalar = scalar_of(current_value.as_ref());
                    let old_scalar = scalar_of(old_value.as_ref());
                    let differs = if property.kind == PropertyKind::SimpleList {
                        current_scalar.to_delimited(",") != old_scalar.to_delimited(",")
                    } else {
                        current_scalar != old_scalar
                    };

                    if current.is_some() && old.is_some() && differs {
                        node.value = NodeValue::Scalar(current_scalar);
                        node.state = ChangeState::Dirty;
                    } else if current.is_some() && old.is_none() {
                        node.value = NodeValue::Scalar(current_scalar);
                        node.state = ChangeState::New;
                    }
                }
                PropertyKind::EntityList => {
                    let current_items = list_of(current_value.as_ref());
                    let old_items = list_of(old_value.as_ref());
                    node.value = NodeValue::Collection(current_items.len());
                    node.children = self.diff_list(
                        &current_items,
                        &old_items,
                        path.as_ref(),
                        property,
                    );
                    root.list_properties.push(property.name);
                }
                PropertyKind::Entity => {
                    let nested_current = entity_of(current_value.as_ref());
                    let nested_old = entity_of(old_value.as_ref());
                    root.object_properties.push(property.name);
                    if self.seen(nested_current, nested_old) {
                        continue;
                    }
                    let nested = self.compare_objects(
                        nested_current,
                        nested_old,
                        child_path(path.as_ref(), property.name, 0),
                        false,
                    );
                    // A nested entity that appeared or vanished is a change
                    // even when it carries no property changes of its own.
                    let appeared = nested_current.is_some()
                        && (nested_old.is_none() || self.options.force_new);
                    let vanished = nested_current.is_none() && nested_old.is_some();
                    if !nested.children.is_empty() || appeared || vanished {
                        node.value = nested.value;
                        node.children = nested.children;
                    }
                }
            }

            let produced = node.state != ChangeState::Clean
                || !node.children.is_empty()
                || matches!(node.value, NodeValue::Object(_));
            if !produced {
                continue;
            }

            if node.state == ChangeState::Clean {
                node.state = if current_present && (self.options.force_new || !old_present) {
                    ChangeState::New
                } else if current_present {
                    ChangeState::Dirty
                } else {
                    ChangeState::Deleted
                };
            }

            if node.state == ChangeState::Dirty && property.primary_key {
                if let (Some(current), Some(old)) = (current, old) {
                    tracing::debug!(
                        table = subject.table_name(),
                        property = property.name,
                        "Primary key changed; rewriting as insert and delete"
                    );
                    root.children.retain(|n| n.state != ChangeState::Dirty);
                    root.children
                        .push(Draft::object(current, path.clone(), ChangeState::New));
                    root.children
                        .push(Draft::object(old, None, ChangeState::Deleted));
                    root.state = ChangeState::DirtyPrimaryKey;
                    continue;
                }
            }

            tracing::trace!(
                table = subject.table_name(),
                property = property.name,
                state = %node.state,
                "Property changed"
            );
            root.children.push(node);
        }

        root.state = if self.options.force_new && current.is_some() {
            ChangeState::New
        } else if !is_tree_root {
            // Nested roots only lend their children to the wrapping node.
            ChangeState::Clean
        } else if old.is_none() {
            ChangeState::New
        } else if root.state == ChangeState::DirtyPrimaryKey {
            ChangeState::DirtyPrimaryKey
        } else if root.children.is_empty() {
            ChangeState::Clean
        } else {
            ChangeState::Dirty
        };
        root
    }

    /// Reconcile two entity lists by content hash.
    ///
    /// Output order is modifications, then additions, then removals. Within
    /// each group items follow hash-map insertion order: current-list order
    /// for the first two groups, old-list order for removals. Unchanged
    /// items produce no node. Items sharing a hash are matched by
    /// occurrence: the n-th in the current list against the n-th in the old.
    fn diff_list<'a>(
        &mut self,
        current: &[&'a dyn Entity],
        old: &[&'a dyn Entity],
        parent_path: Option<&EntityPath>,
        property: &'static PropertyInfo,
    ) -> Vec<Draft<'a>> {
        let current_map = index_by_hash(current, property);
        let old_map = index_by_hash(old, property);
        let mut changes = Vec::new();

        // Modifications
        for (key, (position, item)) in &current_map {
            let Some((_, old_item)) = old_map.get(key) else {
                continue;
            };
            if self.seen(Some(*item), Some(*old_item)) {
                continue;
            }
            let path = child_path(parent_path, property.name, *position);
            let nested = self.compare_objects(Some(*item), Some(*old_item), path.clone(), false);
            if nested.children.is_empty() && !self.options.force_new {
                continue;
            }
            let state = if self.options.force_new {
                ChangeState::New
            } else {
                ChangeState::Dirty
            };
            let mut node = Draft::object(*item, path, state);
            node.property = Some(property);
            node.index = Some(changes.len());
            node.children = nested.children;
            changes.push(node);
        }

        // Additions
        for (key, (position, item)) in &current_map {
            if old_map.contains_key(key) || self.seen(Some(*item), None) {
                continue;
            }
            let path = child_path(parent_path, property.name, *position);
            let nested = self.compare_objects(Some(*item), None, path.clone(), false);
            let mut node = Draft::object(*item, path, ChangeState::New);
            node.property = Some(property);
            node.index = Some(changes.len());
            node.children = nested.children;
            changes.push(node);
        }

        // Removals
        for (key, (_, item)) in &old_map {
            if current_map.contains_key(key) || self.seen(None, Some(*item)) {
                continue;
            }
            let nested = self.compare_objects(None, Some(*item), None, false);
            let mut node = Draft::object(*item, None, ChangeState::Deleted);
            node.property = Some(property);
            node.index = Some(changes.len());
            node.children = nested.children;
            changes.push(node);
        }

        tracing::trace!(
            property = property.name,
            current = current.len(),
            old = old.len(),
            changes = changes.len(),
            "Reconciled entity list"
        );
        changes
    }
}

/// List identity: the content hash plus how many earlier items in the same
/// list share it. Unsaved entities keyed by `primary_key_hash` all hash
/// alike, so repeated hashes pair up in list order instead of collapsing.
type ListKey = (String, usize);

/// Map list identity to (list position, entity).
fn index_by_hash<'a>(
    items: &[&'a dyn Entity],
    property: &'static PropertyInfo,
) -> IndexMap<ListKey, (usize, &'a dyn Entity)> {
    let mut occurrences: HashMap<String, usize> = HashMap::new();
    let mut map = IndexMap::with_capacity(items.len());
    for (position, item) in items.iter().enumerate() {
        let hash = item.content_hash();
        let seen = occurrences.entry(hash.clone()).or_insert(0);
        if *seen > 0 {
            tracing::debug!(
                property = property.name,
                hash = %hash,
                position,
                occurrence = *seen,
                "Repeated content hash in entity list; pairing by occurrence"
            );
        }
        map.insert((hash, *seen), (position, *item));
        *seen += 1;
    }
    map
}
