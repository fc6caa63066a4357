//! The change tree produced by diffing an entity against its snapshot.
//!
//! Nodes live in an arena owned by [`ChangeTree`]. A node owns its ordered
//! children by index; `parent` is a plain back-index, so ownership stays
//! acyclic. Nodes are stored in pre-order: a parent's id is always lower
//! than its children's.

use sqlwork_core::{Entity, EntityPath, PropertyInfo, PropertyKind, Value};
use std::fmt;

/// Change category of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeState {
    /// Nothing to persist.
    Clean,
    /// Must be inserted.
    New,
    /// Must be updated.
    Dirty,
    /// Must be deleted.
    Deleted,
    /// A key property changed; persisted as an insert of the current object
    /// plus a delete of the old one.
    DirtyPrimaryKey,
}

impl fmt::Display for ChangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeState::Clean => "clean",
            ChangeState::New => "new",
            ChangeState::Dirty => "dirty",
            ChangeState::Deleted => "deleted",
            ChangeState::DirtyPrimaryKey => "dirty primary key",
        };
        f.write_str(name)
    }
}

/// Index of a node in its tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// An entity wrapped by an object node.
#[derive(Clone)]
pub struct EntityRef<'a> {
    pub entity: &'a dyn Entity,
    /// Location under the tracked root. Only entities of the current graph
    /// have one; entities read from the snapshot do not.
    pub path: Option<EntityPath>,
}

impl fmt::Debug for EntityRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRef")
            .field("table", &self.entity.table_name())
            .field("hash", &self.entity.content_hash())
            .field("path", &self.path)
            .finish()
    }
}

/// What a node carries.
#[derive(Debug, Clone)]
pub enum NodeValue<'a> {
    /// Nothing (an unchanged property).
    Empty,
    /// A changed scalar or simple-list value. For a value that was cleared
    /// this is `Value::Null`.
    Scalar(Value),
    /// A trackable entity.
    Object(EntityRef<'a>),
    /// A nested entity list container, with its length.
    Collection(usize),
}

/// One node of the change tree.
#[derive(Debug, Clone)]
pub struct ChangeNode<'a> {
    pub value: NodeValue<'a>,
    pub state: ChangeState,
    /// The property this node represents; `None` for the root and for the
    /// synthetic nodes of a key change.
    pub property: Option<&'static PropertyInfo>,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
    /// Discovery position inside a reconciled list.
    pub index: Option<usize>,
    /// Entity-list properties seen while diffing this object.
    pub list_properties: Vec<&'static str>,
    /// Nested-entity properties seen while diffing this object.
    pub object_properties: Vec<&'static str>,
}

impl<'a> ChangeNode<'a> {
    pub fn property_name(&self) -> Option<&'static str> {
        self.property.map(|p| p.name)
    }

    /// No children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Wraps a trackable entity.
    pub fn is_object(&self) -> bool {
        matches!(self.value, NodeValue::Object(_))
    }

    /// A leaf standing for one scalar or simple-list property.
    pub fn is_simple_leaf(&self) -> bool {
        self.is_leaf() && !self.is_object() && self.property.is_some_and(PropertyInfo::is_simple)
    }

    /// A node wrapping an element of a nested entity list.
    pub fn is_list_item(&self) -> bool {
        self.is_object() && self.property.is_some_and(|p| p.kind == PropertyKind::EntityList)
    }

    /// The wrapped entity, for object nodes.
    pub fn entity(&self) -> Option<&EntityRef<'a>> {
        match &self.value {
            NodeValue::Object(entity) => Some(entity),
            _ => None,
        }
    }

    /// The changed value, for scalar leaves.
    pub fn scalar(&self) -> Option<&Value> {
        match &self.value {
            NodeValue::Scalar(value) => Some(value),
            _ => None,
        }
    }
}

/// Owned node used while the tree is being built.
///
/// The detector assembles drafts recursively and the finished draft is
/// flattened into a [`ChangeTree`].
#[derive(Debug, Clone)]
pub(crate) struct Draft<'a> {
    pub value: NodeValue<'a>,
    pub state: ChangeState,
    pub property: Option<&'static PropertyInfo>,
    pub children: Vec<Draft<'a>>,
    pub index: Option<usize>,
    pub list_properties: Vec<&'static str>,
    pub object_properties: Vec<&'static str>,
}

impl<'a> Draft<'a> {
    pub(crate) fn new(value: NodeValue<'a>, state: ChangeState) -> Self {
        Self {
            value,
            state,
            property: None,
            children: Vec::new(),
            index: None,
            list_properties: Vec::new(),
            object_properties: Vec::new(),
        }
    }

    pub(crate) fn object(
        entity: &'a dyn Entity,
        path: Option<EntityPath>,
        state: ChangeState,
    ) -> Self {
        Self::new(NodeValue::Object(EntityRef { entity, path }), state)
    }

    pub(crate) fn for_property(property: &'static PropertyInfo) -> Self {
        let mut draft = Self::new(NodeValue::Empty, ChangeState::Clean);
        draft.property = Some(property);
        draft
    }
}

/// The result of a diff: an arena of [`ChangeNode`]s with a root.
#[derive(Debug, Clone)]
pub struct ChangeTree<'a> {
    nodes: Vec<ChangeNode<'a>>,
}

impl<'a> ChangeTree<'a> {
    pub(crate) fn from_draft(root: Draft<'a>) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.push(root, None);
        tree
    }

    fn push(&mut self, draft: Draft<'a>, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(ChangeNode {
            value: draft.value,
            state: draft.state,
            property: draft.property,
            children: Vec::with_capacity(draft.children.len()),
            parent,
            index: draft.index,
            list_properties: draft.list_properties,
            object_properties: draft.object_properties,
        });
        for child in draft.children {
            let child_id = self.push(child, Some(id));
            self.nodes[id.0].children.push(child_id);
        }
        id
    }

    pub fn root_id(&self) -> NodeId {
        NodeId(0)
    }

    pub fn root(&self) -> &ChangeNode<'a> {
        &self.nodes[0]
    }

    /// Get a node. Ids come from this tree, so lookups always succeed.
    pub fn node(&self, id: NodeId) -> &ChangeNode<'a> {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&ChangeNode<'a>> {
        self.nodes.get(id.0)
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &ChangeNode<'a>> {
        self.nodes[id.0].children.iter().map(|c| &self.nodes[c.0])
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Ancestors of a node, nearest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), |current| self.parent(*current))
    }

    /// All nodes with their ids, in pre-order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &ChangeNode<'a>)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// A tree whose root has no children carries no changes.
    pub fn is_empty(&self) -> bool {
        self.root().children.is_empty()
    }

    /// Number of nodes in the given state.
    pub fn count(&self, state: ChangeState) -> usize {
        self.nodes.iter().filter(|n| n.state == state).count()
    }
}
