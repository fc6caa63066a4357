//! Node selection in statement-safe order.
//!
//! - INSERT parent-first (a parent row must exist before its children)
//! - UPDATE parent-first (any order works; parent-first keeps it stable)
//! - DELETE child-first (children go before the row they reference)
//!
//! Only leaf-or-object nodes are ever collected: list containers exist to
//! group items and never become a statement themselves.

use crate::change_tree::{ChangeNode, ChangeState, ChangeTree, NodeId};

fn collectable(node: &ChangeNode<'_>) -> bool {
    node.is_leaf() || node.is_object()
}

/// Visit `start` and its descendants, each node before its children.
pub fn parent_first<F>(tree: &ChangeTree<'_>, start: NodeId, pred: F) -> Vec<NodeId>
where
    F: Fn(&ChangeNode<'_>) -> bool,
{
    let mut out = Vec::new();
    let mut stack = vec![start];
    while let Some(id) = stack.pop() {
        let node = tree.node(id);
        if collectable(node) && pred(node) {
            out.push(id);
        }
        // Reverse so children pop in child order.
        stack.extend(node.children.iter().rev().copied());
    }
    out
}

/// Visit `start` and its descendants, each node after all of its children.
pub fn child_first<F>(tree: &ChangeTree<'_>, start: NodeId, pred: F) -> Vec<NodeId>
where
    F: Fn(&ChangeNode<'_>) -> bool,
{
    let mut out = Vec::new();
    visit_child_first(tree, start, &pred, &mut out);
    out
}

fn visit_child_first<F>(tree: &ChangeTree<'_>, id: NodeId, pred: &F, out: &mut Vec<NodeId>)
where
    F: Fn(&ChangeNode<'_>) -> bool,
{
    let node = tree.node(id);
    for child in &node.children {
        visit_child_first(tree, *child, pred, out);
    }
    if collectable(node) && pred(node) {
        out.push(id);
    }
}

/// All nodes in `state`, ordered the way statements for that state must run.
pub fn changes(tree: &ChangeTree<'_>, state: ChangeState) -> Vec<NodeId> {
    let root = tree.root_id();
    match state {
        ChangeState::Deleted => child_first(tree, root, |n| n.state == state),
        ChangeState::New
        | ChangeState::Dirty
        | ChangeState::Clean
        | ChangeState::DirtyPrimaryKey => parent_first(tree, root, |n| n.state == state),
    }
}
