use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use serde::Serialize;

use crate::invariant::NodeBounds;
use crate::traits::NestedSetModel;

/// A node together with its nested children, as handed to service layers.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TreeNode<M> {
    #[serde(flatten)]
    pub node: M,
    pub children: Vec<TreeNode<M>>,
}

impl<M> TreeNode<M> {
    pub fn leaf(node: M) -> Self {
        Self {
            node,
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(TreeNode::len).sum::<usize>()
    }

    /// Always false; a subtree holds at least its own node.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Nest flat rows by range containment.
///
/// Rows whose enclosing range is not part of `rows` become top-level entries, so feeding the
/// descendants of one node yields its children as the roots of the result.
pub fn build_forest<M>(mut rows: Vec<M>) -> Vec<TreeNode<M>>
where
    M: NestedSetModel,
{
    rows.sort_by_key(|row| row.left());

    let mut roots = Vec::new();
    let mut open: Vec<TreeNode<M>> = Vec::new();

    for row in rows {
        while open
            .last()
            .is_some_and(|top| top.node.right() < row.left())
        {
            close(&mut open, &mut roots);
        }
        open.push(TreeNode::leaf(row));
    }
    while !open.is_empty() {
        close(&mut open, &mut roots);
    }

    roots
}

fn close<M>(open: &mut Vec<TreeNode<M>>, roots: &mut Vec<TreeNode<M>>) {
    if let Some(done) = open.pop() {
        match open.last_mut() {
            Some(parent) => parent.children.push(done),
            None => roots.push(done),
        }
    }
}

struct Frame<'a, Id> {
    slot: Option<usize>,
    children: &'a [Id],
    next_child: usize,
}

/// Assign fresh bounds from `(id, parent_id)` links.
///
/// `rows` must already be in the desired sibling order. Returns the renumbered rows in
/// preorder plus the ids that no root reaches (dangling parents or parent cycles).
pub(crate) fn renumber<Id>(rows: &[(Id, Option<Id>)]) -> (Vec<NodeBounds<Id>>, Vec<Id>)
where
    Id: Clone + Eq + Hash,
{
    let mut children: HashMap<Option<Id>, Vec<Id>> = HashMap::new();
    for (id, parent_id) in rows {
        children
            .entry(parent_id.clone())
            .or_default()
            .push(id.clone());
    }

    let mut out: Vec<NodeBounds<Id>> = Vec::with_capacity(rows.len());
    let mut next = 1;
    let mut frames = vec![Frame {
        slot: None,
        children: children.get(&None).map(Vec::as_slice).unwrap_or(&[]),
        next_child: 0,
    }];

    while let Some(frame) = frames.last_mut() {
        let siblings = frame.children;
        match siblings.get(frame.next_child) {
            Some(id) => {
                frame.next_child += 1;
                let parent_id = frame.slot.map(|slot| out[slot].id.clone());
                let depth = frames.len() as i32 - 1;
                out.push(NodeBounds {
                    id: id.clone(),
                    parent_id,
                    left: next,
                    right: 0,
                    depth,
                });
                next += 1;
                frames.push(Frame {
                    slot: Some(out.len() - 1),
                    children: children
                        .get(&Some(id.clone()))
                        .map(Vec::as_slice)
                        .unwrap_or(&[]),
                    next_child: 0,
                });
            }
            None => {
                if let Some(slot) = frame.slot {
                    out[slot].right = next;
                    next += 1;
                }
                frames.pop();
            }
        }
    }

    let reached: HashSet<&Id> = out.iter().map(|row| &row.id).collect();
    let unreachable = rows
        .iter()
        .filter(|(id, _)| !reached.contains(id))
        .map(|(id, _)| id.clone())
        .collect();

    (out, unreachable)
}
