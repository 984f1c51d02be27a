//! Structural checks over a whole nested-set table.
//!
//! The checker works on plain [`NodeBounds`] rows so it can be fed from any query (or from a
//! hand-written fixture) and reports every problem it finds instead of stopping at the first.

use std::fmt;

use serde::Serialize;

use crate::traits::NestedSetModel;

/// The tree-relevant columns of one row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NodeBounds<Id> {
    pub id: Id,
    pub parent_id: Option<Id>,
    pub left: i32,
    pub right: i32,
    pub depth: i32,
}

impl<Id> NodeBounds<Id> {
    pub fn of<M>(model: &M) -> Self
    where
        M: NestedSetModel<Id = Id>,
    {
        Self {
            id: model.id(),
            parent_id: model.parent_id(),
            left: model.left(),
            right: model.right(),
            depth: model.depth(),
        }
    }
}

/// One broken invariant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation<Id> {
    /// `left` is not smaller than `right`.
    EmptyRange { id: Id, left: i32, right: i32 },
    /// `right` disagrees with the number of rows nested inside the range.
    Width {
        id: Id,
        expected_right: i32,
        right: i32,
    },
    /// Two ranges partially overlap.
    Overlap { id: Id, other: Id },
    /// `parent_id` does not name the innermost enclosing range.
    Parent {
        id: Id,
        expected: Option<Id>,
        actual: Option<Id>,
    },
    Depth { id: Id, expected: i32, actual: i32 },
    /// The same integer is used as a bound more than once.
    DuplicateBound { value: i32 },
    /// Bounds do not tile `1..=2n`.
    Packing {
        node_count: usize,
        min_left: i32,
        max_right: i32,
    },
}

impl<Id: fmt::Debug> fmt::Display for Violation<Id> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRange { id, left, right } => {
                write!(f, "node {id:?} has empty range [{left}, {right}]")
            }
            Self::Width {
                id,
                expected_right,
                right,
            } => write!(
                f,
                "node {id:?} has right {right}, descendants require {expected_right}"
            ),
            Self::Overlap { id, other } => {
                write!(f, "node {id:?} partially overlaps node {other:?}")
            }
            Self::Parent {
                id,
                expected,
                actual,
            } => write!(
                f,
                "node {id:?} has parent {actual:?}, enclosing range belongs to {expected:?}"
            ),
            Self::Depth {
                id,
                expected,
                actual,
            } => write!(f, "node {id:?} has depth {actual}, expected {expected}"),
            Self::DuplicateBound { value } => write!(f, "bound {value} is used twice"),
            Self::Packing {
                node_count,
                min_left,
                max_right,
            } => write!(
                f,
                "{node_count} nodes span [{min_left}, {max_right}], expected [1, {}]",
                node_count * 2
            ),
        }
    }
}

/// Check every nested-set invariant over a complete table.
pub fn check<Id>(rows: &[NodeBounds<Id>]) -> Vec<Violation<Id>>
where
    Id: Clone + PartialEq,
{
    let mut violations = Vec::new();
    if rows.is_empty() {
        return violations;
    }

    let mut sorted: Vec<&NodeBounds<Id>> = rows.iter().collect();
    sorted.sort_by_key(|row| row.left);
    let lefts: Vec<i32> = sorted.iter().map(|row| row.left).collect();

    let mut stack: Vec<&NodeBounds<Id>> = Vec::new();
    for &row in &sorted {
        if row.left >= row.right {
            violations.push(Violation::EmptyRange {
                id: row.id.clone(),
                left: row.left,
                right: row.right,
            });
        }

        let nested = lefts.partition_point(|l| *l <= row.left)
            ..lefts.partition_point(|l| *l < row.right);
        let expected_right = row.left + 1 + 2 * nested.len() as i32;
        if expected_right != row.right {
            violations.push(Violation::Width {
                id: row.id.clone(),
                expected_right,
                right: row.right,
            });
        }

        while stack.last().is_some_and(|top| top.right < row.left) {
            stack.pop();
        }

        let (expected_parent, expected_depth) = match stack.last() {
            Some(top) => {
                if row.right >= top.right {
                    violations.push(Violation::Overlap {
                        id: row.id.clone(),
                        other: top.id.clone(),
                    });
                }
                (Some(top.id.clone()), top.depth + 1)
            }
            None => (None, 0),
        };

        if row.parent_id != expected_parent {
            violations.push(Violation::Parent {
                id: row.id.clone(),
                expected: expected_parent,
                actual: row.parent_id.clone(),
            });
        }
        if row.depth != expected_depth {
            violations.push(Violation::Depth {
                id: row.id.clone(),
                expected: expected_depth,
                actual: row.depth,
            });
        }

        stack.push(row);
    }

    let mut bounds: Vec<i32> = rows.iter().flat_map(|row| [row.left, row.right]).collect();
    bounds.sort_unstable();
    for pair in bounds.windows(2) {
        if pair[0] == pair[1] {
            violations.push(Violation::DuplicateBound { value: pair[0] });
        }
    }

    let min_left = bounds[0];
    let max_right = bounds[bounds.len() - 1];
    if min_left != 1 || max_right != 2 * rows.len() as i32 {
        violations.push(Violation::Packing {
            node_count: rows.len(),
            min_left,
            max_right,
        });
    }

    violations
}
