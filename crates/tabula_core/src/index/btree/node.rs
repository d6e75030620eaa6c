//! B+Tree node records.

use crate::record_file::SlotRecord;
use serde::{Deserialize, Serialize};
use tabula_codec::Value;

/// Stable entry point of a tree.
///
/// The root record never moves; splits and merges only rebind
/// `first_node`, the top node of the tree below it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct RootNode {
    pub first_node: u64,
}

/// Leaf holding sorted keys and their paired addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct LeafNode {
    pub root: u64,
    pub parent: Option<u64>,
    pub values: Vec<Value>,
    pub addresses: Vec<u64>,
    pub next_leaf: Option<u64>,
    pub previous_leaf: Option<u64>,
}

/// Internal node; `children.len() == values.len() + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct InternalNode {
    pub root: u64,
    pub parent: Option<u64>,
    pub values: Vec<Value>,
    pub children: Vec<u64>,
}

/// One node per index file slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum Node {
    Root(RootNode),
    Leaf(LeafNode),
    Internal(InternalNode),
}

impl SlotRecord for Node {}

impl Node {
    pub fn set_parent(&mut self, parent: Option<u64>) {
        match self {
            Self::Root(_) => {}
            Self::Leaf(leaf) => leaf.parent = parent,
            Self::Internal(internal) => internal.parent = parent,
        }
    }
}

impl LeafNode {
    pub fn empty(root: u64) -> Self {
        Self {
            root,
            parent: None,
            values: Vec::new(),
            addresses: Vec::new(),
            next_leaf: None,
            previous_leaf: None,
        }
    }

    /// The leaf with every link at the widest address, so its encoded size
    /// bounds the leaf after any later relink.
    pub fn widened(&self) -> Node {
        Node::Leaf(Self {
            parent: Some(u64::MAX),
            next_leaf: Some(u64::MAX),
            previous_leaf: Some(u64::MAX),
            ..self.clone()
        })
    }
}

impl InternalNode {
    pub fn widened(&self) -> Node {
        Node::Internal(Self {
            parent: Some(u64::MAX),
            ..self.clone()
        })
    }
}
