//! Persisted B+Tree over a record file.
//!
//! Keys are unique within one tree. Several trees can share a file; each is
//! identified by the slot of its [`RootNode`].

use super::node::{InternalNode, LeafNode, Node, RootNode};
use crate::column::ColumnType;
use crate::error::{CoreError, CoreResult};
use crate::record_file::RecordFile;
use std::cmp::Ordering;
use std::ops::Bound;
use tabula_codec::Value;
use tracing::{debug, warn};

/// Smallest supported order.
pub(crate) const MIN_ORDER: usize = 3;

/// A view of one tree stored in `file`.
pub(crate) struct BPlusTree<'a> {
    file: &'a RecordFile,
    root: u64,
    order: usize,
    column_type: &'a ColumnType,
}

impl<'a> BPlusTree<'a> {
    pub fn new(file: &'a RecordFile, root: u64, order: usize, column_type: &'a ColumnType) -> Self {
        Self {
            file,
            root,
            order,
            column_type,
        }
    }

    /// Allocates a root record and an empty leaf, returning the new tree.
    pub fn create(file: &'a RecordFile, order: usize, column_type: &'a ColumnType) -> CoreResult<Self> {
        let root = file.append_record(&Node::Root(RootNode { first_node: 0 }))?;
        let tree = Self::new(file, root, order, column_type);
        tree.initialize()?;
        Ok(tree)
    }

    /// Attaches an empty first leaf to an already allocated root record.
    pub fn initialize(&self) -> CoreResult<()> {
        let leaf = self.file.append_record(&Node::Leaf(LeafNode::empty(self.root)))?;
        self.set_first_node(leaf)
    }

    pub fn root(&self) -> u64 {
        self.root
    }

    fn min_keys(&self) -> usize {
        self.order / 2
    }

    fn cmp(&self, a: &Value, b: &Value) -> Ordering {
        self.column_type.compare(a, b)
    }

    fn read(&self, address: u64) -> CoreResult<Option<Node>> {
        self.file.read_record::<Node>(address)
    }

    fn write(&self, address: u64, node: &Node) -> CoreResult<()> {
        self.file.update_record(address, node)
    }

    fn read_leaf(&self, address: u64) -> CoreResult<Option<LeafNode>> {
        match self.read(address)? {
            Some(Node::Leaf(leaf)) => Ok(Some(leaf)),
            _ => {
                warn!(root = self.root, node = address, "expected leaf node is missing");
                Ok(None)
            }
        }
    }

    fn read_internal(&self, address: u64) -> CoreResult<Option<InternalNode>> {
        match self.read(address)? {
            Some(Node::Internal(node)) => Ok(Some(node)),
            _ => {
                warn!(root = self.root, node = address, "expected internal node is missing");
                Ok(None)
            }
        }
    }

    /// Read-modify-write of one node; a missing node is logged and skipped.
    fn modify(&self, address: u64, f: impl FnOnce(&mut Node)) -> CoreResult<()> {
        match self.read(address)? {
            Some(mut node) => {
                f(&mut node);
                self.write(address, &node)
            }
            None => {
                warn!(root = self.root, node = address, "node to relink is missing");
                Ok(())
            }
        }
    }

    fn first_node(&self) -> CoreResult<u64> {
        match self.read(self.root)? {
            Some(Node::Root(root)) => Ok(root.first_node),
            _ => Err(CoreError::invalid_format(format!(
                "slot {} is not a tree root",
                self.root
            ))),
        }
    }

    fn set_first_node(&self, first_node: u64) -> CoreResult<()> {
        self.write(self.root, &Node::Root(RootNode { first_node }))
    }

    fn lower_bound(&self, values: &[Value], key: &Value) -> usize {
        values.partition_point(|v| self.cmp(v, key) == Ordering::Less)
    }

    /// Descends to the leaf that holds or would hold `key`.
    ///
    /// Separator keys equal to `key` send the search right.
    fn find_leaf(&self, key: &Value) -> CoreResult<(u64, LeafNode)> {
        let mut address = self.first_node()?;
        loop {
            match self.read(address)? {
                Some(Node::Leaf(leaf)) => return Ok((address, leaf)),
                Some(Node::Internal(node)) => {
                    let index = node
                        .values
                        .partition_point(|v| self.cmp(v, key) != Ordering::Greater);
                    address = node.children[index.min(node.children.len() - 1)];
                }
                _ => {
                    return Err(CoreError::invalid_format(format!(
                        "broken descent at slot {address} under root {}",
                        self.root
                    )))
                }
            }
        }
    }

    fn leftmost_leaf(&self) -> CoreResult<(u64, LeafNode)> {
        let mut address = self.first_node()?;
        loop {
            match self.read(address)? {
                Some(Node::Leaf(leaf)) => return Ok((address, leaf)),
                Some(Node::Internal(node)) if !node.children.is_empty() => {
                    address = node.children[0];
                }
                _ => {
                    return Err(CoreError::invalid_format(format!(
                        "broken descent at slot {address} under root {}",
                        self.root
                    )))
                }
            }
        }
    }

    /// Returns the address paired with `key`.
    pub fn get(&self, key: &Value) -> CoreResult<Option<u64>> {
        let (_, leaf) = self.find_leaf(key)?;
        let pos = self.lower_bound(&leaf.values, key);
        Ok(leaf
            .values
            .get(pos)
            .filter(|v| self.cmp(v, key) == Ordering::Equal)
            .map(|_| leaf.addresses[pos]))
    }

    /// Returns true if the tree holds no keys.
    pub fn is_empty(&self) -> CoreResult<bool> {
        Ok(match self.read(self.first_node()?)? {
            Some(Node::Leaf(leaf)) => leaf.values.is_empty(),
            _ => false,
        })
    }

    /// Key/address pairs within the bounds, in key order.
    pub fn range(&self, lower: Bound<&Value>, upper: Bound<&Value>) -> CoreResult<Vec<(Value, u64)>> {
        let (_, mut leaf) = match lower {
            Bound::Included(key) | Bound::Excluded(key) => self.find_leaf(key)?,
            Bound::Unbounded => self.leftmost_leaf()?,
        };

        let mut entries = Vec::new();
        loop {
            for (value, address) in leaf.values.iter().zip(&leaf.addresses) {
                let below = match lower {
                    Bound::Included(key) => self.cmp(value, key) == Ordering::Less,
                    Bound::Excluded(key) => self.cmp(value, key) != Ordering::Greater,
                    Bound::Unbounded => false,
                };
                if below {
                    continue;
                }
                let above = match upper {
                    Bound::Included(key) => self.cmp(value, key) == Ordering::Greater,
                    Bound::Excluded(key) => self.cmp(value, key) != Ordering::Less,
                    Bound::Unbounded => false,
                };
                if above {
                    return Ok(entries);
                }
                entries.push((value.clone(), *address));
            }

            match leaf.next_leaf {
                Some(next) => match self.read_leaf(next)? {
                    Some(next_leaf) => leaf = next_leaf,
                    None => break,
                },
                None => break,
            }
        }
        Ok(entries)
    }

    fn leaf_fits(&self, leaf: &LeafNode) -> CoreResult<bool> {
        self.file.fits(&leaf.widened())
    }

    fn internal_fits(&self, node: &InternalNode) -> CoreResult<bool> {
        self.file.fits(&node.widened())
    }

    /// Rejects keys too large for one node to hold two of them.
    ///
    /// Every split of an overfull node then has a cut where both halves fit.
    pub fn check_key(&self, key: &Value) -> CoreResult<()> {
        let leaf = LeafNode {
            values: vec![key.clone(), key.clone()],
            addresses: vec![u64::MAX; 2],
            ..LeafNode::empty(self.root)
        };
        let internal = InternalNode {
            root: self.root,
            parent: None,
            values: vec![key.clone(), key.clone()],
            children: vec![u64::MAX; 3],
        };
        if self.leaf_fits(&leaf)? && self.internal_fits(&internal)? {
            Ok(())
        } else {
            Err(CoreError::illegal_argument(format!(
                "{} key is too large for {}-byte index slots",
                key.type_name(),
                self.file.record_length()
            )))
        }
    }

    /// Inserts `key`; returns false without changes if it already exists.
    ///
    /// # Errors
    ///
    /// Fails with an illegal argument, before touching the tree, if the key
    /// cannot fit a node.
    pub fn insert(&self, key: Value, address: u64) -> CoreResult<bool> {
        let (leaf_address, mut leaf) = self.find_leaf(&key)?;
        let pos = self.lower_bound(&leaf.values, &key);
        if leaf
            .values
            .get(pos)
            .is_some_and(|v| self.cmp(v, &key) == Ordering::Equal)
        {
            return Ok(false);
        }
        self.check_key(&key)?;

        leaf.values.insert(pos, key);
        leaf.addresses.insert(pos, address);
        if leaf.values.len() > self.order || !self.leaf_fits(&leaf)? {
            self.split_leaf(leaf_address, leaf)?;
        } else {
            self.write(leaf_address, &Node::Leaf(leaf))?;
        }
        Ok(true)
    }

    /// Picks the cut in `first..=last` nearest `middle` for which `fits`
    /// holds.
    fn choose_cut(
        &self,
        middle: usize,
        first: usize,
        last: usize,
        fits: impl Fn(usize) -> CoreResult<bool>,
    ) -> CoreResult<usize> {
        let mut cuts: Vec<usize> = (first..=last).collect();
        cuts.sort_by_key(|cut| cut.abs_diff(middle));
        for cut in cuts {
            if fits(cut)? {
                return Ok(cut);
            }
        }
        Err(CoreError::invalid_format(format!(
            "no split fits {}-byte slots under root {}",
            self.file.record_length(),
            self.root
        )))
    }

    fn split_leaf(&self, address: u64, mut leaf: LeafNode) -> CoreResult<()> {
        let len = leaf.values.len();
        let mid = self.choose_cut(len / 2, 1, len.saturating_sub(1), |cut| {
            let left = LeafNode {
                values: leaf.values[..cut].to_vec(),
                addresses: leaf.addresses[..cut].to_vec(),
                ..LeafNode::empty(self.root)
            };
            let right = LeafNode {
                values: leaf.values[cut..].to_vec(),
                addresses: leaf.addresses[cut..].to_vec(),
                ..LeafNode::empty(self.root)
            };
            Ok(self.leaf_fits(&left)? && self.leaf_fits(&right)?)
        })?;
        let values = leaf.values.split_off(mid);
        let addresses = leaf.addresses.split_off(mid);
        let separator = values[0].clone();

        let right = LeafNode {
            root: self.root,
            parent: leaf.parent,
            values,
            addresses,
            next_leaf: leaf.next_leaf,
            previous_leaf: Some(address),
        };
        let right_address = self.file.append_record(&Node::Leaf(right))?;
        if let Some(next) = leaf.next_leaf {
            self.modify(next, |node| {
                if let Node::Leaf(next) = node {
                    next.previous_leaf = Some(right_address);
                }
            })?;
        }

        leaf.next_leaf = Some(right_address);
        let parent = leaf.parent;
        self.write(address, &Node::Leaf(leaf))?;
        debug!(root = self.root, left = address, right = right_address, "split leaf");

        self.insert_into_parent(address, parent, separator, right_address)
    }

    fn split_internal(&self, address: u64, mut node: InternalNode) -> CoreResult<()> {
        let len = node.values.len();
        let mid = self.choose_cut(len / 2, 1, len.saturating_sub(2), |cut| {
            let left = InternalNode {
                root: self.root,
                parent: None,
                values: node.values[..cut].to_vec(),
                children: node.children[..=cut].to_vec(),
            };
            let right = InternalNode {
                root: self.root,
                parent: None,
                values: node.values[cut + 1..].to_vec(),
                children: node.children[cut + 1..].to_vec(),
            };
            Ok(self.internal_fits(&left)? && self.internal_fits(&right)?)
        })?;
        let mut values = node.values.split_off(mid);
        let promoted = values.remove(0);
        let children = node.children.split_off(mid + 1);

        let right = InternalNode {
            root: self.root,
            parent: node.parent,
            values,
            children: children.clone(),
        };
        let right_address = self.file.append_record(&Node::Internal(right))?;
        for child in children {
            self.modify(child, |n| n.set_parent(Some(right_address)))?;
        }

        let parent = node.parent;
        self.write(address, &Node::Internal(node))?;
        debug!(root = self.root, left = address, right = right_address, "split internal node");

        self.insert_into_parent(address, parent, promoted, right_address)
    }

    fn insert_into_parent(&self, left: u64, parent: Option<u64>, key: Value, right: u64) -> CoreResult<()> {
        let Some(parent_address) = parent else {
            let top = InternalNode {
                root: self.root,
                parent: None,
                values: vec![key],
                children: vec![left, right],
            };
            let top_address = self.file.append_record(&Node::Internal(top))?;
            self.modify(left, |n| n.set_parent(Some(top_address)))?;
            self.modify(right, |n| n.set_parent(Some(top_address)))?;
            debug!(root = self.root, first_node = top_address, "tree grew");
            return self.set_first_node(top_address);
        };

        let mut node = self.read_internal(parent_address)?.ok_or_else(|| {
            CoreError::invalid_format(format!("parent {parent_address} of {left} is missing"))
        })?;
        let index = node
            .children
            .iter()
            .position(|c| *c == left)
            .ok_or_else(|| {
                CoreError::invalid_format(format!("{left} is not a child of {parent_address}"))
            })?;

        node.values.insert(index, key);
        node.children.insert(index + 1, right);
        if node.values.len() > self.order || !self.internal_fits(&node)? {
            self.split_internal(parent_address, node)
        } else {
            self.write(parent_address, &Node::Internal(node))
        }
    }

    /// Removes `key`, returning its address.
    pub fn remove(&self, key: &Value) -> CoreResult<Option<u64>> {
        let (address, mut leaf) = self.find_leaf(key)?;
        let pos = self.lower_bound(&leaf.values, key);
        if !leaf
            .values
            .get(pos)
            .is_some_and(|v| self.cmp(v, key) == Ordering::Equal)
        {
            return Ok(None);
        }

        leaf.values.remove(pos);
        let removed = leaf.addresses.remove(pos);
        if leaf.parent.is_none() || leaf.values.len() >= self.min_keys() {
            self.write(address, &Node::Leaf(leaf))?;
        } else {
            self.rebalance_leaf(address, leaf)?;
        }
        Ok(Some(removed))
    }

    /// Refills an underfull leaf by borrowing from or merging with a
    /// sibling. Moves that would overflow a slot are skipped; if none is
    /// possible the leaf stays underfull.
    fn rebalance_leaf(&self, address: u64, mut leaf: LeafNode) -> CoreResult<()> {
        let min = self.min_keys();
        let Some(parent_address) = leaf.parent else {
            return self.write(address, &Node::Leaf(leaf));
        };
        let Some(mut parent) = self.read_internal(parent_address)? else {
            return self.write(address, &Node::Leaf(leaf));
        };
        let Some(index) = parent.children.iter().position(|c| *c == address) else {
            warn!(root = self.root, node = address, parent = parent_address, "leaf not linked from parent");
            return self.write(address, &Node::Leaf(leaf));
        };

        let left_address = index.checked_sub(1).map(|i| parent.children[i]);
        let right_address = parent.children.get(index + 1).copied();
        let left = match left_address {
            Some(a) => self.read_leaf(a)?,
            None => None,
        };
        let right = match right_address {
            Some(a) => self.read_leaf(a)?,
            None => None,
        };

        if let (Some(left_address), Some(left)) = (left_address, &left) {
            if left.values.len() > min {
                let mut donor = left.clone();
                let mut taker = leaf.clone();
                let mut above = parent.clone();
                if let (Some(value), Some(addr)) = (donor.values.pop(), donor.addresses.pop()) {
                    taker.values.insert(0, value);
                    taker.addresses.insert(0, addr);
                    above.values[index - 1] = taker.values[0].clone();
                    if self.leaf_fits(&taker)? && self.internal_fits(&above)? {
                        self.write(left_address, &Node::Leaf(donor))?;
                        self.write(address, &Node::Leaf(taker))?;
                        debug!(root = self.root, node = address, "leaf borrowed from left sibling");
                        return self.write(parent_address, &Node::Internal(above));
                    }
                }
            }
        }

        if let (Some(right_address), Some(right)) = (right_address, &right) {
            if right.values.len() > min {
                let mut donor = right.clone();
                let mut taker = leaf.clone();
                let mut above = parent.clone();
                taker.values.push(donor.values.remove(0));
                taker.addresses.push(donor.addresses.remove(0));
                above.values[index] = donor.values[0].clone();
                if self.leaf_fits(&taker)? && self.internal_fits(&above)? {
                    self.write(right_address, &Node::Leaf(donor))?;
                    self.write(address, &Node::Leaf(taker))?;
                    debug!(root = self.root, node = address, "leaf borrowed from right sibling");
                    return self.write(parent_address, &Node::Internal(above));
                }
            }
        }

        if let (Some(left_address), Some(mut left)) = (left_address, left) {
            let mut merged = left.clone();
            merged.values.extend(leaf.values.iter().cloned());
            merged.addresses.extend(leaf.addresses.iter().copied());
            if self.leaf_fits(&merged)? {
                left.values.append(&mut leaf.values);
                left.addresses.append(&mut leaf.addresses);
                left.next_leaf = leaf.next_leaf;
                if let Some(next) = leaf.next_leaf {
                    self.modify(next, |node| {
                        if let Node::Leaf(next) = node {
                            next.previous_leaf = Some(left_address);
                        }
                    })?;
                }
                self.write(left_address, &Node::Leaf(left))?;
                self.file.delete_record(address)?;
                parent.values.remove(index - 1);
                parent.children.remove(index);
                debug!(root = self.root, node = address, into = left_address, "merged leaf into left sibling");
                return self.after_child_removed(parent_address, parent);
            }
        }

        if let (Some(right_address), Some(mut right)) = (right_address, right) {
            let mut merged = leaf.clone();
            merged.values.extend(right.values.iter().cloned());
            merged.addresses.extend(right.addresses.iter().copied());
            if self.leaf_fits(&merged)? {
                leaf.values.append(&mut right.values);
                leaf.addresses.append(&mut right.addresses);
                leaf.next_leaf = right.next_leaf;
                if let Some(next) = right.next_leaf {
                    self.modify(next, |node| {
                        if let Node::Leaf(next) = node {
                            next.previous_leaf = Some(address);
                        }
                    })?;
                }
                self.write(address, &Node::Leaf(leaf))?;
                self.file.delete_record(right_address)?;
                parent.values.remove(index);
                parent.children.remove(index + 1);
                debug!(root = self.root, node = right_address, into = address, "merged right sibling into leaf");
                return self.after_child_removed(parent_address, parent);
            }
        }

        debug!(root = self.root, node = address, keys = leaf.values.len(), "leaf left underfull");
        self.write(address, &Node::Leaf(leaf))
    }

    fn after_child_removed(&self, address: u64, node: InternalNode) -> CoreResult<()> {
        if node.parent.is_none() {
            if node.values.is_empty() {
                if let Some(&child) = node.children.first() {
                    self.modify(child, |n| n.set_parent(None))?;
                    self.set_first_node(child)?;
                    self.file.delete_record(address)?;
                    debug!(root = self.root, first_node = child, "tree height shrank");
                    return Ok(());
                }
            }
            return self.write(address, &Node::Internal(node));
        }

        if node.values.len() >= self.min_keys() {
            self.write(address, &Node::Internal(node))
        } else {
            self.rebalance_internal(address, node)
        }
    }

    fn rebalance_internal(&self, address: u64, mut node: InternalNode) -> CoreResult<()> {
        let min = self.min_keys();
        let Some(parent_address) = node.parent else {
            return self.write(address, &Node::Internal(node));
        };
        let Some(mut parent) = self.read_internal(parent_address)? else {
            return self.write(address, &Node::Internal(node));
        };
        let Some(index) = parent.children.iter().position(|c| *c == address) else {
            warn!(root = self.root, node = address, parent = parent_address, "node not linked from parent");
            return self.write(address, &Node::Internal(node));
        };

        let left_address = index.checked_sub(1).map(|i| parent.children[i]);
        let right_address = parent.children.get(index + 1).copied();
        let left = match left_address {
            Some(a) => self.read_internal(a)?,
            None => None,
        };
        let right = match right_address {
            Some(a) => self.read_internal(a)?,
            None => None,
        };

        if let (Some(left_address), Some(left)) = (left_address, &left) {
            if left.values.len() > min {
                let mut donor = left.clone();
                let mut taker = node.clone();
                let mut above = parent.clone();
                if let (Some(up), Some(child)) = (donor.values.pop(), donor.children.pop()) {
                    let down = std::mem::replace(&mut above.values[index - 1], up);
                    taker.values.insert(0, down);
                    taker.children.insert(0, child);
                    if self.internal_fits(&taker)? && self.internal_fits(&above)? {
                        self.modify(child, |n| n.set_parent(Some(address)))?;
                        self.write(left_address, &Node::Internal(donor))?;
                        self.write(address, &Node::Internal(taker))?;
                        debug!(root = self.root, node = address, "internal node borrowed from left sibling");
                        return self.write(parent_address, &Node::Internal(above));
                    }
                }
            }
        }

        if let (Some(right_address), Some(right)) = (right_address, &right) {
            if right.values.len() > min && !right.children.is_empty() {
                let mut donor = right.clone();
                let mut taker = node.clone();
                let mut above = parent.clone();
                let up = donor.values.remove(0);
                let child = donor.children.remove(0);
                let down = std::mem::replace(&mut above.values[index], up);
                taker.values.push(down);
                taker.children.push(child);
                if self.internal_fits(&taker)? && self.internal_fits(&above)? {
                    self.modify(child, |n| n.set_parent(Some(address)))?;
                    self.write(right_address, &Node::Internal(donor))?;
                    self.write(address, &Node::Internal(taker))?;
                    debug!(root = self.root, node = address, "internal node borrowed from right sibling");
                    return self.write(parent_address, &Node::Internal(above));
                }
            }
        }

        if let (Some(left_address), Some(mut left)) = (left_address, left) {
            let mut merged = left.clone();
            merged.values.push(parent.values[index - 1].clone());
            merged.values.extend(node.values.iter().cloned());
            merged.children.extend(node.children.iter().copied());
            if self.internal_fits(&merged)? {
                let down = parent.values.remove(index - 1);
                parent.children.remove(index);
                left.values.push(down);
                left.values.append(&mut node.values);
                for child in &node.children {
                    self.modify(*child, |n| n.set_parent(Some(left_address)))?;
                }
                left.children.append(&mut node.children);
                self.write(left_address, &Node::Internal(left))?;
                self.file.delete_record(address)?;
                debug!(root = self.root, node = address, into = left_address, "merged internal node into left sibling");
                return self.after_child_removed(parent_address, parent);
            }
        }

        if let (Some(right_address), Some(mut right)) = (right_address, right) {
            let mut merged = node.clone();
            merged.values.push(parent.values[index].clone());
            merged.values.extend(right.values.iter().cloned());
            merged.children.extend(right.children.iter().copied());
            if self.internal_fits(&merged)? {
                let down = parent.values.remove(index);
                parent.children.remove(index + 1);
                node.values.push(down);
                node.values.append(&mut right.values);
                for child in &right.children {
                    self.modify(*child, |n| n.set_parent(Some(address)))?;
                }
                node.children.append(&mut right.children);
                self.write(address, &Node::Internal(node))?;
                self.file.delete_record(right_address)?;
                debug!(root = self.root, node = right_address, into = address, "merged right sibling into internal node");
                return self.after_child_removed(parent_address, parent);
            }
        }

        debug!(root = self.root, node = address, keys = node.values.len(), "internal node left underfull");
        self.write(address, &Node::Internal(node))
    }

    /// Frees every node of the tree, including its root record.
    pub fn destroy(&self) -> CoreResult<()> {
        let mut pending = vec![self.first_node()?];
        while let Some(address) = pending.pop() {
            if let Some(Node::Internal(node)) = self.read(address)? {
                pending.extend(node.children);
            }
            self.file.delete_record(address)?;
        }
        self.file.delete_record(self.root)?;
        Ok(())
    }

    /// Walks the whole tree checking ordering, fan-out, fill, parent links
    /// and the leaf chain. Returns the number of keys.
    #[cfg(test)]
    pub fn check(&self) -> CoreResult<usize> {
        self.walk(true)
    }

    /// Like [`BPlusTree::check`], without the minimum fill that large keys
    /// may prevent.
    #[cfg(test)]
    pub fn check_shape(&self) -> CoreResult<usize> {
        self.walk(false)
    }

    #[cfg(test)]
    fn walk(&self, filled: bool) -> CoreResult<usize> {
        let first = self.first_node()?;
        let mut leaf_depths = Vec::new();
        let mut leaves = Vec::new();
        let mut stack = vec![(first, None::<u64>, 0usize)];
        while let Some((address, parent, depth)) = stack.pop() {
            match self.read(address)? {
                Some(Node::Leaf(leaf)) => {
                    assert_eq!(leaf.parent, parent, "leaf {address} parent");
                    assert_eq!(leaf.values.len(), leaf.addresses.len());
                    assert!(leaf.values.len() <= self.order);
                    if parent.is_some() {
                        assert!(!leaf.values.is_empty(), "leaf {address} empty");
                        if filled {
                            assert!(leaf.values.len() >= self.min_keys(), "leaf {address} underfull");
                        }
                    }
                    leaf_depths.push(depth);
                    leaves.push(address);
                }
                Some(Node::Internal(node)) => {
                    assert_eq!(node.parent, parent, "internal {address} parent");
                    assert_eq!(node.children.len(), node.values.len() + 1);
                    assert!(node.values.len() <= self.order);
                    if filled {
                        assert!(!node.values.is_empty());
                    }
                    for child in node.children.iter().rev() {
                        stack.push((*child, Some(address), depth + 1));
                    }
                }
                other => panic!("unexpected node at {address}: {other:?}"),
            }
        }
        assert!(leaf_depths.windows(2).all(|w| w[0] == w[1]), "unbalanced");

        let entries = self.range(Bound::Unbounded, Bound::Unbounded)?;
        assert!(entries
            .windows(2)
            .all(|w| self.cmp(&w[0].0, &w[1].0) == Ordering::Less));

        let (mut address, mut leaf) = self.leftmost_leaf()?;
        let mut chain = vec![address];
        while let Some(next) = leaf.next_leaf {
            let next_leaf = self.read_leaf(next)?.expect("chained leaf");
            assert_eq!(next_leaf.previous_leaf, Some(address));
            address = next;
            leaf = next_leaf;
            chain.push(address);
        }
        assert_eq!(chain, leaves, "leaf chain order");

        for (key, address) in &entries {
            assert_eq!(self.get(key)?, Some(*address));
        }
        Ok(entries.len())
    }
}
