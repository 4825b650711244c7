//! Sum tree for prioritized sampling.
//!
//! The tree is a flat array of `2 * capacity - 1` priorities. Indices
//! `0..capacity - 1` are internal nodes holding the sum of their two children
//! (`2 * ix + 1` and `2 * ix + 2`), indices `capacity - 1..2 * capacity - 1` are
//! leaves. Each leaf owns one record slot; slots are filled as a ring, so once
//! the tree is full the oldest record is overwritten.
use super::snapshot::TreeSnapshot;
use crate::RecordStoreError;
use anyhow::Result;
use segment_tree::{
    ops::{MaxIgnoreNaN, MinIgnoreNaN},
    SegmentPoint,
};

/// Array-backed sum tree over leaf priorities, with one record per leaf.
#[derive(Debug)]
pub struct SumTree<R> {
    capacity: usize,

    /// Internal nodes followed by leaves.
    tree: Vec<f32>,

    /// Record slot of each leaf, `None` until first written.
    data: Vec<Option<R>>,

    /// Next slot to overwrite.
    data_pointer: usize,

    /// Number of slots written at least once.
    n_entries: usize,

    /// Leaf priorities, for minimum queries over the written slots.
    min_tree: SegmentPoint<f32, MinIgnoreNaN>,

    /// Leaf priorities, for maximum queries over the written slots.
    max_tree: SegmentPoint<f32, MaxIgnoreNaN>,
}

impl<R> SumTree<R> {
    /// Creates an empty tree with `capacity` leaves, all of priority 0.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(RecordStoreError::InvalidCapacity.into());
        }

        Ok(Self {
            capacity,
            tree: vec![0f32; 2 * capacity - 1],
            data: (0..capacity).map(|_| None).collect(),
            data_pointer: 0,
            n_entries: 0,
            min_tree: SegmentPoint::build(vec![f32::MAX; capacity], MinIgnoreNaN),
            max_tree: SegmentPoint::build(vec![0f32; capacity], MaxIgnoreNaN),
        })
    }

    /// Writes `record` into the next slot of the ring with the given priority.
    ///
    /// Returns the leaf index of the slot. Once all slots have been written,
    /// this overwrites the oldest record.
    pub fn add(&mut self, priority: f32, record: R) -> Result<usize> {
        check_priority(priority)?;

        let leaf_index = self.data_pointer + self.capacity - 1;
        self.data[self.data_pointer] = Some(record);
        self.set_leaf(leaf_index, priority);

        self.data_pointer = (self.data_pointer + 1) % self.capacity;
        if self.n_entries < self.capacity {
            self.n_entries += 1;
        }

        Ok(leaf_index)
    }

    /// Sets the priority of a leaf and propagates the change to the root.
    pub fn update(&mut self, leaf_index: usize, priority: f32) -> Result<()> {
        if !self.is_leaf(leaf_index) {
            return Err(RecordStoreError::InvalidLeafIndex(leaf_index).into());
        }
        check_priority(priority)?;
        self.set_leaf(leaf_index, priority);
        Ok(())
    }

    /// Internal nodes are only ever changed here, by the leaf's delta.
    fn set_leaf(&mut self, leaf_index: usize, priority: f32) {
        let data_index = leaf_index + 1 - self.capacity;
        self.min_tree.modify(data_index, priority);
        self.max_tree.modify(data_index, priority);

        let change = priority - self.tree[leaf_index];
        self.tree[leaf_index] = priority;

        let mut ix = leaf_index;
        while ix != 0 {
            ix = (ix - 1) / 2;
            self.tree[ix] += change;
        }
    }

    /// Finds the leaf whose prefix-sum interval contains `v`.
    ///
    /// Descends from the root, moving left while `v` is not larger than the
    /// left child's mass and right (after subtracting it) otherwise. Returns
    /// the leaf index, its priority and its record.
    ///
    /// `v` is clamped into `[0, total_priority]` (NaN is read as 0). A subtree
    /// with zero mass is never entered while its sibling has mass, so any draw
    /// on a tree with positive total ends on a leaf of positive priority. On a
    /// tree whose priorities are all 0 the leftmost leaf is returned.
    pub fn get_leaf(&self, v: f32) -> (usize, f32, Option<&R>) {
        let mut v = if v.is_nan() {
            0.0
        } else {
            v.max(0.0).min(self.total_priority())
        };
        let mut ix = 0;

        loop {
            let left = 2 * ix + 1;
            let right = left + 1;

            if left >= self.tree.len() {
                break;
            }

            let (p_left, p_right) = (self.tree[left], self.tree[right]);
            let go_left = if p_left > 0.0 {
                v <= p_left || p_right <= 0.0
            } else {
                p_right <= 0.0
            };

            if go_left {
                ix = left;
            } else {
                v = (v - p_left).max(0.0);
                ix = right;
            }
        }

        let data_index = ix + 1 - self.capacity;
        (ix, self.tree[ix], self.data[data_index].as_ref())
    }

    /// Sum of all leaf priorities, the value at the root.
    #[inline]
    pub fn total_priority(&self) -> f32 {
        self.tree[0]
    }

    /// Maximum priority over written slots, 0 if nothing has been written.
    pub fn max_priority(&self) -> f32 {
        if self.n_entries == 0 {
            0.0
        } else {
            self.max_tree.query(0, self.n_entries)
        }
    }

    /// Minimum priority over written slots.
    pub fn min_priority(&self) -> Option<f32> {
        if self.n_entries == 0 {
            None
        } else {
            Some(self.min_tree.query(0, self.n_entries))
        }
    }

    /// Priority stored at a node of the tree.
    pub fn priority(&self, ix: usize) -> Option<f32> {
        self.tree.get(ix).copied()
    }

    /// Returns `true` if `ix` is a leaf whose slot has been written.
    pub fn is_active(&self, ix: usize) -> bool {
        self.is_leaf(ix) && self.data[ix + 1 - self.capacity].is_some()
    }

    #[inline]
    fn is_leaf(&self, ix: usize) -> bool {
        ix >= self.capacity - 1 && ix < self.tree.len()
    }

    /// Number of slots written at least once, at most `capacity`.
    pub fn len(&self) -> usize {
        self.n_entries
    }

    /// Returns `true` if no record has been added.
    pub fn is_empty(&self) -> bool {
        self.n_entries == 0
    }

    /// Number of leaves.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Next slot to be written.
    pub fn data_pointer(&self) -> usize {
        self.data_pointer
    }

    /// The whole priority array, internal nodes first.
    pub fn priorities(&self) -> &[f32] {
        &self.tree
    }

    /// Record slots, in leaf order.
    pub fn records(&self) -> &[Option<R>] {
        &self.data
    }

    /// Restores a tree verbatim from a snapshot.
    ///
    /// The priority array is taken as is; only the shape is checked.
    pub(crate) fn from_snapshot(snapshot: TreeSnapshot<R>) -> Result<Self> {
        let TreeSnapshot {
            capacity,
            priorities,
            records,
            data_pointer,
            n_entries,
        } = snapshot;

        if capacity == 0 {
            return Err(RecordStoreError::InvalidCapacity.into());
        }
        if priorities.len() != 2 * capacity - 1
            || records.len() != capacity
            || data_pointer >= capacity
            || n_entries > capacity
        {
            return Err(RecordStoreError::Persistence(format!(
                "tree of capacity {} with {} priorities, {} slots, pointer {}, {} entries",
                capacity,
                priorities.len(),
                records.len(),
                data_pointer,
                n_entries
            ))
            .into());
        }

        let leaves = &priorities[capacity - 1..];
        let min_tree = SegmentPoint::build(
            leaves
                .iter()
                .zip(records.iter())
                .map(|(&p, r)| if r.is_some() { p } else { f32::MAX })
                .collect(),
            MinIgnoreNaN,
        );
        let max_tree = SegmentPoint::build(leaves.to_vec(), MaxIgnoreNaN);

        Ok(Self {
            capacity,
            tree: priorities,
            data: records,
            data_pointer,
            n_entries,
            min_tree,
            max_tree,
        })
    }
}

fn check_priority(priority: f32) -> Result<()> {
    if priority.is_finite() && priority >= 0.0 {
        Ok(())
    } else {
        Err(RecordStoreError::InvalidPriority(priority).into())
    }
}

#[cfg(test)]
mod tests {
    use super::SumTree;
    use crate::RecordStoreError;

    fn leaf_sum(tree: &SumTree<usize>) -> f32 {
        tree.priorities()[tree.capacity() - 1..].iter().sum()
    }

    /// Leaves in the order the descent visits them, left to right.
    fn leaves_in_order(tree: &SumTree<usize>, ix: usize, out: &mut Vec<usize>) {
        let left = 2 * ix + 1;
        if left >= tree.priorities().len() {
            out.push(ix);
        } else {
            leaves_in_order(tree, left, out);
            leaves_in_order(tree, left + 1, out);
        }
    }

    #[test]
    fn test_zero_capacity() {
        let err = SumTree::<usize>::new(0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RecordStoreError>(),
            Some(RecordStoreError::InvalidCapacity)
        ));
    }

    #[test]
    fn test_sum_tree_odd() {
        let data = vec![0.5f32, 0.2, 0.8, 0.3, 1.1, 2.5, 3.9];
        let mut sum_tree = SumTree::new(8).unwrap();
        for (ix, &p) in data.iter().enumerate() {
            sum_tree.add(p, ix).unwrap();
        }

        let get = |v: f32| *sum_tree.get_leaf(v).2.unwrap();
        assert_eq!(get(0.0), 0);
        assert_eq!(get(0.4), 0);
        assert_eq!(get(0.5), 0);
        assert_eq!(get(0.6), 1);
        assert_eq!(get(1.2), 2);
        assert_eq!(get(1.6), 3);
        assert_eq!(get(2.0), 4);
        assert_eq!(get(2.8), 4);
        assert_eq!(get(9.0), 6);

        // The unwritten eighth leaf holds no mass.
        assert_eq!(get(sum_tree.total_priority()), 6);
        assert_eq!(sum_tree.len(), 7);
        assert_eq!(sum_tree.data_pointer(), 7);
    }

    #[test]
    fn test_total_tracks_leaves() {
        let mut sum_tree = SumTree::new(5).unwrap();
        for ix in 0..5 {
            sum_tree.add(1.0 + ix as f32, ix).unwrap();
        }
        let updates = [
            (4usize, 0.25f32),
            (8, 3.0),
            (4, 0.25),
            (6, 0.0),
            (5, 7.5),
            (4, 1.0),
        ];
        for &(leaf, p) in updates.iter() {
            sum_tree.update(leaf, p).unwrap();
            assert!(
                (sum_tree.total_priority() - leaf_sum(&sum_tree)).abs() < 1e-5
            );
        }
        for ix in 0..sum_tree.capacity() - 1 {
            let p = sum_tree.priorities();
            assert!((p[ix] - (p[2 * ix + 1] + p[2 * ix + 2])).abs() < 1e-5);
        }
    }

    #[test]
    fn test_repeated_update_is_stable() {
        let mut sum_tree = SumTree::new(4).unwrap();
        for ix in 0..4 {
            sum_tree.add(0.5, ix).unwrap();
        }
        sum_tree.update(5, 0.9).unwrap();
        let before = sum_tree.priorities().to_vec();
        sum_tree.update(5, 0.9).unwrap();
        assert_eq!(before, sum_tree.priorities().to_vec());
    }

    #[test]
    fn test_get_leaf_prefix_sums() {
        // Five leaves sit at two depths, so leaf order differs from slot order.
        let data = vec![0.7f32, 0.1, 1.3, 0.4, 2.2];
        let mut sum_tree = SumTree::new(5).unwrap();
        for (ix, &p) in data.iter().enumerate() {
            sum_tree.add(p, ix).unwrap();
        }

        let mut order = vec![];
        leaves_in_order(&sum_tree, 0, &mut order);
        let total = sum_tree.total_priority();

        let n = 97;
        for k in 0..n {
            let v = total * (k as f32 + 0.5) / n as f32;
            let (leaf, p, _) = sum_tree.get_leaf(v);
            let before: f32 = order
                .iter()
                .take_while(|&&l| l != leaf)
                .map(|&l| sum_tree.priorities()[l])
                .sum();
            assert!(before <= v + 1e-5, "v={} leaf={}", v, leaf);
            assert!(v <= before + p + 1e-5, "v={} leaf={}", v, leaf);
        }
    }

    #[test]
    fn test_zero_mass_subtrees_are_skipped() {
        let mut sum_tree = SumTree::new(4).unwrap();
        for ix in 0..4 {
            sum_tree.add(1.0, ix).unwrap();
        }
        sum_tree.update(3, 0.0).unwrap();
        sum_tree.update(4, 0.0).unwrap();

        let (leaf, p, record) = sum_tree.get_leaf(0.0);
        assert_eq!(leaf, 5);
        assert_eq!(p, 1.0);
        assert_eq!(record, Some(&2));

        // Out-of-range values are clamped.
        assert_eq!(sum_tree.get_leaf(-3.0).0, 5);
        assert_eq!(sum_tree.get_leaf(100.0).0, 6);
        assert_eq!(sum_tree.get_leaf(f32::NAN).0, 5);
    }

    #[test]
    fn test_degenerate_tree() {
        let sum_tree = SumTree::<usize>::new(4).unwrap();
        let (leaf, p, record) = sum_tree.get_leaf(0.0);
        assert_eq!(leaf, 3);
        assert_eq!(p, 0.0);
        assert!(record.is_none());
        assert_eq!(sum_tree.max_priority(), 0.0);
        assert_eq!(sum_tree.min_priority(), None);
    }

    #[test]
    fn test_ring_overwrite() {
        let mut sum_tree = SumTree::new(3).unwrap();
        for ix in 0..5 {
            sum_tree.add(ix as f32 + 1.0, ix).unwrap();
        }
        assert_eq!(sum_tree.len(), 3);
        assert_eq!(sum_tree.data_pointer(), 2);
        let records: Vec<_> = sum_tree.records().iter().map(|r| r.unwrap()).collect();
        assert_eq!(records, vec![3, 4, 2]);
        assert!((sum_tree.total_priority() - 12.0).abs() < 1e-6);
        assert_eq!(sum_tree.max_priority(), 5.0);
        assert_eq!(sum_tree.min_priority(), Some(3.0));
    }

    #[test]
    fn test_invalid_update() {
        let mut sum_tree = SumTree::new(4).unwrap();
        sum_tree.add(1.0, 0usize).unwrap();

        for &ix in [0usize, 2, 7].iter() {
            let err = sum_tree.update(ix, 1.0).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<RecordStoreError>(),
                Some(RecordStoreError::InvalidLeafIndex(_))
            ));
        }
        assert!(sum_tree.update(3, f32::NAN).is_err());
        assert!(sum_tree.update(3, -1.0).is_err());
        assert!(sum_tree.is_active(3));
        assert!(!sum_tree.is_active(4));
    }
}
