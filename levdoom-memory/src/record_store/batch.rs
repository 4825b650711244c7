//! Batches of records sampled from a [`RecordStore`](super::RecordStore).

/// A sampled batch.
///
/// In prioritized mode, `ixs` holds the leaf index of every sample (to be
/// passed back to [`RecordStore::batch_update`](super::RecordStore::batch_update))
/// and `weight` the importance sampling weights. Both are `None` for uniform
/// batches.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<T> {
    /// Sampled records, or traces of records.
    pub records: Vec<T>,

    /// Leaf indices of the sampled records.
    pub ixs: Option<Vec<usize>>,

    /// Importance sampling weights, divided by the weight of the smallest
    /// priority in the store so that they do not exceed 1. When that priority
    /// is 0 the divisor is `1e-7` instead and weights are far above 1.
    pub weight: Option<Vec<f32>>,
}

impl<T> Batch<T> {
    pub(crate) fn uniform(records: Vec<T>) -> Self {
        Self {
            records,
            ixs: None,
            weight: None,
        }
    }

    /// Decomposes the batch into records, indices and weights.
    pub fn unpack(self) -> (Vec<T>, Option<Vec<usize>>, Option<Vec<f32>>) {
        (self.records, self.ixs, self.weight)
    }

    /// Returns the number of samples in the batch.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the batch holds no sample.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
