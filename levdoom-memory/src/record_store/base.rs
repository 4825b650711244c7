//! Record store with uniform and prioritized sampling.
mod circular_buffer;
mod iw_scheduler;
mod snapshot;
mod sum_tree;
use super::{Batch, PerConfig, RecordStoreConfig};
use crate::{ExperienceBufferBase, RecordStoreError, ReplayBufferBase};
use anyhow::Result;
use circular_buffer::CircularBuffer;
pub use iw_scheduler::IwScheduler;
use log::{debug, info, warn};
use rand::{rngs::StdRng, seq::index, Rng, SeedableRng};
use serde::{de::DeserializeOwned, Serialize};
use snapshot::{Snapshot, SnapshotRef};
use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};
pub use sum_tree::SumTree;

/// Normalizer of importance weights used when the smallest sampling
/// probability is 0.
const MIN_MAX_WEIGHT: f32 = 1e-7;

/// A [`RecordStore`] shared between an environment-stepping thread and a
/// training thread.
pub type SharedRecordStore<R> = Arc<Mutex<RecordStore<R>>>;

/// State for prioritized experience replay.
struct PerState<R> {
    /// Priorities and records.
    sum_tree: SumTree<R>,

    /// Scheduler of the importance sampling exponent.
    iw_scheduler: IwScheduler,

    per_config: PerConfig,
}

impl<R> PerState<R> {
    fn new(capacity: usize, per_config: &PerConfig) -> Result<Self> {
        check_per_config(per_config)?;
        Ok(Self {
            sum_tree: SumTree::new(capacity)?,
            iw_scheduler: IwScheduler::new(per_config.beta_0, per_config.beta_increment),
            per_config: per_config.clone(),
        })
    }

    /// Priority of a record whose absolute error is `abs_err`.
    fn priority(&self, abs_err: f32) -> f32 {
        let c = &self.per_config;
        (abs_err.abs() + c.epsilon)
            .min(c.priority_ceiling)
            .powf(c.alpha)
    }
}

/// Rejects parameters under which [`PerState::priority`] is not a finite,
/// non-negative number.
fn check_per_config(c: &PerConfig) -> Result<()> {
    let msg = if !c.epsilon.is_finite() || c.epsilon < 0.0 {
        format!("epsilon must be non-negative, got {}", c.epsilon)
    } else if !c.alpha.is_finite() || c.alpha < 0.0 {
        format!("alpha must be non-negative, got {}", c.alpha)
    } else if !c.priority_ceiling.is_finite() || c.priority_ceiling <= 0.0 {
        format!("ceiling must be positive, got {}", c.priority_ceiling)
    } else if !c.beta_0.is_finite() || !c.beta_increment.is_finite() {
        String::from("beta_0 and beta_increment must be finite")
    } else {
        return Ok(());
    };
    Err(RecordStoreError::InvalidConfig(msg).into())
}

enum Backing<R> {
    Uniform(CircularBuffer<R>),
    Prioritized(PerState<R>),
}

#[cfg_attr(doc, aquamarine::aquamarine)]
/// A bounded store of experience records.
///
/// Records of type `R` are opaque to the store: they are stored, evicted and
/// cloned into batches, never inspected. Depending on
/// [`RecordStoreConfig::per_config`], the records live in one of two backings:
///
/// * **Uniform**: a FIFO of at most `capacity` records. Batches are drawn
///   uniformly without replacement, after which the last `include_last`
///   positions of the batch are overwritten with the newest records of the
///   store. This recency bias is intended: every fresh record is trained on
///   right away, at the cost of possible duplicates within a batch.
/// * **Prioritized**: a [`SumTree`]. A new record gets the highest priority
///   present in the store (or `priority_ceiling` when there is none), so it is
///   likely to be sampled before its error is known. Batches are drawn by
///   stratified sampling over the priority mass and come with leaf indices and
///   importance weights; the errors computed for them are fed back through
///   [`RecordStore::batch_update`].
///
/// ```mermaid
/// graph LR
///     A[Env thread]-->|add|B[RecordStore]
///     B -->|sample: records, ixs, weights|C[Training thread]
///     C -->|batch_update: ixs, abs errors|B
///     B -->|save / load|D[(Snapshot)]
/// ```
///
/// The store is not synchronized. When it is shared between threads, wrap it
/// in a single lock, see [`RecordStore::into_shared`].
pub struct RecordStore<R> {
    capacity: usize,
    storage_size: usize,
    include_last: usize,
    persist: bool,
    path: PathBuf,
    save_interval: usize,
    rng: StdRng,
    backing: Backing<R>,
}

impl<R> RecordStore<R> {
    /// Builds an empty store.
    ///
    /// Fails with [`RecordStoreError::InvalidCapacity`] if `capacity` is 0 and
    /// with [`RecordStoreError::InvalidConfig`] if a [`PerConfig`] parameter
    /// is negative or not finite.
    pub fn new(config: &RecordStoreConfig) -> Result<Self> {
        let capacity = config.capacity;
        if capacity == 0 {
            return Err(RecordStoreError::InvalidCapacity.into());
        }

        let backing = match &config.per_config {
            Some(per_config) => Backing::Prioritized(PerState::new(capacity, per_config)?),
            None => Backing::Uniform(CircularBuffer::new(capacity)),
        };

        Ok(Self {
            capacity,
            storage_size: config.storage_size,
            include_last: config.include_last,
            persist: config.persist,
            path: config.path.clone(),
            save_interval: config.save_interval,
            rng: StdRng::seed_from_u64(config.seed),
            backing,
        })
    }

    /// Adds one record.
    ///
    /// A record is a unit for the store, e.g. a single transition or a
    /// multi-step window built by [`StepWindow`](super::StepWindow).
    pub fn add(&mut self, record: R) -> Result<()> {
        match &mut self.backing {
            Backing::Uniform(buffer) => {
                buffer.push(record);
            }
            Backing::Prioritized(per_state) => {
                let mut max_p = per_state.sum_tree.max_priority();
                if max_p == 0.0 {
                    max_p = per_state.per_config.priority_ceiling;
                }
                per_state.sum_tree.add(max_p, record)?;
            }
        }
        Ok(())
    }

    /// Updates the priorities of the records at leaf indices `ixs`.
    ///
    /// `abs_errors[i]` is the error computed for `ixs[i]`. The new priority is
    /// `min(|err| + epsilon, priority_ceiling) ^ alpha`. All indices are checked
    /// before any priority changes. In uniform mode there are no priorities and
    /// the call only checks the lengths.
    pub fn batch_update(&mut self, ixs: &[usize], abs_errors: &[f32]) -> Result<()> {
        if ixs.len() != abs_errors.len() {
            return Err(RecordStoreError::LengthMismatch {
                ixs: ixs.len(),
                errors: abs_errors.len(),
            }
            .into());
        }

        let per_state = match &mut self.backing {
            Backing::Uniform(_) => return Ok(()),
            Backing::Prioritized(per_state) => per_state,
        };

        if let Some(&ix) = ixs.iter().find(|&&ix| !per_state.sum_tree.is_active(ix)) {
            return Err(RecordStoreError::InvalidLeafIndex(ix).into());
        }
        if let Some(&err) = abs_errors.iter().find(|err| err.is_nan()) {
            return Err(RecordStoreError::InvalidPriority(err).into());
        }

        let priorities: Vec<f32> = abs_errors
            .iter()
            .map(|&err| per_state.priority(err))
            .collect();
        if let Some(&p) = priorities.iter().find(|p| !p.is_finite() || **p < 0.0) {
            return Err(RecordStoreError::InvalidPriority(p).into());
        }

        for (&ix, &p) in ixs.iter().zip(priorities.iter()) {
            per_state.sum_tree.update(ix, p)?;
        }
        Ok(())
    }

    /// Current number of records.
    pub fn len(&self) -> usize {
        match &self.backing {
            Backing::Uniform(buffer) => buffer.len(),
            Backing::Prioritized(per_state) => per_state.sum_tree.len(),
        }
    }

    /// Returns `true` if the store holds no record.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of records.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` once at least `warmup` records have been collected.
    pub fn is_ready(&self, warmup: usize) -> bool {
        self.len() >= warmup
    }

    /// Returns `true` if the store samples by priority.
    pub fn is_prioritized(&self) -> bool {
        matches!(self.backing, Backing::Prioritized(_))
    }

    /// Current importance sampling exponent, in prioritized mode.
    pub fn beta(&self) -> Option<f32> {
        match &self.backing {
            Backing::Uniform(_) => None,
            Backing::Prioritized(per_state) => Some(per_state.iw_scheduler.beta()),
        }
    }

    /// The sum tree, in prioritized mode.
    pub fn sum_tree(&self) -> Option<&SumTree<R>> {
        match &self.backing {
            Backing::Uniform(_) => None,
            Backing::Prioritized(per_state) => Some(&per_state.sum_tree),
        }
    }

    /// Wraps the store for use by a producer and a consumer thread.
    pub fn into_shared(self) -> SharedRecordStore<R> {
        Arc::new(Mutex::new(self))
    }
}

impl<R: Clone> RecordStore<R> {
    /// Samples `batch_size` records.
    ///
    /// Fails with [`RecordStoreError::InsufficientData`] if the store holds
    /// fewer than `batch_size` records. In uniform mode the records are
    /// distinct draws, except that the last `include_last` positions hold the
    /// newest records of the store. In prioritized mode the batch carries leaf
    /// indices and importance weights, and $\beta$ advances by one step.
    pub fn sample(&mut self, batch_size: usize) -> Result<Batch<R>> {
        let len = self.len();
        if batch_size > len {
            return Err(RecordStoreError::InsufficientData {
                requested: batch_size,
                available: len,
            }
            .into());
        }

        match &mut self.backing {
            Backing::Uniform(buffer) => Ok(Batch::uniform(sample_uniform(
                buffer,
                &mut self.rng,
                batch_size,
                self.include_last,
            ))),
            Backing::Prioritized(per_state) => {
                sample_prioritized(per_state, &mut self.rng, batch_size)
            }
        }
    }

    /// Samples `batch_size` traces of `trace_length` consecutive records.
    ///
    /// Start offsets are distinct and drawn uniformly from
    /// `[0, len - trace_length)`; no recency bias is applied. A
    /// `trace_length` of 0 or 1 falls back to [`RecordStore::sample`], each
    /// record becoming a trace of length 1. Only available in uniform mode for
    /// traces longer than 1.
    pub fn sample_traces(
        &mut self,
        batch_size: usize,
        trace_length: usize,
    ) -> Result<Batch<Vec<R>>> {
        if trace_length <= 1 {
            let (records, ixs, weight) = self.sample(batch_size)?.unpack();
            return Ok(Batch {
                records: records.into_iter().map(|r| vec![r]).collect(),
                ixs,
                weight,
            });
        }

        let buffer = match &self.backing {
            Backing::Uniform(buffer) => buffer,
            Backing::Prioritized(_) => return Err(RecordStoreError::TracesUnsupported.into()),
        };

        let n_starts = buffer.len().saturating_sub(trace_length);
        if batch_size > n_starts {
            return Err(RecordStoreError::InsufficientData {
                requested: batch_size,
                available: n_starts,
            }
            .into());
        }

        let traces = index::sample(&mut self.rng, n_starts, batch_size)
            .into_iter()
            .map(|start| buffer.range(start, trace_length).cloned().collect())
            .collect();
        Ok(Batch::uniform(traces))
    }
}

fn sample_uniform<R: Clone>(
    buffer: &CircularBuffer<R>,
    rng: &mut StdRng,
    batch_size: usize,
    include_last: usize,
) -> Vec<R> {
    let mut records: Vec<R> = index::sample(rng, buffer.len(), batch_size)
        .into_iter()
        .filter_map(|ix| buffer.get(ix).cloned())
        .collect();

    // Recency bias: the tail of the batch is the tail of the buffer.
    let n_last = include_last.min(batch_size);
    let tail = records.len() - n_last;
    for (slot, r) in records[tail..].iter_mut().zip(buffer.suffix(n_last)) {
        *slot = r.clone();
    }
    records
}

fn sample_prioritized<R: Clone>(
    per_state: &mut PerState<R>,
    rng: &mut StdRng,
    batch_size: usize,
) -> Result<Batch<R>> {
    if batch_size == 0 {
        return Ok(Batch {
            records: vec![],
            ixs: Some(vec![]),
            weight: Some(vec![]),
        });
    }

    let sum_tree = &per_state.sum_tree;
    let total = sum_tree.total_priority();
    if !(total > 0.0) {
        return Err(RecordStoreError::InsufficientData {
            requested: batch_size,
            available: 0,
        }
        .into());
    }

    per_state.iw_scheduler.step();
    let beta = per_state.iw_scheduler.beta();
    debug!("Sampling {} records with beta = {}", batch_size, beta);

    let n = batch_size as f32;
    let segment = total / n;
    let p_min = sum_tree.min_priority().unwrap_or(0.0) / total;
    let max_weight = if p_min == 0.0 {
        MIN_MAX_WEIGHT
    } else {
        (p_min * n).powf(-beta)
    };

    let mut records = Vec::with_capacity(batch_size);
    let mut ixs = Vec::with_capacity(batch_size);
    let mut weight = Vec::with_capacity(batch_size);

    for i in 0..batch_size {
        let a = segment * i as f32;
        let b = segment * (i + 1) as f32;
        let v = a + (b - a) * rng.gen::<f32>();

        let (leaf, p, record) = sum_tree.get_leaf(v);
        let record = record.ok_or(RecordStoreError::EmptySlot(leaf))?;
        let prob = p / total;

        records.push(record.clone());
        ixs.push(leaf);
        weight.push((n * prob).powf(-beta) / max_weight);
    }

    Ok(Batch {
        records,
        ixs: Some(ixs),
        weight: Some(weight),
    })
}

impl<R: Serialize + DeserializeOwned> RecordStore<R> {
    /// Writes a snapshot to the configured path.
    ///
    /// Does nothing unless persistence is enabled. Uniform stores write their
    /// newest `storage_size` records; prioritized stores write the whole tree,
    /// whatever `storage_size` is, so the snapshot grows with `capacity`.
    pub fn save(&self) -> Result<()> {
        if !self.persist {
            debug!("Persistence is disabled, snapshot not saved");
            return Ok(());
        }

        let (content, n_records) = match &self.backing {
            Backing::Uniform(buffer) => {
                let records: Vec<&R> = buffer.suffix(self.storage_size).collect();
                let n_records = records.len();
                (SnapshotRef::Records(records), n_records)
            }
            Backing::Prioritized(per_state) => (
                SnapshotRef::tree(&per_state.sum_tree),
                per_state.sum_tree.len(),
            ),
        };
        snapshot::write(&self.path, &content)?;
        info!("Saved {} records in {:?}", n_records, &self.path);
        Ok(())
    }

    /// Replaces the content of the store with the snapshot at the configured path.
    ///
    /// A missing or malformed snapshot is an error; the store is left as it
    /// was. Uniform snapshots larger than `capacity` keep their newest records.
    pub fn load(&mut self) -> Result<()> {
        let content = snapshot::read::<R>(&self.path)?;

        match (&mut self.backing, content) {
            (Backing::Uniform(buffer), Snapshot::Records(records)) => {
                let (restored, n_dropped) = CircularBuffer::from_records(self.capacity, records);
                if n_dropped > 0 {
                    warn!(
                        "Dropped {} records of the snapshot exceeding capacity {}",
                        n_dropped, self.capacity
                    );
                }
                *buffer = restored;
            }
            (Backing::Prioritized(per_state), Snapshot::Tree(tree)) => {
                if tree.capacity != self.capacity {
                    return Err(RecordStoreError::CapacityMismatch {
                        expected: self.capacity,
                        found: tree.capacity,
                    }
                    .into());
                }
                per_state.sum_tree = SumTree::from_snapshot(tree)?;
            }
            _ => return Err(RecordStoreError::ModeMismatch.into()),
        }

        info!("Loaded {} records from {:?}", self.len(), &self.path);
        Ok(())
    }

    /// Saves a snapshot if `opt_steps` is a positive multiple of
    /// `save_interval`.
    ///
    /// A `save_interval` of 0 or `usize::MAX` never saves. Returns `true` if a
    /// snapshot was written.
    pub fn maybe_save(&self, opt_steps: usize) -> Result<bool> {
        let interval = self.save_interval;
        if !self.persist || interval == 0 || interval == usize::MAX || opt_steps == 0 {
            return Ok(false);
        }
        if opt_steps % interval != 0 {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }
}

impl<R> ExperienceBufferBase for RecordStore<R> {
    type Item = R;

    fn push(&mut self, tr: Self::Item) -> Result<()> {
        self.add(tr)
    }

    fn len(&self) -> usize {
        RecordStore::len(self)
    }
}

impl<R: Clone> ReplayBufferBase for RecordStore<R> {
    type Config = RecordStoreConfig;
    type Batch = Batch<R>;

    fn build(config: &Self::Config) -> Result<Self> {
        Self::new(config)
    }

    fn batch(&mut self, size: usize) -> Result<Self::Batch> {
        self.sample(size)
    }

    /// Pairs `ixs` with `td_errs` and updates priorities. `None` counts as
    /// empty.
    fn update_priority(
        &mut self,
        ixs: &Option<Vec<usize>>,
        td_errs: &Option<Vec<f32>>,
    ) -> Result<()> {
        let ixs = ixs.as_deref().unwrap_or(&[]);
        let td_errs = td_errs.as_deref().unwrap_or(&[]);
        self.batch_update(ixs, td_errs)
    }
}
