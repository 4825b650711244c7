//! Configuration of [`RecordStore`](super::RecordStore).
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    default::Default,
    fs::File,
    io::{BufReader, Write},
    path::{Path, PathBuf},
};

/// Configuration for Prioritized Experience Replay (PER).
///
/// # Examples
///
/// ```rust
/// use levdoom_memory::PerConfig;
///
/// let config = PerConfig::default()
///     .alpha(0.6)
///     .beta_0(0.4)
///     .beta_increment(0.001);
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PerConfig {
    /// Added to every absolute error so that no record ends up with zero
    /// probability of being sampled.
    pub epsilon: f32,

    /// Exponent for prioritization. 0 gives uniform sampling, 1 fully greedy
    /// proportional sampling.
    pub alpha: f32,

    /// Initial value of the importance sampling exponent.
    pub beta_0: f32,

    /// Increment of the importance sampling exponent per sampled batch.
    pub beta_increment: f32,

    /// Upper bound of absolute errors, and the priority given to records
    /// added to an empty store.
    pub priority_ceiling: f32,
}

impl Default for PerConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.01,
            alpha: 0.6,
            beta_0: 0.4,
            beta_increment: 0.001,
            priority_ceiling: 1.0,
        }
    }
}

impl PerConfig {
    /// Sets the priority floor `epsilon`.
    pub fn epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Sets the prioritization exponent `alpha`.
    pub fn alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    /// Sets the initial importance sampling exponent `beta_0`.
    pub fn beta_0(mut self, beta_0: f32) -> Self {
        self.beta_0 = beta_0;
        self
    }

    /// Sets the per-batch increment of the importance sampling exponent.
    pub fn beta_increment(mut self, beta_increment: f32) -> Self {
        self.beta_increment = beta_increment;
        self
    }

    /// Sets the clipping bound of absolute errors.
    pub fn priority_ceiling(mut self, priority_ceiling: f32) -> Self {
        self.priority_ceiling = priority_ceiling;
        self
    }
}

/// Configuration of [`RecordStore`](super::RecordStore).
///
/// # Examples
///
/// ```rust
/// use levdoom_memory::{PerConfig, RecordStoreConfig};
///
/// // Uniform sampling with a recency bias of 3 records
/// let config = RecordStoreConfig::default()
///     .capacity(10000)
///     .include_last(3);
///
/// // Prioritized sampling, persisted to disk
/// let config_with_per = RecordStoreConfig::default()
///     .capacity(10000)
///     .persist(true)
///     .path("memory/health_gathering.bin")
///     .per_config(Some(PerConfig::default()));
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct RecordStoreConfig {
    /// Maximum number of records. When full, new records replace the oldest.
    pub capacity: usize,

    /// Number of newest records written to a uniform-mode snapshot.
    pub storage_size: usize,

    /// Number of newest records forced into the tail of every uniform batch.
    pub include_last: usize,

    /// Random seed used for sampling.
    pub seed: u64,

    /// If `false`, [`save`](super::RecordStore::save) does nothing.
    pub persist: bool,

    /// Location of the snapshot.
    pub path: PathBuf,

    /// Interval of saving snapshots in optimization steps, used by
    /// [`maybe_save`](super::RecordStore::maybe_save).
    pub save_interval: usize,

    /// Configuration of prioritized sampling. If `None`, records are sampled
    /// uniformly at random.
    pub per_config: Option<PerConfig>,
}

impl Default for RecordStoreConfig {
    fn default() -> Self {
        Self {
            capacity: 10000,
            storage_size: 5000,
            include_last: 3,
            seed: 42,
            persist: false,
            path: PathBuf::from("replay_memory.bin"),
            save_interval: usize::MAX,
            per_config: None,
        }
    }
}

impl RecordStoreConfig {
    /// Sets the capacity.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the number of records written to a uniform-mode snapshot.
    pub fn storage_size(mut self, storage_size: usize) -> Self {
        self.storage_size = storage_size;
        self
    }

    /// Sets the number of newest records forced into uniform batches.
    pub fn include_last(mut self, include_last: usize) -> Self {
        self.include_last = include_last;
        self
    }

    /// Sets the random seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Enables or disables saving snapshots.
    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    /// Sets the location of the snapshot.
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the interval of saving snapshots in optimization steps.
    pub fn save_interval(mut self, save_interval: usize) -> Self {
        self.save_interval = save_interval;
        self
    }

    /// Sets the configuration of prioritized sampling.
    pub fn per_config(mut self, per_config: Option<PerConfig>) -> Self {
        self.per_config = per_config;
        self
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves the configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
