//! Bounded record store with uniform and prioritized sampling.
//!
//! # Key Components
//!
//! - [`RecordStore`]: the store, generic over an opaque record type
//! - [`SumTree`]: array-backed sum tree used in prioritized mode
//! - [`IwScheduler`]: annealing of the importance sampling exponent
//! - [`Batch`]: records sampled from the store, with indices and weights
//! - [`StepWindow`]: grouping of per-step transitions into multi-step records
//!
//! # Examples
//!
//! ```rust
//! use levdoom_memory::{PerConfig, RecordStore, RecordStoreConfig};
//!
//! let config = RecordStoreConfig::default()
//!     .capacity(1000)
//!     .seed(42)
//!     .per_config(Some(PerConfig::default()));
//! let mut store = RecordStore::new(&config)?;
//!
//! for t in 0..64 {
//!     store.add(vec![t as f32; 4])?;
//! }
//!
//! let batch = store.sample(32)?;
//! let ixs = batch.ixs.clone().unwrap();
//! let abs_errors = vec![0.5; ixs.len()];
//! store.batch_update(&ixs, &abs_errors)?;
//! # Ok::<(), anyhow::Error>(())
//! ```
mod base;
mod batch;
mod config;
mod step_window;
pub use base::{IwScheduler, RecordStore, SharedRecordStore, SumTree};
pub use batch::Batch;
pub use config::{PerConfig, RecordStoreConfig};
pub use step_window::StepWindow;
