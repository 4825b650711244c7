#![warn(missing_docs)]
//! Replay memory for training agents on LevDoom scenarios.
//!
//! The crate provides [`RecordStore`], a fixed-capacity store of opaque
//! experience records supporting uniform sampling (with a recency bias) and
//! prioritized sampling backed by a sum tree. Everything else in the training
//! pipeline (environments, models, the training loop) talks to the store
//! through [`ExperienceBufferBase`] and [`ReplayBufferBase`].
pub mod error;
pub mod record_store;

mod base;
pub use base::{ExperienceBufferBase, ReplayBufferBase};
pub use error::RecordStoreError;
pub use record_store::{
    Batch, IwScheduler, PerConfig, RecordStore, RecordStoreConfig, SharedRecordStore, StepWindow,
    SumTree,
};
