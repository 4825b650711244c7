//! Replay buffer interfaces.
//!
//! The training pipeline touches replay memory from two sides: the
//! environment-stepping side pushes experience records and the training side
//! samples batches and feeds priority errors back. These traits keep those two
//! views apart so that each side only sees the operations it needs.

use anyhow::Result;

/// Interface for buffers that store experiences from environments.
///
/// # Examples
///
/// ```ignore
/// struct SimpleBuffer<T> {
///     items: Vec<T>,
/// }
///
/// impl<T> ExperienceBufferBase for SimpleBuffer<T> {
///     type Item = T;
///
///     fn push(&mut self, tr: T) -> Result<()> {
///         self.items.push(tr);
///         Ok(())
///     }
///
///     fn len(&self) -> usize {
///         self.items.len()
///     }
/// }
/// ```
pub trait ExperienceBufferBase {
    /// The type of items stored in the buffer.
    ///
    /// The buffer never inspects an item; it is stored, evicted and returned
    /// as a whole.
    type Item;

    /// Pushes a new experience into the buffer.
    fn push(&mut self, tr: Self::Item) -> Result<()>;

    /// Returns the current number of experiences in the buffer.
    fn len(&self) -> usize;

    /// Returns `true` if the buffer holds no experience.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Interface for replay buffers that generate batches for training.
pub trait ReplayBufferBase: Sized {
    /// Configuration parameters for the replay buffer.
    type Config: Clone;

    /// The type of batch generated for training.
    type Batch;

    /// Builds a new replay buffer from the given configuration.
    ///
    /// Fails if the configuration is invalid, e.g. zero capacity.
    fn build(config: &Self::Config) -> Result<Self>;

    /// Samples a batch of `size` experiences for training.
    fn batch(&mut self, size: usize) -> Result<Self::Batch>;

    /// Updates the priorities of experiences in the buffer.
    ///
    /// `ixs` are the indices returned with the most recent batch and
    /// `td_err` the errors computed for them, paired by position. Buffers
    /// without priorities ignore the call.
    fn update_priority(
        &mut self,
        ixs: &Option<Vec<usize>>,
        td_err: &Option<Vec<f32>>,
    ) -> Result<()>;
}
