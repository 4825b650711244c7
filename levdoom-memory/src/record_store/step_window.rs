//! Grouping of per-step transitions into multi-step records.
use std::collections::VecDeque;

/// Collects the most recent transitions of an episode and hands them out as
/// one multi-step record every `n_steps` steps.
///
/// The bundle emitted at step `t` holds the transitions of steps
/// `t - n_steps + 1..=t`, oldest first. At the end of an episode the remaining
/// window, terminal transition included, is emitted and the window starts over,
/// so a bundle never spans two episodes.
///
/// # Examples
///
/// ```rust
/// use levdoom_memory::StepWindow;
///
/// let mut window = StepWindow::new(2);
/// assert_eq!(window.push(0, false), None);
/// assert_eq!(window.push(1, false), Some(vec![0, 1]));
/// assert_eq!(window.push(2, true), Some(vec![1, 2]));
/// assert_eq!(window.push(3, false), None);
/// ```
#[derive(Debug, Clone)]
pub struct StepWindow<T> {
    n_steps: usize,
    steps: VecDeque<T>,
    n_episode_steps: usize,
}

impl<T: Clone> StepWindow<T> {
    /// Creates a window of `n_steps` transitions (at least 1).
    pub fn new(n_steps: usize) -> Self {
        let n_steps = n_steps.max(1);
        Self {
            n_steps,
            steps: VecDeque::with_capacity(n_steps),
            n_episode_steps: 0,
        }
    }

    /// Pushes the transition of one environment step.
    ///
    /// Returns a bundle when `n_steps` steps of the current episode have
    /// accumulated since the last one, or when `is_done` ends the episode.
    pub fn push(&mut self, tr: T, is_done: bool) -> Option<Vec<T>> {
        if self.steps.len() == self.n_steps {
            self.steps.pop_front();
        }
        self.steps.push_back(tr);

        if is_done {
            self.n_episode_steps = 0;
            return Some(self.steps.drain(..).collect());
        }

        self.n_episode_steps += 1;
        if self.n_episode_steps % self.n_steps == 0 {
            Some(self.steps.iter().cloned().collect())
        } else {
            None
        }
    }

    /// Drops the transitions of the current episode.
    pub fn reset(&mut self) {
        self.steps.clear();
        self.n_episode_steps = 0;
    }

    /// Number of transitions per bundle.
    pub fn n_steps(&self) -> usize {
        self.n_steps
    }
}
