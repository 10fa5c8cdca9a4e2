//! The learner-facing per-tick batch.

use indexmap::IndexMap;

use drover_core::GlobalIndex;

/// One tick's output: parallel arrays indexed by global agent index.
///
/// Observations are a flat row-major `[total_agents x width]` block.
/// `final_observations` is sparse: an entry exists if and only if the
/// agent's episode ended this tick (terminal-only or terminal-and-
/// reborn). For terminal-only agents the row observation already *is*
/// the terminal observation, so no entry is stored — the sparse map
/// carries exactly the observations that would otherwise be lost to
/// the auto-reset overwrite.
#[derive(Clone, Debug, PartialEq)]
pub struct StepBatch {
    pub(crate) width: usize,
    pub(crate) observations: Vec<f32>,
    pub(crate) rewards: Vec<f32>,
    pub(crate) terminated: Vec<bool>,
    pub(crate) truncated: Vec<bool>,
    pub(crate) final_observations: IndexMap<GlobalIndex, Vec<f32>>,
}

impl StepBatch {
    /// A zero-filled batch: all rewards 0, all flags false, no final
    /// observations.
    pub(crate) fn zeroed(total_agents: usize, width: usize) -> Self {
        Self {
            width,
            observations: vec![0.0; total_agents * width],
            rewards: vec![0.0; total_agents],
            terminated: vec![false; total_agents],
            truncated: vec![false; total_agents],
            final_observations: IndexMap::new(),
        }
    }

    pub(crate) fn observation_row_mut(&mut self, index: GlobalIndex) -> &mut [f32] {
        let start = index.index() * self.width;
        &mut self.observations[start..start + self.width]
    }

    /// Number of agents covered by this batch.
    pub fn total_agents(&self) -> usize {
        self.rewards.len()
    }

    /// Row width of the observation block.
    pub fn observation_width(&self) -> usize {
        self.width
    }

    /// One agent's observation row.
    ///
    /// For a decision agent this is the observation to act on next
    /// tick; for a terminal-and-reborn agent it is the fresh post-reset
    /// observation; for a terminal-only agent it repeats the terminal
    /// observation.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn observation(&self, index: GlobalIndex) -> &[f32] {
        let start = index.index() * self.width;
        &self.observations[start..start + self.width]
    }

    /// The whole observation block, row-major.
    pub fn observations(&self) -> &[f32] {
        &self.observations
    }

    /// Per-agent rewards.
    pub fn rewards(&self) -> &[f32] {
        &self.rewards
    }

    /// One agent's reward.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn reward(&self, index: GlobalIndex) -> f32 {
        self.rewards[index.index()]
    }

    /// Per-agent episode-end flags.
    pub fn terminated(&self) -> &[bool] {
        &self.terminated
    }

    /// Whether one agent's episode ended this tick.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn is_terminated(&self, index: GlobalIndex) -> bool {
        self.terminated[index.index()]
    }

    /// Per-agent truncation flags, passed through from the backends.
    pub fn truncated(&self) -> &[bool] {
        &self.truncated
    }

    /// Whether one agent's episode was truncated this tick.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn is_truncated(&self, index: GlobalIndex) -> bool {
        self.truncated[index.index()]
    }

    /// The preserved pre-reset observation of an agent that terminated
    /// and was reborn this tick, for value bootstrapping. `None` for
    /// decision-only and terminal-only agents.
    pub fn final_observation(&self, index: GlobalIndex) -> Option<&[f32]> {
        self.final_observations.get(&index).map(Vec::as_slice)
    }

    /// Iterate the sparse final observations in write order.
    pub fn final_observations(&self) -> impl Iterator<Item = (GlobalIndex, &[f32])> {
        self.final_observations
            .iter()
            .map(|(g, obs)| (*g, obs.as_slice()))
    }
}
