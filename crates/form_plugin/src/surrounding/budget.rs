//! Rate limiting configuration for the churn loop.
//!
//! Prevents frame spikes from unbounded expansion work by limiting the number
//! of update-then-churn passes and expansions per tick.

/// Rate limiting configuration for churn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ChurnBudget {
	/// Maximum update-then-churn passes per tick (0 = unlimited).
	pub max_passes: usize,
	/// Maximum expansions per tick (0 = unlimited).
	pub max_expansions: usize,
}

impl ChurnBudget {
	/// Default budget: enough passes to settle a moving camera, no cap on
	/// expansions.
	pub const DEFAULT: Self = Self {
		max_passes: 64,
		max_expansions: 0,
	};

	/// Unlimited budget for testing or offline refinement.
	pub const UNLIMITED: Self = Self {
		max_passes: 0,
		max_expansions: 0,
	};

	/// Check if another pass may run.
	#[inline]
	pub fn can_pass(&self, performed: usize) -> bool {
		self.max_passes == 0 || performed < self.max_passes
	}

	/// Check if more expansions can be performed.
	#[inline]
	pub fn can_expand(&self, performed: usize) -> bool {
		self.max_expansions == 0 || performed < self.max_expansions
	}
}

impl Default for ChurnBudget {
	fn default() -> Self {
		Self::DEFAULT
	}
}

/// Statistics from one tick's churn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChurnStats {
	/// Successful expansions, roots included.
	pub expansions: usize,
	/// Candidates whose expansion was attempted and refused.
	pub failed_expansions: usize,
	/// Candidates dropped because an earlier expansion in the same pass
	/// reclaimed the block they lived in.
	pub stale_skipped: usize,
	/// Update-then-churn passes run.
	pub passes: usize,
}

impl ChurnStats {
	/// Total expansion attempts.
	#[inline]
	pub fn attempts(&self) -> usize {
		self.expansions + self.failed_expansions
	}

	/// Fold another tick's counters into these.
	#[inline]
	pub fn accumulate(&mut self, other: &ChurnStats) {
		self.expansions += other.expansions;
		self.failed_expansions += other.failed_expansions;
		self.stale_skipped += other.stale_skipped;
		self.passes += other.passes;
	}
}
