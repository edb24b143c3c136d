//! SurroundingConfig - capacity and scoring parameters of a surrounding.

use super::budget::ChurnBudget;
use crate::node::NUM_NODES_PER_QUATERNA;
use crate::polyhedron::NUM_ROOT_POINTS;

/// Points reserved per quaterna: two per node, each mid-point being shared
/// by a pair of cousins. Running out only makes expansions fail.
pub const POINTS_PER_QUATERNA: usize = 8;

/// Configuration of a [`Surrounding`](super::Surrounding).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SurroundingConfig {
  /// Capacity in quaterna. Fixed for the life of the surrounding.
  pub max_num_quaterna: usize,

  /// Quaterna target before any regulation.
  pub initial_target_num_quaterna: usize,

  /// Maximum number of polyhedra; reserves their root points.
  pub max_num_polyhedra: usize,

  /// The focus must move this fraction of `min_distance` before nodes are
  /// rescored.
  pub recalc_coefficient: f32,

  /// Fraction of `min_distance` below which score stops growing with
  /// proximity.
  pub score_coefficient: f32,

  /// Nodes per scoring job.
  pub score_chunk_size: usize,

  /// Score nodes on the rayon pool.
  pub parallel_scoring: bool,

  /// Per-tick churn limits.
  pub churn_budget: ChurnBudget,
}

impl SurroundingConfig {
  pub fn new(max_num_quaterna: usize) -> Self {
    Self {
      max_num_quaterna,
      initial_target_num_quaterna: max_num_quaterna,
      ..Default::default()
    }
  }

  pub fn with_initial_target(mut self, target: usize) -> Self {
    self.initial_target_num_quaterna = target;
    self
  }

  pub fn with_max_polyhedra(mut self, max_num_polyhedra: usize) -> Self {
    self.max_num_polyhedra = max_num_polyhedra;
    self
  }

  pub fn with_churn_budget(mut self, budget: ChurnBudget) -> Self {
    self.churn_budget = budget;
    self
  }

  pub fn with_parallel_scoring(mut self, parallel: bool) -> Self {
    self.parallel_scoring = parallel;
    self
  }

  /// Capacity of the point pool.
  #[inline]
  pub fn max_num_points(&self) -> usize {
    self.max_num_quaterna * POINTS_PER_QUATERNA + self.max_num_polyhedra * NUM_ROOT_POINTS
  }

  /// Capacity of the node arena, excluding roots.
  #[inline]
  pub fn max_num_nodes(&self) -> usize {
    self.max_num_quaterna * NUM_NODES_PER_QUATERNA
  }

  /// Squared focus movement that triggers a rescore.
  #[inline]
  pub fn recalc_distance_squared(&self, min_distance: f32) -> f32 {
    let distance = self.recalc_coefficient * min_distance;
    distance * distance
  }
}

impl Default for SurroundingConfig {
  fn default() -> Self {
    Self {
      max_num_quaterna: 16_384,
      initial_target_num_quaterna: 16_384,
      max_num_polyhedra: 8,
      recalc_coefficient: 0.1,
      score_coefficient: 1.5,
      score_chunk_size: 1024,
      parallel_scoring: true,
      churn_budget: ChurnBudget::DEFAULT,
    }
  }
}
