//! Node scoring - how much a triangle matters to the current viewpoint.
//!
//! Large, near, front-facing triangles score highest:
//!
//! ```text
//! score = area * exp(normal · dir) / max(dist², floor²)
//! ```
//!
//! where `dir` is the unit vector from the node center towards the focus and
//! `floor = score_coefficient * min_distance`.

use glam::Vec3;
use rayon::prelude::*;

use crate::node::Node;
use crate::types::LodParameters;

/// Scores nodes against one set of LOD parameters.
#[derive(Clone, Copy, Debug)]
pub struct NodeScorer {
  focus: Vec3,
  floor_squared: f32,
  inverse_floor_squared: f32,
}

impl NodeScorer {
  pub fn new(lod: &LodParameters, score_coefficient: f32) -> Self {
    let floor = score_coefficient * lod.min_distance;
    let floor_squared = floor * floor;
    Self {
      focus: lod.center,
      floor_squared,
      inverse_floor_squared: 1.0 / floor_squared,
    }
  }

  /// Score of `node` and the squared distance from its center to the focus.
  #[inline]
  pub fn score(&self, node: &Node) -> (f32, f32) {
    let offset = self.focus - node.center;
    let distance_squared = offset.length_squared();
    let direction = if distance_squared == 0.0 {
      Vec3::X
    } else {
      offset / distance_squared.sqrt()
    };

    let mut score = node.area * node.normal.dot(direction).exp();
    if distance_squared > self.floor_squared {
      score /= distance_squared;
    } else {
      score *= self.inverse_floor_squared;
    }
    (score, distance_squared)
  }
}

/// Leaf statistics gathered while scoring.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoreSummary {
  pub min_leaf_distance_squared: f32,
  pub min_leaf_score: f32,
  pub max_leaf_score: f32,
}

impl ScoreSummary {
  pub const EMPTY: Self = Self {
    min_leaf_distance_squared: f32::MAX,
    min_leaf_score: f32::MAX,
    max_leaf_score: f32::MIN_POSITIVE,
  };

  #[inline]
  fn add_leaf(&mut self, score: f32, distance_squared: f32) {
    self.min_leaf_distance_squared = self.min_leaf_distance_squared.min(distance_squared);
    self.min_leaf_score = self.min_leaf_score.min(score);
    self.max_leaf_score = self.max_leaf_score.max(score);
  }

  #[inline]
  pub fn merge(self, other: Self) -> Self {
    Self {
      min_leaf_distance_squared: self.min_leaf_distance_squared.min(other.min_leaf_distance_squared),
      min_leaf_score: self.min_leaf_score.min(other.min_leaf_score),
      max_leaf_score: self.max_leaf_score.max(other.max_leaf_score),
    }
  }

  /// Leaf score range as `(min, max)`.
  #[inline]
  pub fn leaf_score_range(&self) -> (f32, f32) {
    (self.min_leaf_score, self.max_leaf_score)
  }
}

impl Default for ScoreSummary {
  fn default() -> Self {
    Self::EMPTY
  }
}

fn score_chunk(nodes: &mut [Node], scorer: &NodeScorer) -> ScoreSummary {
  let mut summary = ScoreSummary::EMPTY;
  for node in nodes.iter_mut().filter(|node| node.is_in_use()) {
    let (score, distance_squared) = scorer.score(node);
    node.score = score;
    if node.is_leaf() {
      summary.add_leaf(score, distance_squared);
    }
  }
  summary
}

/// Rescore every in-use node of `nodes`, `chunk_size` nodes per job.
///
/// The summary is reduced only after every chunk has finished, so callers
/// see a consistent snapshot.
pub fn score_nodes(
  nodes: &mut [Node],
  scorer: &NodeScorer,
  chunk_size: usize,
  parallel: bool,
) -> ScoreSummary {
  #[cfg(feature = "tracing")]
  let _span = tracing::info_span!("score_nodes", nodes = nodes.len()).entered();

  let chunk_size = chunk_size.max(1);
  if parallel {
    nodes
      .par_chunks_mut(chunk_size)
      .map(|chunk| score_chunk(chunk, scorer))
      .reduce(|| ScoreSummary::EMPTY, ScoreSummary::merge)
  } else {
    nodes
      .chunks_mut(chunk_size)
      .map(|chunk| score_chunk(chunk, scorer))
      .fold(ScoreSummary::EMPTY, ScoreSummary::merge)
  }
}
