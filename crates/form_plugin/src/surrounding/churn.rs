//! Tick and churn.
//!
//! ```text
//! tick(lod)
//!   ├─ significance test (skip if the focus barely moved and nothing is pending)
//!   ├─ update_node_scores
//!   ├─ expand roots
//!   └─ repeat { update_quaterna; expand_nodes } until nothing expands
//! ```
//!
//! Candidates are gathered before any of them is expanded. An expansion can
//! reclaim the block a later candidate lives in, so every candidate id is
//! re-validated right before it is acted on.

use super::budget::ChurnStats;
use super::verify::debug_verify;
use super::Surrounding;
use crate::node::NodeId;
use crate::types::LodParameters;

impl Surrounding {
  /// Advance the surface towards `lod`. Returns `true` if the tree changed
  /// since the last generated mesh.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "surrounding::tick"))]
  pub fn tick(&mut self, lod: &LodParameters) -> bool {
    if !lod.is_valid() {
      return self.changed;
    }
    if !self.needs_rescore && !self.is_significant_move(lod) {
      self.last_churn = ChurnStats::default();
      return self.changed;
    }

    self.lod = *lod;
    self.update_node_scores();

    let mut stats = ChurnStats::default();
    self.expand_roots(&mut stats);

    let budget = self.config.churn_budget;
    while budget.can_pass(stats.passes) {
      self.update_quaterna();
      stats.passes += 1;
      if self.expand_nodes(&mut stats) == 0 {
        break;
      }
    }

    // Fresh children may want to expand further; keep working next tick.
    self.needs_rescore = stats.expansions > 0;
    self.last_churn = stats;

    #[cfg(feature = "tracing")]
    tracing::debug!(
      expansions = stats.expansions,
      failed = stats.failed_expansions,
      stale = stats.stale_skipped,
      passes = stats.passes,
      used = self.quaterna.len(),
      "churn"
    );

    debug_verify(self);
    self.changed
  }

  /// `true` if the focus moved far enough since the last rescore.
  fn is_significant_move(&self, lod: &LodParameters) -> bool {
    if !self.lod.is_valid() || self.lod.min_distance != lod.min_distance {
      return true;
    }
    let moved = (lod.center - self.lod.center).length_squared();
    moved >= self.config.recalc_distance_squared(lod.min_distance)
  }

  /// Score a node must beat to claim a quaterna.
  pub fn lowest_sorted_quaterna_score(&self) -> f32 {
    if self.quaterna.len() != self.target_num_quaterna {
      // Spare capacity: anything may expand.
      return f32::MIN_POSITIVE;
    }
    self.quaterna.lowest_sorted_score()
  }

  fn expand_roots(&mut self, stats: &mut ChurnStats) {
    let roots: Vec<_> = self.nodes.root_ids().map(NodeId::Root).collect();
    for root in roots {
      if !self.nodes[root].is_expandable() {
        continue;
      }
      match self.expand_node(root) {
        Ok(()) => stats.expansions += 1,
        Err(_err) => {
          stats.failed_expansions += 1;
          #[cfg(feature = "tracing")]
          tracing::warn!(?root, %_err, "root expansion refused");
        }
      }
    }
  }

  /// One churn pass. Returns the number of expansions.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "surrounding::churn"))]
  pub(super) fn expand_nodes(&mut self, stats: &mut ChurnStats) -> usize {
    let mut threshold = self.lowest_sorted_quaterna_score();
    let mut candidates = self.gather_expandable(threshold);
    // Best first, so a limited budget goes where it matters most.
    candidates.sort_unstable_by(|a, b| b.1.total_cmp(&a.1));

    let budget = self.config.churn_budget;
    let mut expanded = 0;
    for (id, _) in candidates {
      if !budget.can_expand(stats.expansions) {
        break;
      }
      let Some(node) = self.nodes.get(id) else {
        stats.stale_skipped += 1;
        #[cfg(feature = "tracing")]
        tracing::trace!(?id, "skipping reclaimed candidate");
        continue;
      };
      if !node.is_expandable() || !(node.score > threshold) {
        continue;
      }

      match self.expand_node(id) {
        Ok(()) => {
          expanded += 1;
          stats.expansions += 1;
          threshold = self.lowest_sorted_quaterna_score();
        }
        Err(_) => stats.failed_expansions += 1,
      }
    }
    expanded
  }

  /// Expandable nodes of used quaterna that score above `threshold`.
  fn gather_expandable(&self, threshold: f32) -> Vec<(NodeId, f32)> {
    let mut candidates = Vec::new();
    for quaterna in self.quaterna.used() {
      let block = self.nodes.block_id(quaterna.block());
      for id in block.nodes() {
        let node = &self.nodes[id];
        if node.is_in_use() && node.is_expandable() && node.score > threshold {
          candidates.push((id, node.score));
        }
      }
    }
    candidates
  }
}
