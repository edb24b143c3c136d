//! The expand transaction and node teardown.
//!
//! Expansion validates everything that can fail (mid-points, child geometry,
//! the destination quaterna) before it destroys anything, so a refused
//! expansion leaves the tree as it was. The one exception is mid-points:
//! those created before a later edge failed are kept for the next attempt.

use thiserror::Error;

use super::Surrounding;
use crate::node::{tri_mod, NodeId, Owner, CENTER_CHILD, NUM_NODES_PER_QUATERNA};
use crate::shader::MidPointContext;

/// Why [`Surrounding::expand_node`] refused.
///
/// Running out of reclaimable quaterna is ordinary backpressure; the node
/// may expand on a later tick once scores shift.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ExpandError {
  #[error("node is not an expandable leaf")]
  NotExpandable,
  #[error("node id is stale")]
  StaleNode,
  #[error("no quaterna is available for reclaim")]
  NoReclaimableQuaterna,
  #[error("lowest quaterna outscores the node or has grandchildren")]
  ReplacementNotSuitable,
  #[error("lowest quaterna holds the node or one of its ancestors")]
  WouldReplaceAncestor,
  #[error("mid-point could not be placed")]
  MidPointFailed,
  #[error("child triangle is degenerate")]
  DegenerateChild,
}

impl Surrounding {
  /// Subdivide leaf `id` into four children.
  ///
  /// Uses a spare quaterna while the used count is below target, otherwise
  /// reclaims the lowest-scoring sorted quaterna.
  pub fn expand_node(&mut self, id: NodeId) -> Result<(), ExpandError> {
    let node = self.nodes.get(id).ok_or(ExpandError::StaleNode)?;
    if !node.is_expandable() {
      return Err(ExpandError::NotExpandable);
    }
    let score = node.score;

    if self.quaterna.len() != self.target_num_quaterna {
      let slot = self.quaterna.grow();
      self.nodes.push_block();
      debug_assert_eq!(self.quaterna.get(slot).block(), slot, "spare quaterna out of place");
      if let Err(err) = self.expand_into(id, slot) {
        self.quaterna.shrink();
        self.nodes.pop_blocks(1);
        return Err(err);
      }
      return Ok(());
    }

    let slot = self.quaterna.lowest_sorted().ok_or(ExpandError::NoReclaimableQuaterna)?;
    let replaced = *self.quaterna.get(slot);
    if !(replaced.parent_score < score) || self.has_grandchildren(replaced.block()) {
      return Err(ExpandError::ReplacementNotSuitable);
    }
    if self.nodes.is_self_or_ancestor_in(id, self.nodes.block_id(replaced.block())) {
      return Err(ExpandError::WouldReplaceAncestor);
    }

    self.expand_into(id, slot)?;
    self.quaterna.decrement_sorted();
    Ok(())
  }

  /// Expand `id` into the block of quaterna `slot`.
  fn expand_into(&mut self, id: NodeId, slot: usize) -> Result<(), ExpandError> {
    if !self.init_mid_points(id) {
      return Err(ExpandError::MidPointFailed);
    }

    // Work on copies until it is certain the expansion will go through.
    let children = self.nodes[id]
      .init_child_corners(&self.points)
      .ok_or(ExpandError::DegenerateChild)?;

    let block_index = self.quaterna.get(slot).block();
    if self.quaterna.get(slot).is_in_use() {
      self.deinit_children(block_index);
    }

    let block = self.nodes.block_id(block_index);
    for (lane, child) in children.into_iter().enumerate() {
      debug_assert!(!self.nodes[block.node(lane)].is_in_use(), "overwriting a live node");
      self.nodes[block.node(lane)] = child;
    }
    self.nodes[id].children = Some(block);
    self.init_child_pointers(id);

    let score = self.nodes[id].score;
    self.quaterna.get_mut(slot).parent_score = score;

    // Later passes of this tick compare against these scores.
    if self.lod.is_valid() {
      let scorer = crate::score::NodeScorer::new(&self.lod, self.config.score_coefficient);
      for child in block.nodes() {
        let (score, _) = scorer.score(&self.nodes[child]);
        self.nodes[child].score = score;
      }
    }

    self.changed = true;
    Ok(())
  }

  /// Create every missing mid-point of `id`. Keeps going after a failure so
  /// the edges that did succeed are ready for a later attempt.
  fn init_mid_points(&mut self, id: NodeId) -> bool {
    let Some(polyhedron) = self.nodes.polyhedron_of(id).and_then(|poly| self.polyhedron(poly)) else {
      return false;
    };
    let shape = polyhedron.shape;
    let shader = polyhedron.shader.clone();
    let depth = self.nodes.depth(id);

    let mut complete = true;
    for edge in 0..3 {
      let triplet = self.nodes[id].triple[edge];
      if triplet.mid_point.is_some() {
        continue;
      }
      let Some(cousin) = triplet.cousin else {
        complete = false;
        continue;
      };
      let Some(mid_point) = self.points.create() else {
        complete = false;
        continue;
      };

      let position = shader.init_mid_point(&MidPointContext {
        shape: &shape,
        node: &self.nodes[id],
        cousin: &self.nodes[cousin],
        edge,
        depth,
        points: &self.points,
      });
      let Some(position) = position else {
        self.points.destroy(mid_point);
        complete = false;
        continue;
      };

      self.points[mid_point].pos = position;
      debug_assert!(self.nodes[cousin].triple[edge].mid_point.is_none(), "cousin already has a mid-point");
      self.nodes[id].triple[edge].mid_point = Some(mid_point);
      self.nodes[cousin].triple[edge].mid_point = Some(mid_point);
    }
    complete
  }

  /// Link freshly written children to each other, to their parent, and to
  /// the children of the parent's cousins.
  fn init_child_pointers(&mut self, parent: NodeId) {
    let Some(block) = self.nodes[parent].children else {
      debug_assert!(false, "init_child_pointers on a leaf");
      return;
    };
    let center = block.node(CENTER_CHILD);

    for i in 0..3 {
      let child = block.node(i);
      self.nodes.set_cousin(child, i, center);

      let j = tri_mod(i + 1);
      let k = tri_mod(i + 2);

      // The other two edges run along the parent's edges j and k.
      if let Some(nephews) = self.cousin_children(parent, j) {
        self.nodes.set_cousin(child, j, nephews.node(k));
      }
      if let Some(nephews) = self.cousin_children(parent, k) {
        self.nodes.set_cousin(child, k, nephews.node(j));
      }

      let seed = self.nodes[parent].child_seed(i);
      let node = &mut self.nodes[child];
      node.seed = seed;
      node.owner = Some(Owner::Parent(parent));
    }

    let seed = self.nodes[parent].child_seed(CENTER_CHILD);
    let node = &mut self.nodes[center];
    node.seed = seed;
    node.owner = Some(Owner::Parent(parent));
  }

  fn cousin_children(&self, id: NodeId, edge: usize) -> Option<crate::node::BlockId> {
    let cousin = self.nodes[id].cousin(edge)?;
    self.nodes[cousin].children
  }

  pub(super) fn has_grandchildren(&self, block_index: usize) -> bool {
    self.nodes.block(block_index..block_index + 1).iter().any(|node| node.has_children())
  }

  /// Tear down the four nodes of a block and detach them from their parent.
  pub(super) fn deinit_children(&mut self, block_index: usize) {
    let block = self.nodes.block_id(block_index);
    if let Some(parent) = self.nodes[block.node(0)].parent() {
      debug_assert_eq!(self.nodes[parent].children, Some(block));
      self.nodes[parent].children = None;
    }
    for lane in 0..NUM_NODES_PER_QUATERNA {
      self.deinit_node(block.node(lane));
    }
    self.nodes.bump_generation(block_index);
  }

  /// Collapse `id`'s subtree, if any.
  pub(super) fn collapse_node(&mut self, id: NodeId) {
    if let Some(children) = self.nodes[id].children {
      self.deinit_children(children.index());
    }
  }

  /// Return `id` to the unused state: collapse it, unhook its cousins and
  /// free mid-points nobody else references.
  fn deinit_node(&mut self, id: NodeId) {
    self.collapse_node(id);

    for edge in 0..3 {
      let triplet = self.nodes[id].triple[edge];
      match triplet.cousin {
        Some(cousin) => {
          let mirror = &mut self.nodes[cousin].triple[edge];
          debug_assert_eq!(mirror.cousin, Some(id), "asymmetric cousin link");
          debug_assert_eq!(mirror.mid_point, triplet.mid_point, "cousins disagree on mid-point");
          // The cousin keeps the mid-point.
          mirror.cousin = None;
        }
        None => {
          if let Some(mid_point) = triplet.mid_point {
            self.points.destroy(mid_point);
          }
        }
      }
    }

    self.nodes[id] = Default::default();
  }
}
