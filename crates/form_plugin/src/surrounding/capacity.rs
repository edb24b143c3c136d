//! Releasing quaterna and keeping the used blocks dense.
//!
//! Node blocks are only ever pushed and popped at the used boundary, so when
//! quaterna are released from the middle of the used range, the blocks that
//! are still alive above the new boundary have to be moved down into the
//! holes first. Moving a block rewrites every link that points into it.

use super::verify::debug_verify;
use super::Surrounding;
use crate::node::{NodeId, Owner, NUM_NODES_PER_QUATERNA};
use crate::quaterna::UNUSED_PARENT_SCORE;

impl Surrounding {
  /// Collapse the subtree below `id` and release its quaterna.
  pub fn collapse_nodes(&mut self, id: NodeId) {
    if !self.nodes.get(id).is_some_and(|node| node.has_children()) {
      return;
    }
    self.collapse_node(id);

    // Torn down quaterna score as unused and sink to the back.
    self.update_quaterna();
    let old_used = self.quaterna.len();
    while self.quaterna.back().is_some_and(|quaterna| !quaterna.is_in_use()) {
      self.quaterna.shrink();
    }
    self.fix_up_decreased_nodes(old_used);

    self.needs_rescore = true;
    self.changed = true;
    debug_verify(self);
  }

  /// Set the quaterna budget, clamped to capacity. Shrinking tears down the
  /// worst quaterna until one with grandchildren is reached; the returned
  /// target may therefore be higher than requested.
  pub fn set_target_num_quaterna(&mut self, target: usize) -> usize {
    let target = target.min(self.capacity());
    if target >= self.quaterna.len() {
      if target != self.target_num_quaterna {
        self.target_num_quaterna = target;
        self.needs_rescore = true;
      }
      return self.target_num_quaterna;
    }
    self.decrease_quaterna(target);
    self.target_num_quaterna
  }

  fn decrease_quaterna(&mut self, target: usize) {
    self.update_quaterna();
    let old_used = self.quaterna.len();

    while self.quaterna.len() > target {
      let Some(back) = self.quaterna.back().copied() else {
        break;
      };
      if back.is_in_use() {
        // Children of this block would be orphaned.
        if self.has_grandchildren(back.block()) {
          break;
        }
        self.deinit_children(back.block());
      }
      let slot = self.quaterna.len() - 1;
      self.quaterna.get_mut(slot).parent_score = UNUSED_PARENT_SCORE;
      self.quaterna.shrink();
    }

    self.target_num_quaterna = self.quaterna.len();
    if self.quaterna.len() != old_used {
      self.fix_up_decreased_nodes(old_used);
      self.needs_rescore = true;
      self.changed = true;
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(
      requested = target,
      reached = self.target_num_quaterna,
      released = old_used - self.target_num_quaterna,
      "decreased quaterna"
    );

    debug_verify(self);
  }

  /// Compact node blocks after the used quaterna range shrank from
  /// `old_used`. Afterwards used quaterna own exactly blocks `[0, used)` and
  /// unused slot `i` owns block `i`.
  fn fix_up_decreased_nodes(&mut self, old_used: usize) {
    let new_used = self.quaterna.len();
    if new_used == old_used {
      return;
    }
    debug_assert_eq!(self.nodes.num_blocks_used(), old_used, "node blocks out of step with quaterna");

    let boundary = new_used;
    let mut cursor = new_used;
    for unused_slot in (new_used..old_used).rev() {
      let dst = self.quaterna.get(unused_slot).block();
      if dst >= boundary {
        continue;
      }
      // A hole below the boundary: fill it from a live block above.
      let src_slot = loop {
        debug_assert!(cursor > 0, "no live block left above the boundary");
        cursor -= 1;
        if self.quaterna.get(cursor).block() >= boundary {
          break cursor;
        }
      };
      let src = self.quaterna.get(src_slot).block();
      self.substitute_children(dst, src);
      self.quaterna.get_mut(src_slot).block = dst as u32;
      self.quaterna.get_mut(unused_slot).block = src as u32;
    }

    self.quaterna.slots_mut(new_used..old_used).sort_unstable_by_key(|quaterna| quaterna.block);
    self.nodes.pop_blocks(old_used - new_used);
  }

  /// Move the live block `src` into the empty block `dst`.
  fn substitute_children(&mut self, dst: usize, src: usize) {
    let src_block = self.nodes.block_id(src);
    let dst_block = self.nodes.block_id(dst);

    if let Some(parent) = self.nodes[src_block.node(0)].parent() {
      self.nodes[parent].children = Some(dst_block);
    }
    // Lane by lane: siblings are each other's cousins, so a lane must be
    // repaired before the next one is copied.
    for lane in 0..NUM_NODES_PER_QUATERNA {
      let node = self.nodes[src_block.node(lane)].clone();
      self.nodes[dst_block.node(lane)] = node;
      self.repair(dst_block.node(lane));
    }

    for node in self.nodes.block_mut(src..src + 1) {
      *node = Default::default();
    }
    self.nodes.bump_generation(src);
  }

  /// Point everything that links to a moved node at its new id.
  fn repair(&mut self, id: NodeId) {
    if let Some(children) = self.nodes[id].children {
      for child in children.nodes() {
        self.nodes[child].owner = Some(Owner::Parent(id));
      }
    }
    for edge in 0..3 {
      if let Some(cousin) = self.nodes[id].triple[edge].cousin {
        self.nodes[cousin].triple[edge].cousin = Some(id);
      }
    }
  }
}
