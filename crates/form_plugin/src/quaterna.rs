//! Quaterna - the unit of allocation and reclaim.
//!
//! A [`Quaterna`] names one four-node block and caches the score of the
//! parent those nodes were grown from. The [`QuaternaBuffer`] is split into
//! three ranges:
//!
//! ```text
//! [0, sorted_end)         used, sorted descending by parent score
//! [sorted_end, used_end)  used, order unknown
//! [used_end, capacity)    unused
//! ```
//!
//! The tail of the sorted prefix is the cheapest quaterna to reclaim.

use rayon::prelude::*;

use crate::node::NUM_NODES_PER_QUATERNA;
use crate::node_buffer::NodeBuffer;

/// Parent score of a quaterna that is not in use.
pub const UNUSED_PARENT_SCORE: f32 = -1.0;

/// Quaterna processed per parallel job when refreshing parent scores.
const UPDATE_CHUNK_SIZE: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quaterna {
  /// Score of the common parent, or [`UNUSED_PARENT_SCORE`].
  pub parent_score: f32,
  /// Index of the node block this quaterna owns.
  pub block: u32,
}

impl Quaterna {
  #[inline]
  pub fn is_in_use(&self) -> bool {
    self.parent_score >= 0.0
  }

  #[inline]
  pub fn block(&self) -> usize {
    self.block as usize
  }
}

#[derive(Debug)]
pub struct QuaternaBuffer {
  slots: Vec<Quaterna>,
  sorted_end: usize,
  used_end: usize,
}

impl QuaternaBuffer {
  /// All slots start unused; slot `i` owns block `i`.
  pub fn new(capacity: usize) -> Self {
    let slots = (0..capacity as u32)
      .map(|block| Quaterna {
        parent_score: UNUSED_PARENT_SCORE,
        block,
      })
      .collect();
    Self {
      slots,
      sorted_end: 0,
      used_end: 0,
    }
  }

  #[inline]
  pub fn capacity(&self) -> usize {
    self.slots.len()
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.used_end
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.used_end == 0
  }

  #[inline]
  pub fn sorted_len(&self) -> usize {
    self.sorted_end
  }

  #[inline]
  pub fn is_fully_sorted(&self) -> bool {
    self.sorted_end == self.used_end
  }

  /// Used slots.
  #[inline]
  pub fn used(&self) -> &[Quaterna] {
    &self.slots[..self.used_end]
  }

  #[inline]
  pub fn get(&self, slot: usize) -> &Quaterna {
    &self.slots[slot]
  }

  #[inline]
  pub(crate) fn get_mut(&mut self, slot: usize) -> &mut Quaterna {
    &mut self.slots[slot]
  }

  #[inline]
  pub(crate) fn slots_mut(&mut self, range: std::ops::Range<usize>) -> &mut [Quaterna] {
    &mut self.slots[range]
  }

  /// Copy each parent's current score into its quaterna. Invalidates the
  /// sorted prefix.
  pub fn update_scores(&mut self, nodes: &NodeBuffer) {
    let refresh = |quaterna: &mut Quaterna| {
      let first = nodes.block_id(quaterna.block()).node(0);
      quaterna.parent_score = match nodes.get(first).and_then(|node| node.parent()) {
        Some(parent) => nodes[parent].score,
        None => UNUSED_PARENT_SCORE,
      };
    };
    let used = &mut self.slots[..self.used_end];
    if used.len() > UPDATE_CHUNK_SIZE {
      used.par_chunks_mut(UPDATE_CHUNK_SIZE).for_each(|chunk| chunk.iter_mut().for_each(&refresh));
    } else {
      used.iter_mut().for_each(&refresh);
    }
    self.sorted_end = 0;
  }

  /// Sort the used range descending by parent score.
  pub fn sort(&mut self) {
    if self.is_fully_sorted() {
      return;
    }
    self.slots[..self.used_end].sort_unstable_by(|a, b| b.parent_score.total_cmp(&a.parent_score));
    self.sorted_end = self.used_end;
  }

  /// Slot of the worst sorted quaterna.
  #[inline]
  pub fn lowest_sorted(&self) -> Option<usize> {
    self.sorted_end.checked_sub(1)
  }

  /// Parent score of the worst sorted quaterna, `f32::MAX` if none.
  #[inline]
  pub fn lowest_sorted_score(&self) -> f32 {
    match self.lowest_sorted() {
      Some(slot) => self.slots[slot].parent_score,
      None => f32::MAX,
    }
  }

  /// Drop the worst quaterna from the sorted prefix after it was consumed.
  #[inline]
  pub fn decrement_sorted(&mut self) {
    debug_assert!(self.sorted_end > 0);
    self.sorted_end -= 1;
  }

  /// Move the used boundary up by one and return the claimed slot.
  pub fn grow(&mut self) -> usize {
    debug_assert!(self.used_end < self.capacity(), "quaterna buffer overflow");
    self.used_end += 1;
    self.used_end - 1
  }

  /// Move the used boundary down by one. Retracts the sorted boundary with it.
  pub fn shrink(&mut self) {
    debug_assert!(self.used_end > 0, "quaterna buffer underflow");
    self.used_end -= 1;
    self.sorted_end = self.sorted_end.min(self.used_end);
  }

  /// Last used slot.
  #[inline]
  pub fn back(&self) -> Option<&Quaterna> {
    self.used().last()
  }

  /// Lowest parent score among used quaterna, 0 if none are used.
  #[inline]
  pub fn min_parent_score(&self) -> f32 {
    self.back().map_or(0.0, |quaterna| quaterna.parent_score)
  }

  /// Nodes owned by the used range.
  #[inline]
  pub fn num_nodes_used(&self) -> usize {
    self.used_end * NUM_NODES_PER_QUATERNA
  }
}

#[cfg(test)]
#[path = "quaterna_test.rs"]
mod quaterna_test;
