use super::*;
use crate::node::{NodeId, Owner};

fn buffer_with_scores(scores: &[f32]) -> QuaternaBuffer {
  let mut buffer = QuaternaBuffer::new(scores.len() + 2);
  for &score in scores {
    let slot = buffer.grow();
    buffer.get_mut(slot).parent_score = score;
  }
  buffer
}

// =========================================================================
// Batch 1: Ranges
// =========================================================================

/// A fresh buffer is all unused, slot `i` owning block `i`.
#[test]
fn test_new_buffer_is_unused() {
  let buffer = QuaternaBuffer::new(4);
  assert!(buffer.is_empty());
  assert_eq!(buffer.capacity(), 4);
  for slot in 0..4 {
    assert!(!buffer.get(slot).is_in_use());
    assert_eq!(buffer.get(slot).block(), slot);
  }
}

/// Shrinking below the sorted boundary drags it down.
#[test]
fn test_shrink_retracts_sorted_end() {
  let mut buffer = buffer_with_scores(&[3.0, 2.0, 1.0]);
  buffer.sort();
  assert_eq!(buffer.sorted_len(), 3);

  buffer.shrink();
  assert_eq!(buffer.len(), 2);
  assert_eq!(buffer.sorted_len(), 2);
  assert!(buffer.sorted_len() <= buffer.len());
}

// =========================================================================
// Batch 2: Sorting and reclaim order
// =========================================================================

/// The used range sorts descending; the worst entry sits at the tail.
#[test]
fn test_sort_descending() {
  let mut buffer = buffer_with_scores(&[1.0, 5.0, 3.0, 4.0]);
  buffer.sort();

  let scores: Vec<f32> = buffer.used().iter().map(|q| q.parent_score).collect();
  assert_eq!(scores, vec![5.0, 4.0, 3.0, 1.0]);
  assert_eq!(buffer.lowest_sorted(), Some(3));
  assert_eq!(buffer.lowest_sorted_score(), 1.0);
  assert_eq!(buffer.min_parent_score(), 1.0);
}

/// Consuming the worst entry exposes the next worst.
#[test]
fn test_decrement_sorted_walks_up() {
  let mut buffer = buffer_with_scores(&[2.0, 9.0, 4.0]);
  buffer.sort();
  buffer.decrement_sorted();
  assert_eq!(buffer.lowest_sorted_score(), 4.0);
  buffer.decrement_sorted();
  buffer.decrement_sorted();
  assert_eq!(buffer.lowest_sorted(), None);
  assert_eq!(buffer.lowest_sorted_score(), f32::MAX, "no sorted entries means nothing to reclaim");
}

/// Sorting an already sorted buffer leaves it untouched.
#[test]
fn test_sort_is_noop_when_sorted() {
  let mut buffer = buffer_with_scores(&[1.0, 2.0]);
  buffer.sort();
  let before: Vec<_> = buffer.used().to_vec();
  buffer.sort();
  assert_eq!(buffer.used(), &before[..]);
}

// =========================================================================
// Batch 3: Score propagation
// =========================================================================

/// Parent scores are copied in; quaterna without a live parent turn unused.
#[test]
fn test_update_scores_reads_parent() {
  let mut nodes = NodeBuffer::new(2);
  let poly = nodes.alloc_root();
  let root = NodeId::Root(poly);
  nodes[root].owner = Some(Owner::Root(poly));
  nodes[root].score = 7.5;

  let mut buffer = QuaternaBuffer::new(2);
  buffer.grow();
  buffer.grow();
  nodes.push_block();
  nodes.push_block();
  for id in nodes.block_id(0).nodes() {
    nodes[id].owner = Some(Owner::Parent(root));
  }
  buffer.sort();

  buffer.update_scores(&nodes);
  assert_eq!(buffer.get(0).parent_score, 7.5);
  assert_eq!(buffer.get(1).parent_score, UNUSED_PARENT_SCORE);
  assert_eq!(buffer.sorted_len(), 0, "refresh invalidates the sorted prefix");
}
