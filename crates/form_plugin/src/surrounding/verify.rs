//! Structural invariant checks.
//!
//! The full walk is linear in the tree. Debug builds run it after every
//! tick, collapse and capacity decrease through [`debug_verify`]; release
//! builds skip it. Tests and the simulator's `--verify` flag call [`verify`]
//! directly.

use thiserror::Error;

use super::Surrounding;
use crate::node::{NodeId, Owner, NUM_NODES_PER_QUATERNA};

#[derive(Clone, Debug, Error, PartialEq)]
pub enum InvariantViolation {
  #[error("{blocks} node blocks in use but {quaterna} quaterna")]
  BlockCount { blocks: usize, quaterna: usize },
  #[error("quaterna ranges out of order: sorted {sorted}, used {used}, target {target}, capacity {capacity}")]
  Ranges {
    sorted: usize,
    used: usize,
    target: usize,
    capacity: usize,
  },
  #[error("quaterna {slot} owns block {block} outside its range")]
  MisplacedBlock { slot: usize, block: usize },
  #[error("block {block} is owned by two quaterna")]
  DuplicateBlock { block: usize },
  #[error("block {block} is used but node {lane} is empty")]
  EmptyNode { block: usize, lane: usize },
  #[error("block {block} is unused but holds live nodes")]
  LiveNodeInUnusedBlock { block: usize },
  #[error("block {block} has no single parent pointing back at it")]
  Parentage { block: usize },
  #[error("quaterna {slot} caches score {cached} but its parent scores {actual}")]
  StaleParentScore { slot: usize, cached: f32, actual: f32 },
  #[error("sorted quaterna {slot} is out of order")]
  Unsorted { slot: usize },
  #[error("{id:?} edge {edge}: cousin link is not symmetric")]
  AsymmetricCousin { id: NodeId, edge: usize },
  #[error("{id:?} edge {edge}: cousins disagree on the mid-point")]
  MidPointMismatch { id: NodeId, edge: usize },
  #[error("{id:?} references a dead point")]
  DeadPoint { id: NodeId },
}

/// Run every check, stopping at the first violation.
pub fn verify(surrounding: &Surrounding) -> Result<(), InvariantViolation> {
  verify_ranges(surrounding)?;
  verify_blocks(surrounding)?;
  verify_links(surrounding)
}

/// Halt on the first violation when debug assertions are enabled.
#[inline]
#[track_caller]
pub(crate) fn debug_verify(surrounding: &Surrounding) {
  if cfg!(debug_assertions) {
    if let Err(violation) = verify(surrounding) {
      panic!("invariant violated: {violation}");
    }
  }
}

/// Arena sizes and quaterna boundaries agree.
pub fn verify_ranges(surrounding: &Surrounding) -> Result<(), InvariantViolation> {
  let quaterna = &surrounding.quaterna;
  let blocks = surrounding.nodes.num_blocks_used();
  if blocks != quaterna.len() {
    return Err(InvariantViolation::BlockCount {
      blocks,
      quaterna: quaterna.len(),
    });
  }
  let (sorted, used, target, capacity) = (
    quaterna.sorted_len(),
    quaterna.len(),
    surrounding.target_num_quaterna,
    quaterna.capacity(),
  );
  if !(sorted <= used && used <= target && target <= capacity) {
    return Err(InvariantViolation::Ranges {
      sorted,
      used,
      target,
      capacity,
    });
  }
  Ok(())
}

/// Every used quaterna owns a distinct, fully populated block whose parent
/// points back at it; unused slots own empty blocks.
pub fn verify_blocks(surrounding: &Surrounding) -> Result<(), InvariantViolation> {
  let nodes = &surrounding.nodes;
  let quaterna = &surrounding.quaterna;
  let used = quaterna.len();
  let mut seen = vec![false; used];

  for (slot, entry) in quaterna.used().iter().enumerate() {
    let block = entry.block();
    if block >= used {
      return Err(InvariantViolation::MisplacedBlock { slot, block });
    }
    if std::mem::replace(&mut seen[block], true) {
      return Err(InvariantViolation::DuplicateBlock { block });
    }

    let block_id = nodes.block_id(block);
    let members = nodes.block(block..block + 1);
    if let Some(lane) = members.iter().position(|node| !node.is_in_use()) {
      return Err(InvariantViolation::EmptyNode { block, lane });
    }
    let parent = members[0].parent().ok_or(InvariantViolation::Parentage { block })?;
    let consistent = members.iter().all(|node| node.parent() == Some(parent))
      && nodes.get(parent).is_some_and(|node| node.children() == Some(block_id));
    if !consistent {
      return Err(InvariantViolation::Parentage { block });
    }

    let actual = nodes[parent].score;
    if entry.parent_score != actual {
      return Err(InvariantViolation::StaleParentScore {
        slot,
        cached: entry.parent_score,
        actual,
      });
    }
    if slot > 0 && slot < quaterna.sorted_len() && quaterna.get(slot - 1).parent_score < entry.parent_score {
      return Err(InvariantViolation::Unsorted { slot });
    }
  }

  for slot in used..quaterna.capacity() {
    let block = quaterna.get(slot).block();
    if block != slot {
      return Err(InvariantViolation::MisplacedBlock { slot, block });
    }
    if nodes.block(block..block + 1).iter().any(|node| node.is_in_use()) {
      return Err(InvariantViolation::LiveNodeInUnusedBlock { block });
    }
  }
  Ok(())
}

/// Cousin links are symmetric and share mid-points; every referenced point
/// is alive; children name their parent as owner.
pub fn verify_links(surrounding: &Surrounding) -> Result<(), InvariantViolation> {
  let nodes = &surrounding.nodes;
  let points = &surrounding.points;

  let roots = nodes.root_ids().map(|poly| (NodeId::Root(poly), &nodes[NodeId::Root(poly)]));
  for (id, node) in roots.chain(nodes.iter_used()) {
    for (edge, triplet) in node.triple.iter().enumerate() {
      let referenced = [triplet.corner, triplet.mid_point];
      if referenced.iter().flatten().any(|point| !points.is_alive(*point)) {
        return Err(InvariantViolation::DeadPoint { id });
      }
      let Some(cousin) = triplet.cousin else {
        continue;
      };
      let mirror = nodes
        .get(cousin)
        .map(|cousin| cousin.triple[edge])
        .ok_or(InvariantViolation::AsymmetricCousin { id, edge })?;
      if mirror.cousin != Some(id) {
        return Err(InvariantViolation::AsymmetricCousin { id, edge });
      }
      if mirror.mid_point != triplet.mid_point {
        return Err(InvariantViolation::MidPointMismatch { id, edge });
      }
    }

    if let Some(children) = node.children() {
      let owned = children
        .nodes()
        .into_iter()
        .all(|child| nodes.get(child).is_some_and(|child| child.owner() == Some(Owner::Parent(id))));
      if !owned {
        return Err(InvariantViolation::Parentage {
          block: children.index(),
        });
      }
    }
  }
  debug_assert!(nodes.len() % NUM_NODES_PER_QUATERNA == 0);
  Ok(())
}
