//! NodeBuffer - flat arena of nodes grouped in blocks of four.
//!
//! Block `b` owns nodes `4b..4b + 4`. The blocks in `[0, num_blocks_used)`
//! belong to used quaterna; everything above is free. Blocks are never
//! allocated individually: the surrounding pushes and pops whole blocks at
//! the boundary and compacts the used range when quaterna are released.
//!
//! Roots live in a separate small arena keyed by [`PolyhedronId`].

use std::ops::{Index, IndexMut};

use crate::node::{BlockId, Node, NodeId, Owner, PolyhedronId, NUM_NODES_PER_QUATERNA};

#[derive(Clone, Debug, Default)]
struct RootSlot {
  node: Node,
  generation: u32,
  live: bool,
}

/// Fixed-capacity node arena.
#[derive(Debug)]
pub struct NodeBuffer {
  nodes: Vec<Node>,
  /// One generation per block. Bumped whenever a block's contents are torn
  /// down or moved elsewhere.
  generations: Vec<u32>,
  num_blocks_used: usize,
  roots: Vec<RootSlot>,
  free_roots: Vec<u32>,
}

impl NodeBuffer {
  pub fn new(max_blocks: usize) -> Self {
    Self {
      nodes: vec![Node::default(); max_blocks * NUM_NODES_PER_QUATERNA],
      generations: vec![0; max_blocks],
      num_blocks_used: 0,
      roots: Vec::new(),
      free_roots: Vec::new(),
    }
  }

  /// Maximum number of blocks.
  #[inline]
  pub fn capacity(&self) -> usize {
    self.generations.len()
  }

  /// Nodes in used blocks.
  #[inline]
  pub fn len(&self) -> usize {
    self.num_blocks_used * NUM_NODES_PER_QUATERNA
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.num_blocks_used == 0
  }

  #[inline]
  pub fn num_blocks_used(&self) -> usize {
    self.num_blocks_used
  }

  /// Claim the next block at the used boundary.
  pub(crate) fn push_block(&mut self) {
    debug_assert!(self.num_blocks_used < self.capacity(), "node buffer overflow");
    self.num_blocks_used += 1;
  }

  /// Release `count` blocks at the used boundary. They must already be empty.
  pub(crate) fn pop_blocks(&mut self, count: usize) {
    debug_assert!(count <= self.num_blocks_used, "node buffer underflow");
    self.num_blocks_used -= count;
    debug_assert!(
      self.block(self.num_blocks_used..self.num_blocks_used + count).iter().all(|n| !n.is_in_use()),
      "popped a block that still holds live nodes"
    );
  }

  /// Current id of block `index`.
  #[inline]
  pub fn block_id(&self, index: usize) -> BlockId {
    BlockId {
      index: index as u32,
      generation: self.generations[index],
    }
  }

  #[inline]
  pub(crate) fn bump_generation(&mut self, index: usize) {
    self.generations[index] = self.generations[index].wrapping_add(1);
  }

  /// Raw nodes of a range of blocks, regardless of generation.
  #[inline]
  pub(crate) fn block(&self, blocks: std::ops::Range<usize>) -> &[Node] {
    &self.nodes[blocks.start * NUM_NODES_PER_QUATERNA..blocks.end * NUM_NODES_PER_QUATERNA]
  }

  #[inline]
  pub(crate) fn block_mut(&mut self, blocks: std::ops::Range<usize>) -> &mut [Node] {
    &mut self.nodes[blocks.start * NUM_NODES_PER_QUATERNA..blocks.end * NUM_NODES_PER_QUATERNA]
  }

  /// All nodes of used blocks, for bulk passes such as scoring.
  #[inline]
  pub(crate) fn used_nodes_mut(&mut self) -> &mut [Node] {
    let end = self.len();
    &mut self.nodes[..end]
  }

  // ---------------------------------------------------------------------
  // Roots
  // ---------------------------------------------------------------------

  /// Reserve a root slot. The root node starts out unused.
  pub(crate) fn alloc_root(&mut self) -> PolyhedronId {
    let index = match self.free_roots.pop() {
      Some(index) => index,
      None => {
        self.roots.push(RootSlot::default());
        (self.roots.len() - 1) as u32
      }
    };
    let slot = &mut self.roots[index as usize];
    slot.live = true;
    slot.node = Node::default();
    PolyhedronId {
      index,
      generation: slot.generation,
    }
  }

  pub(crate) fn free_root(&mut self, id: PolyhedronId) {
    debug_assert!(self.is_root_alive(id), "freeing stale root {:?}", id);
    let slot = &mut self.roots[id.index()];
    slot.live = false;
    slot.node = Node::default();
    slot.generation = slot.generation.wrapping_add(1);
    self.free_roots.push(id.index);
  }

  #[inline]
  pub fn is_root_alive(&self, id: PolyhedronId) -> bool {
    self
      .roots
      .get(id.index())
      .is_some_and(|slot| slot.live && slot.generation == id.generation)
  }

  /// Ids of every live root.
  pub fn root_ids(&self) -> impl Iterator<Item = PolyhedronId> + '_ {
    self.roots.iter().enumerate().filter(|(_, slot)| slot.live).map(|(index, slot)| PolyhedronId {
      index: index as u32,
      generation: slot.generation,
    })
  }

  // ---------------------------------------------------------------------
  // Access
  // ---------------------------------------------------------------------

  /// `true` if `id` refers to the node it was handed out for.
  pub fn is_alive(&self, id: NodeId) -> bool {
    match id {
      NodeId::Root(poly) => self.is_root_alive(poly),
      NodeId::Child { block, lane } => {
        block.index() < self.num_blocks_used
          && self.generations[block.index()] == block.generation
          && self.nodes[block.index() * NUM_NODES_PER_QUATERNA + lane as usize].is_in_use()
      }
    }
  }

  pub fn get(&self, id: NodeId) -> Option<&Node> {
    self.is_alive(id).then(|| &self[id])
  }

  /// Slot position ignoring liveness; the generation must still match.
  #[inline]
  fn slot(&self, id: NodeId) -> usize {
    match id {
      NodeId::Root(poly) => poly.index(),
      NodeId::Child { block, lane } => {
        debug_assert_eq!(
          self.generations[block.index()],
          block.generation,
          "stale block {:?}",
          block
        );
        block.index() * NUM_NODES_PER_QUATERNA + lane as usize
      }
    }
  }

  /// Link `a` and `b` as cousins across edge `edge`. `a` adopts `b`'s
  /// mid-point, if it has one.
  pub(crate) fn set_cousin(&mut self, a: NodeId, edge: usize, b: NodeId) {
    let mid_point = self[b].triple[edge].mid_point;
    let triplet = &mut self[a].triple[edge];
    debug_assert!(
      triplet.mid_point.is_none() || triplet.mid_point == mid_point,
      "cousin link would drop a mid-point"
    );
    triplet.cousin = Some(b);
    triplet.mid_point = mid_point;
    self[b].triple[edge].cousin = Some(a);
  }

  /// Number of parent links between `id` and its root.
  pub fn depth(&self, id: NodeId) -> usize {
    let mut depth = 0;
    let mut current = id;
    while let Some(parent) = self[current].parent() {
      depth += 1;
      current = parent;
    }
    depth
  }

  /// Polyhedron whose tree contains `id`.
  pub fn polyhedron_of(&self, id: NodeId) -> Option<PolyhedronId> {
    let mut current = id;
    loop {
      match self[current].owner()? {
        Owner::Root(poly) => return Some(poly),
        Owner::Parent(parent) => current = parent,
      }
    }
  }

  /// `true` if `block` holds `id` or any of its ancestors.
  pub(crate) fn is_self_or_ancestor_in(&self, id: NodeId, block: BlockId) -> bool {
    let mut current = Some(id);
    while let Some(node) = current {
      if node.block() == Some(block) {
        return true;
      }
      current = self[node].parent();
    }
    false
  }

  /// Live nodes in used blocks, with their ids.
  pub fn iter_used(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
    (0..self.num_blocks_used).flat_map(move |index| {
      let block = self.block_id(index);
      self
        .block(index..index + 1)
        .iter()
        .enumerate()
        .filter(|(_, node)| node.is_in_use())
        .map(move |(lane, node)| (block.node(lane), node))
    })
  }
}

impl Index<NodeId> for NodeBuffer {
  type Output = Node;

  #[inline]
  fn index(&self, id: NodeId) -> &Node {
    let slot = self.slot(id);
    match id {
      NodeId::Root(_) => &self.roots[slot].node,
      NodeId::Child { .. } => &self.nodes[slot],
    }
  }
}

impl IndexMut<NodeId> for NodeBuffer {
  #[inline]
  fn index_mut(&mut self, id: NodeId) -> &mut Node {
    let slot = self.slot(id);
    match id {
      NodeId::Root(_) => &mut self.roots[slot].node,
      NodeId::Child { .. } => &mut self.nodes[slot],
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_push_pop_blocks() {
    let mut buffer = NodeBuffer::new(3);
    assert!(buffer.is_empty());
    buffer.push_block();
    buffer.push_block();
    assert_eq!(buffer.len(), 8);
    buffer.pop_blocks(2);
    assert_eq!(buffer.len(), 0);
  }

  #[test]
  fn test_generation_invalidates_child_ids() {
    let mut buffer = NodeBuffer::new(1);
    buffer.push_block();
    let id = buffer.block_id(0).node(2);
    let root = buffer.alloc_root();
    buffer[id].owner = Some(Owner::Parent(NodeId::Root(root)));
    assert!(buffer.is_alive(id));

    buffer[id].owner = None;
    buffer.bump_generation(0);
    assert!(!buffer.is_alive(id), "bumped block must invalidate old ids");
    assert!(buffer.get(id).is_none());
  }

  #[test]
  fn test_set_cousin_shares_mid_point() {
    let mut buffer = NodeBuffer::new(1);
    buffer.push_block();
    let a = buffer.block_id(0).node(0);
    let b = buffer.block_id(0).node(3);
    let mut points = crate::point::PointBuffer::new(1);
    let mid = points.create().unwrap();
    buffer[b].triple[1].mid_point = Some(mid);

    buffer.set_cousin(a, 1, b);
    assert_eq!(buffer[a].cousin(1), Some(b));
    assert_eq!(buffer[b].cousin(1), Some(a));
    assert_eq!(buffer[a].mid_point(1), Some(mid));
  }

  #[test]
  fn test_depth_and_polyhedron() {
    let mut buffer = NodeBuffer::new(2);
    let poly = buffer.alloc_root();
    let root = NodeId::Root(poly);
    buffer[root].owner = Some(Owner::Root(poly));

    buffer.push_block();
    let child = buffer.block_id(0).node(1);
    buffer[child].owner = Some(Owner::Parent(root));
    buffer.push_block();
    let grandchild = buffer.block_id(1).node(3);
    buffer[grandchild].owner = Some(Owner::Parent(child));

    assert_eq!(buffer.depth(root), 0);
    assert_eq!(buffer.depth(grandchild), 2);
    assert_eq!(buffer.polyhedron_of(grandchild), Some(poly));
    assert!(buffer.is_self_or_ancestor_in(grandchild, buffer.block_id(0)));
    assert!(!buffer.is_self_or_ancestor_in(child, buffer.block_id(1)));
  }

  #[test]
  fn test_root_slots_are_recycled() {
    let mut buffer = NodeBuffer::new(0);
    let a = buffer.alloc_root();
    buffer.free_root(a);
    let b = buffer.alloc_root();
    assert_eq!(a.index(), b.index());
    assert!(!buffer.is_root_alive(a));
    assert!(buffer.is_root_alive(b));
    assert_eq!(buffer.root_ids().collect::<Vec<_>>(), vec![b]);
  }
}
