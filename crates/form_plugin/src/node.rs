//! Node - one triangle of the adaptive surface.
//!
//! A node is a triangle described by three [`Triplet`]s. Triplet `i` holds
//! corner `i`, the mid-point of the edge opposite corner `i`, and the cousin
//! across that edge: the neighboring node that shares the mid-point.
//!
//! ```text
//!              c0
//!             /  \
//!           m2 -- m1        children[0] = (c0, m2, m1)
//!           / \  / \        children[1] = (m2, c1, m0)
//!         c1 -- m0 -- c2    children[2] = (m1, m0, c2)
//!                           children[3] = (m0, m1, m2)   center
//! ```
//!
//! Once all three mid-points exist a node can have four children, the
//! fourth being the upside-down center triangle. The cousin relation is
//! symmetric and edge-indexed: if A's cousin on edge `i` is B then B's cousin
//! on edge `i` is A and both reference the same mid-point.

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::point::{PointBuffer, PointId};
use crate::types::Triangle3;

/// Sibling nodes produced by one subdivision.
pub const NUM_NODES_PER_QUATERNA: usize = 4;

/// Index of the center child within a block.
pub const CENTER_CHILD: usize = 3;

/// Wrap a triplet index into `0..3`.
#[inline]
pub fn tri_mod(index: usize) -> usize {
  index % 3
}

/// Generation-checked handle to a block of four sibling nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId {
  pub(crate) index: u32,
  pub(crate) generation: u32,
}

impl BlockId {
  #[inline]
  pub fn index(self) -> usize {
    self.index as usize
  }

  #[inline]
  pub fn generation(self) -> u32 {
    self.generation
  }

  /// Id of the node in lane `lane` of this block.
  #[inline]
  pub fn node(self, lane: usize) -> NodeId {
    debug_assert!(lane < NUM_NODES_PER_QUATERNA);
    NodeId::Child {
      block: self,
      lane: lane as u8,
    }
  }

  /// Ids of all four nodes in the block.
  #[inline]
  pub fn nodes(self) -> [NodeId; NUM_NODES_PER_QUATERNA] {
    [self.node(0), self.node(1), self.node(2), self.node(3)]
  }
}

/// Generation-checked handle to a polyhedron and its root node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PolyhedronId {
  pub(crate) index: u32,
  pub(crate) generation: u32,
}

impl PolyhedronId {
  #[inline]
  pub fn index(self) -> usize {
    self.index as usize
  }
}

/// Handle to any node: a polyhedron's root or a member of a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeId {
  Root(PolyhedronId),
  Child { block: BlockId, lane: u8 },
}

impl NodeId {
  /// The block holding this node, `None` for a root.
  #[inline]
  pub fn block(self) -> Option<BlockId> {
    match self {
      NodeId::Root(_) => None,
      NodeId::Child { block, .. } => Some(block),
    }
  }

  /// Position within the block (the child index), `None` for a root.
  #[inline]
  pub fn lane(self) -> Option<usize> {
    match self {
      NodeId::Root(_) => None,
      NodeId::Child { lane, .. } => Some(lane as usize),
    }
  }

  #[inline]
  pub fn is_root(self) -> bool {
    matches!(self, NodeId::Root(_))
  }
}

/// Who a live node belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Owner {
  /// The node is one of four children of this node.
  Parent(NodeId),
  /// The node is the root of this polyhedron.
  Root(PolyhedronId),
}

/// Per-edge bundle: corner, mid-point of the opposite edge, and the cousin
/// across that edge.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Triplet {
  pub corner: Option<PointId>,
  pub mid_point: Option<PointId>,
  pub cousin: Option<NodeId>,
}

impl Triplet {
  /// A mid-point is mature once the cousin that agreed on it is present.
  #[inline]
  pub fn has_mature_mid_point(&self) -> bool {
    self.cousin.is_some() && self.mid_point.is_some()
  }
}

/// One triangle of the tree.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Node {
  pub triple: [Triplet; 3],
  pub(crate) children: Option<BlockId>,
  pub(crate) owner: Option<Owner>,
  pub seed: u32,

  // Score parameters.
  pub center: Vec3,
  pub normal: Vec3,
  pub area: f32,
  pub score: f32,
}

impl Node {
  #[inline]
  pub fn is_in_use(&self) -> bool {
    self.owner.is_some()
  }

  #[inline]
  pub fn owner(&self) -> Option<Owner> {
    self.owner
  }

  /// Parent node, `None` for roots and unused nodes.
  #[inline]
  pub fn parent(&self) -> Option<NodeId> {
    match self.owner {
      Some(Owner::Parent(parent)) => Some(parent),
      _ => None,
    }
  }

  #[inline]
  pub fn children(&self) -> Option<BlockId> {
    self.children
  }

  #[inline]
  pub fn has_children(&self) -> bool {
    self.children.is_some()
  }

  #[inline]
  pub fn is_leaf(&self) -> bool {
    self.children.is_none()
  }

  #[inline]
  pub fn corner(&self, index: usize) -> Option<PointId> {
    self.triple[index].corner
  }

  #[inline]
  pub fn mid_point(&self, index: usize) -> Option<PointId> {
    self.triple[index].mid_point
  }

  #[inline]
  pub fn cousin(&self, index: usize) -> Option<NodeId> {
    self.triple[index].cousin
  }

  #[inline]
  pub fn has_all_cousins(&self) -> bool {
    self.triple.iter().all(|t| t.cousin.is_some())
  }

  /// A node can subdivide only as a leaf whose neighborhood is resolved.
  #[inline]
  pub fn is_expandable(&self) -> bool {
    self.is_leaf() && self.has_all_cousins()
  }

  /// Count of edges whose mid-point is mature.
  pub fn num_mature_mid_points(&self) -> usize {
    self.triple.iter().filter(|t| t.has_mature_mid_point()).count()
  }

  /// Triangle spanned by the corners, `None` if any corner is missing.
  pub fn surface(&self, points: &PointBuffer) -> Option<Triangle3> {
    let a = points.get(self.corner(0)?)?.pos;
    let b = points.get(self.corner(1)?)?.pos;
    let c = points.get(self.corner(2)?)?.pos;
    Some(Triangle3::new(a, b, c))
  }

  /// Derive normal, area and center from the corners.
  ///
  /// Returns `false` for a degenerate triangle: one whose normal cannot be
  /// normalized or whose area is zero.
  pub fn init_score_parameters(&mut self, points: &PointBuffer) -> bool {
    let Some(surface) = self.surface(points) else {
      return false;
    };
    let Some(normal) = surface.unit_normal() else {
      return false;
    };
    let area = surface.area();
    if !(area > 0.0) {
      return false;
    }
    self.normal = normal;
    self.area = area;
    self.center = surface.centroid();
    true
  }

  /// Corners of child `child_index`; every mid-point must already exist.
  pub fn child_corners(&self, child_index: usize) -> Option<[PointId; 3]> {
    let t = &self.triple;
    Some(match child_index {
      0 => [t[0].corner?, t[2].mid_point?, t[1].mid_point?],
      1 => [t[2].mid_point?, t[1].corner?, t[0].mid_point?],
      2 => [t[1].mid_point?, t[0].mid_point?, t[2].corner?],
      _ => [t[0].mid_point?, t[1].mid_point?, t[2].mid_point?],
    })
  }

  /// Build the four would-be children of `self` without touching any shared
  /// state. Only corners and score parameters are filled in.
  ///
  /// Returns `None` if a mid-point is missing or any child is degenerate.
  pub fn init_child_corners(&self, points: &PointBuffer) -> Option<[Node; NUM_NODES_PER_QUATERNA]> {
    debug_assert!(self.is_leaf());
    let mut children: [Node; NUM_NODES_PER_QUATERNA] = Default::default();
    for (child_index, child) in children.iter_mut().enumerate() {
      let corners = self.child_corners(child_index)?;
      for (triplet, corner) in child.triple.iter_mut().zip(corners) {
        triplet.corner = Some(corner);
      }
      if !child.init_score_parameters(points) {
        return None;
      }
    }
    debug_assert_eq!(children[0].corner(0), self.corner(0));
    Some(children)
  }

  /// Deterministic seed of child `child_index`.
  #[inline]
  pub fn child_seed(&self, child_index: usize) -> u32 {
    child_seed(self.seed, child_index)
  }
}

/// One step of the seed sequence.
#[inline]
pub fn hash_seed(seed: u32) -> u32 {
  StdRng::seed_from_u64(u64::from(seed)).next_u32()
}

/// Seed of child `child_index` of a node seeded with `seed`.
#[inline]
pub fn child_seed(seed: u32, child_index: usize) -> u32 {
  hash_seed(hash_seed(seed).wrapping_add(child_index as u32))
}

#[cfg(test)]
#[path = "node_test.rs"]
mod node_test;
