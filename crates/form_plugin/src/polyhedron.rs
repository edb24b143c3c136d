//! Polyhedron - one formation instance anchored in a surrounding.
//!
//! Every polyhedron owns a root node whose three corners are all root point
//! 0 and whose three mid-points are root points 1 to 3. The root is its own
//! cousin on every edge, so it is expandable from the start. Its four
//! children are the faces of the root tetrahedron.

use std::fmt;
use std::sync::Arc;

use glam::Vec3;

use crate::node::{Node, NodeId, Owner, PolyhedronId};
use crate::point::{PointBuffer, PointId};
use crate::shader::Shader;
use crate::types::Sphere3;

/// Number of points owned by a root node.
pub const NUM_ROOT_POINTS: usize = 4;

pub struct Polyhedron {
  /// Shape relative to the surrounding's origin.
  pub shape: Sphere3,
  pub seed: u32,
  pub shader: Arc<dyn Shader>,
  pub(crate) root_points: [PointId; NUM_ROOT_POINTS],
}

impl fmt::Debug for Polyhedron {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Polyhedron")
      .field("shape", &self.shape)
      .field("seed", &self.seed)
      .field("root_points", &self.root_points)
      .finish_non_exhaustive()
  }
}

impl Polyhedron {
  /// Claim the root points and place them. Returns `None` if the point pool
  /// cannot hold four more points; nothing is claimed in that case.
  pub(crate) fn new(
    shape: Sphere3,
    seed: u32,
    shader: Arc<dyn Shader>,
    points: &mut PointBuffer,
  ) -> Option<Self> {
    if points.capacity() - points.len() < NUM_ROOT_POINTS {
      return None;
    }
    let root_points = [points.create()?, points.create()?, points.create()?, points.create()?];
    let polyhedron = Self {
      shape,
      seed,
      shader,
      root_points,
    };
    polyhedron.place_root_points(points);
    Some(polyhedron)
  }

  /// Ask the shader where the root points go for the current shape.
  pub(crate) fn place_root_points(&self, points: &mut PointBuffer) {
    let positions = self.shader.init_root_points(&self.shape, self.seed);
    for (id, position) in self.root_points.iter().zip(positions) {
      points[*id].pos = position;
    }
  }

  /// Move the shape by `-delta` and re-place the root points.
  pub(crate) fn shift_origin(&mut self, delta: Vec3, points: &mut PointBuffer) {
    self.shape.center -= delta;
    self.place_root_points(points);
  }

  /// The root node for this polyhedron in its unexpanded state.
  pub(crate) fn root_node(&self, id: PolyhedronId) -> Node {
    let root = NodeId::Root(id);
    let mut node = Node {
      owner: Some(Owner::Root(id)),
      seed: self.seed,
      score: f32::MAX,
      center: self.shape.center,
      ..Default::default()
    };
    for (edge, triplet) in node.triple.iter_mut().enumerate() {
      triplet.corner = Some(self.root_points[0]);
      triplet.mid_point = Some(self.root_points[edge + 1]);
      triplet.cousin = Some(root);
    }
    node
  }

  /// Return the root points to the pool.
  pub(crate) fn release_points(&self, points: &mut PointBuffer) {
    for id in self.root_points {
      points.destroy(id);
    }
  }
}
