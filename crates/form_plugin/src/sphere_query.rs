//! Collision candidates: every surface triangle near a sphere.
//!
//! The root's four children are filtered by their pyramids (apex at the
//! shape center). Below that, each node splits its pyramid with the three
//! planes through the center and a pair of mid-points; the sphere's side of
//! each plane decides which children can be touched.
//!
//! ```text
//!           c0
//!          /  \          plane i runs through (center, mid[i+2], mid[i+1]);
//!        m2 -- m1        its positive side holds outer child i,
//!        / \  / \        its negative side the center child
//!      c1 -- m0 -- c2
//! ```

use glam::Vec3;

use crate::face::node_faces;
use crate::node::{tri_mod, Node, NodeId, CENTER_CHILD};
use crate::node_buffer::NodeBuffer;
use crate::point::PointBuffer;
use crate::types::{Plane3, Sphere3, Triangle3};

/// Corner orders of the root tetrahedron's faces.
const ROOT_FACES: [[usize; 3]; 4] = [[0, 3, 2], [3, 0, 1], [2, 1, 0], [1, 2, 3]];

struct SphereQuery<'a, F> {
  nodes: &'a NodeBuffer,
  points: &'a PointBuffer,
  center: Vec3,
  sphere: Sphere3,
  f: F,
}

/// Call `f` with every face under `root` that may touch `sphere`, and the
/// face's unit normal. Faces entirely on one side of their own plane's
/// sphere slab are skipped.
pub fn for_each_face_in_sphere<F>(nodes: &NodeBuffer, points: &PointBuffer, root: NodeId, sphere: &Sphere3, f: F)
where
  F: FnMut(&Triangle3, Vec3),
{
  let Some(root_node) = nodes.get(root) else {
    return;
  };
  let mut query = SphereQuery {
    nodes,
    points,
    center: root_node.center,
    sphere: *sphere,
    f,
  };

  match root_node.children() {
    Some(children) => {
      for child in children.nodes() {
        if query.pyramid_touches(&nodes[child]) {
          query.visit(child);
        }
      }
    }
    None => query.root_faces(root_node),
  }
}

impl<F> SphereQuery<'_, F>
where
  F: FnMut(&Triangle3, Vec3),
{
  #[inline]
  fn pos(&self, node: &Node, corner: usize) -> Option<Vec3> {
    Some(self.points.get(node.corner(corner)?)?.pos)
  }

  /// Signed distance of the sphere center from the plane through the shape
  /// center, `a` and `b`.
  #[inline]
  fn side_distance(&self, a: Vec3, b: Vec3) -> Option<f32> {
    let plane = Plane3::from_triangle(&Triangle3::new(self.center, a, b))?;
    Some(plane.signed_distance(self.sphere.center))
  }

  /// `true` unless the sphere lies entirely outside one of the node's
  /// pyramid sides.
  fn pyramid_touches(&self, node: &Node) -> bool {
    let (Some(s0), Some(s1), Some(s2)) = (self.pos(node, 0), self.pos(node, 1), self.pos(node, 2)) else {
      return false;
    };
    let radius = self.sphere.radius;
    [(s0, s2), (s1, s0), (s2, s1)]
      .into_iter()
      .all(|(a, b)| self.side_distance(a, b).map_or(true, |d| d <= radius))
  }

  fn visit(&mut self, id: NodeId) {
    let nodes = self.nodes;
    let node = &nodes[id];
    let Some(children) = node.children() else {
      self.emit_leaf(node);
      return;
    };

    let radius = self.sphere.radius;
    let mut touching_center_side = 0;
    for i in 0..3 {
      let mid = |edge: usize| node.mid_point(edge).and_then(|point| self.points.get(point)).map(|point| point.pos);
      let (Some(b), Some(c)) = (mid(tri_mod(i + 2)), mid(tri_mod(i + 1))) else {
        continue;
      };
      // Positive towards corner i.
      let Some(d) = self.side_distance(b, c) else {
        continue;
      };
      if d <= radius {
        touching_center_side += 1;
      }
      if d > -radius {
        self.visit(children.node(i));
      }
    }
    if touching_center_side == 3 {
      self.visit(children.node(CENTER_CHILD));
    }
  }

  fn emit_leaf(&mut self, node: &Node) {
    for face in node_faces(node, self.points) {
      let [a, b, c] = face.points.map(|point| self.points[point].pos);
      self.emit(Triangle3::new(a, b, c), face.normal);
    }
  }

  /// A childless root is drawn as its tetrahedron.
  fn root_faces(&mut self, root: &Node) {
    let corner = |index: usize| {
      let id = if index == 0 { root.corner(0) } else { root.mid_point(index - 1) };
      id.and_then(|id| self.points.get(id)).map(|point| point.pos)
    };
    let (Some(p0), Some(p1), Some(p2), Some(p3)) = (corner(0), corner(1), corner(2), corner(3)) else {
      return;
    };
    let corners = [p0, p1, p2, p3];
    for [a, b, c] in ROOT_FACES {
      let triangle = Triangle3::new(corners[a], corners[b], corners[c]);
      if let Some(normal) = triangle.unit_normal() {
        self.emit(triangle, normal);
      }
    }
  }

  fn emit(&mut self, triangle: Triangle3, normal: Vec3) {
    let distance = (self.sphere.center - triangle.points[0]).dot(normal);
    if distance.abs() <= self.sphere.radius {
      (self.f)(&triangle, normal);
    }
  }
}

#[cfg(test)]
#[path = "sphere_query_test.rs"]
mod sphere_query_test;
