//! Ray casts against a polyhedron's tree.
//!
//! Every node owns the pyramid spanned by the shape center and its three
//! corners. The ray is clipped against the pyramid's side planes to an
//! `[enter, exit)` interval; children are visited nearest-first and leaves
//! test their faces within that interval. A child pyramid shares its side
//! planes with its siblings and parent, so adjacent intervals meet exactly.
//!
//! ```text
//!        P0
//!       /  \        side i: plane through (P[i+2], P[i+1], center),
//!      /    \               normal pointing out of the pyramid
//!    P1 ---- P2
//! ```

use glam::Vec3;
use smallvec::SmallVec;

use crate::face::node_faces;
use crate::node::{tri_mod, Node, NodeId, CENTER_CHILD, NUM_NODES_PER_QUATERNA};
use crate::node_buffer::NodeBuffer;
use crate::point::PointBuffer;
use crate::types::{Plane3, Ray3, Triangle3};

/// Nearest contact of a ray cast.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayCastResult {
  /// Distance along the ray, `f32::MAX` for a miss.
  pub projection: f32,
  /// Leaf that was hit.
  pub node: Option<NodeId>,
  /// Unit normal of the hit face, `-direction` for a miss.
  pub normal: Vec3,
}

impl RayCastResult {
  pub fn miss(ray: &Ray3) -> Self {
    Self {
      projection: f32::MAX,
      node: None,
      normal: -ray.direction,
    }
  }

  #[inline]
  pub fn is_hit(&self) -> bool {
    self.node.is_some()
  }

  /// Contact position along `ray`, if any.
  pub fn position(&self, ray: &Ray3) -> Option<Vec3> {
    self.is_hit().then(|| ray.at(self.projection))
  }

  /// `true` if a hit at `projection` should replace this result.
  #[inline]
  fn is_beaten_by(&self, projection: f32) -> bool {
    if !self.is_hit() {
      return true;
    }
    match (projection >= 0.0, self.projection >= 0.0) {
      (true, false) => true,
      (false, true) => false,
      _ => projection < self.projection,
    }
  }
}

/// Side planes of one node's pyramid, plus the corners they were built from.
#[derive(Clone, Copy, Debug)]
struct Pyramid {
  corners: [Vec3; 3],
  sides: [Plane3; 3],
}

impl Pyramid {
  fn new(corners: [Vec3; 3], center: Vec3) -> Option<Self> {
    let side = |i: usize| {
      let (a, b) = (corners[tri_mod(i + 2)], corners[tri_mod(i + 1)]);
      let normal = Triangle3::new(a, b, center).unit_normal()?;
      Some(Plane3 {
        position: (a + b) * 0.5,
        normal,
      })
    };
    Some(Self {
      corners,
      sides: [side(0)?, side(1)?, side(2)?],
    })
  }

  /// Outer child `i`, sharing its inner side with the center child.
  fn outer_child(&self, i: usize, center_child: &Pyramid) -> Self {
    let (j, k) = (tri_mod(i + 1), tri_mod(i + 2));
    let mut corners = [Vec3::ZERO; 3];
    corners[i] = self.corners[i];
    corners[j] = center_child.corners[k];
    corners[k] = center_child.corners[j];

    let mut sides = self.sides;
    sides[i] = Plane3 {
      position: center_child.sides[i].position,
      normal: -center_child.sides[i].normal,
    };
    Self { corners, sides }
  }

  /// Parameter interval of `ray` inside the pyramid.
  fn clip(&self, ray: &Ray3) -> (f32, f32) {
    let mut enter = f32::MIN;
    let mut exit = f32::MAX;
    for side in &self.sides {
      let dot = -side.normal.dot(ray.direction);
      let offset = side.signed_distance(ray.position);
      if dot == 0.0 {
        if offset > 0.0 {
          return (f32::MAX, f32::MIN);
        }
        continue;
      }
      let t = offset / dot;
      if dot > 0.0 {
        enter = enter.max(t);
      } else {
        exit = exit.min(t);
      }
    }
    (enter, exit)
  }
}

struct RayCast<'a> {
  nodes: &'a NodeBuffer,
  points: &'a PointBuffer,
  ray: Ray3,
  length: f32,
  center: Vec3,
  best: RayCastResult,
}

/// Cast `ray` against the tree under `root`, up to `length`.
pub fn cast_ray(nodes: &NodeBuffer, points: &PointBuffer, root: NodeId, ray: &Ray3, length: f32) -> RayCastResult {
  let miss = RayCastResult::miss(ray);
  let Some(root_node) = nodes.get(root) else {
    return miss;
  };
  let Some(children) = root_node.children() else {
    return miss;
  };

  let mut cast = RayCast {
    nodes,
    points,
    ray: *ray,
    length,
    center: root_node.center,
    best: miss,
  };

  // The root's children are the faces of a closed tetrahedron; each gets a
  // fresh pyramid.
  let mut candidates: SmallVec<[(f32, f32, NodeId, Pyramid); NUM_NODES_PER_QUATERNA]> = SmallVec::new();
  for child in children.nodes() {
    let Some(pyramid) = cast.pyramid_of(&nodes[child]) else {
      continue;
    };
    let (enter, exit) = pyramid.clip(ray);
    candidates.push((enter, exit, child, pyramid));
  }
  cast.visit_sorted(candidates);
  cast.best
}

impl RayCast<'_> {
  fn pyramid_of(&self, node: &Node) -> Option<Pyramid> {
    let corner = |i: usize| self.points.get(node.corner(i)?).map(|point| point.pos);
    Pyramid::new([corner(0)?, corner(1)?, corner(2)?], self.center)
  }

  fn visit_sorted(&mut self, mut candidates: SmallVec<[(f32, f32, NodeId, Pyramid); NUM_NODES_PER_QUATERNA]>) {
    candidates.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));
    for (enter, exit, id, pyramid) in candidates {
      if enter >= self.length {
        break;
      }
      if self.best.projection >= 0.0 && enter > self.best.projection {
        // Nothing further along can be closer.
        break;
      }
      if exit <= 0.0 || enter >= exit {
        continue;
      }
      self.visit(id, &pyramid, enter, exit);
    }
  }

  fn visit(&mut self, id: NodeId, pyramid: &Pyramid, enter: f32, exit: f32) {
    let nodes = self.nodes;
    let node = &nodes[id];
    let Some(children) = node.children() else {
      self.hit_leaf(id, node, enter, exit);
      return;
    };

    let Some(center_child) = self.pyramid_of(&nodes[children.node(CENTER_CHILD)]) else {
      return;
    };
    let mut candidates = SmallVec::new();
    for lane in 0..NUM_NODES_PER_QUATERNA {
      let child = if lane == CENTER_CHILD {
        center_child
      } else {
        pyramid.outer_child(lane, &center_child)
      };
      let (enter, exit) = child.clip(&self.ray);
      candidates.push((enter, exit, children.node(lane), child));
    }
    self.visit_sorted(candidates);
  }

  fn hit_leaf(&mut self, id: NodeId, node: &Node, enter: f32, exit: f32) {
    let faces = node_faces(node, self.points);
    let split = faces.len() > 1;
    for face in faces {
      let dot = -face.normal.dot(self.ray.direction);
      if !(dot > 0.0) {
        // Back face or parallel.
        continue;
      }
      let corners = face.points.map(|point| self.points[point].pos);
      let t = (self.ray.position - corners[0]).dot(face.normal) / dot;
      if t < enter || t >= exit || t >= self.length {
        continue;
      }
      // A split leaf's faces partition its pyramid further.
      if split {
        let Some(face_pyramid) = Pyramid::new(corners, self.center) else {
          continue;
        };
        let (face_enter, face_exit) = face_pyramid.clip(&self.ray);
        if t < face_enter || t > face_exit {
          continue;
        }
      }
      if self.best.is_beaten_by(t) {
        self.best = RayCastResult {
          projection: t,
          node: Some(id),
          normal: face.normal,
        };
      }
    }
  }
}

#[cfg(test)]
#[path = "ray_cast_test.rs"]
mod ray_cast_test;
