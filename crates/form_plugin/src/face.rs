//! Face emission for a leaf.
//!
//! A leaf is drawn with one to four triangles depending on how many of its
//! edges have a mature mid-point. Unmatured edges stay straight so the
//! surface never cracks against a coarser neighbor.
//!
//! ```text
//! mature   faces
//!   0      (c0, c1, c2)
//!   1      edge m:  (mid_m, c_m, c_m+1)  (c_m, mid_m, c_m+2)
//!   2      odd o:   (c_o, mid_o+2, mid_o+1)  (c_o+1, c_o+2, mid_o+2)  (mid_o+1, mid_o+2, c_o+2)
//!   3      the four virtual children
//! ```
//!
//! Triplet `i` holds corner `i` and the mid-point of the edge opposite it,
//! i.e. of `(c_i+1, c_i+2)`.

use glam::Vec3;
use smallvec::SmallVec;

use crate::node::{tri_mod, Node};
use crate::point::{PointBuffer, PointId};
use crate::types::Triangle3;

/// Most faces one leaf can produce.
pub const MAX_FACES_PER_NODE: usize = 4;

/// One emitted triangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Face {
  pub points: [PointId; 3],
  /// Unit normal.
  pub normal: Vec3,
}

/// Faces of one leaf. Never spills for the counts emitted here.
pub type NodeFaces = SmallVec<[Face; MAX_FACES_PER_NODE]>;

/// Emit the faces of `node`. Faces whose points are dead or whose normal
/// cannot be normalized are dropped.
pub fn for_each_node_face<F>(node: &Node, points: &PointBuffer, mut f: F)
where
  F: FnMut(&Face),
{
  for face in node_faces(node, points) {
    f(&face);
  }
}

/// Collect the faces of `node`.
pub fn node_faces(node: &Node, points: &PointBuffer) -> NodeFaces {
  let mut faces = NodeFaces::new();
  let Some(corners) = corners(node) else {
    return faces;
  };
  let mature: [bool; 3] = std::array::from_fn(|i| node.triple[i].has_mature_mid_point());
  // Mature implies the mid-point exists.
  let mid = |i: usize| node.triple[i].mid_point.unwrap_or(corners[i]);
  let c = |i: usize| corners[tri_mod(i)];

  let mut push = |triangle: [PointId; 3]| {
    if let Some(normal) = face_normal(points, triangle) {
      faces.push(Face {
        points: triangle,
        normal,
      });
    }
  };

  match mature.iter().filter(|m| **m).count() {
    0 => {
      let triangle = corners;
      if node.normal != Vec3::ZERO {
        faces.push(Face {
          points: triangle,
          normal: node.normal,
        });
      } else {
        push(triangle);
      }
    }
    1 => {
      let m = mature.iter().position(|m| *m).unwrap_or(0);
      push([mid(m), c(m), c(m + 1)]);
      push([c(m), mid(m), c(m + 2)]);
    }
    2 => {
      let o = mature.iter().position(|m| !*m).unwrap_or(0);
      let (m1, m2) = (tri_mod(o + 1), tri_mod(o + 2));
      push([c(o), mid(m2), mid(m1)]);
      push([c(m1), c(m2), mid(m2)]);
      push([mid(m1), mid(m2), c(m2)]);
    }
    _ => {
      push([c(0), mid(2), mid(1)]);
      push([c(1), mid(0), mid(2)]);
      push([c(2), mid(1), mid(0)]);
      push([mid(0), mid(1), mid(2)]);
    }
  }
  faces
}

#[inline]
fn corners(node: &Node) -> Option<[PointId; 3]> {
  Some([node.corner(0)?, node.corner(1)?, node.corner(2)?])
}

fn face_normal(points: &PointBuffer, triangle: [PointId; 3]) -> Option<Vec3> {
  let [a, b, c] = triangle.map(|id| points.get(id).map(|point| point.pos));
  Triangle3::new(a?, b?, c?).unit_normal()
}

#[cfg(test)]
#[path = "face_test.rs"]
mod face_test;
