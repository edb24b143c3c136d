//! Mesh output.
//!
//! Leaves are written face by face. A point becomes a vertex the first time
//! a face uses it; its index is cached on the point so cousins sharing the
//! point share the vertex. Face normals accumulate into their vertices and
//! are normalized once every face is written.

use glam::Vec3;

use crate::face::node_faces;
use crate::node_buffer::NodeBuffer;
use crate::point::{PointBuffer, PointId};
use crate::types::{MinMaxAABB, Vertex};

/// Context a mesh was generated in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshProperties {
  /// Surrounding origin; vertex positions are relative to it.
  pub origin: Vec3,
  /// `(min, max)` leaf score at generation time.
  pub leaf_score_range: (f32, f32),
}

impl Default for MeshProperties {
  fn default() -> Self {
    Self {
      origin: Vec3::ZERO,
      leaf_score_range: (0.0, 0.0),
    }
  }
}

/// Mesh generation result.
#[derive(Clone, Debug, Default)]
pub struct Mesh {
  /// Output vertices with positions, normals and colors.
  pub vertices: Vec<Vertex>,

  /// Triangle indices (3 indices per triangle).
  pub indices: Vec<u32>,

  /// Bounding box encompassing all vertices.
  pub bounds: MinMaxAABB,

  pub properties: MeshProperties,

  /// Vertex limit, `None` for unbounded.
  pub max_vertices: Option<usize>,
  /// Index limit, `None` for unbounded.
  pub max_indices: Option<usize>,

  truncated: bool,
}

impl Mesh {
  pub fn new() -> Self {
    Self::default()
  }

  /// A mesh that stops accepting faces once either buffer is full.
  pub fn with_capacity(max_vertices: usize, max_indices: usize) -> Self {
    Self {
      vertices: Vec::with_capacity(max_vertices),
      indices: Vec::with_capacity(max_indices),
      max_vertices: Some(max_vertices),
      max_indices: Some(max_indices),
      ..Default::default()
    }
  }

  /// Clear all buffers, preserving capacity and limits.
  pub fn clear(&mut self) {
    self.vertices.clear();
    self.indices.clear();
    self.bounds = MinMaxAABB::empty();
    self.properties = MeshProperties::default();
    self.truncated = false;
  }

  /// Returns true if no geometry was generated.
  pub fn is_empty(&self) -> bool {
    self.vertices.is_empty()
  }

  /// Number of triangles in the mesh.
  pub fn triangle_count(&self) -> usize {
    self.indices.len() / 3
  }

  /// `true` if faces were dropped because a limit was reached.
  pub fn is_truncated(&self) -> bool {
    self.truncated
  }

  #[inline]
  fn has_room(&self, new_vertices: usize) -> bool {
    self.max_vertices.map_or(true, |max| self.vertices.len() + new_vertices <= max)
      && self.max_indices.map_or(true, |max| self.indices.len() + 3 <= max)
  }
}

/// Grey level of a face whose node scores `score` within `range`.
pub fn score_color(score: f32, range: (f32, f32)) -> [u8; 4] {
  let (min, max) = range;
  let t = if max > min { ((score - min) / (max - min)).clamp(0.0, 1.0) } else { 1.0 };
  let grey = (64.0 + 191.0 * t) as u8;
  [grey, grey, grey, 255]
}

/// Append the faces of every used leaf to `mesh`. Point vertex caches must
/// have been cleared for this pass.
pub(crate) fn write_leaves(nodes: &NodeBuffer, points: &mut PointBuffer, mesh: &mut Mesh) {
  let range = mesh.properties.leaf_score_range;
  'leaves: for (_, node) in nodes.iter_used().filter(|(_, node)| node.is_leaf()) {
    let color = score_color(node.score, range);
    for face in node_faces(node, points) {
      let new_vertices = face.points.iter().filter(|id| points[**id].vertex().is_none()).count();
      if !mesh.has_room(new_vertices) {
        mesh.truncated = true;
        break 'leaves;
      }
      for id in face.points {
        let index = vertex_index(points, mesh, id, color);
        let vertex = &mut mesh.vertices[index as usize];
        let normal = Vec3::from_array(vertex.normal) + face.normal;
        vertex.normal = normal.to_array();
        mesh.indices.push(index);
      }
    }
  }

  for vertex in &mut mesh.vertices {
    let normal = Vec3::from_array(vertex.normal).normalize_or_zero();
    vertex.normal = normal.to_array();
  }
}

/// Vertex of `id`, created on first use.
fn vertex_index(points: &mut PointBuffer, mesh: &mut Mesh, id: PointId, color: [u8; 4]) -> u32 {
  let point = &mut points[id];
  if let Some(index) = point.vertex {
    return index;
  }
  let index = mesh.vertices.len() as u32;
  let position = point.pos.to_array();
  point.vertex = Some(index);
  mesh.vertices.push(Vertex {
    position,
    normal: [0.0; 3],
    color,
  });
  mesh.bounds.encapsulate(position);
  index
}

#[cfg(test)]
#[path = "mesh_test.rs"]
mod mesh_test;
