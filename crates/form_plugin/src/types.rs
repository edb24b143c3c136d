//! Core data types shared by the surface engine.

use glam::Vec3;

/// Where detail should be concentrated during a tick.
///
/// `center` is usually the camera position; `min_distance` is the near
/// distance below which triangles stop growing in importance.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct LodParameters {
  pub center: Vec3,
  pub min_distance: f32,
}

impl LodParameters {
  /// Parameters that can never match a real focus; the first tick against
  /// them always rescores.
  pub const INVALID: Self = Self {
    center: Vec3::splat(f32::MAX),
    min_distance: -1.0,
  };

  pub fn new(center: Vec3, min_distance: f32) -> Self {
    Self {
      center,
      min_distance,
    }
  }

  pub fn is_valid(&self) -> bool {
    self.min_distance > 0.0 && self.center.is_finite()
  }
}

impl Default for LodParameters {
  fn default() -> Self {
    Self::INVALID
  }
}

/// Sphere, used both as a formation shape and as a collision query volume.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct Sphere3 {
  pub center: Vec3,
  pub radius: f32,
}

impl Sphere3 {
  pub fn new(center: Vec3, radius: f32) -> Self {
    Self { center, radius }
  }
}

/// Half-line with a unit direction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray3 {
  pub position: Vec3,
  pub direction: Vec3,
}

impl Ray3 {
  pub fn new(position: Vec3, direction: Vec3) -> Self {
    Self {
      position,
      direction,
    }
  }

  /// Point at distance `t` along the ray.
  #[inline]
  pub fn at(&self, t: f32) -> Vec3 {
    self.position + self.direction * t
  }
}

/// Triangle with counter-clockwise winding; the normal is `(b - a) × (c - a)`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Triangle3 {
  pub points: [Vec3; 3],
}

impl Triangle3 {
  pub fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
    Self { points: [a, b, c] }
  }

  /// Unnormalized normal; its length is twice the area.
  #[inline]
  pub fn normal(&self) -> Vec3 {
    let [a, b, c] = self.points;
    (b - a).cross(c - a)
  }

  /// Unit normal, or `None` for a degenerate triangle.
  #[inline]
  pub fn unit_normal(&self) -> Option<Vec3> {
    self.normal().try_normalize()
  }

  #[inline]
  pub fn area(&self) -> f32 {
    self.normal().length() * 0.5
  }

  #[inline]
  pub fn centroid(&self) -> Vec3 {
    let [a, b, c] = self.points;
    (a + b + c) / 3.0
  }
}

/// Plane through `position` with a unit `normal`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane3 {
  pub position: Vec3,
  pub normal: Vec3,
}

impl Plane3 {
  /// Plane containing the triangle, or `None` if it is degenerate.
  pub fn from_triangle(triangle: &Triangle3) -> Option<Self> {
    triangle.unit_normal().map(|normal| Self {
      position: triangle.points[0],
      normal,
    })
  }

  /// Signed distance of `point` from the plane; positive on the normal side.
  #[inline]
  pub fn signed_distance(&self, point: Vec3) -> f32 {
    (point - self.position).dot(self.normal)
  }
}

/// Output vertex as consumed by a renderer.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
  /// Position relative to the surrounding's origin.
  pub position: [f32; 3],

  /// Sum of adjacent face normals; unit length once the mesh is finished.
  pub normal: [f32; 3],

  /// RGBA color.
  pub color: [u8; 4],
}

impl Default for Vertex {
  fn default() -> Self {
    Self {
      position: [0.0; 3],
      normal: [0.0; 3],
      color: [255; 4],
    }
  }
}

/// Axis-aligned bounding box.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct MinMaxAABB {
  pub min: [f32; 3],
  pub max: [f32; 3],
}

impl MinMaxAABB {
  /// Create AABB with inverted extents (ready for encapsulation).
  pub fn empty() -> Self {
    Self {
      min: [f32::INFINITY; 3],
      max: [f32::NEG_INFINITY; 3],
    }
  }

  /// Expand AABB to include a point.
  #[inline]
  pub fn encapsulate(&mut self, point: [f32; 3]) {
    for i in 0..3 {
      self.min[i] = self.min[i].min(point[i]);
      self.max[i] = self.max[i].max(point[i]);
    }
  }

  /// Check if AABB is valid (min <= max on all axes).
  pub fn is_valid(&self) -> bool {
    self.min[0] <= self.max[0] && self.min[1] <= self.max[1] && self.min[2] <= self.max[2]
  }
}

impl Default for MinMaxAABB {
  fn default() -> Self {
    Self::empty()
  }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;
