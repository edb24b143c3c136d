//! Shaders - where surface displacement enters the tree.
//!
//! The subdivision engine only decides *which* edges get a mid-point. A
//! [`Shader`] decides *where* that mid-point goes. Each polyhedron carries
//! its own shader, shared behind an `Arc` so a surrounding can hand it to
//! worker threads.
//!
//! # Determinism
//!
//! Two cousins share every mid-point and either one may be the first to
//! expand, so a shader must give the same answer whichever node of the pair
//! is passed as `node`. The helpers on [`MidPointContext`] are symmetric.

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::node::{hash_seed, tri_mod, Node};
use crate::point::PointBuffer;
use crate::types::Sphere3;

/// Unnormalized directions of the four root corners.
///
/// With this ordering every face of the root tetrahedron winds so that
/// `(b - a) × (c - a)` points away from the center.
pub const ROOT_CORNER_DIRECTIONS: [Vec3; 4] = [
  Vec3::new(-1.0, -1.0, -1.0),
  Vec3::new(-1.0, 1.0, 1.0),
  Vec3::new(1.0, -1.0, 1.0),
  Vec3::new(1.0, 1.0, -1.0),
];

/// Root corners of a regular tetrahedron inscribed in `shape`.
pub fn tetrahedron_corners(shape: &Sphere3) -> [Vec3; 4] {
  let scale = shape.radius / 3f32.sqrt();
  ROOT_CORNER_DIRECTIONS.map(|direction| shape.center + direction * scale)
}

/// Everything a shader may look at when placing one mid-point.
pub struct MidPointContext<'a> {
  pub shape: &'a Sphere3,
  /// The node requesting the mid-point.
  pub node: &'a Node,
  /// The node across edge `edge`.
  pub cousin: &'a Node,
  /// Index of the edge, which is opposite corner `edge` of `node`.
  pub edge: usize,
  /// Parent links between `node` and its root.
  pub depth: usize,
  pub points: &'a PointBuffer,
}

impl MidPointContext<'_> {
  /// Positions of the edge's two end points.
  pub fn edge_ends(&self) -> Option<(Vec3, Vec3)> {
    let a = self.node.corner(tri_mod(self.edge + 1))?;
    let b = self.node.corner(tri_mod(self.edge + 2))?;
    Some((self.points.get(a)?.pos, self.points.get(b)?.pos))
  }

  /// Seed shared by both sides of the edge.
  pub fn edge_seed(&self) -> u32 {
    let side = |node: &Node| hash_seed(hash_seed(node.seed).wrapping_add(self.edge as u32));
    side(self.node).wrapping_add(side(self.cousin))
  }
}

/// Places root corners and mid-points for one polyhedron.
pub trait Shader: Send + Sync {
  /// Positions of the four root corners.
  fn init_root_points(&self, shape: &Sphere3, seed: u32) -> [Vec3; 4];

  /// Position of a new mid-point, or `None` if it cannot be placed (for
  /// example because it would fall below the float precision of the edge).
  fn init_mid_point(&self, context: &MidPointContext<'_>) -> Option<Vec3>;
}

/// Project `direction` onto the sphere of `radius` around `center`.
#[inline]
fn place_at_radius(center: Vec3, direction: Vec3, radius: f32) -> Option<Vec3> {
  let position = center + direction.try_normalize()? * radius;
  position.is_finite().then_some(position)
}

/// A perfect sphere: every mid-point is pushed out to the radius.
#[derive(Clone, Copy, Debug, Default)]
pub struct SphereShader;

impl Shader for SphereShader {
  fn init_root_points(&self, shape: &Sphere3, _seed: u32) -> [Vec3; 4] {
    tetrahedron_corners(shape)
  }

  fn init_mid_point(&self, context: &MidPointContext<'_>) -> Option<Vec3> {
    let (a, b) = context.edge_ends()?;
    let center = context.shape.center;
    place_at_radius(center, (a - center) + (b - center), context.shape.radius)
  }
}

/// Tunables of [`PlanetShader`].
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PlanetShaderConfig {
  /// Depth below which mid-point altitude is drawn at random.
  pub depth_medium: usize,
  /// Spread of the random height exponent.
  pub random_range: f32,
  /// Scale of the altitude perturbation at medium depth.
  pub medium_coefficient: f32,
}

impl Default for PlanetShaderConfig {
  fn default() -> Self {
    Self {
      depth_medium: 2,
      random_range: 0.002,
      medium_coefficient: 0.35,
    }
  }
}

/// Rough, seeded planet surface.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlanetShader {
  pub config: PlanetShaderConfig,
}

impl PlanetShader {
  pub fn new(config: PlanetShaderConfig) -> Self {
    Self { config }
  }

  fn random_height_coefficient(&self, rng: &mut StdRng) -> f32 {
    let exponent = (0.5 - rng.random::<f32>()) * self.config.random_range;
    exponent.exp()
  }

  /// Shallow mid-points get a fresh random altitude.
  fn random_altitude(&self, shape: &Sphere3, rng: &mut StdRng) -> f32 {
    shape.radius * self.random_height_coefficient(rng)
  }

  /// Deeper mid-points interpolate their ends' altitudes with a perturbation
  /// that fades in with depth and shrinks with edge size.
  fn interpolated_altitude(&self, shape: &Sphere3, a: Vec3, b: Vec3, depth: usize, rng: &mut StdRng) -> f32 {
    let altitude = ((a - shape.center).length() + (b - shape.center).length()) * 0.5;

    let mut rnd = rng.random::<f32>() * 2.0 - 1.0;
    rnd *= rnd * rnd;

    let depth_past_medium = depth.saturating_sub(self.config.depth_medium) as f32;
    let variance = self.config.medium_coefficient
      * 0.5f32.powi(depth.min(i32::MAX as usize) as i32)
      * (0.1 * depth_past_medium).sin()
      * shape.radius;

    altitude + rnd * variance
  }
}

impl Shader for PlanetShader {
  fn init_root_points(&self, shape: &Sphere3, seed: u32) -> [Vec3; 4] {
    let mut rng = StdRng::seed_from_u64(u64::from(seed.wrapping_add(1)));
    ROOT_CORNER_DIRECTIONS.map(|direction| {
      let radius = shape.radius * self.random_height_coefficient(&mut rng);
      shape.center + direction.normalize() * radius
    })
  }

  fn init_mid_point(&self, context: &MidPointContext<'_>) -> Option<Vec3> {
    let (a, b) = context.edge_ends()?;
    let shape = context.shape;
    let mut rng = StdRng::seed_from_u64(u64::from(context.edge_seed()));

    let altitude = if context.depth >= self.config.depth_medium {
      self.interpolated_altitude(shape, a, b, context.depth, &mut rng)
    } else {
      self.random_altitude(shape, &mut rng)
    };

    place_at_radius(shape.center, (a - shape.center) + (b - shape.center), altitude)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::Triangle3;

  #[test]
  fn test_root_faces_point_outward() {
    let shape = Sphere3::new(Vec3::new(5.0, -2.0, 1.0), 10.0);
    let corners = tetrahedron_corners(&shape);
    // Corner order of the root's four children.
    let faces = [[0, 3, 2], [3, 0, 1], [2, 1, 0], [1, 2, 3]];
    for [a, b, c] in faces {
      let triangle = Triangle3::new(corners[a], corners[b], corners[c]);
      let outward = triangle.centroid() - shape.center;
      assert!(triangle.normal().dot(outward) > 0.0, "face {:?} points inward", [a, b, c]);
    }
    for corner in corners {
      assert!(((corner - shape.center).length() - shape.radius).abs() < 1e-4);
    }
  }

  fn two_node_context(points: &mut PointBuffer, a: Vec3, b: Vec3) -> (Node, Node) {
    let mut node = Node {
      seed: 11,
      ..Default::default()
    };
    let mut cousin = Node {
      seed: 29,
      ..Default::default()
    };
    let ids = [points.create().unwrap(), points.create().unwrap(), points.create().unwrap()];
    points[ids[1]].pos = a;
    points[ids[2]].pos = b;
    for i in 0..3 {
      node.triple[i].corner = Some(ids[i]);
    }
    // The cousin sees the same edge from the other side.
    cousin.triple[1].corner = Some(ids[2]);
    cousin.triple[2].corner = Some(ids[1]);
    (node, cousin)
  }

  #[test]
  fn test_sphere_shader_mid_point_on_surface() {
    let shape = Sphere3::new(Vec3::ZERO, 2.0);
    let mut points = PointBuffer::new(3);
    let (node, cousin) = two_node_context(&mut points, Vec3::new(2.0, 0.0, 0.0), Vec3::new(0.0, 2.0, 0.0));
    let context = MidPointContext {
      shape: &shape,
      node: &node,
      cousin: &cousin,
      edge: 0,
      depth: 1,
      points: &points,
    };
    let mid = SphereShader.init_mid_point(&context).unwrap();
    assert!((mid.length() - 2.0).abs() < 1e-5);
    assert!((mid.x - mid.y).abs() < 1e-5, "mid-point should bisect the edge");
  }

  #[test]
  fn test_sphere_shader_rejects_antipodal_edge() {
    let shape = Sphere3::new(Vec3::ZERO, 1.0);
    let mut points = PointBuffer::new(3);
    let (node, cousin) = two_node_context(&mut points, Vec3::X, -Vec3::X);
    let context = MidPointContext {
      shape: &shape,
      node: &node,
      cousin: &cousin,
      edge: 0,
      depth: 0,
      points: &points,
    };
    assert!(SphereShader.init_mid_point(&context).is_none());
  }

  #[test]
  fn test_planet_shader_is_symmetric() {
    let shape = Sphere3::new(Vec3::ZERO, 100.0);
    let shader = PlanetShader::default();
    let mut points = PointBuffer::new(3);
    let (node, cousin) = two_node_context(&mut points, Vec3::new(100.0, 0.0, 0.0), Vec3::new(0.0, 100.0, 0.0));

    for depth in [0, 5] {
      let forward = MidPointContext {
        shape: &shape,
        node: &node,
        cousin: &cousin,
        edge: 0,
        depth,
        points: &points,
      };
      let backward = MidPointContext {
        node: &cousin,
        cousin: &node,
        ..forward
      };
      assert_eq!(
        shader.init_mid_point(&forward),
        shader.init_mid_point(&backward),
        "both cousins must agree on the mid-point at depth {}",
        depth
      );
    }
  }

  #[test]
  fn test_planet_shader_root_points_are_seeded() {
    let shape = Sphere3::new(Vec3::ZERO, 100.0);
    let shader = PlanetShader::default();
    assert_eq!(shader.init_root_points(&shape, 3), shader.init_root_points(&shape, 3));
    for corner in shader.init_root_points(&shape, 3) {
      assert!((corner.length() - 100.0).abs() < 0.2, "roughness stays within the random range");
    }
  }
}
