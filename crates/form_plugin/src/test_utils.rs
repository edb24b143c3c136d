//! Test utilities shared by the unit tests.
//!
//! Provides deterministic shaders and fixtures for building small
//! surroundings in a known state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use glam::Vec3;

use crate::node::PolyhedronId;
use crate::shader::{tetrahedron_corners, MidPointContext, Shader};
use crate::surrounding::{verify::verify, ChurnBudget, Surrounding, SurroundingConfig};
use crate::types::{LodParameters, Sphere3};

// =============================================================================
// Mock Shaders
// =============================================================================

/// Mid-point is the plain edge midpoint. Every child lies in its parent's
/// plane, so the surface stays a tetrahedron.
pub struct FlatShader;

impl Shader for FlatShader {
  fn init_root_points(&self, shape: &Sphere3, _seed: u32) -> [Vec3; 4] {
    tetrahedron_corners(shape)
  }

  fn init_mid_point(&self, ctx: &MidPointContext) -> Option<Vec3> {
    let (a, b) = ctx.edge_ends()?;
    Some((a + b) * 0.5)
  }
}

/// Flat shader that refuses mid-points once a number of them were placed.
pub struct FailingShader {
  remaining: AtomicUsize,
}

impl FailingShader {
  /// Places `successes` mid-points, then fails every request.
  pub fn after(successes: usize) -> Self {
    Self {
      remaining: AtomicUsize::new(successes),
    }
  }

  /// Fails every request.
  pub fn always() -> Self {
    Self::after(0)
  }
}

impl Shader for FailingShader {
  fn init_root_points(&self, shape: &Sphere3, _seed: u32) -> [Vec3; 4] {
    tetrahedron_corners(shape)
  }

  fn init_mid_point(&self, ctx: &MidPointContext) -> Option<Vec3> {
    self
      .remaining
      .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
      .ok()?;
    FlatShader.init_mid_point(ctx)
  }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Unit sphere at the origin.
pub fn unit_sphere() -> Sphere3 {
  Sphere3::new(Vec3::ZERO, 1.0)
}

/// Sequential config with unlimited churn, so ticks are reproducible.
pub fn test_config(capacity: usize, target: usize) -> SurroundingConfig {
  SurroundingConfig::new(capacity)
    .with_initial_target(target)
    .with_parallel_scoring(false)
    .with_churn_budget(ChurnBudget::UNLIMITED)
}

/// Surrounding holding one unit sphere drawn by `shader`.
pub fn surrounding_with(config: SurroundingConfig, shader: Arc<dyn Shader>) -> (Surrounding, PolyhedronId) {
  let mut surrounding = Surrounding::new(config);
  let id = surrounding
    .add_polyhedron(unit_sphere(), 7, shader)
    .expect("point pool holds the root points");
  (surrounding, id)
}

/// Surrounding holding one flat unit sphere.
pub fn flat_surrounding(capacity: usize, target: usize) -> (Surrounding, PolyhedronId) {
  surrounding_with(test_config(capacity, target), Arc::new(FlatShader))
}

/// Focus `distance` away from the origin along `direction`.
pub fn focus(direction: Vec3, distance: f32, min_distance: f32) -> LodParameters {
  LodParameters::new(direction.normalize() * distance, min_distance)
}

/// Tick until a tick expands nothing. Returns the number of ticks run.
pub fn tick_until_settled(surrounding: &mut Surrounding, lod: &LodParameters, max_ticks: usize) -> usize {
  for tick in 1..=max_ticks {
    surrounding.tick(lod);
    if surrounding.last_churn_stats().expansions == 0 {
      return tick;
    }
  }
  max_ticks
}

/// Panic with the violated invariant, if any.
#[track_caller]
pub fn assert_invariants(surrounding: &Surrounding) {
  if let Err(violation) = verify(surrounding) {
    panic!("invariant violated: {violation}");
  }
}
