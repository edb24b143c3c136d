//! Surrounding - the adaptive surface around a moving focus.
//!
//! A surrounding owns every arena (points, nodes, quaterna) and the
//! polyhedra anchored in them. Each tick it rescores the tree against the
//! current [`LodParameters`], re-sorts the quaterna by parent score and then
//! churns: high-scoring leaves are expanded into spare quaterna or into the
//! worst-scoring quaterna, whose children are torn down to make room.
//!
//! # Module Structure
//!
//! - [`budget`]: [`ChurnBudget`] rate limits and [`ChurnStats`]
//! - [`config`]: [`SurroundingConfig`] capacities and scoring coefficients
//! - `expand`: the expand transaction and node teardown
//! - `churn`: tick, significance test, candidate gathering
//! - `capacity`: collapse, target changes, block compaction
//! - [`verify`]: invariant checks
//!
//! # Threading
//!
//! Mutation is single-writer. Scoring fans out over rayon internally but
//! completes before churn begins. Readers (mesh generation aside, which
//! needs `&mut` for the point vertex cache) only need `&self`; share a
//! surrounding across threads through [`SurroundingWorker`](crate::worker::SurroundingWorker).

pub mod budget;
mod capacity;
mod churn;
pub mod config;
mod expand;
pub mod verify;

use std::sync::Arc;

use glam::Vec3;

pub use budget::{ChurnBudget, ChurnStats};
pub use config::SurroundingConfig;
pub use expand::ExpandError;

use crate::mesh::{self, Mesh};
use crate::node::{BlockId, Node, NodeId, PolyhedronId};
use crate::node_buffer::NodeBuffer;
use crate::point::PointBuffer;
use crate::polyhedron::Polyhedron;
use crate::quaterna::QuaternaBuffer;
use crate::ray_cast::{self, RayCastResult};
use crate::score::{score_nodes, NodeScorer, ScoreSummary};
use crate::shader::Shader;
use crate::sphere_query;
use crate::types::{LodParameters, Ray3, Sphere3, Triangle3};

pub struct Surrounding {
  config: SurroundingConfig,
  points: PointBuffer,
  nodes: NodeBuffer,
  quaterna: QuaternaBuffer,
  /// Indexed by `PolyhedronId::index`.
  polyhedra: Vec<Option<Polyhedron>>,
  target_num_quaterna: usize,

  /// Parameters of the last full rescore.
  lod: LodParameters,
  score_summary: ScoreSummary,
  /// Accumulated origin shift.
  origin: Vec3,

  /// The tree changed since the last mesh was generated.
  changed: bool,
  /// Structural work is pending; bypasses the significance test.
  needs_rescore: bool,
  last_churn: ChurnStats,
}

impl Surrounding {
  pub fn new(config: SurroundingConfig) -> Self {
    let target_num_quaterna = config.initial_target_num_quaterna.min(config.max_num_quaterna);
    Self {
      points: PointBuffer::new(config.max_num_points()),
      nodes: NodeBuffer::new(config.max_num_quaterna),
      quaterna: QuaternaBuffer::new(config.max_num_quaterna),
      polyhedra: Vec::new(),
      target_num_quaterna,
      lod: LodParameters::INVALID,
      score_summary: ScoreSummary::EMPTY,
      origin: Vec3::ZERO,
      changed: false,
      needs_rescore: true,
      last_churn: ChurnStats::default(),
      config,
    }
  }

  // ---------------------------------------------------------------------
  // Statistics
  // ---------------------------------------------------------------------

  #[inline]
  pub fn config(&self) -> &SurroundingConfig {
    &self.config
  }

  #[inline]
  pub fn num_nodes_used(&self) -> usize {
    self.nodes.len()
  }

  #[inline]
  pub fn num_quaterna_used(&self) -> usize {
    self.quaterna.len()
  }

  #[inline]
  pub fn target_num_quaterna(&self) -> usize {
    self.target_num_quaterna
  }

  /// Capacity in quaterna.
  #[inline]
  pub fn capacity(&self) -> usize {
    self.quaterna.capacity()
  }

  #[inline]
  pub fn num_points_used(&self) -> usize {
    self.points.len()
  }

  /// `true` if the tree changed since the last [`generate_mesh`](Self::generate_mesh).
  #[inline]
  pub fn is_changed(&self) -> bool {
    self.changed
  }

  /// Parent score of the worst used quaterna, 0 if none are used.
  #[inline]
  pub fn min_parent_score(&self) -> f32 {
    self.quaterna.min_parent_score()
  }

  /// Squared distance from the focus to the nearest leaf at the last rescore.
  #[inline]
  pub fn min_leaf_distance_squared(&self) -> f32 {
    self.score_summary.min_leaf_distance_squared
  }

  /// `(min, max)` leaf score at the last rescore.
  #[inline]
  pub fn leaf_score_range(&self) -> (f32, f32) {
    self.score_summary.leaf_score_range()
  }

  #[inline]
  pub fn last_churn_stats(&self) -> ChurnStats {
    self.last_churn
  }

  #[inline]
  pub fn origin(&self) -> Vec3 {
    self.origin
  }

  #[inline]
  pub fn lod_parameters(&self) -> LodParameters {
    self.lod
  }

  // ---------------------------------------------------------------------
  // Tree access
  // ---------------------------------------------------------------------

  #[inline]
  pub fn nodes(&self) -> &NodeBuffer {
    &self.nodes
  }

  #[inline]
  pub fn points(&self) -> &PointBuffer {
    &self.points
  }

  #[inline]
  pub fn quaterna(&self) -> &QuaternaBuffer {
    &self.quaterna
  }

  /// The node behind `id`, or `None` if the id is stale.
  #[inline]
  pub fn node(&self, id: NodeId) -> Option<&Node> {
    self.nodes.get(id)
  }

  /// Children block of `id`, if it is alive and has children.
  pub fn children(&self, id: NodeId) -> Option<BlockId> {
    self.nodes.get(id)?.children()
  }

  pub fn root_node(&self, polyhedron: PolyhedronId) -> Option<NodeId> {
    self.nodes.is_root_alive(polyhedron).then_some(NodeId::Root(polyhedron))
  }

  /// Every live leaf below a root, with its id.
  pub fn leaves(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
    self.nodes.iter_used().filter(|(_, node)| node.is_leaf())
  }

  // ---------------------------------------------------------------------
  // Polyhedra
  // ---------------------------------------------------------------------

  /// Anchor a new formation instance. `shape` is in world space; it is
  /// shifted by the current origin.
  ///
  /// Returns `None` if the point pool cannot hold the root points.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "surrounding::add_polyhedron"))]
  pub fn add_polyhedron(&mut self, shape: Sphere3, seed: u32, shader: Arc<dyn Shader>) -> Option<PolyhedronId> {
    let local_shape = Sphere3::new(shape.center - self.origin, shape.radius);
    let polyhedron = Polyhedron::new(local_shape, seed, shader, &mut self.points)?;

    let id = self.nodes.alloc_root();
    self.nodes[NodeId::Root(id)] = polyhedron.root_node(id);
    if self.polyhedra.len() <= id.index() {
      self.polyhedra.resize_with(id.index() + 1, || None);
    }
    self.polyhedra[id.index()] = Some(polyhedron);

    self.needs_rescore = true;
    self.changed = true;
    Some(id)
  }

  /// Collapse a formation's tree and release its root. Returns `false` for a
  /// stale id.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "surrounding::remove_polyhedron"))]
  pub fn remove_polyhedron(&mut self, id: PolyhedronId) -> bool {
    if !self.nodes.is_root_alive(id) {
      return false;
    }
    self.collapse_nodes(NodeId::Root(id));
    if let Some(polyhedron) = self.polyhedra[id.index()].take() {
      polyhedron.release_points(&mut self.points);
    }
    self.nodes.free_root(id);

    self.needs_rescore = true;
    self.changed = true;
    true
  }

  pub fn polyhedron(&self, id: PolyhedronId) -> Option<&Polyhedron> {
    if !self.nodes.is_root_alive(id) {
      return None;
    }
    self.polyhedra.get(id.index())?.as_ref()
  }

  pub fn polyhedron_ids(&self) -> impl Iterator<Item = PolyhedronId> + '_ {
    self.nodes.root_ids()
  }

  /// Polyhedron whose tree holds `id`.
  pub fn polyhedron_of(&self, id: NodeId) -> Option<PolyhedronId> {
    self.nodes.get(id)?;
    self.nodes.polyhedron_of(id)
  }

  // ---------------------------------------------------------------------
  // Origin
  // ---------------------------------------------------------------------

  /// Shift everything by `-delta` so coordinates near the new origin stay
  /// precise.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "surrounding::reset_origin"))]
  pub fn reset_origin(&mut self, delta: Vec3) {
    self.origin += delta;

    for polyhedron in self.polyhedra.iter_mut().flatten() {
      polyhedron.shift_origin(delta, &mut self.points);
    }

    // Mid-points are shared by cousins; shift each one from exactly one side.
    let mut shifted = Vec::new();
    for (id, node) in self.nodes.iter_used() {
      for triplet in &node.triple {
        let Some(mid_point) = triplet.mid_point else {
          continue;
        };
        if triplet.cousin.map_or(true, |cousin| id > cousin) {
          shifted.push(mid_point);
        }
      }
    }
    for mid_point in shifted {
      self.points[mid_point].pos -= delta;
    }
    for node in self.nodes.used_nodes_mut().iter_mut().filter(|node| node.is_in_use()) {
      node.center -= delta;
    }
    for id in self.nodes.root_ids().collect::<Vec<_>>() {
      let root = NodeId::Root(id);
      self.nodes[root].center -= delta;
    }

    self.lod = LodParameters::INVALID;
    self.needs_rescore = true;
    self.changed = true;
  }

  // ---------------------------------------------------------------------
  // Scoring
  // ---------------------------------------------------------------------

  /// Rescore every used node against the current parameters.
  pub(crate) fn update_node_scores(&mut self) {
    let scorer = NodeScorer::new(&self.lod, self.config.score_coefficient);
    self.score_summary = score_nodes(
      self.nodes.used_nodes_mut(),
      &scorer,
      self.config.score_chunk_size,
      self.config.parallel_scoring,
    );
  }

  /// Propagate parent scores into the quaterna and re-sort.
  pub(crate) fn update_quaterna(&mut self) {
    #[cfg(feature = "tracing")]
    let _span = tracing::info_span!("update_quaterna", used = self.quaterna.len()).entered();

    self.quaterna.update_scores(&self.nodes);
    self.quaterna.sort();
  }

  // ---------------------------------------------------------------------
  // Readers
  // ---------------------------------------------------------------------

  /// Write every leaf's faces into `mesh` and clear the changed flag.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "surrounding::generate_mesh"))]
  pub fn generate_mesh(&mut self, mesh: &mut Mesh) {
    self.points.clear_vertices();
    mesh.clear();
    mesh.properties.origin = self.origin;
    mesh.properties.leaf_score_range = self.score_summary.leaf_score_range();
    mesh::write_leaves(&self.nodes, &mut self.points, mesh);
    self.changed = false;
  }

  /// Nearest contact of `ray` with a polyhedron within `length`.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "surrounding::cast_ray"))]
  pub fn cast_ray(&self, polyhedron: PolyhedronId, ray: &Ray3, length: f32) -> RayCastResult {
    match self.root_node(polyhedron) {
      Some(root) => ray_cast::cast_ray(&self.nodes, &self.points, root, ray, length),
      None => RayCastResult::miss(ray),
    }
  }

  /// Call `f` with every surface triangle of a polyhedron that may touch
  /// `sphere`, plus its unit normal.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "surrounding::for_each_face_in_sphere"))]
  pub fn for_each_face_in_sphere<F>(&self, polyhedron: PolyhedronId, sphere: &Sphere3, f: F)
  where
    F: FnMut(&Triangle3, Vec3),
  {
    if let Some(root) = self.root_node(polyhedron) {
      sphere_query::for_each_face_in_sphere(&self.nodes, &self.points, root, sphere, f);
    }
  }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
