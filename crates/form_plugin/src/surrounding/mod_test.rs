use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::*;
use crate::node::CENTER_CHILD;
use crate::shader::{PlanetShader, PlanetShaderConfig, SphereShader};
use crate::test_utils::{
  assert_invariants, flat_surrounding, focus, surrounding_with, test_config, tick_until_settled, FailingShader,
};

/// Root expanded by hand: block of the four tetrahedron faces.
fn expanded_root(capacity: usize, target: usize) -> (Surrounding, PolyhedronId, BlockId) {
  let (mut surrounding, id) = flat_surrounding(capacity, target);
  let root = NodeId::Root(id);
  assert_eq!(surrounding.expand_node(root), Ok(()));
  let block = surrounding.children(root).unwrap();
  (surrounding, id, block)
}

/// Overwrite node scores, then refresh and re-sort the quaterna as a tick
/// would.
fn set_scores(surrounding: &mut Surrounding, scores: &[(NodeId, f32)]) {
  for &(id, score) in scores {
    surrounding.nodes[id].score = score;
  }
  surrounding.update_quaterna();
}

fn circle_focus(angle: f32) -> LodParameters {
  focus(Vec3::new(angle.cos(), 0.3, angle.sin()), 1.4, 0.05)
}

// =============================================================================
// Batch 1: Scenarios
// =============================================================================

/// A focus at the root center with target 1 expands the root and nothing
/// else.
#[test]
fn test_first_tick_expands_root() {
  let (mut surrounding, id) = flat_surrounding(4, 1);
  assert!(surrounding.tick(&LodParameters::new(Vec3::ZERO, 0.1)));

  assert_eq!(surrounding.num_quaterna_used(), 1);
  assert_eq!(surrounding.num_nodes_used(), 4);
  assert!(surrounding.children(NodeId::Root(id)).is_some());
  assert_eq!(surrounding.last_churn_stats().expansions, 1);
  assert_invariants(&surrounding);
}

/// Lowering the target on a tree without grandchildren releases exactly the
/// requested quaterna.
#[test]
fn test_shrink_to_target() {
  let (mut surrounding, _, block) = expanded_root(8, 8);
  for child in block.nodes() {
    assert_eq!(surrounding.expand_node(child), Ok(()));
  }
  assert_eq!(surrounding.num_quaterna_used(), 5);
  assert_eq!(surrounding.num_nodes_used(), 20);

  assert_eq!(surrounding.set_target_num_quaterna(2), 2);
  assert_eq!(surrounding.num_quaterna_used(), 2);
  assert_eq!(surrounding.num_nodes_used(), 8);
  assert_eq!(surrounding.target_num_quaterna(), 2);
  assert_invariants(&surrounding);
}

/// Shrinking stops at a quaterna whose nodes have children.
#[test]
fn test_shrink_stops_at_grandchildren() {
  let (mut surrounding, id) = flat_surrounding(8, 1);
  surrounding.tick(&focus(Vec3::Z, 2.0, 0.1));
  let node = surrounding.children(NodeId::Root(id)).unwrap().node(0);

  // Focus on the centroid of the node's first outer child, so that child
  // outscores its parent once expanded.
  let corners = surrounding.node(node).unwrap().triple.map(|t| surrounding.points()[t.corner.unwrap()].pos);
  let centroid = (corners[0] * 4.0 + corners[1] + corners[2]) / 6.0;
  surrounding.tick(&LodParameters::new(centroid, 0.01));
  surrounding.set_target_num_quaterna(8);

  let cousins = surrounding.node(node).unwrap().triple.map(|t| t.cousin.unwrap());
  for id in [node, cousins[1], cousins[2]] {
    assert_eq!(surrounding.expand_node(id), Ok(()));
  }
  let outer = surrounding.children(node).unwrap().node(0);
  assert_eq!(surrounding.expand_node(outer), Ok(()));
  assert_eq!(surrounding.num_quaterna_used(), 5);

  // The two cousin blocks go; the node's own block now sorts last and holds
  // an expanded child.
  assert_eq!(surrounding.set_target_num_quaterna(0), 3);
  assert_eq!(surrounding.num_quaterna_used(), 3);
  assert!(surrounding.node(node).is_some_and(|node| node.has_children()));
  assert!(surrounding.children(node).is_some_and(|children| surrounding.children(children.node(0)).is_some()));
  assert_invariants(&surrounding);
}

/// New children are linked to each other, and to the children of the
/// parent's cousins once those exist.
#[test]
fn test_cousins_after_expansion() {
  let (mut surrounding, _, block) = expanded_root(8, 8);
  let node = block.node(0);
  let neighbor = surrounding.node(node).unwrap().cousin(0).unwrap();

  surrounding.expand_node(node).unwrap();
  let children = surrounding.children(node).unwrap();
  let center = surrounding.node(children.node(CENTER_CHILD)).unwrap();
  for i in 0..3 {
    assert_eq!(center.cousin(i), Some(children.node(i)));
    let outer = surrounding.node(children.node(i)).unwrap();
    assert_eq!(outer.cousin(i), Some(children.node(CENTER_CHILD)));
    for edge in (0..3).filter(|edge| *edge != i) {
      assert_eq!(outer.cousin(edge), None, "neighbors are still leaves");
    }
  }

  surrounding.expand_node(neighbor).unwrap();
  let nephews = surrounding.children(neighbor).unwrap();
  assert_eq!(surrounding.node(children.node(1)).unwrap().cousin(0), Some(nephews.node(2)));
  assert_eq!(surrounding.node(children.node(2)).unwrap().cousin(0), Some(nephews.node(1)));
  assert_eq!(surrounding.node(nephews.node(1)).unwrap().cousin(0), Some(children.node(2)));
  assert_invariants(&surrounding);
}

// =============================================================================
// Batch 2: Expand / collapse
// =============================================================================

/// Collapsing an expansion restores the leaf and unhooks its children from
/// their neighbors.
#[test]
fn test_expand_collapse_round_trip() {
  let (mut surrounding, _, block) = expanded_root(8, 8);
  let node = block.node(0);
  let neighbor = surrounding.node(node).unwrap().cousin(0).unwrap();
  surrounding.expand_node(neighbor).unwrap();
  let before = surrounding.node(node).unwrap().clone();

  surrounding.expand_node(node).unwrap();
  let children = surrounding.children(node).unwrap();
  surrounding.collapse_nodes(node);

  let after = surrounding.node(node).unwrap();
  assert!(after.is_leaf());
  assert_eq!(after.triple.map(|t| t.cousin), before.triple.map(|t| t.cousin));
  assert!(children.nodes().iter().all(|child| surrounding.node(*child).is_none()), "old children are stale");
  assert_eq!(surrounding.num_quaterna_used(), 2);

  // The neighbor's block may have been moved down; look it up again.
  let nephews = surrounding.children(neighbor).unwrap();
  for lane in [1, 2] {
    assert_eq!(surrounding.node(nephews.node(lane)).unwrap().cousin(0), None);
  }
  assert_invariants(&surrounding);
}

/// Expanding a node that cannot expand fails and changes nothing.
#[test]
fn test_expand_not_expandable_is_noop() {
  let (mut surrounding, id, block) = expanded_root(8, 8);
  surrounding.expand_node(block.node(0)).unwrap();
  let outer = surrounding.children(block.node(0)).unwrap().node(0);
  let used = surrounding.num_quaterna_used();
  let points = surrounding.num_points_used();

  assert_eq!(surrounding.expand_node(NodeId::Root(id)), Err(ExpandError::NotExpandable));
  assert_eq!(surrounding.expand_node(outer), Err(ExpandError::NotExpandable), "outer cousins missing");
  assert_eq!(surrounding.num_quaterna_used(), used);
  assert_eq!(surrounding.num_points_used(), points);
  assert_invariants(&surrounding);
}

/// A reclaimed node's id no longer resolves.
#[test]
fn test_expand_stale_id() {
  let (mut surrounding, _, block) = expanded_root(8, 8);
  let node = block.node(0);
  surrounding.expand_node(node).unwrap();
  let child = surrounding.children(node).unwrap().node(3);
  surrounding.collapse_nodes(node);
  assert_eq!(surrounding.expand_node(child), Err(ExpandError::StaleNode));
}

/// A decrease blocked by grandchildren at the tail releases nothing and
/// leaves the mesh valid.
#[test]
fn test_blocked_shrink_is_not_a_change() {
  let (mut surrounding, _, block) = expanded_root(8, 8);
  let node = block.node(0);
  surrounding.expand_node(node).unwrap();
  let center = surrounding.children(node).unwrap().node(CENTER_CHILD);
  surrounding.expand_node(center).unwrap();
  // The node's block sorts last and holds the expanded center child.
  set_scores(&mut surrounding, &[(node, 1.0), (center, 5.0)]);
  surrounding.generate_mesh(&mut crate::mesh::Mesh::new());

  assert_eq!(surrounding.set_target_num_quaterna(1), 3);
  assert_eq!(surrounding.num_quaterna_used(), 3);
  assert!(!surrounding.is_changed());
  assert_invariants(&surrounding);
}

/// Collapsing a leaf or a stale id is ignored.
#[test]
fn test_collapse_leaf_is_noop() {
  let (mut surrounding, _, block) = expanded_root(8, 8);
  surrounding.generate_mesh(&mut crate::mesh::Mesh::new());
  surrounding.collapse_nodes(block.node(1));
  assert!(!surrounding.is_changed());
  assert_eq!(surrounding.num_quaterna_used(), 1);
}

/// Failed mid-points leave the tree and the point pool as they were.
#[test]
fn test_failing_shader() {
  let (mut surrounding, _) = surrounding_with(test_config(8, 8), Arc::new(FailingShader::always()));
  surrounding.tick(&focus(Vec3::Z, 2.0, 0.1));

  let stats = surrounding.last_churn_stats();
  assert_eq!(stats.expansions, 1, "only the root needs no new mid-points");
  assert!(stats.failed_expansions > 0);
  assert_eq!(surrounding.num_quaterna_used(), 1);
  assert_eq!(surrounding.num_points_used(), 4);
  assert_invariants(&surrounding);
}

/// Mid-points placed before a failure are kept for the next attempt.
#[test]
fn test_partial_mid_points_kept() {
  let (mut surrounding, _) = surrounding_with(test_config(8, 8), Arc::new(FailingShader::after(1)));
  let root = NodeId::Root(surrounding.polyhedron_ids().next().unwrap());
  surrounding.expand_node(root).unwrap();
  let child = surrounding.children(root).unwrap().node(0);

  assert_eq!(surrounding.expand_node(child), Err(ExpandError::MidPointFailed));
  assert!(surrounding.node(child).unwrap().is_leaf());
  assert_eq!(surrounding.num_points_used(), 5);
  assert_eq!(surrounding.num_quaterna_used(), 1);
  assert_invariants(&surrounding);
}

// =============================================================================
// Batch 3: Churn under motion
// =============================================================================

/// Invariants hold while the focus orbits and the target changes.
#[test]
fn test_invariants_while_orbiting() {
  let (mut surrounding, _) = surrounding_with(test_config(64, 64), Arc::new(SphereShader));

  for step in 0..48 {
    surrounding.tick(&circle_focus(step as f32 * 0.2));
    assert_invariants(&surrounding);
    assert!(surrounding.num_quaterna_used() <= surrounding.target_num_quaterna());

    match step {
      16 => {
        surrounding.set_target_num_quaterna(24);
        assert_invariants(&surrounding);
      }
      32 => {
        surrounding.set_target_num_quaterna(64);
      }
      _ => {}
    }
  }
  assert!(surrounding.num_quaterna_used() > 24);
}

/// A rough planet under random jumps of the focus.
#[test]
fn test_invariants_random_focus() {
  let shader = Arc::new(PlanetShader::new(PlanetShaderConfig::default()));
  let (mut surrounding, _) = surrounding_with(test_config(48, 48), shader);
  let mut rng = StdRng::seed_from_u64(3);

  for _ in 0..40 {
    let direction =
      Vec3::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0));
    let lod = focus(direction.normalize_or(Vec3::X), rng.random_range(1.05f32..3.0), 0.02);
    surrounding.tick(&lod);
    assert_invariants(&surrounding);
  }
}

/// With the target reached, detail follows the focus by reclaiming the
/// worst quaterna.
#[test]
fn test_detail_follows_focus() {
  let (mut surrounding, _) = surrounding_with(test_config(32, 32), Arc::new(SphereShader));
  let near = |surrounding: &Surrounding, direction: Vec3| {
    surrounding.leaves().filter(|(_, node)| node.center.dot(direction) > 0.0).count()
  };

  tick_until_settled(&mut surrounding, &focus(Vec3::X, 1.3, 0.02), 32);
  assert_eq!(surrounding.num_quaterna_used(), 32);
  assert!(near(&surrounding, Vec3::X) > near(&surrounding, Vec3::NEG_X));

  tick_until_settled(&mut surrounding, &focus(Vec3::NEG_X, 1.3, 0.02), 64);
  assert_eq!(surrounding.num_quaterna_used(), 32);
  assert!(near(&surrounding, Vec3::NEG_X) > near(&surrounding, Vec3::X));
  assert_invariants(&surrounding);
}

/// An expansion budget caps the work done per tick.
#[test]
fn test_expansion_budget() {
  let config = test_config(64, 64).with_churn_budget(ChurnBudget {
    max_passes: 0,
    max_expansions: 3,
  });
  let (mut surrounding, _) = surrounding_with(config, Arc::new(SphereShader));
  let lod = focus(Vec3::Z, 1.5, 0.05);

  surrounding.tick(&lod);
  assert_eq!(surrounding.last_churn_stats().expansions, 3);
  surrounding.tick(&lod);
  assert_eq!(surrounding.last_churn_stats().expansions, 3, "pending work bypasses the move test");
  assert_invariants(&surrounding);
}

// =============================================================================
// Batch 4: Tick bookkeeping
// =============================================================================

/// A settled tree is not rescored until the focus moves far enough.
#[test]
fn test_insignificant_move_skips_work() {
  let (mut surrounding, _) = flat_surrounding(16, 16);
  let lod = focus(Vec3::Z, 2.0, 0.1);
  tick_until_settled(&mut surrounding, &lod, 16);
  surrounding.generate_mesh(&mut crate::mesh::Mesh::new());

  let nudged = LodParameters::new(lod.center + Vec3::X * 0.001, lod.min_distance);
  assert!(!surrounding.tick(&nudged));
  assert_eq!(surrounding.last_churn_stats().passes, 0);
  assert_eq!(surrounding.lod_parameters(), lod);

  let moved = LodParameters::new(lod.center + Vec3::X * 0.5, lod.min_distance);
  surrounding.tick(&moved);
  assert!(surrounding.last_churn_stats().passes > 0);
  assert_eq!(surrounding.lod_parameters(), moved);
}

/// Invalid parameters are ignored.
#[test]
fn test_invalid_lod_ignored() {
  let (mut surrounding, id) = flat_surrounding(4, 4);
  assert!(surrounding.tick(&LodParameters::INVALID), "adding a polyhedron is a change");
  assert!(surrounding.children(NodeId::Root(id)).is_none());
}

/// Raising the target only takes effect during the next tick.
#[test]
fn test_raise_target_is_lazy() {
  let (mut surrounding, _) = flat_surrounding(32, 4);
  let lod = focus(Vec3::Z, 2.0, 0.1);
  tick_until_settled(&mut surrounding, &lod, 16);
  assert_eq!(surrounding.num_quaterna_used(), 4);

  assert_eq!(surrounding.set_target_num_quaterna(12), 12);
  assert_eq!(surrounding.num_quaterna_used(), 4);
  surrounding.tick(&lod);
  assert!(surrounding.num_quaterna_used() > 4);

  assert_eq!(surrounding.set_target_num_quaterna(1000), 32, "clamped to capacity");
}

/// With a spare quaterna anything expands; at target the worst sorted
/// parent score must be beaten.
#[test]
fn test_lowest_sorted_quaterna_score() {
  let (mut surrounding, _) = flat_surrounding(8, 2);
  assert_eq!(surrounding.lowest_sorted_quaterna_score(), f32::MIN_POSITIVE);
  tick_until_settled(&mut surrounding, &focus(Vec3::Z, 2.0, 0.1), 8);
  assert_eq!(surrounding.num_quaterna_used(), 2);
  assert_eq!(surrounding.lowest_sorted_quaterna_score(), surrounding.min_parent_score());
}

// =============================================================================
// Batch 5: Polyhedra and origin
// =============================================================================

/// Removing a polyhedron frees everything it held.
#[test]
fn test_remove_polyhedron() {
  let (mut surrounding, id) = surrounding_with(test_config(32, 32), Arc::new(SphereShader));
  tick_until_settled(&mut surrounding, &focus(Vec3::Y, 1.5, 0.05), 16);
  assert!(surrounding.num_quaterna_used() > 1);

  assert!(surrounding.remove_polyhedron(id));
  assert_eq!(surrounding.num_quaterna_used(), 0);
  assert_eq!(surrounding.num_nodes_used(), 0);
  assert_eq!(surrounding.num_points_used(), 0);
  assert!(surrounding.root_node(id).is_none());
  assert!(!surrounding.remove_polyhedron(id), "second removal is a stale id");
  assert_invariants(&surrounding);
}

/// Two polyhedra share the quaterna budget.
#[test]
fn test_two_polyhedra() {
  let mut surrounding = Surrounding::new(test_config(32, 32));
  let a = surrounding.add_polyhedron(Sphere3::new(Vec3::ZERO, 1.0), 1, Arc::new(SphereShader)).unwrap();
  let b = surrounding.add_polyhedron(Sphere3::new(Vec3::X * 4.0, 1.0), 2, Arc::new(SphereShader)).unwrap();
  tick_until_settled(&mut surrounding, &focus(Vec3::X, 2.0, 0.05), 16);

  assert!(surrounding.children(NodeId::Root(a)).is_some());
  assert!(surrounding.children(NodeId::Root(b)).is_some());
  let leaf = surrounding.leaves().next().map(|(leaf, _)| leaf).unwrap();
  assert!(matches!(surrounding.polyhedron_of(leaf), Some(owner) if owner == a || owner == b));
  assert_invariants(&surrounding);

  assert!(surrounding.remove_polyhedron(a));
  assert!(surrounding.leaves().all(|(leaf, _)| surrounding.polyhedron_of(leaf) == Some(b)));
  assert_invariants(&surrounding);
}

/// Moving the origin shifts every point exactly once.
#[test]
fn test_reset_origin() {
  let (mut surrounding, _) = surrounding_with(test_config(32, 32), Arc::new(SphereShader));
  tick_until_settled(&mut surrounding, &focus(Vec3::Z, 1.5, 0.05), 16);
  let before: Vec<_> = surrounding.points().iter().map(|(id, point)| (id, point.pos)).collect();
  let centers: Vec<_> = surrounding.nodes().iter_used().map(|(_, node)| node.center).collect();

  let delta = Vec3::new(0.25, -1.0, 2.0);
  surrounding.reset_origin(delta);

  assert_eq!(surrounding.origin(), delta);
  for (id, pos) in before {
    let moved = surrounding.points()[id].pos;
    assert!((moved - (pos - delta)).length() < 1e-5, "point {id:?} moved to {moved}, expected {}", pos - delta);
  }
  for (center, (_, node)) in centers.into_iter().zip(surrounding.nodes().iter_used()) {
    assert!((node.center - (center - delta)).length() < 1e-5);
  }
  assert!(!surrounding.lod_parameters().is_valid(), "next tick rescores");
  assert_invariants(&surrounding);
}

// =============================================================================
// Batch 6: Reclaim guards
// =============================================================================

/// At target with nothing sorted there is no quaterna to take.
#[test]
fn test_expand_without_sorted_quaterna() {
  let (mut surrounding, _, block) = expanded_root(8, 8);
  assert_eq!(surrounding.set_target_num_quaterna(1), 1);

  assert_eq!(surrounding.expand_node(block.node(0)), Err(ExpandError::NoReclaimableQuaterna));
  assert_eq!(surrounding.num_quaterna_used(), 1);
  assert_invariants(&surrounding);
}

/// The worst quaterna is only taken by a node that outscores its parent.
#[test]
fn test_reclaim_requires_higher_score() {
  let (mut surrounding, _, block) = expanded_root(8, 8);
  let (node, other) = (block.node(0), block.node(1));
  surrounding.expand_node(node).unwrap();
  surrounding.set_target_num_quaterna(2);
  set_scores(&mut surrounding, &[(node, 1.0), (other, 0.5)]);
  let points = surrounding.num_points_used();

  assert_eq!(surrounding.expand_node(other), Err(ExpandError::ReplacementNotSuitable));
  assert!(surrounding.node(other).unwrap().is_leaf());
  assert!(surrounding.node(node).unwrap().has_children());
  assert_eq!(surrounding.num_points_used(), points, "refused before any mid-point was placed");

  surrounding.nodes[other].score = 2.0;
  assert_eq!(surrounding.expand_node(other), Ok(()));
  assert!(surrounding.node(node).unwrap().is_leaf(), "lost its quaterna");
  assert!(surrounding.node(other).unwrap().has_children());
  assert_eq!(surrounding.num_quaterna_used(), 2);
  assert_invariants(&surrounding);
}

/// A worst quaterna whose nodes have children is never reclaimed.
#[test]
fn test_reclaim_skips_grandparents() {
  let (mut surrounding, _, block) = expanded_root(8, 8);
  let (node, other) = (block.node(0), block.node(1));
  surrounding.expand_node(node).unwrap();
  let center = surrounding.children(node).unwrap().node(CENTER_CHILD);
  surrounding.expand_node(center).unwrap();
  surrounding.set_target_num_quaterna(3);
  set_scores(&mut surrounding, &[(node, 1.0), (center, 5.0), (other, 2.0)]);

  let worst = surrounding.quaterna().lowest_sorted().unwrap();
  assert_eq!(surrounding.quaterna().get(worst).block(), surrounding.children(node).unwrap().index());
  assert_eq!(surrounding.expand_node(other), Err(ExpandError::ReplacementNotSuitable));
  assert!(surrounding.node(other).unwrap().is_leaf());
  assert_eq!(surrounding.num_quaterna_used(), 3);
  assert_invariants(&surrounding);
}

/// A node cannot take the quaterna it lives in.
#[test]
fn test_reclaim_own_block() {
  let (mut surrounding, _, block) = expanded_root(8, 8);
  let node = block.node(0);
  surrounding.expand_node(node).unwrap();
  let center = surrounding.children(node).unwrap().node(CENTER_CHILD);
  surrounding.set_target_num_quaterna(2);
  set_scores(&mut surrounding, &[(node, 1.0), (center, 3.0)]);

  assert_eq!(surrounding.expand_node(center), Err(ExpandError::WouldReplaceAncestor));
  assert!(surrounding.node(center).is_some_and(|center| center.is_leaf()));
  assert_invariants(&surrounding);
}

/// A churn pass skips a candidate whose block an earlier expansion in the
/// same pass reclaimed.
#[test]
fn test_churn_skips_reclaimed_candidate() {
  let (mut surrounding, _, block) = expanded_root(8, 8);
  let (node, other) = (block.node(0), block.node(1));
  surrounding.expand_node(node).unwrap();
  let center = surrounding.children(node).unwrap().node(CENTER_CHILD);
  surrounding.set_target_num_quaterna(2);
  // `other` goes first and takes the block `center` lives in.
  set_scores(&mut surrounding, &[(node, 1.0), (other, 10.0), (center, 5.0)]);

  let mut stats = ChurnStats::default();
  assert_eq!(surrounding.expand_nodes(&mut stats), 1);
  assert_eq!(stats.expansions, 1);
  assert_eq!(stats.stale_skipped, 1);
  assert_eq!(stats.failed_expansions, 0);
  assert!(surrounding.node(center).is_none());
  assert!(surrounding.node(other).unwrap().has_children());
  assert_invariants(&surrounding);
}

/// Debug builds stop at the operation that leaves a broken graph behind.
#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "invariant violated")]
fn test_broken_cousin_link_halts() {
  let (mut surrounding, _, block) = expanded_root(8, 8);
  let node = block.node(0);
  surrounding.expand_node(node).unwrap();
  surrounding.nodes[block.node(1)].triple[0].cousin = None;
  surrounding.collapse_nodes(node);
}
