//! Points and the fixed-capacity pool they live in.
//!
//! Every corner and mid-point of every node is a [`Point`] owned by a
//! [`PointBuffer`]. Nodes refer to points by [`PointId`], a slot index plus
//! the slot's generation, so a reference to a destroyed point can be detected
//! instead of silently aliasing whatever reuses the slot.

use std::ops::{Index, IndexMut};

use glam::Vec3;

/// Generation-checked handle to a [`Point`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointId {
  index: u32,
  generation: u32,
}

impl PointId {
  #[inline]
  pub fn index(self) -> usize {
    self.index as usize
  }

  #[inline]
  pub fn generation(self) -> u32 {
    self.generation
  }
}

/// A vertex of the adaptive surface.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
  pub pos: Vec3,
  /// Index of the mesh vertex generated from this point during the current
  /// mesh pass. Cleared at the start of every pass.
  pub(crate) vertex: Option<u32>,
}

impl Point {
  pub fn new(pos: Vec3) -> Self {
    Self { pos, vertex: None }
  }

  pub fn vertex(&self) -> Option<u32> {
    self.vertex
  }
}

#[derive(Clone, Debug, Default)]
struct Slot {
  point: Point,
  generation: u32,
  live: bool,
}

/// Fixed-capacity pool of points with O(1) create/destroy.
#[derive(Debug)]
pub struct PointBuffer {
  slots: Vec<Slot>,
  free: Vec<u32>,
  num_live: usize,
}

impl PointBuffer {
  /// Create a pool holding at most `capacity` points. The storage is
  /// allocated once; the pool never grows.
  pub fn new(capacity: usize) -> Self {
    let slots = vec![Slot::default(); capacity];
    // Hand out low slots first.
    let free = (0..capacity as u32).rev().collect();
    Self {
      slots,
      free,
      num_live: 0,
    }
  }

  /// Claim a point at the origin, or `None` if the pool is exhausted.
  pub fn create(&mut self) -> Option<PointId> {
    let index = self.free.pop()?;
    let slot = &mut self.slots[index as usize];
    debug_assert!(!slot.live, "free list handed out a live slot");
    slot.live = true;
    slot.point = Point::default();
    self.num_live += 1;
    Some(PointId {
      index,
      generation: slot.generation,
    })
  }

  /// Return a point to the pool. Destroying a stale id is a no-op.
  pub fn destroy(&mut self, id: PointId) {
    if !self.is_alive(id) {
      debug_assert!(false, "destroying stale point {:?}", id);
      return;
    }
    let slot = &mut self.slots[id.index()];
    slot.live = false;
    slot.generation = slot.generation.wrapping_add(1);
    self.free.push(id.index);
    self.num_live -= 1;
  }

  #[inline]
  pub fn is_alive(&self, id: PointId) -> bool {
    self
      .slots
      .get(id.index())
      .is_some_and(|slot| slot.live && slot.generation == id.generation)
  }

  pub fn get(&self, id: PointId) -> Option<&Point> {
    self.is_alive(id).then(|| &self.slots[id.index()].point)
  }

  pub fn get_mut(&mut self, id: PointId) -> Option<&mut Point> {
    if self.is_alive(id) {
      Some(&mut self.slots[id.index()].point)
    } else {
      None
    }
  }

  /// Forget every point's mesh vertex.
  pub fn clear_vertices(&mut self) {
    for slot in self.slots.iter_mut().filter(|slot| slot.live) {
      slot.point.vertex = None;
    }
  }

  /// Live points with their ids.
  pub fn iter(&self) -> impl Iterator<Item = (PointId, &Point)> {
    self.slots.iter().enumerate().filter(|(_, slot)| slot.live).map(|(index, slot)| {
      (
        PointId {
          index: index as u32,
          generation: slot.generation,
        },
        &slot.point,
      )
    })
  }

  pub fn len(&self) -> usize {
    self.num_live
  }

  pub fn is_empty(&self) -> bool {
    self.num_live == 0
  }

  pub fn capacity(&self) -> usize {
    self.slots.len()
  }
}

impl Index<PointId> for PointBuffer {
  type Output = Point;

  #[inline]
  fn index(&self, id: PointId) -> &Point {
    debug_assert!(self.is_alive(id), "stale point {:?}", id);
    &self.slots[id.index()].point
  }
}

impl IndexMut<PointId> for PointBuffer {
  #[inline]
  fn index_mut(&mut self, id: PointId) -> &mut Point {
    debug_assert!(self.is_alive(id), "stale point {:?}", id);
    &mut self.slots[id.index()].point
  }
}
