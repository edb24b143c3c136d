//! Engine-agnostic metrics collection for surrounding statistics.
//!
//! Feature-gated and runtime-toggled to ensure zero overhead when disabled.
//!
//! # Usage
//!
//! ```ignore
//! use form_plugin::metrics::{SurroundingMetrics, COLLECT_METRICS};
//!
//! // Compile with --features metrics
//! // Runtime toggle:
//! COLLECT_METRICS.store(false, Ordering::Relaxed);
//!
//! // After each tick:
//! metrics.record_tick(tick_us, &surrounding);
//!
//! // After each mesh:
//! metrics.record_mesh(mesh_us, &mesh);
//! ```

use std::collections::VecDeque;
#[cfg(feature = "metrics")]
use std::sync::atomic::Ordering;
use std::sync::atomic::AtomicBool;

use web_time::Instant;

use crate::mesh::Mesh;
use crate::surrounding::Surrounding;

/// Runtime toggle for metrics collection.
/// Set to false to disable metrics gathering at runtime.
pub static COLLECT_METRICS: AtomicBool = AtomicBool::new(true);

/// Check if metrics collection is enabled (both compile-time and runtime).
#[inline]
pub fn is_enabled() -> bool {
    #[cfg(feature = "metrics")]
    {
        COLLECT_METRICS.load(Ordering::Relaxed)
    }
    #[cfg(not(feature = "metrics"))]
    {
        false
    }
}

/// Rolling window for storing recent values (e.g., timing history).
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
    buffer: VecDeque<T>,
    capacity: usize,
}

impl<T> RollingWindow<T> {
    /// Create a new rolling window with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a new value, evicting the oldest if at capacity.
    pub fn push(&mut self, value: T) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(value);
    }

    /// Get the number of values in the window.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the window is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear all values.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl<T: Copy + Default + std::ops::Add<Output = T>> RollingWindow<T> {
    /// Compute the sum of all values.
    pub fn sum(&self) -> T {
        self.buffer.iter().copied().fold(T::default(), |acc, x| acc + x)
    }
}

impl RollingWindow<u64> {
    /// Compute the average of all values.
    pub fn average(&self) -> f64 {
        if self.buffer.is_empty() {
            0.0
        } else {
            self.sum() as f64 / self.buffer.len() as f64
        }
    }

    /// Get min and max values.
    pub fn min_max(&self) -> Option<(u64, u64)> {
        if self.buffer.is_empty() {
            None
        } else {
            let min = self.buffer.iter().min()?;
            let max = self.buffer.iter().max()?;
            Some((*min, *max))
        }
    }
}

impl Default for RollingWindow<u64> {
    fn default() -> Self {
        Self::new(128) // 128 samples (~2 seconds at 60fps)
    }
}

/// Microseconds elapsed since `start`.
#[inline]
pub fn elapsed_us(start: Instant) -> u64 {
    start.elapsed().as_micros() as u64
}

/// Surrounding statistics, updated after each tick and mesh.
#[derive(Debug, Clone)]
pub struct SurroundingMetrics {
    // Capacity
    /// Quaterna in use after the last tick.
    pub quaterna_used: usize,
    /// Quaterna target after the last tick.
    pub quaterna_target: usize,
    /// Points in use after the last tick.
    pub points_used: usize,
    /// `(min, max)` leaf score at the last rescore.
    pub leaf_score_range: (f32, f32),

    // Churn
    /// Rolling window of expansions per tick.
    pub expansions: RollingWindow<u64>,
    /// Expansions since the metrics were created.
    pub total_expansions: u64,
    /// Stale churn candidates since the metrics were created.
    pub total_stale_skipped: u64,

    // Mesh
    /// Triangles in the last mesh.
    pub triangles: usize,
    /// Vertices in the last mesh.
    pub vertices: usize,
    /// Meshes cut short by their capacity limits.
    pub truncated_meshes: u64,

    // Timing
    /// Rolling window of tick times in microseconds.
    pub tick_timings: RollingWindow<u64>,
    /// Rolling window of mesh generation times in microseconds.
    pub mesh_timings: RollingWindow<u64>,
    /// Rolling window of ray cast times in microseconds.
    pub ray_cast_timings: RollingWindow<u64>,

    // Last frame snapshot (for UI)
    /// Last tick time in microseconds.
    pub last_tick_us: u64,
    /// Last mesh generation time in microseconds.
    pub last_mesh_us: u64,
}

impl Default for SurroundingMetrics {
    fn default() -> Self {
        Self {
            quaterna_used: 0,
            quaterna_target: 0,
            points_used: 0,
            leaf_score_range: (0.0, 0.0),
            expansions: RollingWindow::new(128),
            total_expansions: 0,
            total_stale_skipped: 0,
            triangles: 0,
            vertices: 0,
            truncated_meshes: 0,
            tick_timings: RollingWindow::new(128),
            mesh_timings: RollingWindow::new(128),
            ray_cast_timings: RollingWindow::new(128),
            last_tick_us: 0,
            last_mesh_us: 0,
        }
    }
}

impl SurroundingMetrics {
    /// Create new metrics with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the windows and snapshots. Totals are cumulative and kept.
    pub fn reset(&mut self) {
        self.quaterna_used = 0;
        self.quaterna_target = 0;
        self.points_used = 0;
        self.leaf_score_range = (0.0, 0.0);
        self.expansions.clear();
        self.triangles = 0;
        self.vertices = 0;
        self.tick_timings.clear();
        self.mesh_timings.clear();
        self.ray_cast_timings.clear();
        self.last_tick_us = 0;
        self.last_mesh_us = 0;
    }

    /// Record a finished tick.
    pub fn record_tick(&mut self, timing_us: u64, surrounding: &Surrounding) {
        if !is_enabled() {
            return;
        }
        let stats = surrounding.last_churn_stats();
        self.tick_timings.push(timing_us);
        self.last_tick_us = timing_us;
        self.expansions.push(stats.expansions as u64);
        self.total_expansions += stats.expansions as u64;
        self.total_stale_skipped += stats.stale_skipped as u64;

        self.quaterna_used = surrounding.num_quaterna_used();
        self.quaterna_target = surrounding.target_num_quaterna();
        self.points_used = surrounding.num_points_used();
        self.leaf_score_range = surrounding.leaf_score_range();
    }

    /// Record a generated mesh.
    pub fn record_mesh(&mut self, timing_us: u64, mesh: &Mesh) {
        if !is_enabled() {
            return;
        }
        self.mesh_timings.push(timing_us);
        self.last_mesh_us = timing_us;
        self.triangles = mesh.triangle_count();
        self.vertices = mesh.vertices.len();
        if mesh.is_truncated() {
            self.truncated_meshes += 1;
        }
    }

    /// Record a ray cast timing.
    pub fn record_ray_cast(&mut self, timing_us: u64) {
        if is_enabled() {
            self.ray_cast_timings.push(timing_us);
        }
    }

    /// Get average tick timing in microseconds.
    pub fn avg_tick_timing_us(&self) -> f64 {
        self.tick_timings.average()
    }

    /// Get average mesh timing in microseconds.
    pub fn avg_mesh_timing_us(&self) -> f64 {
        self.mesh_timings.average()
    }

    /// Get average expansions per tick.
    pub fn avg_expansions(&self) -> f64 {
        self.expansions.average()
    }

    /// Approximate mesh memory (vertices + indices) of the last mesh.
    pub fn mesh_memory_bytes(&self) -> usize {
        self.vertices * std::mem::size_of::<crate::types::Vertex>() + self.triangles * 3 * 4
    }
}
