//! Background tick and mesh generation.
//!
//! The surrounding lives behind an `RwLock`. A tick takes the write lock on
//! a rayon thread; ray casts and sphere queries from other threads take the
//! read lock and wait out a running tick.
//!
//! # Flow
//!
//! ```text
//! Main Thread                       Async (rayon)
//! ┌────────────────┐
//! │ start(request) │
//! └───────┬────────┘
//!         │
//!         ▼
//!                                  ┌───────────────┐
//!                                  │ write lock    │
//!                                  │ target, tick  │
//!                                  │ generate_mesh │
//!                                  └───────┬───────┘
//!                                          │
//! ┌────────────────┐                       │
//! │ poll_results() │◄──────────────────────┘
//! │ - upload mesh  │
//! │ - recycle mesh │
//! └────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let mut worker = SurroundingWorker::new(surrounding);
//!
//! // Start (non-blocking)
//! worker.start(TickRequest::new(lod).with_mesh(spare_mesh));
//!
//! // Queries may run while a tick is in flight; they block on the lock.
//! let hit = worker.cast_ray(planet, &ray, 100.0);
//!
//! // Poll each frame
//! if let Some(result) = worker.poll_results() {
//!     if let Some(mesh) = result.mesh {
//!         upload(&mesh);
//!     }
//! }
//! ```

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crossbeam_channel::{self as channel, Receiver, TryRecvError};
use web_time::Instant;

use crate::mesh::Mesh;
use crate::metrics::elapsed_us;
use crate::node::PolyhedronId;
use crate::ray_cast::RayCastResult;
use crate::surrounding::{ChurnStats, Surrounding};
use crate::types::{LodParameters, Ray3};

/// Request for one background tick.
#[derive(Debug)]
pub struct TickRequest {
	/// Parameters to tick towards.
	pub lod: LodParameters,
	/// New quaterna target, applied before the tick.
	pub target_num_quaterna: Option<usize>,
	/// Buffer to generate into. No mesh is generated without one, and none
	/// is generated if the tick left the tree unchanged.
	pub mesh: Option<Mesh>,
}

impl TickRequest {
	pub fn new(lod: LodParameters) -> Self {
		Self {
			lod,
			target_num_quaterna: None,
			mesh: None,
		}
	}

	pub fn with_target(mut self, target: usize) -> Self {
		self.target_num_quaterna = Some(target);
		self
	}

	pub fn with_mesh(mut self, mesh: Mesh) -> Self {
		self.mesh = Some(mesh);
		self
	}
}

/// Timings of one background tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerTimings {
	/// Tick time in microseconds, capacity change included.
	pub tick_us: u64,
	/// Mesh generation time in microseconds.
	pub mesh_us: u64,
}

/// Result of one background tick.
#[derive(Debug)]
pub struct WorkerResult {
	/// The generated mesh, or the unused buffer handed in with the request.
	pub mesh: Option<Mesh>,
	/// `true` if `mesh` holds a freshly generated mesh.
	pub mesh_generated: bool,
	/// Churn of this tick.
	pub stats: ChurnStats,
	/// Quaterna target after the request was applied.
	pub target_num_quaterna: usize,
	pub timings: WorkerTimings,
}

/// Non-blocking tick + mesh driver for a shared surrounding.
pub struct SurroundingWorker {
	surrounding: Arc<RwLock<Surrounding>>,
	/// Receiver for pending result.
	receiver: Option<Receiver<WorkerResult>>,
}

impl SurroundingWorker {
	pub fn new(surrounding: Surrounding) -> Self {
		Self {
			surrounding: Arc::new(RwLock::new(surrounding)),
			receiver: None,
		}
	}

	/// Shared handle, for readers on other threads.
	pub fn handle(&self) -> Arc<RwLock<Surrounding>> {
		Arc::clone(&self.surrounding)
	}

	/// Read access. Blocks while a tick is running.
	pub fn read(&self) -> RwLockReadGuard<'_, Surrounding> {
		// Ticks never leave the tree half-updated on unwind, so a poisoned
		// lock still guards a consistent surrounding.
		self.surrounding.read().unwrap_or_else(PoisonError::into_inner)
	}

	/// Write access, e.g. to add a polyhedron. Blocks while a tick is running.
	pub fn write(&self) -> RwLockWriteGuard<'_, Surrounding> {
		self.surrounding.write().unwrap_or_else(PoisonError::into_inner)
	}

	/// Check if a task is running.
	pub fn is_busy(&self) -> bool {
		self.receiver.is_some()
	}

	/// Start a background tick.
	///
	/// Returns `false` if a tick is already running; the request is dropped.
	pub fn start(&mut self, request: TickRequest) -> bool {
		if self.is_busy() {
			return false;
		}

		let (sender, receiver) = channel::bounded(1);
		self.receiver = Some(receiver);

		let surrounding = Arc::clone(&self.surrounding);
		rayon::spawn(move || {
			let mut guard = surrounding.write().unwrap_or_else(PoisonError::into_inner);
			let result = run_tick(&mut guard, request);
			drop(guard);
			// Ignore send error (receiver dropped = cancelled)
			let _ = sender.send(result);
		});

		true
	}

	/// Poll for results (non-blocking).
	///
	/// Returns `Some(result)` when complete, `None` if still running.
	pub fn poll_results(&mut self) -> Option<WorkerResult> {
		let receiver = self.receiver.as_ref()?;

		match receiver.try_recv() {
			Ok(result) => {
				self.receiver = None;
				Some(result)
			}
			Err(TryRecvError::Empty) => None,
			Err(TryRecvError::Disconnected) => {
				self.receiver = None;
				None
			}
		}
	}

	/// Forget the pending result. The tick itself still runs to completion.
	pub fn cancel(&mut self) {
		self.receiver = None;
	}

	/// Ray cast under the read lock.
	pub fn cast_ray(&self, polyhedron: PolyhedronId, ray: &Ray3, length: f32) -> RayCastResult {
		self.read().cast_ray(polyhedron, ray, length)
	}
}

/// Apply one request (called on worker thread).
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "worker::run_tick"))]
fn run_tick(surrounding: &mut Surrounding, request: TickRequest) -> WorkerResult {
	let tick_start = Instant::now();
	if let Some(target) = request.target_num_quaterna {
		surrounding.set_target_num_quaterna(target);
	}
	let changed = surrounding.tick(&request.lod);
	let tick_us = elapsed_us(tick_start);

	let mut mesh = request.mesh;
	let mut mesh_us = 0;
	let mut mesh_generated = false;
	if changed {
		if let Some(mesh) = mesh.as_mut() {
			let mesh_start = Instant::now();
			surrounding.generate_mesh(mesh);
			mesh_us = elapsed_us(mesh_start);
			mesh_generated = true;
		}
	}

	WorkerResult {
		mesh,
		mesh_generated,
		stats: surrounding.last_churn_stats(),
		target_num_quaterna: surrounding.target_num_quaterna(),
		timings: WorkerTimings { tick_us, mesh_us },
	}
}
