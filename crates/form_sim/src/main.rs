//! Headless surface simulator.
//!
//! Flies a focus point around a planet and drives a surrounding the way a
//! game loop would: tick, regenerate the mesh when the tree changed, fire
//! collision probes, and let the regulator size the quaterna budget from the
//! measured frame times.
//!
//! Set `RUST_LOG=debug` to see the library's churn events.

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use form_plugin::metrics::{elapsed_us, SurroundingMetrics};
use form_plugin::surrounding::verify::verify;
use form_plugin::{
	LodParameters, Mesh, PlanetShader, PolyhedronId, Ray3, Regulator, Shader, Sphere3, SphereShader,
	Surrounding,
};
use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::Arc;
use web_time::Instant;

use config::{PathConfig, Scenario, ShaderKind};

/// Headless driver for adaptive planet surfaces.
#[derive(Parser, Debug)]
#[command(name = "form_sim")]
#[command(about = "Runs a surrounding along a scripted focus path and reports statistics")]
struct Args {
	/// Path to scenario TOML file.
	#[arg(short, long)]
	scenario: PathBuf,

	/// Override the number of frames.
	#[arg(short, long)]
	frames: Option<usize>,

	/// Check tree invariants after every frame.
	#[arg(long)]
	verify: bool,
}

fn main() -> Result<()> {
	let args = Args::parse();
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

	let mut scenario = Scenario::load(&args.scenario)?;
	if let Some(frames) = args.frames {
		scenario.frames = frames;
	}
	log::info!("Loaded scenario from: {}", args.scenario.display());

	let mut sim = Simulation::new(&scenario)?;
	for frame in 0..scenario.frames {
		sim.step(frame)?;
		if args.verify {
			verify(&sim.surrounding).with_context(|| format!("Invariant violated at frame {frame}"))?;
		}
		if (frame + 1) % scenario.log_every == 0 {
			sim.log_frame(frame);
		}
	}
	sim.log_summary();

	Ok(())
}

/// Everything one run owns.
struct Simulation<'a> {
	scenario: &'a Scenario,
	surrounding: Surrounding,
	planet: PolyhedronId,
	planet_shape: Sphere3,
	regulator: Regulator,
	mesh: Mesh,
	metrics: SurroundingMetrics,
	rng: StdRng,
	start: Instant,
	hits: usize,
	misses: usize,
	faces_near_hits: usize,
}

impl<'a> Simulation<'a> {
	fn new(scenario: &'a Scenario) -> Result<Self> {
		let planet = &scenario.planet;
		let shader: Arc<dyn Shader> = match planet.shader {
			ShaderKind::Sphere => Arc::new(SphereShader),
			ShaderKind::Planet => Arc::new(PlanetShader::new(planet.roughness)),
		};
		let planet_shape = Sphere3::new(Vec3::from_array(planet.center), planet.radius);

		let mut surrounding = Surrounding::new(scenario.surrounding.clone());
		let id = surrounding
			.add_polyhedron(planet_shape, planet.seed, shader)
			.context("Point pool cannot hold the planet's root points")?;

		let mut regulator = Regulator::new(scenario.regulation.regulator.clone());
		regulator.set_enabled(scenario.regulation.enabled);

		log::info!(
			"Planet r={} at {:?}, capacity {} quaterna, target {}",
			planet.radius,
			planet.center,
			surrounding.capacity(),
			surrounding.target_num_quaterna()
		);

		Ok(Self {
			scenario,
			surrounding,
			planet: id,
			planet_shape,
			regulator,
			mesh: Mesh::new(),
			metrics: SurroundingMetrics::new(),
			rng: StdRng::seed_from_u64(scenario.seed),
			start: Instant::now(),
			hits: 0,
			misses: 0,
			faces_near_hits: 0,
		})
	}

	fn step(&mut self, frame: usize) -> Result<()> {
		let frame_start = Instant::now();
		let lod = focus_at(&self.scenario.path, &self.planet_shape, frame, &mut self.rng);

		let tick_start = Instant::now();
		let changed = self.surrounding.tick(&lod);
		self.metrics.record_tick(elapsed_us(tick_start), &self.surrounding);

		if changed {
			let mesh_start = Instant::now();
			self.surrounding.generate_mesh(&mut self.mesh);
			let mesh_us = elapsed_us(mesh_start);
			self.metrics.record_mesh(mesh_us, &self.mesh);
			self.regulator.sample_mesh_generation_period(mesh_us as f32 * 1e-6);
		}

		self.probe(lod.center);

		let frame_ms = frame_start.elapsed().as_secs_f32() * 1e3;
		self.regulator.sample_frame_fitness(self.scenario.frame_budget_ms / frame_ms.max(1e-3));

		if (frame + 1) % self.scenario.regulation.interval == 0 {
			let used = self.surrounding.num_quaterna_used();
			let recommended = self.regulator.recommend(self.start.elapsed().as_secs_f32(), used);
			if recommended != self.surrounding.target_num_quaterna() {
				let achieved = self.surrounding.set_target_num_quaterna(recommended);
				log::debug!("frame {frame}: target {recommended} recommended, {achieved} set");
			}
		}
		Ok(())
	}

	/// Cast rays from the focus towards the planet and gather faces around
	/// each hit.
	fn probe(&mut self, origin: Vec3) {
		let probes = &self.scenario.probes;
		let length = (origin - self.planet_shape.center).length();
		for _ in 0..probes.rays {
			let spread = self.scenario.path.altitude / length.max(1e-6);
			let jitter = Vec3::new(
				self.rng.random_range(-1.0..1.0),
				self.rng.random_range(-1.0..1.0),
				self.rng.random_range(-1.0..1.0),
			) * spread;
			let direction = ((self.planet_shape.center - origin).normalize_or_zero() + jitter).normalize_or_zero();
			if direction == Vec3::ZERO {
				continue;
			}
			let ray = Ray3::new(origin, direction);

			let cast_start = Instant::now();
			let result = self.surrounding.cast_ray(self.planet, &ray, length);
			self.metrics.record_ray_cast(elapsed_us(cast_start));

			let Some(position) = result.position(&ray) else {
				self.misses += 1;
				continue;
			};
			self.hits += 1;
			if probes.sphere_radius > 0.0 {
				let sphere = Sphere3::new(position, probes.sphere_radius);
				let mut faces = 0;
				self.surrounding.for_each_face_in_sphere(self.planet, &sphere, |_, _| faces += 1);
				self.faces_near_hits += faces;
			}
		}
	}

	fn log_frame(&self, frame: usize) {
		let metrics = &self.metrics;
		log::info!(
			"frame {}: quaterna {}/{} (cap {}), {} triangles, tick {:.0}us, mesh {:.0}us, {:.1} expansions/tick, min leaf dist {:.3}",
			frame + 1,
			self.surrounding.num_quaterna_used(),
			self.surrounding.target_num_quaterna(),
			self.surrounding.capacity(),
			self.mesh.triangle_count(),
			metrics.avg_tick_timing_us(),
			metrics.avg_mesh_timing_us(),
			metrics.avg_expansions(),
			self.surrounding.min_leaf_distance_squared().sqrt(),
		);
	}

	fn log_summary(&self) {
		let metrics = &self.metrics;
		log::info!(
			"Done after {:.2}s: {} expansions ({} stale candidates skipped), {} truncated meshes",
			self.start.elapsed().as_secs_f32(),
			metrics.total_expansions,
			metrics.total_stale_skipped,
			metrics.truncated_meshes
		);
		if let Some((min, max)) = metrics.tick_timings.min_max() {
			log::info!("Recent ticks: {min}us min, {max}us max");
		}
		log::info!(
			"Probes: {} hits, {} misses, {:.1} faces per hit sphere, mesh memory {} KiB",
			self.hits,
			self.misses,
			self.faces_near_hits as f32 / self.hits.max(1) as f32,
			metrics.mesh_memory_bytes() / 1024
		);
	}
}

/// Focus position for `frame` along the configured orbit.
fn focus_at(path: &PathConfig, planet: &Sphere3, frame: usize, rng: &mut StdRng) -> LodParameters {
	let angle = frame as f32 * path.angular_speed;
	let (sin_i, cos_i) = path.inclination.sin_cos();
	let direction = Vec3::new(angle.cos(), angle.sin() * sin_i, angle.sin() * cos_i);

	let mut center = planet.center + direction * (planet.radius + path.altitude);
	if path.jitter > 0.0 {
		let amount = path.altitude * path.jitter;
		center += Vec3::new(
			rng.random_range(-amount..=amount),
			rng.random_range(-amount..=amount),
			rng.random_range(-amount..=amount),
		);
	}
	LodParameters::new(center, path.min_distance)
}
