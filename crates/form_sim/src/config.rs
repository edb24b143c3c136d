//! Scenario parsing for the surface simulator.

use anyhow::{Context, Result};
use form_plugin::{PlanetShaderConfig, RegulatorConfig, SurroundingConfig};
use serde::Deserialize;
use std::path::Path;

/// Root configuration of a simulation run.
#[derive(Debug, Deserialize)]
pub struct Scenario {
	/// Frames to simulate.
	pub frames: usize,
	/// Frame time the regulator aims for, in milliseconds.
	#[serde(default = "default_frame_budget_ms")]
	pub frame_budget_ms: f32,
	/// Seed of the focus path jitter.
	#[serde(default)]
	pub seed: u64,
	/// Log a summary every this many frames.
	#[serde(default = "default_log_every")]
	pub log_every: usize,
	/// The formation to refine.
	pub planet: PlanetConfig,
	/// Path of the focus point.
	pub path: PathConfig,
	/// Capacity and scoring.
	#[serde(default)]
	pub surrounding: SurroundingConfig,
	/// Quaterna target regulation.
	#[serde(default)]
	pub regulation: RegulationConfig,
	/// Collision probes.
	#[serde(default)]
	pub probes: ProbeConfig,
}

/// Which shader draws the planet.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ShaderKind {
	Sphere,
	Planet,
}

/// A planet of the scenario.
#[derive(Debug, Deserialize)]
pub struct PlanetConfig {
	pub center: [f32; 3],
	pub radius: f32,
	/// Formation seed.
	#[serde(default)]
	pub seed: u32,
	#[serde(default = "default_shader")]
	pub shader: ShaderKind,
	/// Tunables of the planet shader.
	#[serde(default)]
	pub roughness: PlanetShaderConfig,
}

/// The focus orbits the planet at a fixed altitude.
#[derive(Debug, Deserialize)]
pub struct PathConfig {
	/// Height above the surface.
	pub altitude: f32,
	/// Radians travelled per frame.
	pub angular_speed: f32,
	/// Inclination of the orbit, in radians.
	#[serde(default)]
	pub inclination: f32,
	/// Random per-frame jitter of the focus, as a fraction of the altitude.
	#[serde(default)]
	pub jitter: f32,
	/// LOD minimum distance.
	pub min_distance: f32,
}

/// Regulator settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RegulationConfig {
	pub enabled: bool,
	/// Frames between target decisions.
	pub interval: usize,
	#[serde(flatten)]
	pub regulator: RegulatorConfig,
}

impl Default for RegulationConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			interval: 10,
			regulator: RegulatorConfig::default(),
		}
	}
}

/// Ray and sphere probes fired from the focus every frame.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
	/// Rays cast towards the planet per frame.
	pub rays: usize,
	/// Radius of the sphere query around each hit. 0 disables it.
	pub sphere_radius: f32,
}

impl Default for ProbeConfig {
	fn default() -> Self {
		Self {
			rays: 4,
			sphere_radius: 2.0,
		}
	}
}

fn default_frame_budget_ms() -> f32 {
	16.6
}

fn default_log_every() -> usize {
	60
}

fn default_shader() -> ShaderKind {
	ShaderKind::Planet
}

impl Scenario {
	/// Load a scenario from a TOML file.
	pub fn load(path: &Path) -> Result<Self> {
		let content = std::fs::read_to_string(path)
			.with_context(|| format!("Failed to read scenario file: {}", path.display()))?;
		let scenario: Scenario =
			toml::from_str(&content).with_context(|| "Failed to parse scenario TOML")?;
		scenario.validate()?;
		Ok(scenario)
	}

	fn validate(&self) -> Result<()> {
		if !(self.planet.radius > 0.0) {
			anyhow::bail!("planet.radius must be positive, got {}", self.planet.radius);
		}
		if !(self.path.min_distance > 0.0) {
			anyhow::bail!("path.min_distance must be positive, got {}", self.path.min_distance);
		}
		if !(self.path.altitude > 0.0) {
			anyhow::bail!("path.altitude must be positive, got {}", self.path.altitude);
		}
		if self.surrounding.max_num_quaterna == 0 {
			anyhow::bail!("surrounding.max_num_quaterna must be at least 1");
		}
		if self.surrounding.score_chunk_size == 0 {
			anyhow::bail!("surrounding.score_chunk_size must be at least 1");
		}
		if !(self.frame_budget_ms > 0.0) {
			anyhow::bail!("frame_budget_ms must be positive, got {}", self.frame_budget_ms);
		}
		if self.regulation.interval == 0 {
			anyhow::bail!("regulation.interval must be at least 1");
		}
		let regulator = &self.regulation.regulator;
		if regulator.min_num_quaterna > regulator.max_num_quaterna {
			anyhow::bail!(
				"regulation.min_num_quaterna ({}) exceeds max_num_quaterna ({})",
				regulator.min_num_quaterna,
				regulator.max_num_quaterna
			);
		}
		Ok(())
	}
}
