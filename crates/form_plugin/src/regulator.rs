//! Load regulation: picks a quaterna target from measured frame fitness and
//! mesh generation time.
//!
//! Two recommendations are made from the samples gathered since the last
//! decision and the more conservative one wins:
//!
//! - **Frame-directed**: the worst frame ratio (`1 / fitness`) scales the
//!   load by `ratio^-coeff(t)`. The coefficient starts boosted so the count
//!   settles quickly after a reset, then decays to its base to avoid hunting.
//! - **Mesh-directed**: if generating a mesh took longer than the allowed
//!   period the load is cut slightly; otherwise it is unbounded.
//!
//! Time is passed in by the caller as seconds since [`Regulator::reset`].

/// Tuning of a [`Regulator`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RegulatorConfig {
	/// Frame reaction coefficient once the boost has decayed.
	pub reaction_coefficient_base: f32,
	/// Extra frame reaction coefficient right after a reset.
	pub reaction_coefficient_boost: f32,
	/// Seconds for the boost to halve.
	pub boost_half_life: f32,
	/// Longest acceptable mesh generation period in seconds.
	pub max_mesh_generation_period: f32,
	/// Load multiplier applied when mesh generation is too slow.
	pub mesh_reaction_coefficient: f32,
	/// Lower bound of any recommendation.
	pub min_num_quaterna: usize,
	/// Upper bound of any recommendation.
	pub max_num_quaterna: usize,
}

impl Default for RegulatorConfig {
	fn default() -> Self {
		Self {
			reaction_coefficient_base: 0.015,
			reaction_coefficient_boost: 0.05,
			boost_half_life: 3.0,
			max_mesh_generation_period: 1.35,
			mesh_reaction_coefficient: 0.9975,
			min_num_quaterna: 1,
			max_num_quaterna: usize::MAX,
		}
	}
}

impl RegulatorConfig {
	/// Frame reaction coefficient `t` seconds after a reset.
	#[inline]
	pub fn reaction_coefficient(&self, t: f32) -> f32 {
		let boost_factor = 0.5f32.powf(t.max(0.0) / self.boost_half_life);
		self.reaction_coefficient_base + self.reaction_coefficient_boost * boost_factor
	}
}

/// Recommends quaterna targets from sampled performance.
#[derive(Clone, Debug)]
pub struct Regulator {
	config: RegulatorConfig,
	enabled: bool,
	/// Worst `1 / fitness` since the last decision, 0 if unsampled.
	frame_ratio_max: f32,
	/// Longest mesh generation period since the last decision, 0 if unsampled.
	mesh_generation_period: f32,
}

impl Default for Regulator {
	fn default() -> Self {
		Self::new(RegulatorConfig::default())
	}
}

impl Regulator {
	pub fn new(config: RegulatorConfig) -> Self {
		Self {
			config,
			enabled: true,
			frame_ratio_max: 0.0,
			mesh_generation_period: 0.0,
		}
	}

	pub fn config(&self) -> &RegulatorConfig {
		&self.config
	}

	pub fn is_enabled(&self) -> bool {
		self.enabled
	}

	/// Disabled regulators ignore samples and recommend no change.
	pub fn set_enabled(&mut self, enabled: bool) {
		self.enabled = enabled;
	}

	/// Drop all samples. The caller restarts its clock alongside.
	pub fn reset(&mut self) {
		self.frame_ratio_max = 0.0;
		self.mesh_generation_period = 0.0;
	}

	/// `true` if a sample arrived since the last decision.
	pub fn has_samples(&self) -> bool {
		self.frame_ratio_max > 0.0 || self.mesh_generation_period > 0.0
	}

	/// Sample frame fitness: 1 means on budget, below 1 means slow.
	pub fn sample_frame_fitness(&mut self, fitness: f32) {
		if !self.enabled || !(fitness > 0.0) || !fitness.is_finite() {
			return;
		}
		self.frame_ratio_max = self.frame_ratio_max.max(1.0 / fitness);
	}

	/// Sample the time taken to generate a mesh, in seconds.
	pub fn sample_mesh_generation_period(&mut self, seconds: f32) {
		if !self.enabled || !(seconds >= 0.0) {
			return;
		}
		self.mesh_generation_period = self.mesh_generation_period.max(seconds);
	}

	/// Recommend a target for the current `load`, `t` seconds after the last
	/// reset, and clear the samples.
	///
	/// Returns `load` unchanged when disabled or without samples.
	pub fn recommend(&mut self, t: f32, load: usize) -> usize {
		if !self.enabled || !self.has_samples() {
			return load;
		}

		let frame_target = self.frame_directed_target(t, load);
		let mesh_target = self.mesh_directed_target(load);
		self.reset();

		let recommended = frame_target
			.min(mesh_target)
			.clamp(self.config.min_num_quaterna, self.config.max_num_quaterna.max(self.config.min_num_quaterna));

		#[cfg(feature = "tracing")]
		if recommended != load {
			tracing::trace!(load, recommended, frame_target, mesh_target, "regulator decision");
		}

		recommended
	}

	fn frame_directed_target(&self, t: f32, load: usize) -> usize {
		if self.frame_ratio_max == 0.0 {
			return load;
		}

		let scale = (-self.frame_ratio_max.ln() * self.config.reaction_coefficient(t)).exp();
		let target = (load as f32 * scale) as usize;
		if target != load {
			return target;
		}

		// Too small a change to survive truncation: nudge by one.
		if scale >= 1.0 {
			load.saturating_add(1)
		} else {
			load.saturating_sub(1)
		}
	}

	fn mesh_directed_target(&self, load: usize) -> usize {
		if self.mesh_generation_period < self.config.max_mesh_generation_period {
			return usize::MAX;
		}
		let target = load as f32 * self.config.mesh_reaction_coefficient - 1.0;
		target.max(0.0) as usize
	}
}
