//! Monte Carlo localization particle filter.
//!
//! The filter owns a fixed-size population of [`Particle`]s, each a pose hypothesis with
//! its own noise parameters. One call to [`ParticleFilter::step`] runs a full estimation
//! cycle:
//!
//! 1. every particle is moved by the control command under its own motion noise,
//! 2. every moved particle is weighted by the likelihood of the observed measurement,
//! 3. N indices are drawn from the weights and the population is rebuilt from copies
//!    of the drawn particles.
//!
//! Steps 1 and 2 touch only a particle's own state plus the read-only landmark set, so
//! they run as a map over fixed-size chunks of the population, optionally on the rayon
//! thread pool. Each chunk draws from its own [`StdRng`] seeded from a per-step seed and
//! the chunk index, which keeps runs reproducible under a fixed master seed regardless
//! of the number of worker threads. Resampling runs after all weights are final.
//!
//! The new population replaces the old one only once it is completely built: a step
//! that fails leaves the previous population untouched.
//!
//! # Example
//!
//! ```rust
//! use mcl::motion::NoiseParameters;
//! use mcl::particle::ParticleFilter;
//! use mcl::pose::World;
//! use mcl::sensor::{LandmarkSet, Measurement};
//!
//! let mut pf = ParticleFilter::new(
//!     500,
//!     World::square(100.0),
//!     LandmarkSet::reference(),
//!     NoiseParameters::default(),
//!     42,
//! )
//! .unwrap();
//!
//! let z = Measurement::new(vec![30.0, 60.0, 45.0, 50.0]);
//! pf.step(0.1, 5.0, &z).unwrap();
//! assert_eq!(pf.len(), 500);
//! println!("estimate: {}", pf.estimate());
//! ```

use std::fmt::{self, Debug, Display};

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::FilterConfig;
use crate::error::{MclError, Result};
use crate::motion::{MotionModel, NoiseParameters, check_command};
use crate::pose::{Pose, World, wrap};
use crate::resampling::{ResamplingStrategy, effective_sample_size};
use crate::sensor::{LandmarkSet, Measurement, SensorModel};

/// Particles per work unit. Fixed so that the random stream assignment, and therefore the
/// result, does not depend on the thread count.
pub const PARTICLE_CHUNK_SIZE: usize = 64;

/// One pose hypothesis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    pub pose: Pose,
    pub noise: NoiseParameters,
    /// Transient importance weight; uniform after every resampling.
    pub weight: f64,
}

impl Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Particle")
            .field("x", &self.pose.x())
            .field("y", &self.pose.y())
            .field("heading", &self.pose.heading())
            .field("weight", &self.weight)
            .finish()
    }
}

impl Particle {
    pub fn new(pose: Pose, noise: NoiseParameters, weight: f64) -> Particle {
        Particle {
            pose,
            noise,
            weight,
        }
    }
}

/// How [`ParticleFilter::estimate`] collapses the population into one pose.
///
/// Positions are averaged as circular means on each torus axis and the heading as a
/// circular mean, so a cluster straddling a world edge averages to the edge rather
/// than the middle of the map.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ParticleAveragingStrategy {
    #[default]
    WeightedMean,
    UnweightedMean,
}

/// How per-particle measurement scores become resampling weights.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum WeightingMode {
    /// Product of per-landmark Gaussian densities. May underflow to zero for many landmarks.
    #[default]
    Product,
    /// Sum of log densities, exponentiated relative to the best particle.
    LogSum,
}

/// Summary of the weights seen by the most recent successful step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepDiagnostics {
    pub effective_sample_size: f64,
    pub max_weight: f64,
    pub weight_sum: f64,
    /// Number of distinct pre-resampling particles that survived into the new population
    pub distinct_survivors: usize,
}

pub struct ParticleFilter {
    particles: Vec<Particle>,
    motion: MotionModel,
    sensor: SensorModel,
    resampling_strategy: ResamplingStrategy,
    averaging_strategy: ParticleAveragingStrategy,
    weighting: WeightingMode,
    parallel: bool,
    rng: StdRng,
    diagnostics: Option<StepDiagnostics>,
}

impl Debug for ParticleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let estimate = self.estimate();
        f.debug_struct("ParticleFilter")
            .field("num_particles", &self.particles.len())
            .field("landmarks", &self.sensor.landmarks().len())
            .field("resampling_strategy", &self.resampling_strategy)
            .field("averaging_strategy", &self.averaging_strategy)
            .field("weighting", &self.weighting)
            .field("estimate", &format_args!("{}", estimate))
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}

impl ParticleFilter {
    /// Create a filter with `population_size` particles scattered uniformly over the world,
    /// all sharing `noise`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a zero population, an invalid world or noise triple, or a
    /// zero sense noise (particles could not be scored).
    pub fn new(
        population_size: usize,
        world: World,
        landmarks: LandmarkSet,
        noise: NoiseParameters,
        seed: u64,
    ) -> Result<Self> {
        if population_size == 0 {
            return Err(MclError::InvalidArgument(
                "population size must be positive".to_string(),
            ));
        }
        let motion = MotionModel::new(world)?;
        check_particle_noise(&noise)?;
        let mut rng = StdRng::seed_from_u64(seed);
        let weight = 1.0 / population_size as f64;
        let particles = (0..population_size)
            .map(|_| Particle::new(Pose::random(&world, &mut rng), noise, weight))
            .collect();
        Ok(ParticleFilter {
            particles,
            motion,
            sensor: SensorModel::new(landmarks),
            resampling_strategy: ResamplingStrategy::default(),
            averaging_strategy: ParticleAveragingStrategy::default(),
            weighting: WeightingMode::default(),
            parallel: true,
            rng,
            diagnostics: None,
        })
    }

    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            config.population_size,
            config.world,
            config.landmark_set()?,
            config.noise,
            config.seed,
        )?
        .with_resampling_strategy(config.resampling)
        .with_averaging_strategy(config.averaging)
        .with_weighting(config.weighting)
        .with_parallel(config.parallel))
    }

    /// Create a filter over a caller-provided population.
    ///
    /// Every pose must lie inside `world`, every noise triple must be valid with a
    /// positive sense noise, and every weight must be finite and non-negative.
    pub fn from_particles(
        particles: Vec<Particle>,
        world: World,
        landmarks: LandmarkSet,
        seed: u64,
    ) -> Result<Self> {
        if particles.is_empty() {
            return Err(MclError::InvalidArgument(
                "population must not be empty".to_string(),
            ));
        }
        let motion = MotionModel::new(world)?;
        for particle in &particles {
            Pose::new(
                particle.pose.x(),
                particle.pose.y(),
                particle.pose.heading(),
                &world,
            )?;
            check_particle_noise(&particle.noise)?;
            if !(particle.weight.is_finite() && particle.weight >= 0.0) {
                return Err(MclError::InvalidArgument(format!(
                    "particle weight must be finite and non-negative, got {}",
                    particle.weight
                )));
            }
        }
        Ok(ParticleFilter {
            particles,
            motion,
            sensor: SensorModel::new(landmarks),
            resampling_strategy: ResamplingStrategy::default(),
            averaging_strategy: ParticleAveragingStrategy::default(),
            weighting: WeightingMode::default(),
            parallel: true,
            rng: StdRng::seed_from_u64(seed),
            diagnostics: None,
        })
    }

    pub fn with_resampling_strategy(mut self, strategy: ResamplingStrategy) -> Self {
        self.resampling_strategy = strategy;
        self
    }

    pub fn with_averaging_strategy(mut self, strategy: ParticleAveragingStrategy) -> Self {
        self.averaging_strategy = strategy;
        self
    }

    pub fn with_weighting(mut self, weighting: WeightingMode) -> Self {
        self.weighting = weighting;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Run one move / weigh / resample cycle.
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` for a negative `forward`, a non-finite command, or a
    ///   measurement whose length differs from the landmark count.
    /// * `DegenerateWeights` when every particle's weight is zero. Localization has
    ///   diverged; the caller may [`reinitialize_uniform`](Self::reinitialize_uniform)
    ///   and continue.
    ///
    /// On error the population is left exactly as it was.
    pub fn step(&mut self, turn: f64, forward: f64, measurement: &Measurement) -> Result<()> {
        check_command(turn, forward)?;
        self.sensor.check_measurement(measurement)?;

        let step_seed: u64 = self.rng.random();
        let (moved, scores) = self.propagate_and_score(turn, forward, measurement, step_seed)?;
        let weights = self.weights_from_scores(scores);

        let n = moved.len();
        let indices = match self.resampling_strategy.resample(&weights, n, &mut self.rng) {
            Ok(indices) => indices,
            Err(e) => {
                warn!("resampling failed, keeping previous population: {}", e);
                return Err(e);
            }
        };

        let uniform = 1.0 / n as f64;
        let mut survived = vec![false; n];
        let resampled: Vec<Particle> = indices
            .iter()
            .map(|&i| {
                survived[i] = true;
                Particle {
                    weight: uniform,
                    ..moved[i]
                }
            })
            .collect();

        let diagnostics = StepDiagnostics {
            effective_sample_size: effective_sample_size(&weights),
            max_weight: weights.iter().copied().fold(0.0, f64::max),
            weight_sum: weights.iter().sum(),
            distinct_survivors: survived.iter().filter(|&&s| s).count(),
        };
        debug!(
            "step: ess={:.1} max_weight={:.3e} survivors={}/{}",
            diagnostics.effective_sample_size,
            diagnostics.max_weight,
            diagnostics.distinct_survivors,
            n
        );

        self.particles = resampled;
        self.diagnostics = Some(diagnostics);
        Ok(())
    }

    /// Move every particle and score it against `measurement`, without touching the
    /// current population.
    fn propagate_and_score(
        &self,
        turn: f64,
        forward: f64,
        measurement: &Measurement,
        step_seed: u64,
    ) -> Result<(Vec<Particle>, Vec<f64>)> {
        let motion = &self.motion;
        let sensor = &self.sensor;
        let weighting = self.weighting;
        let work = |(chunk_index, chunk): (usize, &[Particle])| -> Result<Vec<(Particle, f64)>> {
            let mut rng = StdRng::seed_from_u64(step_seed.wrapping_add(chunk_index as u64));
            chunk
                .iter()
                .map(|particle| -> Result<(Particle, f64)> {
                    let pose =
                        motion.propagate(&particle.pose, turn, forward, &particle.noise, &mut rng)?;
                    let sense_noise = particle.noise.sense_noise;
                    let score = match weighting {
                        WeightingMode::Product => {
                            sensor.likelihood(&pose, measurement, sense_noise)?
                        }
                        WeightingMode::LogSum => {
                            sensor.log_likelihood(&pose, measurement, sense_noise)?
                        }
                    };
                    Ok((
                        Particle {
                            pose,
                            noise: particle.noise,
                            weight: particle.weight,
                        },
                        score,
                    ))
                })
                .collect()
        };

        let chunks: Vec<Vec<(Particle, f64)>> = if self.parallel {
            self.particles
                .par_chunks(PARTICLE_CHUNK_SIZE)
                .enumerate()
                .map(work)
                .collect::<Result<_>>()?
        } else {
            self.particles
                .chunks(PARTICLE_CHUNK_SIZE)
                .enumerate()
                .map(work)
                .collect::<Result<_>>()?
        };
        Ok(chunks.into_iter().flatten().unzip())
    }

    fn weights_from_scores(&self, scores: Vec<f64>) -> Vec<f64> {
        match self.weighting {
            WeightingMode::Product => scores,
            WeightingMode::LogSum => {
                let best = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                if best.is_finite() {
                    scores.iter().map(|s| (s - best).exp()).collect()
                } else {
                    vec![0.0; scores.len()]
                }
            }
        }
    }

    /// Scatter every particle uniformly over the world again, keeping its noise.
    ///
    /// The recovery step a caller may take after [`MclError::DegenerateWeights`].
    pub fn reinitialize_uniform(&mut self) {
        let world = *self.motion.world();
        let weight = 1.0 / self.particles.len() as f64;
        for particle in &mut self.particles {
            particle.pose = Pose::random(&world, &mut self.rng);
            particle.weight = weight;
        }
        self.diagnostics = None;
    }

    /// Collapse the population into a single pose with the configured averaging strategy.
    pub fn estimate(&self) -> Pose {
        let world = self.motion.world();
        let n = self.particles.len() as f64;
        let total: f64 = self.particles.iter().map(|p| p.weight).sum();
        let weight_of = |p: &Particle| match self.averaging_strategy {
            ParticleAveragingStrategy::WeightedMean if total > 0.0 => p.weight / total,
            _ => 1.0 / n,
        };
        let x = circular_mean(
            self.particles.iter().map(|p| (p.pose.x(), weight_of(p))),
            world.width,
        );
        let y = circular_mean(
            self.particles.iter().map(|p| (p.pose.y(), weight_of(p))),
            world.height,
        );
        let heading = circular_mean(
            self.particles.iter().map(|p| (p.pose.heading(), weight_of(p))),
            std::f64::consts::TAU,
        );
        Pose::wrap_components(x, y, heading, world)
    }

    /// Mean toroidal distance between the particles and `ground_truth`.
    ///
    /// Each axis difference is wrapped into `[-size/2, size/2)` first, so particles just
    /// across a world edge from the truth count as close.
    pub fn error_metric(&self, ground_truth: &Pose) -> f64 {
        let world = self.motion.world();
        let total: f64 = self
            .particles
            .iter()
            .map(|p| world.distance(&p.pose, ground_truth))
            .sum();
        total / self.particles.len() as f64
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn world(&self) -> &World {
        self.motion.world()
    }

    pub fn sensor(&self) -> &SensorModel {
        &self.sensor
    }

    pub fn motion(&self) -> &MotionModel {
        &self.motion
    }

    pub fn resampling_strategy(&self) -> ResamplingStrategy {
        self.resampling_strategy
    }

    pub fn averaging_strategy(&self) -> ParticleAveragingStrategy {
        self.averaging_strategy
    }

    pub fn weighting(&self) -> WeightingMode {
        self.weighting
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Weight statistics of the last successful step, `None` before the first step.
    pub fn diagnostics(&self) -> Option<&StepDiagnostics> {
        self.diagnostics.as_ref()
    }
}

fn check_particle_noise(noise: &NoiseParameters) -> Result<()> {
    noise.validate()?;
    if noise.sense_noise <= 0.0 {
        return Err(MclError::InvalidArgument(
            "particle sense noise must be positive to score measurements".to_string(),
        ));
    }
    Ok(())
}

/// Weighted circular mean of values living on `[0, period)`.
fn circular_mean<I: Iterator<Item = (f64, f64)>>(values: I, period: f64) -> f64 {
    let scale = std::f64::consts::TAU / period;
    let (sin_sum, cos_sum) = values.fold((0.0, 0.0), |(s, c), (value, weight)| {
        let angle = value * scale;
        (s + weight * angle.sin(), c + weight * angle.cos())
    });
    wrap(sin_sum.atan2(cos_sum) / scale, period)
}
