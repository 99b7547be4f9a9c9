//! Monte Carlo localization toolbox
//!
//! This crate estimates the pose (position and heading) of an agent moving on a known toroidal
//! world from noisy range measurements to fixed landmarks. The estimate is carried by a population
//! of particles that is propagated through a noisy motion model, weighted by the likelihood of the
//! observed ranges, and resampled every step.
//!
//! This crate is primarily built off of three additional dependencies:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): Provides the point and vector types for landmark geometry.
//! - [`rand`](https://crates.io/crates/rand) and [`rand_distr`](https://crates.io/crates/rand_distr): Provides random number generation for motion and sensor noise and for resampling.
//! - [`rayon`](https://crates.io/crates/rayon): Provides the thread pool used to propagate and weigh particles in parallel.
//!
//! All other functionality is auxiliary (configuration files, CSV output, logging).
//!
//! ## Crate overview
//!
//! This crate is organized into several modules:
//! - [pose]: The toroidal [`World`] and the [`Pose`] type with wrap-around arithmetic.
//! - [motion]: Noise parameters and the turn-then-drive motion model.
//! - [sensor]: Landmarks, range measurements, and the Gaussian measurement likelihood.
//! - [resampling]: The resampling wheel and alternative resampling strategies.
//! - [particle]: The particle filter orchestrating one move / weigh / resample cycle per step.
//! - [config]: Serializable filter and scenario configuration (JSON, YAML, TOML).
//! - [sim]: A simulated ground-truth agent and the scenario driver used by the `mcl` binary.
//!
//! ## Estimation cycle
//!
//! Given a control command $(\delta\psi, d)$ and a measurement $z$, each particle $i$ is moved
//!
//! $$
//! \psi_i' = \psi_i + \delta\psi + \epsilon_\psi, \quad
//! x_i' = x_i + (d + \epsilon_d) \cos\psi_i', \quad
//! y_i' = y_i + (d + \epsilon_d) \sin\psi_i'
//! $$
//!
//! with every component wrapped back into the world, and then weighted by
//!
//! $$
//! w_i = \prod_{k} \mathcal{N}\left(z_k;\ \lVert p_i' - l_k \rVert,\ \sigma_s^2\right)
//! $$
//!
//! before $N$ indices are drawn in proportion to the weights to form the next population.

pub mod config;
pub mod error;
pub mod motion;
pub mod particle;
pub mod pose;
pub mod resampling;
pub mod sensor;
pub mod sim;

pub use error::{MclError, Result};
pub use motion::{MotionModel, NoiseParameters};
pub use particle::{Particle, ParticleFilter};
pub use pose::{Pose, World};
pub use sensor::{LandmarkSet, Measurement, SensorModel};
