//! Noisy turn-then-drive motion model.
//!
//! A control command is a `(turn, forward)` pair. The agent first rotates by `turn`
//! plus Gaussian turn noise, then drives `forward` plus Gaussian forward noise along
//! its new heading. The resulting position is wrapped onto the toroidal world.
//!
//! $$
//! \theta' = (\theta + u_\theta + \epsilon_t) \bmod 2\pi, \quad
//! d = u_d + \epsilon_f, \quad
//! x' = (x + d\cos\theta') \bmod W, \quad
//! y' = (y + d\sin\theta') \bmod H
//! $$
//!
//! with $\epsilon_t \sim N(0, \sigma_t^2)$ and $\epsilon_f \sim N(0, \sigma_f^2)$ drawn
//! independently on every call.

use std::f64::consts::TAU;

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::error::{MclError, Result};
use crate::pose::{Pose, World, wrap};

/// Standard deviations of the process and measurement noise carried by a particle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoiseParameters {
    /// Forward (distance) noise σ_f in world units
    pub forward_noise: f64,
    /// Turn noise σ_t in radians
    pub turn_noise: f64,
    /// Range measurement noise σ_s in world units
    pub sense_noise: f64,
}

impl Default for NoiseParameters {
    fn default() -> Self {
        NoiseParameters {
            forward_noise: 0.05,
            turn_noise: 0.05,
            sense_noise: 5.0,
        }
    }
}

impl NoiseParameters {
    pub fn new(forward_noise: f64, turn_noise: f64, sense_noise: f64) -> Result<Self> {
        let noise = NoiseParameters {
            forward_noise,
            turn_noise,
            sense_noise,
        };
        noise.validate()?;
        Ok(noise)
    }

    /// All noise switched off.
    pub fn noiseless() -> Self {
        NoiseParameters {
            forward_noise: 0.0,
            turn_noise: 0.0,
            sense_noise: 0.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("forward_noise", self.forward_noise),
            ("turn_noise", self.turn_noise),
            ("sense_noise", self.sense_noise),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(MclError::InvalidArgument(format!(
                    "{} must be non-negative and finite, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Zero-mean Gaussian sample with standard deviation `sigma`; exactly zero when `sigma` is zero.
pub(crate) fn gaussian_sample<R: Rng + ?Sized>(sigma: f64, rng: &mut R) -> f64 {
    if sigma > 0.0 {
        let z: f64 = StandardNormal.sample(rng);
        z * sigma
    } else {
        0.0
    }
}

/// Propagates poses across a toroidal world.
#[derive(Clone, Copy, Debug)]
pub struct MotionModel {
    world: World,
}

impl MotionModel {
    pub fn new(world: World) -> Result<Self> {
        world.validate()?;
        Ok(MotionModel { world })
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Apply a `(turn, forward)` command with noise to `pose`, returning the new pose.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `forward` is negative (no reverse motion) or either
    /// command component is not finite.
    pub fn propagate<R: Rng + ?Sized>(
        &self,
        pose: &Pose,
        turn: f64,
        forward: f64,
        noise: &NoiseParameters,
        rng: &mut R,
    ) -> Result<Pose> {
        check_command(turn, forward)?;
        let heading = wrap(
            pose.heading() + turn + gaussian_sample(noise.turn_noise, rng),
            TAU,
        );
        let distance = forward + gaussian_sample(noise.forward_noise, rng);
        Pose::wrapped(
            pose.x() + distance * heading.cos(),
            pose.y() + distance * heading.sin(),
            heading,
            &self.world,
        )
    }
}

/// Validate a control command before any particle is touched.
pub fn check_command(turn: f64, forward: f64) -> Result<()> {
    if !turn.is_finite() {
        return Err(MclError::InvalidArgument(format!(
            "turn must be finite, got {}",
            turn
        )));
    }
    if !(forward.is_finite() && forward >= 0.0) {
        return Err(MclError::InvalidArgument(format!(
            "cannot move backwards: forward must be non-negative, got {}",
            forward
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::f64::consts::FRAC_PI_2;

    fn model() -> MotionModel {
        MotionModel::new(World::default()).unwrap()
    }

    #[test]
    fn noiseless_forward_motion_is_exact() {
        let world = World::default();
        let start = Pose::new(0.0, 0.0, 0.0, &world).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let moved = model()
            .propagate(&start, 0.0, 5.0, &NoiseParameters::noiseless(), &mut rng)
            .unwrap();
        assert_eq!(moved.x(), 5.0);
        assert_eq!(moved.y(), 0.0);
        assert_eq!(moved.heading(), 0.0);
        // receiver is untouched
        assert_eq!(start.x(), 0.0);
    }

    #[test]
    fn noiseless_turn_then_drive() {
        let world = World::default();
        let start = Pose::new(10.0, 10.0, 0.0, &world).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let moved = model()
            .propagate(&start, FRAC_PI_2, 3.0, &NoiseParameters::noiseless(), &mut rng)
            .unwrap();
        assert_approx_eq!(moved.x(), 10.0, 1e-12);
        assert_approx_eq!(moved.y(), 13.0, 1e-12);
        assert_approx_eq!(moved.heading(), FRAC_PI_2, 1e-12);
    }

    #[test]
    fn motion_wraps_across_world_edge() {
        let world = World::default();
        let start = Pose::new(98.0, 1.0, 0.0, &world).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let moved = model()
            .propagate(&start, 0.0, 5.0, &NoiseParameters::noiseless(), &mut rng)
            .unwrap();
        assert_approx_eq!(moved.x(), 3.0, 1e-12);

        let facing_down = Pose::new(50.0, 1.0, 3.0 * FRAC_PI_2, &world).unwrap();
        let moved = model()
            .propagate(&facing_down, 0.0, 2.0, &NoiseParameters::noiseless(), &mut rng)
            .unwrap();
        assert_approx_eq!(moved.y(), 99.0, 1e-9);
    }

    #[test]
    fn negative_forward_is_rejected() {
        let world = World::default();
        let start = Pose::new(0.0, 0.0, 0.0, &world).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let result = model().propagate(&start, 0.0, -1.0, &NoiseParameters::default(), &mut rng);
        assert!(matches!(result, Err(MclError::InvalidArgument(_))));
        assert!(check_command(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn noisy_motion_stays_in_domain() {
        let world = World::new(20.0, 20.0).unwrap();
        let model = MotionModel::new(world).unwrap();
        let noise = NoiseParameters::new(3.0, 2.0, 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(99);
        let mut pose = Pose::new(0.5, 19.5, 6.2, &world).unwrap();
        for _ in 0..5000 {
            pose = model.propagate(&pose, 1.3, 7.0, &noise, &mut rng).unwrap();
            assert!((0.0..20.0).contains(&pose.x()));
            assert!((0.0..20.0).contains(&pose.y()));
            assert!((0.0..TAU).contains(&pose.heading()));
        }
    }

    #[test]
    fn forward_noise_has_expected_spread() {
        let world = World::new(1000.0, 1000.0).unwrap();
        let model = MotionModel::new(world).unwrap();
        let noise = NoiseParameters::new(2.0, 0.0, 0.0).unwrap();
        let start = Pose::new(100.0, 500.0, 0.0, &world).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let n = 20_000;
        let xs: Vec<f64> = (0..n)
            .map(|_| model.propagate(&start, 0.0, 10.0, &noise, &mut rng).unwrap().x())
            .collect();
        let mean = xs.iter().sum::<f64>() / n as f64;
        let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
        assert_approx_eq!(mean, 110.0, 0.1);
        assert_approx_eq!(var.sqrt(), 2.0, 0.1);
    }

    #[test]
    fn noise_parameters_validation() {
        assert!(NoiseParameters::new(0.0, 0.0, 0.0).is_ok());
        assert!(NoiseParameters::new(-0.1, 0.0, 0.0).is_err());
        assert!(NoiseParameters::new(0.0, f64::NAN, 0.0).is_err());
        assert!(NoiseParameters::new(0.0, 0.0, f64::INFINITY).is_err());
    }
}
