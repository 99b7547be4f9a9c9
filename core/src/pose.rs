//! Planar poses on a toroidal world.
//!
//! The world is a flat torus of size `width` x `height`: leaving one edge re-enters
//! at the opposite edge. Every [`Pose`] keeps its coordinates wrapped into
//! `[0, width) x [0, height)` and its heading wrapped into `[0, 2π)`.
//!
//! Poses are immutable values. Motion produces a new pose (see
//! [`crate::motion::MotionModel`]) rather than mutating in place, so a population of
//! poses can be shared freely between worker threads.

use std::f64::consts::TAU;
use std::fmt::{self, Display};

use nalgebra::Vector2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{MclError, Result};

/// Mathematical (always non-negative) modulo of `value` into `[0, period)`.
///
/// `f64::rem_euclid` can round up to exactly `period` for tiny negative inputs; that
/// case is folded back to zero so the half-open interval always holds.
pub fn wrap(value: f64, period: f64) -> f64 {
    let wrapped = value.rem_euclid(period);
    if wrapped >= period { 0.0 } else { wrapped }
}

/// Wrap a signed difference into `[-period/2, period/2)`.
pub fn wrap_signed(delta: f64, period: f64) -> f64 {
    let half = period / 2.0;
    wrap(delta + half, period) - half
}

/// Size of the toroidal world.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct World {
    pub width: f64,
    pub height: f64,
}

impl Default for World {
    fn default() -> Self {
        World::square(100.0)
    }
}

impl World {
    /// Create a world, rejecting non-positive or non-finite dimensions.
    pub fn new(width: f64, height: f64) -> Result<Self> {
        let world = World { width, height };
        world.validate()?;
        Ok(world)
    }

    /// A square world of the given edge length. Not validated; see [`World::validate`].
    pub fn square(size: f64) -> Self {
        World {
            width: size,
            height: size,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.width.is_finite() && self.width > 0.0) {
            return Err(MclError::InvalidArgument(format!(
                "world width must be positive and finite, got {}",
                self.width
            )));
        }
        if !(self.height.is_finite() && self.height > 0.0) {
            return Err(MclError::InvalidArgument(format!(
                "world height must be positive and finite, got {}",
                self.height
            )));
        }
        Ok(())
    }

    /// Shortest displacement from `from` to `to` on the torus, each axis in
    /// `[-size/2, size/2)`.
    pub fn displacement(&self, from: &Pose, to: &Pose) -> Vector2<f64> {
        Vector2::new(
            wrap_signed(to.x - from.x, self.width),
            wrap_signed(to.y - from.y, self.height),
        )
    }

    /// Toroidal Euclidean distance between two poses (heading ignored).
    pub fn distance(&self, a: &Pose, b: &Pose) -> f64 {
        self.displacement(b, a).norm()
    }
}

/// Agent pose: position in world units and heading in radians.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    x: f64,
    y: f64,
    heading: f64,
}

impl Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[x={:.3} y={:.3} orient={:.3}]",
            self.x, self.y, self.heading
        )
    }
}

impl Pose {
    /// Construct a pose from coordinates that must already lie inside the world.
    ///
    /// Out-of-range or non-finite values are rejected, never clamped.
    pub fn new(x: f64, y: f64, heading: f64, world: &World) -> Result<Self> {
        if !(x.is_finite() && (0.0..world.width).contains(&x)) {
            return Err(MclError::InvalidArgument(format!(
                "x coordinate {} out of bounds [0, {})",
                x, world.width
            )));
        }
        if !(y.is_finite() && (0.0..world.height).contains(&y)) {
            return Err(MclError::InvalidArgument(format!(
                "y coordinate {} out of bounds [0, {})",
                y, world.height
            )));
        }
        if !(heading.is_finite() && (0.0..TAU).contains(&heading)) {
            return Err(MclError::InvalidArgument(format!(
                "heading {} must be in [0, 2pi)",
                heading
            )));
        }
        Ok(Pose { x, y, heading })
    }

    /// Construct a pose from arbitrary finite coordinates, wrapping each into its domain.
    pub fn wrapped(x: f64, y: f64, heading: f64, world: &World) -> Result<Self> {
        if !(x.is_finite() && y.is_finite() && heading.is_finite()) {
            return Err(MclError::InvalidArgument(format!(
                "pose components must be finite, got ({}, {}, {})",
                x, y, heading
            )));
        }
        Ok(Self::wrap_components(x, y, heading, world))
    }

    /// Wrap components already known to be finite.
    pub(crate) fn wrap_components(x: f64, y: f64, heading: f64, world: &World) -> Self {
        Pose {
            x: wrap(x, world.width),
            y: wrap(y, world.height),
            heading: wrap(heading, TAU),
        }
    }

    /// Draw a pose uniformly over the world and over all headings.
    pub fn random<R: Rng + ?Sized>(world: &World, rng: &mut R) -> Self {
        Pose {
            x: wrap(rng.random::<f64>() * world.width, world.width),
            y: wrap(rng.random::<f64>() * world.height, world.height),
            heading: wrap(rng.random::<f64>() * TAU, TAU),
        }
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn heading(&self) -> f64 {
        self.heading
    }

    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn wrap_is_mathematical_modulo() {
        assert_approx_eq!(wrap(105.0, 100.0), 5.0);
        assert_approx_eq!(wrap(-5.0, 100.0), 95.0);
        assert_eq!(wrap(100.0, 100.0), 0.0);
        assert_eq!(wrap(0.0, 100.0), 0.0);
        // rem_euclid rounds this up to the period itself
        let tiny = wrap(-1e-18, 100.0);
        assert!((0.0..100.0).contains(&tiny));
    }

    #[test]
    fn wrap_signed_is_half_open() {
        assert_approx_eq!(wrap_signed(60.0, 100.0), -40.0);
        assert_approx_eq!(wrap_signed(-60.0, 100.0), 40.0);
        assert_approx_eq!(wrap_signed(-50.0, 100.0), -50.0);
        assert_approx_eq!(wrap_signed(50.0, 100.0), -50.0);
        assert_approx_eq!(wrap_signed(10.0, 100.0), 10.0);
    }

    #[test]
    fn world_rejects_bad_sizes() {
        assert!(World::new(100.0, 100.0).is_ok());
        assert!(World::new(0.0, 100.0).is_err());
        assert!(World::new(100.0, -1.0).is_err());
        assert!(World::new(f64::NAN, 100.0).is_err());
        assert!(World::new(f64::INFINITY, 100.0).is_err());
    }

    #[test]
    fn pose_new_rejects_out_of_range() {
        let world = World::default();
        assert!(Pose::new(10.0, 20.0, 1.0, &world).is_ok());
        assert!(matches!(
            Pose::new(-1.0, 20.0, 1.0, &world),
            Err(MclError::InvalidArgument(_))
        ));
        assert!(Pose::new(100.0, 20.0, 1.0, &world).is_err());
        assert!(Pose::new(10.0, 100.0, 1.0, &world).is_err());
        assert!(Pose::new(10.0, 20.0, TAU, &world).is_err());
        assert!(Pose::new(10.0, 20.0, -0.1, &world).is_err());
        assert!(Pose::new(f64::NAN, 20.0, 0.0, &world).is_err());
    }

    #[test]
    fn pose_wrapped_lands_in_domain() {
        let world = World::new(100.0, 50.0).unwrap();
        let pose = Pose::wrapped(-10.0, 130.0, -0.5, &world).unwrap();
        assert_approx_eq!(pose.x(), 90.0);
        assert_approx_eq!(pose.y(), 30.0);
        assert_approx_eq!(pose.heading(), TAU - 0.5);
        assert!(Pose::wrapped(f64::NAN, 0.0, 0.0, &world).is_err());
    }

    #[test]
    fn random_poses_stay_in_world() {
        let world = World::new(30.0, 70.0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let pose = Pose::random(&world, &mut rng);
            assert!((0.0..30.0).contains(&pose.x()));
            assert!((0.0..70.0).contains(&pose.y()));
            assert!((0.0..TAU).contains(&pose.heading()));
        }
    }

    #[test]
    fn toroidal_distance_wraps_around_edges() {
        let world = World::default();
        let a = Pose::new(1.0, 1.0, 0.0, &world).unwrap();
        let b = Pose::new(99.0, 99.0, 0.0, &world).unwrap();
        assert_approx_eq!(world.distance(&a, &b), 8.0_f64.sqrt());
        let d = world.displacement(&a, &b);
        assert_approx_eq!(d.x, -2.0);
        assert_approx_eq!(d.y, -2.0);
    }

    #[test]
    fn display_format() {
        let world = World::default();
        let pose = Pose::new(1.5, 2.25, 0.5, &world).unwrap();
        assert_eq!(pose.to_string(), "[x=1.500 y=2.250 orient=0.500]");
    }
}
