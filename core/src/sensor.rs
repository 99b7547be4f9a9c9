//! Range-to-landmark sensor model.
//!
//! The agent measures its Euclidean distance to every landmark of a fixed, ordered
//! [`LandmarkSet`]. Each range is corrupted with independent Gaussian noise of
//! standard deviation σ_s. Measurement vectors are index aligned with the landmark set:
//! entry `i` is always the range to landmark `i`.
//!
//! The likelihood of a measurement given a hypothesised pose is the product of the
//! univariate Gaussian densities of each observed range around the expected
//! (noiseless) range. The product is an unnormalized relative weight and may underflow
//! towards zero for poses far from the truth; that is normal data, not an error. For
//! large landmark counts [`SensorModel::log_likelihood`] sums log densities instead.

use std::f64::consts::PI;
use std::fmt::{self, Display};

use nalgebra::Point2;
use rand::Rng;

use crate::error::{MclError, Result};
use crate::motion::gaussian_sample;
use crate::pose::Pose;

/// Univariate Gaussian density with mean `mu` and standard deviation `sigma` evaluated at `x`.
pub fn gaussian(mu: f64, sigma: f64, x: f64) -> f64 {
    let variance = sigma * sigma;
    (-((mu - x).powi(2)) / variance / 2.0).exp() / (2.0 * PI * variance).sqrt()
}

/// Natural log of [`gaussian`].
pub fn log_gaussian(mu: f64, sigma: f64, x: f64) -> f64 {
    let normalized = (x - mu) / sigma;
    -0.5 * normalized * normalized - sigma.ln() - 0.5 * (2.0 * PI).ln()
}

/// Ordered, non-empty set of fixed landmark coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct LandmarkSet {
    landmarks: Vec<Point2<f64>>,
}

impl LandmarkSet {
    pub fn new(landmarks: Vec<Point2<f64>>) -> Result<Self> {
        if landmarks.is_empty() {
            return Err(MclError::InvalidArgument(
                "landmark list must not be empty".to_string(),
            ));
        }
        if let Some(bad) = landmarks
            .iter()
            .find(|l| !(l.x.is_finite() && l.y.is_finite()))
        {
            return Err(MclError::InvalidArgument(format!(
                "landmark coordinates must be finite, got ({}, {})",
                bad.x, bad.y
            )));
        }
        Ok(LandmarkSet { landmarks })
    }

    /// Build a landmark set from `[x, y]` pairs.
    pub fn from_coordinates(coordinates: &[[f64; 2]]) -> Result<Self> {
        Self::new(
            coordinates
                .iter()
                .map(|&[x, y]| Point2::new(x, y))
                .collect(),
        )
    }

    /// The four corner landmarks used by the reference scenario.
    pub fn reference() -> Self {
        LandmarkSet {
            landmarks: vec![
                Point2::new(20.0, 20.0),
                Point2::new(80.0, 80.0),
                Point2::new(20.0, 80.0),
                Point2::new(80.0, 20.0),
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Point2<f64>> {
        self.landmarks.iter()
    }

    pub fn to_coordinates(&self) -> Vec<[f64; 2]> {
        self.landmarks.iter().map(|l| [l.x, l.y]).collect()
    }
}

/// Range measurements, one per landmark, index aligned with the [`LandmarkSet`].
#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    ranges: Vec<f64>,
}

impl Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Measurement({:.3?})", self.ranges)
    }
}

impl From<Vec<f64>> for Measurement {
    fn from(ranges: Vec<f64>) -> Self {
        Measurement { ranges }
    }
}

impl Measurement {
    pub fn new(ranges: Vec<f64>) -> Self {
        Measurement { ranges }
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.ranges
    }
}

/// Simulates and scores range measurements against a shared landmark set.
#[derive(Clone, Debug)]
pub struct SensorModel {
    landmarks: LandmarkSet,
}

impl SensorModel {
    pub fn new(landmarks: LandmarkSet) -> Self {
        SensorModel { landmarks }
    }

    pub fn landmarks(&self) -> &LandmarkSet {
        &self.landmarks
    }

    /// Noiseless distance from `pose` to every landmark, in landmark order.
    pub fn expected_ranges(&self, pose: &Pose) -> Vec<f64> {
        let position = Point2::from(pose.position());
        self.landmarks
            .iter()
            .map(|landmark| nalgebra::distance(&position, landmark))
            .collect()
    }

    /// Simulate a noisy measurement taken from `pose`.
    pub fn sense<R: Rng + ?Sized>(&self, pose: &Pose, sense_noise: f64, rng: &mut R) -> Measurement {
        Measurement::new(
            self.expected_ranges(pose)
                .into_iter()
                .map(|range| range + gaussian_sample(sense_noise, rng))
                .collect(),
        )
    }

    /// Likelihood of `measurement` if the agent were at `pose`: the product of the
    /// per-landmark Gaussian densities.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the measurement length differs from the landmark count,
    /// a range is not finite, or `sense_noise` is not strictly positive.
    pub fn likelihood(&self, pose: &Pose, measurement: &Measurement, sense_noise: f64) -> Result<f64> {
        self.check(measurement, sense_noise)?;
        Ok(self
            .expected_ranges(pose)
            .iter()
            .zip(measurement.as_slice())
            .map(|(&expected, &observed)| gaussian(expected, sense_noise, observed))
            .product())
    }

    /// Sum of per-landmark log densities; `exp` of this equals [`SensorModel::likelihood`]
    /// wherever the latter does not underflow.
    pub fn log_likelihood(
        &self,
        pose: &Pose,
        measurement: &Measurement,
        sense_noise: f64,
    ) -> Result<f64> {
        self.check(measurement, sense_noise)?;
        Ok(self
            .expected_ranges(pose)
            .iter()
            .zip(measurement.as_slice())
            .map(|(&expected, &observed)| log_gaussian(expected, sense_noise, observed))
            .sum())
    }

    /// Validate a measurement against the landmark set.
    pub fn check_measurement(&self, measurement: &Measurement) -> Result<()> {
        if measurement.len() != self.landmarks.len() {
            return Err(MclError::InvalidArgument(format!(
                "measurement has {} ranges but there are {} landmarks",
                measurement.len(),
                self.landmarks.len()
            )));
        }
        if measurement.as_slice().iter().any(|r| !r.is_finite()) {
            return Err(MclError::InvalidArgument(
                "measurement ranges must be finite".to_string(),
            ));
        }
        Ok(())
    }

    fn check(&self, measurement: &Measurement, sense_noise: f64) -> Result<()> {
        self.check_measurement(measurement)?;
        if !(sense_noise.is_finite() && sense_noise > 0.0) {
            return Err(MclError::InvalidArgument(format!(
                "likelihood needs a positive sense noise, got {}",
                sense_noise
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::World;
    use assert_approx_eq::assert_approx_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn pose(x: f64, y: f64) -> Pose {
        Pose::new(x, y, 0.0, &World::default()).unwrap()
    }

    #[test]
    fn gaussian_peaks_at_mean() {
        let d = 30.0;
        let sigma = 5.0;
        let peak = gaussian(d, sigma, d);
        assert_approx_eq!(peak, 1.0 / (2.0 * PI * sigma * sigma).sqrt());
        let mut previous = peak;
        for step in 1..50 {
            let offset = step as f64 * 0.5;
            let above = gaussian(d, sigma, d + offset);
            let below = gaussian(d, sigma, d - offset);
            assert!(above < previous);
            assert_approx_eq!(above, below, 1e-15);
            previous = above;
        }
    }

    #[test]
    fn log_gaussian_matches_gaussian() {
        for &(mu, sigma, x) in &[(0.0, 1.0, 0.0), (10.0, 5.0, 3.0), (42.0, 0.5, 43.1)] {
            assert_approx_eq!(log_gaussian(mu, sigma, x).exp(), gaussian(mu, sigma, x), 1e-12);
        }
    }

    #[test]
    fn landmark_set_rejects_empty() {
        assert!(matches!(
            LandmarkSet::new(vec![]),
            Err(MclError::InvalidArgument(_))
        ));
        assert!(LandmarkSet::from_coordinates(&[[f64::NAN, 1.0]]).is_err());
        let set = LandmarkSet::from_coordinates(&[[1.0, 2.0], [3.0, 4.0]]).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.to_coordinates(), vec![[1.0, 2.0], [3.0, 4.0]]);
    }

    #[test]
    fn expected_ranges_are_index_aligned() {
        let sensor = SensorModel::new(LandmarkSet::reference());
        let ranges = sensor.expected_ranges(&pose(20.0, 50.0));
        assert_eq!(ranges.len(), 4);
        assert_approx_eq!(ranges[0], 30.0);
        assert_approx_eq!(ranges[1], (60.0_f64.powi(2) + 30.0_f64.powi(2)).sqrt());
        assert_approx_eq!(ranges[2], 30.0);
        assert_approx_eq!(ranges[3], (60.0_f64.powi(2) + 30.0_f64.powi(2)).sqrt());
    }

    #[test]
    fn noiseless_sense_equals_expected_ranges() {
        let sensor = SensorModel::new(LandmarkSet::reference());
        let mut rng = StdRng::seed_from_u64(5);
        let p = pose(33.0, 61.0);
        let z = sensor.sense(&p, 0.0, &mut rng);
        assert_eq!(z.as_slice(), sensor.expected_ranges(&p).as_slice());
    }

    #[test]
    fn likelihood_prefers_true_pose() {
        let sensor = SensorModel::new(LandmarkSet::reference());
        let truth = pose(40.0, 60.0);
        let z = Measurement::new(sensor.expected_ranges(&truth));
        let at_truth = sensor.likelihood(&truth, &z, 5.0).unwrap();
        let near = sensor.likelihood(&pose(42.0, 60.0), &z, 5.0).unwrap();
        let far = sensor.likelihood(&pose(90.0, 10.0), &z, 5.0).unwrap();
        assert!(at_truth > near);
        assert!(near > far);
        assert!(far >= 0.0);
    }

    #[test]
    fn log_likelihood_is_equivalent() {
        let sensor = SensorModel::new(LandmarkSet::reference());
        let z = Measurement::new(vec![25.0, 70.0, 40.0, 55.0]);
        let p = pose(35.0, 45.0);
        let direct = sensor.likelihood(&p, &z, 5.0).unwrap();
        let via_log = sensor.log_likelihood(&p, &z, 5.0).unwrap().exp();
        assert_approx_eq!(direct, via_log, direct * 1e-10);
    }

    #[test]
    fn likelihood_underflow_is_not_an_error() {
        let coordinates: Vec<[f64; 2]> = (0..400).map(|i| [i as f64 * 0.25, 0.0]).collect();
        let sensor = SensorModel::new(LandmarkSet::from_coordinates(&coordinates).unwrap());
        let z = Measurement::new(vec![500.0; 400]);
        let p = pose(0.0, 0.0);
        let direct = sensor.likelihood(&p, &z, 1.0).unwrap();
        assert_eq!(direct, 0.0);
        let log = sensor.log_likelihood(&p, &z, 1.0).unwrap();
        assert!(log.is_finite());
    }

    #[test]
    fn likelihood_rejects_bad_input() {
        let sensor = SensorModel::new(LandmarkSet::reference());
        let p = pose(1.0, 1.0);
        let short = Measurement::new(vec![1.0, 2.0]);
        assert!(matches!(
            sensor.likelihood(&p, &short, 5.0),
            Err(MclError::InvalidArgument(_))
        ));
        let z = Measurement::new(vec![1.0, 2.0, 3.0, 4.0]);
        assert!(sensor.likelihood(&p, &z, 0.0).is_err());
        let nan = Measurement::new(vec![1.0, f64::NAN, 3.0, 4.0]);
        assert!(sensor.log_likelihood(&p, &nan, 5.0).is_err());
    }
}
