//! Importance resampling.
//!
//! Resampling turns a weighted particle population into an unweighted one by drawing
//! population indices with replacement, with probability proportional to weight. The
//! default strategy is the resampling wheel: the weights are laid out as arcs on a
//! circle and a cursor walks around it in random strides bounded by twice the
//! largest weight. Each pick is O(1) amortized, so a full population draw is O(N).
//!
//! Systematic and residual resampling are provided as alternatives. All strategies
//! reject weight vectors without mass with [`MclError::DegenerateWeights`] instead of
//! looping forever or dividing by zero.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{MclError, Result};

/// Check that `weights` is a usable, non-empty vector of finite non-negative values and
/// return its sum. The sum may be zero.
pub fn validate_weights(weights: &[f64]) -> Result<f64> {
    if weights.is_empty() {
        return Err(MclError::InvalidArgument(
            "cannot resample an empty weight vector".to_string(),
        ));
    }
    if let Some((i, w)) = weights
        .iter()
        .enumerate()
        .find(|(_, w)| !(w.is_finite() && **w >= 0.0))
    {
        return Err(MclError::InvalidArgument(format!(
            "weight {} at index {} must be finite and non-negative",
            w, i
        )));
    }
    Ok(weights.iter().sum())
}

/// Effective sample size `(Σw)² / Σw²`; equals N for uniform weights and 1 when a single
/// particle holds all the mass. Zero when every weight is zero.
pub fn effective_sample_size(weights: &[f64]) -> f64 {
    let sum: f64 = weights.iter().sum();
    let sum_of_squares: f64 = weights.iter().map(|w| w * w).sum();
    if sum_of_squares > 0.0 {
        sum * sum / sum_of_squares
    } else {
        0.0
    }
}

/// Stateful weighted sampler over one installed weight vector.
///
/// The wheel is idle after [`install`](ResamplingWheel::install) and after every
/// completed [`pick`](ResamplingWheel::pick). A pick first advances `beta` by a fresh
/// stride `U(0, 1) * 2 * max_weight`, then walks `last_index` forward around the wheel,
/// consuming each arc's weight from `beta`, until `beta` fits inside the current arc.
/// Zero-weight arcs are always walked past.
#[derive(Clone, Debug, Default)]
pub struct ResamplingWheel {
    wheel: Vec<f64>,
    max_weight: f64,
    beta: f64,
    last_index: usize,
    is_resampled: bool,
}

impl ResamplingWheel {
    /// An empty wheel. Picking from it reports degenerate weights until weights are installed.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Result<Self> {
        let mut wheel = Self::new();
        wheel.install(weights, rng)?;
        Ok(wheel)
    }

    /// Replace the wheel contents and reseed the cursor at a uniformly random index.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `weights` is empty or holds a negative or non-finite value.
    /// An all-zero vector installs fine; the following pick reports it.
    pub fn install<R: Rng + ?Sized>(&mut self, weights: &[f64], rng: &mut R) -> Result<()> {
        validate_weights(weights)?;
        self.wheel.clear();
        self.wheel.extend_from_slice(weights);
        self.max_weight = weights.iter().copied().fold(0.0, f64::max);
        self.last_index = rng.random_range(0..weights.len());
        self.beta = 0.0;
        self.is_resampled = false;
        Ok(())
    }

    /// Draw one index with probability proportional to its weight.
    ///
    /// # Errors
    ///
    /// `DegenerateWeights` if nothing is installed or every installed weight is zero.
    pub fn pick<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<usize> {
        if self.wheel.is_empty() {
            return Err(MclError::DegenerateWeights(
                "no weights installed on the resampling wheel".to_string(),
            ));
        }
        if self.max_weight <= 0.0 {
            return Err(MclError::DegenerateWeights(format!(
                "all {} weights are zero",
                self.wheel.len()
            )));
        }
        if !self.is_resampled {
            self.beta += rng.random::<f64>() * 2.0 * self.max_weight;
            self.is_resampled = true;
        }
        while self.beta > self.wheel[self.last_index] || self.wheel[self.last_index] == 0.0 {
            self.beta -= self.wheel[self.last_index];
            self.last_index = (self.last_index + 1) % self.wheel.len();
        }
        self.is_resampled = false;
        Ok(self.last_index)
    }

    pub fn len(&self) -> usize {
        self.wheel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wheel.is_empty()
    }

    pub fn max_weight(&self) -> f64 {
        self.max_weight
    }

    pub fn weights(&self) -> &[f64] {
        &self.wheel
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ResamplingStrategy {
    #[default]
    Wheel,
    Systematic,
    Residual,
}

impl ResamplingStrategy {
    /// Draw `count` indices into `weights`, each with probability proportional to its weight.
    pub fn resample<R: Rng + ?Sized>(
        &self,
        weights: &[f64],
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<usize>> {
        match self {
            ResamplingStrategy::Wheel => Self::wheel_resample(weights, count, rng),
            ResamplingStrategy::Systematic => Self::systematic_resample(weights, count, rng),
            ResamplingStrategy::Residual => Self::residual_resample(weights, count, rng),
        }
    }

    fn wheel_resample<R: Rng + ?Sized>(
        weights: &[f64],
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<usize>> {
        let mut wheel = ResamplingWheel::with_weights(weights, rng)?;
        (0..count).map(|_| wheel.pick(rng)).collect()
    }

    fn systematic_resample<R: Rng + ?Sized>(
        weights: &[f64],
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<usize>> {
        let total = checked_total(weights)?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let step = total / count as f64;
        let start = rng.random::<f64>() * step;
        Ok(walk_positions(weights, start, step, count))
    }

    fn residual_resample<R: Rng + ?Sized>(
        weights: &[f64],
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<usize>> {
        let total = checked_total(weights)?;
        let n = count as f64;
        let mut indices = Vec::with_capacity(count);
        let mut residual = Vec::with_capacity(weights.len());
        for (i, &w) in weights.iter().enumerate() {
            let expected = w / total * n;
            let copies = expected.floor() as usize;
            indices.extend(std::iter::repeat_n(i, copies));
            residual.push(expected - copies as f64);
        }
        indices.truncate(count);
        let remaining = count - indices.len();
        if remaining > 0 {
            let sum_residual: f64 = residual.iter().sum();
            if sum_residual > 0.0 {
                let step = sum_residual / remaining as f64;
                let start = rng.random::<f64>() * step;
                indices.extend(walk_positions(&residual, start, step, remaining));
            } else {
                // rounding left no residual mass; fall back to the original weights
                let step = total / remaining as f64;
                let start = rng.random::<f64>() * step;
                indices.extend(walk_positions(weights, start, step, remaining));
            }
        }
        Ok(indices)
    }
}

fn checked_total(weights: &[f64]) -> Result<f64> {
    let total = validate_weights(weights)?;
    if total <= 0.0 {
        return Err(MclError::DegenerateWeights(format!(
            "all {} weights are zero",
            weights.len()
        )));
    }
    Ok(total)
}

/// Select the bins hit by `count` evenly spaced positions `start + k * step` on the
/// cumulative weight axis.
fn walk_positions(weights: &[f64], start: f64, step: f64, count: usize) -> Vec<usize> {
    // rounding can carry the final positions past the last non-empty bin
    let last_positive = weights.iter().rposition(|&w| w > 0.0).unwrap_or(0);
    let mut selected = Vec::with_capacity(count);
    let mut i = 0;
    let mut cumsum = weights[0];
    for k in 0..count {
        let position = start + k as f64 * step;
        while i + 1 < weights.len() && (position > cumsum || weights[i] == 0.0) {
            i += 1;
            cumsum += weights[i];
        }
        selected.push(if weights[i] > 0.0 { i } else { last_positive });
    }
    selected
}
