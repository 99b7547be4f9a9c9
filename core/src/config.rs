//! Filter and scenario configuration.
//!
//! Configurations are plain serde structs with defaults matching the reference
//! localization scenario: a 100 x 100 world, four corner landmarks, 1000 particles
//! and noise `(0.05, 0.05, 5.0)`. A [`ScenarioConfig`] can be read from or written to
//! JSON, YAML or TOML; the format is chosen by file extension.
//!
//! ## Example
//!
//! ```
//! use mcl::config::{FilterConfig, ScenarioConfig};
//!
//! let cfg = ScenarioConfig {
//!     steps: 20,
//!     filter: FilterConfig {
//!         population_size: 500,
//!         ..FilterConfig::default()
//!     },
//!     ..ScenarioConfig::default()
//! };
//! assert!(cfg.validate().is_ok());
//! ```

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{MclError, Result};
use crate::motion::{NoiseParameters, check_command};
use crate::particle::{ParticleAveragingStrategy, WeightingMode};
use crate::pose::{Pose, World};
use crate::resampling::ResamplingStrategy;
use crate::sensor::LandmarkSet;

fn default_population_size() -> usize {
    1000
}

fn default_landmarks() -> Vec<[f64; 2]> {
    LandmarkSet::reference().to_coordinates()
}

fn default_seed() -> u64 {
    42
}

fn default_parallel() -> bool {
    true
}

fn default_steps() -> usize {
    10
}

fn default_turn() -> f64 {
    0.1
}

fn default_forward() -> f64 {
    5.0
}

fn default_reinitialize() -> bool {
    true
}

/// Everything needed to construct a [`crate::particle::ParticleFilter`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Number of particles N, constant for the filter's lifetime
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    /// Toroidal world size
    #[serde(default)]
    pub world: World,
    /// Landmark coordinates `[x, y]`, in measurement order
    #[serde(default = "default_landmarks")]
    pub landmarks: Vec<[f64; 2]>,
    /// Noise triple shared by every particle
    #[serde(default)]
    pub noise: NoiseParameters,
    #[serde(default)]
    pub resampling: ResamplingStrategy,
    #[serde(default)]
    pub averaging: ParticleAveragingStrategy,
    #[serde(default)]
    pub weighting: WeightingMode,
    /// Propagate and weigh particles on the rayon thread pool
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    /// Master seed; identical seeds reproduce identical runs
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            population_size: default_population_size(),
            world: World::default(),
            landmarks: default_landmarks(),
            noise: NoiseParameters::default(),
            resampling: ResamplingStrategy::default(),
            averaging: ParticleAveragingStrategy::default(),
            weighting: WeightingMode::default(),
            parallel: default_parallel(),
            seed: default_seed(),
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.population_size == 0 {
            return Err(MclError::InvalidArgument(
                "population size must be positive".to_string(),
            ));
        }
        self.world.validate()?;
        LandmarkSet::from_coordinates(&self.landmarks)?;
        self.noise.validate()?;
        if self.noise.sense_noise <= 0.0 {
            return Err(MclError::InvalidArgument(
                "particle sense noise must be positive to score measurements".to_string(),
            ));
        }
        Ok(())
    }

    pub fn landmark_set(&self) -> Result<LandmarkSet> {
        LandmarkSet::from_coordinates(&self.landmarks)
    }
}

/// A complete localization run: the filter plus the simulated agent it tracks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub filter: FilterConfig,
    /// Number of estimation steps
    #[serde(default = "default_steps")]
    pub steps: usize,
    /// Turn command applied every step (radians)
    #[serde(default = "default_turn")]
    pub turn: f64,
    /// Forward command applied every step (world units, non-negative)
    #[serde(default = "default_forward")]
    pub forward: f64,
    /// Noise of the simulated agent; the filter noise when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_noise: Option<NoiseParameters>,
    /// Starting `[x, y, heading]` of the agent; uniformly random when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_pose: Option<[f64; 3]>,
    /// Scatter the particles uniformly again when all weights vanish
    #[serde(default = "default_reinitialize")]
    pub reinitialize_on_divergence: bool,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig {
            filter: FilterConfig::default(),
            steps: default_steps(),
            turn: default_turn(),
            forward: default_forward(),
            agent_noise: None,
            initial_pose: None,
            reinitialize_on_divergence: default_reinitialize(),
        }
    }
}

impl ScenarioConfig {
    pub fn validate(&self) -> Result<()> {
        self.filter.validate()?;
        check_command(self.turn, self.forward)?;
        if let Some(noise) = &self.agent_noise {
            noise.validate()?;
        }
        self.initial_pose()?;
        Ok(())
    }

    pub fn agent_noise(&self) -> NoiseParameters {
        self.agent_noise.unwrap_or(self.filter.noise)
    }

    /// The configured starting pose, checked against the world bounds.
    pub fn initial_pose(&self) -> Result<Option<Pose>> {
        self.initial_pose
            .map(|[x, y, heading]| Pose::new(x, y, heading, &self.filter.world))
            .transpose()
    }

    /// Write the configuration to a JSON file (pretty-printed).
    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// Read the configuration from a JSON file.
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }

    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_string(path, &serde_yaml::to_string(self)?)
    }

    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_yaml::from_reader(file)?)
    }

    pub fn to_toml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_string(path, &toml::to_string(self)?)
    }

    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(toml::from_str(&read_string(path)?)?)
    }

    /// Generic write: choose format by file extension (.json/.yaml/.yml/.toml)
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let p = path.as_ref();
        match ConfigFormat::from_path(p)? {
            ConfigFormat::Json => self.to_json(p),
            ConfigFormat::Yaml => self.to_yaml(p),
            ConfigFormat::Toml => self.to_toml(p),
        }
    }

    /// Generic read: choose format by file extension (.json/.yaml/.yml/.toml)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let config: Self = match ConfigFormat::from_path(p)? {
            ConfigFormat::Json => Self::from_json(p)?,
            ConfigFormat::Yaml => Self::from_yaml(p)?,
            ConfigFormat::Toml => Self::from_toml(p)?,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Serialization format of a configuration file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
    Toml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase());
        match ext.as_deref() {
            Some("json") => Ok(ConfigFormat::Json),
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            _ => Err(MclError::Config(format!(
                "unsupported config file extension: {}",
                path.display()
            ))),
        }
    }
}

fn write_string<P: AsRef<Path>>(path: P, contents: &str) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(contents.as_bytes())?;
    Ok(())
}

fn read_string<P: AsRef<Path>>(path: P) -> Result<String> {
    let mut s = String::new();
    File::open(path)?.read_to_string(&mut s)?;
    Ok(s)
}

/// Parse any serde type from a string in the given format.
pub fn parse_str<T: DeserializeOwned>(contents: &str, format: ConfigFormat) -> Result<T> {
    match format {
        ConfigFormat::Json => Ok(serde_json::from_str(contents)?),
        ConfigFormat::Yaml => Ok(serde_yaml::from_str(contents)?),
        ConfigFormat::Toml => Ok(toml::from_str(contents)?),
    }
}
