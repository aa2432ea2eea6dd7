//! Solver configuration.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SolverError;

/// Equilibration algorithm.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmKind {
    /// Origin-based Algorithm B with per-bush Newton flow shifts.
    #[default]
    B,
    /// Traffic Assignment by Paired Alternative Segments.
    Tapas,
}

impl FromStr for AlgorithmKind {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "b" | "algorithm-b" | "algorithmb" => Ok(Self::B),
            "tapas" => Ok(Self::Tapas),
            _ => Err(SolverError::UnknownAlgorithm(s.to_string())),
        }
    }
}

impl Display for AlgorithmKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::B => write!(f, "AlgorithmB"),
            Self::Tapas => write!(f, "TAPAS"),
        }
    }
}

/// Convergence measure used by the stopping rule.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GapKind {
    /// `1 - shortest path travel time / total travel time`.
    #[default]
    Relative,
    /// Largest difference between the longest used and the shortest path costs.
    Max,
}

impl FromStr for GapKind {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "relative" | "rel" => Ok(Self::Relative),
            "max" => Ok(Self::Max),
            _ => Err(SolverError::InvalidConfig(format!("unknown gap kind '{s}'"))),
        }
    }
}

/// Parameters of the TAPAS variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TapasConfig {
    /// Share of the reduced cost a segment pair must cover to be cost effective.
    pub mu: f64,
    /// Share of the triggering link flow a segment pair must carry to be flow effective.
    pub v: f64,
}

impl Default for TapasConfig {
    fn default() -> Self {
        Self { mu: 0.5, v: 0.25 }
    }
}

/// Solver settings, passed explicitly to algorithms and the equilibrium driver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Equilibration algorithm.
    pub algorithm: AlgorithmKind,
    /// Gap used by the stopping rule.
    pub gap: GapKind,
    /// Target value of the gap.
    pub max_error: f64,
    /// Limit on the number of outer iterations.
    pub max_iterations: usize,
    /// Flows below this value are treated as zero.
    pub zero_flow: f64,
    /// Cost differences below this value are treated as zero.
    pub dir_tolerance: f64,
    /// Limit on consecutive flow shifts at one node.
    pub max_shift_steps: usize,
    /// Number of worker threads processing bushes (Algorithm B only).
    pub threads: usize,
    /// TAPAS parameters.
    pub tapas: TapasConfig,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            algorithm: AlgorithmKind::B,
            gap: GapKind::Relative,
            max_error: 1e-6,
            max_iterations: 1000,
            zero_flow: 1e-12,
            dir_tolerance: 1e-12,
            max_shift_steps: 100,
            threads: 1,
            tapas: TapasConfig::default(),
        }
    }
}

impl SolverConfig {
    /// Creates config from YAML file.
    pub fn from_file(file_name: &str) -> Result<Self, SolverError> {
        let text = std::fs::read_to_string(file_name).map_err(|err| SolverError::ConfigFile {
            path: file_name.to_string(),
            message: err.to_string(),
        })?;
        let config: Self = serde_yaml::from_str(&text).map_err(|err| SolverError::ConfigFile {
            path: file_name.to_string(),
            message: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that all values are usable.
    pub fn validate(&self) -> Result<(), SolverError> {
        let positive = [
            ("zero_flow", self.zero_flow),
            ("dir_tolerance", self.dir_tolerance),
            ("tapas.mu", self.tapas.mu),
            ("tapas.v", self.tapas.v),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.) {
                return Err(SolverError::InvalidConfig(format!("{name} must be positive, got {value}")));
            }
        }
        if !(self.max_error.is_finite() && self.max_error >= 0.) {
            return Err(SolverError::InvalidConfig(format!(
                "max_error must be non-negative, got {}",
                self.max_error
            )));
        }
        if self.tapas.v > 1. {
            return Err(SolverError::InvalidConfig(format!(
                "tapas.v must not exceed 1, got {}",
                self.tapas.v
            )));
        }
        for (name, value) in [
            ("max_iterations", self.max_iterations),
            ("max_shift_steps", self.max_shift_steps),
            ("threads", self.threads),
        ] {
            if value == 0 {
                return Err(SolverError::InvalidConfig(format!("{name} must be positive")));
            }
        }
        Ok(())
    }
}
