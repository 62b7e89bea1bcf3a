use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration values that cannot be used to start a run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid radius bounds: min_radius {min} / max_radius {max}")]
    InvalidRadiusBounds { min: f32, max: f32 },
    #[error("move probabilities must be non-negative and not all zero (split {split}, perturbation {perturbation})")]
    InvalidProbabilities { split: f64, perturbation: f64 },
    #[error("perturb params for '{param}' are invalid: {reason}")]
    InvalidPerturbParams { param: &'static str, reason: &'static str },
    #[error("invalid simulation setting: {0}")]
    InvalidSimulation(&'static str),
    #[error("bounding_box_scale must be at least 1.0, got {0}")]
    InvalidBoundingBoxScale(f32),
}

// Shape used for initial cells that do not carry spheroid columns
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    #[default]
    Sphere,
    Spheroid,
}

// Numeric rendering / search parameters, shared read-only by every frame
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SimulationConfig {
    pub iterations_per_cell: u32,
    pub background_color: f32,
    pub cell_color: f32,
    #[serde(default)]
    pub padding: u32,
    #[serde(default = "default_z_scaling")]
    pub z_scaling: f32,
    #[serde(default)]
    pub blur_sigma: f32,
    /// Expected plane count per volume. Taken from the loaded volumes when absent.
    #[serde(default)]
    pub z_slices: Option<usize>,
    #[serde(default)]
    pub seed: u64,
    /// Iterations between residual reports.
    #[serde(default = "default_report_interval")]
    pub report_interval: u32,
    /// Pixel-area range of the contours that feed split-axis estimation.
    #[serde(default = "default_min_contour_area")]
    pub min_contour_area: f64,
    #[serde(default = "default_max_contour_area")]
    pub max_contour_area: f64,
}

impl SimulationConfig {
    /// Depth of each plane of an `n`-plane volume: `z_scaling * (i - n/2)`.
    pub fn z_levels(&self, plane_count: usize) -> Vec<f32> {
        let half = (plane_count / 2) as i64;
        (0..plane_count)
            .map(|i| self.z_scaling * (i as i64 - half) as f32)
            .collect()
    }
}

// Move-selection weights
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct ProbabilityConfig {
    #[serde(default)]
    pub split: f64,
    #[serde(default)]
    pub perturbation: f64,
}

/// With probability `prob` a parameter moves by `Normal(mu, sigma)`, otherwise by `mu`.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct PerturbParams {
    pub prob: f64,
    pub mu: f32,
    pub sigma: f32,
}

impl PerturbParams {
    pub fn new(prob: f64, mu: f32, sigma: f32) -> Self {
        Self { prob, mu, sigma }
    }

    /// Same distribution with `mu` and `sigma` multiplied by `factor`.
    pub fn scaled(self, factor: f32) -> Self {
        Self { prob: self.prob, mu: self.mu * factor, sigma: self.sigma * factor }
    }

    fn validate(&self, param: &'static str) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.prob) {
            return Err(ConfigError::InvalidPerturbParams { param, reason: "prob must be within [0, 1]" });
        }
        if !(self.sigma >= 0.0) || !self.sigma.is_finite() {
            return Err(ConfigError::InvalidPerturbParams { param, reason: "sigma must be finite and non-negative" });
        }
        if !self.mu.is_finite() {
            return Err(ConfigError::InvalidPerturbParams { param, reason: "mu must be finite" });
        }
        Ok(())
    }
}

// Per-kind cell configuration: perturbation model and shape bounds
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CellConfig {
    pub x: PerturbParams,
    pub y: PerturbParams,
    pub z: PerturbParams,
    pub radius: PerturbParams,
    /// Semi-axis perturbation for spheroids; half of `radius` when absent.
    #[serde(default)]
    pub axis: Option<PerturbParams>,
    pub min_radius: f32,
    pub max_radius: f32,
    #[serde(default = "default_bounding_box_scale")]
    pub bounding_box_scale: f32,
}

impl CellConfig {
    pub fn axis_params(&self) -> PerturbParams {
        self.axis.unwrap_or_else(|| self.radius.scaled(0.5))
    }

    /// Clamps a radius-like value into `[min_radius, max_radius]`.
    #[inline(always)]
    pub fn clamp_radius(&self, value: f32) -> f32 {
        value.max(self.min_radius).min(self.max_radius)
    }

    #[inline(always)]
    pub fn radius_in_bounds(&self, value: f32) -> bool {
        self.min_radius <= value && value <= self.max_radius
    }
}

// Configuration for output settings
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_true")]
    pub save_images: bool,
    #[serde(default = "default_true")]
    pub save_cells: bool,
    pub format: Option<String>, // Snapshot format: "json", "bincode", "messagepack"
    #[serde(default = "default_base_filename")]
    pub base_filename: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            save_images: true,
            save_cells: true,
            format: None,
            base_filename: default_base_filename(),
        }
    }
}

// Main run configuration structure, loaded from a TOML file.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct BaseConfig {
    #[serde(default)]
    pub cell_type: CellType,
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub prob: ProbabilityConfig,
    pub cell: CellConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl BaseConfig {
    /// Loads the run configuration from a TOML file and validates it.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        let config = Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))?;
        Ok(config)
    }

    pub fn from_toml_str(config_str: &str) -> anyhow::Result<Self> {
        let config: BaseConfig = toml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let cell = &self.cell;
        if !(cell.min_radius > 0.0) || !(cell.min_radius <= cell.max_radius) || !cell.max_radius.is_finite() {
            return Err(ConfigError::InvalidRadiusBounds { min: cell.min_radius, max: cell.max_radius });
        }
        if !(cell.bounding_box_scale >= 1.0) {
            return Err(ConfigError::InvalidBoundingBoxScale(cell.bounding_box_scale));
        }
        cell.x.validate("x")?;
        cell.y.validate("y")?;
        cell.z.validate("z")?;
        cell.radius.validate("radius")?;
        cell.axis_params().validate("axis")?;

        let prob = &self.prob;
        if !(prob.split >= 0.0) || !(prob.perturbation >= 0.0) || prob.split + prob.perturbation <= 0.0 {
            return Err(ConfigError::InvalidProbabilities { split: prob.split, perturbation: prob.perturbation });
        }

        let sim = &self.simulation;
        if !(sim.z_scaling > 0.0) {
            return Err(ConfigError::InvalidSimulation("z_scaling must be positive"));
        }
        if sim.report_interval == 0 {
            return Err(ConfigError::InvalidSimulation("report_interval must be greater than 0"));
        }
        if sim.z_slices == Some(0) {
            return Err(ConfigError::InvalidSimulation("z_slices must be greater than 0 when set"));
        }
        if !(sim.min_contour_area >= 0.0) || !(sim.min_contour_area <= sim.max_contour_area) {
            return Err(ConfigError::InvalidSimulation("contour area range must satisfy 0 <= min <= max"));
        }
        if !sim.blur_sigma.is_finite() {
            return Err(ConfigError::InvalidSimulation("blur_sigma must be finite"));
        }
        Ok(())
    }
}

fn default_z_scaling() -> f32 {
    1.0
}

fn default_report_interval() -> u32 {
    100
}

fn default_min_contour_area() -> f64 {
    1e2
}

fn default_max_contour_area() -> f64 {
    1e5
}

fn default_bounding_box_scale() -> f32 {
    1.25
}

fn default_true() -> bool {
    true
}

fn default_base_filename() -> String {
    "lineage".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
cell_type = "sphere"

[simulation]
iterations_per_cell = 40
background_color = 0.1
cell_color = 0.8
z_scaling = 2.0
blur_sigma = 1.5

[prob]
split = 0.1
perturbation = 0.9

[cell]
x = { prob = 0.5, mu = 0.0, sigma = 1.0 }
y = { prob = 0.5, mu = 0.0, sigma = 1.0 }
z = { prob = 0.5, mu = 0.0, sigma = 0.5 }
radius = { prob = 0.5, mu = 0.0, sigma = 0.2 }
min_radius = 2.0
max_radius = 20.0
"#;

    #[test]
    fn sample_config_parses_with_defaults() {
        let config = BaseConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.cell_type, CellType::Sphere);
        assert_eq!(config.cell.bounding_box_scale, 1.25);
        assert_eq!(config.simulation.report_interval, 100);
        assert_eq!(config.simulation.min_contour_area, 100.0);
        assert_eq!(config.simulation.max_contour_area, 100_000.0);
        assert_eq!(config.simulation.padding, 0);
        assert!(config.output.save_images);
        assert_eq!(config.cell.axis_params(), PerturbParams::new(0.5, 0.0, 0.1));
    }

    #[test]
    fn z_levels_are_centered_with_integer_half() {
        let config = BaseConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.simulation.z_levels(5), vec![-4.0, -2.0, 0.0, 2.0, 4.0]);
        assert_eq!(config.simulation.z_levels(4), vec![-4.0, -2.0, 0.0, 2.0]);
    }

    #[test]
    fn inverted_radius_bounds_are_rejected() {
        let mut config = BaseConfig::from_toml_str(SAMPLE).unwrap();
        config.cell.min_radius = 30.0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidRadiusBounds { min: 30.0, max: 20.0 })
        );
    }

    #[test]
    fn zero_probabilities_are_rejected() {
        let mut config = BaseConfig::from_toml_str(SAMPLE).unwrap();
        config.prob = ProbabilityConfig { split: 0.0, perturbation: 0.0 };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidProbabilities { .. })));
        config.prob = ProbabilityConfig { split: -1.0, perturbation: 2.0 };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidProbabilities { .. })));
    }

    #[test]
    fn inverted_contour_area_range_is_rejected() {
        let mut config = BaseConfig::from_toml_str(SAMPLE).unwrap();
        config.simulation.min_contour_area = 500.0;
        config.simulation.max_contour_area = 50.0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidSimulation(_))));
    }

    #[test]
    fn negative_sigma_is_rejected() {
        let mut config = BaseConfig::from_toml_str(SAMPLE).unwrap();
        config.cell.radius.sigma = -0.1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPerturbParams { param: "radius", .. })
        ));
    }

    #[test]
    fn missing_section_fails_to_parse() {
        assert!(BaseConfig::from_toml_str("[simulation]\niterations_per_cell = 1").is_err());
    }
}
