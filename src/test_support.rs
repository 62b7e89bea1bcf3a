use std::sync::Arc;

use cell_universe_common::{BaseConfig, Vec3};

use crate::analyzer::{ShapeAnalyzer, VoxelRegion};
use crate::cell::Cell;
use crate::frame::SearchContext;
use crate::render::{render_volume, RasterRenderer, Volume};

const TEST_CONFIG: &str = r#"
[simulation]
iterations_per_cell = 30
background_color = 0.0
cell_color = 1.0
seed = 42

[prob]
split = 0.2
perturbation = 0.8

[cell]
x = { prob = 1.0, mu = 0.0, sigma = 1.0 }
y = { prob = 1.0, mu = 0.0, sigma = 1.0 }
z = { prob = 1.0, mu = 0.0, sigma = 0.5 }
radius = { prob = 1.0, mu = 0.0, sigma = 0.5 }
min_radius = 1.0
max_radius = 30.0
"#;

pub(crate) fn test_config() -> BaseConfig {
    BaseConfig::from_toml_str(TEST_CONFIG).expect("test config parses")
}

pub(crate) fn test_context() -> Arc<SearchContext> {
    Arc::new(SearchContext::new(test_config()))
}

/// Observed volume produced by rendering `cells` with the test settings.
pub(crate) fn observed_from(cells: &[Cell], planes: usize, dimensions: (u32, u32)) -> Volume {
    let config = test_config();
    let z_levels = config.simulation.z_levels(planes);
    render_volume(cells, &config.simulation, &RasterRenderer, &z_levels, dimensions)
}

pub(crate) fn sphere(name: &str, x: f32, y: f32, z: f32, radius: f32) -> Cell {
    Cell::sphere(name, Vec3::new(x, y, z), radius)
}

/// Analyzer that always answers with the same axis.
pub(crate) struct FixedAxis(pub Option<Vec3>);

impl ShapeAnalyzer for FixedAxis {
    fn split_axis(&self, _region: &VoxelRegion) -> Option<Vec3> {
        self.0
    }
}

pub(crate) fn context_with_axis(axis: Option<Vec3>) -> Arc<SearchContext> {
    Arc::new(SearchContext::with_parts(
        test_config(),
        Box::new(RasterRenderer),
        Box::new(FixedAxis(axis)),
    ))
}
