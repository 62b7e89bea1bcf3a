pub mod config;
pub mod snapshot;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{
    BaseConfig, CellConfig, CellType, ConfigError, OutputConfig, PerturbParams, ProbabilityConfig,
    SimulationConfig,
};
pub use snapshot::{CellRecord, FrameSnapshot};
pub use vecmath::{Aabb, Vec3};
