use cell_universe_common::ConfigError;
use thiserror::Error;

/// Structural failures that abort a run. Overlap and bound violations are not
/// errors; they surface as no-op proposals.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FatalError {
    #[error("observed volume has {observed} planes but synthetic volume has {synthetic}")]
    PlaneCountMismatch { observed: usize, synthetic: usize },
    #[error("plane {index} is {observed:?} in the observed volume but {synthetic:?} in the synthetic one")]
    PlaneShapeMismatch {
        index: usize,
        observed: (u32, u32),
        synthetic: (u32, u32),
    },
    #[error("frame index {index} out of range for lineage of {len} frames")]
    FrameIndexOutOfRange { index: usize, len: usize },
    #[error("bounding box for cell '{cell}' is degenerate: min {min:?}, max {max:?}")]
    DegenerateBox {
        cell: String,
        min: [f32; 3],
        max: [f32; 3],
    },
    #[error("frame '{0}' has no planes")]
    EmptyVolume(String),
    #[error("frame '{file}' has {actual} planes but z_slices is {expected}")]
    SliceCountMismatch {
        file: String,
        expected: usize,
        actual: usize,
    },
    #[error("cell index {index} out of range for population of {len}")]
    CellIndexOutOfRange { index: usize, len: usize },
    #[error(transparent)]
    Config(#[from] ConfigError),
}
