use serde::{Deserialize, Serialize};

/// One cell as it appears in the initial-population CSV and in `cells.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    /// Frame identifier (file name of the frame the cell belongs to).
    pub file: String,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub radius: f32,
    /// Spheroid semi-axes and in-plane rotation (degrees). Absent for spheres.
    #[serde(default)]
    pub a: Option<f32>,
    #[serde(default)]
    pub b: Option<f32>,
    #[serde(default)]
    pub c: Option<f32>,
    #[serde(default)]
    pub rotation: Option<f32>,
}

/// Summary of one optimized frame, recorded after its iteration budget is spent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSnapshot {
    /// Position of the frame within the lineage.
    pub frame_index: usize,
    pub file: String,
    /// Cost before the first move and after the last one.
    pub initial_cost: f64,
    pub final_cost: f64,
    pub iterations: u64,
    pub accepted_perturbations: u64,
    pub accepted_splits: u64,
    /// Proposals rejected by the overlap / bounds checks before any rendering.
    pub rejected_invalid: u64,
    pub cells: Vec<CellRecord>,
}
