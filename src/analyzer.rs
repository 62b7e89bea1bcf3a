//! Split-axis estimation from the observed voxels around a cell.

use cell_universe_common::{Aabb, SimulationConfig, Vec3};
use image::{GrayImage, Luma};
use imageproc::contours::find_contours;
use imageproc::point::Point;

use crate::render::Volume;

/// A cropped block of the observed volume. `data` is plane-major, then row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelRegion {
    /// Pixel coordinates of the block's top-left corner in the full plane.
    pub origin: (u32, u32),
    pub width: u32,
    pub height: u32,
    pub z_levels: Vec<f32>,
    pub data: Vec<f32>,
}

impl VoxelRegion {
    pub fn new(origin: (u32, u32), width: u32, height: u32, z_levels: Vec<f32>, data: Vec<f32>) -> Self {
        Self { origin, width, height, z_levels, data }
    }

    /// Crops `volume` to `bounds` (clipped to the image) over the planes whose
    /// depth falls inside it. `None` when nothing remains.
    pub fn crop(volume: &Volume, z_levels: &[f32], bounds: Aabb) -> Option<Self> {
        let (w, h) = volume.dimensions();
        let x0 = bounds.min.x.floor().max(0.0) as u32;
        let y0 = bounds.min.y.floor().max(0.0) as u32;
        let x1 = (bounds.max.x.ceil().max(0.0) as u32).min(w);
        let y1 = (bounds.max.y.ceil().max(0.0) as u32).min(h);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }

        let (width, height) = (x1 - x0, y1 - y0);
        let mut levels = Vec::new();
        let mut data = Vec::new();
        for (plane, &z) in volume.planes.iter().zip(z_levels) {
            if !bounds.contains_z(z) {
                continue;
            }
            levels.push(z);
            for y in y0..y1 {
                for x in x0..x1 {
                    data.push(plane.get_pixel(x, y).0[0]);
                }
            }
        }
        if levels.is_empty() {
            return None;
        }
        Some(Self::new((x0, y0), width, height, levels, data))
    }

    /// Samples of plane `k`, row-major.
    pub fn plane(&self, k: usize) -> &[f32] {
        let len = (self.width * self.height) as usize;
        &self.data[k * len..(k + 1) * len]
    }
}

/// Chooses the direction along which a cell should divide.
pub trait ShapeAnalyzer: Send + Sync {
    /// Split axis for the cell occupying `region`, `None` when the region
    /// carries no usable shape information.
    fn split_axis(&self, region: &VoxelRegion) -> Option<Vec3>;
}

/// Principal-component analyzer over cell outlines. Each plane of the region
/// is thresholded, contours whose enclosed area falls outside
/// `[min_contour_area, max_contour_area]` are dropped, and the major axis of
/// the remaining contour points is the elongation direction a dividing cell
/// splits along.
#[derive(Debug, Clone, Copy)]
pub struct PcaShapeAnalyzer {
    pub threshold: f32,
    /// Cells are brighter than the background.
    pub bright_cells: bool,
    pub min_contour_area: f64,
    pub max_contour_area: f64,
    pub min_points: usize,
}

impl PcaShapeAnalyzer {
    /// Thresholds halfway between background and cell intensity.
    pub fn from_config(sim: &SimulationConfig) -> Self {
        Self {
            threshold: (sim.background_color + sim.cell_color) * 0.5,
            bright_cells: sim.cell_color >= sim.background_color,
            min_contour_area: sim.min_contour_area,
            max_contour_area: sim.max_contour_area,
            min_points: 8,
        }
    }

    fn mask(&self, region: &VoxelRegion, k: usize) -> GrayImage {
        let plane = region.plane(k);
        GrayImage::from_fn(region.width, region.height, |x, y| {
            let v = plane[(y * region.width + x) as usize];
            let inside = if self.bright_cells { v >= self.threshold } else { v <= self.threshold };
            Luma([if inside { 255 } else { 0 }])
        })
    }

    /// Points of every accepted contour, in world coordinates.
    fn contour_points(&self, region: &VoxelRegion) -> Vec<Vec3> {
        let (ox, oy) = (region.origin.0 as f32, region.origin.1 as f32);
        let mut points = Vec::new();
        for (k, &z) in region.z_levels.iter().enumerate() {
            for contour in find_contours::<i32>(&self.mask(region, k)) {
                let area = enclosed_area(&contour.points);
                if area < self.min_contour_area || area > self.max_contour_area {
                    continue;
                }
                points.extend(
                    contour.points.iter().map(|p| Vec3::new(ox + p.x as f32, oy + p.y as f32, z)),
                );
            }
        }
        points
    }
}

impl ShapeAnalyzer for PcaShapeAnalyzer {
    fn split_axis(&self, region: &VoxelRegion) -> Option<Vec3> {
        let points = self.contour_points(region);
        if points.len() < self.min_points.max(2) {
            return None;
        }

        let n = points.len() as f64;
        let mut mean = [0.0f64; 3];
        for p in &points {
            mean[0] += p.x as f64;
            mean[1] += p.y as f64;
            mean[2] += p.z as f64;
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut cov = [[0.0f64; 3]; 3];
        for p in &points {
            let d = [p.x as f64 - mean[0], p.y as f64 - mean[1], p.z as f64 - mean[2]];
            for r in 0..3 {
                for c in 0..3 {
                    cov[r][c] += d[r] * d[c];
                }
            }
        }
        cov.iter_mut().flatten().for_each(|v| *v /= n);

        let (values, vectors) = jacobi_eigen(cov);
        let major = (0..3).max_by(|&a, &b| values[a].total_cmp(&values[b]))?;
        if values[major] <= f64::EPSILON {
            return None;
        }
        let axis = Vec3::new(
            vectors[0][major] as f32,
            vectors[1][major] as f32,
            vectors[2][major] as f32,
        );
        axis.try_normalize()
    }
}

// Shoelace area of a closed pixel contour
fn enclosed_area(points: &[Point<i32>]) -> f64 {
    let n = points.len();
    let twice: i64 = (0..n)
        .map(|i| {
            let (p, q) = (points[i], points[(i + 1) % n]);
            p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64
        })
        .sum();
    twice.abs() as f64 * 0.5
}

/// Eigen-decomposition of a symmetric 3x3 matrix by cyclic Jacobi rotations.
/// Returns eigenvalues and a matrix whose columns are the eigenvectors.
fn jacobi_eigen(mut a: [[f64; 3]; 3]) -> ([f64; 3], [[f64; 3]; 3]) {
    let mut v = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    for _sweep in 0..50 {
        let off = a[0][1].abs() + a[0][2].abs() + a[1][2].abs();
        if off < 1e-12 {
            break;
        }
        for (p, q) in [(0usize, 1usize), (0, 2), (1, 2)] {
            if a[p][q].abs() < 1e-15 {
                continue;
            }
            let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
            let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
            let c = 1.0 / (t * t + 1.0).sqrt();
            let s = t * c;

            for k in 0..3 {
                let (akp, akq) = (a[k][p], a[k][q]);
                a[k][p] = c * akp - s * akq;
                a[k][q] = s * akp + c * akq;
            }
            for k in 0..3 {
                let (apk, aqk) = (a[p][k], a[q][k]);
                a[p][k] = c * apk - s * aqk;
                a[q][k] = s * apk + c * aqk;
            }
            for row in v.iter_mut() {
                let (vp, vq) = (row[p], row[q]);
                row[p] = c * vp - s * vq;
                row[q] = s * vp + c * vq;
            }
        }
    }
    ([a[0][0], a[1][1], a[2][2]], v)
}
