use std::sync::Arc;

use cell_universe_common::SimulationConfig;
use image::{ImageBuffer, Luma};
use imageproc::drawing::draw_filled_circle_mut;
use rayon::prelude::*;

use crate::cell::Cell;

/// One 2-D intensity image at a fixed depth.
pub type Plane = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Ordered stack of planes. Planes are shared so that a partial re-render only
/// allocates the planes it actually redraws.
#[derive(Debug, Clone, Default)]
pub struct Volume {
    pub planes: Vec<Arc<Plane>>,
}

impl Volume {
    pub fn new(planes: Vec<Plane>) -> Self {
        Self { planes: planes.into_iter().map(Arc::new).collect() }
    }

    pub fn len(&self) -> usize {
        self.planes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    pub fn plane(&self, index: usize) -> Option<&Plane> {
        self.planes.get(index).map(|p| p.as_ref())
    }

    /// Width and height of the first plane, `(0, 0)` for an empty volume.
    pub fn dimensions(&self) -> (u32, u32) {
        self.planes.first().map(|p| p.dimensions()).unwrap_or((0, 0))
    }
}

/// Low-level per-plane shape rasterization.
pub trait Renderer: Send + Sync {
    fn fill_circle(&self, plane: &mut Plane, center: (f32, f32), radius: f32, color: f32);

    /// Filled ellipse with semi-axes `semi_axes`, rotated by `rotation_deg` in the plane.
    fn fill_ellipse(
        &self,
        plane: &mut Plane,
        center: (f32, f32),
        semi_axes: (f32, f32),
        rotation_deg: f32,
        color: f32,
    );
}

/// Hard-edged raster renderer. Centres and radii are truncated to whole pixels.
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterRenderer;

impl Renderer for RasterRenderer {
    fn fill_circle(&self, plane: &mut Plane, center: (f32, f32), radius: f32, color: f32) {
        draw_filled_circle_mut(
            plane,
            (center.0 as i32, center.1 as i32),
            radius as i32,
            Luma([color]),
        );
    }

    fn fill_ellipse(
        &self,
        plane: &mut Plane,
        center: (f32, f32),
        semi_axes: (f32, f32),
        rotation_deg: f32,
        color: f32,
    ) {
        let (a, b) = (semi_axes.0.trunc(), semi_axes.1.trunc());
        if a <= 0.0 || b <= 0.0 {
            return;
        }
        let (cx, cy) = (center.0.trunc(), center.1.trunc());
        let (sin, cos) = rotation_deg.to_radians().sin_cos();
        let reach = a.max(b).ceil() as i64;
        let (width, height) = (plane.width() as i64, plane.height() as i64);

        let x0 = (cx as i64 - reach).max(0);
        let x1 = (cx as i64 + reach).min(width - 1);
        let y0 = (cy as i64 - reach).max(0);
        let y1 = (cy as i64 + reach).min(height - 1);
        let (inv_a2, inv_b2) = (1.0 / (a * a), 1.0 / (b * b));

        for py in y0..=y1 {
            let dy = py as f32 - cy;
            for px in x0..=x1 {
                let dx = px as f32 - cx;
                // Rotate the offset into the ellipse frame
                let u = dx * cos + dy * sin;
                let v = -dx * sin + dy * cos;
                if u * u * inv_a2 + v * v * inv_b2 <= 1.0 {
                    plane.put_pixel(px as u32, py as u32, Luma([color]));
                }
            }
        }
    }
}

/// Renders a single plane at depth `z`: background fill, then every live cell.
pub fn render_plane(
    cells: &[Cell],
    sim: &SimulationConfig,
    renderer: &dyn Renderer,
    z: f32,
    dimensions: (u32, u32),
) -> Plane {
    let mut plane = Plane::from_pixel(dimensions.0, dimensions.1, Luma([sim.background_color]));
    for cell in cells {
        cell.render(&mut plane, sim, renderer, z);
    }
    plane
}

/// Full synthetic volume for `cells`, one plane per z-level. Planes are
/// independent, so they are rendered in parallel.
pub fn render_volume(
    cells: &[Cell],
    sim: &SimulationConfig,
    renderer: &dyn Renderer,
    z_levels: &[f32],
    dimensions: (u32, u32),
) -> Volume {
    let planes = z_levels
        .par_iter()
        .map(|&z| Arc::new(render_plane(cells, sim, renderer, z, dimensions)))
        .collect();
    Volume { planes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_config;
    use cell_universe_common::Vec3;

    #[test]
    fn empty_population_renders_background_only() {
        let config = test_config();
        let volume = render_volume(&[], &config.simulation, &RasterRenderer, &[-1.0, 0.0, 1.0], (8, 6));
        assert_eq!(volume.len(), 3);
        assert_eq!(volume.dimensions(), (8, 6));
        for plane in &volume.planes {
            assert!(plane.pixels().all(|p| p.0[0] == config.simulation.background_color));
        }
    }

    #[test]
    fn sphere_fills_its_cross_section_only_within_extent() {
        let config = test_config();
        let sim = &config.simulation;
        let cells = vec![Cell::sphere("a", Vec3::new(10.0, 10.0, 0.0), 4.0)];
        let volume = render_volume(&cells, sim, &RasterRenderer, &[0.0, 6.0], (20, 20));

        let center_plane = volume.plane(0).unwrap();
        assert_eq!(center_plane.get_pixel(10, 10).0[0], sim.cell_color);
        assert_eq!(center_plane.get_pixel(0, 0).0[0], sim.background_color);

        let far_plane = volume.plane(1).unwrap();
        assert!(far_plane.pixels().all(|p| p.0[0] == sim.background_color));
    }

    #[test]
    fn dormant_cell_renders_nothing() {
        let config = test_config();
        let sim = &config.simulation;
        let mut cell = Cell::sphere("a", Vec3::new(10.0, 10.0, 0.0), 4.0);
        cell.set_dormant(true);
        let plane = render_plane(&[cell], sim, &RasterRenderer, 0.0, (20, 20));
        assert!(plane.pixels().all(|p| p.0[0] == sim.background_color));
    }

    #[test]
    fn rotated_ellipse_follows_rotation() {
        let mut plane = Plane::from_pixel(40, 40, Luma([0.0]));
        RasterRenderer.fill_ellipse(&mut plane, (20.0, 20.0), (10.0, 3.0), 90.0, 1.0);
        // Long axis now runs along y
        assert_eq!(plane.get_pixel(20, 28).0[0], 1.0);
        assert_eq!(plane.get_pixel(28, 20).0[0], 0.0);
    }
}
