use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_hollow_polygon_mut};
use imageproc::point::Point;

use crate::cell::CrossSection;
use crate::frame::Frame;
use crate::render::Plane;

const OUTLINE: Rgb<u8> = Rgb([255, 0, 0]);
const ELLIPSE_SEGMENTS: usize = 48;

/// Persists a finished frame.
pub trait Exporter {
    fn export(&self, frame_index: usize, frame: &Frame) -> Result<()>;
}

/// Writes `real/<frame>/<plane>.png` (observed slice with cell outlines) and
/// `synth/<frame>/<plane>.png` (synthetic slice) under `output`.
#[derive(Debug, Clone)]
pub struct PngExporter {
    output: PathBuf,
}

impl PngExporter {
    pub fn new<P: AsRef<Path>>(output: P) -> Self {
        Self { output: output.as_ref().to_path_buf() }
    }
}

impl Exporter for PngExporter {
    fn export(&self, frame_index: usize, frame: &Frame) -> Result<()> {
        let real_dir = self.output.join("real").join(frame_index.to_string());
        let synth_dir = self.output.join("synth").join(frame_index.to_string());
        for dir in [&real_dir, &synth_dir] {
            fs::create_dir_all(dir).with_context(|| format!("Failed to create '{}'", dir.display()))?;
        }

        for (i, &z) in frame.z_levels().iter().enumerate() {
            let name = format!("{i}.png");
            if let Some(observed) = frame.observed().plane(i) {
                let mut real = to_rgb(observed);
                for section in frame.cells().iter().filter_map(|c| c.cross_section(z)) {
                    draw_outline(&mut real, section);
                }
                let path = real_dir.join(&name);
                real.save(&path).with_context(|| format!("Failed to write '{}'", path.display()))?;
            }
            if let Some(synthetic) = frame.synthetic().plane(i) {
                let path = synth_dir.join(&name);
                to_gray(synthetic)
                    .save(&path)
                    .with_context(|| format!("Failed to write '{}'", path.display()))?;
            }
        }
        Ok(())
    }
}

#[inline]
fn to_u8(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

fn to_gray(plane: &Plane) -> GrayImage {
    GrayImage::from_fn(plane.width(), plane.height(), |x, y| Luma([to_u8(plane.get_pixel(x, y).0[0])]))
}

fn to_rgb(plane: &Plane) -> RgbImage {
    RgbImage::from_fn(plane.width(), plane.height(), |x, y| {
        let v = to_u8(plane.get_pixel(x, y).0[0]);
        Rgb([v, v, v])
    })
}

fn draw_outline(image: &mut RgbImage, section: CrossSection) {
    match section {
        CrossSection::Circle { center, radius } => draw_hollow_circle_mut(
            image,
            (center.0 as i32, center.1 as i32),
            radius as i32,
            OUTLINE,
        ),
        CrossSection::Ellipse { center, semi_axes, rotation } => {
            let (sin, cos) = rotation.to_radians().sin_cos();
            let points: Vec<Point<f32>> = (0..ELLIPSE_SEGMENTS)
                .map(|k| {
                    let t = k as f32 / ELLIPSE_SEGMENTS as f32 * std::f32::consts::TAU;
                    let (u, v) = (semi_axes.0 * t.cos(), semi_axes.1 * t.sin());
                    Point::new(center.0 + u * cos - v * sin, center.1 + u * sin + v * cos)
                })
                .collect();
            draw_hollow_polygon_mut(image, &points, OUTLINE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{observed_from, sphere, test_context};

    #[test]
    fn writes_real_and_synthetic_slices() {
        let cells = vec![sphere("a", 10.0, 10.0, 0.0, 4.0)];
        let frame = Frame::new("t00.tif", observed_from(&cells, 3, (20, 20)), cells, test_context()).unwrap();
        let dir = tempfile::tempdir().unwrap();

        PngExporter::new(dir.path()).export(2, &frame).unwrap();
        for plane in 0..3 {
            assert!(dir.path().join(format!("real/2/{plane}.png")).is_file());
            assert!(dir.path().join(format!("synth/2/{plane}.png")).is_file());
        }
        let synth = image::open(dir.path().join("synth/2/1.png")).unwrap().to_luma8();
        assert_eq!(synth.get_pixel(10, 10).0[0], 255);
        let real = image::open(dir.path().join("real/2/1.png")).unwrap().to_rgb8();
        assert_eq!(*real.get_pixel(14, 10), OUTLINE);
    }
}
