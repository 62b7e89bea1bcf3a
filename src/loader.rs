use std::fs::{self, File};
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use cell_universe_common::SimulationConfig;
use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use imageproc::filter::gaussian_blur_f32;
use log::{debug, warn};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::ColorType;

use crate::render::{Plane, Volume};

const SLICE_EXTENSIONS: [&str; 6] = ["png", "tif", "tiff", "jpg", "jpeg", "bmp"];

/// An observed volume together with the identifier initial cells refer to.
#[derive(Debug, Clone)]
pub struct LoadedFrame {
    pub file: String,
    pub volume: Volume,
}

/// Turns a frame path into an observed volume.
pub trait FrameLoader {
    fn load(&self, path: &Path) -> Result<Volume>;
}

/// Loads a frame stored as a multi-page TIFF (one page per plane), a
/// directory of slice images (sorted by file name) or a single image. Slices
/// are converted to grayscale in `[0, 1]`, optionally blurred and then padded
/// with the background value.
#[derive(Debug, Clone)]
pub struct ImageStackLoader {
    pub blur_sigma: f32,
    pub padding: u32,
    pub background: f32,
}

impl ImageStackLoader {
    pub fn from_config(sim: &SimulationConfig) -> Self {
        Self { blur_sigma: sim.blur_sigma, padding: sim.padding, background: sim.background_color }
    }

    /// Every plane stored in one file.
    fn load_file(&self, path: &Path) -> Result<Vec<Plane>> {
        let pages = if is_tiff(path) {
            read_tiff_pages(path)?
        } else {
            let image = image::open(path).with_context(|| format!("Failed to open slice '{}'", path.display()))?;
            vec![image.to_luma8()]
        };
        Ok(pages.into_iter().map(|gray| self.prepare(gray)).collect())
    }

    fn prepare(&self, gray: GrayImage) -> Plane {
        let gray = if self.blur_sigma > 0.0 { gaussian_blur_f32(&gray, self.blur_sigma) } else { gray };
        self.pad(&gray)
    }

    fn pad(&self, gray: &GrayImage) -> Plane {
        let p = self.padding;
        let (w, h) = gray.dimensions();
        let mut plane = Plane::from_pixel(w + 2 * p, h + 2 * p, Luma([self.background]));
        for (x, y, px) in gray.enumerate_pixels() {
            plane.put_pixel(x + p, y + p, Luma([px.0[0] as f32 / 255.0]));
        }
        plane
    }
}

impl FrameLoader for ImageStackLoader {
    fn load(&self, path: &Path) -> Result<Volume> {
        let slices = if path.is_dir() {
            let mut slices = fs::read_dir(path)
                .with_context(|| format!("Failed to read frame directory '{}'", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && has_slice_extension(p))
                .collect::<Vec<_>>();
            slices.sort();
            slices
        } else {
            vec![path.to_path_buf()]
        };
        if slices.is_empty() {
            bail!("Frame '{}' contains no slice images", path.display());
        }

        let mut planes = Vec::new();
        for slice in &slices {
            planes.extend(self.load_file(slice)?);
        }
        debug!("Loaded {} planes from '{}'", planes.len(), path.display());
        Ok(Volume::new(planes))
    }
}

fn is_tiff(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
}

/// Decodes every page of a TIFF file, in file order.
fn read_tiff_pages(path: &Path) -> Result<Vec<GrayImage>> {
    let file = File::open(path).with_context(|| format!("Failed to open '{}'", path.display()))?;
    let mut decoder = Decoder::new(BufReader::new(file))
        .with_context(|| format!("Failed to read TIFF header of '{}'", path.display()))?;
    let mut pages = Vec::new();
    loop {
        let page = decode_page(&mut decoder)
            .with_context(|| format!("Failed to decode page {} of '{}'", pages.len(), path.display()))?;
        pages.push(page);
        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }
    Ok(pages)
}

fn decode_page<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<GrayImage> {
    let (width, height) = decoder.dimensions()?;
    let color = decoder.colortype()?;
    let image = match (color, decoder.read_image()?) {
        (ColorType::Gray(8), DecodingResult::U8(data)) => {
            ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageLuma8)
        }
        (ColorType::Gray(16), DecodingResult::U16(data)) => {
            ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageLuma16)
        }
        (ColorType::RGB(8), DecodingResult::U8(data)) => {
            ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageRgb8)
        }
        (ColorType::RGBA(8), DecodingResult::U8(data)) => {
            ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageRgba8)
        }
        (other, _) => bail!("unsupported TIFF color type {:?}", other),
    };
    image
        .map(|image| image.to_luma8())
        .context("page data does not match its dimensions")
}

fn has_slice_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SLICE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Expands an input pattern containing `{}` into one path per frame number.
/// With `last` unset, expansion stops at the first missing path; with it set,
/// every path must exist.
pub fn frame_paths(pattern: &str, first: usize, last: Option<usize>) -> Result<Vec<PathBuf>> {
    if !pattern.contains("{}") {
        let path = PathBuf::from(pattern);
        if !path.exists() {
            bail!("Input '{}' does not exist", pattern);
        }
        return Ok(vec![path]);
    }

    let mut paths = Vec::new();
    let mut index = first;
    loop {
        if last.is_some_and(|l| index > l) {
            break;
        }
        let path = PathBuf::from(pattern.replace("{}", &index.to_string()));
        if !path.exists() {
            if last.is_some() {
                bail!("Frame {} not found at '{}'", index, path.display());
            }
            break;
        }
        paths.push(path);
        index += 1;
    }
    if paths.is_empty() {
        bail!("No frames match '{}' starting at {}", pattern, first);
    }
    Ok(paths)
}

/// Loads every path, naming each frame after its file name.
pub fn load_frames(loader: &dyn FrameLoader, paths: &[PathBuf]) -> Result<Vec<LoadedFrame>> {
    let mut frames = Vec::with_capacity(paths.len());
    for path in paths {
        let file = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => {
                warn!("Using full path as frame name for '{}'", path.display());
                path.display().to_string()
            }
        };
        let volume = loader.load(path)?;
        frames.push(LoadedFrame { file, volume });
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn loader(padding: u32) -> ImageStackLoader {
        ImageStackLoader { blur_sigma: 0.0, padding, background: 0.25 }
    }

    #[test]
    fn directory_of_slices_becomes_padded_volume() {
        let dir = tempdir().unwrap();
        let frame = dir.path().join("t0");
        fs::create_dir(&frame).unwrap();
        GrayImage::from_pixel(4, 3, Luma([255])).save(frame.join("z1.png")).unwrap();
        GrayImage::from_pixel(4, 3, Luma([0])).save(frame.join("z0.png")).unwrap();
        fs::write(frame.join("notes.txt"), "ignored").unwrap();

        let volume = loader(2).load(&frame).unwrap();
        assert_eq!(volume.len(), 2);
        assert_eq!(volume.dimensions(), (8, 7));
        // Sorted by name: z0 first
        assert_eq!(volume.plane(0).unwrap().get_pixel(2, 2).0[0], 0.0);
        assert_eq!(volume.plane(1).unwrap().get_pixel(2, 2).0[0], 1.0);
        assert_eq!(volume.plane(1).unwrap().get_pixel(0, 0).0[0], 0.25);
    }

    #[test]
    fn single_image_is_one_plane() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("frame.png");
        GrayImage::from_pixel(5, 5, Luma([128])).save(&path).unwrap();
        let volume = loader(0).load(&path).unwrap();
        assert_eq!(volume.len(), 1);
        assert_eq!(volume.dimensions(), (5, 5));
    }

    #[test]
    fn multi_page_tiff_becomes_one_plane_per_page() {
        use tiff::encoder::{colortype, TiffEncoder};

        let dir = tempdir().unwrap();
        let path = dir.path().join("t00.tif");
        {
            let mut encoder = TiffEncoder::new(File::create(&path).unwrap()).unwrap();
            for value in [0u8, 128, 255] {
                encoder.write_image::<colortype::Gray8>(4, 4, &[value; 16]).unwrap();
            }
        }

        let volume = loader(1).load(&path).unwrap();
        assert_eq!(volume.len(), 3);
        assert_eq!(volume.dimensions(), (6, 6));
        assert_eq!(volume.plane(0).unwrap().get_pixel(1, 1).0[0], 0.0);
        assert_eq!(volume.plane(1).unwrap().get_pixel(1, 1).0[0], 128.0 / 255.0);
        assert_eq!(volume.plane(2).unwrap().get_pixel(4, 4).0[0], 1.0);
        assert_eq!(volume.plane(2).unwrap().get_pixel(0, 0).0[0], 0.25);
    }

    #[test]
    fn sixteen_bit_tiff_page_is_scaled_to_unit_range() {
        use tiff::encoder::{colortype, TiffEncoder};

        let dir = tempdir().unwrap();
        let path = dir.path().join("deep.tiff");
        {
            let mut encoder = TiffEncoder::new(File::create(&path).unwrap()).unwrap();
            encoder.write_image::<colortype::Gray16>(2, 2, &[u16::MAX; 4]).unwrap();
        }
        let volume = loader(0).load(&path).unwrap();
        assert_eq!(volume.len(), 1);
        assert_eq!(volume.plane(0).unwrap().get_pixel(0, 0).0[0], 1.0);
    }

    #[test]
    fn pattern_stops_at_first_gap_without_last() {
        let dir = tempdir().unwrap();
        for i in [3, 4, 6] {
            fs::create_dir(dir.path().join(format!("t{i}"))).unwrap();
        }
        let pattern = format!("{}/t{{}}", dir.path().display());
        let paths = frame_paths(&pattern, 3, None).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(frame_paths(&pattern, 3, Some(6)).is_err());
        assert_eq!(frame_paths(&pattern, 6, Some(6)).unwrap().len(), 1);
    }

    #[test]
    fn load_frames_names_frames_by_file_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t07.png");
        GrayImage::from_pixel(2, 2, Luma([0])).save(&path).unwrap();
        let frames = load_frames(&loader(0), &[path]).unwrap();
        assert_eq!(frames[0].file, "t07.png");
    }
}
