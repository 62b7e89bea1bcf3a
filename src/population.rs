//! Reading initial populations and writing `cells.csv`.

use std::collections::HashMap;
use std::io;
use std::path::Path;

use anyhow::{bail, Context, Result};
use cell_universe_common::{BaseConfig, CellRecord, CellType, SimulationConfig, Vec3};
use csv::{ReaderBuilder, StringRecord, Trim};
use log::info;

use crate::cell::{Cell, Shape};
use crate::frame::Frame;

/// Reads an initial-population CSV, grouped by frame file name.
///
/// Columns are positional: `file,name,x,y,z,radius` optionally followed by
/// spheroid `a,b,c,rotation`. The first row is a header and is skipped.
pub fn read_initial_cells<P: AsRef<Path>>(path: P, config: &BaseConfig) -> Result<HashMap<String, Vec<Cell>>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open initial cells '{}'", path.display()))?;
    let cells = read_initial_cells_from(file, config)
        .with_context(|| format!("Invalid initial cells '{}'", path.display()))?;
    info!(
        "Loaded {} initial cells for {} frames from '{}'",
        cells.values().map(Vec::len).sum::<usize>(),
        cells.len(),
        path.display()
    );
    Ok(cells)
}

pub fn read_initial_cells_from<R: io::Read>(reader: R, config: &BaseConfig) -> Result<HashMap<String, Vec<Cell>>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let mut cells: HashMap<String, Vec<Cell>> = HashMap::new();
    for row in reader.records() {
        let row = row?;
        let record = parse_row(&row)?;
        let cell = cell_from_record(&record, config);
        cells.entry(record.file).or_default().push(cell);
    }
    Ok(cells)
}

fn parse_row(row: &StringRecord) -> Result<CellRecord> {
    let line = row.position().map_or(0, |p| p.line());
    let text = |index: usize, name: &str| -> Result<String> {
        row.get(index)
            .map(str::to_string)
            .with_context(|| format!("line {}: missing column '{}'", line, name))
    };
    let number = |index: usize, name: &str| -> Result<f32> {
        let raw = text(index, name)?;
        raw.parse::<f32>()
            .with_context(|| format!("line {}: invalid {} '{}'", line, name, raw))
    };
    // Radii and semi-axes must describe a real extent
    let size = |index: usize, name: &str| -> Result<f32> {
        let value = number(index, name)?;
        if !(value > 0.0) || !value.is_finite() {
            bail!("line {}: {} must be positive, got {}", line, name, value);
        }
        Ok(value)
    };
    let optional = |index: usize, name: &str, positive: bool| -> Result<Option<f32>> {
        match row.get(index) {
            None | Some("") => Ok(None),
            Some(_) if positive => size(index, name).map(Some),
            Some(_) => number(index, name).map(Some),
        }
    };

    Ok(CellRecord {
        file: text(0, "file")?,
        name: text(1, "name")?,
        x: number(2, "x")?,
        y: number(3, "y")?,
        z: number(4, "z")?,
        radius: size(5, "radius")?,
        a: optional(6, "a", true)?,
        b: optional(7, "b", true)?,
        c: optional(8, "c", true)?,
        rotation: optional(9, "rotation", false)?,
    })
}

/// Converts a file record into a cell in padded, z-scaled frame coordinates.
pub fn cell_from_record(record: &CellRecord, config: &BaseConfig) -> Cell {
    let sim = &config.simulation;
    let pad = sim.padding as f32;
    let position = Vec3::new(record.x + pad, record.y + pad, record.z * sim.z_scaling);
    let rotation = record.rotation.unwrap_or(0.0);
    match (record.a, record.b, record.c) {
        (Some(a), Some(b), Some(c)) => Cell::spheroid(&record.name, position, record.radius, (a, b, c), rotation),
        _ if config.cell_type == CellType::Spheroid => {
            let r = record.radius;
            Cell::spheroid(&record.name, position, r, (r, r, r), rotation)
        }
        _ => Cell::sphere(&record.name, position, record.radius),
    }
}

/// Inverse of [`cell_from_record`].
pub fn cell_to_record(cell: &Cell, file: &str, sim: &SimulationConfig) -> CellRecord {
    let pad = sim.padding as f32;
    let mut record = CellRecord {
        file: file.to_string(),
        name: cell.name.clone(),
        x: cell.position.x - pad,
        y: cell.position.y - pad,
        z: cell.position.z / sim.z_scaling,
        radius: cell.radius(),
        a: None,
        b: None,
        c: None,
        rotation: None,
    };
    if let Shape::Spheroid { a, b, c, rotation, .. } = cell.shape {
        record.a = Some(a);
        record.b = Some(b);
        record.c = Some(c);
        record.rotation = Some(rotation);
    }
    record
}

pub fn frame_records(frame: &Frame) -> Vec<CellRecord> {
    let sim = &frame.context().config.simulation;
    frame.cells().iter().map(|c| cell_to_record(c, frame.file(), sim)).collect()
}

/// Writes every cell of `frames` to `path`, sorted by file then name.
pub fn write_cells_csv<P: AsRef<Path>>(path: P, frames: &[Frame]) -> Result<()> {
    let path = path.as_ref();
    let mut records: Vec<CellRecord> = frames.iter().flat_map(frame_records).collect();
    records.sort_by(|a, b| (&a.file, &a.name).cmp(&(&b.file, &b.name)));

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create '{}'", path.display()))?;
    for record in &records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}
