//! One frame of the lineage: observed volume, live population and the cached
//! synthetic rendering, plus the propose / commit / rollback protocol.

use std::sync::Arc;

use cell_universe_common::{Aabb, BaseConfig};
use log::trace;
use rand::Rng;
use rayon::prelude::*;

use crate::analyzer::{PcaShapeAnalyzer, ShapeAnalyzer, VoxelRegion};
use crate::cell::{Cell, Offsets, SplitOutcome};
use crate::cost::{plane_cost, plane_costs};
use crate::error::FatalError;
use crate::render::{render_plane, render_volume, Plane, RasterRenderer, Renderer, Volume};
use crate::validator;

/// Run-wide, read-only collaborators shared by every frame.
pub struct SearchContext {
    pub config: BaseConfig,
    pub renderer: Box<dyn Renderer>,
    pub analyzer: Box<dyn ShapeAnalyzer>,
}

impl SearchContext {
    pub fn new(config: BaseConfig) -> Self {
        let analyzer = PcaShapeAnalyzer::from_config(&config.simulation);
        Self::with_parts(config, Box::new(RasterRenderer), Box::new(analyzer))
    }

    pub fn with_parts(
        config: BaseConfig,
        renderer: Box<dyn Renderer>,
        analyzer: Box<dyn ShapeAnalyzer>,
    ) -> Self {
        Self { config, renderer, analyzer }
    }
}

pub struct Frame {
    file: String,
    context: Arc<SearchContext>,
    observed: Volume,
    synthetic: Volume,
    // Cost of each synthetic plane against its observed plane
    plane_costs: Vec<f64>,
    z_levels: Vec<f32>,
    dimensions: (u32, u32),
    cells: Vec<Cell>,
}

impl Frame {
    /// Builds a frame and renders its initial synthetic volume.
    pub fn new(
        file: impl Into<String>,
        observed: Volume,
        cells: Vec<Cell>,
        context: Arc<SearchContext>,
    ) -> Result<Self, FatalError> {
        let file = file.into();
        if observed.is_empty() {
            return Err(FatalError::EmptyVolume(file));
        }
        if let Some(expected) = context.config.simulation.z_slices {
            if expected != observed.len() {
                return Err(FatalError::SliceCountMismatch { file, expected, actual: observed.len() });
            }
        }
        let dimensions = observed.dimensions();
        if let Some(index) = observed.planes.iter().position(|p| p.dimensions() != dimensions) {
            return Err(FatalError::PlaneShapeMismatch {
                index,
                observed: observed.planes[index].dimensions(),
                synthetic: dimensions,
            });
        }

        let z_levels = context.config.simulation.z_levels(observed.len());
        let mut frame = Self {
            file,
            context,
            observed,
            synthetic: Volume::default(),
            plane_costs: Vec::new(),
            z_levels,
            dimensions,
            cells,
        };
        frame.rerender()?;
        Ok(frame)
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn observed(&self) -> &Volume {
        &self.observed
    }

    pub fn synthetic(&self) -> &Volume {
        &self.synthetic
    }

    pub fn z_levels(&self) -> &[f32] {
        &self.z_levels
    }

    pub fn context(&self) -> &SearchContext {
        &self.context
    }

    /// Current total cost of the cached synthetic volume.
    pub fn cost(&self) -> f64 {
        self.plane_costs.iter().sum()
    }

    /// Replaces the whole population and re-renders from scratch.
    pub fn replace_cells(&mut self, cells: Vec<Cell>) -> Result<(), FatalError> {
        self.cells = cells;
        self.rerender()
    }

    fn rerender(&mut self) -> Result<(), FatalError> {
        let synthetic = render_volume(
            &self.cells,
            &self.context.config.simulation,
            self.context.renderer.as_ref(),
            &self.z_levels,
            self.dimensions,
        );
        self.plane_costs = plane_costs(&self.observed, &synthetic)?;
        self.synthetic = synthetic;
        Ok(())
    }

    /// Proposes replacing a random cell with a perturbed copy.
    pub fn perturb<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Proposal<'_>, FatalError> {
        if self.cells.is_empty() {
            return Ok(Proposal::noop(self));
        }
        let index = rng.random_range(0..self.cells.len());
        let candidate = self.cells[index].perturbed(&self.context.config.cell, rng);
        self.propose_replacement(index, candidate)
    }

    /// Proposes moving cell `index` by explicit parameter offsets.
    pub fn perturb_with<R: Rng + ?Sized>(
        &mut self,
        index: usize,
        offsets: &Offsets,
        rng: &mut R,
    ) -> Result<Proposal<'_>, FatalError> {
        let len = self.cells.len();
        let cell = self.cells.get(index).ok_or(FatalError::CellIndexOutOfRange { index, len })?;
        let candidate = cell.parameterized(offsets, &self.context.config.cell, rng);
        self.propose_replacement(index, candidate)
    }

    fn propose_replacement(&mut self, index: usize, candidate: Cell) -> Result<Proposal<'_>, FatalError> {
        let previous = std::mem::replace(&mut self.cells[index], candidate);
        if !validator::is_valid(&self.cells) {
            self.cells[index] = previous;
            return Ok(Proposal::noop(self));
        }

        let scale = self.context.config.cell.bounding_box_scale;
        let dirty = previous.bounding_box().union(self.cells[index].bounding_box()).scaled(scale);
        if !dirty.is_well_formed() {
            let err = degenerate(&self.cells[index].name, dirty);
            self.cells[index] = previous;
            return Err(err);
        }

        // Only planes crossing the old or new extent can change
        let planes = self.render_within(dirty);
        let cost_delta = planes.iter().map(|(i, _, cost)| cost - self.plane_costs[*i]).sum();
        Ok(Proposal {
            frame: self,
            cost_delta,
            pending: Some(Pending::Replace { index, previous, planes }),
        })
    }

    fn render_within(&self, dirty: Aabb) -> Vec<(usize, Arc<Plane>, f64)> {
        let sim = &self.context.config.simulation;
        let renderer = self.context.renderer.as_ref();
        self.z_levels
            .par_iter()
            .enumerate()
            .filter(|(_, z)| dirty.contains_z(**z))
            .map(|(i, &z)| {
                let plane = render_plane(&self.cells, sim, renderer, z, self.dimensions);
                let cost = plane_cost(&self.observed.planes[i], &plane);
                (i, Arc::new(plane), cost)
            })
            .collect()
    }

    /// Proposes splitting a random cell in two.
    pub fn split<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Proposal<'_>, FatalError> {
        if self.cells.is_empty() {
            return Ok(Proposal::noop(self));
        }
        let index = rng.random_range(0..self.cells.len());
        self.split_at(index)
    }

    /// Proposes splitting cell `index` along the axis found in the observed
    /// voxels around it. The children replace it at the end of the population.
    pub fn split_at(&mut self, index: usize) -> Result<Proposal<'_>, FatalError> {
        let len = self.cells.len();
        let cell = self.cells.get(index).ok_or(FatalError::CellIndexOutOfRange { index, len })?;
        let cell_config = &self.context.config.cell;
        let region_box = cell.bounding_box().scaled(cell_config.bounding_box_scale);
        if !region_box.is_well_formed() {
            return Err(degenerate(&cell.name, region_box));
        }

        let outcome = VoxelRegion::crop(&self.observed, &self.z_levels, region_box)
            .and_then(|region| cell.split(&region, self.context.analyzer.as_ref(), cell_config));
        let (first, second) = match outcome {
            Some(SplitOutcome { first, second, valid: true }) => (first, second),
            _ => {
                trace!("Split of cell {} in '{}' has no usable axis or breaks bounds", index, self.file);
                return Ok(Proposal::noop(self));
            }
        };

        let previous = self.cells.remove(index);
        self.cells.push(first);
        self.cells.push(second);
        if !validator::is_valid(&self.cells) {
            self.restore_split(index, previous);
            return Ok(Proposal::noop(self));
        }

        let synthetic = render_volume(
            &self.cells,
            &self.context.config.simulation,
            self.context.renderer.as_ref(),
            &self.z_levels,
            self.dimensions,
        );
        let costs = match plane_costs(&self.observed, &synthetic) {
            Ok(costs) => costs,
            Err(err) => {
                self.restore_split(index, previous);
                return Err(err);
            }
        };
        let cost_delta = costs.iter().sum::<f64>() - self.cost();
        Ok(Proposal {
            frame: self,
            cost_delta,
            pending: Some(Pending::Split { index, previous, synthetic, costs }),
        })
    }

    fn restore_split(&mut self, index: usize, previous: Cell) {
        self.cells.truncate(self.cells.len() - 2);
        self.cells.insert(index, previous);
    }

    fn apply(&mut self, pending: Pending) {
        match pending {
            Pending::Replace { planes, .. } => {
                for (i, plane, cost) in planes {
                    self.synthetic.planes[i] = plane;
                    self.plane_costs[i] = cost;
                }
            }
            Pending::Split { synthetic, costs, .. } => {
                self.synthetic = synthetic;
                self.plane_costs = costs;
            }
        }
    }

    fn revert(&mut self, pending: Pending) {
        match pending {
            Pending::Replace { index, previous, .. } => self.cells[index] = previous,
            Pending::Split { index, previous, .. } => self.restore_split(index, previous),
        }
    }
}

fn degenerate(name: &str, bounds: Aabb) -> FatalError {
    FatalError::DegenerateBox {
        cell: name.to_string(),
        min: [bounds.min.x, bounds.min.y, bounds.min.z],
        max: [bounds.max.x, bounds.max.y, bounds.max.z],
    }
}

// The speculative change held by an open proposal. The population already
// reflects it; the synthetic cache does not until it is applied.
enum Pending {
    Replace {
        index: usize,
        previous: Cell,
        planes: Vec<(usize, Arc<Plane>, f64)>,
    },
    Split {
        index: usize,
        previous: Cell,
        synthetic: Volume,
        costs: Vec<f64>,
    },
}

/// An evaluated, not yet committed move. Dropping it without calling
/// [`Proposal::commit`] rolls the move back.
#[must_use = "a proposal is rolled back unless committed"]
pub struct Proposal<'a> {
    frame: &'a mut Frame,
    cost_delta: f64,
    pending: Option<Pending>,
}

impl<'a> Proposal<'a> {
    fn noop(frame: &'a mut Frame) -> Self {
        Self { frame, cost_delta: 0.0, pending: None }
    }

    /// Cost after the move minus cost before it. Zero for a no-op.
    pub fn cost_delta(&self) -> f64 {
        self.cost_delta
    }

    /// The move was rejected before evaluation (overlap, bounds or no split axis).
    pub fn is_noop(&self) -> bool {
        self.pending.is_none()
    }

    /// Keeps the move when `accept` is true, otherwise restores the frame
    /// exactly. Returns whether the frame changed.
    pub fn commit(mut self, accept: bool) -> bool {
        match self.pending.take() {
            Some(pending) if accept => {
                self.frame.apply(pending);
                true
            }
            Some(pending) => {
                self.frame.revert(pending);
                false
            }
            None => false,
        }
    }
}

impl Drop for Proposal<'_> {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.frame.revert(pending);
        }
    }
}
