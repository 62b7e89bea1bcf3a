use std::collections::HashMap;
use std::sync::Arc;

use cell_universe_common::{CellRecord, ConfigError, FrameSnapshot};
use log::{debug, info, trace, warn};
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::cell::Cell;
use crate::error::FatalError;
use crate::export::Exporter;
use crate::frame::{Frame, SearchContext};
use crate::loader::LoadedFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MoveKind {
    Split,
    Perturbation,
}

// Index order matches the weights handed to `WeightedIndex`
const MOVE_KINDS: [MoveKind; 2] = [MoveKind::Split, MoveKind::Perturbation];

/// Outcome of optimizing one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub frame_index: usize,
    pub file: String,
    pub initial_cost: f64,
    pub final_cost: f64,
    pub iterations: u64,
    pub accepted_perturbations: u64,
    pub accepted_splits: u64,
    pub rejected_invalid: u64,
}

impl FrameReport {
    /// Report for a frame that has not been searched.
    pub fn unchanged(frame_index: usize, frame: &Frame) -> Self {
        Self {
            frame_index,
            file: frame.file().to_string(),
            initial_cost: frame.cost(),
            final_cost: frame.cost(),
            iterations: 0,
            accepted_perturbations: 0,
            accepted_splits: 0,
            rejected_invalid: 0,
        }
    }

    pub fn into_snapshot(self, cells: Vec<CellRecord>) -> FrameSnapshot {
        FrameSnapshot {
            frame_index: self.frame_index,
            file: self.file,
            initial_cost: self.initial_cost,
            final_cost: self.final_cost,
            iterations: self.iterations,
            accepted_perturbations: self.accepted_perturbations,
            accepted_splits: self.accepted_splits,
            rejected_invalid: self.rejected_invalid,
            cells,
        }
    }
}

// Running mean of accepted cost changes between progress reports
#[derive(Debug, Default)]
struct ResidualWindow {
    sum: f64,
    count: u64,
}

impl ResidualWindow {
    fn record(&mut self, cost_delta: f64) {
        self.sum += cost_delta;
        self.count += 1;
    }

    fn flush(&mut self, frame_index: usize, iteration: u64) {
        if self.count > 0 {
            debug!(
                "Frame {}, iteration {}: mean accepted cost change {:.6} over {} moves",
                frame_index,
                iteration,
                self.sum / self.count as f64,
                self.count
            );
        } else {
            debug!("Frame {}, iteration {}: no improving moves", frame_index, iteration);
        }
        *self = Self::default();
    }
}

// Supplied cells for frame `index`, consumed either way. From the
// continuation point on they are ignored in favour of carried-forward ones.
fn take_initial(
    initial: &mut HashMap<String, Vec<Cell>>,
    file: &str,
    index: usize,
    continue_from: Option<usize>,
) -> Option<Vec<Cell>> {
    let cells = initial.remove(file)?;
    if continue_from.is_some_and(|cf| index >= cf) {
        debug!("Ignoring {} supplied cells for frame {} ('{}')", cells.len(), index, file);
        return None;
    }
    Some(cells)
}

/// The ordered sequence of frames plus the search state shared across them.
pub struct Lineage {
    context: Arc<SearchContext>,
    frames: Vec<Frame>,
    // Frame was given its own starting population
    seeded: Vec<bool>,
    continue_from: Option<usize>,
    move_kinds: WeightedIndex<f64>,
    rng: StdRng,
}

impl Lineage {
    /// Builds every frame up front. A frame starts from `initial[file]` when
    /// present and, with `continue_from` set, only when it precedes that index.
    pub fn new(
        context: Arc<SearchContext>,
        inputs: Vec<LoadedFrame>,
        mut initial: HashMap<String, Vec<Cell>>,
        continue_from: Option<usize>,
    ) -> Result<Self, FatalError> {
        let config = &context.config;
        config.validate()?;
        let prob = &config.prob;
        let move_kinds = WeightedIndex::new([prob.split, prob.perturbation]).map_err(|_| {
            ConfigError::InvalidProbabilities { split: prob.split, perturbation: prob.perturbation }
        })?;
        let rng = StdRng::seed_from_u64(config.simulation.seed);

        let mut frames = Vec::with_capacity(inputs.len());
        let mut seeded = Vec::with_capacity(inputs.len());
        for (i, input) in inputs.into_iter().enumerate() {
            let cells = take_initial(&mut initial, &input.file, i, continue_from);
            seeded.push(cells.is_some());
            let cells = cells.unwrap_or_default();
            debug!("Frame {} ('{}') starts with {} cells", i, input.file, cells.len());
            frames.push(Frame::new(input.file, input.volume, cells, Arc::clone(&context))?);
        }
        for file in initial.keys() {
            warn!("Initial cells for '{}' match no loaded frame", file);
        }

        Ok(Self { context, frames, seeded, continue_from, move_kinds, rng })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frame(&self, index: usize) -> Result<&Frame, FatalError> {
        self.frames
            .get(index)
            .ok_or(FatalError::FrameIndexOutOfRange { index, len: self.frames.len() })
    }

    pub fn frame_mut(&mut self, index: usize) -> Result<&mut Frame, FatalError> {
        let len = self.frames.len();
        self.frames.get_mut(index).ok_or(FatalError::FrameIndexOutOfRange { index, len })
    }

    /// Frame lies before the continuation point and keeps the result of an
    /// earlier run.
    pub fn is_settled(&self, index: usize) -> bool {
        self.continue_from.is_some_and(|cf| index < cf)
    }

    /// Greedy search on frame `index`: `cells * iterations_per_cell` moves,
    /// each kept only if it strictly lowers the cost.
    pub fn optimize(&mut self, index: usize) -> Result<FrameReport, FatalError> {
        let len = self.frames.len();
        let frame = self.frames.get_mut(index).ok_or(FatalError::FrameIndexOutOfRange { index, len })?;
        let sim = &self.context.config.simulation;
        let total = frame.cells().len() as u64 * sim.iterations_per_cell as u64;
        let interval = sim.report_interval.max(1) as u64;
        if total == 0 {
            warn!("Frame {} ('{}') has no cells to optimize", index, frame.file());
        } else {
            info!("Optimizing frame {} ('{}'): {} iterations", index, frame.file(), total);
        }

        let mut report = FrameReport::unchanged(index, frame);
        let mut window = ResidualWindow::default();
        for iteration in 0..total {
            if iteration > 0 && iteration % interval == 0 {
                window.flush(index, iteration);
            }
            let kind = MOVE_KINDS[self.move_kinds.sample(&mut self.rng)];
            let proposal = match kind {
                MoveKind::Split => frame.split(&mut self.rng)?,
                MoveKind::Perturbation => frame.perturb(&mut self.rng)?,
            };
            if proposal.is_noop() {
                report.rejected_invalid += 1;
                continue;
            }
            let delta = proposal.cost_delta();
            if proposal.commit(delta < 0.0) {
                trace!("Frame {}, iteration {}: accepted {:?} ({:.6})", index, iteration, kind, delta);
                window.record(delta);
                match kind {
                    MoveKind::Split => report.accepted_splits += 1,
                    MoveKind::Perturbation => report.accepted_perturbations += 1,
                }
            }
        }

        report.iterations = total;
        report.final_cost = frame.cost();
        debug!("Frame {}: {} proposals rejected before evaluation", index, report.rejected_invalid);
        info!(
            "Frame {} done: cost {:.4} -> {:.4}, {} cells ({} perturbations, {} splits accepted)",
            index,
            report.initial_cost,
            report.final_cost,
            frame.cells().len(),
            report.accepted_perturbations,
            report.accepted_splits
        );
        Ok(report)
    }

    /// Copies frame `index`'s population into frame `index + 1`. No-op for the
    /// last frame and for a later frame that keeps its own supplied cells.
    pub fn advance(&mut self, index: usize) -> Result<(), FatalError> {
        let len = self.frames.len();
        if index >= len {
            return Err(FatalError::FrameIndexOutOfRange { index, len });
        }
        let next = index + 1;
        if next == len {
            return Ok(());
        }
        if self.seeded[next] && self.continue_from.map_or(true, |cf| next < cf) {
            debug!("Frame {} keeps its supplied cells", next);
            return Ok(());
        }
        let cells = self.frames[index].cells().to_vec();
        self.frames[next].replace_cells(cells)
    }

    /// Hands frame `index` to `exporter`.
    pub fn save(&self, index: usize, exporter: &dyn Exporter) -> anyhow::Result<()> {
        exporter.export(index, self.frame(index)?)
    }
}
