//! Fits a population of geometric cells to a time-lapse of 3-D microscopy
//! volumes by greedy stochastic search, carrying each frame's result forward
//! as the next frame's starting point.

pub mod analyzer;
pub mod cell;
pub mod cost;
pub mod error;
pub mod export;
pub mod frame;
pub mod lineage;
pub mod loader;
pub mod population;
pub mod render;
pub mod validator;

#[cfg(test)]
pub(crate) mod test_support;

pub use cell::{Cell, Param, Shape};
pub use error::FatalError;
pub use frame::{Frame, Proposal, SearchContext};
pub use lineage::{FrameReport, Lineage};
pub use render::{Plane, Volume};
