//! Pairwise overlap check gating every proposed population change.

use crate::cell::Cell;

/// Radii are shrunk by this factor before the overlap test so that
/// near-touching cells are still accepted.
pub const OVERLAP_SHRINK: f32 = 0.95;

/// First pair `(i, j)`, `i < j`, whose centres are closer than the sum of
/// their shrunk radii.
pub fn first_overlap(cells: &[Cell]) -> Option<(usize, usize)> {
    for (i, a) in cells.iter().enumerate() {
        let ra = a.radius() * OVERLAP_SHRINK;
        for (j, b) in cells.iter().enumerate().skip(i + 1) {
            let limit = ra + b.radius() * OVERLAP_SHRINK;
            // Squared compare; both sides are non-negative
            if a.position.distance_squared(b.position) < limit * limit {
                return Some((i, j));
            }
        }
    }
    None
}

/// A population is valid when no two distinct cells overlap.
#[inline]
pub fn is_valid(cells: &[Cell]) -> bool {
    first_overlap(cells).is_none()
}
