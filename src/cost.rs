use crate::error::FatalError;
use crate::render::{Plane, Volume};

/// Euclidean (L2) norm of the difference between two planes of equal shape.
pub fn plane_cost(observed: &Plane, synthetic: &Plane) -> f64 {
    observed
        .as_raw()
        .iter()
        .zip(synthetic.as_raw())
        .map(|(&a, &b)| {
            let d = (a - b) as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Per-plane costs of `synthetic` against `observed`.
pub fn plane_costs(observed: &Volume, synthetic: &Volume) -> Result<Vec<f64>, FatalError> {
    if observed.len() != synthetic.len() {
        return Err(FatalError::PlaneCountMismatch {
            observed: observed.len(),
            synthetic: synthetic.len(),
        });
    }
    observed
        .planes
        .iter()
        .zip(&synthetic.planes)
        .enumerate()
        .map(|(index, (obs, syn))| {
            if obs.dimensions() != syn.dimensions() {
                return Err(FatalError::PlaneShapeMismatch {
                    index,
                    observed: obs.dimensions(),
                    synthetic: syn.dimensions(),
                });
            }
            Ok(plane_cost(obs, syn))
        })
        .collect()
}

/// Total mismatch between two volumes: the sum of per-plane L2 norms. Lower is better.
pub fn cost(observed: &Volume, synthetic: &Volume) -> Result<f64, FatalError> {
    Ok(plane_costs(observed, synthetic)?.iter().sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn volume(planes: usize, value: f32) -> Volume {
        Volume::new((0..planes).map(|_| Plane::from_pixel(4, 4, Luma([value]))).collect())
    }

    #[test]
    fn self_comparison_costs_nothing() {
        let v = volume(3, 0.4);
        assert_eq!(cost(&v, &v).unwrap(), 0.0);
    }

    #[test]
    fn cost_is_sum_of_plane_norms() {
        // 16 pixels differing by 0.5 per plane -> sqrt(16 * 0.25) = 2 per plane
        let cost = cost(&volume(3, 0.0), &volume(3, 0.5)).unwrap();
        assert!((cost - 6.0).abs() < 1e-9);
    }

    #[test]
    fn plane_count_mismatch_is_fatal() {
        let err = cost(&volume(5, 0.0), &volume(4, 0.0)).unwrap_err();
        assert_eq!(err, FatalError::PlaneCountMismatch { observed: 5, synthetic: 4 });
    }

    #[test]
    fn plane_shape_mismatch_is_fatal() {
        let small = Volume::new(vec![Plane::from_pixel(2, 2, Luma([0.0]))]);
        let err = cost(&volume(1, 0.0), &small).unwrap_err();
        assert!(matches!(err, FatalError::PlaneShapeMismatch { index: 0, .. }));
    }
}
