use std::collections::HashMap;

use cell_universe_common::{Aabb, CellConfig, PerturbParams, SimulationConfig, Vec3};
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::analyzer::{ShapeAnalyzer, VoxelRegion};
use crate::render::{Plane, Renderer};

/// A single tunable parameter of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Param {
    X,
    Y,
    Z,
    Radius,
    A,
    B,
    C,
}

impl Param {
    fn is_axis(self) -> bool {
        matches!(self, Param::A | Param::B | Param::C)
    }
}

const SPHERE_PARAMS: [Param; 4] = [Param::X, Param::Y, Param::Z, Param::Radius];
const SPHEROID_PARAMS: [Param; 7] = [
    Param::X,
    Param::Y,
    Param::Z,
    Param::Radius,
    Param::A,
    Param::B,
    Param::C,
];

/// Caller-supplied parameter offsets for [`Cell::parameterized`].
pub type Offsets = HashMap<Param, f32>;

/// Shape-specific payload of a cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Sphere {
        radius: f32,
    },
    /// Ellipsoid with semi-axes `a`, `b` (in-plane) and `c` (depth), rotated
    /// in the xy-plane by `rotation` degrees. `radius` is used for overlap checks.
    Spheroid {
        radius: f32,
        a: f32,
        b: f32,
        c: f32,
        rotation: f32,
    },
}

/// What a cell looks like on one plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CrossSection {
    Circle {
        center: (f32, f32),
        radius: f32,
    },
    Ellipse {
        center: (f32, f32),
        semi_axes: (f32, f32),
        rotation: f32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// Lineage-encoding identifier; split children append `0` or `1`.
    pub name: String,
    pub position: Vec3,
    pub shape: Shape,
    dormant: bool,
}

/// Result of splitting a cell along an axis.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitOutcome {
    pub first: Cell,
    pub second: Cell,
    /// Both children satisfy the radius bounds.
    pub valid: bool,
}

/// Draws one offset: `Normal(mu, sigma)` with probability `prob`, otherwise `mu`.
pub fn sample_offset<R: Rng + ?Sized>(params: &PerturbParams, rng: &mut R) -> f32 {
    if rng.random::<f64>() >= params.prob {
        return params.mu;
    }
    match Normal::new(params.mu, params.sigma) {
        Ok(normal) => normal.sample(rng),
        Err(_) => params.mu,
    }
}

impl Cell {
    pub fn sphere(name: impl Into<String>, position: Vec3, radius: f32) -> Self {
        Self { name: name.into(), position, shape: Shape::Sphere { radius }, dormant: false }
    }

    pub fn spheroid(
        name: impl Into<String>,
        position: Vec3,
        radius: f32,
        semi_axes: (f32, f32, f32),
        rotation: f32,
    ) -> Self {
        let (a, b, c) = semi_axes;
        Self {
            name: name.into(),
            position,
            shape: Shape::Spheroid { radius, a, b, c, rotation },
            dormant: false,
        }
    }

    /// Characteristic radius, used for overlap checks and splitting.
    pub fn radius(&self) -> f32 {
        match self.shape {
            Shape::Sphere { radius } | Shape::Spheroid { radius, .. } => radius,
        }
    }

    pub fn is_dormant(&self) -> bool {
        self.dormant
    }

    pub fn set_dormant(&mut self, dormant: bool) {
        self.dormant = dormant;
    }

    /// Name of the cell this one was split from, if any.
    pub fn parent_name(&self) -> Option<&str> {
        let mut chars = self.name.char_indices();
        let (last, _) = chars.next_back()?;
        (last > 0).then(|| &self.name[..last])
    }

    pub fn params(&self) -> &'static [Param] {
        match self.shape {
            Shape::Sphere { .. } => &SPHERE_PARAMS,
            Shape::Spheroid { .. } => &SPHEROID_PARAMS,
        }
    }

    /// Cross-section radius at depth `z`; zero outside the axial extent.
    pub fn radius_at(&self, z: f32) -> f32 {
        let dz = (z - self.position.z).abs();
        match self.shape {
            Shape::Sphere { radius } => {
                if dz <= radius {
                    (radius * radius - dz * dz).sqrt()
                } else {
                    0.0
                }
            }
            Shape::Spheroid { a, b, c, .. } => (a + b) * 0.5 * axial_scale(dz, c),
        }
    }

    /// Shape drawn on the plane at depth `z`, `None` when nothing is drawn.
    pub fn cross_section(&self, z: f32) -> Option<CrossSection> {
        if self.dormant {
            return None;
        }
        let center = (self.position.x, self.position.y);
        match self.shape {
            Shape::Sphere { .. } => {
                let radius = self.radius_at(z);
                (radius > 0.0).then_some(CrossSection::Circle { center, radius })
            }
            Shape::Spheroid { a, b, c, rotation, .. } => {
                let s = axial_scale((z - self.position.z).abs(), c);
                (s > 0.0).then_some(CrossSection::Ellipse {
                    center,
                    semi_axes: (a * s, b * s),
                    rotation,
                })
            }
        }
    }

    pub fn render(&self, plane: &mut Plane, sim: &SimulationConfig, renderer: &dyn Renderer, z: f32) {
        match self.cross_section(z) {
            Some(CrossSection::Circle { center, radius }) => {
                renderer.fill_circle(plane, center, radius, sim.cell_color)
            }
            Some(CrossSection::Ellipse { center, semi_axes, rotation }) => {
                renderer.fill_ellipse(plane, center, semi_axes, rotation, sim.cell_color)
            }
            None => {}
        }
    }

    /// Axis-aligned box around the full extent of the shape. Spheroid boxes
    /// use the larger in-plane semi-axis so any rotation is covered.
    pub fn bounding_box(&self) -> Aabb {
        let half = match self.shape {
            Shape::Sphere { radius } => Vec3::new(radius, radius, radius),
            Shape::Spheroid { a, b, c, .. } => {
                let r = a.max(b);
                Vec3::new(r, r, c)
            }
        };
        Aabb::around(self.position, half)
    }

    /// Copy of this cell with one randomly chosen parameter moved by its
    /// configured perturbation.
    pub fn perturbed<R: Rng + ?Sized>(&self, cfg: &CellConfig, rng: &mut R) -> Cell {
        let params = self.params();
        let param = params[rng.random_range(0..params.len())];
        let delta = sample_offset(&param_distribution(param, cfg), rng);
        let mut next = self.clone();
        next.apply_offset(param, delta, cfg);
        next
    }

    /// Copy of this cell with `offsets` applied. An empty map samples an
    /// offset for every position and radius parameter. Missing spheroid axis
    /// offsets default to half the radius offset.
    pub fn parameterized<R: Rng + ?Sized>(&self, offsets: &Offsets, cfg: &CellConfig, rng: &mut R) -> Cell {
        let sampled;
        let offsets = if offsets.is_empty() {
            sampled = SPHERE_PARAMS
                .iter()
                .map(|&p| (p, sample_offset(&param_distribution(p, cfg), rng)))
                .collect::<Offsets>();
            &sampled
        } else {
            offsets
        };

        let mut next = self.clone();
        for &param in self.params() {
            let delta = match offsets.get(&param) {
                Some(&d) => d,
                None if param.is_axis() => offsets.get(&Param::Radius).copied().unwrap_or(0.0) * 0.5,
                None => 0.0,
            };
            next.apply_offset(param, delta, cfg);
        }
        next
    }

    fn apply_offset(&mut self, param: Param, delta: f32, cfg: &CellConfig) {
        if delta == 0.0 {
            return;
        }
        match param {
            Param::X => self.position.x += delta,
            Param::Y => self.position.y += delta,
            Param::Z => self.position.z += delta,
            Param::Radius => match &mut self.shape {
                Shape::Sphere { radius } | Shape::Spheroid { radius, .. } => {
                    *radius = cfg.clamp_radius(*radius + delta)
                }
            },
            Param::A | Param::B | Param::C => {
                if let Shape::Spheroid { a, b, c, .. } = &mut self.shape {
                    let axis = match param {
                        Param::A => a,
                        Param::B => b,
                        _ => c,
                    };
                    *axis = cfg.clamp_radius(*axis + delta);
                }
            }
        }
    }

    /// Radius (and every spheroid semi-axis) lies within the configured bounds.
    pub fn satisfies_bounds(&self, cfg: &CellConfig) -> bool {
        match self.shape {
            Shape::Sphere { radius } => cfg.radius_in_bounds(radius),
            Shape::Spheroid { radius, a, b, c, .. } => [radius, a, b, c]
                .iter()
                .all(|&v| cfg.radius_in_bounds(v)),
        }
    }

    /// Two children offset by half the radius along `axis` (assumed unit
    /// length), each with half the radius and semi-axes.
    pub fn split_along(&self, axis: Vec3) -> (Cell, Cell) {
        let offset = axis.scale(self.radius() * 0.5);
        let shape = match self.shape {
            Shape::Sphere { radius } => Shape::Sphere { radius: radius * 0.5 },
            Shape::Spheroid { radius, a, b, c, rotation } => Shape::Spheroid {
                radius: radius * 0.5,
                a: a * 0.5,
                b: b * 0.5,
                c: c * 0.5,
                rotation,
            },
        };
        let child = |suffix: char, position: Vec3| Cell {
            name: format!("{}{}", self.name, suffix),
            position,
            shape,
            dormant: false,
        };
        (child('0', self.position + offset), child('1', self.position - offset))
    }

    /// Splits along the axis `analyzer` finds in `region`. `None` when no
    /// axis can be determined.
    pub fn split(
        &self,
        region: &VoxelRegion,
        analyzer: &dyn ShapeAnalyzer,
        cfg: &CellConfig,
    ) -> Option<SplitOutcome> {
        let axis = analyzer.split_axis(region)?.try_normalize()?;
        let (first, second) = self.split_along(axis);
        let valid = first.satisfies_bounds(cfg) && second.satisfies_bounds(cfg);
        Some(SplitOutcome { first, second, valid })
    }
}

fn param_distribution(param: Param, cfg: &CellConfig) -> PerturbParams {
    match param {
        Param::X => cfg.x,
        Param::Y => cfg.y,
        Param::Z => cfg.z,
        Param::Radius => cfg.radius,
        Param::A | Param::B | Param::C => cfg.axis_params(),
    }
}

// sqrt(1 - (dz/c)^2), zero beyond the axial extent
#[inline]
fn axial_scale(dz: f32, c: f32) -> f32 {
    if c <= 0.0 || dz > c {
        return 0.0;
    }
    let t = dz / c;
    (1.0 - t * t).max(0.0).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_config, FixedAxis};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn empty_region() -> VoxelRegion {
        VoxelRegion::new((0, 0), 1, 1, vec![0.0], vec![0.0])
    }

    #[test]
    fn sphere_radius_at_depth() {
        let cell = Cell::sphere("a", Vec3::new(0.0, 0.0, 2.0), 5.0);
        assert_eq!(cell.radius_at(2.0), 5.0);
        assert_eq!(cell.radius_at(5.0), 4.0);
        assert_eq!(cell.radius_at(7.0), 0.0);
        assert_eq!(cell.radius_at(7.5), 0.0);
    }

    #[test]
    fn spheroid_radius_at_uses_mean_in_plane_axis() {
        let cell = Cell::spheroid("s", Vec3::zero(), 4.0, (6.0, 2.0, 5.0), 30.0);
        assert_eq!(cell.radius_at(0.0), 4.0);
        assert!((cell.radius_at(3.0) - 3.2).abs() < 1e-5);
        assert_eq!(cell.radius_at(5.5), 0.0);
    }

    #[test]
    fn split_along_x_places_half_size_children() {
        let config = test_config();
        let cell = Cell::sphere("c", Vec3::new(0.0, 0.0, 0.0), 10.0);
        let outcome = cell
            .split(&empty_region(), &FixedAxis(Some(Vec3::new(1.0, 0.0, 0.0))), &config.cell)
            .unwrap();

        assert_eq!(outcome.first.position, Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(outcome.second.position, Vec3::new(-5.0, 0.0, 0.0));
        assert_eq!(outcome.first.radius(), 5.0);
        assert_eq!(outcome.second.radius(), 5.0);
        assert_eq!(outcome.first.name, "c0");
        assert_eq!(outcome.second.name, "c1");
        assert_eq!(outcome.first.parent_name(), Some("c"));
        assert!(outcome.valid);
    }

    #[test]
    fn split_below_min_radius_is_invalid() {
        let mut config = test_config();
        config.cell.min_radius = 3.0;
        let cell = Cell::sphere("c", Vec3::zero(), 4.0);
        let outcome = cell
            .split(&empty_region(), &FixedAxis(Some(Vec3::new(0.0, 2.0, 0.0))), &config.cell)
            .unwrap();
        assert!(!outcome.valid);
        // Unit axis, offset by half the radius
        assert_eq!(outcome.first.position, Vec3::new(0.0, 2.0, 0.0));
        assert_eq!(outcome.second.position, Vec3::new(0.0, -2.0, 0.0));
    }

    #[test]
    fn split_without_axis_yields_nothing() {
        let config = test_config();
        let cell = Cell::sphere("c", Vec3::zero(), 10.0);
        assert!(cell.split(&empty_region(), &FixedAxis(None), &config.cell).is_none());
        let zero = FixedAxis(Some(Vec3::zero()));
        assert!(cell.split(&empty_region(), &zero, &config.cell).is_none());
    }

    #[test]
    fn spheroid_split_halves_axes_and_keeps_rotation() {
        let cell = Cell::spheroid("s", Vec3::zero(), 8.0, (8.0, 6.0, 4.0), 45.0);
        let (first, _) = cell.split_along(Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(first.position, Vec3::new(0.0, 0.0, 4.0));
        assert_eq!(
            first.shape,
            Shape::Spheroid { radius: 4.0, a: 4.0, b: 3.0, c: 2.0, rotation: 45.0 }
        );
    }

    #[test]
    fn parent_name_of_root_is_none() {
        assert_eq!(Cell::sphere("a", Vec3::zero(), 1.0).parent_name(), None);
        assert_eq!(Cell::sphere("a01", Vec3::zero(), 1.0).parent_name(), Some("a0"));
    }

    #[test]
    fn perturbed_changes_exactly_one_parameter() {
        let mut config = test_config();
        for p in [&mut config.cell.x, &mut config.cell.y, &mut config.cell.z, &mut config.cell.radius] {
            *p = PerturbParams::new(1.0, 0.0, 1.0);
        }
        let mut rng = StdRng::seed_from_u64(7);
        let cell = Cell::sphere("a", Vec3::new(20.0, 20.0, 0.0), 5.0);
        for _ in 0..50 {
            let next = cell.perturbed(&config.cell, &mut rng);
            let changed = [
                next.position.x != cell.position.x,
                next.position.y != cell.position.y,
                next.position.z != cell.position.z,
                next.radius() != cell.radius(),
            ];
            assert!(changed.iter().filter(|&&c| c).count() <= 1);
            assert!(config.cell.radius_in_bounds(next.radius()));
        }
    }

    #[test]
    fn radius_offsets_are_clamped() {
        let config = test_config();
        let mut rng = StdRng::seed_from_u64(1);
        let cell = Cell::sphere("a", Vec3::zero(), 5.0);
        let offsets = Offsets::from([(Param::Radius, 1000.0)]);
        let grown = cell.parameterized(&offsets, &config.cell, &mut rng);
        assert_eq!(grown.radius(), config.cell.max_radius);
        let offsets = Offsets::from([(Param::Radius, -1000.0)]);
        let shrunk = cell.parameterized(&offsets, &config.cell, &mut rng);
        assert_eq!(shrunk.radius(), config.cell.min_radius);
    }

    #[test]
    fn zero_offsets_leave_cell_unchanged() {
        let config = test_config();
        let mut rng = StdRng::seed_from_u64(1);
        let cell = Cell::spheroid("s", Vec3::new(1.0, 2.0, 3.0), 4.0, (4.0, 3.0, 2.0), 10.0);
        let offsets = Offsets::from([(Param::X, 0.0), (Param::Radius, 0.0)]);
        assert_eq!(cell.parameterized(&offsets, &config.cell, &mut rng), cell);
    }

    #[test]
    fn missing_axis_offsets_follow_half_radius_offset() {
        let config = test_config();
        let mut rng = StdRng::seed_from_u64(1);
        let cell = Cell::spheroid("s", Vec3::zero(), 4.0, (4.0, 3.0, 2.0), 0.0);
        let offsets = Offsets::from([(Param::Radius, 2.0)]);
        let next = cell.parameterized(&offsets, &config.cell, &mut rng);
        assert_eq!(
            next.shape,
            Shape::Spheroid { radius: 6.0, a: 5.0, b: 4.0, c: 3.0, rotation: 0.0 }
        );
    }

    #[test]
    fn bounding_box_covers_rotated_spheroid() {
        let cell = Cell::spheroid("s", Vec3::new(10.0, 10.0, 0.0), 4.0, (2.0, 6.0, 3.0), 70.0);
        let bbox = cell.bounding_box();
        assert_eq!(bbox.min, Vec3::new(4.0, 4.0, -3.0));
        assert_eq!(bbox.max, Vec3::new(16.0, 16.0, 3.0));
    }
}
