use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

/// Basic 3D vector type used for cell centres and split axes.
#[derive(Copy, Clone, Default, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    #[inline(always)]
    pub fn new(x: f32, y: f32, z: f32) -> Self { Self { x, y, z } }
    #[inline(always)]
    pub fn zero() -> Self { Self::new(0.0, 0.0, 0.0) }
    #[inline(always)]
    pub fn length_squared(self) -> f32 { self.x * self.x + self.y * self.y + self.z * self.z }
    #[inline(always)]
    pub fn distance_squared(self, other: Self) -> f32 { (self - other).length_squared() }
    #[inline(always)]
    pub fn scale(self, scalar: f32) -> Self { Self::new(self.x * scalar, self.y * scalar, self.z * scalar) }

    /// Normalizes the vector, returning `None` if the length is zero or very small.
    pub fn try_normalize(self) -> Option<Vec3> {
        let len_sq = self.length_squared();
        if len_sq > 1e-12 && len_sq.is_finite() {
            Some(self.scale(1.0 / len_sq.sqrt()))
        } else {
            None
        }
    }

    /// Component access by axis index (0 = x, 1 = y, 2 = z).
    #[inline(always)]
    pub fn axis(self, i: usize) -> f32 {
        match i {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    pub fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

/// Axis-aligned bounding box given by its min and max corners.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Box of half-extents `half` around `center`.
    pub fn around(center: Vec3, half: Vec3) -> Self {
        Self { min: center - half, max: center + half }
    }

    /// Smallest box containing both boxes.
    pub fn union(self, other: Aabb) -> Aabb {
        Aabb { min: self.min.min(other.min), max: self.max.max(other.max) }
    }

    pub fn center(self) -> Vec3 {
        (self.min + self.max).scale(0.5)
    }

    /// Grows (or shrinks) the box about its centre by `factor` on every axis.
    pub fn scaled(self, factor: f32) -> Aabb {
        let center = self.center();
        let half = (self.max - self.min).scale(0.5 * factor);
        Aabb::around(center, half)
    }

    /// A box is well formed when every min is finite and not above its max.
    pub fn is_well_formed(self) -> bool {
        (0..3).all(|i| {
            let (lo, hi) = (self.min.axis(i), self.max.axis(i));
            lo.is_finite() && hi.is_finite() && lo <= hi
        })
    }

    /// Inclusive z-range test.
    #[inline(always)]
    pub fn contains_z(self, z: f32) -> bool {
        z >= self.min.z && z <= self.max.z
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_covers_both_boxes() {
        let a = Aabb::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 1.0));
        let b = Aabb::new(Vec3::new(-2.0, 0.5, 3.0), Vec3::new(0.5, 4.0, 5.0));
        let u = a.union(b);
        assert_eq!(u.min, Vec3::new(-2.0, 0.0, 0.0));
        assert_eq!(u.max, Vec3::new(1.0, 4.0, 5.0));
    }

    #[test]
    fn scaled_keeps_center() {
        let a = Aabb::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(4.0, 2.0, 2.0));
        let s = a.scaled(1.5);
        assert_eq!(s.center(), a.center());
        assert_eq!(s.min, Vec3::new(-1.0, -0.5, -0.5));
        assert_eq!(s.max, Vec3::new(5.0, 2.5, 2.5));
    }

    #[test]
    fn nan_box_is_not_well_formed() {
        let a = Aabb::new(Vec3::new(f32::NAN, 0.0, 0.0), Vec3::new(1.0, 1.0, 1.0));
        assert!(!a.is_well_formed());
        let inverted = Aabb::new(Vec3::new(2.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 1.0));
        assert!(!inverted.is_well_formed());
    }

    #[test]
    fn normalize_rejects_zero_and_non_finite() {
        assert_eq!(Vec3::new(0.0, 0.0, 2.0).try_normalize(), Some(Vec3::new(0.0, 0.0, 1.0)));
        assert!(Vec3::zero().try_normalize().is_none());
        assert!(Vec3::new(f32::NAN, 0.0, 0.0).try_normalize().is_none());
    }
}
