use std::ops::{Add, Mul, Neg, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn length_squared(self) -> f32 {
        self.dot(self)
    }

    pub fn normalize(self) -> Self {
        let len_sq = self.length_squared();
        if len_sq <= 1e-12 {
            return Self::ZERO;
        }
        self * (1.0 / len_sq.sqrt())
    }

    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    pub fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }

    pub fn max_abs_diff(self, other: Self) -> f32 {
        (self.x - other.x)
            .abs()
            .max((self.y - other.y).abs())
            .max((self.z - other.z).abs())
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub const EMPTY: Self = Self {
        min: Vec3::ZERO,
        max: Vec3::ZERO,
    };

    /// Extrema over a flat XYZ center array. Empty input yields a zero box.
    pub fn from_centers(centers: &[f32]) -> Self {
        let mut chunks = centers.chunks_exact(3);
        let first = match chunks.next() {
            Some(c) => Vec3::new(c[0], c[1], c[2]),
            None => return Self::EMPTY,
        };

        let (min, max) = chunks.fold((first, first), |(min, max), c| {
            let p = Vec3::new(c[0], c[1], c[2]);
            (min.min(p), max.max(p))
        });
        Self { min, max }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_cover_all_centers() {
        let centers = [1.0, -2.0, 3.0, -4.0, 5.0, 0.5, 0.0, 0.0, -6.0];
        let bounds = Bounds::from_centers(&centers);
        assert_eq!(bounds.min, Vec3::new(-4.0, -2.0, -6.0));
        assert_eq!(bounds.max, Vec3::new(1.0, 5.0, 3.0));
    }

    #[test]
    fn empty_centers_give_zero_box() {
        assert_eq!(Bounds::from_centers(&[]), Bounds::EMPTY);
    }

    #[test]
    fn corners_span_both_extrema() {
        let bounds = Bounds {
            min: Vec3::new(-1.0, -1.0, -1.0),
            max: Vec3::new(1.0, 2.0, 3.0),
        };
        let corners = bounds.corners();
        assert!(corners.contains(&bounds.min));
        assert!(corners.contains(&bounds.max));
        assert_eq!(bounds.center(), Vec3::new(0.0, 0.5, 1.0));
    }

    #[test]
    fn normalize_handles_zero() {
        assert_eq!(Vec3::ZERO.normalize(), Vec3::ZERO);
        let n = Vec3::new(3.0, 0.0, 4.0).normalize();
        assert!((n.length_squared() - 1.0).abs() < 1e-6);
    }
}
