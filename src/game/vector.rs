//! 2D vector math and angle helpers
//!
//! Angles are in degrees. The convention is plain trigonometric: 0° points
//! along +X and positive angles rotate counter-clockwise. `Vec2::from_angle`
//! and `Vec2::to_angle` are inverses under this convention.

use std::ops::{Add, AddAssign, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// A 2D vector / point in world units
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Unit vector facing `degrees`
    pub fn from_angle(degrees: f64) -> Self {
        let radians = degrees.to_radians();
        Self {
            x: radians.cos(),
            y: radians.sin(),
        }
    }

    /// Heading of this vector in degrees, normalized to (-180, 180]
    pub fn to_angle(self) -> f64 {
        normalize_angle(self.y.atan2(self.x).to_degrees())
    }

    pub fn magnitude(self) -> f64 {
        self.magnitude_squared().sqrt()
    }

    /// Squared length, for hot paths that only compare distances
    pub fn magnitude_squared(self) -> f64 {
        self.x * self.x + self.y * self.y
    }

    /// Unit vector in the same direction. `None` for the zero vector.
    pub fn normalize(self) -> Option<Self> {
        let mag = self.magnitude();
        if mag == 0.0 || !mag.is_finite() {
            return None;
        }
        Some(Self {
            x: self.x / mag,
            y: self.y / mag,
        })
    }

    /// Shortens the vector to `max` if it is longer, keeping direction
    pub fn clamp_magnitude(self, max: f64) -> Self {
        let mag_sq = self.magnitude_squared();
        if mag_sq <= max * max {
            return self;
        }
        self * (max / mag_sq.sqrt())
    }

    pub fn distance_squared(self, other: Vec2) -> f64 {
        (self - other).magnitude_squared()
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, other: Vec2) -> Vec2 {
        Vec2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, other: Vec2) {
        self.x += other.x;
        self.y += other.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, other: Vec2) -> Vec2 {
        Vec2 {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;

    fn mul(self, scalar: f64) -> Vec2 {
        Vec2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }
}

impl Neg for Vec2 {
    type Output = Vec2;

    fn neg(self) -> Vec2 {
        Vec2 {
            x: -self.x,
            y: -self.y,
        }
    }
}

/// Map any angle in degrees into (-180, 180]
pub fn normalize_angle(degrees: f64) -> f64 {
    let angle = degrees % 360.0;
    if angle > 180.0 {
        angle - 360.0
    } else if angle <= -180.0 {
        angle + 360.0
    } else {
        angle
    }
}

/// Signed shortest rotation from `from` to `to`, in (-180, 180]
pub fn angle_difference(from: f64, to: f64) -> f64 {
    normalize_angle(to - from)
}
