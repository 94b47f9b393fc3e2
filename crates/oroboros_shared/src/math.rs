//! Mathematical types shared between client and server.
//!
//! These are the canonical representations used in movement telemetry.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Below this value of `sin²` between two ray directions the rays are
/// treated as parallel.
pub const PARALLEL_EPSILON: f64 = 1e-12;

/// 3D Vector - position, velocity, direction
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component
    pub x: f64,
    /// Y component
    pub y: f64,
    /// Z component
    pub z: f64,
}

impl Vec3 {
    /// Creates a new Vec3
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Zero vector
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Unit Y vector
    pub const Y: Self = Self::new(0.0, 1.0, 0.0);

    /// Dot product
    #[must_use]
    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Length squared (avoids sqrt)
    #[must_use]
    pub fn length_squared(self) -> f64 {
        self.dot(self)
    }

    /// Length
    #[must_use]
    pub fn length(self) -> f64 {
        self.length_squared().sqrt()
    }

    /// Distance squared (avoids sqrt)
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        (self - other).length_squared()
    }

    /// Copy with the vertical component zeroed.
    #[must_use]
    pub const fn horizontal(self) -> Self {
        Self::new(self.x, 0.0, self.z)
    }

    /// Angle between two vectors in radians.
    ///
    /// NaN when either vector has zero length, so every comparison against
    /// the result is false.
    #[must_use]
    pub fn angle(self, other: Self) -> f64 {
        let cos = self.dot(other) / (self.length() * other.length());
        cos.clamp(-1.0, 1.0).acos()
    }

    /// Midpoint between two points.
    #[must_use]
    pub fn midpoint(self, other: Self) -> Self {
        (self + other) * 0.5
    }

    /// True when no component is NaN or infinite.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::ops::Mul<f64> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Position plus look orientation.
///
/// Yaw and pitch are in degrees. Yaw 0 faces +Z, yaw 90 faces -X,
/// pitch 90 looks straight down.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Location {
    /// Feet position
    pub position: Vec3,
    /// Horizontal rotation (degrees)
    pub yaw: f64,
    /// Vertical rotation (degrees)
    pub pitch: f64,
}

impl Location {
    /// Creates a new location
    #[must_use]
    pub const fn new(position: Vec3, yaw: f64, pitch: f64) -> Self {
        Self { position, yaw, pitch }
    }

    /// Unit look vector for this orientation.
    #[must_use]
    pub fn direction(&self) -> Vec3 {
        let yaw = self.yaw.to_radians();
        let pitch = self.pitch.to_radians();
        let xz = pitch.cos();
        Vec3::new(-xz * yaw.sin(), -pitch.sin(), xz * yaw.cos())
    }

    /// True when position and rotation are all finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.yaw.is_finite() && self.pitch.is_finite()
    }
}

/// Half-line with an origin and a direction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    /// Start point
    pub origin: Vec3,
    /// Direction (need not be normalized)
    pub direction: Vec3,
}

impl Ray {
    /// Creates a new ray
    #[must_use]
    pub const fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// Point at parameter `t` along the ray's line.
    #[must_use]
    pub fn at(&self, t: f64) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Closest points between the infinite lines through `self` and `other`.
    ///
    /// Returns `(point on self, point on other)`, or `None` when the lines
    /// are parallel, near-parallel, or the inputs are degenerate.
    #[must_use]
    pub fn closest_points_between_lines(&self, other: &Self) -> Option<(Vec3, Vec3)> {
        let u = self.direction;
        let v = other.direction;
        let w0 = self.origin - other.origin;

        let a = u.dot(u);
        let b = u.dot(v);
        let c = v.dot(v);
        let d = u.dot(w0);
        let e = v.dot(w0);

        let denom = a * c - b * b;
        // Relative test: denom / (a*c) is sin² of the angle between the lines
        if !(denom > PARALLEL_EPSILON * a * c) {
            return None;
        }

        let s = (b * e - c * d) / denom;
        let t = (a * e - b * d) / denom;
        let p = self.at(s);
        let q = other.at(t);

        (p.is_finite() && q.is_finite()).then_some((p, q))
    }
}
