//! Common types and traits for pallet geometry.
//!
//! All lengths are millimeters, all weights kilograms. Positions describe the
//! lower left front corner of a column, seen from the pallet origin.

use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Global numerical tolerance for floating-point comparisons.
pub const EPSILON_GENERAL: f64 = 1e-6;

/// Tolerance when matching a top face against a base plane.
///
/// Heights are integer millimeters on input, but centred override placements
/// can produce half millimeters, so a full millimeter is allowed.
pub const EPSILON_SUPPORT: f64 = 1.0;

/// A 3D vector or point in pallet space.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    #[inline]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Product of all components.
    #[inline]
    pub fn volume(&self) -> f64 {
        self.x * self.y * self.z
    }

    /// Checks if the vector fits within another vector (component-wise <=).
    #[inline]
    pub fn fits_within(&self, container: &Self, tolerance: f64) -> bool {
        self.x <= container.x + tolerance
            && self.y <= container.y + tolerance
            && self.z <= container.z + tolerance
    }
}

impl Add for Vec3 {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Horizontal extent (width along X, depth along Y) of an item or column.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct Footprint {
    pub width: f64,
    pub depth: f64,
}

impl Footprint {
    #[inline]
    pub const fn new(width: f64, depth: f64) -> Self {
        Self { width, depth }
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.depth
    }

    /// The footprint rotated by 90° about the vertical axis.
    #[inline]
    pub const fn transposed(&self) -> Self {
        Self::new(self.depth, self.width)
    }

    #[inline]
    pub fn is_square(&self) -> bool {
        (self.width - self.depth).abs() <= EPSILON_GENERAL
    }

    /// Checks whether this footprint lies within `width` × `depth` without rotation.
    #[inline]
    pub fn fits_in(&self, width: f64, depth: f64, tolerance: f64) -> bool {
        self.width <= width + tolerance && self.depth <= depth + tolerance
    }

    /// Lifts the footprint into a size vector with the given height.
    #[inline]
    pub const fn with_height(&self, height: f64) -> Vec3 {
        Vec3::new(self.width, self.depth, height)
    }
}

/// Objects with a 3D extent.
pub trait Dimensional {
    fn dimensions(&self) -> Vec3;

    fn volume(&self) -> f64 {
        self.dimensions().volume()
    }
}

/// Objects anchored at a position in pallet space.
pub trait Positioned {
    /// Lower left front corner.
    fn position(&self) -> Vec3;
}

/// Objects with a weight in kg.
pub trait Weighted {
    fn weight(&self) -> f64;
}

/// Anything that is both positioned and dimensioned has a bounding box.
pub trait Bounded: Positioned + Dimensional {
    fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_position_and_dims(self.position(), self.dimensions())
    }
}

impl<T: Positioned + Dimensional> Bounded for T {}

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn from_position_and_dims(position: Vec3, dims: Vec3) -> Self {
        Self {
            min: position,
            max: position + dims,
        }
    }

    /// Strict intersection test; boxes that only share a face do not intersect.
    #[inline]
    pub fn intersects(&self, other: &Self) -> bool {
        !(self.max.x <= other.min.x
            || other.max.x <= self.min.x
            || self.max.y <= other.min.y
            || other.max.y <= self.min.y
            || self.max.z <= other.min.z
            || other.max.z <= self.min.z)
    }

    /// Strict containment of a point in the XY projection (edges excluded).
    #[inline]
    pub fn contains_xy_strict(&self, x: f64, y: f64) -> bool {
        self.min.x < x && x < self.max.x && self.min.y < y && y < self.max.y
    }

    #[inline]
    pub fn top_z(&self) -> f64 {
        self.max.z
    }

    /// Centre of the bottom face.
    #[inline]
    pub fn base_center(&self) -> Vec3 {
        Vec3::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
            self.min.z,
        )
    }

    #[inline]
    pub fn dimensions(&self) -> Vec3 {
        self.max - self.min
    }
}
