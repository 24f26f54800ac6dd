//! Geometric predicates for collision, bounds and support checks.
//!
//! These are pure functions over positions and sizes; they know nothing about
//! pallets or search order.

use crate::types::{Bounded, BoundingBox, Vec3};

/// Checks whether two boxes intersect.
///
/// Uses strict inequality on all three axes, so boxes that only touch along a
/// face do not count as overlapping.
pub fn overlaps(a: &BoundingBox, b: &BoundingBox) -> bool {
    a.intersects(b)
}

/// Checks whether a box at `pos` with `size` stays inside `bounds`.
///
/// # Parameters
/// * `pos` - Lower left front corner of the candidate
/// * `size` - Width, depth, height of the candidate
/// * `bounds` - Pallet limits (width, depth, height)
/// * `epsilon` - Numerical tolerance
pub fn fits_within(pos: Vec3, size: Vec3, bounds: Vec3, epsilon: f64) -> bool {
    pos.x >= -epsilon
        && pos.y >= -epsilon
        && pos.z >= -epsilon
        && (pos + size).fits_within(&bounds, epsilon)
}

/// Checks whether a candidate rests on something.
///
/// On the floor this is always true. Above it, some placed box must have its top
/// face within `epsilon` of the candidate's base and must strictly contain the
/// candidate's horizontal centre. One supporter is enough.
pub fn is_supported<P: Bounded>(pos: Vec3, size: Vec3, placed: &[P], epsilon: f64) -> bool {
    if pos.z <= epsilon {
        return true;
    }

    let center = BoundingBox::from_position_and_dims(pos, size).base_center();
    placed.iter().any(|p| {
        let bb = p.bounding_box();
        (bb.top_z() - pos.z).abs() <= epsilon && bb.contains_xy_strict(center.x, center.y)
    })
}

/// Checks a candidate box against every placed box.
pub fn collides_with_any<P: Bounded>(candidate: &BoundingBox, placed: &[P]) -> bool {
    placed.iter().any(|p| overlaps(&p.bounding_box(), candidate))
}
