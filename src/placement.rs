//! Position search within a single pallet.
//!
//! Two strategies share the same legality checks:
//! - the skyline search walks candidate points built from the edges of what is
//!   already on the pallet and is used for carton-by-carton packing;
//! - the shelf search fills rows left to right with a cursor and is used for
//!   pre-built columns.

use tracing::trace;

use crate::geometry::{collides_with_any, fits_within, is_supported};
use crate::model::{ColumnBlock, Pallet, ShelfCursor, UnitItem};
use crate::optimizer::PackingConfig;
use crate::types::{BoundingBox, Footprint, Vec3};

/// A legal spot for one carton or column.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub position: Vec3,
    pub footprint: Footprint,
}

/// Checks bounds, weight, collisions and support for a candidate.
///
/// # Parameters
/// * `pallet` - The pallet with its current load
/// * `position` - Lower left front corner of the candidate
/// * `size` - Width, depth, height of the candidate
/// * `weight` - Weight the candidate adds
/// * `config` - Tolerances
pub fn can_place(
    pallet: &Pallet,
    position: Vec3,
    size: Vec3,
    weight: f64,
    config: &PackingConfig,
) -> bool {
    if !fits_within(position, size, pallet.spec.dims(), config.general_epsilon) {
        return false;
    }
    if !pallet.can_carry(weight, config.general_epsilon) {
        return false;
    }

    let candidate = BoundingBox::from_position_and_dims(position, size);
    if collides_with_any(&candidate, &pallet.placed) {
        return false;
    }

    is_supported(position, size, &pallet.placed, config.support_epsilon)
}

/// Sorted, deduplicated coordinates.
fn unique_levels(mut levels: Vec<f64>, epsilon: f64) -> Vec<f64> {
    levels.sort_by(|a, b| a.total_cmp(b));
    levels.dedup_by(|a, b| (*a - *b).abs() <= epsilon);
    levels
}

/// Candidate Z levels: the floor plus every top face that is still inside the pallet.
pub fn candidate_z_levels(pallet: &Pallet, config: &PackingConfig) -> Vec<f64> {
    let mut levels = vec![0.0];
    levels.extend(
        pallet
            .placed
            .iter()
            .map(|p| p.top_z())
            .filter(|top| *top <= pallet.spec.max_height + config.general_epsilon),
    );
    unique_levels(levels, config.general_epsilon)
}

/// Candidate X levels: the origin plus every right edge.
pub fn candidate_x_levels(pallet: &Pallet, config: &PackingConfig) -> Vec<f64> {
    let mut levels = vec![0.0];
    levels.extend(pallet.placed.iter().map(|p| p.right_edge()));
    unique_levels(levels, config.general_epsilon)
}

/// Candidate Y levels: the origin plus every far edge.
pub fn candidate_y_levels(pallet: &Pallet, config: &PackingConfig) -> Vec<f64> {
    let mut levels = vec![0.0];
    levels.extend(pallet.placed.iter().map(|p| p.far_edge()));
    unique_levels(levels, config.general_epsilon)
}

/// Finds the first legal spot for a single carton.
///
/// Walks Z, then Y, then X in ascending order and tries the carton's allowed
/// footprints at every point. The weight check runs before any geometry.
pub fn find_skyline_position(
    pallet: &Pallet,
    item: &UnitItem,
    config: &PackingConfig,
) -> Option<Placement> {
    if !pallet.can_carry(item.weight, config.general_epsilon) {
        return None;
    }

    let footprints = item.orientation.candidates(item.nominal_footprint());
    let xs = candidate_x_levels(pallet, config);
    let ys = candidate_y_levels(pallet, config);
    let zs = candidate_z_levels(pallet, config);

    for &z in &zs {
        for &y in &ys {
            for &x in &xs {
                let position = Vec3::new(x, y, z);
                for footprint in &footprints {
                    let size = footprint.with_height(item.height());
                    if can_place(pallet, position, size, item.weight, config) {
                        trace!(
                            item = %item.name,
                            sub_id = item.sub_id,
                            x,
                            y,
                            z,
                            "skyline candidate accepted"
                        );
                        return Some(Placement {
                            position,
                            footprint: *footprint,
                        });
                    }
                }
            }
        }
    }

    None
}

/// How a column joined the shelf layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShelfFit {
    /// Placed at the cursor, to the right of the previous column.
    ContinueRow,
    /// Started a new row behind the current one.
    NewRow,
}

impl ShelfCursor {
    /// Cursor of a pallet that was just opened with one column at the origin.
    pub fn after_first(footprint: Footprint) -> Self {
        Self {
            cursor_x: footprint.width,
            cursor_y: 0.0,
            row_height: footprint.depth,
        }
    }

    /// Where `footprint` would go, if anywhere, on a pallet of `width` × `depth`.
    pub fn probe(
        &self,
        footprint: Footprint,
        width: f64,
        depth: f64,
        epsilon: f64,
    ) -> Option<(Vec3, ShelfFit)> {
        if self.cursor_x + footprint.width <= width + epsilon
            && self.cursor_y + footprint.depth <= depth + epsilon
        {
            return Some((
                Vec3::new(self.cursor_x, self.cursor_y, 0.0),
                ShelfFit::ContinueRow,
            ));
        }

        let next_row = self.cursor_y + self.row_height;
        if footprint.width <= width + epsilon && next_row + footprint.depth <= depth + epsilon {
            return Some((Vec3::new(0.0, next_row, 0.0), ShelfFit::NewRow));
        }

        None
    }

    /// Moves the cursor past a committed column.
    pub fn advance(&mut self, fit: ShelfFit, footprint: Footprint) {
        match fit {
            ShelfFit::ContinueRow => {
                self.cursor_x += footprint.width;
                self.row_height = self.row_height.max(footprint.depth);
            }
            ShelfFit::NewRow => {
                self.cursor_y += self.row_height;
                self.cursor_x = footprint.width;
                self.row_height = footprint.depth;
            }
        }
    }
}

/// A shelf slot for a column.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShelfSlot {
    /// Position and footprint of the base column.
    pub placement: Placement,
    pub fit: ShelfFit,
    /// Outline of base and rider; the cursor advances by this.
    pub envelope: Footprint,
}

/// Finds a shelf slot for a column on one pallet.
///
/// Each allowed footprint is tried in order, first in the current row, then in
/// a new row. The cursor reserves the whole envelope, so a rider wider than its
/// base stays inside the pallet and clear of its neighbours. Rows that were
/// left behind are never revisited.
pub fn find_shelf_position(
    pallet: &Pallet,
    block: &ColumnBlock,
    config: &PackingConfig,
) -> Option<ShelfSlot> {
    if !pallet.can_carry(block.total_weight(), config.general_epsilon) {
        return None;
    }
    if block.stack_height() > pallet.spec.max_height + config.general_epsilon {
        return None;
    }

    for footprint in block.allowed_footprints() {
        let envelope = block.envelope_for(footprint);
        if let Some((corner, fit)) = pallet.cursor.probe(
            envelope,
            pallet.spec.max_width,
            pallet.spec.max_depth,
            config.general_epsilon,
        ) {
            return Some(ShelfSlot {
                placement: Placement {
                    position: corner + block.base_offset_for(footprint),
                    footprint,
                },
                fit,
                envelope,
            });
        }
    }

    None
}

/// Footprint for a carton or column forced onto a fresh pallet.
///
/// Nominal unless only the transposed one fits; fixed policies keep their
/// pinned footprint. On non-square pallets the depth decides as well.
pub fn new_pallet_footprint(
    candidates: &[Footprint],
    max_width: f64,
    max_depth: f64,
    epsilon: f64,
) -> Option<Footprint> {
    let first = *candidates.first()?;
    if first.fits_in(max_width, max_depth, epsilon) {
        return Some(first);
    }
    let turned = candidates
        .get(1)
        .copied()
        .filter(|fp| fp.width <= max_width + epsilon);
    match turned {
        Some(fp) if fp.fits_in(max_width, max_depth, epsilon) => Some(fp),
        Some(fp) if first.width > max_width + epsilon => Some(fp),
        _ => Some(first),
    }
}
