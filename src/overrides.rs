//! Manual corrections to a finished load.
//!
//! A planner may move one placed column to the floor of another pallet, on top
//! of another column, or onto a new pallet. Every rule is checked before the
//! load is touched, so a rejected move leaves it exactly as it was.

use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::error::{PackingError, Result};
use crate::model::{Pallet, PlacedBlock};
use crate::optimizer::PackingConfig;
use crate::types::Vec3;

/// Marker for "open a new pallet".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum NewPallet {
    New,
}

/// Where a moved column goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum Destination {
    /// Id of an existing pallet.
    Pallet(usize),
    New(NewPallet),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(
    example = json!({
        "source_pallet": 1,
        "source_index": 0,
        "destination": 2,
        "destination_base": 1
    })
)]
pub struct MoveRequest {
    /// Id of the pallet the column is on.
    pub source_pallet: usize,
    /// Index of the column in that pallet's `placed` list.
    pub source_index: usize,
    pub destination: Destination,
    /// Column on the destination pallet to stack onto; floor placement when absent.
    #[serde(default)]
    pub destination_base: Option<usize>,
}

fn pallet_index(pallets: &[Pallet], id: usize) -> Result<usize> {
    pallets
        .iter()
        .position(|p| p.id == id)
        .ok_or(PackingError::UnknownPallet(id))
}

/// Position of `moving` on top of `base`, centred and kept inside the pallet.
fn stacked_position(
    pallet: &Pallet,
    base: &PlacedBlock,
    moving: &PlacedBlock,
    config: &PackingConfig,
) -> Result<Vec3> {
    let base_area = base.block.footprint.area();
    let moved_area = moving.block.footprint.area();
    if base_area + config.general_epsilon < config.stack_support_ratio * moved_area {
        return Err(PackingError::UnstableStack {
            base_area,
            moved_area,
            required_ratio: config.stack_support_ratio,
        });
    }

    let fp = moving.block.footprint;
    let offset = moving.block.base_offset_for(fp);
    let centred_x = base.position.x + (base.block.footprint.width - fp.width) / 2.0;
    let centred_y = base.position.y + (base.block.footprint.depth - fp.depth) / 2.0;
    Ok(Vec3::new(
        centred_x
            .min(pallet.spec.max_width - fp.width - offset.x)
            .max(offset.x),
        centred_y
            .min(pallet.spec.max_depth - fp.depth - offset.y)
            .max(offset.y),
        base.top_z(),
    ))
}

/// Position of `moving` on the floor, right of everything else.
fn floor_position(
    pallet: &Pallet,
    ignore: Option<usize>,
    moving: &PlacedBlock,
    config: &PackingConfig,
) -> Result<Vec3> {
    let x = pallet.rightmost_edge(ignore);
    let required = x + moving.block.envelope().width;
    if required > pallet.spec.max_width + config.general_epsilon {
        return Err(PackingError::NoFloorSpace {
            required,
            max_width: pallet.spec.max_width,
        });
    }
    let offset = moving.block.base_offset_for(moving.block.footprint);
    Ok(Vec3::new(x + offset.x, offset.y, 0.0))
}

fn check_limits(
    pallet: &Pallet,
    position: Vec3,
    moving: &PlacedBlock,
    already_on_pallet: bool,
    config: &PackingConfig,
) -> Result<()> {
    let height = position.z + moving.block.stack_height();
    if height > pallet.spec.max_height + config.general_epsilon {
        return Err(PackingError::HeightExceeded {
            height,
            max_height: pallet.spec.max_height,
        });
    }

    let mut weight = pallet.total_weight();
    if !already_on_pallet {
        weight += moving.block.total_weight();
    }
    if weight > pallet.spec.max_weight + config.general_epsilon {
        return Err(PackingError::WeightExceeded {
            weight,
            max_weight: pallet.spec.max_weight,
        });
    }
    Ok(())
}

/// Moves one placed column.
///
/// On success the column leaves its source pallet and is appended to the
/// destination; pallets left empty are dropped and the rest renumbered 1..n.
///
/// # Errors
/// `UnknownPallet`/`UnknownItem` for bad references, `InvalidMove` for a
/// column stacked onto itself or a base given with a new pallet, and
/// `UnstableStack`, `NoFloorSpace`, `HeightExceeded`, `WeightExceeded` when
/// the target spot breaks a rule.
pub fn move_block(
    pallets: &mut Vec<Pallet>,
    request: &MoveRequest,
    config: &PackingConfig,
) -> Result<()> {
    let src = pallet_index(pallets, request.source_pallet)?;
    let moving = pallets[src]
        .placed
        .get(request.source_index)
        .cloned()
        .ok_or(PackingError::UnknownItem {
            pallet: request.source_pallet,
            index: request.source_index,
        })?;

    let (dst, position) = match request.destination {
        Destination::New(_) => {
            if request.destination_base.is_some() {
                return Err(PackingError::InvalidMove(
                    "a new pallet has no column to stack onto".to_string(),
                ));
            }
            let fresh = pallets[src].spec.instantiate(pallets.len() + 1);
            let position = floor_position(&fresh, None, &moving, config)?;
            check_limits(&fresh, position, &moving, false, config)?;
            (None, position)
        }
        Destination::Pallet(id) => {
            let dst = pallet_index(pallets, id)?;
            let pallet = &pallets[dst];
            let ignore = (dst == src).then_some(request.source_index);

            let position = match request.destination_base {
                Some(base_index) if Some(base_index) == ignore => {
                    return Err(PackingError::InvalidMove(
                        "a column cannot be stacked onto itself".to_string(),
                    ));
                }
                Some(base_index) => {
                    let base = pallet.placed.get(base_index).ok_or(PackingError::UnknownItem {
                        pallet: id,
                        index: base_index,
                    })?;
                    stacked_position(pallet, base, &moving, config)?
                }
                None => floor_position(pallet, ignore, &moving, config)?,
            };
            check_limits(pallet, position, &moving, dst == src, config)?;
            (Some(dst), position)
        }
    };

    let mut placed = pallets[src].placed.remove(request.source_index);
    placed.relocate(position);
    match dst {
        Some(dst) => pallets[dst].placed.push(placed),
        None => {
            let mut fresh = pallets[src].spec.instantiate(pallets.len() + 1);
            fresh.placed.push(placed);
            pallets.push(fresh);
        }
    }
    debug!(
        from = request.source_pallet,
        index = request.source_index,
        x = position.x,
        y = position.y,
        z = position.z,
        "moved column"
    );

    let before = pallets.len();
    pallets.retain(|p| !p.is_empty());
    for (idx, pallet) in pallets.iter_mut().enumerate() {
        pallet.id = idx + 1;
        pallet.placed.iter_mut().for_each(PlacedBlock::sync_layout);
    }
    if pallets.len() != before {
        info!(dropped = before - pallets.len(), "dropped empty pallets after move");
    }
    Ok(())
}
