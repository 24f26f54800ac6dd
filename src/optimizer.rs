//! Pallet assignment: turns a list of cartons into a load of pallets.
//!
//! The run is a deterministic greedy pass. Cartons that can never stand on an
//! empty pallet are screened out first; everything else is placed on the first
//! pallet that takes it, and a new pallet is opened when none does.
//!
//! Two flows exist:
//! - `columns` (default): identical cartons are stacked into columns, short
//!   columns ride on taller ones, and the columns are laid out in shelf rows;
//! - `units`: cartons are placed one by one with the skyline search.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::columns::{build_columns, group_units, merge_riders};
use crate::error::{ErrorReport, PackingError, Result};
use crate::input::{RawProductRow, RawUnitOverride, expand_units, parse_overrides, parse_rows};
use crate::metrics::{PackingMetrics, summarize};
use crate::model::{ColumnBlock, Pallet, PalletSpec, PlacedBlock, ShelfCursor, UnitItem};
use crate::placement::{find_shelf_position, find_skyline_position, new_pallet_footprint};
use crate::sorting::{sort_blocks, sort_units};
use crate::types::{EPSILON_GENERAL, EPSILON_SUPPORT, Footprint, Vec3};

/// Which assignment flow a run uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PackingMode {
    /// Column building plus shelf rows.
    #[default]
    Columns,
    /// Carton-by-carton skyline search.
    Units,
}

impl PackingMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "columns" | "column" | "blocks" => Some(PackingMode::Columns),
            "units" | "unit" | "skyline" => Some(PackingMode::Units),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PackingMode::Columns => "columns",
            PackingMode::Units => "units",
        }
    }
}

/// Tolerances and switches of the planner.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PackingConfig {
    /// Numerical tolerance for bounds, weight and height comparisons.
    pub general_epsilon: f64,
    /// How far a supporter's top may be from the base of what it carries.
    pub support_epsilon: f64,
    /// Minimum base-to-moved area ratio for a manual stack.
    pub stack_support_ratio: f64,
    pub mode: PackingMode,
    /// Limit column layers so one column never exceeds the pallet weight.
    pub cap_layers_by_weight: bool,
}

impl PackingConfig {
    pub const DEFAULT_GENERAL_EPSILON: f64 = EPSILON_GENERAL;
    pub const DEFAULT_SUPPORT_EPSILON: f64 = EPSILON_SUPPORT;
    pub const DEFAULT_STACK_SUPPORT_RATIO: f64 = 0.7;
    pub const DEFAULT_CAP_LAYERS_BY_WEIGHT: bool = true;

    pub fn builder() -> PackingConfigBuilder {
        PackingConfigBuilder::default()
    }
}

impl Default for PackingConfig {
    fn default() -> Self {
        Self {
            general_epsilon: Self::DEFAULT_GENERAL_EPSILON,
            support_epsilon: Self::DEFAULT_SUPPORT_EPSILON,
            stack_support_ratio: Self::DEFAULT_STACK_SUPPORT_RATIO,
            mode: PackingMode::default(),
            cap_layers_by_weight: Self::DEFAULT_CAP_LAYERS_BY_WEIGHT,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PackingConfigBuilder {
    config: PackingConfig,
}

impl PackingConfigBuilder {
    pub fn general_epsilon(mut self, epsilon: f64) -> Self {
        self.config.general_epsilon = epsilon;
        self
    }

    pub fn support_epsilon(mut self, epsilon: f64) -> Self {
        self.config.support_epsilon = epsilon;
        self
    }

    pub fn stack_support_ratio(mut self, ratio: f64) -> Self {
        self.config.stack_support_ratio = ratio;
        self
    }

    pub fn mode(mut self, mode: PackingMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn cap_layers_by_weight(mut self, enabled: bool) -> Self {
        self.config.cap_layers_by_weight = enabled;
        self
    }

    pub fn build(self) -> PackingConfig {
        self.config
    }
}

/// Progress of a run, emitted in placement order for live views.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum PackEvent {
    PalletStarted {
        id: usize,
        max_width: f64,
        max_depth: f64,
        max_height: f64,
        max_weight: f64,
    },
    BlockPlaced {
        pallet_id: usize,
        name: String,
        unit_ids: Vec<usize>,
        position: Vec3,
        footprint: Footprint,
        rotated: bool,
        height: f64,
        weight: f64,
        rider: Option<String>,
        rider_position: Option<Vec3>,
        pallet_weight: f64,
    },
    ItemRejected {
        name: String,
        sub_id: usize,
        reason_code: String,
        reason_text: String,
    },
    Finished {
        pallets: usize,
        rejected: usize,
    },
}

/// Cartons of one product that were left off the load for the same reason.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct RejectedItem {
    pub name: String,
    pub product_index: usize,
    pub sub_ids: Vec<usize>,
    pub reason_code: String,
    pub reason: String,
}

/// Pallets and leftovers of the assignment step.
#[derive(Clone, Debug, PartialEq)]
pub struct PackingOutcome {
    pub pallets: Vec<Pallet>,
    pub rejected: Vec<RejectedItem>,
}

/// Everything a planning run produces.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct OptimizationResult {
    pub pallets: Vec<Pallet>,
    pub rejected: Vec<RejectedItem>,
    /// Rows and directives that were skipped because they could not be read.
    pub input_errors: Vec<ErrorReport>,
    pub metrics: PackingMetrics,
    pub is_complete: bool,
}

impl OptimizationResult {
    pub fn pallet_count(&self) -> usize {
        self.pallets.len()
    }

    pub fn rejected_units(&self) -> usize {
        self.rejected.iter().map(|r| r.sub_ids.len()).sum()
    }
}

/// Plans a load from raw rows and directives.
pub fn optimize(
    rows: &[RawProductRow],
    overrides: &[RawUnitOverride],
    spec: &PalletSpec,
    config: &PackingConfig,
) -> Result<OptimizationResult> {
    optimize_with_progress(rows, overrides, spec, config, |_| {})
}

/// Like [`optimize`], reporting each step through `on_event`.
pub fn optimize_with_progress(
    rows: &[RawProductRow],
    overrides: &[RawUnitOverride],
    spec: &PalletSpec,
    config: &PackingConfig,
    mut on_event: impl FnMut(&PackEvent),
) -> Result<OptimizationResult> {
    spec.validate()?;

    let (products, mut input_errors) = parse_rows(rows);
    let (directives, directive_errors) = parse_overrides(overrides, &products);
    input_errors.extend(directive_errors);
    for err in &input_errors {
        warn!(code = err.code(), "{err}");
    }

    let units = expand_units(&products, &directives);
    let outcome = pack_units(units, spec, config, &mut on_event);
    let metrics = summarize(&outcome.pallets);

    info!(
        mode = config.mode.as_str(),
        products = products.len(),
        pallets = outcome.pallets.len(),
        rejected = outcome.rejected.len(),
        input_errors = input_errors.len(),
        "planning finished"
    );

    Ok(OptimizationResult {
        is_complete: outcome.rejected.is_empty(),
        pallets: outcome.pallets,
        rejected: outcome.rejected,
        input_errors: input_errors.iter().map(ErrorReport::from).collect(),
        metrics,
    })
}

/// Assigns already expanded cartons to pallets.
pub fn pack_units(
    units: Vec<UnitItem>,
    spec: &PalletSpec,
    config: &PackingConfig,
    mut on_event: impl FnMut(&PackEvent),
) -> PackingOutcome {
    let mut rejected = Vec::new();
    let mut accepted = Vec::with_capacity(units.len());
    for unit in units {
        match screen_unit(&unit, spec, config) {
            Some(err) => reject(&mut rejected, &unit, &err, &mut on_event),
            None => accepted.push(unit),
        }
    }

    let mut pallets = Vec::new();
    match config.mode {
        PackingMode::Columns => {
            let mut blocks: Vec<ColumnBlock> = group_units(&accepted)
                .iter()
                .flat_map(|group| build_columns(group, spec, config))
                .collect();
            sort_blocks(&mut blocks);
            for block in merge_riders(blocks, spec, config) {
                place_column(&mut pallets, block, spec, config, &mut on_event);
            }
        }
        PackingMode::Units => {
            sort_units(&mut accepted);
            for unit in &accepted {
                place_unit(&mut pallets, unit, spec, config, &mut on_event);
            }
        }
    }

    on_event(&PackEvent::Finished {
        pallets: pallets.len(),
        rejected: rejected.iter().map(|r: &RejectedItem| r.sub_ids.len()).sum(),
    });
    PackingOutcome { pallets, rejected }
}

/// Reason a carton can never be placed, even alone on an empty pallet.
fn screen_unit(unit: &UnitItem, spec: &PalletSpec, config: &PackingConfig) -> Option<PackingError> {
    let eps = config.general_epsilon;
    let oversize = |detail: String| PackingError::OversizeItem {
        name: unit.name.clone(),
        detail,
    };

    if unit.height() > spec.max_height + eps {
        return Some(oversize(format!(
            "height {} mm exceeds pallet height {} mm",
            unit.height(),
            spec.max_height
        )));
    }
    let footprints = unit.orientation.candidates(unit.nominal_footprint());
    if !footprints
        .iter()
        .any(|fp| fp.fits_in(spec.max_width, spec.max_depth, eps))
    {
        return Some(oversize(format!(
            "footprint {} × {} mm does not fit {} × {} mm",
            unit.dims.x, unit.dims.y, spec.max_width, spec.max_depth
        )));
    }
    if unit.weight > spec.max_weight + eps {
        return Some(oversize(format!(
            "weight {} kg exceeds pallet limit {} kg",
            unit.weight, spec.max_weight
        )));
    }
    None
}

fn reject(
    rejected: &mut Vec<RejectedItem>,
    unit: &UnitItem,
    err: &PackingError,
    on_event: &mut impl FnMut(&PackEvent),
) {
    let reason = err.to_string();
    debug!(item = %unit.name, sub_id = unit.sub_id, code = err.code(), "rejected");
    on_event(&PackEvent::ItemRejected {
        name: unit.name.clone(),
        sub_id: unit.sub_id,
        reason_code: err.code().to_string(),
        reason_text: reason.clone(),
    });

    match rejected
        .iter_mut()
        .find(|r| r.product_index == unit.product_index && r.reason == reason)
    {
        Some(entry) => entry.sub_ids.push(unit.sub_id),
        None => rejected.push(RejectedItem {
            name: unit.name.clone(),
            product_index: unit.product_index,
            sub_ids: vec![unit.sub_id],
            reason_code: err.code().to_string(),
            reason,
        }),
    }
}

fn start_pallet(
    pallets: &[Pallet],
    spec: &PalletSpec,
    on_event: &mut impl FnMut(&PackEvent),
) -> Pallet {
    let pallet = spec.instantiate(pallets.len() + 1);
    debug!(pallet = pallet.id, "opened pallet");
    on_event(&PackEvent::PalletStarted {
        id: pallet.id,
        max_width: spec.max_width,
        max_depth: spec.max_depth,
        max_height: spec.max_height,
        max_weight: spec.max_weight,
    });
    pallet
}

fn commit(
    pallet: &mut Pallet,
    block: ColumnBlock,
    position: Vec3,
    on_event: &mut impl FnMut(&PackEvent),
) {
    let placed = PlacedBlock::new(block, position);
    let event = PackEvent::BlockPlaced {
        pallet_id: pallet.id,
        name: placed.block.name.clone(),
        unit_ids: placed.block.unit_ids.clone(),
        position,
        footprint: placed.block.footprint,
        rotated: placed.rotated,
        height: placed.block.stack_height(),
        weight: placed.block.total_weight(),
        rider: placed.block.child.as_ref().map(|c| c.name.clone()),
        rider_position: placed.rider.map(|r| r.position),
        pallet_weight: pallet.total_weight() + placed.block.total_weight(),
    };
    pallet.placed.push(placed);
    on_event(&event);
}

fn place_column(
    pallets: &mut Vec<Pallet>,
    mut block: ColumnBlock,
    spec: &PalletSpec,
    config: &PackingConfig,
    on_event: &mut impl FnMut(&PackEvent),
) {
    for pallet in pallets.iter_mut() {
        if let Some(slot) = find_shelf_position(pallet, &block, config) {
            block.rotate_to(slot.placement.footprint);
            pallet.cursor.advance(slot.fit, slot.envelope);
            debug!(
                pallet = pallet.id,
                column = %block.name,
                fit = ?slot.fit,
                x = slot.placement.position.x,
                y = slot.placement.position.y,
                "column placed on shelf"
            );
            commit(pallet, block, slot.placement.position, on_event);
            return;
        }
    }

    let candidates = block.allowed_footprints();
    let envelopes: Vec<Footprint> = candidates.iter().map(|fp| block.envelope_for(*fp)).collect();
    let footprint = new_pallet_footprint(
        &envelopes,
        spec.max_width,
        spec.max_depth,
        config.general_epsilon,
    )
    .and_then(|chosen| envelopes.iter().position(|e| *e == chosen))
    .and_then(|i| candidates.get(i).copied())
    .unwrap_or(block.footprint);
    block.rotate_to(footprint);
    if block.total_weight() > spec.max_weight + config.general_epsilon {
        warn!(
            column = %block.name,
            weight = block.total_weight(),
            max_weight = spec.max_weight,
            "column alone exceeds the pallet weight limit"
        );
    }

    let mut pallet = start_pallet(pallets, spec, on_event);
    pallet.cursor = ShelfCursor::after_first(block.envelope());
    let position = block.base_offset_for(footprint);
    commit(&mut pallet, block, position, on_event);
    pallets.push(pallet);
}

fn place_unit(
    pallets: &mut Vec<Pallet>,
    unit: &UnitItem,
    spec: &PalletSpec,
    config: &PackingConfig,
    on_event: &mut impl FnMut(&PackEvent),
) {
    for pallet in pallets.iter_mut() {
        if let Some(placement) = find_skyline_position(pallet, unit, config) {
            let block = ColumnBlock::single(unit, placement.footprint);
            commit(pallet, block, placement.position, on_event);
            return;
        }
    }

    let nominal = unit.nominal_footprint();
    let footprint = new_pallet_footprint(
        &unit.orientation.candidates(nominal),
        spec.max_width,
        spec.max_depth,
        config.general_epsilon,
    )
    .unwrap_or_else(|| unit.orientation.resolve(nominal));

    let mut pallet = start_pallet(pallets, spec, on_event);
    commit(
        &mut pallet,
        ColumnBlock::single(unit, footprint),
        Vec3::zero(),
        on_event,
    );
    pallets.push(pallet);
}
