//! Data models for pallet planning.
//!
//! - `UnitItem`: a single carton expanded from an input row
//! - `ColumnBlock`: a vertical stack of identical cartons, optionally carrying a rider
//! - `PlacedBlock`: a column with its resolved position on a pallet
//! - `PalletSpec` / `Pallet`: the limits of a pallet and its current load

use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use utoipa::ToSchema;

use crate::error::{PackingError, Result};
use crate::types::{BoundingBox, Dimensional, Footprint, Positioned, Vec3, Weighted};

fn validate_dimension(value: f64, name: &str) -> Result<()> {
    if value <= 0.0 || !value.is_finite() {
        return Err(PackingError::InvalidPallet(format!(
            "{} must be positive, got: {}",
            name, value
        )));
    }
    Ok(())
}

/// How a carton may be turned about the vertical axis.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum OrientationPolicy {
    /// Nominal footprint first, transposed if that is what fits.
    #[default]
    Auto,
    /// Always the nominal footprint (width along X).
    WidthFixed,
    /// Always the transposed footprint (depth along X).
    DepthFixed,
}

impl OrientationPolicy {
    pub fn allows_rotation(self) -> bool {
        matches!(self, OrientationPolicy::Auto)
    }

    /// The footprint a fixed policy pins the carton to. `Auto` keeps the nominal one.
    pub fn resolve(self, nominal: Footprint) -> Footprint {
        match self {
            OrientationPolicy::DepthFixed => nominal.transposed(),
            OrientationPolicy::Auto | OrientationPolicy::WidthFixed => nominal,
        }
    }

    /// Footprints to try, in order.
    pub fn candidates(self, nominal: Footprint) -> Vec<Footprint> {
        if self.allows_rotation() && !nominal.is_square() {
            vec![nominal, nominal.transposed()]
        } else {
            vec![self.resolve(nominal)]
        }
    }

    /// Parses the canonical names plus the labels used by existing order sheets.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "auto" | "自動" => Some(OrientationPolicy::Auto),
            "width-fixed" | "width_fixed" | "横固定" => Some(OrientationPolicy::WidthFixed),
            "depth-fixed" | "depth_fixed" | "縦固定" => Some(OrientationPolicy::DepthFixed),
            _ => None,
        }
    }
}

/// A validated product line.
#[derive(Clone, Debug, PartialEq)]
pub struct ProductRow {
    /// Position of the row in the input (0-based); the stable tie-break.
    pub index: usize,
    pub name: String,
    pub width: f64,
    pub depth: f64,
    pub height: f64,
    pub weight: f64,
    pub quantity: u32,
    pub priority: i32,
    pub orientation: OrientationPolicy,
}

/// A single carton.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UnitItem {
    pub name: String,
    pub product_index: usize,
    /// 1-based sequence number within its product.
    pub sub_id: usize,
    /// Nominal width, depth, height.
    pub dims: Vec3,
    pub weight: f64,
    pub orientation: OrientationPolicy,
    pub priority: i32,
    pub color: String,
}

impl UnitItem {
    #[inline]
    pub fn nominal_footprint(&self) -> Footprint {
        Footprint::new(self.dims.x, self.dims.y)
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.dims.z
    }
}

impl Weighted for UnitItem {
    fn weight(&self) -> f64 {
        self.weight
    }
}

/// A vertical stack of identical cartons treated as one placement unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ColumnBlock {
    pub name: String,
    pub product_index: usize,
    /// Sub ids of the cartons in this column, bottom to top.
    pub unit_ids: Vec<usize>,
    pub unit_dims: Vec3,
    pub unit_weight: f64,
    /// Resolved footprint; always the nominal one or its transpose.
    pub footprint: Footprint,
    pub layers: u32,
    pub height_total: f64,
    pub weight_total: f64,
    pub priority: i32,
    pub orientation: OrientationPolicy,
    pub color: String,
    /// Rider column stacked on top.
    #[schema(value_type = Object)]
    pub child: Option<Box<ColumnBlock>>,
}

impl ColumnBlock {
    /// Builds a column from `template`'s product with the given cartons.
    pub fn stack(template: &UnitItem, unit_ids: Vec<usize>) -> Self {
        let layers = unit_ids.len() as u32;
        Self {
            name: template.name.clone(),
            product_index: template.product_index,
            unit_ids,
            unit_dims: template.dims,
            unit_weight: template.weight,
            footprint: template
                .orientation
                .resolve(template.nominal_footprint()),
            layers,
            height_total: f64::from(layers) * template.height(),
            weight_total: f64::from(layers) * template.weight,
            priority: template.priority,
            orientation: template.orientation,
            color: template.color.clone(),
            child: None,
        }
    }

    /// A one-layer column for a carton placed on its own.
    pub fn single(unit: &UnitItem, footprint: Footprint) -> Self {
        let mut block = Self::stack(unit, vec![unit.sub_id]);
        block.footprint = footprint;
        block
    }

    #[inline]
    pub fn nominal_footprint(&self) -> Footprint {
        Footprint::new(self.unit_dims.x, self.unit_dims.y)
    }

    pub fn min_sub_id(&self) -> usize {
        self.unit_ids.iter().copied().min().unwrap_or(0)
    }

    /// Height of the column including its rider.
    pub fn stack_height(&self) -> f64 {
        self.height_total + self.child.as_ref().map_or(0.0, |c| c.stack_height())
    }

    /// Weight of the column including its rider.
    pub fn total_weight(&self) -> f64 {
        self.weight_total + self.child.as_ref().map_or(0.0, |c| c.total_weight())
    }

    pub fn unit_count(&self) -> usize {
        self.unit_ids.len() + self.child.as_ref().map_or(0, |c| c.unit_count())
    }

    pub fn is_rotated(&self) -> bool {
        let nominal = self.nominal_footprint();
        !nominal.is_square() && self.footprint == nominal.transposed()
    }

    /// Footprints the assignment may try for this column, in order.
    ///
    /// A rider with a fixed policy pins the whole column to its current footprint.
    pub fn allowed_footprints(&self) -> Vec<Footprint> {
        let rider_turns = self
            .child
            .as_ref()
            .is_none_or(|c| c.orientation.allows_rotation());
        if rider_turns {
            self.orientation.candidates(self.nominal_footprint())
        } else {
            vec![self.footprint]
        }
    }

    /// Rider footprint once the base faces `footprint`.
    fn rider_footprint_for(&self, footprint: Footprint) -> Option<Footprint> {
        self.child.as_ref().map(|child| {
            if footprint == self.footprint {
                child.footprint
            } else {
                child.footprint.transposed()
            }
        })
    }

    /// Outline of the base and its centred rider when the base faces `footprint`.
    pub fn envelope_for(&self, footprint: Footprint) -> Footprint {
        match self.rider_footprint_for(footprint) {
            Some(rider) => Footprint::new(
                footprint.width.max(rider.width),
                footprint.depth.max(rider.depth),
            ),
            None => footprint,
        }
    }

    pub fn envelope(&self) -> Footprint {
        self.envelope_for(self.footprint)
    }

    /// Offset of the base from the corner of its envelope.
    pub fn base_offset_for(&self, footprint: Footprint) -> Vec3 {
        let envelope = self.envelope_for(footprint);
        Vec3::new(
            (envelope.width - footprint.width) / 2.0,
            (envelope.depth - footprint.depth) / 2.0,
            0.0,
        )
    }

    /// Turns the column to `footprint`; an attached rider turns with it.
    pub fn rotate_to(&mut self, footprint: Footprint) {
        if self.footprint == footprint {
            return;
        }
        self.footprint = footprint;
        if let Some(child) = self.child.as_mut() {
            let turned = child.footprint.transposed();
            child.footprint = turned;
        }
    }
}

impl Weighted for ColumnBlock {
    fn weight(&self) -> f64 {
        self.total_weight()
    }
}

/// Where a rider ended up.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RiderPlacement {
    pub position: Vec3,
    pub footprint: Footprint,
    pub rotated: bool,
}

/// A column with its position on a pallet.
///
/// `rotated` and `rider` are derived from the block and its position and are
/// recomputed whenever the column moves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PlacedBlock {
    pub block: ColumnBlock,
    pub position: Vec3,
    #[serde(default)]
    pub rotated: bool,
    #[serde(default)]
    pub rider: Option<RiderPlacement>,
}

impl PlacedBlock {
    pub fn new(block: ColumnBlock, position: Vec3) -> Self {
        let mut placed = Self {
            block,
            position,
            rotated: false,
            rider: None,
        };
        placed.sync_layout();
        placed
    }

    /// Moves the column and its rider to `position`.
    pub fn relocate(&mut self, position: Vec3) {
        self.position = position;
        self.sync_layout();
    }

    /// Recomputes the derived orientation and rider placement.
    pub fn sync_layout(&mut self) {
        self.rotated = self.block.is_rotated();
        self.rider = self.block.child.as_ref().map(|child| RiderPlacement {
            position: Vec3::new(
                self.position.x + (self.block.footprint.width - child.footprint.width) / 2.0,
                self.position.y + (self.block.footprint.depth - child.footprint.depth) / 2.0,
                self.position.z + self.block.height_total,
            ),
            footprint: child.footprint,
            rotated: child.is_rotated(),
        });
    }

    pub fn top_z(&self) -> f64 {
        self.position.z + self.block.stack_height()
    }

    /// Right edge of the envelope, rider overhang included.
    pub fn right_edge(&self) -> f64 {
        let offset = self.block.base_offset_for(self.block.footprint);
        self.position.x + self.block.footprint.width + offset.x
    }

    /// Far edge of the envelope, rider overhang included.
    pub fn far_edge(&self) -> f64 {
        let offset = self.block.base_offset_for(self.block.footprint);
        self.position.y + self.block.footprint.depth + offset.y
    }

    /// Boxes of the base column and, if present, of the rider.
    pub fn parts(&self) -> Vec<BoundingBox> {
        let mut parts = vec![BoundingBox::from_position_and_dims(
            self.position,
            self.block.footprint.with_height(self.block.height_total),
        )];
        if let (Some(rider), Some(child)) = (self.rider, self.block.child.as_ref()) {
            parts.push(BoundingBox::from_position_and_dims(
                rider.position,
                rider.footprint.with_height(child.height_total),
            ));
        }
        parts
    }
}

impl Positioned for PlacedBlock {
    fn position(&self) -> Vec3 {
        self.position
    }
}

impl Dimensional for PlacedBlock {
    fn dimensions(&self) -> Vec3 {
        self.block.footprint.with_height(self.block.stack_height())
    }
}

impl Weighted for PlacedBlock {
    fn weight(&self) -> f64 {
        self.block.total_weight()
    }
}

/// Limits of a pallet.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(
    example = json!({
        "max_width": 1100.0,
        "max_depth": 1100.0,
        "max_height": 1700.0,
        "max_weight": 1000.0,
        "overhang_tolerance": 30.0
    })
)]
pub struct PalletSpec {
    pub max_width: f64,
    pub max_depth: f64,
    pub max_height: f64,
    pub max_weight: f64,
    /// How far a rider may exceed its base on each side.
    #[serde(default = "PalletSpec::default_overhang")]
    pub overhang_tolerance: f64,
}

impl PalletSpec {
    pub const DEFAULT_OVERHANG_TOLERANCE: f64 = 30.0;

    fn default_overhang() -> f64 {
        Self::DEFAULT_OVERHANG_TOLERANCE
    }

    /// Creates a spec with the default overhang tolerance.
    pub fn new(max_width: f64, max_depth: f64, max_height: f64, max_weight: f64) -> Result<Self> {
        let spec = Self {
            max_width,
            max_depth,
            max_height,
            max_weight,
            overhang_tolerance: Self::DEFAULT_OVERHANG_TOLERANCE,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Builder-style override of the overhang tolerance.
    pub fn with_overhang(mut self, tolerance: f64) -> Result<Self> {
        self.overhang_tolerance = tolerance;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        validate_dimension(self.max_width, "Pallet width")?;
        validate_dimension(self.max_depth, "Pallet depth")?;
        validate_dimension(self.max_height, "Pallet height")?;
        validate_dimension(self.max_weight, "Pallet max weight")?;
        if self.overhang_tolerance < 0.0 || !self.overhang_tolerance.is_finite() {
            return Err(PackingError::InvalidPallet(format!(
                "Overhang tolerance must not be negative, got: {}",
                self.overhang_tolerance
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn dims(&self) -> Vec3 {
        Vec3::new(self.max_width, self.max_depth, self.max_height)
    }

    /// Instantiates an empty pallet based on this spec.
    pub fn instantiate(&self, id: usize) -> Pallet {
        Pallet {
            id,
            spec: *self,
            placed: Vec::new(),
            cursor: ShelfCursor::default(),
        }
    }
}

/// Row state of the shelf packer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ShelfCursor {
    pub cursor_x: f64,
    pub cursor_y: f64,
    pub row_height: f64,
}

/// A pallet and its load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Pallet {
    /// 1-based number in creation order.
    pub id: usize,
    pub spec: PalletSpec,
    pub placed: Vec<PlacedBlock>,
    #[serde(default)]
    pub cursor: ShelfCursor,
}

impl Pallet {
    pub fn total_weight(&self) -> f64 {
        self.placed.iter().map(|p| p.weight()).sum()
    }

    pub fn remaining_weight(&self) -> f64 {
        self.spec.max_weight - self.total_weight()
    }

    /// Weight check that precedes every geometric search.
    pub fn can_carry(&self, weight: f64, epsilon: f64) -> bool {
        self.remaining_weight() + epsilon >= weight
    }

    /// Volume of the cartons, each part with its own footprint.
    pub fn used_volume(&self) -> f64 {
        self.placed
            .iter()
            .flat_map(|p| p.parts())
            .map(|part| part.dimensions().volume())
            .sum()
    }

    /// Volume usage in percent (0.0 to 100.0).
    pub fn utilization_percent(&self) -> f64 {
        let total = self.spec.dims().volume();
        if total <= 0.0 {
            return 0.0;
        }
        (self.used_volume() / total) * 100.0
    }

    pub fn unit_count(&self) -> usize {
        self.placed.iter().map(|p| p.block.unit_count()).sum()
    }

    /// Rightmost occupied X coordinate, optionally ignoring one column.
    pub fn rightmost_edge(&self, ignore: Option<usize>) -> f64 {
        self.placed
            .iter()
            .enumerate()
            .filter(|(idx, _)| Some(*idx) != ignore)
            .map(|(_, p)| p.right_edge())
            .fold(0.0, f64::max)
    }

    pub fn is_empty(&self) -> bool {
        self.placed.is_empty()
    }
}
