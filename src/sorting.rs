//! Deterministic processing order.
//!
//! Both orders are part of the observable result: priority first (higher wins),
//! then larger footprint, then taller, then input order.

use std::cmp::Ordering;

use crate::model::{ColumnBlock, UnitItem};

/// Key shared by cartons and columns.
#[derive(Clone, Copy, Debug)]
struct SortKey {
    priority: i32,
    footprint_area: f64,
    height: f64,
    product_index: usize,
    sub_id: usize,
}

impl SortKey {
    fn compare(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.footprint_area.total_cmp(&self.footprint_area))
            .then_with(|| other.height.total_cmp(&self.height))
            .then_with(|| self.product_index.cmp(&other.product_index))
            .then_with(|| self.sub_id.cmp(&other.sub_id))
    }
}

fn unit_key(item: &UnitItem) -> SortKey {
    SortKey {
        priority: item.priority,
        footprint_area: item.nominal_footprint().area(),
        height: item.height(),
        product_index: item.product_index,
        sub_id: item.sub_id,
    }
}

fn block_key(block: &ColumnBlock) -> SortKey {
    SortKey {
        priority: block.priority,
        footprint_area: block.footprint.area(),
        height: block.stack_height(),
        product_index: block.product_index,
        sub_id: block.min_sub_id(),
    }
}

/// Orders cartons for the skyline flow.
pub fn compare_units(a: &UnitItem, b: &UnitItem) -> Ordering {
    unit_key(a).compare(&unit_key(b))
}

/// Orders columns for rider merging and shelf assignment.
pub fn compare_blocks(a: &ColumnBlock, b: &ColumnBlock) -> Ordering {
    block_key(a).compare(&block_key(b))
}

pub fn sort_units(units: &mut [UnitItem]) {
    units.sort_by(compare_units);
}

pub fn sort_blocks(blocks: &mut [ColumnBlock]) {
    blocks.sort_by(compare_blocks);
}
