//! Load summaries for shipping documents.

use serde::Serialize;
use utoipa::ToSchema;

use crate::model::{ColumnBlock, Pallet};

/// Pallets a 4-ton truck carries.
pub const PALLETS_PER_4T_TRUCK: usize = 10;
/// Pallets a 10-ton truck carries.
pub const PALLETS_PER_10T_TRUCK: usize = 16;

#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct ProductTally {
    pub name: String,
    pub columns: usize,
    pub units: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct PalletSummary {
    pub id: usize,
    pub weight: f64,
    pub column_count: usize,
    pub unit_count: usize,
    pub utilization_percent: f64,
    /// Per product, in order of first appearance on the pallet.
    pub products: Vec<ProductTally>,
}

/// Either truck size alone, not a mix.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct TruckEstimate {
    pub trucks_4t: usize,
    pub trucks_10t: usize,
}

impl TruckEstimate {
    pub fn for_pallets(pallets: usize) -> Self {
        Self {
            trucks_4t: pallets.div_ceil(PALLETS_PER_4T_TRUCK),
            trucks_10t: pallets.div_ceil(PALLETS_PER_10T_TRUCK),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct PackingMetrics {
    pub pallet_count: usize,
    pub total_weight: f64,
    pub total_units: usize,
    pub average_utilization: f64,
    pub pallets: Vec<PalletSummary>,
    pub trucks: TruckEstimate,
}

fn tally_block(tallies: &mut Vec<ProductTally>, block: &ColumnBlock) {
    match tallies.iter_mut().find(|t| t.name == block.name) {
        Some(tally) => {
            tally.columns += 1;
            tally.units += block.unit_ids.len();
        }
        None => tallies.push(ProductTally {
            name: block.name.clone(),
            columns: 1,
            units: block.unit_ids.len(),
        }),
    }
    if let Some(child) = block.child.as_deref() {
        tally_block(tallies, child);
    }
}

fn summarize_pallet(pallet: &Pallet) -> PalletSummary {
    let mut products = Vec::new();
    for placed in &pallet.placed {
        tally_block(&mut products, &placed.block);
    }
    PalletSummary {
        id: pallet.id,
        weight: pallet.total_weight(),
        column_count: pallet.placed.len(),
        unit_count: pallet.unit_count(),
        utilization_percent: pallet.utilization_percent(),
        products,
    }
}

/// Summarizes a finished (or manually edited) load.
pub fn summarize(pallets: &[Pallet]) -> PackingMetrics {
    let summaries: Vec<PalletSummary> = pallets.iter().map(summarize_pallet).collect();
    let average_utilization = if summaries.is_empty() {
        0.0
    } else {
        summaries.iter().map(|s| s.utilization_percent).sum::<f64>() / summaries.len() as f64
    };

    PackingMetrics {
        pallet_count: pallets.len(),
        total_weight: summaries.iter().map(|s| s.weight).sum(),
        total_units: summaries.iter().map(|s| s.unit_count).sum(),
        average_utilization,
        pallets: summaries,
        trucks: TruckEstimate::for_pallets(pallets.len()),
    }
}
