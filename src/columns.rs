//! Column building: identical cartons become vertical stacks, and a shorter
//! stack may ride on top of a taller one.

use tracing::debug;

use crate::model::{ColumnBlock, OrientationPolicy, PalletSpec, UnitItem};
use crate::optimizer::PackingConfig;
use crate::types::Footprint;

/// Cartons that may share a column: same product, priority and orientation.
#[derive(Clone, Debug, PartialEq)]
pub struct UnitGroup {
    /// First carton of the group; all members share its product data.
    pub template: UnitItem,
    pub unit_ids: Vec<usize>,
}

impl UnitGroup {
    fn key(&self) -> (usize, i32, OrientationPolicy) {
        (
            self.template.product_index,
            self.template.priority,
            self.template.orientation,
        )
    }
}

/// Groups cartons by (product, priority, orientation), in order of first appearance.
pub fn group_units(units: &[UnitItem]) -> Vec<UnitGroup> {
    let mut groups: Vec<UnitGroup> = Vec::new();
    for unit in units {
        let key = (unit.product_index, unit.priority, unit.orientation);
        match groups.iter_mut().find(|g| g.key() == key) {
            Some(group) => group.unit_ids.push(unit.sub_id),
            None => groups.push(UnitGroup {
                template: unit.clone(),
                unit_ids: vec![unit.sub_id],
            }),
        }
    }
    groups
}

/// Cartons per full column.
///
/// `max(1, floor(max_height / unit_height))`, additionally limited by the pallet
/// weight when `cap_layers_by_weight` is set.
pub fn layers_per_column(unit: &UnitItem, spec: &PalletSpec, config: &PackingConfig) -> usize {
    let eps = config.general_epsilon;
    let mut layers = ((spec.max_height + eps) / unit.height()).floor() as usize;
    if config.cap_layers_by_weight && unit.weight > eps {
        let by_weight = ((spec.max_weight + eps) / unit.weight).floor() as usize;
        layers = layers.min(by_weight);
    }
    layers.max(1)
}

/// Splits a group into full columns plus at most one partial column.
pub fn build_columns(
    group: &UnitGroup,
    spec: &PalletSpec,
    config: &PackingConfig,
) -> Vec<ColumnBlock> {
    let layers = layers_per_column(&group.template, spec, config);
    let blocks: Vec<ColumnBlock> = group
        .unit_ids
        .chunks(layers)
        .map(|ids| ColumnBlock::stack(&group.template, ids.to_vec()))
        .collect();
    debug!(
        product = %group.template.name,
        units = group.unit_ids.len(),
        layers,
        columns = blocks.len(),
        "built columns"
    );
    blocks
}

/// The footprint `top` would take as a rider on `base`, if it may ride at all.
///
/// The rider must not be taller than its base, the combined column must fit the
/// pallet height and weight, and the rider's footprint must lie within the base
/// footprint grown by the overhang tolerance on every side. Only riders with the
/// `auto` policy may be turned to get there.
pub fn rider_footprint(
    base: &ColumnBlock,
    top: &ColumnBlock,
    spec: &PalletSpec,
    config: &PackingConfig,
) -> Option<Footprint> {
    let eps = config.general_epsilon;
    if top.height_total > base.height_total + eps {
        return None;
    }
    if base.height_total + top.height_total > spec.max_height + eps {
        return None;
    }
    if base.total_weight() + top.total_weight() > spec.max_weight + eps {
        return None;
    }

    let limit_w = base.footprint.width + 2.0 * spec.overhang_tolerance;
    let limit_d = base.footprint.depth + 2.0 * spec.overhang_tolerance;
    // The centred rider must also stay on the pallet.
    let usable = |fp: &Footprint| {
        fp.fits_in(limit_w, limit_d, eps)
            && Footprint::new(
                base.footprint.width.max(fp.width),
                base.footprint.depth.max(fp.depth),
            )
            .fits_in(spec.max_width, spec.max_depth, eps)
    };
    if usable(&top.footprint) {
        return Some(top.footprint);
    }
    if top.orientation.allows_rotation() {
        let turned = top.footprint.transposed();
        if usable(&turned) {
            return Some(turned);
        }
    }
    None
}

/// Merges riders onto bases.
///
/// `blocks` must already be in processing order. Each base takes the first later
/// column that may ride on it; a column that became a rider leaves the pool.
/// Returns the remaining columns in their original order.
pub fn merge_riders(
    blocks: Vec<ColumnBlock>,
    spec: &PalletSpec,
    config: &PackingConfig,
) -> Vec<ColumnBlock> {
    let mut pool: Vec<Option<ColumnBlock>> = blocks.into_iter().map(Some).collect();
    let mut merged = Vec::with_capacity(pool.len());

    for i in 0..pool.len() {
        let Some(mut base) = pool[i].take() else {
            continue;
        };

        let found = (i + 1..pool.len()).find_map(|j| {
            pool[j]
                .as_ref()
                .and_then(|top| rider_footprint(&base, top, spec, config))
                .map(|footprint| (j, footprint))
        });

        if let Some((j, footprint)) = found {
            if let Some(mut top) = pool[j].take() {
                debug!(
                    base = %base.name,
                    rider = %top.name,
                    rotated = footprint != top.footprint,
                    "merged rider"
                );
                top.footprint = footprint;
                base.child = Some(Box::new(top));
            }
        }

        merged.push(base);
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sorting::sort_blocks;
    use crate::types::{EPSILON_GENERAL, Vec3};

    fn spec() -> PalletSpec {
        PalletSpec::new(1100.0, 1100.0, 1700.0, 1000.0).unwrap()
    }

    fn unit(
        name: &str,
        product_index: usize,
        dims: (f64, f64, f64),
        weight: f64,
        orientation: OrientationPolicy,
    ) -> UnitItem {
        UnitItem {
            name: name.to_string(),
            product_index,
            sub_id: 1,
            dims: Vec3::new(dims.0, dims.1, dims.2),
            weight,
            orientation,
            priority: 1,
            color: String::new(),
        }
    }

    fn units_of(template: &UnitItem, count: usize) -> Vec<UnitItem> {
        (1..=count)
            .map(|sub_id| UnitItem {
                sub_id,
                ..template.clone()
            })
            .collect()
    }

    #[test]
    fn ten_cartons_make_one_full_and_one_partial_column() {
        let template = unit("A", 0, (300.0, 300.0, 200.0), 5.0, OrientationPolicy::Auto);
        let groups = group_units(&units_of(&template, 10));
        assert_eq!(groups.len(), 1);

        let config = PackingConfig::default();
        assert_eq!(layers_per_column(&template, &spec(), &config), 8);

        let blocks = build_columns(&groups[0], &spec(), &config);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].layers, 8);
        assert_eq!(blocks[0].unit_ids, (1..=8).collect::<Vec<_>>());
        assert_eq!(blocks[1].layers, 2);
        assert_eq!(blocks[1].unit_ids, vec![9, 10]);
        assert!((blocks[1].weight_total - 10.0).abs() < EPSILON_GENERAL);
    }

    #[test]
    fn tall_cartons_still_get_one_layer() {
        let template = unit("T", 0, (300.0, 300.0, 1700.0), 5.0, OrientationPolicy::Auto);
        assert_eq!(
            layers_per_column(&template, &spec(), &PackingConfig::default()),
            1
        );
    }

    #[test]
    fn weight_cap_limits_layers() {
        let template = unit("H", 0, (300.0, 300.0, 200.0), 300.0, OrientationPolicy::Auto);
        assert_eq!(
            layers_per_column(&template, &spec(), &PackingConfig::default()),
            3
        );
        let uncapped = PackingConfig::builder().cap_layers_by_weight(false).build();
        assert_eq!(layers_per_column(&template, &spec(), &uncapped), 8);
    }

    #[test]
    fn overrides_split_groups() {
        let template = unit("A", 0, (300.0, 300.0, 200.0), 5.0, OrientationPolicy::Auto);
        let mut units = units_of(&template, 4);
        units[1].orientation = OrientationPolicy::DepthFixed;
        units[3].priority = 101;
        let groups = group_units(&units);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].unit_ids, vec![1, 3]);
        assert_eq!(groups[1].unit_ids, vec![2]);
        assert_eq!(groups[2].unit_ids, vec![4]);
    }

    #[test]
    fn short_column_rides_on_tall_one() {
        let config = PackingConfig::default();
        let a = unit("A", 0, (400.0, 400.0, 200.0), 5.0, OrientationPolicy::Auto);
        let b = unit("B", 1, (420.0, 440.0, 150.0), 2.0, OrientationPolicy::Auto);
        let mut blocks = vec![
            ColumnBlock::stack(&a, (1..=6).collect()),
            ColumnBlock::stack(&b, vec![1, 2, 3]),
        ];
        sort_blocks(&mut blocks);
        // B has the larger footprint, so it sorts first and becomes the base.
        assert_eq!(blocks[0].name, "B");

        let merged = merge_riders(blocks, &spec(), &config);
        assert_eq!(merged.len(), 2, "A (1200 mm) is taller than B (450 mm)");

        let blocks = vec![
            ColumnBlock::stack(&a, (1..=6).collect()),
            ColumnBlock::stack(&b, vec![1, 2, 3]),
        ];
        let merged = merge_riders(blocks, &spec(), &config);
        assert_eq!(merged.len(), 1);
        let child = merged[0].child.as_ref().unwrap();
        assert_eq!(child.name, "B");
        assert!((merged[0].stack_height() - 1650.0).abs() < EPSILON_GENERAL);
    }

    #[test]
    fn rider_may_turn_only_with_auto_policy() {
        let config = PackingConfig::default();
        let base_item = unit("A", 0, (400.0, 800.0, 200.0), 5.0, OrientationPolicy::Auto);
        let base = ColumnBlock::stack(&base_item, vec![1, 2, 3, 4]);

        let auto_top = ColumnBlock::stack(
            &unit("B", 1, (800.0, 400.0, 100.0), 1.0, OrientationPolicy::Auto),
            vec![1],
        );
        assert_eq!(
            rider_footprint(&base, &auto_top, &spec(), &config),
            Some(Footprint::new(400.0, 800.0))
        );

        let fixed_top = ColumnBlock::stack(
            &unit("C", 2, (800.0, 400.0, 100.0), 1.0, OrientationPolicy::WidthFixed),
            vec![1],
        );
        assert_eq!(rider_footprint(&base, &fixed_top, &spec(), &config), None);
    }

    #[test]
    fn overhang_tolerance_bounds_rider() {
        let config = PackingConfig::default();
        let base = ColumnBlock::stack(
            &unit("A", 0, (400.0, 400.0, 200.0), 5.0, OrientationPolicy::Auto),
            vec![1, 2],
        );
        let within = ColumnBlock::stack(
            &unit("B", 1, (460.0, 460.0, 100.0), 1.0, OrientationPolicy::Auto),
            vec![1],
        );
        let beyond = ColumnBlock::stack(
            &unit("C", 2, (461.0, 400.0, 100.0), 1.0, OrientationPolicy::Auto),
            vec![1],
        );
        assert!(rider_footprint(&base, &within, &spec(), &config).is_some());
        assert!(rider_footprint(&base, &beyond, &spec(), &config).is_none());
    }

    #[test]
    fn rider_overhang_must_stay_on_pallet() {
        let config = PackingConfig::default();
        let base = ColumnBlock::stack(
            &unit("A", 0, (1100.0, 500.0, 200.0), 5.0, OrientationPolicy::WidthFixed),
            vec![1, 2],
        );
        let wider = ColumnBlock::stack(
            &unit("B", 1, (1120.0, 500.0, 100.0), 1.0, OrientationPolicy::WidthFixed),
            vec![1],
        );
        let flush = ColumnBlock::stack(
            &unit("C", 2, (1100.0, 520.0, 100.0), 1.0, OrientationPolicy::WidthFixed),
            vec![1],
        );
        assert!(rider_footprint(&base, &wider, &spec(), &config).is_none());
        assert_eq!(
            rider_footprint(&base, &flush, &spec(), &config),
            Some(Footprint::new(1100.0, 520.0))
        );
    }

    #[test]
    fn rider_respects_height_and_weight_limits() {
        let config = PackingConfig::default();
        let base = ColumnBlock::stack(
            &unit("A", 0, (400.0, 400.0, 200.0), 100.0, OrientationPolicy::Auto),
            (1..=8).collect(),
        );
        let top = ColumnBlock::stack(
            &unit("B", 1, (400.0, 400.0, 100.0), 1.0, OrientationPolicy::Auto),
            vec![1, 2],
        );
        // 1600 + 200 > 1700
        assert!(rider_footprint(&base, &top, &spec(), &config).is_none());

        let light_spec = PalletSpec::new(1100.0, 1100.0, 2000.0, 800.0).unwrap();
        // 800 kg base + 2 kg rider > 800 kg
        assert!(rider_footprint(&base, &top, &light_spec, &config).is_none());
    }
}
