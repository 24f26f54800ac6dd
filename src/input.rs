//! Input rows and per-carton directives.
//!
//! Rows arrive loosely typed (numbers or numeric strings, as typed into a sheet).
//! Every row is parsed on its own; a bad row is reported and skipped while the
//! remaining rows are still packed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
#[allow(unused_imports)]
use serde_json::json;
use utoipa::ToSchema;

use crate::error::{PackingError, Result};
use crate::model::{OrientationPolicy, ProductRow, UnitItem};
use crate::types::Vec3;

/// Presentation colors, assigned per product in input order.
pub const PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

/// Most cartons a single row may ask for.
pub const MAX_QUANTITY_PER_ROW: u32 = 10_000;

/// Most cartons a whole request may expand into.
pub const MAX_TOTAL_UNITS: usize = 100_000;

pub fn color_for(product_index: usize) -> &'static str {
    PALETTE[product_index % PALETTE.len()]
}

/// A product row as received from the caller.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
#[schema(
    example = json!({
        "name": "A",
        "width": 300,
        "depth": 300,
        "height": 200,
        "weight": 5.0,
        "quantity": 10,
        "priority": 1,
        "orientation": "auto"
    })
)]
pub struct RawProductRow {
    #[serde(default)]
    #[schema(value_type = Object)]
    pub name: Option<Value>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub width: Option<Value>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub depth: Option<Value>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub height: Option<Value>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub weight: Option<Value>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub quantity: Option<Value>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub priority: Option<Value>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub orientation: Option<Value>,
}

impl RawProductRow {
    fn is_blank(&self) -> bool {
        [
            &self.name,
            &self.width,
            &self.depth,
            &self.height,
            &self.weight,
            &self.quantity,
            &self.priority,
            &self.orientation,
        ]
        .into_iter()
        .all(|v| text_of(v.as_ref()).is_none())
    }
}

/// Trimmed text of a cell, `None` when empty.
fn text_of(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    if text.is_empty() { None } else { Some(text) }
}

/// Maps full-width digits, signs and separators to their ASCII forms.
fn normalize_width(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '０'..='９' => char::from(b'0' + (c as u32 - '０' as u32) as u8),
            '，' => ',',
            '－' | 'ー' => '-',
            '＋' => '+',
            '．' => '.',
            other => other,
        })
        .collect()
}

fn number_of(row: usize, field: &str, value: Option<&Value>) -> Result<Option<f64>> {
    let parsed = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => {
            let normalized = normalize_width(s);
            if normalized.is_empty() {
                return Ok(None);
            }
            normalized.parse::<f64>().ok()
        }
        Some(_) => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(PackingError::invalid_row(
            row,
            field,
            format!("not a number: {}", text_of(value).unwrap_or_default()),
        )),
    }
}

fn required_number(row: usize, field: &str, value: Option<&Value>) -> Result<f64> {
    number_of(row, field, value)?
        .ok_or_else(|| PackingError::invalid_row(row, field, "missing value"))
}

/// Millimeter and count fields are whole numbers; fractions are cut off.
fn whole(value: f64) -> f64 {
    value.trunc()
}

/// Parses one row.
///
/// Returns `Ok(None)` for rows that are skipped without complaint: fully blank
/// rows and rows with a quantity or width of zero or less.
pub fn parse_row(index: usize, raw: &RawProductRow) -> Result<Option<ProductRow>> {
    if raw.is_blank() {
        return Ok(None);
    }
    let row = index + 1;

    let width = number_of(row, "width", raw.width.as_ref())?.map(whole);
    let quantity = number_of(row, "quantity", raw.quantity.as_ref())?.map(whole);
    if width.is_some_and(|w| w <= 0.0) || quantity.is_some_and(|q| q <= 0.0) {
        return Ok(None);
    }

    let name = text_of(raw.name.as_ref())
        .ok_or_else(|| PackingError::invalid_row(row, "name", "missing value"))?;
    let width = width.ok_or_else(|| PackingError::invalid_row(row, "width", "missing value"))?;
    let quantity =
        quantity.ok_or_else(|| PackingError::invalid_row(row, "quantity", "missing value"))?;
    if quantity > f64::from(MAX_QUANTITY_PER_ROW) {
        return Err(PackingError::invalid_row(
            row,
            "quantity",
            format!("must not exceed {MAX_QUANTITY_PER_ROW}, got {quantity}"),
        ));
    }

    let depth = whole(required_number(row, "depth", raw.depth.as_ref())?);
    if depth <= 0.0 {
        return Err(PackingError::invalid_row(row, "depth", "must be positive"));
    }
    let height = whole(required_number(row, "height", raw.height.as_ref())?);
    if height <= 0.0 {
        return Err(PackingError::invalid_row(row, "height", "must be positive"));
    }
    let weight = required_number(row, "weight", raw.weight.as_ref())?;
    if weight < 0.0 {
        return Err(PackingError::invalid_row(row, "weight", "must not be negative"));
    }

    let priority = match number_of(row, "priority", raw.priority.as_ref())? {
        Some(p) if whole(p) >= 1.0 && p <= f64::from(i32::MAX) => whole(p) as i32,
        Some(p) => {
            return Err(PackingError::invalid_row(
                row,
                "priority",
                format!("must be at least 1, got {p}"),
            ));
        }
        None => 1,
    };

    let orientation = match text_of(raw.orientation.as_ref()) {
        Some(text) => OrientationPolicy::parse(&text).ok_or_else(|| {
            PackingError::invalid_row(row, "orientation", format!("unknown policy '{text}'"))
        })?,
        None => OrientationPolicy::Auto,
    };

    Ok(Some(ProductRow {
        index,
        name,
        width,
        depth,
        height,
        weight,
        quantity: quantity as u32,
        priority,
        orientation,
    }))
}

/// Parses all rows, keeping the good ones and collecting the errors.
///
/// A row that would push the request past [`MAX_TOTAL_UNITS`] cartons is
/// reported instead of kept.
pub fn parse_rows(raw_rows: &[RawProductRow]) -> (Vec<ProductRow>, Vec<PackingError>) {
    let mut products = Vec::new();
    let mut errors = Vec::new();
    let mut total_units = 0usize;
    for (index, raw) in raw_rows.iter().enumerate() {
        match parse_row(index, raw) {
            Ok(Some(product)) if total_units + product.quantity as usize > MAX_TOTAL_UNITS => {
                errors.push(PackingError::invalid_row(
                    index + 1,
                    "quantity",
                    format!("request would exceed {MAX_TOTAL_UNITS} cartons"),
                ));
            }
            Ok(Some(product)) => {
                total_units += product.quantity as usize;
                products.push(product);
            }
            Ok(None) => {}
            Err(err) => errors.push(err),
        }
    }
    (products, errors)
}

/// Parses an ID list such as `"1-3, 5"` into sorted, unique 1-based ids.
///
/// Ids above `last` are refused, so a list never grows past the product's
/// carton count.
pub fn parse_ids(raw: &str, last: usize) -> std::result::Result<Vec<usize>, String> {
    let normalized = normalize_width(raw);
    let mut ids = Vec::new();

    for part in normalized.split(',').filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                let start = parse_id(start, last)?;
                let end = parse_id(end, last)?;
                if start > end {
                    return Err(format!("range '{part}' runs backwards"));
                }
                ids.extend(start..=end);
            }
            None => ids.push(parse_id(part, last)?),
        }
    }

    ids.sort_unstable();
    ids.dedup();
    Ok(ids)
}

fn parse_id(raw: &str, last: usize) -> std::result::Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(0) => Err("ids start at 1".to_string()),
        Ok(id) if id > last => Err(format!("id {id} is past the last carton {last}")),
        Ok(id) => Ok(id),
        Err(_) => Err(format!("'{raw}' is not an id")),
    }
}

/// Rotation forced onto single cartons.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RotateDirective {
    #[default]
    None,
    ForceWidth,
    ForceDepth,
}

/// Priority shift for single cartons.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PriorityShift {
    #[default]
    None,
    Raise,
    Lower,
}

impl PriorityShift {
    pub const STEP: i32 = 100;

    pub fn delta(self) -> i32 {
        match self {
            PriorityShift::None => 0,
            PriorityShift::Raise => Self::STEP,
            PriorityShift::Lower => -Self::STEP,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UnitDirective {
    pub rotate: RotateDirective,
    pub priority: PriorityShift,
}

/// A directive as received from the caller.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[schema(
    example = json!({
        "name": "A",
        "ids": "1-3, 5",
        "rotate": "force-depth",
        "priority_delta": "+100"
    })
)]
pub struct RawUnitOverride {
    pub name: String,
    /// Single id or an id list such as `"1-3, 5"`.
    #[schema(value_type = Object)]
    pub ids: Value,
    #[serde(default)]
    pub rotate: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub priority_delta: Option<Value>,
}

/// Directives keyed by (product name, 1-based carton number).
#[derive(Clone, Debug, Default)]
pub struct UnitOverrides {
    directives: HashMap<(String, usize), UnitDirective>,
}

impl UnitOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, sub_id: usize, directive: UnitDirective) {
        self.directives.insert((name.to_string(), sub_id), directive);
    }

    pub fn get(&self, name: &str, sub_id: usize) -> Option<&UnitDirective> {
        self.directives.get(&(name.to_string(), sub_id))
    }

    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }
}

fn parse_rotate(raw: Option<&str>) -> std::result::Result<RotateDirective, String> {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        None | Some("" | "none") => Ok(RotateDirective::None),
        Some("force-width" | "width-fixed" | "横固定") => Ok(RotateDirective::ForceWidth),
        Some("force-depth" | "depth-fixed" | "縦固定") => Ok(RotateDirective::ForceDepth),
        Some(other) => Err(format!("unknown rotate directive '{other}'")),
    }
}

fn parse_priority_shift(raw: Option<&Value>) -> std::result::Result<PriorityShift, String> {
    let Some(text) = text_of(raw) else {
        return Ok(PriorityShift::None);
    };
    match normalize_width(&text).to_ascii_lowercase().as_str() {
        "none" | "0" => Ok(PriorityShift::None),
        "+100" | "100" => Ok(PriorityShift::Raise),
        "-100" => Ok(PriorityShift::Lower),
        other => Err(format!("priority_delta must be +100 or -100, got '{other}'")),
    }
}

fn parse_override(
    raw: &RawUnitOverride,
    quantities: &HashMap<&str, usize>,
) -> std::result::Result<(Vec<usize>, UnitDirective), String> {
    let name = raw.name.trim();
    if name.is_empty() {
        return Err("missing product name".to_string());
    }
    let last = *quantities
        .get(name)
        .ok_or_else(|| format!("unknown product '{name}'"))?;
    let ids = match &raw.ids {
        Value::Number(n) => {
            let id = n
                .as_u64()
                .filter(|id| *id > 0)
                .ok_or_else(|| format!("'{n}' is not an id"))?;
            if id > last as u64 {
                return Err(format!("id {id} is past the last carton {last}"));
            }
            vec![id as usize]
        }
        Value::String(s) => parse_ids(s, last)?,
        other => return Err(format!("'{other}' is not an id list")),
    };
    if ids.is_empty() {
        return Err("no ids given".to_string());
    }
    let directive = UnitDirective {
        rotate: parse_rotate(raw.rotate.as_deref())?,
        priority: parse_priority_shift(raw.priority_delta.as_ref())?,
    };
    Ok((ids, directive))
}

/// Parses directives for the given products; later entries win when they name
/// the same carton. Directives for unknown products or cartons are reported.
pub fn parse_overrides(
    raw: &[RawUnitOverride],
    products: &[ProductRow],
) -> (UnitOverrides, Vec<PackingError>) {
    let mut quantities: HashMap<&str, usize> = HashMap::new();
    for product in products {
        let last = quantities.entry(product.name.as_str()).or_default();
        *last = (*last).max(product.quantity as usize);
    }

    let mut overrides = UnitOverrides::new();
    let mut errors = Vec::new();
    for (index, entry) in raw.iter().enumerate() {
        match parse_override(entry, &quantities) {
            Ok((ids, directive)) => {
                for id in ids {
                    overrides.insert(entry.name.trim(), id, directive);
                }
            }
            Err(reason) => errors.push(PackingError::InvalidOverride {
                row: index + 1,
                reason,
            }),
        }
    }
    (overrides, errors)
}

/// Expands product rows into single cartons and applies directives.
pub fn expand_units(products: &[ProductRow], overrides: &UnitOverrides) -> Vec<UnitItem> {
    let mut units = Vec::new();
    for product in products {
        for sub_id in 1..=product.quantity as usize {
            let mut unit = UnitItem {
                name: product.name.clone(),
                product_index: product.index,
                sub_id,
                dims: Vec3::new(product.width, product.depth, product.height),
                weight: product.weight,
                orientation: product.orientation,
                priority: product.priority,
                color: color_for(product.index).to_string(),
            };
            if let Some(directive) = overrides.get(&product.name, sub_id) {
                match directive.rotate {
                    RotateDirective::None => {}
                    RotateDirective::ForceWidth => unit.orientation = OrientationPolicy::WidthFixed,
                    RotateDirective::ForceDepth => unit.orientation = OrientationPolicy::DepthFixed,
                }
                unit.priority = unit.priority.saturating_add(directive.priority.delta());
            }
            units.push(unit);
        }
    }
    units
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(value: Value) -> RawProductRow {
        serde_json::from_value(value).expect("row should deserialize")
    }

    #[test]
    fn parses_numbers_and_numeric_strings() {
        let raw = row(json!({
            "name": "A", "width": "300", "depth": 300, "height": "200.7",
            "weight": "5.5", "quantity": 10
        }));
        let product = parse_row(0, &raw).unwrap().unwrap();
        assert_eq!(product.name, "A");
        assert_eq!(product.width, 300.0);
        assert_eq!(product.height, 200.0);
        assert_eq!(product.weight, 5.5);
        assert_eq!(product.quantity, 10);
        assert_eq!(product.priority, 1);
        assert_eq!(product.orientation, OrientationPolicy::Auto);
    }

    #[test]
    fn skips_zero_quantity_and_zero_width() {
        let zero_qty = row(json!({
            "name": "A", "width": 300, "depth": 300, "height": 200, "weight": 1, "quantity": 0
        }));
        let zero_width = row(json!({
            "name": "B", "width": 0, "depth": 300, "height": 200, "weight": 1, "quantity": 3
        }));
        assert_eq!(parse_row(0, &zero_qty).unwrap(), None);
        assert_eq!(parse_row(1, &zero_width).unwrap(), None);
        assert_eq!(parse_row(2, &RawProductRow::default()).unwrap(), None);
    }

    #[test]
    fn bad_rows_are_reported_and_others_survive() {
        let rows = vec![
            row(json!({
                "name": "A", "width": 300, "depth": 300, "height": "abc", "weight": 1, "quantity": 2
            })),
            row(json!({
                "name": "B", "width": 300, "depth": 300, "height": 200, "weight": 1, "quantity": 2
            })),
            row(json!({ "width": 300, "depth": 300, "height": 200, "weight": 1, "quantity": 2 })),
            row(json!({
                "name": "D", "width": 300, "depth": 300, "height": 200, "weight": 1,
                "quantity": 2, "orientation": "diagonal"
            })),
        ];
        let (products, errors) = parse_rows(&rows);
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].name, "B");
        assert_eq!(products[0].index, 1);
        assert_eq!(errors.len(), 3);
        assert!(matches!(
            &errors[0],
            PackingError::InvalidInputRow { row: 1, field, .. } if field == "height"
        ));
        assert!(matches!(
            &errors[1],
            PackingError::InvalidInputRow { row: 3, field, .. } if field == "name"
        ));
        assert!(matches!(
            &errors[2],
            PackingError::InvalidInputRow { row: 4, field, .. } if field == "orientation"
        ));
    }

    #[test]
    fn priority_must_be_positive() {
        let raw = row(json!({
            "name": "A", "width": 300, "depth": 300, "height": 200, "weight": 1,
            "quantity": 2, "priority": 0
        }));
        assert!(parse_row(0, &raw).is_err());
    }

    #[test]
    fn parse_ids_handles_ranges_and_full_width() {
        assert_eq!(parse_ids("1-3, 5", 10).unwrap(), vec![1, 2, 3, 5]);
        assert_eq!(parse_ids("５，１－２", 10).unwrap(), vec![1, 2, 5]);
        assert_eq!(parse_ids("2,2, 1", 10).unwrap(), vec![1, 2]);
        assert_eq!(parse_ids("", 10).unwrap(), Vec::<usize>::new());
        assert!(parse_ids("3-1", 10).is_err());
        assert!(parse_ids("a", 10).is_err());
        assert!(parse_ids("0", 10).is_err());
    }

    #[test]
    fn parse_ids_stops_at_the_last_carton() {
        assert_eq!(parse_ids("1-4", 4).unwrap(), vec![1, 2, 3, 4]);
        assert!(parse_ids("1-4000000000", 4).is_err());
        assert!(parse_ids("5", 4).is_err());
    }

    #[test]
    fn huge_quantities_are_refused() {
        let raw = row(json!({
            "name": "A", "width": 300, "depth": 300, "height": 200, "weight": 1,
            "quantity": 1e12
        }));
        let err = parse_row(0, &raw).unwrap_err();
        assert!(matches!(
            err,
            PackingError::InvalidInputRow { row: 1, ref field, .. } if field == "quantity"
        ));

        let at_limit = row(json!({
            "name": "A", "width": 300, "depth": 300, "height": 200, "weight": 1,
            "quantity": MAX_QUANTITY_PER_ROW
        }));
        assert_eq!(
            parse_row(0, &at_limit).unwrap().unwrap().quantity,
            MAX_QUANTITY_PER_ROW
        );
    }

    #[test]
    fn request_total_is_capped() {
        let rows: Vec<RawProductRow> = (0..11)
            .map(|i| {
                row(json!({
                    "name": format!("P{i}"), "width": 300, "depth": 300, "height": 200,
                    "weight": 1, "quantity": MAX_QUANTITY_PER_ROW
                }))
            })
            .collect();
        let (products, errors) = parse_rows(&rows);
        assert_eq!(products.len(), MAX_TOTAL_UNITS / MAX_QUANTITY_PER_ROW as usize);
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            PackingError::InvalidInputRow { row: 11, field, .. } if field == "quantity"
        ));
    }

    #[test]
    fn nameless_rows_without_cartons_are_skipped() {
        let raw = row(json!({ "width": 300, "depth": 300, "height": 200, "quantity": 0 }));
        assert_eq!(parse_row(0, &raw).unwrap(), None);
        let raw = row(json!({ "width": "0", "quantity": 3 }));
        assert_eq!(parse_row(1, &raw).unwrap(), None);
    }

    fn product(name: &str, quantity: u32) -> ProductRow {
        ProductRow {
            index: 0,
            name: name.to_string(),
            width: 300.0,
            depth: 400.0,
            height: 200.0,
            weight: 5.0,
            quantity,
            priority: 1,
            orientation: OrientationPolicy::Auto,
        }
    }

    fn directive(name: &str, ids: Value) -> RawUnitOverride {
        RawUnitOverride {
            name: name.to_string(),
            ids,
            rotate: None,
            priority_delta: None,
        }
    }

    #[test]
    fn directives_apply_per_carton() {
        let raw = vec![
            RawUnitOverride {
                rotate: Some("force-depth".to_string()),
                ..directive("A", json!("1-2"))
            },
            RawUnitOverride {
                priority_delta: Some(json!("+100")),
                ..directive("A", json!(3))
            },
            directive("A", json!("x")),
        ];
        let products = [product("A", 4)];
        let (overrides, errors) = parse_overrides(&raw, &products);
        assert_eq!(overrides.len(), 3);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code(), "invalid_override");

        let units = expand_units(&products, &overrides);
        assert_eq!(units.len(), 4);
        assert_eq!(units[0].orientation, OrientationPolicy::DepthFixed);
        assert_eq!(units[1].orientation, OrientationPolicy::DepthFixed);
        assert_eq!(units[2].orientation, OrientationPolicy::Auto);
        assert_eq!(units[2].priority, 101);
        assert_eq!(units[3].priority, 1);
        assert_eq!(units[3].color, PALETTE[0]);
    }

    #[test]
    fn directives_must_name_existing_cartons() {
        let raw = vec![
            directive("A", json!("1-4000000000")),
            directive("A", json!(5)),
            directive("Z", json!(1)),
            directive("A", json!("4")),
        ];
        let (overrides, errors) = parse_overrides(&raw, &[product("A", 4)]);
        assert_eq!(overrides.len(), 1);
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| e.code() == "invalid_override"));
        assert!(matches!(
            &errors[2],
            PackingError::InvalidOverride { row: 3, reason } if reason.contains("unknown product")
        ));
    }

    #[test]
    fn priority_shift_parses_signed_values() {
        assert_eq!(parse_priority_shift(Some(&json!("-100"))), Ok(PriorityShift::Lower));
        assert_eq!(parse_priority_shift(Some(&json!(100))), Ok(PriorityShift::Raise));
        assert_eq!(parse_priority_shift(Some(&json!("none"))), Ok(PriorityShift::None));
        assert!(parse_priority_shift(Some(&json!("+50"))).is_err());
    }
}
