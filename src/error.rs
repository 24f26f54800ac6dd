use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Every failure the planner reports, from row parsing to manual moves.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PackingError {
    #[error("'{name}' does not fit on an empty pallet: {detail}")]
    OversizeItem { name: String, detail: String },
    #[error(
        "unstable stack: base area {base_area} mm² is less than {required_ratio} × moved area {moved_area} mm²"
    )]
    UnstableStack {
        base_area: f64,
        moved_area: f64,
        required_ratio: f64,
    },
    #[error("stack height {height} mm exceeds pallet height {max_height} mm")]
    HeightExceeded { height: f64, max_height: f64 },
    #[error("no floor space: column would end at {required} mm, pallet width is {max_width} mm")]
    NoFloorSpace { required: f64, max_width: f64 },
    #[error("pallet load {weight} kg exceeds the limit of {max_weight} kg")]
    WeightExceeded { weight: f64, max_weight: f64 },
    #[error("row {row}: {field}: {reason}")]
    InvalidInputRow {
        row: usize,
        field: String,
        reason: String,
    },
    #[error("override {row}: {reason}")]
    InvalidOverride { row: usize, reason: String },
    #[error("invalid pallet: {0}")]
    InvalidPallet(String),
    #[error("pallet {0} does not exist")]
    UnknownPallet(usize),
    #[error("pallet {pallet} has no column at index {index}")]
    UnknownItem { pallet: usize, index: usize },
    #[error("invalid move: {0}")]
    InvalidMove(String),
}

impl PackingError {
    /// Stable machine-readable identifier, used in API responses.
    pub fn code(&self) -> &'static str {
        match self {
            PackingError::OversizeItem { .. } => "oversize_item",
            PackingError::UnstableStack { .. } => "unstable_stack",
            PackingError::HeightExceeded { .. } => "height_exceeded",
            PackingError::NoFloorSpace { .. } => "no_floor_space",
            PackingError::WeightExceeded { .. } => "weight_exceeded",
            PackingError::InvalidInputRow { .. } => "invalid_input_row",
            PackingError::InvalidOverride { .. } => "invalid_override",
            PackingError::InvalidPallet(_) => "invalid_pallet",
            PackingError::UnknownPallet(_) => "unknown_pallet",
            PackingError::UnknownItem { .. } => "unknown_item",
            PackingError::InvalidMove(_) => "invalid_move",
        }
    }

    pub(crate) fn invalid_row(row: usize, field: &str, reason: impl Into<String>) -> Self {
        PackingError::InvalidInputRow {
            row,
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PackingError>;

/// Serializable form of a [`PackingError`] for responses and events.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct ErrorReport {
    pub code: String,
    pub message: String,
}

impl From<&PackingError> for ErrorReport {
    fn from(err: &PackingError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let err = PackingError::UnstableStack {
            base_area: 22500.0,
            moved_area: 40000.0,
            required_ratio: 0.7,
        };
        assert_eq!(err.code(), "unstable_stack");
        assert_eq!(PackingError::UnknownPallet(3).code(), "unknown_pallet");
    }

    #[test]
    fn row_errors_name_the_field() {
        let err = PackingError::invalid_row(4, "height", "not a number: 'abc'");
        assert_eq!(err.to_string(), "row 4: height: not a number: 'abc'");

        let report = ErrorReport::from(&err);
        assert_eq!(report.code, "invalid_input_row");
        assert_eq!(report.message, err.to_string());
    }
}
