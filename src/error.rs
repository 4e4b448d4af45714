use thiserror::Error;

use crate::types::Index2;

pub type Result<T> = std::result::Result<T, DesimError>;

/// Everything that can go wrong in a simulation run.
///
/// Parameter problems (`InvalidSpectrumParameters`, `UnknownMaterial`,
/// `InvalidParameter`, `EmptyRoi`, `Config`) are detected before any image is
/// formed. Decomposition failures are per pixel, and end up as invalid entries
/// of a `DecompositionResult` rather than aborting a run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DesimError {
    #[error("invalid spectrum parameter `{parameter}`: {reason}")]
    InvalidSpectrumParameters { parameter: String, reason: String },

    #[error("unknown material `{material}`: {reason}")]
    UnknownMaterial { material: String, reason: String },

    #[error("decomposition did not converge{} after {iterations} iterations (residual {residual:.3e})", at(.location))]
    DecompositionDidNotConverge { location: Option<Index2>, iterations: usize, residual: f64 },

    #[error("singular Jacobian{} (normalized determinant {determinant:.3e})", at(.location))]
    SingularJacobian { location: Option<Index2>, determinant: f64 },

    #[error("ROI `{roi}` contains no samples")]
    EmptyRoi { roi: String },

    #[error("background ROI `{roi}` has zero variance")]
    DegenerateBackground { roi: String },

    #[error("invalid parameter `{parameter}`: {reason}")]
    InvalidParameter { parameter: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),
}

fn at(location: &Option<Index2>) -> String {
    match location {
        Some([row, col]) => format!(" at pixel ({row}, {col})"),
        None => String::new(),
    }
}

impl DesimError {

    pub fn spectrum(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSpectrumParameters { parameter: parameter.into(), reason: reason.into() }
    }

    pub fn material(material: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnknownMaterial { material: material.into(), reason: reason.into() }
    }

    pub fn parameter(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter { parameter: parameter.into(), reason: reason.into() }
    }

    /// Attach a pixel location to a per-pixel decomposition failure. Other
    /// errors are returned unchanged.
    pub fn at_location(self, index: Index2) -> Self {
        match self {
            Self::DecompositionDidNotConverge { iterations, residual, .. } =>
                Self::DecompositionDidNotConverge { location: Some(index), iterations, residual },
            Self::SingularJacobian { determinant, .. } =>
                Self::SingularJacobian { location: Some(index), determinant },
            other => other,
        }
    }
}
