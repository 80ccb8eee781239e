//! Error types for ingestion, calibration setup and rendering.

use std::path::PathBuf;

use thiserror::Error;

use crate::integrator::IntegrationError;

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("observation file not found: {}", path.display())]
    MissingInput { path: PathBuf },

    #[error("failed to parse observation data: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid observation in row {row}: {reason}")]
    InvalidObservation { row: usize, reason: String },

    #[error("invalid bounds: need finite lower ({lower}) <= upper ({upper})")]
    InvalidBounds { lower: f64, upper: f64 },

    #[error("trajectory integration failed: {0}")]
    Integration(#[from] IntegrationError),

    #[error("rendering failed: {0}")]
    Render(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CalibrationError>;
