use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for crate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures of the confusion matrix and accuracy computations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetricsError {
    #[error("number of classes must be positive")]
    NoClasses,

    #[error("length mismatch: {predicted} predicted labels vs {actual} actual labels")]
    LengthMismatch { predicted: usize, actual: usize },

    /// A label outside `[0, num_classes)`, with the index it was found at.
    #[error("label {value} at index {index} is outside [0, {num_classes})")]
    OutOfRangeLabel {
        index: usize,
        value: i128,
        num_classes: usize,
    },

    #[error("accuracy is undefined for an empty label sequence")]
    UndefinedAccuracy,

    /// A stored grid whose row `row` has `len` cells instead of `size`.
    #[error("confusion matrix is not square: row {row} has {len} cells, expected {size}")]
    NotSquare { size: usize, row: usize, len: usize },
}

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// A row that does not follow the `features..., label` layout.
    #[error("row {row}: {message}")]
    Schema { row: usize, message: String },

    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("scale divisor must be finite and positive, got {0}")]
    InvalidScale(f64),

    #[error("invalid split: {0}")]
    Split(String),
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model has not been fitted")]
    NotFitted,

    #[error("model was fitted on {expected} features, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },

    #[error("invalid hyperparameter {name} = {value}: {constraint}")]
    InvalidHyperparameter {
        name: &'static str,
        value: String,
        constraint: &'static str,
    },

    #[error("fit failed: {0}")]
    Fit(#[from] linfa_logistic::error::Error),
}

/// Top level error of the toolkit.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error on {path}: {source}")]
    File {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}
