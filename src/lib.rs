//! Evaluation toolkit for labeled digit classification: confusion matrices,
//! accuracy, dataset loading and a logistic-regression sweep runner.

pub mod config;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod metrics;
pub mod model;

pub use error::{Error, MetricsError, Result};
pub use metrics::{accuracy, confusion_matrix, confusion_matrix_par, ConfusionMatrix};
