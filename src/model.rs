use linfa::{
    traits::{Fit, Predict},
    Dataset,
};
use linfa_logistic::{MultiFittedLogisticRegression, MultiLogisticRegression};
use log::debug;
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Base trait for classifiers producing integer labels from feature rows.
pub trait Classifier {
    fn fit(&mut self, features: ArrayView2<f64>, labels: ArrayView1<usize>)
        -> Result<(), ModelError>;
    fn predict(&self, features: ArrayView2<f64>) -> Result<Array1<usize>, ModelError>;
}

/// Training settings of [`LogisticClassifier`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    /// L2 penalty strength (inverse of scikit-style `C`).
    pub regularization: f64,
    /// Iteration cap of the L-BFGS solver.
    pub max_iterations: u64,
    /// Gradient norm at which the solver stops.
    pub gradient_tolerance: f64,
    pub fit_intercept: bool,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            regularization: 1.0,
            max_iterations: 100,
            gradient_tolerance: 1e-4,
            fit_intercept: true,
        }
    }
}

impl Hyperparameters {
    pub fn validate(&self) -> Result<(), ModelError> {
        if !(self.regularization.is_finite() && self.regularization >= 0.0) {
            return Err(ModelError::InvalidHyperparameter {
                name: "regularization",
                value: self.regularization.to_string(),
                constraint: "must be finite and non-negative",
            });
        }
        if self.max_iterations == 0 {
            return Err(ModelError::InvalidHyperparameter {
                name: "max_iterations",
                value: self.max_iterations.to_string(),
                constraint: "must be at least 1",
            });
        }
        if !(self.gradient_tolerance.is_finite() && self.gradient_tolerance > 0.0) {
            return Err(ModelError::InvalidHyperparameter {
                name: "gradient_tolerance",
                value: self.gradient_tolerance.to_string(),
                constraint: "must be finite and positive",
            });
        }
        Ok(())
    }
}

/// Multinomial logistic regression backed by `linfa-logistic`.
pub struct LogisticClassifier {
    params: Hyperparameters,
    /// The fitted model and the feature count it was trained on.
    fitted: Option<(MultiFittedLogisticRegression<f64, usize>, usize)>,
}

impl LogisticClassifier {
    pub fn new(params: Hyperparameters) -> Result<Self, ModelError> {
        params.validate()?;
        Ok(Self {
            params,
            fitted: None,
        })
    }

    #[inline]
    pub fn params(&self) -> &Hyperparameters {
        &self.params
    }

    #[inline]
    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }
}

impl Classifier for LogisticClassifier {
    /// Fits the model on the feature rows and their labels.
    fn fit(
        &mut self,
        features: ArrayView2<f64>,
        labels: ArrayView1<usize>,
    ) -> Result<(), ModelError> {
        let dataset = Dataset::new(features.to_owned(), labels.to_owned());
        debug!(
            "Fitting logistic regression on {} rows, {:?}",
            features.nrows(),
            self.params
        );

        let model = MultiLogisticRegression::default()
            .alpha(self.params.regularization)
            .max_iterations(self.params.max_iterations)
            .gradient_tolerance(self.params.gradient_tolerance)
            .with_intercept(self.params.fit_intercept)
            .fit(&dataset)?;

        self.fitted = Some((model, features.ncols()));
        Ok(())
    }

    /// Predicts a label for every feature row.
    fn predict(&self, features: ArrayView2<f64>) -> Result<Array1<usize>, ModelError> {
        let (model, n_features) = self.fitted.as_ref().ok_or(ModelError::NotFitted)?;
        if features.ncols() != *n_features {
            return Err(ModelError::FeatureMismatch {
                expected: *n_features,
                actual: features.ncols(),
            });
        }
        let predicted: Array1<usize> = model.predict(&features);
        Ok(predicted)
    }
}
