use serde::{de::Error as _, Deserialize, Serialize};
use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use crate::{error::Error, model::Hyperparameters};

/// A train/evaluate sweep over test fractions and hyperparameter sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// CSV or parquet file with a trailing label column.
    pub dataset: PathBuf,
    /// Number of classes. Inferred from the largest label when absent.
    pub num_classes: Option<usize>,
    /// Divisor applied to every feature before training.
    pub pixel_scale: Option<f64>,
    /// Seed of the train/test shuffle.
    pub seed: u64,
    pub test_fractions: Vec<f64>,
    pub hyperparameters: Vec<Hyperparameters>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            dataset: PathBuf::from("datasets/digits.csv"),
            num_classes: None,
            pixel_scale: None,
            seed: 0,
            test_fractions: vec![0.25],
            hyperparameters: vec![Hyperparameters::default()],
        }
    }
}

impl ExperimentConfig {
    /// Loads a config from a file.
    pub fn load_from_file(file: &mut dyn Read) -> Result<Self, serde_json::Error> {
        let mut buffer = String::new();
        file.read_to_string(&mut buffer)
            .map_err(serde_json::Error::custom)?;
        serde_json::from_str(&buffer)
    }

    /// Loads a config from `path`. A relative `dataset` is taken relative to the
    /// directory holding the config file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let mut file = File::open(path).map_err(|source| Error::File {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::load_from_file(&mut file)?;
        if let Some(dir) = path.parent() {
            config.resolve_dataset(dir);
        }
        Ok(config)
    }

    /// Joins a relative `dataset` path onto `base`.
    pub fn resolve_dataset(&mut self, base: &Path) {
        if self.dataset.is_relative() {
            self.dataset = base.join(&self.dataset);
        }
    }

    /// Saves a config to a file.
    pub fn save_to_file(&self, file: &mut dyn std::io::Write) -> Result<(), serde_json::Error> {
        let serialized = serde_json::to_string_pretty(self)?;
        file.write_all(serialized.as_bytes())
            .map_err(serde_json::Error::custom)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.test_fractions.is_empty() {
            return Err(Error::Config("at least one test fraction is required".into()));
        }
        if let Some(&fraction) = self
            .test_fractions
            .iter()
            .find(|&&f| !(f > 0.0 && f < 1.0))
        {
            return Err(Error::Config(format!(
                "test fraction {fraction} is outside (0, 1)"
            )));
        }
        if self.hyperparameters.is_empty() {
            return Err(Error::Config(
                "at least one hyperparameter set is required".into(),
            ));
        }
        for params in &self.hyperparameters {
            params.validate()?;
        }
        if self.num_classes == Some(0) {
            return Err(Error::Config("num_classes must be positive".into()));
        }
        if let Some(scale) = self.pixel_scale {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(Error::Config(format!("pixel_scale {scale} must be positive")));
            }
        }
        Ok(())
    }
}
