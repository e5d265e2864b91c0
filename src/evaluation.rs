use std::{fs::File, io::Read, path::Path};

use indexmap::IndexMap;
use log::info;
use serde::{de::Error as _, Deserialize, Serialize};

use crate::{
    config::ExperimentConfig,
    dataset::LabeledDataset,
    error::{Error, Result},
    metrics::{self, ConfusionMatrix},
    model::{Classifier, Hyperparameters, LogisticClassifier},
};

/// Outcome of fitting one model on one train/test split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub train_size: usize,
    pub test_size: usize,
    pub train_accuracy: f64,
    pub test_accuracy: f64,
    /// Test-set confusion matrix, rows predicted, columns actual.
    pub confusion: ConfusionMatrix,
    /// Test-set recall per class, `None` for classes absent from the test set.
    pub recall: Vec<Option<f64>>,
}

/// One entry of a sweep: the settings used and the resulting report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRun {
    pub test_fraction: f64,
    pub hyperparameters: Hyperparameters,
    pub report: RunReport,
}

/// Sweep results in the order they were run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub runs: IndexMap<String, SweepRun>,
}

impl SweepReport {
    /// The run with the highest test accuracy. Ties keep the earliest run.
    pub fn best(&self) -> Option<(&str, &SweepRun)> {
        self.runs
            .iter()
            .fold(None, |best: Option<(&String, &SweepRun)>, (name, run)| match best {
                Some((_, b)) if b.report.test_accuracy >= run.report.test_accuracy => best,
                _ => Some((name, run)),
            })
            .map(|(name, run)| (name.as_str(), run))
    }

    /// Loads a report from a file.
    pub fn load_from_file(file: &mut dyn Read) -> std::result::Result<Self, serde_json::Error> {
        let mut buffer = String::new();
        file.read_to_string(&mut buffer)
            .map_err(serde_json::Error::custom)?;
        serde_json::from_str(&buffer)
    }

    /// Saves a report to a file.
    pub fn save_to_file(
        &self,
        file: &mut dyn std::io::Write,
    ) -> std::result::Result<(), serde_json::Error> {
        let serialized = serde_json::to_string_pretty(self)?;
        file.write_all(serialized.as_bytes())
            .map_err(serde_json::Error::custom)
    }
}

/// Fits `model` on `train` and scores it on both splits.
pub fn evaluate<C: Classifier>(
    model: &mut C,
    train: &LabeledDataset,
    test: &LabeledDataset,
    num_classes: usize,
) -> Result<RunReport> {
    model.fit(train.features(), train.labels())?;

    let train_predicted = model.predict(train.features())?.to_vec();
    let train_accuracy = metrics::accuracy(&train_predicted, &train.labels().to_vec())?;

    let test_predicted = model.predict(test.features())?.to_vec();
    let test_labels = test.labels().to_vec();
    let confusion = metrics::confusion_matrix(&test_predicted, &test_labels, num_classes)?;
    let test_accuracy = confusion.accuracy()?;

    Ok(RunReport {
        train_size: train.len(),
        test_size: test.len(),
        train_accuracy,
        test_accuracy,
        recall: (0..num_classes).map(|class| confusion.recall(class)).collect(),
        confusion,
    })
}

/// Loads the configured dataset and prepares it for training.
pub fn prepare_dataset(config: &ExperimentConfig) -> Result<(LabeledDataset, usize)> {
    let mut dataset = LabeledDataset::load(&config.dataset)?;
    if let Some(scale) = config.pixel_scale {
        dataset = dataset.scaled(scale)?;
    }
    let num_classes = config.num_classes.unwrap_or_else(|| dataset.num_classes());
    if dataset.num_classes() > num_classes {
        return Err(Error::Config(format!(
            "dataset has labels up to {} but num_classes is {}",
            dataset.num_classes() - 1,
            num_classes
        )));
    }
    dataset.warn_missing_classes(num_classes);
    Ok((dataset, num_classes))
}

/// Runs every `test_fraction × hyperparameters` combination on an in-memory dataset.
pub fn sweep(
    dataset: &LabeledDataset,
    num_classes: usize,
    config: &ExperimentConfig,
) -> Result<SweepReport> {
    config.validate()?;

    let mut report = SweepReport::default();
    for (split, &test_fraction) in config.test_fractions.iter().enumerate() {
        let (train, test) = dataset.train_test_split(test_fraction, config.seed)?;
        for (set, params) in config.hyperparameters.iter().enumerate() {
            let mut model = LogisticClassifier::new(*params)?;
            let run = evaluate(&mut model, &train, &test, num_classes)?;

            let name = run_name(split, set, test_fraction, params);
            info!(
                "{}: train accuracy {:.4}, test accuracy {:.4}",
                name, run.train_accuracy, run.test_accuracy
            );
            let previous = report.runs.insert(
                name.clone(),
                SweepRun {
                    test_fraction,
                    hyperparameters: *params,
                    report: run,
                },
            );
            if previous.is_some() {
                return Err(Error::Config(format!("duplicate run name {name}")));
            }
        }
    }

    Ok(report)
}

/// Report key of one run. The `split.set` prefix keeps keys unique even when
/// settings repeat.
fn run_name(split: usize, set: usize, test_fraction: f64, params: &Hyperparameters) -> String {
    format!(
        "{}.{} test={} alpha={} iters={} tol={} intercept={}",
        split,
        set,
        test_fraction,
        params.regularization,
        params.max_iterations,
        params.gradient_tolerance,
        params.fit_intercept
    )
}

/// Loads the configured dataset and runs the full sweep.
pub fn run_experiment(config: &ExperimentConfig) -> Result<SweepReport> {
    config.validate()?;
    let (dataset, num_classes) = prepare_dataset(config)?;
    info!(
        "Dataset {}: {} rows, {} features, {} classes",
        config.dataset.display(),
        dataset.len(),
        dataset.n_features(),
        num_classes
    );
    sweep(&dataset, num_classes, config)
}

/// Writes `report` as JSON to `path`.
pub fn save_report(report: &SweepReport, path: &Path) -> Result<()> {
    let mut file = File::create(path).map_err(|source| Error::File {
        path: path.to_path_buf(),
        source,
    })?;
    report.save_to_file(&mut file)?;
    Ok(())
}
