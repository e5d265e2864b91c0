use std::{error::Error, path::PathBuf};

use clap::{Parser, Subcommand};
use rdigits::{
    config::ExperimentConfig,
    dataset::LabeledDataset,
    evaluation::{self, SweepReport},
    model::Hyperparameters,
};

#[derive(Parser)]
#[command(name = "rdigits")]
#[command(about = "Train and evaluate logistic regression on labeled digit datasets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print dataset shape, class counts and optionally one image
    Inspect {
        /// CSV or parquet file, label in the last column
        dataset: PathBuf,

        /// Row to print as a square pixel grid
        #[arg(short, long)]
        index: Option<usize>,
    },

    /// Fit one model on one train/test split
    Evaluate {
        dataset: PathBuf,

        #[arg(short, long, default_value = "0.25")]
        test_fraction: f64,

        /// L2 regularization strength
        #[arg(short, long, default_value = "1.0")]
        regularization: f64,

        #[arg(short, long, default_value = "100")]
        max_iterations: u64,

        #[arg(long)]
        num_classes: Option<usize>,

        /// Divide every feature by this value before training
        #[arg(long)]
        pixel_scale: Option<f64>,

        #[arg(long, default_value = "0")]
        seed: u64,

        /// Write the report as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run every split/hyperparameter combination of a JSON config
    Sweep {
        /// JSON config; a relative `dataset` path is resolved against its directory
        config: PathBuf,

        /// Write the report as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    match Cli::parse().command {
        Commands::Inspect { dataset, index } => inspect(&LabeledDataset::load(dataset)?, index),
        Commands::Evaluate {
            dataset,
            test_fraction,
            regularization,
            max_iterations,
            num_classes,
            pixel_scale,
            seed,
            output,
        } => {
            let config = ExperimentConfig {
                dataset,
                num_classes,
                pixel_scale,
                seed,
                test_fractions: vec![test_fraction],
                hyperparameters: vec![Hyperparameters {
                    regularization,
                    max_iterations,
                    ..Default::default()
                }],
            };
            run(&config, output)
        }
        Commands::Sweep { config, output } => {
            let config = ExperimentConfig::load(&config)?;
            run(&config, output)
        }
    }
}

fn run(config: &ExperimentConfig, output: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let report = evaluation::run_experiment(config)?;
    print_report(&report);

    if let Some(path) = output {
        evaluation::save_report(&report, &path)?;
        println!("Report written to {}", path.display());
    }
    Ok(())
}

fn print_report(report: &SweepReport) {
    for (name, run) in &report.runs {
        println!("== {name}");
        println!(
            "Train size: {}, test size: {}",
            run.report.train_size, run.report.test_size
        );
        println!("Train accuracy: {:.4}", run.report.train_accuracy);
        println!("Eval. accuracy: {:.4}", run.report.test_accuracy);
        print!("{}", run.report.confusion);
        for outcome in run.report.confusion.class_outcomes() {
            println!(
                "class {}: {} correct, {} wrong",
                outcome.class, outcome.correct, outcome.wrong
            );
        }
    }

    if report.runs.len() > 1 {
        if let Some((name, run)) = report.best() {
            println!("Best: {} ({:.4})", name, run.report.test_accuracy);
        }
    }
}

fn inspect(dataset: &LabeledDataset, index: Option<usize>) -> Result<(), Box<dyn Error>> {
    println!(
        "{} rows, {} features, {} classes",
        dataset.len(),
        dataset.n_features(),
        dataset.num_classes()
    );
    for (class, count) in dataset
        .class_counts(dataset.num_classes())
        .into_iter()
        .enumerate()
    {
        println!("class {class}: {count}");
    }

    if let Some(index) = index {
        let image = dataset.image(index).ok_or_else(|| {
            format!(
                "row {index} does not exist or {} features do not form a square image",
                dataset.n_features()
            )
        })?;
        println!("label: {}", dataset.labels()[index]);
        for row in image.rows() {
            let line: Vec<String> = row.iter().map(|v| format!("{v:>4}")).collect();
            println!("{}", line.join(""));
        }
    }
    Ok(())
}
