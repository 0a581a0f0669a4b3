//! forest-train CLI Module
//!
//! Command-line interface for training, prediction and range inspection.

use clap::{Parser, Subcommand};
use colored::*;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::load_json;
use crate::inference::{LoggedModel, PredictParams};
use crate::optimizer::create_hyper_parameters_range;
use crate::tracking::{ExperimentTracker, ModelRegistry};
use crate::training::TrainEngine;
use crate::utils::data_loader::load_csv;

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "forest-train")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train, track and serve a random forest classifier")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train a model and log it to the tracking store
    Train {
        /// Training CSV (comma separated, `na` for missing values)
        #[arg(long)]
        path_dataframe_train: PathBuf,

        /// JSON run configuration
        #[arg(long)]
        path_config_json: PathBuf,

        /// Root of the local tracking store
        #[arg(long, default_value = "mlruns")]
        tracking_dir: PathBuf,

        /// Directory the serialized forest is written to
        #[arg(long, default_value = "train_artifacts")]
        artifacts_dir: PathBuf,
    },

    /// Make predictions with a logged model directory
    Predict {
        /// Model directory containing MLmodel.json
        #[arg(short, long)]
        model_dir: PathBuf,

        /// Input CSV
        #[arg(short, long)]
        data: PathBuf,

        /// predict, predict_proba or predict_log_proba (model default if unset)
        #[arg(long)]
        method: Option<String>,

        /// Output CSV (printed when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the hyperparameter ranges a configuration would search
    Ranges {
        /// JSON run configuration
        #[arg(long)]
        path_config_json: PathBuf,
    },
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_train(
    data_path: &Path,
    config_path: &Path,
    tracking_dir: &Path,
    artifacts_dir: &Path,
) -> anyhow::Result<()> {
    section("Train");

    step_run("Loading config");
    let params = load_json(config_path)?;
    step_done(&format!("target {}", params.target));

    step_run("Loading data");
    let start = Instant::now();
    let df = load_csv(data_path)?;
    step_done(&format!("{} rows × {} cols in {:?}", df.height(), df.width(), start.elapsed()));

    let tracker = ExperimentTracker::local(tracking_dir)?;
    let registry = ModelRegistry::open(tracking_dir)?;

    let engine = TrainEngine::new(params, artifacts_dir);
    let report = engine.run(&df, &tracker, Some(&registry))?;

    section("Result");
    println!("  {:<20} {}", muted("Run"), report.run_id.white());
    println!("  {:<20} {}", muted("Model"), report.model_uri.white());
    if let Some(version) = &report.registered_version {
        println!("  {:<20} {} v{}", muted("Registered"), version.name.white(), version.version);
    }
    if let Some(search) = &report.search {
        println!(
            "  {:<20} {}",
            muted(&format!("Search {}", search.scorer)),
            format!("{:.4}", search.best_score).white().bold()
        );
    }
    println!(
        "  {:<20} {}",
        muted("Train accuracy"),
        format!("{:.4}", report.training_accuracy).white().bold()
    );
    if let Some(oob) = report.oob_score {
        println!("  {:<20} {}", muted("OOB score"), format!("{:.4}", oob).white());
    }
    for (key, result) in report.cv_summary.iter().filter(|(k, _)| k.starts_with("test_")) {
        println!(
            "  {:<20} {} {}",
            muted(&format!("CV {}", key.trim_start_matches("test_"))),
            format!("{:.4}", result.mean_score).white(),
            dim(&format!("± {:.4}", result.std_score))
        );
    }
    println!("  {:<20} {}", muted("Time"), format!("{:.3}s", report.training_time_secs).white());
    println!();
    step_ok(&format!("run logged under {}", tracking_dir.display()));
    println!();

    Ok(())
}

pub fn cmd_predict(
    model_dir: &Path,
    data_path: &Path,
    method: Option<&str>,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    section("Predict");

    step_run("Loading model");
    let model = LoggedModel::load(model_dir)?;
    step_done(&format!("{} classes", model.model.classes().len()));

    step_run("Loading data");
    let df = load_csv(data_path)?;
    step_done(&format!("{} rows × {} cols", df.height(), df.width()));

    let params = method.map(|m| PredictParams::new().with_predict_method(m));
    step_run("Predicting");
    let start = Instant::now();
    let predictions = model.predict(&df, params.as_ref())?;
    step_done(&format!("{} rows in {:?}", predictions.n_rows(), start.elapsed()));

    let mut out = predictions.to_dataframe(model.model.classes())?;
    match output {
        Some(path) => {
            let mut file = std::fs::File::create(path)?;
            CsvWriter::new(&mut file).include_header(true).finish(&mut out)?;
            step_ok(&format!("wrote {}", path.display()));
        }
        None => println!("{}", out),
    }
    println!();
    Ok(())
}

pub fn cmd_ranges(config_path: &Path) -> anyhow::Result<()> {
    section("Ranges");

    let params = load_json(config_path)?;
    let distributions = create_hyper_parameters_range(&params)?;

    for (name, values) in distributions.entries() {
        let shown: Vec<String> = values.iter().map(|v| format!("{}", (v * 100.0).round() / 100.0)).collect();
        println!("  {:<20} {}", muted(name), shown.join(", ").white());
    }
    if distributions.max_depth.is_none() {
        println!("  {:<20} {}", muted("max_depth"), dim("unbounded"));
    }
    println!();
    println!(
        "  {:<20} {}",
        muted("Grid size"),
        distributions.grid_size().to_string().white().bold()
    );
    println!(
        "  {:<20} {}",
        muted("Candidates"),
        distributions.grid_size().min(params.search.n_iter).to_string().white()
    );
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_train_args() {
        let cli = Cli::try_parse_from([
            "forest-train",
            "train",
            "--path-dataframe-train",
            "data/train.csv",
            "--path-config-json",
            "config.json",
        ])
        .unwrap();
        match cli.command {
            Commands::Train {
                path_dataframe_train,
                tracking_dir,
                artifacts_dir,
                ..
            } => {
                assert_eq!(path_dataframe_train, PathBuf::from("data/train.csv"));
                assert_eq!(tracking_dir, PathBuf::from("mlruns"));
                assert_eq!(artifacts_dir, PathBuf::from("train_artifacts"));
            }
            _ => panic!("expected train"),
        }
    }

    #[test]
    fn test_parse_predict_args() {
        let cli = Cli::try_parse_from([
            "forest-train",
            "predict",
            "--model-dir",
            "m",
            "--data",
            "d.csv",
            "--method",
            "predict",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Predict { method: Some(ref m), .. } if m == "predict"));
    }

    #[test]
    fn test_train_requires_config() {
        assert!(Cli::try_parse_from(["forest-train", "train", "--path-dataframe-train", "x.csv"]).is_err());
    }
}
