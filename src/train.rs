//! Driver for the external model-training pipeline.
//!
//! Training, the model architecture and evaluation are owned by an external
//! toolkit; this module only builds its invocation from a prepared dataset
//! and hands back whatever metrics it reports. Failures of the external
//! trainer are surfaced as-is.

use anyhow::{bail, Context, Result};
use log::info;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Knobs forwarded to the external trainer.
#[derive(Debug, Clone, Copy)]
pub struct TrainingConfig {
    pub batch_size: u32,
    pub epochs: u32,
    /// Fine-tune the whole model instead of only the detection head.
    pub train_whole_model: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: 4,
            epochs: 20,
            train_whole_model: false,
        }
    }
}

/// One training invocation: the partitioned directories, the class labels
/// and the configuration.
#[derive(Debug, Clone)]
pub struct TrainingRequest {
    pub train_dir: PathBuf,
    pub val_dir: PathBuf,
    pub labels: Vec<String>,
    pub config: TrainingConfig,
}

/// Metric map reported by the trainer, e.g. `{"AP": 0.62, "AP50": 0.87}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Evaluation(pub BTreeMap<String, f64>);

/// An external trainer executable speaking the flat argument contract below.
#[derive(Debug, Clone)]
pub struct TrainerCommand {
    pub program: PathBuf,
}

impl TrainerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Train on the prepared dataset and return the trainer's evaluation of
    /// the validation set.
    pub fn train(&self, request: &TrainingRequest) -> Result<Evaluation> {
        self.run(train_args(request))
    }

    /// Ask the trainer to export the last trained model as a single
    /// portable artifact file.
    pub fn export(&self, artifact: &Path) -> Result<()> {
        self.invoke(export_args(artifact))?;
        info!("exported model artifact {}", artifact.display());
        Ok(())
    }

    /// Re-evaluate an exported artifact against the same validation set.
    pub fn evaluate_exported(
        &self,
        artifact: &Path,
        val_dir: &Path,
        labels: &[String],
    ) -> Result<Evaluation> {
        self.run(evaluate_args(artifact, val_dir, labels))
    }

    fn run(&self, args: Vec<OsString>) -> Result<Evaluation> {
        let stdout = self.invoke(args)?;
        parse_metrics(&stdout)
    }

    fn invoke(&self, args: Vec<OsString>) -> Result<String> {
        info!("running {} {:?}", self.program.display(), args);
        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .with_context(|| format!("failed to run trainer {}", self.program.display()))?;
        if !output.status.success() {
            bail!(
                "trainer {} failed ({}): {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// The last non-empty stdout line is the JSON metric map.
fn parse_metrics(stdout: &str) -> Result<Evaluation> {
    let line = stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .context("trainer produced no output to parse metrics from")?;
    serde_json::from_str(line.trim())
        .with_context(|| format!("failed to parse trainer metrics from '{}'", line.trim()))
}

pub fn train_args(request: &TrainingRequest) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "train".into(),
        "--train-dir".into(),
        request.train_dir.clone().into(),
        "--val-dir".into(),
        request.val_dir.clone().into(),
        "--labels".into(),
        request.labels.join(",").into(),
        "--batch-size".into(),
        request.config.batch_size.to_string().into(),
        "--epochs".into(),
        request.config.epochs.to_string().into(),
    ];
    if request.config.train_whole_model {
        args.push("--train-whole-model".into());
    }
    args
}

pub fn export_args(artifact: &Path) -> Vec<OsString> {
    vec![
        "export".into(),
        "--output".into(),
        artifact.to_path_buf().into(),
    ]
}

pub fn evaluate_args(artifact: &Path, val_dir: &Path, labels: &[String]) -> Vec<OsString> {
    vec![
        "evaluate".into(),
        "--model".into(),
        artifact.to_path_buf().into(),
        "--val-dir".into(),
        val_dir.to_path_buf().into(),
        "--labels".into(),
        labels.join(",").into(),
    ]
}
