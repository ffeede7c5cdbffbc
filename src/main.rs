use anyhow::Result;
use clap::Parser;
use image::ImageFormat;
use log::info;

use vocprep::config::{Cli, Command, PipelineConfig};
use vocprep::train::{TrainerCommand, TrainingConfig, TrainingRequest};
use vocprep::{audit, integrity, normalize, pipeline};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Check { root, ext } => {
            info!("checking directory: {}", root.display());
            let report = integrity::check_tree(&root, &ext, ImageFormat::Jpeg);
            for issue in &report.issues {
                println!("Invalid JPEG file: {} ({})", issue.path.display(), issue.kind);
            }
            println!(
                "Checked {} file(s), {} invalid.",
                report.checked,
                report.issues.len()
            );
        }

        Command::Audit { root } => {
            let report = audit::audit_tree(&root);
            let output_path = audit::write_error_file(&root, &report)?;
            if report.parse_failures > 0 {
                println!("{} file(s) failed to parse.", report.parse_failures);
            }
            if report.missing_size > 0 {
                println!("{} file(s) have no size block.", report.missing_size);
            }
            println!(
                "Completed. Found {} error(s). Errors saved in {}",
                report.degenerate.len(),
                output_path.display()
            );
        }

        Command::Normalize {
            root,
            dry_run,
            remove_sources,
        } => {
            let ops = normalize::plan(&root)?;
            if dry_run {
                for op in &ops {
                    println!("{}", op);
                }
                println!("{} operation(s) planned.", ops.len());
            } else {
                let report = normalize::apply_plan(
                    &ops,
                    normalize::NormalizeOptions { remove_sources },
                )?;
                println!(
                    "Converted {} image(s), renamed {} image(s), {} without annotations.",
                    report.converted, report.renamed, report.missing_annotations
                );
            }
        }

        Command::Prepare {
            config,
            root,
            val_ratio,
            seed,
            dry_run,
        } => {
            let mut cfg = match config {
                Some(path) => PipelineConfig::from_file(&path)?,
                None => PipelineConfig::default(),
            };
            if let Some(root) = root {
                cfg.dataset_root = root;
            }
            if let Some(ratio) = val_ratio {
                cfg.val_ratio = ratio;
            }
            if let Some(seed) = seed {
                cfg.seed = seed;
            }

            if dry_run {
                let ops = normalize::plan(&cfg.dataset_root)?;
                for op in &ops {
                    println!("{}", op);
                }
                println!("{} normalization operation(s) planned; nothing copied.", ops.len());
            } else {
                let summary = pipeline::prepare(&cfg)?;
                println!(
                    "Prepared {} train and {} validation pair(s).",
                    summary.train_pairs, summary.val_pairs
                );
                if summary.missing_subcategories > 0 {
                    println!(
                        "{} configured subcategory directory(ies) were missing.",
                        summary.missing_subcategories
                    );
                }
            }
        }

        Command::Train {
            program,
            config,
            batch_size,
            epochs,
            train_whole_model,
            export,
        } => {
            let cfg = PipelineConfig::from_file(&config)?;
            let trainer = TrainerCommand::new(program);
            let request = TrainingRequest {
                train_dir: cfg.train_dir.clone(),
                val_dir: cfg.val_dir.clone(),
                labels: cfg.labels(),
                config: TrainingConfig {
                    batch_size,
                    epochs,
                    train_whole_model,
                },
            };

            let evaluation = trainer.train(&request)?;
            println!("Evaluation: {:?}", evaluation.0);

            if let Some(artifact) = export {
                trainer.export(&artifact)?;
                let exported_eval =
                    trainer.evaluate_exported(&artifact, &cfg.val_dir, &request.labels)?;
                println!("Exported model evaluation: {:?}", exported_eval.0);
            }
        }
    }

    Ok(())
}
