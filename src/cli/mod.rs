// ============================================================
// Layer 1: CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with `clap`.
// All work is delegated to Layer 2 (application).
//
//   1. `train`    trains a model on a Cityscapes-style tree
//   2. `evaluate` scores the best checkpoint, writes a CSV
//   3. `predict`  segments one image into a colour PNG
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, PredictArgs, TrainArgs};

use crate::application::train_use_case::TrainConfig;

#[derive(Parser, Debug)]
#[command(
    name = "cityseg",
    version,
    about = "Train and evaluate UNet / DeepLabv3+ segmentation models on Cityscapes-style data."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
            Commands::Predict(args)  => run_predict(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let cfg = match args.config.as_deref() {
        Some(path) => {
            tracing::info!("Reading training config from '{}'", path);
            TrainConfig::from_json_file(path)?
        }
        None => args.into(),
    };

    let summary = TrainUseCase::new(cfg).execute()?;
    match summary.best {
        Some(best) => println!(
            "Training complete after {} epochs ({} steps). Best mIoU {:.2}% at epoch {}.",
            summary.epochs,
            summary.steps,
            best.miou * 100.0,
            best.epoch
        ),
        None => println!("Training complete after {} epochs ({} steps).", summary.epochs, summary.steps),
    }
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let (report, csv) = EvaluateUseCase::new(args.into()).execute()?;

    println!("Validation loss: {:.4}", report.val_loss);
    println!("mIoU: {:.2}%", report.miou * 100.0);
    println!("Pixel accuracy: {:.2}%", report.pixel_accuracy * 100.0);
    println!("Inference time (ms): {:.02}", report.inference_ms);
    println!("FPS: {:.02}", report.fps);
    for (name, iou) in report.named_iou() {
        match iou {
            Some(iou) => println!("  {name:<14} {:.2}%", iou * 100.0),
            None      => println!("  {name:<14} -"),
        }
    }
    println!("Report saved to '{}'", csv.display());
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::predict_use_case::PredictUseCase;

    let written = PredictUseCase::new(args.checkpoint_dir, args.backend)
        .predict(&args.image, &args.output)?;
    println!("Prediction saved to '{}'", written.display());
    Ok(())
}
