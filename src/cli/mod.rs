// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction. Parses arguments with
// clap and hands the work to Layer 2 (application).
//
//   1. `train`    — trains the classifier on a review file
//   2. `classify` — loads a checkpoint and classifies texts
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{ClassifyArgs, Commands, TrainArgs};
use std::path::Path;

use crate::ml::inferencer::Prediction;

#[derive(Parser, Debug)]
#[command(
    name = "han",
    version = "0.1.0",
    about = "Train a hierarchical attention network on reviews, then classify new ones."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Classify(args) => run_classify(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on '{}'", args.dataset);
    let report = TrainUseCase::new(args.into()).execute()?;

    match report.test_accuracy {
        Some(acc) => println!("Training complete after {} epochs. Test accuracy: {:.2}%", report.epochs, acc * 100.0),
        None      => println!("Training complete after {} epochs.", report.epochs),
    }
    Ok(())
}

fn run_classify(args: ClassifyArgs) -> Result<()> {
    use crate::application::classify_use_case::ClassifyUseCase;

    let use_case    = ClassifyUseCase::new(&args.checkpoint_dir)?;
    let predictions = match &args.input {
        Some(path) => use_case.classify_file(Path::new(path))?,
        None       => use_case.classify_texts(&args.texts)?,
    };

    for (k, p) in predictions.iter().enumerate() {
        print_prediction(k, p, args.attention);
    }
    Ok(())
}

fn print_prediction(index: usize, p: &Prediction, attention: bool) {
    let confidence = p.probabilities.get(p.class).copied().unwrap_or(0.0);
    println!("[{}] label={} (p={:.3})", index, p.label, confidence);
    if attention {
        for s in &p.sentences {
            println!("    {:>6.3}  {}", s.weight, s.text);
        }
    }
}
