// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with `clap`.
// All business logic is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `train`    - trains (or with --test only evaluates) the model
//   2. `generate` - loads the output directory and describes one image
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, GenerateArgs, TrainArgs};

use crate::ml::evaluator::SplitEvaluation;

#[derive(Parser, Debug)]
#[command(
    name = "xray-report-gen",
    version = "0.1.0",
    about = "Predict findings and write impressions for chest X-rays."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case; this layer only routes and prints.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Generate(args) => run_generate(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Reports: {} | images: {}", args.csv, args.image_dir);
    let use_case = TrainUseCase::new(args.into());
    let results  = use_case.execute()?;
    print_summary(&results);
    Ok(())
}

fn run_generate(args: GenerateArgs) -> Result<()> {
    use crate::application::generate_use_case::GenerateUseCase;

    let use_case = GenerateUseCase::new(&args.outdir, args.threshold, args.temperature, args.seed)?;
    let report   = use_case.generate(&args.image)?;

    println!("\nFindings:");
    if report.findings.is_empty() {
        println!("  (none above {:.2})", args.threshold);
    }
    for (class, p) in &report.findings {
        println!("  {class:<24} {p:.3}");
    }
    println!("\nImpression: {}", report.impression);
    Ok(())
}

fn print_summary(results: &[SplitEvaluation]) {
    let map: Vec<String> = results
        .iter()
        .map(|r| format!("{} mAP - {:.3}", r.split, r.classification.mean_ap))
        .collect();
    println!("* {}", map.join(" - "));

    let bleu: Vec<String> = results
        .iter()
        .map(|r| format!("{} {:.3}", r.split, r.bleu1))
        .collect();
    println!("* BLEU-1 scores: {}", bleu.join(", "));
}
