// ============================================================
// Layer 1 - CLI / Presentation Layer
// ============================================================
// Parses the command line with clap and delegates all work to
// Layer 2 (application). Two commands:
//
//   train     fit a model, test it, plot the predictions
//   evaluate  reload a finished run and test it again
//
// The only printing besides the per-epoch lines happens here.

pub mod commands;
pub mod report;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, TrainArgs};

use crate::application::train_use_case::ExperimentConfig;

#[derive(Parser, Debug)]
#[command(
    name = "cosmo-infer",
    version = "0.1.0",
    about = "Infer cosmological parameters from 2D field maps with scattering, ViT or CNN regressors."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let config = ExperimentConfig::try_from(args)?;
    tracing::info!(
        "Training {} with {} outputs, checkpoints in '{}'",
        config.architecture, config.features.get(), config.checkpoint_dir.display()
    );

    let report = TrainUseCase::new(config).execute()?;
    print!("{}", report::render(&report));
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let report = EvaluateUseCase::new(args.checkpoint_dir)
        .with_accelerator(args.accelerator)
        .with_plot_dir(args.plot_dir)
        .execute()?;
    print!("{}", report::render(&report));
    Ok(())
}
