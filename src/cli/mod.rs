// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses the command line with clap and hands the work to the
// application layer. Results are printed here and nowhere else.
//
//   train   — run (or resume) a training
//   history — print a saved history file

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, HistoryArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "tap-denoiser",
    version = "0.1.0",
    about = "Train speech enhancement models with waveform, spectral and acoustic-parameter losses."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)   => Self::run_train(args),
            Commands::History(args) => Self::run_history(args),
        }
    }

    fn run_train(args: TrainArgs) -> Result<()> {
        use crate::application::train_use_case::TrainUseCase;

        let config = args.into_config()?;
        tracing::info!("Starting training on clips in: {}", config.data.train_dir.display());

        let history = TrainUseCase::new(config).execute()?;
        match history.last() {
            Some(last) => println!("Training complete after {} epochs. {}", history.len(), last.summary()),
            None => println!("Nothing to train, checkpoint written."),
        }
        Ok(())
    }

    fn run_history(args: HistoryArgs) -> Result<()> {
        use crate::application::history_use_case::HistoryUseCase;

        for line in HistoryUseCase::new(args.path).summary_lines()? {
            println!("{line}");
        }
        Ok(())
    }
}
