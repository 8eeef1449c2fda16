use std::path::PathBuf;
use clap::{ArgAction, Args, Parser, Subcommand};
use habr_ci_core::RunParameters;

#[derive(Parser, Debug)]
#[command(name = "habr-ci", version, about = "Scheduled runner for the changed-habr-articles job")]
pub struct Cli {
    #[arg(long, global = true, help = "JSON configuration file (overrides the built-in defaults)")]
    pub config: Option<PathBuf>,
    #[arg(short, long, global = true, action = ArgAction::Count, help = "More log output (-v debug, -vv trace); RUST_LOG wins")]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline once, now
    Run {
        #[command(flatten)]
        parameters: ParameterArgs,
        #[arg(long, help = "Print the run report as JSON instead of the result message")]
        json: bool,
        #[arg(long, help = "Append run events as JSON lines to this file")]
        events: Option<PathBuf>,
    },
    /// Wait for the schedule and run the pipeline at every fire time
    Schedule {
        #[command(flatten)]
        parameters: ParameterArgs,
        #[arg(long, help = "Append run events as JSON lines to this file")]
        events: Option<PathBuf>,
    },
    /// Print the commands a run would execute, without executing them
    Plan {
        #[command(flatten)]
        parameters: ParameterArgs,
    },
    /// Print the upcoming fire times of the schedule
    Next {
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
}

/// Override da riga di comando per `DRY_RUN` / `DEBUG`
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct ParameterArgs {
    #[arg(long, conflicts_with = "no_dry_run", help = "Pass --dry-run to the script (default)")]
    pub dry_run: bool,
    #[arg(long, help = "Run the script for real")]
    pub no_dry_run: bool,
    #[arg(long, help = "Pass --debug to the script")]
    pub debug: bool,
}

impl ParameterArgs {
    /// I flag vincono sui valori letti dall'ambiente
    pub fn resolve(&self, mut base: RunParameters) -> RunParameters {
        if self.dry_run {
            base.dry_run = true;
        }
        if self.no_dry_run {
            base.dry_run = false;
        }
        if self.debug {
            base.debug = true;
        }
        base
    }
}
