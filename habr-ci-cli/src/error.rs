use habr_ci_config::ConfigError;
use habr_ci_core::PipelineError;
use habr_ci_scheduler::ScheduleError;
use thiserror::Error;

/// Errori che impediscono di avviare (o riportare) una run: exit code 2
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("Cannot open event log '{path}': {message}")]
    EventLog {
        path: String,
        message: String,
    },

    #[error("Cannot serialize run report: {0}")]
    Report(String),
}

pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub const EXIT_CODE: u8 = 2;
}
