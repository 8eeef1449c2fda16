pub mod types;
pub mod context;
pub mod error;
pub mod event;
pub mod hook;
pub mod lock;
pub mod process;
pub mod stage;
pub mod engine;

pub use engine::PipelineEngine;
pub use error::{PipelineError, PipelineResult};
pub use event::{RunEvent, RunEventChannel, RunEventKind};
pub use process::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
pub use types::{RunOutcome, RunParameters, RunReport, StageKind, StageRecord, StageStatus};
