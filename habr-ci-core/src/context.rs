use std::path::Path;
use habr_ci_config::PipelineConfig;
use log::debug;
use crate::error::PipelineResult;
use crate::event::{RunEventChannel, RunEventKind};
use crate::process::{CommandOutput, CommandRunner, CommandSpec};
use crate::types::{RunParameters, StageKind};

/// Contesto di una singola run, condiviso (in sola lettura) da tutti gli stage.
///
/// I parametri sono copiati qui al momento del trigger e non cambiano più:
/// gli stage non leggono mai l'ambiente globale per decidere i flag.
pub struct RunContext<'a> {
    pub config: &'a PipelineConfig,
    pub parameters: RunParameters,
    pub runner: &'a dyn CommandRunner,
    pub channel: &'a RunEventChannel,
}

impl<'a> RunContext<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        parameters: RunParameters,
        runner: &'a dyn CommandRunner,
        channel: &'a RunEventChannel,
    ) -> Self {
        Self { config, parameters, runner, channel }
    }

    pub fn workspace(&self) -> &Path {
        &self.config.workspace_dir
    }

    /// Esegue un comando per conto di uno stage, emettendo gli eventi relativi
    pub async fn run_command(&self, stage: StageKind, spec: &CommandSpec) -> PipelineResult<CommandOutput> {
        let command = spec.to_string();
        debug!("[{}] {}", stage, command);
        self.channel.emit(RunEventKind::CommandStarted {
            stage,
            command: command.clone(),
            working_dir: spec.working_dir.as_ref().map(|it| it.display().to_string()),
        });

        let output = self.runner.run(spec).await?;

        self.channel.emit(RunEventKind::CommandCompleted {
            stage,
            command,
            exit_code: output.exit_code,
            duration_ms: output.duration_ms,
        });
        Ok(output)
    }
}
