use std::time::Duration;
use log::info;
use crate::context::RunContext;
use crate::error::{PipelineError, PipelineResult};
use crate::process::CommandSpec;
use crate::stage::{Stage, StageResult};
use crate::types::StageKind;

/// Script Invoker: `python <script> [--dry-run] [--debug]` nella directory di checkout.
///
/// L'exit code dello script decide l'esito della run.
pub struct InvokeStage;

impl InvokeStage {
    pub fn command(&self, context: &RunContext<'_>) -> CommandSpec {
        let script = &context.config.script;
        CommandSpec::new(StageKind::Invoke.to_string(), script.interpreter.clone())
            .arg(script.path.display().to_string())
            .args(context.parameters.script_args())
            .current_dir(context.workspace())
            .envs(&script.env)
            .timeout(script.timeout_secs.map(Duration::from_secs))
    }
}

#[async_trait::async_trait]
impl Stage for InvokeStage {
    fn kind(&self) -> StageKind {
        StageKind::Invoke
    }

    fn description(&self) -> &str {
        "Runs the script with the run parameters"
    }

    fn plan(&self, context: &RunContext<'_>) -> Vec<CommandSpec> {
        vec![self.command(context)]
    }

    async fn execute(&self, context: &RunContext<'_>) -> PipelineResult<StageResult> {
        let spec = self.command(context);
        info!(
            "Running {} (dry_run={}, debug={})",
            context.config.script.path.display(),
            context.parameters.dry_run,
            context.parameters.debug
        );

        let output = context.run_command(StageKind::Invoke, &spec).await
            .map_err(|e| PipelineError::script(e.to_string(), None))?;
        if output.timed_out {
            return Err(PipelineError::script(
                format!("'{}' timed out after {}s", spec, spec.timeout.map(|it| it.as_secs()).unwrap_or_default()),
                None,
            ));
        }
        match output.exit_code {
            Some(0) => Ok(StageResult::with_exit_code(Some(0))),
            Some(code) => Err(PipelineError::script(
                format!("script exited with code {}: {}", code, output.diagnostic_tail(3)),
                Some(code),
            )),
            None => Err(PipelineError::script("script was terminated by a signal", None)),
        }
    }
}
