use log::info;
use crate::context::RunContext;
use crate::error::{PipelineError, PipelineResult};
use crate::process::CommandSpec;
use crate::stage::{Stage, StageResult};
use crate::types::StageKind;

/// Environment Provisioner: installa i pacchetti Python richiesti dallo script
pub struct ProvisionStage;

impl ProvisionStage {
    fn command(&self, context: &RunContext<'_>) -> Option<CommandSpec> {
        CommandSpec::from_argv(StageKind::Provision.to_string(), &context.config.provision.command_line())
            .map(|it| it.current_dir(context.workspace()))
    }
}

#[async_trait::async_trait]
impl Stage for ProvisionStage {
    fn kind(&self) -> StageKind {
        StageKind::Provision
    }

    fn description(&self) -> &str {
        "Installs the script dependencies"
    }

    fn plan(&self, context: &RunContext<'_>) -> Vec<CommandSpec> {
        self.command(context).into_iter().collect()
    }

    async fn execute(&self, context: &RunContext<'_>) -> PipelineResult<StageResult> {
        let spec = self.command(context)
            .ok_or_else(|| PipelineError::provision("installer command is empty", None))?;
        info!("Installing {}", context.config.provision.packages.join(", "));

        let output = context.run_command(StageKind::Provision, &spec).await
            .map_err(|e| PipelineError::provision(e.to_string(), None))?;
        if !output.success() {
            return Err(PipelineError::provision(
                format!("'{}' failed: {}", spec, output.diagnostic_tail(3)),
                output.exit_code,
            ));
        }
        Ok(StageResult::with_exit_code(output.exit_code))
    }
}

#[cfg(test)]
mod tests {
    use habr_ci_config::PipelineConfig;
    use crate::event::RunEventChannel;
    use crate::process::ProcessRunner;
    use crate::types::RunParameters;
    use super::*;

    #[test]
    fn plan_installs_the_three_packages_in_the_workspace() {
        let config = PipelineConfig::default();
        let channel = RunEventChannel::detached();
        let context = RunContext::new(&config, RunParameters::default(), &ProcessRunner, &channel);

        let plan = ProvisionStage.plan(&context);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].to_string(), "pip install requests transliterate pillow");
        assert_eq!(plan[0].working_dir.as_deref(), Some(config.workspace_dir.as_path()));
    }
}
