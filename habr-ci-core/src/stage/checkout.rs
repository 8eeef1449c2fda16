use std::path::Path;
use log::{info, warn};
use crate::context::RunContext;
use crate::error::{PipelineError, PipelineResult};
use crate::process::CommandSpec;
use crate::stage::{Stage, StageResult};
use crate::types::StageKind;

/// Source Fetcher: clona il repository, oppure aggiorna il checkout esistente
pub struct CheckoutStage;

/// Come viene preparato il checkout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutMode {
    Clone,
    Update,
}

impl CheckoutMode {
    pub fn detect(workspace: &Path) -> Self {
        if workspace.join(".git").exists() {
            Self::Update
        } else {
            Self::Clone
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Clone => "clone",
            Self::Update => "update",
        }
    }
}

impl CheckoutStage {
    fn commands(&self, context: &RunContext<'_>, mode: CheckoutMode) -> Vec<CommandSpec> {
        let repository = &context.config.repository;
        let workspace = context.workspace().display().to_string();
        let git = |args: &[&str]| CommandSpec::new(StageKind::Checkout.to_string(), "git").args(args.iter().copied());

        match mode {
            CheckoutMode::Clone => vec![
                git(&["clone", "--branch", repository.branch.as_str(), "--single-branch", repository.url.as_str(), workspace.as_str()]),
            ],
            CheckoutMode::Update => vec![
                git(&["-C", workspace.as_str(), "checkout", repository.branch.as_str()]),
                git(&["-C", workspace.as_str(), "pull", "--ff-only", "origin", repository.branch.as_str()]),
                git(&["-C", workspace.as_str(), "clean", "-fd"]),
            ],
        }
    }

    async fn head_commit(&self, context: &RunContext<'_>) -> Option<String> {
        let workspace = context.workspace().display().to_string();
        let spec = CommandSpec::new(StageKind::Checkout.to_string(), "git")
            .args(["-C", workspace.as_str(), "rev-parse", "HEAD"]);
        match context.run_command(StageKind::Checkout, &spec).await {
            Ok(output) if output.success() => Some(output.stdout.trim().to_string()),
            Ok(output) => {
                warn!("Cannot read HEAD commit: {}", output.diagnostic_tail(1));
                None
            }
            Err(e) => {
                warn!("Cannot read HEAD commit: {}", e);
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl Stage for CheckoutStage {
    fn kind(&self) -> StageKind {
        StageKind::Checkout
    }

    fn description(&self) -> &str {
        "Clones the repository, or updates and cleans an existing checkout"
    }

    fn plan(&self, context: &RunContext<'_>) -> Vec<CommandSpec> {
        self.commands(context, CheckoutMode::detect(context.workspace()))
    }

    async fn execute(&self, context: &RunContext<'_>) -> PipelineResult<StageResult> {
        let mode = CheckoutMode::detect(context.workspace());
        let repository = &context.config.repository;
        info!(
            "Checkout ({}) of {} at '{}' into '{}'",
            mode.as_str(),
            repository.url,
            repository.branch,
            context.workspace().display()
        );

        if mode == CheckoutMode::Clone {
            if let Some(parent) = context.workspace().parent().filter(|it| !it.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await
                    .map_err(|e| PipelineError::checkout(format!("cannot create '{}': {}", parent.display(), e), None))?;
            }
        }

        let mut last_exit_code = None;
        for spec in self.commands(context, mode) {
            let output = context.run_command(StageKind::Checkout, &spec).await
                .map_err(|e| PipelineError::checkout(e.to_string(), None))?;
            if !output.success() {
                return Err(PipelineError::checkout(
                    format!("'{}' failed: {}", spec, output.diagnostic_tail(3)),
                    output.exit_code,
                ));
            }
            last_exit_code = output.exit_code;
        }

        let mut result = StageResult::with_exit_code(last_exit_code);
        result.metadata.insert("mode".to_string(), mode.as_str().to_string());
        if let Some(commit) = self.head_commit(context).await {
            info!("Checked out commit {}", commit);
            result.metadata.insert("commit".to_string(), commit);
        }
        Ok(result)
    }
}
