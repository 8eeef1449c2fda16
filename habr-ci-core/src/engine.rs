use std::sync::Arc;
use std::time::Instant;
use chrono::Utc;
use habr_ci_config::PipelineConfig;
use log::{error, info};
use crate::context::RunContext;
use crate::error::PipelineResult;
use crate::event::{RunEventChannel, RunEventKind};
use crate::hook::{HookHandler, HookRegistry};
use crate::lock::WorkspaceLock;
use crate::process::{CommandRunner, CommandSpec, ProcessRunner};
use crate::stage::{default_stages, ResultReporter, Stage};
use crate::types::{RunOutcome, RunParameters, RunReport, StageKind, StageRecord, StageStatus};

/// Esegue la pipeline: Fetch → Provision → Invoke, poi i post hook (Report).
///
/// Ogni stage deve terminare prima che parta il successivo; il primo errore
/// interrompe la sequenza e gli stage rimanenti vengono registrati come skipped.
pub struct PipelineEngine {
    config: Arc<PipelineConfig>,
    runner: Arc<dyn CommandRunner>,
    stages: Vec<Arc<dyn Stage>>,
    hooks: HookRegistry,
}

impl PipelineEngine {
    /// Engine con processi reali e il reporter su stdout
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_runner(config, Arc::new(ProcessRunner))
    }

    pub fn with_runner(config: PipelineConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let mut hooks = HookRegistry::new();
        hooks.register_hook(Arc::new(ResultReporter::new()));
        Self::from_parts(config, runner, default_stages(), hooks)
    }

    pub fn from_parts(
        config: PipelineConfig,
        runner: Arc<dyn CommandRunner>,
        stages: Vec<Arc<dyn Stage>>,
        hooks: HookRegistry,
    ) -> Self {
        Self {
            config: Arc::new(config),
            runner,
            stages,
            hooks,
        }
    }

    pub fn register_hook(&mut self, handler: Arc<dyn HookHandler>) {
        self.hooks.register_hook(handler);
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Comandi che una run eseguirebbe, stage per stage
    pub fn plan(&self, parameters: RunParameters) -> Vec<(StageKind, Vec<CommandSpec>)> {
        let channel = RunEventChannel::detached();
        let context = RunContext::new(&self.config, parameters, self.runner.as_ref(), &channel);
        self.stages.iter()
            .map(|stage| (stage.kind(), stage.plan(&context)))
        .collect()
    }

    /// Esegue una run completa.
    ///
    /// `Err` solo se la run non può partire (workspace bloccato da un'altra run);
    /// i fallimenti degli stage finiscono nel `RunReport` con esito `Failure`.
    pub async fn execute(&self, parameters: RunParameters, channel: &RunEventChannel) -> PipelineResult<RunReport> {
        let _lock = WorkspaceLock::acquire(&self.config.workspace_dir, channel.run_id())?;

        let started_at = Utc::now();
        let started = Instant::now();
        info!(
            "Run {} of '{}' started (dry_run={}, debug={})",
            channel.run_id(),
            self.config.job_name,
            parameters.dry_run,
            parameters.debug
        );
        channel.emit(RunEventKind::RunStarted {
            job_name: self.config.job_name.clone(),
            parameters,
        });

        let context = RunContext::new(&self.config, parameters, self.runner.as_ref(), channel);
        let mut records = Vec::with_capacity(self.stages.len() + 1);
        let mut failure = None;

        for stage in &self.stages {
            let kind = stage.kind();
            if failure.is_some() {
                channel.emit(RunEventKind::StageSkipped { stage: kind });
                records.push(StageRecord::skipped(kind));
                continue;
            }

            info!("Stage '{}' started: {}", kind, stage.description());
            channel.emit(RunEventKind::StageStarted { stage: kind });
            let stage_started = Instant::now();
            let result = stage.execute(&context).await;
            let duration_ms = stage_started.elapsed().as_millis() as u64;

            match result {
                Ok(result) => {
                    info!("Stage '{}' completed in {}ms", kind, duration_ms);
                    channel.emit(RunEventKind::StageCompleted { stage: kind, duration_ms });
                    records.push(StageRecord {
                        stage: kind,
                        status: StageStatus::Succeeded,
                        duration_ms,
                        exit_code: result.exit_code,
                        error: None,
                        metadata: result.metadata,
                    });
                }
                Err(e) => {
                    error!("Stage '{}' failed: {}", kind, e);
                    channel.emit(RunEventKind::StageFailed {
                        stage: kind,
                        error: e.to_string(),
                        exit_code: e.exit_code(),
                        duration_ms,
                    });
                    records.push(StageRecord {
                        stage: kind,
                        status: StageStatus::Failed,
                        duration_ms,
                        exit_code: e.exit_code(),
                        error: Some(e.to_string()),
                        metadata: Default::default(),
                    });
                    failure = Some(e);
                }
            }
        }

        let outcome = if failure.is_none() { RunOutcome::Success } else { RunOutcome::Failure };
        // Lo stage di report viene sempre eseguito, come il blocco `post`
        records.push(StageRecord {
            stage: StageKind::Report,
            status: StageStatus::Succeeded,
            duration_ms: 0,
            exit_code: None,
            error: None,
            metadata: Default::default(),
        });

        let mut report = RunReport {
            run_id: channel.run_id(),
            job_name: self.config.job_name.clone(),
            parameters,
            outcome,
            stages: records,
            error: failure.map(|it| it.to_string()),
            message: outcome.message().to_string(),
            started_at,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        channel.emit(RunEventKind::StageStarted { stage: StageKind::Report });
        let report_started = Instant::now();
        self.hooks.execute_hooks(&report, channel);
        let duration_ms = report_started.elapsed().as_millis() as u64;
        channel.emit(RunEventKind::StageCompleted { stage: StageKind::Report, duration_ms });
        if let Some(record) = report.stages.last_mut() {
            record.duration_ms = duration_ms;
        }
        report.duration_ms = started.elapsed().as_millis() as u64;

        channel.emit(RunEventKind::RunCompleted {
            outcome,
            duration_ms: report.duration_ms,
        });
        Ok(report)
    }
}
