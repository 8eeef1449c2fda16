use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use habr_ci_config::PipelineConfig;
use habr_ci_core::hook::{HookHandler, PostCondition};
use habr_ci_core::lock::WorkspaceLock;
use habr_ci_core::{
    CommandOutput, CommandRunner, CommandSpec, PipelineEngine, PipelineError, PipelineResult, RunEventChannel,
    RunEventKind, RunOutcome, RunParameters, RunReport, StageKind, StageStatus,
};
use tempfile::TempDir;
use uuid::Uuid;

/// Runner finto: registra i comandi e risponde con l'exit code configurato per stage
#[derive(Default)]
struct ScriptedRunner {
    exit_codes: HashMap<String, i32>,
    /// Exit code per sottocomando git (es. `pull`), vince su `exit_codes`
    git_exit_codes: HashMap<String, i32>,
    spawn_failures: Vec<String>,
    timeouts: Vec<String>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    fn failing(stage: StageKind, exit_code: i32) -> Self {
        Self {
            exit_codes: [(stage.to_string(), exit_code)].into_iter().collect(),
            ..Default::default()
        }
    }

    fn labels(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|it| it.label.clone()).collect()
    }

    fn calls_for(&self, stage: StageKind) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().iter()
            .filter(|it| it.label == stage.to_string())
            .cloned()
        .collect()
    }
}

#[async_trait::async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> PipelineResult<CommandOutput> {
        self.calls.lock().unwrap().push(spec.clone());
        if self.spawn_failures.contains(&spec.label) {
            return Err(PipelineError::io(format!("cannot start '{}': not found", spec.program)));
        }
        if self.timeouts.contains(&spec.label) {
            return Ok(CommandOutput {
                exit_code: None,
                timed_out: true,
                ..Default::default()
            });
        }
        let exit_code = spec.args.iter()
            .find_map(|arg| self.git_exit_codes.get(arg))
            .or_else(|| self.exit_codes.get(&spec.label))
            .copied()
            .unwrap_or(0);
        Ok(CommandOutput {
            exit_code: Some(exit_code),
            stdout: if spec.args.iter().any(|it| it == "rev-parse") { "0123abcd\n".to_string() } else { String::new() },
            stderr: if exit_code != 0 { format!("{} went wrong\n", spec.label) } else { String::new() },
            ..Default::default()
        })
    }
}

fn config(dir: &TempDir) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.workspace_dir = dir.path().join("ws");
    config.repository.url = "https://example.com/changed-habr-articles.git".to_string();
    config
}

async fn run(runner: Arc<ScriptedRunner>, parameters: RunParameters) -> RunReport {
    let dir = tempfile::tempdir().unwrap();
    let engine = PipelineEngine::with_runner(config(&dir), runner);
    engine.execute(parameters, &RunEventChannel::detached()).await.unwrap()
}

#[tokio::test]
async fn successful_run_executes_every_stage_in_order() {
    let runner = Arc::new(ScriptedRunner::default());
    let report = run(runner.clone(), RunParameters::default()).await;

    assert_eq!(report.outcome, RunOutcome::Success);
    assert_eq!(report.message, "Pipeline completed successfully.");
    assert!(report.error.is_none());
    assert_eq!(
        report.executed_stages(),
        vec![StageKind::Checkout, StageKind::Provision, StageKind::Invoke, StageKind::Report]
    );
    assert_eq!(runner.labels(), vec!["checkout", "checkout", "provision", "invoke"]);

    let checkout = report.stage(StageKind::Checkout).unwrap();
    assert_eq!(checkout.metadata.get("mode").map(String::as_str), Some("clone"));
    assert_eq!(checkout.metadata.get("commit").map(String::as_str), Some("0123abcd"));

    let invoke = runner.calls_for(StageKind::Invoke);
    assert_eq!(invoke[0].argv(), vec!["python", "changed-habr-articles.py", "--dry-run"]);
}

#[tokio::test]
async fn script_arguments_follow_the_parameters() {
    let cases = [
        (false, false, vec![]),
        (true, false, vec!["--dry-run"]),
        (false, true, vec!["--debug"]),
        (true, true, vec!["--dry-run", "--debug"]),
    ];
    for (dry_run, debug, expected) in cases {
        let runner = Arc::new(ScriptedRunner::default());
        let report = run(runner.clone(), RunParameters::new(dry_run, debug)).await;
        assert_eq!(report.parameters, RunParameters::new(dry_run, debug));

        let invoke = runner.calls_for(StageKind::Invoke);
        assert_eq!(invoke.len(), 1);
        assert_eq!(invoke[0].args[1..], expected[..], "dry_run={dry_run} debug={debug}");
    }
}

#[tokio::test]
async fn checkout_failure_short_circuits_the_run() {
    let runner = Arc::new(ScriptedRunner::failing(StageKind::Checkout, 128));
    let report = run(runner.clone(), RunParameters::default()).await;

    assert_eq!(report.outcome, RunOutcome::Failure);
    assert_eq!(report.message, "Pipeline failed.");
    assert_eq!(runner.labels(), vec!["checkout"]);
    assert!(runner.calls_for(StageKind::Provision).is_empty());
    assert!(runner.calls_for(StageKind::Invoke).is_empty());

    let checkout = report.stage(StageKind::Checkout).unwrap();
    assert_eq!(checkout.status, StageStatus::Failed);
    assert_eq!(checkout.exit_code, Some(128));
    assert_eq!(report.stage(StageKind::Provision).unwrap().status, StageStatus::Skipped);
    assert_eq!(report.stage(StageKind::Invoke).unwrap().status, StageStatus::Skipped);
    assert_eq!(report.stage(StageKind::Report).unwrap().status, StageStatus::Succeeded);
    assert!(report.error.unwrap().starts_with("Checkout error (exit code 128)"));
}

#[tokio::test]
async fn provision_failure_skips_the_script() {
    let runner = Arc::new(ScriptedRunner::failing(StageKind::Provision, 1));
    let report = run(runner.clone(), RunParameters::default()).await;

    assert_eq!(report.outcome, RunOutcome::Failure);
    assert!(runner.calls_for(StageKind::Invoke).is_empty());
    assert!(report.error.unwrap().starts_with("Provision error (exit code 1)"));
}

#[tokio::test]
async fn non_zero_script_exit_always_fails_the_run() {
    for code in [1, 2, 127, 255] {
        let runner = Arc::new(ScriptedRunner::failing(StageKind::Invoke, code));
        let report = run(runner, RunParameters::new(false, false)).await;

        assert_eq!(report.outcome, RunOutcome::Failure);
        assert_eq!(report.message, "Pipeline failed.");
        let invoke = report.stage(StageKind::Invoke).unwrap();
        assert_eq!(invoke.status, StageStatus::Failed);
        assert_eq!(invoke.exit_code, Some(code));
        assert_eq!(report.stage(StageKind::Checkout).unwrap().status, StageStatus::Succeeded);
    }
}

#[tokio::test]
async fn script_that_cannot_start_is_a_script_execution_error() {
    let runner = Arc::new(ScriptedRunner {
        spawn_failures: vec!["invoke".to_string()],
        ..Default::default()
    });
    let report = run(runner, RunParameters::default()).await;

    assert_eq!(report.outcome, RunOutcome::Failure);
    assert!(report.error.unwrap().starts_with("Script execution error"));
}

#[tokio::test]
async fn script_timeout_fails_the_run() {
    let runner = Arc::new(ScriptedRunner {
        timeouts: vec!["invoke".to_string()],
        ..Default::default()
    });
    let report = run(runner.clone(), RunParameters::default()).await;

    assert_eq!(report.outcome, RunOutcome::Failure);
    assert_eq!(report.message, "Pipeline failed.");
    let error = report.error.clone().unwrap();
    assert!(error.starts_with("Script execution error"), "{error}");
    assert!(error.contains("timed out"), "{error}");

    let invoke = report.stage(StageKind::Invoke).unwrap();
    assert_eq!(invoke.status, StageStatus::Failed);
    assert_eq!(invoke.exit_code, None);
    assert_eq!(report.stage(StageKind::Report).unwrap().status, StageStatus::Succeeded);
}

#[tokio::test]
async fn existing_checkout_is_updated_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);
    std::fs::create_dir_all(config.workspace_dir.join(".git")).unwrap();
    let workspace = config.workspace_dir.display().to_string();

    let runner = Arc::new(ScriptedRunner::default());
    let engine = PipelineEngine::with_runner(config, runner.clone());
    let report = engine.execute(RunParameters::default(), &RunEventChannel::detached()).await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Success);

    let checkout: Vec<Vec<String>> = runner.calls_for(StageKind::Checkout).into_iter().map(|it| it.args).collect();
    let expected: Vec<Vec<&str>> = vec![
        vec!["-C", workspace.as_str(), "checkout", "main"],
        vec!["-C", workspace.as_str(), "pull", "--ff-only", "origin", "main"],
        vec!["-C", workspace.as_str(), "clean", "-fd"],
        vec!["-C", workspace.as_str(), "rev-parse", "HEAD"],
    ];
    assert_eq!(checkout, expected);
    assert!(!checkout.iter().any(|args| args.iter().any(|it| it == "clone")));

    let record = report.stage(StageKind::Checkout).unwrap();
    assert_eq!(record.metadata.get("mode").map(String::as_str), Some("update"));
    assert_eq!(record.metadata.get("commit").map(String::as_str), Some("0123abcd"));
}

#[tokio::test]
async fn failed_pull_stops_the_update() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);
    std::fs::create_dir_all(config.workspace_dir.join(".git")).unwrap();

    let runner = Arc::new(ScriptedRunner {
        git_exit_codes: [("pull".to_string(), 1)].into_iter().collect(),
        ..Default::default()
    });
    let engine = PipelineEngine::with_runner(config, runner.clone());
    let report = engine.execute(RunParameters::default(), &RunEventChannel::detached()).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Failure);
    assert_eq!(report.message, "Pipeline failed.");
    let error = report.error.clone().unwrap();
    assert!(error.starts_with("Checkout error (exit code 1)"), "{error}");

    // checkout + pull, niente clean
    let checkout = runner.calls_for(StageKind::Checkout);
    assert_eq!(checkout.len(), 2);
    assert!(!checkout.iter().any(|spec| spec.args.iter().any(|it| it == "clean")));
    assert!(runner.calls_for(StageKind::Provision).is_empty());
    assert!(runner.calls_for(StageKind::Invoke).is_empty());

    assert_eq!(report.stage(StageKind::Checkout).unwrap().status, StageStatus::Failed);
    assert_eq!(report.stage(StageKind::Provision).unwrap().status, StageStatus::Skipped);
    assert_eq!(report.stage(StageKind::Invoke).unwrap().status, StageStatus::Skipped);
}

#[tokio::test]
async fn events_describe_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let engine = PipelineEngine::with_runner(config(&dir), Arc::new(ScriptedRunner::failing(StageKind::Provision, 2)));
    let (channel, mut receiver) = RunEventChannel::new();

    let report = engine.execute(RunParameters::default(), &channel).await.unwrap();
    drop(channel);

    let mut kinds = Vec::new();
    while let Some(event) = receiver.recv().await {
        assert_eq!(event.run_id, report.run_id);
        kinds.push(event.kind);
    }

    assert!(matches!(kinds.first(), Some(RunEventKind::RunStarted { .. })));
    assert!(matches!(kinds.last(), Some(RunEventKind::RunCompleted { outcome: RunOutcome::Failure, .. })));
    assert!(kinds.iter().any(|it| matches!(it, RunEventKind::StageFailed { stage: StageKind::Provision, exit_code: Some(2), .. })));
    assert!(kinds.iter().any(|it| matches!(it, RunEventKind::StageSkipped { stage: StageKind::Invoke })));
    assert!(kinds.iter().any(|it| matches!(it, RunEventKind::HookTriggered { .. })));
    assert!(!kinds.iter().any(|it| matches!(it, RunEventKind::StageStarted { stage: StageKind::Invoke })));

    // Anche lo stage di report ha inizio e fine, prima della chiusura della run
    let report_started = kinds.iter().position(|it| matches!(it, RunEventKind::StageStarted { stage: StageKind::Report }));
    let report_completed = kinds.iter().position(|it| matches!(it, RunEventKind::StageCompleted { stage: StageKind::Report, .. }));
    let hook = kinds.iter().position(|it| matches!(it, RunEventKind::HookTriggered { .. }));
    match (report_started, hook, report_completed) {
        (Some(started), Some(hook), Some(completed)) => {
            assert!(started < hook && hook < completed);
            assert_eq!(completed, kinds.len() - 2);
        }
        other => panic!("report stage events missing: {other:?}"),
    }
}

#[tokio::test]
async fn locked_workspace_does_not_start_a_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);
    let _held = WorkspaceLock::acquire(&config.workspace_dir, Uuid::new_v4()).unwrap();

    let runner = Arc::new(ScriptedRunner::default());
    let engine = PipelineEngine::with_runner(config, runner.clone());
    let result = engine.execute(RunParameters::default(), &RunEventChannel::detached()).await;

    assert!(matches!(result, Err(PipelineError::Locked { .. })));
    assert!(runner.labels().is_empty());
}

struct FailureNotifier {
    calls: Arc<Mutex<Vec<RunOutcome>>>,
}

impl HookHandler for FailureNotifier {
    fn name(&self) -> &str {
        "failure-notifier"
    }
    fn condition(&self) -> PostCondition {
        PostCondition::Failure
    }
    fn handle(&self, report: &RunReport) -> Result<(), String> {
        self.calls.lock().unwrap().push(report.outcome);
        Err("notification channel unavailable".to_string())
    }
}

#[tokio::test]
async fn failing_post_hook_does_not_change_the_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let calls = Arc::new(Mutex::new(Vec::new()));

    let mut engine = PipelineEngine::with_runner(config(&dir), Arc::new(ScriptedRunner::default()));
    engine.register_hook(Arc::new(FailureNotifier { calls: calls.clone() }));
    let report = engine.execute(RunParameters::default(), &RunEventChannel::detached()).await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Success);
    assert!(calls.lock().unwrap().is_empty());

    let mut engine = PipelineEngine::with_runner(config(&dir), Arc::new(ScriptedRunner::failing(StageKind::Invoke, 1)));
    engine.register_hook(Arc::new(FailureNotifier { calls: calls.clone() }));
    let report = engine.execute(RunParameters::default(), &RunEventChannel::detached()).await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Failure);
    assert_eq!(*calls.lock().unwrap(), vec![RunOutcome::Failure]);
}

#[test]
fn plan_lists_commands_per_stage() {
    let dir = tempfile::tempdir().unwrap();
    let engine = PipelineEngine::with_runner(config(&dir), Arc::new(ScriptedRunner::default()));

    let plan = engine.plan(RunParameters::new(true, true));
    let stages: Vec<StageKind> = plan.iter().map(|(kind, _)| *kind).collect();
    assert_eq!(stages, vec![StageKind::Checkout, StageKind::Provision, StageKind::Invoke]);

    let (_, invoke) = &plan[2];
    assert_eq!(invoke[0].to_string(), "python changed-habr-articles.py --dry-run --debug");
}
