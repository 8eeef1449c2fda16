use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use chrono::Local;
use clap::Parser;
use habr_ci_config::PipelineConfig;
use habr_ci_core::hook::HookRegistry;
use habr_ci_core::stage::{default_stages, ResultReporter};
use habr_ci_core::{PipelineEngine, ProcessRunner, RunEvent, RunEventChannel, RunParameters, RunReport};
use habr_ci_scheduler::{CronSchedule, Trigger};
use log::{debug, info, trace, warn};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::UnboundedReceiver;

mod cli;
mod error;

use cli::{Cli, Commands};
use error::{CliError, CliResult};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("habr-ci: {e}");
            ExitCode::from(CliError::EXIT_CODE)
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

async fn execute(cli: Cli) -> CliResult<ExitCode> {
    let env: HashMap<String, String> = std::env::vars().collect();
    let config = PipelineConfig::load(cli.config.as_deref(), &env)?;

    match cli.command {
        Commands::Run { parameters, json, events } => {
            let parameters = parameters.resolve(RunParameters::from_env(&env)?);
            let engine = build_engine(config, json);
            let report = run_once(&engine, parameters, events.as_deref()).await?;
            if json {
                let rendered = serde_json::to_string_pretty(&report).map_err(|e| CliError::Report(e.to_string()))?;
                println!("{rendered}");
            }
            Ok(ExitCode::from(report.outcome.exit_code() as u8))
        }
        Commands::Schedule { parameters, events } => {
            let parameters = parameters.resolve(RunParameters::from_env(&env)?);
            let schedule = CronSchedule::parse(&config.schedule.expression, &config.job_name)?;
            let engine = build_engine(config, false);
            schedule_runs(&engine, Trigger::new(schedule), parameters, events).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Plan { parameters } => {
            let parameters = parameters.resolve(RunParameters::from_env(&env)?);
            print_plan(&build_engine(config, false), parameters);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Next { count } => {
            let schedule = CronSchedule::parse(&config.schedule.expression, &config.job_name)?;
            for fire in schedule.upcoming(&Local::now(), count) {
                println!("{}", fire.format("%a %Y-%m-%d %H:%M %:z"));
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Con `--json` il messaggio finale va solo nei log, stdout resta JSON valido
fn build_engine(config: PipelineConfig, quiet: bool) -> PipelineEngine {
    if !quiet {
        return PipelineEngine::new(config);
    }
    let mut hooks = HookRegistry::new();
    hooks.register_hook(Arc::new(ResultReporter::quiet()));
    PipelineEngine::from_parts(config, Arc::new(ProcessRunner), default_stages(), hooks)
}

async fn run_once(engine: &PipelineEngine, parameters: RunParameters, events: Option<&Path>) -> CliResult<RunReport> {
    let sink = match events {
        Some(path) => Some(open_event_log(path).await?),
        None => None,
    };

    let (channel, receiver) = RunEventChannel::new();
    let drain = tokio::spawn(drain_events(receiver, sink));
    let result = engine.execute(parameters, &channel).await;

    // Chiude il channel: il drain termina dopo l'ultimo evento
    drop(channel);
    if let Err(e) = drain.await {
        warn!("Event writer stopped: {}", e);
    }
    Ok(result?)
}

async fn schedule_runs(
    engine: &PipelineEngine,
    trigger: Trigger,
    parameters: RunParameters,
    events: Option<PathBuf>,
) -> CliResult<()> {
    info!(
        "Job '{}' scheduled with '{}' (dry_run={}, debug={})",
        engine.config().job_name,
        trigger.schedule(),
        parameters.dry_run,
        parameters.debug
    );

    let runs = trigger.run(
        |fire| {
            let events = events.clone();
            async move {
                info!("Scheduled run for {}", fire);
                match run_once(engine, parameters, events.as_deref()).await {
                    Ok(report) if report.outcome.is_success() => info!("Run {} finished: {}", report.run_id, report.outcome),
                    Ok(report) => warn!("Run {} finished: {} ({})", report.run_id, report.outcome, report.error.unwrap_or_default()),
                    // Es. workspace bloccato da una run manuale: si riprova al prossimo istante
                    Err(e) => warn!("Scheduled run for {} not started: {}", fire, e),
                }
            }
        },
        shutdown_signal(),
    ).await?;

    info!("Scheduler stopped after {} run(s)", runs);
    Ok(())
}

fn print_plan(engine: &PipelineEngine, parameters: RunParameters) {
    let config = engine.config();
    println!(
        "Job '{}' in '{}' (dry_run={}, debug={})",
        config.job_name,
        config.workspace_dir.display(),
        parameters.dry_run,
        parameters.debug
    );
    for (stage, commands) in engine.plan(parameters) {
        for command in commands {
            println!("[{stage}] {command}");
        }
    }
    println!("[report] prints the result message");
}

async fn open_event_log(path: &Path) -> CliResult<tokio::fs::File> {
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| CliError::EventLog {
            path: path.display().to_string(),
            message: e.to_string(),
        })
}

async fn drain_events(mut receiver: UnboundedReceiver<RunEvent>, mut sink: Option<tokio::fs::File>) {
    while let Some(event) = receiver.recv().await {
        let line = event.to_json_line();
        if event.is_lifecycle() || event.is_error() {
            debug!("event: {}", line);
        } else {
            trace!("event: {}", line);
        }

        if let Some(file) = sink.as_mut() {
            let written = file.write_all(format!("{line}\n").as_bytes()).await;
            if let Err(e) = written {
                warn!("Cannot write event log, disabling it: {}", e);
                sink = None;
            }
        }
    }

    if let Some(mut file) = sink {
        if let Err(e) = file.flush().await {
            warn!("Cannot flush event log: {}", e);
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Cannot listen for Ctrl-C: {}", e);
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl-C: {}", e);
        }
    }
    info!("Shutdown requested");
}
