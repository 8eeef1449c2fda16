use std::collections::HashMap;
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use uuid::Uuid;
use crate::error::{PipelineError, PipelineResult};

pub const DRY_RUN_FLAG: &str = "--dry-run";
pub const DEBUG_FLAG: &str = "--debug";

pub const SUCCESS_MESSAGE: &str = "Pipeline completed successfully.";
pub const FAILURE_MESSAGE: &str = "Pipeline failed.";

/// Parametri di una run: fissati al trigger, immutabili per tutta la durata della run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, SmartDefault, Serialize, Deserialize)]
pub struct RunParameters {
    #[default = true]
    pub dry_run: bool,
    pub debug: bool,
}

impl RunParameters {
    /// Nomi dei parametri così come li espone il job (`DRY_RUN=true`)
    pub const DRY_RUN_ENV: &'static str = "DRY_RUN";
    pub const DEBUG_ENV: &'static str = "DEBUG";

    pub fn new(dry_run: bool, debug: bool) -> Self {
        Self { dry_run, debug }
    }

    /// Argomenti per lo script: `--dry-run` precede sempre `--debug`
    pub fn script_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(2);
        if self.dry_run {
            args.push(DRY_RUN_FLAG.to_string());
        }
        if self.debug {
            args.push(DEBUG_FLAG.to_string());
        }
        args
    }

    /// Legge `DRY_RUN` e `DEBUG` dall'ambiente; le variabili assenti lasciano il default
    pub fn from_env(env: &HashMap<String, String>) -> PipelineResult<Self> {
        let mut params = Self::default();
        if let Some(value) = env.get(Self::DRY_RUN_ENV) {
            params.dry_run = parse_bool(Self::DRY_RUN_ENV, value)?;
        }
        if let Some(value) = env.get(Self::DEBUG_ENV) {
            params.debug = parse_bool(Self::DEBUG_ENV, value)?;
        }
        Ok(params)
    }
}

fn parse_bool(name: &str, value: &str) -> PipelineResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(PipelineError::Config(habr_ci_config::ConfigError::invalid(
            name,
            format!("'{}' is not a boolean", other),
        ))),
    }
}

/// Esito complessivo di una run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    #[display("success")]
    Success,
    #[display("failure")]
    Failure,
}

impl RunOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Success => SUCCESS_MESSAGE,
            Self::Failure => FAILURE_MESSAGE,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Exit code del processo `habr-ci` per questo esito
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
        }
    }
}

/// Gli stage della pipeline, nell'ordine di esecuzione
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    #[display("checkout")]
    Checkout,
    #[display("provision")]
    Provision,
    #[display("invoke")]
    Invoke,
    #[display("report")]
    Report,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[display("succeeded")]
    Succeeded,
    #[display("failed")]
    Failed,
    /// Non eseguito perché uno stage precedente è fallito
    #[display("skipped")]
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageKind,
    pub status: StageStatus,
    pub duration_ms: u64,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
    /// Informazioni extra dello stage (es. commit del checkout)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl StageRecord {
    pub fn skipped(stage: StageKind) -> Self {
        Self {
            stage,
            status: StageStatus::Skipped,
            duration_ms: 0,
            exit_code: None,
            error: None,
            metadata: HashMap::new(),
        }
    }
}

/// Riepilogo di una run, prodotto dall'engine dopo il report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub job_name: String,
    pub parameters: RunParameters,
    pub outcome: RunOutcome,
    pub stages: Vec<StageRecord>,
    pub error: Option<String>,
    pub message: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn stage(&self, kind: StageKind) -> Option<&StageRecord> {
        self.stages.iter().find(|it| it.stage == kind)
    }

    /// Stage effettivamente eseguiti (riusciti o falliti)
    pub fn executed_stages(&self) -> Vec<StageKind> {
        self.stages.iter()
            .filter(|it| it.status != StageStatus::Skipped)
            .map(|it| it.stage)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_args_for_every_flag_combination() {
        let cases = [
            (false, false, vec![]),
            (true, false, vec!["--dry-run"]),
            (false, true, vec!["--debug"]),
            (true, true, vec!["--dry-run", "--debug"]),
        ];
        for (dry_run, debug, expected) in cases {
            assert_eq!(RunParameters::new(dry_run, debug).script_args(), expected, "dry_run={dry_run} debug={debug}");
        }
    }

    #[test]
    fn default_parameters_only_pass_dry_run() {
        let params = RunParameters::default();
        assert!(params.dry_run);
        assert!(!params.debug);
        assert_eq!(params.script_args(), vec!["--dry-run"]);
    }

    #[test]
    fn parameters_from_env() {
        let env: HashMap<String, String> = [
            ("DRY_RUN".to_string(), "False".to_string()),
            ("DEBUG".to_string(), " yes ".to_string()),
        ].into_iter().collect();
        assert_eq!(RunParameters::from_env(&env).unwrap(), RunParameters::new(false, true));
        assert_eq!(RunParameters::from_env(&HashMap::new()).unwrap(), RunParameters::default());
    }

    #[test]
    fn unparsable_parameter_is_a_config_error() {
        let env: HashMap<String, String> = [("DEBUG".to_string(), "maybe".to_string())].into_iter().collect();
        let error = RunParameters::from_env(&env).unwrap_err();
        assert!(matches!(error, PipelineError::Config(_)));
    }

    #[test]
    fn outcome_messages() {
        assert_eq!(RunOutcome::Success.message(), "Pipeline completed successfully.");
        assert_eq!(RunOutcome::Failure.message(), "Pipeline failed.");
        assert_eq!(RunOutcome::Failure.exit_code(), 1);
        assert_eq!(StageKind::Provision.to_string(), "provision");
    }
}
