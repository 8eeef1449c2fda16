use std::collections::HashMap;
use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

pub const DEFAULT_JOB_NAME: &str = "changed-habr-articles";
/// Segnaposto: il repository del job non è noto a priori.
/// In produzione va sovrascritto con `repository.url` o `HABR_CI_REPO_URL`.
pub const DEFAULT_REPOSITORY_URL: &str = "git@github.com:wirenboard/changed-habr-articles.git";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_SCRIPT_PATH: &str = "changed-habr-articles.py";
/// Mezzanotte di mercoledì e sabato
pub const DEFAULT_SCHEDULE: &str = "0 0 * * 3,6";

/// Configurazione completa di una pipeline.
///
/// Ogni sezione ha valori di default che riproducono il job originale, quindi un file
/// di configurazione può specificare solo i campi da sovrascrivere.
#[derive(Debug, Clone, PartialEq, SmartDefault, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Nome del job, usato nei log e per risolvere il token `H` dello schedule
    #[default(DEFAULT_JOB_NAME.to_string())]
    pub job_name: String,
    /// Directory in cui viene fatto il checkout; condivisa tra run successive
    #[default(PathBuf::from("workspace").join(DEFAULT_JOB_NAME))]
    pub workspace_dir: PathBuf,
    pub repository: RepositoryConfig,
    pub provision: ProvisionConfig,
    pub script: ScriptConfig,
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, PartialEq, SmartDefault, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepositoryConfig {
    #[default(DEFAULT_REPOSITORY_URL.to_string())]
    pub url: String,
    #[default(DEFAULT_BRANCH.to_string())]
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq, SmartDefault, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvisionConfig {
    /// Comando di installazione, i pacchetti vengono aggiunti in coda
    #[default(vec!["pip".to_string(), "install".to_string()])]
    pub installer: Vec<String>,
    #[default(vec!["requests".to_string(), "transliterate".to_string(), "pillow".to_string()])]
    pub packages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, SmartDefault, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptConfig {
    #[default("python".to_string())]
    pub interpreter: String,
    /// Relativo alla directory di checkout
    #[default(PathBuf::from(DEFAULT_SCRIPT_PATH))]
    pub path: PathBuf,
    pub timeout_secs: Option<u64>,
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, SmartDefault, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleConfig {
    #[default(DEFAULT_SCHEDULE.to_string())]
    pub expression: String,
}

impl ProvisionConfig {
    /// Argv completo del comando di installazione
    pub fn command_line(&self) -> Vec<String> {
        self.installer.iter()
            .chain(self.packages.iter())
            .cloned()
        .collect()
    }
}
