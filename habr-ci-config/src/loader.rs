use std::collections::HashMap;
use std::path::{Path, PathBuf};
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use crate::error::{ConfigError, ConfigResult};
use crate::invalid_field;
use crate::pipeline::PipelineConfig;

pub const ENV_REPO_URL: &str = "HABR_CI_REPO_URL";
pub const ENV_BRANCH: &str = "HABR_CI_BRANCH";
pub const ENV_WORKSPACE: &str = "HABR_CI_WORKSPACE";
pub const ENV_SCRIPT: &str = "HABR_CI_SCRIPT";
pub const ENV_PYTHON: &str = "HABR_CI_PYTHON";
pub const ENV_SCHEDULE: &str = "HABR_CI_SCHEDULE";

lazy_static! {
    // Sottoinsieme prudente di git check-ref-format
    static ref BRANCH_NAME: Regex =
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._/-]*$").unwrap();
    // Nome PEP 508 con extras e version specifier opzionali
    static ref PACKAGE_SPEC: Regex =
        Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9._-]*[A-Za-z0-9])?(\[[A-Za-z0-9._,-]+\])?([<>=!~]=?[A-Za-z0-9.*+!-]+)?$").unwrap();
}

impl PipelineConfig {
    /// Carica la configurazione: default, poi file JSON (se presente), poi variabili d'ambiente.
    pub fn load(path: Option<&Path>, env: &HashMap<String, String>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(env);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::read(path, e.to_string()))?;
        debug!("Loaded configuration file '{}'", path.display());
        serde_json::from_str(&content)
            .map_err(|e| ConfigError::parse(path, e.to_string()))
    }

    /// Sovrascrive i campi "fissi" con le variabili `HABR_CI_*`, se valorizzate
    pub fn apply_env_overrides(&mut self, env: &HashMap<String, String>) {
        let lookup = |key: &str| env.get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        if let Some(url) = lookup(ENV_REPO_URL) {
            self.repository.url = url;
        }
        if let Some(branch) = lookup(ENV_BRANCH) {
            self.repository.branch = branch;
        }
        if let Some(workspace) = lookup(ENV_WORKSPACE) {
            self.workspace_dir = PathBuf::from(workspace);
        }
        if let Some(script) = lookup(ENV_SCRIPT) {
            self.script.path = PathBuf::from(script);
        }
        if let Some(python) = lookup(ENV_PYTHON) {
            self.script.interpreter = python;
        }
        if let Some(schedule) = lookup(ENV_SCHEDULE) {
            self.schedule.expression = schedule;
        }
    }

    /// Controlli statici; l'espressione cron viene validata dallo scheduler
    pub fn validate(&self) -> ConfigResult<()> {
        if self.job_name.trim().is_empty() {
            return invalid_field!("job_name", "must not be empty");
        }
        if self.repository.url.trim().is_empty() {
            return invalid_field!("repository.url", "must not be empty");
        }
        if !BRANCH_NAME.is_match(&self.repository.branch) || self.repository.branch.contains("..") {
            return invalid_field!("repository.branch", "'{}' is not a valid branch name", self.repository.branch);
        }
        if self.workspace_dir.as_os_str().is_empty() {
            return invalid_field!("workspace_dir", "must not be empty");
        }
        if self.provision.installer.is_empty() || self.provision.installer[0].trim().is_empty() {
            return invalid_field!("provision.installer", "must name a program");
        }
        if self.provision.packages.is_empty() {
            return invalid_field!("provision.packages", "at least one package is required");
        }
        if let Some(package) = self.provision.packages.iter().find(|it| !PACKAGE_SPEC.is_match(it)) {
            return invalid_field!("provision.packages", "'{}' is not a valid package specifier", package);
        }
        if self.script.interpreter.trim().is_empty() {
            return invalid_field!("script.interpreter", "must not be empty");
        }
        if self.script.path.as_os_str().is_empty() {
            return invalid_field!("script.path", "must not be empty");
        }
        if self.script.timeout_secs == Some(0) {
            return invalid_field!("script.timeout_secs", "must be greater than zero");
        }
        if self.schedule.expression.trim().is_empty() {
            return invalid_field!("schedule.expression", "must not be empty");
        }
        Ok(())
    }
}
