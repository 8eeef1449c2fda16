use std::fmt;
use habr_ci_config::ConfigError;
use thiserror::Error;

/// Main error type for pipeline operations
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    /// Clone/aggiornamento del repository fallito (rete, autenticazione, branch)
    #[error("Checkout error{}: {message}", ExitSuffix(.exit_code))]
    Checkout {
        message: String,
        exit_code: Option<i32>,
    },

    /// Installazione delle dipendenze fallita
    #[error("Provision error{}: {message}", ExitSuffix(.exit_code))]
    Provision {
        message: String,
        exit_code: Option<i32>,
    },

    /// Lo script è terminato con exit code diverso da zero, non è partito o è andato in timeout
    #[error("Script execution error{}: {message}", ExitSuffix(.exit_code))]
    ScriptExecution {
        message: String,
        exit_code: Option<i32>,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// I/O and file system errors
    #[error("I/O error{}: {message}", PathSuffix(.path))]
    Io {
        message: String,
        path: Option<String>,
    },

    /// Un'altra run sta già usando la stessa directory di lavoro
    #[error("Workspace '{path}' is locked by another run")]
    Locked {
        path: String,
    },
}

/// Result type alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    pub fn checkout(message: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::Checkout {
            message: message.into(),
            exit_code,
        }
    }

    pub fn provision(message: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::Provision {
            message: message.into(),
            exit_code,
        }
    }

    pub fn script(message: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::ScriptExecution {
            message: message.into(),
            exit_code,
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            path: None,
        }
    }

    pub fn io_with_path(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            path: Some(path.into()),
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Checkout { exit_code, .. }
            | Self::Provision { exit_code, .. }
            | Self::ScriptExecution { exit_code, .. } => *exit_code,
            _ => None,
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for PipelineError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

struct ExitSuffix<'a>(&'a Option<i32>);

impl fmt::Display for ExitSuffix<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(code) => write!(f, " (exit code {})", code),
            None => Ok(()),
        }
    }
}

struct PathSuffix<'a>(&'a Option<String>);

impl fmt::Display for PathSuffix<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(path) => write!(f, " on '{}'", path),
            None => Ok(()),
        }
    }
}
