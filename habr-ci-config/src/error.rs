use std::path::Path;
use thiserror::Error;

/// Errori di caricamento e validazione della configurazione
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    /// Il file di configurazione non può essere letto
    #[error("Cannot read configuration file '{path}': {message}")]
    Read {
        path: String,
        message: String,
    },

    /// Il file esiste ma non è JSON valido per `PipelineConfig`
    #[error("Malformed configuration in '{path}': {message}")]
    Parse {
        path: String,
        message: String,
    },

    /// Un campo ha un valore non accettabile
    #[error("Invalid value for '{field}': {message}")]
    Invalid {
        field: String,
        message: String,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

impl ConfigError {
    pub fn read(path: &Path, message: impl Into<String>) -> Self {
        Self::Read {
            path: path.display().to_string(),
            message: message.into(),
        }
    }

    pub fn parse(path: &Path, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.display().to_string(),
            message: message.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Nome del campo coinvolto, se l'errore riguarda un valore
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Invalid { field, .. } => Some(field),
            _ => None,
        }
    }
}

// Macro per errori di validazione su un campo
#[macro_export]
macro_rules! invalid_field {
    ($field:expr, $msg:expr) => {
        Err($crate::error::ConfigError::invalid($field, $msg))
    };
    ($field:expr, $fmt:expr, $($arg:tt)*) => {
        Err($crate::error::ConfigError::invalid($field, format!($fmt, $($arg)*)))
    };
}
