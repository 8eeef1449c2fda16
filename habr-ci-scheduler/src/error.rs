use thiserror::Error;

/// Errori dello scheduler
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScheduleError {
    /// Espressione cron non valida
    #[error("Invalid schedule '{expression}': {message}")]
    Invalid {
        expression: String,
        message: String,
    },

    /// L'espressione è valida ma non scatta mai più (es. 30 febbraio)
    #[error("Schedule '{expression}' has no upcoming fire time")]
    Exhausted {
        expression: String,
    },
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;

impl ScheduleError {
    pub fn invalid(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            expression: expression.into(),
            message: message.into(),
        }
    }

    pub fn exhausted(expression: impl Into<String>) -> Self {
        Self::Exhausted {
            expression: expression.into(),
        }
    }
}
