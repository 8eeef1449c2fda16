use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;
use crate::types::{RunOutcome, RunParameters, StageKind};

/// Channel per comunicare eventi durante l'esecuzione di una run
#[derive(Debug, Clone)]
pub struct RunEventChannel {
    pub run_id: Arc<Uuid>,
    sender: mpsc::UnboundedSender<RunEvent>,
}

impl RunEventChannel {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RunEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { run_id: Arc::new(Uuid::new_v4()), sender }, receiver)
    }

    /// Channel senza ascoltatori: gli eventi vengono scartati
    pub fn detached() -> Self {
        Self::new().0
    }

    pub fn run_id(&self) -> Uuid {
        *self.run_id
    }

    /// Invia un evento; se il receiver è stato chiuso l'evento viene perso senza errori
    pub fn emit(&self, kind: RunEventKind) {
        let event = RunEvent {
            id: Uuid::new_v4(),
            run_id: *self.run_id,
            timestamp: Utc::now(),
            kind,
        };
        let _ = self.sender.send(event);
    }
}

/// Evento emesso durante una run
#[derive(Debug, Clone, Serialize)]
pub struct RunEvent {
    pub id: Uuid,
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: RunEventKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEventKind {
    // Lifecycle Events
    RunStarted {
        job_name: String,
        parameters: RunParameters,
    },
    RunCompleted {
        outcome: RunOutcome,
        duration_ms: u64,
    },

    // Stage Events
    StageStarted {
        stage: StageKind,
    },
    StageCompleted {
        stage: StageKind,
        duration_ms: u64,
    },
    StageFailed {
        stage: StageKind,
        error: String,
        exit_code: Option<i32>,
        duration_ms: u64,
    },
    StageSkipped {
        stage: StageKind,
    },

    // Command Events
    CommandStarted {
        stage: StageKind,
        command: String,
        working_dir: Option<String>,
    },
    CommandCompleted {
        stage: StageKind,
        command: String,
        exit_code: Option<i32>,
        duration_ms: u64,
    },

    // Hook Events
    HookTriggered {
        handler_name: String,
        outcome: RunOutcome,
    },
}

impl RunEvent {
    pub fn is_error(&self) -> bool {
        matches!(
            self.kind,
            RunEventKind::StageFailed { .. }
                | RunEventKind::RunCompleted { outcome: RunOutcome::Failure, .. }
        )
    }

    pub fn is_lifecycle(&self) -> bool {
        matches!(self.kind, RunEventKind::RunStarted { .. } | RunEventKind::RunCompleted { .. })
    }

    pub fn duration(&self) -> Option<u64> {
        match &self.kind {
            RunEventKind::RunCompleted { duration_ms, .. } => Some(*duration_ms),
            RunEventKind::StageCompleted { duration_ms, .. } => Some(*duration_ms),
            RunEventKind::StageFailed { duration_ms, .. } => Some(*duration_ms),
            RunEventKind::CommandCompleted { duration_ms, .. } => Some(*duration_ms),
            _ => None,
        }
    }

    /// Riga JSON per il file di eventi
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!(r#"{{"serialization_error":"{}"}}"#, e))
    }
}
