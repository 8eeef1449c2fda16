use derive_more::Display;
use crate::types::{RunOutcome, RunReport};

pub mod registry;

pub use registry::HookRegistry;

/// Condizione del blocco `post` che attiva un handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum PostCondition {
    #[display("always")]
    Always,
    #[display("success")]
    Success,
    #[display("failure")]
    Failure,
}

impl PostCondition {
    pub fn matches(&self, outcome: RunOutcome) -> bool {
        match self {
            Self::Always => true,
            Self::Success => outcome == RunOutcome::Success,
            Self::Failure => outcome == RunOutcome::Failure,
        }
    }
}

/// Handler eseguito a fine run. Un errore viene loggato ma non cambia l'esito.
pub trait HookHandler: Send + Sync {
    fn name(&self) -> &str;
    fn condition(&self) -> PostCondition;
    fn handle(&self, report: &RunReport) -> Result<(), String>;
    fn priority(&self) -> i32 { 100 }
}
