pub mod checkout;
pub mod provision;
pub mod invoke;
pub mod report;

use std::collections::HashMap;
use std::sync::Arc;
use crate::context::RunContext;
use crate::error::PipelineResult;
use crate::process::CommandSpec;
use crate::types::StageKind;

pub use checkout::CheckoutStage;
pub use invoke::InvokeStage;
pub use provision::ProvisionStage;
pub use report::ResultReporter;

/// Risultato di uno stage riuscito
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageResult {
    /// Exit code dell'ultimo comando eseguito
    pub exit_code: Option<i32>,
    pub metadata: HashMap<String, String>,
}

impl StageResult {
    pub fn with_exit_code(exit_code: Option<i32>) -> Self {
        Self {
            exit_code,
            metadata: HashMap::new(),
        }
    }
}

/// Uno step della pipeline. Gli stage vengono eseguiti in sequenza e il primo errore
/// interrompe la run: nessun retry.
#[async_trait::async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    /// Descrizione per help/plan
    fn description(&self) -> &str;

    /// Comandi che lo stage eseguirebbe con questo contesto, senza eseguirli
    fn plan(&self, context: &RunContext<'_>) -> Vec<CommandSpec>;

    async fn execute(&self, context: &RunContext<'_>) -> PipelineResult<StageResult>;
}

/// Fetch → Provision → Invoke
pub fn default_stages() -> Vec<Arc<dyn Stage>> {
    vec![
        Arc::new(CheckoutStage),
        Arc::new(ProvisionStage),
        Arc::new(InvokeStage),
    ]
}
