use log::{error, info};
use crate::hook::{HookHandler, PostCondition};
use crate::types::{RunOutcome, RunReport};

/// Result Reporter: stampa uno dei due messaggi fissi a fine run
#[derive(Debug, Clone, Default)]
pub struct ResultReporter {
    /// Se vero il messaggio va solo nei log (es. output `--json`)
    pub quiet: bool,
}

impl ResultReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quiet() -> Self {
        Self { quiet: true }
    }

    pub fn message(outcome: RunOutcome) -> &'static str {
        outcome.message()
    }
}

impl HookHandler for ResultReporter {
    fn name(&self) -> &str {
        "result-reporter"
    }

    fn condition(&self) -> PostCondition {
        PostCondition::Always
    }

    fn handle(&self, report: &RunReport) -> Result<(), String> {
        let message = Self::message(report.outcome);
        match report.outcome {
            RunOutcome::Success => info!("{}", message),
            RunOutcome::Failure => error!("{}", message),
        }
        if !self.quiet {
            println!("{}", message);
        }
        Ok(())
    }

    // Dopo gli altri handler `always`
    fn priority(&self) -> i32 {
        i32::MIN
    }
}
