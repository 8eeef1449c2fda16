use std::collections::HashMap;
use std::sync::Arc;
use log::warn;
use crate::event::{RunEventChannel, RunEventKind};
use crate::hook::{HookHandler, PostCondition};
use crate::types::RunReport;

/// Registry per i post hook
#[derive(Default)]
pub struct HookRegistry {
    handlers: HashMap<PostCondition, Vec<Arc<dyn HookHandler>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register_hook(&mut self, handler: Arc<dyn HookHandler>) {
        let handlers = self.handlers
            .entry(handler.condition())
            .or_default();
        handlers.push(handler);

        // Ordina per priorità
        handlers.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    pub fn len(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Esegue prima gli handler `Always`, poi quelli della condizione corrispondente all'esito.
    /// Ritorna i nomi degli handler eseguiti.
    pub fn execute_hooks(&self, report: &RunReport, channel: &RunEventChannel) -> Vec<String> {
        let mut executed = Vec::new();
        let conditions = [PostCondition::Always, PostCondition::Success, PostCondition::Failure];

        for condition in conditions.into_iter().filter(|it| it.matches(report.outcome)) {
            let Some(handlers) = self.handlers.get(&condition) else {
                continue;
            };
            for handler in handlers {
                channel.emit(RunEventKind::HookTriggered {
                    handler_name: handler.name().to_string(),
                    outcome: report.outcome,
                });
                if let Err(reason) = handler.handle(report) {
                    warn!("Post hook '{}' ({}) failed: {}", handler.name(), condition, reason);
                }
                executed.push(handler.name().to_string());
            }
        }
        executed
    }
}
