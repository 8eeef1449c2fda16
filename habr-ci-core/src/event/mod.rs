pub mod channel;

pub use channel::{RunEvent, RunEventChannel, RunEventKind};
