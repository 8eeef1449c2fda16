pub mod error;
pub mod pipeline;
pub mod loader;

pub use error::{ConfigError, ConfigResult};
pub use pipeline::{PipelineConfig, ProvisionConfig, RepositoryConfig, ScheduleConfig, ScriptConfig};
