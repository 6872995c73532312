pub mod config;
pub mod engine;
pub mod query;
pub mod retention;

pub use config::{ConfigError, EngineConfig};
pub use engine::{Engine, IngestOutcome};
pub use retention::SweepReport;
