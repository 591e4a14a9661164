pub mod context;
pub mod orchestrator;

pub use context::*;
pub use orchestrator::ResponseOrchestrator;
