pub mod assistant;
pub mod audio;
pub mod calendar;
pub mod config;
pub mod error;
pub mod memory;
pub mod services;

// Re-export specific items if needed for convenient access
pub use assistant::ResponseOrchestrator;
pub use audio::SpeechPlaybackPipeline;
pub use error::{AssistantError, DeviceError};
