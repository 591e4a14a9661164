use thiserror::Error;

use crate::audio::DeviceId;

/// Errors that end the current turn or utterance.
///
/// Provider outages and unreadable dates never show up here: the event cache
/// recovers the former and the orchestrator turns the latter into a notice.
#[derive(Debug, Error)]
pub enum AssistantError {
    /// The completion service failed. The turn is not recorded in memory.
    #[error("completion service failed: {0:#}")]
    CompletionService(anyhow::Error),

    /// Either VOICEVOX call failed. Nothing is played.
    #[error("speech synthesis failed: {0:#}")]
    Synthesis(anyhow::Error),

    #[error("synthesized audio could not be decoded: {0}")]
    AudioDecode(#[from] hound::Error),

    #[error("playback requested with no output devices")]
    NoOutputDevices,

    #[error("playback task did not finish: {0}")]
    PlaybackTask(#[from] tokio::task::JoinError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure scoped to a single output device during one `speak` call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("device {device} could not be opened: {reason}")]
    Open { device: DeviceId, reason: String },

    #[error("device {device} failed while writing: {reason}")]
    Write { device: DeviceId, reason: String },

    #[error("playback thread for device {device} panicked")]
    Panicked { device: DeviceId },
}

impl DeviceError {
    pub fn device(&self) -> DeviceId {
        match self {
            DeviceError::Open { device, .. }
            | DeviceError::Write { device, .. }
            | DeviceError::Panicked { device } => *device,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(String),

    #[error("environment variable {0} is not a valid number")]
    ParseNumber(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
