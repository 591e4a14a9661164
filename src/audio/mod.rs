pub mod wav;
pub mod output;
pub mod playback;

/// Index of an audio device as enumerated by the output backend.
pub type DeviceId = usize;

pub use wav::{DecodedAudio, StreamFormat};
pub use output::{
    list_output_devices, select_output_config, CpalBackend, OutputBackend, OutputSink, StreamFeed,
    STALL_TIMEOUT,
};
pub use playback::{play, PlaybackReport, PlaybackRequest, SpeechPlaybackPipeline, CHUNK_FRAMES};
