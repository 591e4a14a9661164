use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Barrier};
use std::thread;

use tracing::{error, info, warn};

use super::output::OutputBackend;
use super::wav::DecodedAudio;
use super::DeviceId;
use crate::error::{AssistantError, DeviceError};
use crate::services::tts::TextToAudio;

/// Frames written per call. Shared by all devices so they advance in lockstep.
pub const CHUNK_FRAMES: usize = 1024;

/// One utterance bound to the devices it should play on.
#[derive(Debug, Clone)]
pub struct PlaybackRequest {
    audio: DecodedAudio,
    target_devices: Vec<DeviceId>,
}

impl PlaybackRequest {
    /// Duplicate ids are dropped, first occurrence wins. An empty set is refused.
    pub fn new(
        audio: DecodedAudio,
        devices: impl IntoIterator<Item = DeviceId>,
    ) -> Result<Self, AssistantError> {
        let mut target_devices: Vec<DeviceId> = Vec::new();
        for device in devices {
            if !target_devices.contains(&device) {
                target_devices.push(device);
            }
        }
        if target_devices.is_empty() {
            return Err(AssistantError::NoOutputDevices);
        }
        Ok(Self { audio, target_devices })
    }

    pub fn audio(&self) -> &DecodedAudio {
        &self.audio
    }

    pub fn target_devices(&self) -> &[DeviceId] {
        &self.target_devices
    }
}

/// Per-device outcome of one `speak` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackReport {
    pub completed: Vec<DeviceId>,
    pub failed: Vec<DeviceError>,
}

impl PlaybackReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_devices(&self) -> Vec<DeviceId> {
        self.failed.iter().map(DeviceError::device).collect()
    }
}

/// Text in, audio out on every requested device.
pub struct SpeechPlaybackPipeline {
    tts: Arc<dyn TextToAudio>,
    backend: Arc<dyn OutputBackend>,
}

impl SpeechPlaybackPipeline {
    pub fn new(tts: Arc<dyn TextToAudio>, backend: Arc<dyn OutputBackend>) -> Self {
        Self { tts, backend }
    }

    /// Synthesizes `text` and plays it on all `devices` at once.
    ///
    /// Returns once every device finished or failed. Synthesis failures abort
    /// before any device is opened; device failures are listed in the report.
    pub async fn speak(
        &self,
        text: &str,
        devices: &[DeviceId],
    ) -> Result<PlaybackReport, AssistantError> {
        if devices.is_empty() {
            return Err(AssistantError::NoOutputDevices);
        }

        let wav = self.tts.synthesize(text).await.map_err(|e| {
            error!("Speech synthesis failed: {:#}", e);
            AssistantError::Synthesis(e)
        })?;
        let audio = DecodedAudio::from_wav_bytes(&wav)?;
        let request = PlaybackRequest::new(audio, devices.iter().copied())?;

        let backend = Arc::clone(&self.backend);
        let report = tokio::task::spawn_blocking(move || play(backend.as_ref(), &request)).await?;
        Ok(report)
    }
}

/// Drives one thread per device and joins them all.
///
/// Threads meet at a barrier after opening their device (successfully or
/// not), so healthy devices start together and a failed open never leaves
/// the others waiting.
pub fn play(backend: &dyn OutputBackend, request: &PlaybackRequest) -> PlaybackReport {
    let devices = request.target_devices();
    let audio = request.audio();
    let barrier = Barrier::new(devices.len());

    info!(
        "Playing {} frames on devices {:?}",
        audio.frame_count(),
        devices
    );

    let outcomes: Vec<(DeviceId, Result<(), DeviceError>)> = thread::scope(|scope| {
        let handles: Vec<_> = devices
            .iter()
            .map(|&device| {
                let barrier = &barrier;
                let handle = scope.spawn(move || drive_device(backend, device, audio, barrier));
                (device, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(device, handle)| {
                let outcome = handle
                    .join()
                    .unwrap_or(Err(DeviceError::Panicked { device }));
                (device, outcome)
            })
            .collect()
    });

    let mut report = PlaybackReport::default();
    for (device, outcome) in outcomes {
        match outcome {
            Ok(()) => report.completed.push(device),
            Err(e) => {
                warn!("Playback failed: {}", e);
                report.failed.push(e);
            }
        }
    }
    report
}

fn drive_device(
    backend: &dyn OutputBackend,
    device: DeviceId,
    audio: &DecodedAudio,
    barrier: &Barrier,
) -> Result<(), DeviceError> {
    let opened = panic::catch_unwind(AssertUnwindSafe(|| backend.open(device, audio.format())));

    barrier.wait();

    let mut sink = match opened {
        Ok(Ok(sink)) => sink,
        Ok(Err(e)) => {
            return Err(DeviceError::Open {
                device,
                reason: format!("{:#}", e),
            })
        }
        Err(_) => return Err(DeviceError::Panicked { device }),
    };

    for chunk in audio.chunks(CHUNK_FRAMES) {
        sink.write(chunk).map_err(|e| DeviceError::Write {
            device,
            reason: format!("{:#}", e),
        })?;
    }

    sink.close().map_err(|e| DeviceError::Write {
        device,
        reason: format!("{:#}", e),
    })
}
