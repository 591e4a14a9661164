use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample, SupportedStreamConfig, SupportedStreamConfigRange};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use super::wav::StreamFormat;
use super::DeviceId;

/// A device stream that accepts sequential chunk writes.
///
/// Sinks are opened, written and closed on one thread and never handed to
/// another, so they need not be `Send`.
pub trait OutputSink {
    fn write(&mut self, chunk: &[f32]) -> anyhow::Result<()>;
    /// Blocks until everything written has been played.
    fn close(self: Box<Self>) -> anyhow::Result<()>;
}

/// Opens sinks by device id.
pub trait OutputBackend: Send + Sync {
    fn open(&self, device: DeviceId, format: StreamFormat) -> anyhow::Result<Box<dyn OutputSink>>;
}

/// Enumerates devices that can play audio, with the ids `CpalBackend` accepts.
pub fn list_output_devices() -> anyhow::Result<Vec<(DeviceId, String)>> {
    let host = cpal::default_host();
    let mut found = Vec::new();
    for (id, device) in host.devices()?.enumerate() {
        if device.default_output_config().is_ok() {
            found.push((id, device.name().unwrap_or_default()));
        }
    }
    Ok(found)
}

/// Output through the default cpal host.
///
/// A device id is the device's position in `Host::devices()`, inputs included.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}
const POLL_INTERVAL: Duration = Duration::from_millis(2);
/// How long a device may take no samples before writes and drains give up.
pub const STALL_TIMEOUT: Duration = Duration::from_secs(2);
// Ring holds roughly half a second at 48kHz stereo.
const RING_CAPACITY: usize = 48_000;

fn format_rank(format: cpal::SampleFormat) -> Option<u8> {
    match format {
        cpal::SampleFormat::F32 => Some(0),
        cpal::SampleFormat::I16 => Some(1),
        cpal::SampleFormat::U16 => Some(2),
        _ => None,
    }
}

/// Picks a supported config that plays `format` as is, preferring f32 samples.
pub fn select_output_config<I>(ranges: I, format: StreamFormat) -> anyhow::Result<SupportedStreamConfig>
where
    I: IntoIterator<Item = SupportedStreamConfigRange>,
{
    let rate = cpal::SampleRate(format.sample_rate);
    ranges
        .into_iter()
        .filter(|range| {
            range.channels() == format.channels
                && range.min_sample_rate() <= rate
                && rate <= range.max_sample_rate()
        })
        .filter_map(|range| format_rank(range.sample_format()).map(|rank| (rank, range)))
        .min_by_key(|(rank, _)| *rank)
        .map(|(_, range)| range.with_sample_rate(rate))
        .ok_or_else(|| {
            anyhow::anyhow!(
                "no supported output config for {} Hz with {} channel(s)",
                format.sample_rate,
                format.channels
            )
        })
}

impl OutputBackend for CpalBackend {
    fn open(&self, device_id: DeviceId, format: StreamFormat) -> anyhow::Result<Box<dyn OutputSink>> {
        let host = cpal::default_host();
        let device = host
            .devices()?
            .nth(device_id)
            .ok_or_else(|| anyhow::anyhow!("No audio device with index {}", device_id))?;

        let name = device.name().unwrap_or_default();
        let supported = select_output_config(device.supported_output_configs()?, format)
            .with_context(|| format!("device {} ({})", device_id, name))?;
        let sample_format = supported.sample_format();
        let config = supported.config();

        let rb = HeapRb::<f32>::new(RING_CAPACITY);
        let (producer, consumer) = rb.split();

        let failed = Arc::new(AtomicBool::new(false));
        let consumed = Arc::new(AtomicUsize::new(0));

        let err_flag = Arc::clone(&failed);
        let err_fn = move |err: cpal::StreamError| {
            error!("an error occurred on output stream: {}", err);
            err_flag.store(true, Ordering::SeqCst);
        };

        let stream = match sample_format {
            cpal::SampleFormat::F32 => {
                build_output::<f32, _>(&device, &config, consumer, Arc::clone(&consumed), err_fn)?
            }
            cpal::SampleFormat::I16 => {
                build_output::<i16, _>(&device, &config, consumer, Arc::clone(&consumed), err_fn)?
            }
            cpal::SampleFormat::U16 => {
                build_output::<u16, _>(&device, &config, consumer, Arc::clone(&consumed), err_fn)?
            }
            other => return Err(anyhow::anyhow!("Unsupported sample format {:?}", other)),
        };

        stream.play()?;

        info!(
            "Audio Output Device {} ({}): Rate={}Hz, Channels={}, Format={:?}",
            device_id, name, format.sample_rate, format.channels, sample_format
        );

        Ok(Box::new(CpalSink {
            stream,
            feed: StreamFeed::new(producer, consumed, failed, STALL_TIMEOUT),
            format,
        }))
    }
}

fn build_output<T, E>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: HeapCons<f32>,
    consumed: Arc<AtomicUsize>,
    err_fn: E,
) -> anyhow::Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
    E: FnMut(cpal::StreamError) + Send + 'static,
{
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let mut popped = 0;
            for slot in data.iter_mut() {
                *slot = match consumer.try_pop() {
                    Some(sample) => {
                        popped += 1;
                        T::from_sample(sample)
                    }
                    // Underrun: pad with silence
                    None => T::EQUILIBRIUM,
                };
            }
            consumed.fetch_add(popped, Ordering::SeqCst);
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}

/// Writer side of the ring between a sink and its stream callback.
///
/// `consumed` counts samples the callback has taken; `failed` is latched by
/// the stream's error callback. A device that stops taking samples for
/// longer than the stall timeout fails the write or drain instead of
/// blocking its playback thread forever.
pub struct StreamFeed {
    producer: HeapProd<f32>,
    consumed: Arc<AtomicUsize>,
    failed: Arc<AtomicBool>,
    written: usize,
    stall_timeout: Duration,
}

impl StreamFeed {
    pub fn new(
        producer: HeapProd<f32>,
        consumed: Arc<AtomicUsize>,
        failed: Arc<AtomicBool>,
        stall_timeout: Duration,
    ) -> Self {
        Self {
            producer,
            consumed,
            failed,
            written: 0,
            stall_timeout,
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    fn check_stream(&self) -> anyhow::Result<()> {
        if self.failed.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("output stream reported an error"));
        }
        Ok(())
    }

    /// Pushes the whole chunk, waiting while the ring is full.
    pub fn write(&mut self, chunk: &[f32]) -> anyhow::Result<()> {
        let mut offset = 0;
        let mut seen = self.consumed.load(Ordering::SeqCst);
        let mut last_progress = Instant::now();

        while offset < chunk.len() {
            self.check_stream()?;
            let pushed = self.producer.push_slice(&chunk[offset..]);
            offset += pushed;
            if offset >= chunk.len() {
                break;
            }

            let now_consumed = self.consumed.load(Ordering::SeqCst);
            if pushed > 0 || now_consumed != seen {
                seen = now_consumed;
                last_progress = Instant::now();
            } else if last_progress.elapsed() >= self.stall_timeout {
                return Err(anyhow::anyhow!(
                    "output stream stalled: no samples taken for {:?}",
                    self.stall_timeout
                ));
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        self.written += chunk.len();
        Ok(())
    }

    /// Waits until the callback has taken everything written.
    pub fn drain(&self, samples_per_sec: usize) -> anyhow::Result<()> {
        let pending = self.written.saturating_sub(self.consumed.load(Ordering::SeqCst));
        let deadline = Instant::now()
            + Duration::from_secs_f64(pending as f64 / samples_per_sec.max(1) as f64)
            + self.stall_timeout;

        while self.consumed.load(Ordering::SeqCst) < self.written {
            self.check_stream()?;
            if Instant::now() >= deadline {
                return Err(anyhow::anyhow!("output stream stalled before draining"));
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        debug!("Output drained after {} samples", self.written);
        Ok(())
    }
}

struct CpalSink {
    stream: cpal::Stream,
    feed: StreamFeed,
    format: StreamFormat,
}

impl OutputSink for CpalSink {
    fn write(&mut self, chunk: &[f32]) -> anyhow::Result<()> {
        self.feed.write(chunk)
    }

    fn close(self: Box<Self>) -> anyhow::Result<()> {
        self.feed
            .drain(self.format.sample_rate as usize * self.format.channels as usize)?;
        self.stream.pause()?;
        Ok(())
    }
}
