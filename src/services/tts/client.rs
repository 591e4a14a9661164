use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

/// Converts text into WAV bytes.
#[async_trait]
pub trait TextToAudio: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// Adjustments applied to the audio query before synthesis.
/// Scales are multipliers around 1.0; pitch is an offset around 0.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceParams {
    pub volume_scale: f64,
    pub intonation_scale: f64,
    pub pre_phoneme_length: f64,
    pub post_phoneme_length: f64,
    pub speed_scale: f64,
    pub pitch_scale: f64,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            volume_scale: 1.0,
            intonation_scale: 0.6,
            pre_phoneme_length: 0.1,
            post_phoneme_length: 0.1,
            speed_scale: 1.0,
            pitch_scale: 0.0,
        }
    }
}

impl VoiceParams {
    /// Overwrites the tunable fields of a VOICEVOX audio query in place.
    pub fn apply(&self, query: &mut Value) -> Result<()> {
        let fields = query
            .as_object_mut()
            .ok_or_else(|| anyhow!("audio query is not a JSON object"))?;
        fields.insert("volumeScale".into(), self.volume_scale.into());
        fields.insert("intonationScale".into(), self.intonation_scale.into());
        fields.insert("prePhonemeLength".into(), self.pre_phoneme_length.into());
        fields.insert("postPhonemeLength".into(), self.post_phoneme_length.into());
        fields.insert("speedScale".into(), self.speed_scale.into());
        fields.insert("pitchScale".into(), self.pitch_scale.into());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct VoicevoxConfig {
    pub base_url: String,
    pub speaker: u32,
    pub params: VoiceParams,
}

impl Default for VoicevoxConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:50021".to_string(),
            speaker: 8,
            params: VoiceParams::default(),
        }
    }
}

/// Client for a local VOICEVOX engine: `audio_query` then `synthesis`.
#[derive(Clone)]
pub struct VoicevoxClient {
    client: Client,
    config: VoicevoxConfig,
}

impl VoicevoxClient {
    pub fn new(config: VoicevoxConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn audio_query(&self, text: &str) -> Result<Value> {
        let speaker = self.config.speaker.to_string();
        let response = self
            .client
            .post(self.endpoint("audio_query"))
            .query(&[("text", text), ("speaker", speaker.as_str())])
            .send()
            .await
            .context("audio_query request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("audio_query returned {}", response.status()));
        }
        response.json().await.context("audio_query returned invalid JSON")
    }
}

#[async_trait]
impl TextToAudio for VoicevoxClient {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let mut query = self.audio_query(text).await?;
        self.config.params.apply(&mut query)?;

        let speaker = self.config.speaker.to_string();
        let response = self
            .client
            .post(self.endpoint("synthesis"))
            .query(&[("speaker", speaker.as_str())])
            .json(&query)
            .send()
            .await
            .context("synthesis request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("synthesis returned {}", response.status()));
        }

        let bytes = response.bytes().await.context("reading synthesized audio")?;
        debug!("Synthesized {} bytes for speaker {}", bytes.len(), self.config.speaker);
        Ok(bytes.to_vec())
    }
}
