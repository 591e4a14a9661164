use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono_tz::Tz;
use tracing::{info, warn};

use crate::audio::DeviceId;
use crate::calendar::DEFAULT_CALENDAR_KEYWORDS;
use crate::error::ConfigError;
use crate::services::llm::OpenAiConfig;
use crate::services::tts::VoicevoxConfig;

pub const DEFAULT_ASSISTANT_NAME: &str = "メガミ";
pub const DEFAULT_SYSTEM_PROMPT_PATH: &str = "System_Prompt.txt";
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Asia::Seoul;
pub const DEFAULT_OUTPUT_DEVICES: &[DeviceId] = &[6, 4];

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "당신은 사용자의 개인 비서 캐릭터입니다. 캐릭터성을 유지하며 짧고 친근하게 대답하세요.";

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub assistant_name: String,
    pub openai: OpenAiConfig,
    pub voicevox: VoicevoxConfig,
    pub output_devices: Vec<DeviceId>,
    pub system_prompt_path: PathBuf,
    pub events_file: Option<PathBuf>,
    pub timezone: Tz,
    pub calendar_keywords: Vec<String>,
}

impl AssistantConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key/value source. Unset keys take defaults;
    /// set but malformed values are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = get("OPENAI_API_KEY")
            .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;
        let mut openai = OpenAiConfig::new(api_key);
        if let Some(url) = get("OPENAI_BASE_URL") {
            openai.base_url = url;
        }
        if let Some(model) = get("OPENAI_MODEL") {
            openai.model = model;
        }
        openai.temperature = parse_number(&get, "OPENAI_TEMPERATURE", openai.temperature)?;

        let mut voicevox = VoicevoxConfig::default();
        if let Some(url) = get("VOICEVOX_URL") {
            voicevox.base_url = url;
        }
        voicevox.speaker = parse_number(&get, "VOICEVOX_SPEAKER", voicevox.speaker)?;
        let params = &mut voicevox.params;
        params.volume_scale = parse_number(&get, "VOICEVOX_VOLUME_SCALE", params.volume_scale)?;
        params.intonation_scale =
            parse_number(&get, "VOICEVOX_INTONATION_SCALE", params.intonation_scale)?;
        params.pre_phoneme_length =
            parse_number(&get, "VOICEVOX_PRE_PHONEME", params.pre_phoneme_length)?;
        params.post_phoneme_length =
            parse_number(&get, "VOICEVOX_POST_PHONEME", params.post_phoneme_length)?;
        params.speed_scale = parse_number(&get, "VOICEVOX_SPEED_SCALE", params.speed_scale)?;
        params.pitch_scale = parse_number(&get, "VOICEVOX_PITCH_SCALE", params.pitch_scale)?;

        let output_devices = match get("ASSISTANT_OUTPUT_DEVICES") {
            Some(raw) => parse_device_list(&raw)?,
            None => DEFAULT_OUTPUT_DEVICES.to_vec(),
        };

        let timezone = match get("ASSISTANT_TIMEZONE") {
            Some(raw) => raw
                .parse::<Tz>()
                .map_err(|_| ConfigError::Invalid(format!("unknown timezone '{}'", raw)))?,
            None => DEFAULT_TIMEZONE,
        };

        let calendar_keywords = match get("ASSISTANT_CALENDAR_KEYWORDS") {
            Some(raw) => parse_csv_list(&raw),
            None => DEFAULT_CALENDAR_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        };

        Ok(Self {
            assistant_name: get("ASSISTANT_NAME").unwrap_or_else(|| DEFAULT_ASSISTANT_NAME.to_string()),
            openai,
            voicevox,
            output_devices,
            system_prompt_path: get("ASSISTANT_SYSTEM_PROMPT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SYSTEM_PROMPT_PATH)),
            events_file: get("ASSISTANT_EVENTS_FILE").map(PathBuf::from),
            timezone,
            calendar_keywords,
        })
    }
}

fn parse_number<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::ParseNumber(key.to_string())),
        None => Ok(default),
    }
}

pub fn parse_csv_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn parse_device_list(raw: &str) -> Result<Vec<DeviceId>, ConfigError> {
    let devices = parse_csv_list(raw)
        .into_iter()
        .map(|item| {
            item.parse::<DeviceId>().map_err(|_| {
                ConfigError::Invalid(format!(
                    "ASSISTANT_OUTPUT_DEVICES contains invalid device id '{item}'"
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if devices.is_empty() {
        return Err(ConfigError::Invalid(
            "ASSISTANT_OUTPUT_DEVICES must name at least one device".to_string(),
        ));
    }
    Ok(devices)
}

/// Reads the persona prompt, falling back to the built-in one.
pub fn load_system_prompt(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(content) if !content.trim().is_empty() => {
            info!("System prompt loaded from {}", path.display());
            content
        }
        Ok(_) => {
            warn!("System prompt file {} is empty, using default", path.display());
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
        Err(e) => {
            warn!("Failed to load system prompt from {}: {}", path.display(), e);
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
    }
}
