use std::io::Write;
use std::sync::Arc;

use megami::audio::{list_output_devices, CpalBackend, DeviceId, SpeechPlaybackPipeline};
use megami::calendar::{EventCache, EventProvider, IntentClassifier, JsonFileEventProvider, StaticEventProvider, TemporalFilter};
use megami::config::{load_system_prompt, AssistantConfig};
use megami::services::llm::OpenAiChatClient;
use megami::services::tts::VoicevoxClient;
use megami::ResponseOrchestrator;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use uuid::Uuid;

const EXIT_WORDS: &[&str] = &["종료", "exit", "quit"];
const FAREWELL_SPEECH: &str = "さようなら";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Setup Logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Err(e) = dotenvy::dotenv() {
        debug!("No .env file loaded: {}", e);
    }
    let config = AssistantConfig::from_env()?;

    match list_output_devices() {
        Ok(devices) => {
            for (id, name) in devices {
                info!("Output device {}: {}", id, name);
            }
        }
        Err(e) => warn!("Could not enumerate audio devices: {:#}", e),
    }

    // 2. Wire the core
    let provider: Arc<dyn EventProvider> = match &config.events_file {
        Some(path) => Arc::new(JsonFileEventProvider::new(path)),
        None => Arc::new(StaticEventProvider::default()),
    };
    let persona = load_system_prompt(&config.system_prompt_path);

    let mut orchestrator = ResponseOrchestrator::new(
        persona,
        Arc::new(OpenAiChatClient::new(config.openai.clone())),
        EventCache::new(provider),
        IntentClassifier::new(config.calendar_keywords.clone(), config.timezone),
        TemporalFilter::new(config.timezone),
    );
    let pipeline = SpeechPlaybackPipeline::new(
        Arc::new(VoicevoxClient::new(config.voicevox.clone())),
        Arc::new(CpalBackend::new()),
    );

    let session_id = Uuid::new_v4().to_string();
    let name = &config.assistant_name;
    info!("Session {} started, output devices {:?}", session_id, config.output_devices);

    // 3. Console loop
    println!("{}: 안녕하세요! 무엇을 도와드릴까요?", name);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if EXIT_WORDS.contains(&input.to_lowercase().as_str()) {
            println!("{}: 안녕히 가세요!", name);
            speak(&pipeline, FAREWELL_SPEECH, &config.output_devices).await;
            break;
        }

        match orchestrator.respond(input, &session_id).await {
            Ok(reply) => {
                println!("{}: {}", name, reply);
                speak(&pipeline, &reply, &config.output_devices).await;
            }
            Err(e) => {
                error!("Turn failed: {}", e);
                println!("{}: 죄송합니다, 지금은 대답할 수 없어요.", name);
            }
        }
    }

    Ok(())
}

async fn speak(pipeline: &SpeechPlaybackPipeline, text: &str, devices: &[DeviceId]) {
    match pipeline.speak(text, devices).await {
        Ok(report) if report.is_success() => {}
        Ok(report) => warn!("Playback failed on devices {:?}", report.failed_devices()),
        Err(e) => error!("Speech output failed: {}", e),
    }
}
