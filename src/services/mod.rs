pub mod llm;
pub mod tts;
