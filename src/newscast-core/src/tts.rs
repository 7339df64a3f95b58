//! Text-to-speech backends.
//!
//! Each backend turns one line of text into one encoded audio payload.
//! [`CartesiaTts`] calls the Cartesia HTTP API; [`KokoroTts`] runs the
//! kokoro-tiny model locally.

use async_trait::async_trait;
use kokoro_tiny::TtsEngine;
use serde_json::json;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::audio::{AudioFormat, Clip, encode_wav};
use crate::error::{NewscastError, Result};

pub const CARTESIA_BASE_URL: &str = "https://api.cartesia.ai";
const CARTESIA_VERSION: &str = "2024-06-10";
const CARTESIA_SAMPLE_RATE: u32 = 44100;

/// Sample rate of kokoro-tiny output.
pub const KOKORO_SAMPLE_RATE: u32 = 24000;

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` with `voice_id`, returning encoded audio bytes.
    async fn synthesize(&self, text: &str, voice_id: &str, format: AudioFormat) -> Result<Vec<u8>>;
}

/// Cartesia `tts/bytes` client.
#[derive(Debug, Clone)]
pub struct CartesiaTts {
    api_key: Option<String>,
    base_url: String,
    model_id: String,
    language: String,
    client: reqwest::Client,
}

impl CartesiaTts {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| NewscastError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key: api_key.filter(|k| !k.is_empty()),
            base_url: CARTESIA_BASE_URL.to_string(),
            model_id: "sonic-3".to_string(),
            language: "en".to_string(),
            client,
        })
    }

    /// Build a client from `CARTESIA_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut tts = Self::new(std::env::var("CARTESIA_API_KEY").ok())?;
        if let Ok(base) = std::env::var("CARTESIA_BASE") {
            tts = tts.with_base_url(base);
        }
        if let Ok(model_id) = std::env::var("CARTESIA_MODEL_ID") {
            tts.model_id = model_id;
        }
        if let Ok(language) = std::env::var("CARTESIA_LANGUAGE") {
            tts.language = language;
        }
        Ok(tts)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    fn output_format(format: AudioFormat) -> serde_json::Value {
        match format {
            AudioFormat::Wav => json!({
                "container": "wav",
                "sample_rate": CARTESIA_SAMPLE_RATE,
                "encoding": "pcm_s16le",
            }),
            AudioFormat::Mp3 => json!({
                "container": "mp3",
                "sample_rate": CARTESIA_SAMPLE_RATE,
                "bit_rate": 128000,
            }),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for CartesiaTts {
    async fn synthesize(&self, text: &str, voice_id: &str, format: AudioFormat) -> Result<Vec<u8>> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            NewscastError::Auth("CARTESIA_API_KEY environment variable not set".to_string())
        })?;

        let body = json!({
            "model_id": self.model_id,
            "transcript": text,
            "voice": {"mode": "id", "id": voice_id},
            "language": self.language,
            "output_format": Self::output_format(format),
        });

        let resp = self
            .client
            .post(format!("{}/tts/bytes", self.base_url))
            .header("X-API-Key", api_key)
            .header("Cartesia-Version", CARTESIA_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(NewscastError::Http {
                service: "Cartesia",
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        let bytes = resp.bytes().await?;
        debug!(voice = voice_id, bytes = bytes.len(), "synthesized turn");
        Ok(bytes.to_vec())
    }
}

/// Local synthesis with kokoro-tiny (downloads the model on first run).
///
/// Always returns 16-bit WAV regardless of the requested format.
pub struct KokoroTts {
    engine: Mutex<TtsEngine>,
    available_voices: Vec<String>,
}

impl KokoroTts {
    pub async fn new() -> Result<Self> {
        let engine = TtsEngine::new()
            .await
            .map_err(|e| NewscastError::Config(format!("Failed to initialize TTS: {}", e)))?;

        let available_voices = engine.voices();

        Ok(Self {
            engine: Mutex::new(engine),
            available_voices,
        })
    }

    /// Get list of available voice IDs.
    pub fn available_voices(&self) -> &[String] {
        &self.available_voices
    }

    /// Validate that a voice ID exists.
    pub fn validate_voice(&self, voice_id: &str) -> Result<()> {
        if self.available_voices.iter().any(|v| v == voice_id) {
            return Ok(());
        }
        let mut voices: Vec<&str> = self.available_voices.iter().map(String::as_str).collect();
        voices.sort_unstable();
        Err(NewscastError::Config(format!(
            "Unknown voice '{}'. Available voices: {}",
            voice_id,
            voices.join(", ")
        )))
    }
}

#[async_trait]
impl SpeechSynthesizer for KokoroTts {
    async fn synthesize(&self, text: &str, voice_id: &str, _format: AudioFormat) -> Result<Vec<u8>> {
        self.validate_voice(voice_id)?;

        // kokoro-tiny has a ~200 character safe limit per call
        let mut engine = self.engine.lock().await;
        let mut samples = Vec::new();
        for chunk in split_into_chunks(text, 200) {
            let audio = engine
                .synthesize(&chunk, Some(voice_id))
                .map_err(|e| NewscastError::Audio(format!("Synthesis failed: {}", e)))?;
            samples.extend(audio);
        }

        encode_wav(&Clip::new(samples, KOKORO_SAMPLE_RATE))
    }
}

/// Split text into chunks of at most roughly `max_chars`, on sentence and
/// then comma boundaries.
fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in text.split_inclusive(&['.', '!', '?', ';'][..]) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }
        if sentence.len() > max_chars {
            for part in sentence.split_inclusive(',') {
                push_part(part.trim(), max_chars, &mut current, &mut chunks);
            }
        } else {
            push_part(sentence, max_chars, &mut current, &mut chunks);
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }

    chunks
}

fn push_part(part: &str, max_chars: usize, current: &mut String, chunks: &mut Vec<String>) {
    if !current.is_empty() && current.len() + part.len() > max_chars {
        chunks.push(current.trim().to_string());
        current.clear();
    }
    current.push_str(part);
    current.push(' ');
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_split_into_chunks() {
        let text = "Hello world. This is a test. Another sentence here.";
        let chunks = split_into_chunks(text, 30);
        assert_eq!(
            chunks,
            vec!["Hello world. This is a test.", "Another sentence here."]
        );
    }

    #[test]
    fn test_split_long_sentence_on_commas() {
        let text = "one two three, four five six, seven eight nine.";
        let chunks = split_into_chunks(text, 20);
        assert!(chunks.len() >= 2);
        assert_eq!(chunks.join(" "), text);
    }

    #[tokio::test]
    async fn test_cartesia_missing_key_is_auth_error() {
        let tts = CartesiaTts::new(None).unwrap();
        let err = tts.synthesize("Hi", "v1", AudioFormat::Wav).await.unwrap_err();
        assert!(matches!(err, NewscastError::Auth(_)));
    }

    #[tokio::test]
    async fn test_cartesia_returns_body_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tts/bytes"))
            .and(header("X-API-Key", "secret"))
            .and(body_partial_json(json!({
                "model_id": "sonic-2",
                "language": "de",
                "transcript": "Hello there",
                "voice": {"mode": "id", "id": "voice-1"},
                "output_format": {"container": "mp3"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;

        let tts = CartesiaTts::new(Some("secret".into()))
            .unwrap()
            .with_base_url(server.uri())
            .with_model_id("sonic-2")
            .with_language("de");
        let bytes = tts
            .synthesize("Hello there", "voice-1", AudioFormat::Mp3)
            .await
            .unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_cartesia_error_status_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(402).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let tts = CartesiaTts::new(Some("secret".into()))
            .unwrap()
            .with_base_url(server.uri());
        match tts.synthesize("Hi", "v1", AudioFormat::Wav).await.unwrap_err() {
            NewscastError::Http { status, body, .. } => {
                assert_eq!(status, 402);
                assert_eq!(body, "quota exceeded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
