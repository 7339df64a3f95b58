//! Configuration module for loading TOML config files.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{NewscastError, Result};
use crate::persona::FileSettings;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub generation: GenerationConfig,
    pub audio: AudioConfig,
    pub tts: TtsConfig,
    /// Per-run voice overrides keyed by persona name.
    pub voices: BTreeMap<String, String>,
}

/// Language model call parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// OpenAI-compatible base URL; the environment wins when unset.
    pub api_base: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.8,
            max_tokens: 1500,
            api_base: None,
        }
    }
}

/// Script generation loop parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub chunk_size: usize,
    pub output_dir: PathBuf,
    pub basename: String,
    pub max_articles: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            chunk_size: 5,
            output_dir: PathBuf::from("./out"),
            basename: "podcast_script".to_string(),
            max_articles: 6,
        }
    }
}

/// Final mix parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub target_dbfs: f32,
    pub crossfade_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            target_dbfs: -16.0,
            crossfade_ms: 0,
        }
    }
}

/// Which speech backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsProvider {
    Cartesia,
    Kokoro,
}

/// Speech synthesis parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub provider: TtsProvider,
    /// Cartesia model; `CARTESIA_MODEL_ID` is used when unset.
    pub model_id: Option<String>,
    /// Cartesia language; `CARTESIA_LANGUAGE` is used when unset.
    pub language: Option<String>,
    /// Maximum number of in-flight synthesis calls.
    pub concurrency: usize,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            provider: TtsProvider::Cartesia,
            model_id: None,
            language: None,
            concurrency: 1,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| NewscastError::Config(format!("Failed to read config: {}", e)))?;

        Self::from_str(&content)
    }

    /// Load configuration from string content.
    pub fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| NewscastError::Config(format!("Failed to parse config: {}", e)))
    }
}

/// Whether the hosts may swear.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProfanityPolicy {
    Filtered,
    Unfiltered,
    #[default]
    Unspecified,
}

impl From<Option<bool>> for ProfanityPolicy {
    fn from(filter: Option<bool>) -> Self {
        match filter {
            Some(true) => ProfanityPolicy::Filtered,
            Some(false) => ProfanityPolicy::Unfiltered,
            None => ProfanityPolicy::Unspecified,
        }
    }
}

/// Settings for one episode. The generation loop only reads them.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub topics: Vec<String>,
    pub regions: Vec<String>,
    pub profanity: ProfanityPolicy,
    pub intro: Option<PathBuf>,
    pub outro: Option<PathBuf>,
    pub music_volume_db: f32,
    pub global_pause_ms: u64,
    pub global_volume_db: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            topics: Vec::new(),
            regions: Vec::new(),
            profanity: ProfanityPolicy::Unspecified,
            intro: None,
            outro: None,
            music_volume_db: 0.0,
            global_pause_ms: 120,
            global_volume_db: 0.0,
        }
    }
}

impl GenerationSettings {
    /// Combine run topics and regions with the persona file's settings block.
    ///
    /// Regions only ever come from the run; the file cannot inject them.
    pub fn from_file_settings(
        topics: Vec<String>,
        regions: Vec<String>,
        file: &FileSettings,
    ) -> Self {
        let defaults = Self::default();
        Self {
            topics,
            regions,
            profanity: file.profanity_filter.into(),
            intro: file.intro.clone(),
            outro: file.outro.clone(),
            music_volume_db: file.music_volume_db.unwrap_or(defaults.music_volume_db),
            global_pause_ms: file.pause_ms.unwrap_or(defaults.global_pause_ms),
            global_volume_db: file.volume_db.unwrap_or(defaults.global_volume_db),
        }
    }
}

/// Split a comma-separated CLI list, dropping blanks.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a `{"persona": "voice id"}` JSON object.
pub fn parse_voice_map(content: &str) -> Result<BTreeMap<String, String>> {
    serde_json::from_str(content)
        .map_err(|e| NewscastError::Config(format!("Invalid voice map: {}", e)))
}

/// Default configuration embedded in the binary.
pub fn default_config() -> Config {
    Config::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_voice_map() {
        let map = parse_voice_map(r#"{"Alex": "v-1", "Sam": "v-2"}"#).unwrap();
        assert_eq!(map["Alex"], "v-1");
        assert_eq!(map.len(), 2);
        assert!(matches!(
            parse_voice_map(r#"["Alex"]"#),
            Err(NewscastError::Config(_))
        ));
    }

    #[test]
    fn test_defaults() {
        let config = default_config();
        assert_eq!(config.llm.model, "gpt-3.5-turbo");
        assert_eq!(config.generation.chunk_size, 5);
        assert_eq!(config.generation.basename, "podcast_script");
        assert_eq!(config.audio.target_dbfs, -16.0);
        assert_eq!(config.tts.provider, TtsProvider::Cartesia);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_str(
            r#"
            [llm]
            model = "gpt-4o-mini"

            [tts]
            provider = "kokoro"
            concurrency = 4

            [voices]
            Alex = "bf_emma"
            "#,
        )
        .unwrap();
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.max_tokens, 1500);
        assert_eq!(config.tts.provider, TtsProvider::Kokoro);
        assert_eq!(config.tts.concurrency, 4);
        assert_eq!(config.voices.get("Alex").map(String::as_str), Some("bf_emma"));
        assert_eq!(config.generation.chunk_size, 5);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Config::from_str("[llm\nmodel = 1").unwrap_err();
        assert!(matches!(err, NewscastError::Config(_)));
    }

    #[test]
    fn test_settings_from_file() {
        let file = FileSettings {
            profanity_filter: Some(false),
            pause_ms: Some(300),
            ..Default::default()
        };
        let settings = GenerationSettings::from_file_settings(
            vec!["tech".into()],
            vec![],
            &file,
        );
        assert_eq!(settings.profanity, ProfanityPolicy::Unfiltered);
        assert_eq!(settings.global_pause_ms, 300);
        assert_eq!(settings.global_volume_db, 0.0);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(" tech, ,world ,"), vec!["tech", "world"]);
        assert!(split_list("").is_empty());
    }
}
