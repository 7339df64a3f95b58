//! End-to-end episode production.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::assembler::{MixOptions, assemble};
use crate::audio::{AudioFormat, write_audio};
use crate::config::GenerationSettings;
use crate::error::{NewscastError, Result};
use crate::generator::{GenerationOutcome, ScriptGenerator, target_total_turns};
use crate::headline::HeadlineCollector;
use crate::persona::PersonaSet;
use crate::synth::{StylePolicy, synthesize_turns};
use crate::tts::SpeechSynthesizer;

/// Everything that describes one episode.
#[derive(Debug, Clone)]
pub struct EpisodeRequest {
    pub personas: PersonaSet,
    pub settings: GenerationSettings,
    /// Per-run voice overrides keyed by persona name.
    pub voice_overrides: BTreeMap<String, String>,
    pub duration_secs: f64,
    pub max_articles: usize,
    /// Format requested from the TTS backend.
    pub tts_format: AudioFormat,
    pub tts_concurrency: usize,
    pub target_dbfs: f32,
    pub crossfade_ms: u64,
    /// Container of the final episode.
    pub output_format: AudioFormat,
    /// Where the final episode is written.
    pub output_path: PathBuf,
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct EpisodeSummary {
    pub turns: usize,
    pub outcome: GenerationOutcome,
    pub duration_secs: f32,
    pub output_path: PathBuf,
}

/// Wires the collector, generator and TTS backend together.
pub struct Newscast {
    collector: Box<dyn HeadlineCollector>,
    generator: ScriptGenerator,
    tts: Box<dyn SpeechSynthesizer>,
}

impl Newscast {
    pub fn new(
        collector: Box<dyn HeadlineCollector>,
        generator: ScriptGenerator,
        tts: Box<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            collector,
            generator,
            tts,
        }
    }

    /// Produce one episode. Fatal preconditions are checked before any
    /// external call is made.
    pub async fn run(&self, request: &EpisodeRequest) -> Result<EpisodeSummary> {
        let settings = &request.settings;
        if settings.topics.is_empty() {
            return Err(NewscastError::Config(
                "No topics provided. Pass --topics (comma-separated).".to_string(),
            ));
        }
        if request.personas.is_empty() {
            return Err(NewscastError::Config("No personas defined".to_string()));
        }
        check_output_extension(&request.output_path, request.output_format)?;
        let voices = request.personas.voice_map(&request.voice_overrides)?;

        let headlines = self
            .collector
            .fetch(&settings.topics, request.max_articles)
            .await?;
        if headlines.is_empty() {
            return Err(NewscastError::CollectorEmpty);
        }

        let target_turns = target_total_turns(request.duration_secs);
        info!(
            target_turns,
            duration_secs = request.duration_secs,
            headlines = headlines.len(),
            personas = request.personas.len(),
            "generating script"
        );
        let script = self
            .generator
            .generate(&headlines, &request.personas, settings, target_turns)
            .await?;

        let policy = StylePolicy::from_personas(
            &request.personas,
            settings.global_volume_db,
            settings.global_pause_ms,
        );
        let synthesized = synthesize_turns(
            self.tts.as_ref(),
            &script.turns,
            &voices,
            request.tts_format,
            &policy,
            request.tts_concurrency,
        )
        .await?;

        let options = MixOptions {
            intro: settings.intro.as_deref(),
            outro: settings.outro.as_deref(),
            music_volume_db: settings.music_volume_db,
            target_dbfs: request.target_dbfs,
            crossfade_ms: request.crossfade_ms,
        };
        let mix = assemble(&synthesized, &options)
            .ok_or_else(|| NewscastError::Audio("No playable audio was produced".to_string()))?
            .apply_gain(settings.global_volume_db);

        write_audio(&request.output_path, &mix, request.output_format)?;
        info!(
            path = %request.output_path.display(),
            format = request.output_format.extension(),
            seconds = mix.duration_secs(),
            "wrote episode"
        );

        Ok(EpisodeSummary {
            turns: script.turns.len(),
            outcome: script.outcome,
            duration_secs: mix.duration_secs(),
            output_path: request.output_path.clone(),
        })
    }
}

/// An output name ending in a known audio extension must match the format.
fn check_output_extension(path: &Path, format: AudioFormat) -> Result<()> {
    let named = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(|e| AudioFormat::parse(e).ok());
    match named {
        Some(named) if named != format => Err(NewscastError::Config(format!(
            "Output {} does not match the requested {} format",
            path.display(),
            format.extension()
        ))),
        _ => Ok(()),
    }
}
