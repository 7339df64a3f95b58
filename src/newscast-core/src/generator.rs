//! Incremental script generation.
//!
//! A single completion cannot reliably produce a long, well-formed dialogue,
//! so the script is requested in chunks. Every chunk prompt carries the full
//! dialogue so far; every response is parsed and validated before it is
//! appended. The loop ends when the target is reached (`Completed`) or the
//! model returns an empty chunk (`Stalled`).

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use crate::config::GenerationSettings;
use crate::error::{NewscastError, Result};
use crate::headline::HeadlineItem;
use crate::llm::LanguageModel;
use crate::parser::parse_turns;
use crate::persona::PersonaSet;
use crate::prompt::{SYSTEM_PROMPT, build_prompt};
use crate::script::{ScriptAccumulator, ScriptArtifacts, Turn};

/// Assumed speaking rate used to size the script.
const WORDS_PER_MINUTE: f64 = 120.0;
/// Assumed average turn length.
const WORDS_PER_TURN: f64 = 20.0;
const MIN_TURNS: usize = 5;

/// Number of turns needed to fill roughly `duration_secs` of speech.
pub fn target_total_turns(duration_secs: f64) -> usize {
    let words = duration_secs.max(0.0) * WORDS_PER_MINUTE / 60.0;
    ((words / WORDS_PER_TURN).round() as usize).max(MIN_TURNS)
}

/// Where and how the loop writes its artifacts.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Maximum turns requested per model call.
    pub chunk_size: usize,
    pub output_dir: PathBuf,
    pub basename: String,
}

/// How the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// The target number of turns was reached.
    Completed,
    /// The model returned an empty chunk before the target was reached.
    Stalled,
}

/// Result of a generation run.
#[derive(Debug, Clone)]
pub struct GeneratedScript {
    pub turns: Vec<Turn>,
    pub outcome: GenerationOutcome,
    /// Number of model calls made.
    pub iterations: usize,
    pub artifacts: ScriptArtifacts,
}

/// Events emitted while the script is generated.
#[derive(Debug, Clone)]
pub enum GenerationEvent {
    /// A prompt was written and is about to be sent.
    ChunkRequested {
        iteration: usize,
        requested: usize,
        prompt_path: PathBuf,
    },
    /// A response was parsed.
    ChunkReceived { iteration: usize, turns: usize },
    /// The loop terminated and artifacts were written.
    Finished {
        outcome: GenerationOutcome,
        total_turns: usize,
    },
}

/// Callback for generation events.
pub type GenerationCallback = Box<dyn Fn(GenerationEvent) + Send + Sync>;

/// Drives the chunked generation loop.
pub struct ScriptGenerator {
    model: Box<dyn LanguageModel>,
    config: GeneratorConfig,
    callback: Option<GenerationCallback>,
}

impl ScriptGenerator {
    pub fn new(model: Box<dyn LanguageModel>, config: GeneratorConfig) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(NewscastError::Config(
                "chunk size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            model,
            config,
            callback: None,
        })
    }

    /// Set a callback for generation events.
    pub fn with_callback(mut self, callback: GenerationCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Generate a script of about `target_turns` turns.
    ///
    /// Any malformed chunk aborts the run; nothing is retried.
    pub async fn generate(
        &self,
        headlines: &[HeadlineItem],
        personas: &PersonaSet,
        settings: &GenerationSettings,
        target_turns: usize,
    ) -> Result<GeneratedScript> {
        let prompts_dir = self.config.output_dir.join("prompts");
        fs::create_dir_all(&prompts_dir).await?;

        let mut accumulator = ScriptAccumulator::new();
        let mut iteration = 1;

        let outcome = loop {
            let remaining = target_turns.saturating_sub(accumulator.len());
            if remaining == 0 {
                break GenerationOutcome::Completed;
            }
            let requested = remaining.min(self.config.chunk_size);

            let prompt = build_prompt(
                headlines,
                personas,
                accumulator.turns(),
                requested,
                settings,
            )?;
            let prompt_path = write_prompt(&prompts_dir, iteration, &prompt).await?;
            info!(iteration, requested, path = %prompt_path.display(), "saved prompt");
            self.emit_event(GenerationEvent::ChunkRequested {
                iteration,
                requested,
                prompt_path,
            });

            let raw = self.model.complete(SYSTEM_PROMPT, &prompt).await?;
            accumulator.record_raw(raw.as_str());

            let chunk = parse_turns(&raw)?;
            validate_speakers(&chunk, personas)?;
            info!(iteration, turns = chunk.len(), "generated new turns");
            self.emit_event(GenerationEvent::ChunkReceived {
                iteration,
                turns: chunk.len(),
            });

            if chunk.is_empty() {
                warn!(
                    iteration,
                    accumulated = accumulator.len(),
                    target = target_turns,
                    "no new turns generated, stopping early"
                );
                break GenerationOutcome::Stalled;
            }

            accumulator.extend(chunk);
            iteration += 1;
        };

        let artifacts = accumulator
            .persist(&self.config.output_dir, &self.config.basename)
            .await?;
        info!(
            ?outcome,
            turns = accumulator.len(),
            json = %artifacts.json.display(),
            text = %artifacts.text.display(),
            "wrote final script"
        );
        self.emit_event(GenerationEvent::Finished {
            outcome,
            total_turns: accumulator.len(),
        });

        let iterations = match outcome {
            GenerationOutcome::Completed => iteration - 1,
            GenerationOutcome::Stalled => iteration,
        };

        Ok(GeneratedScript {
            turns: accumulator.into_turns(),
            outcome,
            iterations,
            artifacts,
        })
    }

    /// Emit an event if a callback is registered.
    fn emit_event(&self, event: GenerationEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }
}

async fn write_prompt(dir: &Path, iteration: usize, prompt: &str) -> Result<PathBuf> {
    let path = dir.join(format!("prompt_{:03}.txt", iteration));
    fs::write(&path, prompt).await?;
    Ok(path)
}

/// Reject a chunk if any turn names a speaker that is not a persona.
fn validate_speakers(chunk: &[Turn], personas: &PersonaSet) -> Result<()> {
    match chunk.iter().position(|t| !personas.contains(&t.speaker)) {
        Some(i) => Err(NewscastError::MalformedOutput(format!(
            "turn {} names unknown speaker '{}' (expected one of: {})",
            i,
            chunk[i].speaker,
            personas.names().join(", ")
        ))),
        None => Ok(()),
    }
}
