//! Newscast Core Library
//!
//! Turns topic queries into a two-host newscast: headline collection,
//! chunked script generation, per-turn speech synthesis and the final mix.

pub mod assembler;
pub mod audio;
pub mod config;
pub mod error;
pub mod generator;
pub mod headline;
pub mod llm;
pub mod parser;
pub mod persona;
pub mod pipeline;
pub mod prompt;
pub mod script;
pub mod synth;
pub mod tts;

pub use audio::{AudioFormat, Clip};
pub use config::{Config, GenerationSettings, ProfanityPolicy, TtsProvider};
pub use error::{NewscastError, Result};
pub use generator::{
    GeneratedScript, GenerationEvent, GenerationOutcome, GeneratorConfig, ScriptGenerator,
    target_total_turns,
};
pub use headline::{HeadlineCollector, HeadlineItem, NewsApiCollector};
pub use llm::{LanguageModel, OpenAiModel};
pub use persona::{Persona, PersonaFile, PersonaSet};
pub use pipeline::{EpisodeRequest, EpisodeSummary, Newscast};
pub use script::Turn;
pub use synth::{StylePolicy, SynthesizedTurn};
pub use tts::{CartesiaTts, KokoroTts, SpeechSynthesizer};
