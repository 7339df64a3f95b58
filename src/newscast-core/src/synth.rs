//! Per-turn speech synthesis with per-host volume and pause styling.

use futures_util::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::audio::{AudioFormat, decode, encode_wav};
use crate::error::{NewscastError, Result};
use crate::persona::PersonaSet;
use crate::script::Turn;
use crate::tts::SpeechSynthesizer;

/// Volume and pause rules applied to every synthesized clip.
///
/// A persona's own value replaces the global one; they do not add up.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StylePolicy {
    pub persona_volume_db: HashMap<String, f32>,
    pub persona_pause_ms: HashMap<String, u64>,
    pub global_volume_db: f32,
    pub global_pause_ms: u64,
}

impl StylePolicy {
    pub fn from_personas(personas: &PersonaSet, global_volume_db: f32, global_pause_ms: u64) -> Self {
        Self {
            persona_volume_db: personas.volume_map(),
            persona_pause_ms: personas.pause_map(),
            global_volume_db,
            global_pause_ms,
        }
    }

    pub fn volume_db(&self, speaker: &str) -> f32 {
        self.persona_volume_db
            .get(speaker)
            .copied()
            .unwrap_or(self.global_volume_db)
    }

    pub fn pause_ms(&self, speaker: &str) -> u64 {
        self.persona_pause_ms
            .get(speaker)
            .copied()
            .unwrap_or(self.global_pause_ms)
    }
}

/// A turn and its encoded audio.
#[derive(Debug, Clone)]
pub struct SynthesizedTurn {
    pub turn: Turn,
    pub audio: Vec<u8>,
    /// Container of `audio`; WAV unless the clip was passed through undecoded.
    pub format: AudioFormat,
}

/// Synthesize every turn, in order.
///
/// At most `concurrency` TTS calls are in flight; results always come back
/// in the order of `turns`. A speaker without a voice fails the whole run.
pub async fn synthesize_turns(
    tts: &dyn SpeechSynthesizer,
    turns: &[Turn],
    voices: &HashMap<String, String>,
    format: AudioFormat,
    policy: &StylePolicy,
    concurrency: usize,
) -> Result<Vec<SynthesizedTurn>> {
    info!(turns = turns.len(), concurrency, "synthesizing turns");

    stream::iter(turns.iter().enumerate())
        .map(|(index, turn)| synthesize_turn(tts, index, turn, voices, format, policy))
        .buffered(concurrency.max(1))
        .try_collect()
        .await
}

async fn synthesize_turn(
    tts: &dyn SpeechSynthesizer,
    index: usize,
    turn: &Turn,
    voices: &HashMap<String, String>,
    format: AudioFormat,
    policy: &StylePolicy,
) -> Result<SynthesizedTurn> {
    let voice = voices
        .get(&turn.speaker)
        .ok_or_else(|| NewscastError::UnmappedSpeaker {
            index,
            speaker: turn.speaker.clone(),
        })?;

    let raw = tts.synthesize(&turn.text, voice, format).await?;

    let clip = match decode(&raw, Some(format)) {
        Ok(clip) => clip,
        Err(e) => {
            warn!(turn = index, speaker = %turn.speaker, error = %e, "could not decode clip, keeping original audio");
            return Ok(SynthesizedTurn {
                turn: turn.clone(),
                audio: raw,
                format,
            });
        }
    };

    let mut clip = clip.apply_gain(policy.volume_db(&turn.speaker));
    let pause_ms = policy.pause_ms(&turn.speaker);
    if pause_ms > 0 {
        clip = clip.append_silence(pause_ms);
    }

    Ok(SynthesizedTurn {
        turn: turn.clone(),
        audio: encode_wav(&clip)?,
        format: AudioFormat::Wav,
    })
}
