//! Final mix: concatenation, loudness normalization and intro/outro.

use std::path::Path;
use tracing::{info, warn};

use crate::audio::{Clip, concatenate, decode, load_file};
use crate::synth::SynthesizedTurn;

/// Target loudness of the spoken content.
pub const DEFAULT_TARGET_DBFS: f32 = -16.0;

/// Parameters of the final mix.
#[derive(Debug, Clone, Copy)]
pub struct MixOptions<'a> {
    pub intro: Option<&'a Path>,
    pub outro: Option<&'a Path>,
    pub music_volume_db: f32,
    pub target_dbfs: f32,
    pub crossfade_ms: u64,
}

impl Default for MixOptions<'_> {
    fn default() -> Self {
        Self {
            intro: None,
            outro: None,
            music_volume_db: 0.0,
            target_dbfs: DEFAULT_TARGET_DBFS,
            crossfade_ms: 0,
        }
    }
}

/// Build the episode track from synthesized turns.
///
/// Only the spoken content is measured and normalized; intro and outro are
/// layered on afterwards at `music_volume_db`. Returns `None` when no turn
/// could be decoded.
pub fn assemble(turns: &[SynthesizedTurn], options: &MixOptions<'_>) -> Option<Clip> {
    let clips: Vec<Clip> = turns
        .iter()
        .enumerate()
        .filter_map(|(i, t)| match decode(&t.audio, Some(t.format)) {
            Ok(clip) => Some(clip),
            Err(e) => {
                warn!(turn = i, speaker = %t.turn.speaker, error = %e, "skipping undecodable clip");
                None
            }
        })
        .collect();

    let speech = concatenate(clips, options.crossfade_ms)?;
    let measured = speech.dbfs();
    let speech = speech.normalize(options.target_dbfs);
    info!(
        measured_dbfs = measured,
        target_dbfs = options.target_dbfs,
        seconds = speech.duration_secs(),
        "normalized spoken content"
    );

    let sample_rate = speech.sample_rate;
    let mut parts = Vec::with_capacity(3);
    if let Some(intro) = load_music(options.intro, "intro", options.music_volume_db) {
        parts.push(intro.resample(sample_rate));
    }
    parts.push(speech);
    if let Some(outro) = load_music(options.outro, "outro", options.music_volume_db) {
        parts.push(outro.resample(sample_rate));
    }

    concatenate(parts, 0)
}

/// Load an optional music bed; any failure just omits it.
fn load_music(path: Option<&Path>, label: &str, volume_db: f32) -> Option<Clip> {
    let path = path?;
    match load_file(path) {
        Ok(clip) => Some(clip.apply_gain(volume_db)),
        Err(e) => {
            warn!(asset = label, path = %path.display(), error = %e, "optional asset unavailable, skipping");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioFormat, encode_wav, write_audio};
    use crate::script::Turn;

    fn synthesized(text: &str, amplitude: f32, len: usize) -> SynthesizedTurn {
        SynthesizedTurn {
            turn: Turn::new("Alex", text),
            audio: encode_wav(&Clip::new(vec![amplitude; len], 1000)).unwrap(),
            format: AudioFormat::Wav,
        }
    }

    #[test]
    fn test_preserves_turn_order() {
        let turns = vec![
            synthesized("first", 0.1, 10),
            synthesized("second", 0.4, 20),
            synthesized("third", 0.2, 30),
        ];
        let mix = assemble(&turns, &MixOptions::default()).unwrap();
        assert_eq!(mix.samples.len(), 60);
        // Relative levels survive normalization, so order is visible.
        assert!(mix.samples[5] < mix.samples[15]);
        assert!(mix.samples[15] > mix.samples[45]);
        assert!(mix.samples[5] < mix.samples[45]);
    }

    #[test]
    fn test_normalizes_speech_to_target() {
        let turns = vec![synthesized("a", 0.05, 100), synthesized("b", 0.05, 100)];
        let mix = assemble(&turns, &MixOptions::default()).unwrap();
        assert!((mix.dbfs() - DEFAULT_TARGET_DBFS).abs() < 0.05);
    }

    #[test]
    fn test_intro_outro_not_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let intro = dir.path().join("intro.wav");
        let outro = dir.path().join("outro.wav");
        write_audio(&intro, &Clip::new(vec![0.5; 50], 1000), AudioFormat::Wav).unwrap();
        write_audio(&outro, &Clip::new(vec![0.5; 2000], 2000), AudioFormat::Wav).unwrap();

        let turns = vec![synthesized("a", 0.05, 100)];
        let options = MixOptions {
            intro: Some(&intro),
            outro: Some(&outro),
            music_volume_db: -6.0206,
            ..Default::default()
        };
        let mix = assemble(&turns, &options).unwrap();

        // 50 intro + 100 speech + 1000 resampled outro
        assert_eq!(mix.samples.len(), 1150);
        assert!((mix.samples[0] - 0.25).abs() < 1e-3);
        let speech = Clip::new(mix.samples[50..150].to_vec(), 1000);
        assert!((speech.dbfs() - DEFAULT_TARGET_DBFS).abs() < 0.05);
        assert!((mix.samples[1149] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn test_missing_intro_is_omitted() {
        let turns = vec![synthesized("a", 0.05, 100)];
        let missing = Path::new("/definitely/not/here/intro.mp3");
        let options = MixOptions {
            intro: Some(missing),
            ..Default::default()
        };
        let mix = assemble(&turns, &options).unwrap();
        assert_eq!(mix.samples.len(), 100);
    }

    #[test]
    fn test_undecodable_clip_skipped() {
        let mut turns = vec![synthesized("a", 0.05, 100)];
        turns.push(SynthesizedTurn {
            turn: Turn::new("Sam", "broken"),
            audio: b"garbage".to_vec(),
            format: AudioFormat::Mp3,
        });
        let mix = assemble(&turns, &MixOptions::default()).unwrap();
        assert_eq!(mix.samples.len(), 100);
        assert!(assemble(&turns[1..], &MixOptions::default()).is_none());
    }
}
