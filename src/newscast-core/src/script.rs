//! Dialogue turns and the append-only script accumulator.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::Result;

/// One line of dialogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: String,
    pub text: String,
}

impl Turn {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
        }
    }
}

/// Working state of the generation loop.
///
/// Turns are only ever appended; nothing is removed or reordered.
#[derive(Debug, Default)]
pub struct ScriptAccumulator {
    turns: Vec<Turn>,
    raw_responses: Vec<String>,
}

impl ScriptAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Record a model response verbatim, whether or not it parses.
    pub fn record_raw(&mut self, raw: impl Into<String>) {
        self.raw_responses.push(raw.into());
    }

    pub fn extend(&mut self, chunk: Vec<Turn>) {
        self.turns.extend(chunk);
    }

    /// Write the script as JSON, plain text and raw model output.
    pub async fn persist(&self, dir: &Path, basename: &str) -> Result<ScriptArtifacts> {
        fs::create_dir_all(dir).await?;

        let artifacts = ScriptArtifacts {
            json: dir.join(format!("{basename}.json")),
            text: dir.join(format!("{basename}.txt")),
            raw: dir.join(format!("{basename}.raw.txt")),
        };

        fs::write(&artifacts.json, serde_json::to_string_pretty(&self.turns)?).await?;
        fs::write(&artifacts.text, render_transcript(&self.turns)).await?;
        fs::write(&artifacts.raw, self.raw_responses.join("\n\n")).await?;

        Ok(artifacts)
    }

    pub fn into_turns(self) -> Vec<Turn> {
        self.turns
    }
}

/// Paths of the files written by [`ScriptAccumulator::persist`].
#[derive(Debug, Clone)]
pub struct ScriptArtifacts {
    pub json: PathBuf,
    pub text: PathBuf,
    pub raw: PathBuf,
}

/// Render turns as `speaker: text` lines separated by blank lines.
pub fn render_transcript(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}\n\n", t.speaker, t.text))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_render_transcript() {
        let turns = vec![Turn::new("Alex", "Hi."), Turn::new("Sam", "Hello!")];
        assert_eq!(render_transcript(&turns), "Alex: Hi.\n\nSam: Hello!\n\n");
    }

    #[test]
    fn test_extend_keeps_prefix() {
        let mut acc = ScriptAccumulator::new();
        acc.extend(vec![Turn::new("Alex", "One.")]);
        let before = acc.turns().to_vec();
        acc.extend(vec![Turn::new("Sam", "Two."), Turn::new("Alex", "Three.")]);
        assert_eq!(&acc.turns()[..before.len()], before.as_slice());
        assert_eq!(acc.len(), 3);
    }

    #[tokio::test]
    async fn test_persist_writes_all_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let mut acc = ScriptAccumulator::new();
        acc.record_raw("[first]");
        acc.record_raw("[second]");
        acc.extend(vec![Turn::new("Alex", "Hi there")]);

        let artifacts = acc.persist(dir.path(), "episode").await.unwrap();

        let json: Vec<Turn> =
            serde_json::from_str(&fs::read_to_string(&artifacts.json).unwrap()).unwrap();
        assert_eq!(json, vec![Turn::new("Alex", "Hi there")]);
        assert_eq!(
            fs::read_to_string(&artifacts.text).unwrap(),
            "Alex: Hi there\n\n"
        );
        assert_eq!(
            fs::read_to_string(&artifacts.raw).unwrap(),
            "[first]\n\n[second]"
        );
        assert!(artifacts.raw.ends_with("episode.raw.txt"));
    }
}
