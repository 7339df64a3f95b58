//! Persona definitions.
//!
//! A persona is a named host of the newscast with a behavioural description,
//! a TTS voice and optional audio styling. Personas are loaded once per run
//! from a JSON file and never change afterwards.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{NewscastError, Result};

/// Key of the optional non-persona block in a persona file.
const SETTINGS_KEY: &str = "settings";

/// A host of the newscast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    /// Unique display name; turns reference it as `speaker`.
    pub name: String,
    /// Free text shaping how this host talks.
    pub description: String,
    /// Default TTS voice identifier.
    pub voice: String,
    /// Gain applied to this host's clips, replacing the global volume.
    pub volume_db: Option<f32>,
    /// Silence appended after each of this host's turns, replacing the global pause.
    pub pause_ms: Option<u64>,
}

impl Persona {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        voice: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            voice: voice.into(),
            volume_db: None,
            pause_ms: None,
        }
    }

    pub fn with_volume_db(mut self, volume_db: f32) -> Self {
        self.volume_db = Some(volume_db);
        self
    }

    pub fn with_pause_ms(mut self, pause_ms: u64) -> Self {
        self.pause_ms = Some(pause_ms);
        self
    }
}

/// Ordered collection of personas, keyed by name.
///
/// Order is the order of the persona file so prompts stay reproducible.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersonaSet {
    personas: Vec<Persona>,
}

impl PersonaSet {
    pub fn new(personas: Vec<Persona>) -> Result<Self> {
        let mut set = Self::default();
        for persona in personas {
            if set.contains(&persona.name) {
                return Err(NewscastError::Config(format!(
                    "Duplicate persona name '{}'",
                    persona.name
                )));
            }
            set.personas.push(persona);
        }
        Ok(set)
    }

    pub fn get(&self, name: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Persona> {
        self.personas.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.personas.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }

    /// Resolve the voice for every persona.
    ///
    /// Explicit per-run overrides win over the persona file default. Overrides
    /// naming an unknown persona are ignored with a warning.
    pub fn voice_map(&self, overrides: &BTreeMap<String, String>) -> Result<HashMap<String, String>> {
        for name in overrides.keys() {
            if !self.contains(name) {
                warn!(persona = %name, "voice override for unknown persona ignored");
            }
        }

        let map: HashMap<String, String> = self
            .personas
            .iter()
            .filter_map(|p| {
                let voice = overrides
                    .get(&p.name)
                    .map(|v| v.trim())
                    .filter(|v| !v.is_empty())
                    .unwrap_or(p.voice.as_str());
                (!voice.is_empty()).then(|| (p.name.clone(), voice.to_string()))
            })
            .collect();

        if map.is_empty() {
            return Err(NewscastError::Config(
                "No voice could be resolved for any persona".to_string(),
            ));
        }
        Ok(map)
    }

    /// Per-persona volume adjustments, for personas that define one.
    pub fn volume_map(&self) -> HashMap<String, f32> {
        self.personas
            .iter()
            .filter_map(|p| p.volume_db.map(|v| (p.name.clone(), v)))
            .collect()
    }

    /// Per-persona trailing pauses, for personas that define one.
    pub fn pause_map(&self) -> HashMap<String, u64> {
        self.personas
            .iter()
            .filter_map(|p| p.pause_ms.map(|v| (p.name.clone(), v)))
            .collect()
    }
}

/// File-level settings carried next to the personas.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FileSettings {
    #[serde(default)]
    pub profanity_filter: Option<bool>,
    #[serde(default)]
    pub intro: Option<PathBuf>,
    #[serde(default)]
    pub outro: Option<PathBuf>,
    #[serde(default)]
    pub music_volume_db: Option<f32>,
    #[serde(default)]
    pub pause_ms: Option<u64>,
    #[serde(default)]
    pub volume_db: Option<f32>,
}

/// Parsed contents of a persona file.
#[derive(Debug, Clone)]
pub struct PersonaFile {
    pub personas: PersonaSet,
    pub settings: FileSettings,
}

impl PersonaFile {
    /// Load a persona file from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            NewscastError::Config(format!(
                "Failed to read persona file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_str(&content)
    }

    /// Parse persona file content.
    pub fn from_str(content: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(content)
            .map_err(|e| NewscastError::Config(format!("Failed to parse persona file: {}", e)))?;
        let Value::Object(mut entries) = root else {
            return Err(NewscastError::Config(
                "Persona file must be a JSON object keyed by persona name".to_string(),
            ));
        };

        let settings = match entries.remove(SETTINGS_KEY) {
            Some(Value::Null) | None => FileSettings::default(),
            Some(value) => serde_json::from_value(value)
                .map_err(|e| NewscastError::Config(format!("Invalid 'settings' block: {}", e)))?,
        };

        let personas = entries
            .into_iter()
            .map(|(name, value)| parse_persona(name, value))
            .collect::<Result<Vec<_>>>()?;

        if personas.is_empty() {
            return Err(NewscastError::Config(
                "Persona file defines no personas".to_string(),
            ));
        }

        Ok(Self {
            personas: PersonaSet::new(personas)?,
            settings,
        })
    }
}

fn parse_persona(name: String, value: Value) -> Result<Persona> {
    let Value::Object(fields) = value else {
        return Err(NewscastError::Config(format!(
            "Invalid persona '{}': each persona must be an object with 'description' and 'voice'",
            name
        )));
    };

    let description = required_str(&fields, &name, "description")?;
    let voice = required_str(&fields, &name, "voice")?;
    let mut persona = Persona::new(name.clone(), description, voice);

    if let Some(volume) = fields.get("volume_db").and_then(Value::as_f64) {
        persona = persona.with_volume_db(volume as f32);
    }
    match fields.get("pause_ms") {
        Some(Value::Number(n)) if n.as_u64().is_some() => {
            persona = persona.with_pause_ms(n.as_u64().unwrap_or_default());
        }
        Some(Value::Number(n)) if n.as_i64().is_some() => {
            return Err(NewscastError::Config(format!(
                "Invalid 'pause_ms' for persona '{}': must not be negative",
                name
            )));
        }
        _ => {}
    }

    Ok(persona)
}

fn required_str(fields: &Map<String, Value>, persona: &str, key: &str) -> Result<String> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            NewscastError::Config(format!(
                "Missing or invalid '{}' for persona '{}'",
                key, persona
            ))
        })
}
