//! Prompt construction for one chunk of the script.
//!
//! The prompt is a pure function of its inputs: no clock, no randomness.
//! Identical inputs always produce byte-identical text, which is what makes
//! the saved `prompt_NNN.txt` files reproducible.

use crate::config::{GenerationSettings, ProfanityPolicy};
use crate::error::Result;
use crate::headline::HeadlineItem;
use crate::persona::PersonaSet;
use crate::script::Turn;

/// System message sent alongside every chunk prompt.
pub const SYSTEM_PROMPT: &str = "You are a creative writer that outputs strict JSON when asked.";

/// Build the user prompt asking for up to `turns_requested` new turns.
pub fn build_prompt(
    headlines: &[HeadlineItem],
    personas: &PersonaSet,
    previous_turns: &[Turn],
    turns_requested: usize,
    settings: &GenerationSettings,
) -> Result<String> {
    let persona_lines = personas
        .iter()
        .map(|p| format!("{}: {}", p.name, p.description))
        .collect::<Vec<_>>()
        .join("\n");

    let headline_lines = headlines
        .iter()
        .enumerate()
        .map(|(i, h)| {
            format!(
                "- {}. {} ({}) — {}",
                i + 1,
                h.title.trim(),
                h.source,
                h.summary.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let directives = settings_directives(settings);
    let settings_block = if directives.is_empty() {
        "\n".to_string()
    } else {
        format!("\n{}\n", directives.join("\n"))
    };

    let previous = if previous_turns.is_empty() {
        "[]".to_string()
    } else {
        serde_json::to_string_pretty(previous_turns)?
    };

    Ok(format!(
        "You will continue a fast-paced podcast script. \
         You should generate up to {turns_requested} additional dialogue turns. \
         Each turn should be 1–3 sentences, energetic, witty, with follow-ups, callbacks, and jokes.\n\n\
         Hosts and personas:\n{persona_lines}\n\n\
         Headlines to cover:\n{headline_lines}\n\n\
         {settings_block}\
         Previous turns:\n{previous}\n\n\
         Requirements:\n\
         - Output ONLY valid JSON: an array of objects with keys 'speaker' and 'text'.\n\
         - 'speaker' must match one of the persona names exactly.\n\
         - Keep each 'text' to 1–3 sentences; energetic banter, occasional light joke, quick transitions.\n\
         - Cover each headline at least multiple times across the turns.\n\
         - End with a short sign-off once the total target number of turns is reached.\n\n\
         Return ONLY the JSON array and nothing else."
    ))
}

/// Natural-language constraints derived from the episode settings.
fn settings_directives(settings: &GenerationSettings) -> Vec<String> {
    let mut lines = Vec::new();

    if !settings.topics.is_empty() {
        lines.push(format!("Emphasize topics: {}", settings.topics.join(", ")));
    }
    if !settings.regions.is_empty() {
        lines.push(format!(
            "Prefer regional angle(s): {}",
            settings.regions.join(", ")
        ));
    }
    match settings.profanity {
        ProfanityPolicy::Filtered => {
            lines.push("Profanity: avoid profanity; family-friendly language.".to_string())
        }
        ProfanityPolicy::Unfiltered => lines.push(
            "Profanity: mild language allowed (occasional mild expletives OK).".to_string(),
        ),
        ProfanityPolicy::Unspecified => {}
    }

    lines
}
