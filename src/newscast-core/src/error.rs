//! Error types for the newscast pipeline.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, NewscastError>;

#[derive(Error, Debug)]
pub enum NewscastError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No headlines were returned for the requested topics")]
    CollectorEmpty,

    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    #[error("No voice mapped for speaker '{speaker}' (turn {index})")]
    UnmappedSpeaker { index: usize, speaker: String },

    #[error("Missing credential: {0}")]
    Auth(String),

    #[error("{service} returned HTTP {status}: {body}")]
    Http {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("Unexpected response shape: {0}")]
    Shape(String),

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("OpenAI API error: {0}")]
    OpenAI(#[from] async_openai::error::OpenAIError),
}

impl NewscastError {
    /// Whether a retry of the same external call could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            NewscastError::Transport(_) => true,
            NewscastError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for NewscastError {
    fn from(err: reqwest::Error) -> Self {
        NewscastError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(NewscastError::Transport("timeout".into()).is_transient());
        assert!(
            NewscastError::Http {
                service: "NewsAPI",
                status: 503,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            !NewscastError::Http {
                service: "NewsAPI",
                status: 401,
                body: String::new()
            }
            .is_transient()
        );
        assert!(!NewscastError::MalformedOutput("x".into()).is_transient());
    }

    #[test]
    fn test_unmapped_speaker_message_names_turn() {
        let err = NewscastError::UnmappedSpeaker {
            index: 3,
            speaker: "Jo".into(),
        };
        assert_eq!(err.to_string(), "No voice mapped for speaker 'Jo' (turn 3)");
    }
}
