//! Newscast CLI
//!
//! Produces a two-host newscast audio file from a list of topics.

use clap::{Parser, ValueEnum};
use colored::Colorize;
use newscast_core::config::{parse_voice_map, split_list};
use newscast_core::{
    AudioFormat, CartesiaTts, Config, EpisodeRequest, GenerationEvent, GenerationOutcome,
    GenerationSettings, GeneratorConfig, KokoroTts, NewsApiCollector, Newscast, NewscastError,
    OpenAiModel, PersonaFile, ScriptGenerator, SpeechSynthesizer, TtsProvider,
};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Wav,
    Mp3,
}

#[derive(Clone, Copy, ValueEnum)]
enum TtsArg {
    Cartesia,
    Kokoro,
}

#[derive(Parser)]
#[command(
    name = "newscast",
    version,
    about = "Produce a two-host newscast audio file",
    long_about = "Fetches headlines for the given topics, has a language model script a two-host dialogue about them, and renders it to a single normalized audio track."
)]
struct Cli {
    /// Comma-separated topics/queries (e.g. 'tech,world')
    #[arg(long, value_name = "TOPICS")]
    topics: Option<String>,

    /// Optional comma-separated regions (e.g. 'US,Europe')
    #[arg(long, value_name = "REGIONS")]
    regions: Option<String>,

    /// Path to the persona file
    #[arg(long, default_value = "personas.json", value_name = "PATH")]
    personas: PathBuf,

    /// JSON file mapping persona name to voice id; overrides persona voices
    #[arg(long, value_name = "PATH")]
    voice_map: Option<PathBuf>,

    /// Optional TOML configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Where to write the final episode [default: episode.<format>]
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Container of the episode, also requested from the TTS backend
    #[arg(long, value_enum, default_value = "mp3")]
    format: FormatArg,

    /// Target length in seconds
    #[arg(long, default_value = "90", value_name = "SECONDS")]
    length: u32,

    /// Target length in minutes (overrides --length)
    #[arg(long, value_name = "MINUTES")]
    minutes: Option<f64>,

    /// Turns requested per model call
    #[arg(long, value_name = "TURNS")]
    chunk_size: Option<usize>,

    /// Directory for prompts and script artifacts
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Speech backend
    #[arg(long, value_enum)]
    tts: Option<TtsArg>,

    /// Maximum concurrent TTS calls
    #[arg(long, value_name = "N")]
    tts_concurrency: Option<usize>,

    /// Chat model name
    #[arg(short, long, value_name = "MODEL")]
    model: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "newscast={default_level},newscast_core={default_level}"
        ))
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init();
}

async fn run(cli: Cli) -> Result<(), NewscastError> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => newscast_core::config::default_config(),
    };
    apply_overrides(&mut config, &cli);
    debug!(
        model = %config.llm.model,
        chunk_size = config.generation.chunk_size,
        provider = ?config.tts.provider,
        "resolved configuration"
    );

    let topics = cli.topics.as_deref().map(split_list).unwrap_or_default();
    if topics.is_empty() {
        return Err(NewscastError::Config(
            "No topics provided. Pass --topics (comma-separated).".to_string(),
        ));
    }
    let regions = cli.regions.as_deref().map(split_list).unwrap_or_default();

    let persona_file = PersonaFile::load(&cli.personas)?;
    let settings = GenerationSettings::from_file_settings(topics, regions, &persona_file.settings);

    let mut voice_overrides = config.voices.clone();
    if let Some(path) = &cli.voice_map {
        voice_overrides.extend(load_voice_map(path)?);
    }

    // --minutes takes precedence over --length
    let duration_secs = cli
        .minutes
        .map(|m| m * 60.0)
        .unwrap_or(f64::from(cli.length));

    let api_base = config
        .llm
        .api_base
        .clone()
        .or_else(|| env::var("OPENAI_API_BASE").ok())
        .or_else(|| env::var("OPENAI_BASE_URL").ok())
        .unwrap_or_else(|| newscast_core::llm::DEFAULT_API_BASE.to_string());
    let api_key = env::var("OPENAI_API_KEY").unwrap_or_else(|_| {
        eprintln!(
            "{}",
            "Warning: OPENAI_API_KEY not set. Script generation will fail.".yellow()
        );
        String::new()
    });

    let output_dir = config.generation.output_dir.clone();
    let model = OpenAiModel::new(&config.llm, &api_base, &api_key)?;
    let generator = ScriptGenerator::new(
        Box::new(model),
        GeneratorConfig {
            chunk_size: config.generation.chunk_size,
            output_dir: output_dir.clone(),
            basename: config.generation.basename.clone(),
        },
    )?
    .with_callback(Box::new(print_generation_event));

    let collector = NewsApiCollector::from_env()?.with_dump_dir(&output_dir);
    let tts: Box<dyn SpeechSynthesizer> = match config.tts.provider {
        TtsProvider::Cartesia => {
            let mut cartesia = CartesiaTts::from_env()?;
            if let Some(model_id) = &config.tts.model_id {
                cartesia = cartesia.with_model_id(model_id.as_str());
            }
            if let Some(language) = &config.tts.language {
                cartesia = cartesia.with_language(language.as_str());
            }
            Box::new(cartesia)
        }
        TtsProvider::Kokoro => {
            let kokoro = KokoroTts::new().await?;
            debug!(voices = ?kokoro.available_voices(), "kokoro engine ready");
            Box::new(kokoro)
        }
    };

    let format = match cli.format {
        FormatArg::Wav => AudioFormat::Wav,
        FormatArg::Mp3 => AudioFormat::Mp3,
    };
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("episode.{}", format.extension())));

    print_header(&settings, &persona_file, duration_secs);

    let request = EpisodeRequest {
        personas: persona_file.personas,
        settings,
        voice_overrides,
        duration_secs,
        max_articles: config.generation.max_articles,
        tts_format: format,
        tts_concurrency: config.tts.concurrency,
        target_dbfs: config.audio.target_dbfs,
        crossfade_ms: config.audio.crossfade_ms,
        output_format: format,
        output_path,
    };

    let summary = Newscast::new(Box::new(collector), generator, tts)
        .run(&request)
        .await?;

    println!();
    if summary.outcome == GenerationOutcome::Stalled {
        println!(
            "{}",
            "Note: the model stopped early; the episode is shorter than requested.".yellow()
        );
    }
    println!(
        "{} {} ({:.1}s, {} turns)",
        "Wrote".bright_green().bold(),
        summary.output_path.display(),
        summary.duration_secs,
        summary.turns
    );

    Ok(())
}

/// Command line flags win over the config file.
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(chunk_size) = cli.chunk_size {
        config.generation.chunk_size = chunk_size;
    }
    if let Some(dir) = &cli.out_dir {
        config.generation.output_dir = dir.clone();
    }
    if let Some(model) = &cli.model {
        config.llm.model = model.clone();
    }
    if let Some(tts) = cli.tts {
        config.tts.provider = match tts {
            TtsArg::Cartesia => TtsProvider::Cartesia,
            TtsArg::Kokoro => TtsProvider::Kokoro,
        };
    }
    if let Some(concurrency) = cli.tts_concurrency {
        config.tts.concurrency = concurrency;
    }
}

fn load_voice_map(path: &Path) -> Result<BTreeMap<String, String>, NewscastError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        NewscastError::Config(format!("Failed to read voice map {}: {}", path.display(), e))
    })?;
    parse_voice_map(&content)
}

fn print_header(settings: &GenerationSettings, personas: &PersonaFile, duration_secs: f64) {
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!("{}", "  Newscast".bright_blue().bold());
    println!("{}", "═".repeat(70).bright_blue());
    println!();
    println!("{} {}", "Topics:".bold(), settings.topics.join(", ").bright_white());
    if !settings.regions.is_empty() {
        println!("{} {}", "Regions:".bold(), settings.regions.join(", "));
    }
    println!("{} {:.0}s", "Target length:".bold(), duration_secs);
    println!("{}", "Hosts:".bold());
    for persona in personas.personas.iter() {
        println!(
            "  - {} ({})",
            persona.name.bright_cyan(),
            persona.voice.dimmed()
        );
    }
    println!("{}", "─".repeat(70).dimmed());
}

/// Print generation progress to the console.
fn print_generation_event(event: GenerationEvent) {
    match event {
        GenerationEvent::ChunkRequested {
            iteration,
            requested,
            ..
        } => {
            println!(
                "{} chunk {} (up to {} turns)",
                "▶".bright_cyan(),
                iteration.to_string().bold(),
                requested
            );
        }
        GenerationEvent::ChunkReceived { turns, .. } => {
            println!("  {} new turns", turns.to_string().bright_green());
        }
        GenerationEvent::Finished {
            outcome,
            total_turns,
        } => {
            let label = match outcome {
                GenerationOutcome::Completed => "Script complete".bright_green().bold(),
                GenerationOutcome::Stalled => "Script stopped early".yellow().bold(),
            };
            println!("{} ({} turns)", label, total_turns);
        }
    }
}
