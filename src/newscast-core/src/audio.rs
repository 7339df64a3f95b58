//! Audio helpers: decoding, encoding, gain, silence and concatenation.
//!
//! All processing happens on [`Clip`], a mono `f32` buffer. Decoding goes
//! through `symphonia` (WAV and MP3). Encoding uses `hound` for 16-bit WAV
//! and LAME for MP3.

use hound::{SampleFormat, WavSpec, WavWriter};
use mp3lame_encoder::{Bitrate, Builder, FlushNoGap, MonoPcm, Quality};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{NewscastError, Result};

/// Container format of an encoded audio payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Mp3,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "wav" => Ok(AudioFormat::Wav),
            "mp3" => Ok(AudioFormat::Mp3),
            other => Err(NewscastError::Config(format!(
                "Unsupported audio format '{}' (expected wav or mp3)",
                other
            ))),
        }
    }
}

/// Mono PCM audio in the range [-1.0, 1.0].
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Clip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn silent(duration_ms: u64, sample_rate: u32) -> Self {
        Self::new(vec![0.0; ms_to_samples(duration_ms, sample_rate)], sample_rate)
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// Loudness relative to full scale, from the RMS level.
    ///
    /// Returns negative infinity for silent or empty clips.
    pub fn dbfs(&self) -> f32 {
        if self.samples.is_empty() {
            return f32::NEG_INFINITY;
        }
        let mean_square = self
            .samples
            .iter()
            .map(|s| f64::from(*s) * f64::from(*s))
            .sum::<f64>()
            / self.samples.len() as f64;
        if mean_square <= 0.0 {
            return f32::NEG_INFINITY;
        }
        (10.0 * mean_square.log10()) as f32
    }

    /// Scale every sample by `db` decibels.
    pub fn apply_gain(mut self, db: f32) -> Self {
        if db != 0.0 {
            let factor = 10f32.powf(db / 20.0);
            self.samples.iter_mut().for_each(|s| *s *= factor);
        }
        self
    }

    pub fn append_silence(mut self, duration_ms: u64) -> Self {
        let silence = Self::silent(duration_ms, self.sample_rate);
        self.samples.extend(silence.samples);
        self
    }

    /// Bring the clip to `target_dbfs` with a single gain offset.
    ///
    /// Silent clips are returned unchanged.
    pub fn normalize(self, target_dbfs: f32) -> Self {
        let measured = self.dbfs();
        if !measured.is_finite() {
            return self;
        }
        self.apply_gain(target_dbfs - measured)
    }

    /// Resample to `sample_rate` using linear interpolation.
    pub fn resample(self, sample_rate: u32) -> Self {
        if self.sample_rate == sample_rate || self.sample_rate == 0 || self.samples.is_empty() {
            return Self::new(self.samples, sample_rate);
        }
        let rate = self.sample_rate as f64 / sample_rate as f64;
        let new_len = (self.samples.len() as f64 / rate) as usize;
        let mut result = Vec::with_capacity(new_len);

        for i in 0..new_len {
            let src_pos = i as f64 * rate;
            let src_idx = src_pos as usize;
            let frac = (src_pos - src_idx as f64) as f32;

            if src_idx + 1 < self.samples.len() {
                result.push(self.samples[src_idx] * (1.0 - frac) + self.samples[src_idx + 1] * frac);
            } else if src_idx < self.samples.len() {
                result.push(self.samples[src_idx]);
            }
        }

        Self::new(result, sample_rate)
    }
}

fn ms_to_samples(duration_ms: u64, sample_rate: u32) -> usize {
    (duration_ms * u64::from(sample_rate) / 1000) as usize
}

/// Join clips in order, resampling later clips to the first clip's rate.
///
/// With `crossfade_ms == 0` clips are butted together; otherwise each
/// boundary overlaps by up to `crossfade_ms` with linear fades.
pub fn concatenate(clips: Vec<Clip>, crossfade_ms: u64) -> Option<Clip> {
    let mut iter = clips.into_iter();
    let first = iter.next()?;
    let sample_rate = first.sample_rate;
    let fade_len = ms_to_samples(crossfade_ms, sample_rate);
    let mut out = first.samples;

    for clip in iter {
        let next = clip.resample(sample_rate).samples;
        let overlap = fade_len.min(out.len()).min(next.len());
        if overlap == 0 {
            out.extend(next);
            continue;
        }

        let start = out.len() - overlap;
        for i in 0..overlap {
            let t = (i + 1) as f32 / (overlap + 1) as f32;
            out[start + i] = out[start + i] * (1.0 - t) + next[i] * t;
        }
        out.extend_from_slice(&next[overlap..]);
    }

    Some(Clip::new(out, sample_rate))
}

/// Decode an encoded payload into a mono clip.
///
/// `format` is only a hint; the container is probed from the bytes.
pub fn decode(bytes: &[u8], format: Option<AudioFormat>) -> Result<Clip> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
    let mut hint = Hint::new();
    if let Some(format) = format {
        hint.with_extension(format.extension());
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| NewscastError::Audio(format!("Unrecognised audio container: {}", e)))?;
    let mut reader = probed.format;

    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| NewscastError::Audio("No supported audio tracks found".to_string()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| NewscastError::Audio(format!("Unsupported codec: {}", e)))?;

    let mut samples = Vec::new();
    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(NewscastError::Audio(format!("Failed to read packet: {}", e))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // A corrupt frame is skipped, as players do.
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(NewscastError::Audio(format!("Failed to decode: {}", e))),
        };
        let spec = *decoded.spec();
        sample_rate = spec.rate;
        let channels = spec.channels.count().max(1);

        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        samples.extend(
            buf.samples()
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );
    }

    if sample_rate == 0 {
        return Err(NewscastError::Audio("Unknown sample rate".to_string()));
    }
    Ok(Clip::new(samples, sample_rate))
}

/// Encode a clip as 16-bit mono WAV.
pub fn encode_wav(clip: &Clip) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: clip.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut wav_data = Vec::new();
    {
        let mut writer = WavWriter::new(Cursor::new(&mut wav_data), spec)
            .map_err(|e| NewscastError::Audio(format!("Failed to create WAV writer: {}", e)))?;
        for sample in &clip.samples {
            writer
                .write_sample(to_i16(*sample))
                .map_err(|e| NewscastError::Audio(format!("Failed to write sample: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| NewscastError::Audio(format!("Failed to finalize WAV: {}", e)))?;
    }
    Ok(wav_data)
}

/// Sample rates an MP3 stream can carry.
const MP3_SAMPLE_RATES: [u32; 9] = [8000, 11025, 12000, 16000, 22050, 24000, 32000, 44100, 48000];
const MP3_FALLBACK_RATE: u32 = 44100;
/// LAME's worst case for the final flush.
const MP3_FLUSH_BYTES: usize = 7200;

/// Encode a clip as 128 kbps mono MP3.
///
/// Clips at a rate MP3 cannot carry are resampled to 44.1 kHz first.
pub fn encode_mp3(clip: &Clip) -> Result<Vec<u8>> {
    let clip = if MP3_SAMPLE_RATES.contains(&clip.sample_rate) {
        clip.clone()
    } else {
        clip.clone().resample(MP3_FALLBACK_RATE)
    };

    let mut builder = Builder::new()
        .ok_or_else(|| NewscastError::Audio("Failed to create MP3 encoder".to_string()))?;
    builder.set_num_channels(1).map_err(mp3_error)?;
    builder.set_sample_rate(clip.sample_rate).map_err(mp3_error)?;
    builder.set_brate(Bitrate::Kbps128).map_err(mp3_error)?;
    builder.set_quality(Quality::Good).map_err(mp3_error)?;
    let mut encoder = builder.build().map_err(mp3_error)?;

    let pcm: Vec<i16> = clip.samples.iter().map(|s| to_i16(*s)).collect();
    let mut mp3 = Vec::new();
    mp3.reserve(mp3lame_encoder::max_required_buffer_size(pcm.len()));
    encoder
        .encode_to_vec(MonoPcm(&pcm), &mut mp3)
        .map_err(mp3_error)?;
    mp3.reserve(MP3_FLUSH_BYTES);
    encoder
        .flush_to_vec::<FlushNoGap>(&mut mp3)
        .map_err(mp3_error)?;
    Ok(mp3)
}

fn mp3_error(e: impl std::fmt::Debug) -> NewscastError {
    NewscastError::Audio(format!("MP3 encoding failed: {:?}", e))
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

/// Encode a clip in the given container.
pub fn encode(clip: &Clip, format: AudioFormat) -> Result<Vec<u8>> {
    match format {
        AudioFormat::Wav => encode_wav(clip),
        AudioFormat::Mp3 => encode_mp3(clip),
    }
}

/// Read and decode an audio file, guessing the container from its extension.
pub fn load_file(path: &Path) -> Result<Clip> {
    let bytes = std::fs::read(path)?;
    let hint = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(|e| AudioFormat::parse(e).ok());
    decode(&bytes, hint)
}

/// Write a clip to `path` in `format`, creating parent directories.
pub fn write_audio(path: &Path, clip: &Clip, format: AudioFormat) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, encode(clip, format)?)?;
    Ok(())
}
