//! In-memory 16-bit PCM waveform with time-based slicing.

use std::path::Path;
use std::time::Duration;

/// Sample rate every normalized file is transcoded to
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Mono 16-bit PCM audio held in memory
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    samples: Vec<i16>,
    sample_rate: u32,
}

impl Waveform {
    pub fn from_samples(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Load a 16-bit PCM WAV file, downmixing to mono when needed
    pub fn load(path: &Path) -> Result<Self, hound::Error> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();

        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(hound::Error::Unsupported);
        }

        let raw: Vec<i16> = reader
            .samples::<i16>()
            .collect::<Result<Vec<_>, _>>()?;

        let channels = spec.channels.max(1) as usize;
        let samples = if channels == 1 {
            raw
        } else {
            raw.chunks_exact(channels)
                .map(|frame| {
                    let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                    (sum / channels as i32) as i16
                })
                .collect()
        };

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
        })
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Total duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Samples between two timestamps in seconds.
    ///
    /// Bounds are truncated to whole milliseconds and clamped to the
    /// waveform, so out-of-range spans yield a shorter (possibly empty) slice.
    pub fn slice(&self, start_secs: f64, end_secs: f64) -> &[i16] {
        let start = self.index_at(start_secs);
        let end = self.index_at(end_secs).max(start);
        &self.samples[start..end]
    }

    fn index_at(&self, secs: f64) -> usize {
        if !secs.is_finite() || secs <= 0.0 {
            return 0;
        }
        // Diarizer timestamps are untrusted; clamp before integer math
        let ms = (secs.min(self.duration_secs()) * 1000.0) as u64;
        let index = ms.saturating_mul(self.sample_rate as u64) / 1000;
        usize::try_from(index)
            .unwrap_or(usize::MAX)
            .min(self.samples.len())
    }
}

/// Write mono 16-bit samples to a WAV file
pub fn write_wav(path: &Path, samples: &[i16], sample_rate: u32) -> Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()
}

/// Duration of a WAV file, read from its header
pub fn wav_duration(path: &Path) -> Result<Duration, hound::Error> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Ok(Duration::ZERO);
    }
    // duration() counts frames, independent of channel count
    Ok(Duration::from_secs_f64(
        reader.duration() as f64 / spec.sample_rate as f64,
    ))
}
