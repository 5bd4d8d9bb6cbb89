//! Audio file I/O
//!
//! WAV files are read and written with `hound`. Everything else the
//! discovery services download (MP3 mostly) is decoded with `symphonia`.
//! Imported audio keeps its native sample rate; callers conform it to the
//! mix format with [`AudioBuffer::conform`].

use std::fs::File;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::probe::Hint;
use symphonia::core::sample::i24;

use crate::engine::buffer::{AudioBuffer, ChannelLayout};
use crate::error::{MixerError, Result};

/// Extensions the loader accepts
pub const SUPPORTED_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "ogg", "m4a"];

/// Export format configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportFormat {
    /// Target sample rate
    pub sample_rate: u32,
    /// Bit depth: 16, 24, or 32 (float)
    pub bit_depth: u16,
}

impl Default for ExportFormat {
    fn default() -> Self {
        Self::cd_quality()
    }
}

impl ExportFormat {
    pub fn new(sample_rate: u32, bit_depth: u16) -> Self {
        ExportFormat {
            sample_rate,
            bit_depth,
        }
    }

    /// 44.1kHz, 16-bit
    pub fn cd_quality() -> Self {
        ExportFormat {
            sample_rate: 44_100,
            bit_depth: 16,
        }
    }
}

/// Whether the loader recognises a file by extension
pub fn is_supported_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Import an audio file
///
/// # Arguments
/// * `path` - Path to a WAV or compressed audio file
///
/// # Returns
/// * `Ok(AudioBuffer)` - Decoded audio at the file's native sample rate
/// * `Err(MixerError)` - If the file is missing, unreadable or has no audio
///
/// # Errors
/// * `NotFound` - If the file does not exist
/// * `InvalidAudio` - If decoding fails or yields no samples
/// * `UnsupportedFormat` - If the audio has more than 2 channels
pub fn import_audio(path: &Path) -> Result<AudioBuffer> {
    if !path.exists() {
        return Err(MixerError::NotFound {
            path: path.display().to_string(),
        });
    }

    let is_wav = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("wav"))
        .unwrap_or(false);

    let buffer = if is_wav {
        import_wav(path)?
    } else {
        decode_compressed(path)?
    };

    if buffer.is_empty() {
        return Err(MixerError::InvalidAudio {
            reason: format!("{} contains no audio", path.display()),
            source: None,
        });
    }

    Ok(buffer)
}

/// Export an AudioBuffer to a WAV file
///
/// Resamples when the target rate differs from the buffer's rate.
pub fn export_audio(buffer: &AudioBuffer, path: &Path, format: ExportFormat) -> Result<()> {
    let channels = buffer.channels();
    let data = buffer.clone().conform(format.sample_rate, channels)?;
    let interleaved = data.to_interleaved();

    let spec = WavSpec {
        channels: channels as u16,
        sample_rate: format.sample_rate,
        bits_per_sample: format.bit_depth,
        sample_format: if format.bit_depth == 32 {
            SampleFormat::Float
        } else {
            SampleFormat::Int
        },
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = WavWriter::create(path, spec).map_err(wav_io_error)?;

    match format.bit_depth {
        16 => {
            for sample in interleaved {
                let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                writer.write_sample(scaled).map_err(wav_io_error)?;
            }
        }
        24 => {
            for sample in interleaved {
                let scaled = (sample * 8388607.0).clamp(-8388608.0, 8388607.0) as i32;
                writer.write_sample(scaled).map_err(wav_io_error)?;
            }
        }
        32 => {
            for sample in interleaved {
                writer.write_sample(sample).map_err(wav_io_error)?;
            }
        }
        _ => {
            return Err(MixerError::UnsupportedFormat {
                format: format!("{}-bit audio (only 16, 24, 32 supported)", format.bit_depth),
            });
        }
    }

    writer.finalize().map_err(wav_io_error)?;
    Ok(())
}

/// Generate a mono sine test tone
pub fn generate_test_tone(frequency: f32, duration_secs: f32, sample_rate: u32) -> AudioBuffer {
    let num_samples = (duration_secs * sample_rate as f32) as usize;
    let mut buffer = AudioBuffer::new(num_samples, ChannelLayout::Mono, sample_rate);

    let angular_freq = 2.0 * std::f32::consts::PI * frequency / sample_rate as f32;
    for (i, sample) in buffer.samples[0].iter_mut().enumerate() {
        *sample = (angular_freq * i as f32).sin();
    }

    buffer
}

// ============================================================================
// Internal helper functions
// ============================================================================

fn wav_io_error(e: hound::Error) -> MixerError {
    MixerError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}

fn import_wav(path: &Path) -> Result<AudioBuffer> {
    let reader = WavReader::open(path).map_err(|e| MixerError::InvalidAudio {
        reason: format!("Failed to open WAV file: {}", e),
        source: Some(Box::new(e)),
    })?;

    let spec = reader.spec();
    let layout = layout_for(spec.channels as usize)?;
    let samples = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;

    AudioBuffer::from_interleaved(&samples, layout, spec.sample_rate)
}

fn layout_for(channels: usize) -> Result<ChannelLayout> {
    ChannelLayout::from_count(channels).ok_or_else(|| MixerError::UnsupportedFormat {
        format: format!("{}-channel audio (only mono/stereo supported)", channels),
    })
}

/// Read samples from WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    let invalid = |e: hound::Error| MixerError::InvalidAudio {
        reason: format!("Failed to read {}-bit samples: {}", bits_per_sample, e),
        source: Some(Box::new(e)),
    };

    match (sample_format, bits_per_sample) {
        (SampleFormat::Float, _) => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(invalid),
        (SampleFormat::Int, 8) => reader
            .samples::<i8>()
            .map(|s| s.map(|v| v as f32 / 128.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(invalid),
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(invalid),
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8388608.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(invalid),
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 2147483648.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(invalid),
        (SampleFormat::Int, bits) => Err(MixerError::UnsupportedFormat {
            format: format!("{}-bit integer audio", bits),
        }),
    }
}

/// Decode a compressed file with symphonia into a non-interleaved buffer
fn decode_compressed(path: &Path) -> Result<AudioBuffer> {
    let invalid = |reason: String| MixerError::InvalidAudio {
        reason,
        source: None,
    };

    let src = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &Default::default(), &Default::default())
        .map_err(|e| MixerError::UnsupportedFormat {
            format: format!("{}: {}", path.display(), e),
        })?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| invalid(format!("{} has no audio track", path.display())))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &Default::default())
        .map_err(|e| MixerError::UnsupportedFormat {
            format: format!("{}: {}", path.display(), e),
        })?;

    let mut channels: Vec<Vec<f32>> = Vec::new();

    while let Ok(packet) = format.next_packet() {
        if packet.track_id() != track_id {
            continue;
        }

        // Corrupt frames are skipped rather than failing the whole track
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(_) => continue,
        };

        let spec = *decoded.spec();
        if sample_rate == 0 {
            sample_rate = spec.rate;
        }
        let count = spec.channels.count();
        if channels.is_empty() {
            layout_for(count)?;
            channels = vec![Vec::new(); count];
        }

        macro_rules! push_frames {
            ($buf:expr, $convert:expr) => {
                for (c, channel) in channels.iter_mut().enumerate().take(count) {
                    channel.extend($buf.chan(c).iter().map(|&s| $convert(s)));
                }
            };
        }

        match decoded {
            AudioBufferRef::F32(buf) => push_frames!(buf, |s: f32| s),
            AudioBufferRef::U8(buf) => push_frames!(buf, |s: u8| (s as f32 - 128.0) / 128.0),
            AudioBufferRef::S16(buf) => push_frames!(buf, |s: i16| s as f32 / 32768.0),
            AudioBufferRef::S24(buf) => push_frames!(buf, |s: i24| s.0 as f32 / 8388608.0),
            AudioBufferRef::S32(buf) => push_frames!(buf, |s: i32| s as f32 / 2147483648.0),
            _ => continue,
        }
    }

    if channels.is_empty() || sample_rate == 0 {
        return Err(invalid(format!("no decodable audio in {}", path.display())));
    }

    Ok(AudioBuffer {
        samples: channels,
        sample_rate,
    })
}

// ============================================================================
// Tests
// ============================================================================
