//! Raw PCM audio returned by speech models.
//!
//! Speech models answer with base64 16-bit little-endian PCM and a MIME
//! type such as `audio/L16;codec=pcm;rate=24000`. Samples are interleaved
//! when there is more than one channel.

use thiserror::Error;

use crate::request::InlineBlob;

/// Sample rate used when the MIME type does not name one.
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// Most channels accepted from a MIME type.
pub const MAX_CHANNELS: u16 = 8;

const BITS_PER_SAMPLE: u16 = 16;

/// Errors from decoding PCM audio.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AudioError {
    #[error("Audio payload is empty")]
    Empty,

    #[error("Audio payload has odd length {0}; expected 16-bit samples")]
    OddLength(usize),

    #[error("Invalid MIME parameter '{0}'")]
    InvalidParameter(String),

    #[error("{samples} samples do not divide into {channels} channels")]
    ChannelMismatch { samples: usize, channels: u16 },

    #[error("Audio is too large for a WAV container")]
    TooLarge,
}

/// Decoded 16-bit PCM audio.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmAudio {
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples
    pub samples: Vec<i16>,
}

impl PcmAudio {
    /// Decode an inline blob.
    pub fn from_blob(blob: &InlineBlob) -> Result<Self, AudioError> {
        let (sample_rate, channels) = parse_format(&blob.mime_type)?;
        Self::from_bytes(&blob.data, sample_rate, channels)
    }

    /// Decode little-endian 16-bit bytes.
    pub fn from_bytes(bytes: &[u8], sample_rate: u32, channels: u16) -> Result<Self, AudioError> {
        check_format(sample_rate, channels)?;
        if bytes.is_empty() {
            return Err(AudioError::Empty);
        }
        if bytes.len() % 2 != 0 {
            return Err(AudioError::OddLength(bytes.len()));
        }

        let samples: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        if samples.len() % channels as usize != 0 {
            return Err(AudioError::ChannelMismatch {
                samples: samples.len(),
                channels,
            });
        }

        Ok(Self {
            sample_rate,
            channels,
            samples,
        })
    }

    /// Frames per channel.
    pub fn frame_count(&self) -> usize {
        self.samples.len().checked_div(self.channels as usize).unwrap_or(0)
    }

    /// Playback length. Zero when the sample rate is zero.
    pub fn duration(&self) -> std::time::Duration {
        if self.sample_rate == 0 {
            return std::time::Duration::ZERO;
        }
        std::time::Duration::from_secs_f64(self.frame_count() as f64 / self.sample_rate as f64)
    }

    /// Normalized samples in `[-1.0, 1.0)`, one vector per channel.
    pub fn channel_data(&self) -> Vec<Vec<f32>> {
        let channels = self.channels as usize;
        (0..channels)
            .map(|channel| {
                self.samples
                    .iter()
                    .skip(channel)
                    .step_by(channels)
                    .map(|&s| s as f32 / 32768.0)
                    .collect()
            })
            .collect()
    }

    /// Encode as a RIFF/WAVE file.
    pub fn to_wav(&self) -> Result<Vec<u8>, AudioError> {
        check_format(self.sample_rate, self.channels)?;
        let block_align = self
            .channels
            .checked_mul(BITS_PER_SAMPLE / 8)
            .ok_or(AudioError::TooLarge)?;
        let byte_rate = self
            .sample_rate
            .checked_mul(u32::from(block_align))
            .ok_or(AudioError::TooLarge)?;
        let data_len = self
            .samples
            .len()
            .checked_mul(2)
            .and_then(|len| u32::try_from(len).ok())
            .ok_or(AudioError::TooLarge)?;
        let riff_len = data_len.checked_add(36).ok_or(AudioError::TooLarge)?;

        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&riff_len.to_le_bytes());
        out.extend_from_slice(b"WAVE");

        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&self.channels.to_le_bytes());
        out.extend_from_slice(&self.sample_rate.to_le_bytes());
        out.extend_from_slice(&byte_rate.to_le_bytes());
        out.extend_from_slice(&block_align.to_le_bytes());
        out.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for sample in &self.samples {
            out.extend_from_slice(&sample.to_le_bytes());
        }
        Ok(out)
    }
}

fn check_format(sample_rate: u32, channels: u16) -> Result<(), AudioError> {
    if sample_rate == 0 {
        return Err(AudioError::InvalidParameter("rate=0".to_string()));
    }
    if channels == 0 || channels > MAX_CHANNELS {
        return Err(AudioError::InvalidParameter(format!("channels={}", channels)));
    }
    Ok(())
}

/// Read `rate=` and `channels=` from MIME parameters.
fn parse_format(mime_type: &str) -> Result<(u32, u16), AudioError> {
    let mut sample_rate = DEFAULT_SAMPLE_RATE;
    let mut channels = 1;

    for param in mime_type.split(';').skip(1) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        let invalid = || AudioError::InvalidParameter(param.trim().to_string());
        match key.trim().to_ascii_lowercase().as_str() {
            "rate" => sample_rate = value.trim().parse().map_err(|_| invalid())?,
            "channels" => channels = value.trim().parse().map_err(|_| invalid())?,
            _ => {}
        }
    }

    check_format(sample_rate, channels)?;
    Ok((sample_rate, channels))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_rate_from_mime() {
        let blob = InlineBlob::new("audio/L16;codec=pcm;rate=16000", pcm(&[0, 1]));
        let audio = PcmAudio::from_blob(&blob).unwrap();
        assert_eq!(audio.sample_rate, 16_000);
        assert_eq!(audio.channels, 1);
    }

    #[test]
    fn test_default_rate() {
        let blob = InlineBlob::new("audio/L16", pcm(&[0]));
        assert_eq!(
            PcmAudio::from_blob(&blob).unwrap().sample_rate,
            DEFAULT_SAMPLE_RATE
        );
    }

    #[test]
    fn test_channel_data_normalized() {
        let audio = PcmAudio::from_bytes(&pcm(&[i16::MIN, 16384, 0]), 24_000, 1).unwrap();
        assert_eq!(audio.channel_data(), vec![vec![-1.0, 0.5, 0.0]]);
    }

    #[test]
    fn test_stereo_deinterleaves() {
        let audio = PcmAudio::from_bytes(&pcm(&[1, -1, 2, -2]), 24_000, 2).unwrap();
        let data = audio.channel_data();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0], vec![1.0 / 32768.0, 2.0 / 32768.0]);
        assert_eq!(data[1], vec![-1.0 / 32768.0, -2.0 / 32768.0]);
        assert_eq!(audio.frame_count(), 2);
    }

    #[test]
    fn test_odd_length_rejected() {
        assert_eq!(
            PcmAudio::from_bytes(&[0, 1, 2], 24_000, 1),
            Err(AudioError::OddLength(3))
        );
    }

    #[test]
    fn test_bad_rate_rejected() {
        let blob = InlineBlob::new("audio/L16;rate=fast", pcm(&[0]));
        assert!(matches!(
            PcmAudio::from_blob(&blob),
            Err(AudioError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_wav_header() {
        let audio = PcmAudio::from_bytes(&pcm(&[0; 24_000]), 24_000, 1).unwrap();
        let wav = audio.to_wav().unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + 48_000);
        assert_eq!(u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]), 24_000);
        assert_eq!(audio.duration(), std::time::Duration::from_secs(1));
    }

    #[test]
    fn test_zero_rate_rejected() {
        let blob = InlineBlob::new("audio/L16;rate=0", pcm(&[0, 1]));
        assert_eq!(
            PcmAudio::from_blob(&blob),
            Err(AudioError::InvalidParameter("rate=0".to_string()))
        );
        assert!(PcmAudio::from_bytes(&pcm(&[0]), 0, 1).is_err());
    }

    #[test]
    fn test_channel_count_bounded() {
        for mime in ["audio/L16;channels=0", "audio/L16;channels=40000"] {
            let blob = InlineBlob::new(mime, pcm(&[0; 8]));
            assert!(matches!(
                PcmAudio::from_blob(&blob),
                Err(AudioError::InvalidParameter(_))
            ));
        }
        let blob = InlineBlob::new("audio/L16;channels=8", pcm(&[0; 16]));
        assert_eq!(PcmAudio::from_blob(&blob).unwrap().frame_count(), 2);
    }

    #[test]
    fn test_hand_built_audio_does_not_panic() {
        let audio = PcmAudio {
            sample_rate: u32::MAX,
            channels: 40_000,
            samples: vec![0; 4],
        };
        assert!(audio.to_wav().is_err());

        let silent = PcmAudio {
            sample_rate: 0,
            channels: 1,
            samples: vec![0; 4],
        };
        assert_eq!(silent.duration(), std::time::Duration::ZERO);
        assert!(silent.to_wav().is_err());
    }

    #[test]
    fn test_wav_byte_rate_for_max_channels() {
        let audio = PcmAudio::from_bytes(&pcm(&[0; 16]), 48_000, MAX_CHANNELS).unwrap();
        let wav = audio.to_wav().unwrap();
        assert_eq!(u16::from_le_bytes([wav[22], wav[23]]), MAX_CHANNELS);
        assert_eq!(
            u32::from_le_bytes([wav[28], wav[29], wav[30], wav[31]]),
            48_000 * 16
        );
    }
}
