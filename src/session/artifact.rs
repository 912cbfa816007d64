//! Converts an assembled byte sequence into the input shape the speech
//! collaborator expects.
//!
//! The assembled bytes are always the exact concatenation of the accepted
//! chunk payloads in sequence order. Container formats pass through
//! byte-identical; raw PCM is wrapped into a WAV container.

use std::io::Cursor;

use anyhow::{Context, Result};

use super::SessionError;

/// Mimetypes a session may declare at start. `audio/pcm` may carry `rate`
/// and `channels` parameters, e.g. `audio/pcm;rate=48000;channels=1`.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "audio/pcm",
    "audio/wav",
    "audio/x-wav",
    "audio/webm",
    "audio/ogg",
];

pub const DEFAULT_MIME_HINT: &str = "audio/wav";

const DEFAULT_PCM_RATE: u32 = 16_000;
const DEFAULT_PCM_CHANNELS: u16 = 1;

/// The collaborator-ready artifact: bytes plus the mimetype they carry.
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub mimetype: String,
}

/// Validate a client-supplied mime hint at session allocation time.
/// Absent hints default to WAV passthrough.
pub fn normalize_mime_hint(hint: Option<&str>) -> Result<String, SessionError> {
    let hint = match hint {
        Some(value) if !value.trim().is_empty() => value.trim().to_ascii_lowercase(),
        _ => return Ok(DEFAULT_MIME_HINT.to_string()),
    };
    let base = base_type(&hint);
    if ALLOWED_MIME_TYPES.contains(&base) {
        Ok(hint)
    } else {
        Err(SessionError::UnsupportedType(hint))
    }
}

/// Produce the artifact handed to the collaborator.
pub fn prepare(bytes: Vec<u8>, mime_hint: &str) -> Result<Artifact> {
    match base_type(mime_hint) {
        "audio/pcm" => {
            let (rate, channels) = pcm_params(mime_hint);
            let wav = wrap_pcm(&bytes, rate, channels)?;
            Ok(Artifact {
                bytes: wav,
                mimetype: "audio/wav".to_string(),
            })
        }
        "audio/x-wav" => Ok(Artifact {
            bytes,
            mimetype: "audio/wav".to_string(),
        }),
        other => Ok(Artifact {
            bytes,
            mimetype: other.to_string(),
        }),
    }
}

fn base_type(mime: &str) -> &str {
    mime.split(';').next().unwrap_or(mime).trim()
}

fn pcm_params(mime: &str) -> (u32, u16) {
    let mut rate = DEFAULT_PCM_RATE;
    let mut channels = DEFAULT_PCM_CHANNELS;
    for param in mime.split(';').skip(1) {
        let mut parts = param.splitn(2, '=');
        let key = parts.next().unwrap_or("").trim();
        let value = parts.next().unwrap_or("").trim();
        match key {
            "rate" => {
                if let Ok(parsed) = value.parse() {
                    rate = parsed;
                }
            }
            "channels" => {
                if let Ok(parsed) = value.parse() {
                    channels = parsed;
                }
            }
            _ => {}
        }
    }
    (rate, channels)
}

/// Wrap interleaved s16le PCM into a WAV container.
fn wrap_pcm(bytes: &[u8], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    if bytes.len() % 2 != 0 {
        anyhow::bail!("Odd byte length in PCM payload");
    }
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).context("Failed to create WAV writer")?;
        for sample in bytes.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([sample[0], sample[1]]))
                .context("Failed writing WAV sample")?;
        }
        writer.finalize().context("Failed finalising WAV payload")?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_defaults_to_wav() {
        assert_eq!(normalize_mime_hint(None).unwrap(), "audio/wav");
        assert_eq!(normalize_mime_hint(Some("  ")).unwrap(), "audio/wav");
    }

    #[test]
    fn test_normalize_rejects_unknown_types() {
        assert!(normalize_mime_hint(Some("video/mp4")).is_err());
        assert!(normalize_mime_hint(Some("audio/flac")).is_err());
    }

    #[test]
    fn test_normalize_keeps_pcm_params() {
        let hint = normalize_mime_hint(Some("audio/pcm;rate=48000;channels=2")).unwrap();
        assert_eq!(hint, "audio/pcm;rate=48000;channels=2");
        assert_eq!(pcm_params(&hint), (48_000, 2));
    }

    #[test]
    fn test_container_passthrough_is_byte_identical() {
        let bytes = vec![1u8, 2, 3, 4, 5];
        let artifact = prepare(bytes.clone(), "audio/webm").unwrap();
        assert_eq!(artifact.bytes, bytes);
        assert_eq!(artifact.mimetype, "audio/webm");
    }

    #[test]
    fn test_pcm_wrapped_into_wav() {
        let samples: Vec<u8> = [100i16, -200, 300, -400]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let artifact = prepare(samples, "audio/pcm;rate=16000;channels=1").unwrap();
        assert_eq!(artifact.mimetype, "audio/wav");

        let reader = hound::WavReader::new(Cursor::new(artifact.bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 16_000);
        assert_eq!(spec.channels, 1);
        let decoded: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, vec![100, -200, 300, -400]);
    }

    #[test]
    fn test_odd_pcm_length_rejected() {
        assert!(prepare(vec![0u8; 3], "audio/pcm").is_err());
    }
}
