//! Capture source abstraction: a live byte stream from an input device.

use anyhow::Result;

/// Shape of the bytes a source emits, advertised to the server through the
/// session's mime hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl CaptureFormat {
    /// Mime hint for raw s16le PCM at this format.
    pub fn mime_hint(&self) -> String {
        format!(
            "audio/pcm;rate={};channels={}",
            self.sample_rate, self.channels
        )
    }
}

/// A live capture device emitting opaque byte slices.
///
/// The recording state machine exclusively owns the device from the moment
/// `start` succeeds until `stop` returns; `drain` hands over everything
/// captured since the previous drain without stopping the stream.
pub trait CaptureSource {
    /// Acquire the device and begin capturing.
    fn start(&mut self) -> Result<()>;

    /// Bytes captured since the last drain (or since start).
    fn drain(&mut self) -> Vec<u8>;

    /// Release the device and return any bytes not yet drained.
    fn stop(&mut self) -> Result<Vec<u8>>;

    fn is_active(&self) -> bool;

    /// The emitted byte format; meaningful once started.
    fn format(&self) -> CaptureFormat;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_hint_carries_format() {
        let format = CaptureFormat {
            sample_rate: 48_000,
            channels: 2,
        };
        assert_eq!(format.mime_hint(), "audio/pcm;rate=48000;channels=2");
    }
}
