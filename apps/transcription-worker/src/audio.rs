//! Audio container handling for the ASR step.
//!
//! Voice notes arrive as OGG/Opus; the transcription backend wants WAV.
//! Conversion shells out to ffmpeg so the event loop never decodes audio
//! itself. Temp files are `tempfile`-owned, so they disappear on every exit
//! path including panics.

use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use tempfile::NamedTempFile;

/// Voice notes above this size are rejected before any decoding.
pub const MAX_AUDIO_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Ogg,
    Wav,
}

/// Sniffs the container from magic bytes; anything unrecognized is
/// unsupported and terminal for the message.
pub fn detect_container(data: &[u8]) -> Result<Container> {
    if data.starts_with(b"OggS") {
        Ok(Container::Ogg)
    } else if data.starts_with(b"RIFF") {
        Ok(Container::Wav)
    } else {
        bail!("unsupported audio container")
    }
}

/// Converts the OGG file at `input` into a mono 16 kHz WAV next to it.
/// Returns the owned temp file; dropping it deletes the WAV.
pub async fn convert_ogg_to_wav(input: &Path) -> Result<NamedTempFile> {
    let wav = tempfile::Builder::new()
        .prefix("voxflow-asr-")
        .suffix(".wav")
        .tempfile()
        .context("create wav temp file")?;

    let output = tokio::process::Command::new("ffmpeg")
        .arg("-y")
        .arg("-i")
        .arg(input)
        .args(["-ar", "16000", "-ac", "1"])
        .arg(wav.path())
        .output()
        .await
        .context("spawn ffmpeg")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!(
            "ffmpeg failed ({}): {}",
            output.status,
            stderr.lines().last().unwrap_or("no output")
        ));
    }
    Ok(wav)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_known_containers() {
        assert_eq!(detect_container(b"OggS\x00rest").unwrap(), Container::Ogg);
        assert_eq!(detect_container(b"RIFF....WAVE").unwrap(), Container::Wav);
    }

    #[test]
    fn rejects_unknown_containers() {
        assert!(detect_container(b"ID3\x03mp3 data").is_err());
        assert!(detect_container(b"").is_err());
    }
}
