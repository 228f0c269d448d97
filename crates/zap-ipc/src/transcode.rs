use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::debug;

use crate::error::TranscodeError;

/// Mimetype the gateway expects for push-to-talk audio.
pub const VOICE_NOTE_MIMETYPE: &str = "audio/ogg; codecs=opus";

const CHANNELS: &str = "1";
const SAMPLE_RATE: &str = "48000";
const CODEC: &str = "libopus";
const BITRATE: &str = "64k";
const GAIN_FILTER: &str = "volume=2.0";
const CONTAINER: &str = "ogg";

const STDERR_TAIL: usize = 2000;

/// Re-encodes arbitrary audio into the voice-note format: mono 48 kHz opus
/// at 64 kbps in ogg, with a 2x gain.
#[derive(Debug, Clone)]
pub struct AudioTranscoder {
    program: PathBuf,
    scratch_dir: Option<PathBuf>,
}

impl AudioTranscoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            scratch_dir: None,
        }
    }

    /// Put temporary files under `dir` instead of the system temp directory.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// `input_format` is the declared container, used as the input file
    /// extension so the encoder can probe it (e.g. `webm`, `mp3`).
    ///
    /// Both temporary files are removed when this returns, on every path.
    pub async fn to_voice_note(
        &self,
        input: &[u8],
        input_format: &str,
    ) -> Result<Vec<u8>, TranscodeError> {
        let input_file = self.scratch_file(&format!(".{}", sanitize_extension(input_format)))?;
        tokio::fs::write(input_file.path(), input).await?;
        let output_file = self.scratch_file(&format!(".{CONTAINER}"))?;

        let args = encoder_args(input_file.path(), output_file.path());
        debug!(
            program = %self.program.display(),
            input_bytes = input.len(),
            "Transcoding voice note"
        );

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| TranscodeError::Spawn(format!("{}: {e}", self.program.display())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let skip = stderr.len().saturating_sub(STDERR_TAIL);
            let tail = stderr
                .char_indices()
                .find(|(i, _)| *i >= skip)
                .map_or("", |(i, _)| &stderr[i..]);
            return Err(TranscodeError::Encoder {
                status: output.status.to_string(),
                stderr: tail.trim().to_string(),
            });
        }

        let encoded = tokio::fs::read(output_file.path()).await?;
        if encoded.is_empty() {
            return Err(TranscodeError::EmptyOutput);
        }

        debug!(output_bytes = encoded.len(), "Voice note ready");
        Ok(encoded)
    }

    fn scratch_file(&self, suffix: &str) -> Result<NamedTempFile, TranscodeError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("zap-voice-").suffix(suffix);
        let file = match &self.scratch_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        Ok(file)
    }
}

/// Encoder command line for one conversion.
pub fn encoder_args(input: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-y", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(input.as_os_str().to_owned());
    args.extend(
        [
            "-vn", "-ac", CHANNELS, "-ar", SAMPLE_RATE, "-c:a", CODEC, "-b:a", BITRATE, "-af",
            GAIN_FILTER, "-f", CONTAINER,
        ]
        .into_iter()
        .map(OsString::from),
    );
    args.push(output.as_os_str().to_owned());
    args
}

/// Accepts either a bare extension or a mimetype like `audio/webm;codecs=opus`.
fn sanitize_extension(format: &str) -> String {
    let base = format.split(';').next().unwrap_or(format);
    let base = base.rsplit('/').next().unwrap_or(base).trim();
    let ext = match base {
        "mpeg" => "mp3",
        "x-m4a" | "mp4" => "m4a",
        "x-wav" | "wave" => "wav",
        other => other,
    };
    let ext: String = ext
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    if ext.is_empty() { "bin".to_string() } else { ext }
}
