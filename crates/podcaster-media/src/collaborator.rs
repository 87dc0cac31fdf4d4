//! The processing contract and its CLI-backed implementation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use podcaster_models::{TranscriptionOptions, WaveformOptions};
use tracing::{info, warn};

use crate::audio::merge_command;
use crate::command::{check_ffmpeg, ToolRunner};
use crate::error::{MediaError, MediaResult};
use crate::transcribe::{resample_command, whisper_args};
use crate::waveform::waveform_command;

/// Default per-invocation tool timeout.
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 3600;

/// Binaries tried, in order, when `WHISPER_PATH` is unset.
const WHISPER_BINARIES: &[&str] = &["whisper-cli", "whisper-cpp", "whisper"];

/// Produces a single output file from input files.
///
/// Implementations write exactly to `output`; callers own its placement.
/// Any error is treated as an opaque processing failure.
#[async_trait]
pub trait Collaborator: Send + Sync {
    /// Concatenate `inputs` in the given order into one normalized track.
    async fn merge_audio(&self, inputs: &[PathBuf], output: &Path) -> MediaResult<()>;

    /// Render a waveform video for `audio`.
    async fn render_waveform(
        &self,
        audio: &Path,
        output: &Path,
        options: &WaveformOptions,
    ) -> MediaResult<()>;

    /// Write SubRip subtitles for `audio`.
    async fn transcribe(
        &self,
        audio: &Path,
        output: &Path,
        options: &TranscriptionOptions,
    ) -> MediaResult<()>;
}

/// External tool locations.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Explicit FFmpeg binary; looked up on `PATH` when absent
    pub ffmpeg_path: Option<PathBuf>,
    /// Explicit whisper binary; looked up on `PATH` when absent
    pub whisper_path: Option<PathBuf>,
    /// Whisper model file
    pub whisper_model: Option<PathBuf>,
    pub tool_timeout: Duration,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            whisper_path: None,
            whisper_model: None,
            tool_timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
        }
    }
}

impl MediaConfig {
    pub fn from_env() -> Self {
        let path = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty()).map(PathBuf::from);
        Self {
            ffmpeg_path: path("FFMPEG_PATH"),
            whisper_path: path("WHISPER_PATH"),
            whisper_model: path("WHISPER_MODEL"),
            tool_timeout: Duration::from_secs(
                std::env::var("MEDIA_TOOL_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS),
            ),
        }
    }
}

/// Collaborator that shells out to FFmpeg and a whisper CLI.
pub struct CliCollaborator {
    ffmpeg: PathBuf,
    whisper: Option<PathBuf>,
    whisper_model: Option<PathBuf>,
    runner: ToolRunner,
}

impl CliCollaborator {
    /// Resolve tool paths. Fails when FFmpeg cannot be found; a missing
    /// whisper only fails transcription jobs.
    pub fn new(config: MediaConfig) -> MediaResult<Self> {
        let ffmpeg = match config.ffmpeg_path {
            Some(path) => which::which(&path)
                .map_err(|_| MediaError::ToolNotFound(path.display().to_string()))?,
            None => check_ffmpeg()?,
        };

        let whisper = match config.whisper_path {
            Some(path) => which::which(&path).ok(),
            None => WHISPER_BINARIES.iter().find_map(|b| which::which(b).ok()),
        };
        match &whisper {
            Some(path) => info!("Using whisper at {}", path.display()),
            None => warn!("No whisper binary found; transcription jobs will fail"),
        }
        info!("Using ffmpeg at {}", ffmpeg.display());

        Ok(Self {
            ffmpeg,
            whisper,
            whisper_model: config.whisper_model,
            runner: ToolRunner::new().with_timeout(config.tool_timeout),
        })
    }
}

async fn require_input(path: &Path) -> MediaResult<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(MediaError::MissingInput(path.to_path_buf())),
    }
}

async fn require_output(path: &Path) -> MediaResult<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(MediaError::NoOutput(path.to_path_buf())),
    }
}

#[async_trait]
impl Collaborator for CliCollaborator {
    async fn merge_audio(&self, inputs: &[PathBuf], output: &Path) -> MediaResult<()> {
        for input in inputs {
            require_input(input).await?;
        }
        let cmd = merge_command(inputs, output)?;
        self.runner.run_ffmpeg(&self.ffmpeg, &cmd).await?;
        require_output(output).await
    }

    async fn render_waveform(
        &self,
        audio: &Path,
        output: &Path,
        options: &WaveformOptions,
    ) -> MediaResult<()> {
        require_input(audio).await?;
        let cmd = waveform_command(audio, output, options)?;
        self.runner.run_ffmpeg(&self.ffmpeg, &cmd).await?;
        require_output(output).await
    }

    async fn transcribe(
        &self,
        audio: &Path,
        output: &Path,
        options: &TranscriptionOptions,
    ) -> MediaResult<()> {
        let whisper = self
            .whisper
            .as_ref()
            .ok_or_else(|| MediaError::ToolNotFound("whisper".to_string()))?;
        let model = self
            .whisper_model
            .as_ref()
            .ok_or_else(|| MediaError::InvalidOptions("WHISPER_MODEL is not set".to_string()))?;
        require_input(audio).await?;

        // scratch wav next to the output so it is cleaned with the job dir
        let scratch_parent = output.parent().unwrap_or_else(|| Path::new("."));
        let scratch = tempfile::Builder::new()
            .prefix(".whisper-")
            .tempdir_in(scratch_parent)?;
        let wav = scratch.path().join("audio.wav");

        self.runner
            .run_ffmpeg(&self.ffmpeg, &resample_command(audio, &wav))
            .await?;
        let args = whisper_args(model, &wav, output, options)?;
        self.runner.run("whisper", whisper, &args).await?;
        require_output(output).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_missing_ffmpeg_is_not_found() {
        let config = MediaConfig {
            ffmpeg_path: Some(PathBuf::from("/nonexistent/ffmpeg")),
            ..MediaConfig::default()
        };
        assert!(matches!(
            CliCollaborator::new(config),
            Err(MediaError::ToolNotFound(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_input_fails_before_running() {
        let collaborator = CliCollaborator {
            ffmpeg: PathBuf::from("/bin/false"),
            whisper: None,
            whisper_model: None,
            runner: ToolRunner::new(),
        };
        let dir = tempfile::TempDir::new().unwrap();
        let err = collaborator
            .merge_audio(&[dir.path().join("nope.wav")], &dir.path().join("out.mp3"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::MissingInput(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_transcribe_without_whisper_fails() {
        let collaborator = CliCollaborator {
            ffmpeg: PathBuf::from("/bin/true"),
            whisper: None,
            whisper_model: None,
            runner: ToolRunner::new(),
        };
        let err = collaborator
            .transcribe(
                Path::new("a.mp3"),
                Path::new("a.srt"),
                &TranscriptionOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::ToolNotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_success_without_output_is_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("main.wav");
        tokio::fs::write(&input, b"RIFF").await.unwrap();
        let collaborator = CliCollaborator {
            ffmpeg: PathBuf::from("/bin/true"),
            whisper: None,
            whisper_model: None,
            runner: ToolRunner::new(),
        };
        let err = collaborator
            .merge_audio(&[input], &dir.path().join("out.mp3"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::NoOutput(_)));
    }
}
