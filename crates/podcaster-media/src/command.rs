//! FFmpeg command builder and external tool runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Bytes of stderr kept for failure diagnostics.
pub const STDERR_TAIL_BYTES: usize = 4096;

#[derive(Debug, Clone)]
struct FfmpegInput {
    /// Arguments placed before this input's -i
    args: Vec<String>,
    source: String,
}

/// Builder for FFmpeg commands with one or more inputs.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    inputs: Vec<FfmpegInput>,
    output: PathBuf,
    output_args: Vec<String>,
    overwrite: bool,
    log_level: String,
}

impl FfmpegCommand {
    /// Create a command writing to `output`.
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add a file input.
    pub fn input(self, path: impl AsRef<Path>) -> Self {
        let source = path.as_ref().to_string_lossy().to_string();
        self.input_with_args(Vec::<String>::new(), source)
    }

    /// Add an input preceded by its own arguments.
    pub fn input_with_args<I, S>(mut self, args: I, source: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.push(FfmpegInput {
            args: args.into_iter().map(Into::into).collect(),
            source: source.into(),
        });
        self
    }

    /// Add a synthetic lavfi source such as `color=c=black:s=1280x720`.
    pub fn lavfi(self, spec: impl Into<String>) -> Self {
        self.input_with_args(["-f", "lavfi"], spec)
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    /// Map a stream or filter label into the output.
    pub fn map(self, label: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(label)
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Build the argument list.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }
        args.push("-hide_banner".to_string());
        args.push("-loglevel".to_string());
        args.push(self.log_level.clone());

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_string());
            args.push(input.source.clone());
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());
        args
    }
}

enum Outcome {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
}

/// Runs external tools with an optional timeout.
#[derive(Debug, Clone, Default)]
pub struct ToolRunner {
    timeout: Option<Duration>,
}

impl ToolRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run an FFmpeg command with the given binary.
    pub async fn run_ffmpeg(&self, ffmpeg: &Path, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run("ffmpeg", ffmpeg, &cmd.build_args()).await
    }

    /// Run `program` to completion.
    ///
    /// A non-zero exit becomes [`MediaError::ToolFailed`] carrying the last
    /// [`STDERR_TAIL_BYTES`] of stderr.
    pub async fn run(&self, tool: &str, program: &Path, args: &[String]) -> MediaResult<()> {
        debug!("Running {}: {} {}", tool, program.display(), args.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => MediaError::ToolNotFound(tool.to_string()),
                _ => MediaError::Io(e),
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("stderr not captured"))?;
        let tail_handle = tokio::spawn(read_tail(stderr, STDERR_TAIL_BYTES));

        let deadline = async {
            match self.timeout {
                Some(t) => tokio::time::sleep(t).await,
                None => std::future::pending::<()>().await,
            }
        };

        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status),
            _ = deadline => Outcome::TimedOut,
        };

        let status = match outcome {
            Outcome::Exited(status) => status?,
            Outcome::TimedOut => {
                let secs = self.timeout.map(|t| t.as_secs()).unwrap_or_default();
                warn!("{} timed out after {} seconds, killing process", tool, secs);
                let _ = child.kill().await;
                return Err(MediaError::Timeout {
                    tool: tool.to_string(),
                    secs,
                });
            }
        };

        let tail = tail_handle.await.unwrap_or_default();
        if status.success() {
            Ok(())
        } else {
            Err(MediaError::tool_failed(
                tool,
                format!("{tool} exited with {status}"),
                Some(tail),
                status.code(),
            ))
        }
    }
}

/// Drain a reader, keeping only its last `limit` bytes.
async fn read_tail<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> String {
    let mut tail: Vec<u8> = Vec::with_capacity(limit);
    let mut buf = [0u8; 1024];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&buf[..n]);
                if tail.len() > limit {
                    let excess = tail.len() - limit;
                    tail.drain(..excess);
                }
            }
        }
    }
    String::from_utf8_lossy(&tail).into_owned()
}

/// Locate an FFmpeg binary on `PATH`.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::ToolNotFound("ffmpeg".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder_multiple_inputs() {
        let cmd = FfmpegCommand::new("/out/merged.mp3")
            .input("/in/intro.wav")
            .input("/in/main.wav")
            .filter_complex("[0:a][1:a]concat=n=2:v=0:a=1[out]")
            .map("[out]")
            .audio_codec("libmp3lame")
            .audio_bitrate("192k");

        let args = cmd.build_args();
        assert_eq!(cmd.input_count(), 2);
        assert_eq!(&args[..4], ["-y", "-hide_banner", "-loglevel", "error"]);
        let first_i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[first_i + 1], "/in/intro.wav");
        assert_eq!(args[first_i + 3], "/in/main.wav");
        assert!(args.contains(&"libmp3lame".to_string()));
        assert_eq!(args.last().unwrap(), "/out/merged.mp3");
    }

    #[test]
    fn test_lavfi_input_args_precede_i() {
        let args = FfmpegCommand::new("out.mp4")
            .lavfi("color=c=black:s=640x360")
            .build_args();
        let pos = args.iter().position(|a| a == "lavfi").unwrap();
        assert_eq!(args[pos - 1], "-f");
        assert_eq!(args[pos + 1], "-i");
        assert_eq!(args[pos + 2], "color=c=black:s=640x360");
    }

    #[tokio::test]
    async fn test_read_tail_keeps_last_bytes() {
        let data = b"0123456789".to_vec();
        let tail = read_tail(&data[..], 4).await;
        assert_eq!(tail, "6789");
    }

    #[tokio::test]
    async fn test_missing_program_is_tool_not_found() {
        let err = ToolRunner::new()
            .run("ghost", Path::new("/nonexistent/ghost-tool"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::ToolNotFound(t) if t == "ghost"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_captures_stderr() {
        let args = vec!["-c".to_string(), "echo boom >&2; exit 3".to_string()];
        let err = ToolRunner::new()
            .run("sh", Path::new("/bin/sh"), &args)
            .await
            .unwrap_err();
        match err {
            MediaError::ToolFailed {
                stderr, exit_code, ..
            } => {
                assert_eq!(exit_code, Some(3));
                assert!(stderr.unwrap().contains("boom"));
            }
            other => panic!("expected tool failure, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_process() {
        let args = vec!["-c".to_string(), "sleep 5".to_string()];
        let err = ToolRunner::new()
            .with_timeout(Duration::from_millis(100))
            .run("sh", Path::new("/bin/sh"), &args)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Timeout { .. }));
    }
}
