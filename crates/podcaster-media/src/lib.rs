//! External media tools behind a narrow "execute and report" contract.
//!
//! This crate provides:
//! - An FFmpeg command builder with multiple inputs
//! - A process runner with timeouts and a bounded stderr tail
//! - Command builders for audio merge, waveform video and transcription
//! - The [`Collaborator`] trait and its CLI implementation

pub mod audio;
pub mod collaborator;
pub mod command;
pub mod error;
pub mod transcribe;
pub mod waveform;

pub use collaborator::{CliCollaborator, Collaborator, MediaConfig};
pub use command::{check_ffmpeg, FfmpegCommand, ToolRunner};
pub use error::{MediaError, MediaResult};
pub use transcribe::srt_to_text;
