//! Job requests: what a job does and where its input lives.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::ids::{JobId, SessionId};

/// Kind of processing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Concatenate intro, main and outro, then loudness-normalize
    AudioMerge,
    /// Render an audio waveform into an mp4
    WaveformVideo,
    /// Speech-to-text into SRT subtitles
    Transcription,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::AudioMerge => "audio_merge",
            JobKind::WaveformVideo => "waveform_video",
            JobKind::Transcription => "transcription",
        }
    }

    /// File name of the primary artifact this kind produces.
    pub fn output_file_name(&self, job_id: &JobId) -> String {
        match self {
            JobKind::AudioMerge => format!("{job_id}_processed.mp3"),
            JobKind::WaveformVideo => format!("{job_id}_waveform.mp4"),
            JobKind::Transcription => format!("{job_id}.srt"),
        }
    }

    /// Secondary artifact copied into the outputs bucket, if any.
    pub fn export_file_name(&self, job_id: &JobId) -> Option<String> {
        match self {
            JobKind::Transcription => Some(format!("{job_id}_transcript.txt")),
            JobKind::AudioMerge | JobKind::WaveformVideo => None,
        }
    }

    /// Whether the primary artifact is audio or video another job can consume.
    pub fn produces_media(&self) -> bool {
        !matches!(self, JobKind::Transcription)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobKind {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio_merge" => Ok(JobKind::AudioMerge),
            "waveform_video" => Ok(JobKind::WaveformVideo),
            "transcription" => Ok(JobKind::Transcription),
            other => Err(RequestError::UnknownKind(other.to_string())),
        }
    }
}

/// Where a job reads its input from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum InputRef {
    Session(SessionId),
    Job(JobId),
}

impl fmt::Display for InputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputRef::Session(id) => write!(f, "session:{id}"),
            InputRef::Job(id) => write!(f, "job:{id}"),
        }
    }
}

/// Invalid job request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("unknown job kind: {0}")]
    UnknownKind(String),

    #[error("invalid resolution {0:?}, expected WIDTHxHEIGHT between 16 and 4096")]
    InvalidResolution(String),

    #[error("invalid color {0:?}, expected a color name or #RRGGBB")]
    InvalidColor(String),

    #[error("invalid language code {0:?}")]
    InvalidLanguage(String),
}

fn default_resolution() -> String {
    "1280x720".to_string()
}

fn default_fg_color() -> String {
    "white".to_string()
}

fn default_bg_color() -> String {
    "black".to_string()
}

/// Rendering options for waveform videos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveformOptions {
    #[serde(default = "default_resolution")]
    pub resolution: String,
    #[serde(default = "default_fg_color")]
    pub fg_color: String,
    #[serde(default = "default_bg_color")]
    pub bg_color: String,
}

impl Default for WaveformOptions {
    fn default() -> Self {
        Self {
            resolution: default_resolution(),
            fg_color: default_fg_color(),
            bg_color: default_bg_color(),
        }
    }
}

impl WaveformOptions {
    /// Parsed `(width, height)`.
    pub fn dimensions(&self) -> Result<(u32, u32), RequestError> {
        let invalid = || RequestError::InvalidResolution(self.resolution.clone());
        let (w, h) = self.resolution.split_once('x').ok_or_else(invalid)?;
        let w: u32 = w.parse().map_err(|_| invalid())?;
        let h: u32 = h.parse().map_err(|_| invalid())?;
        if !(16..=4096).contains(&w) || !(16..=4096).contains(&h) {
            return Err(invalid());
        }
        Ok((w, h))
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        self.dimensions()?;
        for color in [&self.fg_color, &self.bg_color] {
            if !is_valid_color(color) {
                return Err(RequestError::InvalidColor(color.clone()));
            }
        }
        Ok(())
    }
}

// Values end up inside an ffmpeg filter graph.
fn is_valid_color(color: &str) -> bool {
    if let Some(hex) = color.strip_prefix('#') {
        return hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit());
    }
    !color.is_empty() && color.len() <= 32 && color.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Options for transcription jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionOptions {
    /// Spoken language; auto-detected when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl TranscriptionOptions {
    pub fn validate(&self) -> Result<(), RequestError> {
        if let Some(lang) = &self.language {
            let ok = (2..=8).contains(&lang.len()) && lang.chars().all(|c| c.is_ascii_alphabetic());
            if !ok {
                return Err(RequestError::InvalidLanguage(lang.clone()));
            }
        }
        Ok(())
    }
}

/// A unit of work, one variant per job kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobRequest {
    AudioMerge {
        session_id: SessionId,
    },
    WaveformVideo {
        source_job: JobId,
        #[serde(default)]
        options: WaveformOptions,
    },
    Transcription {
        source_job: JobId,
        #[serde(default)]
        options: TranscriptionOptions,
    },
}

impl JobRequest {
    pub fn kind(&self) -> JobKind {
        match self {
            JobRequest::AudioMerge { .. } => JobKind::AudioMerge,
            JobRequest::WaveformVideo { .. } => JobKind::WaveformVideo,
            JobRequest::Transcription { .. } => JobKind::Transcription,
        }
    }

    pub fn input(&self) -> InputRef {
        match self {
            JobRequest::AudioMerge { session_id } => InputRef::Session(session_id.clone()),
            JobRequest::WaveformVideo { source_job, .. }
            | JobRequest::Transcription { source_job, .. } => InputRef::Job(source_job.clone()),
        }
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        match self {
            JobRequest::AudioMerge { .. } => Ok(()),
            JobRequest::WaveformVideo { options, .. } => options.validate(),
            JobRequest::Transcription { options, .. } => options.validate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_json_shape() {
        let json = r#"{"kind":"waveform_video","source_job":"job-1"}"#;
        let request: JobRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.kind(), JobKind::WaveformVideo);
        assert_eq!(
            request.input(),
            InputRef::Job(JobId::parse("job-1").unwrap())
        );
        match &request {
            JobRequest::WaveformVideo { options, .. } => {
                assert_eq!(options, &WaveformOptions::default())
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn test_kind_artifact_names() {
        let id = JobId::parse("j1").unwrap();
        assert_eq!(JobKind::AudioMerge.output_file_name(&id), "j1_processed.mp3");
        assert_eq!(
            JobKind::Transcription.export_file_name(&id).as_deref(),
            Some("j1_transcript.txt")
        );
        assert_eq!(JobKind::WaveformVideo.export_file_name(&id), None);
        assert!(!JobKind::Transcription.produces_media());
    }

    #[test]
    fn test_request_rejects_bad_ids() {
        let json = r#"{"kind":"audio_merge","session_id":"../etc"}"#;
        assert!(serde_json::from_str::<JobRequest>(json).is_err());
    }

    #[test]
    fn test_waveform_validation() {
        let mut options = WaveformOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.dimensions().unwrap(), (1280, 720));

        options.fg_color = "#00ff88".into();
        assert!(options.validate().is_ok());

        options.fg_color = "white:s=1x1".into();
        assert!(matches!(options.validate(), Err(RequestError::InvalidColor(_))));

        options.fg_color = "white".into();
        options.resolution = "99999x1".into();
        assert!(matches!(
            options.validate(),
            Err(RequestError::InvalidResolution(_))
        ));
    }

    #[test]
    fn test_transcription_language_validation() {
        let ok = TranscriptionOptions {
            language: Some("en".into()),
        };
        assert!(ok.validate().is_ok());
        let bad = TranscriptionOptions {
            language: Some("en; rm".into()),
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_output_file_names() {
        let id = JobId::parse("abc").unwrap();
        assert_eq!(JobKind::AudioMerge.output_file_name(&id), "abc_processed.mp3");
        assert_eq!(JobKind::WaveformVideo.output_file_name(&id), "abc_waveform.mp4");
        assert_eq!(JobKind::Transcription.output_file_name(&id), "abc.srt");
        assert_eq!("transcription".parse::<JobKind>().unwrap(), JobKind::Transcription);
    }
}
