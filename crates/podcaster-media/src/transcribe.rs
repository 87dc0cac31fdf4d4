//! Speech-to-text through FFmpeg resampling and a whisper.cpp style CLI.

use std::path::{Path, PathBuf};

use podcaster_models::TranscriptionOptions;

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};

/// Whisper models expect 16 kHz mono PCM.
pub fn resample_command(audio: &Path, wav: &Path) -> FfmpegCommand {
    FfmpegCommand::new(wav)
        .input(audio)
        .output_args(["-vn", "-ar", "16000", "-ac", "1"])
        .audio_codec("pcm_s16le")
}

/// Arguments for the whisper CLI.
///
/// Whisper appends `.srt` to the `-of` base, so `output` must end in `.srt`.
pub fn whisper_args(
    model: &Path,
    wav: &Path,
    output: &Path,
    options: &TranscriptionOptions,
) -> MediaResult<Vec<String>> {
    let base = srt_base(output)?;
    Ok(vec![
        "-m".to_string(),
        model.to_string_lossy().to_string(),
        "-f".to_string(),
        wav.to_string_lossy().to_string(),
        "-osrt".to_string(),
        "-of".to_string(),
        base.to_string_lossy().to_string(),
        "-l".to_string(),
        options.language.clone().unwrap_or_else(|| "auto".to_string()),
        "-np".to_string(),
    ])
}

fn srt_base(output: &Path) -> MediaResult<PathBuf> {
    match output.extension().and_then(|e| e.to_str()) {
        Some("srt") => Ok(output.with_extension("")),
        _ => Err(MediaError::InvalidOptions(format!(
            "transcript output must end in .srt: {}",
            output.display()
        ))),
    }
}

/// Strip cue numbers and timestamps from SubRip text.
pub fn srt_to_text(srt: &str) -> String {
    let mut lines = Vec::new();
    for line in srt.lines() {
        let line = line.trim();
        if line.is_empty() || line.contains("-->") || line.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        lines.push(line);
    }
    let mut text = lines.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whisper_args() {
        let options = TranscriptionOptions {
            language: Some("de".into()),
        };
        let args = whisper_args(
            Path::new("/models/base.bin"),
            Path::new("/tmp/a.wav"),
            Path::new("/p/j/.partial-j.srt"),
            &options,
        )
        .unwrap();
        let of = args.iter().position(|a| a == "-of").unwrap();
        assert_eq!(args[of + 1], "/p/j/.partial-j");
        let l = args.iter().position(|a| a == "-l").unwrap();
        assert_eq!(args[l + 1], "de");
    }

    #[test]
    fn test_whisper_defaults_to_auto_language() {
        let args = whisper_args(
            Path::new("m.bin"),
            Path::new("a.wav"),
            Path::new("t.srt"),
            &TranscriptionOptions::default(),
        )
        .unwrap();
        assert!(args.windows(2).any(|w| w[0] == "-l" && w[1] == "auto"));
    }

    #[test]
    fn test_whisper_requires_srt_output() {
        let err = whisper_args(
            Path::new("m.bin"),
            Path::new("a.wav"),
            Path::new("t.txt"),
            &TranscriptionOptions::default(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_srt_to_text() {
        let srt = "1\n00:00:00,000 --> 00:00:02,500\nWelcome to the show.\n\n\
                   2\n00:00:02,500 --> 00:00:05,000\nToday we talk about Rust.\n\n";
        assert_eq!(srt_to_text(srt), "Welcome to the show.\nToday we talk about Rust.\n");
        assert_eq!(srt_to_text(""), "");
    }
}
