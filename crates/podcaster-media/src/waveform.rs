//! Waveform video: solid background with an animated waveform overlay.

use std::path::Path;

use podcaster_models::WaveformOptions;

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};

pub const FRAME_RATE: u32 = 25;

/// Convert a `#RRGGBB` color to FFmpeg's `0xRRGGBB` form; names pass through.
pub fn ffmpeg_color(color: &str) -> String {
    match color.strip_prefix('#') {
        Some(hex) => format!("0x{hex}"),
        None => color.to_string(),
    }
}

/// Build the waveform render command.
pub fn waveform_command(
    audio: &Path,
    output: &Path,
    options: &WaveformOptions,
) -> MediaResult<FfmpegCommand> {
    options
        .validate()
        .map_err(|e| MediaError::InvalidOptions(e.to_string()))?;
    let (width, height) = options
        .dimensions()
        .map_err(|e| MediaError::InvalidOptions(e.to_string()))?;
    let size = format!("{width}x{height}");
    let fg = ffmpeg_color(&options.fg_color);
    let bg = ffmpeg_color(&options.bg_color);

    let graph = format!(
        "[1:a]showwaves=s={size}:mode=cline:rate={FRAME_RATE}:colors={fg}[wave];\
         [0:v][wave]overlay=format=auto:shortest=1,format=yuv420p[v]"
    );

    Ok(FfmpegCommand::new(output)
        .lavfi(format!("color=c={bg}:s={size}:r={FRAME_RATE}"))
        .input(audio)
        .filter_complex(graph)
        .map("[v]")
        .map("1:a")
        .video_codec("libx264")
        .output_args(["-preset", "veryfast", "-tune", "stillimage"])
        .audio_codec("aac")
        .audio_bitrate("192k")
        .output_args(["-shortest", "-movflags", "+faststart"]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colors() {
        assert_eq!(ffmpeg_color("#ff8800"), "0xff8800");
        assert_eq!(ffmpeg_color("white"), "white");
    }

    #[test]
    fn test_waveform_command_uses_options() {
        let options = WaveformOptions {
            resolution: "640x360".into(),
            fg_color: "#00ff00".into(),
            bg_color: "navy".into(),
        };
        let args = waveform_command(Path::new("in.mp3"), Path::new("out.mp4"), &options)
            .unwrap()
            .build_args();
        assert!(args.contains(&"color=c=navy:s=640x360:r=25".to_string()));
        let graph = &args[args.iter().position(|a| a == "-filter_complex").unwrap() + 1];
        assert!(graph.contains("showwaves=s=640x360"));
        assert!(graph.contains("colors=0x00ff00"));
        assert!(args.contains(&"libx264".to_string()));
    }

    #[test]
    fn test_waveform_command_rejects_bad_resolution() {
        let options = WaveformOptions {
            resolution: "99999x1".into(),
            ..WaveformOptions::default()
        };
        let err = waveform_command(Path::new("in.mp3"), Path::new("out.mp4"), &options);
        assert!(matches!(err, Err(MediaError::InvalidOptions(_))));
    }
}
