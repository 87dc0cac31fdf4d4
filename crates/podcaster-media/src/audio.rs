//! Audio merge: concatenate intro, main and outro and normalize loudness.

use std::path::{Path, PathBuf};

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};

/// EBU R128 target used for podcast episodes.
pub const LOUDNORM_FILTER: &str = "loudnorm=I=-16:TP=-1.5:LRA=11";
pub const SAMPLE_RATE: u32 = 44_100;
pub const MP3_BITRATE: &str = "192k";

/// Build the filter graph for `n` audio inputs.
///
/// Every input is resampled to a common stereo format before `concat`,
/// so tracks recorded at different rates can be joined.
pub fn merge_filter(n: usize) -> String {
    let mut graph = String::new();
    for i in 0..n {
        graph.push_str(&format!(
            "[{i}:a]aresample={SAMPLE_RATE},aformat=sample_fmts=fltp:channel_layouts=stereo[a{i}];"
        ));
    }
    if n == 1 {
        graph.push_str(&format!("[a0]{LOUDNORM_FILTER}[out]"));
    } else {
        for i in 0..n {
            graph.push_str(&format!("[a{i}]"));
        }
        graph.push_str(&format!("concat=n={n}:v=0:a=1[cat];[cat]{LOUDNORM_FILTER}[out]"));
    }
    graph
}

/// Build the merge command. `inputs` must already be in play order.
pub fn merge_command(inputs: &[PathBuf], output: &Path) -> MediaResult<FfmpegCommand> {
    if inputs.is_empty() {
        return Err(MediaError::InvalidOptions(
            "audio merge needs at least one input".to_string(),
        ));
    }

    let cmd = inputs
        .iter()
        .fold(FfmpegCommand::new(output), |cmd, input| cmd.input(input))
        .filter_complex(merge_filter(inputs.len()))
        .map("[out]")
        .audio_codec("libmp3lame")
        .audio_bitrate(MP3_BITRATE)
        .output_args(["-ar", &SAMPLE_RATE.to_string()])
        .output_arg("-vn");
    Ok(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_input_skips_concat() {
        let graph = merge_filter(1);
        assert!(!graph.contains("concat"));
        assert!(graph.ends_with("[a0]loudnorm=I=-16:TP=-1.5:LRA=11[out]"));
    }

    #[test]
    fn test_three_inputs_concat_in_order() {
        let graph = merge_filter(3);
        assert!(graph.contains("[a0][a1][a2]concat=n=3:v=0:a=1[cat]"));
        assert!(graph.ends_with("[cat]loudnorm=I=-16:TP=-1.5:LRA=11[out]"));
    }

    #[test]
    fn test_merge_command_inputs_follow_given_order() {
        let inputs = vec![
            PathBuf::from("/u/s/intro/a.wav"),
            PathBuf::from("/u/s/main/b.wav"),
            PathBuf::from("/u/s/outro/c.wav"),
        ];
        let cmd = merge_command(&inputs, Path::new("/p/j/.partial-j_processed.mp3")).unwrap();
        let args = cmd.build_args();
        let sources: Vec<&String> = args
            .iter()
            .enumerate()
            .filter(|(i, _)| *i > 0 && args[i - 1] == "-i")
            .map(|(_, a)| a)
            .collect();
        assert_eq!(sources, ["/u/s/intro/a.wav", "/u/s/main/b.wav", "/u/s/outro/c.wav"]);
        assert!(args.contains(&"libmp3lame".to_string()));
    }

    #[test]
    fn test_merge_command_rejects_empty() {
        assert!(merge_command(&[], Path::new("out.mp3")).is_err());
    }
}
