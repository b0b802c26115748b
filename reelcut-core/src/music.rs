//! Background music: a looped track whose volume follows the timeline,
//! mixed under the video's own audio.

use std::path::{Path, PathBuf};

use crate::config::BackgroundMusic;
use crate::error::{ReelError, Result};
use crate::ffmpeg_wrapper::{FFmpegCommand, MediaEngine};
use crate::filters::{Filter, FilterChain, FilterGraph};
use crate::layout::staging_path;
use crate::timeline::Timeline;

const FADE_SECS: f64 = 2.0;

/// Volume automation for a track `total` seconds long: `loud` over the
/// quiet windows, `ducked` over the speech windows, faded at both ends.
pub fn envelope(timeline: &Timeline, loud: f64, ducked: f64) -> FilterChain {
    let total = timeline.total();
    let fade = FADE_SECS.min(total / 2.0);
    let mut chain = FilterChain::new();

    let quiet = timeline.quiet_windows();
    if !quiet.is_empty() {
        chain.push(Filter::new("volume").arg(loud).enable(&quiet));
    }
    let speech = timeline.speech_windows();
    if !speech.is_empty() {
        chain.push(Filter::new("volume").arg(ducked).enable(&speech));
    }

    chain
        .then(
            Filter::new("afade")
                .opt("t", "in")
                .opt("st", 0)
                .opt("d", format!("{fade:.3}")),
        )
        .then(
            Filter::new("afade")
                .opt("t", "out")
                .opt("st", format!("{:.3}", total - fade))
                .opt("d", format!("{fade:.3}")),
        )
}

/// Loop `audio` to the timeline's length and apply the envelope
pub fn ducked_track_command(
    audio: &Path,
    timeline: &Timeline,
    loud: f64,
    ducked: f64,
    output: &Path,
) -> FFmpegCommand {
    FFmpegCommand::new(output)
        .looped_input(audio)
        .audio_filter(envelope(timeline, loud, ducked))
        .custom_args(&["-vn"])
        .audio_codec("aac")
        .duration(timeline.total())
}

/// Pad both audio streams and merge them into one stereo mix. Video is
/// copied and the output keeps the video's length.
pub fn mix_command(video: &Path, track: &Path, duration: f64, output: &Path) -> FFmpegCommand {
    let graph = FilterGraph::new()
        .chain(&["0:a"], Filter::new("apad"), &["a0"])
        .chain(&["1:a"], Filter::new("apad"), &["a1"])
        .chain(
            &["a0", "a1"],
            Filter::new("amerge").opt("inputs", 2),
            &["a"],
        );

    FFmpegCommand::new(output)
        .input(video)
        .input(track)
        .filter_complex(graph)
        .map("0:v")
        .map("[a]")
        .video_codec("copy")
        .audio_codec("aac")
        .custom_args(&["-ac", "2"])
        .duration(duration)
}

/// Render the ducked music track for `timeline` into `output`.
pub fn build_ducked_track(
    engine: &dyn MediaEngine,
    music: &BackgroundMusic,
    timeline: &Timeline,
    output: &Path,
) -> Result<PathBuf> {
    if !music.audio.exists() {
        return Err(ReelError::Precondition {
            stage: "build the music track".to_string(),
            missing: vec![music.audio.clone()],
        });
    }
    if timeline.total() <= 0.0 {
        return Err(ReelError::config("cannot build a music track for an empty video"));
    }

    log::info!(
        "Building music track {} ({:.1}s, volume {} / {})",
        output.display(),
        timeline.total(),
        music.fg_volume,
        music.bg_volume
    );
    let staged = staging_path(output);
    engine.run(&ducked_track_command(
        &music.audio,
        timeline,
        music.fg_volume,
        music.bg_volume,
        &staged,
    ))?;
    std::fs::rename(&staged, output)?;
    Ok(output.to_path_buf())
}

/// Mix `track` under `video`'s own audio into `output`.
pub fn mix_into_video(
    engine: &dyn MediaEngine,
    video: &Path,
    track: &Path,
    output: &Path,
) -> Result<PathBuf> {
    let info = engine.probe(video)?;
    if !info.has_audio {
        return Err(ReelError::config(format!(
            "{} has no audio stream to mix music under",
            video.display()
        )));
    }

    let staged = staging_path(output);
    engine.run_tracked(
        &mix_command(video, track, info.duration, &staged),
        "Mixing music",
        info.duration,
    )?;
    std::fs::rename(&staged, output)?;
    Ok(output.to_path_buf())
}
