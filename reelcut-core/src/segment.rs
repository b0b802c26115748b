//! Segment extraction: cut a time range out of a source video.

use std::path::{Path, PathBuf};

use crate::config::Segment;
use crate::error::Result;
use crate::ffmpeg_wrapper::{FFmpegCommand, MediaEngine};
use crate::filters::Filter;
use crate::settings::Settings;

/// Encoder used when a crop forces the video to be re-encoded
const CROP_ENCODER: &str = "libx264";
const CROP_QUALITY: u8 = 18;

/// Build the extraction command for `segment`.
///
/// The seek goes before the input so the engine jumps straight to the
/// nearest keyframe instead of decoding from the start, and the length is
/// given as a duration because timestamps after an input seek are relative
/// to the seek point. Streams are copied unless a crop or audio filter
/// needs them decoded.
pub fn extract_command(segment: &Segment, output: &Path) -> FFmpegCommand {
    let mut cmd = FFmpegCommand::new(output)
        .seek_input(segment.start, &segment.source)
        .duration(segment.duration());

    cmd = match segment.crop {
        Some(crop) => {
            let mut filter = Filter::new("crop").arg(crop.width).arg(crop.height);
            if let Some((x, y)) = crop.offset {
                filter = filter.arg(x).arg(y);
            }
            cmd.video_filter(filter)
                .video_codec(CROP_ENCODER)
                .quality(CROP_QUALITY)
                .custom_args(&["-pix_fmt", "yuv420p"])
        }
        None => cmd.video_codec("copy"),
    };

    match &segment.audio_filter {
        Some(filter) => cmd.audio_filter(Filter::new(filter)).audio_codec("aac"),
        None => cmd.audio_codec("copy"),
    }
}

/// Extract `segment` into `output`. With the reuse policy an existing
/// output is kept untouched.
pub fn extract(
    engine: &dyn MediaEngine,
    settings: &Settings,
    segment: &Segment,
    output: &Path,
) -> Result<PathBuf> {
    if settings.reuses(output) {
        log::info!("Reusing segment {}", output.display());
        return Ok(output.to_path_buf());
    }

    log::info!(
        "Extracting {:.3}s-{:.3}s of {} into {}",
        segment.start,
        segment.end,
        segment.source.display(),
        output.display()
    );
    engine.run(&extract_command(segment, output))?;
    Ok(output.to_path_buf())
}
