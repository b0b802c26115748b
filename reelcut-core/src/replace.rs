//! Frame replacement: cover a time window of a clip with a still image.

use std::path::{Path, PathBuf};

use crate::config::{FrameAt, Replacement, ReplacementImage, file_name};
use crate::error::{ReelError, Result};
use crate::ffmpeg_wrapper::{FFmpegCommand, MediaEngine};
use crate::filters::{Filter, FilterGraph};
use crate::layout::content_key;
use crate::title_card::encoder_for;

/// Backs the capture point off the end of a window so it lands on a frame
/// that exists
const END_FRAME_MARGIN: f64 = 0.05;

/// Grab the frame shown at `at` seconds as a still image
pub fn capture_command(input: &Path, at: f64, image: &Path) -> FFmpegCommand {
    FFmpegCommand::new(image).seek_input(at, input).frames(1)
}

/// Overlay `image`, scaled to the video, for `start..=end` only. Audio is
/// copied through.
pub fn overlay_command(
    input: &Path,
    image: &Path,
    start: f64,
    end: f64,
    encoder: &str,
    output: &Path,
) -> FFmpegCommand {
    let graph = FilterGraph::new()
        .chain(&["1", "0"], Filter::new("scale2ref"), &["img", "base"])
        .chain(
            &["base", "img"],
            Filter::new("overlay").arg(0).arg(0).enable(&[(start, end)]),
            &["v"],
        );

    FFmpegCommand::new(output)
        .input(input)
        .input(image)
        .filter_complex(graph)
        .map("[v]")
        .map("0:a?")
        .video_codec(encoder)
        .audio_codec("copy")
        .custom_args(&["-pix_fmt", "yuv420p"])
}

fn capture_point(replacement: &Replacement, at: FrameAt) -> f64 {
    match at {
        FrameAt::Start => replacement.start,
        FrameAt::End => (replacement.end - END_FRAME_MARGIN).max(replacement.start),
    }
}

/// Apply `replacements` in order to `input`, each one working on the result
/// of the previous. The final result is renamed over `input`, so callers
/// keep using the same path.
pub fn apply_replacements(
    engine: &dyn MediaEngine,
    input: &Path,
    replacements: &[Replacement],
) -> Result<PathBuf> {
    if replacements.is_empty() {
        return Ok(input.to_path_buf());
    }

    let info = engine.probe(input)?;
    let encoder = info.video_codec.as_deref().map(encoder_for).unwrap_or("libx264");
    let workdir = input.parent().unwrap_or(Path::new("."));
    let name = file_name(input);
    let mut current = input.to_path_buf();

    for (k, replacement) in replacements.iter().enumerate() {
        let source = match &replacement.image {
            ReplacementImage::File(path) => path.display().to_string(),
            ReplacementImage::Frame(at) => format!("{at:?}"),
        };
        let key = content_key([
            current.display().to_string(),
            k.to_string(),
            format!("{:.3}-{:.3}", replacement.start, replacement.end),
            source,
        ]);
        let output = workdir.join(format!("replace-{key}-{name}"));

        let (image, captured) = match &replacement.image {
            ReplacementImage::File(path) => {
                if !path.exists() {
                    return Err(ReelError::Precondition {
                        stage: format!("replace frames in {name}"),
                        missing: vec![path.clone()],
                    });
                }
                (path.clone(), false)
            }
            ReplacementImage::Frame(at) => {
                let image = workdir.join(format!("replace-{key}.png"));
                engine.run(&capture_command(
                    &current,
                    capture_point(replacement, *at),
                    &image,
                ))?;
                (image, true)
            }
        };

        log::info!(
            "Replacing {:.3}s-{:.3}s of {} with {}",
            replacement.start,
            replacement.end,
            name,
            image.display()
        );
        engine.run(&overlay_command(
            &current,
            &image,
            replacement.start,
            replacement.end,
            encoder,
            &output,
        ))?;

        if captured {
            std::fs::remove_file(&image)?;
        }
        if current != input {
            std::fs::remove_file(&current)?;
        }
        current = output;
    }

    std::fs::rename(&current, input)?;
    Ok(input.to_path_buf())
}
