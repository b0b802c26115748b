use std::path::{Path, PathBuf};

use clap::ValueEnum;

use crate::error::Result;
use crate::ffmpeg_wrapper::{FFmpegCommand, MediaEngine};
use crate::filters::{Filter, FilterChain};
use crate::layout::staging_path;

/// Output shapes for the places a finished video is published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Platform {
    /// Landscape, published as rendered
    #[value(name = "youtube", alias = "yt")]
    YouTube,
    /// Square feed post
    #[value(alias = "ig")]
    Instagram,
    /// Vertical short-form video
    #[value(aliases = ["vertical", "youtube-shorts"])]
    Shorts,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::YouTube, Platform::Instagram, Platform::Shorts];

    /// File name prefix of the variant
    pub fn slug(&self) -> &'static str {
        match self {
            Platform::YouTube => "youtube",
            Platform::Instagram => "instagram",
            Platform::Shorts => "shorts",
        }
    }

    /// Frame size the variant is padded to; `None` keeps the source frame
    pub fn frame(&self) -> Option<(u32, u32)> {
        match self {
            Platform::YouTube => None,
            Platform::Instagram => Some((1080, 1080)),
            Platform::Shorts => Some((1080, 1920)),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Platform::YouTube => "YouTube (stream copy of the final video)",
            Platform::Instagram => "Instagram (1080x1080, letter-boxed square)",
            Platform::Shorts => "Shorts (1080x1920, letter-boxed vertical)",
        }
    }

    /// List all platforms as `(name, description)` pairs
    pub fn list_all() -> Vec<(&'static str, &'static str)> {
        Self::ALL
            .iter()
            .map(|p| (p.slug(), p.description()))
            .collect()
    }

    /// Command reformatting `input` for this platform
    pub fn command(&self, input: &Path, output: &Path) -> FFmpegCommand {
        let cmd = FFmpegCommand::new(output).input(input);
        match self.frame() {
            None => cmd.copy_codecs(),
            Some((width, height)) => cmd
                .video_filter(fit_within(width, height))
                .video_codec("libx264")
                .quality(20)
                .preset("medium")
                .audio_codec("copy")
                .custom_args(&["-pix_fmt", "yuv420p", "-movflags", "+faststart"]),
        }
    }
}

/// Scale to fit inside `width`x`height` keeping the aspect ratio, then pad
/// the remainder with black
pub fn fit_within(width: u32, height: u32) -> FilterChain {
    FilterChain::new()
        .then(
            Filter::new("scale")
                .arg(width)
                .arg(height)
                .opt("force_original_aspect_ratio", "decrease"),
        )
        .then(
            Filter::new("pad")
                .arg(width)
                .arg(height)
                .arg("(ow-iw)/2")
                .arg("(oh-ih)/2")
                .opt("color", "black"),
        )
        .then(Filter::new("setsar").arg(1))
}

/// Render the variant of `input` for `platform` into `output`.
pub fn render_variant(
    engine: &dyn MediaEngine,
    platform: Platform,
    input: &Path,
    output: &Path,
) -> Result<PathBuf> {
    let info = engine.probe(input)?;
    log::info!("Rendering {} variant {}", platform.slug(), output.display());
    let staged = staging_path(output);
    engine.run_tracked(
        &platform.command(input, &staged),
        platform.slug(),
        info.duration,
    )?;
    std::fs::rename(&staged, output)?;
    Ok(output.to_path_buf())
}
