//! Cover and credits slides framing the combined video.

use std::path::{Path, PathBuf};

use crate::config::{Cover, Credits, CreditsContent};
use crate::error::{ReelError, Result};
use crate::ffmpeg_wrapper::{FFmpegCommand, MediaEngine, MediaInfo};
use crate::filters::Filter;
use crate::platforms::fit_within;
use crate::settings::Settings;
use crate::title_card::{self, Caption, encoder_for};

/// Show `image` letter-boxed at `target`'s size for `duration` seconds,
/// with a silent audio track so the slide joins the clips losslessly.
pub fn still_command(
    image: &Path,
    target: &MediaInfo,
    duration: f64,
    output: &Path,
) -> FFmpegCommand {
    let video = fit_within(target.width, target.height)
        .then(Filter::new("fps").arg(format!("{:.3}", target.frame_rate())))
        .then(Filter::new("format").arg("yuv420p"));

    FFmpegCommand::new(output)
        .looped_image(image, duration)
        .lavfi(
            Filter::new("anullsrc")
                .opt("r", target.audio_rate())
                .opt("cl", target.channel_layout()),
        )
        .video_filter(video)
        .map("0:v")
        .map("1:a")
        .video_codec(target.video_codec.as_deref().map(encoder_for).unwrap_or("libx264"))
        .audio_codec("aac")
        .duration(duration)
}

fn render_still(
    engine: &dyn MediaEngine,
    settings: &Settings,
    image: &Path,
    target: &MediaInfo,
    duration: f64,
    output: &Path,
) -> Result<PathBuf> {
    if settings.reuses(output) {
        log::info!("Reusing slide {}", output.display());
        return Ok(output.to_path_buf());
    }
    if !image.exists() {
        return Err(ReelError::Precondition {
            stage: format!("render {}", output.display()),
            missing: vec![image.to_path_buf()],
        });
    }
    log::info!("Rendering slide {} from {}", output.display(), image.display());
    engine.run(&still_command(image, target, duration, output))?;
    Ok(output.to_path_buf())
}

/// Render the cover slide.
pub fn render_cover(
    engine: &dyn MediaEngine,
    settings: &Settings,
    cover: &Cover,
    target: &MediaInfo,
    output: &Path,
) -> Result<PathBuf> {
    render_still(engine, settings, &cover.image, target, cover.duration, output)
}

/// Render the credits slide, from an image or as a text card.
pub fn render_credits(
    engine: &dyn MediaEngine,
    settings: &Settings,
    credits: &Credits,
    target: &MediaInfo,
    output: &Path,
) -> Result<PathBuf> {
    match &credits.content {
        CreditsContent::Image(image) => {
            render_still(engine, settings, image, target, credits.duration, output)
        }
        CreditsContent::Text(text) => {
            let workdir = output.parent().unwrap_or(Path::new("."));
            title_card::compose(
                engine,
                settings,
                workdir,
                target,
                &Caption::new(text, None),
                credits.duration,
                output,
            )?;
            Ok(output.to_path_buf())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeEngine;

    fn target() -> MediaInfo {
        FakeEngine::new().default_info
    }

    #[test]
    fn still_is_letterboxed_with_silent_audio() {
        let cmd = still_command(
            Path::new("cover.png"),
            &target(),
            3.0,
            Path::new("cover.mp4"),
        );
        let args = cmd.args();
        assert_eq!(&args[..6], ["-loop", "1", "-t", "3.000", "-i", "cover.png"]);
        assert!(args.contains(&"anullsrc=r=48000:cl=stereo".to_string()));
        assert!(args.contains(
            &"scale=640:360:force_original_aspect_ratio=decrease,pad=640:360:(ow-iw)/2:(oh-ih)/2:color=black,setsar=1,fps=25.000,format=yuv420p"
                .to_string()
        ));
        assert!(args.windows(2).any(|w| w == ["-map", "1:a"]));
    }

    #[test]
    fn text_credits_become_a_title_card() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::new();
        let credits = Credits {
            duration: 12.0,
            content: CreditsContent::Text("Thanks for watching".to_string()),
        };
        let output = dir.path().join("credits.mp4");

        render_credits(&engine, &Settings::default(), &credits, &target(), &output).unwrap();

        assert_eq!(engine.outputs(), vec!["background-640x360.mp4", "credits.mp4"]);
        let card = engine.commands()[1].args();
        assert!(card.iter().any(|a| a.contains("text=Thanks for watching")));
        assert!(card.windows(2).any(|w| w == ["-t", "12.000"]));
    }

    #[test]
    fn missing_cover_image_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let cover = Cover {
            image: dir.path().join("cover.png"),
            duration: 3.0,
        };
        let err = render_cover(
            &FakeEngine::new(),
            &Settings::default(),
            &cover,
            &target(),
            &dir.path().join("cover.mp4"),
        )
        .unwrap_err();
        match err {
            ReelError::Precondition { missing, .. } => assert_eq!(missing, vec![cover.image]),
            other => panic!("expected a precondition error, got {other:?}"),
        }
    }
}
