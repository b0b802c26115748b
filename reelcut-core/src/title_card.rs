//! Title cards: the caption slide shown before a clip.
//!
//! A card is a solid background at the clip's exact size with the wrapped
//! question (and answer, in a second colour) centred as a block, faded in
//! and out, with the logo badge in the top-right corner.

use std::path::{Path, PathBuf};

use crate::error::{ReelError, Result};
use crate::ffmpeg_wrapper::{FFmpegCommand, MediaEngine, MediaInfo};
use crate::filters::{Filter, FilterChain, FilterGraph};
use crate::settings::Settings;

/// Words read per second
pub const READING_SPEED: f64 = 2.5;
pub const MIN_DISPLAY_SECS: f64 = 4.0;
pub const MAX_DISPLAY_SECS: f64 = 8.0;
/// Characters per wrapped caption line
pub const WRAP_WIDTH: usize = 32;
/// Length of the cached background; covers the longest caption
pub const BACKGROUND_SECS: f64 = 10.0;

const FADE_SECS: f64 = 0.5;
const LOGO_SIZE: u32 = 48;
const LOGO_MARGIN: u32 = 10;
/// Card heights the base font sizes are tuned for
const REFERENCE_HEIGHT: f64 = 360.0;

/// Question/answer pair shown on a title card
#[derive(Debug, Clone, PartialEq)]
pub struct Caption {
    pub question: String,
    pub answer: Option<String>,
}

impl Caption {
    pub fn new(question: &str, answer: Option<&str>) -> Self {
        Self {
            question: question.to_string(),
            answer: answer.map(str::to_string),
        }
    }

    pub fn word_count(&self) -> usize {
        let answer = self.answer.as_deref().unwrap_or("");
        self.question.split_whitespace().count() + answer.split_whitespace().count()
    }

    /// Seconds the card stays on screen
    pub fn display_duration(&self) -> f64 {
        display_duration(self.word_count())
    }
}

/// `clamp(round(words / 2.5), 4, 8)`
pub fn display_duration(words: usize) -> f64 {
    (words as f64 / READING_SPEED)
        .round()
        .clamp(MIN_DISPLAY_SECS, MAX_DISPLAY_SECS)
}

/// Greedy word wrap. A word longer than `width` gets a line of its own.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();

    for word in text.split_whitespace() {
        if !line.is_empty() && line.len() + 1 + word.len() > width {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

#[derive(Debug, Clone, Copy)]
struct TextStyle {
    font_size: u32,
    color: &'static str,
}

const QUESTION_STYLE: TextStyle = TextStyle {
    font_size: 18,
    color: "FFFFFF",
};
const ANSWER_STYLE: TextStyle = TextStyle {
    font_size: 20,
    color: "FF7F00",
};

/// One drawtext filter per wrapped line, laid out as a vertically centred
/// block for a card `height` pixels tall.
pub fn caption_layout(caption: &Caption, height: u32, font: Option<&Path>) -> FilterChain {
    let scale = (height as f64 / REFERENCE_HEIGHT).max(1.0);
    let question = wrap(&caption.question, WRAP_WIDTH);
    let answer = caption
        .answer
        .as_deref()
        .map(|a| wrap(a, WRAP_WIDTH))
        .unwrap_or_default();

    let mut rows: Vec<(usize, &str, TextStyle)> = question
        .iter()
        .enumerate()
        .map(|(i, line)| (i, line.as_str(), QUESTION_STYLE))
        .collect();
    // A blank row separates the answer from the question
    let answer_offset = question.len() + 1;
    rows.extend(
        answer
            .iter()
            .enumerate()
            .map(|(i, line)| (answer_offset + i, line.as_str(), ANSWER_STYLE)),
    );

    let row_count = if answer.is_empty() {
        question.len()
    } else {
        answer_offset + answer.len()
    };
    let line_height = (QUESTION_STYLE.font_size as f64 * 1.25 * scale).round();
    let top = (height as f64 - row_count as f64 * line_height) / 2.0;

    let mut chain = FilterChain::new();
    for (row, text, style) in rows {
        let mut filter = Filter::new("drawtext");
        if let Some(font) = font {
            filter = filter.text("fontfile", &font.display().to_string());
        }
        let y = (top + row as f64 * line_height).round().max(0.0) as u32;
        chain.push(
            filter
                .opt("fontcolor", style.color)
                .opt("fontsize", (style.font_size as f64 * scale).round() as u32)
                .text("text", text)
                .expr("x", "(w-tw)/2")
                .opt("y", y),
        );
    }
    chain
}

fn fades(duration: f64, alpha: bool) -> FilterChain {
    let fade = |kind: &str, start: f64| {
        let filter = Filter::new("fade")
            .opt("t", kind)
            .opt("st", format!("{start:.3}"))
            .opt("d", FADE_SECS);
        if alpha { filter.opt("alpha", 1) } else { filter }
    };
    FilterChain::new()
        .then(fade("in", 0.0))
        .then(fade("out", duration - FADE_SECS))
}

/// Name of the cached background for a card size
pub fn background_name(width: u32, height: u32) -> String {
    format!("background-{width}x{height}.mp4")
}

/// Command producing a silent solid background matching `target`
pub fn background_command(target: &MediaInfo, output: &Path) -> FFmpegCommand {
    FFmpegCommand::new(output)
        .lavfi(
            Filter::new("color")
                .opt("c", "black")
                .opt("s", format!("{}x{}", target.width, target.height))
                .opt("r", format!("{:.3}", target.frame_rate())),
        )
        .lavfi(
            Filter::new("anullsrc")
                .opt("r", target.audio_rate())
                .opt("cl", target.channel_layout()),
        )
        .duration(BACKGROUND_SECS)
        .video_codec(target.video_codec.as_deref().map(encoder_for).unwrap_or("libx264"))
        .audio_codec("aac")
        .custom_args(&["-pix_fmt", "yuv420p"])
}

/// Encoder matching a probed codec name, so cards join clips without
/// re-encoding them
pub fn encoder_for(codec: &str) -> &'static str {
    match codec {
        "hevc" | "h265" => "libx265",
        _ => "libx264",
    }
}

/// Command drawing `caption` over `background` for `duration` seconds.
///
/// The background is cached per size only, so the card is converted to the
/// target's frame rate, sample rate and channel layout here.
pub fn card_command(
    background: &Path,
    target: &MediaInfo,
    caption: &Caption,
    duration: f64,
    settings: &Settings,
    output: &Path,
) -> FFmpegCommand {
    let card = FilterChain::new()
        .then(Filter::new("trim").arg(0).arg(format!("{duration:.3}")))
        .then(Filter::new("setpts").arg("PTS-STARTPTS"))
        .then(Filter::new("fps").arg(format!("{:.3}", target.frame_rate())))
        .extend(caption_layout(caption, target.height, settings.font.as_deref()))
        .extend(fades(duration, false));
    let audio = FilterChain::new()
        .then(Filter::new("atrim").arg(0).arg(format!("{duration:.3}")))
        .then(Filter::new("asetpts").arg("PTS-STARTPTS"))
        .then(
            Filter::new("aformat")
                .opt("sample_rates", target.audio_rate())
                .opt("channel_layouts", target.channel_layout()),
        );

    // The background is looped so cards longer than it still fill up
    let mut cmd = FFmpegCommand::new(output).looped_input(background);
    let graph = match &settings.logo {
        Some(logo) => {
            cmd = cmd.looped_image(logo, duration);
            let badge = FilterChain::new()
                .then(Filter::new("scale").arg(LOGO_SIZE).arg(LOGO_SIZE))
                .then(Filter::new("format").arg("rgba"))
                .extend(fades(duration, true));
            FilterGraph::new()
                .chain(&["0:v"], card, &["card"])
                .chain(&["1:v"], badge, &["logo"])
                .chain(
                    &["card", "logo"],
                    Filter::new("overlay")
                        .opt("x", format!("main_w-overlay_w-{LOGO_MARGIN}"))
                        .opt("y", LOGO_MARGIN)
                        .opt("shortest", 1),
                    &["v"],
                )
        }
        None => FilterGraph::new().chain(&["0:v"], card, &["v"]),
    };

    cmd.filter_complex(graph.chain(&["0:a"], audio, &["a"]))
        .map("[v]")
        .map("[a]")
        .video_codec(target.video_codec.as_deref().map(encoder_for).unwrap_or("libx264"))
        .audio_codec("aac")
        .duration(duration)
        .custom_args(&["-pix_fmt", "yuv420p"])
}

/// Make sure the solid background for `target`'s size exists in `workdir`.
pub fn ensure_background(
    engine: &dyn MediaEngine,
    workdir: &Path,
    target: &MediaInfo,
) -> Result<PathBuf> {
    let background = workdir.join(background_name(target.width, target.height));
    if background.exists() {
        return Ok(background);
    }
    log::info!("Creating title card background {}", background.display());
    engine.run(&background_command(target, &background))?;
    Ok(background)
}

/// Render a card showing `caption` for `duration` seconds at `target`'s
/// size. Returns the card's duration.
pub fn compose(
    engine: &dyn MediaEngine,
    settings: &Settings,
    workdir: &Path,
    target: &MediaInfo,
    caption: &Caption,
    duration: f64,
    output: &Path,
) -> Result<f64> {
    if settings.reuses(output) {
        log::info!("Reusing title card {}", output.display());
        return Ok(duration);
    }
    if let Some(logo) = &settings.logo
        && !logo.exists()
    {
        return Err(ReelError::config(format!(
            "logo {} does not exist",
            logo.display()
        )));
    }
    let (width, height) = target.dimensions();
    if width == 0 || height == 0 {
        return Err(ReelError::config(format!(
            "cannot size a title card for {}: no video stream",
            output.display()
        )));
    }

    let background = ensure_background(engine, workdir, target)?;
    log::info!("Composing title card {} ({duration}s)", output.display());
    engine.run(&card_command(
        &background,
        target,
        caption,
        duration,
        settings,
        output,
    ))?;
    Ok(duration)
}

/// Render the title card for a clip caption, timed from its word count.
pub fn compose_title_card(
    engine: &dyn MediaEngine,
    settings: &Settings,
    workdir: &Path,
    target: &MediaInfo,
    caption: &Caption,
    output: &Path,
) -> Result<f64> {
    compose(
        engine,
        settings,
        workdir,
        target,
        caption,
        caption.display_duration(),
        output,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeEngine, engine_options};

    fn target() -> MediaInfo {
        MediaInfo {
            duration: 5.0,
            width: 640,
            height: 360,
            fps: 25.0,
            video_codec: Some("h264".to_string()),
            audio_codec: Some("aac".to_string()),
            sample_rate: Some(44_100),
            channels: Some(2),
            has_audio: true,
        }
    }

    #[test]
    fn display_duration_is_clamped() {
        assert_eq!(Caption::new("a b c", None).display_duration(), 4.0);
        let thirty = vec!["word"; 30].join(" ");
        assert_eq!(Caption::new(&thirty, None).display_duration(), 8.0);
        let fifteen = vec!["word"; 15].join(" ");
        assert_eq!(Caption::new(&fifteen, None).display_duration(), 6.0);
        assert_eq!(
            Caption::new("one two three four five", Some("six seven eight nine ten eleven"))
                .display_duration(),
            4.0
        );
    }

    #[test]
    fn wraps_on_word_boundaries() {
        let lines = wrap(
            "Which player inspires you to become a better player?",
            WRAP_WIDTH,
        );
        assert_eq!(
            lines,
            vec!["Which player inspires you to", "become a better player?"]
        );
        assert!(lines.iter().all(|l| l.len() <= WRAP_WIDTH));
        assert_eq!(wrap("", WRAP_WIDTH), Vec::<String>::new());
    }

    #[test]
    fn layout_centres_question_and_answer_block() {
        let caption = Caption::new("Who inspires you?", Some("Ana, from Airbenders"));
        let layout = caption_layout(&caption, 360, None).to_string();
        // 3 rows (question, gap, answer) of 23px each around the middle
        assert!(layout.contains("fontcolor=FFFFFF:fontsize=18:text=Who inspires you?:x='(w-tw)/2':y=146"));
        assert!(layout.contains(r"fontcolor=FF7F00:fontsize=20:text=Ana\, from Airbenders:x='(w-tw)/2':y=192"));
        assert_eq!(layout.matches("drawtext").count(), 2);
    }

    #[test]
    fn font_sizes_scale_with_card_height() {
        let caption = Caption::new("Hello", None);
        let layout = caption_layout(&caption, 720, Some(Path::new("Ubuntu-R.ttf"))).to_string();
        assert!(layout.starts_with("drawtext=fontfile=Ubuntu-R.ttf:fontcolor=FFFFFF:fontsize=36:"));
    }

    #[test]
    fn colons_in_captions_reach_drawtext_intact() {
        let caption = Caption::new("Q: why?", None);
        let layout = caption_layout(&caption, 360, Some(Path::new("C:/fonts/a,b.ttf")));
        let options = engine_options(&layout.to_string());
        assert_eq!(options[0], ("fontfile".to_string(), "C:/fonts/a,b.ttf".to_string()));
        assert!(options.contains(&("text".to_string(), "Q: why?".to_string())));
        assert!(options.iter().all(|(key, _)| !key.is_empty()));
    }

    #[test]
    fn shared_background_is_converted_to_each_clip() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::new();
        let settings = Settings::default();
        let caption = Caption::new("a b c", None);
        let faster = MediaInfo {
            fps: 30.0,
            sample_rate: Some(48_000),
            channels: Some(1),
            ..target()
        };

        for (target, name) in [(target(), "intro-01.mp4"), (faster, "intro-02.mp4")] {
            let output = dir.path().join(name);
            compose(&engine, &settings, dir.path(), &target, &caption, 4.0, &output).unwrap();
        }

        assert_eq!(
            engine.outputs(),
            vec!["background-640x360.mp4", "intro-01.mp4", "intro-02.mp4"]
        );
        let second = engine.commands()[2].args().join(" ");
        assert!(second.contains("fps=30.000"));
        assert!(second.contains("aformat=sample_rates=48000:channel_layouts=mono"));
    }

    #[test]
    fn card_fades_end_at_display_duration() {
        let settings = Settings::default().logo("logo.png");
        let caption = Caption::new("a b c", None);
        let cmd = card_command(
            Path::new("background-640x360.mp4"),
            &target(),
            &caption,
            4.0,
            &settings,
            Path::new("intro.mp4"),
        );
        let args = cmd.args();
        let graph = &args[args.iter().position(|a| a == "-filter_complex").unwrap() + 1];
        assert!(graph.contains("fade=t=in:st=0.000:d=0.5,fade=t=out:st=3.500:d=0.5[card]"));
        assert!(graph.contains("fade=t=out:st=3.500:d=0.5:alpha=1[logo]"));
        assert!(graph.contains("[card][logo]overlay=x=main_w-overlay_w-10:y=10:shortest=1[v]"));
        assert!(graph.contains("[0:v]trim=0:4.000,setpts=PTS-STARTPTS,fps=25.000,drawtext="));
        assert!(graph.ends_with(
            "[0:a]atrim=0:4.000,asetpts=PTS-STARTPTS,aformat=sample_rates=44100:channel_layouts=stereo[a]"
        ));
        assert!(args.windows(2).any(|w| w == ["-t", "4.000"]));
    }

    #[test]
    fn background_is_cached_per_size() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::new();

        let first = ensure_background(&engine, dir.path(), &target()).unwrap();
        let second = ensure_background(&engine, dir.path(), &target()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.file_name().unwrap(), "background-640x360.mp4");
        assert_eq!(engine.commands().len(), 1);

        let args = engine.commands()[0].args();
        assert!(args.contains(&"color=c=black:s=640x360:r=25.000".to_string()));
        assert!(args.contains(&"anullsrc=r=44100:cl=stereo".to_string()));
    }

    #[test]
    fn compose_reuses_existing_card() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::new();
        let output = dir.path().join("intro-01-a.mp4");
        std::fs::write(&output, b"card").unwrap();

        let caption = Caption::new("a b c", None);
        let duration = compose_title_card(
            &engine,
            &Settings::default(),
            dir.path(),
            &target(),
            &caption,
            &output,
        )
        .unwrap();
        assert_eq!(duration, 4.0);
        assert!(engine.commands().is_empty());
    }

    #[test]
    fn missing_logo_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::new();
        let settings = Settings::default().logo(dir.path().join("absent.png"));
        let caption = Caption::new("a b c", None);
        let result = compose_title_card(
            &engine,
            &settings,
            dir.path(),
            &target(),
            &caption,
            &dir.path().join("intro.mp4"),
        );
        assert!(matches!(result, Err(ReelError::Config { .. })));
    }
}
