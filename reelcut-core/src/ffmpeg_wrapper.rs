use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use serde::Deserialize;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use std::thread;

use crate::error::{ReelError, Result};
use crate::filters::{FilterChain, FilterGraph};
use crate::settings::Settings;
use crate::timecode::secs;

static PROGRESS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^out_time_us=(\d+)$").expect("progress pattern is valid"));
static PROGRESS_KEY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_0-9]+=\S*$").expect("progress key pattern is valid"));

/// Lines of stderr kept for error reports
const STDERR_TAIL: usize = 20;

#[derive(Debug, Clone, PartialEq)]
struct Input {
    options: Vec<String>,
    source: String,
}

/// FFmpeg command builder with fluent interface
#[derive(Debug, Clone, PartialEq)]
pub struct FFmpegCommand {
    inputs: Vec<Input>,
    output: PathBuf,
    video_filter: Option<FilterChain>,
    audio_filter: Option<FilterChain>,
    filter_complex: Option<FilterGraph>,
    maps: Vec<String>,
    video_codec: Option<String>,
    audio_codec: Option<String>,
    quality: Option<u8>,
    preset: Option<String>,
    duration: Option<f64>,
    frames: Option<u32>,
    format: Option<String>,
    bitstream_filters: Vec<(String, String)>,
    extra_args: Vec<String>,
}

impl FFmpegCommand {
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output: output.as_ref().to_path_buf(),
            video_filter: None,
            audio_filter: None,
            filter_complex: None,
            maps: Vec::new(),
            video_codec: None,
            audio_codec: None,
            quality: None,
            preset: None,
            duration: None,
            frames: None,
            format: None,
            bitstream_filters: Vec::new(),
            extra_args: Vec::new(),
        }
    }

    /// Add an input file
    pub fn input(self, path: impl AsRef<Path>) -> Self {
        let source = path.as_ref().display().to_string();
        self.raw_input(Vec::new(), source)
    }

    /// Add an input with the seek applied before it is opened
    pub fn seek_input(self, start: f64, path: impl AsRef<Path>) -> Self {
        let source = path.as_ref().display().to_string();
        self.raw_input(vec!["-ss".to_string(), secs(start)], source)
    }

    /// Add a still image input repeated for `duration` seconds
    pub fn looped_image(self, path: impl AsRef<Path>, duration: f64) -> Self {
        let source = path.as_ref().display().to_string();
        let options = vec![
            "-loop".to_string(),
            "1".to_string(),
            "-t".to_string(),
            secs(duration),
        ];
        self.raw_input(options, source)
    }

    /// Add an input repeated indefinitely
    pub fn looped_input(self, path: impl AsRef<Path>) -> Self {
        let source = path.as_ref().display().to_string();
        self.raw_input(vec!["-stream_loop".to_string(), "-1".to_string()], source)
    }

    /// Add a generated source from the lavfi device
    pub fn lavfi(self, graph: impl ToString) -> Self {
        self.raw_input(vec!["-f".to_string(), "lavfi".to_string()], graph.to_string())
    }

    /// Add an input with explicit options
    pub fn raw_input(mut self, options: Vec<String>, source: String) -> Self {
        self.inputs.push(Input { options, source });
        self
    }

    /// Set the simple video filter chain (`-vf`)
    pub fn video_filter(mut self, chain: impl Into<FilterChain>) -> Self {
        self.video_filter = Some(chain.into());
        self
    }

    /// Set the simple audio filter chain (`-af`)
    pub fn audio_filter(mut self, chain: impl Into<FilterChain>) -> Self {
        self.audio_filter = Some(chain.into());
        self
    }

    /// Set the complex filter graph
    pub fn filter_complex(mut self, graph: FilterGraph) -> Self {
        self.filter_complex = Some(graph);
        self
    }

    /// Map a stream specifier or graph label (`[v]`) to the output
    pub fn map(mut self, stream: &str) -> Self {
        self.maps.push(stream.to_string());
        self
    }

    /// Set video codec
    pub fn video_codec(mut self, codec: &str) -> Self {
        self.video_codec = Some(codec.to_string());
        self
    }

    /// Set audio codec
    pub fn audio_codec(mut self, codec: &str) -> Self {
        self.audio_codec = Some(codec.to_string());
        self
    }

    /// Stream copy both video and audio
    pub fn copy_codecs(self) -> Self {
        self.video_codec("copy").audio_codec("copy")
    }

    /// Set quality (CRF value, 0-51 for x264/x265)
    pub fn quality(mut self, crf: u8) -> Self {
        self.quality = Some(crf);
        self
    }

    /// Set encoding preset (ultrafast, fast, medium, slow, veryslow)
    pub fn preset(mut self, preset: &str) -> Self {
        self.preset = Some(preset.to_string());
        self
    }

    /// Limit the output duration (`-t`)
    pub fn duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }

    /// Limit the number of video frames written
    pub fn frames(mut self, count: u32) -> Self {
        self.frames = Some(count);
        self
    }

    /// Force the output container format
    pub fn format(mut self, format: &str) -> Self {
        self.format = Some(format.to_string());
        self
    }

    /// Add a bitstream filter for a stream type (`v` or `a`)
    pub fn bitstream_filter(mut self, stream: &str, filter: &str) -> Self {
        self.bitstream_filters
            .push((stream.to_string(), filter.to_string()));
        self
    }

    /// Add custom FFmpeg arguments
    pub fn custom_args(mut self, args: &[&str]) -> Self {
        self.extra_args.extend(args.iter().map(|a| a.to_string()));
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Arguments after the global options, ending with the output path
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::new();

        for input in &self.inputs {
            args.extend(input.options.iter().cloned());
            args.push("-i".to_string());
            args.push(input.source.clone());
        }

        if let Some(ref chain) = self.video_filter {
            args.push("-vf".to_string());
            args.push(chain.to_string());
        }

        if let Some(ref chain) = self.audio_filter {
            args.push("-af".to_string());
            args.push(chain.to_string());
        }

        if let Some(ref graph) = self.filter_complex {
            args.push("-filter_complex".to_string());
            args.push(graph.to_string());
        }

        for map in &self.maps {
            args.push("-map".to_string());
            args.push(map.clone());
        }

        if let Some(ref codec) = self.video_codec {
            args.push("-c:v".to_string());
            args.push(codec.clone());
        }

        if let Some(ref codec) = self.audio_codec {
            args.push("-c:a".to_string());
            args.push(codec.clone());
        }

        if let Some(crf) = self.quality {
            args.push("-crf".to_string());
            args.push(crf.to_string());
        }

        if let Some(ref preset) = self.preset {
            args.push("-preset".to_string());
            args.push(preset.clone());
        }

        if let Some(duration) = self.duration {
            args.push("-t".to_string());
            args.push(secs(duration));
        }

        if let Some(frames) = self.frames {
            args.push("-frames:v".to_string());
            args.push(frames.to_string());
        }

        for (stream, filter) in &self.bitstream_filters {
            args.push(format!("-bsf:{stream}"));
            args.push(filter.clone());
        }

        args.extend(self.extra_args.iter().cloned());

        if let Some(ref format) = self.format {
            args.push("-f".to_string());
            args.push(format.clone());
        }

        args.push(self.output.display().to_string());
        args
    }

    /// Build the FFmpeg command
    pub fn build(&self, program: &Path, loglevel: &str) -> Command {
        let mut cmd = Command::new(program);
        cmd.args([
            "-hide_banner",
            "-nostdin",
            "-y",
            "-loglevel",
            loglevel,
            "-nostats",
            "-progress",
            "pipe:2",
        ]);
        cmd.args(self.args());
        cmd
    }

    /// Execute the command, reporting progress in seconds of output written
    pub fn execute<F>(&self, program: &Path, loglevel: &str, progress_callback: F) -> Result<()>
    where
        F: Fn(f64) + Send + 'static,
    {
        let mut cmd = self.build(program, loglevel);
        cmd.stdout(Stdio::null()).stderr(Stdio::piped());

        log::debug!("Executing FFmpeg command: {:?}", cmd);

        let mut child = cmd.spawn()?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("Failed to capture stderr"))?;

        // Progress reports arrive as key=value lines; everything else is a
        // diagnostic worth keeping for the error report
        let reader_thread = thread::spawn(move || {
            let reader = BufReader::new(stderr);
            let mut diagnostics = Vec::new();

            for line in reader.lines().map_while(std::result::Result::ok) {
                if let Some(caps) = PROGRESS_REGEX.captures(&line) {
                    if let Ok(micros) = caps[1].parse::<u64>() {
                        progress_callback(micros as f64 / 1_000_000.0);
                    }
                } else if !PROGRESS_KEY_REGEX.is_match(&line) {
                    diagnostics.push(line);
                }
            }
            diagnostics
        });

        let status = child.wait()?;
        let diagnostics = reader_thread.join().unwrap_or_default();

        if !status.success() {
            let tail = diagnostics.len().saturating_sub(STDERR_TAIL);
            let stderr = diagnostics[tail..].join("\n");
            log::error!("FFmpeg failed with output:\n{}", stderr);
            return Err(ReelError::ExternalTool {
                program: program.display().to_string(),
                args: self.args(),
                code: status.code(),
                stderr,
            });
        }

        Ok(())
    }
}

/// Stream metadata read by the probing tool
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    pub has_audio: bool,
}

impl MediaInfo {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Frame rate for generated video, 30 when the probe found none
    pub fn frame_rate(&self) -> f64 {
        if self.fps > 0.0 { self.fps } else { 30.0 }
    }

    /// Sample rate for generated audio, 48 kHz when the probe found none
    pub fn audio_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(48_000)
    }

    /// Channel layout for generated audio, stereo unless the probe says otherwise
    pub fn channel_layout(&self) -> String {
        match self.channels {
            Some(1) => "mono".to_string(),
            Some(2) | None => "stereo".to_string(),
            Some(n) => format!("{n}c"),
        }
    }

    /// Codec parameters that must agree for a stream-copy join
    pub fn stream_signature(&self) -> String {
        format!(
            "video {} {}x{} {:.3}fps, audio {} {}Hz {}ch",
            self.video_codec.as_deref().unwrap_or("none"),
            self.width,
            self.height,
            self.fps,
            self.audio_codec.as_deref().unwrap_or("none"),
            self.sample_rate.unwrap_or(0),
            self.channels.unwrap_or(0)
        )
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output
pub fn parse_probe(json: &str) -> Result<MediaInfo> {
    let probe: ProbeOutput = serde_json::from_str(json)?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let audio = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));

    let duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or_else(|| video.and_then(|v| v.duration.as_deref()))
        .and_then(|d| d.parse().ok())
        .unwrap_or(0.0);

    let fps = video
        .and_then(|v| v.r_frame_rate.as_deref())
        .and_then(|rate| {
            let (num, den) = rate.split_once('/')?;
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            (den != 0.0).then(|| num / den)
        })
        .unwrap_or(0.0);

    Ok(MediaInfo {
        duration,
        width: video.and_then(|v| v.width).unwrap_or(0),
        height: video.and_then(|v| v.height).unwrap_or(0),
        fps,
        video_codec: video.and_then(|v| v.codec_name.clone()),
        audio_codec: audio.and_then(|a| a.codec_name.clone()),
        sample_rate: audio
            .and_then(|a| a.sample_rate.as_deref())
            .and_then(|r| r.parse().ok()),
        channels: audio.and_then(|a| a.channels),
        has_audio: audio.is_some(),
    })
}

/// The boundary to the external media engine. Every pipeline stage goes
/// through this trait so runs can be observed without the real tools.
pub trait MediaEngine: Sync {
    /// Run one invocation to completion
    fn run(&self, cmd: &FFmpegCommand) -> Result<()>;

    /// Read stream metadata from a file
    fn probe(&self, path: &Path) -> Result<MediaInfo>;

    /// Run a long invocation with a progress display
    fn run_tracked(&self, cmd: &FFmpegCommand, _label: &str, _expected: f64) -> Result<()> {
        self.run(cmd)
    }
}

/// Engine backed by the `ffmpeg` and `ffprobe` programs
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    loglevel: String,
}

impl Ffmpeg {
    pub fn new(settings: &Settings) -> Self {
        Self {
            ffmpeg: settings.ffmpeg.clone(),
            ffprobe: settings.ffprobe.clone(),
            loglevel: settings.loglevel.clone(),
        }
    }
}

impl MediaEngine for Ffmpeg {
    fn run(&self, cmd: &FFmpegCommand) -> Result<()> {
        cmd.execute(&self.ffmpeg, &self.loglevel, |_| {})
    }

    fn probe(&self, path: &Path) -> Result<MediaInfo> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_format".to_string(),
            "-show_streams".to_string(),
            path.display().to_string(),
        ];
        let output = Command::new(&self.ffprobe).args(&args).output()?;

        if !output.status.success() {
            return Err(ReelError::ExternalTool {
                program: self.ffprobe.display().to_string(),
                args,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        parse_probe(&String::from_utf8_lossy(&output.stdout))
    }

    fn run_tracked(&self, cmd: &FFmpegCommand, label: &str, expected: f64) -> Result<()> {
        let pb = ProgressBar::new(100);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
        );
        pb.set_message(label.to_string());

        let pb_clone = pb.clone();
        let result = cmd.execute(&self.ffmpeg, &self.loglevel, move |written| {
            if expected > 0.0 {
                let percent = (written / expected * 100.0).min(100.0);
                pb_clone.set_position(percent as u64);
            }
        });

        match result {
            Ok(()) => pb.finish_with_message(format!("{label} done")),
            Err(_) => pb.abandon_with_message(format!("{label} failed")),
        }
        result
    }
}

/// Check if FFmpeg is available and return version info
pub fn check_ffmpeg(settings: &Settings) -> Result<String> {
    let output = Command::new(&settings.ffmpeg).arg("-version").output()?;

    let version = String::from_utf8_lossy(&output.stdout);

    let version_regex = Regex::new(r"ffmpeg version (\S+)").expect("version pattern is valid");
    if let Some(caps) = version_regex.captures(&version) {
        Ok(caps[1].to_string())
    } else {
        Ok("unknown".to_string())
    }
}
