//! The orchestrator: per-clip processing in a worker pool, then the
//! sequential whole-video stages.

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::concat::concat;
use crate::config::{Clip, Config, RawClip, RawConfig, RawTiming, file_name};
use crate::error::{ReelError, Result};
use crate::ffmpeg_wrapper::{FFmpegCommand, MediaEngine};
use crate::filters::Filter;
use crate::layout::{Layout, Stage, require};
use crate::music::{build_ducked_track, mix_into_video};
use crate::platforms::{Platform, render_variant};
use crate::replace::apply_replacements;
use crate::segment::extract;
use crate::settings::Settings;
use crate::slides::{render_cover, render_credits};
use crate::timeline::Timeline;
use crate::title_card::compose_title_card;

/// File extensions picked up when scaffolding a project
pub const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "mov", "mkv", "m4v", "avi", "webm"];

/// Lines of the low-resolution stand-ins
const LOWRES_HEIGHT: u32 = 360;

/// One row of the duration index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub clip_index: usize,
    pub name: String,
    pub start: f64,
    pub duration: f64,
}

/// Progress of one stage
#[derive(Debug, Clone, PartialEq)]
pub struct StageStatus {
    pub stage: Stage,
    pub present: usize,
    pub missing: Vec<PathBuf>,
}

impl StageStatus {
    pub fn complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// A loaded project: its directory layout, normalised document and the
/// engine that does the media work.
pub struct Project<'a> {
    engine: &'a dyn MediaEngine,
    settings: &'a Settings,
    layout: Layout,
    config: Config,
}

impl<'a> Project<'a> {
    pub fn new(
        engine: &'a dyn MediaEngine,
        settings: &'a Settings,
        layout: Layout,
        config: Config,
    ) -> Self {
        Self {
            engine,
            settings,
            layout,
            config,
        }
    }

    /// Load the document at `config_path` for the project in `dir`.
    pub fn open(
        engine: &'a dyn MediaEngine,
        settings: &'a Settings,
        dir: &Path,
        config_path: &Path,
    ) -> Result<Self> {
        let config = Config::from_file(config_path, dir, settings.use_originals)?;
        log::info!(
            "Loaded {} clips from {}",
            config.clips.len(),
            config_path.display()
        );
        Ok(Self::new(engine, settings, Layout::new(dir), config))
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build one clip's part: extract its segments, join them into the
    /// body, apply replacements, then prepend the title card.
    pub fn process_clip(&self, clip: &Clip) -> Result<PathBuf> {
        let part = self.layout.part(clip);
        if self.settings.reuses(&part) {
            log::info!("Reusing clip {} ({})", clip.index, part.display());
            return Ok(part);
        }

        log::info!(
            "Processing clip {} ({} segments, {:.1}s)",
            clip.index,
            clip.segments.len(),
            clip.nominal_duration()
        );
        let body = self.layout.body(clip);
        if self.settings.reuses(&body) {
            log::info!("Reusing body {}", body.display());
        } else {
            let segments = clip
                .segments
                .iter()
                .enumerate()
                .map(|(sub, segment)| {
                    let output = self
                        .layout
                        .segment(clip.index, sub, &segment.source_name());
                    extract(self.engine, self.settings, segment, &output)
                })
                .collect::<Result<Vec<_>>>()?;
            // The body only appears once every replacement has landed, so a
            // rerun never reuses an unredacted join
            let joined = self.layout.joined(clip);
            concat(self.engine, self.settings, &joined, &segments)?;
            apply_replacements(self.engine, &joined, &clip.replacements)?;
            std::fs::rename(&joined, &body)?;
        }

        let mut pieces = Vec::with_capacity(2);
        if let Some(caption) = &clip.caption {
            let target = self.engine.probe(&body)?;
            let intro = self.layout.intro(clip);
            compose_title_card(
                self.engine,
                self.settings,
                self.layout.dir(),
                &target,
                caption,
                &intro,
            )?;
            pieces.push(intro);
        }
        pieces.push(body);
        concat(self.engine, self.settings, &part, &pieces)?;

        log::info!("Clip {} ready: {}", clip.index, part.display());
        Ok(part)
    }

    /// Process every clip, or only clip `only`, across the worker pool.
    ///
    /// A failing clip does not stop its siblings; once all have finished,
    /// any failure fails the whole batch.
    pub fn process(&self, only: Option<usize>) -> Result<Vec<PathBuf>> {
        let clips: Vec<&Clip> = match only {
            Some(index) => vec![self.config.clip(index).ok_or_else(|| {
                ReelError::config(format!(
                    "there is no clip {index}; the project has {}",
                    self.config.clips.len()
                ))
            })?],
            None => self.config.clips.iter().collect(),
        };

        let workers = self.settings.worker_count().min(clips.len()).max(1);
        log::info!("Processing {} clips with {workers} workers", clips.len());
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| ReelError::config(format!("cannot start the worker pool: {e}")))?;

        let pb = ProgressBar::new(clips.len() as u64);
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} clips")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        let results: Vec<(usize, Result<PathBuf>)> = pool.install(|| {
            clips
                .par_iter()
                .map(|clip| {
                    let result = self.process_clip(clip);
                    pb.inc(1);
                    (clip.index, result)
                })
                .collect()
        });

        let total = results.len();
        let mut parts = Vec::with_capacity(total);
        let mut failed = Vec::new();
        let mut first = None;
        for (index, result) in results {
            match result {
                Ok(part) => parts.push(part),
                Err(e) => {
                    log::error!("Clip {index} failed: {e}");
                    failed.push(index);
                    first.get_or_insert(e);
                }
            }
        }

        match first {
            None => {
                pb.finish();
                Ok(parts)
            }
            Some(first) => {
                pb.abandon();
                Err(ReelError::Batch {
                    failed,
                    total,
                    first: Box::new(first),
                })
            }
        }
    }

    fn parts(&self) -> Vec<PathBuf> {
        self.config.clips.iter().map(|c| self.layout.part(c)).collect()
    }

    /// Join cover, every part and credits into the combined video.
    pub fn combine(&self) -> Result<PathBuf> {
        let parts = self.parts();
        require("combine clips", &parts)?;
        let target = self.engine.probe(&parts[0])?;

        let mut inputs = Vec::with_capacity(parts.len() + 2);
        if let Some(cover) = &self.config.cover {
            inputs.push(render_cover(
                self.engine,
                self.settings,
                cover,
                &target,
                &self.layout.cover(),
            )?);
        }
        inputs.extend(parts);
        if let Some(credits) = &self.config.credits {
            inputs.push(render_credits(
                self.engine,
                self.settings,
                credits,
                &target,
                &self.layout.credits(),
            )?);
        }

        let combined = self.layout.combined();
        concat(self.engine, self.settings, &combined, &inputs)?;
        log::info!("Combined video written to {}", combined.display());
        Ok(combined)
    }

    /// Cumulative clip boundaries of the combined video
    pub fn timeline(&self) -> Result<Timeline> {
        Timeline::measure(self.engine, &self.layout, &self.config)
    }

    /// Duck the configured music under the combined video.
    pub fn add_music(&self) -> Result<PathBuf> {
        let music = self
            .config
            .bgm
            .as_ref()
            .ok_or_else(|| ReelError::config("the document has no bgm section"))?;
        let combined = self.layout.combined();
        require("add music", std::slice::from_ref(&combined))?;

        let timeline = self.timeline()?;
        let track = build_ducked_track(self.engine, music, &timeline, &self.layout.music_track())?;
        let output = mix_into_video(self.engine, &combined, &track, &self.layout.final_video())?;
        log::info!("Final video written to {}", output.display());
        Ok(output)
    }

    /// Cut and join the trailer segments.
    pub fn trailer(&self) -> Result<PathBuf> {
        if self.config.trailer.is_empty() {
            return Err(ReelError::config("the document lists no trailer segments"));
        }
        let segments = self
            .config
            .trailer
            .iter()
            .enumerate()
            .map(|(i, segment)| {
                let output = self
                    .layout
                    .trailer_segment(i + 1, &segment.source_name());
                extract(self.engine, self.settings, segment, &output)
            })
            .collect::<Result<Vec<_>>>()?;

        let trailer = self.layout.trailer();
        concat(self.engine, self.settings, &trailer, &segments)?;
        Ok(trailer)
    }

    /// Write chapter markers for the combined video.
    pub fn chapters(&self) -> Result<(PathBuf, String)> {
        let text = self.timeline()?.chapter_text();
        let path = self.layout.chapters();
        std::fs::write(&path, &text)?;
        Ok((path, text))
    }

    /// Duration and cumulative start of every part.
    pub fn index(&self) -> Result<(Vec<IndexEntry>, f64)> {
        let timeline = self.timeline()?;
        let entries = timeline
            .entries
            .iter()
            .zip(&self.config.clips)
            .map(|(entry, clip)| IndexEntry {
                clip_index: entry.clip_index,
                name: file_name(&self.layout.part(clip)),
                start: entry.start,
                duration: entry.end - entry.start,
            })
            .collect();
        Ok((entries, timeline.total()))
    }

    /// Render platform variants of the finished video.
    pub fn variants(&self, platforms: &[Platform]) -> Result<Vec<PathBuf>> {
        let source = match self.config.bgm {
            Some(_) => self.layout.final_video(),
            None => self.layout.combined(),
        };
        require("render platform variants", std::slice::from_ref(&source))?;

        platforms
            .iter()
            .map(|platform| {
                render_variant(
                    self.engine,
                    *platform,
                    &source,
                    &self.layout.variant(*platform),
                )
            })
            .collect()
    }

    /// Which artifacts of every stage exist.
    pub fn status(&self) -> Vec<StageStatus> {
        Stage::ALL
            .iter()
            .map(|stage| {
                let artifacts = stage.artifacts(&self.layout, &self.config);
                let (present, missing): (Vec<_>, Vec<_>) =
                    artifacts.into_iter().partition(|p| p.exists());
                StageStatus {
                    stage: *stage,
                    present: present.len(),
                    missing,
                }
            })
            .collect()
    }

    /// The furthest stage reached
    pub fn stage(&self) -> Stage {
        Stage::reached(&self.layout, &self.config)
    }
}

/// Transcode one source to a small, fast-to-seek stand-in
pub fn lowres_command(input: &Path, output: &Path) -> FFmpegCommand {
    FFmpegCommand::new(output)
        .input(input)
        .video_filter(Filter::new("scale").arg(-2).arg(LOWRES_HEIGHT))
        .video_codec("libx264")
        .quality(28)
        .preset("veryfast")
        .audio_codec("aac")
        .custom_args(&["-pix_fmt", "yuv420p"])
}

/// Make low-resolution stand-ins for every source the document names,
/// record them under `alt_low_res` and save the document.
pub fn make_lowres(
    engine: &dyn MediaEngine,
    settings: &Settings,
    layout: &Layout,
    raw: &mut RawConfig,
    config_path: &Path,
) -> Result<Vec<PathBuf>> {
    let stand_ins: Vec<&String> = raw.alt_low_res.values().collect();
    let sources: Vec<String> = raw
        .sources()
        .into_iter()
        .filter(|source| !stand_ins.contains(&source))
        .collect();

    let mut outputs = Vec::with_capacity(sources.len());
    for source in sources {
        let input = layout.path(&source);
        require("make low-resolution copies", std::slice::from_ref(&input))?;
        let name = Layout::lowres_name(&file_name(&input));
        let output = layout.path(&name);

        if settings.reuses(&output) {
            log::info!("Reusing {}", output.display());
        } else {
            let info = engine.probe(&input)?;
            engine.run_tracked(&lowres_command(&input, &output), &name, info.duration)?;
        }
        raw.alt_low_res.insert(source, name);
        outputs.push(output);
    }

    raw.save(config_path)?;
    Ok(outputs)
}

/// Write a starter `config.yaml` for a folder of raw videos: one clip per
/// video, covering all of it.
pub fn scaffold(engine: &dyn MediaEngine, dir: &Path) -> Result<PathBuf> {
    let config_path = dir.join("config.yaml");
    if config_path.exists() {
        return Err(ReelError::config(format!(
            "{} already exists; refusing to overwrite it",
            config_path.display()
        )));
    }

    let mut clips = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(std::io::Error::from)?;
        let path = entry.path();
        let is_video = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false);
        let name = file_name(path);
        if !entry.file_type().is_file() || !is_video || name.starts_with('.') {
            continue;
        }

        let duration = engine.probe(path)?.duration;
        log::info!("Found {name} ({duration:.1}s)");
        clips.push(RawClip {
            timings: vec![RawTiming::Range(format!("0-{duration:.3}"))],
            video: Some(name),
            ..RawClip::default()
        });
    }

    if clips.is_empty() {
        return Err(ReelError::config(format!(
            "no videos found in {}",
            dir.display()
        )));
    }

    let raw = RawConfig {
        clips,
        ..RawConfig::default()
    };
    raw.save(&config_path)?;
    Ok(config_path)
}
