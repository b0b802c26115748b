//! Deterministic artifact names inside a project directory, and the run
//! stages they mark.
//!
//! Every per-clip artifact carries the clip index (and sub-index for
//! segments), so parallel workers never write the same path. Intermediates
//! with no natural index are named by a content key instead.

use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{Clip, Config, file_name};
use crate::error::{ReelError, Result};
use crate::platforms::Platform;

/// File names for one project directory
#[derive(Debug, Clone)]
pub struct Layout {
    dir: PathBuf,
    project: String,
}

impl Layout {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let project = dir
            .canonicalize()
            .ok()
            .as_deref()
            .map(file_name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "project".to_string());
        Self { dir, project }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn path(&self, name: impl AsRef<Path>) -> PathBuf {
        self.dir.join(name)
    }

    pub fn segment(&self, clip: usize, sub: usize, source_name: &str) -> PathBuf {
        self.path(format!("segment-{clip:02}-{sub:02}-{source_name}"))
    }

    /// Segments joined, replacements applied
    pub fn body(&self, clip: &Clip) -> PathBuf {
        self.path(format!("body-{:02}-{}", clip.index, clip.source_name()))
    }

    /// Segments joined, replacements still pending
    pub fn joined(&self, clip: &Clip) -> PathBuf {
        self.path(format!("joined-{:02}-{}", clip.index, clip.source_name()))
    }

    pub fn intro(&self, clip: &Clip) -> PathBuf {
        self.path(format!("intro-{:02}-{}", clip.index, clip.source_name()))
    }

    /// Finished clip: title card followed by the body
    pub fn part(&self, clip: &Clip) -> PathBuf {
        self.path(format!("part-{:02}-{}", clip.index, clip.source_name()))
    }

    pub fn cover(&self) -> PathBuf {
        self.path("cover.mp4")
    }

    pub fn credits(&self) -> PathBuf {
        self.path("credits.mp4")
    }

    pub fn combined(&self) -> PathBuf {
        self.path(format!("all-{}.mp4", self.project))
    }

    pub fn music_track(&self) -> PathBuf {
        self.path(format!("bgm-{}.m4a", self.project))
    }

    pub fn final_video(&self) -> PathBuf {
        self.path(format!("final-{}.mp4", self.project))
    }

    pub fn trailer_segment(&self, index: usize, source_name: &str) -> PathBuf {
        self.path(format!("trailer-{index:02}-{source_name}"))
    }

    pub fn trailer(&self) -> PathBuf {
        self.path(format!("trailer-{}.mp4", self.project))
    }

    pub fn variant(&self, platform: Platform) -> PathBuf {
        self.path(format!("{}-{}.mp4", platform.slug(), self.project))
    }

    pub fn chapters(&self) -> PathBuf {
        self.path(format!("chapters-{}.txt", self.project))
    }

    /// Name of the low-resolution stand-in for a source
    pub fn lowres_name(source_name: &str) -> String {
        format!("lowres-{source_name}")
    }
}

/// Short hex digest identifying an intermediate by what it is made from.
pub fn content_key<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref().as_bytes());
        hasher.update([0u8]);
    }
    let digest = format!("{:x}", hasher.finalize());
    digest[..12].to_string()
}

/// Where an output is written before being renamed into place. Keeps the
/// extension so the engine picks the same container.
pub fn staging_path(output: &Path) -> PathBuf {
    let name = format!(".partial-{}", file_name(output));
    output.with_file_name(name)
}

/// Fail with the exact set of missing files unless all of `paths` exist.
pub fn require(stage: &str, paths: &[PathBuf]) -> Result<()> {
    let missing: Vec<PathBuf> = paths.iter().filter(|p| !p.exists()).cloned().collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ReelError::Precondition {
            stage: stage.to_string(),
            missing,
        })
    }
}

/// States of a project run, in order. Each is reached once all of its
/// artifacts exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Configured,
    SegmentsExtracted,
    ReplacementsApplied,
    PerClipAssembled,
    AllConcatenated,
    MusicMixed,
    PlatformVariantsRendered,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Configured,
        Stage::SegmentsExtracted,
        Stage::ReplacementsApplied,
        Stage::PerClipAssembled,
        Stage::AllConcatenated,
        Stage::MusicMixed,
        Stage::PlatformVariantsRendered,
    ];

    /// Files whose presence marks this stage as complete
    pub fn artifacts(&self, layout: &Layout, config: &Config) -> Vec<PathBuf> {
        match self {
            Stage::Configured => Vec::new(),
            Stage::SegmentsExtracted => config
                .clips
                .iter()
                .flat_map(|clip| {
                    clip.segments
                        .iter()
                        .enumerate()
                        .map(|(sub, segment)| {
                            layout.segment(clip.index, sub, &segment.source_name())
                        })
                        .collect::<Vec<_>>()
                })
                .collect(),
            Stage::ReplacementsApplied => config.clips.iter().map(|c| layout.body(c)).collect(),
            Stage::PerClipAssembled => config.clips.iter().map(|c| layout.part(c)).collect(),
            Stage::AllConcatenated => vec![layout.combined()],
            Stage::MusicMixed => match config.bgm {
                Some(_) => vec![layout.final_video()],
                None => Vec::new(),
            },
            Stage::PlatformVariantsRendered => Platform::ALL
                .iter()
                .map(|p| layout.variant(*p))
                .collect(),
        }
    }

    /// The furthest stage whose artifacts, and those of every earlier
    /// stage, are all present
    pub fn reached(layout: &Layout, config: &Config) -> Stage {
        let mut reached = Stage::Configured;
        for stage in Stage::ALL {
            if stage.artifacts(layout, config).iter().all(|p| p.exists()) {
                reached = stage;
            } else {
                break;
            }
        }
        reached
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Configured => "configured",
            Stage::SegmentsExtracted => "segments extracted",
            Stage::ReplacementsApplied => "replacements applied",
            Stage::PerClipAssembled => "clips assembled",
            Stage::AllConcatenated => "all clips concatenated",
            Stage::MusicMixed => "music mixed",
            Stage::PlatformVariantsRendered => "platform variants rendered",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawConfig;

    fn config(dir: &Path) -> Config {
        let raw = RawConfig::from_yaml(
            "video: talk.mp4\nclips:\n  - timings: [\"0:00-0:05\", \"0:10-0:12\"]\n  - timings: [\"1:00-1:05\"]\n",
        )
        .unwrap();
        Config::normalize(&raw, dir, true).unwrap()
    }

    #[test]
    fn names_follow_clip_and_sub_index() {
        let layout = Layout::new("/tmp/interviews");
        let config = config(Path::new("/tmp/interviews"));
        let clip = &config.clips[1];
        assert_eq!(
            layout.segment(2, 1, "talk.mp4"),
            PathBuf::from("/tmp/interviews/segment-02-01-talk.mp4")
        );
        assert_eq!(layout.part(clip), PathBuf::from("/tmp/interviews/part-02-talk.mp4"));
        assert_eq!(layout.body(clip), PathBuf::from("/tmp/interviews/body-02-talk.mp4"));
        assert_eq!(Layout::lowres_name("talk.mp4"), "lowres-talk.mp4");
    }

    #[test]
    fn project_name_comes_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("nikki");
        std::fs::create_dir(&project).unwrap();
        let layout = Layout::new(&project);
        assert_eq!(layout.project(), "nikki");
        assert_eq!(layout.combined(), project.join("all-nikki.mp4"));
    }

    #[test]
    fn content_keys_are_stable_and_distinct() {
        let a = content_key(["part-01.mp4", "part-02.mp4"]);
        assert_eq!(a, content_key(["part-01.mp4", "part-02.mp4"]));
        assert_ne!(a, content_key(["part-01.mp4part-02.mp4"]));
        assert_eq!(a.len(), 12);
    }

    #[test]
    fn staging_keeps_extension() {
        assert_eq!(
            staging_path(Path::new("/p/all-x.mp4")),
            PathBuf::from("/p/.partial-all-x.mp4")
        );
    }

    #[test]
    fn require_names_exactly_the_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("part-01-a.mp4");
        std::fs::write(&present, b"x").unwrap();
        let absent = vec![dir.path().join("part-02-a.mp4"), dir.path().join("part-03-a.mp4")];
        let mut all = vec![present];
        all.extend(absent.iter().cloned());

        match require("combine clips", &all) {
            Err(ReelError::Precondition { stage, missing }) => {
                assert_eq!(stage, "combine clips");
                assert_eq!(missing, absent);
            }
            other => panic!("expected a precondition error, got {other:?}"),
        }
        assert!(require("combine clips", &all[..1]).is_ok());
    }

    #[test]
    fn stage_advances_with_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        let config = config(dir.path());
        assert_eq!(Stage::reached(&layout, &config), Stage::Configured);

        for path in Stage::SegmentsExtracted.artifacts(&layout, &config) {
            std::fs::write(path, b"x").unwrap();
        }
        assert_eq!(Stage::reached(&layout, &config), Stage::SegmentsExtracted);

        for stage in [Stage::ReplacementsApplied, Stage::PerClipAssembled, Stage::AllConcatenated] {
            for path in stage.artifacts(&layout, &config) {
                std::fs::write(path, b"x").unwrap();
            }
        }
        // no music configured, so the mixing stage has nothing to wait for
        assert_eq!(Stage::reached(&layout, &config), Stage::MusicMixed);
    }
}
