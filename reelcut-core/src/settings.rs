use clap::ValueEnum;
use std::path::{Path, PathBuf};

/// Whether intermediate artifacts that already exist are reused.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum CachePolicy {
    /// Skip any stage whose output file is already present
    #[default]
    Reuse,
    /// Rebuild every artifact
    Recompute,
}

/// How the concatenator joins clips.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ConcatStrategy {
    /// Remux each input to MPEG-TS with Annex B bitstreams, then join with
    /// the `concat:` protocol
    #[default]
    AnnexB,
    /// Stream copy through the concat demuxer and a list file
    ListFile,
}

/// Tool and pipeline settings, built once at startup and passed to every
/// operation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    /// Value for the engine's `-loglevel`
    pub loglevel: String,
    /// Badge drawn in the top-right corner of title cards
    pub logo: Option<PathBuf>,
    /// Font for title card text; the engine default is used when unset
    pub font: Option<PathBuf>,
    pub cache: CachePolicy,
    pub concat: ConcatStrategy,
    /// Worker count for per-clip processing; cores - 1 when unset
    pub jobs: Option<usize>,
    /// Use the configured sources even when a low-resolution stand-in exists
    pub use_originals: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            loglevel: "error".to_string(),
            logo: None,
            font: None,
            cache: CachePolicy::Reuse,
            concat: ConcatStrategy::AnnexB,
            jobs: None,
            use_originals: false,
        }
    }
}

impl Settings {
    pub fn ffmpeg(mut self, program: impl AsRef<Path>) -> Self {
        self.ffmpeg = program.as_ref().to_path_buf();
        self
    }

    pub fn ffprobe(mut self, program: impl AsRef<Path>) -> Self {
        self.ffprobe = program.as_ref().to_path_buf();
        self
    }

    pub fn logo(mut self, logo: impl AsRef<Path>) -> Self {
        self.logo = Some(logo.as_ref().to_path_buf());
        self
    }

    pub fn font(mut self, font: impl AsRef<Path>) -> Self {
        self.font = Some(font.as_ref().to_path_buf());
        self
    }

    pub fn cache(mut self, policy: CachePolicy) -> Self {
        self.cache = policy;
        self
    }

    pub fn concat(mut self, strategy: ConcatStrategy) -> Self {
        self.concat = strategy;
        self
    }

    pub fn jobs(mut self, count: usize) -> Self {
        self.jobs = Some(count);
        self
    }

    pub fn use_originals(mut self, enabled: bool) -> Self {
        self.use_originals = enabled;
        self
    }

    /// Size of the per-clip worker pool: one less than the core count, never zero.
    pub fn worker_count(&self) -> usize {
        self.jobs
            .unwrap_or_else(|| num_cpus::get().saturating_sub(1))
            .max(1)
    }

    /// True when `path` exists and the cache policy allows reusing it.
    pub fn reuses(&self, path: &Path) -> bool {
        self.cache == CachePolicy::Reuse && path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_jobs_override_core_count() {
        assert_eq!(Settings::default().jobs(3).worker_count(), 3);
        assert_eq!(Settings::default().jobs(0).worker_count(), 1);
        assert!(Settings::default().worker_count() >= 1);
    }

    #[test]
    fn recompute_never_reuses() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("segment.mp4");
        std::fs::write(&file, b"x").unwrap();

        assert!(Settings::default().reuses(&file));
        assert!(!Settings::default().cache(CachePolicy::Recompute).reuses(&file));
        assert!(!Settings::default().reuses(&dir.path().join("absent.mp4")));
    }
}
