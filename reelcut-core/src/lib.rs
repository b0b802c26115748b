//! Reelcut Core - clip-timeline build pipeline for interview videos
//!
//! This library sequences invocations of the FFmpeg command-line tools to
//! turn a YAML project document into a finished video:
//! - Segment extraction with fast seeking, optional crop and audio filter
//! - Frame replacement over time windows
//! - Title cards sized to the clip, timed from the caption's word count
//! - Lossless concatenation of clips sharing codec parameters
//! - Background music ducked under speech, following the clip timeline
//! - Cover and credits slides, trailers, chapters and platform variants

pub mod concat;
pub mod config;
pub mod error;
pub mod ffmpeg_wrapper;
pub mod filters;
pub mod layout;
pub mod music;
pub mod pipeline;
pub mod platforms;
pub mod replace;
pub mod segment;
pub mod settings;
pub mod slides;
pub mod timecode;
pub mod timeline;
pub mod title_card;

#[cfg(test)]
mod test_support;

// Re-export commonly used types at the crate root
pub use config::{Config, RawConfig};
pub use error::{ReelError, Result};
pub use ffmpeg_wrapper::{FFmpegCommand, Ffmpeg, MediaEngine, MediaInfo, check_ffmpeg};
pub use layout::{Layout, Stage};
pub use pipeline::{IndexEntry, Project, StageStatus, make_lowres, scaffold};
pub use platforms::Platform;
pub use settings::{CachePolicy, ConcatStrategy, Settings};
pub use timeline::Timeline;
