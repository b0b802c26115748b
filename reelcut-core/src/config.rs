//! Project document schema and the normalising pass that turns it into a
//! fully resolved [`Config`].
//!
//! The YAML document is read into the raw structs first. [`Config::normalize`]
//! then resolves every segment's source and crop (segment > clip > document
//! default), substitutes low-resolution stand-ins, converts timestamps to
//! seconds and checks the invariants the pipeline relies on. After a
//! successful normalisation no segment has an unresolved field.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{ReelError, Result};
use crate::timecode;
use crate::title_card::Caption;

/// The project document as written by the user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<String>,
    #[serde(default)]
    pub clips: Vec<RawClip>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trailer: Vec<RawSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<RawCover>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credits: Option<RawCredits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bgm: Option<RawBackgroundMusic>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub alt_low_res: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_threshold: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawClip {
    pub timings: Vec<RawTiming>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replacements: Vec<RawReplacement>,
}

/// A timing is either a bare `start-end` string or a segment with its own
/// source and crop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTiming {
    Range(String),
    Segment(RawSegment),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSegment {
    pub range: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawReplacement {
    pub time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub frame: FrameAt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCover {
    pub image: String,
    pub time: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCredits {
    pub time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBackgroundMusic {
    pub audio: String,
    #[serde(default = "default_fg_volume")]
    pub fg_volume: f64,
    #[serde(default = "default_bg_volume")]
    pub bg_volume: f64,
}

fn default_fg_volume() -> f64 {
    0.8
}

fn default_bg_volume() -> f64 {
    0.1
}

impl RawConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReelError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Every distinct source the document refers to, in first-use order.
    pub fn sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = Vec::new();
        let mut push = |source: &Option<String>| {
            if let Some(source) = source
                && !sources.contains(source)
            {
                sources.push(source.clone());
            }
        };

        push(&self.video);
        for clip in &self.clips {
            push(&clip.video);
            for timing in &clip.timings {
                if let RawTiming::Segment(segment) = timing {
                    push(&segment.video);
                }
            }
        }
        for segment in &self.trailer {
            push(&segment.video);
        }
        sources
    }
}

/// Crop rectangle in the engine's `w:h[:x:y]` form. Without an offset the
/// engine centres the rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crop {
    pub width: u32,
    pub height: u32,
    pub offset: Option<(u32, u32)>,
}

impl FromStr for Crop {
    type Err = ReelError;

    fn from_str(s: &str) -> Result<Self> {
        let fields: Vec<u32> = s
            .trim()
            .split(':')
            .map(|f| f.trim().parse::<u32>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| ReelError::config(format!("crop {s:?} is not w:h[:x:y]")))?;

        match fields[..] {
            [width, height] => Ok(Crop {
                width,
                height,
                offset: None,
            }),
            [width, height, x, y] => Ok(Crop {
                width,
                height,
                offset: Some((x, y)),
            }),
            _ => Err(ReelError::config(format!("crop {s:?} is not w:h[:x:y]"))),
        }
    }
}

impl fmt::Display for Crop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)?;
        if let Some((x, y)) = self.offset {
            write!(f, ":{x}:{y}")?;
        }
        Ok(())
    }
}

/// A time-bounded cut of one source video.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub source: PathBuf,
    pub start: f64,
    pub end: f64,
    pub crop: Option<Crop>,
    pub audio_filter: Option<String>,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn source_name(&self) -> String {
        file_name(&self.source)
    }
}

/// Which boundary of a replacement window supplies the still frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameAt {
    #[default]
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplacementImage {
    File(PathBuf),
    Frame(FrameAt),
}

/// A window of the clip body to cover with a still image.
#[derive(Debug, Clone, PartialEq)]
pub struct Replacement {
    pub start: f64,
    pub end: f64,
    pub image: ReplacementImage,
}

/// One interview answer: its segments in order, an optional caption shown
/// on a title card before it, and replacement windows over the joined body.
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    /// 1-based position in the document
    pub index: usize,
    pub segments: Vec<Segment>,
    pub caption: Option<Caption>,
    pub replacements: Vec<Replacement>,
}

impl Clip {
    /// Source of the first segment; clip artifacts are named after it.
    pub fn source(&self) -> &Path {
        &self.segments[0].source
    }

    pub fn source_name(&self) -> String {
        self.segments[0].source_name()
    }

    /// Body length from segment arithmetic. The timeline uses probed
    /// durations instead; this is only for validation.
    pub fn nominal_duration(&self) -> f64 {
        self.segments.iter().map(Segment::duration).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cover {
    pub image: PathBuf,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreditsContent {
    Image(PathBuf),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Credits {
    pub duration: f64,
    pub content: CreditsContent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundMusic {
    pub audio: PathBuf,
    /// Volume while no one is speaking (cover, title cards, credits)
    pub fg_volume: f64,
    /// Volume under the clip bodies
    pub bg_volume: f64,
}

/// A normalised project.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub clips: Vec<Clip>,
    pub trailer: Vec<Segment>,
    pub cover: Option<Cover>,
    pub credits: Option<Credits>,
    pub bgm: Option<BackgroundMusic>,
}

impl Config {
    /// Read and normalise the document at `path`. Relative paths inside the
    /// document are resolved against `base`.
    pub fn from_file(path: impl AsRef<Path>, base: &Path, use_originals: bool) -> Result<Self> {
        Self::normalize(&RawConfig::from_file(path)?, base, use_originals)
    }

    pub fn normalize(raw: &RawConfig, base: &Path, use_originals: bool) -> Result<Self> {
        let resolver = Resolver {
            raw,
            base,
            use_originals,
        };

        if raw.clips.is_empty() {
            return Err(ReelError::config("the document lists no clips"));
        }

        let clips = raw
            .clips
            .iter()
            .enumerate()
            .map(|(i, clip)| resolver.clip(i + 1, clip))
            .collect::<Result<Vec<_>>>()?;

        let trailer = raw
            .trailer
            .iter()
            .enumerate()
            .map(|(i, segment)| {
                resolver.segment(0, &format!("trailer[{i}]"), segment, None, None, None)
            })
            .collect::<Result<Vec<_>>>()?;

        let cover = match &raw.cover {
            Some(cover) => {
                positive("cover.time", cover.time)?;
                Some(Cover {
                    image: base.join(&cover.image),
                    duration: cover.time,
                })
            }
            None => None,
        };

        let credits = match &raw.credits {
            Some(credits) => {
                positive("credits.time", credits.time)?;
                let content = match (&credits.image, &credits.text) {
                    (Some(image), _) => CreditsContent::Image(base.join(image)),
                    (None, Some(text)) => CreditsContent::Text(text.clone()),
                    (None, None) => {
                        return Err(ReelError::config("credits need an image or text"));
                    }
                };
                Some(Credits {
                    duration: credits.time,
                    content,
                })
            }
            None => None,
        };

        let bgm = match &raw.bgm {
            Some(bgm) => {
                if bgm.fg_volume < 0.0 || bgm.bg_volume < 0.0 {
                    return Err(ReelError::config("bgm volumes must not be negative"));
                }
                Some(BackgroundMusic {
                    audio: base.join(&bgm.audio),
                    fg_volume: bgm.fg_volume,
                    bg_volume: bgm.bg_volume,
                })
            }
            None => None,
        };

        Ok(Config {
            clips,
            trailer,
            cover,
            credits,
            bgm,
        })
    }

    /// Look up a clip by its 1-based index.
    pub fn clip(&self, index: usize) -> Option<&Clip> {
        self.clips.iter().find(|clip| clip.index == index)
    }
}

struct Resolver<'a> {
    raw: &'a RawConfig,
    base: &'a Path,
    use_originals: bool,
}

impl Resolver<'_> {
    fn clip(&self, index: usize, clip: &RawClip) -> Result<Clip> {
        if clip.timings.is_empty() {
            return Err(ReelError::config(format!("clip {index} has no timings")));
        }

        let audio_filter = clip.audio_filter.clone().or_else(|| {
            self.raw
                .audio_threshold
                .map(|threshold| format!("agate=threshold={threshold}"))
        });

        let segments = clip
            .timings
            .iter()
            .enumerate()
            .map(|(i, timing)| {
                let bare;
                let segment = match timing {
                    RawTiming::Range(range) => {
                        bare = RawSegment {
                            range: range.clone(),
                            ..RawSegment::default()
                        };
                        &bare
                    }
                    RawTiming::Segment(segment) => segment,
                };
                self.segment(
                    index,
                    &format!("timings[{i}]"),
                    segment,
                    clip.video.as_ref(),
                    clip.crop.as_ref(),
                    audio_filter.as_ref(),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let caption = match (&clip.question, &clip.answer) {
            (Some(question), answer) if !question.trim().is_empty() => Some(Caption::new(
                question.trim(),
                answer.as_deref().map(str::trim).filter(|a| !a.is_empty()),
            )),
            (_, Some(_)) => {
                return Err(ReelError::config(format!(
                    "clip {index} has an answer but no question"
                )));
            }
            _ => None,
        };

        let body: f64 = segments.iter().map(Segment::duration).sum();
        let replacements = clip
            .replacements
            .iter()
            .enumerate()
            .map(|(i, replacement)| {
                let field = format!("replacements[{i}].time");
                let (start, end) = timecode::parse_range(&replacement.time).ok_or_else(|| {
                    ReelError::Timestamp {
                        field: field.clone(),
                        clip: index,
                        value: replacement.time.clone(),
                    }
                })?;
                if end <= start || end > body {
                    return Err(ReelError::config(format!(
                        "clip {index} {field}: window {start}-{end} is outside the {body}s body"
                    )));
                }
                let image = match &replacement.image {
                    Some(image) => ReplacementImage::File(self.base.join(image)),
                    None => ReplacementImage::Frame(replacement.frame),
                };
                Ok(Replacement { start, end, image })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Clip {
            index,
            segments,
            caption,
            replacements,
        })
    }

    fn segment(
        &self,
        clip: usize,
        field: &str,
        segment: &RawSegment,
        clip_video: Option<&String>,
        clip_crop: Option<&String>,
        audio_filter: Option<&String>,
    ) -> Result<Segment> {
        let (start, end) =
            timecode::parse_range(&segment.range).ok_or_else(|| ReelError::Timestamp {
                field: field.to_string(),
                clip,
                value: segment.range.clone(),
            })?;
        if end <= start {
            return Err(ReelError::config(format!(
                "clip {clip} {field}: end {end} is not after start {start}"
            )));
        }

        let video = segment
            .video
            .as_ref()
            .or(clip_video)
            .or(self.raw.video.as_ref())
            .ok_or_else(|| {
                ReelError::config(format!(
                    "clip {clip} {field}: no video given and no default video"
                ))
            })?;

        let crop = segment
            .crop
            .as_ref()
            .or(clip_crop)
            .or(self.raw.crop.as_ref())
            .map(|crop| crop.parse::<Crop>())
            .transpose()?;

        Ok(Segment {
            source: self.base.join(self.substitute(video)),
            start,
            end,
            crop,
            audio_filter: audio_filter.cloned(),
        })
    }

    /// Swap in the low-resolution stand-in when one is mapped for this exact
    /// source string.
    fn substitute<'s>(&'s self, video: &'s str) -> &'s str {
        if self.use_originals {
            return video;
        }
        self.raw
            .alt_low_res
            .get(video)
            .map(String::as_str)
            .unwrap_or(video)
    }
}

fn positive(field: &str, value: f64) -> Result<()> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(ReelError::config(format!("{field} must be positive, got {value}")))
    }
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
