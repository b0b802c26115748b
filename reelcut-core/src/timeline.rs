//! Cumulative clip boundaries in the assembled video.
//!
//! The assembled video is `cover, (title card, body)*, credits`. Each entry
//! spans one clip from the start of its title card to the end of its body;
//! entries are contiguous and the first starts where the cover ends.
//! Music ducking and chapter markers are both derived from these boundaries.

use crate::config::Config;
use crate::error::Result;
use crate::ffmpeg_wrapper::MediaEngine;
use crate::layout::{Layout, require};
use crate::timecode::format_clock;

/// Rendered lengths of one clip
#[derive(Debug, Clone, PartialEq)]
pub struct ClipTiming {
    pub clip_index: usize,
    /// Title card length, 0 without a caption
    pub caption: f64,
    pub body: f64,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub clip_index: usize,
    /// Start of the title card (or the body, without one)
    pub start: f64,
    /// Start of the body
    pub body_start: f64,
    pub end: f64,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    pub cover: f64,
    pub entries: Vec<TimelineEntry>,
    pub credits: f64,
}

impl Timeline {
    pub fn compute(cover: f64, clips: &[ClipTiming], credits: f64) -> Self {
        let mut cursor = cover;
        let entries = clips
            .iter()
            .map(|clip| {
                let start = cursor;
                let body_start = start + clip.caption;
                let end = body_start + clip.body;
                cursor = end;
                TimelineEntry {
                    clip_index: clip.clip_index,
                    start,
                    body_start,
                    end,
                    label: clip.label.clone(),
                }
            })
            .collect();

        Self {
            cover,
            entries,
            credits,
        }
    }

    /// Build the timeline from the rendered per-clip outputs. Every part
    /// must exist; body lengths are probed rather than derived from the
    /// configured timings so that rounding in earlier stages carries through.
    pub fn measure(engine: &dyn MediaEngine, layout: &Layout, config: &Config) -> Result<Self> {
        let parts: Vec<_> = config.clips.iter().map(|c| layout.part(c)).collect();
        require("compute the timeline", &parts)?;

        let clips = config
            .clips
            .iter()
            .zip(&parts)
            .map(|(clip, part)| {
                let caption = clip
                    .caption
                    .as_ref()
                    .map(|c| c.display_duration())
                    .unwrap_or(0.0);
                let rendered = engine.probe(part)?.duration;
                Ok(ClipTiming {
                    clip_index: clip.index,
                    caption,
                    body: (rendered - caption).max(0.0),
                    label: clip.caption.as_ref().map(|c| c.question.clone()),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let cover = config.cover.as_ref().map(|c| c.duration).unwrap_or(0.0);
        let credits = config.credits.as_ref().map(|c| c.duration).unwrap_or(0.0);
        Ok(Self::compute(cover, &clips, credits))
    }

    pub fn credits_start(&self) -> f64 {
        self.entries.last().map(|e| e.end).unwrap_or(self.cover)
    }

    pub fn total(&self) -> f64 {
        self.credits_start() + self.credits
    }

    /// `0, body_start, end, body_start, end, ..., total`. Pairs starting at
    /// even indices span the stretches without speech (cover and first
    /// card, later cards, credits); pairs starting at odd indices span the
    /// clip bodies.
    pub fn keyframes(&self) -> Vec<f64> {
        let mut keyframes = Vec::with_capacity(self.entries.len() * 2 + 2);
        keyframes.push(0.0);
        for entry in &self.entries {
            keyframes.push(entry.body_start);
            keyframes.push(entry.end);
        }
        keyframes.push(self.total());
        keyframes
    }

    /// Windows without speech
    pub fn quiet_windows(&self) -> Vec<(f64, f64)> {
        self.keyframes()
            .chunks_exact(2)
            .map(|pair| (pair[0], pair[1]))
            .collect()
    }

    /// Windows covering clip bodies
    pub fn speech_windows(&self) -> Vec<(f64, f64)> {
        self.keyframes()[1..]
            .chunks_exact(2)
            .map(|pair| (pair[0], pair[1]))
            .collect()
    }

    /// `(start, title)` markers: the cover, each clip, then the credits
    pub fn chapters(&self) -> Vec<(f64, String)> {
        let mut chapters = Vec::new();
        if self.cover > 0.0 {
            chapters.push((0.0, "Intro".to_string()));
        }
        for entry in &self.entries {
            let title = entry
                .label
                .clone()
                .unwrap_or_else(|| format!("Clip {}", entry.clip_index));
            chapters.push((entry.start, title));
        }
        if self.credits > 0.0 {
            chapters.push((self.credits_start(), "Credits".to_string()));
        }
        chapters
    }

    /// Chapter markers as `MM:SS title` lines
    pub fn chapter_text(&self) -> String {
        self.chapters()
            .iter()
            .map(|(start, title)| format!("{} {}\n", format_clock(*start), title))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawConfig;
    use crate::error::ReelError;
    use crate::test_support::FakeEngine;

    fn timing(clip_index: usize, caption: f64, body: f64) -> ClipTiming {
        ClipTiming {
            clip_index,
            caption,
            body,
            label: None,
        }
    }

    fn bounds(timeline: &Timeline) -> Vec<(f64, f64, f64)> {
        timeline
            .entries
            .iter()
            .map(|e| (e.start, e.body_start, e.end))
            .collect()
    }

    #[test]
    fn two_captioned_clips_without_cover() {
        let timeline = Timeline::compute(0.0, &[timing(1, 4.0, 5.0), timing(2, 4.0, 5.0)], 0.0);
        assert_eq!(bounds(&timeline), vec![(0.0, 4.0, 9.0), (9.0, 13.0, 18.0)]);
        assert_eq!(timeline.keyframes(), vec![0.0, 4.0, 9.0, 13.0, 18.0, 18.0]);
        assert_eq!(timeline.total(), 18.0);
    }

    #[test]
    fn entries_are_contiguous_and_start_after_cover() {
        let clips = [timing(1, 4.0, 7.25), timing(2, 0.0, 3.5), timing(3, 8.0, 12.0)];
        let timeline = Timeline::compute(3.0, &clips, 5.0);

        assert_eq!(timeline.entries[0].start, 3.0);
        for pair in timeline.entries.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert!(timeline.keyframes().windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(timeline.credits_start(), 37.75);
        assert_eq!(timeline.total(), 42.75);
    }

    #[test]
    fn quiet_and_speech_windows_alternate() {
        let timeline = Timeline::compute(2.0, &[timing(1, 4.0, 5.0), timing(2, 4.0, 5.0)], 3.0);
        assert_eq!(
            timeline.quiet_windows(),
            vec![(0.0, 6.0), (11.0, 15.0), (20.0, 23.0)]
        );
        assert_eq!(timeline.speech_windows(), vec![(6.0, 11.0), (15.0, 20.0)]);
    }

    #[test]
    fn chapter_markers() {
        let mut first = timing(1, 4.0, 60.0);
        first.label = Some("What got you started?".to_string());
        let timeline = Timeline::compute(3.0, &[first, timing(2, 0.0, 30.0)], 4.0);
        assert_eq!(
            timeline.chapter_text(),
            "00:00 Intro\n00:03 What got you started?\n01:07 Clip 2\n01:37 Credits\n"
        );
    }

    #[test]
    fn measure_uses_rendered_part_durations() {
        let dir = tempfile::tempdir().unwrap();
        let raw = RawConfig::from_yaml(
            "video: a.mp4\ncover:\n  image: c.png\n  time: 2\nclips:\n  - timings: [\"0:00-0:05\"]\n    question: one two three four five\n  - timings: [\"0:10-0:15\"]\n",
        )
        .unwrap();
        let config = Config::normalize(&raw, dir.path(), true).unwrap();
        let layout = Layout::new(dir.path());
        let engine = FakeEngine::new();
        for (clip, duration) in config.clips.iter().zip([9.04, 4.96]) {
            std::fs::write(layout.part(clip), b"x").unwrap();
            engine.set_duration(layout.part(clip), duration);
        }

        let timeline = Timeline::measure(&engine, &layout, &config).unwrap();
        let entries = &timeline.entries;
        assert_eq!(entries[0].start, 2.0);
        assert_eq!(entries[0].body_start, 6.0);
        assert!((entries[0].end - 11.04).abs() < 1e-9);
        assert_eq!(entries[1].start, entries[0].end);
        assert_eq!(entries[1].body_start, entries[1].start);
        assert!((timeline.total() - 16.0).abs() < 1e-9);
    }

    #[test]
    fn measure_requires_every_part() {
        let dir = tempfile::tempdir().unwrap();
        let raw = RawConfig::from_yaml(
            "video: a.mp4\nclips:\n  - timings: [\"0:00-0:05\"]\n  - timings: [\"0:10-0:15\"]\n",
        )
        .unwrap();
        let config = Config::normalize(&raw, dir.path(), true).unwrap();
        let layout = Layout::new(dir.path());
        std::fs::write(layout.part(&config.clips[0]), b"x").unwrap();

        let err = Timeline::measure(&FakeEngine::new(), &layout, &config).unwrap_err();
        match err {
            ReelError::Precondition { missing, .. } => {
                assert_eq!(missing, vec![layout.part(&config.clips[1])]);
            }
            other => panic!("expected a precondition error, got {other:?}"),
        }
    }
}
