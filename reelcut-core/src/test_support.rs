use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{ReelError, Result};
use crate::ffmpeg_wrapper::{FFmpegCommand, MediaEngine, MediaInfo};

/// Records commands instead of running them. Each run writes a placeholder
/// output file; probes answer from a table, falling back to a default
/// 640x360 h264/aac stream for files that exist.
pub struct FakeEngine {
    commands: Mutex<Vec<FFmpegCommand>>,
    probes: Mutex<HashMap<PathBuf, MediaInfo>>,
    failing: Mutex<Option<String>>,
    pub default_info: MediaInfo,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            probes: Mutex::new(HashMap::new()),
            failing: Mutex::new(None),
            default_info: MediaInfo {
                duration: 5.0,
                width: 640,
                height: 360,
                fps: 25.0,
                video_codec: Some("h264".to_string()),
                audio_codec: Some("aac".to_string()),
                sample_rate: Some(48_000),
                channels: Some(2),
                has_audio: true,
            },
        }
    }

    pub fn set_probe(&self, path: impl AsRef<Path>, info: MediaInfo) {
        self.probes
            .lock()
            .unwrap()
            .insert(path.as_ref().to_path_buf(), info);
    }

    pub fn set_duration(&self, path: impl AsRef<Path>, duration: f64) {
        let info = MediaInfo {
            duration,
            ..self.default_info.clone()
        };
        self.set_probe(path, info);
    }

    /// Fail any command whose arguments mention `needle`
    pub fn fail_when(&self, needle: &str) {
        *self.failing.lock().unwrap() = Some(needle.to_string());
    }

    pub fn commands(&self) -> Vec<FFmpegCommand> {
        self.commands.lock().unwrap().clone()
    }

    /// Output file names of every recorded command, in order
    pub fn outputs(&self) -> Vec<String> {
        self.commands()
            .iter()
            .map(|c| crate::config::file_name(c.output()))
            .collect()
    }
}

impl MediaEngine for FakeEngine {
    fn run(&self, cmd: &FFmpegCommand) -> Result<()> {
        let args = cmd.args();
        if let Some(needle) = self.failing.lock().unwrap().as_deref()
            && args.iter().any(|a| a.contains(needle))
        {
            return Err(ReelError::ExternalTool {
                program: "ffmpeg".to_string(),
                args,
                code: Some(1),
                stderr: "simulated failure".to_string(),
            });
        }
        self.commands.lock().unwrap().push(cmd.clone());
        std::fs::write(cmd.output(), b"fake media")?;
        Ok(())
    }

    fn probe(&self, path: &Path) -> Result<MediaInfo> {
        if let Some(info) = self.probes.lock().unwrap().get(path) {
            return Ok(info.clone());
        }
        if path.exists() {
            return Ok(self.default_info.clone());
        }
        Err(ReelError::ExternalTool {
            program: "ffprobe".to_string(),
            args: vec![path.display().to_string()],
            code: Some(1),
            stderr: "No such file or directory".to_string(),
        })
    }
}

/// Read one token the way the engine's tokenizer does: a backslash takes
/// the next character literally, single quotes protect a run, and unquoted
/// whitespace at either end is dropped. Stops before any char in `terms`.
fn read_token<'a>(input: &'a str, terms: &str) -> (String, &'a str) {
    let input = input.trim_start();
    let mut token = String::new();
    let mut kept = 0;
    let mut chars = input.char_indices();
    let rest = loop {
        let Some((i, c)) = chars.next() else {
            break "";
        };
        if terms.contains(c) {
            break &input[i..];
        }
        match c {
            '\\' => {
                if let Some((_, next)) = chars.next() {
                    token.push(next);
                }
                kept = token.len();
            }
            '\'' => {
                for (_, next) in chars.by_ref() {
                    if next == '\'' {
                        break;
                    }
                    token.push(next);
                }
                kept = token.len();
            }
            _ => {
                token.push(c);
                if !c.is_whitespace() {
                    kept = token.len();
                }
            }
        }
    };
    token.truncate(kept);
    (token, rest)
}

/// The `key=value` options one filter receives after the graph parser and
/// the option parser have both unescaped it.
pub fn engine_options(filter: &str) -> Vec<(String, String)> {
    let (_, args) = filter.split_once('=').unwrap();
    let (args, rest) = read_token(args, "[],;");
    assert!(rest.is_empty(), "filter ended early at {rest:?}");

    let mut options = Vec::new();
    let mut remaining = args.as_str();
    while !remaining.is_empty() {
        let (key, value) = remaining.split_once('=').unwrap();
        let (value, rest) = read_token(value, ":");
        options.push((key.to_string(), value));
        remaining = rest.strip_prefix(':').unwrap_or(rest);
    }
    options
}
