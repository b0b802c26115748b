use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the clip-timeline pipeline.
///
/// Every variant is fatal to the current run. Intermediate files already
/// written are left in place so a rerun can resume from them.
#[derive(Error, Debug)]
pub enum ReelError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Malformed timestamp in {field} of clip {clip}: {value:?}")]
    Timestamp {
        field: String,
        clip: usize,
        value: String,
    },

    #[error("{program} exited with {}: {program} {}\n{stderr}", exit_code(.code), join_args(.args))]
    ExternalTool {
        program: String,
        args: Vec<String>,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Cannot {stage}: missing {}", display_paths(.missing))]
    Precondition { stage: String, missing: Vec<PathBuf> },

    #[error(
        "Cannot concatenate {} with {}: expected {expected}, found {found}",
        display_path(.first),
        display_path(.other)
    )]
    CodecMismatch {
        first: PathBuf,
        other: PathBuf,
        expected: String,
        found: String,
    },

    #[error("{} of {total} clips failed (clips {}); first failure: {first}", count(.failed), join_indices(.failed))]
    Batch {
        failed: Vec<usize>,
        total: usize,
        first: Box<ReelError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ReelError>;

impl ReelError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

fn exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "a signal".to_string(),
    }
}

fn join_args(args: &[String]) -> String {
    args.join(" ")
}

fn count(indices: &[usize]) -> usize {
    indices.len()
}

fn join_indices(indices: &[usize]) -> String {
    indices
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn display_path(path: &std::path::Path) -> String {
    path.display().to_string()
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_lists_every_missing_artifact() {
        let err = ReelError::Precondition {
            stage: "combine clips".to_string(),
            missing: vec![PathBuf::from("part-02-a.mp4"), PathBuf::from("part-03-a.mp4")],
        };
        assert_eq!(
            err.to_string(),
            "Cannot combine clips: missing part-02-a.mp4, part-03-a.mp4"
        );
    }

    #[test]
    fn external_tool_error_names_the_command() {
        let err = ReelError::ExternalTool {
            program: "ffmpeg".to_string(),
            args: vec!["-i".to_string(), "in.mp4".to_string()],
            code: Some(1),
            stderr: "boom".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("exit code 1"));
        assert!(message.contains("ffmpeg -i in.mp4"));
    }

    #[test]
    fn batch_error_counts_failed_clips() {
        let err = ReelError::Batch {
            failed: vec![2, 5],
            total: 6,
            first: Box::new(ReelError::config("boom")),
        };
        assert_eq!(
            err.to_string(),
            "2 of 6 clips failed (clips 2, 5); first failure: Configuration error: boom"
        );
    }
}
