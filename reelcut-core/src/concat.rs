//! Joining clips that share codec parameters without re-encoding.

use std::path::{Path, PathBuf};

use crate::error::{ReelError, Result};
use crate::ffmpeg_wrapper::{FFmpegCommand, MediaEngine, MediaInfo};
use crate::layout::{content_key, staging_path};
use crate::settings::{ConcatStrategy, Settings};

/// Probe every input and require identical stream parameters.
pub fn check_compatible(engine: &dyn MediaEngine, inputs: &[PathBuf]) -> Result<Vec<MediaInfo>> {
    let infos = inputs
        .iter()
        .map(|input| engine.probe(input))
        .collect::<Result<Vec<_>>>()?;

    if let Some(first) = infos.first() {
        let expected = first.stream_signature();
        for (input, info) in inputs.iter().zip(&infos).skip(1) {
            let found = info.stream_signature();
            if found != expected {
                return Err(ReelError::CodecMismatch {
                    first: inputs[0].clone(),
                    other: input.clone(),
                    expected,
                    found,
                });
            }
        }
    }
    Ok(infos)
}

fn annexb_filter(codec: Option<&str>) -> &'static str {
    match codec {
        Some("hevc") => "hevc_mp4toannexb",
        _ => "h264_mp4toannexb",
    }
}

/// Remux one input into an MPEG-TS intermediate
pub fn annexb_command(input: &Path, codec: Option<&str>, output: &Path) -> FFmpegCommand {
    FFmpegCommand::new(output)
        .input(input)
        .copy_codecs()
        .bitstream_filter("v", annexb_filter(codec))
        .format("mpegts")
}

/// Join MPEG-TS intermediates with the byte-level `concat:` protocol
pub fn protocol_join_command(parts: &[PathBuf], audio_codec: Option<&str>, output: &Path) -> FFmpegCommand {
    let joined = parts
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join("|");
    let cmd = FFmpegCommand::new(output)
        .raw_input(Vec::new(), format!("concat:{joined}"))
        .copy_codecs();
    match audio_codec {
        Some("aac") => cmd.bitstream_filter("a", "aac_adtstoasc"),
        _ => cmd,
    }
}

/// Body of a concat demuxer list file
pub fn list_file_contents(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|input| {
            let path = input.display().to_string().replace('\'', r"'\''");
            format!("file '{path}'\n")
        })
        .collect()
}

pub fn list_file_command(list: &Path, output: &Path) -> FFmpegCommand {
    FFmpegCommand::new(output)
        .raw_input(
            vec![
                "-f".to_string(),
                "concat".to_string(),
                "-safe".to_string(),
                "0".to_string(),
            ],
            list.display().to_string(),
        )
        .map("0:v")
        .map("0:a?")
        .copy_codecs()
}

/// Concatenate `inputs` in order into `output`.
///
/// Inputs must share codec parameters; a mismatch fails before anything is
/// written. The result is staged next to `output` and renamed into place,
/// so `output` may also be one of the inputs.
pub fn concat(
    engine: &dyn MediaEngine,
    settings: &Settings,
    output: &Path,
    inputs: &[PathBuf],
) -> Result<PathBuf> {
    let Some(first) = inputs.first() else {
        return Err(ReelError::config(format!(
            "nothing to concatenate into {}",
            output.display()
        )));
    };

    if inputs.len() == 1 {
        if first != output {
            std::fs::copy(first, output)?;
        }
        return Ok(output.to_path_buf());
    }

    let infos = check_compatible(engine, inputs)?;
    let workdir = output.parent().unwrap_or(Path::new("."));
    let key = content_key(
        std::iter::once(output)
            .chain(inputs.iter().map(PathBuf::as_path))
            .map(|p| p.display().to_string()),
    );
    let staged = staging_path(output);

    log::info!("Concatenating {} inputs into {}", inputs.len(), output.display());

    match settings.concat {
        ConcatStrategy::AnnexB => {
            let video_codec = infos[0].video_codec.as_deref();
            let mut parts = Vec::with_capacity(inputs.len());
            for (i, input) in inputs.iter().enumerate() {
                let part = workdir.join(format!("concat-{key}-{i:02}.ts"));
                engine.run(&annexb_command(input, video_codec, &part))?;
                parts.push(part);
            }
            engine.run(&protocol_join_command(
                &parts,
                infos[0].audio_codec.as_deref(),
                &staged,
            ))?;
            for part in &parts {
                std::fs::remove_file(part)?;
            }
        }
        ConcatStrategy::ListFile => {
            let list = workdir.join(format!("concat-{key}.txt"));
            std::fs::write(&list, list_file_contents(inputs))?;
            engine.run(&list_file_command(&list, &staged))?;
            std::fs::remove_file(&list)?;
        }
    }

    std::fs::rename(&staged, output)?;
    Ok(output.to_path_buf())
}
