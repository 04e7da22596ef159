//! Process-based image pipeline: Kakadu for JPEG 2000 decoding, netpbm for
//! scaling and JPEG encoding.

use std::io::{self, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

use super::{ImageFormat, ImagePipeline, ImageRequest};
use crate::error::{Error, Result};

/// Names (or paths) of the external programs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineTools {
    pub expand: String,
    pub scale: String,
    pub encode: String,
}

impl Default for PipelineTools {
    fn default() -> Self {
        Self {
            expand: "kdu_expand".to_string(),
            scale: "pnmscale".to_string(),
            encode: "pnmtojpeg".to_string(),
        }
    }
}

/// Runs `kdu_expand | pnmscale | pnmtojpeg`.
///
/// `kdu_expand` needs seekable files, so the scan is written to a scratch
/// directory and decoded to a PPM there. The remaining steps are stdin to
/// stdout filters. No step has a timeout.
#[derive(Debug, Clone, Default)]
pub struct KakaduPipeline {
    tools: PipelineTools,
}

impl KakaduPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tools(mut self, tools: PipelineTools) -> Self {
        self.tools = tools;
        self
    }

    fn expand(&self, source: &[u8], request: &ImageRequest) -> Result<Vec<u8>> {
        let scratch = tempfile::tempdir()?;
        let input = scratch.path().join("page.jp2");
        let output = scratch.path().join("page.ppm");
        std::fs::write(&input, source)?;

        let result = Command::new(&self.tools.expand)
            .arg("-region")
            .arg(request.region.to_string())
            .arg("-reduce")
            .arg(request.reduce.to_string())
            .arg("-no_seek")
            .arg("-i")
            .arg(&input)
            .arg("-o")
            .arg(&output)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| spawn_error(&self.tools.expand, e))?;

        if !result.status.success() {
            return Err(exit_error(&self.tools.expand, &result.stderr));
        }
        read_output(&self.tools.expand, &output)
    }
}

impl ImagePipeline for KakaduPipeline {
    fn transcode(&self, source: &[u8], request: &ImageRequest) -> Result<Vec<u8>> {
        let pixmap = self.expand(source, request)?;
        let scaled = run_filter(
            &self.tools.scale,
            &[
                "-xysize".to_string(),
                request.width.to_string(),
                request.height.to_string(),
            ],
            pixmap,
        )?;

        match request.format {
            ImageFormat::Ppm => Ok(scaled),
            ImageFormat::Jpeg => run_filter(
                &self.tools.encode,
                &["-quality".to_string(), request.quality.to_string()],
                scaled,
            ),
        }
    }
}

/// Run `program args` with `input` on stdin and return its stdout.
fn run_filter(program: &str, args: &[String], input: Vec<u8>) -> Result<Vec<u8>> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| spawn_error(program, e))?;

    // Feed stdin from another thread so a full stdout pipe can't deadlock us
    let mut stdin = child.stdin.take().ok_or_else(|| Error::Pipeline {
        tool: program.to_string(),
        message: "stdin not captured".to_string(),
    })?;
    let feeder = thread::spawn(move || stdin.write_all(&input));

    let output = child.wait_with_output()?;
    let fed = feeder.join().map_err(|_| Error::Pipeline {
        tool: program.to_string(),
        message: "stdin writer panicked".to_string(),
    })?;

    if !output.status.success() {
        return Err(exit_error(program, &output.stderr));
    }
    // A filter may stop reading early and still succeed
    if let Err(e) = fed
        && e.kind() != io::ErrorKind::BrokenPipe
    {
        return Err(e.into());
    }
    if output.stdout.is_empty() {
        return Err(Error::Pipeline {
            tool: program.to_string(),
            message: "produced no output".to_string(),
        });
    }
    Ok(output.stdout)
}

fn read_output(program: &str, path: &Path) -> Result<Vec<u8>> {
    match std::fs::read(path) {
        Ok(data) if !data.is_empty() => Ok(data),
        _ => Err(Error::Pipeline {
            tool: program.to_string(),
            message: format!("produced no output at {}", path.display()),
        }),
    }
}

fn spawn_error(program: &str, e: io::Error) -> Error {
    let message = if e.kind() == io::ErrorKind::NotFound {
        "program not found".to_string()
    } else {
        e.to_string()
    };
    Error::Pipeline {
        tool: program.to_string(),
        message,
    }
}

fn exit_error(program: &str, stderr: &[u8]) -> Error {
    Error::Pipeline {
        tool: program.to_string(),
        message: String::from_utf8_lossy(stderr).trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program_is_pipeline_error() {
        let pipeline = KakaduPipeline::new().with_tools(PipelineTools {
            expand: "leafpress-no-such-kdu-expand".to_string(),
            ..PipelineTools::default()
        });
        let request = crate::image::ImageSettings::default().request();
        let err = pipeline.transcode(b"not a jp2", &request).unwrap_err();
        match err {
            Error::Pipeline { tool, message } => {
                assert_eq!(tool, "leafpress-no-such-kdu-expand");
                assert_eq!(message, "program not found");
            }
            other => panic!("expected pipeline error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_run_filter_pipes_bytes() {
        let out = run_filter("cat", &[], b"pixels".to_vec()).unwrap();
        assert_eq!(out, b"pixels");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_filter_nonzero_exit() {
        let err = run_filter("false", &[], Vec::new()).unwrap_err();
        assert!(matches!(err, Error::Pipeline { ref tool, .. } if tool == "false"));
    }
}
