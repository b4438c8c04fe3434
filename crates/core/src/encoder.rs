//! External encoder invoker: FFmpeg subprocess fed over an stdin pipe.
//!
//! Two wire protocols, selected by whether tiling is requested:
//!
//! - non-tiled: frames go in as packed rgb24 bytes via `-f rawvideo`;
//! - tiled: each tile goes in as a binary PPM image via `-f image2pipe`.
//!
//! Either way the encoder writes into a per-run working directory next to
//! the requested output and the result is renamed into place only after the
//! subprocess exits successfully, so a failed encode never leaves a
//! committed output file behind.

use std::borrow::Cow;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Stdio};
use std::thread::{self, JoinHandle};

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};

use crate::tiles::{copy_tile, TileGrid};
use crate::types::FrameSequence;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    H264,
    Hevc,
}

impl Codec {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "h264" => Ok(Self::H264),
            "hevc" => Ok(Self::Hevc),
            other => bail!("unsupported codec '{other}', expected one of h264|hevc"),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::Hevc => "hevc",
        }
    }

    /// FFmpeg encoder implementation selected for this codec.
    pub fn encoder(&self) -> &'static str {
        match self {
            Self::H264 => "libx264",
            Self::Hevc => "libx265",
        }
    }
}

/// Parameters of one FFmpeg invocation, shared by whole-sequence and
/// per-chunk encodes. Frame geometry comes from the sequence itself.
#[derive(Debug, Clone)]
pub struct EncodeJob {
    pub frame_rate: u32,
    pub codec: Codec,
    pub crf: i64,
    pub preset: String,
    pub pix_fmt: String,
}

/// Tile scan parameters for the image-sequence protocol.
#[derive(Debug, Clone, Copy)]
pub struct TilingOptions {
    pub tile_size: usize,
    pub overlap: usize,
}

impl EncodeJob {
    pub fn raw_args(&self, width: usize, height: usize, output: &Path) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-f".into(),
            "rawvideo".into(),
            "-s".into(),
            format!("{width}x{height}"),
            "-pix_fmt".into(),
            "rgb24".into(),
            "-r".into(),
            self.frame_rate.to_string(),
            "-i".into(),
            "-".into(),
        ];
        self.push_output_args(&mut args, output);
        args
    }

    pub fn tiled_args(&self, output: &Path) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-f".into(),
            "image2pipe".into(),
            "-vcodec".into(),
            "ppm".into(),
            "-r".into(),
            self.frame_rate.to_string(),
            "-i".into(),
            "-".into(),
        ];
        self.push_output_args(&mut args, output);
        args
    }

    /// Stream-copy concatenation of already-encoded chunk files.
    pub fn concat_args(manifest: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".into(),
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            manifest.to_string_lossy().into_owned(),
            "-c".into(),
            "copy".into(),
            "-loglevel".into(),
            "error".into(),
            output.to_string_lossy().into_owned(),
        ]
    }

    fn push_output_args(&self, args: &mut Vec<String>, output: &Path) {
        args.extend([
            "-c:v".into(),
            self.codec.encoder().into(),
            "-pix_fmt".into(),
            self.pix_fmt.clone(),
            "-crf".into(),
            self.crf.to_string(),
            "-preset".into(),
            self.preset.clone(),
            "-loglevel".into(),
            "error".into(),
            output.to_string_lossy().into_owned(),
        ]);
    }
}

/// FFmpeg subprocess. Stderr is drained and captured on a background
/// thread so a failing encode can report the diagnostic text; the child is
/// killed on [`Drop`] if still running.
pub struct EncoderProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_thread: Option<JoinHandle<String>>,
}

impl EncoderProcess {
    pub fn spawn(args: &[String]) -> Result<Self> {
        debug!(cmd = %format!("ffmpeg {}", args.join(" ")), "launching ffmpeg");

        let mut child = crate::runtime::command_for("ffmpeg")
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("failed to launch ffmpeg — is it installed?")?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("failed to open ffmpeg stdin"))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow::anyhow!("failed to open ffmpeg stderr"))?;
        let stderr_thread = thread::spawn(move || {
            let reader = BufReader::new(stderr);
            let mut captured = String::new();
            for line in reader.lines() {
                match line {
                    Ok(line) if !line.is_empty() => {
                        debug!(target: "ffmpeg_stderr", "{}", line);
                        captured.push_str(&line);
                        captured.push('\n');
                    }
                    Err(e) => {
                        debug!(target: "ffmpeg_stderr", "read error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
            captured
        });

        Ok(Self {
            child,
            stdin: Some(stdin),
            stderr_thread: Some(stderr_thread),
        })
    }

    pub fn stdin(&mut self) -> Result<&mut ChildStdin> {
        self.stdin
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("encoder stdin already closed"))
    }

    /// Close stdin, drain stderr, and wait for the subprocess. A non-zero
    /// exit status is fatal and carries the captured diagnostic text.
    pub fn finish(&mut self) -> Result<()> {
        drop(self.stdin.take());

        let status = self.child.wait().context("failed to wait for ffmpeg")?;

        let captured = self
            .stderr_thread
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() {
            bail!(
                "ffmpeg exited with status {}: {}",
                status,
                captured.trim()
            );
        }

        debug!("ffmpeg finished successfully");
        Ok(())
    }
}

impl Drop for EncoderProcess {
    fn drop(&mut self) {
        drop(self.stdin.take());
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(handle) = self.stderr_thread.take() {
            let _ = handle.join();
        }
    }
}

/// Serialize one frame as packed rgb24 bytes. Grayscale input is broadcast
/// to three channels so the declared pixel format always holds.
pub fn write_raw_frame<W: Write>(writer: &mut W, frame: &[u8], channels: usize) -> Result<()> {
    let rgb = packed_rgb(frame, channels)?;
    writer
        .write_all(&rgb)
        .context("failed to write frame to encoder stdin")
}

/// Serialize one image as a minimal binary PPM: ASCII header declaring
/// width, height and max channel value, followed by raw rgb bytes.
pub fn write_ppm<W: Write>(
    writer: &mut W,
    data: &[u8],
    width: usize,
    height: usize,
    channels: usize,
) -> Result<()> {
    let rgb = packed_rgb(data, channels)?;
    write!(writer, "P6 {width} {height} 255\n").context("failed to write PPM header")?;
    writer
        .write_all(&rgb)
        .context("failed to write PPM payload to encoder stdin")
}

fn packed_rgb(data: &[u8], channels: usize) -> Result<Cow<'_, [u8]>> {
    match channels {
        3 => Ok(Cow::Borrowed(data)),
        1 => {
            let mut rgb = Vec::with_capacity(data.len() * 3);
            for &value in data {
                rgb.extend_from_slice(&[value, value, value]);
            }
            Ok(Cow::Owned(rgb))
        }
        other => bail!("unsupported channel depth {other}, expected 1 or 3"),
    }
}

/// Encode a contiguous frame range to `output`. `progress` receives the
/// number of frames completed within the range.
pub fn encode_clip(
    seq: &FrameSequence,
    range: Range<usize>,
    job: &EncodeJob,
    tiling: Option<TilingOptions>,
    output: &Path,
    progress: &mut dyn FnMut(usize),
) -> Result<()> {
    if range.start >= range.end || range.end > seq.frame_count() {
        bail!(
            "invalid frame range {}..{} for sequence of {} frames",
            range.start,
            range.end,
            seq.frame_count()
        );
    }

    // Validation before any subprocess or filesystem work.
    let grid = match tiling {
        Some(t) => Some(TileGrid::new(seq.height(), seq.width(), t.tile_size, t.overlap)?),
        None => None,
    };

    let work_dir = work_dir_for(output);
    fs::create_dir_all(&work_dir)
        .with_context(|| format!("failed to create working directory {}", work_dir.display()))?;
    let staged = work_dir.join("staged.mp4");

    let result = stream_clip(seq, range, job, grid, &staged, progress)
        .and_then(|()| crate::output::replace_file(&staged, output));
    remove_dir_best_effort(&work_dir);
    result
}

/// Encode the whole sequence to `output`.
pub fn encode_sequence(
    seq: &FrameSequence,
    job: &EncodeJob,
    tiling: Option<TilingOptions>,
    output: &Path,
    progress: &mut dyn FnMut(usize),
) -> Result<()> {
    if seq.is_empty() {
        bail!("no frames to encode");
    }
    encode_clip(seq, 0..seq.frame_count(), job, tiling, output, progress)
}

fn stream_clip(
    seq: &FrameSequence,
    range: Range<usize>,
    job: &EncodeJob,
    grid: Option<TileGrid>,
    staged: &Path,
    progress: &mut dyn FnMut(usize),
) -> Result<()> {
    let args = match grid {
        Some(_) => job.tiled_args(staged),
        None => job.raw_args(seq.width(), seq.height(), staged),
    };

    let mut process = EncoderProcess::spawn(&args)?;
    {
        let stdin = process.stdin()?;
        for (done, index) in range.clone().enumerate() {
            let frame = seq.frame(index);
            match grid {
                None => write_raw_frame(stdin, frame, seq.channels())?,
                Some(grid) => {
                    for tile in grid.iter() {
                        let bytes = copy_tile(frame, seq.width(), seq.channels(), &tile);
                        write_ppm(stdin, &bytes, tile.width, tile.height, seq.channels())?;
                    }
                }
            }
            progress(done + 1);
        }
        stdin.flush().context("failed to flush encoder stdin")?;
    }
    process.finish()
}

pub(crate) fn work_dir_for(output: &Path) -> PathBuf {
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    parent.join(format!("framepress_work_{}", std::process::id()))
}

pub(crate) fn remove_dir_best_effort(dir: &Path) {
    if !dir.exists() {
        return;
    }
    if let Err(e) = fs::remove_dir_all(dir) {
        warn!(dir = %dir.display(), error = %e, "failed to remove temporary directory");
    }
}
