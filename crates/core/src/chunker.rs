//! Chunked encode driver: split a long sequence into fixed-size runs of
//! frames, encode each run to its own intermediate file, then splice the
//! pieces back together with a stream-copy concat.
//!
//! Chunking bounds encoder memory for long sequences. Intermediate files
//! live in a per-run directory next to the final output and are removed
//! whether the encode succeeds or fails; the final output only appears
//! after a successful concat.

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use crate::encoder::{self, EncodeJob, EncoderProcess, TilingOptions};
use crate::types::FrameSequence;

/// Split `total` frames into contiguous runs of at most `chunk_size`.
/// The last run absorbs the remainder. `chunk_size == 0` disables
/// splitting and yields the whole sequence as one run.
pub fn chunk_ranges(total: usize, chunk_size: usize) -> Vec<Range<usize>> {
    if total == 0 {
        return Vec::new();
    }
    if chunk_size == 0 {
        return vec![0..total];
    }
    let mut ranges = Vec::with_capacity(total.div_ceil(chunk_size));
    let mut start = 0;
    while start < total {
        let end = (start + chunk_size).min(total);
        ranges.push(start..end);
        start = end;
    }
    ranges
}

/// Write a concat demuxer manifest: one `file '<path>'` line per chunk,
/// in splice order. Paths should be absolute so the demuxer does not
/// resolve them relative to the manifest location.
pub fn write_manifest(path: &Path, chunks: &[PathBuf]) -> Result<()> {
    let mut body = String::new();
    for chunk in chunks {
        body.push_str(&format!("file '{}'\n", chunk.display()));
    }
    fs::write(path, body)
        .with_context(|| format!("failed to write concat manifest {}", path.display()))
}

/// Encode `seq` in chunks of `chunk_size` frames and concatenate the
/// result to `output`. `progress` receives the total number of frames
/// completed so far across all chunks.
pub fn encode_chunked(
    seq: &FrameSequence,
    job: &EncodeJob,
    tiling: Option<TilingOptions>,
    chunk_size: usize,
    output: &Path,
    progress: &mut dyn FnMut(usize),
) -> Result<()> {
    if seq.is_empty() {
        bail!("no frames to encode");
    }
    if chunk_size == 0 {
        bail!("chunk_size must be positive for chunked encoding");
    }

    let work_dir = chunk_dir_for(output);
    fs::create_dir_all(&work_dir)
        .with_context(|| format!("failed to create chunk directory {}", work_dir.display()))?;

    let result = run_chunks(seq, job, tiling, chunk_size, &work_dir, output, progress);
    encoder::remove_dir_best_effort(&work_dir);
    result
}

#[allow(clippy::too_many_arguments)]
fn run_chunks(
    seq: &FrameSequence,
    job: &EncodeJob,
    tiling: Option<TilingOptions>,
    chunk_size: usize,
    work_dir: &Path,
    output: &Path,
    progress: &mut dyn FnMut(usize),
) -> Result<()> {
    let ranges = chunk_ranges(seq.frame_count(), chunk_size);
    info!(
        frames = seq.frame_count(),
        chunks = ranges.len(),
        chunk_size,
        "encoding in chunks"
    );

    let mut chunk_files = Vec::with_capacity(ranges.len());
    for (index, range) in ranges.iter().enumerate() {
        let chunk_path = work_dir.join(format!("chunk_{index:03}.mp4"));
        debug!(
            chunk = index,
            start = range.start,
            end = range.end,
            "encoding chunk"
        );

        let offset = range.start;
        encoder::encode_clip(seq, range.clone(), job, tiling, &chunk_path, &mut |done| {
            progress(offset + done)
        })?;

        let absolute = fs::canonicalize(&chunk_path)
            .with_context(|| format!("failed to resolve chunk path {}", chunk_path.display()))?;
        chunk_files.push(absolute);
    }

    let manifest = work_dir.join("concat_list.txt");
    write_manifest(&manifest, &chunk_files)?;

    let staged = work_dir.join("combined.mp4");
    let mut process = EncoderProcess::spawn(&EncodeJob::concat_args(&manifest, &staged))?;
    process.finish().context("chunk concatenation failed")?;

    crate::output::replace_file(&staged, output)
}

fn chunk_dir_for(output: &Path) -> PathBuf {
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    parent.join(format!("framepress_chunks_{}", std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Codec;

    #[test]
    fn test_chunk_ranges_with_remainder() {
        assert_eq!(chunk_ranges(20, 8), vec![0..8, 8..16, 16..20]);
    }

    #[test]
    fn test_chunk_ranges_exact_multiple() {
        assert_eq!(chunk_ranges(16, 8), vec![0..8, 8..16]);
    }

    #[test]
    fn test_chunk_ranges_short_sequence() {
        assert_eq!(chunk_ranges(3, 8), vec![0..3]);
    }

    #[test]
    fn test_chunk_ranges_empty() {
        assert!(chunk_ranges(0, 8).is_empty());
    }

    #[test]
    fn test_chunk_ranges_zero_size_means_whole_sequence() {
        assert_eq!(chunk_ranges(20, 0), vec![0..20]);
    }

    #[test]
    fn test_chunk_ranges_cover_every_frame_once() {
        for (total, size) in [(1, 1), (7, 3), (24, 6), (100, 12)] {
            let ranges = chunk_ranges(total, size);
            let mut next = 0;
            for range in &ranges {
                assert_eq!(range.start, next, "gap or overlap at {range:?}");
                assert!(range.end > range.start);
                next = range.end;
            }
            assert_eq!(next, total);
        }
    }

    #[test]
    fn test_write_manifest_format() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let manifest = dir.path().join("concat_list.txt");
        let chunks = vec![
            dir.path().join("chunk_000.mp4"),
            dir.path().join("chunk_001.mp4"),
        ];

        write_manifest(&manifest, &chunks).expect("manifest should write");

        let body = std::fs::read_to_string(&manifest).expect("manifest should read back");
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], format!("file '{}'", chunks[0].display()));
        assert_eq!(lines[1], format!("file '{}'", chunks[1].display()));
    }

    #[test]
    fn test_encode_chunked_rejects_bad_inputs() {
        let job = EncodeJob {
            frame_rate: 16,
            codec: Codec::H264,
            crf: 15,
            preset: "fast".to_string(),
            pix_fmt: "yuv420p".to_string(),
        };
        let output = std::env::temp_dir().join("chunked.mp4");

        let empty = FrameSequence::from_raw(Vec::new(), 0, 2, 2, 3).unwrap();
        assert!(encode_chunked(&empty, &job, None, 8, &output, &mut |_| {}).is_err());

        let seq = FrameSequence::from_raw(vec![0u8; 12], 1, 2, 2, 3).unwrap();
        let err = encode_chunked(&seq, &job, None, 0, &output, &mut |_| {})
            .err()
            .expect("chunk_size 0 should fail");
        assert!(err.to_string().contains("chunk_size"), "error: {err}");
    }
}
