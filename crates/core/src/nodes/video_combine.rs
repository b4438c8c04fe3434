//! VideoCombine node: materialized frame sequence in, MP4 file out.
//!
//! Streams frames into an FFmpeg subprocess, either whole-sequence or in
//! chunks spliced by a stream-copy concat, with optional tiling of each
//! frame to bound per-write memory. The output file name is reserved
//! atomically before any encoding starts so concurrent runs never collide
//! on a counter.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Result};
use tracing::{debug, info, trace};

use crate::chunker;
use crate::encoder::{self, Codec, EncodeJob, TilingOptions};
use crate::heuristics::{recommend, EncodeDefaults, ResourceProfile};
use crate::node::{ExecutionContext, Node, PortDefinition};
use crate::output;
use crate::types::{PortData, PortType};

pub const OUTPUT_EXTENSION: &str = "mp4";

pub struct VideoCombineNode {
    output_dir: PathBuf,
    defaults: EncodeDefaults,
}

impl VideoCombineNode {
    /// Defaults for chunking and tiling are derived from the machine once,
    /// at construction.
    pub fn new(output_dir: PathBuf) -> Self {
        Self::with_defaults(output_dir, recommend(&ResourceProfile::measure()))
    }

    pub fn with_defaults(output_dir: PathBuf, defaults: EncodeDefaults) -> Self {
        Self {
            output_dir,
            defaults,
        }
    }
}

impl Node for VideoCombineNode {
    fn node_type(&self) -> &str {
        "VideoCombine"
    }

    fn input_ports(&self) -> Vec<PortDefinition> {
        vec![
            PortDefinition {
                name: "frames".to_string(),
                port_type: PortType::Frames,
                required: true,
                default_value: None,
            },
            PortDefinition {
                name: "frame_rate".to_string(),
                port_type: PortType::Int,
                required: false,
                default_value: Some(serde_json::json!(16)),
            },
            PortDefinition {
                name: "codec".to_string(),
                port_type: PortType::Str,
                required: false,
                default_value: Some(serde_json::json!("h264")),
            },
            PortDefinition {
                name: "crf".to_string(),
                port_type: PortType::Int,
                required: false,
                default_value: Some(serde_json::json!(15)),
            },
            PortDefinition {
                name: "preset".to_string(),
                port_type: PortType::Str,
                required: false,
                default_value: Some(serde_json::json!("fast")),
            },
            PortDefinition {
                name: "pix_fmt".to_string(),
                port_type: PortType::Str,
                required: false,
                default_value: Some(serde_json::json!("yuv420p")),
            },
            PortDefinition {
                name: "chunk_size".to_string(),
                port_type: PortType::Int,
                required: false,
                default_value: Some(serde_json::json!(self.defaults.chunk_size)),
            },
            PortDefinition {
                name: "keep_in_memory".to_string(),
                port_type: PortType::Bool,
                required: false,
                default_value: Some(serde_json::json!(self.defaults.keep_in_memory)),
            },
            PortDefinition {
                name: "tile_size".to_string(),
                port_type: PortType::Int,
                required: false,
                default_value: Some(serde_json::json!(self.defaults.tile_size)),
            },
            PortDefinition {
                name: "tile_overlap".to_string(),
                port_type: PortType::Int,
                required: false,
                default_value: Some(serde_json::json!(8)),
            },
            PortDefinition {
                name: "filename_prefix".to_string(),
                port_type: PortType::Str,
                required: false,
                default_value: Some(serde_json::json!("framepress")),
            },
        ]
    }

    fn output_ports(&self) -> Vec<PortDefinition> {
        vec![
            PortDefinition {
                name: "path".to_string(),
                port_type: PortType::Path,
                required: true,
                default_value: None,
            },
            PortDefinition {
                name: "filename".to_string(),
                port_type: PortType::Str,
                required: true,
                default_value: None,
            },
            PortDefinition {
                name: "counter".to_string(),
                port_type: PortType::Int,
                required: true,
                default_value: None,
            },
        ]
    }

    fn execute(
        &mut self,
        inputs: &HashMap<String, PortData>,
        _ctx: &ExecutionContext,
    ) -> Result<HashMap<String, PortData>> {
        let seq = match inputs.get("frames") {
            Some(PortData::Frames(seq)) => seq,
            _ => bail!("missing or invalid 'frames' input (expected Frames)"),
        };

        if seq.is_empty() {
            bail!("no frames to encode");
        }

        let frame_rate = match inputs.get("frame_rate") {
            Some(PortData::Int(v)) => {
                if *v <= 0 {
                    bail!("frame_rate must be positive, got {}", v);
                }
                *v as u32
            }
            _ => 16,
        };

        let codec = match inputs.get("codec") {
            Some(PortData::Str(s)) => Codec::parse(s)?,
            _ => Codec::H264,
        };

        let crf = match inputs.get("crf") {
            Some(PortData::Int(v)) => {
                if !(0..=51).contains(v) {
                    bail!("crf must be in 0..=51, got {}", v);
                }
                *v
            }
            _ => 15,
        };

        let preset = match inputs.get("preset") {
            Some(PortData::Str(s)) => s.clone(),
            _ => "fast".to_string(),
        };

        let pix_fmt = match inputs.get("pix_fmt") {
            Some(PortData::Str(s)) => s.clone(),
            _ => "yuv420p".to_string(),
        };

        let chunk_size = match inputs.get("chunk_size") {
            Some(PortData::Int(v)) => {
                if *v < 0 {
                    bail!("chunk_size must not be negative, got {}", v);
                }
                *v as usize
            }
            _ => self.defaults.chunk_size.max(0) as usize,
        };

        let keep_in_memory = match inputs.get("keep_in_memory") {
            Some(PortData::Bool(v)) => *v,
            _ => self.defaults.keep_in_memory,
        };

        let tile_size = match inputs.get("tile_size") {
            Some(PortData::Int(v)) => {
                if *v < 0 {
                    bail!("tile_size must not be negative, got {}", v);
                }
                *v as usize
            }
            _ => self.defaults.tile_size.max(0) as usize,
        };

        let tile_overlap = match inputs.get("tile_overlap") {
            Some(PortData::Int(v)) => {
                if *v < 0 {
                    bail!("tile_overlap must not be negative, got {}", v);
                }
                *v as usize
            }
            _ => 8,
        };

        let filename_prefix = match inputs.get("filename_prefix") {
            Some(PortData::Str(s)) if !s.trim().is_empty() => s.clone(),
            _ => "framepress".to_string(),
        };

        // Tiling disabled entirely when tile_size is zero.
        let tiling = if tile_size > 0 {
            if tile_overlap >= tile_size {
                bail!(
                    "tile_overlap {} must be smaller than tile_size {}",
                    tile_overlap,
                    tile_size
                );
            }
            Some(TilingOptions {
                tile_size,
                overlap: tile_overlap,
            })
        } else {
            None
        };

        let job = EncodeJob {
            frame_rate,
            codec,
            crf,
            preset,
            pix_fmt,
        };

        let reserved = output::reserve_output(&self.output_dir, &filename_prefix, OUTPUT_EXTENSION)?;

        debug!(
            frames = seq.frame_count(),
            width = seq.width(),
            height = seq.height(),
            codec = codec.name(),
            chunk_size,
            keep_in_memory,
            tile_size,
            output = %reserved.path().display(),
            "starting encode"
        );

        let total = seq.frame_count();
        let mut progress = |done: usize| {
            trace!(frames_done = done, frames_total = total, "encode progress");
        };

        let result = if keep_in_memory || chunk_size == 0 {
            encoder::encode_sequence(seq, &job, tiling, reserved.path(), &mut progress)
        } else {
            chunker::encode_chunked(seq, &job, tiling, chunk_size, reserved.path(), &mut progress)
        };

        if let Err(error) = result {
            reserved.abort();
            return Err(error);
        }

        info!(
            path = %reserved.path().display(),
            frames = total,
            "encode finished"
        );

        let mut outputs = HashMap::new();
        outputs.insert(
            "path".to_string(),
            PortData::Path(reserved.path().to_path_buf()),
        );
        outputs.insert(
            "filename".to_string(),
            PortData::Str(reserved.file_name().to_string()),
        );
        outputs.insert(
            "counter".to_string(),
            PortData::Int(reserved.counter() as i64),
        );
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FrameSequence;

    fn test_node() -> VideoCombineNode {
        let defaults = EncodeDefaults {
            chunk_size: 8,
            tile_size: 0,
            keep_in_memory: true,
            hint: "performance",
        };
        VideoCombineNode::with_defaults(std::env::temp_dir().join("framepress-out"), defaults)
    }

    fn frames_input(frames: usize) -> PortData {
        let seq =
            FrameSequence::from_raw(vec![0u8; frames * 2 * 2 * 3], frames, 2, 2, 3).unwrap();
        PortData::Frames(seq)
    }

    #[test]
    fn test_node_type() {
        assert_eq!(test_node().node_type(), "VideoCombine");
    }

    #[test]
    fn test_input_ports_defaults() {
        let node = test_node();
        let ports = node.input_ports();

        let names: Vec<&str> = ports.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "frames",
                "frame_rate",
                "codec",
                "crf",
                "preset",
                "pix_fmt",
                "chunk_size",
                "keep_in_memory",
                "tile_size",
                "tile_overlap",
                "filename_prefix",
            ]
        );

        let required: Vec<&str> = ports
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(required, vec!["frames"]);

        let frame_rate = ports.iter().find(|p| p.name == "frame_rate").unwrap();
        assert_eq!(frame_rate.default_value, Some(serde_json::json!(16)));

        // Machine-derived knobs carry the measured defaults.
        let chunk_size = ports.iter().find(|p| p.name == "chunk_size").unwrap();
        assert_eq!(chunk_size.default_value, Some(serde_json::json!(8)));
        let keep = ports.iter().find(|p| p.name == "keep_in_memory").unwrap();
        assert_eq!(keep.default_value, Some(serde_json::json!(true)));
    }

    #[test]
    fn test_output_ports() {
        let node = test_node();
        let ports = node.output_ports();
        assert_eq!(ports.len(), 3);
        assert_eq!(ports[0].name, "path");
        assert_eq!(ports[0].port_type, PortType::Path);
        assert_eq!(ports[1].name, "filename");
        assert_eq!(ports[1].port_type, PortType::Str);
        assert_eq!(ports[2].name, "counter");
        assert_eq!(ports[2].port_type, PortType::Int);
    }

    #[test]
    fn test_execute_missing_frames() {
        let mut node = test_node();
        let ctx = ExecutionContext::default();
        let result = node.execute(&HashMap::new(), &ctx);
        let msg = result.err().expect("should be Err").to_string();
        assert!(msg.contains("frames"), "error: {msg}");
    }

    #[test]
    fn test_execute_empty_sequence() {
        let mut node = test_node();
        let ctx = ExecutionContext::default();
        let inputs = HashMap::from([("frames".to_string(), frames_input(0))]);
        let msg = node
            .execute(&inputs, &ctx)
            .err()
            .expect("should be Err")
            .to_string();
        assert!(msg.contains("no frames"), "error: {msg}");
    }

    #[test]
    fn test_execute_rejects_bad_codec() {
        let mut node = test_node();
        let ctx = ExecutionContext::default();
        let inputs = HashMap::from([
            ("frames".to_string(), frames_input(2)),
            ("codec".to_string(), PortData::Str("av1".to_string())),
        ]);
        let msg = node
            .execute(&inputs, &ctx)
            .err()
            .expect("should be Err")
            .to_string();
        assert!(msg.contains("unsupported codec"), "error: {msg}");
    }

    #[test]
    fn test_execute_rejects_bad_crf() {
        let mut node = test_node();
        let ctx = ExecutionContext::default();
        let inputs = HashMap::from([
            ("frames".to_string(), frames_input(2)),
            ("crf".to_string(), PortData::Int(99)),
        ]);
        let msg = node
            .execute(&inputs, &ctx)
            .err()
            .expect("should be Err")
            .to_string();
        assert!(msg.contains("crf"), "error: {msg}");
    }

    #[test]
    fn test_execute_rejects_bad_frame_rate() {
        let mut node = test_node();
        let ctx = ExecutionContext::default();
        let inputs = HashMap::from([
            ("frames".to_string(), frames_input(2)),
            ("frame_rate".to_string(), PortData::Int(0)),
        ]);
        let msg = node
            .execute(&inputs, &ctx)
            .err()
            .expect("should be Err")
            .to_string();
        assert!(msg.contains("frame_rate"), "error: {msg}");
    }

    #[test]
    fn test_execute_rejects_overlap_not_smaller_than_tile() {
        let mut node = test_node();
        let ctx = ExecutionContext::default();
        let inputs = HashMap::from([
            ("frames".to_string(), frames_input(2)),
            ("tile_size".to_string(), PortData::Int(8)),
            ("tile_overlap".to_string(), PortData::Int(8)),
        ]);
        let msg = node
            .execute(&inputs, &ctx)
            .err()
            .expect("should be Err")
            .to_string();
        assert!(msg.contains("tile_overlap"), "error: {msg}");
    }

    #[test]
    fn test_validation_failure_releases_reservation() {
        // Bad codec fails before any output slot is reserved, so the
        // directory stays empty.
        let dir = tempfile::tempdir().expect("tempdir should create");
        let defaults = EncodeDefaults {
            chunk_size: 8,
            tile_size: 0,
            keep_in_memory: true,
            hint: "performance",
        };
        let mut node = VideoCombineNode::with_defaults(dir.path().to_path_buf(), defaults);
        let ctx = ExecutionContext::default();
        let inputs = HashMap::from([
            ("frames".to_string(), frames_input(2)),
            ("codec".to_string(), PortData::Str("vp9".to_string())),
        ]);

        assert!(node.execute(&inputs, &ctx).is_err());
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .map(|it| it.collect::<Vec<_>>())
            .unwrap_or_default();
        assert!(entries.is_empty(), "no files should remain: {entries:?}");
    }
}
