use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Materialized 8-bit frame sequence, packed `[T, H, W, C]` with C = 1 or 3.
///
/// Produced once per node invocation and immutable for the duration of an
/// encode. Grayscale sequences (C = 1) are broadcast to RGB at serialization
/// time, not here.
#[derive(Clone)]
pub struct FrameSequence {
    data: Vec<u8>,
    frames: usize,
    height: usize,
    width: usize,
    channels: usize,
}

impl FrameSequence {
    pub fn from_raw(
        data: Vec<u8>,
        frames: usize,
        height: usize,
        width: usize,
        channels: usize,
    ) -> Result<Self> {
        if channels != 1 && channels != 3 {
            bail!("unsupported channel depth {channels}, expected 1 or 3");
        }
        let expected = frames * height * width * channels;
        if data.len() != expected {
            bail!(
                "frame buffer length mismatch: expected {expected} bytes for \
                 [{frames}, {height}, {width}, {channels}], got {}",
                data.len()
            );
        }
        Ok(Self {
            data,
            frames,
            height,
            width,
            channels,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// Bytes per frame as stored (before any grayscale broadcast).
    pub fn frame_len(&self) -> usize {
        self.height * self.width * self.channels
    }

    /// Packed bytes of one frame in scan order.
    pub fn frame(&self, index: usize) -> &[u8] {
        let len = self.frame_len();
        &self.data[index * len..(index + 1) * len]
    }
}

/// Port type identifier for connection validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortType {
    Frames,
    Int,
    Float,
    Str,
    Bool,
    Path,
}

impl PortType {
    pub fn is_compatible(&self, other: &PortType) -> bool {
        self == other
    }
}

/// Data types that can flow between node ports.
#[derive(Clone)]
pub enum PortData {
    Frames(FrameSequence),
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Path(PathBuf),
}
