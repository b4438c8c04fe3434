//! Resource-aware encode defaults.
//!
//! Machines with little RAM or accelerator memory get small chunks and
//! tiled streaming; well-provisioned machines keep everything in memory
//! and skip tiling. The recommendation only seeds node defaults, the
//! caller can always override each knob.

use sysinfo::System;
use tracing::debug;

pub const GIB: u64 = 1024 * 1024 * 1024;

/// Snapshot of the memory available to this process.
#[derive(Debug, Clone, Copy)]
pub struct ResourceProfile {
    pub ram_bytes: u64,
    /// Dedicated accelerator memory, if a device was detected. Absent
    /// counts as zero when recommending, the conservative reading.
    pub accel_bytes: Option<u64>,
}

impl ResourceProfile {
    pub fn measure() -> Self {
        Self::with_accel(None)
    }

    /// Measure system RAM; accelerator memory is supplied by the host
    /// integration when one is present.
    pub fn with_accel(accel_bytes: Option<u64>) -> Self {
        let mut system = System::new();
        system.refresh_memory();
        let profile = Self {
            ram_bytes: system.total_memory(),
            accel_bytes,
        };
        debug!(
            ram_gib = profile.ram_bytes / GIB,
            accel_gib = profile.accel_bytes.map(|b| b / GIB),
            "measured resource profile"
        );
        profile
    }
}

/// Default knob values for the encode node, derived from the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeDefaults {
    pub chunk_size: i64,
    pub tile_size: i64,
    pub keep_in_memory: bool,
    /// Short label describing which band the machine fell into, surfaced
    /// next to the chunk-size knob in the UI.
    pub hint: &'static str,
}

pub fn recommend(profile: &ResourceProfile) -> EncodeDefaults {
    let ram = profile.ram_bytes;
    let accel = profile.accel_bytes.unwrap_or(0);

    if ram < 16 * GIB || accel < 10 * GIB {
        EncodeDefaults {
            chunk_size: 6,
            tile_size: 1024,
            keep_in_memory: false,
            hint: "low-memory",
        }
    } else if ram < 32 * GIB || accel < 16 * GIB {
        EncodeDefaults {
            chunk_size: 8,
            tile_size: 1024,
            keep_in_memory: false,
            hint: "balanced",
        }
    } else {
        EncodeDefaults {
            chunk_size: 12,
            tile_size: 0,
            keep_in_memory: true,
            hint: "performance",
        }
    }
}
