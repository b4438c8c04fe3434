//! Output naming: counter-suffixed file names reserved atomically.
//!
//! Names follow `{prefix}_{counter:05}.{ext}`. Picking the next counter by
//! scanning alone races with concurrent writers, so reservation creates
//! the candidate with `create_new` and retries on collision; the winner
//! holds a zero-byte placeholder until the encoder renames the finished
//! file over it.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

/// A claimed output slot. The placeholder exists on disk from reservation
/// until the staged result is renamed over it, or until [`abort`].
///
/// [`abort`]: ReservedOutput::abort
#[derive(Debug)]
pub struct ReservedOutput {
    path: PathBuf,
    file_name: String,
    counter: u64,
}

impl ReservedOutput {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Release the slot after a failed run so the counter can be reused.
    pub fn abort(self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove placeholder");
        }
    }
}

/// Claim the next free counter under `dir` for `prefix`. Creates `dir` if
/// missing.
pub fn reserve_output(dir: &Path, prefix: &str, extension: &str) -> Result<ReservedOutput> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory {}", dir.display()))?;

    let mut counter = next_counter(dir, prefix, extension)?;
    loop {
        let file_name = format!("{prefix}_{counter:05}.{extension}");
        let path = dir.join(&file_name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => {
                debug!(path = %path.display(), counter, "reserved output slot");
                return Ok(ReservedOutput {
                    path,
                    file_name,
                    counter,
                });
            }
            // Lost the race for this counter, try the next one.
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => counter += 1,
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to reserve output {}", path.display()))
            }
        }
    }
}

/// Smallest counter above every existing `{prefix}_{counter}.{ext}` in
/// `dir`. Starts at 1 for an empty directory.
pub fn next_counter(dir: &Path, prefix: &str, extension: &str) -> Result<u64> {
    let mut max = 0u64;
    let entries = fs::read_dir(dir)
        .with_context(|| format!("failed to scan output directory {}", dir.display()))?;
    for entry in entries {
        let entry = entry.context("failed to read output directory entry")?;
        let name = entry.file_name();
        if let Some(counter) = parse_counter(&name.to_string_lossy(), prefix, extension) {
            max = max.max(counter);
        }
    }
    Ok(max + 1)
}

fn parse_counter(name: &str, prefix: &str, extension: &str) -> Option<u64> {
    let digits = name
        .strip_prefix(prefix)?
        .strip_prefix('_')?
        .strip_suffix(extension)?
        .strip_suffix('.')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Move `staged` into place at `dest`, replacing whatever is there. On
/// Unix the rename atomically replaces the placeholder.
pub fn replace_file(staged: &Path, dest: &Path) -> Result<()> {
    #[cfg(windows)]
    if dest.exists() {
        fs::remove_file(dest)
            .with_context(|| format!("failed to clear destination {}", dest.display()))?;
    }
    fs::rename(staged, dest).with_context(|| {
        format!(
            "failed to move {} into place at {}",
            staged.display(),
            dest.display()
        )
    })
}
