//! DeletePath node: remove files or folders inside a managed directory.
//!
//! The node is sandboxed to the configured output/input/temp directories
//! and never fails the workflow: every outcome, including a denied or
//! failed deletion, is reported through the `success` and `message`
//! output ports instead of an error. A `path` of `.` clears the selected
//! directory's entries while keeping the directory itself.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::Result;
use tracing::{info, warn};

use crate::config::PathsConfig;
use crate::node::{ExecutionContext, Node, PortDefinition};
use crate::types::{PortData, PortType};

pub struct DeletePathNode {
    paths: PathsConfig,
}

impl DeletePathNode {
    pub fn new(paths: PathsConfig) -> Self {
        Self { paths }
    }

    fn run(&self, path_input: Option<&str>, target: &str) -> (bool, String) {
        let Some(raw_path) = path_input.map(str::trim).filter(|p| !p.is_empty()) else {
            return (false, "No path provided for delete_path action".to_string());
        };

        let Some(base) = self.paths.sandbox_root(target) else {
            return (false, format!("Unknown target directory: {target}"));
        };

        if !base.is_dir() {
            return (false, format!("Directory does not exist: {}", base.display()));
        }

        let base_normalized = normalize_lexically(base);
        let candidate = normalize_lexically(&base.join(raw_path));

        if !candidate.starts_with(&base_normalized) {
            return (
                false,
                format!("Access denied - path is outside {target} directory"),
            );
        }

        if !candidate.exists() {
            return (false, format!("Path does not exist: {}", candidate.display()));
        }

        let outcome = if candidate == base_normalized {
            clear_directory(&candidate)
        } else if candidate.is_dir() {
            fs::remove_dir_all(&candidate)
                .map(|()| format!("Deleted directory: {}", candidate.display()))
        } else {
            fs::remove_file(&candidate)
                .map(|()| format!("Deleted file: {}", candidate.display()))
        };

        match outcome {
            Ok(message) => {
                info!(path = %candidate.display(), target, "{message}");
                (true, message)
            }
            Err(error) => {
                warn!(path = %candidate.display(), error = %error, "deletion failed");
                (
                    false,
                    format!("Failed to delete {}: {error}", candidate.display()),
                )
            }
        }
    }
}

impl Node for DeletePathNode {
    fn node_type(&self) -> &str {
        "DeletePath"
    }

    fn input_ports(&self) -> Vec<PortDefinition> {
        vec![
            PortDefinition {
                name: "path".to_string(),
                port_type: PortType::Str,
                required: false,
                default_value: Some(serde_json::json!("")),
            },
            PortDefinition {
                name: "target".to_string(),
                port_type: PortType::Str,
                required: false,
                default_value: Some(serde_json::json!("output")),
            },
        ]
    }

    fn output_ports(&self) -> Vec<PortDefinition> {
        vec![
            PortDefinition {
                name: "success".to_string(),
                port_type: PortType::Bool,
                required: true,
                default_value: None,
            },
            PortDefinition {
                name: "message".to_string(),
                port_type: PortType::Str,
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
        let path_input = match inputs.get("path") {
            Some(PortData::Str(s)) => Some(s.as_str()),
            Some(PortData::Path(p)) => p.to_str(),
            _ => None,
        };
        let target = match inputs.get("target") {
            Some(PortData::Str(s)) => s.as_str(),
            _ => "output",
        };

        let (success, message) = self.run(path_input, target);

        let mut outputs = HashMap::new();
        outputs.insert("success".to_string(), PortData::Bool(success));
        outputs.insert("message".to_string(), PortData::Str(message));
        Ok(outputs)
    }
}

/// Resolve `.` and `..` components without touching the filesystem, so
/// the containment check also covers paths that do not exist yet.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Remove everything inside `dir`, keeping the directory itself. Counts
/// are per direct entry; a removed subdirectory is one folder no matter
/// what it contained.
fn clear_directory(dir: &Path) -> std::io::Result<String> {
    let mut files = 0u64;
    let mut folders = 0u64;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)?;
            folders += 1;
        } else {
            fs::remove_file(&path)?;
            files += 1;
        }
    }

    Ok(format!(
        "Cleared {files} files and {folders} folders from {}",
        dir.display()
    ))
}
