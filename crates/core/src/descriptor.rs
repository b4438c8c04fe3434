//! Node descriptors: static metadata for all registered node types.
//!
//! Descriptors provide display names, categories, colors, icons, and full
//! port definitions for a node editor frontend. They are a separate data
//! path from the runtime `Node::input_ports()`/`output_ports()` — the
//! runtime trait is unchanged.

use serde::Serialize;

use crate::heuristics::EncodeDefaults;

#[derive(Debug, Clone, Serialize)]
pub struct NodeDescriptor {
    pub node_type: String,
    pub display_name: String,
    /// "input", "processing", "output", "utility"
    pub category: String,
    /// Hex color, e.g. "#10B981"
    pub accent_color: String,
    /// Icon name, e.g. "film", "trash"
    pub icon: String,
    pub inputs: Vec<PortDescriptor>,
    pub outputs: Vec<PortDescriptor>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortDescriptor {
    pub name: String,
    /// "Frames", "Int", "Str", etc.
    pub port_type: String,
    /// "stream" or "param"
    pub direction: String,
    pub required: bool,
    pub default_value: Option<serde_json::Value>,
    /// Extra label text rendered next to the knob.
    pub ui_hint: Option<String>,
    pub enum_options: Option<Vec<String>>,
}

/// Helper to build a stream port descriptor.
fn stream(name: &str, port_type: &str) -> PortDescriptor {
    PortDescriptor {
        name: name.to_string(),
        port_type: port_type.to_string(),
        direction: "stream".to_string(),
        required: true,
        default_value: None,
        ui_hint: None,
        enum_options: None,
    }
}

/// Helper to build a required param port descriptor.
fn param_required(name: &str, port_type: &str) -> PortDescriptor {
    PortDescriptor {
        name: name.to_string(),
        port_type: port_type.to_string(),
        direction: "param".to_string(),
        required: true,
        default_value: None,
        ui_hint: None,
        enum_options: None,
    }
}

/// Helper to build an optional param port descriptor with a default value.
fn param_opt(name: &str, port_type: &str, default: serde_json::Value) -> PortDescriptor {
    PortDescriptor {
        name: name.to_string(),
        port_type: port_type.to_string(),
        direction: "param".to_string(),
        required: false,
        default_value: Some(default),
        ui_hint: None,
        enum_options: None,
    }
}

/// Returns descriptors for all registered node types.
///
/// Port data is hardcoded to match the runtime `Node` implementations,
/// with machine-derived defaults filled in from `defaults`. The chunk-size
/// knob carries the resource band label so the editor can show why the
/// default was chosen.
pub fn all_node_descriptors(defaults: &EncodeDefaults) -> Vec<NodeDescriptor> {
    vec![
        NodeDescriptor {
            node_type: "VideoCombine".to_string(),
            display_name: "Video Combine".to_string(),
            category: "output".to_string(),
            accent_color: "#10B981".to_string(),
            icon: "film".to_string(),
            inputs: vec![
                stream("frames", "Frames"),
                param_opt("frame_rate", "Int", serde_json::json!(16)),
                PortDescriptor {
                    enum_options: Some(vec!["h264".to_string(), "hevc".to_string()]),
                    ..param_opt("codec", "Str", serde_json::json!("h264"))
                },
                param_opt("crf", "Int", serde_json::json!(15)),
                param_opt("preset", "Str", serde_json::json!("fast")),
                PortDescriptor {
                    enum_options: Some(vec!["yuv420p".to_string(), "yuv444p".to_string()]),
                    ..param_opt("pix_fmt", "Str", serde_json::json!("yuv420p"))
                },
                PortDescriptor {
                    ui_hint: Some(format!("Chunk Size ({})", defaults.hint)),
                    ..param_opt("chunk_size", "Int", serde_json::json!(defaults.chunk_size))
                },
                param_opt(
                    "keep_in_memory",
                    "Bool",
                    serde_json::json!(defaults.keep_in_memory),
                ),
                param_opt("tile_size", "Int", serde_json::json!(defaults.tile_size)),
                param_opt("tile_overlap", "Int", serde_json::json!(8)),
                param_opt("filename_prefix", "Str", serde_json::json!("framepress")),
            ],
            outputs: vec![
                PortDescriptor {
                    direction: "param".to_string(),
                    ..param_required("path", "Path")
                },
                PortDescriptor {
                    direction: "param".to_string(),
                    ..param_required("filename", "Str")
                },
                PortDescriptor {
                    direction: "param".to_string(),
                    ..param_required("counter", "Int")
                },
            ],
        },
        NodeDescriptor {
            node_type: "MemoryReclaim".to_string(),
            display_name: "Memory Reclaim".to_string(),
            category: "utility".to_string(),
            accent_color: "#6366F1".to_string(),
            icon: "recycle".to_string(),
            inputs: vec![param_opt("value", "Str", serde_json::json!(""))],
            outputs: vec![PortDescriptor {
                direction: "param".to_string(),
                required: false,
                ..param_required("value", "Str")
            }],
        },
        NodeDescriptor {
            node_type: "DeletePath".to_string(),
            display_name: "Delete Path".to_string(),
            category: "utility".to_string(),
            accent_color: "#EF4444".to_string(),
            icon: "trash".to_string(),
            inputs: vec![
                PortDescriptor {
                    ui_hint: Some("Relative path ('.' clears the whole directory)".to_string()),
                    ..param_opt("path", "Str", serde_json::json!(""))
                },
                PortDescriptor {
                    enum_options: Some(vec![
                        "output".to_string(),
                        "input".to_string(),
                        "temp".to_string(),
                    ]),
                    ..param_opt("target", "Str", serde_json::json!("output"))
                },
            ],
            outputs: vec![
                PortDescriptor {
                    direction: "param".to_string(),
                    ..param_required("success", "Bool")
                },
                PortDescriptor {
                    direction: "param".to_string(),
                    ..param_required("message", "Str")
                },
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> EncodeDefaults {
        EncodeDefaults {
            chunk_size: 8,
            tile_size: 1024,
            keep_in_memory: false,
            hint: "balanced",
        }
    }

    #[test]
    fn test_all_node_descriptors_count() {
        let descs = all_node_descriptors(&defaults());
        assert_eq!(descs.len(), 3);
    }

    #[test]
    fn test_all_node_types_unique() {
        let descs = all_node_descriptors(&defaults());
        let mut types: Vec<&str> = descs.iter().map(|d| d.node_type.as_str()).collect();
        types.sort();
        types.dedup();
        assert_eq!(types.len(), 3);
    }

    #[test]
    fn test_video_combine_descriptor_carries_resource_hint() {
        let descs = all_node_descriptors(&defaults());
        let vc = descs
            .iter()
            .find(|d| d.node_type == "VideoCombine")
            .expect("VideoCombine descriptor should exist");

        let chunk_size = vc
            .inputs
            .iter()
            .find(|p| p.name == "chunk_size")
            .expect("chunk_size input should exist");
        assert_eq!(chunk_size.ui_hint.as_deref(), Some("Chunk Size (balanced)"));
        assert_eq!(chunk_size.default_value, Some(serde_json::json!(8)));

        let keep = vc
            .inputs
            .iter()
            .find(|p| p.name == "keep_in_memory")
            .expect("keep_in_memory input should exist");
        assert_eq!(keep.default_value, Some(serde_json::json!(false)));
    }

    #[test]
    fn test_video_combine_enum_options() {
        let descs = all_node_descriptors(&defaults());
        let vc = descs.iter().find(|d| d.node_type == "VideoCombine").unwrap();

        let codec = vc.inputs.iter().find(|p| p.name == "codec").unwrap();
        assert_eq!(
            codec.enum_options,
            Some(vec!["h264".to_string(), "hevc".to_string()])
        );

        let pix_fmt = vc.inputs.iter().find(|p| p.name == "pix_fmt").unwrap();
        assert_eq!(
            pix_fmt.enum_options,
            Some(vec!["yuv420p".to_string(), "yuv444p".to_string()])
        );
    }

    #[test]
    fn test_delete_path_target_options() {
        let descs = all_node_descriptors(&defaults());
        let dp = descs.iter().find(|d| d.node_type == "DeletePath").unwrap();

        let target = dp.inputs.iter().find(|p| p.name == "target").unwrap();
        assert_eq!(
            target.enum_options,
            Some(vec![
                "output".to_string(),
                "input".to_string(),
                "temp".to_string()
            ])
        );
    }

    #[test]
    fn test_delete_path_hints_clear_convention() {
        let descs = all_node_descriptors(&defaults());
        let dp = descs.iter().find(|d| d.node_type == "DeletePath").unwrap();

        let path = dp.inputs.iter().find(|p| p.name == "path").unwrap();
        let hint = path.ui_hint.as_deref().unwrap_or_default();
        assert!(hint.contains("'.'"), "hint should name the '.' convention: {hint}");
    }

    #[test]
    fn test_descriptors_serialize() {
        let descs = all_node_descriptors(&defaults());
        let json = serde_json::to_string(&descs).expect("should serialize");
        assert!(json.contains("VideoCombine"));
        assert!(json.contains("MemoryReclaim"));
        assert!(json.contains("DeletePath"));
    }

    #[test]
    fn test_directions_valid() {
        let descs = all_node_descriptors(&defaults());
        for desc in &descs {
            for port in desc.inputs.iter().chain(desc.outputs.iter()) {
                assert!(
                    port.direction == "stream" || port.direction == "param",
                    "invalid direction '{}' on port '{}' of node '{}'",
                    port.direction,
                    port.name,
                    desc.node_type
                );
            }
        }
    }
}
