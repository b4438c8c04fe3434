use std::collections::HashMap;

use anyhow::Result;

use crate::types::{PortData, PortType};

#[derive(Debug, Clone, PartialEq)]
pub struct PortDefinition {
    pub name: String,
    pub port_type: PortType,
    pub required: bool,
    pub default_value: Option<serde_json::Value>,
}

#[derive(Default)]
pub struct ExecutionContext {
    pub total_frames: Option<u64>,
    pub current_frame: u64,
}

impl ExecutionContext {
    pub fn progress(&self) -> Option<f32> {
        let total = self.total_frames?;
        if total == 0 {
            return Some(0.0);
        }

        Some((self.current_frame as f32 / total as f32).clamp(0.0, 1.0))
    }
}

/// Core node trait that all nodes implement.
pub trait Node: Send + Sync {
    fn node_type(&self) -> &str;
    fn input_ports(&self) -> Vec<PortDefinition>;
    fn output_ports(&self) -> Vec<PortDefinition>;
    fn execute(
        &mut self,
        inputs: &HashMap<String, PortData>,
        ctx: &ExecutionContext,
    ) -> Result<HashMap<String, PortData>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_definition_creation() {
        let input = PortDefinition {
            name: "frames".to_string(),
            port_type: PortType::Frames,
            required: true,
            default_value: None,
        };

        let knob = PortDefinition {
            name: "crf".to_string(),
            port_type: PortType::Int,
            required: false,
            default_value: Some(serde_json::json!(15)),
        };

        assert_eq!(input.name, "frames");
        assert_eq!(input.port_type, PortType::Frames);
        assert!(input.required);
        assert!(input.default_value.is_none());

        assert_eq!(knob.name, "crf");
        assert_eq!(knob.port_type, PortType::Int);
        assert!(!knob.required);
        assert_eq!(knob.default_value, Some(serde_json::json!(15)));
    }

    #[test]
    fn test_progress_reporting() {
        let mut ctx = ExecutionContext::default();
        assert_eq!(ctx.progress(), None);

        ctx.total_frames = Some(0);
        assert_eq!(ctx.progress(), Some(0.0));

        ctx.total_frames = Some(10);
        ctx.current_frame = 5;
        assert_eq!(ctx.progress(), Some(0.5));
    }
}
