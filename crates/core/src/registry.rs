use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

use crate::config::PathsConfig;
use crate::node::Node;

type NodeFactory =
    dyn Fn(HashMap<String, serde_json::Value>) -> Result<Box<dyn Node>> + Send + Sync;

pub struct NodeRegistry {
    factories: HashMap<String, Box<NodeFactory>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, node_type: &str, factory: F)
    where
        F: Fn(HashMap<String, serde_json::Value>) -> Result<Box<dyn Node>> + Send + Sync + 'static,
    {
        self.factories
            .insert(node_type.to_string(), Box::new(factory));
    }

    pub fn create(
        &self,
        node_type: &str,
        params: HashMap<String, serde_json::Value>,
    ) -> Result<Box<dyn Node>> {
        let factory = self
            .factories
            .get(node_type)
            .ok_or_else(|| anyhow!("unknown node type: {node_type}"))?;

        factory(params)
    }

    pub fn list_node_types(&self) -> Vec<&str> {
        let mut node_types: Vec<&str> = self.factories.keys().map(|v| v.as_str()).collect();
        node_types.sort_unstable();
        node_types
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Register all node types against the configured managed directories.
pub fn register_all_nodes(registry: &mut NodeRegistry, paths: &PathsConfig) {
    use crate::nodes::delete_path::DeletePathNode;
    use crate::nodes::memory_reclaim::MemoryReclaimNode;
    use crate::nodes::video_combine::VideoCombineNode;

    let output_dir: PathBuf = paths.output_dir.clone();
    registry.register("VideoCombine", move |_params| {
        Ok(Box::new(VideoCombineNode::new(output_dir.clone())))
    });

    registry.register("MemoryReclaim", |_params| {
        Ok(Box::new(MemoryReclaimNode::new()))
    });

    let delete_paths = paths.clone();
    registry.register("DeletePath", move |_params| {
        Ok(Box::new(DeletePathNode::new(delete_paths.clone())))
    });
}

pub fn build_default_registry(paths: &PathsConfig) -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    register_all_nodes(&mut registry, paths);
    registry
}
