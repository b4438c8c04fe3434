//! MemoryReclaim node: returns cached memory to the OS between heavy
//! pipeline stages.
//!
//! Reclaim is strictly best-effort. A failing cache hook or allocator trim
//! is logged and swallowed so the node can sit anywhere in a workflow
//! without becoming a failure point. Any `value` input passes through
//! unchanged, which lets the node splice into an existing edge.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};

use crate::node::{ExecutionContext, Node, PortDefinition};
use crate::types::{PortData, PortType};

/// Hook into an accelerator runtime's memory pool. Host integrations
/// install one when a device is present; without it the node only trims
/// the process allocator.
pub trait AcceleratorCache: Send + Sync {
    /// Release cached device allocations back to the driver.
    fn evict_cache(&self) -> Result<()>;
    /// Block until queued device work has drained.
    fn synchronize(&self) -> Result<()>;
}

pub struct MemoryReclaimNode {
    cache: Option<Arc<dyn AcceleratorCache>>,
}

impl MemoryReclaimNode {
    pub fn new() -> Self {
        Self { cache: None }
    }

    pub fn with_cache(cache: Arc<dyn AcceleratorCache>) -> Self {
        Self { cache: Some(cache) }
    }
}

impl Default for MemoryReclaimNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for MemoryReclaimNode {
    fn node_type(&self) -> &str {
        "MemoryReclaim"
    }

    fn input_ports(&self) -> Vec<PortDefinition> {
        // The declared Str type is advisory: execute forwards whatever
        // variant arrives on `value` unchanged.
        vec![PortDefinition {
            name: "value".to_string(),
            port_type: PortType::Str,
            required: false,
            default_value: None,
        }]
    }

    fn output_ports(&self) -> Vec<PortDefinition> {
        vec![PortDefinition {
            name: "value".to_string(),
            port_type: PortType::Str,
            required: false,
            default_value: None,
        }]
    }

    fn execute(
        &mut self,
        inputs: &HashMap<String, PortData>,
        _ctx: &ExecutionContext,
    ) -> Result<HashMap<String, PortData>> {
        if let Some(cache) = &self.cache {
            if let Err(error) = cache.evict_cache() {
                warn!(error = %error, "accelerator cache eviction failed");
            }
            if let Err(error) = cache.synchronize() {
                warn!(error = %error, "accelerator synchronize failed");
            }
        }

        trim_allocator();

        let mut outputs = HashMap::new();
        if let Some(value) = inputs.get("value") {
            outputs.insert("value".to_string(), value.clone());
        }
        Ok(outputs)
    }
}

/// Ask the process allocator to return free arena pages to the OS.
#[cfg(target_os = "linux")]
fn trim_allocator() {
    // malloc_trim returns 1 when memory was actually released.
    let released = unsafe { libc::malloc_trim(0) };
    debug!(released = released == 1, "allocator trim");
}

#[cfg(not(target_os = "linux"))]
fn trim_allocator() {
    debug!("allocator trim not supported on this platform");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingCache {
        evictions: AtomicUsize,
        syncs: AtomicUsize,
        fail_evict: bool,
    }

    impl RecordingCache {
        fn new(fail_evict: bool) -> Self {
            Self {
                evictions: AtomicUsize::new(0),
                syncs: AtomicUsize::new(0),
                fail_evict,
            }
        }
    }

    impl AcceleratorCache for RecordingCache {
        fn evict_cache(&self) -> Result<()> {
            self.evictions.fetch_add(1, Ordering::SeqCst);
            if self.fail_evict {
                anyhow::bail!("device unavailable");
            }
            Ok(())
        }

        fn synchronize(&self) -> Result<()> {
            self.syncs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_node_type() {
        assert_eq!(MemoryReclaimNode::new().node_type(), "MemoryReclaim");
    }

    #[test]
    fn test_execute_without_cache_succeeds() {
        let mut node = MemoryReclaimNode::new();
        let ctx = ExecutionContext::default();
        let outputs = node
            .execute(&HashMap::new(), &ctx)
            .expect("reclaim without cache should succeed");
        assert!(outputs.is_empty());
    }

    #[test]
    fn test_execute_calls_cache_hooks() {
        let cache = Arc::new(RecordingCache::new(false));
        let mut node = MemoryReclaimNode::with_cache(cache.clone());
        let ctx = ExecutionContext::default();

        node.execute(&HashMap::new(), &ctx)
            .expect("reclaim should succeed");

        assert_eq!(cache.evictions.load(Ordering::SeqCst), 1);
        assert_eq!(cache.syncs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_cache_hook_is_swallowed() {
        let cache = Arc::new(RecordingCache::new(true));
        let mut node = MemoryReclaimNode::with_cache(cache.clone());
        let ctx = ExecutionContext::default();

        node.execute(&HashMap::new(), &ctx)
            .expect("failing eviction must not fail the node");

        // Synchronize still runs after a failed eviction.
        assert_eq!(cache.syncs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_value_passes_through_unchanged() {
        let mut node = MemoryReclaimNode::new();
        let ctx = ExecutionContext::default();
        let inputs = HashMap::from([(
            "value".to_string(),
            PortData::Str("downstream".to_string()),
        )]);

        let outputs = node.execute(&inputs, &ctx).expect("reclaim should succeed");
        match outputs.get("value") {
            Some(PortData::Str(s)) => assert_eq!(s, "downstream"),
            other => panic!("expected passthrough Str, got {:?}", other.is_some()),
        }
    }

    #[test]
    fn test_non_str_value_also_passes_through() {
        let mut node = MemoryReclaimNode::new();
        let ctx = ExecutionContext::default();
        let inputs = HashMap::from([("value".to_string(), PortData::Int(42))]);

        let outputs = node.execute(&inputs, &ctx).expect("reclaim should succeed");
        match outputs.get("value") {
            Some(PortData::Int(v)) => assert_eq!(*v, 42),
            other => panic!("expected passthrough Int, got {:?}", other.is_some()),
        }
    }
}
