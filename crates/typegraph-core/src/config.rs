use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning knobs for the hierarchy cache and its event pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyConfig {
    /// A propagation sweep over the created results that runs longer than
    /// this is logged as a warning; listeners on the notification thread are
    /// expected to stay fast.
    pub sweep_warn_threshold_ms: u64,
    /// Emit synthetic `BufferDirty` / `BufferSync` events for working-copy
    /// transitions.
    pub emit_buffer_events: bool,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            sweep_warn_threshold_ms: 50,
            emit_buffer_events: true,
        }
    }
}

impl HierarchyConfig {
    pub fn sweep_warn_threshold(&self) -> Duration {
        Duration::from_millis(self.sweep_warn_threshold_ms)
    }
}
