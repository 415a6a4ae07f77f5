/// Engine configuration
use crate::cancel::{POSITION_CHECKPOINT_INTERVAL, REGION_CHECKPOINT_INTERVAL};

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Worker threads for per-sequence tasks
    pub threads: usize,
    /// Positions between cancellation checkpoints in numeric loops
    pub position_checkpoint: usize,
    /// Regions between cancellation checkpoints in region loops
    pub region_checkpoint: usize,
    /// Log per-sequence progress through the default sink
    pub report_progress: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            position_checkpoint: POSITION_CHECKPOINT_INTERVAL,
            region_checkpoint: REGION_CHECKPOINT_INTERVAL,
            report_progress: true,
        }
    }
}

impl EngineConfig {
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn quiet(mut self) -> Self {
        self.report_progress = false;
        self
    }
}
