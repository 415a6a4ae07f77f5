/// Cooperative cancellation
///
/// Long-running loops hold a `Checkpoint` and call `tick()` once per
/// iteration; every `interval` ticks the loop yields its thread and returns
/// `EngineError::Cancelled` if cancellation was requested.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};

/// Positions visited between checkpoints in numeric track loops
pub const POSITION_CHECKPOINT_INTERVAL: usize = 4096;

/// Regions visited between checkpoints in region loops (transform, filter,
/// cluster scan)
pub const REGION_CHECKPOINT_INTERVAL: usize = 256;

/// Shared cancellation flag. A child token observes its parents but
/// cancelling the child leaves the parents untouched.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    // Own flag last, ancestors before it
    flags: Vec<Arc<AtomicBool>>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        CancellationToken {
            flags: vec![Arc::new(AtomicBool::new(false))],
        }
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> CancellationToken {
        let mut flags = self.flags.clone();
        flags.push(Arc::new(AtomicBool::new(false)));
        CancellationToken { flags }
    }

    pub fn cancel(&self) {
        if let Some(own) = self.flags.last() {
            own.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags.iter().any(|f| f.load(Ordering::Relaxed))
    }

    /// Fail with `Cancelled` once cancellation has been requested
    pub fn checkpoint(&self) -> EngineResult<()> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn every(&self, interval: usize) -> Checkpoint<'_> {
        Checkpoint {
            token: self,
            interval: interval.max(1),
            count: 0,
        }
    }
}

pub struct Checkpoint<'a> {
    token: &'a CancellationToken,
    interval: usize,
    count: usize,
}

impl Checkpoint<'_> {
    #[inline]
    pub fn tick(&mut self) -> EngineResult<()> {
        self.count += 1;
        if self.count % self.interval == 0 {
            std::thread::yield_now();
            self.token.checkpoint()
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_the_flag() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(token.checkpoint().is_ok());
        other.cancel();
        assert!(token.is_cancelled());
        assert!(token.checkpoint().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_child_sees_parent_but_not_vice_versa() {
        let parent = CancellationToken::new();
        let child = parent.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_checkpoint_fires_on_interval() {
        let token = CancellationToken::new();
        token.cancel();
        let mut cp = token.every(3);
        assert!(cp.tick().is_ok());
        assert!(cp.tick().is_ok());
        assert!(cp.tick().is_err());
    }
}
