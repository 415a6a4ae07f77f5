/// Visualization-settings collaborator
///
/// The engine keeps no GUI state. Embedding applications that do can register
/// a hook and copy their settings from the source track when an operation
/// creates a derived one.
use log::debug;
use std::sync::Mutex;

use crate::track::Track;

pub trait DisplayHook: Send + Sync {
    /// Called once, after all tasks finished and the track was stored
    fn derived_track_created(&self, source: &str, track: &Track);
}

/// Logs derived tracks at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDisplayHook;

impl DisplayHook for LogDisplayHook {
    fn derived_track_created(&self, source: &str, track: &Track) {
        debug!(
            "[DISPLAY] '{}' derived from '{source}' ({})",
            track.name,
            track.kind().label()
        );
    }
}

/// Remembers (source, derived) name pairs
#[derive(Debug, Default)]
pub struct RecordingDisplayHook {
    created: Mutex<Vec<(String, String)>>,
}

impl RecordingDisplayHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> Vec<(String, String)> {
        self.created
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

impl DisplayHook for RecordingDisplayHook {
    fn derived_track_created(&self, source: &str, track: &Track) {
        if let Ok(mut created) = self.created.lock() {
            created.push((source.to_string(), track.name.clone()));
        }
    }
}
