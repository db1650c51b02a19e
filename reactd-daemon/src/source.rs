//! Messages sent from source tasks to the event loop.

use std::collections::BTreeSet;

use reactd_core::metrics as m;
use reactd_core::types::SourceLine;

/// Channel capacity between source tasks and the event loop.
pub const SOURCE_CHANNEL_CAPACITY: usize = 1024;

/// Event produced by a file tailer or journal reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// A complete line read from a source.
    Line(SourceLine),
    /// The file behind a source disappeared; its tailer has stopped.
    Missing(String),
}

/// Configured files that do not currently exist.
///
/// The event loop retries them every rescan interval.
#[derive(Debug, Default)]
pub struct MissingSources {
    paths: BTreeSet<String>,
}

impl MissingSources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a missing file. Returns `false` if it was already recorded.
    pub fn insert(&mut self, path: impl Into<String>) -> bool {
        let inserted = self.paths.insert(path.into());
        self.publish();
        inserted
    }

    pub fn remove(&mut self, path: &str) -> bool {
        let removed = self.paths.remove(path);
        self.publish();
        removed
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Snapshot of the missing paths in sorted order.
    pub fn paths(&self) -> Vec<String> {
        self.paths.iter().cloned().collect()
    }

    fn publish(&self) {
        metrics::gauge!(m::SOURCE_MISSING).set(self.paths.len() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sources_track_paths_once() {
        let mut missing = MissingSources::new();
        assert!(missing.is_empty());
        assert!(missing.insert("/var/log/b.log"));
        assert!(missing.insert("/var/log/a.log"));
        assert!(!missing.insert("/var/log/a.log"));
        assert_eq!(missing.len(), 2);
        assert_eq!(missing.paths(), vec!["/var/log/a.log", "/var/log/b.log"]);

        assert!(missing.remove("/var/log/a.log"));
        assert!(!missing.remove("/var/log/a.log"));
        assert!(missing.contains("/var/log/b.log"));
    }
}
