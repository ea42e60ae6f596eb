//! Bounded operator event log.
//!
//! Appends are serialized by a single mutex that also covers publication, so
//! every session sees entries in insertion order. [`EventLog::subscribe_with`]
//! runs under the same lock, which lets a new session take the history
//! snapshot and register for live entries without a gap or a duplicate.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::protocol::Outbound;
use crate::session::SessionHub;
use crate::types::{LogEntry, LogLevel};

/// Default number of retained entries
pub const DEFAULT_MAX_LOGS: usize = 100;

/// Capacity-bounded, insertion-ordered log published to every session.
#[derive(Debug)]
pub struct EventLog {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
    hub: Arc<SessionHub>,
}

impl EventLog {
    /// Create a log retaining at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize, hub: Arc<SessionHub>) -> Self {
        let capacity = capacity.max(1);
        Self { entries: Mutex::new(VecDeque::with_capacity(capacity)), capacity, hub }
    }

    /// Append a timestamped entry, evicting the oldest on overflow, and
    /// publish it as `new_log`.
    pub fn append(&self, message: impl Into<String>, level: LogLevel) -> LogEntry {
        let entry = LogEntry::new(message, level);
        self.push(entry.clone());
        entry
    }

    /// Append at [`LogLevel::Info`].
    pub fn info(&self, message: impl Into<String>) -> LogEntry {
        self.append(message, LogLevel::Info)
    }

    /// Append an already built entry.
    pub fn push(&self, entry: LogEntry) {
        debug!(level = %entry.level, "{}", entry.message);

        let mut entries = self.lock();
        entries.push_back(entry.clone());
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        self.hub.broadcast(Outbound::NewLog(entry));
    }

    /// Current contents, oldest first.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.lock().iter().cloned().collect()
    }

    /// Run `f` with the current contents while holding the append lock.
    ///
    /// No entry can be appended (or published) until `f` returns.
    pub fn subscribe_with<R>(&self, f: impl FnOnce(&[LogEntry]) -> R) -> R {
        let mut entries = self.lock();
        f(entries.make_contiguous())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn log(capacity: usize) -> EventLog {
        EventLog::new(capacity, Arc::new(SessionHub::default()))
    }

    fn messages(log: &EventLog) -> Vec<String> {
        log.snapshot().into_iter().map(|entry| entry.message).collect()
    }

    proptest! {
        #[test]
        fn retains_most_recent_entries_in_order(
            capacity in 1usize..20,
            appends in prop::collection::vec("[a-z]{1,6}", 0..60),
        ) {
            let log = log(capacity);

            for (i, message) in appends.iter().enumerate() {
                log.info(message.clone());
                prop_assert!(log.len() <= capacity);
                prop_assert_eq!(log.len(), (i + 1).min(capacity));
            }

            let expected: Vec<String> =
                appends.iter().skip(appends.len().saturating_sub(capacity)).cloned().collect();
            prop_assert_eq!(messages(&log), expected);
        }
    }

    #[test]
    fn evicts_oldest_first() {
        let log = log(3);
        for message in ["A", "B", "C", "D"] {
            log.info(message);
        }

        assert_eq!(messages(&log), vec!["B", "C", "D"]);
    }

    #[test]
    fn append_publishes_to_sessions() {
        let hub = Arc::new(SessionHub::default());
        let log = EventLog::new(10, hub.clone());
        let mut handle = hub.register(Vec::new());

        let entry = log.append("Photo captured", LogLevel::Success);

        assert_eq!(handle.events.try_recv().unwrap(), Outbound::NewLog(entry));
    }

    #[test]
    fn zero_capacity_keeps_one_entry() {
        let log = log(0);
        log.info("first");
        log.info("second");

        assert_eq!(log.capacity(), 1);
        assert_eq!(messages(&log), vec!["second"]);
    }

    #[test]
    fn concurrent_appends_respect_capacity() {
        let log = Arc::new(log(50));

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        log.info(format!("{w}-{i}"));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), 50);

        // Per-writer order is preserved among retained entries
        for w in 0..4 {
            let prefix = format!("{w}-");
            let seq: Vec<u32> = snapshot
                .iter()
                .filter_map(|e| e.message.strip_prefix(&prefix))
                .map(|n| n.parse().unwrap())
                .collect();
            assert!(seq.windows(2).all(|pair| pair[0] < pair[1]));
        }
    }
}
