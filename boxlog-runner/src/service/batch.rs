//! Log batch
//!
//! In-memory accumulation of events between two flushes. Owned by the
//! uploader task alone, so it needs no locking.

use boxlog_core::domain::log::LogEvent;

/// Ordered events captured since the last flush
#[derive(Debug, Default)]
pub struct LogBatch {
    events: Vec<LogEvent>,
}

impl LogBatch {
    /// Creates an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a line, stamped with the time it arrived
    pub fn push_line(&mut self, line: String) {
        self.events.push(LogEvent::now(line));
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Takes every buffered event and leaves the batch empty
    pub fn take(&mut self) -> Vec<LogEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_returns_lines_in_order_and_empties() {
        let mut batch = LogBatch::new();
        batch.push_line("a".to_string());
        batch.push_line("b".to_string());
        batch.push_line("c".to_string());
        assert!(!batch.is_empty());

        let events = batch.take();
        let messages: Vec<&str> = events.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["a", "b", "c"]);
        assert!(batch.is_empty());
        assert!(batch.take().is_empty());
    }

    #[test]
    fn test_timestamps_follow_arrival_order() {
        let mut batch = LogBatch::new();
        for i in 0..50 {
            batch.push_line(i.to_string());
        }

        let events = batch.take();
        assert!(
            events
                .windows(2)
                .all(|w| w[0].timestamp_millis <= w[1].timestamp_millis)
        );
    }
}
