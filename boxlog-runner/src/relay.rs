//! Relay channel
//!
//! Bounded FIFO of output lines between the scanner (single producer) and
//! the uploader (single consumer). A full channel blocks the scanner; nothing
//! is dropped or overwritten. The channel closes once every sender is gone.

use tokio::sync::mpsc;

pub type LogSender = mpsc::Sender<String>;
pub type LogReceiver = mpsc::Receiver<String>;

/// Default number of lines held in flight
pub const DEFAULT_CAPACITY: usize = 100;

/// Creates a relay channel holding at most `capacity` lines (minimum 1)
pub fn channel(capacity: usize) -> (LogSender, LogReceiver) {
    mpsc::channel(capacity.max(1))
}
