//! Hand-off of out-of-band notices between threads.
//!
//! While a statement is in flight on the target connection, the backend may
//! emit notices. The worker thread draining the socket is not the thread
//! that wants to read them, so the driver pushes every buffered notice
//! through a relay into a channel the foreground loop pops from.

use crossbeam_channel::{Receiver, Sender, unbounded};

/// Creates the single-producer/single-consumer notice channel.
///
/// The sending half never blocks; the receiving half may block on empty,
/// which is exactly what session startup needs while waiting for the proxy
/// endpoint notification.
pub fn notice_channel() -> (Sender<String>, Receiver<String>) {
    unbounded()
}

/// Moves buffered notices into an optional sink.
#[derive(Debug, Clone)]
pub struct NotificationRelay {
    sink: Option<Sender<String>>,
}

impl NotificationRelay {
    /// A relay that forwards into the given sink.
    pub fn new(sink: Sender<String>) -> Self {
        Self { sink: Some(sink) }
    }

    /// A relay with no sink: buffered notices are discarded.
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    /// Whether a sink is attached.
    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Drops the sink. Receivers blocked on the channel wake up once every
    /// sender is gone, which the target worker relies on at exit.
    pub fn detach(&mut self) {
        self.sink = None;
    }

    /// Moves every buffered notice into the sink in arrival order, then
    /// clears the buffer. With no sink the buffer is simply discarded, and
    /// an empty buffer is a no-op either way.
    pub fn forward(&self, notices: &mut Vec<String>) {
        if notices.is_empty() {
            return;
        }
        match &self.sink {
            Some(sink) => {
                for notice in notices.drain(..) {
                    // Unbounded channel: send fails only when the receiver
                    // is gone, in which case the notice has no audience.
                    let _ = sink.send(notice);
                }
            }
            None => notices.clear(),
        }
    }
}
