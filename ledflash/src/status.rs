//! Status reporting towards whatever presentation layer is attached.
//!
//! Reports are fire-and-forget; a display only ever needs the latest one.

use std::sync::mpsc::Sender;
use std::sync::Mutex;

/// Receiver of human-readable status lines.
pub trait StatusSink: Send + Sync {
    /// Publish a status line.
    fn report(&self, text: &str);
}

impl<F> StatusSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn report(&self, text: &str) {
        self(text);
    }
}

/// Discards every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStatus;

impl StatusSink for NullStatus {
    fn report(&self, _text: &str) {}
}

/// Forwards reports over a channel, dropping them once the receiver is gone.
#[derive(Debug)]
pub struct ChannelStatus {
    tx: Mutex<Sender<String>>,
}

impl ChannelStatus {
    /// Wrap the sending half of a channel.
    pub fn new(tx: Sender<String>) -> Self {
        Self { tx: Mutex::new(tx) }
    }
}

impl StatusSink for ChannelStatus {
    fn report(&self, text: &str) {
        if let Ok(tx) = self.tx.lock() {
            let _ = tx.send(text.to_string());
        }
    }
}
