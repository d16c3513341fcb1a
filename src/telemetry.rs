//! Operator notifications and session counters.
//!
//! The real deployment wires `Notifier` to a chat sink; the default
//! implementation routes through the log so the bot runs standalone.

use tracing::warn;

pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        warn!(target: "notify", "{message}");
    }
}

/// Counters logged on every loop update.
#[derive(Debug, Default)]
pub struct SessionStats {
    /// Search passes that produced a dispatched batch.
    pub total_opportunities: u64,
    /// Largest batch seen in a single pass.
    pub most_opportunities_in_block: u64,
    /// Events that arrived for a block we had already searched.
    pub premature_calcs: u64,
    /// Coalescing windows that absorbed more than the triggering event.
    pub subsequent_events: u64,
}
