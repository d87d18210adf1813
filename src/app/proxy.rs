//! Defines an abstraction over the event sending mechanism.

use std::io::Write;

use super::events::UserEvent;

/// A trait that abstracts the sending of user events.
/// This is "fire-and-forget" and doesn't return a result, simplifying its use.
pub trait EventProxy: Send + Sync + Clone + 'static {
    fn send_event(&self, event: UserEvent);
}

/// Writes every event as one JSON line to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutProxy;

impl EventProxy for StdoutProxy {
    fn send_event(&self, event: UserEvent) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Failed to serialize event: {}", e);
                return;
            }
        };

        let mut stdout = std::io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{line}").and_then(|_| stdout.flush()) {
            tracing::warn!("Failed to write event to stdout: {}", e);
        }
    }
}
