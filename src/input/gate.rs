use std::time::{Duration, Instant};

/// Minimum spacing between two sent direction commands.
///
/// Candidates arriving inside the window are dropped, not queued.
#[derive(Clone, Debug)]
pub struct CommandGate {
    last_sent: Option<Instant>,
    min_interval: Duration,
}

impl CommandGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_sent: None,
            min_interval,
        }
    }

    /// Claims the window at `now` if it is open.
    pub fn try_pass(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_sent {
            if now.saturating_duration_since(last) < self.min_interval {
                return false;
            }
        }
        self.last_sent = Some(now);
        true
    }

    pub fn last_sent(&self) -> Option<Instant> {
        self.last_sent
    }
}
