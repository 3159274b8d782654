//! Constant wall-clock floor for login and forgot-password
//!
//! Both answer the same way for known and unknown accounts, so their
//! latency must not tell the two apart either.

use std::time::{Duration, Instant};

/// Started at the top of an enumeration-sensitive operation and awaited
/// right before it answers, whatever the outcome
pub struct AuthTimer {
    deadline: Instant,
}

impl AuthTimer {
    pub fn new(floor: Duration) -> Self {
        Self {
            deadline: Instant::now() + floor,
        }
    }

    /// Sleep out whatever is left of the floor. Returns at once if the
    /// operation already took longer.
    pub async fn wait(self) {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if !remaining.is_zero() {
            tokio::time::sleep(remaining).await;
        }
    }
}
