//! User activity intake.
//!
//! Hosts report raw interaction events here. A throttle collapses bursts so
//! the inactivity scheduler is only touched about once per second, then a
//! pump task forwards accepted signals to the scheduler.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use super::scheduler::SessionScheduler;

/// Kinds of interaction that count as user activity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivityKind {
    PointerMove,
    KeyPress,
    Scroll,
    Click,
}

/// Rate limiter for activity signals. Accepts the first signal immediately
/// and at most one per `min_interval` afterwards.
pub struct Throttle {
    min_interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    /// Returns true if a signal arriving at `now` should pass through.
    pub fn accept(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// Forward throttled activity signals to the inactivity scheduler. Runs
/// until every sender half is dropped.
pub fn spawn_activity_pump(
    mut rx: mpsc::UnboundedReceiver<ActivityKind>,
    scheduler: Arc<SessionScheduler>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut throttle = Throttle::new(Duration::from_secs(1));
        while let Some(kind) = rx.recv().await {
            if throttle.accept(Instant::now()) {
                debug!(?kind, "activity signal accepted");
                scheduler.activity_tick();
            }
        }
    })
}
