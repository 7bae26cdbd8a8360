//! Inactivity tracking.
//!
//! Two timers run from the last accepted activity signal: a warning timer
//! and a logout timer. The warning fires first and freezes the pair, so
//! further activity cannot silently dismiss the prompt. Only an explicit
//! extension restarts the countdowns; otherwise the logout timer fires at
//! the full delay measured from the last activity.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::timer::TimerHandle;

use super::{LogoutReason, SessionEvent};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    /// Counting down quietly. Activity restarts both timers.
    Idle,
    /// The warning fired. Activity is ignored until an extension.
    WarningVisible,
    /// Session over. Timers stay off until the next `start`.
    Ended,
}

struct Inner {
    phase: Phase,
    warning: Option<TimerHandle>,
    logout: Option<TimerHandle>,
}

/// Drives the inactivity warning and automatic logout for one session.
pub struct SessionScheduler {
    warning_delay: Duration,
    logout_delay: Duration,
    inner: Mutex<Inner>,
    events: broadcast::Sender<SessionEvent>,
    teardown: mpsc::UnboundedSender<LogoutReason>,
}

impl SessionScheduler {
    pub fn new(
        warning_delay: Duration,
        logout_delay: Duration,
        events: broadcast::Sender<SessionEvent>,
        teardown: mpsc::UnboundedSender<LogoutReason>,
    ) -> Arc<Self> {
        Arc::new(Self {
            warning_delay,
            logout_delay,
            inner: Mutex::new(Inner {
                phase: Phase::Ended,
                warning: None,
                logout: None,
            }),
            events,
            teardown,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Begin tracking a fresh session. Restarts both countdowns even if a
    /// previous session ended.
    pub fn start(self: &Arc<Self>) {
        let mut inner = self.lock();
        inner.phase = Phase::Idle;
        self.arm(&mut inner);
    }

    /// Record user activity. Restarts the countdowns while idle; ignored
    /// once the warning is visible or the session has ended.
    pub fn activity_tick(self: &Arc<Self>) {
        let mut inner = self.lock();
        if inner.phase != Phase::Idle {
            return;
        }
        self.arm(&mut inner);
    }

    /// Explicit "keep me signed in" from the warning prompt. Returns false
    /// when the session already ended and there is nothing to extend.
    pub fn extend_session(self: &Arc<Self>) -> bool {
        let mut inner = self.lock();
        if inner.phase == Phase::Ended {
            return false;
        }
        inner.phase = Phase::Idle;
        self.arm(&mut inner);
        drop(inner);
        let _ = self.events.send(SessionEvent::Extended);
        true
    }

    /// Stop tracking. Idempotent; safe to call from any phase.
    pub fn end(&self) {
        let mut inner = self.lock();
        inner.phase = Phase::Ended;
        if let Some(timer) = inner.warning.take() {
            timer.cancel();
        }
        if let Some(timer) = inner.logout.take() {
            timer.cancel();
        }
    }

    fn arm(self: &Arc<Self>, inner: &mut Inner) {
        if let Some(timer) = inner.warning.take() {
            timer.cancel();
        }
        if let Some(timer) = inner.logout.take() {
            timer.cancel();
        }
        let warn_target = Arc::clone(self);
        inner.warning = Some(TimerHandle::once(self.warning_delay, async move {
            warn_target.warning_deadline();
        }));
        let teardown = self.teardown.clone();
        inner.logout = Some(TimerHandle::once(self.logout_delay, async move {
            debug!("inactivity logout deadline reached");
            let _ = teardown.send(LogoutReason::Inactivity);
        }));
    }

    fn warning_deadline(&self) {
        let mut inner = self.lock();
        if inner.phase != Phase::Idle {
            return;
        }
        inner.phase = Phase::WarningVisible;
        // The logout timer keeps its original deadline.
        drop(inner);
        let grace = self.logout_delay.saturating_sub(self.warning_delay);
        debug!(grace_secs = grace.as_secs(), "inactivity warning raised");
        let _ = self.events.send(SessionEvent::InactivityWarning { grace });
    }

    #[cfg(test)]
    fn phase(&self) -> Phase {
        self.lock().phase
    }
}
