//! Single-shot, re-armable idle countdown.
//!
//! The timer owns a background task that sleeps until the current deadline.
//! Every [`IdleTimer::reset`] pushes the deadline out by the full window.
//! When the deadline passes without an intervening reset, the expiry
//! callback runs once and the timer stays quiet until the next reset
//! re-arms it.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

pub struct IdleTimer {
    deadline: watch::Sender<Instant>,
    window: Duration,
}

impl IdleTimer {
    /// Spawns the countdown task. The timer is armed immediately, so an
    /// engine launched and never used again still gets torn down.
    pub fn spawn<F, Fut>(window: Duration, on_expire: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (tx, mut rx) = watch::channel(Instant::now() + window);

        tokio::spawn(async move {
            loop {
                let deadline = *rx.borrow_and_update();
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {
                        on_expire().await;
                        // Single-shot: wait for the next reset before
                        // arming a new countdown. A sender drop ends us.
                        if rx.changed().await.is_err() {
                            break;
                        }
                    }
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Self {
            deadline: tx,
            window,
        }
    }

    /// Cancels the pending expiry and schedules a new one a full window
    /// from now. Safe to call from any task at any time.
    pub fn reset(&self) {
        let _ = self.deadline.send(Instant::now() + self.window);
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
