//! Heartbeat watchdog.
//!
//! A single re-armable timer. Every [`trigger`](Watchdog::trigger) cancels
//! the pending timer and schedules a new one; if the timer elapses without
//! being re-armed the configured action runs on its own task. The client
//! arms it after the handshake and re-arms it on every pong, so the action
//! (a ping) fires only after `timeout` of silence.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;
use tracing::debug;

/// Default idle time before the watchdog fires.
pub const DEFAULT_WATCHDOG_TIMEOUT: Duration = Duration::from_secs(15);

/// Action run when the watchdog expires.
pub type WatchdogAction = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

pub struct Watchdog {
    timeout: Duration,
    action: WatchdogAction,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Watchdog {
    pub fn new(timeout: Duration, action: WatchdogAction) -> Self {
        Self {
            timeout,
            action,
            timer: Mutex::new(None),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// (Re)arm the timer. Always leaves exactly one pending timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn trigger(&self) {
        debug!(
            timeout_secs = self.timeout.as_secs_f64(),
            "Watchdog triggered"
        );

        let action = Arc::clone(&self.action);
        let timeout = self.timeout;

        let mut timer = self.timer.lock().expect("watchdog lock poisoned");
        if let Some(previous) = timer.take() {
            previous.abort();
        }
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            Self::on_expire(&action).await;
        }));
    }

    /// Disarm the timer. No-op when nothing is armed.
    pub fn cancel(&self) {
        if let Some(timer) = self.timer.lock().expect("watchdog lock poisoned").take() {
            timer.abort();
        }
    }

    /// `true` while a timer is pending.
    pub fn is_armed(&self) -> bool {
        self.timer
            .lock()
            .expect("watchdog lock poisoned")
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    async fn on_expire(action: &WatchdogAction) {
        debug!("Watchdog expired, running action");
        action().await;
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchdog")
            .field("timeout", &self.timeout)
            .field("armed", &self.is_armed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::FutureExt;

    use super::*;

    fn counting_watchdog(timeout: Duration) -> (Watchdog, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let action: WatchdogAction = Arc::new(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        });
        (Watchdog::new(timeout, action), fired)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_timeout() {
        let (watchdog, fired) = counting_watchdog(Duration::from_secs(15));
        watchdog.trigger();
        assert!(watchdog.is_armed());

        tokio::time::sleep(Duration::from_secs(14)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!watchdog.is_armed());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1, "timer must not repeat on its own");
    }

    #[tokio::test(start_paused = true)]
    async fn retrigger_postpones_expiry() {
        let (watchdog, fired) = counting_watchdog(Duration::from_secs(15));
        watchdog.trigger();

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_secs(10)).await;
            watchdog.trigger();
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(16)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_triggers_leave_one_timer() {
        let (watchdog, fired) = counting_watchdog(Duration::from_secs(5));
        watchdog.trigger();
        watchdog.trigger();
        watchdog.trigger();

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_disarms_and_is_idempotent() {
        let (watchdog, fired) = counting_watchdog(Duration::from_secs(5));
        watchdog.cancel();
        watchdog.trigger();
        watchdog.cancel();
        watchdog.cancel();
        assert!(!watchdog.is_armed());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
