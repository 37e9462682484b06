//! Debounced dispatch of user-driven triggers

use std::sync::Arc;
use std::time::Duration;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Default quiet window before a debounced dispatch fires
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(1000);

/// The single pending trigger of a [`Debouncer`]
struct Slot<P> {
    /// Bumped on every arm and cancel; a timer only fires if its token is still current
    armed: u64,
    params: Option<P>,
    timer: Option<JoinHandle<()>>,
}

/// Coalesces bursts of triggers into one deferred dispatch.
///
/// Each [`schedule`](Debouncer::schedule) replaces the pending parameters and
/// re-arms the quiet timer. When the timer elapses the dispatch callback runs
/// exactly once with the last parameters. [`cancel`](Debouncer::cancel) and
/// dropping the debouncer both discard anything pending.
pub struct Debouncer<P: Send + 'static> {
    quiet: Duration,
    runtime: Handle,
    dispatch: Arc<dyn Fn(P) + Send + Sync>,
    slot: Arc<Mutex<Slot<P>>>,
}

impl<P: Send + 'static> Debouncer<P> {
    pub fn new<F>(quiet: Duration, runtime: Handle, dispatch: F) -> Self
    where
        F: Fn(P) + Send + Sync + 'static,
    {
        Self {
            quiet,
            runtime,
            dispatch: Arc::new(dispatch),
            slot: Arc::new(Mutex::new(Slot {
                armed: 0,
                params: None,
                timer: None,
            })),
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet
    }

    /// Record `params` and (re)arm the quiet timer
    pub fn schedule(&self, params: P) {
        let mut slot = self.slot.lock();
        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }
        slot.armed += 1;
        slot.params = Some(params);

        let token = slot.armed;
        let shared = self.slot.clone();
        let dispatch = self.dispatch.clone();
        let quiet = self.quiet;

        slot.timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(quiet).await;

            let params = {
                let mut slot = shared.lock();
                if slot.armed != token {
                    return;
                }
                slot.timer = None;
                slot.params.take()
            };

            if let Some(params) = params {
                dispatch(params);
            }
        }));
    }

    /// Drop any pending trigger; a timer that already elapsed becomes a no-op
    pub fn cancel(&self) {
        let mut slot = self.slot.lock();
        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }
        slot.armed += 1;
        if slot.params.take().is_some() {
            tracing::debug!("Cancelled pending debounced dispatch");
        }
    }

    /// Whether a trigger is waiting for its quiet window to elapse
    pub fn is_pending(&self) -> bool {
        self.slot.lock().params.is_some()
    }
}

impl<P: Send + 'static> Drop for Debouncer<P> {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording_debouncer(quiet: Duration) -> (Debouncer<u32>, Arc<Mutex<Vec<u32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let debouncer = Debouncer::new(quiet, Handle::current(), move |value| sink.lock().push(value));
        (debouncer, seen)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_dispatches_last_params_once() {
        let (debouncer, seen) = recording_debouncer(DEFAULT_QUIET_PERIOD);

        for value in 1..=5 {
            debouncer.schedule(value);
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        assert!(seen.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(*seen.lock(), vec![5]);
        assert!(!debouncer.is_pending());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_dispatch_separately() {
        let (debouncer, seen) = recording_debouncer(Duration::from_millis(300));

        debouncer.schedule(1);
        tokio::time::sleep(Duration::from_millis(500)).await;
        debouncer.schedule(2);
        debouncer.schedule(3);
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(*seen.lock(), vec![1, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_dispatch() {
        let (debouncer, seen) = recording_debouncer(DEFAULT_QUIET_PERIOD);

        debouncer.schedule(7);
        tokio::time::sleep(Duration::from_millis(400)).await;
        debouncer.cancel();
        assert!(!debouncer.is_pending());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(seen.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending_dispatch() {
        let (debouncer, seen) = recording_debouncer(DEFAULT_QUIET_PERIOD);
        debouncer.schedule(9);
        drop(debouncer);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(seen.lock().is_empty());
    }
}
