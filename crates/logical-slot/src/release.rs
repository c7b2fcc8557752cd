//! One-shot release signal shared by a slot and its observers.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

type Callback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct Listeners {
    completed: AtomicBool,
    pending: Mutex<Vec<Callback>>,
}

impl Listeners {
    fn lock(&self) -> MutexGuard<'_, Vec<Callback>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Release listener list poisoned - recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// Write-once completion marking a slot as reclaimed.
///
/// The token is authoritative: once cancelled it stays cancelled, and every
/// waiter resolves, including ones that subscribe afterwards. Callbacks are
/// held in a plain list and need no runtime.
#[derive(Clone, Default)]
pub struct ReleaseSignal {
    token: CancellationToken,
    listeners: Arc<Listeners>,
}

impl ReleaseSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_released(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Complete the signal. Returns `true` for exactly one caller.
    ///
    /// Every caller cancels the token, so the signal is completed by the time
    /// any call returns. The first caller also runs the registered callbacks,
    /// on its own thread, before returning.
    pub(crate) fn complete(&self) -> bool {
        let first = !self.listeners.completed.swap(true, Ordering::AcqRel);
        self.token.cancel();
        if first {
            let callbacks = std::mem::take(&mut *self.listeners.lock());
            for callback in callbacks {
                callback();
            }
        }
        first
    }

    /// Wait until the signal completes.
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }

    /// Owned future that resolves on completion, for moving into other tasks.
    pub fn wait_owned(&self) -> impl Future<Output = ()> + Send + 'static {
        self.token.clone().cancelled_owned()
    }

    /// Run `callback` once the signal completes.
    ///
    /// Registered before release, it runs on the thread that completes the
    /// signal. Registered after, it runs right away on the caller's thread.
    /// Either way it runs exactly once.
    pub fn on_release<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut pending = self.listeners.lock();
        // The completer sets the flag before it drains, so anything pushed
        // while the flag is clear is still drained.
        if self.listeners.completed.load(Ordering::Acquire) {
            drop(pending);
            callback();
        } else {
            pending.push(Box::new(callback));
        }
    }
}

impl fmt::Debug for ReleaseSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseSignal")
            .field("released", &self.is_released())
            .field("pending_callbacks", &self.listeners.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn starts_pending() {
        let signal = ReleaseSignal::new();
        assert!(!signal.is_released());
    }

    #[test]
    fn complete_reports_first_caller_only() {
        let signal = ReleaseSignal::new();
        assert!(signal.complete());
        assert!(!signal.complete());
        assert!(!signal.complete());
        assert!(signal.is_released());
    }

    #[test]
    fn clones_observe_the_same_completion() {
        let signal = ReleaseSignal::new();
        let observer = signal.clone();
        signal.complete();
        assert!(observer.is_released());
    }

    #[test]
    fn callback_registered_without_runtime_runs_on_complete() {
        let signal = ReleaseSignal::new();
        let (count, callback) = counter();

        signal.on_release(callback);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        signal.complete();
        signal.complete();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_registered_after_complete_runs_immediately() {
        let signal = ReleaseSignal::new();
        signal.complete();

        let (count, callback) = counter();
        signal.on_release(callback);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_survives_runtime_shutdown() {
        let signal = ReleaseSignal::new();
        let (count, callback) = counter();

        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async { signal.on_release(callback) });
        drop(runtime);

        signal.complete();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn racing_completions_run_each_callback_once() {
        let signal = ReleaseSignal::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let c = Arc::clone(&count);
            signal.on_release(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }

        let barrier = Arc::new(std::sync::Barrier::new(8));
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let signal = signal.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    signal.complete()
                })
            })
            .collect();

        let firsts: usize = threads
            .into_iter()
            .map(|t| usize::from(t.join().unwrap()))
            .sum();
        assert_eq!(firsts, 1);
        assert_eq!(count.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn wait_resolves_after_completion() {
        let signal = ReleaseSignal::new();
        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.wait().await });

        signal.complete();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn late_waiter_resolves_immediately() {
        let signal = ReleaseSignal::new();
        signal.complete();
        tokio::time::timeout(Duration::from_millis(100), signal.wait())
            .await
            .expect("completed signal should not block");
    }
}
