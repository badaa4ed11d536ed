//! Deferred retry tasks with per-retry cancellation.

use std::{
    collections::HashMap,
    future::Future,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {tokio_util::sync::CancellationToken, tracing::debug};

#[cfg(feature = "metrics")]
use courier_metrics::{delivery as delivery_metrics, gauge};

/// Handle to one scheduled retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RetryTicket(u64);

impl RetryTicket {
    pub fn id(self) -> u64 {
        self.0
    }
}

type PendingMap = Arc<Mutex<HashMap<RetryTicket, CancellationToken>>>;

/// Runs tasks after a delay on the tokio runtime.
///
/// Every scheduled task gets a child of the scheduler's root token, so a
/// single retry can be cancelled through its [`RetryTicket`] and all of them
/// at once by cancelling the root. Nothing cancels a retry unless asked to.
#[derive(Debug)]
pub struct RetryScheduler {
    root: CancellationToken,
    pending: PendingMap,
    next_id: AtomicU64,
}

impl RetryScheduler {
    pub fn new() -> Self {
        Self::with_cancellation(CancellationToken::new())
    }

    /// Use `root` as the parent of every retry token. Cancelling it cancels
    /// all pending retries and any scheduled later.
    pub fn with_cancellation(root: CancellationToken) -> Self {
        Self {
            root,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Run `task` once `delay` has elapsed, unless cancelled first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> RetryTicket
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let ticket = RetryTicket(self.next_id.fetch_add(1, Ordering::Relaxed));
        let token = self.root.child_token();
        {
            let mut pending = lock(&self.pending);
            pending.insert(ticket, token.clone());
            #[cfg(feature = "metrics")]
            gauge!(delivery_metrics::RETRIES_PENDING).set(pending.len() as f64);
        }

        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {
                    forget(&pending, ticket);
                    debug!(retry = ticket.0, "retry cancelled");
                },
                () = tokio::time::sleep(delay) => {
                    forget(&pending, ticket);
                    task.await;
                },
            }
        });

        ticket
    }

    /// Cancel one retry. Returns `false` if it already fired or was cancelled.
    pub fn cancel(&self, ticket: RetryTicket) -> bool {
        match lock(&self.pending).remove(&ticket) {
            Some(token) => {
                token.cancel();
                true
            },
            None => false,
        }
    }

    /// Cancel every pending retry and refuse to run any scheduled later.
    pub fn cancel_all(&self) {
        self.root.cancel();
        lock(&self.pending).clear();
    }

    /// Number of retries still waiting on their timer.
    pub fn pending(&self) -> usize {
        lock(&self.pending).len()
    }
}

impl Default for RetryScheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn forget(pending: &PendingMap, ticket: RetryTicket) {
    let mut pending = lock(pending);
    pending.remove(&ticket);
    #[cfg(feature = "metrics")]
    gauge!(delivery_metrics::RETRIES_PENDING).set(pending.len() as f64);
}

fn lock(pending: &PendingMap) -> MutexGuard<'_, HashMap<RetryTicket, CancellationToken>> {
    pending.lock().unwrap_or_else(|e| e.into_inner())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    fn counting_task(counter: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let scheduler = RetryScheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));

        scheduler.schedule(Duration::from_secs(5), counting_task(&runs));
        assert_eq!(scheduler.pending(), 1);

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_ticket_never_fires() {
        let scheduler = RetryScheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let ticket = scheduler.schedule(Duration::from_secs(5), counting_task(&runs));
        assert!(scheduler.cancel(ticket));
        assert!(!scheduler.cancel(ticket));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_stops_current_and_future_retries() {
        let scheduler = RetryScheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));

        scheduler.schedule(Duration::from_secs(1), counting_task(&runs));
        scheduler.schedule(Duration::from_secs(2), counting_task(&runs));
        scheduler.cancel_all();

        scheduler.schedule(Duration::from_secs(1), counting_task(&runs));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn parent_token_cancels_children() {
        let parent = CancellationToken::new();
        let scheduler = RetryScheduler::with_cancellation(parent.child_token());
        let runs = Arc::new(AtomicUsize::new(0));

        scheduler.schedule(Duration::from_secs(1), counting_task(&runs));
        parent.cancel();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn tickets_are_unique() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            let scheduler = RetryScheduler::new();
            let a = scheduler.schedule(Duration::from_secs(1), async {});
            let b = scheduler.schedule(Duration::from_secs(1), async {});
            assert_ne!(a.id(), b.id());
        });
    }
}
