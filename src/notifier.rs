//! Change notification for the crime table.
//!
//! A single `watch` channel carries the full list of crimes. The store
//! republishes after every committed write, subscribers see the newest
//! snapshot and never a backlog of deltas. Every publish also bumps a
//! version number, so a reader can tell whether it has caught up with a
//! given write.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;

use crate::models::Crime;

/// Immutable point-in-time copy of every crime, in storage order.
pub type Snapshot = Arc<[Crime]>;

/// Value carried by the channel: the snapshot and how many publishes led
/// up to it.
#[derive(Clone)]
struct Published {
    version: u64,
    crimes: Snapshot,
}

/// Owns the sending half of the snapshot channel.
pub struct ChangeNotifier {
    sender: watch::Sender<Published>,
}

impl ChangeNotifier {
    pub(crate) fn new(initial: Vec<Crime>) -> Self {
        let (sender, _) = watch::channel(Published {
            version: 0,
            crimes: Snapshot::from(initial),
        });
        Self { sender }
    }

    /// Replace the current snapshot and wake every subscriber.
    pub(crate) fn publish(&self, crimes: Vec<Crime>) {
        // `send_modify` updates unconditionally, even with zero receivers.
        self.sender.send_modify(|published| {
            published.version += 1;
            published.crimes = Snapshot::from(crimes);
        });
    }

    /// Current snapshot (cheap `Arc` clone).
    pub fn snapshot(&self) -> Snapshot {
        self.sender.borrow().crimes.clone()
    }

    /// Number of publishes so far. Starts at zero for the snapshot loaded
    /// when the store opened.
    pub fn version(&self) -> u64 {
        self.sender.borrow().version
    }

    /// Subscription that starts at the current snapshot.
    pub fn subscribe(&self) -> CrimeListStream {
        CrimeListStream::new(self.sender.subscribe())
    }

    /// Number of live subscriptions, handy to check that cancelled observers
    /// really let go of the channel.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Call `handler` with the current snapshot and again after every change,
    /// on a background task, until the returned [`Subscription`] is cancelled
    /// or dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn observe<F>(&self, mut handler: F) -> Subscription
    where
        F: FnMut(Snapshot) + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let mut receiver = self.sender.subscribe();

        let handle = tokio::spawn(async move {
            let first = receiver.borrow_and_update().crimes.clone();
            handler(first);

            loop {
                tokio::select! {
                    biased;
                    () = cancelled.cancelled() => break,
                    changed = receiver.changed() => {
                        if changed.is_err() {
                            tracing::debug!("crime store dropped, ending observer");
                            break;
                        }
                        let snap = receiver.borrow_and_update().crimes.clone();
                        handler(snap);
                    }
                }
            }
        });

        Subscription {
            token,
            handle: Some(handle),
        }
    }
}

/// A subscription to the crime list.
///
/// Gives point-in-time access through `current()` / `latest()` and waits for
/// changes through `changed()`, or can be turned into a `Stream`.
pub struct CrimeListStream {
    current: Published,
    receiver: watch::Receiver<Published>,
}

impl CrimeListStream {
    fn new(mut receiver: watch::Receiver<Published>) -> Self {
        let current = receiver.borrow_and_update().clone();
        Self { current, receiver }
    }

    /// Snapshot seen at creation time or at the last `changed()`.
    pub fn current(&self) -> &Snapshot {
        &self.current.crimes
    }

    /// Version of [`current`](Self::current).
    pub fn version(&self) -> u64 {
        self.current.version
    }

    /// Latest snapshot, possibly newer than `current()`.
    pub fn latest(&self) -> Snapshot {
        self.receiver.borrow().crimes.clone()
    }

    /// Wait for the next committed change and return the new snapshot.
    /// Returns `None` once the store has been dropped.
    pub async fn changed(&mut self) -> Option<Snapshot> {
        self.receiver.changed().await.ok()?;
        self.current = self.receiver.borrow_and_update().clone();
        Some(self.current.crimes.clone())
    }

    /// Convert into a `Stream` that starts with the latest snapshot.
    pub fn into_stream(self) -> CrimeWatchStream {
        CrimeWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
///
/// The first item is the snapshot current at subscription time; after that a
/// new snapshot is yielded each time the table changes. Ends only when the
/// store is gone. Dropping the stream unsubscribes.
pub struct CrimeWatchStream {
    inner: WatchStream<Published>,
}

impl Stream for CrimeWatchStream {
    type Item = Snapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner)
            .poll_next(cx)
            .map(|published| published.map(|p| p.crimes))
    }
}

/// Handle for a running [`ChangeNotifier::observe`] task. Dropping it cancels
/// the task, so tying it to the consumer's lifetime is enough to stop
/// deliveries.
pub struct Subscription {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Stop delivering snapshots. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// False once cancelled or once the observer task has ended.
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
            && self
                .handle
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }

    /// Cancel and wait until the observer task has exited, after which the
    /// handler is guaranteed not to run again.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "crime observer task failed");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
