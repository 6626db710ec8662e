//! Push-based listeners over a store's change feed.
//!
//! A [`Subscription`] owns a background task that re-reads its target after
//! every relevant change and forwards the fresh snapshot. The task stops when
//! the handle is cancelled or dropped, so a listener can never outlive the
//! view that created it.

use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, Stream};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::{ReliefError, Result};
use crate::store::{ChangeEvent, DocumentStore};

/// Snapshots buffered per listener before the producer waits.
const SUBSCRIPTION_BUFFER: usize = 16;

pub struct Subscription<T> {
    rx: mpsc::Receiver<Result<T>>,
    cancel: CancellationToken,
}

impl<T: Send + 'static> Subscription<T> {
    /// Start listening. `relevant` selects the change events that trigger a
    /// new snapshot; `snapshot` produces it. The first snapshot is sent
    /// immediately.
    pub(crate) fn spawn<R, S, Fut>(store: Arc<dyn DocumentStore>, relevant: R, snapshot: S) -> Self
    where
        R: Fn(&ChangeEvent) -> bool + Send + 'static,
        S: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send,
    {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        // Subscribe before the first read so no change slips in between.
        let mut feed = store.watch();

        tokio::spawn(async move {
            let first = snapshot().await;
            let failed = first.is_err();
            if tx.send(first).await.is_err() || failed {
                return;
            }

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = feed.recv() => match event {
                        Ok(event) if relevant(&event) => {
                            debug!(collection = %event.collection, id = %event.id, "change observed");
                            let next = snapshot().await;
                            let failed = next.is_err();
                            if tx.send(next).await.is_err() || failed {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(missed)) => {
                            let _ = tx
                                .send(Err(ReliefError::Subscription(format!(
                                    "listener fell behind by {missed} changes"
                                ))))
                                .await;
                            break;
                        }
                        Err(RecvError::Closed) => {
                            let _ = tx
                                .send(Err(ReliefError::Subscription("change feed closed".to_string())))
                                .await;
                            break;
                        }
                    }
                }
            }
            debug!("listener released");
        });

        Self { rx, cancel }
    }

    /// Next snapshot, or `None` once the listener has ended. An `Err` item is
    /// always the last one.
    pub async fn next(&mut self) -> Option<Result<T>> {
        self.rx.recv().await
    }

    /// Stop the background listener. Snapshots already buffered can still be read.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<T>> + Send {
        stream::unfold(self, |mut sub| async move { sub.next().await.map(|item| (item, sub)) })
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
