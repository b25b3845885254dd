use std::sync::{Arc, Mutex, MutexGuard};

use futures::Stream;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

/// Broadcast cell that replays its latest value to every new subscriber
/// and then delivers every later value in publish order.
pub struct StatusStream<T: Clone + Send + 'static> {
    sender: broadcast::Sender<T>,
    /// Latest value; held locked across publish and subscribe so that a
    /// subscriber never misses or duplicates a value.
    latest: Arc<Mutex<T>>,
    stats: Arc<Mutex<StatusStreamStats>>,
}

/// Statistics for monitoring stream activity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusStreamStats {
    pub values_published: u64,
    pub subscriptions: u64,
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T: Clone + Send + 'static> StatusStream<T> {
    /// Create a new status stream holding `initial`
    pub fn new(initial: T, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            latest: Arc::new(Mutex::new(initial)),
            stats: Arc::new(Mutex::new(StatusStreamStats::default())),
        }
    }

    /// Current value
    pub fn get(&self) -> T {
        lock(&self.latest).clone()
    }

    /// Replace the current value and notify every subscriber
    pub fn publish(&self, value: T) {
        let mut latest = lock(&self.latest);
        *latest = value.clone();
        // No receivers is not an error for a cell: the value is retained.
        let receivers = self.sender.send(value).unwrap_or(0);
        drop(latest);

        lock(&self.stats).values_published += 1;
        trace!(receivers, "Status value published");
    }

    /// Subscribe; the first value received is the current one
    pub fn subscribe(&self) -> Subscriber<T> {
        let latest = lock(&self.latest);
        let subscriber = Subscriber {
            initial: Some(latest.clone()),
            receiver: self.sender.subscribe(),
        };
        drop(latest);

        lock(&self.stats).subscriptions += 1;
        debug!("New subscriber registered to status stream");
        subscriber
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get current statistics
    pub fn stats(&self) -> StatusStreamStats {
        lock(&self.stats).clone()
    }
}

impl<T: Clone + Send + 'static> Clone for StatusStream<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            latest: Arc::clone(&self.latest),
            stats: Arc::clone(&self.stats),
        }
    }
}

/// Subscriber for receiving values from a status stream
pub struct Subscriber<T: Clone + Send + 'static> {
    initial: Option<T>,
    receiver: broadcast::Receiver<T>,
}

impl<T: Clone + Send + 'static> Subscriber<T> {
    /// Receive the next value, or `None` once the stream is gone
    pub async fn recv(&mut self) -> Option<T> {
        if let Some(value) = self.initial.take() {
            return Some(value);
        }

        loop {
            match self.receiver.recv().await {
                Ok(value) => return Some(value),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Status subscriber lagged, skipping to newer values");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receive a value if one is ready without waiting
    pub fn try_recv(&mut self) -> Option<T> {
        if let Some(value) = self.initial.take() {
            return Some(value);
        }

        loop {
            match self.receiver.try_recv() {
                Ok(value) => return Some(value),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Status subscriber lagged, skipping to newer values");
                }
                Err(_) => return None,
            }
        }
    }

    /// Convert into a `Stream` of values
    pub fn into_stream(mut self) -> impl Stream<Item = T> {
        async_stream::stream! {
            while let Some(value) = self.recv().await {
                yield value;
            }
        }
    }
}
