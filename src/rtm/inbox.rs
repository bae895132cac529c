use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::timeout;

/// Unbounded FIFO with pull-based, multi-consumer receive.
///
/// The connection task is the single producer. Any number of consumers may call the
/// receive methods concurrently; each item is handed to exactly one of them. The queue lock
/// is only held to push or pop, never while a consumer waits.
#[derive(Debug)]
pub struct Inbox<T> {
    items: Mutex<VecDeque<T>>,
    available: Notify,
}

impl<T> Default for Inbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Inbox<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Notify::new(),
        }
    }

    pub(crate) fn push(&self, item: T) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(item);
        self.available.notify_one();
    }

    /// Pop the oldest item without waiting. Returns `None` only when the inbox is empty.
    pub fn try_receive(&self) -> Option<T> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Pop the oldest item, waiting up to `wait` for one to arrive (forever if `None`).
    ///
    /// Expiry is not an error: it yields `None` like an empty non-blocking receive.
    pub async fn receive(&self, wait: Option<Duration>) -> Option<T> {
        match wait {
            Some(wait) => timeout(wait, self.next()).await.ok(),
            None => Some(self.next().await),
        }
    }

    async fn next(&self) -> T {
        loop {
            // Register before checking so a push in between is not missed
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_receive() {
                // Pass the wakeup on when more is queued; another consumer may have taken ours
                if !self.is_empty() {
                    self.available.notify_one();
                }
                return item;
            }

            notified.await;
        }
    }

    /// Blocking or non-blocking pop, selected by `block`.
    pub async fn receive_with(&self, block: bool, wait: Option<Duration>) -> Option<T> {
        if block {
            self.receive(wait).await
        } else {
            self.try_receive()
        }
    }

    /// Number of items waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::time::Instant;

    use super::*;

    #[tokio::test]
    async fn non_blocking_receive_on_empty_returns_none() {
        let inbox = Inbox::<u32>::new();

        let started = Instant::now();
        assert_eq!(inbox.try_receive(), None);
        assert_eq!(inbox.receive_with(false, Some(Duration::from_secs(5))).await, None);
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn blocking_receive_times_out_as_empty() {
        let inbox = Inbox::<u32>::new();
        let wait = Duration::from_millis(100);

        let started = Instant::now();
        assert_eq!(inbox.receive(Some(wait)).await, None);

        let elapsed = started.elapsed();
        assert!(elapsed >= wait, "returned after {elapsed:?}");
        assert!(elapsed < wait + Duration::from_secs(1), "returned after {elapsed:?}");
    }

    #[tokio::test]
    async fn items_come_out_in_push_order() {
        let inbox = Inbox::new();
        for n in 1..=5 {
            inbox.push(n);
        }
        assert_eq!(inbox.len(), 5);

        let mut received = Vec::new();
        while let Some(n) = inbox.try_receive() {
            received.push(n);
        }

        assert_eq!(received, [1, 2, 3, 4, 5]);
        assert!(inbox.is_empty());
    }

    #[tokio::test]
    async fn blocking_receive_wakes_on_push() {
        let inbox = Arc::new(Inbox::new());

        let consumer = {
            let inbox = Arc::clone(&inbox);
            tokio::spawn(async move { inbox.receive(None).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        inbox.push("hello");

        let received = timeout(Duration::from_secs(2), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, Some("hello"));
    }

    #[tokio::test]
    async fn parked_consumer_does_not_hide_queued_items() {
        let inbox = Arc::new(Inbox::new());

        let consumer = {
            let inbox = Arc::clone(&inbox);
            tokio::spawn(async move { inbox.receive(None).await })
        };
        // Let the consumer park on the empty inbox
        tokio::time::sleep(Duration::from_millis(20)).await;

        inbox.push(1);
        inbox.push(2);
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox.try_receive(), Some(1));
        assert_eq!(inbox.receive_with(false, None).await, Some(2));

        inbox.push(3);
        let received = timeout(Duration::from_secs(2), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, Some(3));
        assert!(inbox.is_empty());
    }

    #[tokio::test]
    async fn timed_out_waiter_leaves_item_for_the_next_consumer() {
        let inbox = Inbox::new();

        assert_eq!(inbox.receive(Some(Duration::from_millis(20))).await, None);
        inbox.push("late");

        assert_eq!(inbox.receive(Some(Duration::from_millis(20))).await, Some("late"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_consumers_each_item_once() {
        let inbox = Arc::new(Inbox::new());
        for n in 0..100_u32 {
            inbox.push(n);
        }

        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let inbox = Arc::clone(&inbox);
                tokio::spawn(async move {
                    let mut taken = Vec::new();
                    while let Some(n) = inbox.receive(Some(Duration::from_millis(50))).await {
                        taken.push(n);
                    }
                    taken
                })
            })
            .collect();

        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.await.unwrap());
        }
        all.sort_unstable();

        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }
}
