//! Bounded multi-producer, multi-consumer queue feeding stream subscribers.

use async_channel::{Receiver, Sender, TrySendError};

/// Why a push did not enqueue the item. The item is handed back.
#[derive(Debug)]
pub(crate) enum PushError<T> {
    /// The buffer is full and the caller asked not to wait.
    Full(T),
    /// The buffer was closed.
    Closed(T),
}

/// A bounded FIFO shared by every producer and every subscriber.
#[derive(Debug)]
pub(crate) struct RingBuffer<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
}

impl<T> RingBuffer<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, receiver) = async_channel::bounded(capacity);
        Self { sender, receiver }
    }

    /// Enqueues `item`, blocking while full if `wait` is set.
    pub(crate) fn push(&self, item: T, wait: bool) -> Result<(), PushError<T>> {
        if wait {
            return self
                .sender
                .send_blocking(item)
                .map_err(|err| PushError::Closed(err.into_inner()));
        }
        self.sender.try_send(item).map_err(|err| match err {
            TrySendError::Full(item) => PushError::Full(item),
            TrySendError::Closed(item) => PushError::Closed(item),
        })
    }

    /// Dequeues the oldest item, blocking while empty. Returns `None` once closed.
    pub(crate) fn pop(&self) -> Option<T> {
        if self.receiver.is_closed() {
            return None;
        }
        self.receiver.recv_blocking().ok()
    }

    /// Closes the buffer, returning the items nobody dequeued.
    pub(crate) fn close(&self) -> Vec<T> {
        self.sender.close();
        std::iter::from_fn(|| self.receiver.try_recv().ok()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.sender.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        let ring = RingBuffer::new(4);
        for i in 0..4 {
            ring.push(i, false).unwrap();
        }
        let popped: Vec<_> = (0..4).filter_map(|_| ring.pop()).collect();
        assert_eq!(popped, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_full_without_wait_returns_item() {
        let ring = RingBuffer::new(1);
        ring.push("a", false).unwrap();
        match ring.push("b", false) {
            Err(PushError::Full(item)) => assert_eq!(item, "b"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn test_close_drains_and_wakes_consumers() {
        let ring = Arc::new(RingBuffer::<u32>::new(2));
        let consumer = {
            let ring = ring.clone();
            std::thread::spawn(move || ring.pop())
        };
        std::thread::sleep(Duration::from_millis(20));
        assert!(ring.close().is_empty());
        assert_eq!(consumer.join().unwrap(), None);

        assert!(matches!(ring.push(1, true), Err(PushError::Closed(1))));
    }

    #[test]
    fn test_close_returns_queued_items() {
        let ring = RingBuffer::new(3);
        ring.push(1, false).unwrap();
        ring.push(2, false).unwrap();
        assert_eq!(ring.close(), vec![1, 2]);
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn test_blocking_push_resumes_after_pop() {
        let ring = Arc::new(RingBuffer::new(1));
        ring.push(1, false).unwrap();
        let producer = {
            let ring = ring.clone();
            std::thread::spawn(move || ring.push(2, true).is_ok())
        };
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(ring.pop(), Some(1));
        assert!(producer.join().unwrap());
        assert_eq!(ring.pop(), Some(2));
    }
}
