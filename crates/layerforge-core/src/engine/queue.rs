use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use crate::engine::events::Event;

/// Bounded outbound event queue. Item payloads count against a byte budget:
/// producers pushing an item block until the consumer drains enough bytes.
/// Control events (progress, warnings, terminals) are never blocked — a
/// terminal must always get through, budget or not.
pub struct EventQueue {
    budget: u64,
    inner: Mutex<Inner>,
    space: Condvar,
    ready: Condvar,
}

struct Inner {
    events: VecDeque<(Event, u64)>,
    used_bytes: u64,
    closed: bool,
    producers_stopped: bool,
}

/// Why a budgeted push did not happen.
#[derive(Debug, PartialEq, Eq)]
pub enum PushError {
    /// Producers were stopped (cancellation); the event was dropped.
    Cancelled,
    /// The payload alone exceeds the whole budget and can never fit.
    OverBudget { item_bytes: u64 },
}

impl EventQueue {
    pub fn new(budget: u64) -> Self {
        Self {
            budget,
            inner: Mutex::new(Inner {
                events: VecDeque::new(),
                used_bytes: 0,
                closed: false,
                producers_stopped: false,
            }),
            space: Condvar::new(),
            ready: Condvar::new(),
        }
    }

    /// Blocking byte-budgeted push for `ItemReady` payloads.
    pub fn push_item(&self, event: Event, bytes: u64) -> Result<(), PushError> {
        if bytes > self.budget {
            return Err(PushError::OverBudget { item_bytes: bytes });
        }
        let mut inner = self.inner.lock();
        loop {
            if inner.producers_stopped {
                return Err(PushError::Cancelled);
            }
            if inner.used_bytes + bytes <= self.budget {
                break;
            }
            self.space.wait(&mut inner);
        }
        inner.used_bytes += bytes;
        inner.events.push_back((event, bytes));
        self.ready.notify_one();
        Ok(())
    }

    /// Unbudgeted push for control events.
    pub fn push(&self, event: Event) {
        let mut inner = self.inner.lock();
        inner.events.push_back((event, 0));
        self.ready.notify_one();
    }

    /// Blocking pop; `None` once the queue is closed and drained.
    pub fn pop(&self) -> Option<Event> {
        let mut inner = self.inner.lock();
        loop {
            if let Some((event, bytes)) = inner.events.pop_front() {
                if bytes > 0 {
                    inner.used_bytes -= bytes;
                    self.space.notify_all();
                }
                return Some(event);
            }
            if inner.closed {
                return None;
            }
            self.ready.wait(&mut inner);
        }
    }

    /// Mark the stream finished (after the terminal event is queued).
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        self.ready.notify_all();
    }

    /// Unblock and fail all budgeted producers; used on cancellation.
    pub fn stop_producers(&self) {
        let mut inner = self.inner.lock();
        inner.producers_stopped = true;
        self.space.notify_all();
    }

    /// Bytes of item payloads currently queued.
    pub fn used_bytes(&self) -> u64 {
        self.inner.lock().used_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::events::GeneratedItem;
    use std::sync::Arc;
    use std::time::Duration;

    fn item(index: u32, len: usize) -> Event {
        Event::ItemReady(GeneratedItem {
            index,
            png_bytes: vec![0; len],
            attributes: vec![],
        })
    }

    #[test]
    fn test_fifo_and_byte_accounting() {
        let queue = EventQueue::new(100);
        queue.push_item(item(1, 40), 40).unwrap();
        queue.push(Event::Warning {
            message: "w".into(),
        });
        assert_eq!(queue.used_bytes(), 40);

        assert!(matches!(queue.pop(), Some(Event::ItemReady(i)) if i.index == 1));
        assert_eq!(queue.used_bytes(), 0);
        assert!(matches!(queue.pop(), Some(Event::Warning { .. })));

        queue.close();
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_oversized_item_is_rejected_up_front() {
        let queue = EventQueue::new(10);
        assert_eq!(
            queue.push_item(item(1, 11), 11),
            Err(PushError::OverBudget { item_bytes: 11 })
        );
    }

    #[test]
    fn test_full_queue_blocks_until_drained() {
        let queue = Arc::new(EventQueue::new(10));
        queue.push_item(item(1, 10), 10).unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || queue.push_item(item(2, 10), 10))
        };
        // Producer must be parked while the queue is full.
        std::thread::sleep(Duration::from_millis(50));
        assert!(!producer.is_finished());

        assert!(queue.pop().is_some());
        assert!(producer.join().unwrap().is_ok());
        assert!(matches!(queue.pop(), Some(Event::ItemReady(i)) if i.index == 2));
    }

    #[test]
    fn test_stop_producers_unblocks_with_cancelled() {
        let queue = Arc::new(EventQueue::new(10));
        queue.push_item(item(1, 10), 10).unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || queue.push_item(item(2, 10), 10))
        };
        std::thread::sleep(Duration::from_millis(50));
        queue.stop_producers();
        assert_eq!(producer.join().unwrap(), Err(PushError::Cancelled));
    }
}
