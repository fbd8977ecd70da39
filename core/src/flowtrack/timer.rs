//! One-shot timer scheduling.
//!
//! A single background thread keeps a deadline-ordered heap of pending
//! actions. Actions whose purpose has lapsed are not removed from the heap;
//! their owners disarm them and the firing becomes a no-op. On cancellation
//! everything still pending fires immediately, which promotes deferred
//! teardown to "now".

use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::shutdown::ShutdownToken;

/// Upper bound on one sleep, so cancellation is noticed promptly.
const IDLE_POLL: Duration = Duration::from_millis(100);

type Action = Box<dyn FnOnce() + Send + 'static>;

struct Entry {
    deadline: Instant,
    seq: u64,
    action: Action,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Schedules one-shot actions on a shared background thread.
pub(crate) struct TimerQueue {
    tx: Sender<Entry>,
    seq: AtomicU64,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TimerQueue {
    /// Starts the timer thread. It runs until `token` is cancelled or the
    /// queue is dropped.
    pub(crate) fn start(token: ShutdownToken) -> Self {
        let (tx, rx) = unbounded();
        let handle = thread::spawn(move || run(rx, token));
        TimerQueue {
            tx,
            seq: AtomicU64::new(0),
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Schedules `action` to fire `delay` from now. Actions scheduled after
    /// shutdown are dropped.
    pub(crate) fn schedule(&self, delay: Duration, action: impl FnOnce() + Send + 'static) {
        let entry = Entry {
            deadline: Instant::now() + delay,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            action: Box::new(action),
        };
        let _ = self.tx.send(entry);
    }

    /// Waits for the timer thread to exit. Only meaningful after the shared
    /// token was cancelled.
    pub(crate) fn join(&self) {
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

fn run(rx: Receiver<Entry>, token: ShutdownToken) {
    let mut pending: BinaryHeap<Reverse<Entry>> = BinaryHeap::new();
    loop {
        if token.is_cancelled() {
            while let Ok(entry) = rx.try_recv() {
                pending.push(Reverse(entry));
            }
            while let Some(Reverse(entry)) = pending.pop() {
                (entry.action)();
            }
            return;
        }

        let timeout = match pending.peek() {
            Some(Reverse(next)) => next
                .deadline
                .saturating_duration_since(Instant::now())
                .min(IDLE_POLL),
            None => IDLE_POLL,
        };
        match rx.recv_timeout(timeout) {
            Ok(entry) => pending.push(Reverse(entry)),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }

        let now = Instant::now();
        loop {
            let due = match pending.peek() {
                Some(Reverse(next)) => next.deadline <= now,
                None => false,
            };
            if !due {
                break;
            }
            if let Some(Reverse(entry)) = pending.pop() {
                (entry.action)();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn fires_after_deadline() {
        let timers = TimerQueue::start(ShutdownToken::new());
        let fired = Arc::new(AtomicUsize::new(0));

        let flag = Arc::clone(&fired);
        timers.schedule(Duration::from_millis(50), move || {
            flag.fetch_add(1, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(20));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        thread::sleep(Duration::from_millis(200));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fires_in_deadline_order() {
        let timers = TimerQueue::start(ShutdownToken::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        for (delay_ms, tag) in [(120u64, 2u32), (40, 1), (200, 3)] {
            let order = Arc::clone(&order);
            timers.schedule(Duration::from_millis(delay_ms), move || {
                order.lock().push(tag);
            });
        }

        thread::sleep(Duration::from_millis(500));
        assert_eq!(*order.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn cancellation_fires_pending_immediately() {
        let token = ShutdownToken::new();
        let timers = TimerQueue::start(token.clone());
        let fired = Arc::new(AtomicUsize::new(0));

        let flag = Arc::clone(&fired);
        timers.schedule(Duration::from_secs(3600), move || {
            flag.fetch_add(1, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(20));
        token.cancel();
        timers.join();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
