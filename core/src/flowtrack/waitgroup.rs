//! Counting latch that gates termination segments behind pending requests.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::shutdown::ShutdownToken;

/// How often a blocked waiter re-checks for cancellation.
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Counting latch. One token is held per pending request; termination
/// segments wait for the count to drain before touching flow state.
///
/// Unlike a barrier, tokens can be added while waiters are blocked, and
/// releasing below zero is ignored so that teardown paths may over-drain
/// without consequence.
#[derive(Debug, Default)]
pub(crate) struct WaitGroup {
    count: Mutex<i64>,
    zero: Condvar,
}

impl WaitGroup {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adds `n` tokens.
    pub(crate) fn add(&self, n: i64) {
        let mut count = self.count.lock();
        *count += n;
    }

    /// Releases one token. Calls beyond the held count are ignored.
    pub(crate) fn done(&self) {
        let mut count = self.count.lock();
        if *count > 0 {
            *count -= 1;
        }
        if *count == 0 {
            self.zero.notify_all();
        }
    }

    /// Current token count.
    pub(crate) fn count(&self) -> i64 {
        *self.count.lock()
    }

    /// Blocks until the count reaches zero or `token` is cancelled.
    pub(crate) fn wait(&self, token: &ShutdownToken) {
        let mut count = self.count.lock();
        while *count > 0 {
            if token.is_cancelled() {
                return;
            }
            self.zero.wait_for(&mut count, CANCEL_POLL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn wait_returns_once_drained() {
        let wg = Arc::new(WaitGroup::new());
        wg.add(2);

        let waiter = {
            let wg = Arc::clone(&wg);
            thread::spawn(move || wg.wait(&ShutdownToken::new()))
        };

        thread::sleep(Duration::from_millis(50));
        wg.done();
        wg.done();
        waiter.join().unwrap();
        assert_eq!(wg.count(), 0);
    }

    #[test]
    fn wait_with_zero_count_is_immediate() {
        let wg = WaitGroup::new();
        let start = Instant::now();
        wg.wait(&ShutdownToken::new());
        assert!(start.elapsed() < Duration::from_millis(20));
    }

    #[test]
    fn cancellation_short_circuits_wait() {
        let wg = Arc::new(WaitGroup::new());
        wg.add(1);
        let token = ShutdownToken::new();

        let waiter = {
            let wg = Arc::clone(&wg);
            let token = token.clone();
            thread::spawn(move || wg.wait(&token))
        };

        thread::sleep(Duration::from_millis(50));
        token.cancel();
        waiter.join().unwrap();
        // The token was never released; only the wait was abandoned.
        assert_eq!(wg.count(), 1);
    }

    #[test]
    fn done_floors_at_zero() {
        let wg = WaitGroup::new();
        wg.done();
        wg.done();
        assert_eq!(wg.count(), 0);
        wg.add(1);
        assert_eq!(wg.count(), 1);
    }
}
