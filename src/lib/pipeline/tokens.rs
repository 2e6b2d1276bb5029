//! In-flight permits for pipeline backpressure.
//!
//! The parse stage may not emit a batch without holding a [`Token`]; the
//! token escorts the batch through the pipeline and is returned to the
//! pool only when the final stage has finished with it. Exhausting the
//! budget blocks the parse stage, which is the pipeline's sole
//! backpressure mechanism, and bounds in-flight memory to
//! `budget x batch_size x per-record bytes` plus a constant.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};

/// One unit of in-flight permission. Cannot be constructed outside the
/// pool, so the number of circulating tokens never exceeds the budget.
#[derive(Debug)]
pub struct Token {
    _priv: (),
}

/// A fixed budget of tokens, backed by a prefilled bounded channel so
/// acquire/release are plain channel operations.
pub struct TokenPool {
    tx: Sender<Token>,
    rx: Receiver<Token>,
    budget: usize,
}

impl TokenPool {
    /// Creates a pool holding `budget` tokens.
    #[must_use]
    pub fn new(budget: usize) -> Self {
        let (tx, rx) = bounded(budget);
        for _ in 0..budget {
            tx.send(Token { _priv: () }).expect("channel sized to the budget");
        }
        Self { tx, rx, budget }
    }

    /// Blocks until a token is available, polling the abort flag so a
    /// failing pipeline cannot strand the parse stage. Returns `None`
    /// once `aborting` is set.
    #[must_use]
    pub fn acquire(&self, aborting: &AtomicBool) -> Option<Token> {
        loop {
            if aborting.load(Ordering::Acquire) {
                return None;
            }
            match self.rx.recv_timeout(Duration::from_millis(20)) {
                Ok(token) => return Some(token),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Returns a token to the pool.
    pub fn release(&self, token: Token) {
        // Cannot fail: the pool holds both channel ends and never exceeds
        // its own budget.
        let _ = self.tx.send(token);
    }

    /// Tokens currently available.
    #[must_use]
    pub fn available(&self) -> usize {
        self.rx.len()
    }

    /// The configured budget.
    #[must_use]
    pub fn budget(&self) -> usize {
        self.budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_budget_is_respected() {
        let aborting = AtomicBool::new(false);
        let pool = TokenPool::new(2);
        assert_eq!(pool.available(), 2);

        let t1 = pool.acquire(&aborting).unwrap();
        let t2 = pool.acquire(&aborting).unwrap();
        assert_eq!(pool.available(), 0);

        pool.release(t1);
        assert_eq!(pool.available(), 1);
        pool.release(t2);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_acquire_blocks_until_release() {
        let pool = Arc::new(TokenPool::new(1));
        let aborting = Arc::new(AtomicBool::new(false));
        let held = pool.acquire(&aborting).unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            let aborting = Arc::clone(&aborting);
            std::thread::spawn(move || pool.acquire(&aborting).is_some())
        };

        std::thread::sleep(Duration::from_millis(50));
        pool.release(held);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_acquire_observes_abort() {
        let pool = Arc::new(TokenPool::new(1));
        let aborting = Arc::new(AtomicBool::new(false));
        let _held = pool.acquire(&aborting).unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            let aborting = Arc::clone(&aborting);
            std::thread::spawn(move || pool.acquire(&aborting))
        };

        std::thread::sleep(Duration::from_millis(50));
        aborting.store(true, Ordering::Release);
        assert!(waiter.join().unwrap().is_none());
    }
}
