//! Cooperative cancellation and interrupt handling
//!
//! Live watches poll the service in a loop. A [`CancelToken`] is handed to
//! each watch and checked before every network call and while sleeping
//! between polls, so a caller can stop a watch without killing the process.
//!
//! On the first SIGINT/SIGTERM the installed handler trips the token. A
//! second signal exits immediately with [`EXIT_CODE_CANCELLED`].

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Exit code for cancelled commands
pub const EXIT_CODE_CANCELLED: i32 = 80;

/// Granularity of cancellable sleeps
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Cloneable cancellation flag shared between a caller and a watch
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early on cancellation.
    ///
    /// Returns false if the token was cancelled before the sleep completed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

/// Action to take after receiving a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First signal: cancel the running watch
    Cancel,
    /// Second signal: exit immediately
    ImmediateExit,
    /// Third+ signal: ignore
    Ignore,
}

/// Signal handler that trips a cancel token
#[derive(Debug, Clone)]
pub struct InterruptHandler {
    token: CancelToken,
    signal_count: Arc<AtomicU8>,
}

impl InterruptHandler {
    pub fn new() -> Self {
        Self::with_token(CancelToken::new())
    }

    pub fn with_token(token: CancelToken) -> Self {
        Self {
            token,
            signal_count: Arc::new(AtomicU8::new(0)),
        }
    }

    /// Token tripped by the first signal
    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Handle a signal and return the action taken
    pub fn handle_signal(&self) -> SignalAction {
        let count = self.signal_count.fetch_add(1, Ordering::SeqCst);
        match count {
            0 => {
                self.token.cancel();
                SignalAction::Cancel
            }
            1 => SignalAction::ImmediateExit,
            _ => SignalAction::Ignore,
        }
    }

    /// Install the process-wide SIGINT/SIGTERM handler
    ///
    /// Must be called at most once per process.
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let handler = self.clone();
        ctrlc::set_handler(move || match handler.handle_signal() {
            SignalAction::Cancel => {
                tracing::warn!("received interrupt, stopping watch (press again to exit)");
            }
            SignalAction::ImmediateExit => {
                std::process::exit(EXIT_CODE_CANCELLED);
            }
            SignalAction::Ignore => {}
        })
    }
}

impl Default for InterruptHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_initial() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_sleep_completes() {
        let token = CancelToken::new();
        assert!(token.sleep(Duration::from_millis(5)));
        assert!(token.sleep(Duration::ZERO));
    }

    #[test]
    fn test_sleep_returns_early_when_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        let start = Instant::now();
        assert!(!token.sleep(Duration::from_secs(30)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_sleep_wakes_on_cancel_from_other_thread() {
        let token = CancelToken::new();
        let remote = token.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            remote.cancel();
        });
        let start = Instant::now();
        assert!(!token.sleep(Duration::from_secs(30)));
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn test_signal_sequence() {
        let handler = InterruptHandler::new();
        let token = handler.token();

        assert_eq!(handler.handle_signal(), SignalAction::Cancel);
        assert!(token.is_cancelled());
        assert_eq!(handler.handle_signal(), SignalAction::ImmediateExit);
        assert_eq!(handler.handle_signal(), SignalAction::Ignore);
    }
}
