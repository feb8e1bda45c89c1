//! Stop requests shared by batch runs and the start controller.

use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::deploy::AttemptRecord;
use crate::errors::AdvisorError;

/// Listener told the stop reason once.
pub type StopListener = Box<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct StopState {
    reason: Option<String>,
    listeners: Vec<StopListener>,
}

/// A stop request observed between units of work.
///
/// The first reason wins. Nothing in flight is interrupted: a batch stops
/// handing out processors and the controller stops escalating, but a
/// `:startWith` already sent runs to completion.
#[derive(Default)]
pub struct CancellationToken {
    stopped: AtomicBool,
    state: Mutex<StopState>,
}

impl CancellationToken {
    /// Creates a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop. Later calls are ignored.
    ///
    /// Listeners run on the calling thread after the lock is released; a
    /// panicking listener is logged and the rest still run.
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let listeners = {
            let mut state = self.state.lock();
            if state.reason.is_some() {
                return;
            }
            state.reason = Some(reason.clone());
            self.stopped.store(true, Ordering::Release);
            std::mem::take(&mut state.listeners)
        };

        tracing::info!(%reason, listeners = listeners.len(), "Stop requested");
        for listener in &listeners {
            notify(listener.as_ref(), &reason);
        }
    }

    /// Registers a listener for the stop reason. On a token that is already
    /// cancelled the listener runs right away.
    pub fn on_cancel<F>(&self, listener: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let mut state = self.state.lock();
        match state.reason.clone() {
            Some(reason) => {
                drop(state);
                notify(&listener, &reason);
            }
            None => state.listeners.push(Box::new(listener)),
        }
    }

    /// Whether a stop was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// The first stop reason.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.state.lock().reason.clone()
    }

    /// `Cancelled` error carrying the stop reason and the attempts made so far.
    #[must_use]
    pub fn to_error(&self, history: Vec<AttemptRecord>) -> AdvisorError {
        AdvisorError::Cancelled {
            reason: self.reason().unwrap_or_else(|| "cancelled".to_string()),
            history,
        }
    }
}

fn notify(listener: &dyn Fn(&str), reason: &str) {
    if catch_unwind(AssertUnwindSafe(|| listener(reason))).is_err() {
        tracing::warn!(reason, "Stop listener panicked");
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CancellationToken")
            .field("reason", &state.reason)
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |reason: &str| sink.lock().push(reason.to_string()))
    }

    #[test]
    fn test_first_reason_wins() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());

        token.cancel("interrupted");
        token.cancel("second");
        assert!(token.is_cancelled());
        assert_eq!(token.reason().as_deref(), Some("interrupted"));
    }

    #[test]
    fn test_listeners_hear_reason_once() {
        let token = CancellationToken::new();
        let (seen, listener) = recorder();
        token.on_cancel(listener);
        assert!(seen.lock().is_empty());

        token.cancel("interrupted");
        token.cancel("again");
        assert_eq!(*seen.lock(), vec!["interrupted"]);
    }

    #[test]
    fn test_late_listener_runs_immediately() {
        let token = CancellationToken::new();
        token.cancel("deadline");

        let (seen, listener) = recorder();
        token.on_cancel(listener);
        assert_eq!(*seen.lock(), vec!["deadline"]);
    }

    #[test]
    fn test_panicking_listener_does_not_block_others() {
        let token = CancellationToken::new();
        let (seen, listener) = recorder();
        token.on_cancel(|_| panic!("listener failure"));
        token.on_cancel(listener);

        token.cancel("interrupted");
        assert!(token.is_cancelled());
        assert_eq!(*seen.lock(), vec!["interrupted"]);
    }

    #[test]
    fn test_to_error_carries_reason_and_history() {
        let token = CancellationToken::new();
        token.cancel("interrupted");
        let err = token.to_error(vec![AttemptRecord::new("SP2", "Minimum tier for this workload: SP10")]);

        assert_eq!(err.error_kind(), "Cancelled");
        match err {
            AdvisorError::Cancelled { reason, history } => {
                assert_eq!(reason, "interrupted");
                assert_eq!(history.len(), 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
