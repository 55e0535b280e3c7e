//! Cooperative cancellation for one research session.
//!
//! Built on a `tokio::sync::watch` channel: the caller holds the
//! [`CancelHandle`], the session and every outbound I/O future hold clones
//! of the [`CancelToken`]. Cancellation is observed at the controller's
//! gate #1 and at each I/O suspension point.

use tokio::sync::watch;

/// Create a connected handle/token pair.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(None);
    (CancelHandle { tx }, CancelToken { rx })
}

/// The caller's side: request cancellation with a reason.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<Option<String>>,
}

impl CancelHandle {
    /// Signal cancellation. Idempotent; the first reason wins.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason.into());
                true
            } else {
                false
            }
        });
    }
}

/// The session's side: observe cancellation.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<Option<String>>,
}

impl CancelToken {
    /// Non-blocking check, used at the gate.
    pub fn is_cancelled(&self) -> bool {
        self.rx.borrow().is_some()
    }

    pub fn reason(&self) -> Option<String> {
        self.rx.borrow().clone()
    }

    /// Resolves when cancellation is requested. Used in `select!` against
    /// outbound I/O so pending calls return promptly.
    pub async fn cancelled(&mut self) -> String {
        loop {
            if let Some(reason) = self.rx.borrow().clone() {
                return reason;
            }
            if self.rx.changed().await.is_err() {
                // Handle dropped without cancelling; never resolves.
                std::future::pending::<()>().await;
            }
        }
    }

    /// A token that never fires, for sessions without a caller-side handle.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(None);
        // Leak the sender so the channel stays open.
        std::mem::forget(tx);
        Self { rx }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uncancelled() {
        let (_handle, token) = cancel_pair();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
    }

    #[test]
    fn cancel_sets_reason() {
        let (handle, token) = cancel_pair();
        handle.cancel("caller went away");
        assert!(token.is_cancelled());
        assert_eq!(token.reason().as_deref(), Some("caller went away"));
    }

    #[test]
    fn first_reason_wins() {
        let (handle, token) = cancel_pair();
        handle.cancel("first");
        handle.cancel("second");
        assert_eq!(token.reason().as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn cancelled_future_resolves() {
        let (handle, mut token) = cancel_pair();
        let waiter = tokio::spawn(async move { token.cancelled().await });
        handle.cancel("stop");
        assert_eq!(waiter.await.unwrap(), "stop");
    }

    #[test]
    fn never_token_is_never_cancelled() {
        let token = CancelToken::never();
        assert!(!token.is_cancelled());
    }
}
