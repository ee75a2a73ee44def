//! Cancellation signalling for in-flight vault calls.
//!
//! A `CancelHandle` owns the sending side of a watch channel; every
//! `Cancellation` token observes it. Cancelling is sticky: a token created
//! after the handle fired reports cancelled immediately.

use tokio::sync::watch;

/// Owning side. Dropping it does not cancel.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Observing side, cheap to clone and hand to a vault call.
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

/// Create a connected handle and token.
pub fn cancellation() -> (CancelHandle, Cancellation) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, Cancellation { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn token(&self) -> Cancellation {
        Cancellation {
            rx: self.tx.subscribe(),
        }
    }
}

impl Cancellation {
    /// A token that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested. Pending forever if the handle
    /// was dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_cancel_wakes_waiter() {
        let (handle, token) = cancellation();
        let waiter = tokio::spawn(async move { token.cancelled().await });

        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_late_token_sees_cancel() {
        let (handle, _token) = cancellation();
        handle.cancel();
        assert!(handle.token().is_cancelled());
        handle.token().cancelled().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_stays_pending() {
        let token = Cancellation::never();
        let result = tokio::time::timeout(Duration::from_secs(5), token.cancelled()).await;
        assert!(result.is_err());
        assert!(!token.is_cancelled());
    }
}
