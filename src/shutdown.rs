// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Cooperative cancellation of the polling loop.

use tokio::sync::watch;

/// Creates a connected pair of shutdown handles.
pub fn shutdown_handles() -> (ShutdownHandle, ShutdownSignal) {
    let (sender, receiver) = watch::channel(false);
    (ShutdownHandle(sender), ShutdownSignal(receiver))
}

/// Requests a shutdown.
#[derive(Debug)]
pub struct ShutdownHandle(watch::Sender<bool>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }
}

/// Observes a shutdown request.
#[derive(Clone, Debug)]
pub struct ShutdownSignal(watch::Receiver<bool>);

impl ShutdownSignal {
    /// Whether a shutdown was requested.
    pub fn is_requested(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once a shutdown is requested or the handle is dropped.
    pub async fn requested(&mut self) {
        while !*self.0.borrow_and_update() {
            if self.0.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn signal_follows_handle() {
        let (handle, mut signal) = shutdown_handles();
        assert!(!signal.is_requested());
        handle.shutdown();
        assert!(signal.is_requested());
        signal.requested().await;
    }

    #[tokio::test]
    async fn dropped_handle_resolves() {
        let (handle, mut signal) = shutdown_handles();
        drop(handle);
        signal.requested().await;
        assert!(!signal.is_requested());
    }
}
