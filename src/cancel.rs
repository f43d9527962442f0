//! Cooperative cancellation shared by a job and all of its tasks

use futures::future::select_all;
use std::sync::Arc;
use tokio::sync::watch;

/// Cancellation signal backed by a `watch` channel.
///
/// Clones observe the same signal. Once cancelled, a token stays cancelled.
/// A child token is also cancelled when any of its ancestors is, but
/// cancelling a child leaves the parent untouched.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
    parent: Option<Arc<CancellationToken>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
            parent: None,
        }
    }

    /// New token scoped under this one
    pub fn child_token(&self) -> Self {
        Self {
            parent: Some(Arc::new(self.clone())),
            ..Self::new()
        }
    }

    /// Signal every holder of this token (and of its children) to stop
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.chain().any(|token| *token.receiver.borrow())
    }

    /// Resolves once this token or one of its ancestors is cancelled
    pub async fn cancelled(&self) {
        let waits = self
            .chain()
            .map(|token| Box::pin(wait_for(token.receiver.clone())));
        select_all(waits).await;
    }

    /// This token followed by its ancestors
    fn chain(&self) -> impl Iterator<Item = &CancellationToken> {
        std::iter::successors(Some(self), |token| token.parent.as_deref())
    }
}

async fn wait_for(mut receiver: watch::Receiver<bool>) {
    loop {
        if *receiver.borrow_and_update() {
            return;
        }
        if receiver.changed().await.is_err() {
            // Sender is held by every clone, so this only happens during teardown.
            std::future::pending::<()>().await;
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
