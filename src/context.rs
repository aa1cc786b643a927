use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Why a context stopped admitting work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("context cancelled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation and deadline scope for transaction starts.
///
/// A context is cheap to clone. Derived contexts observe the cancellation of
/// every ancestor and never extend an ancestor's deadline.
#[derive(Clone, Debug)]
pub struct Context {
    signal: watch::Receiver<bool>,
    parent: Option<Arc<Context>>,
    deadline: Option<Instant>,
}

/// Cancels the context it was created with, and every context derived from it.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    signal: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Cancel the context and everything derived from it.
    pub fn cancel(&self) {
        self.signal.send_replace(true);
    }
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        let (_signal, receiver) = watch::channel(false);
        Self {
            signal: receiver,
            parent: None,
            deadline: None,
        }
    }

    /// Derive a context that can be cancelled through the returned handle.
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let (signal, receiver) = watch::channel(false);
        let child = Self {
            signal: receiver,
            parent: Some(Arc::new(self.clone())),
            deadline: self.deadline,
        };
        (
            child,
            CancelHandle {
                signal: Arc::new(signal),
            },
        )
    }

    /// Derive a context whose deadline is `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a context with the earlier of `deadline` and this context's deadline.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        };
        Self {
            signal: self.signal.clone(),
            parent: self.parent.clone(),
            deadline: Some(deadline),
        }
    }

    /// The effective deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether this context or any ancestor has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.signal.borrow()
            || self
                .parent
                .as_ref()
                .map_or(false, |parent| parent.is_cancelled())
    }

    /// Reports why the context is done, or `None` while work is still admitted.
    pub fn err(&self) -> Option<ContextError> {
        if self.is_cancelled() {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once this context or any ancestor is cancelled.
    pub fn cancelled(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            match &self.parent {
                Some(parent) => {
                    tokio::select! {
                        _ = wait_for_signal(self.signal.clone()) => {}
                        _ = parent.cancelled() => {}
                    }
                }
                None => wait_for_signal(self.signal.clone()).await,
            }
        })
    }

    /// Drives `fut` until it completes, the context is cancelled, or the
    /// deadline passes, whichever comes first.
    pub async fn scope<F>(&self, fut: F) -> Result<F::Output, ContextError>
    where
        F: Future,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancelled() => Err(ContextError::Cancelled),
            _ = deadline => Err(ContextError::DeadlineExceeded),
            output = fut => Ok(output),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

async fn wait_for_signal(mut signal: watch::Receiver<bool>) {
    loop {
        if *signal.borrow_and_update() {
            return;
        }
        // A dropped sender can no longer cancel.
        if signal.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
