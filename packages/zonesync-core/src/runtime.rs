//! Background task spawning.
//!
//! The liveness sweep and the primary-source forwarder are long-lived loops.
//! They are started through [`TaskSpawner`] so the composition root decides
//! which runtime they land on.

use std::future::Future;

/// Spawns detached background work.
///
/// Nothing here joins or aborts a task; every loop stops by watching its own
/// `CancellationToken`.
pub trait TaskSpawner: Send + Sync {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Spawns a service loop and logs when it starts and exits.
    fn spawn_service<F>(&self, name: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn(async move {
            log::debug!("[Runtime] {} started", name);
            future.await;
            log::debug!("[Runtime] {} stopped", name);
        });
    }
}

/// Spawns onto a Tokio runtime handle.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Spawner for the runtime this is called from.
    ///
    /// # Panics
    ///
    /// Outside of a Tokio runtime.
    #[must_use]
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(future);
    }
}
