//! Host lifecycle signals delivered over a channel.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::image_cache::ImageCache;

/// Lifecycle notifications relevant to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The host is running low on memory.
    MemoryPressure,
    /// The host is moving to the background.
    EnterBackground,
}

/// Spawns a task that forwards lifecycle events to `cache` until the sender closes.
pub fn spawn_lifecycle_listener(
    cache: ImageCache,
    mut events: mpsc::UnboundedReceiver<LifecycleEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!(event = ?event, "Lifecycle event");
            match event {
                LifecycleEvent::MemoryPressure => cache.on_memory_pressure(),
                LifecycleEvent::EnterBackground => {
                    let _ = cache.on_enter_background();
                }
            }
        }
        debug!("Lifecycle channel closed");
    })
}
