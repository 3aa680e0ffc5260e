use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::debug;

use super::scheduler::{PeerEffects, UploadScheduler, CHOKE_INTERVAL};

/// Periodic driver for an [`UploadScheduler`].
///
/// Runs [`UploadScheduler::tick`] every [`CHOKE_INTERVAL`] on a spawned
/// task. The mutex serializes ticks with the connection layer's event
/// calls, so a tick and a peer event never interleave.
pub struct UploadService {
    task: JoinHandle<()>,
}

impl UploadService {
    /// Spawns the tick loop. The first tick fires one interval after the
    /// call; a late tick delays but never skips later ones.
    pub fn start<E>(scheduler: Arc<Mutex<UploadScheduler<E>>>) -> Self
    where
        E: PeerEffects + Send + 'static,
    {
        let task = tokio::spawn(async move {
            debug!("upload scheduler ticking every {:?}", CHOKE_INTERVAL);
            let mut ticker = interval(CHOKE_INTERVAL);
            // The first interval tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                scheduler.lock().tick();
            }
        });
        Self { task }
    }

    /// Stops the tick loop. The scheduler itself stays usable.
    pub fn stop(self) {
        self.task.abort();
    }
}
