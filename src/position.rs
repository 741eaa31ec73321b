//! Last-known-position cache.
//!
//! Bridges the host's live location stream into a latest-value channel the
//! rest of the pipeline can sample, seeded from persisted state so the
//! heading signal is available immediately after startup. Fixes without a
//! bearing carry no direction of travel and are dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::geo::GpsFix;
use crate::host::LocationUpdate;
use crate::session::Shutdown;
use crate::storage::{load_json, save_json, PreferenceStore, LAST_KNOWN_POSITION_KEY};

/// Minimum time between persisted fixes. The in-memory channel always gets
/// every fix; the store is only a warm-start hint.
pub const PERSIST_INTERVAL: Duration = Duration::from_secs(60);

/// Owns the live location stream and publishes the freshest usable fix.
pub struct PositionCache {
    store: Arc<dyn PreferenceStore>,
    updates: mpsc::Receiver<LocationUpdate>,
    fixes: watch::Sender<Option<GpsFix>>,
}

impl PositionCache {
    /// Create the cache and its output channel.
    ///
    /// The channel starts at the persisted last-known fix, or `None` on a
    /// fresh install.
    pub fn new(
        store: Arc<dyn PreferenceStore>,
        updates: mpsc::Receiver<LocationUpdate>,
    ) -> (Self, watch::Receiver<Option<GpsFix>>) {
        let seed: Option<GpsFix> = load_json(store.as_ref(), LAST_KNOWN_POSITION_KEY);
        if let Some(fix) = &seed {
            tracing::debug!("Seeding position cache from persisted fix at {}, {}", fix.lat, fix.lon);
        }

        let (tx, rx) = watch::channel(seed);
        let cache = Self {
            store,
            updates,
            fixes: tx,
        };

        (cache, rx)
    }

    /// Start the cache as a session-scoped background task.
    pub fn spawn(self, shutdown: Shutdown) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(mut self, mut shutdown: Shutdown) {
        let mut last_persist: Option<Instant> = None;

        loop {
            let update = tokio::select! {
                _ = shutdown.triggered() => break,
                update = self.updates.recv() => match update {
                    Some(update) => update,
                    None => break,
                },
            };

            let Some(bearing) = update.bearing else {
                continue;
            };

            let fix = GpsFix::new(update.lat, update.lon, Some(bearing));
            let _ = self.fixes.send(Some(fix));

            let due = last_persist.map_or(true, |t| t.elapsed() >= PERSIST_INTERVAL);
            if due {
                // Best effort: a failed write never touches the live value.
                if let Err(e) = save_json(self.store.as_ref(), LAST_KNOWN_POSITION_KEY, &fix) {
                    tracing::warn!("Failed to persist last known position: {}", e);
                }
                last_persist = Some(Instant::now());
            }
        }
    }
}
