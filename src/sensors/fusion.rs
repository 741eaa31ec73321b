//! Latest-value sensor fusion with trailing-edge throttling.
//!
//! Every input is a latest-value channel. A ticker closes one emission
//! window per configured interval and publishes a snapshot assembled from
//! the freshest value of every input at that instant, so a burst of sensor
//! updates inside one window collapses into a single snapshot carrying the
//! last of them.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::host::StreamState;
use crate::profile::{active_profile, ConfigProfile};
use crate::session::Shutdown;

/// Buffered snapshots the consumer may fall behind by before drops start.
const SNAPSHOT_QUEUE: usize = 16;

/// Fusion timing knobs.
#[derive(Debug, Clone, Copy)]
pub struct FusionConfig {
    /// Width of one emission window.
    pub window: Duration,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(1),
        }
    }
}

/// One fused reading: the freshest value of every input at window close.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedSnapshot {
    pub speed: StreamState,
    pub slope: StreamState,
    pub elevation_correction: StreamState,
    pub cadence: StreamState,
    /// Headwind component in m/s, positive opposing travel.
    pub headwind: f64,
    /// The active configuration profile at window close.
    pub profile: ConfigProfile,
}

/// Combines the supervised sensor channels, the headwind signal and the
/// profile list into throttled [`FusedSnapshot`]s.
pub struct SensorFusion {
    config: FusionConfig,
    speed: watch::Receiver<StreamState>,
    slope: watch::Receiver<StreamState>,
    elevation_correction: watch::Receiver<StreamState>,
    cadence: watch::Receiver<StreamState>,
    headwind: watch::Receiver<f64>,
    profiles: watch::Receiver<Vec<ConfigProfile>>,
    out: mpsc::Sender<FusedSnapshot>,
}

impl SensorFusion {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: FusionConfig,
        speed: watch::Receiver<StreamState>,
        slope: watch::Receiver<StreamState>,
        elevation_correction: watch::Receiver<StreamState>,
        cadence: watch::Receiver<StreamState>,
        headwind: watch::Receiver<f64>,
        profiles: watch::Receiver<Vec<ConfigProfile>>,
    ) -> (Self, mpsc::Receiver<FusedSnapshot>) {
        let (tx, rx) = mpsc::channel(SNAPSHOT_QUEUE);

        let fusion = Self {
            config,
            speed,
            slope,
            elevation_correction,
            cadence,
            headwind,
            profiles,
            out: tx,
        };

        (fusion, rx)
    }

    /// Start the fusion ticker as a session-scoped background task.
    pub fn spawn(self, shutdown: Shutdown) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, mut shutdown: Shutdown) {
        loop {
            if !shutdown.sleep(self.config.window).await {
                break;
            }

            let Some(snapshot) = self.assemble() else {
                // No profile configured: nothing meaningful to compute.
                tracing::debug!("Skipping fusion window, profile list is empty");
                continue;
            };

            match self.out.try_send(snapshot) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Closed(_)) => break,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!("Snapshot consumer is falling behind, dropping one window");
                }
            }
        }

        tracing::debug!("Sensor fusion stopped");
    }

    fn assemble(&self) -> Option<FusedSnapshot> {
        let profile = {
            let profiles = self.profiles.borrow();
            active_profile(&profiles)?.clone()
        };

        Some(FusedSnapshot {
            speed: *self.speed.borrow(),
            slope: *self.slope.borrow(),
            elevation_correction: *self.elevation_correction.borrow(),
            cadence: *self.cadence.borrow(),
            headwind: *self.headwind.borrow(),
            profile,
        })
    }
}
