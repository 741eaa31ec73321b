//! Virtual power-meter device surface.
//!
//! One [`VirtualPowerSource`] per configured device instance. Scanning
//! announces the device descriptor; connecting performs the handshake the
//! host expects from a physical sensor, then wires up the whole estimation
//! pipeline under one session scope and publishes a power data point per
//! fused snapshot until the session is shut down.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::headwind::HeadwindEstimator;
use crate::host::{
    BatteryStatus, ConnectionStatus, DeviceEvent, HostLink, ManufacturerInfo, RiderProfile,
    SensorKind,
};
use crate::position::PositionCache;
use crate::power::{estimate_watts, PowerModelInput};
use crate::profile::{default_profiles, ConfigProfile};
use crate::sensors::fusion::{FusedSnapshot, FusionConfig, SensorFusion};
use crate::sensors::supervisor::{StreamSupervisor, SupervisionMode};
use crate::session::{Shutdown, ShutdownHandle};
use crate::storage::{load_json, PreferenceStore, CURRENT_WEATHER_KEY, PROFILES_KEY};
use crate::weather::{WeatherRefresher, WeatherSnapshot};

/// Delay before a scan announces the device.
pub const SCAN_DELAY: Duration = Duration::from_secs(2);
/// Handshake pause after announcing `Searching`.
const SEARCHING_DELAY: Duration = Duration::from_secs(2);
/// Handshake pause between the remaining announcements.
const HANDSHAKE_STEP_DELAY: Duration = Duration::from_secs(1);

/// Descriptor announced to the host during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub source_id: String,
    pub data_types: Vec<String>,
    pub name: String,
}

/// A virtual power meter backed by the estimation pipeline.
pub struct VirtualPowerSource {
    host: Arc<dyn HostLink>,
    store: Arc<dyn PreferenceStore>,
    instance: u8,
    fusion_config: FusionConfig,
}

impl VirtualPowerSource {
    pub fn new(host: Arc<dyn HostLink>, store: Arc<dyn PreferenceStore>, instance: u8) -> Self {
        Self {
            host,
            store,
            instance,
            fusion_config: FusionConfig::default(),
        }
    }

    /// Override the fusion window, mainly for tests.
    pub fn with_fusion_config(mut self, config: FusionConfig) -> Self {
        self.fusion_config = config;
        self
    }

    /// Stable identifier carried by every data point this device emits.
    pub fn source_id(&self) -> String {
        format!("estimated-power-{}", self.instance)
    }

    fn descriptor(&self) -> Device {
        Device {
            source_id: self.source_id(),
            data_types: vec!["power".to_string()],
            name: format!("Estimated Power {}", self.instance),
        }
    }

    /// Scan for the virtual device. Physical sensors take a moment to turn
    /// up, so the descriptor is announced after a short delay.
    pub async fn start_scan(&self) -> Device {
        tokio::time::sleep(SCAN_DELAY).await;

        let device = self.descriptor();
        tracing::info!("Scan found virtual device {}", device.source_id);
        device
    }

    /// Connect the device: handshake, then continuous power publishing.
    ///
    /// Everything runs under one session scope; the returned
    /// [`PowerMeterSession`] stops it deterministically.
    pub fn connect(&self, events: mpsc::Sender<DeviceEvent>) -> PowerMeterSession {
        let session_id = Uuid::new_v4();
        let source_id = self.source_id();
        tracing::info!("Connecting {} (session {})", source_id, session_id);

        let (handle, shutdown) = Shutdown::new();

        let profiles = load_json::<Vec<ConfigProfile>>(self.store.as_ref(), PROFILES_KEY)
            .unwrap_or_else(default_profiles);
        let (_profiles_tx, profiles_rx) = watch::channel(profiles);

        let (cache, positions) = PositionCache::new(self.store.clone(), self.host.locations());

        let weather_seed: Option<WeatherSnapshot> =
            load_json(self.store.as_ref(), CURRENT_WEATHER_KEY);
        let (weather_tx, weather_rx) = watch::channel(weather_seed);
        let refresher = WeatherRefresher::new(
            self.store.clone(),
            positions.clone(),
            profiles_rx.clone(),
            weather_tx,
        );

        let (estimator, headwind_rx) = HeadwindEstimator::new(positions, weather_rx);

        let (speed_sup, speed_rx) = StreamSupervisor::new(
            SensorKind::Speed,
            SupervisionMode::Supervised,
            self.host.subscribe(SensorKind::Speed),
        );
        let (slope_sup, slope_rx) = StreamSupervisor::new(
            SensorKind::Slope,
            SupervisionMode::Supervised,
            self.host.subscribe(SensorKind::Slope),
        );
        let (elevation_sup, elevation_rx) = StreamSupervisor::new(
            SensorKind::ElevationCorrection,
            SupervisionMode::Supervised,
            self.host.subscribe(SensorKind::ElevationCorrection),
        );
        // Cadence stays unsupervised: a missing cadence sensor must remain
        // distinguishable from one reading zero.
        let (cadence_sup, cadence_rx) = StreamSupervisor::new(
            SensorKind::Cadence,
            SupervisionMode::Passthrough,
            self.host.subscribe(SensorKind::Cadence),
        );

        let (fusion, snapshots) = SensorFusion::new(
            self.fusion_config,
            speed_rx,
            slope_rx,
            elevation_rx,
            cadence_rx,
            headwind_rx,
            profiles_rx,
        );

        let rider = self.host.rider_profile();

        let tasks = vec![
            cache.spawn(shutdown.clone()),
            refresher.spawn(shutdown.clone()),
            estimator.spawn(shutdown.clone()),
            speed_sup.spawn(shutdown.clone()),
            slope_sup.spawn(shutdown.clone()),
            elevation_sup.spawn(shutdown.clone()),
            cadence_sup.spawn(shutdown.clone()),
            fusion.spawn(shutdown.clone()),
            tokio::spawn(publish_loop(source_id, rider, snapshots, events, shutdown)),
        ];

        PowerMeterSession {
            session_id,
            handle,
            tasks,
        }
    }
}

/// Handle to a running estimation session.
pub struct PowerMeterSession {
    session_id: Uuid,
    handle: ShutdownHandle,
    tasks: Vec<JoinHandle<()>>,
}

impl PowerMeterSession {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Stop every background task and wait for them to finish.
    pub async fn shutdown(self) {
        tracing::info!("Stopping estimation session {}", self.session_id);
        self.handle.trigger();

        for result in join_all(self.tasks).await {
            if let Err(e) = result {
                tracing::error!("Session task failed during shutdown: {}", e);
            }
        }
    }
}

/// Handshake, then one data point per fused snapshot.
async fn publish_loop(
    source_id: String,
    rider: RiderProfile,
    mut snapshots: mpsc::Receiver<FusedSnapshot>,
    events: mpsc::Sender<DeviceEvent>,
    mut shutdown: Shutdown,
) {
    // The host expects the cadence of a physical sensor pairing up.
    let handshake = async {
        events
            .send(DeviceEvent::Connection(ConnectionStatus::Searching))
            .await
            .ok()?;
        shutdown.sleep(SEARCHING_DELAY).await.then_some(())?;

        events
            .send(DeviceEvent::Connection(ConnectionStatus::Connected))
            .await
            .ok()?;
        shutdown.sleep(HANDSHAKE_STEP_DELAY).await.then_some(())?;

        events
            .send(DeviceEvent::Battery(BatteryStatus::Good))
            .await
            .ok()?;
        shutdown.sleep(HANDSHAKE_STEP_DELAY).await.then_some(())?;

        events
            .send(DeviceEvent::Manufacturer(ManufacturerInfo {
                name: "VPower".to_string(),
                hardware_id: "0001".to_string(),
                model: "VPWR-1".to_string(),
            }))
            .await
            .ok()?;
        shutdown.sleep(HANDSHAKE_STEP_DELAY).await.then_some(())
    };

    if handshake.await.is_none() {
        return;
    }

    loop {
        let snapshot = tokio::select! {
            _ = shutdown.triggered() => return,
            snapshot = snapshots.recv() => match snapshot {
                Some(snapshot) => snapshot,
                None => {
                    if !shutdown.is_triggered() {
                        let _ = events
                            .send(DeviceEvent::Error(
                                "estimation pipeline stopped unexpectedly".to_string(),
                            ))
                            .await;
                    }
                    return;
                }
            },
        };

        let input = PowerModelInput::from_snapshot(&snapshot, &rider);
        let watts = estimate_watts(&input);
        tracing::debug!("{}: {:.0} W", source_id, watts);

        if events
            .send(DeviceEvent::DataPoint {
                source_id: source_id.clone(),
                watts,
            })
            .await
            .is_err()
        {
            return;
        }
    }
}
