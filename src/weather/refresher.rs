//! Background wind-data refresh loop.
//!
//! Fetches wind data for the current (or last known) position whenever the
//! rider has moved, and periodically while static. Failures never end the
//! loop: a failed refresh is recorded in the fetch statistics and retried
//! after a fixed backoff, forever.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use super::{parse_weather_response, request_url, FetchStats, WeatherError, WeatherSnapshot};
use crate::geo::GpsFix;
use crate::profile::{active_profile, ConfigProfile};
use crate::session::Shutdown;
use crate::storage::{load_json, save_json, PreferenceStore, CURRENT_WEATHER_KEY, STATS_KEY};

/// Hard limit on one provider request.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(20);
/// Backoff after a failed refresh.
pub const RETRY_DELAY: Duration = Duration::from_secs(60);
/// Quiet period after a position change before fetching.
pub const QUIET_PERIOD: Duration = Duration::from_secs(10);
/// Re-fetch interval while the position is static.
pub const STATIC_REFRESH: Duration = Duration::from_secs(15 * 60);
/// Movement below this distance (km) does not count as a position change.
pub const MIN_MOVE_KM: f64 = 0.001;

/// Keeps the weather snapshot channel fresh for the session.
pub struct WeatherRefresher {
    store: Arc<dyn PreferenceStore>,
    client: reqwest::Client,
    positions: watch::Receiver<Option<GpsFix>>,
    profiles: watch::Receiver<Vec<ConfigProfile>>,
    snapshots: watch::Sender<Option<WeatherSnapshot>>,
}

impl WeatherRefresher {
    pub fn new(
        store: Arc<dyn PreferenceStore>,
        positions: watch::Receiver<Option<GpsFix>>,
        profiles: watch::Receiver<Vec<ConfigProfile>>,
        snapshots: watch::Sender<Option<WeatherSnapshot>>,
    ) -> Self {
        Self {
            store,
            client: reqwest::Client::new(),
            positions,
            profiles,
            snapshots,
        }
    }

    /// Start the refresh loop as a session-scoped background task.
    pub fn spawn(self, shutdown: Shutdown) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(mut self, mut shutdown: Shutdown) {
        let mut last_fetch_pos: Option<GpsFix> = None;
        let mut next_periodic = Instant::now();

        loop {
            if shutdown.is_triggered() {
                break;
            }

            let current = *self.positions.borrow();
            let Some(fix) = current else {
                // No position known yet, not even a cached one.
                tokio::select! {
                    _ = shutdown.triggered() => break,
                    res = self.positions.changed() => {
                        if res.is_err() {
                            break;
                        }
                    }
                }
                continue;
            };

            let moved = last_fetch_pos.map_or(true, |p| p.distance_to(&fix) > MIN_MOVE_KM);

            if !moved {
                // Static: wait for movement or the periodic re-trigger.
                tokio::select! {
                    _ = shutdown.triggered() => break,
                    res = self.positions.changed() => {
                        if res.is_err() {
                            break;
                        }
                        continue;
                    }
                    _ = time::sleep_until(next_periodic) => {}
                }
            } else if last_fetch_pos.is_some() {
                // Moved: debounce bursts. The quiet period restarts on
                // every further position update.
                loop {
                    tokio::select! {
                        _ = shutdown.triggered() => return,
                        res = self.positions.changed() => {
                            if res.is_err() {
                                return;
                            }
                        }
                        _ = time::sleep(QUIET_PERIOD) => break,
                    }
                }
            }

            let fix = (*self.positions.borrow()).unwrap_or(fix);

            match self.fetch_once(&fix).await {
                Ok(snapshot) => {
                    tracing::info!(
                        "Weather refreshed: {:.1} m/s from {:.0} deg",
                        snapshot.wind_speed,
                        snapshot.wind_direction
                    );
                    self.record_success(&fix);
                    if let Err(e) = save_json(self.store.as_ref(), CURRENT_WEATHER_KEY, &snapshot) {
                        tracing::warn!("Failed to persist weather snapshot: {}", e);
                    }
                    let _ = self.snapshots.send(Some(snapshot));
                    last_fetch_pos = Some(fix);
                    next_periodic = Instant::now() + STATIC_REFRESH;
                }
                Err(e) => {
                    tracing::warn!("Weather refresh failed, retrying in {:?}: {}", RETRY_DELAY, e);
                    self.record_failure();
                    if !shutdown.sleep(RETRY_DELAY).await {
                        break;
                    }
                }
            }
        }
    }

    /// One provider request for `fix`, normalized to a snapshot.
    async fn fetch_once(&self, fix: &GpsFix) -> Result<WeatherSnapshot, WeatherError> {
        let (use_open_weather, api_key) = {
            let profiles = self.profiles.borrow();
            active_profile(&profiles)
                .map(|p| (p.is_open_weather, p.api_key.clone()))
                .unwrap_or((false, String::new()))
        };

        let url = request_url(fix, use_open_weather, &api_key);
        tracing::debug!("Fetching weather from {}", url);

        let (status, body) = match time::timeout(FETCH_TIMEOUT, self.client.get(&url).send()).await
        {
            // A slow provider becomes a plain failed response.
            Err(_elapsed) => (500u16, String::new()),
            Ok(Err(e)) => return Err(WeatherError::RequestFailed(e.to_string())),
            Ok(Ok(response)) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                (status, body)
            }
        };

        if status != 200 {
            return Err(WeatherError::RequestFailed(format!("status {}", status)));
        }

        parse_weather_response(&body)
    }

    fn record_success(&self, fix: &GpsFix) {
        let mut stats: FetchStats = load_json(self.store.as_ref(), STATS_KEY).unwrap_or_default();
        stats.last_success_at = Some(Utc::now().timestamp());
        stats.last_success_position = Some(*fix);

        if let Err(e) = save_json(self.store.as_ref(), STATS_KEY, &stats) {
            tracing::warn!("Failed to persist fetch stats: {}", e);
        }
    }

    fn record_failure(&self) {
        let mut stats: FetchStats = load_json(self.store.as_ref(), STATS_KEY).unwrap_or_default();
        stats.last_failure_at = Some(Utc::now().timestamp());

        if let Err(e) = save_json(self.store.as_ref(), STATS_KEY, &stats) {
            tracing::warn!("Failed to persist fetch stats: {}", e);
        }
    }
}
