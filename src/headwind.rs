//! Headwind component estimation.
//!
//! Projects the current wind observation onto the rider's direction of
//! travel. The output is a plain speed in m/s: positive opposes travel,
//! negative assists. Missing GPS or missing/stale weather yields a neutral
//! 0.0, never an error.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;

use crate::geo::{signed_angle_difference, GpsFix};
use crate::session::Shutdown;
use crate::weather::WeatherSnapshot;

/// How often the output is re-evaluated without an input edge. Staleness
/// depends on wall-clock time, so a snapshot must be able to expire while
/// both inputs stay silent.
pub const RECHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Outcome of a heading request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HeadingResponse {
    /// No fix, or a fix without a direction of travel.
    NoGps,
    /// A fix is available but no usable wind observation is.
    NoWeatherData,
    /// Direction of travel in degrees.
    Value(f64),
}

/// Classify the inputs: the travel bearing when both sides are usable.
///
/// GPS is checked first, so a missing fix reads `NoGps` even when weather
/// is also absent.
pub fn heading_for(
    fix: Option<&GpsFix>,
    snapshot: Option<&WeatherSnapshot>,
    now: chrono::DateTime<Utc>,
) -> HeadingResponse {
    let Some(bearing) = fix.and_then(|f| f.bearing) else {
        return HeadingResponse::NoGps;
    };

    match snapshot {
        Some(s) if !s.is_stale(now) => HeadingResponse::Value(bearing),
        _ => HeadingResponse::NoWeatherData,
    }
}

/// Wind speed projected onto the direction of travel, in m/s.
///
/// `wind_direction` is meteorological: where the wind blows FROM. Riding
/// straight into the wind gives `+wind_speed`; a pure tailwind gives
/// `-wind_speed`; a pure crosswind gives 0.
pub fn headwind_component(travel_bearing: f64, wind_direction: f64, wind_speed: f64) -> f64 {
    let wind_bearing = wind_direction + 180.0;
    let relative = signed_angle_difference(travel_bearing, wind_bearing);

    (relative + 180.0).to_radians().cos() * wind_speed
}

/// Recomputes the headwind on every position or weather update.
pub struct HeadwindEstimator {
    positions: watch::Receiver<Option<GpsFix>>,
    weather: watch::Receiver<Option<WeatherSnapshot>>,
    output: watch::Sender<f64>,
}

impl HeadwindEstimator {
    pub fn new(
        positions: watch::Receiver<Option<GpsFix>>,
        weather: watch::Receiver<Option<WeatherSnapshot>>,
    ) -> (Self, watch::Receiver<f64>) {
        let (tx, rx) = watch::channel(0.0);
        let estimator = Self {
            positions,
            weather,
            output: tx,
        };

        (estimator, rx)
    }

    /// Start the estimator as a session-scoped background task.
    pub fn spawn(self, shutdown: Shutdown) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(mut self, mut shutdown: Shutdown) {
        self.publish();

        loop {
            tokio::select! {
                _ = shutdown.triggered() => break,
                res = self.positions.changed() => {
                    if res.is_err() {
                        break;
                    }
                    self.publish();
                }
                res = self.weather.changed() => {
                    if res.is_err() {
                        break;
                    }
                    self.publish();
                }
                _ = time::sleep(RECHECK_INTERVAL) => self.publish(),
            }
        }
    }

    fn publish(&self) {
        let fix = *self.positions.borrow();
        let snapshot = *self.weather.borrow();
        let value = current_headwind(fix.as_ref(), snapshot.as_ref());

        tracing::debug!("Headwind component: {:.2} m/s", value);
        let _ = self.output.send(value);
    }
}

/// Headwind for the given inputs; neutral whenever either side is unusable.
fn current_headwind(fix: Option<&GpsFix>, snapshot: Option<&WeatherSnapshot>) -> f64 {
    match heading_for(fix, snapshot, Utc::now()) {
        HeadingResponse::Value(bearing) => snapshot
            .map(|s| headwind_component(bearing, s.wind_direction, s.wind_speed))
            .unwrap_or(0.0),
        HeadingResponse::NoGps | HeadingResponse::NoWeatherData => 0.0,
    }
}
