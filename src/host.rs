//! Narrow interface to the bike-computer host platform.
//!
//! The engine never talks to real hardware. It consumes raw sensor
//! streams, a location stream and a rider profile through [`HostLink`],
//! and delivers [`DeviceEvent`]s back through a plain channel sender. The
//! platform glue (and the test suite) implements this trait.

use tokio::sync::mpsc;

/// Raw state of one host sensor stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StreamState {
    /// The sensor is delivering values.
    Streaming(f64),
    /// The sensor is paired but not producing data.
    Idle,
    /// The host is looking for the sensor.
    Searching,
    /// No such sensor on this ride.
    NotAvailable,
}

impl StreamState {
    /// Value carried by a streaming state; zero for every other state.
    pub fn value_or_default(&self) -> f64 {
        match self {
            StreamState::Streaming(v) => *v,
            _ => 0.0,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, StreamState::Streaming(_))
    }
}

/// Physical signals consumed from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    /// Ground speed.
    Speed,
    /// Road gradient, in percent.
    Slope,
    /// Barometric elevation correction, in elevation units.
    ElevationCorrection,
    /// Crank cadence, in rpm.
    Cadence,
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorKind::Speed => write!(f, "speed"),
            SensorKind::Slope => write!(f, "slope"),
            SensorKind::ElevationCorrection => write!(f, "elevation-correction"),
            SensorKind::Cadence => write!(f, "cadence"),
        }
    }
}

/// Unit system preference, per measurement category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
}

/// Rider profile delivered once by the host and cached for the session.
#[derive(Debug, Clone)]
pub struct RiderProfile {
    /// Body weight in the host's preferred weight unit.
    pub weight: f64,
    pub weight_unit: UnitSystem,
    pub distance_unit: UnitSystem,
    pub elevation_unit: UnitSystem,
}

impl Default for RiderProfile {
    fn default() -> Self {
        Self {
            weight: 75.0,
            weight_unit: UnitSystem::Metric,
            distance_unit: UnitSystem::Metric,
            elevation_unit: UnitSystem::Metric,
        }
    }
}

impl RiderProfile {
    /// Multiplier converting the host's weight unit to kilograms.
    pub fn mass_factor(&self) -> f64 {
        match self.weight_unit {
            UnitSystem::Metric => 1.0,
            UnitSystem::Imperial => 0.453592,
        }
    }

    /// Multiplier converting the host's speed unit to m/s.
    pub fn speed_factor(&self) -> f64 {
        match self.distance_unit {
            UnitSystem::Metric => 1.0,
            UnitSystem::Imperial => 1.60934,
        }
    }

    /// Multiplier converting the host's elevation unit to meters.
    pub fn elevation_factor(&self) -> f64 {
        match self.elevation_unit {
            UnitSystem::Metric => 1.0,
            UnitSystem::Imperial => 0.3048,
        }
    }
}

/// A live location update from the host's GPS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationUpdate {
    pub lat: f64,
    pub lon: f64,
    /// Direction of travel in degrees, absent while stationary.
    pub bearing: Option<f64>,
}

/// Connection status announced by a virtual device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Searching,
    Connected,
}

/// Battery status announced by a virtual device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryStatus {
    New,
    Good,
    Low,
    Critical,
}

/// Manufacturer identification for a virtual device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManufacturerInfo {
    pub name: String,
    pub hardware_id: String,
    pub model: String,
}

/// Events a virtual device delivers to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Connection(ConnectionStatus),
    Battery(BatteryStatus),
    Manufacturer(ManufacturerInfo),
    /// One power sample, tagged with the emitting device.
    DataPoint { source_id: String, watts: f64 },
    /// Unexpected failure inside the estimation loop; the session ends and
    /// the host is responsible for reconnecting.
    Error(String),
}

/// Host side of the integration, implemented by the platform glue.
pub trait HostLink: Send + Sync + 'static {
    /// Subscribe to one raw sensor stream.
    fn subscribe(&self, kind: SensorKind) -> mpsc::Receiver<StreamState>;

    /// Subscribe to live GPS updates.
    fn locations(&self) -> mpsc::Receiver<LocationUpdate>;

    /// The rider profile, delivered once per session.
    fn rider_profile(&self) -> RiderProfile;
}
