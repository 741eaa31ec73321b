//! VPower - Virtual Power Meter Engine
//!
//! Estimates a cyclist's instantaneous power output on a GPS bike computer
//! by fusing speed, slope, barometric elevation correction and cadence
//! streams with a headwind signal derived from GPS bearing and periodically
//! refreshed wind data. The result is published to the host platform as a
//! virtual power-meter device that keeps producing plausible values while
//! sensors drop out, GPS is lost or weather fetches fail.

pub mod device;
pub mod geo;
pub mod headwind;
pub mod host;
pub mod position;
pub mod power;
pub mod profile;
pub mod sensors;
pub mod session;
pub mod storage;
pub mod weather;

// Re-export commonly used types
pub use device::VirtualPowerSource;
pub use power::{estimate_watts, PowerModelInput};
pub use profile::ConfigProfile;
pub use sensors::fusion::FusedSnapshot;
pub use storage::{JsonFileStore, MemoryStore, PreferenceStore};
