//! Steady-state cycling power model.
//!
//! A pure function from one fused sensor reading to estimated watts at the
//! crank: gravity, rolling resistance and aerodynamic drag, with the
//! drivetrain loss added back on top. No internal state, no smoothing; the
//! fusion layer already throttles the input rate.

use crate::host::{RiderProfile, StreamState};
use crate::sensors::fusion::FusedSnapshot;

/// Standard gravity, m/s².
pub const GRAVITY: f64 = 9.8067;
/// Sea-level air density, kg/m³.
pub const SEA_LEVEL_DENSITY: f64 = 1.225;
/// Output ceiling as a multiple of the rider's FTP.
pub const FTP_CEILING_FACTOR: f64 = 5.0;

/// Air density at `elevation_m` per the standard-atmosphere model.
pub fn air_density(elevation_m: f64) -> f64 {
    let base = (1.0 - 2.25577e-5 * elevation_m).max(0.0);
    SEA_LEVEL_DENSITY * base.powf(4.25588)
}

/// Everything the model needs, in SI units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerModelInput {
    /// Ground speed, m/s.
    pub speed: f64,
    /// Road gradient as a fraction (rise over run).
    pub slope: f64,
    /// Elevation above sea level, m.
    pub elevation: f64,
    /// Crank cadence, rpm.
    pub cadence: f64,
    /// Headwind component, m/s, positive opposing travel.
    pub headwind: f64,
    /// Rider plus bike, kg.
    pub total_mass: f64,
    /// Rolling-resistance coefficient with the surface factor applied.
    pub rolling_resistance: f64,
    pub drag_coefficient: f64,
    /// Frontal area, m².
    pub frontal_area: f64,
    /// Drivetrain loss as a fraction.
    pub power_loss: f64,
    /// Functional threshold power, watts.
    pub ftp: f64,
    /// Keep estimating while cadence reads zero.
    pub force_power: bool,
}

impl PowerModelInput {
    /// Build model inputs from a fused reading and the rider profile.
    ///
    /// The host delivers slope in percent and speed/elevation in the
    /// rider's preferred units; everything is normalized to SI here. A
    /// cadence stream that is not delivering values is indistinguishable
    /// from a missing sensor, so the estimate runs with cadence zero and
    /// force-power engaged rather than flatlining at 0 W.
    pub fn from_snapshot(snapshot: &FusedSnapshot, rider: &RiderProfile) -> Self {
        let profile = &snapshot.profile;

        let (cadence, cadence_known) = match snapshot.cadence {
            StreamState::Streaming(rpm) => (rpm, true),
            _ => (0.0, false),
        };

        Self {
            speed: snapshot.speed.value_or_default() * rider.speed_factor(),
            slope: snapshot.slope.value_or_default() / 100.0,
            elevation: snapshot.elevation_correction.value_or_default()
                * rider.elevation_factor(),
            cadence,
            headwind: snapshot.headwind,
            total_mass: profile.bike_mass_kg() + rider.weight * rider.mass_factor(),
            rolling_resistance: profile.rolling_resistance() * profile.surface.factor(),
            drag_coefficient: profile.drag(),
            frontal_area: profile.frontal_area_m2(),
            power_loss: profile.power_loss_fraction(),
            ftp: profile.ftp_watts(),
            force_power: profile.is_force_power || !cadence_known,
        }
    }
}

/// Estimated power at the crank, watts.
///
/// Zero while coasting (cadence zero without force-power). Otherwise the
/// sum of gravity, rolling and drag forces times ground speed, scaled up by
/// the drivetrain loss and clamped to `[0, 5 × FTP]`. Finite inputs never
/// produce NaN.
pub fn estimate_watts(input: &PowerModelInput) -> f64 {
    if input.cadence == 0.0 && !input.force_power {
        return 0.0;
    }

    let angle = input.slope.atan();
    let gravity_force = input.total_mass * GRAVITY * angle.sin();
    let rolling_force = input.total_mass * GRAVITY * angle.cos() * input.rolling_resistance;

    // Drag opposes whichever way the air moves relative to the rider.
    let apparent = input.speed + input.headwind;
    let drag_force = 0.5
        * air_density(input.elevation)
        * input.drag_coefficient
        * input.frontal_area
        * apparent
        * apparent
        * apparent.signum();

    let mechanical = (gravity_force + rolling_force + drag_force) * input.speed;
    let at_crank = mechanical / (1.0 - input.power_loss);

    let ceiling = (FTP_CEILING_FACTOR * input.ftp).max(0.0);
    at_crank.clamp(0.0, ceiling)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::UnitSystem;
    use crate::profile::{default_profiles, Surface};

    fn flat_input(speed: f64) -> PowerModelInput {
        PowerModelInput {
            speed,
            slope: 0.0,
            elevation: 0.0,
            cadence: 85.0,
            headwind: 0.0,
            total_mass: 89.0,
            rolling_resistance: 0.0095 * 0.93,
            drag_coefficient: 0.8,
            frontal_area: 0.9,
            power_loss: 0.022,
            ftp: 200.0,
            force_power: false,
        }
    }

    #[test]
    fn test_air_density_profile() {
        assert!((air_density(0.0) - SEA_LEVEL_DENSITY).abs() < 1e-12);
        assert!(air_density(1000.0) < air_density(0.0));
        assert!(air_density(2500.0) > 0.9);

        // Absurd elevations degrade to vacuum, never NaN.
        assert_eq!(air_density(100_000.0), 0.0);
    }

    #[test]
    fn test_flat_ride_is_plausible() {
        // ~8.3 m/s (30 km/h) on the flat should land in recreational range.
        let watts = estimate_watts(&flat_input(8.3));
        assert!(watts > 150.0 && watts < 400.0, "got {watts}");
    }

    #[test]
    fn test_coasting_clamps_to_zero() {
        let mut input = flat_input(10.0);
        input.cadence = 0.0;
        assert_eq!(estimate_watts(&input), 0.0);

        input.force_power = true;
        assert!(estimate_watts(&input) > 0.0);
    }

    #[test]
    fn test_monotonic_in_speed_with_force_power() {
        let mut previous = 0.0;
        for speed in [1.0, 3.0, 6.0, 9.0, 12.0] {
            let mut input = flat_input(speed);
            input.cadence = 0.0;
            input.force_power = true;

            let watts = estimate_watts(&input);
            assert!(watts > previous, "not monotonic at {speed} m/s");
            previous = watts;
        }
    }

    #[test]
    fn test_tailwind_reduces_power() {
        let still = estimate_watts(&flat_input(8.0));

        let mut tailwind = flat_input(8.0);
        tailwind.headwind = -3.0;
        let assisted = estimate_watts(&tailwind);

        let mut headwind = flat_input(8.0);
        headwind.headwind = 3.0;
        let opposed = estimate_watts(&headwind);

        assert!(assisted < still);
        assert!(opposed > still);
    }

    #[test]
    fn test_descents_never_go_negative() {
        let mut input = flat_input(10.0);
        input.slope = -0.12;
        assert_eq!(estimate_watts(&input), 0.0);
    }

    #[test]
    fn test_output_clamped_to_ftp_ceiling() {
        let mut input = flat_input(30.0);
        input.slope = 0.20;
        let watts = estimate_watts(&input);
        assert_eq!(watts, FTP_CEILING_FACTOR * input.ftp);
    }

    #[test]
    fn test_finite_inputs_never_nan() {
        let mut input = flat_input(0.0);
        input.elevation = 50_000.0;
        input.headwind = -40.0;
        input.slope = -1.0;
        input.force_power = true;
        assert!(estimate_watts(&input).is_finite());
    }

    fn snapshot_with(cadence: StreamState) -> FusedSnapshot {
        FusedSnapshot {
            speed: StreamState::Streaming(8.0),
            slope: StreamState::Streaming(4.0),
            elevation_correction: StreamState::Streaming(120.0),
            cadence,
            headwind: 1.5,
            profile: default_profiles().remove(0),
        }
    }

    #[test]
    fn test_from_snapshot_normalizes_units() {
        let snapshot = snapshot_with(StreamState::Streaming(85.0));
        let rider = RiderProfile::default();
        let input = PowerModelInput::from_snapshot(&snapshot, &rider);

        assert_eq!(input.speed, 8.0);
        // Percent to fraction.
        assert!((input.slope - 0.04).abs() < 1e-12);
        assert_eq!(input.elevation, 120.0);
        assert_eq!(input.cadence, 85.0);
        assert_eq!(input.headwind, 1.5);
        assert_eq!(input.total_mass, 14.0 + 75.0);
        assert!((input.rolling_resistance - 0.0095 * Surface::Standard.factor()).abs() < 1e-12);
        assert!(!input.force_power);
    }

    #[test]
    fn test_from_snapshot_imperial_rider() {
        let snapshot = snapshot_with(StreamState::Streaming(85.0));
        let rider = RiderProfile {
            weight: 165.0,
            weight_unit: UnitSystem::Imperial,
            distance_unit: UnitSystem::Imperial,
            elevation_unit: UnitSystem::Imperial,
        };
        let input = PowerModelInput::from_snapshot(&snapshot, &rider);

        assert!((input.total_mass - (14.0 + 165.0 * 0.453592)).abs() < 1e-9);
        assert!((input.speed - 8.0 * 1.60934).abs() < 1e-9);
        assert!((input.elevation - 120.0 * 0.3048).abs() < 1e-9);
    }

    #[test]
    fn test_missing_cadence_engages_force_power() {
        let snapshot = snapshot_with(StreamState::Searching);
        let input = PowerModelInput::from_snapshot(&snapshot, &RiderProfile::default());

        assert_eq!(input.cadence, 0.0);
        assert!(input.force_power);
        assert!(estimate_watts(&input) > 0.0);
    }
}
