//! Rider/bike configuration profiles.
//!
//! Profiles are persisted as a JSON array; the first element is the active
//! one. Numeric fields are stored as strings (the edit screens write them
//! verbatim) and parsed leniently, accepting `,` as a decimal separator.

use serde::{Deserialize, Serialize};

/// Road surface selection, each with a rolling-resistance multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Surface {
    Asphalt,
    #[default]
    Standard,
    Gravel,
    Sand,
}

impl Surface {
    /// Rolling-resistance multiplier applied on top of the base Crr.
    pub fn factor(&self) -> f64 {
        match self {
            Surface::Asphalt => 0.75,
            Surface::Standard => 0.93,
            Surface::Gravel => 1.05,
            Surface::Sand => 2.20,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Surface::Asphalt => "Asphalt/Concrete",
            Surface::Standard => "Standard/Mix",
            Surface::Gravel => "Gravel/Mountain Mix",
            Surface::Sand => "Off Road/Sand",
        }
    }
}

/// One rider/bike configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigProfile {
    pub id: u32,
    pub name: String,
    pub is_active: bool,
    /// Bike mass in kg.
    pub bike_mass: String,
    /// Base rolling-resistance coefficient (Crr).
    pub rolling_resistance_coefficient: String,
    /// Drag coefficient (Cd).
    pub drag_coefficient: String,
    /// Frontal area in m².
    pub frontal_area: String,
    /// Drivetrain loss in percent.
    pub power_loss: String,
    /// Use the keyed commercial weather provider.
    #[serde(default)]
    pub is_open_weather: bool,
    #[serde(rename = "apikey", default)]
    pub api_key: String,
    /// Functional threshold power in watts.
    pub ftp: String,
    #[serde(default)]
    pub surface: Surface,
    /// Compute power even while cadence reads zero.
    #[serde(rename = "isforcepower", default)]
    pub is_force_power: bool,
}

impl ConfigProfile {
    pub fn bike_mass_kg(&self) -> f64 {
        parse_locale_f64(&self.bike_mass)
    }

    pub fn rolling_resistance(&self) -> f64 {
        parse_locale_f64(&self.rolling_resistance_coefficient)
    }

    pub fn drag(&self) -> f64 {
        parse_locale_f64(&self.drag_coefficient)
    }

    pub fn frontal_area_m2(&self) -> f64 {
        parse_locale_f64(&self.frontal_area)
    }

    /// Drivetrain loss as a fraction.
    pub fn power_loss_fraction(&self) -> f64 {
        parse_locale_f64(&self.power_loss) / 100.0
    }

    pub fn ftp_watts(&self) -> f64 {
        parse_locale_f64(&self.ftp)
    }
}

/// Parse a profile number, accepting `,` as the decimal separator.
///
/// Garbage parses to 0.0 with a log line; profile fields come from free
/// text entry and must never take the estimator down.
pub fn parse_locale_f64(raw: &str) -> f64 {
    match raw.trim().replace(',', ".").parse::<f64>() {
        Ok(v) => v,
        Err(e) => {
            tracing::error!("Cannot parse '{}' as a number: {}", raw, e);
            0.0
        }
    }
}

/// The profile the session runs with: the one flagged active, falling back
/// to the first. `None` only for an empty list.
pub fn active_profile(profiles: &[ConfigProfile]) -> Option<&ConfigProfile> {
    profiles
        .iter()
        .find(|p| p.is_active)
        .or_else(|| profiles.first())
}

/// Built-in single-element profile list, used whenever the persisted list
/// is missing or corrupt.
pub fn default_profiles() -> Vec<ConfigProfile> {
    vec![ConfigProfile {
        id: 0,
        name: "default".to_string(),
        is_active: true,
        bike_mass: "14.0".to_string(),
        rolling_resistance_coefficient: "0.0095".to_string(),
        drag_coefficient: "0.8".to_string(),
        frontal_area: "0.9".to_string(),
        power_loss: "2.2".to_string(),
        is_open_weather: false,
        api_key: String::new(),
        ftp: "200".to_string(),
        surface: Surface::Standard,
        is_force_power: false,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_factors() {
        assert_eq!(Surface::Asphalt.factor(), 0.75);
        assert_eq!(Surface::Standard.factor(), 0.93);
        assert_eq!(Surface::Gravel.factor(), 1.05);
        assert_eq!(Surface::Sand.factor(), 2.20);
    }

    #[test]
    fn test_locale_parse() {
        assert_eq!(parse_locale_f64("14.5"), 14.5);
        assert_eq!(parse_locale_f64("14,5"), 14.5);
        assert_eq!(parse_locale_f64(" 200 "), 200.0);
        assert_eq!(parse_locale_f64("bogus"), 0.0);
        assert_eq!(parse_locale_f64(""), 0.0);
    }

    #[test]
    fn test_default_profile_values() {
        let profiles = default_profiles();
        assert_eq!(profiles.len(), 1);

        let p = &profiles[0];
        assert!(p.is_active);
        assert_eq!(p.bike_mass_kg(), 14.0);
        assert_eq!(p.rolling_resistance(), 0.0095);
        assert_eq!(p.drag(), 0.8);
        assert_eq!(p.frontal_area_m2(), 0.9);
        assert!((p.power_loss_fraction() - 0.022).abs() < 1e-12);
        assert_eq!(p.ftp_watts(), 200.0);
        assert!(!p.is_force_power);
    }

    #[test]
    fn test_active_profile_selection() {
        let mut profiles = default_profiles();
        let mut second = profiles[0].clone();
        second.id = 1;
        second.name = "race".to_string();
        profiles[0].is_active = false;
        second.is_active = true;
        profiles.push(second);

        assert_eq!(active_profile(&profiles).unwrap().name, "race");

        // Nothing flagged active: fall back to the first element.
        profiles[1].is_active = false;
        assert_eq!(active_profile(&profiles).unwrap().id, 0);

        assert!(active_profile(&[]).is_none());
    }

    #[test]
    fn test_profile_list_round_trip() {
        let mut profiles = default_profiles();
        profiles[0].surface = Surface::Gravel;
        profiles[0].is_force_power = true;
        profiles[0].api_key = "abc123".to_string();

        let json = serde_json::to_string(&profiles).unwrap();
        let back: Vec<ConfigProfile> = serde_json::from_str(&json).unwrap();

        assert_eq!(profiles, back);
        assert_eq!(back[0].surface.factor(), 1.05);
    }

    #[test]
    fn test_decodes_legacy_payload() {
        // Shape written by older releases: camelCase keys, lowercase
        // apikey/isforcepower, screaming-snake surface, extra keys.
        let json = r#"[{
            "id": 0,
            "name": "Spark",
            "isActive": true,
            "bikeMass": "14.0",
            "rollingResistanceCoefficient": "0.0095",
            "dragCoefficient": "0.8",
            "frontalArea": "0.9",
            "powerLoss": "2.2",
            "headwindconf": "0.0",
            "isOpenWeather": true,
            "apikey": "k",
            "ftp": "257",
            "surface": "GRAVEL",
            "isforcepower": false
        }]"#;

        let profiles: Vec<ConfigProfile> = serde_json::from_str(json).unwrap();
        assert_eq!(profiles[0].surface, Surface::Gravel);
        assert!(profiles[0].is_open_weather);
        assert_eq!(profiles[0].ftp_watts(), 257.0);
    }
}
