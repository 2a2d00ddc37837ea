//! User-facing coupling settings.
//!
//! Settings come from a JSON document. Parsing is lenient: a bad value for
//! one key falls back to that key's default (with a warning) and never
//! rejects the rest of the file.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::pairing::PairingThresholds;

pub const DEFAULT_CONNECT_RADIUS: f32 = 0.1;
pub const DEFAULT_CONNECT_ANGLE: f32 = 91.0;

/// Thresholds and toggles for the auto-coupling engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CouplingSettings {
    /// Maximum distance between two attach points, in distance units
    pub connect_radius: f32,
    /// Maximum deviation from perfectly opposed orientation, in degrees
    pub connect_angle: f32,
    /// Allow implicit links across robotic/servo joints
    pub allow_robotic_joints: bool,
    /// Allow implicit links across cable joints
    pub allow_cable_joints: bool,
    /// Forward link changes to the connectivity subsystem
    pub connectivity_enabled: bool,
}

impl Default for CouplingSettings {
    fn default() -> Self {
        Self {
            connect_radius: DEFAULT_CONNECT_RADIUS,
            connect_angle: DEFAULT_CONNECT_ANGLE,
            allow_robotic_joints: false,
            allow_cable_joints: false,
            connectivity_enabled: false,
        }
    }
}

const KNOWN_KEYS: [&str; 5] = [
    "connectRadius",
    "connectAngle",
    "allowRoboticJoints",
    "allowCableJoints",
    "connectivityEnabled",
];

impl CouplingSettings {
    pub fn thresholds(&self) -> PairingThresholds {
        PairingThresholds {
            max_distance: self.connect_radius,
            max_angle_deviation: self.connect_angle,
        }
    }

    /// Parse settings, falling back to defaults key by key.
    pub fn from_json_str(text: &str) -> Self {
        let mut settings = Self::default();

        let root: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("Settings: could not parse document ({}). Using default values.", e);
                return settings;
            }
        };
        let Some(map) = root.as_object() else {
            log::warn!("Settings: document is not an object. Using default values.");
            return settings;
        };

        for key in map.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                log::warn!("Settings: ignoring unknown key '{}'", key);
            }
        }

        if let Some(v) = map.get("connectRadius") {
            settings.connect_radius = non_negative(v, "connectRadius", DEFAULT_CONNECT_RADIUS);
        }
        if let Some(v) = map.get("connectAngle") {
            settings.connect_angle = non_negative(v, "connectAngle", DEFAULT_CONNECT_ANGLE);
        }
        if let Some(v) = map.get("allowRoboticJoints") {
            settings.allow_robotic_joints = flag(v, "allowRoboticJoints", false);
        }
        if let Some(v) = map.get("allowCableJoints") {
            settings.allow_cable_joints = flag(v, "allowCableJoints", false);
        }
        if let Some(v) = map.get("connectivityEnabled") {
            settings.connectivity_enabled = flag(v, "connectivityEnabled", false);
        }

        settings
    }

    /// Load settings from a file. A missing or unreadable file yields defaults.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_json_str(&text),
            Err(e) => {
                log::warn!(
                    "Settings: couldn't read {} ({}). Using default values.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// Numbers may also arrive as strings ("0.25"), the way hand-edited config
/// files often write them.
fn non_negative(value: &Value, key: &str, default: f32) -> f32 {
    let parsed = match value {
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::String(s) => s.trim().parse::<f32>().ok(),
        _ => None,
    };
    match parsed {
        Some(f) if f.is_finite() && f >= 0.0 => f,
        _ => {
            log::warn!("Settings: invalid value for '{}': {}. Using default {}.", key, value, default);
            default
        }
    }
}

fn flag(value: &Value, key: &str, default: bool) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => true,
            "false" => false,
            _ => {
                log::warn!("Settings: invalid value for '{}': {}. Using default {}.", key, value, default);
                default
            }
        },
        _ => {
            log::warn!("Settings: invalid value for '{}': {}. Using default {}.", key, value, default);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = CouplingSettings::default();
        assert_eq!(s.connect_radius, 0.1);
        assert_eq!(s.connect_angle, 91.0);
        assert!(!s.allow_robotic_joints);
        assert!(!s.allow_cable_joints);
        assert_eq!(s.thresholds(), PairingThresholds::default());
    }

    #[test]
    fn test_full_document() {
        let s = CouplingSettings::from_json_str(
            r#"{"connectRadius": 0.25, "connectAngle": 45, "allowRoboticJoints": true, "allowCableJoints": "true"}"#,
        );
        assert_eq!(s.connect_radius, 0.25);
        assert_eq!(s.connect_angle, 45.0);
        assert!(s.allow_robotic_joints);
        assert!(s.allow_cable_joints);
    }

    #[test]
    fn test_bad_value_falls_back_per_key() {
        let s = CouplingSettings::from_json_str(r#"{"connectRadius": "wide", "connectAngle": "30"}"#);
        assert_eq!(s.connect_radius, DEFAULT_CONNECT_RADIUS);
        assert_eq!(s.connect_angle, 30.0);
    }

    #[test]
    fn test_negative_rejected() {
        let s = CouplingSettings::from_json_str(r#"{"connectRadius": -1.0}"#);
        assert_eq!(s.connect_radius, DEFAULT_CONNECT_RADIUS);
    }

    #[test]
    fn test_garbage_document_gives_defaults() {
        assert_eq!(CouplingSettings::from_json_str("not json"), CouplingSettings::default());
        assert_eq!(CouplingSettings::from_json_str("[1, 2]"), CouplingSettings::default());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let s = CouplingSettings::from_path("/nonexistent/autocouple/settings.json");
        assert_eq!(s, CouplingSettings::default());
    }

    #[test]
    fn test_serde_roundtrip_uses_camel_case() {
        let json = CouplingSettings::default().to_json();
        assert!(json.contains("connectRadius"));
        let back: CouplingSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CouplingSettings::default());
    }
}
