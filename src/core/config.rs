//! Provider configuration
//!
//! Which engine backs the map is a deployment decision, so everything a
//! provider needs is collected here and can be loaded from JSON. Presets
//! cover the common cases; `Custom` passes a hand-built config through.

use crate::core::constants::{
    DEFAULT_ARROW_SPACING_PX, DEFAULT_FLY_DURATION_MS, DEFAULT_INITIAL_ZOOM,
    DEFAULT_INIT_TIMEOUT_MS, DEFAULT_RELOAD_DEBOUNCE_MS, DEFAULT_ROUTE_LABEL_ZOOM,
    DEFAULT_STALE_VEHICLE_COLOR, MAX_VISIBLE_ROUTES,
};
use crate::{MapError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Map engine a provider drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Leaflet,
    Google,
    ArcGis,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Leaflet => write!(f, "leaflet"),
            BackendKind::Google => write!(f, "google"),
            BackendKind::ArcGis => write!(f, "arcgis"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "leaflet" | "osm" | "openstreetmap" => Ok(Self::Leaflet),
            "google" => Ok(Self::Google),
            "arcgis" | "esri" => Ok(Self::ArcGis),
            other => Err(MapError::Config(format!("unknown map backend '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl FromStr for Theme {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            other => Err(MapError::Config(format!("unknown theme '{other}'"))),
        }
    }
}

/// Defaults applied to polylines that don't override them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolylineDefaults {
    pub color: String,
    pub weight: f32,
    pub opacity: f32,
    pub arrow_spacing_px: f64,
}

impl Default for PolylineDefaults {
    fn default() -> Self {
        Self {
            color: "#00A1E0".to_string(),
            weight: 4.0,
            opacity: 0.8,
            arrow_spacing_px: DEFAULT_ARROW_SPACING_PX,
        }
    }
}

/// Basemap sources per theme
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasemapConfig {
    pub tile_url_light: String,
    pub tile_url_dark: String,
    pub arcgis_basemap_light: String,
    pub arcgis_basemap_dark: String,
}

impl Default for BasemapConfig {
    fn default() -> Self {
        Self {
            tile_url_light: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            tile_url_dark: "https://{s}.basemaps.cartocdn.com/dark_all/{z}/{x}/{y}.png"
                .to_string(),
            arcgis_basemap_light: "streets-navigation-vector".to_string(),
            arcgis_basemap_dark: "streets-night-vector".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub backend: BackendKind,
    pub initial_zoom: f64,
    /// Stop markers show route labels at or above this zoom
    pub route_label_zoom_threshold: f64,
    pub reload_debounce_ms: u64,
    pub init_timeout_ms: u64,
    pub default_fly_duration_ms: u64,
    pub max_visible_routes: usize,
    /// Tint for vehicles that are not reporting live predictions
    pub stale_vehicle_color: String,
    pub polyline: PolylineDefaults,
    pub theme: Theme,
    pub basemap: BasemapConfig,
    pub google_api_key: Option<String>,
}

impl Default for MapConfig {
    fn default() -> Self {
        MapConfigProfile::default().resolve()
    }
}

impl MapConfig {
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn reload_debounce(&self) -> Duration {
        Duration::from_millis(self.reload_debounce_ms)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    pub fn default_fly_duration(&self) -> Duration {
        Duration::from_millis(self.default_fly_duration_ms)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: MapConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.reload_debounce_ms == 0 {
            return Err(MapError::Config(
                "reload_debounce_ms must be greater than zero".to_string(),
            ));
        }
        if self.init_timeout_ms == 0 {
            return Err(MapError::Config(
                "init_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if !self.route_label_zoom_threshold.is_finite() || self.route_label_zoom_threshold < 0.0
        {
            return Err(MapError::Config(format!(
                "invalid route label zoom threshold {}",
                self.route_label_zoom_threshold
            )));
        }
        if self.max_visible_routes == 0 {
            return Err(MapError::Config(
                "max_visible_routes must be at least 1".to_string(),
            ));
        }
        if self.polyline.arrow_spacing_px <= 0.0 {
            return Err(MapError::Config(
                "polyline.arrow_spacing_px must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum MapConfigProfile {
    #[default]
    Standard,
    /// Slower reloads and fewer arrows for constrained devices
    LowPower,
    Custom(Box<MapConfig>),
}

impl MapConfigProfile {
    pub fn resolve(&self) -> MapConfig {
        match self {
            Self::Standard => MapConfig {
                backend: BackendKind::Leaflet,
                initial_zoom: DEFAULT_INITIAL_ZOOM,
                route_label_zoom_threshold: DEFAULT_ROUTE_LABEL_ZOOM,
                reload_debounce_ms: DEFAULT_RELOAD_DEBOUNCE_MS,
                init_timeout_ms: DEFAULT_INIT_TIMEOUT_MS,
                default_fly_duration_ms: DEFAULT_FLY_DURATION_MS,
                max_visible_routes: MAX_VISIBLE_ROUTES,
                stale_vehicle_color: DEFAULT_STALE_VEHICLE_COLOR.to_string(),
                polyline: PolylineDefaults::default(),
                theme: Theme::Light,
                basemap: BasemapConfig::default(),
                google_api_key: None,
            },
            Self::LowPower => MapConfig {
                reload_debounce_ms: 400,
                default_fly_duration_ms: 0,
                polyline: PolylineDefaults {
                    arrow_spacing_px: 120.0,
                    ..PolylineDefaults::default()
                },
                ..Self::Standard.resolve()
            },
            Self::Custom(config) => (**config).clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MapConfig::default();
        assert_eq!(config.backend, BackendKind::Leaflet);
        assert_eq!(config.route_label_zoom_threshold, 16.0);
        assert_eq!(config.reload_debounce(), Duration::from_millis(150));
        assert_eq!(config.polyline.arrow_spacing_px, 50.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            MapConfig::from_json_str(r#"{"backend":"arcgis","theme":"dark"}"#).unwrap();
        assert_eq!(config.backend, BackendKind::ArcGis);
        assert_eq!(config.theme, Theme::Dark);
        assert_eq!(config.max_visible_routes, 3);
    }

    #[test]
    fn test_validation_rejects_zero_debounce() {
        let err = MapConfig::from_json_str(r#"{"reload_debounce_ms":0}"#).unwrap_err();
        assert!(matches!(err, MapError::Config(_)));
    }

    #[test]
    fn test_malformed_json_is_a_serialization_error() {
        let err = MapConfig::from_json_str("{backend:").unwrap_err();
        assert!(matches!(err, MapError::Serialization(_)));
    }

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!("OSM".parse::<BackendKind>().unwrap(), BackendKind::Leaflet);
        assert_eq!("esri".parse::<BackendKind>().unwrap(), BackendKind::ArcGis);
        assert!("bing".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::Google.to_string(), "google");
    }

    #[test]
    fn test_low_power_profile() {
        let config = MapConfigProfile::LowPower.resolve();
        assert_eq!(config.reload_debounce_ms, 400);
        assert_eq!(config.route_label_zoom_threshold, 16.0);
    }
}
