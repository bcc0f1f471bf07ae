use crate::core::geo::{LatLng, LatLngBounds};
use crate::MapError;
use serde::Serialize;
use std::str::FromStr;

/// Normalized event names listeners can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MapEventKind {
    /// Click on the map surface (not on a marker)
    Click,
    /// Any pan or zoom step, fired immediately
    ViewportChange,
    /// Zoom level differs from the previous change
    ZoomChange,
    /// A burst of viewport changes went quiet; reload markers now
    ViewportSettled,
}

impl MapEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MapEventKind::Click => "click",
            MapEventKind::ViewportChange => "viewportchange",
            MapEventKind::ZoomChange => "zoomchange",
            MapEventKind::ViewportSettled => "viewportsettled",
        }
    }
}

impl std::fmt::Display for MapEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MapEventKind {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self, MapError> {
        match s {
            "click" => Ok(Self::Click),
            "viewportchange" | "move" => Ok(Self::ViewportChange),
            "zoomchange" | "zoom" => Ok(Self::ZoomChange),
            "viewportsettled" | "idle" => Ok(Self::ViewportSettled),
            other => Err(MapError::UnknownEvent(other.to_string())),
        }
    }
}

/// What an engine-specific event name means once normalized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewportSignal {
    /// Center or extent moved
    Moved,
    /// Zoom level changed
    Zoomed,
    Click,
    /// Events the core does not react to
    Ignored,
}

/// Payload delivered to listeners
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapEvent {
    pub kind: MapEventKind,
    pub center: LatLng,
    pub zoom: f64,
    pub bounds: LatLngBounds,
    /// Geographic position of a click
    pub position: Option<LatLng>,
}

/// Whether a UI event was consumed or should keep propagating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventHandled {
    Handled,
    NotHandled,
}

impl EventHandled {
    pub fn stops_propagation(&self) -> bool {
        matches!(self, EventHandled::Handled)
    }
}
