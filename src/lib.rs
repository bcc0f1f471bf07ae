//! # transit_map
//!
//! Engine-neutral transit map provider. One contract ([`MapProvider`])
//! drives stops, vehicles, trip-planner pins, route shapes, a single popup
//! and the camera on top of interchangeable map engines (Leaflet, Google
//! Maps and ArcGIS adapters under [`backends`]).
//!
//! Engines without HTML markers get an overlay layer kept in sync with the
//! camera; viewport events from every engine are normalized, debounced and
//! fanned out to listeners.

pub mod backends;
pub mod core;
pub mod data;
pub mod input;
pub mod layers;
pub mod prelude;
pub mod traits;
pub mod ui;
pub use crate::core::constants;

use std::time::Duration;

// Re-export public API
pub use crate::core::{
    config::{BackendKind, MapConfig, MapConfigProfile, Theme},
    geo::{LatLng, LatLngBounds, Point},
    map::{create_provider, MapProvider, ProviderState, TransitMap},
    viewport::ViewportState,
};

pub use backends::{EngineLoader, MapBackend, MapContainer, NoopLoader};

pub use data::transit::{ActiveTrip, Stop, StopLookup, StopTime, VehicleStatus};

pub use input::{EventHandled, ListenerId, MapEvent, MapEventKind};

pub use layers::{
    marker::{MarkerHandle, MarkerKind, MarkerSpec},
    polyline::{PolylineHandle, PolylineOptions},
};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, MapError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("Map engine did not load within {0:?}")]
    Timeout(Duration),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("Config error: {0}")]
    Config(String),
}

/// Error type alias for convenience
pub type Error = MapError;
