//! Prelude module for common transit_map types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use transit_map::prelude::*;`

pub use crate::core::{
    camera::{CameraTransition, CameraView},
    config::{BackendKind, MapConfig, MapConfigProfile, PolylineDefaults, Theme},
    geo::{LatLng, LatLngBounds, Point},
    map::{create_provider, MapProvider, ProviderState, TransitMap},
    viewport::{Viewport, ViewportState},
};

pub use crate::backends::{EngineLoader, MapBackend, MapContainer, NativeHandle, NoopLoader};

pub use crate::data::transit::{
    ActiveTrip, RouteType, Stop, StopIconResolver, StopLookup, StopTime, VehicleStatus,
};

pub use crate::input::{
    events::{EventHandled, MapEvent, MapEventKind},
    handler::{EventCallback, ListenerId},
};

pub use crate::layers::{
    icon::IconDescriptor,
    marker::{MarkerHandle, MarkerKind, MarkerSpec},
    polyline::{PolylineHandle, PolylineOptions},
};

pub use crate::ui::popup::PopupEntity;

pub use crate::traits::{CacheStats, Cacheable};

pub use crate::{Error as MapError, Result};

pub use std::{sync::Arc, time::Duration};

pub use instant::Instant;

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};
