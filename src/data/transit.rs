//! Transit records the map core consumes from the hosting application.
//!
//! The host owns fetching and caching; these types only describe what the
//! marker and popup code needs to read.

use crate::{core::geo::LatLng, layers::icon::IconDescriptor};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::BuildHasher;

/// GTFS route type of the routes serving a stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RouteType {
    Tram,
    Subway,
    Rail,
    #[default]
    Bus,
    Ferry,
    CableTram,
    AerialLift,
    Funicular,
    Trolleybus,
    Monorail,
}

impl RouteType {
    /// Maps a GTFS `route_type` code, falling back to bus
    pub fn from_gtfs(code: u16) -> Self {
        match code {
            0 => Self::Tram,
            1 => Self::Subway,
            2 => Self::Rail,
            4 => Self::Ferry,
            5 => Self::CableTram,
            6 => Self::AerialLift,
            7 => Self::Funicular,
            11 => Self::Trolleybus,
            12 => Self::Monorail,
            _ => Self::Bus,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
    pub position: LatLng,
    /// Short names of the routes serving this stop, in display order
    #[serde(default)]
    pub route_short_names: Vec<String>,
    #[serde(default)]
    pub route_type: RouteType,
}

impl Stop {
    pub fn new(id: impl Into<String>, name: impl Into<String>, position: LatLng) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            code: None,
            direction: None,
            position,
            route_short_names: Vec::new(),
            route_type: RouteType::Bus,
        }
    }

    pub fn with_routes<I, S>(mut self, routes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.route_short_names = routes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// An arrival at a stop, shown in the stop popup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopTime {
    pub trip_id: String,
    pub route_short_name: String,
    #[serde(default)]
    pub headsign: Option<String>,
    pub scheduled_arrival: DateTime<Utc>,
    #[serde(default)]
    pub predicted_arrival: Option<DateTime<Utc>>,
}

impl StopTime {
    /// Predicted arrival when known, otherwise the schedule
    pub fn best_arrival(&self) -> DateTime<Utc> {
        self.predicted_arrival.unwrap_or(self.scheduled_arrival)
    }
}

/// One polled position report for a vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleStatus {
    pub vehicle_id: String,
    pub trip_id: String,
    pub position: LatLng,
    /// Heading in degrees clockwise from north
    #[serde(default)]
    pub orientation: f64,
    /// Whether the vehicle currently reports real-time predictions
    #[serde(default)]
    pub predicted: bool,
    pub last_update_time: DateTime<Utc>,
    #[serde(default)]
    pub next_stop_id: Option<String>,
}

/// The trip a vehicle is serving
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveTrip {
    pub trip_id: String,
    pub route_short_name: String,
    #[serde(default)]
    pub trip_headsign: Option<String>,
}

/// Stop-id to stop lookup supplied by the host, used to name a vehicle's next stop
pub trait StopLookup: Send + Sync {
    fn stop(&self, stop_id: &str) -> Option<&Stop>;
}

impl<S: BuildHasher + Send + Sync> StopLookup for HashMap<String, Stop, S> {
    fn stop(&self, stop_id: &str) -> Option<&Stop> {
        self.get(stop_id)
    }
}

/// Resolves the icon for a stop's dominant route type
pub trait StopIconResolver: Send + Sync {
    fn icon_for_stop(&self, stop: &Stop) -> IconDescriptor;
}

/// Fallback resolver drawing a plain circle tinted per route type
#[derive(Debug, Default, Clone)]
pub struct RouteTypeIconResolver;

impl StopIconResolver for RouteTypeIconResolver {
    fn icon_for_stop(&self, stop: &Stop) -> IconDescriptor {
        let color = match stop.route_type {
            RouteType::Rail | RouteType::Subway | RouteType::Monorail => "#6F42C1",
            RouteType::Tram | RouteType::CableTram | RouteType::Funicular => "#198754",
            RouteType::Ferry => "#0DCAF0",
            _ => "#0D6EFD",
        };
        IconDescriptor::stop_glyph(color)
    }
}
