//! Camera commands shared by every backend.
//!
//! The engines disagree on units: one takes fly durations in seconds,
//! another in milliseconds, a third cannot animate at all, and one of them
//! expresses zoom as a map scale. Everything above the backend layer speaks
//! [`CameraView`] and [`Duration`]; the helpers here do the conversions.

use crate::core::{
    constants::{MAX_ZOOM, SCALE_AT_ZOOM_0},
    geo::LatLng,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Center and zoom of the camera
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraView {
    pub center: LatLng,
    pub zoom: f64,
}

impl CameraView {
    pub fn new(center: LatLng, zoom: f64) -> Self {
        Self {
            center,
            zoom: clamp_zoom(zoom),
        }
    }
}

/// Last animated camera move a backend performed, kept for inspection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraTransition {
    pub target: CameraView,
    pub duration: Duration,
    pub animated: bool,
}

pub fn clamp_zoom(zoom: f64) -> f64 {
    if zoom.is_finite() {
        zoom.clamp(0.0, MAX_ZOOM)
    } else {
        0.0
    }
}

/// Map scale (1:n) shown at a zoom level
pub fn zoom_to_scale(zoom: f64) -> f64 {
    SCALE_AT_ZOOM_0 / 2_f64.powf(zoom)
}

/// Zoom level matching a map scale
pub fn scale_to_zoom(scale: f64) -> f64 {
    if scale <= 0.0 || !scale.is_finite() {
        return 0.0;
    }
    // snap away float noise so whole zoom levels survive a round trip
    let zoom = ((SCALE_AT_ZOOM_0 / scale).log2() * 1e9).round() / 1e9;
    clamp_zoom(zoom)
}

/// Fly duration in seconds, as the Leaflet API takes it
pub fn duration_secs(duration: Duration) -> f64 {
    duration.as_secs_f64()
}

/// Fly duration in milliseconds, as the ArcGIS `goTo` options take it
pub fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
