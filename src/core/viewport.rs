use crate::core::{
    constants::{MAX_ZOOM, TILE_SIZE},
    geo::{LatLng, LatLngBounds, Point, EARTH_RADIUS},
};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Camera model shared by the engines that work in tile-pixel space:
/// center, zoom and container size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// The center of the map view in geographical coordinates
    pub center: LatLng,
    /// The current zoom level
    pub zoom: f64,
    /// The size of the map container in pixels
    pub size: Point,
    pub min_zoom: f64,
    pub max_zoom: f64,
}

impl Viewport {
    pub fn new(center: LatLng, zoom: f64, size: Point) -> Self {
        Self {
            center: Self::clamp_center(center),
            zoom: zoom.clamp(0.0, MAX_ZOOM),
            size,
            min_zoom: 0.0,
            max_zoom: MAX_ZOOM,
        }
    }

    pub fn set_center(&mut self, center: LatLng) {
        self.center = Self::clamp_center(center);
    }

    /// Sets the zoom level, clamping to valid range
    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom.clamp(self.min_zoom, self.max_zoom);
    }

    /// Gets the scale factor for the current zoom level
    pub fn scale(&self) -> f64 {
        2_f64.powf(self.zoom)
    }

    /// Projects a LatLng to world pixel coordinates (EPSG:3857) at the given zoom level
    pub fn project(&self, lat_lng: &LatLng, zoom: Option<f64>) -> Point {
        let z = zoom.unwrap_or(self.zoom);
        let world = TILE_SIZE as f64 * 2_f64.powf(z);
        let mercator = lat_lng.to_mercator();
        let circumference = 2.0 * PI * EARTH_RADIUS;

        Point::new(
            (mercator.x + PI * EARTH_RADIUS) / circumference * world,
            (-mercator.y + PI * EARTH_RADIUS) / circumference * world,
        )
    }

    /// Inverse of [`Viewport::project`]
    pub fn unproject(&self, pixel: &Point, zoom: Option<f64>) -> LatLng {
        let z = zoom.unwrap_or(self.zoom);
        let world = TILE_SIZE as f64 * 2_f64.powf(z);
        let circumference = 2.0 * PI * EARTH_RADIUS;

        let x = pixel.x / world * circumference - PI * EARTH_RADIUS;
        let y = PI * EARTH_RADIUS - pixel.y / world * circumference;
        LatLng::from_mercator(Point::new(x, y))
    }

    /// Converts a geographical coordinate to container pixel coordinates
    pub fn lat_lng_to_pixel(&self, lat_lng: &LatLng) -> Point {
        let origin = self.project(&self.center, None);
        self.project(lat_lng, None)
            .subtract(&origin)
            .add(&Point::new(self.size.x / 2.0, self.size.y / 2.0))
    }

    /// Converts container pixel coordinates back to geographical coordinates
    pub fn pixel_to_lat_lng(&self, pixel: &Point) -> LatLng {
        let origin = self.project(&self.center, None);
        let world = pixel
            .subtract(&Point::new(self.size.x / 2.0, self.size.y / 2.0))
            .add(&origin);
        self.unproject(&world, None)
    }

    /// Gets the current viewport bounds in geographical coordinates
    pub fn bounds(&self) -> LatLngBounds {
        let nw = self.pixel_to_lat_lng(&Point::new(0.0, 0.0));
        let se = self.pixel_to_lat_lng(&Point::new(self.size.x, self.size.y));

        LatLngBounds::new(LatLng::new(se.lat, nw.lng), LatLng::new(nw.lat, se.lng))
    }

    /// Gets the resolution in meters per pixel at the current zoom level
    pub fn resolution(&self) -> f64 {
        let earth_circumference = 2.0 * PI * EARTH_RADIUS;
        earth_circumference / (TILE_SIZE as f64 * self.scale())
    }

    fn clamp_center(center: LatLng) -> LatLng {
        LatLng::new(LatLng::clamp_lat(center.lat), center.lng.clamp(-180.0, 180.0))
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(LatLng::new(0.0, 0.0), 0.0, Point::new(800.0, 600.0))
    }
}

/// Snapshot of a provider's camera plus the route-label flag derived from it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewportState {
    pub zoom: f64,
    pub center: LatLng,
    pub bounds: LatLngBounds,
    pub route_labels_visible: bool,
}
