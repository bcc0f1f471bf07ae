use crate::{
    backends::{MapBackend, NativeHandle},
    core::{config::PolylineDefaults, geo::LatLng},
    data::polyline,
    prelude::{Arc, HashMap},
};
use geo::{HaversineBearing, HaversineDistance, HaversineIntermediate};
use serde::{Deserialize, Serialize};

/// Line appearance handed to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineStyle {
    pub color: String,
    pub weight: f32,
    pub opacity: f32,
}

/// Repeating direction arrows drawn over a line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrowStyle {
    pub color: String,
    /// Distance between arrows in screen pixels
    pub spacing_px: f64,
    pub size_px: f64,
}

/// Per-call overrides for `create_polyline`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolylineOptions {
    pub color: Option<String>,
    pub weight: Option<f32>,
    pub opacity: Option<f32>,
    pub with_arrow: bool,
    pub arrow_spacing_px: Option<f64>,
}

impl PolylineOptions {
    pub fn with_arrow(mut self) -> Self {
        self.with_arrow = true;
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn line_style(&self, defaults: &PolylineDefaults) -> LineStyle {
        LineStyle {
            color: self.color.clone().unwrap_or_else(|| defaults.color.clone()),
            weight: self.weight.unwrap_or(defaults.weight),
            opacity: self.opacity.unwrap_or(defaults.opacity),
        }
    }

    pub fn arrow_style(&self, defaults: &PolylineDefaults) -> Option<ArrowStyle> {
        self.with_arrow.then(|| {
            let weight = self.weight.unwrap_or(defaults.weight) as f64;
            ArrowStyle {
                color: self.color.clone().unwrap_or_else(|| defaults.color.clone()),
                spacing_px: self
                    .arrow_spacing_px
                    .filter(|s| *s > 0.0)
                    .unwrap_or(defaults.arrow_spacing_px),
                size_px: (weight * 2.5).max(8.0),
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PolylineId(u64);

/// A rendered route shape. The decoded path is shared, never re-decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct PolylineHandle {
    id: PolylineId,
    decoded_path: Arc<[LatLng]>,
    has_arrows: bool,
}

impl PolylineHandle {
    pub fn id(&self) -> PolylineId {
        self.id
    }

    pub fn path(&self) -> &[LatLng] {
        &self.decoded_path
    }

    pub fn has_arrows(&self) -> bool {
        self.has_arrows
    }

    pub fn to_line_string(&self) -> geo_types::LineString<f64> {
        self.decoded_path
            .iter()
            .map(|p| geo_types::Coord { x: p.lng, y: p.lat })
            .collect()
    }
}

#[derive(Debug)]
struct TrackedPolyline {
    line: NativeHandle,
    decoration: Option<NativeHandle>,
}

/// Tracks every live polyline so they can be removed in bulk
#[derive(Debug, Default)]
pub struct PolylineManager {
    polylines: HashMap<PolylineId, TrackedPolyline>,
    next_id: u64,
}

impl PolylineManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes `encoded` once and renders it. Returns `None` (and logs) when
    /// decoding yields no points.
    pub fn create(
        &mut self,
        backend: &mut dyn MapBackend,
        encoded: &str,
        options: &PolylineOptions,
        defaults: &PolylineDefaults,
    ) -> Option<PolylineHandle> {
        let path: Arc<[LatLng]> = match polyline::decode_checked(encoded) {
            Ok(points) => points.into(),
            Err(e) => {
                log::error!("not rendering polyline: {}", e);
                return None;
            }
        };

        let line = backend.add_polyline(&path, &options.line_style(defaults));
        let decoration = options
            .arrow_style(defaults)
            .map(|style| backend.add_arrow_decoration(&path, &style));

        self.next_id += 1;
        let id = PolylineId(self.next_id);
        self.polylines.insert(id, TrackedPolyline { line, decoration });
        log::debug!(
            "polyline {:?} rendered with {} points{}",
            id,
            path.len(),
            if decoration.is_some() { " and arrows" } else { "" }
        );

        Some(PolylineHandle {
            id,
            decoded_path: path,
            has_arrows: decoration.is_some(),
        })
    }

    /// Removes the line and its arrows together. Unknown handles are ignored.
    pub fn remove(&mut self, backend: &mut dyn MapBackend, handle: &PolylineHandle) -> bool {
        match self.polylines.remove(&handle.id) {
            Some(tracked) => {
                Self::teardown(backend, tracked);
                true
            }
            None => false,
        }
    }

    pub fn clear_all(&mut self, backend: &mut dyn MapBackend) {
        for (_, tracked) in self.polylines.drain() {
            Self::teardown(backend, tracked);
        }
    }

    /// Forgets every polyline without touching the engine
    pub(crate) fn forget_all(&mut self) {
        self.polylines.clear();
    }

    pub fn contains(&self, handle: &PolylineHandle) -> bool {
        self.polylines.contains_key(&handle.id)
    }

    pub fn len(&self) -> usize {
        self.polylines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polylines.is_empty()
    }

    fn teardown(backend: &mut dyn MapBackend, tracked: TrackedPolyline) {
        if let Some(decoration) = tracked.decoration {
            backend.remove_polyline(decoration);
        }
        backend.remove_polyline(tracked.line);
    }
}

/// An arrow to draw at `position`, pointing along `bearing` (degrees from north)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrowPlacement {
    pub position: LatLng,
    pub bearing: f64,
}

/// Places arrows every `spacing_m` metres along the path, starting half a
/// spacing in so the first arrow does not sit on the first vertex.
pub fn arrow_placements(path: &[LatLng], spacing_m: f64) -> Vec<ArrowPlacement> {
    let mut placements = Vec::new();
    if path.len() < 2 || spacing_m.is_nan() || spacing_m <= 0.0 {
        return placements;
    }

    let mut next_at = spacing_m / 2.0;
    let mut walked = 0.0;

    for segment in path.windows(2) {
        let from = geo_types::Point::from(segment[0]);
        let to = geo_types::Point::from(segment[1]);
        let length = from.haversine_distance(&to);
        if length <= 0.0 {
            continue;
        }
        let bearing = from.haversine_bearing(to).rem_euclid(360.0);

        while next_at <= walked + length {
            let fraction = (next_at - walked) / length;
            let position = from.haversine_intermediate(&to, fraction);
            placements.push(ArrowPlacement {
                position: position.into(),
                bearing,
            });
            next_at += spacing_m;
        }
        walked += length;
    }

    placements
}
