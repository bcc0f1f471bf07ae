//! Marker icons and the vehicle glyph cache.
//!
//! Icons are described in a backend-neutral way (an SVG image plus size and
//! anchor); each backend wraps the descriptor in its own icon type.

use crate::{
    core::constants::{
        DEFAULT_VEHICLE_COLOR, STOP_ICON_SIZE, STOP_ICON_SIZE_HIGHLIGHTED, VEHICLE_ICON_ANCHOR,
        VEHICLE_ICON_SIZE,
    },
    prelude::{Arc, HashMap},
    traits::{Cacheable, CacheStats},
};
use serde::Serialize;

/// A renderable image reference with its anchor point and size
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IconDescriptor {
    /// Inline SVG document
    pub svg: String,
    pub size: (u32, u32),
    /// Hot-spot inside the image, in pixels from the top-left corner
    pub anchor: (u32, u32),
}

impl IconDescriptor {
    pub fn new(svg: String, size: (u32, u32), anchor: (u32, u32)) -> Self {
        Self { svg, size, anchor }
    }

    /// `data:` URL form for engines that take an image URL
    pub fn data_url(&self) -> String {
        let mut encoded = String::with_capacity(self.svg.len() + 32);
        encoded.push_str("data:image/svg+xml;utf8,");
        for ch in self.svg.chars() {
            match ch {
                '#' => encoded.push_str("%23"),
                '<' => encoded.push_str("%3C"),
                '>' => encoded.push_str("%3E"),
                '"' => encoded.push('\''),
                _ => encoded.push(ch),
            }
        }
        encoded
    }

    /// Circular stop glyph
    pub fn stop_glyph(color: &str) -> Self {
        let (w, h) = STOP_ICON_SIZE;
        let svg = format!(
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 24 24"><circle cx="12" cy="12" r="9" fill="{color}" stroke="#FFFFFF" stroke-width="3"/></svg>"##
        );
        Self::new(svg, (w, h), (w / 2, h / 2))
    }

    /// Same image at the enlarged highlight size, re-anchored at its center
    pub fn highlighted(&self) -> Self {
        let (w, h) = STOP_ICON_SIZE_HIGHLIGHTED;
        let svg = self.svg.replacen(
            &format!(r#"width="{}" height="{}""#, self.size.0, self.size.1),
            &format!(r#"width="{w}" height="{h}""#),
            1,
        );
        Self::new(svg, (w, h), (w / 2, h / 2))
    }
}

/// Cache key: heading rounded to whole degrees plus the tint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IconKey {
    pub orientation: u16,
    pub color: String,
}

impl IconKey {
    pub fn new(orientation_degrees: f64, status_color: Option<&str>) -> Self {
        let normalized = if orientation_degrees.is_finite() {
            orientation_degrees.rem_euclid(360.0).round() as u16 % 360
        } else {
            0
        };
        Self {
            orientation: normalized,
            color: status_color.unwrap_or("default").to_string(),
        }
    }
}

/// Memoizes heading-rotated vehicle glyphs. No eviction: the key space is
/// bounded by 360 headings times the handful of tints in use.
#[derive(Debug, Default)]
pub struct VehicleIconCache {
    icons: HashMap<IconKey, Arc<IconDescriptor>>,
    stats: CacheStats,
}

impl VehicleIconCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the glyph for a heading, tinted with `status_color` when one
    /// is given (vehicles without live predictions) or the default tint.
    pub fn get_icon(
        &mut self,
        orientation_degrees: f64,
        status_color: Option<&str>,
    ) -> Arc<IconDescriptor> {
        let key = IconKey::new(orientation_degrees, status_color);
        if let Some(icon) = self.get_cached(&key) {
            self.stats.hits += 1;
            return icon;
        }

        self.stats.misses += 1;
        let icon = Arc::new(render_vehicle_glyph(key.orientation, status_color));
        self.cache(key, Arc::clone(&icon));
        icon
    }

    pub fn len(&self) -> usize {
        self.icons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.icons.is_empty()
    }
}

impl Cacheable for VehicleIconCache {
    type Key = IconKey;
    type Value = Arc<IconDescriptor>;

    fn get_cached(&self, key: &IconKey) -> Option<Arc<IconDescriptor>> {
        self.icons.get(key).cloned()
    }

    fn cache(&mut self, key: IconKey, value: Arc<IconDescriptor>) {
        self.icons.insert(key, value);
        self.stats.size = self.icons.len();
    }

    fn invalidate(&mut self, key: &IconKey) {
        self.icons.remove(key);
        self.stats.size = self.icons.len();
    }

    fn clear_cache(&mut self) {
        self.icons.clear();
        self.stats = CacheStats::default();
    }

    fn cache_stats(&self) -> CacheStats {
        self.stats.clone()
    }
}

/// Arrow-in-a-circle glyph pointing along the heading
fn render_vehicle_glyph(orientation: u16, status_color: Option<&str>) -> IconDescriptor {
    let (w, h) = VEHICLE_ICON_SIZE;
    let fill = status_color.unwrap_or(DEFAULT_VEHICLE_COLOR);
    let svg = format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 40 40">"#,
            r#"<g transform="rotate({rot} 20 20)">"#,
            r##"<circle cx="20" cy="20" r="13" fill="{fill}" stroke="#FFFFFF" stroke-width="2"/>"##,
            r#"<path d="M20 3 L27 13 L13 13 Z" fill="{fill}"/>"#,
            r#"</g></svg>"#
        ),
        w = w,
        h = h,
        rot = orientation,
        fill = fill,
    );
    IconDescriptor::new(svg, (w, h), VEHICLE_ICON_ANCHOR)
}
