//! ArcGIS adapter: a `MapView` over Web Mercator metres whose zoom is a map
//! scale. The view draws graphics only; HTML markers are left to the
//! provider's overlay layer.

use crate::{
    backends::{BackendCapabilities, EngineLoader, MapBackend, MapContainer, NativeHandle, NativeScene},
    core::{
        camera::{
            clamp_zoom, duration_millis, scale_to_zoom, zoom_to_scale, CameraTransition, CameraView,
        },
        config::{BackendKind, BasemapConfig, MapConfig, Theme},
        geo::{LatLng, LatLngBounds, Point},
    },
    input::events::ViewportSignal,
    layers::{
        icon::IconDescriptor,
        polyline::{arrow_placements, ArrowStyle, LineStyle},
    },
    Result,
};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

const ARCGIS_JS: &str = "https://js.arcgis.com/4.29/";
const WEB_MERCATOR_WKID: u32 = 3857;
/// Screen pixels per inch the scale is computed against
const DPI: f64 = 96.0;
const METERS_PER_INCH: f64 = 0.0254;

/// Point geometry in the view's spatial reference
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MercatorPoint {
    pub x: f64,
    pub y: f64,
    pub wkid: u32,
}

impl From<&LatLng> for MercatorPoint {
    fn from(position: &LatLng) -> Self {
        let projected = position.to_mercator();
        Self {
            x: projected.x,
            y: projected.y,
            wkid: WEB_MERCATOR_WKID,
        }
    }
}

impl MercatorPoint {
    pub fn to_lat_lng(self) -> LatLng {
        LatLng::from_mercator(Point::new(self.x, self.y))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Geometry {
    Point(MercatorPoint),
    Polyline { paths: Vec<MercatorPoint> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Symbol {
    PictureMarker {
        url: String,
        width: u32,
        height: u32,
        xoffset: f64,
        yoffset: f64,
    },
    SimpleLine {
        color: String,
        width: f32,
        opacity: f32,
    },
    /// Triangle marker rotated to the segment bearing
    SimpleMarker {
        style: String,
        color: String,
        size: f64,
        angle: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Graphic {
    pub geometry: Geometry,
    pub symbol: Symbol,
    pub z_index: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArcGisObject {
    Graphic(Graphic),
    /// Arrows along one line, added and removed together. They are placed
    /// again on every scale change to keep their pixel spacing.
    ArrowGroup {
        path: Vec<LatLng>,
        style: ArrowStyle,
        arrows: Vec<Graphic>,
    },
    /// `view.popup` while open
    Popup {
        location: MercatorPoint,
        content: String,
    },
}

/// Camera of the `MapView`
#[derive(Debug, Clone, Copy, PartialEq)]
struct ViewCamera {
    center: MercatorPoint,
    scale: f64,
    size: Point,
}

impl ViewCamera {
    /// Metres of projected space per screen pixel
    fn resolution(&self) -> f64 {
        self.scale * METERS_PER_INCH / DPI
    }

    fn to_screen(&self, position: &LatLng) -> Point {
        let point = MercatorPoint::from(position);
        let resolution = self.resolution();
        Point::new(
            (point.x - self.center.x) / resolution + self.size.x / 2.0,
            (self.center.y - point.y) / resolution + self.size.y / 2.0,
        )
    }

    /// Metres on the ground per screen pixel at `latitude`
    fn ground_resolution(&self, latitude: f64) -> f64 {
        self.resolution() * LatLng::clamp_lat(latitude).to_radians().cos()
    }

    fn extent(&self) -> LatLngBounds {
        let resolution = self.resolution();
        let half_w = self.size.x / 2.0 * resolution;
        let half_h = self.size.y / 2.0 * resolution;
        let south_west = LatLng::from_mercator(Point::new(self.center.x - half_w, self.center.y - half_h));
        let north_east = LatLng::from_mercator(Point::new(self.center.x + half_w, self.center.y + half_h));
        LatLngBounds::new(south_west, north_east)
    }
}

#[derive(Debug)]
pub struct ArcGisBackend {
    scene: NativeScene<ArcGisObject>,
    camera: Option<ViewCamera>,
    basemap: BasemapConfig,
    theme: Theme,
    last_transition: Option<CameraTransition>,
}

impl ArcGisBackend {
    pub fn new(config: &MapConfig) -> Self {
        Self {
            scene: NativeScene::default(),
            camera: None,
            basemap: config.basemap.clone(),
            theme: config.theme,
            last_transition: None,
        }
    }

    pub fn object(&self, handle: NativeHandle) -> Option<&ArcGisObject> {
        self.scene.get(handle)
    }

    /// Basemap id for the active theme
    pub fn basemap_id(&self) -> &str {
        match self.theme {
            Theme::Light => &self.basemap.arcgis_basemap_light,
            Theme::Dark => &self.basemap.arcgis_basemap_dark,
        }
    }

    /// Current `view.scale`
    pub fn scale(&self) -> Option<f64> {
        self.camera.map(|c| c.scale)
    }

    fn go_to(&mut self, center: LatLng, zoom: f64) {
        let Some(camera) = self.camera.as_mut() else {
            return;
        };
        let target_center = MercatorPoint::from(&center);
        let target_scale = zoom_to_scale(clamp_zoom(zoom));
        let zoom_changed = (camera.scale - target_scale).abs() > camera.scale * 1e-9;
        let extent_changed = zoom_changed || camera.center != target_center;

        camera.center = target_center;
        camera.scale = target_scale;

        if extent_changed {
            self.scene.emit("extent-change");
        }
        if zoom_changed {
            self.place_arrows_again();
            self.scene.emit("zoom-change");
        }
        self.scene.emit("stationary");
    }

    fn picture_symbol(icon: &IconDescriptor) -> Symbol {
        Symbol::PictureMarker {
            url: icon.data_url(),
            width: icon.size.0,
            height: icon.size.1,
            xoffset: icon.size.0 as f64 / 2.0 - icon.anchor.0 as f64,
            yoffset: icon.anchor.1 as f64 - icon.size.1 as f64 / 2.0,
        }
    }

    /// Ground metres covered by one screen pixel around `latitude`
    fn place_arrows_again(&mut self) {
        let camera = self.camera;
        let mut placed = 0;
        for object in self.scene.values_mut() {
            if let ArcGisObject::ArrowGroup { path, style, arrows } = object {
                *arrows = arrow_graphics(camera.as_ref(), path, style);
                placed += 1;
            }
        }
        if placed > 0 {
            log::debug!("arcgis re-placed arrows on {} lines", placed);
        }
    }
}

/// Triangle graphics `style.spacing_px` apart at the camera's scale
fn arrow_graphics(camera: Option<&ViewCamera>, path: &[LatLng], style: &ArrowStyle) -> Vec<Graphic> {
    let latitude = path.first().map(|p| p.lat).unwrap_or_default();
    let spacing_m = camera
        .map(|c| style.spacing_px * c.ground_resolution(latitude))
        .unwrap_or(0.0);

    arrow_placements(path, spacing_m)
        .into_iter()
        .map(|placement| Graphic {
            geometry: Geometry::Point(MercatorPoint::from(&placement.position)),
            symbol: Symbol::SimpleMarker {
                style: "triangle".to_string(),
                color: style.color.clone(),
                size: style.size_px,
                angle: placement.bearing,
            },
            z_index: 1,
        })
        .collect()
}

#[async_trait]
impl MapBackend for ArcGisBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::ArcGis
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            html_markers: false,
            animated_fly: true,
        }
    }

    async fn bootstrap(
        &mut self,
        loader: &dyn EngineLoader,
        container: &MapContainer,
        view: CameraView,
    ) -> Result<()> {
        let theme = match self.theme {
            Theme::Light => "light",
            Theme::Dark => "dark",
        };
        let stylesheet = format!("{ARCGIS_JS}esri/themes/{theme}/main.css");
        futures::try_join!(
            loader.load_stylesheet(&stylesheet),
            loader.load_script(ARCGIS_JS)
        )?;

        self.camera = Some(ViewCamera {
            center: MercatorPoint::from(&view.center),
            scale: zoom_to_scale(view.zoom),
            size: container.size,
        });
        log::info!(
            "arcgis view created in #{} with basemap {}",
            container.element_id,
            self.basemap_id()
        );
        Ok(())
    }

    fn normalize_event(&self, native_event: &str) -> ViewportSignal {
        match native_event {
            "extent-change" | "drag" => ViewportSignal::Moved,
            "zoom-change" => ViewportSignal::Zoomed,
            "click" => ViewportSignal::Click,
            _ => ViewportSignal::Ignored,
        }
    }

    fn drain_native_events(&mut self) -> Vec<String> {
        self.scene.drain_events()
    }

    fn center(&self) -> LatLng {
        self.camera
            .map(|c| c.center.to_lat_lng())
            .unwrap_or_default()
    }

    fn zoom(&self) -> f64 {
        self.camera.map(|c| scale_to_zoom(c.scale)).unwrap_or_default()
    }

    fn bounds(&self) -> LatLngBounds {
        match &self.camera {
            Some(camera) => camera.extent(),
            None => LatLngBounds::new(LatLng::default(), LatLng::default()),
        }
    }

    fn set_view(&mut self, view: CameraView) {
        self.go_to(view.center, view.zoom);
    }

    fn pan_to(&mut self, center: LatLng) {
        let zoom = self.zoom();
        self.go_to(center, zoom);
    }

    fn fly_to(&mut self, view: CameraView, duration: Duration) {
        log::debug!("arcgis goTo with duration {}ms", duration_millis(duration));
        self.last_transition = Some(CameraTransition {
            target: view,
            duration,
            animated: !duration.is_zero(),
        });
        self.go_to(view.center, view.zoom);
    }

    fn set_zoom(&mut self, zoom: f64) {
        let center = self.center();
        self.go_to(center, zoom);
    }

    fn last_transition(&self) -> Option<CameraTransition> {
        self.last_transition
    }

    fn project(&self, position: &LatLng) -> Option<Point> {
        self.camera.map(|c| c.to_screen(position))
    }

    fn add_icon_marker(
        &mut self,
        position: LatLng,
        icon: &IconDescriptor,
        z_index: i32,
    ) -> NativeHandle {
        self.scene.insert(ArcGisObject::Graphic(Graphic {
            geometry: Geometry::Point(MercatorPoint::from(&position)),
            symbol: Self::picture_symbol(icon),
            z_index,
        }))
    }

    fn set_marker_icon(&mut self, handle: NativeHandle, icon: &IconDescriptor, z_index: i32) {
        if let Some(ArcGisObject::Graphic(graphic)) = self.scene.get_mut(handle) {
            graphic.symbol = Self::picture_symbol(icon);
            graphic.z_index = z_index;
        }
    }

    fn add_html_marker(
        &mut self,
        _position: LatLng,
        _html: &str,
        _z_index: i32,
    ) -> Option<NativeHandle> {
        None
    }

    fn set_marker_html(&mut self, _handle: NativeHandle, _html: &str, _z_index: i32) {}

    fn move_marker(&mut self, handle: NativeHandle, position: LatLng) {
        if let Some(ArcGisObject::Graphic(graphic)) = self.scene.get_mut(handle) {
            graphic.geometry = Geometry::Point(MercatorPoint::from(&position));
        }
    }

    fn remove_marker(&mut self, handle: NativeHandle) {
        self.scene.remove(handle);
    }

    fn add_polyline(&mut self, path: &[LatLng], style: &LineStyle) -> NativeHandle {
        self.scene.insert(ArcGisObject::Graphic(Graphic {
            geometry: Geometry::Polyline {
                paths: path.iter().map(MercatorPoint::from).collect(),
            },
            symbol: Symbol::SimpleLine {
                color: style.color.clone(),
                width: style.weight,
                opacity: style.opacity,
            },
            z_index: 0,
        }))
    }

    /// Graphics cannot repeat a symbol along a line, so arrows are placed
    /// one by one at the current scale
    fn add_arrow_decoration(&mut self, path: &[LatLng], style: &ArrowStyle) -> NativeHandle {
        let arrows = arrow_graphics(self.camera.as_ref(), path, style);
        log::debug!("arcgis placed {} arrow graphics", arrows.len());
        self.scene.insert(ArcGisObject::ArrowGroup {
            path: path.to_vec(),
            style: style.clone(),
            arrows,
        })
    }

    fn remove_polyline(&mut self, handle: NativeHandle) {
        self.scene.remove(handle);
    }

    fn open_popup(&mut self, position: LatLng, html: &str) -> NativeHandle {
        self.scene.insert(ArcGisObject::Popup {
            location: MercatorPoint::from(&position),
            content: html.to_string(),
        })
    }

    fn set_popup_content(&mut self, handle: NativeHandle, position: LatLng, html: &str) {
        if let Some(ArcGisObject::Popup { location, content }) = self.scene.get_mut(handle) {
            *location = MercatorPoint::from(&position);
            *content = html.to_string();
        }
    }

    fn close_popup(&mut self, handle: NativeHandle) {
        self.scene.remove(handle);
    }

    fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
        log::debug!("arcgis basemap set to {}", self.basemap_id());
    }

    fn native_object_count(&self) -> usize {
        self.scene.len()
    }

    fn destroy(&mut self) {
        self.scene.clear();
        self.camera = None;
        self.last_transition = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::NoopLoader;

    async fn loaded() -> ArcGisBackend {
        let mut backend = ArcGisBackend::new(&MapConfig::default().with_backend(BackendKind::ArcGis));
        backend
            .bootstrap(
                &NoopLoader,
                &MapContainer::new("map", 800.0, 600.0),
                CameraView::new(LatLng::new(47.6, -122.33), 15.0),
            )
            .await
            .unwrap();
        backend
    }

    #[tokio::test]
    async fn test_zoom_is_expressed_as_scale() {
        let mut backend = loaded().await;
        assert!((backend.zoom() - 15.0).abs() < 1e-9);

        backend.set_zoom(16.0);
        assert!((backend.scale().unwrap() - 9027.977411).abs() < 1e-3);
        assert!((backend.zoom() - 16.0).abs() < 1e-9);
        assert_eq!(
            backend.drain_native_events(),
            vec!["extent-change", "zoom-change", "stationary"]
        );
    }

    #[tokio::test]
    async fn test_center_projects_to_middle_of_view() {
        let backend = loaded().await;
        let center = backend.project(&LatLng::new(47.6, -122.33)).unwrap();
        assert!((center.x - 400.0).abs() < 1e-6);
        assert!((center.y - 300.0).abs() < 1e-6);
        assert!(backend.bounds().contains(&LatLng::new(47.6, -122.33)));
    }

    #[tokio::test]
    async fn test_no_html_markers() {
        let mut backend = loaded().await;
        assert!(!backend.capabilities().html_markers);
        assert!(backend.add_html_marker(LatLng::default(), "<div/>", 0).is_none());
        assert_eq!(backend.native_object_count(), 0);
    }

    #[tokio::test]
    async fn test_arrows_are_individual_graphics() {
        let mut backend = loaded().await;
        let path = [LatLng::new(47.60, -122.33), LatLng::new(47.61, -122.33)];
        let style = ArrowStyle {
            color: "#00A1E0".into(),
            spacing_px: 50.0,
            size_px: 10.0,
        };
        let handle = backend.add_arrow_decoration(&path, &style);
        match backend.object(handle) {
            Some(ArcGisObject::ArrowGroup { arrows, .. }) => {
                assert!(!arrows.is_empty());
                assert!(arrows.iter().all(|g| matches!(g.symbol, Symbol::SimpleMarker { .. })));
            }
            other => panic!("unexpected object {:?}", other),
        }
        backend.remove_polyline(handle);
        assert_eq!(backend.native_object_count(), 0);
    }

    #[tokio::test]
    async fn test_arrows_keep_pixel_spacing_across_zoom() {
        let mut backend = loaded().await;
        let path = [LatLng::new(47.60, -122.33), LatLng::new(47.61, -122.33)];
        let style = ArrowStyle {
            color: "#00A1E0".into(),
            spacing_px: 50.0,
            size_px: 10.0,
        };
        let handle = backend.add_arrow_decoration(&path, &style);
        let arrow_count = |backend: &ArcGisBackend| match backend.object(handle) {
            Some(ArcGisObject::ArrowGroup { arrows, .. }) => arrows.len(),
            _ => 0,
        };
        let at_15 = arrow_count(&backend);

        // two levels in, each pixel covers a quarter of the ground
        backend.set_zoom(17.0);
        assert!(arrow_count(&backend) > 2 * at_15);

        backend.set_zoom(15.0);
        assert_eq!(arrow_count(&backend), at_15);
        assert_eq!(backend.native_object_count(), 1);
    }

    #[tokio::test]
    async fn test_fly_duration_in_millis() {
        let mut backend = loaded().await;
        backend.fly_to(
            CameraView::new(LatLng::new(47.61, -122.34), 17.0),
            Duration::from_millis(1500),
        );
        let transition = backend.last_transition().unwrap();
        assert_eq!(duration_millis(transition.duration), 1500);
        assert!(backend.center().approx_eq(&LatLng::new(47.61, -122.34), 1e-9));
    }

    #[test]
    fn test_event_normalization() {
        let backend = ArcGisBackend::new(&MapConfig::default());
        assert_eq!(backend.normalize_event("extent-change"), ViewportSignal::Moved);
        assert_eq!(backend.normalize_event("zoom-change"), ViewportSignal::Zoomed);
        assert_eq!(backend.normalize_event("stationary"), ViewportSignal::Ignored);
        assert_eq!(backend.normalize_event("zoomend"), ViewportSignal::Ignored);
    }
}
