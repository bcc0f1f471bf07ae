//! Leaflet adapter: raster tiles, `[lat, lng]` arrays, div-icon HTML
//! markers and the polyline-decorator plugin for arrows.

use crate::{
    backends::{BackendCapabilities, EngineLoader, MapBackend, MapContainer, NativeHandle, NativeScene},
    core::{
        camera::{duration_secs, CameraTransition, CameraView},
        config::{BackendKind, BasemapConfig, MapConfig, Theme},
        geo::{LatLng, LatLngBounds, Point},
        viewport::Viewport,
    },
    input::events::ViewportSignal,
    layers::{
        icon::IconDescriptor,
        polyline::{ArrowStyle, LineStyle},
    },
    Result,
};
use async_trait::async_trait;
use std::time::Duration;

const LEAFLET_JS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js";
const LEAFLET_CSS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css";
const DECORATOR_JS: &str =
    "https://unpkg.com/leaflet-polylinedecorator@1.6.0/dist/leaflet.polylineDecorator.js";

/// `L.LatLng` in array form
pub type LeafletLatLng = [f64; 2];

fn to_leaflet(position: &LatLng) -> LeafletLatLng {
    [position.lat, position.lng]
}

#[derive(Debug, Clone, PartialEq)]
pub enum LeafletIcon {
    /// `L.icon`
    Image {
        icon_url: String,
        icon_size: [u32; 2],
        icon_anchor: [u32; 2],
    },
    /// `L.divIcon`
    Div { html: String, class_name: String },
}

/// One pattern of `L.polylineDecorator`
#[derive(Debug, Clone, PartialEq)]
pub struct DecoratorPattern {
    pub offset: String,
    pub repeat: String,
    pub pixel_size: f64,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LeafletLayer {
    Marker {
        lat_lng: LeafletLatLng,
        icon: LeafletIcon,
        z_index_offset: i32,
    },
    Polyline {
        lat_lngs: Vec<LeafletLatLng>,
        color: String,
        weight: f32,
        opacity: f32,
    },
    Decorator {
        lat_lngs: Vec<LeafletLatLng>,
        patterns: Vec<DecoratorPattern>,
    },
    Popup {
        lat_lng: LeafletLatLng,
        content: String,
    },
}

#[derive(Debug)]
pub struct LeafletBackend {
    scene: NativeScene<LeafletLayer>,
    viewport: Option<Viewport>,
    basemap: BasemapConfig,
    theme: Theme,
    tile_url: String,
    last_transition: Option<CameraTransition>,
}

impl LeafletBackend {
    pub fn new(config: &MapConfig) -> Self {
        let mut backend = Self {
            scene: NativeScene::default(),
            viewport: None,
            basemap: config.basemap.clone(),
            theme: config.theme,
            tile_url: String::new(),
            last_transition: None,
        };
        backend.tile_url = backend.tile_url_for(config.theme);
        backend
    }

    /// Current tile layer URL template
    pub fn tile_url(&self) -> &str {
        &self.tile_url
    }

    pub fn layer(&self, handle: NativeHandle) -> Option<&LeafletLayer> {
        self.scene.get(handle)
    }

    fn tile_url_for(&self, theme: Theme) -> String {
        match theme {
            Theme::Light => self.basemap.tile_url_light.clone(),
            Theme::Dark => self.basemap.tile_url_dark.clone(),
        }
    }

    /// Applies a camera change and raises the events Leaflet would
    fn move_camera(&mut self, view: CameraView) {
        let Some(viewport) = self.viewport.as_mut() else {
            return;
        };
        let zoom_changed = (viewport.zoom - view.zoom).abs() > f64::EPSILON;
        let moved = viewport.center != view.center;

        viewport.set_center(view.center);
        viewport.set_zoom(view.zoom);

        self.scene.emit("movestart");
        if zoom_changed {
            self.scene.emit("zoomstart");
            self.scene.emit("zoom");
            self.scene.emit("zoomend");
        }
        if moved || zoom_changed {
            self.scene.emit("move");
        }
        self.scene.emit("moveend");
    }
}

#[async_trait]
impl MapBackend for LeafletBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Leaflet
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            html_markers: true,
            animated_fly: true,
        }
    }

    async fn bootstrap(
        &mut self,
        loader: &dyn EngineLoader,
        container: &MapContainer,
        view: CameraView,
    ) -> Result<()> {
        futures::try_join!(
            loader.load_stylesheet(LEAFLET_CSS),
            loader.load_script(LEAFLET_JS)
        )?;
        // the decorator plugin patches `L` and must load after it
        loader.load_script(DECORATOR_JS).await?;

        self.viewport = Some(Viewport::new(view.center, view.zoom, container.size));
        log::info!(
            "leaflet map created in #{} with tiles {}",
            container.element_id,
            self.tile_url
        );
        self.scene.emit("load");
        Ok(())
    }

    fn normalize_event(&self, native_event: &str) -> ViewportSignal {
        match native_event {
            "moveend" | "dragend" => ViewportSignal::Moved,
            "zoomend" => ViewportSignal::Zoomed,
            "click" => ViewportSignal::Click,
            _ => ViewportSignal::Ignored,
        }
    }

    fn drain_native_events(&mut self) -> Vec<String> {
        self.scene.drain_events()
    }

    fn center(&self) -> LatLng {
        self.viewport.as_ref().map(|v| v.center).unwrap_or_default()
    }

    fn zoom(&self) -> f64 {
        self.viewport.as_ref().map(|v| v.zoom).unwrap_or_default()
    }

    fn bounds(&self) -> LatLngBounds {
        match &self.viewport {
            Some(viewport) => viewport.bounds(),
            None => LatLngBounds::new(LatLng::default(), LatLng::default()),
        }
    }

    fn set_view(&mut self, view: CameraView) {
        self.move_camera(view);
    }

    fn pan_to(&mut self, center: LatLng) {
        let zoom = self.zoom();
        self.move_camera(CameraView::new(center, zoom));
    }

    fn fly_to(&mut self, view: CameraView, duration: Duration) {
        log::debug!("leaflet flyTo with duration {:.2}s", duration_secs(duration));
        self.last_transition = Some(CameraTransition {
            target: view,
            duration,
            animated: !duration.is_zero(),
        });
        self.move_camera(view);
    }

    fn set_zoom(&mut self, zoom: f64) {
        let center = self.center();
        self.move_camera(CameraView::new(center, zoom));
    }

    fn last_transition(&self) -> Option<CameraTransition> {
        self.last_transition
    }

    fn project(&self, position: &LatLng) -> Option<Point> {
        self.viewport.as_ref().map(|v| v.lat_lng_to_pixel(position))
    }

    fn add_icon_marker(
        &mut self,
        position: LatLng,
        icon: &IconDescriptor,
        z_index: i32,
    ) -> NativeHandle {
        self.scene.insert(LeafletLayer::Marker {
            lat_lng: to_leaflet(&position),
            icon: LeafletIcon::Image {
                icon_url: icon.data_url(),
                icon_size: [icon.size.0, icon.size.1],
                icon_anchor: [icon.anchor.0, icon.anchor.1],
            },
            z_index_offset: z_index,
        })
    }

    fn set_marker_icon(&mut self, handle: NativeHandle, icon: &IconDescriptor, z_index: i32) {
        if let Some(LeafletLayer::Marker {
            icon: current,
            z_index_offset,
            ..
        }) = self.scene.get_mut(handle)
        {
            *current = LeafletIcon::Image {
                icon_url: icon.data_url(),
                icon_size: [icon.size.0, icon.size.1],
                icon_anchor: [icon.anchor.0, icon.anchor.1],
            };
            *z_index_offset = z_index;
        }
    }

    fn add_html_marker(
        &mut self,
        position: LatLng,
        html: &str,
        z_index: i32,
    ) -> Option<NativeHandle> {
        Some(self.scene.insert(LeafletLayer::Marker {
            lat_lng: to_leaflet(&position),
            icon: LeafletIcon::Div {
                html: html.to_string(),
                class_name: "transit-div-icon".to_string(),
            },
            z_index_offset: z_index,
        }))
    }

    fn set_marker_html(&mut self, handle: NativeHandle, html: &str, z_index: i32) {
        if let Some(LeafletLayer::Marker {
            icon: LeafletIcon::Div { html: current, .. },
            z_index_offset,
            ..
        }) = self.scene.get_mut(handle)
        {
            *current = html.to_string();
            *z_index_offset = z_index;
        }
    }

    fn move_marker(&mut self, handle: NativeHandle, position: LatLng) {
        if let Some(LeafletLayer::Marker { lat_lng, .. }) = self.scene.get_mut(handle) {
            *lat_lng = to_leaflet(&position);
        }
    }

    fn remove_marker(&mut self, handle: NativeHandle) {
        self.scene.remove(handle);
    }

    fn add_polyline(&mut self, path: &[LatLng], style: &LineStyle) -> NativeHandle {
        self.scene.insert(LeafletLayer::Polyline {
            lat_lngs: path.iter().map(to_leaflet).collect(),
            color: style.color.clone(),
            weight: style.weight,
            opacity: style.opacity,
        })
    }

    fn add_arrow_decoration(&mut self, path: &[LatLng], style: &ArrowStyle) -> NativeHandle {
        self.scene.insert(LeafletLayer::Decorator {
            lat_lngs: path.iter().map(to_leaflet).collect(),
            patterns: vec![DecoratorPattern {
                offset: format!("{:.0}px", style.spacing_px / 2.0),
                repeat: format!("{:.0}px", style.spacing_px),
                pixel_size: style.size_px,
                color: style.color.clone(),
            }],
        })
    }

    fn remove_polyline(&mut self, handle: NativeHandle) {
        self.scene.remove(handle);
    }

    fn open_popup(&mut self, position: LatLng, html: &str) -> NativeHandle {
        self.scene.insert(LeafletLayer::Popup {
            lat_lng: to_leaflet(&position),
            content: html.to_string(),
        })
    }

    fn set_popup_content(&mut self, handle: NativeHandle, position: LatLng, html: &str) {
        if let Some(LeafletLayer::Popup { lat_lng, content }) = self.scene.get_mut(handle) {
            *lat_lng = to_leaflet(&position);
            *content = html.to_string();
        }
    }

    fn close_popup(&mut self, handle: NativeHandle) {
        self.scene.remove(handle);
    }

    fn set_theme(&mut self, theme: Theme) {
        if theme != self.theme {
            self.theme = theme;
            self.tile_url = self.tile_url_for(theme);
            log::debug!("leaflet tile layer switched to {}", self.tile_url);
        }
    }

    fn native_object_count(&self) -> usize {
        self.scene.len()
    }

    fn destroy(&mut self) {
        self.scene.clear();
        self.viewport = None;
        self.last_transition = None;
    }
}
