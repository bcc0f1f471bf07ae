//! Google Maps adapter: `{lat, lng}` literals, advanced markers with HTML
//! content and icon sequences for direction arrows.
//!
//! The raster map only settles on whole zoom levels and `panTo` has no
//! duration option, so fly requests become a pan followed by a zoom.

use crate::{
    backends::{BackendCapabilities, EngineLoader, MapBackend, MapContainer, NativeHandle, NativeScene},
    core::{
        camera::{CameraTransition, CameraView},
        config::{BackendKind, MapConfig, Theme},
        geo::{LatLng, LatLngBounds, Point},
        viewport::Viewport,
    },
    input::events::ViewportSignal,
    layers::{
        icon::IconDescriptor,
        polyline::{ArrowStyle, LineStyle},
    },
    MapError, Result,
};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

const MAPS_JS: &str = "https://maps.googleapis.com/maps/api/js";

/// `google.maps.LatLngLiteral`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatLngLiteral {
    pub lat: f64,
    pub lng: f64,
}

impl From<&LatLng> for LatLngLiteral {
    fn from(position: &LatLng) -> Self {
        Self {
            lat: position.lat,
            lng: position.lng,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MarkerContent {
    Image {
        src: String,
        width: u32,
        height: u32,
        anchor_x: u32,
        anchor_y: u32,
    },
    Html { html: String },
}

/// `google.maps.IconSequence`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IconSequence {
    pub symbol_path: String,
    pub scale: f64,
    pub stroke_color: String,
    pub offset: String,
    pub repeat: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum GoogleObject {
    AdvancedMarker {
        position: LatLngLiteral,
        content: MarkerContent,
        z_index: i32,
    },
    Polyline {
        path: Vec<LatLngLiteral>,
        stroke_color: String,
        stroke_weight: f32,
        stroke_opacity: f32,
        icons: Vec<IconSequence>,
    },
    InfoWindow {
        position: LatLngLiteral,
        content: String,
    },
}

#[derive(Debug)]
pub struct GoogleBackend {
    scene: NativeScene<GoogleObject>,
    viewport: Option<Viewport>,
    api_key: Option<String>,
    theme: Theme,
    last_transition: Option<CameraTransition>,
}

impl GoogleBackend {
    pub fn new(config: &MapConfig) -> Self {
        Self {
            scene: NativeScene::default(),
            viewport: None,
            api_key: config.google_api_key.clone().filter(|k| !k.trim().is_empty()),
            theme: config.theme,
            last_transition: None,
        }
    }

    pub fn object(&self, handle: NativeHandle) -> Option<&GoogleObject> {
        self.scene.get(handle)
    }

    /// `colorScheme` map option for the active theme
    pub fn color_scheme(&self) -> &'static str {
        match self.theme {
            Theme::Light => "LIGHT",
            Theme::Dark => "DARK",
        }
    }

    fn move_camera(&mut self, center: LatLng, zoom: f64) {
        let Some(viewport) = self.viewport.as_mut() else {
            return;
        };
        let zoom = zoom.round();
        let zoom_changed = (viewport.zoom - zoom).abs() > f64::EPSILON;
        let center_changed = viewport.center != center;

        viewport.set_center(center);
        viewport.set_zoom(zoom);

        if center_changed || zoom_changed {
            self.scene.emit("bounds_changed");
        }
        if center_changed {
            self.scene.emit("center_changed");
        }
        if zoom_changed {
            self.scene.emit("zoom_changed");
        }
        self.scene.emit("idle");
    }

    fn image_content(icon: &IconDescriptor) -> MarkerContent {
        MarkerContent::Image {
            src: icon.data_url(),
            width: icon.size.0,
            height: icon.size.1,
            anchor_x: icon.anchor.0,
            anchor_y: icon.anchor.1,
        }
    }
}

#[async_trait]
impl MapBackend for GoogleBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Google
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            html_markers: true,
            animated_fly: false,
        }
    }

    async fn bootstrap(
        &mut self,
        loader: &dyn EngineLoader,
        container: &MapContainer,
        view: CameraView,
    ) -> Result<()> {
        let key = self.api_key.as_deref().ok_or_else(|| {
            MapError::Initialization("google maps requires an api key".to_string())
        })?;
        loader
            .load_script(&format!("{MAPS_JS}?key={key}&libraries=marker&v=weekly"))
            .await?;

        self.viewport = Some(Viewport::new(
            view.center,
            view.zoom.round(),
            container.size,
        ));
        log::info!(
            "google map created in #{} with color scheme {}",
            container.element_id,
            self.color_scheme()
        );
        self.scene.emit("tilesloaded");
        Ok(())
    }

    fn normalize_event(&self, native_event: &str) -> ViewportSignal {
        match native_event {
            "idle" | "dragend" => ViewportSignal::Moved,
            "zoom_changed" => ViewportSignal::Zoomed,
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
        self.move_camera(view.center, view.zoom);
    }

    fn pan_to(&mut self, center: LatLng) {
        let zoom = self.zoom();
        self.move_camera(center, zoom);
    }

    fn fly_to(&mut self, view: CameraView, duration: Duration) {
        if !duration.is_zero() {
            log::debug!("google maps cannot time camera moves, ignoring {:?}", duration);
        }
        self.last_transition = Some(CameraTransition {
            target: CameraView {
                center: view.center,
                zoom: view.zoom.round(),
            },
            duration: Duration::ZERO,
            animated: false,
        });
        self.pan_to(view.center);
        self.set_zoom(view.zoom);
    }

    fn set_zoom(&mut self, zoom: f64) {
        let center = self.center();
        self.move_camera(center, zoom);
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
        self.scene.insert(GoogleObject::AdvancedMarker {
            position: LatLngLiteral::from(&position),
            content: Self::image_content(icon),
            z_index,
        })
    }

    fn set_marker_icon(&mut self, handle: NativeHandle, icon: &IconDescriptor, z_index: i32) {
        if let Some(GoogleObject::AdvancedMarker {
            content,
            z_index: current,
            ..
        }) = self.scene.get_mut(handle)
        {
            *content = Self::image_content(icon);
            *current = z_index;
        }
    }

    fn add_html_marker(
        &mut self,
        position: LatLng,
        html: &str,
        z_index: i32,
    ) -> Option<NativeHandle> {
        Some(self.scene.insert(GoogleObject::AdvancedMarker {
            position: LatLngLiteral::from(&position),
            content: MarkerContent::Html {
                html: html.to_string(),
            },
            z_index,
        }))
    }

    fn set_marker_html(&mut self, handle: NativeHandle, html: &str, z_index: i32) {
        if let Some(GoogleObject::AdvancedMarker {
            content,
            z_index: current,
            ..
        }) = self.scene.get_mut(handle)
        {
            *content = MarkerContent::Html {
                html: html.to_string(),
            };
            *current = z_index;
        }
    }

    fn move_marker(&mut self, handle: NativeHandle, position: LatLng) {
        if let Some(GoogleObject::AdvancedMarker { position: current, .. }) =
            self.scene.get_mut(handle)
        {
            *current = LatLngLiteral::from(&position);
        }
    }

    fn remove_marker(&mut self, handle: NativeHandle) {
        self.scene.remove(handle);
    }

    fn add_polyline(&mut self, path: &[LatLng], style: &LineStyle) -> NativeHandle {
        self.scene.insert(GoogleObject::Polyline {
            path: path.iter().map(LatLngLiteral::from).collect(),
            stroke_color: style.color.clone(),
            stroke_weight: style.weight,
            stroke_opacity: style.opacity,
            icons: Vec::new(),
        })
    }

    /// Arrows ride on a second, fully transparent polyline so they can be
    /// removed independently of the line
    fn add_arrow_decoration(&mut self, path: &[LatLng], style: &ArrowStyle) -> NativeHandle {
        self.scene.insert(GoogleObject::Polyline {
            path: path.iter().map(LatLngLiteral::from).collect(),
            stroke_color: style.color.clone(),
            stroke_weight: 0.0,
            stroke_opacity: 0.0,
            icons: vec![IconSequence {
                symbol_path: "FORWARD_CLOSED_ARROW".to_string(),
                scale: (style.size_px / 4.0).max(1.0),
                stroke_color: style.color.clone(),
                offset: "0".to_string(),
                repeat: format!("{:.0}px", style.spacing_px),
            }],
        })
    }

    fn remove_polyline(&mut self, handle: NativeHandle) {
        self.scene.remove(handle);
    }

    fn open_popup(&mut self, position: LatLng, html: &str) -> NativeHandle {
        self.scene.insert(GoogleObject::InfoWindow {
            position: LatLngLiteral::from(&position),
            content: html.to_string(),
        })
    }

    fn set_popup_content(&mut self, handle: NativeHandle, position: LatLng, html: &str) {
        if let Some(GoogleObject::InfoWindow {
            position: current,
            content,
        }) = self.scene.get_mut(handle)
        {
            *current = LatLngLiteral::from(&position);
            *content = html.to_string();
        }
    }

    fn close_popup(&mut self, handle: NativeHandle) {
        self.scene.remove(handle);
    }

    fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
        log::debug!("google map color scheme set to {}", self.color_scheme());
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
