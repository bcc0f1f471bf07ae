use crate::{
    backends::NativeHandle,
    core::geo::LatLng,
    layers::{
        icon::IconDescriptor,
        overlay::OverlayNodeId,
        route_label::{escape_html, RouteLabel},
    },
    prelude::Arc,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerKind {
    /// Stop placed through `add_marker` or `add_stop_marker`
    Stop,
    /// Trip-planner endpoint pin
    Pin,
    Vehicle,
}

/// Caller-facing reference to a placed marker. Cheap to clone; holding one
/// after the marker is removed is allowed and every operation on it is a
/// no-op.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarkerHandle {
    id: String,
    kind: MarkerKind,
    serial: u64,
}

impl MarkerHandle {
    pub(crate) fn new(id: String, kind: MarkerKind, serial: u64) -> Self {
        Self { id, kind, serial }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> MarkerKind {
        self.kind
    }

    /// Allocation number; two handles with equal serials are the same marker
    pub fn serial(&self) -> u64 {
        self.serial
    }
}

/// Invoked when the marker itself (not its route label) is clicked
pub type MarkerCallback = Arc<dyn Fn(&MarkerHandle) + Send + Sync>;

/// Input to `add_marker`
#[derive(Clone)]
pub struct MarkerSpec {
    pub id: String,
    pub position: LatLng,
    pub icon: Option<IconDescriptor>,
    pub on_click: Option<MarkerCallback>,
    pub highlighted: bool,
    /// Route short-names for the stop's route label
    pub routes: Vec<String>,
}

impl MarkerSpec {
    pub fn new(id: impl Into<String>, position: LatLng) -> Self {
        Self {
            id: id.into(),
            position,
            icon: None,
            on_click: None,
            highlighted: false,
            routes: Vec::new(),
        }
    }

    pub fn with_icon(mut self, icon: IconDescriptor) -> Self {
        self.icon = Some(icon);
        self
    }

    pub fn with_routes<I, S>(mut self, routes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.routes = routes.into_iter().map(Into::into).collect();
        self
    }

    pub fn highlighted(mut self, highlighted: bool) -> Self {
        self.highlighted = highlighted;
        self
    }

    pub fn on_click<F>(mut self, callback: F) -> Self
    where
        F: Fn(&MarkerHandle) + Send + Sync + 'static,
    {
        self.on_click = Some(Arc::new(callback));
        self
    }
}

impl std::fmt::Debug for MarkerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkerSpec")
            .field("id", &self.id)
            .field("position", &self.position)
            .field("highlighted", &self.highlighted)
            .field("routes", &self.routes)
            .field("on_click", &self.on_click.is_some())
            .finish()
    }
}

/// Vehicle data derived when the marker is placed or updated
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleInfo {
    pub vehicle_id: String,
    pub trip_id: String,
    pub route_short_name: String,
    pub destination: Option<String>,
    pub next_stop_name: Option<String>,
    pub orientation: f64,
    pub predicted: bool,
    pub last_update_time: DateTime<Utc>,
}

/// View-model a marker renders from. Managers mutate it and then push the
/// result to the backend; nothing renders it implicitly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderState {
    pub icon: Option<Arc<IconDescriptor>>,
    pub highlighted: bool,
    pub show_routes_label: bool,
    pub route_label: Option<RouteLabel>,
    /// Text of a trip-planner pin
    pub text: Option<String>,
    pub vehicle: Option<VehicleInfo>,
    pub z_index: i32,
}

impl RenderState {
    pub fn new(z_index: i32) -> Self {
        Self {
            icon: None,
            highlighted: false,
            show_routes_label: false,
            route_label: None,
            text: None,
            vehicle: None,
            z_index,
        }
    }

    /// Markup for engines that host HTML markers (or the overlay layer)
    pub fn to_html(&self, kind: MarkerKind) -> String {
        let mut classes = format!("transit-marker transit-marker--{}", kind_class(kind));
        if self.highlighted {
            classes.push_str(" transit-marker--highlighted");
        }

        let mut html = format!(r#"<div class="{classes}">"#);
        if let Some(icon) = &self.icon {
            html.push_str(&format!(
                r#"<img class="transit-marker__icon" src="{}" width="{}" height="{}"/>"#,
                icon.data_url(),
                icon.size.0,
                icon.size.1
            ));
        }
        if let Some(text) = &self.text {
            html.push_str(&format!(
                r#"<span class="transit-marker__text">{}</span>"#,
                escape_html(text)
            ));
        }
        if self.show_routes_label {
            if let Some(label) = self.route_label.as_ref().filter(|l| !l.is_empty()) {
                html.push_str(&label.to_html());
            }
        }
        html.push_str("</div>");
        html
    }
}

fn kind_class(kind: MarkerKind) -> &'static str {
    match kind {
        MarkerKind::Stop => "stop",
        MarkerKind::Pin => "pin",
        MarkerKind::Vehicle => "vehicle",
    }
}

/// How a marker is represented in the active engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BackendRef {
    /// Native marker showing an image
    Icon(NativeHandle),
    /// Native marker hosting HTML content
    Html(NativeHandle),
    /// Node in the overlay layer, for engines without HTML markers
    Overlay(OverlayNodeId),
}

/// A live marker owned by the marker manager
pub struct PlacedMarker {
    pub(crate) handle: MarkerHandle,
    pub(crate) position: LatLng,
    pub(crate) render_state: RenderState,
    pub(crate) backend_ref: BackendRef,
    pub(crate) on_click: Option<MarkerCallback>,
    revision: u64,
}

impl PlacedMarker {
    pub(crate) fn new(
        handle: MarkerHandle,
        position: LatLng,
        render_state: RenderState,
        backend_ref: BackendRef,
        on_click: Option<MarkerCallback>,
    ) -> Self {
        Self {
            handle,
            position,
            render_state,
            backend_ref,
            on_click,
            revision: 0,
        }
    }

    pub fn handle(&self) -> &MarkerHandle {
        &self.handle
    }

    pub fn position(&self) -> LatLng {
        self.position
    }

    pub fn render_state(&self) -> &RenderState {
        &self.render_state
    }

    /// Bumped every time the render state changes
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Applies `update` and reports whether anything changed
    pub(crate) fn update_render_state<F>(&mut self, update: F) -> bool
    where
        F: FnOnce(&mut RenderState),
    {
        let before = self.render_state.clone();
        update(&mut self.render_state);
        let changed = before != self.render_state;
        if changed {
            self.revision += 1;
        }
        changed
    }

    pub(crate) fn html(&self) -> String {
        self.render_state.to_html(self.handle.kind)
    }
}

impl std::fmt::Debug for PlacedMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlacedMarker")
            .field("handle", &self.handle)
            .field("position", &self.position)
            .field("render_state", &self.render_state)
            .field("backend_ref", &self.backend_ref)
            .field("revision", &self.revision)
            .finish()
    }
}
