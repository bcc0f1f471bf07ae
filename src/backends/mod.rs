//! Map engine adapters.
//!
//! [`MapBackend`] is the seam between the engine-neutral provider and one
//! concrete engine. Each adapter keeps the engine's own object model (its
//! marker, graphic and overlay types, its coordinate representation and its
//! event names) in a [`NativeScene`] and translates provider calls into it.
//! A browser binding mirrors that scene into the real engine and forwards
//! the engine's events back through the provider.

pub mod arcgis;
pub mod google;
pub mod leaflet;

pub use arcgis::ArcGisBackend;
pub use google::GoogleBackend;
pub use leaflet::LeafletBackend;

use crate::{
    core::{
        camera::{CameraTransition, CameraView},
        config::{BackendKind, MapConfig, Theme},
        geo::{LatLng, LatLngBounds, Point},
    },
    input::events::ViewportSignal,
    layers::{
        icon::IconDescriptor,
        polyline::{ArrowStyle, LineStyle},
    },
    prelude::HashMap,
    Result,
};
use async_trait::async_trait;
use std::time::Duration;

/// Opaque reference to an object living inside an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeHandle(u64);

impl NativeHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// The DOM element the map is mounted into
#[derive(Debug, Clone, PartialEq)]
pub struct MapContainer {
    pub element_id: String,
    pub size: Point,
}

impl MapContainer {
    pub fn new(element_id: impl Into<String>, width: f64, height: f64) -> Self {
        Self {
            element_id: element_id.into(),
            size: Point::new(width, height),
        }
    }
}

/// What an engine can do natively
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// Markers can host arbitrary HTML. Without it the provider draws HTML
    /// markers in its own overlay layer.
    pub html_markers: bool,
    /// Camera moves can be animated with a duration
    pub animated_fly: bool,
}

/// Fetches engine scripts and stylesheets during bootstrap
#[async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load_script(&self, url: &str) -> Result<()>;

    async fn load_stylesheet(&self, url: &str) -> Result<()> {
        self.load_script(url).await
    }
}

/// Loader for hosts that bundle the engines up front
#[derive(Debug, Default, Clone)]
pub struct NoopLoader;

#[async_trait]
impl EngineLoader for NoopLoader {
    async fn load_script(&self, url: &str) -> Result<()> {
        log::debug!("engine asset {} already bundled", url);
        Ok(())
    }
}

/// Native primitives one map engine offers
#[async_trait]
pub trait MapBackend: Send {
    fn kind(&self) -> BackendKind;

    fn capabilities(&self) -> BackendCapabilities;

    /// Loads the engine and creates the map. Called once.
    async fn bootstrap(
        &mut self,
        loader: &dyn EngineLoader,
        container: &MapContainer,
        view: CameraView,
    ) -> Result<()>;

    /// Maps an engine event name onto the provider's vocabulary
    fn normalize_event(&self, native_event: &str) -> ViewportSignal;

    /// Events the engine raised since the last call, oldest first
    fn drain_native_events(&mut self) -> Vec<String>;

    fn center(&self) -> LatLng;
    fn zoom(&self) -> f64;
    fn bounds(&self) -> LatLngBounds;

    fn set_view(&mut self, view: CameraView);
    fn pan_to(&mut self, center: LatLng);
    fn fly_to(&mut self, view: CameraView, duration: Duration);
    fn set_zoom(&mut self, zoom: f64);
    fn last_transition(&self) -> Option<CameraTransition>;

    /// Container pixel position of a coordinate, if the engine can tell
    fn project(&self, position: &LatLng) -> Option<Point>;

    fn add_icon_marker(&mut self, position: LatLng, icon: &IconDescriptor, z_index: i32)
        -> NativeHandle;
    fn set_marker_icon(&mut self, handle: NativeHandle, icon: &IconDescriptor, z_index: i32);

    /// `None` when the engine has no HTML markers
    fn add_html_marker(&mut self, position: LatLng, html: &str, z_index: i32)
        -> Option<NativeHandle>;
    fn set_marker_html(&mut self, handle: NativeHandle, html: &str, z_index: i32);

    fn move_marker(&mut self, handle: NativeHandle, position: LatLng);
    fn remove_marker(&mut self, handle: NativeHandle);

    fn add_polyline(&mut self, path: &[LatLng], style: &LineStyle) -> NativeHandle;
    fn add_arrow_decoration(&mut self, path: &[LatLng], style: &ArrowStyle) -> NativeHandle;
    /// Removes a line or an arrow decoration
    fn remove_polyline(&mut self, handle: NativeHandle);

    fn open_popup(&mut self, position: LatLng, html: &str) -> NativeHandle;
    fn set_popup_content(&mut self, handle: NativeHandle, position: LatLng, html: &str);
    fn close_popup(&mut self, handle: NativeHandle);

    fn set_theme(&mut self, theme: Theme);

    /// Objects currently alive in the engine
    fn native_object_count(&self) -> usize;

    /// Releases every native object and the map itself
    fn destroy(&mut self);
}

/// Creates the adapter a config asks for
pub fn create_backend(config: &MapConfig) -> Box<dyn MapBackend> {
    match config.backend {
        BackendKind::Leaflet => Box::new(LeafletBackend::new(config)),
        BackendKind::Google => Box::new(GoogleBackend::new(config)),
        BackendKind::ArcGis => Box::new(ArcGisBackend::new(config)),
    }
}

/// Engine-side object store shared by the adapters
#[derive(Debug)]
pub struct NativeScene<T> {
    objects: HashMap<NativeHandle, T>,
    next_id: u64,
    events: Vec<String>,
}

impl<T> Default for NativeScene<T> {
    fn default() -> Self {
        Self {
            objects: HashMap::default(),
            next_id: 0,
            events: Vec::new(),
        }
    }
}

impl<T> NativeScene<T> {
    pub fn insert(&mut self, object: T) -> NativeHandle {
        self.next_id += 1;
        let handle = NativeHandle(self.next_id);
        self.objects.insert(handle, object);
        handle
    }

    pub fn get(&self, handle: NativeHandle) -> Option<&T> {
        self.objects.get(&handle)
    }

    pub fn get_mut(&mut self, handle: NativeHandle) -> Option<&mut T> {
        self.objects.get_mut(&handle)
    }

    pub fn remove(&mut self, handle: NativeHandle) -> Option<T> {
        self.objects.remove(&handle)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.objects.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.objects.values_mut()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Queues an engine event for the provider
    pub fn emit(&mut self, name: &str) {
        self.events.push(name.to_string());
    }

    pub fn drain_events(&mut self) -> Vec<String> {
        std::mem::take(&mut self.events)
    }

    pub fn clear(&mut self) {
        self.objects.clear();
        self.events.clear();
    }
}
