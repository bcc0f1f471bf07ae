//! The provider: one map instance driving one engine adapter.
//!
//! [`MapProvider`] is the engine-neutral contract the hosting UI talks to.
//! [`TransitMap`] implements it on top of a [`MapBackend`] and owns every
//! registry, cache and timer of the instance. Nothing is global; two
//! providers never share markers, glyphs or popups.

use crate::{
    backends::{create_backend, EngineLoader, MapBackend, MapContainer, NoopLoader},
    core::{
        camera::CameraView,
        config::{MapConfig, Theme},
        geo::{LatLng, LatLngBounds},
        viewport::ViewportState,
    },
    data::transit::{
        ActiveTrip, RouteTypeIconResolver, Stop, StopIconResolver, StopLookup, StopTime,
        VehicleStatus,
    },
    input::{
        dispatcher::ViewportDispatcher,
        events::{EventHandled, MapEvent, MapEventKind, ViewportSignal},
        handler::{EventCallback, EventManager, ListenerId},
    },
    layers::{
        manager::{MarkerManager, MarkerSurface},
        marker::{MarkerHandle, MarkerKind, MarkerSpec},
        overlay::OverlayLayer,
        polyline::{PolylineHandle, PolylineManager, PolylineOptions},
    },
    prelude::{Arc, Duration, HashMap},
    ui::{
        content::{stop_popup_html, vehicle_popup_html},
        popup::{PopupEntity, PopupManager},
    },
    MapError, Result,
};
use async_trait::async_trait;
use chrono::Utc;
use instant::Instant;
use serde::Serialize;

/// Lifecycle of a provider. Only `Ready` providers act on calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderState {
    Uninitialized,
    Loading,
    Ready,
    Failed,
    Destroyed,
}

/// Contract shared by every map engine.
///
/// Until `init_map` succeeds, and after `destroy`, every operation is a
/// silent no-op: lookups return `None` and mutations do nothing. Operating
/// on a marker or polyline that is already gone is never an error.
#[async_trait]
pub trait MapProvider: Send {
    /// Loads the engine into `container` centered on `center`
    async fn init_map(&mut self, container: MapContainer, center: LatLng) -> Result<()>;

    /// Idempotent by `spec.id`
    fn add_marker(&mut self, spec: MarkerSpec) -> Option<MarkerHandle>;
    fn remove_marker(&mut self, handle: &MarkerHandle);
    fn highlight_marker(&mut self, id: &str);
    fn unhighlight_marker(&mut self, id: &str);

    /// Lightweight native marker that opens the stop popup when clicked
    fn add_stop_marker(&mut self, stop: &Stop, stop_time: Option<&StopTime>)
        -> Option<MarkerHandle>;
    /// Opens (or replaces) the popup with this stop's details
    fn open_stop_marker(&mut self, stop: &Stop, stop_time: Option<&StopTime>);

    fn add_vehicle_marker(
        &mut self,
        vehicle: &VehicleStatus,
        trip: &ActiveTrip,
    ) -> Option<MarkerHandle>;
    fn update_vehicle_marker(
        &mut self,
        handle: &MarkerHandle,
        status: &VehicleStatus,
        trip: &ActiveTrip,
    );
    fn remove_vehicle_marker(&mut self, handle: &MarkerHandle);
    fn clear_vehicle_markers(&mut self);

    fn add_pin_marker(&mut self, position: LatLng, text: &str) -> Option<MarkerHandle>;
    fn remove_pin_marker(&mut self, handle: &MarkerHandle);

    /// `None` when the path decodes to nothing
    fn create_polyline(
        &mut self,
        encoded: &str,
        options: &PolylineOptions,
    ) -> Option<PolylineHandle>;
    fn remove_polyline(&mut self, handle: &PolylineHandle);
    fn clear_all_polylines(&mut self);

    fn pan_to(&mut self, center: LatLng);
    /// Animated move where the engine supports it. `duration` falls back to
    /// the configured default.
    fn fly_to(&mut self, center: LatLng, zoom: f64, duration: Option<Duration>);
    fn set_zoom(&mut self, zoom: f64);
    fn set_center(&mut self, center: LatLng);
    fn get_center(&self) -> Option<LatLng>;
    fn get_bounding_box(&self) -> Option<LatLngBounds>;

    fn add_listener(&mut self, kind: MapEventKind, callback: EventCallback) -> ListenerId;
    fn remove_listener(&mut self, id: ListenerId) -> bool;

    fn set_theme(&mut self, theme: Theme);

    /// Closes the popup, if any
    fn cleanup_info_window(&mut self);
    /// Releases every engine object, cache and overlay node
    fn destroy(&mut self);
}

/// Stop data kept for popup wiring and next-stop names, while its marker
/// is placed
#[derive(Debug, Clone)]
struct KnownStop {
    stop: Stop,
    next: Option<StopTime>,
}

impl StopLookup for HashMap<String, KnownStop> {
    fn stop(&self, stop_id: &str) -> Option<&Stop> {
        self.get(stop_id).map(|known| &known.stop)
    }
}

fn stop_lookup<'a>(
    external: &'a Option<Arc<dyn StopLookup>>,
    known: &'a HashMap<String, KnownStop>,
) -> &'a dyn StopLookup {
    match external {
        Some(lookup) => lookup.as_ref(),
        None => known,
    }
}

pub struct TransitMap {
    config: MapConfig,
    state: ProviderState,
    backend: Box<dyn MapBackend>,
    loader: Arc<dyn EngineLoader>,
    container: Option<MapContainer>,
    markers: MarkerManager,
    overlay: OverlayLayer,
    popup: PopupManager,
    polylines: PolylineManager,
    dispatcher: ViewportDispatcher,
    events: EventManager,
    icon_resolver: Box<dyn StopIconResolver>,
    stop_lookup: Option<Arc<dyn StopLookup>>,
    stops: HashMap<String, KnownStop>,
}

impl TransitMap {
    pub fn new(config: MapConfig) -> Self {
        let backend = create_backend(&config);
        Self::with_backend(config, backend)
    }

    /// Uses a caller-built adapter instead of the one `config.backend` names
    pub fn with_backend(config: MapConfig, backend: Box<dyn MapBackend>) -> Self {
        Self {
            markers: MarkerManager::new(&config),
            dispatcher: ViewportDispatcher::new(config.reload_debounce()),
            config,
            state: ProviderState::Uninitialized,
            backend,
            loader: Arc::new(NoopLoader),
            container: None,
            overlay: OverlayLayer::new(),
            popup: PopupManager::new(),
            polylines: PolylineManager::new(),
            events: EventManager::new(),
            icon_resolver: Box::new(RouteTypeIconResolver),
            stop_lookup: None,
            stops: HashMap::default(),
        }
    }

    pub fn with_loader(mut self, loader: Arc<dyn EngineLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_icon_resolver(mut self, resolver: Box<dyn StopIconResolver>) -> Self {
        self.icon_resolver = resolver;
        self
    }

    /// Table used to name a vehicle's next stop. Without one, stops placed
    /// through this provider are used.
    pub fn with_stop_lookup(mut self, lookup: Arc<dyn StopLookup>) -> Self {
        self.stop_lookup = Some(lookup);
        self
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn state(&self) -> ProviderState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ProviderState::Ready
    }

    fn ready(&self, operation: &str) -> bool {
        if self.state == ProviderState::Ready {
            true
        } else {
            log::debug!("{} ignored, map is {:?}", operation, self.state);
            false
        }
    }

    pub fn backend(&self) -> &dyn MapBackend {
        self.backend.as_ref()
    }

    pub fn markers(&self) -> &MarkerManager {
        &self.markers
    }

    pub fn overlay(&self) -> &OverlayLayer {
        &self.overlay
    }

    pub fn popup(&self) -> &PopupManager {
        &self.popup
    }

    pub fn polylines(&self) -> &PolylineManager {
        &self.polylines
    }

    pub fn dispatcher(&self) -> &ViewportDispatcher {
        &self.dispatcher
    }

    pub fn container(&self) -> Option<&MapContainer> {
        self.container.as_ref()
    }

    /// Objects alive in the engine, markers, lines and popup included
    pub fn native_object_count(&self) -> usize {
        self.backend.native_object_count()
    }

    pub fn viewport_state(&self) -> Option<ViewportState> {
        self.is_ready().then(|| ViewportState {
            zoom: self.backend.zoom(),
            center: self.backend.center(),
            bounds: self.backend.bounds(),
            route_labels_visible: self.markers.route_labels_visible(),
        })
    }

    /// Subscribes by event name, e.g. `"zoomchange"`
    pub fn on<F>(&mut self, event_name: &str, callback: F) -> Result<ListenerId>
    where
        F: Fn(&MapEvent) + Send + Sync + 'static,
    {
        let kind = event_name.parse::<MapEventKind>()?;
        Ok(self.events.on(kind, callback))
    }

    fn emit(&self, kind: MapEventKind, position: Option<LatLng>) -> usize {
        let event = MapEvent {
            kind,
            center: self.backend.center(),
            zoom: self.backend.zoom(),
            bounds: self.backend.bounds(),
            position,
        };
        self.events.emit(&event)
    }

    /// Feeds an engine event (by its native name) through the dispatcher
    pub fn dispatch_native_event(&mut self, native_event: &str) {
        self.dispatch_native_event_at(native_event, None, Instant::now());
    }

    /// Same as [`TransitMap::dispatch_native_event`] with an explicit clock
    /// and, for clicks, the clicked position
    pub fn dispatch_native_event_at(
        &mut self,
        native_event: &str,
        position: Option<LatLng>,
        now: Instant,
    ) {
        if !self.ready("native event") {
            return;
        }
        let signal = self.backend.normalize_event(native_event);
        if signal == ViewportSignal::Ignored {
            return;
        }

        let zoom = self.backend.zoom();
        let outcome = self.dispatcher.on_signal(signal, zoom, now);

        if outcome.viewport_changed {
            self.markers.reposition(self.backend.as_ref(), &mut self.overlay);
            if outcome.zoom_changed {
                let mut surface = MarkerSurface::new(self.backend.as_mut(), &mut self.overlay);
                self.markers
                    .update_markers_route_label_visibility(&mut surface, zoom);
            }
            self.emit(MapEventKind::ViewportChange, None);
            if outcome.zoom_changed {
                self.emit(MapEventKind::ZoomChange, None);
            }
        }
        if outcome.click {
            self.emit(MapEventKind::Click, position);
        }
    }

    /// Click on the map surface
    pub fn dispatch_click(&mut self, position: LatLng) {
        self.dispatch_native_event_at("click", Some(position), Instant::now());
    }

    fn pump_native_events(&mut self) {
        let now = Instant::now();
        for native_event in self.backend.drain_native_events() {
            self.dispatch_native_event_at(&native_event, None, now);
        }
    }

    /// Fires `viewportsettled` once the debounce delay has passed since the
    /// last viewport change. Call from the host's frame loop.
    pub fn tick(&mut self) -> bool {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> bool {
        if self.state != ProviderState::Ready || !self.dispatcher.poll(now) {
            return false;
        }
        self.emit(MapEventKind::ViewportSettled, None);
        true
    }

    /// Host binding entry point for a click on a marker. Runs the marker's
    /// own callback, or opens the stop or vehicle popup.
    pub fn click_marker(&mut self, handle: &MarkerHandle) -> EventHandled {
        if !self.ready("click_marker") {
            return EventHandled::NotHandled;
        }
        let Some(marker) = self.markers.find(handle) else {
            return EventHandled::NotHandled;
        };
        if let Some(callback) = marker.on_click.clone() {
            callback(handle);
            return EventHandled::Handled;
        }

        match handle.kind() {
            MarkerKind::Stop => match self.stops.get(handle.id()).cloned() {
                Some(known) => {
                    self.open_stop_marker(&known.stop, known.next.as_ref());
                    EventHandled::Handled
                }
                None => EventHandled::NotHandled,
            },
            MarkerKind::Vehicle => {
                if self.open_vehicle_popup(handle) {
                    EventHandled::Handled
                } else {
                    EventHandled::NotHandled
                }
            }
            MarkerKind::Pin => EventHandled::NotHandled,
        }
    }

    /// Click on a stop's route label; never reaches the marker
    pub fn click_route_label(&mut self, id: &str) -> EventHandled {
        if !self.ready("click_route_label") {
            return EventHandled::NotHandled;
        }
        let mut surface = MarkerSurface::new(self.backend.as_mut(), &mut self.overlay);
        self.markers.click_route_label(&mut surface, id)
    }

    /// Opens the popup for a vehicle, showing its current data
    pub fn open_vehicle_popup(&mut self, handle: &MarkerHandle) -> bool {
        if !self.ready("open_vehicle_popup") {
            return false;
        }
        let Some((position, html)) = self.vehicle_popup(handle.id()) else {
            return false;
        };
        self.popup.open(
            self.backend.as_mut(),
            PopupEntity::Vehicle(handle.id().to_string()),
            position,
            html,
        );
        true
    }

    fn vehicle_popup(&self, vehicle_id: &str) -> Option<(LatLng, String)> {
        let marker = self.markers.vehicle(vehicle_id)?;
        let info = marker.render_state().vehicle.as_ref()?;
        Some((marker.position(), vehicle_popup_html(info, Utc::now())))
    }

    fn close_popup_for(&mut self, entity: &PopupEntity) {
        if self.popup.is_bound_to(entity) {
            self.popup.close(self.backend.as_mut());
        }
    }

    /// Removes a marker of any kind, dropping its stop data and closing a
    /// popup bound to it. Stale handles are ignored.
    fn remove_handle(&mut self, handle: &MarkerHandle) {
        let mut surface = MarkerSurface::new(self.backend.as_mut(), &mut self.overlay);
        if !self.markers.remove(&mut surface, handle) {
            return;
        }
        let entity = match handle.kind() {
            MarkerKind::Stop => {
                self.stops.remove(handle.id());
                PopupEntity::Stop(handle.id().to_string())
            }
            MarkerKind::Vehicle => PopupEntity::Vehicle(handle.id().to_string()),
            MarkerKind::Pin => return,
        };
        self.close_popup_for(&entity);
    }
}

#[async_trait]
impl MapProvider for TransitMap {
    async fn init_map(&mut self, container: MapContainer, center: LatLng) -> Result<()> {
        match self.state {
            ProviderState::Uninitialized | ProviderState::Failed => {}
            // `&mut self` rules out a load in flight, so the last one was dropped
            ProviderState::Loading => {
                log::warn!("previous init_map was abandoned, loading again");
            }
            ProviderState::Ready => {
                log::warn!("init_map called twice, keeping the existing map");
                return Ok(());
            }
            ProviderState::Destroyed => {
                return Err(MapError::Initialization(
                    "provider was destroyed".to_string(),
                ))
            }
        }
        if !center.is_valid() {
            return Err(MapError::InvalidCoordinates(format!(
                "initial center {:?}",
                center
            )));
        }

        self.state = ProviderState::Loading;
        let view = CameraView::new(center, self.config.initial_zoom);
        let limit = self.config.init_timeout();
        let loader = Arc::clone(&self.loader);

        let outcome = tokio::time::timeout(
            limit,
            self.backend.bootstrap(loader.as_ref(), &container, view),
        )
        .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.state = ProviderState::Failed;
                log::error!("{} map failed to load: {}", self.backend.kind(), e);
                return Err(e);
            }
            Err(_) => {
                self.state = ProviderState::Failed;
                log::error!("{} map did not load within {:?}", self.backend.kind(), limit);
                return Err(MapError::Timeout(limit));
            }
        }

        if !self.backend.capabilities().html_markers {
            self.overlay.attach(&container.element_id);
        }
        self.backend.drain_native_events();
        let zoom = self.backend.zoom();
        self.dispatcher.prime(zoom);
        self.state = ProviderState::Ready;
        {
            let mut surface = MarkerSurface::new(self.backend.as_mut(), &mut self.overlay);
            self.markers
                .update_markers_route_label_visibility(&mut surface, zoom);
        }
        log::info!(
            "{} map ready in #{} at {:?}, zoom {}",
            self.backend.kind(),
            container.element_id,
            center,
            zoom
        );
        self.container = Some(container);
        Ok(())
    }

    fn add_marker(&mut self, spec: MarkerSpec) -> Option<MarkerHandle> {
        if !self.ready("add_marker") {
            return None;
        }
        let mut surface = MarkerSurface::new(self.backend.as_mut(), &mut self.overlay);
        Some(self.markers.add_marker(&mut surface, spec))
    }

    fn remove_marker(&mut self, handle: &MarkerHandle) {
        if self.ready("remove_marker") {
            self.remove_handle(handle);
        }
    }

    fn highlight_marker(&mut self, id: &str) {
        if !self.ready("highlight_marker") {
            return;
        }
        let mut surface = MarkerSurface::new(self.backend.as_mut(), &mut self.overlay);
        self.markers.highlight_marker(&mut surface, id);
    }

    fn unhighlight_marker(&mut self, id: &str) {
        if !self.ready("unhighlight_marker") {
            return;
        }
        let mut surface = MarkerSurface::new(self.backend.as_mut(), &mut self.overlay);
        self.markers.unhighlight_marker(&mut surface, id);
    }

    fn add_stop_marker(
        &mut self,
        stop: &Stop,
        stop_time: Option<&StopTime>,
    ) -> Option<MarkerHandle> {
        if !self.ready("add_stop_marker") {
            return None;
        }
        self.stops.insert(
            stop.id.clone(),
            KnownStop {
                stop: stop.clone(),
                next: stop_time.cloned(),
            },
        );

        let icon = self.icon_resolver.icon_for_stop(stop);
        let mut surface = MarkerSurface::new(self.backend.as_mut(), &mut self.overlay);
        self.markers.add_stop_marker(&mut surface, stop, icon)
    }

    fn open_stop_marker(&mut self, stop: &Stop, stop_time: Option<&StopTime>) {
        if !self.ready("open_stop_marker") {
            return;
        }
        let html = stop_popup_html(stop, stop_time, Utc::now());
        self.popup.open(
            self.backend.as_mut(),
            PopupEntity::Stop(stop.id.clone()),
            stop.position,
            html,
        );
    }

    fn add_vehicle_marker(
        &mut self,
        vehicle: &VehicleStatus,
        trip: &ActiveTrip,
    ) -> Option<MarkerHandle> {
        if !self.ready("add_vehicle_marker") {
            return None;
        }
        let lookup = stop_lookup(&self.stop_lookup, &self.stops);
        let mut surface = MarkerSurface::new(self.backend.as_mut(), &mut self.overlay);
        self.markers
            .add_vehicle_marker(&mut surface, vehicle, trip, Some(lookup))
    }

    fn update_vehicle_marker(
        &mut self,
        handle: &MarkerHandle,
        status: &VehicleStatus,
        trip: &ActiveTrip,
    ) {
        if !self.ready("update_vehicle_marker") {
            return;
        }
        let lookup = stop_lookup(&self.stop_lookup, &self.stops);
        let mut surface = MarkerSurface::new(self.backend.as_mut(), &mut self.overlay);
        if !self
            .markers
            .update_vehicle_marker(&mut surface, handle, status, trip, Some(lookup))
        {
            return;
        }

        let entity = PopupEntity::Vehicle(handle.id().to_string());
        if self.popup.is_bound_to(&entity) {
            if let Some((position, html)) = self.vehicle_popup(handle.id()) {
                self.popup
                    .update(self.backend.as_mut(), &entity, position, html);
            }
        }
    }

    fn remove_vehicle_marker(&mut self, handle: &MarkerHandle) {
        if self.ready("remove_vehicle_marker") && handle.kind() == MarkerKind::Vehicle {
            self.remove_handle(handle);
        }
    }

    fn clear_vehicle_markers(&mut self) {
        if !self.ready("clear_vehicle_markers") {
            return;
        }
        let mut surface = MarkerSurface::new(self.backend.as_mut(), &mut self.overlay);
        self.markers.clear_vehicle_markers(&mut surface);
        if matches!(self.popup.bound_entity(), Some(PopupEntity::Vehicle(_))) {
            self.popup.close(self.backend.as_mut());
        }
    }

    fn add_pin_marker(&mut self, position: LatLng, text: &str) -> Option<MarkerHandle> {
        if !self.ready("add_pin_marker") {
            return None;
        }
        let mut surface = MarkerSurface::new(self.backend.as_mut(), &mut self.overlay);
        Some(self.markers.add_pin_marker(&mut surface, position, text))
    }

    fn remove_pin_marker(&mut self, handle: &MarkerHandle) {
        if self.ready("remove_pin_marker") && handle.kind() == MarkerKind::Pin {
            self.remove_handle(handle);
        }
    }

    fn create_polyline(
        &mut self,
        encoded: &str,
        options: &PolylineOptions,
    ) -> Option<PolylineHandle> {
        if !self.ready("create_polyline") {
            return None;
        }
        self.polylines.create(
            self.backend.as_mut(),
            encoded,
            options,
            &self.config.polyline,
        )
    }

    fn remove_polyline(&mut self, handle: &PolylineHandle) {
        if !self.ready("remove_polyline") {
            return;
        }
        self.polylines.remove(self.backend.as_mut(), handle);
    }

    fn clear_all_polylines(&mut self) {
        if !self.ready("clear_all_polylines") {
            return;
        }
        self.polylines.clear_all(self.backend.as_mut());
    }

    fn pan_to(&mut self, center: LatLng) {
        if !self.ready("pan_to") {
            return;
        }
        self.backend.pan_to(center);
        self.pump_native_events();
    }

    fn fly_to(&mut self, center: LatLng, zoom: f64, duration: Option<Duration>) {
        if !self.ready("fly_to") {
            return;
        }
        let duration = duration.unwrap_or_else(|| self.config.default_fly_duration());
        self.backend.fly_to(CameraView::new(center, zoom), duration);
        self.pump_native_events();
    }

    fn set_zoom(&mut self, zoom: f64) {
        if !self.ready("set_zoom") {
            return;
        }
        self.backend.set_zoom(zoom);
        self.pump_native_events();
    }

    fn set_center(&mut self, center: LatLng) {
        if !self.ready("set_center") {
            return;
        }
        let zoom = self.backend.zoom();
        self.backend.set_view(CameraView::new(center, zoom));
        self.pump_native_events();
    }

    fn get_center(&self) -> Option<LatLng> {
        self.is_ready().then(|| self.backend.center())
    }

    fn get_bounding_box(&self) -> Option<LatLngBounds> {
        self.is_ready().then(|| self.backend.bounds())
    }

    fn add_listener(&mut self, kind: MapEventKind, callback: EventCallback) -> ListenerId {
        self.events.on(kind, callback)
    }

    fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.events.off(id)
    }

    fn set_theme(&mut self, theme: Theme) {
        if self.state == ProviderState::Destroyed {
            return;
        }
        self.config.theme = theme;
        self.backend.set_theme(theme);
    }

    fn cleanup_info_window(&mut self) {
        if self.state == ProviderState::Ready {
            self.popup.close(self.backend.as_mut());
        }
    }

    fn destroy(&mut self) {
        if self.state == ProviderState::Destroyed {
            return;
        }
        if self.state == ProviderState::Ready {
            self.popup.close(self.backend.as_mut());
            let mut surface = MarkerSurface::new(self.backend.as_mut(), &mut self.overlay);
            self.markers.clear_all(&mut surface);
            self.polylines.clear_all(self.backend.as_mut());
        }
        self.backend.destroy();

        self.popup.forget();
        self.markers.forget_all();
        self.polylines.forget_all();
        self.overlay.detach();
        self.dispatcher.reset();
        self.events.clear();
        self.stops.clear();
        self.container = None;
        self.state = ProviderState::Destroyed;
        log::info!("{} map destroyed", self.backend.kind());
    }
}

/// Builds an uninitialized provider for the engine `config` selects
pub fn create_provider(config: MapConfig) -> TransitMap {
    TransitMap::new(config)
}
