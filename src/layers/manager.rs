use crate::{
    backends::MapBackend,
    core::{
        config::MapConfig,
        constants::{
            DEFAULT_STOP_COLOR, Z_INDEX_HIGHLIGHT_BOOST, Z_INDEX_PIN, Z_INDEX_STOP,
            Z_INDEX_VEHICLE,
        },
        geo::LatLng,
    },
    data::transit::{ActiveTrip, Stop, StopLookup, VehicleStatus},
    input::events::EventHandled,
    layers::{
        icon::{IconDescriptor, VehicleIconCache},
        marker::{
            BackendRef, MarkerHandle, MarkerKind, MarkerSpec, PlacedMarker, RenderState,
            VehicleInfo,
        },
        overlay::OverlayLayer,
        route_label::RouteLabel,
    },
    prelude::{Arc, HashMap},
    traits::{CacheStats, Cacheable},
};
use std::borrow::Cow;

/// The engine plus the overlay layer, borrowed for one marker operation
pub struct MarkerSurface<'a> {
    pub backend: &'a mut dyn MapBackend,
    pub overlay: &'a mut OverlayLayer,
}

impl<'a> MarkerSurface<'a> {
    pub fn new(backend: &'a mut dyn MapBackend, overlay: &'a mut OverlayLayer) -> Self {
        Self { backend, overlay }
    }

    fn place_icon(&mut self, position: LatLng, state: &RenderState) -> Option<BackendRef> {
        let icon = effective_icon(state)?;
        let handle = self
            .backend
            .add_icon_marker(position, &icon, effective_z(state));
        Some(BackendRef::Icon(handle))
    }

    /// Native HTML marker when the engine has them, overlay node otherwise
    fn place_html(&mut self, position: LatLng, html: String, z_index: i32) -> BackendRef {
        if let Some(handle) = self.backend.add_html_marker(position, &html, z_index) {
            return BackendRef::Html(handle);
        }
        let id = self.overlay.add_node(position, html, z_index);
        let backend = &*self.backend;
        self.overlay.move_node(id, position, |p| backend.project(p));
        BackendRef::Overlay(id)
    }

    /// Pushes a marker's render state to wherever it is drawn
    fn refresh(&mut self, marker: &PlacedMarker) {
        let z_index = effective_z(&marker.render_state);
        match marker.backend_ref {
            BackendRef::Icon(handle) => {
                if let Some(icon) = effective_icon(&marker.render_state) {
                    self.backend.set_marker_icon(handle, &icon, z_index);
                }
            }
            BackendRef::Html(handle) => {
                self.backend.set_marker_html(handle, &marker.html(), z_index)
            }
            BackendRef::Overlay(id) => self.overlay.update_node(id, marker.html(), z_index),
        }
    }

    fn move_to(&mut self, backend_ref: BackendRef, position: LatLng) {
        match backend_ref {
            BackendRef::Icon(handle) | BackendRef::Html(handle) => {
                self.backend.move_marker(handle, position)
            }
            BackendRef::Overlay(id) => {
                let backend = &*self.backend;
                self.overlay.move_node(id, position, |p| backend.project(p));
            }
        }
    }

    fn detach(&mut self, backend_ref: BackendRef) {
        match backend_ref {
            BackendRef::Icon(handle) | BackendRef::Html(handle) => {
                self.backend.remove_marker(handle)
            }
            BackendRef::Overlay(id) => {
                self.overlay.remove_node(id);
            }
        }
    }
}

fn effective_z(state: &RenderState) -> i32 {
    if state.highlighted {
        state.z_index + Z_INDEX_HIGHLIGHT_BOOST
    } else {
        state.z_index
    }
}

fn effective_icon(state: &RenderState) -> Option<Cow<'_, IconDescriptor>> {
    state.icon.as_ref().map(|icon| {
        if state.highlighted {
            Cow::Owned(icon.highlighted())
        } else {
            Cow::Borrowed(icon.as_ref())
        }
    })
}

/// Owns every stop, pin and vehicle marker of one provider, keyed by id
pub struct MarkerManager {
    markers: HashMap<String, PlacedMarker>,
    pins: HashMap<String, PlacedMarker>,
    vehicles: HashMap<String, PlacedMarker>,
    icon_cache: VehicleIconCache,
    route_labels_visible: bool,
    label_visibility_mutations: u64,
    route_label_zoom_threshold: f64,
    max_visible_routes: usize,
    stale_vehicle_color: String,
    next_serial: u64,
    next_pin: u64,
}

impl MarkerManager {
    pub fn new(config: &MapConfig) -> Self {
        Self {
            markers: HashMap::default(),
            pins: HashMap::default(),
            vehicles: HashMap::default(),
            icon_cache: VehicleIconCache::new(),
            route_labels_visible: false,
            label_visibility_mutations: 0,
            route_label_zoom_threshold: config.route_label_zoom_threshold,
            max_visible_routes: config.max_visible_routes,
            stale_vehicle_color: config.stale_vehicle_color.clone(),
            next_serial: 0,
            next_pin: 0,
        }
    }

    fn registry(&self, kind: MarkerKind) -> &HashMap<String, PlacedMarker> {
        match kind {
            MarkerKind::Stop => &self.markers,
            MarkerKind::Pin => &self.pins,
            MarkerKind::Vehicle => &self.vehicles,
        }
    }

    fn registry_mut(&mut self, kind: MarkerKind) -> &mut HashMap<String, PlacedMarker> {
        match kind {
            MarkerKind::Stop => &mut self.markers,
            MarkerKind::Pin => &mut self.pins,
            MarkerKind::Vehicle => &mut self.vehicles,
        }
    }

    fn allocate(&mut self, id: String, kind: MarkerKind) -> MarkerHandle {
        self.next_serial += 1;
        MarkerHandle::new(id, kind, self.next_serial)
    }

    fn route_label(&self, routes: &[String]) -> Option<RouteLabel> {
        (!routes.is_empty())
            .then(|| RouteLabel::with_max_visible(routes.to_vec(), self.max_visible_routes))
    }

    /// Places an HTML stop marker. Re-adding a live id returns the existing
    /// handle without touching the engine.
    pub fn add_marker(&mut self, surface: &mut MarkerSurface<'_>, spec: MarkerSpec) -> MarkerHandle {
        if let Some(existing) = self.markers.get(&spec.id) {
            log::debug!("marker {} already placed", spec.id);
            return existing.handle.clone();
        }

        let mut state = RenderState::new(Z_INDEX_STOP);
        state.icon = Some(Arc::new(
            spec.icon
                .unwrap_or_else(|| IconDescriptor::stop_glyph(DEFAULT_STOP_COLOR)),
        ));
        state.highlighted = spec.highlighted;
        state.route_label = self.route_label(&spec.routes);
        state.show_routes_label = self.route_labels_visible;

        let backend_ref =
            surface.place_html(spec.position, state.to_html(MarkerKind::Stop), effective_z(&state));
        let handle = self.allocate(spec.id.clone(), MarkerKind::Stop);
        self.markers.insert(
            spec.id,
            PlacedMarker::new(handle.clone(), spec.position, state, backend_ref, spec.on_click),
        );
        handle
    }

    /// Places a lightweight native icon marker for a stop
    pub fn add_stop_marker(
        &mut self,
        surface: &mut MarkerSurface<'_>,
        stop: &Stop,
        icon: IconDescriptor,
    ) -> Option<MarkerHandle> {
        if let Some(existing) = self.markers.get(&stop.id) {
            return Some(existing.handle.clone());
        }

        let mut state = RenderState::new(Z_INDEX_STOP);
        state.icon = Some(Arc::new(icon));
        state.route_label = self.route_label(&stop.route_short_names);
        state.show_routes_label = self.route_labels_visible;

        let backend_ref = surface.place_icon(stop.position, &state)?;
        let handle = self.allocate(stop.id.clone(), MarkerKind::Stop);
        self.markers.insert(
            stop.id.clone(),
            PlacedMarker::new(handle.clone(), stop.position, state, backend_ref, None),
        );
        Some(handle)
    }

    /// Detaches a marker of any kind. Stale handles (removed, or replaced by
    /// a newer marker with the same id) are ignored.
    pub fn remove(&mut self, surface: &mut MarkerSurface<'_>, handle: &MarkerHandle) -> bool {
        let registry = self.registry_mut(handle.kind());
        match registry.get(handle.id()) {
            Some(marker) if marker.handle.serial() == handle.serial() => {}
            _ => return false,
        }
        match registry.remove(handle.id()) {
            Some(marker) => {
                surface.detach(marker.backend_ref);
                true
            }
            None => false,
        }
    }

    pub fn highlight_marker(&mut self, surface: &mut MarkerSurface<'_>, id: &str) -> bool {
        self.set_highlight(surface, id, true)
    }

    pub fn unhighlight_marker(&mut self, surface: &mut MarkerSurface<'_>, id: &str) -> bool {
        self.set_highlight(surface, id, false)
    }

    fn set_highlight(&mut self, surface: &mut MarkerSurface<'_>, id: &str, on: bool) -> bool {
        let Some(marker) = self.markers.get_mut(id) else {
            return false;
        };
        let changed = marker.update_render_state(|s| s.highlighted = on);
        if changed {
            surface.refresh(marker);
        }
        changed
    }

    fn vehicle_icon(&mut self, orientation: f64, predicted: bool) -> Arc<IconDescriptor> {
        let status_color = (!predicted).then_some(self.stale_vehicle_color.as_str());
        self.icon_cache.get_icon(orientation, status_color)
    }

    fn vehicle_info(
        status: &VehicleStatus,
        trip: &ActiveTrip,
        stops: Option<&dyn StopLookup>,
    ) -> VehicleInfo {
        let next_stop_name = status
            .next_stop_id
            .as_deref()
            .and_then(|stop_id| stops.and_then(|lookup| lookup.stop(stop_id)))
            .map(|stop| stop.name.clone());

        VehicleInfo {
            vehicle_id: status.vehicle_id.clone(),
            trip_id: status.trip_id.clone(),
            route_short_name: trip.route_short_name.clone(),
            destination: trip.trip_headsign.clone(),
            next_stop_name,
            orientation: status.orientation,
            predicted: status.predicted,
            last_update_time: status.last_update_time,
        }
    }

    pub fn add_vehicle_marker(
        &mut self,
        surface: &mut MarkerSurface<'_>,
        vehicle: &VehicleStatus,
        trip: &ActiveTrip,
        stops: Option<&dyn StopLookup>,
    ) -> Option<MarkerHandle> {
        if let Some(existing) = self.vehicles.get(&vehicle.vehicle_id) {
            return Some(existing.handle.clone());
        }

        let mut state = RenderState::new(Z_INDEX_VEHICLE);
        state.icon = Some(self.vehicle_icon(vehicle.orientation, vehicle.predicted));
        state.vehicle = Some(Self::vehicle_info(vehicle, trip, stops));

        let backend_ref = surface.place_icon(vehicle.position, &state)?;
        let handle = self.allocate(vehicle.vehicle_id.clone(), MarkerKind::Vehicle);
        self.vehicles.insert(
            vehicle.vehicle_id.clone(),
            PlacedMarker::new(handle.clone(), vehicle.position, state, backend_ref, None),
        );
        log::debug!("vehicle {} placed", vehicle.vehicle_id);
        Some(handle)
    }

    /// Moves the vehicle and refreshes its data. The glyph is only looked up
    /// again when the heading or the prediction state changed.
    pub fn update_vehicle_marker(
        &mut self,
        surface: &mut MarkerSurface<'_>,
        handle: &MarkerHandle,
        status: &VehicleStatus,
        trip: &ActiveTrip,
        stops: Option<&dyn StopLookup>,
    ) -> bool {
        let previous = match self.vehicles.get(handle.id()) {
            Some(marker) if marker.handle.serial() == handle.serial() => {
                marker.render_state.vehicle.as_ref().map(|v| (v.orientation, v.predicted))
            }
            _ => return false,
        };

        let icon_stale = previous != Some((status.orientation, status.predicted));
        let new_icon = icon_stale.then(|| self.vehicle_icon(status.orientation, status.predicted));
        let info = Self::vehicle_info(status, trip, stops);

        let Some(marker) = self.vehicles.get_mut(handle.id()) else {
            return false;
        };
        if marker.position != status.position {
            marker.position = status.position;
            surface.move_to(marker.backend_ref, status.position);
        }
        let icon_changed = new_icon.is_some();
        marker.update_render_state(|s| {
            if let Some(icon) = new_icon {
                s.icon = Some(icon);
            }
            s.vehicle = Some(info);
        });
        if icon_changed {
            surface.refresh(marker);
        }
        true
    }

    pub fn clear_vehicle_markers(&mut self, surface: &mut MarkerSurface<'_>) {
        for (_, marker) in self.vehicles.drain() {
            surface.detach(marker.backend_ref);
        }
    }

    /// Places a labelled trip-planner pin
    pub fn add_pin_marker(
        &mut self,
        surface: &mut MarkerSurface<'_>,
        position: LatLng,
        text: &str,
    ) -> MarkerHandle {
        self.next_pin += 1;
        let id = format!("pin-{}", self.next_pin);

        let mut state = RenderState::new(Z_INDEX_PIN);
        state.text = Some(text.to_string());

        let backend_ref = surface.place_html(position, state.to_html(MarkerKind::Pin), Z_INDEX_PIN);
        let handle = self.allocate(id.clone(), MarkerKind::Pin);
        self.pins.insert(
            id,
            PlacedMarker::new(handle.clone(), position, state, backend_ref, None),
        );
        handle
    }

    /// Shows or hides route labels on every stop marker when `zoom` crosses
    /// the threshold. Staying on the same side touches nothing.
    pub fn update_markers_route_label_visibility(
        &mut self,
        surface: &mut MarkerSurface<'_>,
        zoom: f64,
    ) -> bool {
        let should_show = zoom >= self.route_label_zoom_threshold;
        if should_show == self.route_labels_visible {
            return false;
        }

        self.route_labels_visible = should_show;
        self.label_visibility_mutations += 1;
        log::debug!(
            "route labels {} at zoom {}",
            if should_show { "shown" } else { "hidden" },
            zoom
        );

        for marker in self.markers.values_mut() {
            let changed = marker.update_render_state(|s| s.show_routes_label = should_show);
            if changed && !matches!(marker.backend_ref, BackendRef::Icon(_)) {
                surface.refresh(marker);
            }
        }
        true
    }

    /// Click on a stop's route label. Consumed by the label; the marker's own
    /// click callback is never involved.
    pub fn click_route_label(&mut self, surface: &mut MarkerSurface<'_>, id: &str) -> EventHandled {
        let Some(marker) = self.markers.get_mut(id) else {
            return EventHandled::NotHandled;
        };
        let mut handled = EventHandled::NotHandled;
        let changed = marker.update_render_state(|s| {
            if let Some(label) = s.route_label.as_mut() {
                handled = label.click();
            }
        });
        if changed {
            surface.refresh(marker);
        }
        handled
    }

    /// Rewrites overlay positions after the camera moved
    pub fn reposition(&self, backend: &dyn MapBackend, overlay: &mut OverlayLayer) {
        if !overlay.is_empty() {
            overlay.reposition(|p| backend.project(p));
        }
    }

    pub fn find(&self, handle: &MarkerHandle) -> Option<&PlacedMarker> {
        self.registry(handle.kind())
            .get(handle.id())
            .filter(|m| m.handle.serial() == handle.serial())
    }

    pub fn marker(&self, id: &str) -> Option<&PlacedMarker> {
        self.markers.get(id)
    }

    pub fn vehicle(&self, id: &str) -> Option<&PlacedMarker> {
        self.vehicles.get(id)
    }

    pub fn pin(&self, id: &str) -> Option<&PlacedMarker> {
        self.pins.get(id)
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn pin_count(&self) -> usize {
        self.pins.len()
    }

    pub fn route_labels_visible(&self) -> bool {
        self.route_labels_visible
    }

    /// Times the label flag actually flipped
    pub fn label_visibility_mutations(&self) -> u64 {
        self.label_visibility_mutations
    }

    pub fn icon_cache_stats(&self) -> CacheStats {
        self.icon_cache.cache_stats()
    }

    /// Detaches every marker of every kind
    pub fn clear_all(&mut self, surface: &mut MarkerSurface<'_>) {
        let placed = self
            .markers
            .drain()
            .chain(self.pins.drain())
            .chain(self.vehicles.drain());
        for (_, marker) in placed {
            surface.detach(marker.backend_ref);
        }
    }

    /// Drops all registries and cached glyphs without touching the engine
    pub(crate) fn forget_all(&mut self) {
        self.markers.clear();
        self.pins.clear();
        self.vehicles.clear();
        self.icon_cache.clear_cache();
        self.route_labels_visible = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backends::{ArcGisBackend, LeafletBackend, MapContainer, NoopLoader},
        core::{camera::CameraView, config::BackendKind},
    };
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn bootstrapped(kind: BackendKind) -> Box<dyn MapBackend> {
        let config = MapConfig::default().with_backend(kind);
        let mut backend: Box<dyn MapBackend> = match kind {
            BackendKind::ArcGis => Box::new(ArcGisBackend::new(&config)),
            _ => Box::new(LeafletBackend::new(&config)),
        };
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

    fn vehicle(orientation: f64, position: LatLng) -> VehicleStatus {
        VehicleStatus {
            vehicle_id: "V1".into(),
            trip_id: "T1".into(),
            position,
            orientation,
            predicted: true,
            last_update_time: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            next_stop_id: None,
        }
    }

    fn trip() -> ActiveTrip {
        ActiveTrip {
            trip_id: "T1".into(),
            route_short_name: "8".into(),
            trip_headsign: Some("Capitol Hill".into()),
        }
    }

    #[tokio::test]
    async fn test_add_marker_is_idempotent() {
        let mut backend = bootstrapped(BackendKind::Leaflet).await;
        let mut overlay = OverlayLayer::new();
        let mut manager = MarkerManager::new(&MapConfig::default());
        let mut surface = MarkerSurface::new(backend.as_mut(), &mut overlay);

        let first = manager.add_marker(&mut surface, MarkerSpec::new("1_100", LatLng::new(47.6, -122.3)));
        let second = manager.add_marker(&mut surface, MarkerSpec::new("1_100", LatLng::new(47.7, -122.4)));

        assert_eq!(first, second);
        assert_eq!(first.serial(), second.serial());
        assert_eq!(surface.backend.native_object_count(), 1);
        assert_eq!(manager.marker("1_100").unwrap().position(), LatLng::new(47.6, -122.3));
    }

    #[tokio::test]
    async fn test_route_label_hysteresis() {
        let mut backend = bootstrapped(BackendKind::Leaflet).await;
        let mut overlay = OverlayLayer::new();
        let mut manager = MarkerManager::new(&MapConfig::default());
        let mut surface = MarkerSurface::new(backend.as_mut(), &mut overlay);
        manager.add_marker(
            &mut surface,
            MarkerSpec::new("1_100", LatLng::new(47.6, -122.3)).with_routes(["8", "43"]),
        );

        let flips: Vec<bool> = [14.0, 15.0, 16.0, 17.0, 16.0, 15.0]
            .into_iter()
            .map(|zoom| manager.update_markers_route_label_visibility(&mut surface, zoom))
            .collect();

        assert_eq!(flips, vec![false, false, true, false, false, true]);
        assert_eq!(manager.label_visibility_mutations(), 2);
        assert!(!manager.route_labels_visible());
    }

    #[tokio::test]
    async fn test_labels_follow_visibility_flag() {
        let mut backend = bootstrapped(BackendKind::Leaflet).await;
        let mut overlay = OverlayLayer::new();
        let mut manager = MarkerManager::new(&MapConfig::default());
        let mut surface = MarkerSurface::new(backend.as_mut(), &mut overlay);
        manager.add_marker(
            &mut surface,
            MarkerSpec::new("1_100", LatLng::new(47.6, -122.3)).with_routes(["8"]),
        );

        manager.update_markers_route_label_visibility(&mut surface, 16.5);
        let marker = manager.marker("1_100").unwrap();
        assert!(marker.render_state().show_routes_label);
        assert!(marker.html().contains("route-label"));

        // markers placed afterwards pick up the current flag
        manager.add_marker(
            &mut surface,
            MarkerSpec::new("1_200", LatLng::new(47.61, -122.3)).with_routes(["10"]),
        );
        assert!(manager.marker("1_200").unwrap().render_state().show_routes_label);
    }

    #[tokio::test]
    async fn test_vehicle_icon_only_recomputed_on_change() {
        let mut backend = bootstrapped(BackendKind::Leaflet).await;
        let mut overlay = OverlayLayer::new();
        let mut manager = MarkerManager::new(&MapConfig::default());
        let mut surface = MarkerSurface::new(backend.as_mut(), &mut overlay);

        let start = LatLng::new(47.60, -122.33);
        let handle = manager
            .add_vehicle_marker(&mut surface, &vehicle(90.0, start), &trip(), None)
            .unwrap();
        let stats = manager.icon_cache_stats();
        assert_eq!((stats.hits, stats.misses), (0, 1));

        assert!(manager.update_vehicle_marker(&mut surface, &handle, &vehicle(90.0, start), &trip(), None));
        let stats = manager.icon_cache_stats();
        assert_eq!((stats.hits, stats.misses), (0, 1));

        let moved = LatLng::new(47.61, -122.33);
        assert!(manager.update_vehicle_marker(&mut surface, &handle, &vehicle(180.0, moved), &trip(), None));
        let stats = manager.icon_cache_stats();
        assert_eq!(stats.misses, 2);
        assert_eq!(manager.vehicle("V1").unwrap().position(), moved);
        assert!(manager.vehicle("V1").unwrap().render_state().icon.as_ref().unwrap().svg.contains("rotate(180"));
    }

    #[tokio::test]
    async fn test_vehicle_info_resolves_next_stop() {
        let mut backend = bootstrapped(BackendKind::Leaflet).await;
        let mut overlay = OverlayLayer::new();
        let mut manager = MarkerManager::new(&MapConfig::default());
        let mut surface = MarkerSurface::new(backend.as_mut(), &mut overlay);

        let mut stops = HashMap::default();
        stops.insert(
            "1_100".to_string(),
            Stop::new("1_100", "Pine St & 3rd Ave", LatLng::new(47.61, -122.34)),
        );
        let mut status = vehicle(0.0, LatLng::new(47.6, -122.33));
        status.next_stop_id = Some("1_100".into());
        status.predicted = false;

        manager.add_vehicle_marker(&mut surface, &status, &trip(), Some(&stops));
        let info = manager.vehicle("V1").unwrap().render_state().vehicle.clone().unwrap();
        assert_eq!(info.next_stop_name.as_deref(), Some("Pine St & 3rd Ave"));
        assert_eq!(info.destination.as_deref(), Some("Capitol Hill"));
        assert!(!info.predicted);
    }

    #[tokio::test]
    async fn test_stale_handles_are_ignored() {
        let mut backend = bootstrapped(BackendKind::Leaflet).await;
        let mut overlay = OverlayLayer::new();
        let mut manager = MarkerManager::new(&MapConfig::default());
        let mut surface = MarkerSurface::new(backend.as_mut(), &mut overlay);

        let old = manager.add_marker(&mut surface, MarkerSpec::new("1_100", LatLng::new(47.6, -122.3)));
        assert!(manager.remove(&mut surface, &old));
        assert!(!manager.remove(&mut surface, &old));

        let fresh = manager.add_marker(&mut surface, MarkerSpec::new("1_100", LatLng::new(47.6, -122.3)));
        assert_ne!(old.serial(), fresh.serial());
        assert!(!manager.remove(&mut surface, &old));
        assert!(manager.find(&fresh).is_some());
        assert!(!manager.highlight_marker(&mut surface, "missing"));
    }

    #[tokio::test]
    async fn test_highlight_swaps_icon_and_z_order() {
        let mut backend = bootstrapped(BackendKind::Leaflet).await;
        let mut overlay = OverlayLayer::new();
        let mut manager = MarkerManager::new(&MapConfig::default());
        let mut surface = MarkerSurface::new(backend.as_mut(), &mut overlay);

        let stop = Stop::new("1_100", "Pine St", LatLng::new(47.6, -122.3));
        manager.add_stop_marker(&mut surface, &stop, IconDescriptor::stop_glyph("#000000"));

        assert!(manager.highlight_marker(&mut surface, "1_100"));
        assert!(!manager.highlight_marker(&mut surface, "1_100"));
        let state = manager.marker("1_100").unwrap().render_state().clone();
        assert_eq!(effective_z(&state), Z_INDEX_STOP + Z_INDEX_HIGHLIGHT_BOOST);
        assert_eq!(effective_icon(&state).unwrap().size, (32, 32));

        assert!(manager.unhighlight_marker(&mut surface, "1_100"));
        let state = manager.marker("1_100").unwrap().render_state().clone();
        assert_eq!(effective_icon(&state).unwrap().size, (24, 24));
    }

    #[tokio::test]
    async fn test_arcgis_markers_use_overlay() {
        let mut backend = bootstrapped(BackendKind::ArcGis).await;
        let mut overlay = OverlayLayer::new();
        let mut manager = MarkerManager::new(&MapConfig::default());
        let mut surface = MarkerSurface::new(backend.as_mut(), &mut overlay);

        manager.add_marker(&mut surface, MarkerSpec::new("1_100", LatLng::new(47.6, -122.33)));
        let pin = manager.add_pin_marker(&mut surface, LatLng::new(47.601, -122.33), "Start");
        assert_eq!(surface.overlay.len(), 2);
        assert_eq!(surface.backend.native_object_count(), 0);

        let node = surface.overlay.nodes().next().unwrap();
        assert!(node.visible);

        assert!(manager.remove(&mut surface, &pin));
        assert_eq!(surface.overlay.len(), 1);
    }

    #[tokio::test]
    async fn test_route_label_click_contained() {
        let mut backend = bootstrapped(BackendKind::Leaflet).await;
        let mut overlay = OverlayLayer::new();
        let mut manager = MarkerManager::new(&MapConfig::default());
        let mut surface = MarkerSurface::new(backend.as_mut(), &mut overlay);

        let clicks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&clicks);
        manager.add_marker(
            &mut surface,
            MarkerSpec::new("1_100", LatLng::new(47.6, -122.3))
                .with_routes(["8", "10", "11", "43", "49"])
                .on_click(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
        );

        let label = manager.marker("1_100").unwrap().render_state().route_label.clone().unwrap();
        assert_eq!(label.visible_routes().len(), 3);
        assert_eq!(label.overflow_badge().as_deref(), Some("+2"));

        assert_eq!(manager.click_route_label(&mut surface, "1_100"), EventHandled::Handled);
        let label = manager.marker("1_100").unwrap().render_state().route_label.clone().unwrap();
        assert_eq!(label.visible_routes().len(), 5);
        assert_eq!(clicks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_clear_all_detaches_everything() {
        let mut backend = bootstrapped(BackendKind::Leaflet).await;
        let mut overlay = OverlayLayer::new();
        let mut manager = MarkerManager::new(&MapConfig::default());
        let mut surface = MarkerSurface::new(backend.as_mut(), &mut overlay);

        manager.add_marker(&mut surface, MarkerSpec::new("1_100", LatLng::new(47.6, -122.3)));
        manager.add_pin_marker(&mut surface, LatLng::new(47.6, -122.31), "End");
        manager.add_vehicle_marker(&mut surface, &vehicle(0.0, LatLng::new(47.6, -122.32)), &trip(), None);
        assert_eq!(surface.backend.native_object_count(), 3);

        manager.clear_all(&mut surface);
        assert_eq!(surface.backend.native_object_count(), 0);
        assert_eq!(manager.marker_count() + manager.pin_count() + manager.vehicle_count(), 0);
    }
}
