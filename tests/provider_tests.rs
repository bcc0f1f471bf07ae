use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use transit_map::{
    create_provider, ActiveTrip, BackendKind, EngineLoader, EventHandled, LatLng, MapConfig,
    MapContainer, MapError, MapProvider, MarkerSpec, PolylineOptions, ProviderState, Stop,
    StopTime, TransitMap, VehicleStatus,
};

/// End-to-end scenarios driven through the public provider contract
#[cfg(test)]
mod provider_tests {
    use super::*;
    use instant::Instant;
    use transit_map::ui::PopupEntity;

    const SEATTLE: LatLng = LatLng {
        lat: 47.60,
        lng: -122.33,
    };

    fn config(kind: BackendKind) -> MapConfig {
        MapConfig {
            google_api_key: Some("test-key".to_string()),
            ..MapConfig::default().with_backend(kind)
        }
    }

    async fn ready_map(kind: BackendKind) -> TransitMap {
        let mut map = create_provider(config(kind));
        map.init_map(MapContainer::new("map", 800.0, 600.0), SEATTLE)
            .await
            .expect("map should initialise");
        assert_eq!(map.state(), ProviderState::Ready);
        map
    }

    fn vehicle(orientation: f64, predicted: bool) -> VehicleStatus {
        VehicleStatus {
            vehicle_id: "V1".to_string(),
            trip_id: "T1".to_string(),
            position: SEATTLE,
            orientation,
            predicted,
            last_update_time: Utc::now(),
            next_stop_id: Some("1_100".to_string()),
        }
    }

    fn trip() -> ActiveTrip {
        ActiveTrip {
            trip_id: "T1".to_string(),
            route_short_name: "8".to_string(),
            trip_headsign: Some("Capitol Hill".to_string()),
        }
    }

    struct FailingLoader;

    #[async_trait]
    impl EngineLoader for FailingLoader {
        async fn load_script(&self, url: &str) -> transit_map::Result<()> {
            Err(MapError::Backend(format!("blocked {url}")))
        }
    }

    struct HangingLoader;

    #[async_trait]
    impl EngineLoader for HangingLoader {
        async fn load_script(&self, _url: &str) -> transit_map::Result<()> {
            futures::future::pending::<()>().await;
            Ok(())
        }
    }

    /// Fails the first script load by never finishing it
    #[derive(Default)]
    struct HangOnceLoader {
        scripts: AtomicUsize,
    }

    #[async_trait]
    impl EngineLoader for HangOnceLoader {
        async fn load_script(&self, _url: &str) -> transit_map::Result<()> {
            if self.scripts.fetch_add(1, Ordering::SeqCst) == 0 {
                futures::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    /// Keeps the text of every error record
    struct ErrorLog(Mutex<Vec<String>>);

    impl log::Log for ErrorLog {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            metadata.level() <= log::Level::Error
        }

        fn log(&self, record: &log::Record) {
            if self.enabled(record.metadata()) {
                if let Ok(mut lines) = self.0.lock() {
                    lines.push(record.args().to_string());
                }
            }
        }

        fn flush(&self) {}
    }

    static ERRORS: ErrorLog = ErrorLog(Mutex::new(Vec::new()));

    fn capture_errors() {
        // the first test to get here installs the logger
        if log::set_logger(&ERRORS).is_ok() {
            log::set_max_level(log::LevelFilter::Error);
        }
    }

    fn error_logged(fragment: &str) -> bool {
        ERRORS
            .0
            .lock()
            .map(|lines| lines.iter().any(|line| line.contains(fragment)))
            .unwrap_or(false)
    }

    /// Adding the same id twice keeps a single native marker
    #[tokio::test]
    async fn test_add_marker_is_idempotent() {
        for kind in [BackendKind::Leaflet, BackendKind::Google, BackendKind::ArcGis] {
            let mut map = ready_map(kind).await;
            let first = map
                .add_marker(MarkerSpec::new("1_100", SEATTLE).with_routes(["8"]))
                .unwrap();
            let objects = map.native_object_count();
            let second = map
                .add_marker(MarkerSpec::new("1_100", SEATTLE).with_routes(["8"]))
                .unwrap();

            assert_eq!(first, second, "{kind}");
            assert_eq!(map.native_object_count(), objects, "{kind}");
            assert_eq!(map.markers().marker_count(), 1);
        }
    }

    /// Route labels only flip when the zoom crosses the threshold
    #[tokio::test]
    async fn test_route_label_visibility_hysteresis() {
        let mut map = ready_map(BackendKind::Leaflet).await;
        map.add_marker(MarkerSpec::new("1_100", SEATTLE).with_routes(["8", "43"]));

        for zoom in [14.0, 15.0, 16.0, 17.0, 16.0, 15.0] {
            map.set_zoom(zoom);
        }

        assert_eq!(map.markers().label_visibility_mutations(), 2);
        assert!(!map.markers().route_labels_visible());
        let marker = map.markers().marker("1_100").unwrap();
        assert!(!marker.render_state().show_routes_label);
    }

    /// Opening a second stop replaces the popup instead of stacking one
    #[tokio::test]
    async fn test_single_popup_instance() {
        let mut map = ready_map(BackendKind::Google).await;
        let first = Stop::new("1_100", "Pine St & 3rd Ave", SEATTLE);
        let second = Stop::new("1_200", "Pike St & 4th Ave", LatLng::new(47.61, -122.34));
        let arrival = StopTime {
            trip_id: "T1".to_string(),
            route_short_name: "8".to_string(),
            headsign: None,
            scheduled_arrival: Utc::now() + ChronoDuration::minutes(4),
            predicted_arrival: None,
        };

        map.open_stop_marker(&first, Some(&arrival));
        let baseline = map.native_object_count();
        map.open_stop_marker(&second, None);
        map.open_stop_marker(&second, None);

        assert_eq!(map.native_object_count(), baseline);
        assert_eq!(map.popup().live_content_count(), 1);
        assert!(map
            .popup()
            .is_bound_to(&PopupEntity::Stop("1_200".to_string())));
    }

    /// Vehicle glyphs are cached per heading and prediction state
    #[tokio::test]
    async fn test_vehicle_icon_recomputed_only_on_change() {
        let mut map = ready_map(BackendKind::Leaflet).await;
        let handle = map.add_vehicle_marker(&vehicle(90.0, true), &trip()).unwrap();
        assert_eq!(map.markers().icon_cache_stats().misses, 1);

        let mut moved = vehicle(90.0, true);
        moved.position = LatLng::new(47.601, -122.33);
        map.update_vehicle_marker(&handle, &moved, &trip());
        assert_eq!(map.markers().icon_cache_stats().lookups(), 1);

        let mut turned = moved.clone();
        turned.orientation = 180.0;
        turned.position = LatLng::new(47.602, -122.33);
        map.update_vehicle_marker(&handle, &turned, &trip());

        let stats = map.markers().icon_cache_stats();
        assert_eq!(stats.misses, 2);
        let marker = map.markers().vehicle("V1").unwrap();
        assert_eq!(marker.position(), LatLng::new(47.602, -122.33));
        assert_eq!(
            marker.render_state().vehicle.as_ref().map(|v| v.orientation),
            Some(180.0)
        );

        // a second vehicle with the first heading reuses the glyph
        let mut other = vehicle(90.0, true);
        other.vehicle_id = "V2".to_string();
        map.add_vehicle_marker(&other, &trip());
        assert_eq!(map.markers().icon_cache_stats().hits, 1);
    }

    /// The next stop is named from stops placed on the same map
    #[tokio::test]
    async fn test_vehicle_next_stop_from_placed_stops() {
        let mut map = ready_map(BackendKind::ArcGis).await;
        map.add_stop_marker(&Stop::new("1_100", "Pine St & 3rd Ave", SEATTLE), None);
        let handle = map.add_vehicle_marker(&vehicle(0.0, false), &trip()).unwrap();

        let info = map
            .markers()
            .vehicle("V1")
            .and_then(|m| m.render_state().vehicle.clone())
            .unwrap();
        assert_eq!(info.next_stop_name.as_deref(), Some("Pine St & 3rd Ave"));
        assert!(!info.predicted);

        assert!(map.open_vehicle_popup(&handle));
        map.remove_vehicle_marker(&handle);
        assert!(!map.popup().is_open());
    }

    /// An open vehicle popup follows later position and trip updates
    #[tokio::test]
    async fn test_open_vehicle_popup_tracks_updates() {
        let mut map = ready_map(BackendKind::Leaflet).await;
        let handle = map.add_vehicle_marker(&vehicle(0.0, true), &trip()).unwrap();
        assert!(map.open_vehicle_popup(&handle));
        let serial = map.popup().state().map(|s| s.content().serial()).unwrap();

        let mut moved = vehicle(0.0, true);
        moved.position = LatLng::new(47.61, -122.33);
        let rerouted = ActiveTrip {
            trip_headsign: Some("Bdest".to_string()),
            ..trip()
        };
        map.update_vehicle_marker(&handle, &moved, &rerouted);

        let state = map.popup().state().unwrap();
        assert!(state.content().html().contains("Bdest"));
        assert_eq!(state.position(), LatLng::new(47.61, -122.33));
        assert_eq!(state.content().revision(), 1);
        assert_eq!(state.content().serial(), serial);
        assert_eq!(map.popup().live_content_count(), 1);
    }

    /// Removing a stop forgets its data; a later marker with the same id
    /// does not resurrect it
    #[tokio::test]
    async fn test_removed_stop_data_is_dropped() {
        let mut map = ready_map(BackendKind::Google).await;
        let old = map
            .add_stop_marker(&Stop::new("1_100", "Old Name", SEATTLE), None)
            .unwrap();
        assert_eq!(map.click_marker(&old), EventHandled::Handled);
        assert!(map.popup().is_open());

        map.remove_marker(&old);
        assert!(!map.popup().is_open());

        let replacement = map.add_marker(MarkerSpec::new("1_100", SEATTLE)).unwrap();
        assert_eq!(map.click_marker(&replacement), EventHandled::NotHandled);
        assert!(!map.popup().is_open());

        map.add_vehicle_marker(&vehicle(0.0, true), &trip());
        let info = map
            .markers()
            .vehicle("V1")
            .and_then(|m| m.render_state().vehicle.clone())
            .unwrap();
        assert!(info.next_stop_name.is_none());
    }

    /// The generic remove closes a popup bound to a vehicle
    #[tokio::test]
    async fn test_remove_marker_closes_vehicle_popup() {
        let mut map = ready_map(BackendKind::ArcGis).await;
        let handle = map.add_vehicle_marker(&vehicle(0.0, true), &trip()).unwrap();
        assert!(map.open_vehicle_popup(&handle));

        map.remove_marker(&handle);
        assert!(!map.popup().is_open());
        assert_eq!(map.popup().live_content_count(), 0);
        assert_eq!(map.markers().vehicle_count(), 0);
    }

    /// Five routes collapse to three plus a badge; label clicks never reach
    /// the marker
    #[tokio::test]
    async fn test_route_label_overflow_and_click() {
        let mut map = ready_map(BackendKind::Leaflet).await;
        let marker_clicks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&marker_clicks);
        let handle = map
            .add_marker(
                MarkerSpec::new("1_100", SEATTLE)
                    .with_routes(["8", "10", "43", "49", "60"])
                    .on_click(move |_| {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }),
            )
            .unwrap();
        map.set_zoom(17.0);

        let label = map
            .markers()
            .marker("1_100")
            .and_then(|m| m.render_state().route_label.clone())
            .unwrap();
        assert_eq!(label.visible_routes(), ["8", "10", "43"]);
        assert_eq!(label.overflow_badge().as_deref(), Some("+2"));

        assert_eq!(map.click_route_label("1_100"), EventHandled::Handled);
        assert_eq!(marker_clicks.load(Ordering::SeqCst), 0);
        let label = map
            .markers()
            .marker("1_100")
            .and_then(|m| m.render_state().route_label.clone())
            .unwrap();
        assert!(label.is_expanded());
        assert_eq!(label.visible_routes().len(), 5);

        assert_eq!(map.click_marker(&handle), EventHandled::Handled);
        assert_eq!(marker_clicks.load(Ordering::SeqCst), 1);
    }

    /// Paths that decode to nothing create nothing
    #[tokio::test]
    async fn test_empty_polyline_is_rejected() {
        capture_errors();
        let mut map = ready_map(BackendKind::Google).await;
        assert!(map.create_polyline("", &PolylineOptions::default()).is_none());
        assert_eq!(map.polylines().len(), 0);
        assert!(error_logged("not rendering polyline"));

        let damaged = "~~~~~~~~~~~~^".repeat(4);
        assert!(map.create_polyline(&damaged, &PolylineOptions::default()).is_none());
        assert_eq!(map.polylines().len(), 0);

        let line = map
            .create_polyline("_p~iF~ps|U_ulLnnqC_mqNvxq`@", &PolylineOptions::default().with_arrow())
            .unwrap();
        assert_eq!(line.path().len(), 3);
        assert!(line.has_arrows());
        map.remove_polyline(&line);
        map.remove_polyline(&line);
        assert!(map.polylines().is_empty());
    }

    /// Everything before init is ignored without panicking
    #[tokio::test]
    async fn test_calls_before_init_are_ignored() {
        let mut map = create_provider(MapConfig::default());
        assert!(map.add_pin_marker(SEATTLE, "Start").is_none());
        assert!(map.add_vehicle_marker(&vehicle(0.0, true), &trip()).is_none());
        map.open_stop_marker(&Stop::new("1_100", "Pine St", SEATTLE), None);
        map.clear_vehicle_markers();
        map.clear_all_polylines();
        map.cleanup_info_window();
        assert!(map.viewport_state().is_none());
        assert!(!map.tick());
        assert_eq!(map.native_object_count(), 0);
    }

    /// A loader error leaves the provider failed
    #[tokio::test]
    async fn test_init_failure_sets_failed_state() {
        let mut map = create_provider(MapConfig::default()).with_loader(Arc::new(FailingLoader));
        let result = map
            .init_map(MapContainer::new("map", 800.0, 600.0), SEATTLE)
            .await;

        assert!(matches!(result, Err(MapError::Backend(_))));
        assert_eq!(map.state(), ProviderState::Failed);
        assert!(map.add_marker(MarkerSpec::new("1_100", SEATTLE)).is_none());
    }

    /// An engine that never loads times out
    #[tokio::test(start_paused = true)]
    async fn test_init_timeout() {
        let config = MapConfig {
            init_timeout_ms: 50,
            ..config(BackendKind::ArcGis)
        };
        let mut map = create_provider(config).with_loader(Arc::new(HangingLoader));
        let result = map
            .init_map(MapContainer::new("map", 800.0, 600.0), SEATTLE)
            .await;

        assert!(matches!(result, Err(MapError::Timeout(limit)) if limit == Duration::from_millis(50)));
        assert_eq!(map.state(), ProviderState::Failed);
    }

    /// A dropped load leaves the provider loading; the next call retries it
    #[tokio::test(start_paused = true)]
    async fn test_abandoned_init_can_be_retried() {
        let mut map = create_provider(config(BackendKind::Leaflet))
            .with_loader(Arc::new(HangOnceLoader::default()));
        let container = MapContainer::new("map", 800.0, 600.0);

        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            map.init_map(container.clone(), SEATTLE),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(map.state(), ProviderState::Loading);

        map.init_map(container, SEATTLE).await.unwrap();
        assert_eq!(map.state(), ProviderState::Ready);
        assert!(map.add_pin_marker(SEATTLE, "Start").is_some());
    }

    /// Google refuses to load without an API key
    #[tokio::test]
    async fn test_google_requires_api_key() {
        let mut map = create_provider(MapConfig::default().with_backend(BackendKind::Google));
        let result = map
            .init_map(MapContainer::new("map", 800.0, 600.0), SEATTLE)
            .await;
        assert!(matches!(result, Err(MapError::Initialization(_))));
        assert_eq!(map.state(), ProviderState::Failed);
    }

    /// A burst of moves settles once after the quiet period
    #[tokio::test]
    async fn test_viewport_settles_after_debounce() {
        let mut map = ready_map(BackendKind::Google).await;
        let settled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&settled);
        map.on("viewportsettled", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        let start = Instant::now();
        for step in 0..5u64 {
            map.dispatch_native_event_at("idle", None, start + Duration::from_millis(step * 50));
        }
        // ignored names do not re-arm the timer
        map.dispatch_native_event_at("bounds_changed", None, start + Duration::from_millis(300));

        assert!(!map.tick_at(start + Duration::from_millis(300)));
        assert!(map.tick_at(start + Duration::from_millis(350)));
        assert!(!map.tick_at(start + Duration::from_millis(1000)));
        assert_eq!(settled.load(Ordering::SeqCst), 1);
    }

    /// Overlay nodes follow the ArcGIS camera
    #[tokio::test]
    async fn test_arcgis_overlay_follows_camera() {
        let mut map = ready_map(BackendKind::ArcGis).await;
        map.add_pin_marker(SEATTLE, "Start").unwrap();
        assert_eq!(map.overlay().len(), 1);
        let before = map.overlay().nodes().next().and_then(|n| n.translate).unwrap();

        map.pan_to(LatLng::new(47.61, -122.33));

        let after = map.overlay().nodes().next().and_then(|n| n.translate).unwrap();
        assert!(after.y > before.y, "panning north moves the pin down");
        assert!(map.overlay().reposition_passes() >= 1);
    }

    /// Fly-to falls back to the configured duration
    #[tokio::test]
    async fn test_fly_to_moves_camera() {
        let mut map = ready_map(BackendKind::Leaflet).await;
        let target = LatLng::new(47.62, -122.35);
        map.fly_to(target, 17.0, None);

        assert_eq!(map.get_center(), Some(target));
        let state = map.viewport_state().unwrap();
        assert_eq!(state.zoom, 17.0);
        assert!(state.route_labels_visible);
        let transition = map.backend().last_transition().unwrap();
        assert_eq!(transition.duration, Duration::from_millis(1500));
    }

    /// Destroy releases native objects and ends the lifecycle
    #[tokio::test]
    async fn test_destroy_is_final() {
        let mut map = ready_map(BackendKind::Leaflet).await;
        map.add_stop_marker(&Stop::new("1_100", "Pine St", SEATTLE), None);
        map.add_vehicle_marker(&vehicle(45.0, true), &trip());
        map.add_pin_marker(SEATTLE, "End");
        map.open_stop_marker(&Stop::new("1_100", "Pine St", SEATTLE), None);

        map.destroy();
        map.destroy();
        assert_eq!(map.state(), ProviderState::Destroyed);
        assert_eq!(map.native_object_count(), 0);
        assert_eq!(map.markers().vehicle_count(), 0);
        assert!(map.get_center().is_none());
    }
}
