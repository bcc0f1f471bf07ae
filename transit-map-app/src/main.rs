use anyhow::{Context, Result};
use chrono::Utc;
use transit_map::{
    create_provider, ActiveTrip, LatLng, MapConfig, MapContainer, MapProvider, PolylineOptions,
    Stop, VehicleStatus,
};

/// Sample encoded route shape
const ROUTE_SHAPE: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";

fn load_config() -> Result<MapConfig> {
    match std::env::args().nth(1) {
        Some(path) => MapConfig::from_json_file(&path)
            .with_context(|| format!("failed to load map config from {path}")),
        None => Ok(MapConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = load_config()?;
    log::info!("starting {} provider", config.backend);

    let mut map = create_provider(config);
    map.on("viewportsettled", |event| {
        log::info!("viewport settled at {:?}, zoom {}", event.center, event.zoom);
    })?;

    let center = LatLng::new(47.6062, -122.3321);
    map.init_map(MapContainer::new("map", 1024.0, 768.0), center)
        .await
        .context("map engine failed to initialise")?;

    let stops = [
        Stop::new("1_100", "Pine St & 3rd Ave", LatLng::new(47.6108, -122.3379))
            .with_code("100")
            .with_routes(["8", "10", "43", "49", "60"]),
        Stop::new("1_200", "Denny Way & Stewart St", LatLng::new(47.6180, -122.3344))
            .with_routes(["8"]),
    ];
    for stop in &stops {
        map.add_stop_marker(stop, None);
    }

    let vehicle = VehicleStatus {
        vehicle_id: "1_4321".to_string(),
        trip_id: "1_T8".to_string(),
        position: LatLng::new(47.6140, -122.3360),
        orientation: 35.0,
        predicted: true,
        last_update_time: Utc::now(),
        next_stop_id: Some("1_200".to_string()),
    };
    let trip = ActiveTrip {
        trip_id: "1_T8".to_string(),
        route_short_name: "8".to_string(),
        trip_headsign: Some("Capitol Hill".to_string()),
    };
    if let Some(handle) = map.add_vehicle_marker(&vehicle, &trip) {
        map.open_vehicle_popup(&handle);
    }

    map.create_polyline(ROUTE_SHAPE, &PolylineOptions::default().color("#E03A3E").with_arrow());
    map.fly_to(LatLng::new(47.6145, -122.3360), 16.0, None);

    let debounce = map.config().reload_debounce();
    tokio::time::sleep(debounce).await;
    map.tick();

    if let Some(state) = map.viewport_state() {
        println!("{}", serde_json::to_string_pretty(&state)?);
    }
    log::info!(
        "{} markers, {} vehicles, {} polylines, {} native objects",
        map.markers().marker_count(),
        map.markers().vehicle_count(),
        map.polylines().len(),
        map.native_object_count()
    );

    map.destroy();
    Ok(())
}
