//! Engine-wide defaults in one place so the backends and managers agree on them.

/// Default square tile size in pixels.
pub const TILE_SIZE: u32 = 256;

/// Highest zoom any backend is asked to display.
pub const MAX_ZOOM: f64 = 22.0;

/// Zoom at and above which stop markers show their route labels.
pub const DEFAULT_ROUTE_LABEL_ZOOM: f64 = 16.0;

/// Quiet period before a burst of viewport events is reported as settled.
pub const DEFAULT_RELOAD_DEBOUNCE_MS: u64 = 150;

/// Distance between direction arrows drawn along a polyline.
pub const DEFAULT_ARROW_SPACING_PX: f64 = 50.0;

/// Route short-names shown on a collapsed route label.
pub const MAX_VISIBLE_ROUTES: usize = 3;

/// Initial zoom used by `init_map`.
pub const DEFAULT_INITIAL_ZOOM: f64 = 15.0;

/// Default duration of a fly-to animation.
pub const DEFAULT_FLY_DURATION_MS: u64 = 1500;

/// How long `init_map` waits for the engine before giving up.
pub const DEFAULT_INIT_TIMEOUT_MS: u64 = 10_000;

/// Vehicle glyph size and hot-spot in pixels.
pub const VEHICLE_ICON_SIZE: (u32, u32) = (40, 40);
pub const VEHICLE_ICON_ANCHOR: (u32, u32) = (20, 20);

/// Stop icon size and the enlarged variant used while highlighted.
pub const STOP_ICON_SIZE: (u32, u32) = (24, 24);
pub const STOP_ICON_SIZE_HIGHLIGHTED: (u32, u32) = (32, 32);

/// Fill of the stop glyph when no route-type icon is supplied.
pub const DEFAULT_STOP_COLOR: &str = "#0D6EFD";

/// Tint used for vehicles with live predictions.
pub const DEFAULT_VEHICLE_COLOR: &str = "#0D6EFD";

/// Tint used for vehicles that only report scheduled positions.
pub const DEFAULT_STALE_VEHICLE_COLOR: &str = "#8C8C8C";

/// Z-order bands, higher draws on top.
pub const Z_INDEX_STOP: i32 = 100;
pub const Z_INDEX_PIN: i32 = 200;
pub const Z_INDEX_VEHICLE: i32 = 300;
pub const Z_INDEX_HIGHLIGHT_BOOST: i32 = 1000;

/// Map scale at zoom 0 for 256px Web Mercator tiles at 96 dpi.
pub const SCALE_AT_ZOOM_0: f64 = 591_657_527.591_555;
