pub mod icon;
pub mod manager;
pub mod marker;
pub mod overlay;
pub mod polyline;
pub mod route_label;

pub use icon::{IconDescriptor, IconKey, VehicleIconCache};
pub use manager::{MarkerManager, MarkerSurface};
pub use marker::{MarkerCallback, MarkerHandle, MarkerKind, MarkerSpec, PlacedMarker, RenderState};
pub use overlay::{OverlayLayer, OverlayNode, OverlayNodeId};
pub use polyline::{PolylineHandle, PolylineManager, PolylineOptions};
pub use route_label::RouteLabel;
