//! Transit data the map consumes and the route-shape codec.

pub mod polyline;
pub mod transit;
