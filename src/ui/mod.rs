pub mod content;
pub mod popup;

pub use popup::{PopupContent, PopupEntity, PopupManager, PopupState};
