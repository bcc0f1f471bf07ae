pub mod dispatcher;
pub mod events;
pub mod handler;

// Re-export the essential types
pub use dispatcher::{Debouncer, DispatchOutcome, ViewportDispatcher};
pub use events::{EventHandled, MapEvent, MapEventKind, ViewportSignal};
pub use handler::{EventCallback, EventManager, ListenerId};
