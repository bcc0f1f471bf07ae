use crate::{
    input::events::{MapEvent, MapEventKind},
    prelude::HashMap,
};

/// Event listener callback type
pub type EventCallback = Box<dyn Fn(&MapEvent) + Send + Sync>;

/// Token returned by [`EventManager::on`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Listener registry keyed by normalized event kind
#[derive(Default)]
pub struct EventManager {
    listeners: HashMap<MapEventKind, Vec<(ListenerId, EventCallback)>>,
    next_id: u64,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an event listener
    pub fn on<F>(&mut self, kind: MapEventKind, callback: F) -> ListenerId
    where
        F: Fn(&MapEvent) + Send + Sync + 'static,
    {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners
            .entry(kind)
            .or_default()
            .push((id, Box::new(callback)));
        id
    }

    /// Removes a listener; unknown ids are ignored
    pub fn off(&mut self, id: ListenerId) -> bool {
        let mut removed = false;
        for callbacks in self.listeners.values_mut() {
            let before = callbacks.len();
            callbacks.retain(|(listener, _)| *listener != id);
            removed |= callbacks.len() != before;
        }
        removed
    }

    /// Delivers an event to every listener of its kind, returning how many ran
    pub fn emit(&self, event: &MapEvent) -> usize {
        match self.listeners.get(&event.kind) {
            Some(callbacks) => {
                for (_, callback) in callbacks {
                    callback(event);
                }
                callbacks.len()
            }
            None => 0,
        }
    }

    pub fn listener_count(&self, kind: MapEventKind) -> usize {
        self.listeners.get(&kind).map(Vec::len).unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}
