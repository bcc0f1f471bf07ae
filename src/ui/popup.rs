use crate::{
    backends::{MapBackend, NativeHandle},
    core::geo::LatLng,
};
use instant::Instant;
use std::fmt;

/// What the popup is describing
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PopupEntity {
    Stop(String),
    Vehicle(String),
}

impl PopupEntity {
    pub fn id(&self) -> &str {
        match self {
            Self::Stop(id) | Self::Vehicle(id) => id,
        }
    }
}

impl fmt::Display for PopupEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stop(id) => write!(f, "stop {id}"),
            Self::Vehicle(id) => write!(f, "vehicle {id}"),
        }
    }
}

/// One mounted content instance. A new instance is created per `open`;
/// `update` rewrites the mounted one.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupContent {
    serial: u64,
    html: String,
    revision: u64,
}

impl PopupContent {
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    /// Times the content was rebound since it was mounted
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[derive(Debug)]
pub struct PopupState {
    bound_entity: PopupEntity,
    position: LatLng,
    content: PopupContent,
    native: NativeHandle,
    opened_at: Instant,
}

impl PopupState {
    pub fn bound_entity(&self) -> &PopupEntity {
        &self.bound_entity
    }

    pub fn position(&self) -> LatLng {
        self.position
    }

    pub fn content(&self) -> &PopupContent {
        &self.content
    }

    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }
}

/// The single popup of a provider
#[derive(Debug, Default)]
pub struct PopupManager {
    state: Option<PopupState>,
    next_serial: u64,
    live_contents: usize,
}

impl PopupManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces whatever is open with a popup for `entity`. The previous
    /// content is unmounted before the new one exists.
    pub fn open(
        &mut self,
        backend: &mut dyn MapBackend,
        entity: PopupEntity,
        position: LatLng,
        html: String,
    ) -> u64 {
        self.close(backend);

        self.next_serial += 1;
        let native = backend.open_popup(position, &html);
        self.live_contents += 1;
        log::debug!("popup opened for {}", entity);

        self.state = Some(PopupState {
            bound_entity: entity,
            position,
            content: PopupContent {
                serial: self.next_serial,
                html,
                revision: 0,
            },
            native,
            opened_at: Instant::now(),
        });
        self.next_serial
    }

    /// Rebinds the open content when it describes `entity`. Anything else is
    /// left alone.
    pub fn update(
        &mut self,
        backend: &mut dyn MapBackend,
        entity: &PopupEntity,
        position: LatLng,
        html: String,
    ) -> bool {
        let Some(state) = self.state.as_mut().filter(|s| &s.bound_entity == entity) else {
            return false;
        };
        if state.position != position || state.content.html != html {
            backend.set_popup_content(state.native, position, &html);
            state.position = position;
            state.content.html = html;
            state.content.revision += 1;
        }
        true
    }

    /// Safe to call any number of times
    pub fn close(&mut self, backend: &mut dyn MapBackend) -> bool {
        match self.state.take() {
            Some(state) => {
                backend.close_popup(state.native);
                self.live_contents = self.live_contents.saturating_sub(1);
                log::debug!("popup for {} closed", state.bound_entity);
                true
            }
            None => false,
        }
    }

    /// Drops the popup without touching the engine, for teardown after the
    /// engine itself is gone
    pub(crate) fn forget(&mut self) {
        if self.state.take().is_some() {
            self.live_contents = self.live_contents.saturating_sub(1);
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    pub fn state(&self) -> Option<&PopupState> {
        self.state.as_ref()
    }

    pub fn bound_entity(&self) -> Option<&PopupEntity> {
        self.state.as_ref().map(|s| &s.bound_entity)
    }

    pub fn is_bound_to(&self, entity: &PopupEntity) -> bool {
        self.bound_entity() == Some(entity)
    }

    /// Content instances currently mounted
    pub fn live_content_count(&self) -> usize {
        self.live_contents
    }
}
