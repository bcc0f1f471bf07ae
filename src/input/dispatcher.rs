//! Turns normalized viewport signals into immediate and debounced work.
//!
//! Overlay repositioning and label visibility react on every signal; the
//! marker reload waits until signals stop arriving for the debounce delay.
//! Time is passed in explicitly so the host's frame loop drives the timer.

use crate::input::events::ViewportSignal;
use instant::Instant;
use std::time::Duration;

/// Single-shot timer that is pushed back every time it is triggered
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Clears any pending deadline and arms a new one
    pub fn trigger(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    /// Returns `true` once when the deadline has passed
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// Work the provider must do right away in response to one signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchOutcome {
    pub viewport_changed: bool,
    pub zoom_changed: bool,
    pub click: bool,
}

#[derive(Debug, Clone)]
pub struct ViewportDispatcher {
    debouncer: Debouncer,
    last_zoom: Option<f64>,
    settled_count: u64,
}

impl ViewportDispatcher {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debouncer: Debouncer::new(debounce),
            last_zoom: None,
            settled_count: 0,
        }
    }

    /// Records the zoom the map starts at so the first real change is detected
    pub fn prime(&mut self, zoom: f64) {
        self.last_zoom = Some(zoom);
    }

    /// Handles one normalized signal given the camera zoom after it
    pub fn on_signal(
        &mut self,
        signal: ViewportSignal,
        current_zoom: f64,
        now: Instant,
    ) -> DispatchOutcome {
        match signal {
            ViewportSignal::Moved | ViewportSignal::Zoomed => {
                let zoom_changed = self.last_zoom != Some(current_zoom);
                self.last_zoom = Some(current_zoom);
                self.debouncer.trigger(now);
                DispatchOutcome {
                    viewport_changed: true,
                    zoom_changed,
                    click: false,
                }
            }
            ViewportSignal::Click => DispatchOutcome {
                click: true,
                ..DispatchOutcome::default()
            },
            ViewportSignal::Ignored => DispatchOutcome::default(),
        }
    }

    /// `true` when a pending reload is due
    pub fn poll(&mut self, now: Instant) -> bool {
        let fired = self.debouncer.poll(now);
        if fired {
            self.settled_count += 1;
        }
        fired
    }

    pub fn has_pending_reload(&self) -> bool {
        self.debouncer.is_pending()
    }

    pub fn settled_count(&self) -> u64 {
        self.settled_count
    }

    pub fn reset(&mut self) {
        self.debouncer.cancel();
        self.last_zoom = None;
    }
}
