//! Fire-once visibility triggers.

use core::cell::Cell;
use std::rc::Rc;

use html::NodeId;
use log::trace;

use crate::observer::{IntersectionHub, IntersectionObserver, ObserverOptions, RootMargin};

/// Proximity condition for a trigger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerOptions {
    pub margin: RootMargin,
    pub threshold: f32,
}

impl Default for TriggerOptions {
    fn default() -> Self {
        Self {
            margin: RootMargin::uniform(200.0),
            threshold: 0.0,
        }
    }
}

impl From<TriggerOptions> for ObserverOptions {
    fn from(options: TriggerOptions) -> Self {
        Self {
            root_margin: options.margin,
            threshold: options.threshold,
        }
    }
}

/// Handle to an armed trigger.
#[derive(Clone)]
pub struct TriggerHandle {
    observer: IntersectionObserver,
    fired: Rc<Cell<bool>>,
}

impl TriggerHandle {
    pub fn has_fired(&self) -> bool {
        self.fired.get()
    }

    /// Whether the trigger still waits for its element.
    pub fn is_armed(&self) -> bool {
        !self.fired.get() && !self.observer.observed().is_empty()
    }

    /// Disarm a trigger that has not fired yet.
    pub fn cancel(&self) {
        self.observer.disconnect();
    }
}

/// Runs a callback the first time an element comes near the viewport.
#[derive(Clone)]
pub struct VisibilityTrigger {
    hub: IntersectionHub,
}

impl VisibilityTrigger {
    pub const fn new(hub: IntersectionHub) -> Self {
        Self { hub }
    }

    /// Arm `on_enter` for `element`. The callback runs at most once and the
    /// element is no longer observed afterwards. An absent element arms
    /// nothing and returns `None`.
    pub fn watch<F>(
        &self,
        element: Option<NodeId>,
        on_enter: F,
        options: TriggerOptions,
    ) -> Option<TriggerHandle>
    where
        F: FnOnce() + 'static,
    {
        let element = element?;
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        let mut pending = Some(on_enter);
        let observer = self
            .hub
            .observer(options.into(), move |entries, observer| {
                if !entries.iter().any(|entry| entry.is_intersecting) {
                    return;
                }
                observer.disconnect();
                if let Some(callback) = pending.take() {
                    trace!("visibility trigger fired for {element:?}");
                    flag.set(true);
                    callback();
                }
            });
        observer.observe(element);
        Some(TriggerHandle { observer, fired })
    }
}
