//! Scroll-driven reveal of `fadeup` elements.

use std::rc::Rc;

use html::{Document, NodeId};
use log::debug;

use crate::SharedDocument;
use crate::observer::{IntersectionHub, IntersectionObserver, ObserverOptions, RootMargin};

/// Viewport band an element must enter to be revealed.
pub const FADE_OPTIONS: ObserverOptions = ObserverOptions {
    root_margin: RootMargin::new(-10.0, 0.0, -10.0, 0.0),
    threshold: 0.10,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeState {
    Hidden,
    Revealed,
}

impl FadeState {
    pub fn of(document: &Document, node: NodeId, reveal_class: &str) -> Self {
        if document.has_class(node, reveal_class) {
            Self::Revealed
        } else {
            Self::Hidden
        }
    }
}

pub struct FadeInController {
    document: SharedDocument,
    hub: IntersectionHub,
    marker_class: String,
    reveal_class: String,
}

impl FadeInController {
    pub fn new(
        document: SharedDocument,
        hub: IntersectionHub,
        marker_class: &str,
        reveal_class: &str,
    ) -> Self {
        Self {
            document,
            hub,
            marker_class: marker_class.to_owned(),
            reveal_class: reveal_class.to_owned(),
        }
    }

    /// Reveal the first marked element inside `container` right away and
    /// observe all of them. Returns the observer, or `None` when there is no
    /// container.
    pub fn activate(&self, container: Option<NodeId>) -> Option<IntersectionObserver> {
        let container = container?;
        let document = Rc::clone(&self.document);
        let reveal = self.reveal_class.clone();
        let observer = self.hub.observer(FADE_OPTIONS, move |entries, observer| {
            for entry in entries.iter().filter(|entry| entry.is_intersecting) {
                document.borrow_mut().add_class(entry.target, &reveal);
                observer.unobserve(entry.target);
            }
        });

        let targets = {
            let mut doc = self.document.borrow_mut();
            let targets = doc.elements_by_class_name(container, &self.marker_class);
            if let Some(&first) = targets.first() {
                doc.add_class(first, &self.reveal_class);
            }
            targets
        };
        debug!("fade-up tracking {} elements", targets.len());
        for target in targets {
            observer.observe(target);
        }
        Some(observer)
    }
}
