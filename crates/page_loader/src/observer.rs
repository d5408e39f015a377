//! Viewport intersection tracking.
//!
//! The host owns layout, so it reports geometry through [`LayoutGeometry`]
//! and calls [`IntersectionHub::notify`] whenever the viewport scrolls,
//! resizes or the layout changes. Each [`IntersectionObserver`] then receives
//! entries for the targets whose intersecting state changed since the last
//! notification, plus one initial entry for every newly observed target.

use core::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use html::NodeId;
use log::trace;

/// A rectangular region in document coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    #[inline]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(self) -> f32 {
        self.y + self.height
    }

    pub fn area(self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Grow (or shrink, for negative values) each edge by the margin.
    pub fn expand(self, margin: RootMargin) -> Self {
        Self {
            x: self.x - margin.left,
            y: self.y - margin.top,
            width: self.width + margin.left + margin.right,
            height: self.height + margin.top + margin.bottom,
        }
    }

    /// Overlapping region. Rectangles sharing only an edge intersect with a
    /// zero-area result; `None` when they are disjoint or `self` collapsed.
    pub fn intersection(self, other: Self) -> Option<Self> {
        if self.width < 0.0 || self.height < 0.0 {
            return None;
        }
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        (left <= right && top <= bottom).then(|| Self::new(left, top, right - left, bottom - top))
    }
}

/// Scroll position and size of the visible area.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub scroll_x: f32,
    pub scroll_y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub const fn new(width: f32, height: f32) -> Self {
        Self {
            scroll_x: 0.0,
            scroll_y: 0.0,
            width,
            height,
        }
    }

    #[must_use]
    pub const fn scrolled_to(self, scroll_y: f32) -> Self {
        Self { scroll_y, ..self }
    }

    pub const fn rect(self) -> Rect {
        Rect::new(self.scroll_x, self.scroll_y, self.width, self.height)
    }
}

/// Offsets applied to the viewport before intersecting; negative values
/// shrink it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RootMargin {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl RootMargin {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(top: f32, right: f32, bottom: f32, left: f32) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    pub const fn uniform(px: f32) -> Self {
        Self::new(px, px, px, px)
    }
}

/// Box geometry of rendered elements.
pub trait LayoutGeometry {
    /// Border box in document coordinates; `None` for elements without a box.
    fn bounding_rect(&self, node: NodeId) -> Option<Rect>;
}

/// Geometry from a fixed map of element boxes.
#[derive(Debug, Clone, Default)]
pub struct StaticGeometry {
    rects: HashMap<NodeId, Rect>,
}

impl StaticGeometry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, node: NodeId, rect: Rect) {
        self.rects.insert(node, rect);
    }

    pub fn remove(&mut self, node: NodeId) {
        self.rects.remove(&node);
    }
}

impl LayoutGeometry for StaticGeometry {
    fn bounding_rect(&self, node: NodeId) -> Option<Rect> {
        self.rects.get(&node).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionEntry {
    pub target: NodeId,
    pub is_intersecting: bool,
    pub intersection_ratio: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObserverOptions {
    pub root_margin: RootMargin,
    /// Minimum visible fraction of the target; `0.0` means any overlap.
    pub threshold: f32,
}

impl Default for ObserverOptions {
    fn default() -> Self {
        Self {
            root_margin: RootMargin::ZERO,
            threshold: 0.0,
        }
    }
}

impl ObserverOptions {
    /// Intersect `target` with the margin-adjusted viewport.
    pub fn evaluate(&self, viewport: Viewport, target: Option<Rect>) -> (bool, f32) {
        let root = viewport.rect().expand(self.root_margin);
        let Some(bounds) = target else {
            return (false, 0.0);
        };
        let Some(overlap) = root.intersection(bounds) else {
            return (false, 0.0);
        };
        let ratio = if bounds.area() > 0.0 {
            (overlap.area() / bounds.area()).min(1.0)
        } else {
            1.0
        };
        let intersecting = if self.threshold <= 0.0 {
            true
        } else {
            ratio >= self.threshold
        };
        (intersecting, ratio)
    }
}

pub type ObserverCallback = Box<dyn FnMut(&[IntersectionEntry], &IntersectionObserver)>;

struct Target {
    node: NodeId,
    /// Intersecting state delivered last; `None` until the first delivery.
    last: Option<bool>,
}

struct ObserverInner {
    options: ObserverOptions,
    targets: RefCell<Vec<Target>>,
    callback: RefCell<Option<ObserverCallback>>,
    registered: Cell<bool>,
    hub: Weak<RefCell<HubState>>,
}

/// Handle to a registered observer. Cloning yields another handle to the
/// same observer.
#[derive(Clone)]
pub struct IntersectionObserver {
    inner: Rc<ObserverInner>,
}

impl IntersectionObserver {
    pub fn options(&self) -> ObserverOptions {
        self.inner.options
    }

    /// Start watching `node`. Observing a node twice is a no-op.
    pub fn observe(&self, node: NodeId) {
        {
            let mut targets = self.inner.targets.borrow_mut();
            if targets.iter().any(|target| target.node == node) {
                return;
            }
            targets.push(Target { node, last: None });
        }
        if !self.inner.registered.get()
            && let Some(hub) = self.inner.hub.upgrade()
        {
            hub.borrow_mut().observers.push(Rc::clone(&self.inner));
            self.inner.registered.set(true);
        }
    }

    pub fn unobserve(&self, node: NodeId) {
        self.inner
            .targets
            .borrow_mut()
            .retain(|target| target.node != node);
    }

    /// Stop watching every target. The hub drops the observer on its next
    /// notification unless it observes something again before that.
    pub fn disconnect(&self) {
        self.inner.targets.borrow_mut().clear();
    }

    pub fn observed(&self) -> Vec<NodeId> {
        self.inner
            .targets
            .borrow()
            .iter()
            .map(|target| target.node)
            .collect()
    }

    pub fn is_observing(&self, node: NodeId) -> bool {
        self.inner
            .targets
            .borrow()
            .iter()
            .any(|target| target.node == node)
    }

    fn collect_entries(&self, viewport: Viewport, geometry: &dyn LayoutGeometry) -> Vec<IntersectionEntry> {
        let options = self.inner.options;
        let mut entries = Vec::new();
        for target in self.inner.targets.borrow_mut().iter_mut() {
            let (is_intersecting, intersection_ratio) =
                options.evaluate(viewport, geometry.bounding_rect(target.node));
            if target.last == Some(is_intersecting) {
                continue;
            }
            target.last = Some(is_intersecting);
            entries.push(IntersectionEntry {
                target: target.node,
                is_intersecting,
                intersection_ratio,
            });
        }
        entries
    }

    fn deliver(&self, entries: &[IntersectionEntry]) {
        let taken = self.inner.callback.borrow_mut().take();
        let Some(mut callback) = taken else {
            return;
        };
        callback(entries, self);
        *self.inner.callback.borrow_mut() = Some(callback);
    }
}

#[derive(Default)]
struct HubState {
    observers: Vec<Rc<ObserverInner>>,
    notifying: bool,
}

/// Owner of every live observer on a page.
#[derive(Clone, Default)]
pub struct IntersectionHub {
    state: Rc<RefCell<HubState>>,
}

impl IntersectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an observer. It starts receiving entries from the first
    /// notification after it observes a target.
    pub fn observer<F>(&self, options: ObserverOptions, callback: F) -> IntersectionObserver
    where
        F: FnMut(&[IntersectionEntry], &IntersectionObserver) + 'static,
    {
        let boxed: ObserverCallback = Box::new(callback);
        IntersectionObserver {
            inner: Rc::new(ObserverInner {
                options,
                targets: RefCell::new(Vec::new()),
                callback: RefCell::new(Some(boxed)),
                registered: Cell::new(false),
                hub: Rc::downgrade(&self.state),
            }),
        }
    }

    /// Number of observers with at least one target.
    pub fn active_observers(&self) -> usize {
        self.state
            .borrow()
            .observers
            .iter()
            .filter(|observer| !observer.targets.borrow().is_empty())
            .count()
    }

    /// Evaluate every observer against the new viewport and run callbacks
    /// for the entries that changed. Nested calls from inside a callback
    /// are ignored.
    pub fn notify(&self, viewport: Viewport, geometry: &dyn LayoutGeometry) {
        let snapshot = {
            let mut state = self.state.borrow_mut();
            if state.notifying {
                trace!("intersection notify re-entered, ignoring");
                return;
            }
            state.notifying = true;
            state.observers.retain(|observer| {
                let keep = !observer.targets.borrow().is_empty();
                if !keep {
                    observer.registered.set(false);
                }
                keep
            });
            state.observers.clone()
        };

        let _guard = NotifyGuard { state: &self.state };
        for inner in snapshot {
            let observer = IntersectionObserver { inner };
            let entries = observer.collect_entries(viewport, geometry);
            if !entries.is_empty() {
                observer.deliver(&entries);
            }
        }
    }
}

/// Clears the hub's `notifying` flag even when a callback unwinds.
struct NotifyGuard<'hub> {
    state: &'hub RefCell<HubState>,
}

impl Drop for NotifyGuard<'_> {
    fn drop(&mut self) {
        self.state.borrow_mut().notifying = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use html::Document;

    fn nodes(count: usize) -> (Document, Vec<NodeId>) {
        let mut doc = Document::new();
        let ids = (0..count).map(|_| doc.create_element("div")).collect();
        (doc, ids)
    }

    #[test]
    fn edge_adjacent_rects_intersect() {
        let viewport = Rect::new(0.0, 0.0, 100.0, 100.0);
        let below = Rect::new(0.0, 100.0, 100.0, 50.0);
        let overlap = viewport.intersection(below).unwrap();
        assert!(overlap.area().abs() < f32::EPSILON);
        assert!(viewport.intersection(Rect::new(0.0, 101.0, 10.0, 10.0)).is_none());
    }

    #[test]
    fn margin_expands_viewport() {
        let options = ObserverOptions {
            root_margin: RootMargin::uniform(200.0),
            threshold: 0.0,
        };
        let viewport = Viewport::new(800.0, 600.0);
        assert!(options.evaluate(viewport, Some(Rect::new(0.0, 790.0, 10.0, 10.0))).0);
        assert!(!options.evaluate(viewport, Some(Rect::new(0.0, 801.0, 10.0, 10.0))).0);
        assert!(!options.evaluate(viewport, None).0);
    }

    #[test]
    fn threshold_requires_visible_fraction() {
        let options = ObserverOptions {
            root_margin: RootMargin::new(-10.0, 0.0, -10.0, 0.0),
            threshold: 0.10,
        };
        let viewport = Viewport::new(800.0, 600.0);
        // 100px tall box with 5px inside the shrunk band.
        let (hit, ratio) = options.evaluate(viewport, Some(Rect::new(0.0, 585.0, 100.0, 100.0)));
        assert!(!hit);
        assert!((ratio - 0.05).abs() < 1e-4);
        assert!(options.evaluate(viewport, Some(Rect::new(0.0, 575.0, 100.0, 100.0))).0);
    }

    #[test]
    fn delivers_initial_entry_then_only_transitions() {
        let (_doc, ids) = nodes(1);
        let hub = IntersectionHub::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let observer = hub.observer(ObserverOptions::default(), move |entries, _| {
            sink.borrow_mut()
                .extend(entries.iter().map(|entry| entry.is_intersecting));
        });
        observer.observe(ids[0]);

        let mut geometry = StaticGeometry::new();
        geometry.set(ids[0], Rect::new(0.0, 2000.0, 100.0, 100.0));
        let viewport = Viewport::new(800.0, 600.0);
        hub.notify(viewport, &geometry);
        hub.notify(viewport, &geometry);
        hub.notify(viewport.scrolled_to(1800.0), &geometry);
        hub.notify(viewport.scrolled_to(1900.0), &geometry);
        hub.notify(viewport, &geometry);
        assert_eq!(*seen.borrow(), vec![false, true, false]);
    }

    #[test]
    fn callback_can_unobserve_and_disconnected_observers_are_dropped() {
        let (_doc, ids) = nodes(2);
        let hub = IntersectionHub::new();
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let observer = hub.observer(ObserverOptions::default(), move |entries, observer| {
            for entry in entries.iter().filter(|entry| entry.is_intersecting) {
                counter.set(counter.get() + 1);
                observer.unobserve(entry.target);
            }
        });
        observer.observe(ids[0]);
        observer.observe(ids[1]);

        let mut geometry = StaticGeometry::new();
        geometry.set(ids[0], Rect::new(0.0, 0.0, 10.0, 10.0));
        geometry.set(ids[1], Rect::new(0.0, 0.0, 10.0, 10.0));
        hub.notify(Viewport::new(100.0, 100.0), &geometry);
        assert_eq!(hits.get(), 2);
        assert!(observer.observed().is_empty());
        hub.notify(Viewport::new(100.0, 100.0), &geometry);
        assert_eq!(hub.active_observers(), 0);

        observer.observe(ids[0]);
        hub.notify(Viewport::new(100.0, 100.0), &geometry);
        assert_eq!(hits.get(), 3);
    }

    #[test]
    fn observers_created_during_notify_wait_for_next_round() {
        let (_doc, ids) = nodes(2);
        let hub = IntersectionHub::new();
        let late_hits = Rc::new(Cell::new(0));
        let spawner_hub = hub.clone();
        let counter = Rc::clone(&late_hits);
        let second = ids[1];
        let first = hub.observer(ObserverOptions::default(), move |_, observer| {
            observer.disconnect();
            let counter = Rc::clone(&counter);
            let late = spawner_hub.observer(ObserverOptions::default(), move |_, _| {
                counter.set(counter.get() + 1);
            });
            late.observe(second);
        });
        first.observe(ids[0]);

        let mut geometry = StaticGeometry::new();
        geometry.set(ids[0], Rect::new(0.0, 0.0, 10.0, 10.0));
        geometry.set(ids[1], Rect::new(0.0, 0.0, 10.0, 10.0));
        hub.notify(Viewport::new(100.0, 100.0), &geometry);
        assert_eq!(late_hits.get(), 0);
        hub.notify(Viewport::new(100.0, 100.0), &geometry);
        assert_eq!(late_hits.get(), 1);
    }

    #[test]
    #[allow(clippy::panic, reason = "Callback unwinding through notify")]
    fn panicking_callback_does_not_block_later_notifications() {
        use std::panic::{AssertUnwindSafe, catch_unwind};

        let (_doc, ids) = nodes(2);
        let hub = IntersectionHub::new();
        let failing = hub.observer(ObserverOptions::default(), |_, _| panic!("callback failed"));
        failing.observe(ids[0]);
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let healthy = hub.observer(ObserverOptions::default(), move |_, _| {
            counter.set(counter.get() + 1);
        });

        let mut geometry = StaticGeometry::new();
        geometry.set(ids[0], Rect::new(0.0, 0.0, 10.0, 10.0));
        geometry.set(ids[1], Rect::new(0.0, 0.0, 10.0, 10.0));
        let viewport = Viewport::new(100.0, 100.0);
        let unwound = catch_unwind(AssertUnwindSafe(|| {
            hub.notify(viewport, &geometry);
        }));
        assert!(unwound.is_err());

        healthy.observe(ids[1]);
        hub.notify(viewport, &geometry);
        assert_eq!(hits.get(), 1);
    }
}
