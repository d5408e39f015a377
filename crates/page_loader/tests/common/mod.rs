#![allow(dead_code, reason = "Each test binary uses a different subset of helpers")]
#![allow(
    clippy::missing_docs_in_private_items,
    clippy::unwrap_used,
    clippy::missing_inline_in_public_items,
    reason = "Test helpers"
)]

use core::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use anyhow::{Error, anyhow};
use futures::FutureExt as _;
use futures::future::LocalBoxFuture;
use html::{Document, NodeId};
use page_loader::observer::{Rect, StaticGeometry};
use page_loader::storage::{MemorySessionStorage, SessionStorage};
use page_loader::timer::ManualTimer;
use page_loader::{LoaderConfig, PageEnvironment, PageLoader, PageServices, SharedDocument, share};
use tokio::task::yield_now;
use url::Url;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Collaborator that records every call in order.
#[derive(Default)]
pub struct RecordingServices {
    events: Rc<RefCell<Vec<String>>>,
    /// Times `wait_for_lcp` yields to the executor before resolving.
    pub lcp_yields: Cell<usize>,
    /// Times `load_blocks` yields before resolving.
    pub block_yields: Cell<usize>,
    pub failing_css: RefCell<HashSet<String>>,
    pub failing_scripts: RefCell<HashSet<String>>,
    pub fail_sections: Cell<bool>,
}

impl RecordingServices {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events.borrow().iter().filter(|seen| *seen == event).count()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.events.borrow().iter().position(|seen| seen == event)
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|seen| seen.starts_with(prefix))
            .count()
    }

    fn record(&self, event: impl Into<String>) {
        self.events.borrow_mut().push(event.into());
    }

    fn resolve_after(&self, yields: usize, done: String, result: Result<(), Error>) -> LocalBoxFuture<'static, Result<(), Error>> {
        let events = Rc::clone(&self.events);
        async move {
            for _ in 0..yields {
                yield_now().await;
            }
            events.borrow_mut().push(done);
            result
        }
        .boxed_local()
    }
}

impl PageServices for RecordingServices {
    fn decorate_template_and_theme(&self, _document: &mut Document) -> Result<(), Error> {
        self.record("template");
        Ok(())
    }

    fn decorate_buttons(&self, _document: &mut Document, _container: NodeId) -> Result<(), Error> {
        self.record("buttons");
        Ok(())
    }

    fn decorate_icons(&self, _document: &mut Document, _container: NodeId) -> Result<(), Error> {
        self.record("icons");
        Ok(())
    }

    fn decorate_sections(&self, _document: &mut Document, _container: NodeId) -> Result<(), Error> {
        self.record("sections");
        if self.fail_sections.get() {
            return Err(anyhow!("section decoration failed"));
        }
        Ok(())
    }

    fn decorate_blocks(&self, _document: &mut Document, _container: NodeId) -> Result<(), Error> {
        self.record("blocks");
        Ok(())
    }

    fn wait_for_lcp(
        &self,
        _document: SharedDocument,
        candidates: &[String],
    ) -> LocalBoxFuture<'static, Result<(), Error>> {
        self.record(format!("lcp:{}", candidates.len()));
        self.resolve_after(self.lcp_yields.get(), String::from("lcp:resolved"), Ok(()))
    }

    fn load_blocks(
        &self,
        _document: SharedDocument,
        _container: NodeId,
    ) -> LocalBoxFuture<'static, Result<(), Error>> {
        self.record("load_blocks");
        self.resolve_after(self.block_yields.get(), String::from("load_blocks:resolved"), Ok(()))
    }

    fn load_header(
        &self,
        _document: SharedDocument,
        header: Option<NodeId>,
    ) -> LocalBoxFuture<'static, Result<(), Error>> {
        self.record(format!("header:{}", header.is_some()));
        async { Ok(()) }.boxed_local()
    }

    fn load_footer(
        &self,
        _document: SharedDocument,
        footer: Option<NodeId>,
    ) -> LocalBoxFuture<'static, Result<(), Error>> {
        self.record(format!("footer:{}", footer.is_some()));
        async { Ok(()) }.boxed_local()
    }

    fn load_css(&self, href: &str) -> LocalBoxFuture<'static, Result<(), Error>> {
        self.record(format!("css:{href}"));
        let result = if self.failing_css.borrow().contains(href) {
            Err(anyhow!("stylesheet {href} failed"))
        } else {
            Ok(())
        };
        self.resolve_after(1, format!("css-loaded:{href}"), result)
    }

    fn load_script(&self, src: &str) -> LocalBoxFuture<'static, Result<(), Error>> {
        self.record(format!("script:{src}"));
        let result = if self.failing_scripts.borrow().contains(src) {
            Err(anyhow!("script {src} failed"))
        } else {
            Ok(())
        };
        self.resolve_after(1, format!("script-loaded:{src}"), result)
    }

    fn scroll_into_view(&self, document: &Document, node: NodeId) {
        let id = document.attribute(node, "id").unwrap_or_default();
        self.record(format!("scroll:{id}"));
    }

    fn emit_measurement(&self, event: &str, _detail: Option<&str>) {
        self.record(format!("measure:{event}"));
    }

    fn observe_for_measurement(&self, _document: &Document, elements: &[NodeId]) {
        self.record(format!("observe:{}", elements.len()));
    }
}

/// Everything a test needs to drive one page load.
pub struct TestPage {
    pub loader: PageLoader,
    pub services: Rc<RecordingServices>,
    pub storage: Rc<MemorySessionStorage>,
    pub timer: ManualTimer,
}

impl TestPage {
    pub fn document(&self) -> SharedDocument {
        self.loader.document()
    }

    pub fn query(&self, selector: &str) -> Option<NodeId> {
        let document = self.loader.document();
        let doc = document.borrow();
        doc.query_selector(doc.root(), selector).unwrap()
    }

    pub fn body_html(&self) -> String {
        let document = self.loader.document();
        let doc = document.borrow();
        doc.body().map(|body| doc.inner_html(body)).unwrap_or_default()
    }
}

pub fn page(markup: &str, url: &str, viewport_width: u32) -> TestPage {
    let parsed = Url::parse(url).unwrap();
    let storage = Rc::new(MemorySessionStorage::for_url(&parsed));
    page_with_storage(markup, url, viewport_width, storage)
}

/// Build a page whose session storage is shared with earlier loads.
pub fn page_with_storage(
    markup: &str,
    url: &str,
    viewport_width: u32,
    storage: Rc<MemorySessionStorage>,
) -> TestPage {
    let services = RecordingServices::new();
    let shared_storage: Rc<dyn SessionStorage> = Rc::clone(&storage) as Rc<dyn SessionStorage>;
    let environment = PageEnvironment::new(Url::parse(url).unwrap(), viewport_width, shared_storage);
    let timer = ManualTimer::new();
    let loader = PageLoader::new(
        share(Document::parse(markup)),
        Rc::clone(&services) as Rc<dyn PageServices>,
        environment,
        LoaderConfig::default(),
    )
    .with_timer(Rc::new(timer.clone()));
    TestPage {
        loader,
        services,
        storage,
        timer,
    }
}

/// Build a loader on the default tokio timer. Only the services are
/// returned alongside it so tests can drop the loader.
pub fn tokio_page(markup: &str, url: &str, viewport_width: u32) -> (PageLoader, Rc<RecordingServices>) {
    let parsed = Url::parse(url).unwrap();
    let storage: Rc<dyn SessionStorage> = Rc::new(MemorySessionStorage::for_url(&parsed));
    let services = RecordingServices::new();
    let loader = PageLoader::new(
        share(Document::parse(markup)),
        Rc::clone(&services) as Rc<dyn PageServices>,
        PageEnvironment::new(parsed, viewport_width, storage),
        LoaderConfig::default(),
    );
    (loader, services)
}

/// Boxes stacked from the top of the document, `height` pixels each.
pub fn stacked_geometry(nodes: &[NodeId], height: f32) -> StaticGeometry {
    let mut geometry = StaticGeometry::new();
    for (index, node) in nodes.iter().enumerate() {
        geometry.set(*node, Rect::new(0.0, index as f32 * height, 800.0, height));
    }
    geometry
}
