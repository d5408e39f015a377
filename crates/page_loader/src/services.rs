//! Operations the loader invokes but does not implement itself.
//!
//! Block decoration, stylesheet/script injection, header/footer loading and
//! measurement all belong to the host. The loader only decides when each of
//! them runs.

use anyhow::Error;
use futures::future::LocalBoxFuture;
use html::{Document, NodeId};
use log::debug;
use url::Url;

use crate::SharedDocument;

/// Host-provided collaborators for a page load.
///
/// Synchronous decoration steps receive the document mutably. Asynchronous
/// steps start their work when called and hand back a future that owns
/// whatever it needs; futures that touch the document must not hold a
/// borrow across an await point.
pub trait PageServices {
    /// Template and theme classes on the body. Runs for every page, whether
    /// or not it has a primary content container.
    ///
    /// # Errors
    /// Failures abort the eager phase.
    fn decorate_template_and_theme(&self, _document: &mut Document) -> Result<(), Error> {
        Ok(())
    }

    /// # Errors
    /// Failures abort the eager phase.
    fn decorate_buttons(&self, document: &mut Document, container: NodeId) -> Result<(), Error>;

    /// # Errors
    /// Failures abort the eager phase.
    fn decorate_icons(&self, document: &mut Document, container: NodeId) -> Result<(), Error>;

    /// # Errors
    /// Failures abort the eager phase.
    fn decorate_sections(&self, document: &mut Document, container: NodeId) -> Result<(), Error>;

    /// # Errors
    /// Failures abort the eager phase.
    fn decorate_blocks(&self, document: &mut Document, container: NodeId) -> Result<(), Error>;

    /// Anchor `target` value for a resolved href.
    ///
    /// The default opens links to other hosts in a new browsing context and
    /// everything else in place.
    fn classify_link_target(&self, href: &str, page: &Url) -> String {
        let external = Url::parse(href)
            .ok()
            .filter(|link| matches!(link.scheme(), "http" | "https"))
            .is_some_and(|link| link.host_str() != page.host_str());
        String::from(if external { "_blank" } else { "_self" })
    }

    /// Resolves once the configured meaningful-paint candidates rendered, or
    /// immediately when `candidates` is empty.
    fn wait_for_lcp(
        &self,
        document: SharedDocument,
        candidates: &[String],
    ) -> LocalBoxFuture<'static, Result<(), Error>>;

    fn load_blocks(
        &self,
        document: SharedDocument,
        container: NodeId,
    ) -> LocalBoxFuture<'static, Result<(), Error>>;

    fn load_header(
        &self,
        document: SharedDocument,
        header: Option<NodeId>,
    ) -> LocalBoxFuture<'static, Result<(), Error>>;

    fn load_footer(
        &self,
        document: SharedDocument,
        footer: Option<NodeId>,
    ) -> LocalBoxFuture<'static, Result<(), Error>>;

    /// Inject a stylesheet. Repeated calls for the same href are expected to
    /// be cheap and side-effect free.
    fn load_css(&self, href: &str) -> LocalBoxFuture<'static, Result<(), Error>>;

    /// Inject a script and resolve once it has loaded.
    fn load_script(&self, src: &str) -> LocalBoxFuture<'static, Result<(), Error>>;

    fn scroll_into_view(&self, document: &Document, node: NodeId);

    fn emit_measurement(&self, event: &str, detail: Option<&str>) {
        debug!("measurement event {event} ({detail:?})");
    }

    fn observe_for_measurement(&self, _document: &Document, elements: &[NodeId]) {
        debug!("observing {} elements for measurement", elements.len());
    }
}
