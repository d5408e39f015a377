//! HTML5 parsing into a [`Document`] using html5ever.

mod sink;

use html5ever::tendril::TendrilSink as _;
use html5ever::{ParseOpts, parse_document};

use crate::dom::Document;
use sink::DocumentSink;

impl Document {
    /// Parse a complete HTML document. html5ever recovers from malformed
    /// markup the way browsers do, so parsing never fails; missing
    /// `html`/`head`/`body` elements are synthesized.
    pub fn parse(markup: &str) -> Self {
        parse_document(DocumentSink::new(), ParseOpts::default()).one(markup)
    }
}
