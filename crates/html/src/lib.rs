//! HTML document model for the page loader.
//!
//! Markup is parsed with `html5ever` into an `indextree` arena. The resulting
//! [`Document`] supports the small set of DOM operations the loader needs:
//! selector queries, attribute and class-list edits, tree moves and a
//! document-order comparison.

#![allow(
    clippy::missing_docs_in_private_items,
    reason = "Internal implementation details don't need public documentation"
)]
#![allow(
    clippy::missing_inline_in_public_items,
    reason = "Inlining decisions left to compiler for this crate"
)]

pub mod dom;
pub mod parser;
pub mod selector;

pub use dom::{DOMNode, Document, NodeKind};
pub use indextree::NodeId;
pub use selector::{SelectorList, parse_selector_list};
