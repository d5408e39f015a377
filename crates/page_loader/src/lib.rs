//! Staged page loading.
//!
//! A page goes through three phases. The eager phase decorates the primary
//! content and waits for the first meaningful paint. The lazy phase loads
//! the remaining blocks, header, footer and secondary styles. The delayed
//! phase runs on a timer afterwards and arms visibility-triggered feature
//! loaders. [`PageLoader`] sequences them; the host supplies the actual
//! loading work through [`PageServices`].

#![allow(
    clippy::missing_docs_in_private_items,
    reason = "Internal implementation details don't need public documentation"
)]
#![allow(
    clippy::missing_inline_in_public_items,
    reason = "Inlining decisions left to compiler for this crate"
)]

use core::cell::RefCell;
use std::rc::Rc;

use html::Document;

pub mod config;
pub mod decorate;
pub mod deferred;
pub mod environment;
pub mod fade;
pub mod fonts;
pub mod observer;
pub mod scheduler;
pub mod services;
pub mod storage;
pub mod timer;
pub mod trigger;

/// The document shared between the loader, its observers and background
/// tasks. Never hold a borrow across an await point.
pub type SharedDocument = Rc<RefCell<Document>>;

pub use config::LoaderConfig;
pub use environment::PageEnvironment;
pub use scheduler::{LoadPhase, PageLoader, PhaseError, SchedulerState};
pub use services::PageServices;

/// Wrap a parsed document for use with a [`PageLoader`].
pub fn share(document: Document) -> SharedDocument {
    Rc::new(RefCell::new(document))
}
