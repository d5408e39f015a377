//! Runtime inputs the loader reads from its host: page URL, viewport width
//! and session storage.

use std::rc::Rc;

use anyhow::{Error, anyhow};
use url::Url;

use crate::storage::{MemorySessionStorage, SessionStorage};

#[derive(Clone)]
pub struct PageEnvironment {
    url: Url,
    viewport_width: u32,
    storage: Rc<dyn SessionStorage>,
}

impl PageEnvironment {
    pub fn new(url: Url, viewport_width: u32, storage: Rc<dyn SessionStorage>) -> Self {
        Self {
            url,
            viewport_width,
            storage,
        }
    }

    /// Parse `url` and attach a fresh in-memory session for its origin.
    ///
    /// # Errors
    /// Fails when `url` is not an absolute URL.
    pub fn for_url(url: &str, viewport_width: u32) -> Result<Self, Error> {
        let parsed = Url::parse(url).map_err(|err| anyhow!("invalid page url {url}: {err}"))?;
        let storage: Rc<dyn SessionStorage> = Rc::new(MemorySessionStorage::for_url(&parsed));
        Ok(Self::new(parsed, viewport_width, storage))
    }

    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Host name of the page, empty for host-less URLs such as `file:`.
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Raw fragment without the leading `#`; `None` when absent or empty.
    pub fn fragment(&self) -> Option<&str> {
        self.url.fragment().filter(|fragment| !fragment.is_empty())
    }

    pub const fn viewport_width(&self) -> u32 {
        self.viewport_width
    }

    pub fn storage(&self) -> Rc<dyn SessionStorage> {
        Rc::clone(&self.storage)
    }
}

/// Resolve `href` against the page URL, returning it unchanged when it
/// cannot be resolved.
pub fn resolve_href(page: &Url, href: &str) -> String {
    page.join(href)
        .map_or_else(|_| href.to_owned(), String::from)
}
