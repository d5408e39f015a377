//! Session-scoped storage and the font cache flag built on top of it.

use core::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use anyhow::{Error, anyhow};
use url::Url;

/// Session storage as seen by the page. Every access may fail (storage can
/// be disabled by the user agent), so all operations are fallible.
pub trait SessionStorage {
    /// # Errors
    /// Fails when storage is unavailable.
    fn get_item(&self, key: &str) -> Result<Option<String>, Error>;

    /// # Errors
    /// Fails when storage is unavailable.
    fn set_item(&self, key: &str, value: &str) -> Result<(), Error>;

    /// # Errors
    /// Fails when storage is unavailable.
    fn remove_item(&self, key: &str) -> Result<(), Error>;
}

/// Session storage for a single origin that lives as long as the value
/// does.
///
/// Dropping it (or calling [`MemorySessionStorage::end_session`]) is the
/// session boundary.
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    origin: String,
    items: RefCell<BTreeMap<String, String>>,
    disabled: Cell<bool>,
    writes: Cell<u64>,
}

impl MemorySessionStorage {
    pub fn new(origin: &str) -> Self {
        Self {
            origin: origin.to_owned(),
            ..Self::default()
        }
    }

    /// Storage for the page URL's origin.
    pub fn for_url(url: &Url) -> Self {
        let origin = match url.scheme() {
            "file" => String::from("file://"),
            _ => url.origin().ascii_serialization(),
        };
        Self::new(&origin)
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Simulate storage being blocked: every access fails while disabled.
    pub fn set_disabled(&self, disabled: bool) {
        self.disabled.set(disabled);
    }

    /// Number of successful `set_item` calls.
    pub fn write_count(&self) -> u64 {
        self.writes.get()
    }

    /// Drop every key of this origin.
    pub fn end_session(&self) {
        self.items.borrow_mut().clear();
    }

    fn check_access(&self) -> Result<(), Error> {
        if self.disabled.get() {
            return Err(anyhow!("session storage is disabled for {}", self.origin));
        }
        Ok(())
    }
}

impl SessionStorage for MemorySessionStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, Error> {
        self.check_access()?;
        Ok(self.items.borrow().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), Error> {
        self.check_access()?;
        self.items
            .borrow_mut()
            .insert(key.to_owned(), value.to_owned());
        self.writes.set(self.writes.get().saturating_add(1));
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), Error> {
        self.check_access()?;
        self.items.borrow_mut().remove(key);
        Ok(())
    }
}

/// Narrow view over session storage for the single "fonts loaded" flag.
#[derive(Clone)]
pub struct FontCacheFlag {
    storage: Rc<dyn SessionStorage>,
    key: String,
}

impl FontCacheFlag {
    pub fn new(storage: Rc<dyn SessionStorage>, key: &str) -> Self {
        Self {
            storage,
            key: key.to_owned(),
        }
    }

    /// # Errors
    /// Propagates storage access failures.
    pub fn has_fonts_loaded(&self) -> Result<bool, Error> {
        Ok(self.storage.get_item(&self.key)?.is_some())
    }

    /// Set the flag unless it is already set. Returns whether a write
    /// happened.
    ///
    /// # Errors
    /// Propagates storage access failures.
    pub fn mark_fonts_loaded(&self) -> Result<bool, Error> {
        if self.has_fonts_loaded()? {
            return Ok(false);
        }
        self.storage.set_item(&self.key, "true")?;
        Ok(true)
    }

    /// # Errors
    /// Propagates storage access failures.
    pub fn clear(&self) -> Result<(), Error> {
        self.storage.remove_item(&self.key)
    }
}
