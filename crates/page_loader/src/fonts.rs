//! Web font loading coordinated through the session cache flag.

use core::cell::Cell;
use core::future::Future;
use std::rc::Rc;

use anyhow::Error;
use log::debug;

use crate::config::LoaderConfig;
use crate::environment::PageEnvironment;
use crate::services::PageServices;
use crate::storage::FontCacheFlag;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontLoadState {
    NotAttempted,
    LoadedThisSession,
    /// The flag was already set when this page started loading.
    LoadedPreviously,
}

/// Loads the font stylesheet and records success in session storage.
///
/// Every failure is swallowed: fonts are an enhancement and must never
/// break a page load.
#[derive(Clone)]
pub struct FontLoader {
    services: Rc<dyn PageServices>,
    flag: FontCacheFlag,
    stylesheet: String,
    local_host: bool,
    min_viewport_width: u32,
    state: Rc<Cell<FontLoadState>>,
}

impl FontLoader {
    pub fn new(
        services: Rc<dyn PageServices>,
        environment: &PageEnvironment,
        config: &LoaderConfig,
    ) -> Self {
        let flag = FontCacheFlag::new(environment.storage(), &config.font_flag_key);
        let initial = match flag.has_fonts_loaded() {
            Ok(true) => FontLoadState::LoadedPreviously,
            Ok(false) => FontLoadState::NotAttempted,
            Err(err) => {
                debug!("font cache flag unreadable: {err}");
                FontLoadState::NotAttempted
            }
        };
        Self {
            services,
            flag,
            stylesheet: config.fonts_stylesheet(),
            local_host: config.is_local_host(environment.host()),
            min_viewport_width: config.font_min_viewport_width,
            state: Rc::new(Cell::new(initial)),
        }
    }

    pub fn state(&self) -> FontLoadState {
        self.state.get()
    }

    pub fn flag(&self) -> &FontCacheFlag {
        &self.flag
    }

    /// Eager-phase heuristic: wide viewports stand in for fast connections,
    /// and a set flag means the fonts are likely cached already.
    pub fn should_load_eagerly(&self, viewport_width: u32) -> bool {
        if viewport_width >= self.min_viewport_width {
            return true;
        }
        self.flag.has_fonts_loaded().unwrap_or_else(|err| {
            debug!("font cache flag unreadable: {err}");
            false
        })
    }

    /// Load the font stylesheet and, off local hosts, set the session flag.
    /// The stylesheet load starts immediately; the returned future finishes
    /// the bookkeeping and can be awaited or spawned. Safe to call any
    /// number of times.
    pub fn ensure_fonts(&self) -> impl Future<Output = ()> + use<> {
        let load = self.services.load_css(&self.stylesheet);
        let loader = self.clone();
        async move { loader.record(load.await) }
    }

    fn record(&self, loaded: Result<(), Error>) {
        if let Err(err) = loaded {
            debug!("font stylesheet {} failed: {err}", self.stylesheet);
            return;
        }
        if self.state.get() == FontLoadState::NotAttempted {
            self.state.set(FontLoadState::LoadedThisSession);
        }
        if self.local_host {
            return;
        }
        match self.flag.mark_fonts_loaded() {
            Ok(true) => debug!("font cache flag set"),
            Ok(false) => {}
            Err(err) => debug!("font cache flag not written: {err}"),
        }
    }
}
