//! Configuration for the staged page loader.
//!
//! Every constant the phases depend on lives here: asset paths, marker
//! classes, measurement event names and the timing/heuristic thresholds.
//! Configuration can be loaded from environment variables or constructed
//! programmatically starting from [`LoaderConfig::default`].

use core::time::Duration;
use std::env;

/// Runtime configuration for a page load.
#[derive(Clone, Debug)]
pub struct LoaderConfig {
    /// Prefix for every first-party asset path (`window.hlx.codeBasePath`).
    pub code_base_path: String,
    /// Value written to the document element's `lang` attribute.
    pub language: String,
    /// Block names the meaningful-paint wait is bounded to.
    pub lcp_blocks: Vec<String>,
    /// Viewport width at or above which fonts load during the eager phase.
    pub font_min_viewport_width: u32,
    /// Delay between lazy completion and the delayed phase.
    pub delayed_phase_delay_ms: u64,
    /// Hosts (substring match) on which the font session flag is never set.
    pub local_hosts: Vec<String>,
    /// Session storage key of the font cache flag.
    pub font_flag_key: String,
    /// Class marking elements for the fade-up reveal.
    pub fade_marker_class: String,
    /// Class added when a fade-up element is revealed.
    pub reveal_class: String,
    /// Class added to the body once eager decoration is done.
    pub appear_class: String,
    pub main_selector: String,
    pub header_selector: String,
    pub footer_selector: String,
    pub block_selector: String,
    pub image_selector: String,
    pub embed_selector: String,
    pub embed_script_url: String,
    pub highlight_selector: String,
    pub highlight_initializer: String,
    pub lazy_event: String,
    pub delayed_event: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            code_base_path: String::new(),
            language: String::from("en"),
            lcp_blocks: Vec::new(),
            font_min_viewport_width: 900,
            delayed_phase_delay_ms: 3000,
            local_hosts: vec![String::from("localhost")],
            font_flag_key: String::from("fonts-loaded"),
            fade_marker_class: String::from("fadeup"),
            reveal_class: String::from("in-view"),
            appear_class: String::from("appear"),
            main_selector: String::from("main"),
            header_selector: String::from("header"),
            footer_selector: String::from("footer"),
            block_selector: String::from("div[data-block-name]"),
            image_selector: String::from("picture > img"),
            embed_selector: String::from(".codepen"),
            embed_script_url: String::from("https://cpwebassets.codepen.io/assets/embed/ei.js"),
            highlight_selector: String::from(".code-highlighted pre code"),
            highlight_initializer: String::from("hljs.highlightAll();"),
            lazy_event: String::from("lazy"),
            delayed_event: String::from("cwv"),
        }
    }
}

impl LoaderConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset or unparsable.
    ///
    /// Reads the following environment variables:
    /// - `PAGE_LOADER_CODE_BASE_PATH`: asset path prefix (default: empty)
    /// - `PAGE_LOADER_LANG`: document language (default: `en`)
    /// - `PAGE_LOADER_LCP_BLOCKS`: comma-separated block names (default: none)
    /// - `PAGE_LOADER_FONT_MIN_WIDTH`: eager font viewport threshold (default: 900)
    /// - `PAGE_LOADER_DELAYED_MS`: delayed phase timer in milliseconds (default: 3000)
    /// - `PAGE_LOADER_LOCAL_HOSTS`: comma-separated local host markers (default: `localhost`)
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let code_base_path = env::var("PAGE_LOADER_CODE_BASE_PATH")
            .map(|path| path.trim_end_matches('/').to_owned())
            .unwrap_or(defaults.code_base_path.clone());
        let language = env::var("PAGE_LOADER_LANG")
            .ok()
            .filter(|lang| !lang.trim().is_empty())
            .unwrap_or(defaults.language.clone());
        let lcp_blocks = env::var("PAGE_LOADER_LCP_BLOCKS")
            .map(|raw| split_list(&raw))
            .unwrap_or(defaults.lcp_blocks.clone());
        let font_min_viewport_width = env::var("PAGE_LOADER_FONT_MIN_WIDTH")
            .ok()
            .and_then(|val| val.parse::<u32>().ok())
            .unwrap_or(defaults.font_min_viewport_width);
        let delayed_phase_delay_ms = env::var("PAGE_LOADER_DELAYED_MS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .unwrap_or(defaults.delayed_phase_delay_ms);
        let local_hosts = env::var("PAGE_LOADER_LOCAL_HOSTS")
            .map(|raw| split_list(&raw))
            .unwrap_or(defaults.local_hosts.clone());
        Self {
            code_base_path,
            language,
            lcp_blocks,
            font_min_viewport_width,
            delayed_phase_delay_ms,
            local_hosts,
            ..defaults
        }
    }

    #[must_use]
    pub const fn delayed_phase_delay(&self) -> Duration {
        Duration::from_millis(self.delayed_phase_delay_ms)
    }

    /// Resolve a first-party asset path against the code base path.
    pub fn asset(&self, path: &str) -> String {
        format!("{}/{}", self.code_base_path, path.trim_start_matches('/'))
    }

    pub fn fonts_stylesheet(&self) -> String {
        self.asset("styles/fonts.css")
    }

    pub fn lazy_stylesheet(&self) -> String {
        self.asset("styles/lazy-styles.css")
    }

    pub fn highlight_stylesheet(&self) -> String {
        self.asset("lib/highlight/highlight.css")
    }

    pub fn highlight_script(&self) -> String {
        self.asset("lib/highlight/highlight.min.js")
    }

    /// Whether `host` counts as a local development host.
    pub fn is_local_host(&self, host: &str) -> bool {
        self.local_hosts
            .iter()
            .any(|marker| !marker.is_empty() && host.contains(marker.as_str()))
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}
