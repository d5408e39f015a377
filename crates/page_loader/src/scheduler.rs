//! Eager, lazy and delayed page loading.
//!
//! [`PageLoader::load_page`] is the usual entry point: it awaits the eager
//! phase, then the lazy phase, then arms a one-shot timer for the delayed
//! phase and returns. The individual phases are public too, but they must
//! run in order and each runs at most once.

use core::cell::RefCell;
use core::fmt;
use core::future::Future;
use std::rc::Rc;

use anyhow::Error;
use log::{debug, info, warn};
use tracing::{Instrument as _, info_span};

use crate::SharedDocument;
use crate::config::LoaderConfig;
use crate::decorate::decorate_main;
use crate::deferred::{FeatureContext, FeatureLoader};
use crate::environment::PageEnvironment;
use crate::fade::FadeInController;
use crate::fonts::FontLoader;
use crate::observer::{IntersectionHub, IntersectionObserver, LayoutGeometry, Viewport};
use crate::services::PageServices;
use crate::timer::{BackgroundTasks, ScheduledTask, Timer, TokioTimer};
use crate::trigger::{TriggerHandle, VisibilityTrigger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LoadPhase {
    Eager,
    Lazy,
    Delayed,
}

impl LoadPhase {
    const ORDER: [Self; 3] = [Self::Eager, Self::Lazy, Self::Delayed];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Eager => "eager",
            Self::Lazy => "lazy",
            Self::Delayed => "delayed",
        }
    }
}

impl fmt::Display for LoadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where the page load currently is.
///
/// `Lazy` covers both the running lazy phase and the wait for the delayed
/// timer; `Delayed` is only observable while the delayed phase runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Eager,
    Lazy,
    Delayed,
    Done,
}

/// A phase was requested that cannot run now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseError {
    /// Earlier phases have not completed yet.
    OutOfOrder {
        requested: LoadPhase,
        expected: Option<LoadPhase>,
    },
    AlreadyRunning(LoadPhase),
    AlreadyCompleted(LoadPhase),
    /// A previous phase failed, so the load cannot continue.
    Aborted(LoadPhase),
    DelayedAlreadyScheduled,
}

impl fmt::Display for PhaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfOrder {
                requested,
                expected: Some(expected),
            } => write!(f, "cannot run the {requested} phase before the {expected} phase"),
            Self::OutOfOrder {
                requested,
                expected: None,
            } => write!(f, "cannot run the {requested} phase, every phase already ran"),
            Self::AlreadyRunning(phase) => write!(f, "the {phase} phase is still running"),
            Self::AlreadyCompleted(phase) => write!(f, "the {phase} phase already ran"),
            Self::Aborted(phase) => write!(f, "page load aborted in the {phase} phase"),
            Self::DelayedAlreadyScheduled => f.write_str("the delayed phase is already scheduled"),
        }
    }
}

impl std::error::Error for PhaseError {}

struct Progress {
    state: SchedulerState,
    completed: Vec<LoadPhase>,
    running: Option<LoadPhase>,
    failed: Option<LoadPhase>,
    delayed_task: Option<ScheduledTask>,
}

impl Progress {
    const fn new() -> Self {
        Self {
            state: SchedulerState::Eager,
            completed: Vec::new(),
            running: None,
            failed: None,
            delayed_task: None,
        }
    }

    fn next_phase(&self) -> Option<LoadPhase> {
        LoadPhase::ORDER
            .into_iter()
            .find(|phase| !self.completed.contains(phase))
    }
}

struct LoaderInner {
    document: SharedDocument,
    services: Rc<dyn PageServices>,
    environment: PageEnvironment,
    config: LoaderConfig,
    timer: RefCell<Rc<dyn Timer>>,
    hub: IntersectionHub,
    tasks: BackgroundTasks,
    fonts: FontLoader,
    progress: RefCell<Progress>,
    fade_observer: RefCell<Option<IntersectionObserver>>,
    feature_triggers: RefCell<Vec<TriggerHandle>>,
}

/// Drives one page through its load phases. Cloning yields another handle
/// to the same load.
#[derive(Clone)]
pub struct PageLoader {
    inner: Rc<LoaderInner>,
}

impl PageLoader {
    pub fn new(
        document: SharedDocument,
        services: Rc<dyn PageServices>,
        environment: PageEnvironment,
        config: LoaderConfig,
    ) -> Self {
        let fonts = FontLoader::new(Rc::clone(&services), &environment, &config);
        Self {
            inner: Rc::new(LoaderInner {
                document,
                services,
                environment,
                config,
                timer: RefCell::new(Rc::new(TokioTimer)),
                hub: IntersectionHub::new(),
                tasks: BackgroundTasks::new(),
                fonts,
                progress: RefCell::new(Progress::new()),
                fade_observer: RefCell::new(None),
                feature_triggers: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Replace the timer used for the delayed phase.
    #[must_use]
    pub fn with_timer(self, timer: Rc<dyn Timer>) -> Self {
        *self.inner.timer.borrow_mut() = timer;
        self
    }

    pub fn document(&self) -> SharedDocument {
        Rc::clone(&self.inner.document)
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.inner.config
    }

    pub fn environment(&self) -> &PageEnvironment {
        &self.inner.environment
    }

    pub fn fonts(&self) -> &FontLoader {
        &self.inner.fonts
    }

    pub fn hub(&self) -> &IntersectionHub {
        &self.inner.hub
    }

    pub fn state(&self) -> SchedulerState {
        self.inner.progress.borrow().state
    }

    pub fn completed_phases(&self) -> Vec<LoadPhase> {
        self.inner.progress.borrow().completed.clone()
    }

    /// Observer revealing fade-up elements, once the lazy phase created it.
    pub fn fade_observer(&self) -> Option<IntersectionObserver> {
        self.inner.fade_observer.borrow().clone()
    }

    /// Triggers armed by the delayed phase's feature loaders.
    pub fn feature_triggers(&self) -> Vec<TriggerHandle> {
        self.inner.feature_triggers.borrow().clone()
    }

    /// Report a new viewport or layout to every visibility observer.
    ///
    /// Fade-in and the embed loader react synchronously. The syntax
    /// highlight loader starts its stylesheet and script loads with
    /// `tokio::task::spawn_local`, so once the delayed phase ran this must
    /// be called from inside the [`tokio::task::LocalSet`] driving the page.
    pub fn update_viewport(&self, viewport: Viewport, geometry: &dyn LayoutGeometry) {
        self.inner.hub.notify(viewport, geometry);
    }

    /// Wait for every fire-and-forget task started so far.
    pub async fn settle(&self) {
        self.inner.tasks.settle().await;
    }

    /// Cancel the armed delayed-phase timer. Returns false when there was
    /// nothing to cancel.
    pub fn cancel_delayed(&self) -> bool {
        let progress = self.inner.progress.borrow();
        match &progress.delayed_task {
            Some(task) if !task.is_cancelled() => {
                task.cancel();
                true
            }
            _ => false,
        }
    }

    /// Eager phase, lazy phase, then arm the delayed timer.
    ///
    /// # Errors
    /// Propagates failures of either phase; the delayed phase is not armed
    /// in that case.
    pub async fn load_page(&self) -> Result<(), Error> {
        self.load_eager().await?;
        self.load_lazy().await?;
        self.schedule_delayed()?;
        Ok(())
    }

    /// # Errors
    /// Fails on out-of-order use or when a decoration step or the paint
    /// wait fails.
    pub async fn load_eager(&self) -> Result<(), Error> {
        self.begin(LoadPhase::Eager)?;
        let result = self.run_eager().instrument(info_span!("page.eager")).await;
        self.finish(LoadPhase::Eager, result.is_ok());
        result
    }

    /// # Errors
    /// Fails on out-of-order use or when loading blocks fails.
    pub async fn load_lazy(&self) -> Result<(), Error> {
        self.begin(LoadPhase::Lazy)?;
        let result = self.run_lazy().instrument(info_span!("page.lazy")).await;
        self.finish(LoadPhase::Lazy, result.is_ok());
        result
    }

    /// Arm the one-shot delayed-phase timer.
    ///
    /// # Errors
    /// Fails unless the lazy phase completed and no timer is armed yet.
    pub fn schedule_delayed(&self) -> Result<ScheduledTask, PhaseError> {
        {
            let progress = self.inner.progress.borrow();
            if let Some(failed) = progress.failed {
                return Err(PhaseError::Aborted(failed));
            }
            if !progress.completed.contains(&LoadPhase::Lazy) {
                return Err(PhaseError::OutOfOrder {
                    requested: LoadPhase::Delayed,
                    expected: progress.next_phase(),
                });
            }
            if progress.completed.contains(&LoadPhase::Delayed) {
                return Err(PhaseError::AlreadyCompleted(LoadPhase::Delayed));
            }
            if progress.delayed_task.is_some() {
                return Err(PhaseError::DelayedAlreadyScheduled);
            }
        }

        let delay = self.inner.config.delayed_phase_delay();
        // The timer owns a handle so the phase still runs after the host
        // drops its loader; only `cancel_delayed` can stop it.
        let loader = self.clone();
        let timer = Rc::clone(&self.inner.timer.borrow());
        let task = timer.schedule(
            delay,
            Box::new(move || {
                if let Err(err) = loader.load_delayed() {
                    warn!("delayed phase did not run: {err:#}");
                }
            }),
        );
        debug!("delayed phase armed for {delay:?}");
        self.inner.progress.borrow_mut().delayed_task = Some(task.clone());
        Ok(task)
    }

    /// Run the delayed phase now. Cancels the armed timer, if any.
    ///
    /// # Errors
    /// Fails on out-of-order use.
    pub fn load_delayed(&self) -> Result<(), Error> {
        self.begin(LoadPhase::Delayed)?;
        if let Some(task) = &self.inner.progress.borrow().delayed_task {
            task.cancel();
        }
        let span = info_span!("page.delayed");
        {
            let _entered = span.enter();
            self.run_delayed();
        }
        self.finish(LoadPhase::Delayed, true);
        Ok(())
    }

    fn begin(&self, phase: LoadPhase) -> Result<(), PhaseError> {
        let mut progress = self.inner.progress.borrow_mut();
        if let Some(failed) = progress.failed {
            return Err(PhaseError::Aborted(failed));
        }
        if let Some(running) = progress.running {
            return Err(PhaseError::AlreadyRunning(running));
        }
        if progress.completed.contains(&phase) {
            return Err(PhaseError::AlreadyCompleted(phase));
        }
        let expected = progress.next_phase();
        if expected != Some(phase) {
            return Err(PhaseError::OutOfOrder {
                requested: phase,
                expected,
            });
        }
        progress.running = Some(phase);
        if phase == LoadPhase::Delayed {
            progress.state = SchedulerState::Delayed;
        }
        info!("{phase} phase started");
        Ok(())
    }

    fn finish(&self, phase: LoadPhase, succeeded: bool) {
        let mut progress = self.inner.progress.borrow_mut();
        progress.running = None;
        if !succeeded {
            warn!("{phase} phase failed, page load stops here");
            progress.failed = Some(phase);
            return;
        }
        progress.completed.push(phase);
        progress.state = match phase {
            LoadPhase::Eager | LoadPhase::Lazy => SchedulerState::Lazy,
            LoadPhase::Delayed => SchedulerState::Done,
        };
        info!("{phase} phase finished");
    }

    async fn run_eager(&self) -> Result<(), Error> {
        let inner = &self.inner;
        let config = &inner.config;
        let main = {
            let mut document = inner.document.borrow_mut();
            if let Some(html) = document.document_element() {
                document.set_attribute(html, "lang", &config.language);
            }
            inner.services.decorate_template_and_theme(&mut document)?;
            let root = document.root();
            let main = document.query_selector(root, &config.main_selector)?;
            if let Some(main) = main {
                decorate_main(
                    &mut document,
                    main,
                    inner.services.as_ref(),
                    inner.environment.url(),
                )?;
                if let Some(body) = document.body() {
                    document.add_class(body, &config.appear_class);
                }
            }
            main
        };

        if main.is_some() {
            inner
                .services
                .wait_for_lcp(Rc::clone(&inner.document), &config.lcp_blocks)
                .await?;
        } else {
            debug!("no {} element, skipping decoration", config.main_selector);
        }

        if inner
            .fonts
            .should_load_eagerly(inner.environment.viewport_width())
        {
            inner.tasks.spawn("eager-fonts", fonts_task(&inner.fonts));
        }
        Ok(())
    }

    async fn run_lazy(&self) -> Result<(), Error> {
        let inner = &self.inner;
        let config = &inner.config;
        let main = {
            let document = inner.document.borrow();
            document.query_selector(document.root(), &config.main_selector)?
        };

        let fade = FadeInController::new(
            Rc::clone(&inner.document),
            inner.hub.clone(),
            &config.fade_marker_class,
            &config.reveal_class,
        );
        *inner.fade_observer.borrow_mut() = fade.activate(main);

        if let Some(main) = main {
            inner
                .services
                .load_blocks(Rc::clone(&inner.document), main)
                .await?;
        }

        if let Some(fragment) = inner.environment.fragment() {
            let document = inner.document.borrow();
            match document.get_element_by_id(fragment) {
                Some(target) => inner.services.scroll_into_view(&document, target),
                None => debug!("no element for fragment #{fragment}"),
            }
        }

        let (header, footer) = {
            let document = inner.document.borrow();
            let root = document.root();
            (
                document.query_selector(root, &config.header_selector)?,
                document.query_selector(root, &config.footer_selector)?,
            )
        };
        let header_load = inner
            .services
            .load_header(Rc::clone(&inner.document), header);
        inner.tasks.spawn("header", header_load);
        let footer_load = inner
            .services
            .load_footer(Rc::clone(&inner.document), footer);
        inner.tasks.spawn("footer", footer_load);

        let lazy_styles = inner.services.load_css(&config.lazy_stylesheet());
        inner.tasks.spawn("lazy-styles", lazy_styles);
        inner.tasks.spawn("lazy-fonts", fonts_task(&inner.fonts));

        inner.services.emit_measurement(&config.lazy_event, None);
        if let Some(main) = main {
            let document = inner.document.borrow();
            let blocks = document.query_selector_all(main, &config.block_selector)?;
            inner.services.observe_for_measurement(&document, &blocks);
            let images = document.query_selector_all(main, &config.image_selector)?;
            inner.services.observe_for_measurement(&document, &images);
        }
        Ok(())
    }

    fn run_delayed(&self) {
        let inner = &self.inner;
        inner
            .services
            .emit_measurement(&inner.config.delayed_event, None);

        let context = FeatureContext {
            document: Rc::clone(&inner.document),
            trigger: VisibilityTrigger::new(inner.hub.clone()),
            services: Rc::clone(&inner.services),
            tasks: inner.tasks.clone(),
        };
        let loaders = [
            FeatureLoader::embed(&inner.config),
            FeatureLoader::syntax_highlight(&inner.config),
        ];
        let mut armed = inner.feature_triggers.borrow_mut();
        for loader in &loaders {
            if let Some(handle) = loader.install(&context) {
                debug!("{} loader armed", loader.name);
                armed.push(handle);
            }
        }
    }
}

fn fonts_task(fonts: &FontLoader) -> impl Future<Output = Result<(), Error>> + use<> {
    let load = fonts.ensure_fonts();
    async move {
        load.await;
        Ok(())
    }
}
