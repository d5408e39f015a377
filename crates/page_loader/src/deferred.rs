//! Features loaded only once their content scrolls near the viewport.

use std::rc::Rc;

use anyhow::{Error, anyhow};
use html::{Document, NodeId};
use log::{debug, warn};

use crate::SharedDocument;
use crate::config::LoaderConfig;
use crate::services::PageServices;
use crate::timer::BackgroundTasks;
use crate::trigger::{TriggerHandle, TriggerOptions, VisibilityTrigger};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureAction {
    /// Append an external `async` script to the body.
    EmbedScript { src: String },
    /// Load a stylesheet and a script, then append an inline initializer.
    SyntaxHighlight {
        stylesheet: String,
        script: String,
        initializer: String,
    },
}

/// What the feature loaders need from the page.
#[derive(Clone)]
pub struct FeatureContext {
    pub document: SharedDocument,
    pub trigger: VisibilityTrigger,
    pub services: Rc<dyn PageServices>,
    pub tasks: BackgroundTasks,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureLoader {
    pub name: &'static str,
    pub selector: String,
    pub action: FeatureAction,
}

impl FeatureLoader {
    pub fn embed(config: &LoaderConfig) -> Self {
        Self {
            name: "embed",
            selector: config.embed_selector.clone(),
            action: FeatureAction::EmbedScript {
                src: config.embed_script_url.clone(),
            },
        }
    }

    pub fn syntax_highlight(config: &LoaderConfig) -> Self {
        Self {
            name: "syntax-highlight",
            selector: config.highlight_selector.clone(),
            action: FeatureAction::SyntaxHighlight {
                stylesheet: config.highlight_stylesheet(),
                script: config.highlight_script(),
                initializer: config.highlight_initializer.clone(),
            },
        }
    }

    /// Watch the first element matching the selector. Returns the trigger
    /// handle, or `None` when nothing on the page matches.
    pub fn install(&self, context: &FeatureContext) -> Option<TriggerHandle> {
        let element = {
            let document = context.document.borrow();
            match document.query_selector(document.root(), &self.selector) {
                Ok(found) => found,
                Err(err) => {
                    warn!("{} loader has an invalid selector: {err}", self.name);
                    return None;
                }
            }
        };
        let name = self.name;
        let action = self.action.clone();
        let run_context = context.clone();
        context.trigger.watch(
            element,
            move || {
                debug!("{name} content is near the viewport, loading");
                match action {
                    FeatureAction::EmbedScript { src } => {
                        if let Err(err) = append_embed_script(&run_context.document, &src) {
                            warn!("{name} loader could not append {src}: {err}");
                        }
                    }
                    FeatureAction::SyntaxHighlight {
                        stylesheet,
                        script,
                        initializer,
                    } => {
                        let load = load_highlighter(
                            run_context.clone(),
                            stylesheet,
                            script,
                            initializer,
                        );
                        run_context.tasks.spawn(name, load);
                    }
                }
            },
            TriggerOptions::default(),
        )
    }
}

fn append_embed_script(document: &SharedDocument, src: &str) -> Result<(), Error> {
    let mut document = document.borrow_mut();
    let script = document.create_element("script");
    document.set_attribute(script, "src", src);
    document.set_attribute(script, "async", "");
    append_to_body(&mut document, script)
}

async fn load_highlighter(
    context: FeatureContext,
    stylesheet: String,
    script: String,
    initializer: String,
) -> Result<(), Error> {
    if let Err(err) = context.services.load_css(&stylesheet).await {
        debug!("highlight stylesheet {stylesheet} failed: {err}");
    }
    if let Err(err) = context.services.load_script(&script).await {
        warn!("highlight script {script} failed, skipping initializer: {err}");
        return Ok(());
    }
    let mut document = context.document.borrow_mut();
    let init = document.create_element("script");
    let text = document.create_text(&initializer);
    document.append_child(init, text)?;
    append_to_body(&mut document, init)
}

fn append_to_body(document: &mut Document, node: NodeId) -> Result<(), Error> {
    let body = document
        .body()
        .ok_or_else(|| anyhow!("document has no body"))?;
    document.append_child(body, node)
}
