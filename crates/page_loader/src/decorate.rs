//! Structural decoration of the primary content container.
//!
//! Block, section, button and icon rules belong to the host and are reached
//! through [`PageServices`]; this module only owns the pieces the loader
//! builds itself: auto-blocks and link targets.

use anyhow::Error;
use html::{Document, NodeId};
use log::{error, trace};
use url::Url;

use crate::environment::resolve_href;
use crate::services::PageServices;

/// Run the full decoration pipeline over `main`.
///
/// Auto-block failures are logged and skipped; every other failure aborts
/// decoration.
///
/// # Errors
/// Propagates failures of the host decoration steps.
pub fn decorate_main(
    document: &mut Document,
    main: NodeId,
    services: &dyn PageServices,
    page: &Url,
) -> Result<(), Error> {
    services.decorate_buttons(document, main)?;
    services.decorate_icons(document, main)?;
    build_auto_blocks(document, main);
    services.decorate_sections(document, main)?;
    services.decorate_blocks(document, main)?;
    decorate_links(document, main, services, page);
    Ok(())
}

/// Wrap `elements` in a block table: `div.name > div > div`, moving every
/// element into the single cell in the given order.
///
/// # Errors
/// Fails if one of the elements cannot be moved.
pub fn build_block(document: &mut Document, name: &str, elements: &[NodeId]) -> Result<NodeId, Error> {
    let block = document.create_element("div");
    document.add_class(block, name);
    let row = document.create_element("div");
    let cell = document.create_element("div");
    document.append_child(block, row)?;
    document.append_child(row, cell)?;
    for element in elements {
        document.append_child(cell, *element)?;
    }
    Ok(block)
}

/// Combine the first `h1` and `picture` into a hero block when the heading
/// comes first. The block goes into a new section prepended to `main`.
///
/// Returns the new section. Once built, the picture precedes the heading,
/// so running this again builds nothing.
///
/// # Errors
/// Fails if the tree cannot be rearranged.
pub fn build_hero_block(document: &mut Document, main: NodeId) -> Result<Option<NodeId>, Error> {
    let heading = document.query_selector(main, "h1")?;
    let picture = document.query_selector(main, "picture")?;
    let (Some(heading), Some(picture)) = (heading, picture) else {
        return Ok(None);
    };
    if !document.precedes(heading, picture) {
        return Ok(None);
    }
    let section = document.create_element("div");
    let block = build_block(document, "hero", &[picture, heading])?;
    document.append_child(section, block)?;
    document.prepend_child(main, section)?;
    trace!("built hero block in {section:?}");
    Ok(Some(section))
}

pub fn build_auto_blocks(document: &mut Document, main: NodeId) {
    if let Err(err) = build_hero_block(document, main) {
        error!("Auto Blocking failed: {err:#}");
    }
}

/// Set `target` on every link below `main`, replacing any existing value.
/// Returns how many links were annotated.
pub fn decorate_links(
    document: &mut Document,
    main: NodeId,
    services: &dyn PageServices,
    page: &Url,
) -> usize {
    let links: Vec<NodeId> = document
        .descendant_elements(main)
        .filter(|node| document.tag_name(*node) == Some("a"))
        .collect();
    for link in &links {
        let href = document
            .attribute(*link, "href")
            .map(|raw| resolve_href(page, raw))
            .unwrap_or_default();
        let target = services.classify_link_target(&href, page);
        document.set_attribute(*link, "target", &target);
    }
    links.len()
}
