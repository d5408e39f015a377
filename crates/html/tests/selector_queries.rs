#![allow(clippy::unwrap_used, reason = "Tests")]

use html::Document;

const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Post</title></head>
<body>
<header><nav><a href="/">Home</a></nav></header>
<main>
  <div class="section">
    <div class="cards" data-block-name="cards">
      <div><div><picture><img src="a.png" alt="a"></picture></div></div>
    </div>
    <div class="code-highlighted"><pre><code>fn main() {}</code></pre></div>
  </div>
  <div class="section fadeup" id="section-3">
    <p><picture><source srcset="b.webp"><img src="b.png"></picture></p>
  </div>
</main>
<footer></footer>
</body>
</html>"#;

fn init() -> Document {
    let _ = env_logger::builder().is_test(true).try_init();
    Document::parse(PAGE)
}

#[test]
fn block_and_image_queries() {
    let doc = init();
    let main = doc.query_selector(doc.root(), "main").unwrap().unwrap();
    assert_eq!(doc.query_selector_all(main, "div[data-block-name]").unwrap().len(), 1);
    let images = doc.query_selector_all(main, "picture > img").unwrap();
    let sources: Vec<_> = images
        .iter()
        .map(|img| doc.attribute(*img, "src").unwrap())
        .collect();
    assert_eq!(sources, vec!["a.png", "b.png"]);
}

#[test]
fn descendant_chain_and_lists() {
    let doc = init();
    let code = doc
        .query_selector(doc.root(), ".code-highlighted pre code")
        .unwrap()
        .unwrap();
    assert_eq!(doc.text_content(code), "fn main() {}");
    let regions = doc.query_selector_all(doc.root(), "footer, header").unwrap();
    // Document order, not selector order.
    assert_eq!(doc.tag_name(regions[0]), Some("header"));
    assert_eq!(doc.tag_name(regions[1]), Some("footer"));
}

#[test]
fn ids_classes_and_scoping() {
    let doc = init();
    let section = doc.get_element_by_id("section-3").unwrap();
    assert!(doc.has_class(section, "fadeup"));
    let main = doc.query_selector(doc.root(), "main").unwrap().unwrap();
    assert_eq!(doc.elements_by_class_name(main, "section").len(), 2);
    assert!(doc.query_selector(section, "code").unwrap().is_none());
    assert!(doc.query_selector(doc.root(), "main > .section#section-3").unwrap().is_some());
}

#[test]
fn moved_nodes_follow_new_position() {
    let mut doc = init();
    let main = doc.query_selector(doc.root(), "main").unwrap().unwrap();
    let code = doc.query_selector(main, "pre").unwrap().unwrap();
    let footer = doc.query_selector(doc.root(), "footer").unwrap().unwrap();
    assert!(doc.precedes(code, footer));
    doc.append_child(footer, code).unwrap();
    assert!(doc.precedes(footer, code));
    assert!(doc.query_selector(main, ".code-highlighted pre").unwrap().is_none());
    assert!(doc.query_selector(doc.root(), "footer > pre code").unwrap().is_some());
}
