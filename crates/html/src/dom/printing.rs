use core::fmt;

use indextree::NodeId;
use serde_json::{Map, Value, json};

use super::{DOMNode, Document, NodeKind};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

fn escape_text(raw: &str, out: &mut String) {
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

fn escape_attr(raw: &str, out: &mut String) {
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

fn write_html(doc: &Document, id: NodeId, out: &mut String) {
    let Some(DOMNode { kind, attrs }) = doc.node(id) else {
        return;
    };
    match kind {
        NodeKind::Document => {
            for child in doc.children(id) {
                write_html(doc, child, out);
            }
        }
        NodeKind::Element { tag } => {
            out.push('<');
            out.push_str(tag);
            for (name, value) in attrs.iter() {
                out.push(' ');
                out.push_str(name);
                if !value.is_empty() {
                    out.push_str("=\"");
                    escape_attr(value, out);
                    out.push('"');
                }
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&tag.as_str()) {
                return;
            }
            for child in doc.children(id) {
                write_html(doc, child, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        NodeKind::Text { text } => escape_text(text, out),
        NodeKind::Comment { text } => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
    }
}

fn node_to_json(doc: &Document, id: NodeId) -> Value {
    let Some(DOMNode { kind, attrs }) = doc.node(id) else {
        return Value::Null;
    };
    let children = || -> Vec<Value> {
        doc.children(id)
            .map(|child| node_to_json(doc, child))
            .filter(|value| !value.is_null())
            .collect()
    };
    match kind {
        NodeKind::Document => json!({ "type": "document", "children": children() }),
        NodeKind::Element { tag } => {
            let mut pairs: Vec<(String, String)> = attrs.iter().cloned().collect();
            pairs.sort_by(|left, right| left.0.cmp(&right.0));
            let mut attrs_obj = Map::new();
            for (key, value) in pairs {
                attrs_obj.insert(key, Value::String(value));
            }
            json!({
                "type": "element",
                "tag": tag,
                "attrs": Value::Object(attrs_obj),
                "children": children(),
            })
        }
        NodeKind::Text { text } => {
            if text.trim().is_empty() {
                Value::Null
            } else {
                json!({ "type": "text", "text": text })
            }
        }
        NodeKind::Comment { .. } => Value::Null,
    }
}

impl Document {
    /// Serialize a node and its subtree back to markup.
    pub fn outer_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        write_html(self, node, &mut out);
        out
    }

    /// Serialize only the children of a node.
    pub fn inner_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        for child in self.children(node) {
            write_html(self, child, &mut out);
        }
        out
    }

    /// Deterministic JSON snapshot; whitespace-only text and comments are
    /// omitted, attributes are sorted by name.
    pub fn to_json_value(&self) -> Value {
        node_to_json(self, self.root)
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn fmt_node(
            doc: &Document,
            id: NodeId,
            f: &mut fmt::Formatter<'_>,
            depth: usize,
        ) -> fmt::Result {
            let Some(DOMNode { kind, attrs }) = doc.node(id) else {
                return Ok(());
            };
            let indent = "  ".repeat(depth);
            match kind {
                NodeKind::Document => writeln!(f, "{indent}#document")?,
                NodeKind::Element { tag } => {
                    write!(f, "{indent}<{tag}")?;
                    for (key, value) in attrs.iter() {
                        write!(f, " {key}={value:?}")?;
                    }
                    writeln!(f, ">")?;
                }
                NodeKind::Text { text } => {
                    if text.chars().all(char::is_whitespace) {
                        return Ok(());
                    }
                    writeln!(f, "{indent}{text:?}")?;
                }
                NodeKind::Comment { text } => writeln!(f, "{indent}<!--{text}-->")?,
            }
            for child in doc.children(id) {
                fmt_node(doc, child, f, depth + 1)?;
            }
            Ok(())
        }

        fmt_node(self, self.root, f, 0)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.outer_html(self.root))
    }
}

#[cfg(test)]
mod tests {
    use crate::Document;

    #[test]
    fn outer_html_round_trips_simple_markup() {
        let doc = Document::parse(r#"<main><p class="x">a &amp; b<br></p></main>"#);
        let main = doc.query_selector(doc.root(), "main").unwrap().expect("main");
        assert_eq!(doc.outer_html(main), r#"<main><p class="x">a &amp; b<br></p></main>"#);
    }

    #[test]
    fn json_snapshot_skips_whitespace() {
        let doc = Document::parse("<main>\n  <h1>T</h1>\n</main>");
        let json = doc.to_json_value();
        let text = json.to_string();
        assert!(text.contains(r#""tag":"h1""#));
        assert!(!text.contains(r#""text":"\n  ""#));
    }
}
