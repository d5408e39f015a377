use anyhow::{Error, anyhow};
use indextree::{Arena, NodeId};
use smallvec::SmallVec;

use crate::selector::{ElementAdapter, SelectorList, matches_selector_list, parse_selector_list};

mod printing;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NodeKind {
    #[default]
    Document,
    Element {
        tag: String,
    },
    Text {
        text: String,
    },
    Comment {
        text: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct DOMNode {
    pub kind: NodeKind,
    pub attrs: SmallVec<(String, String), 4>,
}

impl DOMNode {
    pub fn element(tag: &str) -> Self {
        Self {
            kind: NodeKind::Element {
                tag: tag.to_ascii_lowercase(),
            },
            attrs: SmallVec::new(),
        }
    }

    pub fn text(text: &str) -> Self {
        Self {
            kind: NodeKind::Text {
                text: text.to_owned(),
            },
            attrs: SmallVec::new(),
        }
    }

    pub fn comment(text: &str) -> Self {
        Self {
            kind: NodeKind::Comment {
                text: text.to_owned(),
            },
            attrs: SmallVec::new(),
        }
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// A parsed (or programmatically built) HTML document.
///
/// Node ids stay valid for the lifetime of the document; detached nodes keep
/// their data and can be re-inserted, they are simply not "connected" and are
/// skipped by every query.
pub struct Document {
    pub(crate) arena: Arena<DOMNode>,
    pub(crate) root: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty document containing only the document node.
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let root = arena.new_node(DOMNode::default());
        Self { arena, root }
    }

    pub(crate) const fn from_parts(arena: Arena<DOMNode>, root: NodeId) -> Self {
        Self { arena, root }
    }

    pub const fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&DOMNode> {
        self.arena
            .get(id)
            .filter(|node| !node.is_removed())
            .map(indextree::Node::get)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut DOMNode> {
        self.arena
            .get_mut(id)
            .filter(|node| !node.is_removed())
            .map(indextree::Node::get_mut)
    }

    /// Lowercase tag name, `None` for non-element nodes.
    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        match &self.node(id)?.kind {
            NodeKind::Element { tag } => Some(tag.as_str()),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.tag_name(id).is_some()
    }

    // -----------------------
    // Tree construction
    // -----------------------

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.arena.new_node(DOMNode::element(tag))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.arena.new_node(DOMNode::text(text))
    }

    /// Append `child` as the last child of `parent`, moving it if it is
    /// already attached elsewhere.
    ///
    /// # Errors
    /// Fails when `child` is `parent` itself or one of its ancestors.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), Error> {
        self.check_insertion(parent, child)?;
        child.detach(&mut self.arena);
        parent
            .checked_append(child, &mut self.arena)
            .map_err(|err| anyhow!("cannot append {child:?} to {parent:?}: {err:?}"))
    }

    /// Insert `child` as the first child of `parent`, moving it if needed.
    ///
    /// # Errors
    /// Fails when `child` is `parent` itself or one of its ancestors.
    pub fn prepend_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), Error> {
        self.check_insertion(parent, child)?;
        child.detach(&mut self.arena);
        parent
            .checked_prepend(child, &mut self.arena)
            .map_err(|err| anyhow!("cannot prepend {child:?} to {parent:?}: {err:?}"))
    }

    fn check_insertion(&self, parent: NodeId, child: NodeId) -> Result<(), Error> {
        if self.node(parent).is_none() || self.node(child).is_none() {
            return Err(anyhow!("unknown node in insertion {parent:?} <- {child:?}"));
        }
        if parent.ancestors(&self.arena).any(|ancestor| ancestor == child) {
            return Err(anyhow!("{child:?} is an ancestor of {parent:?}"));
        }
        Ok(())
    }

    /// Remove a node (and its subtree) from its parent. The subtree stays
    /// usable for re-insertion.
    pub fn detach(&mut self, node: NodeId) {
        node.detach(&mut self.arena);
    }

    // -----------------------
    // Traversal
    // -----------------------

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.arena.get(node)?.parent()
    }

    pub fn children(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        node.children(&self.arena)
    }

    pub fn element_children(&self, node: NodeId) -> Vec<NodeId> {
        node.children(&self.arena)
            .filter(|child| self.is_element(*child))
            .collect()
    }

    /// Elements below `scope` in document order, excluding `scope` itself.
    pub fn descendant_elements(&self, scope: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        scope
            .descendants(&self.arena)
            .skip(1)
            .filter(|node| self.is_element(*node))
    }

    /// Whether the node is reachable from the document root.
    pub fn is_connected(&self, node: NodeId) -> bool {
        self.node(node).is_some()
            && node
                .ancestors(&self.arena)
                .any(|ancestor| ancestor == self.root)
    }

    /// True when `first` comes before `second` in a pre-order walk of the
    /// document. Disconnected nodes never precede anything.
    pub fn precedes(&self, first: NodeId, second: NodeId) -> bool {
        if first == second || !self.is_connected(first) || !self.is_connected(second) {
            return false;
        }
        self.root
            .descendants(&self.arena)
            .find(|node| *node == first || *node == second)
            .is_some_and(|node| node == first)
    }

    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        for descendant in node.descendants(&self.arena) {
            if let Some(NodeKind::Text { text }) = self.node(descendant).map(|data| &data.kind) {
                out.push_str(text);
            }
        }
        out
    }

    /// The `<html>` element.
    pub fn document_element(&self) -> Option<NodeId> {
        self.element_children(self.root).into_iter().next()
    }

    pub fn head(&self) -> Option<NodeId> {
        self.child_of_document_element("head")
    }

    pub fn body(&self) -> Option<NodeId> {
        self.child_of_document_element("body")
    }

    fn child_of_document_element(&self, tag: &str) -> Option<NodeId> {
        let html = self.document_element()?;
        self.element_children(html)
            .into_iter()
            .find(|child| self.tag_name(*child) == Some(tag))
    }

    // -----------------------
    // Attributes
    // -----------------------

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.node(node)?.attr(name)
    }

    /// Set an attribute, replacing any previous value.
    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        let Some(data) = self.node_mut(node) else {
            return;
        };
        if !matches!(data.kind, NodeKind::Element { .. }) {
            return;
        }
        if let Some(slot) = data.attrs.iter_mut().find(|(key, _)| key == name) {
            value.clone_into(&mut slot.1);
        } else {
            data.attrs.push((name.to_owned(), value.to_owned()));
        }
    }

    /// Returns whether the attribute existed.
    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> bool {
        let Some(data) = self.node_mut(node) else {
            return false;
        };
        let Some(index) = data.attrs.iter().position(|(key, _)| key == name) else {
            return false;
        };
        data.attrs.remove(index);
        true
    }

    pub fn class_list(&self, node: NodeId) -> Vec<&str> {
        self.attribute(node, "class")
            .map(|classes| classes.split_ascii_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.class_list(node).contains(&class)
    }

    /// Add a class token. Returns false when the token was already present.
    pub fn add_class(&mut self, node: NodeId, class: &str) -> bool {
        if !self.is_element(node) || self.has_class(node, class) {
            return false;
        }
        let mut tokens: Vec<String> = self
            .class_list(node)
            .into_iter()
            .map(str::to_owned)
            .collect();
        tokens.push(class.to_owned());
        self.set_attribute(node, "class", &tokens.join(" "));
        true
    }

    /// Remove a class token. Returns whether it was present.
    pub fn remove_class(&mut self, node: NodeId, class: &str) -> bool {
        if !self.has_class(node, class) {
            return false;
        }
        let remaining = self
            .class_list(node)
            .into_iter()
            .filter(|token| *token != class)
            .collect::<Vec<_>>()
            .join(" ");
        self.set_attribute(node, "class", &remaining);
        true
    }

    // -----------------------
    // Queries
    // -----------------------

    /// First connected element with the given id, in document order.
    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        if id.is_empty() {
            return None;
        }
        self.descendant_elements(self.root)
            .find(|node| self.attribute(*node, "id") == Some(id))
    }

    /// Elements below `scope` carrying `class`, in document order.
    pub fn elements_by_class_name(&self, scope: NodeId, class: &str) -> Vec<NodeId> {
        self.descendant_elements(scope)
            .filter(|node| self.has_class(*node, class))
            .collect()
    }

    /// First element below `scope` matching `selectors`.
    ///
    /// # Errors
    /// Returns an error if the selector text cannot be parsed.
    pub fn query_selector(&self, scope: NodeId, selectors: &str) -> Result<Option<NodeId>, Error> {
        let list = parse_selector_list(selectors)?;
        Ok(self.query_first(scope, &list))
    }

    /// Every element below `scope` matching `selectors`, in document order.
    ///
    /// # Errors
    /// Returns an error if the selector text cannot be parsed.
    pub fn query_selector_all(&self, scope: NodeId, selectors: &str) -> Result<Vec<NodeId>, Error> {
        let list = parse_selector_list(selectors)?;
        Ok(self.query_all(scope, &list))
    }

    pub fn query_first(&self, scope: NodeId, list: &SelectorList) -> Option<NodeId> {
        self.descendant_elements(scope)
            .find(|node| matches_selector_list(self, *node, list))
    }

    pub fn query_all(&self, scope: NodeId, list: &SelectorList) -> Vec<NodeId> {
        self.descendant_elements(scope)
            .filter(|node| matches_selector_list(self, *node, list))
            .collect()
    }
}

impl ElementAdapter for Document {
    type Handle = NodeId;

    fn parent_element(&self, element: NodeId) -> Option<NodeId> {
        self.parent(element).filter(|parent| self.is_element(*parent))
    }

    fn local_name(&self, element: NodeId) -> &str {
        self.tag_name(element).unwrap_or_default()
    }

    fn element_id(&self, element: NodeId) -> Option<&str> {
        self.attribute(element, "id")
    }

    fn has_class_token(&self, element: NodeId, class: &str) -> bool {
        self.has_class(element, class)
    }

    fn attr(&self, element: NodeId, name: &str) -> Option<&str> {
        self.attribute(element, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        Document::parse(
            r#"<html><head><title>t</title></head><body>
                <main><div class="a b" id="first"><p>one</p></div><p id="second">two</p></main>
                <footer></footer>
            </body></html>"#,
        )
    }

    #[test]
    fn class_tokens_are_a_set() {
        let mut doc = sample();
        let div = doc.get_element_by_id("first").expect("div");
        assert!(doc.has_class(div, "a"));
        assert!(!doc.add_class(div, "b"));
        assert!(doc.add_class(div, "in-view"));
        assert_eq!(doc.attribute(div, "class"), Some("a b in-view"));
        assert!(doc.remove_class(div, "a"));
        assert_eq!(doc.class_list(div), vec!["b", "in-view"]);
    }

    #[test]
    fn set_attribute_replaces_value() {
        let mut doc = sample();
        let para = doc.get_element_by_id("second").expect("p");
        doc.set_attribute(para, "target", "_blank");
        doc.set_attribute(para, "target", "_self");
        assert_eq!(doc.attribute(para, "target"), Some("_self"));
        assert!(doc.remove_attribute(para, "target"));
        assert!(!doc.remove_attribute(para, "target"));
    }

    #[test]
    fn precedes_follows_document_order() {
        let doc = sample();
        let first = doc.get_element_by_id("first").expect("first");
        let second = doc.get_element_by_id("second").expect("second");
        assert!(doc.precedes(first, second));
        assert!(!doc.precedes(second, first));
        assert!(!doc.precedes(first, first));
    }

    #[test]
    fn prepend_moves_existing_node() {
        let mut doc = sample();
        let main = doc.query_selector(doc.root(), "main").unwrap().expect("main");
        let second = doc.get_element_by_id("second").expect("second");
        doc.prepend_child(main, second).unwrap();
        assert_eq!(doc.element_children(main).first().copied(), Some(second));
        assert_eq!(doc.element_children(main).len(), 2);
    }

    #[test]
    fn cannot_insert_ancestor_into_descendant() {
        let mut doc = sample();
        let main = doc.query_selector(doc.root(), "main").unwrap().expect("main");
        let first = doc.get_element_by_id("first").expect("first");
        assert!(doc.append_child(first, main).is_err());
    }

    #[test]
    fn detached_nodes_are_not_queried() {
        let mut doc = sample();
        let first = doc.get_element_by_id("first").expect("first");
        doc.detach(first);
        assert!(doc.get_element_by_id("first").is_none());
        assert!(!doc.is_connected(first));
        assert_eq!(doc.text_content(first), "one");
    }

    #[test]
    fn body_and_head_are_found() {
        let doc = sample();
        let body = doc.body().expect("body");
        let head = doc.head().expect("head");
        assert_eq!(doc.tag_name(body), Some("body"));
        assert_eq!(doc.tag_name(head), Some("head"));
        assert_eq!(doc.tag_name(doc.document_element().expect("html")), Some("html"));
    }
}
