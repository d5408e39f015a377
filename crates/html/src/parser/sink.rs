//! `TreeSink` that builds the indextree arena directly.
//!
//! html5ever asks for element names while constructing the tree, so every
//! handle carries its own `QualName`; the arena itself lives behind a
//! `RefCell` because the 0.29 sink API takes `&self`.

use core::cell::RefCell;
use std::borrow::Cow;
use std::rc::Rc;

use html5ever::tendril::StrTendril;
use html5ever::tree_builder::{ElementFlags, NodeOrText, QuirksMode, TreeSink};
use html5ever::{Attribute, ExpandedName, QualName, local_name, namespace_url};
use indextree::{Arena, NodeId};
use log::trace;

use crate::dom::{DOMNode, Document, NodeKind};

#[derive(Clone, Debug)]
pub struct SinkHandle {
    id: NodeId,
    name: Rc<QualName>,
}

pub struct DocumentSink {
    arena: RefCell<Arena<DOMNode>>,
    document: SinkHandle,
    /// Shared name for every non-element handle.
    anonymous: Rc<QualName>,
}

impl DocumentSink {
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let root = arena.new_node(DOMNode::default());
        let anonymous = Rc::new(QualName::new(None, namespace_url!(""), local_name!("")));
        Self {
            arena: RefCell::new(arena),
            document: SinkHandle {
                id: root,
                name: Rc::clone(&anonymous),
            },
            anonymous,
        }
    }

    fn new_handle(&self, data: DOMNode) -> SinkHandle {
        SinkHandle {
            id: self.arena.borrow_mut().new_node(data),
            name: Rc::clone(&self.anonymous),
        }
    }

    /// Append text to the text node `target` if it is one.
    fn merge_text(&self, target: Option<NodeId>, text: &str) -> bool {
        let Some(target) = target else {
            return false;
        };
        let mut arena = self.arena.borrow_mut();
        match arena.get_mut(target).map(indextree::Node::get_mut) {
            Some(DOMNode {
                kind: NodeKind::Text { text: existing },
                ..
            }) => {
                existing.push_str(text);
                true
            }
            _ => false,
        }
    }

    fn last_child(&self, parent: NodeId) -> Option<NodeId> {
        self.arena.borrow().get(parent)?.last_child()
    }

    fn previous_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.arena.borrow().get(node)?.previous_sibling()
    }

    fn has_parent(&self, node: NodeId) -> bool {
        self.arena
            .borrow()
            .get(node)
            .is_some_and(|data| data.parent().is_some())
    }

    fn append_node(&self, parent: NodeId, child: NodeId) {
        let mut arena = self.arena.borrow_mut();
        child.detach(&mut arena);
        if let Err(err) = parent.checked_append(child, &mut arena) {
            trace!("html sink: dropped append {child:?} -> {parent:?}: {err:?}");
        }
    }

    fn insert_before(&self, sibling: NodeId, node: NodeId) {
        let mut arena = self.arena.borrow_mut();
        node.detach(&mut arena);
        if let Err(err) = sibling.checked_insert_before(node, &mut arena) {
            trace!("html sink: dropped insert {node:?} before {sibling:?}: {err:?}");
        }
    }
}

impl TreeSink for DocumentSink {
    type Handle = SinkHandle;
    type Output = Document;
    type ElemName<'a> = ExpandedName<'a>;

    fn finish(self) -> Self::Output {
        Document::from_parts(self.arena.into_inner(), self.document.id)
    }

    fn parse_error(&self, msg: Cow<'static, str>) {
        trace!("html parse error: {msg}");
    }

    fn get_document(&self) -> Self::Handle {
        self.document.clone()
    }

    fn elem_name<'a>(&'a self, target: &'a Self::Handle) -> ExpandedName<'a> {
        target.name.expanded()
    }

    fn create_element(
        &self,
        name: QualName,
        attrs: Vec<Attribute>,
        _flags: ElementFlags,
    ) -> Self::Handle {
        let mut data = DOMNode::element(&name.local);
        for attr in attrs {
            data.attrs
                .push((attr.name.local.to_string(), attr.value.to_string()));
        }
        let id = self.arena.borrow_mut().new_node(data);
        SinkHandle {
            id,
            name: Rc::new(name),
        }
    }

    fn create_comment(&self, text: StrTendril) -> Self::Handle {
        self.new_handle(DOMNode::comment(&text))
    }

    fn create_pi(&self, _target: StrTendril, _data: StrTendril) -> Self::Handle {
        // Never attached; processing instructions are dropped.
        self.new_handle(DOMNode::comment(""))
    }

    fn append(&self, parent: &Self::Handle, child: NodeOrText<Self::Handle>) {
        match child {
            NodeOrText::AppendNode(node) => self.append_node(parent.id, node.id),
            NodeOrText::AppendText(text) => {
                if !self.merge_text(self.last_child(parent.id), &text) {
                    let node = self.new_handle(DOMNode::text(&text));
                    self.append_node(parent.id, node.id);
                }
            }
        }
    }

    fn append_based_on_parent_node(
        &self,
        element: &Self::Handle,
        prev_element: &Self::Handle,
        child: NodeOrText<Self::Handle>,
    ) {
        if self.has_parent(element.id) {
            self.append_before_sibling(element, child);
        } else {
            self.append(prev_element, child);
        }
    }

    fn append_doctype_to_document(
        &self,
        _name: StrTendril,
        _public_id: StrTendril,
        _system_id: StrTendril,
    ) {
    }

    fn get_template_contents(&self, target: &Self::Handle) -> Self::Handle {
        target.clone()
    }

    fn same_node(&self, x: &Self::Handle, y: &Self::Handle) -> bool {
        x.id == y.id
    }

    fn set_quirks_mode(&self, _mode: QuirksMode) {}

    fn append_before_sibling(&self, sibling: &Self::Handle, new_node: NodeOrText<Self::Handle>) {
        match new_node {
            NodeOrText::AppendNode(node) => self.insert_before(sibling.id, node.id),
            NodeOrText::AppendText(text) => {
                if !self.merge_text(self.previous_sibling(sibling.id), &text) {
                    let node = self.new_handle(DOMNode::text(&text));
                    self.insert_before(sibling.id, node.id);
                }
            }
        }
    }

    fn add_attrs_if_missing(&self, target: &Self::Handle, attrs: Vec<Attribute>) {
        let mut arena = self.arena.borrow_mut();
        let Some(data) = arena.get_mut(target.id).map(indextree::Node::get_mut) else {
            return;
        };
        for attr in attrs {
            let name = attr.name.local.to_string();
            if !data.attrs.iter().any(|(key, _)| *key == name) {
                data.attrs.push((name, attr.value.to_string()));
            }
        }
    }

    fn remove_from_parent(&self, target: &Self::Handle) {
        target.id.detach(&mut self.arena.borrow_mut());
    }

    fn reparent_children(&self, node: &Self::Handle, new_parent: &Self::Handle) {
        let children: Vec<NodeId> = {
            let arena = self.arena.borrow();
            node.id.children(&arena).collect()
        };
        for child in children {
            self.append_node(new_parent.id, child);
        }
    }
}
