//! Selector subset used for document queries.
//!
//! Supported: type, class, id, `[attr]`, `[attr=value]`, `*`, the descendant
//! and child combinators, and comma-separated lists. Anything else is
//! rejected at parse time instead of silently matching nothing.

mod matcher;
mod parser;

pub use matcher::{matches_complex, matches_compound, matches_selector_list};
pub use parser::{parse_complex_selector, parse_selector_list};

/// Abstracts DOM access for selector matching.
pub trait ElementAdapter {
    type Handle: Copy + Eq;

    /// Parent element, `None` at the top of the element tree.
    fn parent_element(&self, element: Self::Handle) -> Option<Self::Handle>;

    /// Tag name in ASCII lowercase.
    fn local_name(&self, element: Self::Handle) -> &str;

    fn element_id(&self, element: Self::Handle) -> Option<&str>;

    fn has_class_token(&self, element: Self::Handle, class: &str) -> bool;

    fn attr(&self, element: Self::Handle, name: &str) -> Option<&str>;
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SimpleSelector {
    Type(String),
    Class(String),
    IdSelector(String),
    AttrExists { name: String },
    AttrEquals { name: String, value: String },
    Universal,
}

/// A sequence of simple selectors with no combinators.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct CompoundSelector {
    pub simples: Vec<SimpleSelector>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Combinator {
    Descendant,
    Child,
}

/// One or more compounds separated by combinators, stored left to right.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ComplexSelector {
    pub first: CompoundSelector,
    pub rest: Vec<(Combinator, CompoundSelector)>,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct SelectorList {
    pub selectors: Vec<ComplexSelector>,
}
