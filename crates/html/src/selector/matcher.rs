use super::{
    Combinator, ComplexSelector, CompoundSelector, ElementAdapter, SelectorList, SimpleSelector,
};

pub fn matches_selector_list<A: ElementAdapter>(
    adapter: &A,
    element: A::Handle,
    list: &SelectorList,
) -> bool {
    list.selectors
        .iter()
        .any(|selector_item| matches_complex(adapter, element, selector_item))
}

/// Right-to-left matching; descendant combinators backtrack over every
/// ancestor so `a b c` finds a match even when the nearest `b` has no `a`
/// above it.
pub fn matches_complex<A: ElementAdapter>(
    adapter: &A,
    element: A::Handle,
    sel: &ComplexSelector,
) -> bool {
    let compounds: Vec<&CompoundSelector> = core::iter::once(&sel.first)
        .chain(sel.rest.iter().map(|pair| &pair.1))
        .collect();
    let combinators: Vec<Combinator> = sel.rest.iter().map(|pair| pair.0).collect();
    match_from(adapter, element, &compounds, &combinators, compounds.len() - 1)
}

fn match_from<A: ElementAdapter>(
    adapter: &A,
    element: A::Handle,
    compounds: &[&CompoundSelector],
    combinators: &[Combinator],
    index: usize,
) -> bool {
    let Some(compound) = compounds.get(index) else {
        return false;
    };
    if !matches_compound(adapter, element, compound) {
        return false;
    }
    if index == 0 {
        return true;
    }
    match combinators.get(index - 1) {
        Some(Combinator::Child) => adapter
            .parent_element(element)
            .is_some_and(|parent| match_from(adapter, parent, compounds, combinators, index - 1)),
        Some(Combinator::Descendant) => {
            let mut ancestor = adapter.parent_element(element);
            while let Some(candidate) = ancestor {
                if match_from(adapter, candidate, compounds, combinators, index - 1) {
                    return true;
                }
                ancestor = adapter.parent_element(candidate);
            }
            false
        }
        None => false,
    }
}

pub fn matches_compound<A: ElementAdapter>(
    adapter: &A,
    element: A::Handle,
    compound: &CompoundSelector,
) -> bool {
    compound.simples.iter().all(|simple| match simple {
        SimpleSelector::Universal => true,
        SimpleSelector::Type(type_name) => adapter.local_name(element) == type_name.as_str(),
        SimpleSelector::Class(class_name) => adapter.has_class_token(element, class_name),
        SimpleSelector::IdSelector(id_value) => {
            adapter.element_id(element) == Some(id_value.as_str())
        }
        SimpleSelector::AttrExists { name } => adapter.attr(element, name).is_some(),
        SimpleSelector::AttrEquals { name, value } => {
            adapter.attr(element, name) == Some(value.as_str())
        }
    })
}
