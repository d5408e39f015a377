use anyhow::{Error, anyhow};
use core::mem::take;

use super::{Combinator, ComplexSelector, CompoundSelector, SelectorList, SimpleSelector};

#[derive(Clone, Debug, PartialEq, Eq)]
enum Tok {
    Combinator(Combinator),
    /// Whitespace that may turn into a descendant combinator.
    DescendantWS,
    Simple(SimpleSelector),
}

struct SelectorTokenizer<'src> {
    input: &'src [u8],
    index: usize,
    pending_whitespace: bool,
}

impl<'src> SelectorTokenizer<'src> {
    const fn new(input: &'src str) -> Self {
        Self {
            input: input.as_bytes(),
            index: 0,
            pending_whitespace: false,
        }
    }

    fn next_token(&mut self) -> Result<Option<Tok>, Error> {
        self.skip_whitespace_descendant();
        if self.pending_whitespace {
            self.pending_whitespace = false;
            if self.input.get(self.index).is_none() {
                return Ok(None);
            }
            return Ok(Some(Tok::DescendantWS));
        }
        let Some(&current) = self.input.get(self.index) else {
            return Ok(None);
        };
        let token = match current {
            b'*' => {
                self.index += 1;
                Tok::Simple(SimpleSelector::Universal)
            }
            b'.' => {
                self.index += 1;
                Tok::Simple(SimpleSelector::Class(self.consume_ident()?))
            }
            b'#' => {
                self.index += 1;
                Tok::Simple(SimpleSelector::IdSelector(self.consume_ident()?))
            }
            b'[' => self.consume_attr()?,
            b'>' => {
                self.index += 1;
                Tok::Combinator(Combinator::Child)
            }
            byte if byte.is_ascii_alphabetic() => {
                Tok::Simple(SimpleSelector::Type(self.consume_ident()?.to_ascii_lowercase()))
            }
            other => {
                return Err(anyhow!(
                    "unsupported selector syntax {:?} at offset {}",
                    char::from(other),
                    self.index
                ));
            }
        };
        Ok(Some(token))
    }

    fn skip_whitespace_descendant(&mut self) {
        let mut saw = false;
        while self
            .input
            .get(self.index)
            .is_some_and(u8::is_ascii_whitespace)
        {
            saw = true;
            self.index += 1;
        }
        self.pending_whitespace = saw;
    }

    /// ASCII alphanumerics, '-' and '_'. Case is preserved; class and id
    /// matching is case-sensitive.
    fn consume_ident(&mut self) -> Result<String, Error> {
        let start = self.index;
        while self
            .input
            .get(self.index)
            .is_some_and(|byte| byte.is_ascii_alphanumeric() || *byte == b'-' || *byte == b'_')
        {
            self.index += 1;
        }
        if start == self.index {
            return Err(anyhow!("expected identifier at offset {start}"));
        }
        let slice = self.input.get(start..self.index).unwrap_or_default();
        Ok(String::from_utf8_lossy(slice).into_owned())
    }

    /// `[name]` or `[name=value]`, value quoted or unquoted.
    fn consume_attr(&mut self) -> Result<Tok, Error> {
        self.index += 1;
        self.skip_spaces();
        let name = self.consume_ident()?.to_ascii_lowercase();
        self.skip_spaces();
        let value = if self.input.get(self.index) == Some(&b'=') {
            self.index += 1;
            self.skip_spaces();
            match self.input.get(self.index).copied() {
                Some(quote @ (b'"' | b'\'')) => {
                    self.index += 1;
                    Some(self.consume_quoted(quote)?)
                }
                _ => Some(self.consume_unquoted()),
            }
        } else {
            None
        };
        self.skip_spaces();
        if self.input.get(self.index) != Some(&b']') {
            return Err(anyhow!("unterminated attribute selector for {name:?}"));
        }
        self.index += 1;
        Ok(Tok::Simple(match value {
            Some(value) => SimpleSelector::AttrEquals { name, value },
            None => SimpleSelector::AttrExists { name },
        }))
    }

    fn consume_unquoted(&mut self) -> String {
        let start = self.index;
        while self
            .input
            .get(self.index)
            .is_some_and(|byte| !byte.is_ascii_whitespace() && *byte != b']')
        {
            self.index += 1;
        }
        let slice = self.input.get(start..self.index).unwrap_or_default();
        String::from_utf8_lossy(slice).into_owned()
    }

    fn consume_quoted(&mut self, quote: u8) -> Result<String, Error> {
        let start = self.index;
        while matches!(self.input.get(self.index), Some(&byte) if byte != quote) {
            self.index += 1;
        }
        if self.input.get(self.index).is_none() {
            return Err(anyhow!("unterminated quoted value at offset {start}"));
        }
        let slice = self.input.get(start..self.index).unwrap_or_default();
        self.index += 1;
        Ok(String::from_utf8_lossy(slice).into_owned())
    }

    fn skip_spaces(&mut self) {
        while self
            .input
            .get(self.index)
            .is_some_and(u8::is_ascii_whitespace)
        {
            self.index += 1;
        }
    }
}

/// Parse a comma-separated selector list.
///
/// # Errors
/// Returns an error for empty selectors or unsupported syntax.
pub fn parse_selector_list(input: &str) -> Result<SelectorList, Error> {
    let mut list = SelectorList::default();
    for part in input.split(',') {
        list.selectors.push(parse_complex_selector(part.trim())?);
    }
    Ok(list)
}

/// Parse one complex selector.
///
/// # Errors
/// Returns an error for empty selectors, dangling combinators or
/// unsupported syntax.
pub fn parse_complex_selector(input: &str) -> Result<ComplexSelector, Error> {
    let mut tokens = SelectorTokenizer::new(input);
    let mut current = CompoundSelector::default();
    let mut first: Option<CompoundSelector> = None;
    let mut rest: Vec<(Combinator, CompoundSelector)> = Vec::new();
    let mut pending_combinator: Option<Combinator> = None;

    while let Some(token) = tokens.next_token()? {
        match token {
            Tok::Combinator(comb) => {
                if current.simples.is_empty() {
                    // Whitespace before the combinator already flushed the
                    // left-hand compound.
                    if first.is_none() || pending_combinator != Some(Combinator::Descendant) {
                        return Err(anyhow!("combinator without left-hand side in {input:?}"));
                    }
                } else {
                    push_compound(
                        &mut first,
                        &mut rest,
                        pending_combinator.take(),
                        take(&mut current),
                    );
                }
                pending_combinator = Some(comb);
            }
            Tok::DescendantWS => {
                if !current.simples.is_empty() {
                    push_compound(
                        &mut first,
                        &mut rest,
                        pending_combinator.take(),
                        take(&mut current),
                    );
                    pending_combinator = Some(Combinator::Descendant);
                }
            }
            Tok::Simple(simple) => current.simples.push(simple),
        }
    }

    if current.simples.is_empty() {
        return Err(anyhow!("empty or dangling selector {input:?}"));
    }
    push_compound(&mut first, &mut rest, pending_combinator, current);

    Ok(ComplexSelector {
        first: first.unwrap_or_default(),
        rest,
    })
}

fn push_compound(
    first: &mut Option<CompoundSelector>,
    rest: &mut Vec<(Combinator, CompoundSelector)>,
    combinator: Option<Combinator>,
    compound: CompoundSelector,
) {
    if first.is_none() {
        *first = Some(compound);
    } else {
        rest.push((combinator.unwrap_or(Combinator::Descendant), compound));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_descendant_chain() {
        let sel = parse_complex_selector(".code-highlighted pre code").unwrap();
        assert_eq!(
            sel.first.simples,
            vec![SimpleSelector::Class("code-highlighted".into())]
        );
        assert_eq!(sel.rest.len(), 2);
        assert!(sel.rest.iter().all(|(comb, _)| *comb == Combinator::Descendant));
    }

    #[test]
    fn parses_child_combinator_with_spaces() {
        let sel = parse_complex_selector("picture > img").unwrap();
        assert_eq!(sel.rest.len(), 1);
        assert_eq!(sel.rest[0].0, Combinator::Child);
        assert_eq!(sel.rest[0].1.simples, vec![SimpleSelector::Type("img".into())]);
    }

    #[test]
    fn parses_attribute_presence_and_equality() {
        let sel = parse_complex_selector("div[data-block-name]").unwrap();
        assert_eq!(
            sel.first.simples,
            vec![
                SimpleSelector::Type("div".into()),
                SimpleSelector::AttrExists {
                    name: "data-block-name".into()
                }
            ]
        );
        let eq = parse_complex_selector("a[target='_blank']").unwrap();
        assert_eq!(
            eq.first.simples[1],
            SimpleSelector::AttrEquals {
                name: "target".into(),
                value: "_blank".into()
            }
        );
    }

    #[test]
    fn rejects_unsupported_syntax() {
        assert!(parse_selector_list("a:hover").is_err());
        assert!(parse_selector_list("h1 + p").is_err());
        assert!(parse_selector_list("").is_err());
        assert!(parse_selector_list("main >").is_err());
        assert!(parse_selector_list("[unterminated").is_err());
    }

    #[test]
    fn splits_lists() {
        let list = parse_selector_list("header, footer").unwrap();
        assert_eq!(list.selectors.len(), 2);
    }
}
