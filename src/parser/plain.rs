//! Parsers that wrap their input in a single verbatim node, and the empty `none` parser.
use crate::{
    ast::{Attributes, BlockNode, BlockSlice, InlineNode, InlineSlice, LiteralKind, VerbatimKind},
    meta::Meta,
    parser::SyntaxParser,
};

/// Plain text, CSS and every unknown syntax: one verbatim program block.
pub struct Plain;

/// Raw HTML. Whether it survives depends on the HTML insecurity setting.
pub struct Html;

/// Content is ignored; the evaluator shows the metadata instead.
pub struct NoneSyntax;

fn syntax_attrs(syntax: &str) -> Attributes {
    let mut attrs = Attributes::new();
    if !syntax.is_empty() && syntax != "plain" {
        attrs.set("", syntax);
    }
    attrs
}

fn text_of(input: &[u8]) -> String {
    let text = String::from_utf8_lossy(input);
    text.strip_suffix('\n').unwrap_or(&text).to_string()
}

impl SyntaxParser for Plain {
    fn parse_blocks(&self, input: &[u8], _meta: &Meta, syntax: &str) -> BlockSlice {
        vec![BlockNode::Verbatim {
            kind: VerbatimKind::Program,
            attrs: syntax_attrs(syntax),
            content: text_of(input),
        }]
    }

    fn parse_inlines(&self, input: &[u8], syntax: &str) -> InlineSlice {
        vec![InlineNode::Literal {
            kind: LiteralKind::Program,
            attrs: syntax_attrs(syntax),
            content: text_of(input),
        }]
    }
}

impl SyntaxParser for Html {
    fn parse_blocks(&self, input: &[u8], _meta: &Meta, _syntax: &str) -> BlockSlice {
        vec![BlockNode::Verbatim {
            kind: VerbatimKind::Html,
            attrs: Attributes::new(),
            content: text_of(input),
        }]
    }

    fn parse_inlines(&self, input: &[u8], _syntax: &str) -> InlineSlice {
        vec![InlineNode::Literal {
            kind: LiteralKind::Html,
            attrs: Attributes::new(),
            content: text_of(input),
        }]
    }
}

impl SyntaxParser for NoneSyntax {
    fn parse_blocks(&self, _input: &[u8], _meta: &Meta, _syntax: &str) -> BlockSlice {
        BlockSlice::new()
    }

    fn parse_inlines(&self, _input: &[u8], _syntax: &str) -> InlineSlice {
        InlineSlice::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::Zid;

    #[test]
    fn css_keeps_its_syntax_hint() {
        let blocks = Plain.parse_blocks(b"a { }\n", &Meta::new(Zid::INVALID), "css");
        assert_eq!(
            blocks,
            vec![BlockNode::Verbatim {
                kind: VerbatimKind::Program,
                attrs: Attributes::new().with("", "css"),
                content: "a { }".to_string(),
            }]
        );
    }

    #[test]
    fn none_is_empty() {
        assert!(NoneSyntax
            .parse_blocks(b"ignored", &Meta::new(Zid::INVALID), "none")
            .is_empty());
    }
}
