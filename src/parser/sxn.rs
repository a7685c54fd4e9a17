//! S-expression content: one verbatim block per top-level object.
use crate::{
    ast::{Attributes, BlockNode, BlockSlice, InlineNode, InlineSlice, LiteralKind, VerbatimKind},
    meta::Meta,
    parser::SyntaxParser,
    sx,
};

pub struct Sxn;

fn sxn_attrs() -> Attributes {
    Attributes::new().with("", "sxn")
}

/// Splits S-expression source into one verbatim block per object. Unreadable input stays one
/// block with the raw text.
pub fn sxn_blocks(src: &str, pretty: bool) -> BlockSlice {
    match sx::read_all(src) {
        Ok(objects) => objects
            .into_iter()
            .map(|obj| BlockNode::Verbatim {
                kind: VerbatimKind::Program,
                attrs: sxn_attrs(),
                content: if pretty {
                    obj.pretty()
                } else {
                    obj.to_string()
                },
            })
            .collect(),
        Err(err) => {
            tracing::debug!("[sxn_blocks] Keeping raw text: {err}");
            vec![BlockNode::Verbatim {
                kind: VerbatimKind::Program,
                attrs: sxn_attrs(),
                content: src.trim_end().to_string(),
            }]
        }
    }
}

impl SyntaxParser for Sxn {
    fn parse_blocks(&self, input: &[u8], _meta: &Meta, _syntax: &str) -> BlockSlice {
        sxn_blocks(&String::from_utf8_lossy(input), false)
    }

    fn parse_inlines(&self, input: &[u8], _syntax: &str) -> InlineSlice {
        vec![InlineNode::Literal {
            kind: LiteralKind::Program,
            attrs: sxn_attrs(),
            content: String::from_utf8_lossy(input).trim().to_string(),
        }]
    }
}
