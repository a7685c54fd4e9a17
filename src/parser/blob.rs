//! Image content: raster formats become a BLOB block, SVG an embedded BLOB.
use crate::{
    ast::{Attributes, BlockNode, BlockSlice, InlineNode, InlineSlice},
    meta::{keys::KEY_SUMMARY, Meta},
    parser::{parse_meta_inlines, parse_title, SyntaxParser},
};

pub struct Image;

pub struct Svg;

/// Description of an image zettel: its summary, or else its title.
pub fn image_description(meta: &Meta) -> InlineSlice {
    let summary = parse_meta_inlines(meta, KEY_SUMMARY);
    if summary.is_empty() {
        parse_title(meta)
    } else {
        summary
    }
}

impl SyntaxParser for Image {
    fn parse_blocks(&self, input: &[u8], meta: &Meta, syntax: &str) -> BlockSlice {
        vec![BlockNode::Blob {
            description: image_description(meta),
            syntax: syntax.to_ascii_lowercase(),
            blob: input.to_vec(),
        }]
    }

    fn parse_inlines(&self, input: &[u8], syntax: &str) -> InlineSlice {
        vec![InlineNode::EmbedBlob {
            attrs: Attributes::new(),
            syntax: syntax.to_ascii_lowercase(),
            blob: input.to_vec(),
            inlines: InlineSlice::new(),
        }]
    }
}

fn svg_start(input: &[u8]) -> Option<&[u8]> {
    let start = input.iter().position(|b| !b.is_ascii_whitespace())?;
    let rest = &input[start..];
    if rest.starts_with(b"<svg ") || rest.starts_with(b"<svg\n") {
        Some(rest)
    } else {
        None
    }
}

impl SyntaxParser for Svg {
    fn parse_blocks(&self, input: &[u8], meta: &Meta, syntax: &str) -> BlockSlice {
        let mut inlines = self.parse_inlines(input, syntax);
        if inlines.is_empty() {
            return BlockSlice::new();
        }
        if let Some(InlineNode::EmbedBlob { inlines: alt, .. }) = inlines.first_mut() {
            *alt = image_description(meta);
        }
        vec![BlockNode::Para(inlines)]
    }

    fn parse_inlines(&self, input: &[u8], _syntax: &str) -> InlineSlice {
        match svg_start(input) {
            Some(svg) => vec![InlineNode::EmbedBlob {
                attrs: Attributes::new(),
                syntax: "svg".to_string(),
                blob: svg.to_vec(),
                inlines: InlineSlice::new(),
            }],
            None => InlineSlice::new(),
        }
    }
}
