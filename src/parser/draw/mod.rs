//! ASCII art drawings, rendered to SVG.
pub mod canvas;
pub mod svg;

use crate::{
    ast::{Attributes, BlockNode, BlockSlice, InlineNode, InlineSlice},
    meta::Meta,
    parser::{blob::image_description, SyntaxParser},
};

pub struct Draw;

/// Renders a drawing to SVG. An empty drawing gives `None`.
pub fn draw_to_svg(src: &str) -> Option<String> {
    let canvas = canvas::Canvas::new(src);
    if canvas.is_empty() {
        return None;
    }
    let shapes = canvas::analyze(&canvas);
    tracing::debug!("[draw_to_svg] {} shapes detected", shapes.len());
    Some(svg::render(&canvas, &shapes))
}

impl SyntaxParser for Draw {
    fn parse_blocks(&self, input: &[u8], meta: &Meta, _syntax: &str) -> BlockSlice {
        match draw_to_svg(&String::from_utf8_lossy(input)) {
            Some(svg) => vec![BlockNode::Blob {
                description: image_description(meta),
                syntax: "svg".to_string(),
                blob: svg.into_bytes(),
            }],
            None => BlockSlice::new(),
        }
    }

    fn parse_inlines(&self, input: &[u8], _syntax: &str) -> InlineSlice {
        match draw_to_svg(&String::from_utf8_lossy(input)) {
            Some(svg) => vec![InlineNode::EmbedBlob {
                attrs: Attributes::new(),
                syntax: "svg".to_string(),
                blob: svg.into_bytes(),
                inlines: InlineSlice::new(),
            }],
            None => InlineSlice::new(),
        }
    }
}
