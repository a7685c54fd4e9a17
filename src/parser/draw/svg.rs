use std::fmt::Write;

use super::canvas::{Canvas, Cell, Shape};

const CELL_WIDTH: usize = 8;
const CELL_HEIGHT: usize = 16;

fn center((x, y): Cell) -> (usize, usize) {
    (x * CELL_WIDTH + CELL_WIDTH / 2, y * CELL_HEIGHT + CELL_HEIGHT / 2)
}

pub fn escape_xml(s: &str, out: &mut String) {
    for ch in s.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            ch => out.push(ch),
        }
    }
}

/// Renders detected shapes as a standalone SVG document.
pub fn render(canvas: &Canvas, shapes: &[Shape]) -> String {
    let width = canvas.width() * CELL_WIDTH;
    let height = canvas.height() * CELL_HEIGHT;
    let mut out = String::new();
    let _ = write!(
        out,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" class=\"zs-draw\" width=\"{width}\" height=\"{height}\" viewBox=\"0 0 {width} {height}\" font-family=\"monospace\" font-size=\"{}\">",
        CELL_HEIGHT - 2
    );
    if shapes
        .iter()
        .any(|s| matches!(s, Shape::Line { arrow_start, arrow_end, .. } if *arrow_start || *arrow_end))
    {
        out.push_str("<defs><marker id=\"arrow\" markerWidth=\"8\" markerHeight=\"8\" refX=\"6\" refY=\"4\" orient=\"auto-start-reverse\"><path d=\"M0,0 L8,4 L0,8 z\" fill=\"currentColor\"/></marker></defs>");
    }
    out.push_str("<g stroke=\"currentColor\" stroke-width=\"2\" fill=\"none\">");
    for shape in shapes {
        match shape {
            Shape::Rect {
                corner,
                width,
                height,
            } => {
                let (x, y) = center(*corner);
                let _ = write!(
                    out,
                    "<rect x=\"{x}\" y=\"{y}\" width=\"{}\" height=\"{}\"/>",
                    width * CELL_WIDTH,
                    height * CELL_HEIGHT
                );
            }
            Shape::Line {
                from,
                to,
                arrow_start,
                arrow_end,
            } => {
                let (x1, y1) = center(*from);
                let (x2, y2) = center(*to);
                let _ = write!(out, "<path d=\"M{x1},{y1} L{x2},{y2}\"");
                if *arrow_start {
                    out.push_str(" marker-start=\"url(#arrow)\"");
                }
                if *arrow_end {
                    out.push_str(" marker-end=\"url(#arrow)\"");
                }
                out.push_str("/>");
            }
            Shape::Text { .. } => {}
        }
    }
    out.push_str("</g><g fill=\"currentColor\" stroke=\"none\">");
    for shape in shapes {
        if let Shape::Text { at: (x, y), text } = shape {
            let _ = write!(
                out,
                "<text x=\"{}\" y=\"{}\" xml:space=\"preserve\">",
                x * CELL_WIDTH,
                y * CELL_HEIGHT + CELL_HEIGHT * 3 / 4
            );
            escape_xml(text, &mut out);
            out.push_str("</text>");
        }
    }
    out.push_str("</g></svg>");
    out
}
