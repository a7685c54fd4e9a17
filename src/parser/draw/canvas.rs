//! Shape detection on a character grid.
//!
//! Rectangles are `+` corners joined by `-` and `|` edges. Remaining runs of `-`, `|`, `/` and
//! `\` become lines, with `<`, `>`, `^` and `v` as arrow heads at their ends. Everything else is
//! text, grouped into words and phrases.

/// A point on the grid, as (column, row).
pub type Cell = (usize, usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    Line {
        from: Cell,
        to: Cell,
        arrow_start: bool,
        arrow_end: bool,
    },
    Rect {
        corner: Cell,
        width: usize,
        height: usize,
    },
    Text {
        at: Cell,
        text: String,
    },
}

pub struct Canvas {
    rows: Vec<Vec<char>>,
    width: usize,
}

impl Canvas {
    pub fn new(src: &str) -> Canvas {
        let rows: Vec<Vec<char>> = src
            .lines()
            .map(|line| line.chars().map(|c| if c == '\t' { ' ' } else { c }).collect())
            .collect();
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut rows = rows;
        while rows.last().map(|r| r.iter().all(|c| *c == ' ')).unwrap_or(false) {
            rows.pop();
        }
        Canvas { rows, width }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|r| r.iter().all(|c| c.is_whitespace()))
    }

    pub fn at(&self, x: usize, y: usize) -> char {
        self.rows
            .get(y)
            .and_then(|row| row.get(x))
            .copied()
            .unwrap_or(' ')
    }

    /// Character at a signed offset; outside the grid is blank.
    fn at_offset(&self, x: usize, y: usize, dx: isize, dy: isize) -> char {
        match (x.checked_add_signed(dx), y.checked_add_signed(dy)) {
            (Some(x), Some(y)) => self.at(x, y),
            _ => ' ',
        }
    }
}

struct Detector<'a> {
    canvas: &'a Canvas,
    used: Vec<Vec<bool>>,
    shapes: Vec<Shape>,
}

pub fn analyze(canvas: &Canvas) -> Vec<Shape> {
    let mut d = Detector {
        canvas,
        used: vec![vec![false; canvas.width()]; canvas.height()],
        shapes: Vec::new(),
    };
    d.rectangles();
    d.horizontal_lines();
    d.vertical_lines();
    d.diagonal_lines('/', -1);
    d.diagonal_lines('\\', 1);
    d.texts();
    d.shapes
}

impl Detector<'_> {
    fn is_used(&self, x: usize, y: usize) -> bool {
        self.used
            .get(y)
            .and_then(|row| row.get(x))
            .copied()
            .unwrap_or(true)
    }

    fn mark(&mut self, x: usize, y: usize) {
        if let Some(cell) = self.used.get_mut(y).and_then(|row| row.get_mut(x)) {
            *cell = true;
        }
    }

    fn rectangles(&mut self) {
        let c = self.canvas;
        for y in 0..c.height() {
            for x in 0..c.width() {
                if c.at(x, y) != '+' {
                    continue;
                }
                let mut x2 = x + 1;
                while c.at(x2, y) == '-' {
                    x2 += 1;
                }
                if x2 == x + 1 || c.at(x2, y) != '+' {
                    continue;
                }
                let mut y2 = y + 1;
                while c.at(x, y2) == '|' {
                    y2 += 1;
                }
                if y2 == y + 1 || c.at(x, y2) != '+' {
                    continue;
                }
                let right = (y + 1..y2).all(|yy| c.at(x2, yy) == '|') && c.at(x2, y2) == '+';
                let bottom = (x + 1..x2).all(|xx| c.at(xx, y2) == '-');
                if !right || !bottom {
                    continue;
                }
                for xx in x..=x2 {
                    self.mark(xx, y);
                    self.mark(xx, y2);
                }
                for yy in y..=y2 {
                    self.mark(x, yy);
                    self.mark(x2, yy);
                }
                self.shapes.push(Shape::Rect {
                    corner: (x, y),
                    width: x2 - x,
                    height: y2 - y,
                });
            }
        }
    }

    fn horizontal_lines(&mut self) {
        let c = self.canvas;
        for y in 0..c.height() {
            let mut x = 0;
            while x < c.width() {
                let ch = c.at(x, y);
                let starts = (ch == '-' || ch == '+' || (ch == '<' && c.at(x + 1, y) == '-'))
                    && !self.is_used(x, y);
                if !starts {
                    x += 1;
                    continue;
                }
                let start = x;
                let arrow_start = ch == '<';
                let mut end = if arrow_start { x + 1 } else { x };
                let mut dashes = 0;
                while matches!(c.at(end, y), '-' | '+') && !self.is_used(end, y) {
                    if c.at(end, y) == '-' {
                        dashes += 1;
                    }
                    end += 1;
                }
                let arrow_end = c.at(end, y) == '>';
                let last = if arrow_end { end } else { end.saturating_sub(1) };
                let long_enough = last > start;
                if dashes > 0 && long_enough {
                    for xx in start..=last {
                        self.mark(xx, y);
                    }
                    self.shapes.push(Shape::Line {
                        from: (start, y),
                        to: (last, y),
                        arrow_start,
                        arrow_end,
                    });
                }
                x = last.max(start) + 1;
            }
        }
    }

    fn vertical_lines(&mut self) {
        let c = self.canvas;
        for x in 0..c.width() {
            let mut y = 0;
            while y < c.height() {
                let ch = c.at(x, y);
                let starts = (ch == '|' || (ch == '^' && c.at(x, y + 1) == '|'))
                    && !self.is_used(x, y);
                if !starts {
                    y += 1;
                    continue;
                }
                let arrow_start = ch == '^';
                let mut start = y;
                if !arrow_start && y > 0 && c.at(x, y - 1) == '+' {
                    start = y - 1;
                }
                let mut end = if arrow_start { y + 1 } else { y };
                while matches!(c.at(x, end), '|' | '+') && !(c.at(x, end) == '|' && self.is_used(x, end)) {
                    end += 1;
                }
                let arrow_end = c.at(x, end) == 'v';
                let last = if arrow_end { end } else { end - 1 };
                let isolated = c.at_offset(x, y, -1, 0).is_whitespace()
                    && c.at_offset(x, y, 1, 0).is_whitespace();
                if last > start || isolated {
                    for yy in start..=last {
                        self.mark(x, yy);
                    }
                    self.shapes.push(Shape::Line {
                        from: (x, start),
                        to: (x, last),
                        arrow_start,
                        arrow_end,
                    });
                }
                y = last + 1;
            }
        }
    }

    /// Lines of `ch` running down and to the side given by `dx`.
    fn diagonal_lines(&mut self, ch: char, dx: isize) {
        let c = self.canvas;
        for y in 0..c.height() {
            for x in 0..c.width() {
                if c.at(x, y) != ch || self.is_used(x, y) {
                    continue;
                }
                if c.at_offset(x, y, -dx, -1) == ch {
                    continue;
                }
                let mut len = 1;
                let (mut ex, mut ey) = (x, y);
                while let (Some(nx), ny) = (ex.checked_add_signed(dx), ey + 1) {
                    if c.at(nx, ny) != ch {
                        break;
                    }
                    ex = nx;
                    ey = ny;
                    len += 1;
                }
                let isolated = c.at_offset(x, y, -1, 0).is_whitespace()
                    && c.at_offset(x, y, 1, 0).is_whitespace();
                if len < 2 && !isolated {
                    continue;
                }
                let (mut px, mut py) = (x, y);
                for _ in 0..len {
                    self.mark(px, py);
                    px = px.checked_add_signed(dx).unwrap_or(0);
                    py += 1;
                }
                self.shapes.push(Shape::Line {
                    from: (x, y),
                    to: (ex, ey),
                    arrow_start: false,
                    arrow_end: false,
                });
            }
        }
    }

    fn texts(&mut self) {
        let c = self.canvas;
        for y in 0..c.height() {
            let mut x = 0;
            while x < c.width() {
                if c.at(x, y) == ' ' || self.is_used(x, y) {
                    x += 1;
                    continue;
                }
                let start = x;
                let mut text = String::new();
                loop {
                    let ch = c.at(x, y);
                    let free = !self.is_used(x, y);
                    if ch != ' ' && free {
                        text.push(ch);
                        x += 1;
                    } else if ch == ' '
                        && c.at(x + 1, y) != ' '
                        && !self.is_used(x + 1, y)
                        && x + 1 < c.width()
                    {
                        text.push(' ');
                        x += 1;
                    } else {
                        break;
                    }
                }
                self.shapes.push(Shape::Text {
                    at: (start, y),
                    text,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_with_label() {
        let canvas = Canvas::new("+----+\n| hi |\n+----+\n");
        let shapes = analyze(&canvas);
        assert!(shapes.contains(&Shape::Rect {
            corner: (0, 0),
            width: 5,
            height: 2
        }));
        assert!(shapes.contains(&Shape::Text {
            at: (2, 1),
            text: "hi".to_string()
        }));
        assert_eq!(shapes.len(), 2);
    }

    #[test]
    fn arrows() {
        let shapes = analyze(&Canvas::new("a --> b"));
        assert!(shapes.contains(&Shape::Line {
            from: (2, 0),
            to: (4, 0),
            arrow_start: false,
            arrow_end: true
        }));
        assert!(shapes.contains(&Shape::Text {
            at: (0, 0),
            text: "a".to_string()
        }));
    }

    #[test]
    fn hyphen_in_word_is_text() {
        let shapes = analyze(&Canvas::new("well-known"));
        assert_eq!(
            shapes,
            vec![Shape::Text {
                at: (0, 0),
                text: "well-known".to_string()
            }]
        );
    }

    #[test]
    fn vertical_and_diagonal() {
        let shapes = analyze(&Canvas::new(" |  /\n |   \n"));
        assert!(shapes.contains(&Shape::Line {
            from: (1, 0),
            to: (1, 1),
            arrow_start: false,
            arrow_end: false
        }));
        assert!(shapes.contains(&Shape::Line {
            from: (4, 0),
            to: (4, 0),
            arrow_start: false,
            arrow_end: false
        }));
    }
}
