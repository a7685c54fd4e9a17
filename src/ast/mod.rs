//! The abstract syntax tree shared by parsers, evaluator and encoders.
//!
//! Content is a [`BlockSlice`]; running text inside blocks is an [`InlineSlice`]. Nodes are
//! created by the parsers, mutated by the cleanup pass (slugs and fragments) and by the evaluator
//! (reference states and spliced transclusions), and finally consumed by the encoders.
use serde::{Deserialize, Serialize};

pub mod attr;
pub mod reference;
pub mod walk;

pub use attr::Attributes;
pub use reference::{RefState, Reference};
pub use walk::{walk_blocks, walk_blocks_mut, Descend, Node, Visitor, VisitorMut};

pub type BlockSlice = Vec<BlockNode>;
pub type InlineSlice = Vec<InlineNode>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BlockNode {
    Para(InlineSlice),
    Heading {
        /// 1..=5
        level: u8,
        attrs: Attributes,
        slug: String,
        fragment: String,
        inlines: InlineSlice,
    },
    HRule {
        attrs: Attributes,
    },
    List {
        kind: ListKind,
        items: Vec<BlockSlice>,
    },
    Description(Vec<Description>),
    Table(Table),
    Region {
        kind: RegionKind,
        attrs: Attributes,
        blocks: BlockSlice,
        /// Citation written after the closing fence.
        inlines: InlineSlice,
    },
    Verbatim {
        kind: VerbatimKind,
        attrs: Attributes,
        content: String,
    },
    Transclude {
        attrs: Attributes,
        reference: Reference,
    },
    Blob {
        description: InlineSlice,
        syntax: String,
        blob: Vec<u8>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListKind {
    Ordered,
    Unordered,
    Quote,
}

impl ListKind {
    pub fn from_char(ch: char) -> Option<ListKind> {
        match ch {
            '#' => Some(ListKind::Ordered),
            '*' => Some(ListKind::Unordered),
            '>' => Some(ListKind::Quote),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            ListKind::Ordered => '#',
            ListKind::Unordered => '*',
            ListKind::Quote => '>',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Description {
    pub term: InlineSlice,
    pub descriptions: Vec<BlockSlice>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    /// Empty if the table has no header row.
    pub header: Vec<TableCell>,
    pub rows: Vec<Vec<TableCell>>,
    /// One entry per column.
    pub align: Vec<Alignment>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableCell {
    pub align: Alignment,
    pub inlines: InlineSlice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Alignment {
    #[default]
    Default,
    Left,
    Center,
    Right,
}

impl Alignment {
    pub fn from_char(ch: char) -> Option<Alignment> {
        match ch {
            '<' => Some(Alignment::Left),
            ':' => Some(Alignment::Center),
            '>' => Some(Alignment::Right),
            _ => None,
        }
    }

    pub fn as_char(&self) -> Option<char> {
        match self {
            Alignment::Default => None,
            Alignment::Left => Some('<'),
            Alignment::Center => Some(':'),
            Alignment::Right => Some('>'),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegionKind {
    Span,
    Quote,
    Verse,
}

impl RegionKind {
    pub fn fence_char(&self) -> char {
        match self {
            RegionKind::Span => ':',
            RegionKind::Quote => '<',
            RegionKind::Verse => '"',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerbatimKind {
    Program,
    Eval,
    Math,
    Comment,
    Zettel,
    Html,
}

impl VerbatimKind {
    pub fn fence_char(&self) -> char {
        match self {
            VerbatimKind::Program => '`',
            VerbatimKind::Eval => '~',
            VerbatimKind::Math => '$',
            VerbatimKind::Comment => '%',
            VerbatimKind::Zettel | VerbatimKind::Html => '@',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InlineNode {
    Text(String),
    /// Whitespace, keeping its lexeme.
    Space(String),
    Soft,
    Hard,
    Link {
        attrs: Attributes,
        reference: Reference,
        inlines: InlineSlice,
    },
    Embed {
        attrs: Attributes,
        reference: Reference,
        syntax: String,
        inlines: InlineSlice,
    },
    EmbedBlob {
        attrs: Attributes,
        syntax: String,
        blob: Vec<u8>,
        inlines: InlineSlice,
    },
    Cite {
        attrs: Attributes,
        key: String,
        inlines: InlineSlice,
    },
    Footnote {
        attrs: Attributes,
        inlines: InlineSlice,
    },
    Mark {
        mark: String,
        slug: String,
        fragment: String,
        inlines: InlineSlice,
    },
    Format {
        kind: FormatKind,
        attrs: Attributes,
        inlines: InlineSlice,
    },
    Literal {
        kind: LiteralKind,
        attrs: Attributes,
        content: String,
    },
}

impl InlineNode {
    pub fn text(s: impl Into<String>) -> InlineNode {
        InlineNode::Text(s.into())
    }

    pub fn space() -> InlineNode {
        InlineNode::Space(" ".to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatKind {
    Emph,
    Strong,
    Insert,
    Delete,
    Super,
    Sub,
    Quote,
    Mark,
    Span,
}

impl FormatKind {
    /// Delimiter character; zettelmarkup doubles it.
    pub fn delimiter(&self) -> char {
        match self {
            FormatKind::Emph => '_',
            FormatKind::Strong => '*',
            FormatKind::Insert => '>',
            FormatKind::Delete => '~',
            FormatKind::Super => '^',
            FormatKind::Sub => ',',
            FormatKind::Quote => '"',
            FormatKind::Mark => '#',
            FormatKind::Span => ':',
        }
    }

    pub fn from_delimiter(ch: char) -> Option<FormatKind> {
        Some(match ch {
            '_' => FormatKind::Emph,
            '*' => FormatKind::Strong,
            '>' => FormatKind::Insert,
            '~' => FormatKind::Delete,
            '^' => FormatKind::Super,
            ',' => FormatKind::Sub,
            '"' => FormatKind::Quote,
            '#' => FormatKind::Mark,
            ':' => FormatKind::Span,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiteralKind {
    Program,
    Input,
    Output,
    Comment,
    Math,
    Zettel,
    Html,
}

impl LiteralKind {
    pub fn delimiter(&self) -> char {
        match self {
            LiteralKind::Program => '`',
            LiteralKind::Input => '\'',
            LiteralKind::Output => '=',
            LiteralKind::Comment => '%',
            LiteralKind::Math => '$',
            LiteralKind::Zettel | LiteralKind::Html => '@',
        }
    }
}

/// Convenience constructor for an inline error, rendered as strong text with class `error`.
pub fn error_inline(msg: impl Into<String>) -> InlineNode {
    let mut attrs = Attributes::new();
    attrs.add_class("error");
    InlineNode::Format {
        kind: FormatKind::Strong,
        attrs,
        inlines: vec![InlineNode::Text(msg.into())],
    }
}

/// Splits text at spaces into text and space nodes, the way the parsers produce it.
pub fn text_to_inlines(s: &str) -> InlineSlice {
    let mut result = InlineSlice::new();
    let mut word = String::new();
    for ch in s.chars() {
        if ch == ' ' {
            if !word.is_empty() {
                result.push(InlineNode::Text(std::mem::take(&mut word)));
            }
            match result.last_mut() {
                Some(InlineNode::Space(lexeme)) => lexeme.push(' '),
                _ => result.push(InlineNode::space()),
            }
        } else {
            word.push(ch);
        }
    }
    if !word.is_empty() {
        result.push(InlineNode::Text(word));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_text_into_words() {
        assert_eq!(
            text_to_inlines("a  b"),
            vec![
                InlineNode::text("a"),
                InlineNode::Space("  ".to_string()),
                InlineNode::text("b")
            ]
        );
    }
}
