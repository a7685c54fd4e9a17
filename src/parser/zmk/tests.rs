use pretty_assertions::assert_eq;
use test_log::test;

use super::*;
use crate::ast::{FormatKind, LiteralKind, RefState};

fn text(s: &str) -> InlineNode {
    InlineNode::Text(s.to_string())
}

fn sp() -> InlineNode {
    InlineNode::space()
}

fn para(src: &str) -> InlineSlice {
    match parse_blocks(src).into_iter().next() {
        Some(BlockNode::Para(inlines)) => inlines,
        other => panic!("expected paragraph for {src:?}, got {other:?}"),
    }
}

#[test]
fn minimal_paragraph() {
    assert_eq!(
        parse_blocks("Hello, world"),
        vec![BlockNode::Para(vec![text("Hello,"), sp(), text("world")])]
    );
}

#[test]
fn empty_and_blank_input() {
    assert!(parse_blocks("").is_empty());
    assert!(parse_blocks("\n  \n\t\n").is_empty());
}

#[test]
fn heading_levels_and_attributes() {
    let blocks = parse_blocks("=== Hello {.c}\n===== x\n========== deep");
    match &blocks[0] {
        BlockNode::Heading {
            level,
            attrs,
            inlines,
            ..
        } => {
            assert_eq!(*level, 1);
            assert_eq!(attrs.get("class"), Some("c"));
            assert_eq!(inlines, &vec![text("Hello")]);
        }
        other => panic!("{other:?}"),
    }
    assert!(matches!(blocks[1], BlockNode::Heading { level: 3, .. }));
    assert!(matches!(blocks[2], BlockNode::Heading { level: 5, .. }));
}

#[test]
fn short_heading_marker_is_text() {
    assert_eq!(para("==x"), vec![text("==x")]);
}

#[test]
fn horizontal_rule() {
    let blocks = parse_blocks("---\n-----{.wide}");
    assert_eq!(
        blocks[0],
        BlockNode::HRule {
            attrs: Attributes::new()
        }
    );
    match &blocks[1] {
        BlockNode::HRule { attrs } => assert_eq!(attrs.get("class"), Some("wide")),
        other => panic!("{other:?}"),
    }
}

#[test]
fn nested_lists() {
    let blocks = parse_blocks("* a\n** b\n* c");
    let expected = BlockNode::List {
        kind: ListKind::Unordered,
        items: vec![
            vec![
                BlockNode::Para(vec![text("a")]),
                BlockNode::List {
                    kind: ListKind::Unordered,
                    items: vec![vec![BlockNode::Para(vec![text("b")])]],
                },
            ],
            vec![BlockNode::Para(vec![text("c")])],
        ],
    };
    assert_eq!(blocks, vec![expected]);
}

#[test]
fn list_kind_change_starts_new_list() {
    let blocks = parse_blocks("* a\n# b");
    assert_eq!(blocks.len(), 2);
    assert!(matches!(
        blocks[1],
        BlockNode::List {
            kind: ListKind::Ordered,
            ..
        }
    ));
}

#[test]
fn list_continuation_line() {
    let blocks = parse_blocks("* a\n  b");
    assert_eq!(
        blocks,
        vec![BlockNode::List {
            kind: ListKind::Unordered,
            items: vec![vec![BlockNode::Para(vec![
                text("a"),
                InlineNode::Soft,
                text("b")
            ])]],
        }]
    );
}

#[test]
fn paragraph_ends_at_list() {
    let blocks = parse_blocks("a\n* b");
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0], BlockNode::Para(vec![text("a")]));
}

#[test]
fn description_list() {
    let blocks = parse_blocks("; term\n: desc\n  more");
    assert_eq!(
        blocks,
        vec![BlockNode::Description(vec![Description {
            term: vec![text("term")],
            descriptions: vec![vec![BlockNode::Para(vec![
                text("desc"),
                InlineNode::Soft,
                text("more")
            ])]],
        }])]
    );
}

#[test]
fn description_without_term_is_paragraph() {
    assert_eq!(para(": x"), vec![text(":"), sp(), text("x")]);
}

#[test]
fn table_with_header_alignment() {
    let blocks = parse_blocks("|=a|=b>\n|%comment\n|1|<2\n|3");
    let BlockNode::Table(table) = &blocks[0] else {
        panic!("{blocks:?}");
    };
    assert_eq!(table.align, vec![Alignment::Default, Alignment::Right]);
    assert_eq!(table.header[0].inlines, vec![text("a")]);
    assert_eq!(table.header[1].align, Alignment::Right);
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.rows[0][1].align, Alignment::Left);
    assert_eq!(table.rows[0][1].inlines, vec![text("2")]);
    assert_eq!(table.rows[1].len(), 2);
    assert!(table.rows[1][1].inlines.is_empty());
}

#[test]
fn regions_with_citation() {
    let blocks = parse_blocks("<<<\nquoted\n<<< Someone");
    assert_eq!(
        blocks,
        vec![BlockNode::Region {
            kind: RegionKind::Quote,
            attrs: Attributes::new(),
            blocks: vec![BlockNode::Para(vec![text("quoted")])],
            inlines: vec![text("Someone")],
        }]
    );
}

#[test]
fn verse_keeps_line_breaks() {
    let blocks = parse_blocks("\"\"\"\na\nb\n\"\"\"");
    let BlockNode::Region { blocks, .. } = &blocks[0] else {
        panic!("{blocks:?}");
    };
    assert_eq!(
        blocks,
        &vec![BlockNode::Para(vec![text("a"), InlineNode::Hard, text("b")])]
    );
}

#[test]
fn nested_regions_need_longer_fences() {
    let blocks = parse_blocks("::::\n:::\ninner\n:::\n::::");
    let BlockNode::Region { blocks: outer, .. } = &blocks[0] else {
        panic!("{blocks:?}");
    };
    assert!(matches!(outer[0], BlockNode::Region { .. }));
}

#[test]
fn verbatim_blocks() {
    let blocks = parse_blocks("```go\nfn x\n\n  y\n```\n@@@html\n<b>x</b>\n@@@");
    assert_eq!(
        blocks[0],
        BlockNode::Verbatim {
            kind: VerbatimKind::Program,
            attrs: Attributes::new().with("", "go"),
            content: "fn x\n\n  y".to_string(),
        }
    );
    assert_eq!(
        blocks[1],
        BlockNode::Verbatim {
            kind: VerbatimKind::Html,
            attrs: Attributes::new(),
            content: "<b>x</b>".to_string(),
        }
    );
}

#[test]
fn unterminated_verbatim_runs_to_end() {
    let blocks = parse_blocks("~~~\nx");
    assert_eq!(
        blocks,
        vec![BlockNode::Verbatim {
            kind: VerbatimKind::Eval,
            attrs: Attributes::new(),
            content: "x".to_string(),
        }]
    );
}

#[test]
fn transclusion() {
    let blocks = parse_blocks("{{{20240101120000}}}\n{{{query:tags:a b}}}");
    match &blocks[0] {
        BlockNode::Transclude { reference, .. } => {
            assert_eq!(reference.state, RefState::Zettel)
        }
        other => panic!("{other:?}"),
    }
    match &blocks[1] {
        BlockNode::Transclude { reference, .. } => {
            assert_eq!(reference.state, RefState::Query);
            assert_eq!(reference.value, "tags:a b");
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn links_and_embeds() {
    let inlines = para("[[Text|20240101120000]] [[https://example.com]] {{img.png}}");
    assert_eq!(
        inlines[0],
        InlineNode::Link {
            attrs: Attributes::new(),
            reference: Reference::new("20240101120000", RefState::Zettel),
            inlines: vec![text("Text")],
        }
    );
    match &inlines[2] {
        InlineNode::Link {
            reference, inlines, ..
        } => {
            assert_eq!(reference.state, RefState::External);
            assert!(inlines.is_empty());
        }
        other => panic!("{other:?}"),
    }
    match &inlines[4] {
        InlineNode::Embed { reference, .. } => assert_eq!(reference.value, "img.png"),
        other => panic!("{other:?}"),
    }
}

#[test]
fn query_link_keeps_spaces() {
    match &para("[[query:tags:a b]]")[0] {
        InlineNode::Link { reference, .. } => {
            assert_eq!(reference.state, RefState::Query);
            assert_eq!(reference.value, "tags:a b");
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn link_with_space_in_reference_is_text() {
    assert_eq!(
        para("[[a b]]"),
        vec![text("[[a"), sp(), text("b]]")]
    );
}

#[test]
fn formatting_and_attributes() {
    let inlines = para("**bold** __em__{.x}");
    assert_eq!(
        inlines[0],
        InlineNode::Format {
            kind: FormatKind::Strong,
            attrs: Attributes::new(),
            inlines: vec![text("bold")],
        }
    );
    match &inlines[2] {
        InlineNode::Format { kind, attrs, .. } => {
            assert_eq!(*kind, FormatKind::Emph);
            assert_eq!(attrs.get("class"), Some("x"));
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn unclosed_format_is_text() {
    assert_eq!(para("**a"), vec![text("**a")]);
}

#[test]
fn format_spans_lines_in_paragraph() {
    let inlines = para("__a\nb__");
    assert_eq!(
        inlines,
        vec![InlineNode::Format {
            kind: FormatKind::Emph,
            attrs: Attributes::new(),
            inlines: vec![text("a"), InlineNode::Soft, text("b")],
        }]
    );
}

#[test]
fn literals() {
    let inlines = para("``co\\`de`` ''in'' ==out== $$x^2$$ @@<b>@@{=html}");
    let kinds: Vec<(LiteralKind, String)> = inlines
        .iter()
        .filter_map(|i| match i {
            InlineNode::Literal { kind, content, .. } => Some((*kind, content.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            (LiteralKind::Program, "co`de".to_string()),
            (LiteralKind::Input, "in".to_string()),
            (LiteralKind::Output, "out".to_string()),
            (LiteralKind::Math, "x^2".to_string()),
            (LiteralKind::Html, "<b>".to_string()),
        ]
    );
}

#[test]
fn inline_comment() {
    let inlines = para("a %%{-} note ");
    assert_eq!(inlines.len(), 3);
    match &inlines[2] {
        InlineNode::Literal {
            kind,
            attrs,
            content,
        } => {
            assert_eq!(*kind, LiteralKind::Comment);
            assert!(attrs.has("-"));
            assert_eq!(content, "note");
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn escapes_and_breaks() {
    assert_eq!(para("a\\*\\*b"), vec![text("a**b")]);
    assert_eq!(para("a\\ b"), vec![text("a\u{A0}b")]);
    assert_eq!(
        para("a\\\nb"),
        vec![text("a"), InlineNode::Hard, text("b")]
    );
    assert_eq!(para("a  \nb"), vec![text("a"), InlineNode::Hard, text("b")]);
    assert_eq!(para("a \nb"), vec![text("a"), InlineNode::Soft, text("b")]);
}

#[test]
fn entities() {
    assert_eq!(
        para("&amp; &bogus;"),
        vec![text("&"), sp(), text("&bogus;")]
    );
}

#[test]
fn cite_footnote_mark() {
    let inlines = para("[@key, text] [^note] [!m|x]");
    assert_eq!(
        inlines[0],
        InlineNode::Cite {
            attrs: Attributes::new(),
            key: "key".to_string(),
            inlines: vec![text("text")],
        }
    );
    assert_eq!(
        inlines[2],
        InlineNode::Footnote {
            attrs: Attributes::new(),
            inlines: vec![text("note")],
        }
    );
    assert_eq!(
        inlines[4],
        InlineNode::Mark {
            mark: "m".to_string(),
            slug: String::new(),
            fragment: String::new(),
            inlines: vec![text("x")],
        }
    );
}

fn max_footnote_depth(inlines: &InlineSlice) -> usize {
    inlines
        .iter()
        .map(|i| match i {
            InlineNode::Footnote { inlines, .. } => 1 + max_footnote_depth(inlines),
            _ => 0,
        })
        .max()
        .unwrap_or(0)
}

#[test]
fn nesting_is_limited() {
    let src = format!("{}x{}", "[^".repeat(60), "]".repeat(60));
    let inlines = para(&src);
    assert_eq!(max_footnote_depth(&inlines), MAX_NESTING);
}

#[test]
fn free_inlines() {
    assert_eq!(
        parse_inlines("a\nb "),
        vec![text("a"), InlineNode::Soft, text("b")]
    );
}

fn parse_quickly(src: &str) -> BlockSlice {
    let started = std::time::Instant::now();
    let blocks = parse_blocks(src);
    let elapsed = started.elapsed();
    assert!(
        elapsed < std::time::Duration::from_secs(5),
        "{} bytes took {elapsed:?}",
        src.len()
    );
    blocks
}

#[test]
fn unclosed_brackets_parse_in_linear_time() {
    for opener in ["[^", "[!", "[@k ", "**", "[^**"] {
        let src = opener.repeat(10_000 / opener.len());
        let blocks = parse_quickly(&src);
        let Some(BlockNode::Para(inlines)) = blocks.first() else {
            panic!("expected paragraph for {opener:?}, got {blocks:?}");
        };
        assert!(
            inlines.iter().all(|i| !matches!(i, InlineNode::Footnote { .. })),
            "{opener:?}"
        );
    }
}

#[test]
fn late_closer_still_closes_the_last_footnote() {
    let src = format!("{}x]", "[^".repeat(500));
    let blocks = parse_quickly(&src);
    let Some(BlockNode::Para(inlines)) = blocks.first() else {
        panic!("expected paragraph, got {blocks:?}");
    };
    assert!(matches!(inlines.last(), Some(InlineNode::Footnote { .. })));
}

#[test]
fn failed_footnote_does_not_hide_a_later_one() {
    assert_eq!(
        para("[^a [^b] c"),
        vec![
            text("[^a"),
            sp(),
            InlineNode::Footnote {
                attrs: Attributes::new(),
                inlines: vec![text("b")],
            },
            sp(),
            text("c"),
        ]
    );
}
