//! The HTML evaluator: turns the `sz` form into an HTML tree, itself an s-expression.
//!
//! Elements are `(tag (@ (name . "value") ...) children...)`, text is a string, `(@H "...")`
//! is raw HTML and `(@@ "...")` an HTML comment. [`super::html`] prints such trees; the
//! `shtml` encoding emits them as they are.
use std::io;

use crate::{
    ast::{attr::DASH_KEY, Attributes, BlockSlice, InlineSlice, RefState},
    config::HtmlInsecurity,
    encoder::{
        sz::{attrs_from_sx, blocks_to_sx, inlines_to_sx},
        text::meta_value_text,
        EncWriter, Encoder, EncoderOptions,
    },
    error::ZettelError,
    meta::Meta,
    parser::{parse_title, ParsedZettel},
    sx::Sx,
};

pub const SYM_ATTRS: &str = "@";
pub const SYM_RAW: &str = "@H";
pub const SYM_COMMENT: &str = "@@";

pub const BROKEN_TITLE: &str = "Zettel not found";

#[derive(Debug, Default, Clone)]
pub struct ShtmlEncoder {
    options: EncoderOptions,
}

impl ShtmlEncoder {
    pub fn new(options: &EncoderOptions) -> ShtmlEncoder {
        ShtmlEncoder {
            options: options.clone(),
        }
    }
}

impl Encoder for ShtmlEncoder {
    fn write_zettel(&self, w: &mut dyn io::Write, zettel: &ParsedZettel) -> Result<usize, ZettelError> {
        write_tree(w, &zettel_tree(zettel, &self.options))
    }

    fn write_meta(&self, w: &mut dyn io::Write, meta: &Meta) -> Result<usize, ZettelError> {
        write_tree(w, &Sx::list(meta_elements(meta)))
    }

    fn write_blocks(&self, w: &mut dyn io::Write, blocks: &BlockSlice) -> Result<usize, ZettelError> {
        write_tree(w, &Sx::list(blocks_tree(blocks, &self.options)))
    }

    fn write_inlines(
        &self,
        w: &mut dyn io::Write,
        inlines: &InlineSlice,
    ) -> Result<usize, ZettelError> {
        write_tree(w, &Sx::list(inlines_tree(inlines, &self.options)))
    }
}

fn write_tree(w: &mut dyn io::Write, sx: &Sx) -> Result<usize, ZettelError> {
    let mut out = EncWriter::new(w);
    out.write_str(&sx.to_string());
    out.finish()
}

/// HTML elements for the blocks, followed by the list of endnotes, if any.
pub fn blocks_tree(blocks: &BlockSlice, options: &EncoderOptions) -> Vec<Sx> {
    let mut eval = HtmlEvaluator::new(options);
    let mut nodes = eval.eval_blocks(&blocks_to_sx(blocks));
    nodes.extend(eval.endnotes());
    nodes
}

pub fn inlines_tree(inlines: &InlineSlice, options: &EncoderOptions) -> Vec<Sx> {
    let mut eval = HtmlEvaluator::new(options);
    let mut nodes = eval.eval_inlines(&inlines_to_sx(inlines));
    nodes.extend(eval.endnotes());
    nodes
}

pub fn meta_elements(meta: &Meta) -> Vec<Sx> {
    meta.computed_pairs()
        .into_iter()
        .map(|(key, value)| {
            let content = meta_value_text(&key, &value);
            element("meta", vec![attr("name", key), attr("content", content)], vec![])
        })
        .collect()
}

/// A complete HTML document for the zettel.
pub fn zettel_tree(zettel: &ParsedZettel, options: &EncoderOptions) -> Sx {
    let mut eval = HtmlEvaluator::new(options);
    let title = eval.eval_inlines(&inlines_to_sx(&parse_title(&zettel.inh_meta)));
    let mut head = vec![element("meta", vec![attr("charset", "utf-8")], vec![])];
    head.push(element("title", vec![], vec![Sx::str(plain_text(&title))]));
    head.extend(meta_elements(&zettel.inh_meta));

    let mut body = Vec::new();
    if !title.is_empty() {
        body.push(element("h1", vec![], title));
    }
    body.extend(eval.eval_blocks(&blocks_to_sx(&zettel.ast)));
    body.extend(eval.endnotes());

    let lang = options
        .lang
        .clone()
        .or_else(|| zettel.inh_meta.get_value("lang"));
    let html_attrs = lang.map(|l| vec![attr("lang", l)]).unwrap_or_default();
    element(
        "html",
        html_attrs,
        vec![element("head", vec![], head), element("body", vec![], body)],
    )
}

fn attr(name: impl Into<String>, value: impl Into<String>) -> (String, String) {
    (name.into(), value.into())
}

pub fn element(tag: &str, attrs: Vec<(String, String)>, children: Vec<Sx>) -> Sx {
    let mut items = Vec::with_capacity(children.len() + 2);
    items.push(Sx::sym(tag));
    if !attrs.is_empty() {
        let mut list = vec![Sx::sym(SYM_ATTRS)];
        list.extend(
            attrs
                .into_iter()
                .map(|(k, v)| Sx::pair(Sx::sym(k), Sx::str(v))),
        );
        items.push(Sx::list(list));
    }
    items.extend(children);
    Sx::list(items)
}

/// Concatenated text of an HTML tree, as used for `alt` and `title`.
pub fn plain_text(nodes: &[Sx]) -> String {
    fn collect(node: &Sx, out: &mut String) {
        match node {
            Sx::Str(s) => out.push_str(s),
            Sx::List(items) => match items.first().and_then(Sx::as_symbol) {
                Some(SYM_ATTRS | SYM_RAW | SYM_COMMENT) => {}
                Some(_) => items[1..].iter().for_each(|n| collect(n, out)),
                None => items.iter().for_each(|n| collect(n, out)),
            },
            _ => {}
        }
    }
    let mut out = String::new();
    for node in nodes {
        collect(node, &mut out);
    }
    out
}

fn is_attr_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// HTML attributes from node attributes: the default value is a class.
fn html_attrs(attrs: &Attributes) -> Vec<(String, String)> {
    let mut classes: Vec<&str> = Vec::new();
    let mut result = Vec::new();
    for (key, value) in attrs.iter() {
        match key {
            "" | "class" => classes.extend(value.split_whitespace()),
            DASH_KEY => {}
            key if is_attr_name(key) => result.push(attr(key, value)),
            _ => {}
        }
    }
    if !classes.is_empty() {
        result.insert(0, attr("class", classes.join(" ")));
    }
    result
}

fn mime_type(syntax: &str) -> String {
    match syntax {
        "jpg" | "jpeg" => "image/jpeg".to_string(),
        "svg" => "image/svg+xml".to_string(),
        other => format!("image/{other}"),
    }
}

fn is_dangerous_html(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    ["<script", "<iframe", "<object", "<embed"]
        .iter()
        .any(|tag| lower.contains(tag))
}

fn args(sx: &Sx) -> &[Sx] {
    match sx.as_list() {
        Some(items) if !items.is_empty() => &items[1..],
        _ => &[],
    }
}

fn str_arg(args: &[Sx], i: usize) -> &str {
    args.get(i).and_then(Sx::as_str).unwrap_or_default()
}

fn attrs_arg(args: &[Sx], i: usize) -> Attributes {
    args.get(i).map(attrs_from_sx).unwrap_or_default()
}

fn rest(args: &[Sx], from: usize) -> &[Sx] {
    args.get(from..).unwrap_or_default()
}

pub struct HtmlEvaluator<'o> {
    options: &'o EncoderOptions,
    endnotes: Vec<Vec<Sx>>,
}

impl<'o> HtmlEvaluator<'o> {
    pub fn new(options: &'o EncoderOptions) -> HtmlEvaluator<'o> {
        HtmlEvaluator {
            options,
            endnotes: Vec::new(),
        }
    }

    /// Evaluates a `(BLOCK ...)` list.
    pub fn eval_blocks(&mut self, sx: &Sx) -> Vec<Sx> {
        let mut result = Vec::new();
        for block in args(sx) {
            result.extend(self.eval_block(block));
        }
        result
    }

    /// Evaluates an `(INLINE ...)` list.
    pub fn eval_inlines(&mut self, sx: &Sx) -> Vec<Sx> {
        self.eval_inline_items(args(sx))
    }

    /// The collected endnotes as an ordered list. Collection starts anew afterwards.
    pub fn endnotes(&mut self) -> Option<Sx> {
        if self.endnotes.is_empty() {
            return None;
        }
        let items = std::mem::take(&mut self.endnotes)
            .into_iter()
            .enumerate()
            .map(|(i, mut content)| {
                let n = (i + 1).to_string();
                content.push(Sx::str(" "));
                content.push(element(
                    "a",
                    vec![
                        attr("class", "zs-endnote-backref"),
                        attr("href", format!("#fnref:{n}")),
                        attr("role", "doc-backlink"),
                    ],
                    vec![Sx::str("\u{21a9}\u{fe0e}")],
                ));
                element(
                    "li",
                    vec![
                        attr("value", n.clone()),
                        attr("id", format!("fn:{n}")),
                        attr("class", "zs-endnote"),
                    ],
                    content,
                )
            })
            .collect();
        Some(element("ol", vec![attr("class", "zs-endnotes")], items))
    }

    fn allow_raw_html(&self, content: &str) -> bool {
        match self.options.html_insecurity {
            HtmlInsecurity::None => false,
            HtmlInsecurity::Zettelmarkup => true,
            _ => !is_dangerous_html(content),
        }
    }

    fn raw_html(&self, content: &str) -> Vec<Sx> {
        if self.allow_raw_html(content) {
            vec![Sx::list(vec![Sx::sym(SYM_RAW), Sx::str(content)])]
        } else {
            tracing::debug!("[HtmlEvaluator] raw HTML suppressed");
            Vec::new()
        }
    }

    fn comment(attrs: &Attributes, content: &str) -> Vec<Sx> {
        if attrs.has(DASH_KEY) {
            vec![Sx::list(vec![Sx::sym(SYM_COMMENT), Sx::str(content)])]
        } else {
            Vec::new()
        }
    }

    /// Content of a list item or description: a lone paragraph is unwrapped.
    fn compact_blocks(&mut self, sx: &Sx) -> Vec<Sx> {
        match args(sx) {
            [para] if para.head() == Some("PARA") => self.eval_inline_items(args(para)),
            _ => self.eval_blocks(sx),
        }
    }

    fn eval_block(&mut self, sx: &Sx) -> Vec<Sx> {
        let a = args(sx);
        let head = sx.head().unwrap_or_default();
        let node = match head {
            "PARA" => element("p", vec![], self.eval_inline_items(a)),
            "HEADING" => {
                let level = match a.first() {
                    Some(Sx::Int(n)) => (*n).clamp(1, 5) + 1,
                    _ => 2,
                };
                let mut attrs = Vec::new();
                let fragment = str_arg(a, 3);
                if !fragment.is_empty() {
                    attrs.push(attr("id", fragment));
                }
                attrs.extend(html_attrs(&attrs_arg(a, 1)));
                element(
                    &format!("h{level}"),
                    attrs,
                    self.eval_inline_items(rest(a, 4)),
                )
            }
            "THEMATIC" => element("hr", html_attrs(&attrs_arg(a, 0)), vec![]),
            "LIST-ORDERED" | "LIST-UNORDERED" => {
                let tag = if head == "LIST-ORDERED" { "ol" } else { "ul" };
                let items = a
                    .iter()
                    .map(|item| element("li", vec![], self.compact_blocks(item)))
                    .collect();
                element(tag, vec![], items)
            }
            "LIST-QUOTE" => {
                let mut children = Vec::new();
                for item in a {
                    children.extend(self.eval_blocks(item));
                }
                element("blockquote", vec![], children)
            }
            "DESCRIPTION" => {
                let mut children = Vec::new();
                for pair in a.chunks(2) {
                    children.push(element("dt", vec![], self.eval_inlines(&pair[0])));
                    if let Some(defs) = pair.get(1) {
                        for def in args(defs) {
                            children.push(element("dd", vec![], self.compact_blocks(def)));
                        }
                    }
                }
                element("dl", vec![], children)
            }
            "TABLE" => self.eval_table(a),
            "REGION-BLOCK" | "REGION-QUOTE" | "REGION-VERSE" => {
                let mut attrs = attrs_arg(a, 0);
                let tag = match head {
                    "REGION-QUOTE" => "blockquote",
                    "REGION-VERSE" => {
                        attrs.add_class("zs-verse");
                        "div"
                    }
                    _ => "div",
                };
                let mut children = a.get(1).map(|b| self.eval_blocks(b)).unwrap_or_default();
                let cite = self.eval_inline_items(rest(a, 2));
                if !cite.is_empty() {
                    children.push(element("cite", vec![], cite));
                }
                element(tag, html_attrs(&attrs), children)
            }
            "VERBATIM-COMMENT" => return Self::comment(&attrs_arg(a, 0), str_arg(a, 1)),
            "VERBATIM-HTML" => return self.raw_html(str_arg(a, 1)),
            "VERBATIM-CODE" | "VERBATIM-EVAL" | "VERBATIM-MATH" | "VERBATIM-ZETTEL" => {
                let mut attrs = attrs_arg(a, 0);
                let class = match head {
                    "VERBATIM-CODE" => attrs
                        .remove("")
                        .map(|lang| format!("language-{lang}")),
                    "VERBATIM-EVAL" => Some("zs-eval".to_string()),
                    "VERBATIM-MATH" => Some("zs-math".to_string()),
                    _ => Some("zs-zettel".to_string()),
                };
                if let Some(class) = class {
                    attrs.add_class(&class);
                }
                element(
                    "pre",
                    vec![],
                    vec![element(
                        "code",
                        html_attrs(&attrs),
                        vec![Sx::str(str_arg(a, 1))],
                    )],
                )
            }
            "TRANSCLUDE" => {
                let target = a.get(1).map(|r| str_arg(args(r), 0)).unwrap_or_default();
                element(
                    "p",
                    vec![],
                    vec![element(
                        "a",
                        vec![attr("href", target)],
                        vec![Sx::str(target)],
                    )],
                )
            }
            "BLOB" => {
                let description = a.first().map(|d| self.eval_inlines(d)).unwrap_or_default();
                let embedded = self.blob(&description, str_arg(a, 1), str_arg(a, 2));
                element("p", vec![], embedded)
            }
            other => {
                tracing::debug!("[HtmlEvaluator] unknown block {other:?}");
                return Vec::new();
            }
        };
        vec![node]
    }

    fn eval_table(&mut self, a: &[Sx]) -> Sx {
        let mut children = Vec::new();
        if let Some(header) = a.first().and_then(Sx::as_list) {
            if !header.is_empty() {
                let row = self.eval_row(header, "th");
                children.push(element("thead", vec![], vec![row]));
            }
        }
        let rows: Vec<Sx> = a[1.min(a.len())..]
            .iter()
            .filter_map(Sx::as_list)
            .map(|row| self.eval_row(row, "td"))
            .collect();
        if !rows.is_empty() {
            children.push(element("tbody", vec![], rows));
        }
        element("table", vec![], children)
    }

    fn eval_row(&mut self, cells: &[Sx], tag: &str) -> Sx {
        let cells = cells
            .iter()
            .map(|cell| {
                let attrs = match cell.head() {
                    Some("CELL-LEFT") => vec![attr("class", "left")],
                    Some("CELL-CENTER") => vec![attr("class", "center")],
                    Some("CELL-RIGHT") => vec![attr("class", "right")],
                    _ => vec![],
                };
                element(tag, attrs, self.eval_inline_items(args(cell)))
            })
            .collect();
        element("tr", vec![], cells)
    }

    fn blob(&self, description: &[Sx], syntax: &str, data: &str) -> Vec<Sx> {
        if syntax == "svg" {
            return vec![Sx::list(vec![Sx::sym(SYM_RAW), Sx::str(data)])];
        }
        vec![element(
            "img",
            vec![
                attr("alt", plain_text(description)),
                attr("src", format!("data:{};base64,{data}", mime_type(syntax))),
            ],
            vec![],
        )]
    }

    fn eval_inline_items(&mut self, items: &[Sx]) -> Vec<Sx> {
        let mut result = Vec::with_capacity(items.len());
        for item in items {
            result.extend(self.eval_inline(item));
        }
        result
    }

    fn eval_inline(&mut self, sx: &Sx) -> Vec<Sx> {
        let a = args(sx);
        let head = sx.head().unwrap_or_default();
        let node = match head {
            "TEXT" => Sx::str(str_arg(a, 0)),
            "SPACE" => Sx::str(" "),
            "SOFT" => Sx::str("\n"),
            "HARD" => element("br", vec![], vec![]),
            "EMBED" => {
                let target = a.get(1).map(|r| str_arg(args(r), 0)).unwrap_or_default();
                let alt = self.eval_inline_items(rest(a, 3));
                let mut attrs = vec![attr("src", target), attr("alt", plain_text(&alt))];
                attrs.extend(html_attrs(&attrs_arg(a, 0)));
                element("img", attrs, vec![])
            }
            "EMBED-BLOB" => {
                let alt = self.eval_inline_items(rest(a, 3));
                return self.blob(&alt, str_arg(a, 1), str_arg(a, 2));
            }
            "CITE" => {
                let mut children = vec![Sx::str(str_arg(a, 1))];
                let text = self.eval_inline_items(rest(a, 2));
                if !text.is_empty() {
                    children.push(Sx::str(", "));
                    children.extend(text);
                }
                let mut attrs = attrs_arg(a, 0);
                attrs.add_class("zs-cite");
                element("span", html_attrs(&attrs), children)
            }
            "ENDNOTE" => {
                let content = self.eval_inline_items(rest(a, 1));
                self.endnotes.push(content);
                let n = self.endnotes.len().to_string();
                element(
                    "sup",
                    vec![attr("id", format!("fnref:{n}"))],
                    vec![element(
                        "a",
                        vec![
                            attr("class", "zs-noteref"),
                            attr("href", format!("#fn:{n}")),
                            attr("role", "doc-noteref"),
                        ],
                        vec![Sx::str(n)],
                    )],
                )
            }
            "MARK" => {
                let children = self.eval_inline_items(rest(a, 3));
                let fragment = str_arg(a, 2);
                if fragment.is_empty() {
                    return children;
                }
                element("a", vec![attr("id", fragment)], children)
            }
            "LITERAL-COMMENT" => return Self::comment(&attrs_arg(a, 0), str_arg(a, 1)),
            "LITERAL-HTML" => return self.raw_html(str_arg(a, 1)),
            "LITERAL-CODE" | "LITERAL-INPUT" | "LITERAL-OUTPUT" | "LITERAL-MATH"
            | "LITERAL-ZETTEL" => {
                let mut attrs = attrs_arg(a, 0);
                let tag = match head {
                    "LITERAL-INPUT" => "kbd",
                    "LITERAL-OUTPUT" => "samp",
                    "LITERAL-MATH" => {
                        attrs.add_class("zs-math");
                        "code"
                    }
                    _ => "code",
                };
                element(tag, html_attrs(&attrs), vec![Sx::str(str_arg(a, 1))])
            }
            head if head.starts_with("LINK-") => return self.eval_link(head, a),
            head if head.starts_with("FORMAT-") => {
                let tag = match head {
                    "FORMAT-EMPH" => "em",
                    "FORMAT-STRONG" => "strong",
                    "FORMAT-INSERT" => "ins",
                    "FORMAT-DELETE" => "del",
                    "FORMAT-SUPER" => "sup",
                    "FORMAT-SUB" => "sub",
                    "FORMAT-QUOTE" => "q",
                    "FORMAT-MARK" => "mark",
                    _ => "span",
                };
                element(
                    tag,
                    html_attrs(&attrs_arg(a, 0)),
                    self.eval_inline_items(rest(a, 1)),
                )
            }
            other => {
                tracing::debug!("[HtmlEvaluator] unknown inline {other:?}");
                return Vec::new();
            }
        };
        vec![node]
    }

    fn eval_link(&mut self, head: &str, a: &[Sx]) -> Vec<Sx> {
        let state = RefState::from_symbol(&head["LINK-".len()..]).unwrap_or(RefState::Invalid);
        let value = str_arg(a, 1);
        let mut children = self.eval_inline_items(rest(a, 2));
        if children.is_empty() {
            children.push(Sx::str(match state {
                RefState::Query => format!("query:{value}"),
                _ => value.to_string(),
            }));
        }
        let user = html_attrs(&attrs_arg(a, 0));
        let mut attrs = match state {
            RefState::Invalid => return vec![element("span", user, children)],
            RefState::Query => {
                let query: String = url::form_urlencoded::byte_serialize(value.as_bytes()).collect();
                vec![attr("href", format!("?q={query}"))]
            }
            RefState::Broken => vec![
                attr("href", value),
                attr("class", "broken"),
                attr("title", BROKEN_TITLE),
            ],
            RefState::External => vec![
                attr("href", value),
                attr("class", "external"),
                attr("target", "_blank"),
                attr("rel", "noopener noreferrer"),
            ],
            _ => vec![attr("href", value)],
        };
        for (k, v) in user {
            match attrs.iter_mut().find(|(name, _)| *name == k) {
                Some(existing) if k == "class" => existing.1 = format!("{} {v}", existing.1),
                Some(_) => {}
                None => attrs.push((k, v)),
            }
        }
        vec![element("a", attrs, children)]
    }
}
