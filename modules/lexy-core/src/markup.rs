//! Typed tree for AI responses.
//!
//! Completions come back as a loose mix of the HTML subset the prompts ask
//! for and markdown the model falls back to. [`parse`] turns either into a
//! [`Document`]; rendering is then a pure walk over the tree.

use std::mem;
use std::sync::LazyLock;

use regex::{Captures, Regex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(String),
    Strong(Vec<Inline>),
    Emphasis(Vec<Inline>),
    Link { href: String, children: Vec<Inline> },
    /// A numbered source reference, `[n]` linking to the source URL.
    Citation { index: u32, href: String },
    LineBreak,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: u8, content: Vec<Inline> },
    Paragraph(Vec<Inline>),
    List { ordered: bool, items: Vec<Vec<Inline>> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub blocks: Vec<Block>,
}

impl Document {
    pub fn parse(input: &str) -> Self {
        parse(input)
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Blocks separated by blank lines; list items prefixed `- ` or `n. `.
    pub fn to_plain_text(&self) -> String {
        self.blocks
            .iter()
            .map(|block| match block {
                Block::Heading { content, .. } | Block::Paragraph(content) => plain(content),
                Block::List { ordered, items } => items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        if *ordered {
                            format!("{}. {}", i + 1, plain(item))
                        } else {
                            format!("- {}", plain(item))
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("\n"),
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Distinct `(index, href)` citations in order of first appearance.
    pub fn citations(&self) -> Vec<(u32, String)> {
        let mut out: Vec<(u32, String)> = Vec::new();
        for block in &self.blocks {
            match block {
                Block::Heading { content, .. } | Block::Paragraph(content) => {
                    collect_citations(content, &mut out)
                }
                Block::List { items, .. } => {
                    for item in items {
                        collect_citations(item, &mut out);
                    }
                }
            }
        }
        out
    }
}

fn plain(inlines: &[Inline]) -> String {
    let mut out = String::new();
    for inline in inlines {
        match inline {
            Inline::Text(t) => out.push_str(t),
            Inline::Strong(c) | Inline::Emphasis(c) => out.push_str(&plain(c)),
            Inline::Link { children, .. } => out.push_str(&plain(children)),
            Inline::Citation { index, .. } => out.push_str(&format!("[{index}]")),
            Inline::LineBreak => out.push('\n'),
        }
    }
    out
}

fn collect_citations(inlines: &[Inline], out: &mut Vec<(u32, String)>) {
    for inline in inlines {
        match inline {
            Inline::Citation { index, href } => {
                if !out.iter().any(|(i, h)| i == index && h == href) {
                    out.push((*index, href.clone()));
                }
            }
            Inline::Strong(c) | Inline::Emphasis(c) => collect_citations(c, out),
            Inline::Link { children, .. } => collect_citations(children, out),
            Inline::Text(_) | Inline::LineBreak => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(/?)([a-zA-Z][a-zA-Z0-9]*)\b([^>]*)>").unwrap());
static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)href\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#).unwrap()
});
static MD_INLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*|\[([^\]]+)\]\(([^)\s]+)\)").unwrap());
static MD_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+)$").unwrap());
static MD_BULLET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[-*•]\s+(.+)$").unwrap());
static MD_ORDERED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+[.)]\s+(.+)$").unwrap());
static CITATION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\[(\d+)\]$").unwrap());
static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").unwrap());

pub fn parse(input: &str) -> Document {
    let input = strip_fence(input);
    let mut parser = Parser::new();
    let mut last = 0;

    for caps in TAG_RE.captures_iter(input) {
        let Some(whole) = caps.get(0) else { continue };
        parser.text(&input[last..whole.start()]);

        let closing = caps.get(1).is_some_and(|g| !g.as_str().is_empty());
        let name = caps
            .get(2)
            .map(|g| g.as_str().to_ascii_lowercase())
            .unwrap_or_default();
        let attrs = caps.get(3).map_or("", |g| g.as_str());
        parser.tag(&name, closing, attrs);

        last = whole.end();
    }
    parser.text(&input[last..]);
    parser.finish()
}

/// Drops a surrounding ```` ``` ```` fence some models wrap output in.
fn strip_fence(input: &str) -> &str {
    let trimmed = input.trim();
    if !trimmed.starts_with("```") {
        return input;
    }
    let body = trimmed.split_once('\n').map_or("", |(_, rest)| rest);
    body.trim_end().strip_suffix("```").unwrap_or(body)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Paragraph,
    Heading(u8),
    ListItem,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Frame {
    Strong,
    Emphasis,
    Link(String),
}

impl Frame {
    fn same_kind(&self, other: &Frame) -> bool {
        mem::discriminant(self) == mem::discriminant(other)
    }

    fn wrap(self, children: Vec<Inline>) -> Inline {
        match self {
            Frame::Strong => Inline::Strong(children),
            Frame::Emphasis => Inline::Emphasis(children),
            Frame::Link(href) => Inline::Link { href, children },
        }
    }
}

struct ListBuilder {
    ordered: bool,
    items: Vec<Vec<Inline>>,
    /// Open `<ul>`/`<ol>` tags; 0 for markdown or implicit lists.
    nesting: usize,
}

struct Parser {
    blocks: Vec<Block>,
    root: Vec<Inline>,
    frames: Vec<(Frame, Vec<Inline>)>,
    context: Option<Context>,
    list: Option<ListBuilder>,
    /// Open HTML block elements. Markdown line syntax applies only at zero.
    html_depth: usize,
    at_line_start: bool,
}

impl Parser {
    fn new() -> Self {
        Self {
            blocks: Vec::new(),
            root: Vec::new(),
            frames: Vec::new(),
            context: None,
            list: None,
            html_depth: 0,
            at_line_start: true,
        }
    }

    fn finish(mut self) -> Document {
        self.finish_block();
        self.finish_list();
        Document {
            blocks: self.blocks,
        }
    }

    // --- tags ---

    fn tag(&mut self, name: &str, closing: bool, attrs: &str) {
        match name {
            "strong" | "b" => self.inline_tag(Frame::Strong, closing),
            "em" | "i" => self.inline_tag(Frame::Emphasis, closing),
            "a" => {
                let href = if closing { String::new() } else { href_of(attrs) };
                self.inline_tag(Frame::Link(href), closing);
            }
            "br" => {
                if self.context.is_some() {
                    self.push(Inline::LineBreak);
                }
            }
            "p" => self.paragraph_tag(closing),
            "ul" | "ol" => self.list_tag(name == "ol", closing),
            "li" => self.item_tag(closing),
            "div" | "section" | "article" | "blockquote" | "hr" => {
                self.finish_block();
                self.at_line_start = true;
            }
            _ => {
                if let Some(level) = heading_level(name) {
                    self.heading_tag(level, closing);
                }
            }
        }
    }

    fn inline_tag(&mut self, frame: Frame, closing: bool) {
        self.at_line_start = false;
        if closing {
            self.close_frame(&frame);
        } else {
            self.ensure_block();
            self.frames.push((frame, Vec::new()));
        }
    }

    fn paragraph_tag(&mut self, closing: bool) {
        self.at_line_start = true;
        if closing {
            self.html_depth = self.html_depth.saturating_sub(1);
            if self.context == Some(Context::Paragraph) {
                self.finish_block();
            }
            return;
        }
        self.html_depth += 1;
        if self.context == Some(Context::ListItem) {
            return;
        }
        self.finish_block();
        self.ensure_block();
    }

    fn heading_tag(&mut self, level: u8, closing: bool) {
        self.at_line_start = true;
        if closing {
            self.html_depth = self.html_depth.saturating_sub(1);
            if matches!(self.context, Some(Context::Heading(_))) {
                self.finish_block();
            }
            return;
        }
        self.html_depth += 1;
        self.finish_block();
        self.finish_list();
        self.context = Some(Context::Heading(level));
    }

    fn list_tag(&mut self, ordered: bool, closing: bool) {
        self.at_line_start = true;
        self.finish_block();
        if closing {
            self.html_depth = self.html_depth.saturating_sub(1);
            let done = match &mut self.list {
                Some(list) if list.nesting > 1 => {
                    list.nesting -= 1;
                    false
                }
                Some(_) => true,
                None => false,
            };
            if done {
                self.finish_list();
            }
            return;
        }
        self.html_depth += 1;
        // Nested lists are flattened into the outer one.
        if let Some(list) = self.list.as_mut() {
            list.nesting += 1;
        } else {
            self.list = Some(ListBuilder {
                ordered,
                items: Vec::new(),
                nesting: 1,
            });
        }
    }

    fn item_tag(&mut self, closing: bool) {
        self.at_line_start = true;
        if closing {
            self.html_depth = self.html_depth.saturating_sub(1);
            if self.context == Some(Context::ListItem) {
                self.finish_block();
            }
            return;
        }
        self.html_depth += 1;
        self.finish_block();
        if self.list.is_none() {
            self.list = Some(ListBuilder {
                ordered: false,
                items: Vec::new(),
                nesting: 0,
            });
        }
        self.context = Some(Context::ListItem);
    }

    // --- text ---

    fn text(&mut self, raw: &str) {
        if raw.is_empty() {
            return;
        }
        if self.html_depth > 0 {
            self.html_text(raw);
        } else {
            self.markdown_text(raw);
        }
    }

    fn html_text(&mut self, raw: &str) {
        self.at_line_start = false;
        if raw.trim().is_empty() {
            if self.context.is_some() {
                self.push(Inline::Text(" ".to_string()));
            }
            return;
        }
        self.ensure_block();
        for inline in markdown_inlines(raw) {
            self.push(inline);
        }
    }

    fn markdown_text(&mut self, raw: &str) {
        let lines: Vec<&str> = raw.split('\n').collect();
        let last = lines.len() - 1;
        for (i, line) in lines.iter().enumerate() {
            let starts_line = i > 0 || self.at_line_start;
            let ends_line = i < last;
            self.markdown_line(line, starts_line, ends_line);
        }
        if last > 0 {
            self.at_line_start = lines[last].trim().is_empty();
        } else if !lines[0].trim().is_empty() {
            self.at_line_start = false;
        }
    }

    fn markdown_line(&mut self, line: &str, starts_line: bool, ends_line: bool) {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            if starts_line && ends_line {
                self.finish_block();
            } else if !line.is_empty() && self.context.is_some() {
                self.push(Inline::Text(" ".to_string()));
            }
            return;
        }

        let mut content = line;
        if starts_line {
            if let Some(caps) = MD_HEADING_RE.captures(trimmed) {
                self.finish_block();
                self.finish_list();
                self.context = Some(Context::Heading(caps[1].len() as u8));
                content = caps.get(2).map_or("", |g| g.as_str());
            } else if let Some(caps) = MD_BULLET_RE.captures(trimmed) {
                self.start_markdown_item(false);
                content = caps.get(1).map_or("", |g| g.as_str());
            } else if let Some(caps) = MD_ORDERED_RE.captures(trimmed) {
                self.start_markdown_item(true);
                content = caps.get(1).map_or("", |g| g.as_str());
            } else if self.context == Some(Context::Paragraph) {
                self.push(Inline::Text(" ".to_string()));
            }
        }

        self.ensure_block();
        for inline in markdown_inlines(content) {
            self.push(inline);
        }

        if ends_line && matches!(self.context, Some(Context::Heading(_) | Context::ListItem)) {
            self.finish_block();
        }
    }

    fn start_markdown_item(&mut self, ordered: bool) {
        self.finish_block();
        if self.list.as_ref().is_some_and(|l| l.ordered != ordered) {
            self.finish_list();
        }
        if self.list.is_none() {
            self.list = Some(ListBuilder {
                ordered,
                items: Vec::new(),
                nesting: 0,
            });
        }
        self.context = Some(Context::ListItem);
    }

    // --- blocks ---

    /// Open a block for stray content: an item inside an open HTML list,
    /// otherwise a paragraph.
    fn ensure_block(&mut self) {
        if self.context.is_some() {
            return;
        }
        if self.list.as_ref().is_some_and(|l| l.nesting > 0) {
            self.context = Some(Context::ListItem);
        } else {
            self.finish_list();
            self.context = Some(Context::Paragraph);
        }
    }

    fn push(&mut self, inline: Inline) {
        match self.frames.last_mut() {
            Some((_, children)) => children.push(inline),
            None => self.root.push(inline),
        }
    }

    fn close_frame(&mut self, frame: &Frame) {
        let Some(pos) = self.frames.iter().rposition(|(f, _)| f.same_kind(frame)) else {
            return;
        };
        while self.frames.len() > pos {
            if let Some((f, children)) = self.frames.pop() {
                self.push(f.wrap(children));
            }
        }
    }

    fn finish_block(&mut self) {
        while let Some((f, children)) = self.frames.pop() {
            self.push(f.wrap(children));
        }
        let content = trim_edges(normalize(mem::take(&mut self.root)));
        let context = self.context.take();
        if content.is_empty() {
            return;
        }
        match (context, &mut self.list) {
            (Some(Context::Heading(level)), _) => self.blocks.push(Block::Heading { level, content }),
            (Some(Context::ListItem), Some(list)) => list.items.push(content),
            _ => self.blocks.push(Block::Paragraph(content)),
        }
    }

    fn finish_list(&mut self) {
        if self.context == Some(Context::ListItem) {
            self.finish_block();
        }
        if let Some(list) = self.list.take() {
            if !list.items.is_empty() {
                self.blocks.push(Block::List {
                    ordered: list.ordered,
                    items: list.items,
                });
            }
        }
    }
}

fn heading_level(name: &str) -> Option<u8> {
    let digit = name.strip_prefix('h')?;
    match digit.parse::<u8>() {
        Ok(level @ 1..=6) => Some(level),
        _ => None,
    }
}

fn href_of(attrs: &str) -> String {
    HREF_RE
        .captures(attrs)
        .and_then(|c| c.get(1).or_else(|| c.get(2)).or_else(|| c.get(3)))
        .map(|m| decode_entities(m.as_str()))
        .unwrap_or_default()
}

/// `**bold**` and `[label](url)` inside a run of text.
fn markdown_inlines(text: &str) -> Vec<Inline> {
    let mut out = Vec::new();
    let mut last = 0;

    for caps in MD_INLINE_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            out.push(Inline::Text(decode_entities(&text[last..whole.start()])));
        }
        if let Some(bold) = caps.get(1) {
            out.push(Inline::Strong(vec![Inline::Text(decode_entities(bold.as_str()))]));
        } else if let (Some(label), Some(href)) = (caps.get(2), caps.get(3)) {
            let href = decode_entities(href.as_str());
            out.push(match label.as_str().trim().parse::<u32>() {
                Ok(index) => Inline::Citation { index, href },
                Err(_) => Inline::Link {
                    href,
                    children: vec![Inline::Text(decode_entities(label.as_str()))],
                },
            });
        }
        last = whole.end();
    }
    if last < text.len() {
        out.push(Inline::Text(decode_entities(&text[last..])));
    }
    out
}

fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &Captures| {
            let name = &caps[1];
            let decoded = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match name {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    _ => None,
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), |c| c.to_string())
        })
        .into_owned()
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

/// Collapse whitespace, merge adjacent text, drop empty wrappers and turn
/// `[n]` links into citations.
fn normalize(inlines: Vec<Inline>) -> Vec<Inline> {
    let mut out: Vec<Inline> = Vec::new();
    for inline in inlines {
        let inline = match inline {
            Inline::Text(t) => {
                let t = collapse_whitespace(&t);
                if t.is_empty() {
                    continue;
                }
                Inline::Text(t)
            }
            Inline::Strong(c) => {
                let c = normalize(c);
                if c.is_empty() {
                    continue;
                }
                Inline::Strong(c)
            }
            Inline::Emphasis(c) => {
                let c = normalize(c);
                if c.is_empty() {
                    continue;
                }
                Inline::Emphasis(c)
            }
            Inline::Link { href, children } => {
                let children = normalize(children);
                let label = plain(&children);
                match CITATION_RE
                    .captures(label.trim())
                    .and_then(|c| c[1].parse::<u32>().ok())
                {
                    Some(index) => Inline::Citation { index, href },
                    None => Inline::Link { href, children },
                }
            }
            other => other,
        };

        if let (Some(Inline::Text(prev)), Inline::Text(next)) = (out.last_mut(), &inline) {
            if prev.ends_with(' ') && next.starts_with(' ') {
                prev.push_str(&next[1..]);
            } else {
                prev.push_str(next);
            }
            continue;
        }
        out.push(inline);
    }
    out
}

fn trim_edges(mut inlines: Vec<Inline>) -> Vec<Inline> {
    loop {
        match inlines.first_mut() {
            Some(Inline::LineBreak) => {
                inlines.remove(0);
            }
            Some(Inline::Text(t)) => {
                let trimmed = t.trim_start();
                if trimmed.is_empty() {
                    inlines.remove(0);
                } else {
                    *t = trimmed.to_string();
                    break;
                }
            }
            _ => break,
        }
    }
    loop {
        match inlines.last_mut() {
            Some(Inline::LineBreak) => {
                inlines.pop();
            }
            Some(Inline::Text(t)) => {
                let trimmed = t.trim_end();
                if trimmed.is_empty() {
                    inlines.pop();
                } else {
                    *t = trimmed.to_string();
                    break;
                }
            }
            _ => break,
        }
    }
    inlines
}
