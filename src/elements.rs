//! Structured document elements read back from the generated HTML.
//! These carry formatting intent so the layout engine can render
//! headers at different sizes, indent lists, shade code, etc.

use crate::error::{ConvertError, Result};
use crate::fonts::expand_tabs;
use crate::highlight::CodePalette;
use crate::table_renderer::{TableCell, TableRow};
use crate::theme::Rgb;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html};
use syntect::parsing::Scope;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableAlignment {
    #[default]
    Left,
    Center,
    Right,
}

impl TableAlignment {
    /// Read `align="..."` or a `text-align` declaration from a cell.
    fn from_cell(el: &scraper::node::Element) -> Self {
        let declared = el.attr("align").map(str::to_string).or_else(|| {
            el.attr("style").and_then(|style| {
                style.split(';').find_map(|decl| {
                    let (key, value) = decl.split_once(':')?;
                    (key.trim() == "text-align").then(|| value.trim().to_string())
                })
            })
        });
        match declared.as_deref() {
            Some("center") => TableAlignment::Center,
            Some("right") => TableAlignment::Right,
            _ => TableAlignment::Left,
        }
    }
}

/// Inline formatting carried by one run of text.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunStyle {
    pub bold: bool,
    pub italic: bool,
    pub mono: bool,
    /// Inline `<code>` shading (not used inside code blocks).
    pub code_background: bool,
    pub strike: bool,
    /// Explicit colour; highlighted code only.
    pub color: Option<Rgb>,
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub style: RunStyle,
}

impl TextRun {
    pub fn plain(text: &str) -> Self {
        Self {
            text: text.to_string(),
            style: RunStyle::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    /// `Some` for task list items.
    pub checked: Option<bool>,
    pub children: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Heading { level: u8, runs: Vec<TextRun> },
    Paragraph { runs: Vec<TextRun> },
    /// Inline content without a `<p>` of its own, e.g. tight list items.
    Text { runs: Vec<TextRun> },
    CodeBlock { language: Option<String>, lines: Vec<Vec<TextRun>> },
    List { ordered: bool, start: u32, items: Vec<ListItem> },
    BlockQuote { children: Vec<Element> },
    Table { rows: Vec<TableRow> },
    HorizontalRule,
}

impl Element {
    /// Concatenated text, used for logging and tests.
    pub fn plain_text(&self) -> String {
        fn runs_text(runs: &[TextRun]) -> String {
            runs.iter().map(|r| r.text.as_str()).collect()
        }
        match self {
            Element::Heading { runs, .. } | Element::Paragraph { runs } | Element::Text { runs } => {
                runs_text(runs)
            }
            Element::CodeBlock { lines, .. } => lines
                .iter()
                .map(|l| runs_text(l))
                .collect::<Vec<_>>()
                .join("\n"),
            Element::List { items, .. } => items
                .iter()
                .flat_map(|i| i.children.iter().map(Element::plain_text))
                .collect::<Vec<_>>()
                .join("\n"),
            Element::BlockQuote { children } => children
                .iter()
                .map(Element::plain_text)
                .collect::<Vec<_>>()
                .join("\n"),
            Element::Table { rows } => rows
                .iter()
                .map(|r| {
                    r.cells
                        .iter()
                        .map(|c| runs_text(&c.runs))
                        .collect::<Vec<_>>()
                        .join(" | ")
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Element::HorizontalRule => String::new(),
        }
    }
}

/// A parsed HTML document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub title: Option<String>,
    pub elements: Vec<Element>,
}

fn is_block(name: &str) -> bool {
    matches!(
        name,
        "h1" | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "p"
            | "pre"
            | "ul"
            | "ol"
            | "li"
            | "blockquote"
            | "table"
            | "hr"
            | "div"
            | "section"
            | "article"
            | "main"
            | "header"
            | "footer"
            | "nav"
            | "aside"
            | "figure"
            | "figcaption"
            | "details"
            | "summary"
            | "dl"
            | "dt"
            | "dd"
            | "address"
    )
}

fn is_skipped(name: &str) -> bool {
    matches!(name, "head" | "script" | "style" | "template" | "title" | "noscript")
}

fn child_elements<'a>(el: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    el.children().filter_map(ElementRef::wrap)
}

fn find_child<'a>(el: ElementRef<'a>, name: &str) -> Option<ElementRef<'a>> {
    child_elements(el).find(|c| c.value().name() == name)
}

/// Parse an HTML document into layout elements.
///
/// `palette` resolves the colour of highlighted code spans.
pub fn parse_html(html: &str, palette: &CodePalette<'_>) -> Result<Document> {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let title = find_child(root, "head")
        .and_then(|head| find_child(head, "title"))
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let body = find_child(root, "body")
        .ok_or_else(|| ConvertError::Html("document has no <body>".to_string()))?;

    let walker = Walker { palette };
    Ok(Document {
        title,
        elements: walker.blocks(body),
    })
}

/// Collects inline runs, collapsing whitespace the way HTML does.
struct InlineRuns {
    runs: Vec<TextRun>,
    /// True when the next space would be leading (start of block or after a
    /// space or hard break).
    suppress_space: bool,
}

impl InlineRuns {
    fn new() -> Self {
        Self {
            runs: Vec::new(),
            suppress_space: true,
        }
    }

    fn push_raw(&mut self, text: &str, style: &RunStyle) {
        if text.is_empty() {
            return;
        }
        match self.runs.last_mut() {
            Some(last) if last.style == *style => last.text.push_str(text),
            _ => self.runs.push(TextRun {
                text: text.to_string(),
                style: style.clone(),
            }),
        }
    }

    fn push_text(&mut self, text: &str, style: &RunStyle) {
        let collapsed = WHITESPACE.replace_all(text, " ");
        let mut s: &str = &collapsed;
        if self.suppress_space {
            s = s.trim_start_matches(' ');
        }
        if s.is_empty() {
            return;
        }
        self.suppress_space = s.ends_with(' ');
        self.push_raw(s, style);
    }

    fn hard_break(&mut self) {
        self.trim_end();
        self.push_raw("\n", &RunStyle::default());
        self.suppress_space = true;
    }

    fn trim_end(&mut self) {
        while let Some(last) = self.runs.last_mut() {
            let trimmed_len = last.text.trim_end_matches(' ').len();
            last.text.truncate(trimmed_len);
            if last.text.is_empty() {
                self.runs.pop();
            } else {
                break;
            }
        }
    }

    fn take(&mut self) -> Vec<TextRun> {
        self.trim_end();
        self.suppress_space = true;
        std::mem::take(&mut self.runs)
    }
}

struct Walker<'p, 'a> {
    palette: &'p CodePalette<'a>,
}

impl Walker<'_, '_> {
    /// Block-level content of a container element.
    fn blocks(&self, container: ElementRef<'_>) -> Vec<Element> {
        let mut out = Vec::new();
        let mut inline = InlineRuns::new();
        let base = RunStyle::default();

        for child in container.children() {
            match child.value() {
                Node::Text(text) => inline.push_text(text, &base),
                Node::Element(el) => {
                    let Some(child_ref) = ElementRef::wrap(child) else {
                        continue;
                    };
                    let name = el.name();
                    if is_skipped(name) {
                        continue;
                    }
                    if is_block(name) {
                        let runs = inline.take();
                        if !runs.is_empty() {
                            out.push(Element::Text { runs });
                        }
                        self.block(child_ref, &mut out);
                    } else {
                        self.inline(child_ref, &base, &mut inline);
                    }
                }
                _ => {}
            }
        }

        let runs = inline.take();
        if !runs.is_empty() {
            out.push(Element::Text { runs });
        }
        out
    }

    fn block(&self, el: ElementRef<'_>, out: &mut Vec<Element>) {
        let name = el.value().name();
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse::<u8>().unwrap_or(1);
                let runs = self.inline_runs(el, &RunStyle::default());
                out.push(Element::Heading { level, runs });
            }
            "p" | "dt" | "summary" | "figcaption" => {
                let style = RunStyle {
                    bold: name == "dt" || name == "summary",
                    ..RunStyle::default()
                };
                let runs = self.inline_runs(el, &style);
                if !runs.is_empty() {
                    out.push(Element::Paragraph { runs });
                }
            }
            "pre" => out.push(self.code_block(el)),
            "ul" | "ol" => out.push(self.list(el, name == "ol")),
            "blockquote" | "dd" => out.push(Element::BlockQuote {
                children: self.blocks(el),
            }),
            "table" => out.push(Element::Table {
                rows: self.table_rows(el),
            }),
            "hr" => out.push(Element::HorizontalRule),
            _ => out.extend(self.blocks(el)),
        }
    }

    fn inline_runs(&self, el: ElementRef<'_>, style: &RunStyle) -> Vec<TextRun> {
        let mut acc = InlineRuns::new();
        self.inline_children(el, style, &mut acc);
        acc.take()
    }

    fn inline_children(&self, el: ElementRef<'_>, style: &RunStyle, acc: &mut InlineRuns) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => acc.push_text(text, style),
                Node::Element(_) => {
                    if let Some(child_ref) = ElementRef::wrap(child) {
                        self.inline(child_ref, style, acc);
                    }
                }
                _ => {}
            }
        }
    }

    fn inline(&self, el: ElementRef<'_>, style: &RunStyle, acc: &mut InlineRuns) {
        let value = el.value();
        let name = value.name();
        let mut style = style.clone();
        match name {
            "strong" | "b" => style.bold = true,
            "em" | "i" | "cite" | "var" => style.italic = true,
            "code" | "kbd" | "samp" | "tt" => {
                style.mono = true;
                style.code_background = true;
            }
            "del" | "s" | "strike" => style.strike = true,
            "a" => {
                // Footnote back-references point inside the document only.
                if value.classes().any(|c| c == "footnote-backref") {
                    return;
                }
                // Fragment-only targets (footnote references) have nowhere to go
                // in a PDF; keep their text but not the link.
                if let Some(href) = value
                    .attr("href")
                    .filter(|h| !h.is_empty() && !h.starts_with('#'))
                {
                    style.link = Some(href.to_string());
                }
            }
            "br" => {
                acc.hard_break();
                return;
            }
            "img" => {
                let alt = value.attr("alt").unwrap_or("image");
                style.italic = true;
                acc.push_text(&format!("[{alt}]"), &style);
                return;
            }
            "input" => return,
            _ if is_skipped(name) => return,
            _ => {}
        }
        self.inline_children(el, &style, acc);
    }

    fn code_block(&self, pre: ElementRef<'_>) -> Element {
        let language = find_child(pre, "code").and_then(|code| {
            code.value()
                .classes()
                .find_map(|c| c.strip_prefix("language-"))
                .map(str::to_string)
        });
        let mut lines = CodeLines::default();
        let mut stack = Vec::new();
        self.collect_code(pre, &mut stack, &mut lines);
        Element::CodeBlock {
            language,
            lines: lines.finish(),
        }
    }

    fn collect_code(&self, el: ElementRef<'_>, stack: &mut Vec<Scope>, lines: &mut CodeLines) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => {
                    let style = RunStyle {
                        mono: true,
                        color: Some(self.palette.color_for(stack)),
                        ..RunStyle::default()
                    };
                    lines.push(text, &style);
                }
                Node::Element(value) => {
                    let Some(child_ref) = ElementRef::wrap(child) else {
                        continue;
                    };
                    if value.name() == "br" {
                        lines.newline();
                        continue;
                    }
                    let scope = CodePalette::scope_from_classes(value.classes());
                    if let Some(scope) = scope {
                        stack.push(scope);
                    }
                    self.collect_code(child_ref, stack, lines);
                    if scope.is_some() {
                        stack.pop();
                    }
                }
                _ => {}
            }
        }
    }

    fn list(&self, el: ElementRef<'_>, ordered: bool) -> Element {
        let start = el
            .value()
            .attr("start")
            .and_then(|s| s.trim().parse::<u32>().ok())
            .unwrap_or(1);
        let items = child_elements(el)
            .filter(|c| c.value().name() == "li")
            .map(|li| ListItem {
                checked: task_state(li),
                children: self.blocks(li),
            })
            .collect();
        Element::List {
            ordered,
            start,
            items,
        }
    }

    fn table_rows(&self, table: ElementRef<'_>) -> Vec<TableRow> {
        let mut rows = Vec::new();
        for section in child_elements(table) {
            match section.value().name() {
                "thead" | "tbody" | "tfoot" => {
                    for tr in child_elements(section).filter(|c| c.value().name() == "tr") {
                        rows.push(self.table_row(tr));
                    }
                }
                "tr" => rows.push(self.table_row(section)),
                _ => {}
            }
        }
        rows.retain(|r| !r.cells.is_empty());
        rows
    }

    fn table_row(&self, tr: ElementRef<'_>) -> TableRow {
        let cells: Vec<TableCell> = child_elements(tr)
            .filter(|c| matches!(c.value().name(), "th" | "td"))
            .map(|cell| {
                let header = cell.value().name() == "th";
                let style = RunStyle {
                    bold: header,
                    ..RunStyle::default()
                };
                TableCell {
                    runs: self.inline_runs(cell, &style),
                    alignment: TableAlignment::from_cell(cell.value()),
                    header,
                }
            })
            .collect();
        TableRow::new(cells)
    }
}

/// `Some(checked)` when the list item starts with a checkbox input.
fn task_state(li: ElementRef<'_>) -> Option<bool> {
    li.descendants()
        .filter_map(ElementRef::wrap)
        .take_while(|e| !matches!(e.value().name(), "ul" | "ol"))
        .find(|e| e.value().name() == "input" && e.value().attr("type") == Some("checkbox"))
        .map(|input| input.value().attr("checked").is_some())
}

/// Splits preformatted text into lines of runs, expanding tabs by column.
#[derive(Default)]
struct CodeLines {
    lines: Vec<Vec<TextRun>>,
    current: Vec<TextRun>,
    column: usize,
}

impl CodeLines {
    fn push(&mut self, text: &str, style: &RunStyle) {
        let mut first = true;
        for piece in text.split('\n') {
            if !first {
                self.newline();
            }
            first = false;
            let piece = piece.trim_end_matches('\r');
            if piece.is_empty() {
                continue;
            }
            let expanded = if piece.contains('\t') {
                let padded = format!("{}{}", " ".repeat(self.column), piece);
                expand_tabs(&padded)[self.column..].to_string()
            } else {
                piece.to_string()
            };
            self.column += expanded.chars().count();
            match self.current.last_mut() {
                Some(last) if last.style == *style => last.text.push_str(&expanded),
                _ => self.current.push(TextRun {
                    text: expanded,
                    style: style.clone(),
                }),
            }
        }
    }

    fn newline(&mut self) {
        self.lines.push(std::mem::take(&mut self.current));
        self.column = 0;
    }

    fn finish(mut self) -> Vec<Vec<TextRun>> {
        if !self.current.is_empty() {
            self.newline();
        }
        while self.lines.last().is_some_and(|l| l.is_empty()) {
            self.lines.pop();
        }
        self.lines
    }
}
