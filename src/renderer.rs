//! Layout engine: element tree -> page content streams.
//!
//! Elements are laid out top to bottom into [`Slice`]s, unbreakable
//! horizontal strips whose drawing operations use offsets from the slice's
//! own top edge. Pagination then stacks slices onto pages without ever
//! splitting one. Code blocks and block quotes attach [`Band`]s to every
//! slice they contain, so their background and left border are redrawn on
//! each page they continue on.

use crate::elements::{Document, Element, ListItem, RunStyle, TextRun};
use crate::fonts::Font;
use crate::pdf_generator::{ContentStreamBuilder, LinkArea, PageLayout, PageStream};
use crate::table_renderer::{DefaultTableRenderer, TableRenderer, TableRow, TableStyle};
use crate::theme::{Rgb, Theme, pt};
use tracing::{debug, warn};

/// Fraction of the font size between the top of the em box and the baseline.
const ASCENT: f32 = 0.8;
/// Narrowest frame nested lists and quotes may shrink to.
const MIN_FRAME_WIDTH: f32 = 24.0;
const RULE_MARGIN_PX: f32 = 8.0;
const FOOTER_SIZE: f32 = 9.0;

// --- Drawing primitives ---

/// One drawing operation. `x` is measured from the left content edge and
/// every `y` from the top of the enclosing slice, growing downwards.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Text {
        x: f32,
        baseline: f32,
        font: Font,
        size: f32,
        color: Rgb,
        text: String,
    },
    Rect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Rgb,
    },
    Border {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        line_width: f32,
        color: Rgb,
    },
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        width: f32,
        color: Rgb,
    },
    Link {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        uri: String,
    },
}

impl DrawOp {
    pub fn translate(&mut self, dx: f32, dy: f32) {
        match self {
            DrawOp::Text { x, baseline, .. } => {
                *x += dx;
                *baseline += dy;
            }
            DrawOp::Rect { x, y, .. } | DrawOp::Border { x, y, .. } | DrawOp::Link { x, y, .. } => {
                *x += dx;
                *y += dy;
            }
            DrawOp::Line { x1, y1, x2, y2, .. } => {
                *x1 += dx;
                *x2 += dx;
                *y1 += dy;
                *y2 += dy;
            }
        }
    }
}

/// Background and left border of an enclosing code block or quote.
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    pub x: f32,
    pub width: f32,
    pub fill: Option<Rgb>,
    pub border: Option<(f32, Rgb)>,
}

/// An unbreakable strip of laid-out content.
#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    pub height: f32,
    pub ops: Vec<DrawOp>,
    pub bands: Vec<Band>,
    /// Vertical margin; dropped at the top of a page.
    pub gap: bool,
    /// Must share a page with the next content slice (headings).
    pub keep_with_next: bool,
    /// Baseline of the first text line, if the slice holds text.
    pub baseline: Option<f32>,
}

impl Slice {
    pub fn gap(height: f32) -> Self {
        Slice {
            gap: true,
            ..Slice::spacer(height)
        }
    }

    /// Empty, non-collapsible space such as padding.
    pub fn spacer(height: f32) -> Self {
        Slice {
            height,
            ops: Vec::new(),
            bands: Vec::new(),
            gap: false,
            keep_with_next: false,
            baseline: None,
        }
    }

    pub fn from_line(line: Line, x: f32) -> Self {
        let mut ops = line.ops;
        for op in &mut ops {
            op.translate(x, 0.0);
        }
        Slice {
            height: line.height,
            ops,
            bands: Vec::new(),
            gap: false,
            keep_with_next: false,
            baseline: Some(line.baseline),
        }
    }
}

// --- Inline layout ---

/// Base text settings of a block; runs refine them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub size: f32,
    pub color: Rgb,
    pub bold: bool,
}

/// One laid-out line of text, ops relative to the line's top-left corner.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub width: f32,
    pub height: f32,
    pub baseline: f32,
    pub ops: Vec<DrawOp>,
}

#[derive(Debug, Clone, PartialEq)]
struct FragmentStyle {
    font: Font,
    size: f32,
    color: Rgb,
    code_background: bool,
    strike: bool,
    link: Option<String>,
}

#[derive(Debug)]
struct Fragment {
    x: f32,
    width: f32,
    text: String,
    style: FragmentStyle,
}

enum Piece<'a> {
    Word(&'a str),
    Space,
    Break,
}

fn pieces(text: &str) -> Vec<Piece<'_>> {
    let mut out = Vec::new();
    let mut start = None;
    for (i, ch) in text.char_indices() {
        if ch == ' ' || ch == '\n' {
            if let Some(s) = start.take() {
                out.push(Piece::Word(&text[s..i]));
            }
            out.push(if ch == ' ' { Piece::Space } else { Piece::Break });
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        out.push(Piece::Word(&text[s..]));
    }
    out
}

struct LineFiller {
    max_width: f32,
    x: f32,
    current: Vec<Fragment>,
    lines: Vec<Vec<Fragment>>,
}

impl LineFiller {
    fn new(max_width: f32) -> Self {
        LineFiller {
            max_width,
            x: 0.0,
            current: Vec::new(),
            lines: Vec::new(),
        }
    }

    fn fits(&self, width: f32) -> bool {
        self.x + width <= self.max_width + 0.01
    }

    fn at_line_start(&self) -> bool {
        self.current.is_empty()
    }

    fn push(&mut self, text: &str, style: &FragmentStyle) {
        let width = style.font.text_width(text, style.size);
        match self.current.last_mut() {
            Some(last) if last.style == *style => {
                last.text.push_str(text);
                last.width += width;
            }
            _ => self.current.push(Fragment {
                x: self.x,
                width,
                text: text.to_string(),
                style: style.clone(),
            }),
        }
        self.x += width;
    }

    /// Push a word, splitting it by characters if it is wider than a line.
    fn push_word(&mut self, word: &str, style: &FragmentStyle) {
        let width = style.font.text_width(word, style.size);
        if !self.fits(width) && !self.at_line_start() {
            self.newline();
        }
        if self.fits(width) {
            self.push(word, style);
            return;
        }
        let mut buf = [0u8; 4];
        for ch in word.chars() {
            let s = ch.encode_utf8(&mut buf);
            if !self.fits(style.font.text_width(s, style.size)) && !self.at_line_start() {
                self.newline();
            }
            self.push(s, style);
        }
    }

    fn newline(&mut self) {
        while let Some(last) = self.current.last_mut() {
            let trimmed = last.text.trim_end_matches(' ').len();
            if trimmed == last.text.len() {
                break;
            }
            last.text.truncate(trimmed);
            if last.text.is_empty() {
                self.current.pop();
            } else {
                last.width = last.style.font.text_width(&last.text, last.style.size);
                break;
            }
        }
        self.lines.push(std::mem::take(&mut self.current));
        self.x = 0.0;
    }

    fn finish(mut self) -> Vec<Vec<Fragment>> {
        if !self.current.is_empty() || self.lines.is_empty() {
            self.newline();
        }
        self.lines
    }
}

/// Measures and breaks runs of text into lines.
pub struct InlineLayout<'t> {
    theme: &'t Theme,
}

impl<'t> InlineLayout<'t> {
    pub fn new(theme: &'t Theme) -> Self {
        Self { theme }
    }

    fn fragment_style(&self, run: &RunStyle, base: &TextStyle) -> FragmentStyle {
        let size = if run.code_background {
            base.size * self.theme.code_font_scale
        } else {
            base.size
        };
        let color = run.color.unwrap_or(if run.link.is_some() {
            self.theme.link_color
        } else {
            base.color
        });
        FragmentStyle {
            font: Font::select(base.bold || run.bold, run.italic, run.mono),
            size,
            color,
            code_background: run.code_background,
            strike: run.strike,
            link: run.link.clone(),
        }
    }

    /// Word-wrap runs into lines no wider than `max_width`.
    pub fn wrap(&self, runs: &[TextRun], base: &TextStyle, max_width: f32) -> Vec<Line> {
        let mut filler = LineFiller::new(max_width);
        for run in runs {
            let style = self.fragment_style(&run.style, base);
            for piece in pieces(&run.text) {
                match piece {
                    Piece::Word(word) => filler.push_word(word, &style),
                    Piece::Space => {
                        if !filler.at_line_start() {
                            filler.push(" ", &style);
                        }
                    }
                    Piece::Break => filler.newline(),
                }
            }
        }
        filler
            .finish()
            .into_iter()
            .map(|fragments| self.finish_line(fragments, base))
            .collect()
    }

    /// Lay out preformatted text, keeping every space and breaking long
    /// lines at the character that crosses `max_width`.
    pub fn wrap_preformatted(&self, runs: &[TextRun], base: &TextStyle, max_width: f32) -> Vec<Line> {
        let mut filler = LineFiller::new(max_width);
        let mut buf = [0u8; 4];
        for run in runs {
            let style = self.fragment_style(&run.style, base);
            for ch in run.text.chars() {
                let s = ch.encode_utf8(&mut buf);
                if !filler.fits(style.font.text_width(s, style.size)) && !filler.at_line_start() {
                    filler.newline();
                }
                filler.push(s, &style);
            }
        }
        filler
            .finish()
            .into_iter()
            .map(|fragments| self.finish_line(fragments, base))
            .collect()
    }

    /// Narrowest possible width (widest word) and natural unwrapped width.
    pub fn extent(&self, runs: &[TextRun], base: &TextStyle) -> (f32, f32) {
        let (mut min, mut max, mut line) = (0.0f32, 0.0f32, 0.0f32);
        for run in runs {
            let style = self.fragment_style(&run.style, base);
            for piece in pieces(&run.text) {
                match piece {
                    Piece::Word(word) => {
                        let w = style.font.text_width(word, style.size);
                        min = min.max(w);
                        line += w;
                    }
                    Piece::Space => line += style.font.text_width(" ", style.size),
                    Piece::Break => {
                        max = max.max(line);
                        line = 0.0;
                    }
                }
            }
        }
        (min, max.max(line))
    }

    fn finish_line(&self, fragments: Vec<Fragment>, base: &TextStyle) -> Line {
        let size = fragments.iter().map(|f| f.style.size).fold(base.size, f32::max);
        let height = size * self.theme.line_height;
        let baseline = (height - size) / 2.0 + size * ASCENT;
        let width = fragments.last().map(|f| f.x + f.width).unwrap_or(0.0);

        let (pad_v, pad_h) = self.theme.inline_code_padding_px;
        let mut backgrounds = Vec::new();
        let mut text = Vec::new();
        let mut decorations = Vec::new();
        for f in fragments {
            let s = f.style.size;
            if f.style.code_background {
                backgrounds.push(DrawOp::Rect {
                    x: f.x - pt(pad_h) / 2.0,
                    y: baseline - s * ASCENT - pt(pad_v),
                    width: f.width + pt(pad_h),
                    height: s + 2.0 * pt(pad_v),
                    color: self.theme.code_background,
                });
            }
            if f.style.strike {
                decorations.push(DrawOp::Line {
                    x1: f.x,
                    y1: baseline - s * 0.3,
                    x2: f.x + f.width,
                    y2: baseline - s * 0.3,
                    width: s * 0.06,
                    color: f.style.color,
                });
            }
            if let Some(uri) = &f.style.link {
                decorations.push(DrawOp::Line {
                    x1: f.x,
                    y1: baseline + s * 0.12,
                    x2: f.x + f.width,
                    y2: baseline + s * 0.12,
                    width: s * 0.06,
                    color: f.style.color,
                });
                decorations.push(DrawOp::Link {
                    x: f.x,
                    y: baseline - s * ASCENT,
                    width: f.width,
                    height: s,
                    uri: uri.clone(),
                });
            }
            text.push(DrawOp::Text {
                x: f.x,
                baseline,
                font: f.style.font,
                size: s,
                color: f.style.color,
                text: f.text,
            });
        }
        backgrounds.extend(text);
        backgrounds.extend(decorations);
        Line {
            width,
            height,
            baseline,
            ops: backgrounds,
        }
    }
}

// --- Block layout ---

struct Frame {
    x: f32,
    width: f32,
    bands: Vec<Band>,
}

#[derive(Debug, Clone, Copy)]
enum MarkerKind {
    Bullet(usize),
    Number(u32),
    Task(bool),
}

#[derive(Debug, Clone, Copy)]
struct Marker {
    kind: MarkerKind,
    content_x: f32,
}

struct BlockLayout<'t> {
    theme: &'t Theme,
    text: InlineLayout<'t>,
    root: Frame,
    frames: Vec<Frame>,
    slices: Vec<Slice>,
    /// Collapsed vertical margin waiting for the next content slice.
    pending: f32,
    markers: Vec<Marker>,
    list_depth: usize,
    /// Tallest slice a page can hold; taller table rows are split.
    max_slice_height: f32,
}

impl<'t> BlockLayout<'t> {
    fn new(theme: &'t Theme, width: f32) -> Self {
        BlockLayout {
            theme,
            text: InlineLayout::new(theme),
            root: Frame {
                x: 0.0,
                width,
                bands: Vec::new(),
            },
            frames: Vec::new(),
            slices: Vec::new(),
            pending: 0.0,
            markers: Vec::new(),
            list_depth: 0,
            max_slice_height: f32::INFINITY,
        }
    }

    fn frame(&self) -> &Frame {
        self.frames.last().unwrap_or(&self.root)
    }

    fn margin(&mut self, px: f32) {
        self.pending = self.pending.max(pt(px));
    }

    fn flush(&mut self) {
        if self.pending > 0.0 {
            let slice = Slice {
                bands: self.frame().bands.clone(),
                ..Slice::gap(self.pending)
            };
            self.slices.push(slice);
            self.pending = 0.0;
        }
    }

    fn emit(&mut self, mut slice: Slice) {
        self.flush();
        slice.bands = self.frame().bands.clone();
        for marker in std::mem::take(&mut self.markers) {
            self.draw_marker(marker, &mut slice);
        }
        self.slices.push(slice);
    }

    fn push_frame(&mut self, inset_left: f32, inset_right: f32, band: Option<Band>) {
        let parent = self.frame();
        let mut bands = parent.bands.clone();
        bands.extend(band);
        let frame = Frame {
            x: parent.x + inset_left,
            width: (parent.width - inset_left - inset_right).max(MIN_FRAME_WIDTH),
            bands,
        };
        self.frames.push(frame);
    }

    fn body_style(&self) -> TextStyle {
        TextStyle {
            size: self.theme.body_size_pt(),
            color: self.theme.text_color,
            bold: false,
        }
    }

    fn blocks(&mut self, elements: &[Element]) {
        for element in elements {
            self.block(element);
        }
    }

    fn block(&mut self, element: &Element) {
        match element {
            Element::Heading { level, runs } => self.heading(*level, runs),
            Element::Paragraph { runs } => {
                let style = self.body_style();
                self.margin(self.theme.paragraph_margin_px);
                self.text_lines(runs, &style, false);
                self.margin(self.theme.paragraph_margin_px);
            }
            Element::Text { runs } => {
                let style = self.body_style();
                self.text_lines(runs, &style, false);
            }
            Element::CodeBlock { lines, .. } => self.code_block(lines),
            Element::List {
                ordered,
                start,
                items,
            } => self.list(*ordered, *start, items),
            Element::BlockQuote { children } => self.quote(children),
            Element::Table { rows } => self.table(rows),
            Element::HorizontalRule => self.rule(),
        }
    }

    fn text_lines(&mut self, runs: &[TextRun], style: &TextStyle, keep_with_next: bool) {
        let (x, width) = (self.frame().x, self.frame().width);
        for line in self.text.wrap(runs, style, width) {
            let mut slice = Slice::from_line(line, x);
            slice.keep_with_next = keep_with_next;
            self.emit(slice);
        }
    }

    fn heading(&mut self, level: u8, runs: &[TextRun]) {
        let t = self.theme;
        self.margin(t.heading_margin_top_px);
        let style = TextStyle {
            size: t.heading_size_pt(level),
            color: t.heading_color,
            bold: true,
        };
        self.text_lines(runs, &style, true);

        let rule = match level {
            1 => Some(t.h1_rule),
            2 => Some(t.h2_rule),
            _ => None,
        };
        if let Some(rule) = rule {
            let (x, width) = (self.frame().x, self.frame().width);
            let w = pt(rule.width_px);
            let padding = pt(rule.padding_px);
            let mut slice = Slice::spacer(padding + w);
            slice.ops.push(DrawOp::Line {
                x1: x,
                y1: padding + w / 2.0,
                x2: x + width,
                y2: padding + w / 2.0,
                width: w,
                color: rule.color,
            });
            slice.keep_with_next = true;
            self.emit(slice);
        }
        self.margin(t.heading_margin_bottom_px);
    }

    fn code_block(&mut self, lines: &[Vec<TextRun>]) {
        let t = self.theme;
        self.margin(t.pre_margin_px);
        self.flush();

        let border = pt(t.pre_border_px);
        let padding = pt(t.pre_padding_px);
        let band = Band {
            x: self.frame().x,
            width: self.frame().width,
            fill: Some(t.code_background),
            border: Some((border, t.accent)),
        };
        self.push_frame(border + padding, padding, Some(band));
        self.emit(Slice::spacer(padding));

        let style = TextStyle {
            size: t.code_size_pt(),
            color: t.text_color,
            bold: false,
        };
        let (x, width) = (self.frame().x, self.frame().width);
        let empty = [Vec::new()];
        let lines = if lines.is_empty() { &empty[..] } else { lines };
        for runs in lines {
            for line in self.text.wrap_preformatted(runs, &style, width) {
                self.emit(Slice::from_line(line, x));
            }
        }

        self.emit(Slice::spacer(padding));
        self.frames.pop();
        self.margin(t.pre_margin_px);
    }

    fn quote(&mut self, children: &[Element]) {
        let t = self.theme;
        self.margin(t.quote_margin_px);
        self.flush();

        let border = pt(t.quote_border_px);
        let (pad_v, pad_h) = (pt(t.quote_padding_px.0), pt(t.quote_padding_px.1));
        let band = Band {
            x: self.frame().x,
            width: self.frame().width,
            fill: Some(t.code_background),
            border: Some((border, t.accent)),
        };
        self.push_frame(border + pad_h, pad_h, Some(band));
        self.emit(Slice::spacer(pad_v));
        self.blocks(children);
        self.flush();
        self.emit(Slice::spacer(pad_v));
        self.frames.pop();
        self.margin(t.quote_margin_px);
    }

    fn list(&mut self, ordered: bool, start: u32, items: &[ListItem]) {
        let t = self.theme;
        self.margin(t.list_margin_px);
        let depth = self.list_depth;
        self.push_frame(pt(t.list_indent_px), 0.0, None);
        self.list_depth += 1;
        let content_x = self.frame().x;

        for (i, item) in items.iter().enumerate() {
            self.margin(t.item_margin_px);
            let kind = match item.checked {
                Some(checked) => MarkerKind::Task(checked),
                None if ordered => MarkerKind::Number(start.saturating_add(i as u32)),
                None => MarkerKind::Bullet(depth),
            };
            self.markers.push(Marker { kind, content_x });
            self.blocks(&item.children);
            if !self.markers.is_empty() {
                let style = self.body_style();
                let x = self.frame().x;
                for line in self.text.wrap(&[], &style, self.frame().width) {
                    self.emit(Slice::from_line(line, x));
                }
            }
            self.margin(t.item_margin_px);
        }

        self.list_depth -= 1;
        self.frames.pop();
        self.margin(t.list_margin_px);
    }

    fn draw_marker(&self, marker: Marker, slice: &mut Slice) {
        let size = self.theme.body_size_pt();
        let color = self.theme.text_color;
        let baseline = slice.baseline.unwrap_or_else(|| {
            let height = size * self.theme.line_height;
            (height - size) / 2.0 + size * ASCENT
        });
        let gap = size * 0.5;

        let label = match marker.kind {
            MarkerKind::Bullet(depth) if depth % 2 == 0 => "\u{2022}".to_string(),
            MarkerKind::Bullet(_) => "\u{2013}".to_string(),
            MarkerKind::Number(n) => format!("{n}."),
            MarkerKind::Task(checked) => {
                let side = size * 0.75;
                let x = marker.content_x - gap - side;
                let y = baseline - side;
                slice.ops.push(DrawOp::Border {
                    x,
                    y,
                    width: side,
                    height: side,
                    line_width: 0.75,
                    color,
                });
                if checked {
                    let (mx, my) = (x + side * 0.42, y + side * 0.78);
                    slice.ops.push(DrawOp::Line {
                        x1: x + side * 0.2,
                        y1: y + side * 0.5,
                        x2: mx,
                        y2: my,
                        width: 1.0,
                        color,
                    });
                    slice.ops.push(DrawOp::Line {
                        x1: mx,
                        y1: my,
                        x2: x + side * 0.82,
                        y2: y + side * 0.22,
                        width: 1.0,
                        color,
                    });
                }
                return;
            }
        };
        let width = Font::Regular.text_width(&label, size);
        slice.ops.push(DrawOp::Text {
            x: marker.content_x - gap - width,
            baseline,
            font: Font::Regular,
            size,
            color,
            text: label,
        });
    }

    fn table(&mut self, rows: &[TableRow]) {
        let t = self.theme;
        self.margin(t.table_margin_px);
        if !rows.is_empty() {
            let style = TableStyle::from_theme(t);
            let renderer = DefaultTableRenderer;
            let (x, width) = (self.frame().x, self.frame().width);
            let widths = renderer.column_widths(rows, &style, &self.text, width);
            for row in rows {
                let parts =
                    renderer.row_slices(row, &widths, x, &style, &self.text, self.max_slice_height);
                for slice in parts {
                    self.emit(slice);
                }
            }
        }
        self.margin(t.table_margin_px);
    }

    fn rule(&mut self) {
        self.margin(RULE_MARGIN_PX);
        let (x, width) = (self.frame().x, self.frame().width);
        let mut slice = Slice::spacer(1.0);
        slice.ops.push(DrawOp::Line {
            x1: x,
            y1: 0.5,
            x2: x + width,
            y2: 0.5,
            width: 0.75,
            color: self.theme.rule_color,
        });
        self.emit(slice);
        self.margin(RULE_MARGIN_PX);
    }
}

// --- Pagination ---

#[derive(Debug, Clone, Copy)]
pub struct PlacedSlice<'a> {
    pub top: f32,
    pub slice: &'a Slice,
}

/// Stack slices onto pages of `available` height.
///
/// Gaps at the top of a page are dropped, a heading chain moves to the next
/// page together with the content that follows it, and a slice taller than
/// a page is placed on its own page and clipped. Always returns at least
/// one page.
pub fn paginate(slices: &[Slice], available: f32) -> Vec<Vec<PlacedSlice<'_>>> {
    let mut pages: Vec<Vec<PlacedSlice<'_>>> = vec![Vec::new()];
    let mut y = 0.0f32;
    let fits = |y: f32, h: f32| y + h <= available + 0.01;

    for (i, slice) in slices.iter().enumerate() {
        if slice.gap {
            if y == 0.0 {
                continue;
            }
            if !fits(y, slice.height) {
                pages.push(Vec::new());
                y = 0.0;
                continue;
            }
        } else {
            let needed = if slice.keep_with_next {
                kept_height(&slices[i..])
            } else {
                slice.height
            };
            if slice.height > available + 0.01 {
                warn!(height = slice.height, available, "content taller than a page is clipped");
            }
            let needed = if needed > available { slice.height } else { needed };
            if y > 0.0 && !fits(y, needed) {
                pages.push(Vec::new());
                y = 0.0;
            }
        }
        if let Some(page) = pages.last_mut() {
            page.push(PlacedSlice { top: y, slice });
        }
        y += slice.height;
    }
    pages
}

/// Height of a keep-with-next chain plus the gaps and first content slice
/// after it.
fn kept_height(slices: &[Slice]) -> f32 {
    let mut height = 0.0;
    for slice in slices {
        height += slice.height;
        if !slice.gap && !slice.keep_with_next {
            break;
        }
    }
    height
}

struct BandRun<'a> {
    band: &'a Band,
    depth: usize,
    top: f32,
    bottom: f32,
}

/// Merge the bands of vertically adjacent slices into continuous runs,
/// outermost first.
fn band_runs<'a>(placed: &[PlacedSlice<'a>]) -> Vec<BandRun<'a>> {
    let mut done: Vec<BandRun<'a>> = Vec::new();
    let mut open: Vec<BandRun<'a>> = Vec::new();
    for p in placed {
        let slice: &'a Slice = p.slice;
        let top = p.top;
        let bottom = p.top + slice.height;
        let bands = &slice.bands;
        let mut keep = 0;
        while keep < open.len()
            && keep < bands.len()
            && open[keep].band == &bands[keep]
            && (open[keep].bottom - top).abs() < 0.01
        {
            keep += 1;
        }
        done.extend(open.drain(keep..));
        for run in open.iter_mut() {
            run.bottom = bottom;
        }
        for (depth, band) in bands.iter().enumerate().skip(keep) {
            open.push(BandRun {
                band,
                depth,
                top,
                bottom,
            });
        }
    }
    done.extend(open);
    done.sort_by_key(|r| r.depth);
    done
}

// --- Page rendering ---

pub struct PdfRenderer<'t> {
    theme: &'t Theme,
    layout: PageLayout,
    page_numbers: bool,
}

impl<'t> PdfRenderer<'t> {
    pub fn new(theme: &'t Theme, layout: PageLayout) -> Self {
        Self {
            theme,
            layout,
            page_numbers: false,
        }
    }

    pub fn with_page_numbers(mut self, enabled: bool) -> Self {
        self.page_numbers = enabled;
        self
    }

    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    /// Lay out elements into slices for the page content width.
    pub fn layout_elements(&self, elements: &[Element]) -> Vec<Slice> {
        let mut blocks = BlockLayout::new(self.theme, self.layout.content_width());
        blocks.max_slice_height = self.layout.content_height();
        blocks.blocks(elements);
        blocks.slices
    }

    pub fn render(&self, document: &Document) -> Vec<PageStream> {
        let slices = self.layout_elements(&document.elements);
        let pages = paginate(&slices, self.layout.content_height());
        debug!(slices = slices.len(), pages = pages.len(), "paginated document");
        let total = pages.len();
        pages
            .iter()
            .enumerate()
            .map(|(i, placed)| self.draw_page(placed, i + 1, total))
            .collect()
    }

    fn draw_page(&self, placed: &[PlacedSlice<'_>], number: usize, total: usize) -> PageStream {
        let mut content = ContentStreamBuilder::new();
        let mut links = Vec::new();
        let left = self.layout.margin_left;
        let top = self.layout.content_top();

        for run in band_runs(placed) {
            let y = top - run.bottom;
            let height = run.bottom - run.top;
            if let Some(fill) = run.band.fill {
                content.fill_rect(left + run.band.x, y, run.band.width, height, fill);
            }
            if let Some((width, color)) = run.band.border {
                content.fill_rect(left + run.band.x, y, width, height, color);
            }
        }

        for p in placed {
            let origin = top - p.top;
            for op in &p.slice.ops {
                match op {
                    DrawOp::Text {
                        x,
                        baseline,
                        font,
                        size,
                        color,
                        text,
                    } => content.text(left + x, origin - baseline, *font, *size, *color, text),
                    DrawOp::Rect {
                        x,
                        y,
                        width,
                        height,
                        color,
                    } => content.fill_rect(left + x, origin - y - height, *width, *height, *color),
                    DrawOp::Border {
                        x,
                        y,
                        width,
                        height,
                        line_width,
                        color,
                    } => content.stroke_rect(
                        left + x,
                        origin - y - height,
                        *width,
                        *height,
                        *line_width,
                        *color,
                    ),
                    DrawOp::Line {
                        x1,
                        y1,
                        x2,
                        y2,
                        width,
                        color,
                    } => content.line(left + x1, origin - y1, left + x2, origin - y2, *width, *color),
                    DrawOp::Link {
                        x,
                        y,
                        width,
                        height,
                        uri,
                    } => links.push(LinkArea {
                        x: left + x,
                        y: origin - y - height,
                        width: *width,
                        height: *height,
                        uri: uri.clone(),
                    }),
                }
            }
        }

        if self.page_numbers {
            let label = format!("Page {} of {}", number, total);
            let width = Font::Regular.text_width(&label, FOOTER_SIZE);
            content.text(
                (self.layout.width - width) / 2.0,
                self.layout.margin_bottom / 2.0,
                Font::Regular,
                FOOTER_SIZE,
                self.theme.muted_color,
                &label,
            );
        }

        PageStream { content, links }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf_generator::{PageOrientation, PageSize};

    fn body(theme: &Theme) -> TextStyle {
        TextStyle {
            size: theme.body_size_pt(),
            color: theme.text_color,
            bold: false,
        }
    }

    fn texts(slice: &Slice) -> Vec<&str> {
        slice
            .ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn renderer(theme: &Theme) -> PdfRenderer<'_> {
        PdfRenderer::new(theme, PageLayout::new(PageSize::A4, PageOrientation::Portrait, 86.25))
    }

    #[test]
    fn test_wrap_breaks_between_words() {
        let theme = Theme::default();
        let text = InlineLayout::new(&theme);
        let runs = vec![TextRun::plain("alpha beta gamma delta epsilon")];
        let lines = text.wrap(&runs, &body(&theme), 80.0);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(line.width <= 80.01);
            assert_eq!(line.height, 12.0 * 1.6);
        }
    }

    #[test]
    fn test_wrap_splits_overlong_word() {
        let theme = Theme::default();
        let text = InlineLayout::new(&theme);
        let runs = vec![TextRun::plain(&"x".repeat(200))];
        let lines = text.wrap(&runs, &body(&theme), 100.0);
        assert!(lines.len() > 5);
        assert!(lines.iter().all(|l| l.width <= 100.01));
    }

    #[test]
    fn test_hard_break_starts_new_line() {
        let theme = Theme::default();
        let text = InlineLayout::new(&theme);
        let lines = text.wrap(&[TextRun::plain("a\nb")], &body(&theme), 400.0);
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_inline_code_gets_background_and_mono_font() {
        let theme = Theme::default();
        let text = InlineLayout::new(&theme);
        let runs = vec![
            TextRun::plain("run "),
            TextRun {
                text: "cargo".into(),
                style: RunStyle {
                    mono: true,
                    code_background: true,
                    ..RunStyle::default()
                },
            },
        ];
        let line = &text.wrap(&runs, &body(&theme), 400.0)[0];
        assert!(matches!(line.ops[0], DrawOp::Rect { .. }));
        assert!(line.ops.iter().any(|op| matches!(op, DrawOp::Text { font: Font::Mono, text, .. } if text == "cargo")));
    }

    #[test]
    fn test_link_produces_annotation_op() {
        let theme = Theme::default();
        let text = InlineLayout::new(&theme);
        let runs = vec![TextRun {
            text: "docs".into(),
            style: RunStyle {
                link: Some("https://example.com".into()),
                ..RunStyle::default()
            },
        }];
        let line = &text.wrap(&runs, &body(&theme), 400.0)[0];
        assert!(line.ops.iter().any(|op| matches!(op, DrawOp::Link { uri, .. } if uri == "https://example.com")));
        assert!(line.ops.iter().any(|op| matches!(op, DrawOp::Text { color, .. } if *color == theme.link_color)));
    }

    #[test]
    fn test_preformatted_keeps_spaces_and_wraps() {
        let theme = Theme::default();
        let text = InlineLayout::new(&theme);
        let style = TextStyle {
            size: 10.0,
            color: theme.text_color,
            bold: false,
        };
        let lines = text.wrap_preformatted(&[TextRun::plain("    indented")], &style, 400.0);
        assert_eq!(lines.len(), 1);
        assert!(matches!(&lines[0].ops[0], DrawOp::Text { text, .. } if text == "    indented"));
        // 6pt per Courier glyph at 10pt, 10 glyphs per line
        let long = text.wrap_preformatted(&[TextRun::plain(&"a".repeat(25))], &style, 60.0);
        assert_eq!(long.len(), 3);
    }

    #[test]
    fn test_heading_is_bold_and_kept_with_next() {
        let theme = Theme::default();
        let slices = renderer(&theme).layout_elements(&[
            Element::Heading {
                level: 1,
                runs: vec![TextRun::plain("Title")],
            },
            Element::Paragraph {
                runs: vec![TextRun::plain("Body")],
            },
        ]);
        let heading = slices.iter().find(|s| texts(s) == ["Title"]).unwrap();
        assert!(heading.keep_with_next);
        assert!(heading.ops.iter().any(|op| matches!(op, DrawOp::Text { font: Font::Bold, size, .. } if *size == 21.0)));
        // h1 bottom rule
        assert!(slices.iter().any(|s| s.keep_with_next && s.ops.iter().any(|op| matches!(op, DrawOp::Line { .. }))));
        let body = slices.iter().find(|s| texts(s) == ["Body"]).unwrap();
        assert!(!body.keep_with_next);
    }

    #[test]
    fn test_margins_collapse_between_siblings() {
        let theme = Theme::default();
        let slices = renderer(&theme).layout_elements(&[
            Element::Paragraph {
                runs: vec![TextRun::plain("one")],
            },
            Element::Heading {
                level: 3,
                runs: vec![TextRun::plain("two")],
            },
        ]);
        let gaps: Vec<f32> = slices.iter().filter(|s| s.gap).map(|s| s.height).collect();
        // leading paragraph margin, then max(16px, 30px) between the blocks
        assert_eq!(gaps, vec![pt(16.0), pt(30.0)]);
    }

    #[test]
    fn test_code_block_slices_carry_band() {
        let theme = Theme::default();
        let slices = renderer(&theme).layout_elements(&[Element::CodeBlock {
            language: None,
            lines: vec![vec![TextRun::plain("a")], vec![], vec![TextRun::plain("b")]],
        }]);
        let content: Vec<&Slice> = slices.iter().filter(|s| !s.gap).collect();
        // padding, three lines, padding
        assert_eq!(content.len(), 5);
        for slice in &content {
            assert_eq!(slice.bands.len(), 1);
            assert_eq!(slice.bands[0].fill, Some(theme.code_background));
        }
    }

    #[test]
    fn test_list_markers() {
        let theme = Theme::default();
        let item = |text: &str, checked| ListItem {
            checked,
            children: vec![Element::Text {
                runs: vec![TextRun::plain(text)],
            }],
        };
        let slices = renderer(&theme).layout_elements(&[
            Element::List {
                ordered: true,
                start: 3,
                items: vec![item("a", None), item("b", None)],
            },
            Element::List {
                ordered: false,
                start: 1,
                items: vec![item("c", None), item("d", Some(true))],
            },
        ]);
        let all: Vec<&str> = slices.iter().flat_map(texts).collect();
        assert_eq!(all, vec!["a", "3.", "b", "4.", "c", "\u{2022}", "d"]);
        assert!(slices.iter().any(|s| s.ops.iter().any(|op| matches!(op, DrawOp::Border { .. }))));
    }

    #[test]
    fn test_empty_list_item_still_gets_marker() {
        let theme = Theme::default();
        let slices = renderer(&theme).layout_elements(&[Element::List {
            ordered: false,
            start: 1,
            items: vec![ListItem {
                checked: None,
                children: vec![],
            }],
        }]);
        assert!(slices.iter().any(|s| texts(s) == ["\u{2022}"]));
    }

    fn content(height: f32) -> Slice {
        Slice::spacer(height)
    }

    #[test]
    fn test_paginate_drops_leading_gaps() {
        let slices = vec![Slice::gap(10.0), content(50.0), Slice::gap(10.0), content(50.0)];
        let pages = paginate(&slices, 100.0);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].len(), 2);
        assert_eq!(pages[0][0].top, 0.0);
        assert_eq!(pages[1].len(), 1);
        assert_eq!(pages[1][0].top, 0.0);
    }

    #[test]
    fn test_paginate_keeps_heading_with_next() {
        let mut heading = content(20.0);
        heading.keep_with_next = true;
        let slices = vec![content(60.0), heading, Slice::gap(5.0), content(20.0)];
        let pages = paginate(&slices, 100.0);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].len(), 1);
        assert!(pages[1][0].slice.keep_with_next);
    }

    #[test]
    fn test_paginate_places_oversized_slice() {
        let slices = vec![content(10.0), content(250.0), content(10.0)];
        let pages = paginate(&slices, 100.0);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[1][0].slice.height, 250.0);
    }

    #[test]
    fn test_paginate_empty_document_has_one_page() {
        assert_eq!(paginate(&[], 100.0).len(), 1);
    }

    #[test]
    fn test_band_runs_merge_adjacent_slices() {
        let band = Band {
            x: 0.0,
            width: 100.0,
            fill: Some(Rgb::BLACK),
            border: None,
        };
        let slices: Vec<Slice> = (0..3)
            .map(|_| Slice {
                bands: vec![band.clone()],
                ..content(10.0)
            })
            .collect();
        let placed: Vec<PlacedSlice<'_>> = slices
            .iter()
            .enumerate()
            .map(|(i, slice)| PlacedSlice {
                top: i as f32 * 10.0,
                slice,
            })
            .collect();
        let runs = band_runs(&placed);
        assert_eq!(runs.len(), 1);
        assert_eq!((runs[0].top, runs[0].bottom), (0.0, 30.0));
    }

    #[test]
    fn test_render_page_numbers() {
        let theme = Theme::default();
        let doc = Document {
            title: None,
            elements: (0..80)
                .map(|i| Element::Paragraph {
                    runs: vec![TextRun::plain(&format!("paragraph {i}"))],
                })
                .collect(),
        };
        let pages = renderer(&theme).with_page_numbers(true).render(&doc);
        assert!(pages.len() > 1);
        let last = String::from_utf8(pages.into_iter().last().unwrap().content.into_bytes()).unwrap();
        assert!(last.contains("Page "));
        assert!(last.contains(" of "));
    }

    #[test]
    fn test_tall_table_row_is_split_across_pages() {
        let theme = Theme::default();
        let r = renderer(&theme);
        let available = r.layout().content_height();
        let long = "word ".repeat(3000);
        let rows = vec![TableRow::from_strings(&["Name", long.trim_end()])];
        let slices = r.layout_elements(&[Element::Table { rows }]);

        let parts: Vec<&Slice> = slices.iter().filter(|s| !s.gap).collect();
        assert!(parts.len() > 2);
        assert!(parts.iter().all(|s| s.height <= available + 0.01));
        // every part closes its own grid
        for part in &parts {
            let bottom = part.ops.iter().any(|op| {
                matches!(op, DrawOp::Line { y1, y2, .. } if (*y1 - part.height).abs() < 0.01 && (*y2 - part.height).abs() < 0.01)
            });
            assert!(bottom);
        }
        let words: usize = parts
            .iter()
            .flat_map(|s| texts(s))
            .map(|t| t.split_whitespace().count())
            .sum();
        assert_eq!(words, 3001);

        let pages = paginate(&slices, available);
        assert!(pages.len() > 2);
        for page in &pages {
            for placed in page {
                assert!(placed.top + placed.slice.height <= available + 0.01);
            }
        }
    }
}

#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn wrapped_lines_fit_width(text in "[a-zA-Z ]{0,300}", width in 40.0f32..500.0) {
            let theme = Theme::default();
            let layout = InlineLayout::new(&theme);
            let style = TextStyle { size: 12.0, color: theme.text_color, bold: false };
            for line in layout.wrap(&[TextRun::plain(&text)], &style, width) {
                prop_assert!(line.width <= width + 0.01);
            }
        }

        #[test]
        fn pagination_keeps_every_content_slice(heights in proptest::collection::vec(1.0f32..60.0, 0..60)) {
            let slices: Vec<Slice> = heights.iter().map(|&h| Slice::spacer(h)).collect();
            let pages = paginate(&slices, 100.0);
            let placed: usize = pages.iter().map(Vec::len).sum();
            prop_assert_eq!(placed, slices.len());
            for page in &pages {
                let used: f32 = page.iter().map(|p| p.slice.height).sum();
                prop_assert!(used <= 100.01);
            }
        }
    }
}
