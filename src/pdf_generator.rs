use crate::error::{ConvertError, Result};
use crate::fonts::{Font, encode_win_ansi, pdf_literal, unencodable_chars};
use crate::theme::Rgb;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Write;

// --- Page size, orientation and layout ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSize {
    #[default]
    A4,
    Letter,
}

impl PageSize {
    /// Portrait width and height in points.
    pub fn dimensions(self) -> (f32, f32) {
        match self {
            PageSize::A4 => (595.28, 841.89),
            PageSize::Letter => (612.0, 792.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageOrientation {
    #[default]
    Portrait,
    Landscape,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayout {
    pub width: f32,
    pub height: f32,
    pub margin_left: f32,
    pub margin_right: f32,
    pub margin_top: f32,
    pub margin_bottom: f32,
}

impl PageLayout {
    pub fn new(size: PageSize, orientation: PageOrientation, margin: f32) -> Self {
        let (w, h) = size.dimensions();
        let (width, height) = match orientation {
            PageOrientation::Portrait => (w, h),
            PageOrientation::Landscape => (h, w),
        };
        PageLayout {
            width,
            height,
            margin_left: margin,
            margin_right: margin,
            margin_top: margin,
            margin_bottom: margin,
        }
    }

    pub fn content_top(&self) -> f32 {
        self.height - self.margin_top
    }

    pub fn content_width(&self) -> f32 {
        self.width - self.margin_left - self.margin_right
    }

    pub fn content_height(&self) -> f32 {
        self.height - self.margin_top - self.margin_bottom
    }
}

// --- Low-level PDF object model ---

pub struct PdfGenerator {
    objects: Vec<PdfObj>,
    next_id: u32,
}

#[derive(Debug)]
struct PdfObj {
    id: u32,
    content: String,
    stream_data: Option<Vec<u8>>,
}

impl PdfGenerator {
    pub fn new() -> Self {
        PdfGenerator {
            objects: Vec::new(),
            next_id: 1,
        }
    }

    /// Allocate an object id to be filled in later with [`Self::set_object`].
    pub fn reserve(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn set_object(&mut self, id: u32, content: String) {
        self.objects.push(PdfObj {
            id,
            content,
            stream_data: None,
        });
    }

    pub fn add_object(&mut self, content: String) -> u32 {
        let id = self.reserve();
        self.set_object(id, content);
        id
    }

    /// Add a stream object; `dictionary` entries go inside `<< >>` next to
    /// the computed `/Length`.
    pub fn add_stream_object(&mut self, dictionary: &str, data: Vec<u8>) -> u32 {
        let id = self.reserve();
        self.objects.push(PdfObj {
            id,
            content: format!("<< /Length {}{} >>\n", data.len(), dictionary),
            stream_data: Some(data),
        });
        id
    }

    pub fn generate(&self, root: u32, info: Option<u32>) -> Result<Vec<u8>> {
        let mut objects: Vec<&PdfObj> = self.objects.iter().collect();
        objects.sort_by_key(|o| o.id);
        let expected: Vec<u32> = (1..self.next_id).collect();
        let actual: Vec<u32> = objects.iter().map(|o| o.id).collect();
        if expected != actual {
            return Err(ConvertError::Render(format!(
                "object table is not contiguous: reserved {} ids, filled {:?}",
                self.next_id - 1,
                actual
            )));
        }

        let mut pdf = Vec::new();

        // PDF header
        pdf.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");

        let mut offsets = Vec::with_capacity(objects.len());
        for obj in &objects {
            offsets.push(pdf.len());
            pdf.extend_from_slice(format!("{} 0 obj\n", obj.id).as_bytes());
            pdf.extend_from_slice(obj.content.as_bytes());
            if let Some(data) = &obj.stream_data {
                pdf.extend_from_slice(b"stream\n");
                pdf.extend_from_slice(data);
                pdf.extend_from_slice(b"\nendstream\n");
            }
            pdf.extend_from_slice(b"endobj\n");
        }

        // xref table
        let xref_offset = pdf.len();
        pdf.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
        pdf.extend_from_slice(b"0000000000 65535 f \n");
        for offset in offsets {
            pdf.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }

        // trailer
        pdf.extend_from_slice(b"trailer\n<<\n");
        pdf.extend_from_slice(format!("/Size {}\n/Root {} 0 R\n", objects.len() + 1, root).as_bytes());
        if let Some(info) = info {
            pdf.extend_from_slice(format!("/Info {} 0 R\n", info).as_bytes());
        }
        pdf.extend_from_slice(b">>\nstartxref\n");
        pdf.extend_from_slice(format!("{}\n%%EOF\n", xref_offset).as_bytes());

        Ok(pdf)
    }
}

impl Default for PdfGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// --- Content stream builder (colours, shapes, text) ---

/// Writes the drawing operators of one page. Coordinates are PDF user
/// space (origin bottom-left).
pub struct ContentStreamBuilder {
    data: Vec<u8>,
    fill: Option<Rgb>,
    stroke: Option<Rgb>,
    line_width: Option<f32>,
    font: Option<(Font, f32)>,
    fonts_used: BTreeSet<Font>,
    substituted: usize,
}

fn num(v: f32) -> String {
    let rounded = (v * 100.0).round() / 100.0;
    if rounded == rounded.trunc() {
        format!("{}", rounded as i64)
    } else {
        format!("{}", rounded)
    }
}

fn color_components(c: Rgb) -> String {
    format!("{} {} {}", num(c.0), num(c.1), num(c.2))
}

impl ContentStreamBuilder {
    pub fn new() -> Self {
        ContentStreamBuilder {
            data: Vec::new(),
            fill: None,
            stroke: None,
            line_width: None,
            font: None,
            fonts_used: BTreeSet::new(),
            substituted: 0,
        }
    }

    fn op(&mut self, s: &str) {
        self.data.extend_from_slice(s.as_bytes());
        self.data.push(b'\n');
    }

    fn set_fill(&mut self, color: Rgb) {
        if self.fill != Some(color) {
            self.fill = Some(color);
            let s = format!("{} rg", color_components(color));
            self.op(&s);
        }
    }

    fn set_stroke(&mut self, color: Rgb, width: f32) {
        if self.stroke != Some(color) {
            self.stroke = Some(color);
            let s = format!("{} RG", color_components(color));
            self.op(&s);
        }
        if self.line_width != Some(width) {
            self.line_width = Some(width);
            let s = format!("{} w", num(width));
            self.op(&s);
        }
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgb) {
        if width <= 0.0 || height <= 0.0 {
            return;
        }
        self.set_fill(color);
        let s = format!("{} {} {} {} re f", num(x), num(y), num(width), num(height));
        self.op(&s);
    }

    pub fn stroke_rect(&mut self, x: f32, y: f32, width: f32, height: f32, line: f32, color: Rgb) {
        self.set_stroke(color, line);
        let s = format!("{} {} {} {} re S", num(x), num(y), num(width), num(height));
        self.op(&s);
    }

    pub fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, width: f32, color: Rgb) {
        self.set_stroke(color, width);
        let s = format!("{} {} m {} {} l S", num(x1), num(y1), num(x2), num(y2));
        self.op(&s);
    }

    /// Show `text` with its baseline starting at (`x`, `y`).
    pub fn text(&mut self, x: f32, y: f32, font: Font, size: f32, color: Rgb, text: &str) {
        if text.is_empty() {
            return;
        }
        self.fonts_used.insert(font);
        self.substituted += unencodable_chars(text);
        self.set_fill(color);
        self.op("BT");
        if self.font != Some((font, size)) {
            self.font = Some((font, size));
            let s = format!("/{} {} Tf", font.resource_name(), num(size));
            self.op(&s);
        }
        let s = format!(
            "{} {} Td\n{} Tj\nET",
            num(x),
            num(y),
            pdf_literal(&encode_win_ansi(text))
        );
        self.op(&s);
    }

    pub fn fonts_used(&self) -> &BTreeSet<Font> {
        &self.fonts_used
    }

    /// Characters shown so far that the fonts cannot encode.
    pub fn substituted_chars(&self) -> usize {
        self.substituted
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl Default for ContentStreamBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A clickable URI area on a page, in PDF user space.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkArea {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub uri: String,
}

/// One finished page: its drawing operators and link areas.
pub struct PageStream {
    pub content: ContentStreamBuilder,
    pub links: Vec<LinkArea>,
}

/// Document information dictionary entries.
#[derive(Debug, Clone, Default)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub producer: String,
}

/// PDF text string: UTF-16BE with a byte order mark, hex encoded.
fn pdf_text_string(text: &str) -> String {
    let mut out = String::from("<FEFF");
    for unit in text.encode_utf16() {
        out.push_str(&format!("{:04X}", unit));
    }
    out.push('>');
    out
}

fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| ConvertError::Render(format!("content stream compression failed: {e}")))
}

/// Assemble the final PDF bytes from finished pages.
pub fn assemble_pdf(
    pages: Vec<PageStream>,
    layout: &PageLayout,
    info: &DocumentInfo,
    compress_streams: bool,
) -> Result<Vec<u8>> {
    let mut generator = PdfGenerator::new();

    let catalog_id = generator.reserve();
    let pages_id = generator.reserve();

    let mut info_dict = String::from("<<\n");
    if let Some(title) = &info.title {
        info_dict.push_str(&format!("/Title {}\n", pdf_text_string(title)));
    }
    info_dict.push_str(&format!("/Producer {}\n>>\n", pdf_text_string(&info.producer)));
    let info_id = generator.add_object(info_dict);

    let used: BTreeSet<Font> = pages
        .iter()
        .flat_map(|p| p.content.fonts_used().iter().copied())
        .collect();
    let mut font_refs = String::new();
    for font in Font::ALL.iter().filter(|f| used.contains(f)) {
        let id = generator.add_object(format!(
            "<< /Type /Font\n/Subtype /Type1\n/BaseFont /{}\n/Encoding /WinAnsiEncoding\n>>\n",
            font.base_font()
        ));
        font_refs.push_str(&format!("/{} {} 0 R ", font.resource_name(), id));
    }
    let resources = format!("<< /Font << {}>> >>", font_refs);

    let mut page_ids = Vec::with_capacity(pages.len());
    for page in pages {
        let raw = page.content.into_bytes();
        let content_id = if compress_streams {
            generator.add_stream_object(" /Filter /FlateDecode", compress(&raw)?)
        } else {
            generator.add_stream_object("", raw)
        };

        let mut annots = Vec::new();
        for link in &page.links {
            let id = generator.add_object(format!(
                "<< /Type /Annot\n/Subtype /Link\n/Rect [{} {} {} {}]\n/Border [0 0 0]\n\
                 /A << /S /URI /URI {} >>\n>>\n",
                num(link.x),
                num(link.y),
                num(link.x + link.width),
                num(link.y + link.height),
                pdf_literal(link.uri.as_bytes())
            ));
            annots.push(format!("{} 0 R", id));
        }
        let annots_entry = if annots.is_empty() {
            String::new()
        } else {
            format!("/Annots [{}]\n", annots.join(" "))
        };

        let page_id = generator.add_object(format!(
            "<< /Type /Page\n/Parent {} 0 R\n/MediaBox [0 0 {} {}]\n/Contents {} 0 R\n\
             /Resources {}\n{}>>\n",
            pages_id,
            num(layout.width),
            num(layout.height),
            content_id,
            resources,
            annots_entry
        ));
        page_ids.push(page_id);
    }

    let kids: Vec<String> = page_ids.iter().map(|id| format!("{} 0 R", id)).collect();
    generator.set_object(
        pages_id,
        format!(
            "<< /Type /Pages\n/Kids [{}]\n/Count {}\n>>\n",
            kids.join(" "),
            page_ids.len()
        ),
    );
    generator.set_object(
        catalog_id,
        format!("<< /Type /Catalog\n/Pages {} 0 R\n>>\n", pages_id),
    );

    generator.generate(catalog_id, Some(info_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn one_page(text: &str) -> PageStream {
        let mut content = ContentStreamBuilder::new();
        content.text(72.0, 700.0, Font::Bold, 18.0, Rgb::BLACK, text);
        PageStream {
            content,
            links: Vec::new(),
        }
    }

    #[test]
    fn test_layout_orientation() {
        let portrait = PageLayout::new(PageSize::Letter, PageOrientation::Portrait, 72.0);
        assert_eq!((portrait.width, portrait.height), (612.0, 792.0));
        let landscape = PageLayout::new(PageSize::Letter, PageOrientation::Landscape, 72.0);
        assert_eq!((landscape.width, landscape.height), (792.0, 612.0));
        assert_eq!(landscape.content_width(), 648.0);
        assert_eq!(landscape.content_top(), 540.0);
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(num(12.0), "12");
        assert_eq!(num(12.345), "12.35");
        assert_eq!(num(-0.5), "-0.5");
    }

    #[test]
    fn test_content_stream_ops() {
        let mut c = ContentStreamBuilder::new();
        c.fill_rect(10.0, 20.0, 30.0, 40.0, Rgb(1.0, 0.0, 0.0));
        c.line(0.0, 0.0, 10.0, 0.0, 1.5, Rgb::BLACK);
        c.text(5.0, 6.0, Font::Mono, 10.0, Rgb::BLACK, "x(1)");
        c.text(5.0, 6.0, Font::Mono, 10.0, Rgb::BLACK, "y");
        let s = String::from_utf8(c.into_bytes()).unwrap();
        assert!(s.contains("1 0 0 rg\n10 20 30 40 re f"));
        assert!(s.contains("0 0 0 RG\n1.5 w\n0 0 m 10 0 l S"));
        assert!(s.contains("(x\\(1\\)) Tj"));
        assert_eq!(s.matches("/F5 10 Tf").count(), 1);
    }

    #[test]
    fn test_content_stream_counts_substitutions() {
        let mut c = ContentStreamBuilder::new();
        c.text(0.0, 0.0, Font::Regular, 12.0, Rgb::BLACK, "并发 → Rust");
        c.text(0.0, 0.0, Font::Regular, 12.0, Rgb::BLACK, "plain");
        assert_eq!(c.substituted_chars(), 3);
        let s = String::from_utf8(c.into_bytes()).unwrap();
        assert!(s.contains("(?? ? Rust) Tj"));
    }

    #[test]
    fn test_assemble_uncompressed() {
        let layout = PageLayout::new(PageSize::A4, PageOrientation::Portrait, 56.25);
        let info = DocumentInfo {
            title: Some("notes.md".into()),
            producer: "mdpdf".into(),
        };
        let bytes = assemble_pdf(vec![one_page("Hello"), one_page("World")], &layout, &info, false).unwrap();
        let s = String::from_utf8_lossy(&bytes);
        assert!(s.starts_with("%PDF-1.4"));
        assert!(s.ends_with("%%EOF\n"));
        assert!(s.contains("/Count 2"));
        assert!(s.contains("/BaseFont /Helvetica-Bold"));
        assert!(!s.contains("/BaseFont /Courier"));
        assert!(s.contains("/Root 1 0 R"));
        assert!(s.contains("(Hello) Tj"));
        assert!(s.contains("/MediaBox [0 0 595.28 841.89]"));
    }

    #[test]
    fn test_assemble_compressed_stream_inflates() {
        let layout = PageLayout::new(PageSize::A4, PageOrientation::Portrait, 56.25);
        let bytes = assemble_pdf(vec![one_page("Squeeze")], &layout, &DocumentInfo::default(), true).unwrap();
        let s = String::from_utf8_lossy(&bytes);
        assert!(s.contains("/Filter /FlateDecode"));
        let start = bytes.windows(7).position(|w| w == b"stream\n").unwrap() + 7;
        let end = bytes.windows(10).position(|w| w == b"\nendstream").unwrap();
        let mut inflated = String::new();
        flate2::read::ZlibDecoder::new(&bytes[start..end])
            .read_to_string(&mut inflated)
            .unwrap();
        assert!(inflated.contains("(Squeeze) Tj"));
    }

    #[test]
    fn test_xref_offsets_point_at_objects() {
        let layout = PageLayout::new(PageSize::Letter, PageOrientation::Portrait, 72.0);
        let bytes = assemble_pdf(vec![one_page("x")], &layout, &DocumentInfo::default(), false).unwrap();
        // the binary header comment is not UTF-8, so stay on raw bytes
        let xref = bytes.windows(5).position(|w| w == b"xref\n").unwrap();
        let table = std::str::from_utf8(&bytes[xref..]).unwrap();
        let entries: Vec<usize> = table
            .lines()
            .skip(3)
            .take_while(|l| l.ends_with(" n "))
            .map(|l| l[..10].parse().unwrap())
            .collect();
        assert!(!entries.is_empty());
        for (i, offset) in entries.iter().enumerate() {
            let header = format!("{} 0 obj", i + 1);
            assert!(bytes[*offset..].starts_with(header.as_bytes()));
        }
    }

    #[test]
    fn test_text_string_is_utf16() {
        assert_eq!(pdf_text_string("Aé"), "<FEFF004100E9>");
    }
}
