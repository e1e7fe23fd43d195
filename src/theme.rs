//! The fixed document theme.
//!
//! Every colour and size used by the generated stylesheet lives in [`Theme`],
//! and the PDF layout engine reads the same values, so the intermediate HTML
//! document and the final PDF always agree on how things look.
//!
//! Sizes are stored in CSS pixels, as written in the stylesheet. Use
//! [`pt`] to convert them to PDF points.

use serde::{Deserialize, Serialize};

/// An RGB colour with components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb(pub f32, pub f32, pub f32);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0.0, 0.0, 0.0);

    /// Build a colour from a `0xRRGGBB` literal.
    pub const fn hex(value: u32) -> Self {
        Rgb(
            ((value >> 16) & 0xff) as f32 / 255.0,
            ((value >> 8) & 0xff) as f32 / 255.0,
            (value & 0xff) as f32 / 255.0,
        )
    }

    pub fn from_u8(r: u8, g: u8, b: u8) -> Self {
        Rgb(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0)
    }

    /// `#rrggbb` form used in the stylesheet.
    pub fn css(&self) -> String {
        let c = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!("#{:02x}{:02x}{:02x}", c(self.0), c(self.1), c(self.2))
    }
}

/// CSS pixels to PDF points (96 px per inch, 72 pt per inch).
pub fn pt(px: f32) -> f32 {
    px * 0.75
}

/// A bottom rule drawn under a heading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadingRule {
    pub width_px: f32,
    pub color: Rgb,
    pub padding_px: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub body_font_px: f32,
    pub line_height: f32,
    pub body_margin_px: f32,
    pub page_margin_px: f32,
    pub text_color: Rgb,
    pub link_color: Rgb,
    pub muted_color: Rgb,

    pub heading_color: Rgb,
    pub heading_margin_top_px: f32,
    pub heading_margin_bottom_px: f32,
    /// h1..h6; h5 and h6 keep the user-agent defaults.
    pub heading_sizes_px: [f32; 6],
    pub h1_rule: HeadingRule,
    pub h2_rule: HeadingRule,

    pub paragraph_margin_px: f32,
    pub accent: Rgb,
    pub code_background: Rgb,
    pub code_font_scale: f32,
    pub inline_code_padding_px: (f32, f32),
    pub pre_padding_px: f32,
    pub pre_border_px: f32,
    pub pre_margin_px: f32,

    pub table_margin_px: f32,
    pub cell_padding_px: f32,
    pub cell_border_color: Rgb,
    pub header_background: Rgb,

    pub list_margin_px: f32,
    pub list_indent_px: f32,
    pub item_margin_px: f32,

    pub quote_margin_px: f32,
    pub quote_padding_px: (f32, f32),
    pub quote_border_px: f32,

    pub rule_color: Rgb,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            body_font_px: 16.0,
            line_height: 1.6,
            body_margin_px: 40.0,
            page_margin_px: 75.0,
            text_color: Rgb::hex(0x333333),
            link_color: Rgb::hex(0x0000ee),
            muted_color: Rgb::hex(0x7f8c8d),

            heading_color: Rgb::hex(0x2c3e50),
            heading_margin_top_px: 30.0,
            heading_margin_bottom_px: 15.0,
            heading_sizes_px: [28.0, 24.0, 20.0, 18.0, 13.28, 10.72],
            h1_rule: HeadingRule {
                width_px: 2.0,
                color: Rgb::hex(0x3498db),
                padding_px: 10.0,
            },
            h2_rule: HeadingRule {
                width_px: 1.0,
                color: Rgb::hex(0xbdc3c7),
                padding_px: 5.0,
            },

            paragraph_margin_px: 16.0,
            accent: Rgb::hex(0x3498db),
            code_background: Rgb::hex(0xf8f9fa),
            code_font_scale: 0.875,
            inline_code_padding_px: (2.0, 4.0),
            pre_padding_px: 15.0,
            pre_border_px: 4.0,
            pre_margin_px: 16.0,

            table_margin_px: 20.0,
            cell_padding_px: 12.0,
            cell_border_color: Rgb::hex(0xdddddd),
            header_background: Rgb::hex(0xf2f2f2),

            list_margin_px: 15.0,
            list_indent_px: 30.0,
            item_margin_px: 5.0,

            quote_margin_px: 20.0,
            quote_padding_px: (10.0, 20.0),
            quote_border_px: 4.0,

            rule_color: Rgb::hex(0xbdc3c7),
        }
    }
}

impl Theme {
    /// Font size in points for a heading level (clamped to 1..=6).
    pub fn heading_size_pt(&self, level: u8) -> f32 {
        let idx = level.clamp(1, 6) as usize - 1;
        pt(self.heading_sizes_px[idx])
    }

    pub fn body_size_pt(&self) -> f32 {
        pt(self.body_font_px)
    }

    pub fn code_size_pt(&self) -> f32 {
        pt(self.body_font_px * self.code_font_scale)
    }

    /// The inline stylesheet embedded in every generated HTML document.
    pub fn stylesheet(&self) -> String {
        let mut css = String::new();
        css.push_str(&format!(
            "body {{\n    font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif;\n    \
             font-size: {}px;\n    line-height: {};\n    margin: {}px;\n    color: {};\n}}\n",
            self.body_font_px,
            self.line_height,
            self.body_margin_px,
            self.text_color.css()
        ));
        css.push_str(&format!(
            "h1, h2, h3, h4, h5, h6 {{\n    color: {};\n    margin-top: {}px;\n    margin-bottom: {}px;\n}}\n",
            self.heading_color.css(),
            self.heading_margin_top_px,
            self.heading_margin_bottom_px
        ));
        for (level, rule) in [(1, Some(self.h1_rule)), (2, Some(self.h2_rule)), (3, None), (4, None)] {
            let size = self.heading_sizes_px[level - 1];
            match rule {
                Some(r) => css.push_str(&format!(
                    "h{level} {{ font-size: {size}px; border-bottom: {}px solid {}; padding-bottom: {}px; }}\n",
                    r.width_px,
                    r.color.css(),
                    r.padding_px
                )),
                None => css.push_str(&format!("h{level} {{ font-size: {size}px; }}\n")),
            }
        }
        css.push_str(&format!(
            "code {{\n    background-color: {};\n    padding: {}px {}px;\n    border-radius: 3px;\n    \
             font-family: 'Courier New', monospace;\n}}\n",
            self.code_background.css(),
            self.inline_code_padding_px.0,
            self.inline_code_padding_px.1
        ));
        css.push_str(&format!(
            "pre {{\n    background-color: {};\n    padding: {}px;\n    border-radius: 5px;\n    \
             border-left: {}px solid {};\n    overflow-x: auto;\n}}\n",
            self.code_background.css(),
            self.pre_padding_px,
            self.pre_border_px,
            self.accent.css()
        ));
        css.push_str("pre code {\n    background-color: transparent;\n    padding: 0;\n}\n");
        css.push_str(&format!(
            "table {{\n    border-collapse: collapse;\n    width: 100%;\n    margin: {}px 0;\n}}\n",
            self.table_margin_px
        ));
        css.push_str(&format!(
            "th, td {{\n    border: 1px solid {};\n    padding: {}px;\n    text-align: left;\n}}\n",
            self.cell_border_color.css(),
            self.cell_padding_px
        ));
        css.push_str(&format!(
            "th {{\n    background-color: {};\n    font-weight: bold;\n}}\n",
            self.header_background.css()
        ));
        css.push_str(&format!(
            "ul, ol {{\n    margin: {}px 0;\n    padding-left: {}px;\n}}\n",
            self.list_margin_px, self.list_indent_px
        ));
        css.push_str(&format!("li {{\n    margin: {}px 0;\n}}\n", self.item_margin_px));
        css.push_str(&format!(
            "blockquote {{\n    border-left: {}px solid {};\n    margin: {}px 0;\n    \
             padding: {}px {}px;\n    background-color: {};\n}}\n",
            self.quote_border_px,
            self.accent.css(),
            self.quote_margin_px,
            self.quote_padding_px.0,
            self.quote_padding_px.1,
            self.code_background.css()
        ));
        css
    }
}

/// Wrap an HTML fragment into a complete document with an inline stylesheet.
pub fn wrap_document(title: &str, fragment: &str, css: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n\
         <style>\n{}</style>\n</head>\n<body>\n{}</body>\n</html>\n",
        escape_html(title),
        css,
        fragment
    )
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_colour() {
        let c = Rgb::hex(0x3498db);
        assert_eq!(c.css(), "#3498db");
        assert_eq!(Rgb::hex(0xffffff), Rgb(1.0, 1.0, 1.0));
    }

    #[test]
    fn test_stylesheet_carries_fixed_palette() {
        let css = Theme::default().stylesheet();
        assert!(css.contains("h1 { font-size: 28px; border-bottom: 2px solid #3498db; padding-bottom: 10px; }"));
        assert!(css.contains("h2 { font-size: 24px; border-bottom: 1px solid #bdc3c7; padding-bottom: 5px; }"));
        assert!(css.contains("border-left: 4px solid #3498db"));
        assert!(css.contains("background-color: #f2f2f2"));
        assert!(css.contains("line-height: 1.6"));
    }

    #[test]
    fn test_heading_sizes_in_points() {
        let theme = Theme::default();
        assert_eq!(theme.heading_size_pt(1), 21.0);
        assert_eq!(theme.heading_size_pt(2), 18.0);
        assert_eq!(theme.heading_size_pt(9), theme.heading_size_pt(6));
        assert_eq!(theme.body_size_pt(), 12.0);
    }

    #[test]
    fn test_wrap_document_escapes_title() {
        let doc = wrap_document("a<b>.md", "<p>x</p>\n", "body {}\n");
        assert!(doc.starts_with("<!DOCTYPE html>"));
        assert!(doc.contains("<title>a&lt;b&gt;.md</title>"));
        assert!(doc.contains("<meta charset=\"utf-8\">"));
        assert!(doc.contains("<body>\n<p>x</p>\n</body>"));
    }
}
