//! Syntax highlighting for fenced code blocks.
//!
//! Code is turned into classed HTML: every `<span>` carries the atoms of one
//! scope, prefixed with [`CLASS_PREFIX`] (`keyword.control.rust` becomes
//! `class="hl-keyword hl-control hl-rust"`). The stylesheet colours those
//! classes with the configured theme, and [`CodePalette`] maps a stack of
//! span classes back to the same theme colour for the PDF stage.

use crate::error::{ConvertError, Result};
use crate::theme::{Rgb, escape_html};
use syntect::highlighting::{Highlighter as ThemeHighlighter, Theme, ThemeSet};
use syntect::html::{ClassStyle, ClassedHTMLGenerator, css_for_theme_with_class_style};
use syntect::parsing::{Scope, SyntaxSet};
use syntect::util::LinesWithEndings;

pub const CLASS_PREFIX: &str = "hl-";
pub const DEFAULT_THEME: &str = "InspiredGitHub";

const CLASS_STYLE: ClassStyle = ClassStyle::SpacedPrefixed {
    prefix: CLASS_PREFIX,
};

pub struct Highlighter {
    syntaxes: SyntaxSet,
    theme: Theme,
    theme_name: String,
}

impl Highlighter {
    /// Load the bundled syntaxes and the named theme.
    pub fn new(theme_name: &str) -> Result<Self> {
        let mut themes = ThemeSet::load_defaults();
        let theme = match themes.themes.remove(theme_name) {
            Some(t) => t,
            None => {
                let available: Vec<&str> = themes.themes.keys().map(String::as_str).collect();
                return Err(ConvertError::UnknownTheme {
                    name: theme_name.to_string(),
                    available: available.join(", "),
                });
            }
        };
        Ok(Self {
            syntaxes: SyntaxSet::load_defaults_newlines(),
            theme,
            theme_name: theme_name.to_string(),
        })
    }

    /// Names of the themes bundled with the highlighter.
    pub fn available_themes() -> Vec<String> {
        ThemeSet::load_defaults().themes.keys().cloned().collect()
    }

    pub fn theme_name(&self) -> &str {
        &self.theme_name
    }

    /// Highlight one fenced block into the `codehilite` wrapper markup.
    ///
    /// `language` is the first word of the fence info string; unknown or
    /// empty languages fall back to plain text.
    pub fn highlight_block(&self, language: &str, code: &str) -> Result<String> {
        let syntax = if language.is_empty() {
            None
        } else {
            self.syntaxes.find_syntax_by_token(language)
        };
        let syntax = syntax.unwrap_or_else(|| self.syntaxes.find_syntax_plain_text());

        let mut generator =
            ClassedHTMLGenerator::new_with_class_style(syntax, &self.syntaxes, CLASS_STYLE);
        for line in LinesWithEndings::from(code) {
            generator
                .parse_html_for_line_which_includes_newline(line)
                .map_err(|e| ConvertError::Highlight {
                    language: language.to_string(),
                    detail: e.to_string(),
                })?;
        }
        let body = generator.finalize();

        let class = if language.is_empty() {
            String::new()
        } else {
            format!(" class=\"language-{}\"", escape_html(language))
        };
        Ok(format!(
            "<div class=\"codehilite\"><pre><code{class}>{body}</code></pre></div>\n"
        ))
    }

    /// CSS rules for the highlight classes.
    pub fn stylesheet(&self) -> Result<String> {
        css_for_theme_with_class_style(&self.theme, CLASS_STYLE).map_err(|e| {
            ConvertError::Highlight {
                language: String::new(),
                detail: e.to_string(),
            }
        })
    }

    pub fn palette(&self) -> CodePalette<'_> {
        CodePalette::new(&self.theme)
    }
}

/// Resolves stacks of highlight span classes to theme colours.
pub struct CodePalette<'a> {
    highlighter: ThemeHighlighter<'a>,
    fallback: Rgb,
}

impl<'a> CodePalette<'a> {
    pub fn new(theme: &'a Theme) -> Self {
        let fallback = theme
            .settings
            .foreground
            .map(|c| Rgb::from_u8(c.r, c.g, c.b))
            .unwrap_or(Rgb::BLACK);
        Self {
            highlighter: ThemeHighlighter::new(theme),
            fallback,
        }
    }

    /// Turn one span's class attribute into a scope, if it carries any
    /// highlight classes.
    pub fn scope_from_classes<'c, I>(classes: I) -> Option<Scope>
    where
        I: IntoIterator<Item = &'c str>,
    {
        let atoms: Vec<&str> = classes
            .into_iter()
            .filter_map(|c| c.strip_prefix(CLASS_PREFIX))
            .collect();
        if atoms.is_empty() {
            return None;
        }
        Scope::new(&atoms.join(".")).ok()
    }

    /// Foreground colour for a scope stack, outermost scope first.
    pub fn color_for(&self, stack: &[Scope]) -> Rgb {
        if stack.is_empty() {
            return self.fallback;
        }
        let c = self.highlighter.style_for_stack(stack).foreground;
        Rgb::from_u8(c.r, c.g, c.b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_theme_lists_alternatives() {
        match Highlighter::new("no-such-theme") {
            Err(ConvertError::UnknownTheme { name, available }) => {
                assert_eq!(name, "no-such-theme");
                assert!(available.contains(DEFAULT_THEME));
            }
            _ => panic!("expected UnknownTheme"),
        }
    }

    #[test]
    fn test_highlight_rust_emits_prefixed_spans() {
        let hl = Highlighter::new(DEFAULT_THEME).unwrap();
        let html = hl.highlight_block("rust", "fn main() {}\n").unwrap();
        assert!(html.starts_with("<div class=\"codehilite\"><pre><code class=\"language-rust\">"));
        assert!(html.contains("hl-keyword") || html.contains("hl-storage"));
        assert!(html.contains("main"));
    }

    #[test]
    fn test_highlight_unknown_language_escapes() {
        let hl = Highlighter::new(DEFAULT_THEME).unwrap();
        let html = hl.highlight_block("klingon", "a < b && c\n").unwrap();
        assert!(html.contains("a &lt; b &amp;&amp; c"));
        assert!(html.contains("language-klingon"));
    }

    #[test]
    fn test_scope_from_classes() {
        let scope = CodePalette::scope_from_classes(["hl-keyword", "hl-control", "hl-rust"]).unwrap();
        assert_eq!(scope, Scope::new("keyword.control.rust").unwrap());
        assert!(CodePalette::scope_from_classes(["language-rust"]).is_none());
    }

    #[test]
    fn test_palette_distinguishes_comments() {
        let hl = Highlighter::new(DEFAULT_THEME).unwrap();
        let palette = hl.palette();
        let source = Scope::new("source.rust").unwrap();
        let comment = Scope::new("comment.line.double-slash.rust").unwrap();
        let plain = palette.color_for(&[source]);
        let commented = palette.color_for(&[source, comment]);
        assert_ne!(plain, commented);
    }

    #[test]
    fn test_stylesheet_uses_prefix() {
        let hl = Highlighter::new(DEFAULT_THEME).unwrap();
        let css = hl.stylesheet().unwrap();
        assert!(css.contains(".hl-"));
    }
}
