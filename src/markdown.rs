//! Markdown to HTML.
//!
//! Parsing and HTML output are delegated to `comrak` with the GitHub
//! extensions turned on (tables, strikethrough, task lists, autolinks,
//! footnotes). Fenced code blocks are swapped for highlighted markup before
//! the HTML is written.

use crate::error::{ConvertError, Result};
use crate::highlight::Highlighter;
use comrak::nodes::{NodeHtmlBlock, NodeValue};
use comrak::{Arena, Options, format_html, parse_document};
use tracing::debug;

pub struct MarkdownRenderer<'h> {
    highlighter: &'h Highlighter,
}

impl<'h> MarkdownRenderer<'h> {
    pub fn new(highlighter: &'h Highlighter) -> Self {
        Self { highlighter }
    }

    /// Render Markdown text to an HTML fragment.
    pub fn render(&self, markdown: &str) -> Result<String> {
        let mut options = Options::default();
        options.extension.table = true;
        options.extension.strikethrough = true;
        options.extension.tasklist = true;
        options.extension.autolink = true;
        options.extension.footnotes = true;
        // Raw HTML passes through, and the highlighted code blocks are raw HTML.
        options.render.unsafe_ = true;

        let arena = Arena::new();
        let root = parse_document(&arena, markdown, &options);

        let mut blocks = 0usize;
        for node in root.descendants() {
            let highlighted = {
                let ast = node.data.borrow();
                match &ast.value {
                    NodeValue::CodeBlock(block) => {
                        let language = block.info.split_whitespace().next().unwrap_or("");
                        Some(self.highlighter.highlight_block(language, &block.literal)?)
                    }
                    _ => None,
                }
            };
            if let Some(html) = highlighted {
                node.data.borrow_mut().value = NodeValue::HtmlBlock(NodeHtmlBlock {
                    block_type: 0,
                    literal: html,
                });
                blocks += 1;
            }
        }
        debug!(code_blocks = blocks, "highlighted fenced code");

        let mut out = Vec::new();
        format_html(root, &options, &mut out)
            .map_err(|e| ConvertError::Markdown(e.to_string()))?;
        String::from_utf8(out).map_err(|e| ConvertError::Markdown(e.to_string()))
    }
}
