//! Table rendering module for PDF generation
//!
//! This module provides a trait-based, modular approach to laying out tables.
//! It follows the Strategy pattern: [`TableRenderer`] decides column widths
//! and cell placement. A row becomes one unbreakable [`Slice`], or several
//! when it is taller than a page.

use crate::elements::{TableAlignment, TextRun};
use crate::renderer::{DrawOp, InlineLayout, Line, Slice, TextStyle};
use crate::theme::{Rgb, Theme, pt};

/// Configuration for table styling
#[derive(Debug, Clone)]
pub struct TableStyle {
    /// Padding inside each cell (in points)
    pub cell_padding: f32,
    /// Grid line width (in points)
    pub grid_line_width: f32,
    pub grid_color: Rgb,
    pub header_fill: Rgb,
    pub font_size: f32,
    pub text_color: Rgb,
    /// Narrowest a column may become, padding excluded (in points)
    pub min_column_width: f32,
}

impl TableStyle {
    pub fn from_theme(theme: &Theme) -> Self {
        Self {
            cell_padding: pt(theme.cell_padding_px),
            grid_line_width: pt(1.0),
            grid_color: theme.cell_border_color,
            header_fill: theme.header_background,
            font_size: theme.body_size_pt(),
            text_color: theme.text_color,
            min_column_width: theme.body_size_pt(),
        }
    }

    fn text_style(&self) -> TextStyle {
        TextStyle {
            size: self.font_size,
            color: self.text_color,
            bold: false,
        }
    }
}

impl Default for TableStyle {
    fn default() -> Self {
        Self::from_theme(&Theme::default())
    }
}

/// Represents a single table cell with its content and alignment
#[derive(Debug, Clone, PartialEq)]
pub struct TableCell {
    pub runs: Vec<TextRun>,
    pub alignment: TableAlignment,
    /// `<th>` cell
    pub header: bool,
}

impl TableCell {
    pub fn new(runs: Vec<TextRun>, alignment: TableAlignment, header: bool) -> Self {
        Self {
            runs,
            alignment,
            header,
        }
    }

    pub fn left(content: &str) -> Self {
        Self::new(vec![TextRun::plain(content)], TableAlignment::Left, false)
    }
}

/// Represents a table row containing multiple cells
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub cells: Vec<TableCell>,
}

impl TableRow {
    pub fn new(cells: Vec<TableCell>) -> Self {
        Self { cells }
    }

    /// Create a row from strings with default left alignment
    pub fn from_strings(cells: &[&str]) -> Self {
        Self {
            cells: cells.iter().map(|s| TableCell::left(s)).collect(),
        }
    }

    /// A row made only of `<th>` cells.
    pub fn is_header(&self) -> bool {
        !self.cells.is_empty() && self.cells.iter().all(|c| c.header)
    }
}

/// Trait for table layout strategies
///
/// This allows different table rendering implementations to be plugged in.
pub trait TableRenderer {
    /// Column widths (padding included) that together fill `max_width`.
    fn column_widths(
        &self,
        rows: &[TableRow],
        style: &TableStyle,
        text: &InlineLayout<'_>,
        max_width: f32,
    ) -> Vec<f32>;

    /// Calculate the X position for text based on alignment
    fn calculate_text_x(
        &self,
        alignment: &TableAlignment,
        cell_x: f32,
        cell_width: f32,
        text_width: f32,
        padding: f32,
    ) -> f32;

    /// Lay out one row as a single slice starting at `x`.
    fn row_slice(
        &self,
        row: &TableRow,
        widths: &[f32],
        x: f32,
        style: &TableStyle,
        text: &InlineLayout<'_>,
    ) -> Slice {
        self.row_slices(row, widths, x, style, text, f32::INFINITY)
            .pop()
            .unwrap_or_else(|| Slice::spacer(2.0 * style.cell_padding))
    }

    /// Lay out one row as slices no taller than `max_height`, breaking the
    /// cells between lines. Every part gets its own grid and header fill.
    fn row_slices(
        &self,
        row: &TableRow,
        widths: &[f32],
        x: f32,
        style: &TableStyle,
        text: &InlineLayout<'_>,
        max_height: f32,
    ) -> Vec<Slice> {
        let base = style.text_style();
        let pad = style.cell_padding;
        let budget = (max_height - 2.0 * pad).max(0.0);

        let mut cells: Vec<_> = row
            .cells
            .iter()
            .zip(widths)
            .map(|(cell, &width)| {
                let lines = text.wrap(&cell.runs, &base, (width - 2.0 * pad).max(1.0));
                let parts = split_lines(lines, budget);
                (cell, width, parts.len(), parts.into_iter())
            })
            .collect();
        let part_count = cells.iter().map(|c| c.2).max().unwrap_or(0).max(1);
        let total_width: f32 = widths.iter().sum();

        let mut slices = Vec::with_capacity(part_count);
        for _ in 0..part_count {
            let parts: Vec<Vec<Line>> = cells
                .iter_mut()
                .map(|c| c.3.next().unwrap_or_default())
                .collect();
            let content_height = parts
                .iter()
                .map(|lines| lines.iter().map(|l| l.height).sum::<f32>())
                .fold(0.0, f32::max);
            let height = content_height + 2.0 * pad;

            let mut slice = Slice::spacer(height);
            let mut cell_x = x;
            for ((cell, width, ..), lines) in cells.iter().zip(parts) {
                let (cell, width) = (*cell, *width);
                if cell.header {
                    slice.ops.push(DrawOp::Rect {
                        x: cell_x,
                        y: 0.0,
                        width,
                        height,
                        color: style.header_fill,
                    });
                }
                let mut y = pad;
                for line in lines {
                    let text_x =
                        self.calculate_text_x(&cell.alignment, cell_x, width, line.width, pad);
                    if slice.baseline.is_none() {
                        slice.baseline = Some(y + line.baseline);
                    }
                    let line_height = line.height;
                    for mut op in line.ops {
                        op.translate(text_x, y);
                        slice.ops.push(op);
                    }
                    y += line_height;
                }
                cell_x += width;
            }

            // Grid: top and bottom of the part, then every column boundary.
            let grid = |x1: f32, y1: f32, x2: f32, y2: f32| DrawOp::Line {
                x1,
                y1,
                x2,
                y2,
                width: style.grid_line_width,
                color: style.grid_color,
            };
            slice.ops.push(grid(x, 0.0, x + total_width, 0.0));
            slice.ops.push(grid(x, height, x + total_width, height));
            let mut boundary = x;
            slice.ops.push(grid(boundary, 0.0, boundary, height));
            for width in widths {
                boundary += width;
                slice.ops.push(grid(boundary, 0.0, boundary, height));
            }
            slices.push(slice);
        }
        slices
    }
}

/// Group lines into parts whose heights add up to at most `budget`. A part
/// always takes at least one line.
fn split_lines(lines: Vec<Line>, budget: f32) -> Vec<Vec<Line>> {
    let mut parts = Vec::new();
    let mut current: Vec<Line> = Vec::new();
    let mut used = 0.0;
    for line in lines {
        if !current.is_empty() && used + line.height > budget + 0.01 {
            parts.push(std::mem::take(&mut current));
            used = 0.0;
        }
        used += line.height;
        current.push(line);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Default implementation of table rendering
///
/// Mirrors automatic table layout at `width: 100%`: every column gets at
/// least its widest word, and the remaining space goes to the columns in
/// proportion to how much they want.
#[derive(Debug, Default)]
pub struct DefaultTableRenderer;

impl TableRenderer for DefaultTableRenderer {
    fn column_widths(
        &self,
        rows: &[TableRow],
        style: &TableStyle,
        text: &InlineLayout<'_>,
        max_width: f32,
    ) -> Vec<f32> {
        let num_cols = rows.iter().map(|r| r.cells.len()).max().unwrap_or(0);
        if num_cols == 0 {
            return Vec::new();
        }

        let base = style.text_style();
        let chrome = 2.0 * style.cell_padding;
        let mut min = vec![style.min_column_width + chrome; num_cols];
        let mut max = min.clone();
        for row in rows {
            for (col, cell) in row.cells.iter().enumerate() {
                let (narrow, natural) = text.extent(&cell.runs, &base);
                min[col] = min[col].max(narrow + chrome);
                max[col] = max[col].max(natural + chrome);
            }
        }

        let min_total: f32 = min.iter().sum();
        let max_total: f32 = max.iter().sum();
        if min_total >= max_width {
            let scale = max_width / min_total;
            return min.iter().map(|w| w * scale).collect();
        }
        if max_total <= max_width {
            let scale = max_width / max_total;
            return max.iter().map(|w| w * scale).collect();
        }
        let share = (max_width - min_total) / (max_total - min_total);
        min.iter()
            .zip(&max)
            .map(|(lo, hi)| lo + (hi - lo) * share)
            .collect()
    }

    fn calculate_text_x(
        &self,
        alignment: &TableAlignment,
        cell_x: f32,
        cell_width: f32,
        text_width: f32,
        padding: f32,
    ) -> f32 {
        match alignment {
            TableAlignment::Left => cell_x + padding,
            TableAlignment::Center => cell_x + (cell_width - text_width) / 2.0,
            TableAlignment::Right => cell_x + cell_width - padding - text_width,
        }
    }
}
