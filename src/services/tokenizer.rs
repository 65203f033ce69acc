// src/services/tokenizer.rs

//! Table tokenizer.
//!
//! Turns one HTML `<table>` into a [`RawTableGrid`]: rowspans and colspans are
//! resolved by repeating the spanned cell into every position it covers, so every
//! output row has the same width. Cell text keeps `<br>` as [`LINE_BREAK`];
//! splitting stacked lines is left to the normalizer.

use scraper::{ElementRef, Html, Node};

use crate::error::{AppError, Result};
use crate::models::{Cell, LINE_BREAK, RawTableGrid};
use crate::utils::parse_selector;

const MAX_COLSPAN: usize = 1000;
const MAX_ROWSPAN: usize = 65534;

/// A source cell before span resolution.
#[derive(Debug, Clone)]
struct SourceCell {
    cell: Cell,
    rowspan: usize,
    colspan: usize,
    is_header: bool,
}

/// A source row before span resolution.
#[derive(Debug)]
struct SourceRow {
    cells: Vec<SourceCell>,
    in_thead: bool,
}

impl SourceRow {
    fn is_all_header(&self) -> bool {
        !self.cells.is_empty() && self.cells.iter().all(|c| c.is_header)
    }
}

/// Tokenize the first `<table>` found in an HTML fragment.
pub fn tokenize_html(html: &str) -> Result<RawTableGrid> {
    let fragment = Html::parse_fragment(html);
    let selector = parse_selector("table")?;
    let table = fragment
        .select(&selector)
        .next()
        .ok_or_else(|| AppError::malformed("fragment contains no <table>"))?;
    tokenize(table)
}

/// Tokenize one `<table>` element.
pub fn tokenize(table: ElementRef<'_>) -> Result<RawTableGrid> {
    let rows = source_rows(table);
    if rows.is_empty() {
        return Err(AppError::malformed("table has no rows"));
    }

    // Header rows: the <thead>, else the leading rows made only of <th>
    let header_count = if rows.iter().any(|r| r.in_thead) {
        rows.iter().take_while(|r| r.in_thead).count()
    } else {
        rows.iter().take_while(|r| r.is_all_header()).count()
    };
    if header_count == 0 {
        return Err(AppError::malformed("no header row could be identified"));
    }

    let mut grid = resolve_spans(&rows);
    let width = grid.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return Err(AppError::malformed("table has no cells"));
    }
    for row in &mut grid {
        row.resize_with(width, Cell::default);
    }

    let body = grid.split_off(header_count);
    let header = header_labels(&grid, width);
    let rows = body
        .into_iter()
        .filter(|row| !row.iter().all(Cell::is_blank))
        .collect();

    Ok(RawTableGrid { header, rows })
}

/// Collect the table's own rows, ignoring rows of nested tables.
fn source_rows(table: ElementRef<'_>) -> Vec<SourceRow> {
    let table_id = (*table).id();
    let mut rows = Vec::new();

    for node in table.descendants() {
        let Some(tr) = ElementRef::wrap(node) else {
            continue;
        };
        if tr.value().name() != "tr" {
            continue;
        }

        let mut owner = None;
        let mut in_thead = false;
        for ancestor in tr.ancestors() {
            if let Some(el) = ancestor.value().as_element() {
                match el.name() {
                    "thead" if owner.is_none() => in_thead = true,
                    "table" => {
                        owner = Some(ancestor.id());
                        break;
                    }
                    _ => {}
                }
            }
        }
        if owner != Some(table_id) {
            continue;
        }

        let cells = tr
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|el| matches!(el.value().name(), "td" | "th"))
            .map(|el| SourceCell {
                cell: render_cell(el),
                rowspan: span_attr(el, "rowspan", MAX_ROWSPAN),
                colspan: span_attr(el, "colspan", MAX_COLSPAN),
                is_header: el.value().name() == "th",
            })
            .collect();

        rows.push(SourceRow { cells, in_thead });
    }

    rows
}

fn span_attr(el: ElementRef<'_>, name: &str, max: usize) -> usize {
    el.value()
        .attr(name)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .map(|n| n.clamp(1, max))
        .unwrap_or(1)
}

/// Place source cells on a dense grid, carrying rowspans downwards.
fn resolve_spans(rows: &[SourceRow]) -> Vec<Vec<Cell>> {
    // Per column: the cell still spanning down and how many rows it has left
    let mut pending: Vec<Option<(Cell, usize)>> = Vec::new();
    let mut grid = Vec::with_capacity(rows.len());

    for row in rows {
        let mut out: Vec<Cell> = Vec::new();
        let mut col = 0;

        for source in &row.cells {
            while take_pending(&mut pending, col, &mut out) {
                col += 1;
            }
            for _ in 0..source.colspan {
                out.push(source.cell.clone());
                if source.rowspan > 1 {
                    if pending.len() <= col {
                        pending.resize(col + 1, None);
                    }
                    pending[col] = Some((source.cell.clone(), source.rowspan - 1));
                } else if let Some(slot) = pending.get_mut(col) {
                    // A placed cell ends any span it lands on
                    *slot = None;
                }
                col += 1;
            }
        }

        // Spans reaching past the row's own cells
        while col < pending.len() {
            if !take_pending(&mut pending, col, &mut out) {
                out.push(Cell::default());
            }
            col += 1;
        }

        grid.push(out);
    }

    grid
}

/// Emit the pending cell of `col`, if any, and count down its span.
fn take_pending(pending: &mut [Option<(Cell, usize)>], col: usize, out: &mut Vec<Cell>) -> bool {
    let Some(slot) = pending.get_mut(col) else {
        return false;
    };
    let Some((cell, remaining)) = slot.as_mut() else {
        return false;
    };
    out.push(cell.clone());
    *remaining -= 1;
    if *remaining == 0 {
        *slot = None;
    }
    true
}

/// Combine stacked header rows into one label per column.
fn header_labels(header_rows: &[Vec<Cell>], width: usize) -> Vec<String> {
    (0..width)
        .map(|col| {
            let mut parts: Vec<String> = Vec::new();
            for row in header_rows {
                let label = row
                    .get(col)
                    .map(|c| collapse_whitespace(&c.text.replace(LINE_BREAK, " ")))
                    .unwrap_or_default();
                if !label.is_empty() && parts.last() != Some(&label) {
                    parts.push(label);
                }
            }
            parts.join(" ")
        })
        .collect()
}

/// Render a cell's content into text, links, and superscripts.
fn render_cell(el: ElementRef<'_>) -> Cell {
    let mut builder = CellBuilder::default();
    builder.walk(el);
    builder.finish()
}

#[derive(Default)]
struct CellBuilder {
    text: String,
    links: Vec<String>,
    superscripts: Vec<String>,
}

impl CellBuilder {
    fn walk(&mut self, el: ElementRef<'_>) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => self.push_text(text),
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        self.element(child_el);
                    }
                }
                _ => {}
            }
        }
    }

    fn element(&mut self, el: ElementRef<'_>) {
        match el.value().name() {
            "br" => self.text.push(LINE_BREAK),
            "script" | "style" => {}
            "sup" => {
                let mut inner = CellBuilder::default();
                inner.walk(el);
                let inner = inner.finish();
                let text = collapse_whitespace(&inner.text.replace(LINE_BREAK, " "));
                if !text.is_empty() {
                    self.superscripts.push(text);
                }
                self.links.extend(inner.links);
            }
            "em" | "i" => self.wrapped(el, '[', ']'),
            "q" => self.wrapped(el, '"', '"'),
            "a" => {
                if let Some(href) = el.value().attr("href") {
                    let href = href.trim();
                    if !href.is_empty() {
                        self.links.push(href.to_string());
                    }
                }
                self.walk(el);
            }
            // Nested tables are their own grids; keep only a line break
            "table" => {
                if !self.text.trim().is_empty() && !self.text.ends_with(LINE_BREAK) {
                    self.text.push(LINE_BREAK);
                }
            }
            "p" | "div" => {
                if !self.text.trim().is_empty() && !self.text.ends_with(LINE_BREAK) {
                    self.text.push(LINE_BREAK);
                }
                self.walk(el);
            }
            _ => self.walk(el),
        }
    }

    fn wrapped(&mut self, el: ElementRef<'_>, open: char, close: char) {
        let mut inner = CellBuilder::default();
        inner.walk(el);
        let inner = inner.finish();
        if inner.text.is_empty() {
            return;
        }
        self.text.push(open);
        self.text.push_str(&inner.text);
        self.text.push(close);
        self.links.extend(inner.links);
        self.superscripts.extend(inner.superscripts);
    }

    fn push_text(&mut self, text: &str) {
        // Source newlines are layout, not line breaks
        self.text.extend(
            text.chars()
                .map(|c| if c.is_ascii_whitespace() { ' ' } else { c }),
        );
    }

    fn finish(self) -> Cell {
        let lines: Vec<String> = self
            .text
            .split(LINE_BREAK)
            .map(collapse_whitespace)
            .collect();
        let text = if lines.iter().all(String::is_empty) {
            String::new()
        } else {
            lines.join(&LINE_BREAK.to_string())
        };
        Cell {
            text,
            links: self.links,
            superscripts: self.superscripts,
        }
    }
}

/// Collapse runs of ASCII whitespace and trim; non-breaking spaces are kept.
fn collapse_whitespace(s: &str) -> String {
    s.split_ascii_whitespace().collect::<Vec<_>>().join(" ")
}
