// src/models/grid.rs

//! Dense cell grid produced from an HTML table.

/// Line-break marker kept inside cell text where the source had `<br>`.
pub const LINE_BREAK: char = '\n';

/// One grid position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cell {
    /// Rendered text; may contain `LINE_BREAK`
    pub text: String,

    /// `href` targets of anchors inside the cell, in document order
    pub links: Vec<String>,

    /// Superscript fragments lifted out of the text
    pub superscripts: Vec<String>,
}

impl Cell {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty() && self.superscripts.is_empty()
    }
}

/// A rectangular table: one header row and data rows of equal width.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTableGrid {
    pub header: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl RawTableGrid {
    /// Number of columns shared by the header and every row.
    pub fn width(&self) -> usize {
        self.header.len()
    }

    pub fn is_rectangular(&self) -> bool {
        let width = self.width();
        self.rows.iter().all(|row| row.len() == width)
    }
}
