pub mod pdf;
pub mod xlsx;

use crate::sf2::Sf2Model;

/// Grid position threaded through render calls. Render helpers take a
/// cursor and return the cursor for the next write, so the renderers hold
/// no hidden position state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridCursor {
    pub row: u32,
    pub col: u16,
}

impl GridCursor {
    pub fn new(row: u32, col: u16) -> Self {
        Self { row, col }
    }

    pub fn right(self) -> Self {
        Self {
            row: self.row,
            col: self.col + 1,
        }
    }

    pub fn down(self) -> Self {
        Self {
            row: self.row + 1,
            col: self.col,
        }
    }

    pub fn at_col(self, col: u16) -> Self {
        Self { row: self.row, col }
    }

    /// Next row, back at the left edge of the grid.
    pub fn line_start(self) -> Self {
        Self {
            row: self.row + 1,
            col: 0,
        }
    }
}

/// Bijective base-26 column letters: 1 -> "A", 26 -> "Z", 27 -> "AA".
/// There is no zero digit, so the usual base conversion shifts by one per
/// letter.
pub fn column_letters(mut n: u32) -> String {
    let mut out = Vec::new();
    while n > 0 {
        n -= 1;
        out.push(b'A' + (n % 26) as u8);
        n /= 26;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// A1-style reference for a zero-based cursor position.
pub fn cell_ref(cursor: GridCursor) -> String {
    format!(
        "{}{}",
        column_letters(cursor.col as u32 + 1),
        cursor.row + 1
    )
}

#[derive(Debug, Clone)]
pub struct RenderError {
    pub stage: &'static str,
    pub message: String,
    pub row: Option<u32>,
    pub col: Option<u16>,
}

impl RenderError {
    pub fn new(stage: &'static str, message: impl Into<String>) -> Self {
        let e = Self {
            stage,
            message: message.into(),
            row: None,
            col: None,
        };
        log::error!("render failed at stage {}: {}", e.stage, e.message);
        e
    }

    pub fn at(stage: &'static str, cursor: GridCursor, message: impl Into<String>) -> Self {
        let e = Self {
            stage,
            message: message.into(),
            row: Some(cursor.row),
            col: Some(cursor.col),
        };
        log::error!(
            "render failed at stage {} (row {}, col {}): {}",
            e.stage,
            cursor.row,
            cursor.col,
            e.message
        );
        e
    }

    pub fn details(&self) -> serde_json::Value {
        serde_json::json!({
            "stage": self.stage,
            "row": self.row,
            "col": self.col,
        })
    }
}

fn sanitize_for_file_name(s: &str) -> String {
    let cleaned: String = s
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let mut out = String::with_capacity(cleaned.len());
    for c in cleaned.chars() {
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches('_').to_string()
}

/// `SF2_<section>_<gradeLevel>_<month>_<year>.<ext>`
pub fn artifact_file_name(model: &Sf2Model, ext: &str) -> String {
    format!(
        "SF2_{}_{}_{}_{}.{}",
        sanitize_for_file_name(&model.section.name),
        sanitize_for_file_name(&model.section.grade_level),
        model.month_name,
        model.year,
        ext
    )
}
