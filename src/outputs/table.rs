//! Plain-text table rendering for operator views.
//!
//! All layout choices live in a [`RenderConfig`] passed to [`render`]; there
//! is no process-wide display state.

use std::fmt::Write;

use crate::utils::truncate_chars;

/// Border characters of a table style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStyle {
    /// ASCII borders: `+`, `-`, `|`.
    Grid,
    /// Unicode box-drawing borders.
    FancyGrid,
}

/// `[left, junction, right, fill]` for each horizontal rule.
struct Borders {
    top: [char; 4],
    header_sep: [char; 4],
    row_sep: [char; 4],
    bottom: [char; 4],
    vertical: char,
}

impl TableStyle {
    fn borders(self) -> Borders {
        match self {
            TableStyle::Grid => Borders {
                top: ['+', '+', '+', '-'],
                header_sep: ['+', '+', '+', '='],
                row_sep: ['+', '+', '+', '-'],
                bottom: ['+', '+', '+', '-'],
                vertical: '|',
            },
            TableStyle::FancyGrid => Borders {
                top: ['╒', '╤', '╕', '═'],
                header_sep: ['╞', '╪', '╡', '═'],
                row_sep: ['├', '┼', '┤', '─'],
                bottom: ['╘', '╧', '╛', '═'],
                vertical: '│',
            },
        }
    }
}

/// Layout options for one rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderConfig {
    pub style: TableStyle,
    /// Column headers; also fixes the column count.
    pub headers: Vec<String>,
    /// Maximum characters per column, `None` for unbounded. Missing entries
    /// are unbounded.
    pub max_col_widths: Vec<Option<usize>>,
    /// Separator lines between body rows.
    pub row_separators: bool,
    /// Render at most this many rows.
    pub max_rows: Option<usize>,
}

impl RenderConfig {
    /// The article view: titled columns, capped widths, fancy borders.
    pub fn articles() -> Self {
        Self {
            style: TableStyle::FancyGrid,
            headers: ["Title", "Author", "Published Date", "Scraped At", "URL"]
                .map(String::from)
                .to_vec(),
            max_col_widths: vec![Some(40), Some(20), Some(25), Some(25), Some(40)],
            row_separators: true,
            max_rows: None,
        }
    }

    /// Compact sanity-check sample of the first rows.
    pub fn sample(rows: usize) -> Self {
        Self {
            style: TableStyle::Grid,
            headers: crate::models::COLUMNS.map(String::from).to_vec(),
            max_col_widths: vec![Some(50), Some(20), None, None, Some(40)],
            row_separators: false,
            max_rows: Some(rows),
        }
    }
}

/// Render `rows` under `config`. Cells beyond the header count are ignored.
pub fn render(rows: &[Vec<String>], config: &RenderConfig) -> String {
    let columns = config.headers.len();
    let limit = config.max_rows.unwrap_or(rows.len()).min(rows.len());

    let fit = |col: usize, cell: &str| -> String {
        let flat = cell.replace(['\r', '\n'], " ");
        match config.max_col_widths.get(col).copied().flatten() {
            Some(max) => truncate_chars(&flat, max),
            None => flat,
        }
    };

    let header_cells: Vec<String> = config
        .headers
        .iter()
        .enumerate()
        .map(|(i, h)| fit(i, h))
        .collect();
    let body: Vec<Vec<String>> = rows[..limit]
        .iter()
        .map(|row| {
            (0..columns)
                .map(|i| fit(i, row.get(i).map(String::as_str).unwrap_or("")))
                .collect()
        })
        .collect();

    let widths: Vec<usize> = (0..columns)
        .map(|i| {
            body.iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(header_cells[i].chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let b = config.style.borders();
    let mut out = String::new();
    rule(&mut out, &widths, b.top);
    line(&mut out, &widths, &header_cells, b.vertical);
    rule(&mut out, &widths, b.header_sep);
    for (i, row) in body.iter().enumerate() {
        if i > 0 && config.row_separators {
            rule(&mut out, &widths, b.row_sep);
        }
        line(&mut out, &widths, row, b.vertical);
    }
    rule(&mut out, &widths, b.bottom);
    out
}

fn rule(out: &mut String, widths: &[usize], [left, mid, right, fill]: [char; 4]) {
    out.push(left);
    for (i, w) in widths.iter().enumerate() {
        if i > 0 {
            out.push(mid);
        }
        out.extend(std::iter::repeat_n(fill, w + 2));
    }
    out.push(right);
    out.push('\n');
}

fn line(out: &mut String, widths: &[usize], cells: &[String], vertical: char) {
    out.push(vertical);
    for (cell, w) in cells.iter().zip(widths) {
        let pad = w - cell.chars().count();
        let _ = write!(out, " {}{} {}", cell, " ".repeat(pad), vertical);
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<Vec<String>> {
        vec![
            vec!["A rather long headline".into(), "alice".into()],
            vec!["Short".into(), "bob".into()],
        ]
    }

    fn two_columns(style: TableStyle) -> RenderConfig {
        RenderConfig {
            style,
            headers: vec!["Title".into(), "Author".into()],
            max_col_widths: vec![Some(10)],
            row_separators: false,
            max_rows: None,
        }
    }

    #[test]
    fn test_grid_render_truncates_and_aligns() {
        let table = render(&rows(), &two_columns(TableStyle::Grid));
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines[0], "+------------+--------+");
        assert_eq!(lines[1], "| Title      | Author |");
        assert_eq!(lines[2], "+============+========+");
        assert_eq!(lines[3], "| A rathe... | alice  |");
        assert_eq!(lines[4], "| Short      | bob    |");
        assert_eq!(lines[5], "+------------+--------+");
    }

    #[test]
    fn test_max_rows_limits_body() {
        let mut config = two_columns(TableStyle::Grid);
        config.max_rows = Some(1);
        let table = render(&rows(), &config);
        assert!(table.contains("A rathe..."));
        assert!(!table.contains("Short"));
    }

    #[test]
    fn test_fancy_grid_uses_box_drawing() {
        let mut config = two_columns(TableStyle::FancyGrid);
        config.row_separators = true;
        let table = render(&rows(), &config);
        assert!(table.starts_with('╒'));
        assert!(table.contains('├'));
        assert!(table.trim_end().ends_with('╛'));
    }

    #[test]
    fn test_missing_cells_render_empty() {
        let table = render(&[vec!["only title".into()]], &two_columns(TableStyle::Grid));
        assert!(table.contains("| only title |        |"));
    }
}
