//! Plain-text rendering of result rows, one aligned column per field.

use crate::state::CellValue;
use itertools::Itertools;

/// Render rows as an aligned text table with a header line. Numeric columns
/// are right-aligned, text columns left-aligned.
pub fn format_table(columns: &[String], rows: &[Vec<CellValue>]) -> String {
    let rendered: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(idx, header)| {
            rendered
                .iter()
                .filter_map(|row| row.get(idx))
                .map(|cell| cell.chars().count())
                .chain(std::iter::once(header.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let numeric: Vec<bool> = (0..columns.len())
        .map(|idx| {
            rows.iter().all(|row| {
                matches!(
                    row.get(idx),
                    Some(CellValue::Integer(_)) | Some(CellValue::Real(_)) | Some(CellValue::Null) | None
                )
            })
        })
        .collect();

    let align = |text: &str, idx: usize| -> String {
        let width = widths[idx];
        if numeric[idx] {
            format!("{:>width$}", text, width = width)
        } else {
            format!("{:<width$}", text, width = width)
        }
    };

    let header = columns
        .iter()
        .enumerate()
        .map(|(idx, name)| align(name, idx))
        .join("  ");

    let body = rendered.iter().map(|row| {
        (0..columns.len())
            .map(|idx| align(row.get(idx).map(String::as_str).unwrap_or(""), idx))
            .join("  ")
            .trim_end()
            .to_string()
    });

    std::iter::once(header.trim_end().to_string())
        .chain(body)
        .join("\n")
}
