//! Structural segmentation of normalized text into logical units.

use once_cell::sync::Lazy;
use regex::Regex;

static HEADER_LINE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^(#{1,6})\s+(\S.*)$").unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum UnitKind {
    Header { level: u8 },
    Table,
    Paragraph,
}

#[derive(Debug, Clone)]
pub(crate) struct Unit {
    pub kind: UnitKind,
    pub text: String,
}

/// A line that looks like a row of a table: tab-separated cells or a
/// markdown-style pipe row.
fn is_table_line(line: &str) -> bool {
    line.contains('\t') || line.matches('|').count() >= 2
}

pub(crate) fn segment(text: &str) -> Vec<Unit> {
    let mut units = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut table: Vec<&str> = Vec::new();

    let flush_paragraph = |buf: &mut Vec<&str>, units: &mut Vec<Unit>| {
        if !buf.is_empty() {
            units.push(Unit {
                kind: UnitKind::Paragraph,
                text: buf.join("\n"),
            });
            buf.clear();
        }
    };
    let flush_table = |buf: &mut Vec<&str>, units: &mut Vec<Unit>| {
        if !buf.is_empty() {
            units.push(Unit {
                kind: UnitKind::Table,
                text: buf.join("\n"),
            });
            buf.clear();
        }
    };

    for line in text.lines() {
        if line.trim().is_empty() {
            flush_table(&mut table, &mut units);
            flush_paragraph(&mut paragraph, &mut units);
            continue;
        }
        if let Some(caps) = HEADER_LINE.captures(line) {
            flush_table(&mut table, &mut units);
            flush_paragraph(&mut paragraph, &mut units);
            let level = caps[1].len().min(6) as u8;
            units.push(Unit {
                kind: UnitKind::Header { level },
                text: caps[2].trim().to_string(),
            });
            continue;
        }
        if is_table_line(line) {
            flush_paragraph(&mut paragraph, &mut units);
            table.push(line);
            continue;
        }
        flush_table(&mut table, &mut units);
        paragraph.push(line);
    }
    flush_table(&mut table, &mut units);
    flush_paragraph(&mut paragraph, &mut units);
    units
}
