//! CSV extraction

use super::text::decode_bytes;
use super::{ExtractedDocument, ExtractedTable};

pub(super) fn extract(bytes: &[u8], filename: &str) -> ExtractedDocument {
    let mut doc = ExtractedDocument::new("csv");

    let (decoded, encoding, malformed) = decode_bytes(bytes);
    if malformed {
        doc.warn(format!(
            "Malformed byte sequences replaced while decoding as {encoding}"
        ));
    }
    doc.set_meta("encoding", encoding);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(decoded.as_bytes());

    let mut records: Vec<Vec<String>> = Vec::new();
    for result in reader.records() {
        match result {
            Ok(record) => records.push(record.iter().map(str::to_string).collect()),
            Err(e) => doc.warn(format!("Skipped malformed CSV record: {e}")),
        }
    }

    if records.is_empty() {
        doc.warn("CSV contained no parseable records");
        return doc;
    }

    let rows = records.len();
    let cols = records.iter().map(Vec::len).max().unwrap_or(0);

    // Linear text: tab-joined rows, one per line
    doc.text = records
        .iter()
        .map(|row| row.join("\t"))
        .collect::<Vec<_>>()
        .join("\n");

    // Table: clean CSV re-serialization of what we actually parsed
    let name = filename
        .rsplit('/')
        .next()
        .unwrap_or(filename)
        .trim_end_matches(".csv")
        .to_string();
    doc.tables.push(ExtractedTable {
        name,
        rows,
        cols,
        csv: to_csv(&records),
    });
    doc
}

fn to_csv(records: &[Vec<String>]) -> String {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    for row in records {
        // Writing to a Vec<u8> cannot fail for I/O reasons
        let _ = writer.write_record(row);
    }
    writer
        .into_inner()
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ragged_rows_are_tolerated() {
        let doc = extract(b"a,b,c\nd,e\nf,g,h,i\n", "data/ragged.csv");
        assert_eq!(doc.tables.len(), 1);
        let table = &doc.tables[0];
        assert_eq!(table.name, "ragged");
        assert_eq!(table.rows, 3);
        assert_eq!(table.cols, 4);
    }

    #[test]
    fn csv_repr_round_trips_cells_with_commas() {
        let doc = extract(b"\"x, y\",z\n", "pairs.csv");
        assert!(doc.tables[0].csv.contains("\"x, y\""));
    }
}
