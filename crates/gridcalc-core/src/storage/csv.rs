//! CSV import/export functionality

use crate::document::Document;
use crate::error::{GridcalcError, Result};
use gridcalc_engine::engine::{CellRange, CellRef, CellValue};
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// Import a CSV file with its first field at `anchor`. Returns the number of
/// cells written. The freshly loaded document counts as unmodified.
pub fn import_csv(doc: &mut Document, path: &Path, anchor: CellRef) -> Result<usize> {
    let content = std::fs::read_to_string(path)?;
    let written = import_csv_str(doc, &content, anchor)?;
    doc.modified = false;
    Ok(written)
}

/// Import CSV text with its first field at `anchor`.
///
/// Every field goes through [`Document::on_cell_edited`], so `=` fields become
/// formulas and dependents are recalculated. Quoted fields may span lines.
/// Blank lines are skipped but still advance the row. Anything falling outside
/// the grid is dropped.
pub fn import_csv_str(doc: &mut Document, content: &str, anchor: CellRef) -> Result<usize> {
    let records = parse_csv(content)?;
    let mut written = 0;
    let mut clipped = 0;

    for (row_idx, record) in records.iter().enumerate() {
        for (col_idx, field) in record.fields.iter().enumerate() {
            let cell_ref = CellRef::new(anchor.col + col_idx, anchor.row + row_idx);
            if !doc.contains(&cell_ref) {
                clipped += 1;
                continue;
            }
            match doc.on_cell_edited(cell_ref, field) {
                Ok(_) => written += 1,
                Err(GridcalcError::CycleDetected(path)) => {
                    warn!(cell = %cell_ref, line = record.line, cycle_len = path.len(), "skipped circular formula in CSV");
                }
                Err(e) => return Err(e),
            }
        }
    }

    if clipped > 0 {
        warn!(clipped, "CSV fields outside the grid were dropped");
    }
    debug!(written, records = records.len(), anchor = %anchor, "imported CSV");
    Ok(written)
}

/// One CSV record. A blank line is a record with no fields.
#[derive(Debug, PartialEq)]
pub(crate) struct Record {
    /// Line the record starts on, 1-based.
    pub line: usize,
    pub fields: Vec<String>,
}

/// Split CSV text into records, handling quoted fields.
///
/// Quoted fields may contain commas, `""` escapes and line breaks. Fields are
/// not trimmed. `\r\n` outside quotes ends a record like `\n`.
pub(crate) fn parse_csv(content: &str) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut blank = true;
    let mut line = 1;
    let mut start_line = 1;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                // Escaped quote
                '"' if chars.peek() == Some(&'"') => {
                    current.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => {
                    if c == '\n' {
                        line += 1;
                    }
                    current.push(c);
                }
            }
            continue;
        }

        match c {
            '"' => {
                in_quotes = true;
                blank = false;
            }
            ',' => {
                fields.push(std::mem::take(&mut current));
                blank = false;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                fields.push(std::mem::take(&mut current));
                records.push(finish_record(start_line, std::mem::take(&mut fields), blank));
                line += 1;
                start_line = line;
                blank = true;
            }
            _ => {
                if !c.is_whitespace() {
                    blank = false;
                }
                current.push(c);
            }
        }
    }

    if in_quotes {
        return Err(GridcalcError::Parse {
            line: start_line,
            message: "unterminated quoted field".to_string(),
        });
    }
    if !(blank && fields.is_empty() && current.is_empty()) {
        fields.push(current);
        records.push(finish_record(start_line, fields, blank));
    }
    Ok(records)
}

fn finish_record(line: usize, fields: Vec<String>, blank: bool) -> Record {
    Record {
        line,
        fields: if blank { Vec::new() } else { fields },
    }
}

/// Write display values of `range` (default: the used range) as CSV.
pub fn write_csv<W: Write>(out: &mut W, doc: &Document, range: Option<CellRange>) -> Result<()> {
    let range = match range.or_else(|| doc.used_range()) {
        Some(range) => range,
        // Empty grid
        None => return Ok(()),
    };
    let Some(range) = doc.clip(&range) else {
        return Ok(());
    };

    for row in range.start.row..=range.end.row {
        let row_fields: Vec<String> = (range.start.col..=range.end.col)
            .map(|col| {
                let value = doc.value(&CellRef::new(col, row)).unwrap_or_default();
                escape_csv_field(&value)
            })
            .collect();
        writeln!(out, "{}", row_fields.join(","))?;
    }

    Ok(())
}

/// Export grid data to a CSV file using display values, then mark the
/// document as saved.
pub fn export_csv(path: &Path, doc: &mut Document, range: Option<CellRange>) -> Result<()> {
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    write_csv(&mut file, doc, range)?;
    file.flush()?;
    doc.modified = false;
    Ok(())
}

/// Escape a value for CSV output
fn escape_csv_field(value: &CellValue) -> String {
    let field = value.as_text();

    // Guard against CSV formula injection in spreadsheet apps.
    let safe_field = match value {
        CellValue::Text(text) => {
            let first_non_space = text.trim_start_matches([' ', '\t']).chars().next();
            if matches!(first_non_space, Some('=' | '+' | '-' | '@')) {
                format!("'{}", field)
            } else {
                field
            }
        }
        _ => field,
    };

    if safe_field.contains(',')
        || safe_field.contains('"')
        || safe_field.contains('\n')
        || safe_field.contains('\r')
    {
        format!("\"{}\"", safe_field.replace('"', "\"\""))
    } else {
        safe_field
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(name: &str) -> CellRef {
        CellRef::from_str(name).unwrap()
    }

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn export_to_string(doc: &Document, range: Option<CellRange>) -> String {
        let mut out = Vec::new();
        write_csv(&mut out, doc, range).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn fields(content: &str) -> Vec<String> {
        let mut records = parse_csv(content).unwrap();
        assert_eq!(records.len(), 1, "expected one record in {:?}", content);
        records.remove(0).fields
    }

    #[test]
    fn test_parse_csv_simple() {
        assert_eq!(fields("a,b,c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_parse_csv_quoted() {
        assert_eq!(fields(r#"a,"hello, world",c"#), vec!["a", "hello, world", "c"]);
    }

    #[test]
    fn test_parse_csv_keeps_whitespace() {
        assert_eq!(
            fields(r#" a ,"  keep me  ",x"#),
            vec![" a ", "  keep me  ", "x"]
        );
    }

    #[test]
    fn test_parse_csv_escaped_quotes() {
        assert_eq!(fields(r#"a,"say ""hello""",c"#), vec!["a", r#"say "hello""#, "c"]);
    }

    #[test]
    fn test_parse_csv_trailing_and_empty_fields() {
        assert_eq!(fields("a,,b,"), vec!["a", "", "b", ""]);
        assert_eq!(fields(r#""""#), vec![""]);
        assert!(matches!(
            parse_csv(r#"a,"open"#),
            Err(GridcalcError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_parse_csv_quoted_line_breaks() {
        let records = parse_csv("a,\"two\nlines\",b\r\nc,\"x\r\ny\"\n\n d\n").unwrap();
        assert_eq!(
            records,
            vec![
                Record { line: 1, fields: vec!["a".into(), "two\nlines".into(), "b".into()] },
                Record { line: 3, fields: vec!["c".into(), "x\r\ny".into()] },
                Record { line: 5, fields: vec![] },
                Record { line: 6, fields: vec![" d".into()] },
            ]
        );
    }

    #[test]
    fn test_parse_csv_unterminated_quote_reports_start_line() {
        let err = parse_csv("ok\n\"starts here\nand never\nends").unwrap_err();
        assert!(matches!(err, GridcalcError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_escape_csv_field() {
        assert_eq!(escape_csv_field(&text("simple")), "simple");
        assert_eq!(escape_csv_field(&text("with,comma")), "\"with,comma\"");
        assert_eq!(escape_csv_field(&text("with\"quote")), "\"with\"\"quote\"");
        assert_eq!(escape_csv_field(&text("two\nlines")), "\"two\nlines\"");
        assert_eq!(escape_csv_field(&CellValue::Empty), "");
        assert_eq!(escape_csv_field(&CellValue::Error), "#ERROR");
    }

    #[test]
    fn test_escape_csv_field_formula_injection() {
        assert_eq!(escape_csv_field(&text("=1+1")), "'=1+1");
        assert_eq!(escape_csv_field(&text(" =1+1")), "' =1+1");
        assert_eq!(escape_csv_field(&text("\t-2+3")), "'\t-2+3");
        assert_eq!(escape_csv_field(&text("@cmd,x")), "\"'@cmd,x\"");
        // Numbers are not text, so a negative stays as-is.
        assert_eq!(escape_csv_field(&CellValue::Number(-3.0)), "-3");
    }

    #[test]
    fn test_import_places_fields_at_anchor() {
        let mut doc = Document::with_dimensions(5, 5);
        let written = import_csv_str(&mut doc, "1,2\n\n\"a,b\",x", r("B2")).unwrap();
        assert_eq!(written, 4);
        assert_eq!(doc.value(&r("B2")), Some(text("1")));
        assert_eq!(doc.value(&r("C2")), Some(text("2")));
        // The blank line still used up row 3.
        assert_eq!(doc.value(&r("B3")), Some(CellValue::Empty));
        assert_eq!(doc.value(&r("B4")), Some(text("a,b")));
        assert_eq!(doc.value(&r("C4")), Some(text("x")));
    }

    #[test]
    fn test_import_clips_to_grid() {
        let mut doc = Document::with_dimensions(2, 2);
        let written = import_csv_str(&mut doc, "a,b,c\nd,e,f\ng,h,i", r("A1")).unwrap();
        assert_eq!(written, 4);
        assert_eq!(doc.display(&r("B2")), "e");
    }

    #[test]
    fn test_import_formulas_and_recalculates_dependents() {
        let mut doc = Document::new();
        doc.on_cell_edited(r("C1"), "=A1+B1").unwrap();
        import_csv_str(&mut doc, "5,=A1*2", r("A1")).unwrap();
        assert_eq!(doc.value(&r("B1")), Some(CellValue::Number(10.0)));
        assert_eq!(doc.value(&r("C1")), Some(CellValue::Number(15.0)));
    }

    #[test]
    fn test_import_skips_circular_field() {
        let mut doc = Document::with_dimensions(3, 1);
        let written = import_csv_str(&mut doc, "=B1,=A1,ok", r("A1")).unwrap();
        assert_eq!(written, 2);
        assert_eq!(doc.get_cell(&r("B1")).unwrap().formula, None);
        assert_eq!(doc.display(&r("C1")), "ok");
    }

    #[test]
    fn test_import_reports_unterminated_quote() {
        let mut doc = Document::new();
        let err = import_csv_str(&mut doc, "a\n\"b,c", r("A1")).unwrap_err();
        assert!(matches!(err, GridcalcError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_export_uses_display_values_of_used_range() {
        let mut doc = Document::new();
        doc.on_cell_edited(r("B2"), "=1+2").unwrap();
        doc.on_cell_edited(r("C2"), "text").unwrap();
        doc.on_cell_edited(r("C3"), "=1/0").unwrap();
        assert_eq!(export_to_string(&doc, None), "3,text\n,#ERROR\n");
    }

    #[test]
    fn test_export_explicit_range() {
        let mut doc = Document::new();
        doc.on_cell_edited(r("A1"), "=\"=cmd\"").unwrap();
        doc.on_cell_edited(r("A2"), "plain").unwrap();
        let range = CellRange::parse("A1:B1").unwrap();
        assert_eq!(export_to_string(&doc, Some(range)), "'=cmd,\n");
    }

    #[test]
    fn test_export_empty_grid_writes_nothing() {
        let doc = Document::new();
        assert_eq!(export_to_string(&doc, None), "");
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sheet.csv");

        let mut doc = Document::new();
        doc.on_cell_edited(r("A1"), "name").unwrap();
        doc.on_cell_edited(r("B1"), "say \"hi\", then go").unwrap();
        doc.on_cell_edited(r("A2"), "=6*7").unwrap();
        assert!(doc.modified);
        export_csv(&path, &mut doc, None).unwrap();
        assert!(!doc.modified);

        let mut copy = Document::new();
        let written = import_csv(&mut copy, &path, r("A1")).unwrap();
        assert_eq!(written, 4);
        assert!(!copy.modified);
        assert_eq!(copy.display(&r("B1")), "say \"hi\", then go");
        assert_eq!(copy.display(&r("A2")), "42");
        assert_eq!(copy.get_cell(&r("A2")).unwrap().formula, None);
    }

    #[test]
    fn test_multiline_field_round_trip() {
        let mut doc = Document::with_dimensions(3, 3);
        doc.on_cell_edited(r("A1"), "two\nlines").unwrap();
        doc.on_cell_edited(r("B1"), "after").unwrap();
        doc.on_cell_edited(r("A2"), "\"quoted\"\r\nbreak, comma").unwrap();
        doc.on_cell_edited(r("B2"), "next row").unwrap();
        let csv = export_to_string(&doc, None);

        let mut copy = Document::with_dimensions(3, 3);
        assert_eq!(import_csv_str(&mut copy, &csv, r("A1")).unwrap(), 4);
        for name in ["A1", "B1", "A2", "B2"] {
            assert_eq!(copy.value(&r(name)), doc.value(&r(name)), "{}", name);
        }
        assert_eq!(copy.value(&r("A3")), Some(CellValue::Empty));
    }
}
