//! Minimal CSV reading and writing (quotes and CRLF tolerant).

use std::io::{self, Write};
use std::mem::take;

/// Parse comma separated text into rows of fields.
///
/// Blank lines are skipped. An unterminated quote swallows the rest of the
/// input into the last field.
#[must_use]
pub fn parse_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut field = String::new();
    let mut row = Vec::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes {
                    if matches!(chars.peek(), Some('"')) {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                } else {
                    in_quotes = true;
                }
            }
            ',' if !in_quotes => row.push(take(&mut field)),
            '\n' | '\r' if !in_quotes => {
                if ch == '\r' && matches!(chars.peek(), Some('\n')) {
                    chars.next();
                }
                row.push(take(&mut field));
                if row.len() == 1 && row[0].is_empty() {
                    row.clear();
                } else {
                    rows.push(take(&mut row));
                }
            }
            _ => field.push(ch),
        }
    }

    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    rows
}

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Write one row, quoting fields that need it.
pub fn write_row<W: Write, S: AsRef<str>>(w: &mut W, row: &[S]) -> io::Result<()> {
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            w.write_all(b",")?;
        }
        let cell = cell.as_ref();
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            w.write_all(cell.as_bytes())?;
        }
    }
    w.write_all(b"\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rows_handles_quotes_and_crlf() {
        let rows = parse_rows("a,b\r\n\"x, y\",\"he said \"\"hi\"\"\"\n\nlast,");
        assert_eq!(
            rows,
            vec![
                vec!["a".to_string(), "b".to_string()],
                vec!["x, y".to_string(), "he said \"hi\"".to_string()],
                vec!["last".to_string(), String::new()],
            ]
        );
    }

    #[test]
    fn test_write_row_quotes_when_needed() {
        let mut out = Vec::new();
        write_row(&mut out, &["plain", "with,comma", "with \"quote\""]).expect("write row");
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "plain,\"with,comma\",\"with \"\"quote\"\"\"\n"
        );
    }

    #[test]
    fn test_written_rows_parse_back() {
        let mut out = Vec::new();
        write_row(&mut out, &["postal_code", "totalcount"]).expect("write header");
        write_row(&mut out, &["K1A0", "-1"]).expect("write row");
        let rows = parse_rows(&String::from_utf8(out).expect("utf8"));
        assert_eq!(rows[1], vec!["K1A0".to_string(), "-1".to_string()]);
    }
}
