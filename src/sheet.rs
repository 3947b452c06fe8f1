use anyhow::{anyhow, Context};
use calamine::{open_workbook_auto, Data, Reader};
use serde_json::{json, Map, Value};
use std::path::Path;

/// Reads the first worksheet of a spreadsheet into an ordered sequence of
/// flat field-name -> cell-value rows. The header row supplies the field
/// names; fully blank rows are skipped and never get a position.
pub fn read_rows(path: &Path) -> anyhow::Result<Vec<Value>> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("open spreadsheet {}", path.display()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("spreadsheet has no worksheets"))?
        .context("read first worksheet")?;

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(Vec::new());
    };
    let headers: Vec<String> = header
        .iter()
        .map(|c| c.to_string().trim().to_string())
        .collect();

    let mut out = Vec::new();
    for row in rows {
        let mut fields = Map::new();
        for (name, cell) in headers.iter().zip(row) {
            if name.is_empty() {
                continue;
            }
            if let Some(v) = cell_value(cell) {
                fields.insert(name.clone(), v);
            }
        }
        if fields.is_empty() {
            continue;
        }
        out.push(Value::Object(fields));
    }

    Ok(out)
}

// Cells keep their spreadsheet type; the validator owns stringification.
// Error cells degrade to their display text ("#DIV/0!" etc) so a broken
// formula reads as an invalid field value instead of aborting the parse.
fn cell_value(cell: &Data) -> Option<Value> {
    match cell {
        Data::Empty => None,
        Data::String(s) => Some(Value::String(s.clone())),
        Data::Int(i) => Some(json!(i)),
        Data::Float(f) => Some(json!(f)),
        Data::Bool(b) => Some(json!(b)),
        Data::DateTime(dt) => Some(json!(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(Value::String(s.clone())),
        Data::Error(e) => Some(Value::String(e.to_string())),
    }
}
