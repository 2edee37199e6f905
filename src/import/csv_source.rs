//! Parses tabular CSV input into [`ParsedRecord`]s for the import engine
//! (C9). Column convention: `identifier` and `template` are reserved names;
//! `delete:<path>` marks a field for deletion, `array_add:<path>` /
//! `array_remove:<path>` drive array operations, and every other column is
//! a front-matter dotted path whose value is type-inferred the way the
//! teacher's CSV importer infers BSON field types.
//!
//! Grounded on the teacher's `import::csv::import_csv` (header handling,
//! per-row error isolation via `skip_errors`/row counting).

use std::io::Read;

use crate::import::{ArrayOp, ParsedRecord};
use crate::page::{FrontMatter, Value};

const IDENTIFIER_COLUMN: &str = "identifier";
const TEMPLATE_COLUMN: &str = "template";
const DELETE_PREFIX: &str = "delete:";
const ARRAY_ADD_PREFIX: &str = "array_add:";
const ARRAY_REMOVE_PREFIX: &str = "array_remove:";

/// Parse every row of `reader` as a CSV with headers, returning one
/// [`ParsedRecord`] per row (including rows that fail to parse, which carry
/// a `validationErrors` entry instead of being dropped).
///
/// # Errors
/// Returns an error only if the header row itself cannot be read.
pub fn parse_records<R: Read>(reader: R) -> Result<Vec<ParsedRecord>, csv::Error> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();

    let mut records = Vec::new();
    for (row_number, row) in rdr.records().enumerate() {
        let row_number = row_number + 1;
        match row {
            Ok(row) => records.push(record_from_row(row_number, &headers, &row)),
            Err(e) => records.push(ParsedRecord {
                row_number,
                identifier: String::new(),
                template: None,
                front_matter: FrontMatter::new(),
                fields_to_delete: Vec::new(),
                array_ops: Vec::new(),
                validation_errors: vec![e.to_string()],
            }),
        }
    }
    Ok(records)
}

fn record_from_row(row_number: usize, headers: &[String], row: &csv::StringRecord) -> ParsedRecord {
    let mut identifier = None;
    let mut template = None;
    let mut front_matter = FrontMatter::new();
    let mut fields_to_delete = Vec::new();
    let mut array_ops = Vec::new();

    for (column, field) in headers.iter().zip(row.iter()) {
        if column == IDENTIFIER_COLUMN {
            identifier = Some(field.to_string());
        } else if column == TEMPLATE_COLUMN {
            if !field.is_empty() {
                template = Some(field.to_string());
            }
        } else if let Some(path) = column.strip_prefix(DELETE_PREFIX) {
            if field.eq_ignore_ascii_case("true") {
                fields_to_delete.push(path.to_string());
            }
        } else if let Some(path) = column.strip_prefix(ARRAY_ADD_PREFIX) {
            if !field.is_empty() {
                array_ops.push(ArrayOp::EnsureExists { path: path.to_string(), value: field.to_string() });
            }
        } else if let Some(path) = column.strip_prefix(ARRAY_REMOVE_PREFIX) {
            if !field.is_empty() {
                array_ops.push(ArrayOp::DeleteValue { path: path.to_string(), value: field.to_string() });
            }
        } else if !field.is_empty() {
            let _ = front_matter.set_path(column, infer_value(field));
        }
    }

    let mut validation_errors = Vec::new();
    let identifier = identifier.unwrap_or_default();
    if identifier.is_empty() {
        validation_errors.push(format!("row {row_number}: missing '{IDENTIFIER_COLUMN}' column"));
    }

    ParsedRecord { row_number, identifier, template, front_matter, fields_to_delete, array_ops, validation_errors }
}

/// Infer bool/int/float/string the way the teacher's `field_to_bson` does,
/// narrowed to the scalar [`Value`] kinds front matter supports.
fn infer_value(field: &str) -> Value {
    if field.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if field.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if let Ok(i) = field.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(f) = field.parse::<f64>() {
        return Value::Float(f);
    }
    Value::String(field.to_string())
}
