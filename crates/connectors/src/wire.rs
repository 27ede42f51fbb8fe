//! CSV encoding used by the bulk APIs, for both uploads and result sets.

use model::records::record::Record;
use serde_json::Value;

/// Placeholder the bulk API interprets as "set this field to null".
pub const NULL_SENTINEL: &str = "#N/A";

/// Text form of a value inside a CSV cell. Nulls become empty cells.
pub fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn write_row<I, T>(row: I) -> Result<Vec<u8>, csv::Error>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(row)?;
    writer.into_inner().map_err(|e| e.into_error().into())
}

pub fn encode_header(columns: &[String]) -> Result<Vec<u8>, csv::Error> {
    write_row(columns)
}

pub fn encode_row(columns: &[String], record: &Record) -> Result<Vec<u8>, csv::Error> {
    write_row(columns.iter().map(|c| cell(record.value(c))))
}

/// Header line followed by one line per record.
pub fn encode(columns: &[String], records: &[Record]) -> Result<Vec<u8>, csv::Error> {
    let mut out = encode_header(columns)?;
    for record in records {
        out.extend(encode_row(columns, record)?);
    }
    Ok(out)
}

/// Parses a CSV result set with a header line. Empty cells decode as null.
pub fn decode(bytes: &[u8]) -> Result<Vec<Record>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes);
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let mut record = Record::new();
        for (name, raw) in headers.iter().zip(row.iter()) {
            let value = if raw.is_empty() {
                Value::Null
            } else {
                Value::String(raw.to_string())
            };
            record.set(name, value);
        }
        records.push(record);
    }
    Ok(records)
}
