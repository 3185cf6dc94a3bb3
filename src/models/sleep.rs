use serde_json::{Map, Value};

use crate::error::{AppError, AppResult};

/// Key holding the per-night records in the provider payload
pub const SLEEP_RECORDS_KEY: &str = "sleep";

/// Sleep records laid out as rows (nights) by columns (provider metrics).
///
/// Columns are the union of record keys in first-seen order. A record that
/// lacks a column gets `Value::Null` in that cell.
#[derive(Debug, Clone, PartialEq)]
pub struct SleepTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl SleepTable {
    /// Parse a raw provider response body
    pub fn from_payload(body: &str) -> AppResult<Self> {
        let payload: Value = serde_json::from_str(body)
            .map_err(|e| AppError::MalformedResponse(format!("Response is not JSON: {}", e)))?;

        let records = payload
            .get(SLEEP_RECORDS_KEY)
            .and_then(Value::as_array)
            .ok_or_else(|| {
                AppError::MalformedResponse(format!(
                    "Response has no '{}' array",
                    SLEEP_RECORDS_KEY
                ))
            })?;

        let records = records
            .iter()
            .enumerate()
            .map(|(idx, record)| {
                record.as_object().ok_or_else(|| {
                    AppError::MalformedResponse(format!("Sleep record {} is not an object", idx))
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Self::from_records(&records))
    }

    pub fn from_records(records: &[&Map<String, Value>]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in records {
            for key in record.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Cells of one column, top to bottom
    pub fn column(&self, idx: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().map(move |row| &row[idx])
    }

    /// Serialize as CSV: an unnamed leading index column, then one column per metric
    pub fn to_csv(&self) -> AppResult<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        let mut header = Vec::with_capacity(self.columns.len() + 1);
        header.push(String::new());
        header.extend(self.columns.iter().cloned());
        writer.write_record(&header)?;

        for (idx, row) in self.rows.iter().enumerate() {
            let mut record = Vec::with_capacity(row.len() + 1);
            record.push(idx.to_string());
            record.extend(row.iter().map(cell_text));
            writer.write_record(&record)?;
        }

        writer
            .into_inner()
            .map_err(|e| AppError::Internal(format!("Failed to flush CSV buffer: {}", e)))
    }
}

/// Textual form of a cell; null becomes an empty cell
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
