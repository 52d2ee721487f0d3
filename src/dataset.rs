//! In-memory datasets and JSON-lines loading.
//!
//! A [`Dataset`] is a fixed list of column names plus rows. It is the input
//! the pipeline's [`DatasetSource`] slices into buffers.
//!
//! # JSON lines
//!
//! One JSON object per line. Columns are taken from the first object's keys
//! (sorted); later objects may omit keys (filled with `null`) but must not
//! introduce new ones.
//!
//! [`DatasetSource`]: crate::pipeline::DatasetSource

use crate::error::{DataPipeError, Result};
use crate::types::{Row, Value};
use std::collections::HashSet;
use std::io::BufRead;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Dataset {
    /// Build a dataset, checking every row has one field per column.
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Result<Self> {
        let mut seen = HashSet::new();
        if let Some(dup) = columns.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(DataPipeError::Dataset(format!("duplicate column '{}'", dup)));
        }
        if let Some(pos) = rows.iter().position(|r| r.len() != columns.len()) {
            return Err(DataPipeError::Dataset(format!(
                "row {} has {} fields, expected {}",
                pos,
                rows[pos].len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Load a JSON-lines file.
    pub fn load_json_lines(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            DataPipeError::Dataset(format!("Failed to open dataset {:?}: {}", path, e))
        })?;
        let dataset = Self::read_json_lines(std::io::BufReader::new(file))?;
        tracing::info!(
            "Loaded dataset {:?}: {} rows x {} columns",
            path,
            dataset.len(),
            dataset.columns.len()
        );
        Ok(dataset)
    }

    pub fn read_json_lines(reader: impl BufRead) -> Result<Self> {
        let mut columns: Option<Vec<String>> = None;
        let mut rows = Vec::new();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&line)
                .map_err(|e| DataPipeError::Serialization(format!("line {}: {}", line_no + 1, e)))?;

            let cols = columns.get_or_insert_with(|| {
                let mut keys: Vec<String> = object.keys().cloned().collect();
                keys.sort();
                keys
            });

            if let Some(extra) = object.keys().find(|k| !cols.contains(k)) {
                return Err(DataPipeError::Dataset(format!(
                    "line {}: unknown column '{}'",
                    line_no + 1,
                    extra
                )));
            }

            let mut row = Row::with_capacity(cols.len());
            for name in cols.iter() {
                let value = match object.get(name) {
                    Some(v) => serde_json::from_value::<Value>(v.clone()).map_err(|e| {
                        DataPipeError::Serialization(format!("line {}: {}", line_no + 1, e))
                    })?,
                    None => Value::Null,
                };
                row.push(value);
            }
            rows.push(row);
        }

        Self::new(columns.unwrap_or_default(), rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_json_lines() {
        let text = r#"{"label": 1, "image": "a.jpg"}

{"image": "b.jpg"}
"#;
        let ds = Dataset::read_json_lines(text.as_bytes()).unwrap();
        assert_eq!(ds.columns(), &["image".to_string(), "label".to_string()]);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.rows()[0], vec![Value::from("a.jpg"), Value::Int(1)]);
        assert_eq!(ds.rows()[1], vec![Value::from("b.jpg"), Value::Null]);
    }

    #[test]
    fn test_read_json_lines_unknown_column() {
        let text = "{\"a\": 1}\n{\"b\": 2}\n";
        let err = Dataset::read_json_lines(text.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("unknown column 'b'"));
    }

    #[test]
    fn test_read_json_lines_bad_json() {
        let err = Dataset::read_json_lines("{not json".as_bytes()).unwrap_err();
        assert!(matches!(err, DataPipeError::Serialization(_)));
    }

    #[test]
    fn test_new_checks_width() {
        let err = Dataset::new(vec!["a".into(), "b".into()], vec![vec![Value::Int(1)]]);
        assert!(err.is_err());
        assert!(Dataset::new(vec!["a".into(), "a".into()], Vec::new()).is_err());
    }

    #[test]
    fn test_load_json_lines_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{\"x\": 1.5}}").unwrap();
        writeln!(file, "{{\"x\": 2.5}}").unwrap();
        let ds = Dataset::load_json_lines(file.path()).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.rows()[1][0], Value::Float(2.5));
    }
}
