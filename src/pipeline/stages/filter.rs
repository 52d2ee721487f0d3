//! FilterStage: row filtering stage.
//!
//! Drops rows whose value in `column` fails the predicate. The buffer itself
//! is always forwarded, even when every row was dropped, so epoch framing is
//! untouched.

use crate::pipeline::buffer::DataBuffer;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::types::Value;
use std::fmt;

/// Row predicate applied to a single column value.
pub enum FilterPredicate {
    Equals(Value),
    NotEquals(Value),
    NotNull,
    Custom(Box<dyn Fn(&Value) -> bool + Send>),
}

impl FilterPredicate {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FilterPredicate::Equals(expected) => value == expected,
            FilterPredicate::NotEquals(expected) => value != expected,
            FilterPredicate::NotNull => !value.is_null(),
            FilterPredicate::Custom(f) => f(value),
        }
    }
}

impl fmt::Debug for FilterPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterPredicate::Equals(v) => write!(f, "== {}", v),
            FilterPredicate::NotEquals(v) => write!(f, "!= {}", v),
            FilterPredicate::NotNull => write!(f, "is not null"),
            FilterPredicate::Custom(_) => write!(f, "<custom>"),
        }
    }
}

/// Filter stage keeping rows where `predicate(row[column])` holds.
pub struct FilterStage {
    column: String,
    predicate: FilterPredicate,
    /// Rows dropped in the current epoch.
    dropped_epoch: u64,
    dropped_total: u64,
}

impl FilterStage {
    pub fn new(column: impl Into<String>, predicate: FilterPredicate) -> PipelineResult<Self> {
        let column = column.into();
        if column.is_empty() {
            return Err(PipelineError::Configuration(
                "filter: column name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            column,
            predicate,
            dropped_epoch: 0,
            dropped_total: 0,
        })
    }

    pub fn name(&self) -> &str {
        "Filter"
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn transform(&mut self, mut buffer: DataBuffer) -> PipelineResult<DataBuffer> {
        let index = buffer
            .column_map()
            .get(&self.column)
            .ok_or_else(|| PipelineError::ColumnNotFound {
                found: 0,
                expected: 1,
                missing: vec![self.column.clone()],
            })?;

        let before = buffer.num_rows();
        let map = buffer.column_map().clone();
        let kept: Vec<_> = buffer
            .take_rows()
            .into_iter()
            .filter(|row| row.get(index).is_some_and(|v| self.predicate.matches(v)))
            .collect();
        let dropped = (before - kept.len()) as u64;
        self.dropped_epoch += dropped;
        self.dropped_total += dropped;
        buffer.replace_contents(kept, map)?;
        Ok(buffer)
    }

    pub fn on_epoch_end(&mut self, epoch: u64) -> PipelineResult<()> {
        tracing::debug!(
            "Filter: epoch {} dropped {} rows on '{}'",
            epoch,
            self.dropped_epoch,
            self.column
        );
        self.dropped_epoch = 0;
        Ok(())
    }

    pub fn dropped_epoch(&self) -> u64 {
        self.dropped_epoch
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total
    }

    pub fn describe(&self) -> String {
        format!("Filter\n  {} {:?}", self.column, self.predicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::buffer::ColumnMap;

    fn labelled(labels: &[i64]) -> DataBuffer {
        let map = ColumnMap::from_names(&["id", "label"]).unwrap();
        let rows = labels
            .iter()
            .enumerate()
            .map(|(i, &l)| vec![Value::Int(i as i64), Value::Int(l)])
            .collect();
        DataBuffer::new(1, rows, map).unwrap()
    }

    #[test]
    fn test_filter_equals() {
        let mut stage = FilterStage::new("label", FilterPredicate::Equals(Value::Int(1))).unwrap();
        let out = stage.transform(labelled(&[0, 1, 1, 2])).unwrap();
        assert_eq!(out.num_rows(), 2);
        assert_eq!(stage.dropped_epoch(), 2);
        assert!(out.rows().iter().all(|r| r[1] == Value::Int(1)));
    }

    #[test]
    fn test_filter_custom_and_epoch_reset() {
        let mut stage = FilterStage::new(
            "label",
            FilterPredicate::Custom(Box::new(|v| v.as_int().is_some_and(|x| x > 0))),
        )
        .unwrap();
        stage.transform(labelled(&[0, 0, 3])).unwrap();
        assert_eq!(stage.dropped_epoch(), 2);
        stage.on_epoch_end(0).unwrap();
        assert_eq!(stage.dropped_epoch(), 0);
        assert_eq!(stage.dropped_total(), 2);
    }

    #[test]
    fn test_filter_all_rows_dropped_keeps_buffer() {
        let mut stage = FilterStage::new("label", FilterPredicate::Equals(Value::Int(9))).unwrap();
        let out = stage.transform(labelled(&[0, 1])).unwrap();
        assert_eq!(out.num_rows(), 0);
        assert_eq!(out.column_map().get("label"), Some(1));
    }

    #[test]
    fn test_filter_missing_column() {
        let mut stage = FilterStage::new("nope", FilterPredicate::NotNull).unwrap();
        let err = stage.transform(labelled(&[0])).unwrap_err();
        assert!(matches!(err, PipelineError::ColumnNotFound { .. }));
    }

    #[test]
    fn test_describe() {
        let stage = FilterStage::new("label", FilterPredicate::NotEquals(Value::Int(0))).unwrap();
        assert_eq!(stage.describe(), "Filter\n  label != 0");
    }
}
