//! Test data builders for creating test objects

use datapipe_rs::pipeline::{ColumnMap, DataBuffer, RenameStage};
use datapipe_rs::{Dataset, Value};
use std::sync::Arc;

/// Builder for data buffers with a named column layout.
pub struct BufferBuilder {
    id: u64,
    columns: Vec<String>,
    rows: usize,
}

impl BufferBuilder {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            columns: Vec::new(),
            rows: 1,
        }
    }

    /// Columns named in index order: `names[i]` maps to `i`.
    pub fn columns(mut self, names: &[&str]) -> Self {
        self.columns = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn rows(mut self, rows: usize) -> Self {
        self.rows = rows;
        self
    }

    /// Every field holds the buffer id, so rows can be traced end to end.
    pub fn build(self) -> DataBuffer {
        let width = self.columns.len();
        let map = ColumnMap::from_names(&self.columns).unwrap();
        let rows = (0..self.rows)
            .map(|_| vec![Value::Int(self.id as i64); width])
            .collect();
        DataBuffer::new(self.id, rows, map).unwrap()
    }
}

/// `n` rows of `(image, label)` with `label = i % classes`.
pub fn image_dataset(n: usize, classes: i64) -> Arc<Dataset> {
    let rows = (0..n)
        .map(|i| vec![Value::from(format!("{}.jpg", i)), Value::Int(i as i64 % classes)])
        .collect();
    Arc::new(Dataset::new(vec!["image".into(), "label".into()], rows).unwrap())
}

pub fn rename(from: &[&str], to: &[&str]) -> RenameStage {
    RenameStage::new(
        from.iter().map(|s| s.to_string()).collect(),
        to.iter().map(|s| s.to_string()).collect(),
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_builder() {
        let buf = BufferBuilder::new(7).columns(&["a", "b"]).rows(3).build();
        assert_eq!(buf.id(), 7);
        assert_eq!(buf.num_rows(), 3);
        assert_eq!(buf.column_map().get("b"), Some(1));
    }
}
