//! RenameStage: column renaming stage.
//!
//! Rewrites the column map of every data buffer: each column listed in
//! `in_columns` is re-keyed to the paired name in `out_columns`; all other
//! columns pass through. Row payloads are never touched.

use crate::config::RuntimeConfig;
use crate::pipeline::buffer::{ColumnMap, DataBuffer};
use crate::pipeline::error::{PipelineError, PipelineResult};
use std::collections::{HashMap, HashSet};
use std::fmt::Write;

/// Builder for [`RenameStage`].
///
/// The connector capacity defaults to the runtime configuration's value and
/// can be overridden per stage.
#[derive(Debug, Clone)]
pub struct RenameStageBuilder {
    in_columns: Vec<String>,
    out_columns: Vec<String>,
    connector_capacity: usize,
}

impl RenameStageBuilder {
    pub fn new(runtime: &RuntimeConfig) -> Self {
        Self {
            in_columns: Vec::new(),
            out_columns: Vec::new(),
            connector_capacity: runtime.connector_capacity,
        }
    }

    pub fn in_columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.in_columns = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn out_columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.out_columns = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn connector_capacity(mut self, capacity: usize) -> Self {
        self.connector_capacity = capacity;
        self
    }

    fn sanity_check(&self) -> PipelineResult<()> {
        if self.in_columns.len() != self.out_columns.len() {
            return Err(PipelineError::Configuration(format!(
                "rename: {} in columns but {} out columns",
                self.in_columns.len(),
                self.out_columns.len()
            )));
        }
        if self.connector_capacity == 0 {
            return Err(PipelineError::Configuration(
                "rename: connector capacity must be at least 1".to_string(),
            ));
        }
        if self
            .in_columns
            .iter()
            .chain(&self.out_columns)
            .any(|name| name.is_empty())
        {
            return Err(PipelineError::Configuration(
                "rename: column names must not be empty".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for name in &self.in_columns {
            if !seen.insert(name.as_str()) {
                return Err(PipelineError::Configuration(format!(
                    "rename: column '{}' listed more than once in in_columns",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn build(self) -> PipelineResult<RenameStage> {
        self.sanity_check()?;
        RenameStage::from_parts(
            self.in_columns,
            self.out_columns,
            Some(self.connector_capacity),
        )
    }
}

/// Stateless stage renaming columns position-by-position.
#[derive(Debug, Clone)]
pub struct RenameStage {
    in_columns: Vec<String>,
    out_columns: Vec<String>,
    /// `in_columns[i]` -> `i`
    lookup: HashMap<String, usize>,
    connector_capacity: Option<usize>,
    buffers_renamed: u64,
}

impl RenameStage {
    /// Create a rename stage using the pipeline's default connector capacity.
    pub fn new(in_columns: Vec<String>, out_columns: Vec<String>) -> PipelineResult<Self> {
        Self::from_parts(in_columns, out_columns, None)
    }

    pub fn builder(runtime: &RuntimeConfig) -> RenameStageBuilder {
        RenameStageBuilder::new(runtime)
    }

    fn from_parts(
        in_columns: Vec<String>,
        out_columns: Vec<String>,
        connector_capacity: Option<usize>,
    ) -> PipelineResult<Self> {
        if in_columns.len() != out_columns.len() {
            return Err(PipelineError::Configuration(format!(
                "rename: {} in columns but {} out columns",
                in_columns.len(),
                out_columns.len()
            )));
        }
        let mut lookup = HashMap::with_capacity(in_columns.len());
        for (i, name) in in_columns.iter().enumerate() {
            if lookup.insert(name.clone(), i).is_some() {
                return Err(PipelineError::Configuration(format!(
                    "rename: column '{}' listed more than once in in_columns",
                    name
                )));
            }
        }
        Ok(Self {
            in_columns,
            out_columns,
            lookup,
            connector_capacity,
            buffers_renamed: 0,
        })
    }

    pub fn name(&self) -> &str {
        "Rename"
    }

    pub fn in_columns(&self) -> &[String] {
        &self.in_columns
    }

    pub fn out_columns(&self) -> &[String] {
        &self.out_columns
    }

    /// Capacity requested for this stage's output connector, if overridden.
    pub fn connector_capacity(&self) -> Option<usize> {
        self.connector_capacity
    }

    /// Compute the renamed map without touching `map`.
    pub fn rename_map(&self, map: &ColumnMap) -> PipelineResult<ColumnMap> {
        let mut found = 0;
        for (name, index) in map.iter() {
            if self.lookup.contains_key(name) {
                found += 1;
            } else {
                tracing::trace!("Rename: column '{}' (index {}) passes through", name, index);
            }
        }

        if found != self.in_columns.len() {
            let missing: Vec<String> = self
                .in_columns
                .iter()
                .filter(|name| !map.contains(name))
                .cloned()
                .collect();
            tracing::debug!(
                "Rename: matched {} of {} columns, missing {:?}",
                found,
                self.in_columns.len(),
                missing
            );
            return Err(PipelineError::ColumnNotFound {
                found,
                expected: self.in_columns.len(),
                missing,
            });
        }

        let mut renamed = ColumnMap::new();
        for (name, index) in map.iter() {
            match self.lookup.get(name) {
                Some(&pos) => {
                    tracing::trace!(
                        "Rename: '{}' -> '{}' (index {})",
                        name,
                        self.out_columns[pos],
                        index
                    );
                    renamed.insert(self.out_columns[pos].clone(), index)?;
                }
                None => renamed.insert(name, index)?,
            }
        }
        Ok(renamed)
    }

    pub fn transform(&mut self, mut buffer: DataBuffer) -> PipelineResult<DataBuffer> {
        let renamed = self.rename_map(buffer.column_map())?;
        buffer.set_column_map(renamed)?;
        self.buffers_renamed += 1;
        Ok(buffer)
    }

    pub fn on_epoch_end(&mut self, epoch: u64) -> PipelineResult<()> {
        tracing::debug!(
            "Rename: epoch {} done, {} buffers renamed so far",
            epoch,
            self.buffers_renamed
        );
        Ok(())
    }

    pub fn on_eof(&mut self) -> PipelineResult<()> {
        tracing::debug!("Rename: EOF received, nothing to flush");
        Ok(())
    }

    pub fn buffers_renamed(&self) -> u64 {
        self.buffers_renamed
    }

    pub fn describe(&self) -> String {
        let mut out = String::from("Rename");
        for (from, to) in self.in_columns.iter().zip(&self.out_columns) {
            let _ = write!(out, "\n  {} -> {}", from, to);
        }
        if let Some(capacity) = self.connector_capacity {
            let _ = write!(out, "\n  connector capacity: {}", capacity);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;
    use proptest::prelude::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn map_of(pairs: &[(&str, usize)]) -> ColumnMap {
        let mut map = ColumnMap::new();
        for &(name, index) in pairs {
            map.insert(name, index).unwrap();
        }
        map
    }

    #[test]
    fn test_rename_image_label() {
        let stage =
            RenameStage::new(names(&["image", "label"]), names(&["img", "lbl"])).unwrap();
        let input = map_of(&[("image", 0), ("label", 1), ("extra", 2)]);
        let output = stage.rename_map(&input).unwrap();
        assert_eq!(output, map_of(&[("img", 0), ("lbl", 1), ("extra", 2)]));
    }

    #[test]
    fn test_rename_missing_column() {
        let stage = RenameStage::new(names(&["x"]), names(&["y"])).unwrap();
        let err = stage.rename_map(&map_of(&[("a", 0)])).unwrap_err();
        match err {
            PipelineError::ColumnNotFound {
                found,
                expected,
                missing,
            } => {
                assert_eq!(found, 0);
                assert_eq!(expected, 1);
                assert_eq!(missing, names(&["x"]));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_failed_transform_leaves_no_partial_rename() {
        let mut stage = RenameStage::new(names(&["a", "x"]), names(&["b", "y"])).unwrap();
        let map = map_of(&[("a", 0)]);
        let buffer = DataBuffer::new(1, vec![vec![Value::Int(1)]], map.clone()).unwrap();
        let result = stage.rename_map(buffer.column_map());
        assert!(result.is_err());
        assert_eq!(buffer.column_map(), &map);
        assert!(stage.transform(buffer).is_err());
        assert_eq!(stage.buffers_renamed(), 0);
    }

    #[test]
    fn test_empty_rename_is_identity() {
        let stage = RenameStage::new(Vec::new(), Vec::new()).unwrap();
        let input = map_of(&[("a", 0), ("b", 1)]);
        assert_eq!(stage.rename_map(&input).unwrap(), input);
    }

    #[test]
    fn test_swap_columns() {
        let stage = RenameStage::new(names(&["a", "b"]), names(&["b", "a"])).unwrap();
        let output = stage.rename_map(&map_of(&[("a", 0), ("b", 1)])).unwrap();
        assert_eq!(output, map_of(&[("b", 0), ("a", 1)]));
    }

    #[test]
    fn test_rename_onto_existing_column_is_rejected() {
        let stage = RenameStage::new(names(&["a"]), names(&["b"])).unwrap();
        let err = stage.rename_map(&map_of(&[("a", 0), ("b", 1)])).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidColumnMap(_)));
    }

    #[test]
    fn test_length_mismatch_is_configuration_error() {
        let err = RenameStage::new(names(&["a", "b"]), names(&["c"])).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn test_duplicate_in_columns_rejected() {
        let err = RenameStage::new(names(&["a", "a"]), names(&["b", "c"])).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn test_builder_defaults_capacity_from_runtime() {
        let runtime = RuntimeConfig {
            connector_capacity: 7,
            ..RuntimeConfig::default()
        };
        let stage = RenameStage::builder(&runtime)
            .in_columns(["a"])
            .out_columns(["b"])
            .build()
            .unwrap();
        assert_eq!(stage.connector_capacity(), Some(7));

        let stage = RenameStage::builder(&runtime)
            .in_columns(["a"])
            .out_columns(["b"])
            .connector_capacity(2)
            .build()
            .unwrap();
        assert_eq!(stage.connector_capacity(), Some(2));
    }

    #[test]
    fn test_builder_sanity_check() {
        let runtime = RuntimeConfig::default();
        assert!(RenameStage::builder(&runtime)
            .in_columns(["a", "b"])
            .out_columns(["c"])
            .build()
            .is_err());
        assert!(RenameStage::builder(&runtime)
            .in_columns([""])
            .out_columns(["c"])
            .build()
            .is_err());
        assert!(RenameStage::builder(&runtime)
            .in_columns(["a"])
            .out_columns(["b"])
            .connector_capacity(0)
            .build()
            .is_err());
    }

    #[test]
    fn test_describe_lists_pairs() {
        let stage =
            RenameStage::new(names(&["image", "label"]), names(&["img", "lbl"])).unwrap();
        let text = stage.describe();
        assert!(text.starts_with("Rename"));
        assert!(text.contains("image -> img"));
        assert!(text.contains("label -> lbl"));
        assert!(!text.contains("capacity"));
    }

    #[test]
    fn test_transform_keeps_rows() {
        let mut stage = RenameStage::new(names(&["a"]), names(&["z"])).unwrap();
        let rows = vec![vec![Value::Int(1), Value::from("x")]];
        let buffer =
            DataBuffer::new(3, rows.clone(), map_of(&[("a", 0), ("b", 1)])).unwrap();
        let out = stage.transform(buffer).unwrap();
        assert_eq!(out.id(), 3);
        assert_eq!(out.rows(), rows.as_slice());
        assert_eq!(out.column_map().get("z"), Some(0));
        assert_eq!(out.column_map().get("b"), Some(1));
        assert_eq!(stage.buffers_renamed(), 1);
    }

    proptest! {
        #[test]
        fn test_rename_preserves_indices(
            width in 1usize..12,
            picks in prop::collection::vec(any::<bool>(), 12),
        ) {
            let columns: Vec<String> = (0..width).map(|i| format!("col{}", i)).collect();
            let map = ColumnMap::from_names(&columns).unwrap();

            let in_columns: Vec<String> = columns
                .iter()
                .zip(&picks)
                .filter(|(_, pick)| **pick)
                .map(|(name, _)| name.clone())
                .collect();
            let out_columns: Vec<String> =
                in_columns.iter().map(|name| format!("renamed_{}", name)).collect();

            let stage = RenameStage::new(in_columns.clone(), out_columns.clone()).unwrap();
            let renamed = stage.rename_map(&map).unwrap();

            prop_assert_eq!(renamed.len(), map.len());
            for (from, to) in in_columns.iter().zip(&out_columns) {
                prop_assert_eq!(renamed.get(to), map.get(from));
                prop_assert!(!renamed.contains(from));
            }
            for (name, index) in map.iter() {
                if !in_columns.iter().any(|n| n == name) {
                    prop_assert_eq!(renamed.get(name), Some(index));
                }
            }
        }
    }
}
