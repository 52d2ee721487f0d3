//! ProjectStage: keeps a named subset of columns, in the given order.

use crate::pipeline::buffer::{ColumnMap, DataBuffer};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::types::{Row, Value};
use std::collections::HashSet;

/// Projects every data buffer onto `columns`, re-indexed `0..columns.len()`.
#[derive(Debug, Clone)]
pub struct ProjectStage {
    columns: Vec<String>,
    output_map: ColumnMap,
}

impl ProjectStage {
    pub fn new(columns: Vec<String>) -> PipelineResult<Self> {
        if columns.is_empty() {
            return Err(PipelineError::Configuration(
                "project: at least one column is required".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = columns.iter().find(|name| !seen.insert(name.as_str())) {
            return Err(PipelineError::Configuration(format!(
                "project: column '{}' listed more than once",
                dup
            )));
        }
        let output_map = ColumnMap::from_names(&columns)?;
        Ok(Self {
            columns,
            output_map,
        })
    }

    pub fn name(&self) -> &str {
        "Project"
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn transform(&mut self, mut buffer: DataBuffer) -> PipelineResult<DataBuffer> {
        let map = buffer.column_map();
        let mut indices = Vec::with_capacity(self.columns.len());
        let mut missing = Vec::new();
        for name in &self.columns {
            match map.get(name) {
                Some(index) => indices.push(index),
                None => missing.push(name.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(PipelineError::ColumnNotFound {
                found: indices.len(),
                expected: self.columns.len(),
                missing,
            });
        }

        let id = buffer.id();
        let rows = buffer
            .take_rows()
            .into_iter()
            .enumerate()
            .map(|(pos, mut row)| {
                let width = row.len();
                indices
                    .iter()
                    .map(|&i| {
                        row.get_mut(i)
                            .map(|field| std::mem::replace(field, Value::Null))
                            .ok_or_else(|| {
                                PipelineError::InvalidColumnMap(format!(
                                    "buffer {}: row {} has {} fields but column map indexes {}",
                                    id, pos, width, i
                                ))
                            })
                    })
                    .collect::<PipelineResult<Row>>()
            })
            .collect::<PipelineResult<Vec<Row>>>()?;
        buffer.replace_contents(rows, self.output_map.clone())?;
        Ok(buffer)
    }

    pub fn describe(&self) -> String {
        format!("Project\n  columns: {}", self.columns.join(", "))
    }
}
