//! Sources feeding the first connector of a pipeline.
//!
//! A source owns the upstream side of the framing contract: data buffers,
//! an EOE after each epoch, and exactly one EOF at the very end. Sources write
//! through a [`SourceOutput`], which enforces that contract.

use crate::config::RuntimeConfig;
use crate::dataset::Dataset;
use crate::pipeline::buffer::{ColumnMap, DataBuffer};
use crate::pipeline::connector::Connector;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::runner::StageSummary;
use std::sync::Arc;

/// Producer run on its own worker ahead of the first stage.
pub trait Source: Send {
    fn name(&self) -> &str;

    /// Push the whole stream into `output`, ending with EOF.
    fn produce(&mut self, output: &mut SourceOutput<'_>) -> PipelineResult<StageSummary>;

    fn describe(&self) -> String {
        self.name().to_string()
    }
}

/// Write side of the first connector, as seen by a [`Source`].
///
/// Rejects anything put after EOF, and [`finish`](Self::finish) fails if EOF
/// was never put. Both are [`PipelineError::ProtocolSequencing`].
pub struct SourceOutput<'a> {
    connector: &'a Connector,
    eof_sent: bool,
}

impl<'a> SourceOutput<'a> {
    pub fn new(connector: &'a Connector) -> Self {
        Self {
            connector,
            eof_sent: false,
        }
    }

    pub fn put(&mut self, buffer: DataBuffer) -> PipelineResult<()> {
        if self.eof_sent {
            return Err(PipelineError::ProtocolSequencing(format!(
                "{} put after EOF",
                buffer.flag()
            )));
        }
        let is_eof = buffer.is_eof();
        self.connector.put(buffer)?;
        self.eof_sent = is_eof;
        Ok(())
    }

    #[inline]
    pub fn eof_sent(&self) -> bool {
        self.eof_sent
    }

    /// Check the stream was terminated.
    pub fn finish(&self) -> PipelineResult<()> {
        if self.eof_sent {
            Ok(())
        } else {
            Err(PipelineError::ProtocolSequencing(
                "source finished without sending EOF".to_string(),
            ))
        }
    }
}

/// Slices a [`Dataset`] into buffers of `rows_per_buffer` rows, repeating it
/// for `num_epochs` epochs.
pub struct DatasetSource {
    dataset: Arc<Dataset>,
    column_map: ColumnMap,
    rows_per_buffer: usize,
    num_epochs: u32,
}

impl DatasetSource {
    pub fn new(dataset: Arc<Dataset>, runtime: &RuntimeConfig) -> PipelineResult<Self> {
        if runtime.rows_per_buffer == 0 {
            return Err(PipelineError::Configuration(
                "rows_per_buffer must be at least 1".to_string(),
            ));
        }
        let column_map = ColumnMap::from_names(dataset.columns())?;
        Ok(Self {
            dataset,
            column_map,
            rows_per_buffer: runtime.rows_per_buffer,
            num_epochs: runtime.num_epochs,
        })
    }
}

impl Source for DatasetSource {
    fn name(&self) -> &str {
        "DatasetSource"
    }

    fn produce(&mut self, output: &mut SourceOutput<'_>) -> PipelineResult<StageSummary> {
        let mut summary = StageSummary {
            name: self.name().to_string(),
            ..StageSummary::default()
        };
        let mut next_id = 0u64;

        for epoch in 0..self.num_epochs {
            for chunk in self.dataset.rows().chunks(self.rows_per_buffer) {
                let buffer =
                    DataBuffer::from_rows(next_id, chunk.iter().cloned(), self.column_map.clone())?;
                next_id += 1;
                summary.buffers += 1;
                summary.rows += buffer.num_rows() as u64;
                output.put(buffer)?;
            }
            tracing::debug!("Source epoch {} complete", epoch);
            output.put(DataBuffer::eoe())?;
            summary.epochs += 1;
        }
        output.put(DataBuffer::eof())?;
        tracing::info!(
            "Source finished: {} buffers over {} epochs",
            summary.buffers,
            summary.epochs
        );
        Ok(summary)
    }

    fn describe(&self) -> String {
        format!(
            "DatasetSource\n  columns: {}\n  rows: {}, rows per buffer: {}, epochs: {}",
            self.dataset.columns().join(", "),
            self.dataset.len(),
            self.rows_per_buffer,
            self.num_epochs
        )
    }
}

/// Replays a pre-built buffer sequence verbatim, markers included.
///
/// Nothing is appended: the caller controls the framing. A sequence without
/// a trailing EOF, or with buffers after it, fails the run.
pub struct BufferSource {
    buffers: std::vec::IntoIter<DataBuffer>,
}

impl BufferSource {
    pub fn new(buffers: Vec<DataBuffer>) -> Self {
        Self {
            buffers: buffers.into_iter(),
        }
    }
}

impl Source for BufferSource {
    fn name(&self) -> &str {
        "BufferSource"
    }

    fn produce(&mut self, output: &mut SourceOutput<'_>) -> PipelineResult<StageSummary> {
        let mut summary = StageSummary {
            name: self.name().to_string(),
            ..StageSummary::default()
        };
        for buffer in self.buffers.by_ref() {
            if buffer.is_eoe() {
                summary.epochs += 1;
            } else if !buffer.is_control() {
                summary.buffers += 1;
                summary.rows += buffer.num_rows() as u64;
            }
            output.put(buffer)?;
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::buffer::BufferFlag;
    use crate::pipeline::connector::CancellationToken;
    use crate::types::Value;

    fn dataset(n: i64) -> Arc<Dataset> {
        let rows = (0..n).map(|i| vec![Value::Int(i), Value::Int(i % 2)]).collect();
        Arc::new(Dataset::new(vec!["id".into(), "label".into()], rows).unwrap())
    }

    fn drain(conn: &Connector) -> Vec<DataBuffer> {
        let mut out = Vec::new();
        while let Some(buf) = conn.try_take() {
            out.push(buf);
        }
        out
    }

    #[test]
    fn test_dataset_source_framing() {
        let runtime = RuntimeConfig {
            rows_per_buffer: 2,
            num_epochs: 2,
            ..RuntimeConfig::default()
        };
        let conn = Connector::new(32, CancellationToken::new()).unwrap();
        let mut source = DatasetSource::new(dataset(5), &runtime).unwrap();
        let mut output = SourceOutput::new(&conn);
        let summary = source.produce(&mut output).unwrap();
        assert!(output.finish().is_ok());
        assert_eq!(summary.buffers, 6);
        assert_eq!(summary.rows, 10);
        assert_eq!(summary.epochs, 2);

        let flags: Vec<BufferFlag> = drain(&conn).iter().map(|b| b.flag()).collect();
        use BufferFlag::*;
        assert_eq!(
            flags,
            vec![None, None, None, Eoe, None, None, None, Eoe, Eof]
        );
    }

    #[test]
    fn test_dataset_source_buffer_ids_increase() {
        let runtime = RuntimeConfig {
            rows_per_buffer: 1,
            ..RuntimeConfig::default()
        };
        let conn = Connector::new(16, CancellationToken::new()).unwrap();
        DatasetSource::new(dataset(3), &runtime)
            .unwrap()
            .produce(&mut SourceOutput::new(&conn))
            .unwrap();
        let ids: Vec<u64> = drain(&conn)
            .iter()
            .filter(|b| !b.is_control())
            .map(|b| b.id())
            .collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_dataset_source_rejects_zero_rows_per_buffer() {
        let runtime = RuntimeConfig {
            rows_per_buffer: 0,
            ..RuntimeConfig::default()
        };
        assert!(DatasetSource::new(dataset(1), &runtime).is_err());
    }

    #[test]
    fn test_buffer_source_replays_verbatim() {
        let conn = Connector::new(4, CancellationToken::new()).unwrap();
        let mut source = BufferSource::new(vec![DataBuffer::eoe(), DataBuffer::eof()]);
        let summary = source.produce(&mut SourceOutput::new(&conn)).unwrap();
        assert_eq!(summary.epochs, 1);
        assert_eq!(summary.buffers, 0);
        let out = drain(&conn);
        assert!(out[0].is_eoe());
        assert!(out[1].is_eof());
    }

    #[test]
    fn test_buffer_source_rejects_buffers_after_eof() {
        let conn = Connector::new(4, CancellationToken::new()).unwrap();
        let mut source = BufferSource::new(vec![DataBuffer::eof(), DataBuffer::eoe()]);
        let err = source.produce(&mut SourceOutput::new(&conn)).unwrap_err();
        assert!(matches!(err, PipelineError::ProtocolSequencing(_)));
        // only the EOF reached the connector
        let out = drain(&conn);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_eof());
    }

    #[test]
    fn test_finish_without_eof() {
        let conn = Connector::new(4, CancellationToken::new()).unwrap();
        let mut output = SourceOutput::new(&conn);
        BufferSource::new(vec![DataBuffer::eoe()])
            .produce(&mut output)
            .unwrap();
        assert!(!output.eof_sent());
        assert!(matches!(
            output.finish(),
            Err(PipelineError::ProtocolSequencing(_))
        ));
    }
}
