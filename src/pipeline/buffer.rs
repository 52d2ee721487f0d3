//! The unit of transfer between pipeline stages.
//!
//! A `DataBuffer` either carries rows plus a column map, or is a pure control
//! marker (EOE / EOF) with neither. Buffers are move-only: a connector hands
//! ownership from one stage to the next and nothing aliases them.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::types::Row;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Control flag carried by every buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferFlag {
    /// Ordinary data buffer.
    #[default]
    None,
    /// End of epoch: one full pass over the dataset completed.
    Eoe,
    /// End of file: the stream is permanently finished.
    Eof,
}

impl BufferFlag {
    #[inline]
    pub fn is_control(self) -> bool {
        self != BufferFlag::None
    }
}

impl fmt::Display for BufferFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferFlag::None => write!(f, "DATA"),
            BufferFlag::Eoe => write!(f, "EOE"),
            BufferFlag::Eof => write!(f, "EOF"),
        }
    }
}

/// Mapping from column name to field index within each row.
///
/// Indices are unique; two names never share an index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    entries: HashMap<String, usize>,
    used: HashSet<usize>,
}

impl ColumnMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map assigning `0..names.len()` in order.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> PipelineResult<Self> {
        let mut map = Self::new();
        for (index, name) in names.iter().enumerate() {
            map.insert(name.as_ref(), index)?;
        }
        Ok(map)
    }

    /// Insert a column. Rejects duplicate names and duplicate indices.
    pub fn insert(&mut self, name: impl Into<String>, index: usize) -> PipelineResult<()> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(PipelineError::InvalidColumnMap(format!(
                "duplicate column name '{}'",
                name
            )));
        }
        if !self.used.insert(index) {
            return Err(PipelineError::InvalidColumnMap(format!(
                "index {} already used by column '{}'",
                index,
                self.name_of(index).unwrap_or("?")
            )));
        }
        self.entries.insert(name, index);
        Ok(())
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<usize> {
        self.entries.get(name).copied()
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Reverse lookup: the name bound to `index`, if any.
    pub fn name_of(&self, index: usize) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, i)| **i == index)
            .map(|(name, _)| name.as_str())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(name, index)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.entries.iter().map(|(name, &index)| (name.as_str(), index))
    }

    /// Column names ordered by index.
    pub fn names_by_index(&self) -> Vec<&str> {
        let mut pairs: Vec<(&str, usize)> = self.iter().collect();
        pairs.sort_by_key(|&(_, index)| index);
        pairs.into_iter().map(|(name, _)| name).collect()
    }

    /// Largest index in use, or `None` for an empty map.
    pub fn max_index(&self) -> Option<usize> {
        self.used.iter().copied().max()
    }
}

impl fmt::Display for ColumnMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pairs: Vec<(&str, usize)> = self.iter().collect();
        pairs.sort_by_key(|&(_, index)| index);
        write!(f, "{{")?;
        for (i, (name, index)) in pairs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, index)?;
        }
        write!(f, "}}")
    }
}

/// A batch of rows, or a control marker, moving through the pipeline.
pub struct DataBuffer {
    id: u64,
    flag: BufferFlag,
    rows: Vec<Row>,
    column_map: ColumnMap,
}

impl DataBuffer {
    /// Create a data buffer. Every row must be wide enough for every index
    /// in `column_map`.
    pub fn new(id: u64, rows: Vec<Row>, column_map: ColumnMap) -> PipelineResult<Self> {
        check_width(id, &rows, &column_map)?;
        Ok(Self {
            id,
            flag: BufferFlag::None,
            rows,
            column_map,
        })
    }

    /// Create a data buffer from a row iterator, reporting allocation
    /// failure as [`PipelineError::Resource`] instead of aborting.
    pub fn from_rows<I>(id: u64, rows: I, column_map: ColumnMap) -> PipelineResult<Self>
    where
        I: IntoIterator<Item = Row>,
        I::IntoIter: ExactSizeIterator,
    {
        let iter = rows.into_iter();
        let mut collected = Vec::new();
        collected.try_reserve_exact(iter.len()).map_err(|e| {
            PipelineError::Resource(format!("buffer {}: cannot allocate rows: {}", id, e))
        })?;
        collected.extend(iter);
        Self::new(id, collected, column_map)
    }

    /// A fresh end-of-epoch marker.
    pub fn eoe() -> Self {
        Self::control(BufferFlag::Eoe)
    }

    /// A fresh end-of-file marker.
    pub fn eof() -> Self {
        Self::control(BufferFlag::Eof)
    }

    /// A fresh control marker for `flag`. `BufferFlag::None` yields an empty
    /// data buffer.
    pub fn control(flag: BufferFlag) -> Self {
        Self {
            id: 0,
            flag,
            rows: Vec::new(),
            column_map: ColumnMap::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn flag(&self) -> BufferFlag {
        self.flag
    }

    #[inline]
    pub fn is_eoe(&self) -> bool {
        self.flag == BufferFlag::Eoe
    }

    #[inline]
    pub fn is_eof(&self) -> bool {
        self.flag == BufferFlag::Eof
    }

    #[inline]
    pub fn is_control(&self) -> bool {
        self.flag.is_control()
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn column_map(&self) -> &ColumnMap {
        &self.column_map
    }

    /// Replace the column map. Stages that change column semantics install a
    /// newly built map rather than editing the old one.
    ///
    /// Fails, leaving the buffer unchanged, if a row is too short for the map.
    pub fn set_column_map(&mut self, column_map: ColumnMap) -> PipelineResult<()> {
        check_width(self.id, &self.rows, &column_map)?;
        self.column_map = column_map;
        Ok(())
    }

    /// Replace rows and column map together, with the same width check as
    /// [`DataBuffer::new`]. On error the buffer is left unchanged.
    pub fn replace_contents(
        &mut self,
        rows: Vec<Row>,
        column_map: ColumnMap,
    ) -> PipelineResult<()> {
        check_width(self.id, &rows, &column_map)?;
        self.rows = rows;
        self.column_map = column_map;
        Ok(())
    }

    /// Take the rows out, leaving the buffer empty.
    pub fn take_rows(&mut self) -> Vec<Row> {
        std::mem::take(&mut self.rows)
    }

    /// Field of `row` under column `name`.
    pub fn field(&self, row: usize, name: &str) -> Option<&crate::types::Value> {
        let index = self.column_map.get(name)?;
        self.rows.get(row)?.get(index)
    }
}

fn check_width(id: u64, rows: &[Row], column_map: &ColumnMap) -> PipelineResult<()> {
    let Some(max) = column_map.max_index() else {
        return Ok(());
    };
    match rows.iter().position(|row| row.len() <= max) {
        Some(pos) => Err(PipelineError::InvalidColumnMap(format!(
            "buffer {}: row {} has {} fields but column map indexes {}",
            id,
            pos,
            rows[pos].len(),
            max
        ))),
        None => Ok(()),
    }
}

impl fmt::Debug for DataBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataBuffer")
            .field("id", &self.id)
            .field("flag", &self.flag)
            .field("rows", &self.rows.len())
            .field("columns", &self.column_map.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn two_column_buffer() -> DataBuffer {
        let map = ColumnMap::from_names(&["image", "label"]).unwrap();
        let rows = vec![
            vec![Value::Bytes(vec![1, 2, 3]), Value::Int(0)],
            vec![Value::Bytes(vec![4, 5, 6]), Value::Int(1)],
        ];
        DataBuffer::new(7, rows, map).unwrap()
    }

    #[test]
    fn test_column_map_from_names() {
        let map = ColumnMap::from_names(&["a", "b", "c"]).unwrap();
        assert_eq!(map.get("a"), Some(0));
        assert_eq!(map.get("c"), Some(2));
        assert_eq!(map.name_of(1), Some("b"));
        assert_eq!(map.names_by_index(), vec!["a", "b", "c"]);
        assert_eq!(map.max_index(), Some(2));
    }

    #[test]
    fn test_column_map_rejects_duplicates() {
        assert!(ColumnMap::from_names(&["a", "a"]).is_err());

        let mut map = ColumnMap::new();
        map.insert("a", 0).unwrap();
        let err = map.insert("b", 0).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidColumnMap(_)));
    }

    #[test]
    fn test_column_map_display_sorted_by_index() {
        let mut map = ColumnMap::new();
        map.insert("z", 1).unwrap();
        map.insert("y", 0).unwrap();
        assert_eq!(map.to_string(), "{y: 0, z: 1}");
    }

    #[test]
    fn test_data_buffer_accessors() {
        let buf = two_column_buffer();
        assert_eq!(buf.id(), 7);
        assert_eq!(buf.flag(), BufferFlag::None);
        assert!(!buf.is_control());
        assert_eq!(buf.num_rows(), 2);
        assert_eq!(buf.field(1, "label"), Some(&Value::Int(1)));
        assert_eq!(buf.field(0, "missing"), None);
    }

    #[test]
    fn test_data_buffer_rejects_short_rows() {
        let map = ColumnMap::from_names(&["a", "b"]).unwrap();
        let err = DataBuffer::new(1, vec![vec![Value::Int(1)]], map).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidColumnMap(_)));
    }

    #[test]
    fn test_control_markers_are_empty() {
        for buf in [DataBuffer::eoe(), DataBuffer::eof()] {
            assert!(buf.is_control());
            assert_eq!(buf.num_rows(), 0);
            assert!(buf.column_map().is_empty());
        }
        assert!(DataBuffer::eoe().is_eoe());
        assert!(DataBuffer::eof().is_eof());
    }

    #[test]
    fn test_from_rows() {
        let map = ColumnMap::from_names(&["x"]).unwrap();
        let rows = (0..4).map(|i| vec![Value::Int(i)]).collect::<Vec<_>>();
        let buf = DataBuffer::from_rows(3, rows, map).unwrap();
        assert_eq!(buf.num_rows(), 4);
    }

    #[test]
    fn test_set_column_map_checks_width() {
        let mut buf = two_column_buffer();
        let mut wide = ColumnMap::new();
        wide.insert("image", 0).unwrap();
        wide.insert("extra", 5).unwrap();
        let err = buf.set_column_map(wide).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidColumnMap(_)));
        assert_eq!(buf.column_map().get("label"), Some(1));

        let narrow = ColumnMap::from_names(&["only"]).unwrap();
        buf.set_column_map(narrow).unwrap();
        assert_eq!(buf.column_map().len(), 1);
    }

    #[test]
    fn test_replace_contents_checks_width() {
        let mut buf = two_column_buffer();
        let map = ColumnMap::from_names(&["a", "b", "c"]).unwrap();
        let err = buf
            .replace_contents(vec![vec![Value::Int(1)]], map)
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidColumnMap(_)));
    }

    #[test]
    fn test_column_map_index_reuse_after_failed_insert() {
        let mut map = ColumnMap::new();
        map.insert("a", 0).unwrap();
        assert!(map.insert("a", 1).is_err());
        // the rejected name must not reserve index 1
        map.insert("b", 1).unwrap();
        assert_eq!(map.max_index(), Some(1));
    }

    #[test]
    fn test_take_rows() {
        let mut buf = two_column_buffer();
        let rows = buf.take_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(buf.num_rows(), 0);
    }
}
