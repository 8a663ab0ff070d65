use super::Column;
use serde::{ser::SerializeSeq, Serialize, Serializer};
use std::{
    cell::OnceCell,
    fmt::{Display, Error as FmtError, Formatter},
    slice::Iter,
};

/// An ordered row of [`Column`]s.
///
/// Columns are positional, not named.  The byte-size estimate (sum of the
/// column estimates) is computed on first use and cached until the record
/// is modified.
#[derive(Clone, Debug, Default)]
pub struct Record {
    columns: Vec<Column>,
    byte_size: OnceCell<usize>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            columns: Vec::with_capacity(capacity),
            byte_size: OnceCell::new(),
        }
    }

    pub fn add_column(&mut self, column: Column) {
        self.columns.push(column);
        self.byte_size.take();
    }

    /// Replaces the column at position `index`, padding the record with
    /// `NULL` columns if `index` is past the end.
    pub fn set_column(&mut self, index: usize, column: Column) {
        if index >= self.columns.len() {
            self.columns.resize_with(index + 1, Column::null);
        }
        self.columns[index] = column;
        self.byte_size.take();
    }

    pub fn get_column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn column_number(&self) -> usize {
        self.columns.len()
    }

    /// Estimated size of the record in bytes.
    pub fn byte_size(&self) -> usize {
        *self
            .byte_size
            .get_or_init(|| self.columns.iter().map(Column::byte_size).sum())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn iter(&self) -> Iter<'_, Column> {
        self.columns.iter()
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns
    }
}

impl From<Vec<Column>> for Record {
    fn from(columns: Vec<Column>) -> Self {
        Self {
            columns,
            byte_size: OnceCell::new(),
        }
    }
}

impl FromIterator<Column> for Record {
    fn from_iter<I: IntoIterator<Item = Column>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = &'a Column;
    type IntoIter = Iter<'a, Column>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Serialize for Record {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(self.columns.len()))?;
        for column in &self.columns {
            seq.serialize_element(column)?;
        }
        seq.end()
    }
}

impl Display for Record {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        let json = serde_json::to_string(self).map_err(|_| FmtError)?;
        f.write_str(&json)
    }
}
