//! Response batch construction and (de)serialization.
//!
//! [`BatchBuilder`] is the serving-side half of the protocol: rows are pushed
//! one requested id at a time, each with one value sequence per window, and
//! flushed into a [`FeatureBatch`] whenever the server decides a batch is big
//! enough. The client never relies on a particular batch size.

use crate::proto::{FeatureBatch, FeatureColumn, VALUE_SIZE};
use crate::{EncodingError, FeatureWindow};
use bytes::{BufMut, Bytes, BytesMut};
use prost::Message;

impl FeatureBatch {
    /// Number of rows (requested ids) carried by this batch.
    pub fn rows(&self) -> usize {
        self.row_count as usize
    }

    /// First column with the given name. An empty name selects the default
    /// window.
    pub fn column(&self, name: &str) -> Option<&FeatureColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Protobuf encoding of the batch.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.encode_to_vec())
    }

    /// Decodes a batch. Column payloads become slices of `bytes`, so every cell
    /// reassembled from the batch shares this one allocation.
    ///
    /// # Errors
    ///
    /// Returns [`EncodingError::Decode`] if `bytes` is not a batch message.
    pub fn from_bytes(bytes: Bytes) -> Result<Self, EncodingError> {
        Ok(Self::decode(bytes)?)
    }
}

#[derive(Debug)]
struct ColumnBuilder {
    name: String,
    offsets: Vec<u32>,
    values: BytesMut,
    end: u32,
}

impl ColumnBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            offsets: vec![0],
            values: BytesMut::new(),
            end: 0,
        }
    }

    fn take(&mut self) -> FeatureColumn {
        self.end = 0;
        FeatureColumn {
            name: self.name.clone(),
            offsets: core::mem::replace(&mut self.offsets, vec![0]),
            values: self.values.split().freeze(),
        }
    }
}

/// Accumulates rows into a [`FeatureBatch`], one column per window.
#[derive(Debug)]
pub struct BatchBuilder {
    columns: Vec<ColumnBuilder>,
    rows: u32,
}

impl BatchBuilder {
    /// Builder with one column per window, named after the window.
    pub fn new(windows: &[FeatureWindow]) -> Self {
        Self::with_columns(windows.iter().map(|w| w.name().to_owned()))
    }

    /// Builder with explicitly named columns, in order.
    pub fn with_columns<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: names
                .into_iter()
                .map(|name| ColumnBuilder::new(name.into()))
                .collect(),
            rows: 0,
        }
    }

    /// Rows pushed since the last [`BatchBuilder::take`].
    pub fn rows(&self) -> usize {
        self.rows as usize
    }

    /// Whether no row has been pushed since the last [`BatchBuilder::take`].
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Appends one row: `cells[j]` is the value sequence for column `j`.
    ///
    /// The row is either appended whole or not at all.
    ///
    /// # Errors
    ///
    /// - [`EncodingError::CellCountMismatch`] if `cells` does not have one
    ///   entry per column
    /// - [`EncodingError::RowOverflow`] / [`EncodingError::ColumnOverflow`] if
    ///   the batch outgrows its `u32` counters
    pub fn push_row<R: AsRef<[f32]>>(&mut self, cells: &[R]) -> Result<(), EncodingError> {
        if cells.len() != self.columns.len() {
            return Err(EncodingError::CellCountMismatch {
                expected: self.columns.len(),
                found: cells.len(),
            });
        }
        let rows = self.rows.checked_add(1).ok_or(EncodingError::RowOverflow)?;

        let mut ends = Vec::with_capacity(cells.len());
        for (column, cell) in self.columns.iter().zip(cells) {
            let end = u32::try_from(cell.as_ref().len())
                .ok()
                .and_then(|n| column.end.checked_add(n))
                .ok_or_else(|| EncodingError::ColumnOverflow {
                    name: column.name.clone(),
                })?;
            ends.push(end);
        }

        for ((column, cell), end) in self.columns.iter_mut().zip(cells).zip(ends) {
            let cell = cell.as_ref();
            column.values.reserve(cell.len() * VALUE_SIZE);
            for &v in cell {
                column.values.put_f32_le(v);
            }
            column.offsets.push(end);
            column.end = end;
        }
        self.rows = rows;
        Ok(())
    }

    /// Emits the rows pushed so far and resets the builder for the next batch.
    pub fn take(&mut self) -> FeatureBatch {
        let row_count = core::mem::take(&mut self.rows);
        FeatureBatch {
            row_count,
            columns: self.columns.iter_mut().map(ColumnBuilder::take).collect(),
        }
    }

    /// Emits the rows pushed so far and consumes the builder.
    pub fn finish(mut self) -> FeatureBatch {
        self.take()
    }
}
