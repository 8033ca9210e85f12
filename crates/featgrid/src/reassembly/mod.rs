//! # Batch Reassembly
//!
//! Maps a stream of [`FeatureBatch`]es back onto the `ids × windows` grid of a
//! request.
//!
//! Batches carry an arbitrary number of rows; together they form a
//! left-to-right partition of the requested ids. A running `offset` tracks how
//! many ids have been filled, and every row `r` of the next batch lands at
//! `ids[offset + r]`. Any partition of the same rows reassembles into the same
//! grid.
//!
//! A batch is checked in full before any of its cells is written:
//!
//! 1. its row count must not push `offset` past the number of ids
//! 2. every requested window must have a column
//! 3. every such column must have well-formed offsets over its payload
//! 4. no cell may be empty when [`ReassemblyConfig::reject_empty_cells`] is set
//!
//! Any failure aborts the consumption; no partial grid is returned.

use crate::proto::{FeatureBatch, FeatureColumn, VALUE_SIZE};
use crate::{
    EntityId, Error, FeatureValues, FeatureWindow, ReassemblyConfig, ReassemblyError, TensorGrid,
    TransportError, ValueMode,
};
use bytes::Bytes;
#[cfg(feature = "tracing")]
use tracing::instrument;


/// Incremental reassembler for one request.
///
/// Feed batches with [`BatchReassembler::push_batch`] until
/// [`BatchReassembler::is_complete`], then call [`BatchReassembler::finish`].
/// [`consume`] drives this loop over an iterator.
#[derive(Debug)]
pub struct BatchReassembler<'r> {
    ids: &'r [EntityId],
    windows: &'r [FeatureWindow],
    config: ReassemblyConfig,
    offset: usize,
    grid: TensorGrid,
}

impl<'r> BatchReassembler<'r> {
    /// Reassembler for a request of `ids × windows`, starting at offset 0.
    pub fn new(
        ids: &'r [EntityId],
        windows: &'r [FeatureWindow],
        config: ReassemblyConfig,
    ) -> Self {
        Self {
            ids,
            windows,
            config,
            offset: 0,
            grid: TensorGrid::with_shape(ids.len(), windows.len()),
        }
    }

    /// Rows filled so far.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Rows still expected.
    pub fn remaining(&self) -> usize {
        self.ids.len() - self.offset
    }

    /// Whether every requested id has been filled.
    pub fn is_complete(&self) -> bool {
        self.offset == self.ids.len()
    }

    /// Places every row of `batch` into the grid and advances the offset.
    ///
    /// # Errors
    ///
    /// - [`ReassemblyError::RowOverrun`] if the batch carries more rows than
    ///   are still expected
    /// - [`ReassemblyError::MissingColumn`] if a requested window has no column
    /// - [`ReassemblyError::MalformedColumn`] if a column's offsets do not fit
    ///   its payload
    /// - [`ReassemblyError::EmptyCell`] if configured to reject empty cells
    ///
    /// An error leaves the reassembler exactly as it was before the call.
    pub fn push_batch(&mut self, batch: FeatureBatch) -> Result<(), ReassemblyError> {
        let batch_rows = batch.rows();
        if batch_rows > self.remaining() {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                offset = self.offset,
                batch_rows,
                expected = self.ids.len(),
                "row overrun"
            );
            return Err(ReassemblyError::RowOverrun {
                offset: self.offset,
                batch_rows,
                expected: self.ids.len(),
            });
        }

        let columns = self
            .windows
            .iter()
            .map(|window| {
                let column =
                    batch
                        .column(window.name())
                        .ok_or_else(|| ReassemblyError::MissingColumn {
                            name: window.name().to_owned(),
                        })?;
                check_column(column, batch_rows)?;
                Ok(column)
            })
            .collect::<Result<Vec<_>, ReassemblyError>>()?;

        if self.config.reject_empty_cells {
            for row in 0..batch_rows {
                for (window, column) in self.windows.iter().zip(&columns) {
                    if column.offsets[row] == column.offsets[row + 1] {
                        return Err(ReassemblyError::EmptyCell {
                            id: self.ids[self.offset + row].to_string(),
                            window: window.name().to_owned(),
                        });
                    }
                }
            }
        }

        for row in 0..batch_rows {
            for column in &columns {
                let cell = self.cell(column, row);
                self.grid.push(cell);
            }
        }

        self.offset += batch_rows;
        debug_assert_eq!(self.grid.filled(), self.offset * self.windows.len());

        #[cfg(feature = "tracing")]
        tracing::trace!(
            batch_rows,
            offset = self.offset,
            expected = self.ids.len(),
            "batch placed"
        );
        Ok(())
    }

    fn cell(&self, column: &FeatureColumn, row: usize) -> FeatureValues {
        // Offsets were validated by `check_column`.
        let start = column.offsets[row] as usize * VALUE_SIZE;
        let end = column.offsets[row + 1] as usize * VALUE_SIZE;
        let bytes = match self.config.value_mode {
            ValueMode::View => column.values.slice(start..end),
            ValueMode::Copy => Bytes::copy_from_slice(&column.values[start..end]),
        };
        FeatureValues::from_le_bytes(bytes)
    }

    /// Returns the grid once every requested id has been filled.
    ///
    /// # Errors
    ///
    /// Returns [`ReassemblyError::Truncated`] if rows are still missing.
    pub fn finish(self) -> Result<TensorGrid, ReassemblyError> {
        if !self.is_complete() {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                received = self.offset,
                expected = self.ids.len(),
                "stream truncated"
            );
            return Err(ReassemblyError::Truncated {
                received: self.offset,
                expected: self.ids.len(),
            });
        }
        Ok(self.grid)
    }
}

fn check_column(column: &FeatureColumn, rows: usize) -> Result<(), ReassemblyError> {
    let malformed = |reason: String| ReassemblyError::MalformedColumn {
        name: column.name.clone(),
        reason,
    };

    if column.offsets.len() != rows + 1 {
        return Err(malformed(format!(
            "expected {} offsets for {rows} rows, found {}",
            rows + 1,
            column.offsets.len()
        )));
    }
    if column.values.len() % VALUE_SIZE != 0 {
        return Err(malformed(format!(
            "payload of {} bytes is not a whole number of values",
            column.values.len()
        )));
    }
    if let Some(pair) = column.offsets.windows(2).find(|pair| pair[0] > pair[1]) {
        return Err(malformed(format!(
            "offsets decrease from {} to {}",
            pair[0], pair[1]
        )));
    }
    let available = column.values.len() / VALUE_SIZE;
    // `offsets` has at least one entry here.
    let last = column.offsets[rows] as usize;
    if last > available {
        return Err(malformed(format!(
            "offset {last} is past the {available} values in the payload"
        )));
    }
    Ok(())
}

/// Pulls batches until every id is filled and returns the completed grid.
///
/// Pulling stops as soon as the last requested row has arrived, so a request
/// with no ids never touches the stream. Dropping the iterator mid-way (or
/// getting an error back) discards everything built so far.
///
/// # Errors
///
/// - [`Error::Transport`] for the first error yielded by `batches`
/// - [`Error::Reassembly`] for truncation, overrun, missing or malformed
///   columns (see [`BatchReassembler::push_batch`])
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(ids = ids.len(), windows = windows.len()))
)]
pub fn consume<I, E>(
    batches: I,
    ids: &[EntityId],
    windows: &[FeatureWindow],
    config: ReassemblyConfig,
) -> Result<TensorGrid, Error>
where
    I: IntoIterator<Item = Result<FeatureBatch, E>>,
    E: Into<TransportError>,
{
    let mut reassembler = BatchReassembler::new(ids, windows, config);
    let mut batches = batches.into_iter();

    while !reassembler.is_complete() {
        match batches.next() {
            Some(Ok(batch)) => reassembler.push_batch(batch)?,
            Some(Err(e)) => {
                let e = e.into();
                #[cfg(feature = "tracing")]
                tracing::warn!(offset = reassembler.offset(), "transport failed: {e}");
                return Err(Error::Transport(e));
            }
            None => break,
        }
    }

    Ok(reassembler.finish()?)
}

/// [`consume`] for single-window requests, flattened to one entry per id.
///
/// # Errors
///
/// Everything [`consume`] returns.
pub fn consume_single<I, E>(
    batches: I,
    ids: &[EntityId],
    window: &FeatureWindow,
    config: ReassemblyConfig,
) -> Result<Vec<FeatureValues>, Error>
where
    I: IntoIterator<Item = Result<FeatureBatch, E>>,
    E: Into<TransportError>,
{
    let grid = consume(batches, ids, core::slice::from_ref(window), config)?;
    Ok(grid.into_cells())
}
