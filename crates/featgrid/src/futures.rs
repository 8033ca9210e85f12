//! Async counterpart of [`crate::consume`].
//!
//! A tonic response (`Streaming<FeatureBatch>`) is a
//! `Stream<Item = Result<FeatureBatch, Status>>`; with the `tonic` feature
//! enabled it can be handed to [`consume_stream`] as is.

use crate::proto::FeatureBatch;
use crate::{
    BatchReassembler, EntityId, Error, FeatureWindow, ReassemblyConfig, TensorGrid, TransportError,
};
use ::futures::{Stream, StreamExt};
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Polls `batches` until every id is filled and returns the completed grid.
///
/// Awaiting the next batch is the only suspension point. Dropping the returned
/// future abandons the stream and everything reassembled so far.
///
/// # Errors
///
/// Same as [`crate::consume`].
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(ids = ids.len(), windows = windows.len()))
)]
pub async fn consume_stream<S, E>(
    batches: S,
    ids: &[EntityId],
    windows: &[FeatureWindow],
    config: ReassemblyConfig,
) -> Result<TensorGrid, Error>
where
    S: Stream<Item = Result<FeatureBatch, E>>,
    E: Into<TransportError>,
{
    let mut batches = core::pin::pin!(batches);
    let mut reassembler = BatchReassembler::new(ids, windows, config);

    while !reassembler.is_complete() {
        match batches.next().await {
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
