//! # Serving Side
//!
//! The storage-agnostic half of the feature service: given a decoded
//! [`FeatureRequest`] and something that can look values up, produce the
//! response stream the client reassembles.
//!
//! A lookup resolves `(id, window)` to the concatenation of the series values
//! at every position in `[start, end]`. A pair with nothing stored in range
//! ends the stream with a [`TransportCode::NotFound`](crate::TransportCode)
//! error; the client is never sent an invented value.

use crate::proto::FeatureBatch;
use crate::{
    BatchBuilder, EntityId, FeatureRequest, FeatureWindow, TransportCode, TransportError,
};
use std::collections::HashMap;

/// Resolves one `(id, window)` cell.
pub trait FeatureSource {
    /// Concatenated values for `id` over the inclusive `window` range, or
    /// `None` if nothing is stored there.
    fn fetch(&self, id: &EntityId, window: &FeatureWindow) -> Option<Vec<f32>>;
}

impl<S: FeatureSource + ?Sized> FeatureSource for &S {
    fn fetch(&self, id: &EntityId, window: &FeatureWindow) -> Option<Vec<f32>> {
        (**self).fetch(id, window)
    }
}

/// In-memory feature store.
///
/// Each `(id, feature)` pair maps to a series of positions, each position a
/// vector of values (a scalar feature has one value per position, an
/// embedding many). Negative positions and positions past the end of a series
/// hold nothing.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    series: HashMap<String, HashMap<String, Vec<Vec<f32>>>>,
}

impl MemorySource {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `series` under `(id, feature)`, replacing what was there. Use
    /// [`crate::DEFAULT_WINDOW_NAME`] for the default series.
    pub fn insert(&mut self, id: &EntityId, feature: &str, series: Vec<Vec<f32>>) {
        self.series
            .entry(id.as_str().to_owned())
            .or_default()
            .insert(feature.to_owned(), series);
    }

    /// Stores a series with one value per position.
    pub fn insert_scalars(
        &mut self,
        id: &EntityId,
        feature: &str,
        values: impl IntoIterator<Item = f32>,
    ) {
        self.insert(id, feature, values.into_iter().map(|v| vec![v]).collect());
    }

    /// Builder form of [`MemorySource::insert_scalars`].
    #[must_use]
    pub fn with_scalars(
        mut self,
        id: &EntityId,
        feature: &str,
        values: impl IntoIterator<Item = f32>,
    ) -> Self {
        self.insert_scalars(id, feature, values);
        self
    }
}

impl FeatureSource for MemorySource {
    fn fetch(&self, id: &EntityId, window: &FeatureWindow) -> Option<Vec<f32>> {
        let series = self.series.get(id.as_str())?.get(window.name())?;
        let end = usize::try_from(window.end()).ok()?;
        let start = usize::try_from(window.start()).unwrap_or(0);
        let end = end.min(series.len().checked_sub(1)?);
        if start > end {
            return None;
        }
        Some(series[start..=end].concat())
    }
}

/// Streams the response to `request` in batches of at most `max_rows` rows.
///
/// A `max_rows` of zero is treated as one.
pub fn respond<'a, S>(request: &'a FeatureRequest, source: &'a S, max_rows: usize) -> Responses<'a, S>
where
    S: FeatureSource + ?Sized,
{
    Responses {
        request,
        source,
        max_rows: max_rows.max(1),
        next: 0,
        builder: BatchBuilder::new(request.windows()),
        done: false,
    }
}

/// Iterator returned by [`respond`].
#[derive(Debug)]
pub struct Responses<'a, S: ?Sized> {
    request: &'a FeatureRequest,
    source: &'a S,
    max_rows: usize,
    next: usize,
    builder: BatchBuilder,
    done: bool,
}

impl<S: FeatureSource + ?Sized> Iterator for Responses<'_, S> {
    type Item = Result<FeatureBatch, TransportError>;

    fn next(&mut self) -> Option<Self::Item> {
        let ids = self.request.ids();
        if self.done || self.next >= ids.len() {
            return None;
        }
        let end = ids.len().min(self.next + self.max_rows);

        for id in &ids[self.next..end] {
            let mut cells = Vec::with_capacity(self.request.windows().len());
            for window in self.request.windows() {
                match self.source.fetch(id, window) {
                    Some(values) => cells.push(values),
                    None => {
                        self.done = true;
                        return Some(Err(TransportError::not_found(format!(
                            "no data for `{id}` in window {window}"
                        ))));
                    }
                }
            }
            if let Err(e) = self.builder.push_row(&cells) {
                self.done = true;
                return Some(Err(TransportError::new(
                    TransportCode::Upstream,
                    e.to_string(),
                )));
            }
        }

        self.next = end;
        Some(Ok(self.builder.take()))
    }
}
