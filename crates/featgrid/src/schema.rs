//! # Request Schema
//!
//! Canonical value types shared by the ticket encoder and the batch
//! reassembler. Every type validates itself at construction, so a value that
//! exists is always encodable.
//!
//! - [`EntityId`]: an opaque entity key; its position in a request is the
//!   join key for response rows.
//! - [`FeatureWindow`]: a named, closed index range `[start, end]` over a
//!   per-entity feature series. The empty name selects the default series.
//! - [`FeatureRequest`]: the ordered ids and windows that define the axes of
//!   the resulting [`crate::TensorGrid`].
//!
//! Names and ids end up in storage keys of the form `{id}.{feature}`, which is
//! why [`KEY_SEPARATOR`] is rejected in both.

use crate::EncodingError;
use core::fmt;
use core::ops::RangeInclusive;
use std::collections::HashSet;

/// Column name of the default (unnamed) feature series.
pub const DEFAULT_WINDOW_NAME: &str = "";

/// Separator between entity id and feature name in storage keys.
pub const KEY_SEPARATOR: char = '.';

fn check_component(value: &str) -> Option<&'static str> {
    if value.contains(KEY_SEPARATOR) {
        Some("contains the key separator '.'")
    } else if value.chars().any(char::is_control) {
        Some("contains control characters")
    } else {
        None
    }
}

/// An opaque entity identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct EntityId(String);

impl EntityId {
    /// Validates and wraps an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`EncodingError::InvalidEntityId`] if the id is empty, contains
    /// [`KEY_SEPARATOR`], or contains control characters.
    pub fn new(id: impl Into<String>) -> Result<Self, EncodingError> {
        let id = id.into();
        let reason = if id.is_empty() {
            Some("must not be empty")
        } else {
            check_component(&id)
        };
        match reason {
            Some(reason) => Err(EncodingError::InvalidEntityId { id, reason }),
            None => Ok(Self(id)),
        }
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the id and returns the owned string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EntityId {
    type Error = EncodingError;

    fn try_from(id: String) -> Result<Self, Self::Error> {
        Self::new(id)
    }
}

impl TryFrom<&str> for EntityId {
    type Error = EncodingError;

    fn try_from(id: &str) -> Result<Self, Self::Error> {
        Self::new(id)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

/// A named, closed index range `[start, end]` over a feature series.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RawWindow", into = "RawWindow"))]
pub struct FeatureWindow {
    name: String,
    start: i16,
    end: i16,
}

impl FeatureWindow {
    /// Builds a window from already-narrowed bounds.
    ///
    /// # Errors
    ///
    /// - [`EncodingError::InvertedWindow`] if `start > end`
    /// - [`EncodingError::InvalidWindowName`] if the name contains
    ///   [`KEY_SEPARATOR`] or control characters
    pub fn new(name: impl Into<String>, start: i16, end: i16) -> Result<Self, EncodingError> {
        Self::from_bounds(name, i64::from(start), i64::from(end))
    }

    /// Builds a window from wide integer bounds, range-checking both into
    /// `i16`.
    ///
    /// # Errors
    ///
    /// Everything [`FeatureWindow::new`] rejects, plus
    /// [`EncodingError::BoundOutOfRange`] when a bound does not fit `i16`.
    pub fn from_bounds(
        name: impl Into<String>,
        start: i64,
        end: i64,
    ) -> Result<Self, EncodingError> {
        let name = name.into();
        if let Some(reason) = check_component(&name) {
            return Err(EncodingError::InvalidWindowName { name, reason });
        }

        let narrow = |value: i64| {
            i16::try_from(value).map_err(|_| EncodingError::BoundOutOfRange {
                name: name.clone(),
                value,
            })
        };
        let start_i16 = narrow(start)?;
        let end_i16 = narrow(end)?;

        if start_i16 > end_i16 {
            return Err(EncodingError::InvertedWindow { name, start, end });
        }

        Ok(Self {
            name,
            start: start_i16,
            end: end_i16,
        })
    }

    /// A window over the default (unnamed) series.
    ///
    /// # Errors
    ///
    /// Returns [`EncodingError::InvertedWindow`] if `start > end`.
    pub fn default_series(start: i16, end: i16) -> Result<Self, EncodingError> {
        Self::new(DEFAULT_WINDOW_NAME, start, end)
    }

    /// Feature name; empty for the default series.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// First position, inclusive.
    pub const fn start(&self) -> i16 {
        self.start
    }

    /// Last position, inclusive.
    pub const fn end(&self) -> i16 {
        self.end
    }

    /// Whether this window selects the default (unnamed) series.
    pub fn is_default(&self) -> bool {
        self.name.is_empty()
    }

    /// Number of positions covered; both ends are included.
    pub const fn len(&self) -> usize {
        (self.end as i32 - self.start as i32 + 1) as usize
    }

    /// Windows are never empty; a single position is `start == end`.
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Every position covered, in order.
    pub const fn positions(&self) -> RangeInclusive<i16> {
        self.start..=self.end
    }
}

impl fmt::Display for FeatureWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = if self.is_default() {
            "<default>"
        } else {
            &self.name
        };
        write!(f, "{name}[{}..={}]", self.start, self.end)
    }
}

impl<S: Into<String>> TryFrom<(S, i32, i32)> for FeatureWindow {
    type Error = EncodingError;

    fn try_from((name, start, end): (S, i32, i32)) -> Result<Self, Self::Error> {
        Self::from_bounds(name, i64::from(start), i64::from(end))
    }
}

#[cfg(feature = "serde")]
#[derive(serde::Serialize, serde::Deserialize)]
struct RawWindow {
    name: String,
    start: i64,
    end: i64,
}

#[cfg(feature = "serde")]
impl TryFrom<RawWindow> for FeatureWindow {
    type Error = EncodingError;

    fn try_from(raw: RawWindow) -> Result<Self, Self::Error> {
        Self::from_bounds(raw.name, raw.start, raw.end)
    }
}

#[cfg(feature = "serde")]
impl From<FeatureWindow> for RawWindow {
    fn from(window: FeatureWindow) -> Self {
        Self {
            name: window.name,
            start: i64::from(window.start),
            end: i64::from(window.end),
        }
    }
}

/// Ordered ids and windows; the two axes of the response grid.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeatureRequest {
    ids: Vec<EntityId>,
    windows: Vec<FeatureWindow>,
}

impl FeatureRequest {
    /// # Errors
    ///
    /// Returns [`EncodingError::DuplicateWindow`] if two windows share a name.
    /// Duplicate ids are allowed and stay independent rows.
    pub fn new(ids: Vec<EntityId>, windows: Vec<FeatureWindow>) -> Result<Self, EncodingError> {
        check_unique_names(&windows)?;
        Ok(Self { ids, windows })
    }

    /// Requested ids, in request order.
    pub fn ids(&self) -> &[EntityId] {
        &self.ids
    }

    /// Requested windows, in request order.
    pub fn windows(&self) -> &[FeatureWindow] {
        &self.windows
    }

    /// `(ids, windows)`, the shape of the grid this request produces.
    pub fn shape(&self) -> (usize, usize) {
        (self.ids.len(), self.windows.len())
    }

    /// Splits the request into its ids and windows.
    pub fn into_parts(self) -> (Vec<EntityId>, Vec<FeatureWindow>) {
        (self.ids, self.windows)
    }
}

pub(crate) fn check_unique_names(windows: &[FeatureWindow]) -> Result<(), EncodingError> {
    let mut seen = HashSet::with_capacity(windows.len());
    for window in windows {
        if !seen.insert(window.name()) {
            return Err(EncodingError::DuplicateWindow {
                name: window.name.clone(),
            });
        }
    }
    Ok(())
}
