use crate::proto::VALUE_SIZE;
use bytes::{BufMut, Bytes, BytesMut};
use core::fmt;
use core::iter::FusedIterator;
use core::slice::ChunksExact;

/// One grid cell: a variable-length sequence of `f32` feature values.
///
/// The values stay in their wire encoding (packed little-endian) inside a
/// [`Bytes`] buffer. A cell produced in [`crate::ValueMode::View`] is a slice
/// of the batch it arrived in and keeps that buffer alive; a cell produced in
/// [`crate::ValueMode::Copy`] owns an allocation of exactly its own size.
///
/// Equality is bitwise over the encoded values.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct FeatureValues {
    bytes: Bytes,
}

impl FeatureValues {
    /// Wraps packed little-endian `f32` bytes. Callers guarantee the length is
    /// a multiple of [`VALUE_SIZE`].
    pub(crate) fn from_le_bytes(bytes: Bytes) -> Self {
        debug_assert_eq!(bytes.len() % VALUE_SIZE, 0);
        Self { bytes }
    }

    /// Encodes `values` into a buffer of their own.
    pub fn from_slice(values: &[f32]) -> Self {
        let mut buf = BytesMut::with_capacity(values.len() * VALUE_SIZE);
        for &v in values {
            buf.put_f32_le(v);
        }
        Self { bytes: buf.freeze() }
    }

    /// Number of values (not bytes).
    pub fn len(&self) -> usize {
        self.bytes.len() / VALUE_SIZE
    }

    /// Whether the cell holds no values.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The value at `index`, decoded.
    pub fn get(&self, index: usize) -> Option<f32> {
        let start = index.checked_mul(VALUE_SIZE)?;
        let raw = self.bytes.get(start..start.checked_add(VALUE_SIZE)?)?;
        Some(f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    /// Decodes the values front to back.
    pub fn iter(&self) -> Values<'_> {
        Values {
            chunks: self.bytes.chunks_exact(VALUE_SIZE),
        }
    }

    /// Decodes every value into a new vector.
    pub fn to_vec(&self) -> Vec<f32> {
        self.iter().collect()
    }

    /// The packed little-endian encoding.
    pub fn as_le_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the cell and returns its packed little-endian buffer.
    pub fn into_le_bytes(self) -> Bytes {
        self.bytes
    }

    /// Copies the values into a buffer of their own, releasing any batch
    /// buffer this cell was viewing.
    #[must_use]
    pub fn detach(&self) -> Self {
        Self {
            bytes: Bytes::copy_from_slice(&self.bytes),
        }
    }
}

impl fmt::Debug for FeatureValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl From<&[f32]> for FeatureValues {
    fn from(values: &[f32]) -> Self {
        Self::from_slice(values)
    }
}

impl From<Vec<f32>> for FeatureValues {
    fn from(values: Vec<f32>) -> Self {
        Self::from_slice(&values)
    }
}

impl PartialEq<[f32]> for FeatureValues {
    fn eq(&self, other: &[f32]) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a == *b)
    }
}

impl PartialEq<Vec<f32>> for FeatureValues {
    fn eq(&self, other: &Vec<f32>) -> bool {
        self == other.as_slice()
    }
}

impl<const N: usize> PartialEq<[f32; N]> for FeatureValues {
    fn eq(&self, other: &[f32; N]) -> bool {
        self == other.as_slice()
    }
}

impl<'a> IntoIterator for &'a FeatureValues {
    type Item = f32;
    type IntoIter = Values<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the decoded values of a [`FeatureValues`].
#[derive(Clone, Debug)]
pub struct Values<'a> {
    chunks: ChunksExact<'a, u8>,
}

impl Iterator for Values<'_> {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        self.chunks
            .next()
            .map(|raw| f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl DoubleEndedIterator for Values<'_> {
    fn next_back(&mut self) -> Option<f32> {
        self.chunks
            .next_back()
            .map(|raw| f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }
}

impl ExactSizeIterator for Values<'_> {}
impl FusedIterator for Values<'_> {}
