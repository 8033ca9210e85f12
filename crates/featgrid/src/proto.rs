//! Protobuf messages for the request ticket and the response batches.
//!
//! The schema is closed: the field set never depends on the request. A
//! response batch is column-major, one [`FeatureColumn`] per requested window,
//! each laid out as an offsets list over a packed little-endian `f32` payload.
//!
//! ```text
//! message TicketMessage { uint32 version = 1; repeated string ids = 2; repeated WindowMessage windows = 3; }
//! message WindowMessage { string name = 1; sint32 start = 2; sint32 end = 3; }
//! message FeatureBatch  { uint32 row_count = 1; repeated FeatureColumn columns = 2; }
//! message FeatureColumn { string name = 1; repeated uint32 offsets = 2; bytes values = 3; }
//! ```
//!
//! `FeatureColumn.values` is decoded as [`Bytes`] rather than `Vec<u8>` so a
//! batch decoded from a [`Bytes`] buffer hands out cell views without copying.

use bytes::Bytes;

/// Wire version written into every ticket.
pub const TICKET_VERSION: u32 = 1;

/// Size in bytes of one encoded feature value.
pub const VALUE_SIZE: usize = core::mem::size_of::<f32>();

#[derive(Clone, PartialEq, prost::Message)]
pub struct TicketMessage {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(string, repeated, tag = "2")]
    pub ids: Vec<String>,
    #[prost(message, repeated, tag = "3")]
    pub windows: Vec<WindowMessage>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct WindowMessage {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(sint32, tag = "2")]
    pub start: i32,
    #[prost(sint32, tag = "3")]
    pub end: i32,
}

/// One unit of the response stream: `row_count` consecutive requested ids.
#[derive(Clone, PartialEq, prost::Message)]
pub struct FeatureBatch {
    #[prost(uint32, tag = "1")]
    pub row_count: u32,
    #[prost(message, repeated, tag = "2")]
    pub columns: Vec<FeatureColumn>,
}

/// Values of one window for every row of a batch.
///
/// Row `r` spans elements `offsets[r]..offsets[r + 1]` of `values`, so
/// `offsets` carries `row_count + 1` entries.
#[derive(Clone, PartialEq, prost::Message)]
pub struct FeatureColumn {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(uint32, repeated, tag = "2")]
    pub offsets: Vec<u32>,
    #[prost(bytes = "bytes", tag = "3")]
    pub values: Bytes,
}
