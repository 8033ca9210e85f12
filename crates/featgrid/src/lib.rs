#![doc = include_str!("../README.md")]

mod batch;
mod config;
mod error;
#[cfg(feature = "futures")]
mod futures;
mod grid;
pub mod proto;
mod reassembly;
mod retry;
mod schema;
mod source;
mod ticket;
mod values;

pub use crate::batch::*;
pub use crate::config::*;
pub use crate::error::*;
#[cfg(feature = "futures")]
pub use crate::futures::*;
pub use crate::grid::*;
pub use crate::proto::{FeatureBatch, FeatureColumn};
pub use crate::reassembly::*;
pub use crate::retry::*;
pub use crate::schema::*;
pub use crate::source::*;
pub use crate::ticket::*;
pub use crate::values::*;
