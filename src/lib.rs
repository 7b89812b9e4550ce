//! Capture-log filtering and export library.
//!
//! This crate provides the core types and logic used by the `capture-export`
//! binary and the `inspect` tool:
//!
//! - `record`: the tab-separated capture line format (decode, byte-exact encode)
//! - `channel`: filter keys and billing groups per (exchange, channel)
//! - `format`: the formatter capability and its registry
//! - `filter`: the per-object decode/filter/transform/encode engine with time
//!   windowing and early termination
//! - `dataset`: ordered multi-object resolution and the gzip directory store
//! - `usage`: byte accounting split into order-book and other traffic, and cost
//! - `request`: request validation and the end-to-end [`Exporter`]
//!
//! Each request is one sequential pass over a bounded time slice; the body is
//! returned only when every object was read without error and the accounted
//! bytes match the body length exactly.
pub mod channel;
pub mod dataset;
pub mod error;
pub mod filter;
pub mod format;
pub mod record;
pub mod request;
pub mod usage;

pub use error::{DecodeError, Error, FormatError, Result};
pub use request::{Export, ExportRequest, Exporter};
