//! tbreco-io: File I/O for tbreco.
//!
//! This crate provides the memory-mapped event reader (via memmap2), the CSV
//! hit writer, the JSON run configuration, and a table-driven
//! [`ChannelMapper`](tbreco_core::ChannelMapper) implementation.
//!

mod config;
mod error;
pub mod mapping;
mod reader;
mod writer;

pub use config::RunConfig;
pub use error::{Error, Result};
pub use mapping::{channel_id, Epoch, TableMapper, CHANNELS_PER_BOARD};
pub use reader::{EventFileReader, MappedFileReader, RawEvent};
pub use writer::{HitFileWriter, CSV_HEADER};
