//! JSON-table channel map.
//!
//! ```text
//! {
//!   "channels_per_board": 32,
//!   "epochs": [{"start": 0, "boards": [112, 113]},
//!              {"start": 1401000000, "boards": [113, 112]}],
//!   "positions": [{"id": 11200, "x": -2.5, "y": 0.0, "z": 10.0}, ...],
//!   "fibers": [{"index": 0, "module": -1, "fiber": 3}, ...]
//! }
//! ```
//!
//! The board order of an epoch assigns channel indices: index `i` reads
//! channel `i % channels_per_board` of board `boards[i / channels_per_board]`.

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tbreco_core::{ChannelMapper, Timestamp};

/// Default number of readout channels per board.
pub const CHANNELS_PER_BOARD: u32 = 32;

/// Channel id of `channel` on `board`.
#[inline]
#[must_use]
pub fn channel_id(board: u16, channel: u16) -> u32 {
    u32::from(board) * 100 + u32::from(channel)
}

/// Board order valid from `start` until the next epoch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Epoch {
    pub start: u64,
    pub boards: Vec<u16>,
}

#[derive(Deserialize)]
struct PositionEntry {
    id: u32,
    x: f64,
    y: f64,
    z: f64,
}

#[derive(Deserialize)]
struct FiberEntry {
    index: i32,
    module: i32,
    fiber: i32,
}

fn default_channels_per_board() -> u32 {
    CHANNELS_PER_BOARD
}

#[derive(Deserialize)]
struct MapFile {
    #[serde(default = "default_channels_per_board")]
    channels_per_board: u32,
    epochs: Vec<Epoch>,
    #[serde(default)]
    positions: Vec<PositionEntry>,
    #[serde(default)]
    fibers: Vec<FiberEntry>,
}

/// Channel mapper backed by lookup tables.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMapper {
    channels_per_board: u32,
    epochs: Vec<Epoch>,
    positions: HashMap<u32, (f64, f64, f64)>,
    fibers: HashMap<i32, (i32, i32)>,
}

impl TableMapper {
    /// Parses a channel map from JSON text.
    ///
    /// # Errors
    /// Returns an error if the JSON is malformed, there are no epochs, or
    /// `channels_per_board` is zero.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: MapFile = serde_json::from_str(json)?;
        if file.epochs.is_empty() {
            return Err(Error::InvalidFormat("channel map has no epochs".into()));
        }
        if file.channels_per_board == 0 {
            return Err(Error::InvalidFormat(
                "channels_per_board must be positive".into(),
            ));
        }
        let mut epochs = file.epochs;
        epochs.sort_by_key(|e| e.start);
        Ok(Self {
            channels_per_board: file.channels_per_board,
            epochs,
            positions: file
                .positions
                .into_iter()
                .map(|p| (p.id, (p.x, p.y, p.z)))
                .collect(),
            fibers: file
                .fibers
                .into_iter()
                .map(|f| (f.index, (f.module, f.fiber)))
                .collect(),
        })
    }

    /// Reads a channel map file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Epochs sorted by start time.
    #[must_use]
    pub fn epochs(&self) -> &[Epoch] {
        &self.epochs
    }

    /// The epoch in force at `timestamp`.
    #[must_use]
    pub fn epoch_at(&self, timestamp: Timestamp) -> Option<&Epoch> {
        self.epochs
            .iter()
            .rev()
            .find(|e| e.start <= timestamp.as_u64())
    }

    /// Board and board-local channel read by `index` at `timestamp`.
    #[must_use]
    pub fn board_channel(&self, index: i32, timestamp: Timestamp) -> Option<(u16, u16)> {
        let index = u32::try_from(index).ok()?;
        let epoch = self.epoch_at(timestamp)?;
        let slot = usize::try_from(index / self.channels_per_board).ok()?;
        let board = *epoch.boards.get(slot)?;
        let channel = u16::try_from(index % self.channels_per_board).ok()?;
        Some((board, channel))
    }

    /// Number of channel indices mapped at `timestamp`.
    #[must_use]
    pub fn channel_count(&self, timestamp: Timestamp) -> usize {
        self.epoch_at(timestamp).map_or(0, |e| {
            e.boards.len() * usize::try_from(self.channels_per_board).unwrap_or(0)
        })
    }
}

fn unmapped(index: i32, timestamp: Timestamp) -> tbreco_core::Error {
    tbreco_core::Error::UnmappedChannel {
        index,
        timestamp: timestamp.as_u64(),
    }
}

impl ChannelMapper for TableMapper {
    fn channel_xyz(&self, index: i32, timestamp: Timestamp) -> tbreco_core::Result<(f64, f64, f64)> {
        let id = self.channel_id(index, timestamp)?;
        self.positions
            .get(&id)
            .copied()
            .ok_or_else(|| unmapped(index, timestamp))
    }

    fn channel_id(&self, index: i32, timestamp: Timestamp) -> tbreco_core::Result<u32> {
        self.board_channel(index, timestamp)
            .map(|(board, channel)| channel_id(board, channel))
            .ok_or_else(|| unmapped(index, timestamp))
    }

    fn module_fiber(&self, index: i32) -> tbreco_core::Result<(i32, i32)> {
        self.fibers
            .get(&index)
            .copied()
            .ok_or(tbreco_core::Error::ChannelOutOfRange {
                index,
                len: self.fibers.len(),
            })
    }
}
