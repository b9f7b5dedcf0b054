//! Memory-mapped event file readers.
//!
//! Event files hold one JSON object per event:
//!
//! ```text
//! {"event": 12, "spill": 3, "timestamp": 1401234567,
//!  "channels": [{"index": 0, "board": 112, "channel": 0, "samples": [...]}, ...]}
//! ```
//!
//! `max`, `pedestal` and `noise` may be given per channel; when absent they
//! are derived from the samples.

use crate::{Error, Result};
use log::warn;
use memmap2::Mmap;
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use tbreco_core::sample::{RawChannelSample, Timestamp};

/// A memory-mapped file reader.
pub struct MappedFileReader {
    mmap: Mmap,
    path: PathBuf,
}

impl MappedFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Path the reader was opened with.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Deserialize)]
struct JsonEvent {
    event: u64,
    #[serde(default)]
    spill: u32,
    timestamp: u64,
    channels: Vec<JsonChannel>,
}

#[derive(Deserialize)]
struct JsonChannel {
    index: i32,
    board: u16,
    channel: u16,
    samples: Vec<u16>,
    max: Option<u16>,
    pedestal: Option<f64>,
    noise: Option<f64>,
}

impl JsonChannel {
    fn into_sample(self, timestamp: Timestamp) -> tbreco_core::Result<RawChannelSample> {
        match (self.max, self.pedestal, self.noise) {
            (Some(max), Some(pedestal), Some(noise)) => RawChannelSample::new(
                self.index,
                self.board,
                self.channel,
                self.samples,
                max,
                pedestal,
                noise,
                timestamp,
            ),
            _ => RawChannelSample::from_waveform(
                self.index,
                self.board,
                self.channel,
                self.samples,
                timestamp,
            ),
        }
    }
}

/// One event's channel samples.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    /// Event number within the run.
    pub event: u64,
    /// Spill number.
    pub spill: u32,
    /// Event timestamp.
    pub timestamp: Timestamp,
    /// Channel samples in file order.
    pub channels: Vec<RawChannelSample>,
}

impl RawEvent {
    fn from_json(json: JsonEvent) -> Self {
        let timestamp = Timestamp::new(json.timestamp);
        let event = json.event;
        let channels = json
            .channels
            .into_iter()
            .filter_map(|channel| {
                let index = channel.index;
                match channel.into_sample(timestamp) {
                    Ok(sample) => Some(sample),
                    Err(e) => {
                        warn!("event {event}: dropping channel {index}: {e}");
                        None
                    }
                }
            })
            .collect();
        Self {
            event,
            spill: json.spill,
            timestamp,
            channels,
        }
    }
}

/// Reader for JSON event files.
pub struct EventFileReader {
    reader: MappedFileReader,
}

impl EventFileReader {
    /// Opens an event file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            reader: MappedFileReader::open(path)?,
        })
    }

    /// File size in bytes.
    #[must_use]
    pub fn file_size(&self) -> usize {
        self.reader.len()
    }

    /// Path of the event file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.reader.path()
    }

    /// Iterates over the events in file order.
    ///
    /// Channels whose waveform has the wrong length are dropped with a
    /// warning; a malformed event ends the iteration with an error.
    pub fn events(&self) -> impl Iterator<Item = Result<RawEvent>> + '_ {
        let mut stream =
            serde_json::Deserializer::from_slice(self.reader.as_bytes()).into_iter::<JsonEvent>();
        let mut failed = false;
        std::iter::from_fn(move || {
            if failed {
                return None;
            }
            match stream.next()? {
                Ok(json) => Some(Ok(RawEvent::from_json(json))),
                Err(e) => {
                    failed = true;
                    Some(Err(Error::from(e)))
                }
            }
        })
    }

    /// Reads every event into memory.
    ///
    /// # Errors
    /// Returns an error on the first malformed event.
    pub fn read_all(&self) -> Result<Vec<RawEvent>> {
        self.events().collect()
    }
}
