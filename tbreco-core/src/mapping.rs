//! Channel mapper interface.
//!
//! The mapper translates a readout channel index into electronics and
//! geometric identifiers. Lookups that depend on the run period take the
//! event timestamp explicitly; there is no global mapper instance.

use crate::error::Result;
use crate::sample::Timestamp;

/// Trait for channel-map lookup services.
pub trait ChannelMapper: Send + Sync {
    /// Detector position `(x, y, z)` of a channel at the given time.
    ///
    /// # Errors
    /// Returns an error if the channel is not mapped at `timestamp`.
    fn channel_xyz(&self, index: i32, timestamp: Timestamp) -> Result<(f64, f64, f64)>;

    /// Electronics channel id (`board * 100 + channel`) at the given time.
    ///
    /// # Errors
    /// Returns an error if the channel is not mapped at `timestamp`.
    fn channel_id(&self, index: i32, timestamp: Timestamp) -> Result<u32>;

    /// Module and fiber ids of a channel. Negative modules are upstream.
    ///
    /// # Errors
    /// Returns an error if the channel index is unknown.
    fn module_fiber(&self, index: i32) -> Result<(i32, i32)>;

    /// Returns true if the channel reads out the upstream side.
    ///
    /// # Errors
    /// Returns an error if the channel index is unknown.
    fn is_upstream(&self, index: i32) -> Result<bool> {
        Ok(self.module_fiber(index)?.0 < 0)
    }
}
