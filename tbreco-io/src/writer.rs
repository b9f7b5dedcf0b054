//! Hit file writers.

use crate::Result;
use log::warn;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tbreco_core::{ChannelMapper, HitRecord, ReconstructedHit};
use tbreco_fit::ProcessedHit;

/// Column names written by [`HitFileWriter::write_event`].
pub const CSV_HEADER: &str = "event,index,x,y,z,noise,amplitude,rise_time,chi2,status,good";

/// Writer for reconstructed hit output.
///
/// Writes one CSV line per hit, prefixed with the event number and followed
/// by the hit status and quality verdict.
pub struct HitFileWriter<W: Write = BufWriter<File>> {
    writer: W,
    rows: usize,
    unmapped: usize,
}

impl HitFileWriter {
    /// Creates a new file writer and writes the header line.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> HitFileWriter<W> {
    /// Wraps an arbitrary sink and writes the header line.
    ///
    /// # Errors
    /// Returns an error if the header cannot be written.
    pub fn new(mut writer: W) -> Result<Self> {
        writeln!(writer, "{CSV_HEADER}")?;
        Ok(Self {
            writer,
            rows: 0,
            unmapped: 0,
        })
    }

    /// Writes one hit.
    ///
    /// # Errors
    /// Returns an error if the mapper cannot place the hit or the write fails.
    pub fn write_hit<M: ChannelMapper + ?Sized>(
        &mut self,
        event: u64,
        hit: &ReconstructedHit,
        good: bool,
        mapper: &M,
    ) -> Result<()> {
        let record = HitRecord::from_hit(hit, mapper)?;
        self.write_record(event, &record, hit, good)
    }

    /// Writes every hit of an event.
    ///
    /// Hits the mapper cannot place are skipped with a warning.
    ///
    /// # Errors
    /// Returns an error if a write fails.
    pub fn write_event<M: ChannelMapper + ?Sized>(
        &mut self,
        event: u64,
        hits: &[ProcessedHit],
        mapper: &M,
    ) -> Result<()> {
        for processed in hits {
            match HitRecord::from_hit(&processed.hit, mapper) {
                Ok(record) => {
                    self.write_record(event, &record, &processed.hit, processed.good)?;
                }
                Err(e) => {
                    warn!("event {event}: skipping hit: {e}");
                    self.unmapped += 1;
                }
            }
        }
        Ok(())
    }

    fn write_record(
        &mut self,
        event: u64,
        record: &HitRecord,
        hit: &ReconstructedHit,
        good: bool,
    ) -> Result<()> {
        writeln!(
            self.writer,
            "{event},{record},{},{}",
            hit.status().bits(),
            u8::from(good)
        )?;
        self.rows += 1;
        Ok(())
    }

    /// Hit lines written so far.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Hits skipped because the mapper could not place them.
    #[must_use]
    pub fn unmapped(&self) -> usize {
        self.unmapped
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if the flush fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes and returns the underlying sink.
    ///
    /// # Errors
    /// Returns an error if the flush fails.
    pub fn into_inner(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::TableMapper;
    use tbreco_core::sample::{RawChannelSample, Timestamp, N_SAMPLES};
    use tbreco_core::{HitBuilder, PulseFit, PulseFitter, ReconstructionConfig};
    use tempfile::NamedTempFile;

    struct HalfFitter;

    impl PulseFitter for HalfFitter {
        fn name(&self) -> &'static str {
            "Half"
        }

        fn fit(&self, sample: &RawChannelSample) -> PulseFit {
            PulseFit {
                pedestal: sample.pedestal,
                noise: sample.noise,
                amplitude: 0.5 * f64::from(sample.max_adc),
                rise_time: 3.5,
                chi2: 12.0,
                ndof: 6,
                ..PulseFit::default()
            }
        }
    }

    fn mapper() -> TableMapper {
        TableMapper::from_json(
            r#"{
                "epochs": [{"start": 0, "boards": [112]}],
                "positions": [
                    {"id": 11200, "x": 1.0, "y": 2.0, "z": 3.0},
                    {"id": 11201, "x": -1.0, "y": 2.0, "z": 3.0}
                ]
            }"#,
        )
        .unwrap()
    }

    fn hits() -> Vec<ProcessedHit> {
        let builder = HitBuilder::new(HalfFitter);
        (0..3)
            .map(|index| {
                let sample = RawChannelSample::new(
                    index,
                    112,
                    index as u16,
                    vec![100; N_SAMPLES],
                    800,
                    100.0,
                    2.0,
                    Timestamp(10),
                )
                .unwrap();
                ProcessedHit {
                    hit: builder.build_with(Some(&sample), &ReconstructionConfig::default()),
                    good: index == 0,
                }
            })
            .collect()
    }

    #[test]
    fn test_write_event_csv() {
        let mut writer = HitFileWriter::new(Vec::new()).unwrap();
        writer.write_event(7, &hits(), &mapper()).unwrap();
        assert_eq!(writer.rows(), 2);
        assert_eq!(writer.unmapped(), 1);

        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "7,0,1,2,3,2,400,3.5,12,0,1");
        assert_eq!(lines[2], "7,1,-1,2,3,2,400,3.5,12,0,0");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_write_hit_unmapped_is_error() {
        let mut writer = HitFileWriter::new(Vec::new()).unwrap();
        let hits = hits();
        assert!(writer.write_hit(1, &hits[2].hit, true, &mapper()).is_err());
        assert!(writer.write_hit(1, &hits[0].hit, true, &mapper()).is_ok());
        assert_eq!(writer.rows(), 1);
    }

    #[test]
    fn test_create_file() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = HitFileWriter::create(file.path()).unwrap();
        writer.write_event(0, &hits(), &mapper()).unwrap();
        writer.flush().unwrap();

        let contents = std::fs::read_to_string(file.path()).unwrap();
        assert!(contents.starts_with(CSV_HEADER));
        assert_eq!(contents.lines().count(), 3);
    }
}
