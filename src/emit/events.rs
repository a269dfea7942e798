/*
 * Copyright 2020 The Regents of the University of California
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 *
 */

//!
//! Writing of event records to a destination
//!

use std::io::{Result, Write};

use crate::event::Event;

/// Tags attached to every emitted event
const TAGS: &str = "burst,detection";

/// Column names of the columnar format, in emission order
const HEADER: &str =
    "t_start_s,t_end_s,f_center_Hz,bw_Hz,snr_dB,peak_dBFS,modulation_guess,confidence_0_1,tags";

/// Event record output flavor
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EventFormat {
    /// A header row followed by one comma-separated row per event
    Columnar,
    /// One self-describing key=value line per event
    OneRecordPerLine,
}

/// Writes event records to a destination
///
/// In the columnar format the header row is written before the first event.
pub struct EventWriter<W> {
    /// Record destination
    destination: W,
    /// Output flavor
    format: EventFormat,
    /// Set after the columnar header has been written
    header_written: bool,
    /// Number of records written
    events_written: u64,
}

impl<W> EventWriter<W>
where
    W: Write,
{
    /// Creates an event writer
    pub fn new(destination: W, format: EventFormat) -> Self {
        EventWriter {
            destination,
            format,
            header_written: false,
            events_written: 0,
        }
    }

    /// Writes one event record
    pub fn write_event(&mut self, event: &Event) -> Result<()> {
        match self.format {
            EventFormat::Columnar => {
                if !self.header_written {
                    writeln!(self.destination, "{}", HEADER)?;
                    self.header_written = true;
                }
                writeln!(
                    self.destination,
                    "{:.6},{:.6},{:.3},{:.3},{:.2},{:.2},{},{:.3},\"{}\"",
                    event.start_time,
                    event.end_time,
                    event.center_frequency,
                    event.bandwidth,
                    event.peak_snr_db,
                    event.peak_power_dbfs,
                    event.modulation,
                    event.confidence,
                    TAGS
                )?;
            }
            EventFormat::OneRecordPerLine => {
                writeln!(
                    self.destination,
                    "t_start_s={:.6} t_end_s={:.6} f_center_Hz={:.3} bw_Hz={:.3} snr_dB={:.2} \
                     peak_dBFS={:.2} modulation_guess={} confidence_0_1={:.3} tags=[{}]",
                    event.start_time,
                    event.end_time,
                    event.center_frequency,
                    event.bandwidth,
                    event.peak_snr_db,
                    event.peak_power_dbfs,
                    event.modulation,
                    event.confidence,
                    TAGS
                )?;
            }
        }
        self.events_written += 1;
        Ok(())
    }

    /// Flushes the destination
    pub fn flush(&mut self) -> Result<()> {
        self.destination.flush()
    }

    /// Returns the number of records written
    pub fn events_written(&self) -> u64 {
        self.events_written
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_event() -> Event {
        Event {
            start_time: 0.125,
            end_time: 0.875,
            duration: 0.75,
            min_bin: 1500,
            max_bin: 1510,
            center_frequency: 500_000.0,
            bandwidth: 1_000.0,
            peak_snr_db: 31.234,
            avg_snr_db: 28.0,
            peak_power_dbfs: 12.5,
            detections: 120,
            confidence: 0.8662,
            modulation: "narrowband".to_owned(),
            modulation_confidence: 0.7,
        }
    }

    #[test]
    fn test_columnar_output() {
        let mut buffer = Vec::new();
        {
            let mut writer = EventWriter::new(&mut buffer, EventFormat::Columnar);
            writer.write_event(&sample_event()).unwrap();
            writer.write_event(&sample_event()).unwrap();
            assert_eq!(writer.events_written(), 2);
        }
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "t_start_s,t_end_s,f_center_Hz,bw_Hz,snr_dB,peak_dBFS,modulation_guess,\
             confidence_0_1,tags"
        );
        assert_eq!(
            lines[1],
            "0.125000,0.875000,500000.000,1000.000,31.23,12.50,narrowband,0.866,\
             \"burst,detection\""
        );
        assert_eq!(lines[1], lines[2]);
    }

    #[test]
    fn test_one_record_per_line_output() {
        let mut buffer = Vec::new();
        EventWriter::new(&mut buffer, EventFormat::OneRecordPerLine)
            .write_event(&sample_event())
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(
            text,
            "t_start_s=0.125000 t_end_s=0.875000 f_center_Hz=500000.000 bw_Hz=1000.000 \
             snr_dB=31.23 peak_dBFS=12.50 modulation_guess=narrowband confidence_0_1=0.866 \
             tags=[burst,detection]\n"
        );
    }
}
