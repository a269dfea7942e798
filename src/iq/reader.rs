/*
 * Copyright 2019 The Regents of the University of California
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
//! Reading of raw interleaved I/Q samples
//!

use std::io::{ErrorKind, Read};

use byteorder::{ByteOrder, LittleEndian};
use num_complex::Complex32;

use super::SampleFormat;
use crate::error::{Error, Result};

/// Reads raw interleaved I/Q bytes and yields normalized complex samples
///
/// The reader stops cleanly at end of input when it falls on a sample
/// boundary; a trailing partial sample is reported as invalid input.
pub struct SampleReader<R> {
    /// Byte source
    reader: R,
    /// On-disk sample format
    format: SampleFormat,
    /// Set after the source is exhausted or has failed
    finished: bool,
}

impl<R> SampleReader<R> {
    /// Creates a sample reader over a byte source
    pub fn new(reader: R, format: SampleFormat) -> Self {
        SampleReader {
            reader,
            format,
            finished: false,
        }
    }
}

impl<R> Iterator for SampleReader<R>
where
    R: Read,
{
    type Item = Result<Complex32>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let mut bytes = [0u8; 4];
        let length = self.format.bytes_per_complex();
        match read_full(&mut self.reader, &mut bytes[..length]) {
            Ok(0) => {
                self.finished = true;
                None
            }
            Ok(count) if count == length => Some(Ok(decode(self.format, &bytes[..length]))),
            Ok(count) => {
                self.finished = true;
                Some(Err(Error::InvalidInput(format!(
                    "input ends with a partial sample ({} of {} bytes)",
                    count, length
                ))))
            }
            Err(e) => {
                self.finished = true;
                Some(Err(Error::Io(e)))
            }
        }
    }
}

/// Decodes one complex sample from raw bytes
fn decode(format: SampleFormat, bytes: &[u8]) -> Complex32 {
    match format {
        SampleFormat::Ci8 => Complex32::new(
            f32::from(bytes[0] as i8) / 128.0,
            f32::from(bytes[1] as i8) / 128.0,
        ),
        SampleFormat::Ci16 => Complex32::new(
            f32::from(LittleEndian::read_i16(&bytes[..2])) / 32768.0,
            f32::from(LittleEndian::read_i16(&bytes[2..4])) / 32768.0,
        ),
    }
}

/// Reads until the buffer is full or the source is exhausted
///
/// Returns the number of bytes read, which is less than the buffer length
/// only at end of input.
fn read_full<R>(reader: &mut R, buffer: &mut [u8]) -> std::io::Result<usize>
where
    R: Read,
{
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(count) => filled += count,
            Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ci8_normalization() {
        // -128, -64, 0, 64, 127 in I map to -1.0, -0.5, 0.0, 0.5, 127/128
        let bytes: Vec<u8> = vec![
            0x80, 0, 0xC0, 0, 0x00, 0, 0x40, 0, 0x7F, 0, // I values, Q = 0
        ];
        let samples: Vec<Complex32> = SampleReader::new(&bytes[..], SampleFormat::Ci8)
            .collect::<Result<_>>()
            .unwrap();
        let expected = [-1.0f32, -0.5, 0.0, 0.5, 0.9921875];
        assert_eq!(samples.len(), expected.len());
        for (sample, &value) in samples.iter().zip(expected.iter()) {
            assert!((sample.re - value).abs() < 1.0 / 128.0);
            assert_eq!(sample.im, 0.0);
        }
    }

    #[test]
    fn test_ci16_normalization() {
        let mut bytes = Vec::new();
        for &value in &[-32768i16, -16384, 0, 16384, 32767] {
            bytes.extend_from_slice(&value.to_le_bytes());
            bytes.extend_from_slice(&0i16.to_le_bytes());
        }
        let samples: Vec<Complex32> = SampleReader::new(&bytes[..], SampleFormat::Ci16)
            .collect::<Result<_>>()
            .unwrap();
        let expected = [-1.0f32, -0.5, 0.0, 0.5, 32767.0 / 32768.0];
        for (sample, &value) in samples.iter().zip(expected.iter()) {
            assert!((sample.re - value).abs() < 1.0 / 32768.0);
        }
    }

    #[test]
    fn test_partial_sample_is_invalid() {
        let bytes = [0u8, 0, 0];
        let results: Vec<Result<Complex32>> =
            SampleReader::new(&bytes[..], SampleFormat::Ci16).collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn test_empty_input() {
        let bytes: [u8; 0] = [];
        let mut reader = SampleReader::new(&bytes[..], SampleFormat::Ci8);
        assert!(reader.next().is_none());
    }
}
