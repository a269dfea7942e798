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
//! Minimal RIFF/WAVE container support for 16-bit PCM recordings
//!
//! When a WAV file is consumed as I/Q, one channel maps to I with Q = 0,
//! and two channels map left to I and right to Q.
//!

use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use num_complex::Complex32;

use crate::error::{Error, Result};

/// Length of the fixed header this module reads and writes
pub const HEADER_LENGTH: usize = 44;

/// The fields of a 44-byte PCM WAV header
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WavHeader {
    /// Number of interleaved channels (1 or 2)
    pub channels: u16,
    /// Sample rate in hertz
    pub sample_rate: u32,
    /// Length of the data chunk in bytes
    pub data_bytes: u32,
}

impl WavHeader {
    /// Returns the number of sample frames in the data chunk
    pub fn frames(&self) -> u32 {
        self.data_bytes / (u32::from(self.channels) * 2)
    }
}

/// Reads and validates a 44-byte PCM WAV header
pub fn read_header<R>(reader: &mut R) -> Result<WavHeader>
where
    R: Read,
{
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != b"RIFF" {
        return Err(Error::InvalidInput("missing RIFF magic".to_owned()));
    }
    let _file_size = reader.read_u32::<LE>()?;
    reader.read_exact(&mut magic)?;
    if &magic != b"WAVE" {
        return Err(Error::InvalidInput("missing WAVE magic".to_owned()));
    }
    reader.read_exact(&mut magic)?;
    if &magic != b"fmt " {
        return Err(Error::InvalidInput("missing fmt chunk".to_owned()));
    }
    let fmt_size = reader.read_u32::<LE>()?;
    if fmt_size != 16 {
        return Err(Error::InvalidInput(format!(
            "unsupported fmt chunk size {}",
            fmt_size
        )));
    }
    let format_tag = reader.read_u16::<LE>()?;
    if format_tag != 1 {
        return Err(Error::InvalidInput(format!(
            "unsupported format tag {} (expected PCM)",
            format_tag
        )));
    }
    let channels = reader.read_u16::<LE>()?;
    if channels == 0 || channels > 2 {
        return Err(Error::InvalidInput(format!(
            "unsupported channel count {}",
            channels
        )));
    }
    let sample_rate = reader.read_u32::<LE>()?;
    let _byte_rate = reader.read_u32::<LE>()?;
    let _block_align = reader.read_u16::<LE>()?;
    let bits_per_sample = reader.read_u16::<LE>()?;
    if bits_per_sample != 16 {
        return Err(Error::InvalidInput(format!(
            "unsupported bit depth {}",
            bits_per_sample
        )));
    }
    reader.read_exact(&mut magic)?;
    if &magic != b"data" {
        return Err(Error::InvalidInput("missing data chunk".to_owned()));
    }
    let data_bytes = reader.read_u32::<LE>()?;
    Ok(WavHeader {
        channels,
        sample_rate,
        data_bytes,
    })
}

/// Writes a 44-byte PCM WAV header
pub fn write_header<W>(writer: &mut W, header: &WavHeader) -> Result<()>
where
    W: Write,
{
    let block_align = header.channels * 2;
    writer.write_all(b"RIFF")?;
    writer.write_u32::<LE>(36 + header.data_bytes)?;
    writer.write_all(b"WAVE")?;
    writer.write_all(b"fmt ")?;
    writer.write_u32::<LE>(16)?;
    writer.write_u16::<LE>(1)?;
    writer.write_u16::<LE>(header.channels)?;
    writer.write_u32::<LE>(header.sample_rate)?;
    writer.write_u32::<LE>(header.sample_rate * u32::from(block_align))?;
    writer.write_u16::<LE>(block_align)?;
    writer.write_u16::<LE>(16)?;
    writer.write_all(b"data")?;
    writer.write_u32::<LE>(header.data_bytes)?;
    Ok(())
}

/// Yields the PCM payload of a WAV file as normalized complex samples
pub struct WavSampleReader<R> {
    /// Byte source positioned at the start of the data chunk
    reader: R,
    /// Number of interleaved channels
    channels: u16,
    /// Sample frames left to read
    remaining: u32,
    /// Set after the payload is exhausted or has failed
    finished: bool,
}

impl<R> WavSampleReader<R> {
    /// Creates a sample reader over the data chunk described by a header
    pub fn new(reader: R, header: &WavHeader) -> Self {
        WavSampleReader {
            reader,
            channels: header.channels,
            remaining: header.frames(),
            finished: false,
        }
    }
}

impl<R> Iterator for WavSampleReader<R>
where
    R: Read,
{
    type Item = Result<Complex32>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let result = read_sample(&mut self.reader, self.channels);
        if result.is_err() {
            self.finished = true;
        }
        Some(result)
    }
}

/// Reads one sample frame and maps it onto a complex sample
fn read_sample<R>(reader: &mut R, channels: u16) -> Result<Complex32>
where
    R: Read,
{
    let i = f32::from(reader.read_i16::<LE>()?) / 32768.0;
    let q = if channels == 2 {
        f32::from(reader.read_i16::<LE>()?) / 32768.0
    } else {
        0.0
    };
    Ok(Complex32::new(i, q))
}
