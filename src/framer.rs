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
//! Grouping of samples into overlapping transform-sized frames
//!

use num_complex::Complex32;

use crate::error::{Error, Result};
use crate::fft;

/// A contiguous window of complex samples, ready for a transform
#[derive(Debug, Clone)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Frame {
    /// The sequence number of this frame
    index: u64,
    /// The index of the first sample of this frame within the recording
    start_sample: u64,
    /// The samples in this frame
    samples: Vec<Complex32>,
}

impl Frame {
    /// Returns the sequence number of this frame
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Returns the index of this frame's first sample within the recording
    pub fn start_sample(&self) -> u64 {
        self.start_sample
    }

    /// Returns the wall-clock start time of this frame, in seconds
    pub fn start_time(&self, sample_rate: f64) -> f64 {
        self.start_sample as f64 / sample_rate
    }

    /// Returns the samples in this frame
    pub fn samples(&self) -> &[Complex32] {
        &self.samples
    }
}

/// An iterator adapter that groups samples into overlapping frames
///
/// Frame i covers samples [i * hop, i * hop + fft_size). If fewer than
/// fft_size samples are available, no frames are produced. No window
/// function is applied.
pub struct Framer<I> {
    /// Sample source
    inner: I,
    /// Frame length (a power of two)
    fft_size: usize,
    /// Sample offset between consecutive frame starts
    hop: usize,
    /// Rolling copy of the current frame
    window: Vec<Complex32>,
    /// Index of the next frame to produce
    frame_index: u64,
    /// Set once the source is exhausted or has failed
    finished: bool,
}

impl<I> Framer<I> {
    /// Creates a framer over a sample source
    ///
    /// The FFT size must be a power of two no larger than 2^20, and the hop
    /// must satisfy 1 <= hop <= fft_size.
    pub fn new(inner: I, fft_size: usize, hop: usize) -> Result<Self> {
        if fft_size == 0 || !fft_size.is_power_of_two() || fft_size > fft::MAX_SIZE {
            return Err(Error::InvalidSize(fft_size));
        }
        if hop == 0 || hop > fft_size {
            return Err(Error::InvalidConfig(format!(
                "hop size {} must be between 1 and the FFT size {}",
                hop, fft_size
            )));
        }
        Ok(Framer {
            inner,
            fft_size,
            hop,
            window: Vec::with_capacity(fft_size),
            frame_index: 0,
            finished: false,
        })
    }
}

impl<I> Iterator for Framer<I>
where
    I: Iterator<Item = Result<Complex32>>,
{
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.frame_index != 0 {
            // Keep the overlapping tail of the previous frame
            self.window.drain(..self.hop);
        }
        while self.window.len() < self.fft_size {
            match self.inner.next() {
                Some(Ok(sample)) => self.window.push(sample),
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                None => {
                    self.finished = true;
                    return None;
                }
            }
        }
        let frame = Frame {
            index: self.frame_index,
            start_sample: self.frame_index * self.hop as u64,
            samples: self.window.clone(),
        };
        self.frame_index += 1;
        Some(Ok(frame))
    }
}
