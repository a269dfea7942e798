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
//! Radix-2 discrete Fourier transforms over complex samples
//!
//! A [`Plan`] precomputes the twiddle factors and bit-reversal permutation
//! for one transform size and direction, and can be reused for any number of
//! transforms of that size. The forward transform is unnormalized; the
//! inverse transform applies the 1/N normalization.
//!

use std::f64::consts::PI;

use num_complex::Complex64;

use crate::error::{Error, Result};

/// Largest supported transform size
pub const MAX_SIZE: usize = 1 << 20;

/// Transform direction
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    /// Time domain to frequency domain, unnormalized
    Forward,
    /// Frequency domain to time domain, normalized by 1/N
    Inverse,
}

/// A reusable transform plan for one size and direction
///
/// The twiddle table and bit-reversal table are owned by the plan and are
/// immutable after construction.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Transform size (a power of two)
    size: usize,
    /// Transform direction
    direction: Direction,
    /// Twiddle factors W_N^k for k in [0, N/2)
    twiddles: Vec<Complex64>,
    /// Bit-reversal permutation over [0, N)
    reversed: Vec<usize>,
}

impl Plan {
    /// Creates a plan for the provided size and direction
    ///
    /// The size must be a power of two between 1 and 2^20 inclusive.
    pub fn new(size: usize, direction: Direction) -> Result<Plan> {
        if size == 0 || !size.is_power_of_two() || size > MAX_SIZE {
            return Err(Error::InvalidSize(size));
        }
        let sign = match direction {
            Direction::Forward => -1.0,
            Direction::Inverse => 1.0,
        };
        let twiddles = (0..size / 2)
            .map(|k| {
                let angle = sign * 2.0 * PI * k as f64 / size as f64;
                Complex64::new(angle.cos(), angle.sin())
            })
            .collect();
        let bits = size.trailing_zeros();
        let reversed = (0..size).map(|index| reverse_bits(index, bits)).collect();
        Ok(Plan {
            size,
            direction,
            twiddles,
            reversed,
        })
    }

    /// Returns the transform size
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the transform direction
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Computes the transform of input into output
    ///
    /// Both slices must be exactly the plan size long. The input is not
    /// modified. Returns an internal error if any output bin is non-finite.
    pub fn execute(&self, input: &[Complex64], output: &mut [Complex64]) -> Result<()> {
        if input.len() != self.size || output.len() != self.size {
            return Err(Error::InvalidInput(format!(
                "transform buffers must be {} samples long, got {} in / {} out",
                self.size,
                input.len(),
                output.len()
            )));
        }
        // Initial bit-reversal permutation, then iterative in-place butterflies
        for (index, &source) in self.reversed.iter().enumerate() {
            output[index] = input[source];
        }
        let size = self.size;
        let mut group = 2;
        while group <= size {
            let half = group / 2;
            let stride = size / group;
            let mut start = 0;
            while start < size {
                for k in 0..half {
                    let twiddle = self.twiddles[k * stride];
                    let even = output[start + k];
                    let odd = output[start + k + half] * twiddle;
                    output[start + k] = even + odd;
                    output[start + k + half] = even - odd;
                }
                start += group;
            }
            group *= 2;
        }
        if self.direction == Direction::Inverse {
            let scale = 1.0 / size as f64;
            for bin in output.iter_mut() {
                *bin *= scale;
            }
        }
        for (bin, value) in output.iter().enumerate() {
            if !value.re.is_finite() || !value.im.is_finite() {
                return Err(Error::Internal(format!(
                    "non-finite transform output in bin {}",
                    bin
                )));
            }
        }
        Ok(())
    }
}

/// Reverses the low bits of an index
fn reverse_bits(index: usize, bits: u32) -> usize {
    if bits == 0 {
        0
    } else {
        index.reverse_bits() >> (usize::max_value().count_ones() - bits)
    }
}

/// Computes the power spectrum |X[k]|^2 of a transform output
///
/// With normalize set, each value is divided by N (not N^2), yielding the
/// average power per sample per bin. Returns an internal error if any
/// resulting value is non-finite.
pub fn power_spectrum(bins: &[Complex64], normalize: bool, power: &mut [f64]) -> Result<()> {
    if bins.len() != power.len() {
        return Err(Error::InvalidInput(format!(
            "power spectrum buffer length {} does not match bin count {}",
            power.len(),
            bins.len()
        )));
    }
    let scale = if normalize {
        1.0 / bins.len() as f64
    } else {
        1.0
    };
    for (out, bin) in power.iter_mut().zip(bins.iter()) {
        *out = bin.norm_sqr() * scale;
        if !out.is_finite() {
            return Err(Error::Internal("non-finite power spectrum value".to_owned()));
        }
    }
    Ok(())
}

/// Computes the magnitude of each bin
pub fn magnitudes(bins: &[Complex64]) -> Vec<f64> {
    bins.iter().map(|bin| bin.norm_sqr().sqrt()).collect()
}

/// Computes the phase angle of each bin, in radians
pub fn phases(bins: &[Complex64]) -> Vec<f64> {
    bins.iter().map(|bin| bin.im.atan2(bin.re)).collect()
}

/// Moves the zero-frequency component to the center of the spectrum
///
/// Bin 0 moves to bin N/2, so that bin index maps monotonically to frequency.
/// The length must be even. Applying this twice restores the original order.
pub fn shift<T>(values: &mut [T]) -> Result<()> {
    if values.len() % 2 != 0 {
        return Err(Error::InvalidSize(values.len()));
    }
    let half = values.len() / 2;
    values.rotate_right(half);
    Ok(())
}

/// Converts interleaved real values (re, im, re, im, ...) into complex samples
pub fn from_interleaved(values: &[f64]) -> Result<Vec<Complex64>> {
    if values.len() % 2 != 0 {
        return Err(Error::InvalidInput(format!(
            "interleaved buffer length {} is odd",
            values.len()
        )));
    }
    Ok(values
        .chunks_exact(2)
        .map(|pair| Complex64::new(pair[0], pair[1]))
        .collect())
}

/// Converts complex samples into interleaved real values (re, im, re, im, ...)
pub fn to_interleaved(values: &[Complex64]) -> Vec<f64> {
    let mut interleaved = Vec::with_capacity(values.len() * 2);
    for value in values {
        interleaved.push(value.re);
        interleaved.push(value.im);
    }
    interleaved
}
