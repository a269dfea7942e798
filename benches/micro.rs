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

extern crate criterion;
extern crate iqlab_discover;
extern crate num_complex;

use criterion::{criterion_group, criterion_main, Criterion};

use num_complex::Complex64;

use iqlab_discover::detect::{CfarConfig, OsCfar};
use iqlab_discover::fft::{self, Direction, Plan};

fn benchmark_fft(c: &mut Criterion) {
    let sizes = [256_usize, 1024, 2048, 4096];
    {
        let mut group = c.benchmark_group("forward FFT");
        for size in sizes.iter() {
            group.bench_with_input(format!("size {}", *size), size, |b, &size| {
                let plan = Plan::new(size, Direction::Forward).unwrap();
                let input: Vec<Complex64> = (0..size)
                    .map(|n| {
                        let angle = n as f64 * 0.37;
                        Complex64::new(angle.cos(), angle.sin())
                    })
                    .collect();
                let mut output = vec![Complex64::new(0.0, 0.0); size];
                b.iter(|| {
                    plan.execute(&input, &mut output).unwrap();
                })
            });
        }
    }
    {
        let mut group = c.benchmark_group("power spectrum and shift");
        for size in sizes.iter() {
            group.bench_with_input(format!("size {}", *size), size, |b, &size| {
                let bins: Vec<Complex64> = (0..size)
                    .map(|n| Complex64::new(n as f64 * 1e-3, 1.0))
                    .collect();
                let mut power = vec![0.0f64; size];
                b.iter(|| {
                    fft::power_spectrum(&bins, true, &mut power).unwrap();
                    fft::shift(&mut power).unwrap();
                })
            });
        }
    }
}

fn benchmark_detector(c: &mut Criterion) {
    let mut group = c.benchmark_group("OS-CFAR");
    for size in [1024_usize, 2048, 4096].iter() {
        group.bench_with_input(format!("size {}", *size), size, |b, &size| {
            let detector = OsCfar::new(size, CfarConfig::default()).unwrap();
            // A deterministic noise-like spectrum with one strong bin
            let mut spectrum: Vec<f64> = (0..size)
                .map(|n| 1.0 + 0.5 * (n as f64 * 0.61).sin().abs())
                .collect();
            spectrum[size / 3] = 500.0;
            b.iter(|| {
                let detections = detector.process_frame(&spectrum).unwrap();
                assert!(!detections.is_empty());
            })
        });
    }
}

criterion_group!(benches, benchmark_fft, benchmark_detector);
criterion_main!(benches);
