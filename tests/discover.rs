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
//! End-to-end discovery scenarios over synthetic recordings
//!

extern crate iqlab_discover;
extern crate num_complex;
extern crate rand;
extern crate tempfile;

use std::f64::consts::PI;
use std::fs::{self, File};
use std::io::{BufWriter, Write};

use num_complex::Complex32;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use iqlab_discover::detect::CfarConfig;
use iqlab_discover::emit::{CutoutWriter, EventFormat, EventWriter};
use iqlab_discover::iq::{RecordingMeta, SampleFormat, Sidecar};
use iqlab_discover::{discover, DiscoverSetup, Report};

/// Generates complex tones embedded in unit-variance complex Gaussian noise
fn tones_in_noise(
    count: usize,
    sample_rate: f64,
    tones: &[(f64, f32)],
    seed: u64,
) -> Vec<Complex32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut gaussian = move || -> f32 {
        // Box-Muller; each quadrature component has variance 1/2
        let u1: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
        let u2: f64 = rng.gen_range(0.0..1.0);
        ((-u1.ln()).sqrt() * (2.0 * PI * u2).cos()) as f32
    };
    (0..count)
        .map(|n| {
            let mut sample = Complex32::new(gaussian(), gaussian());
            for &(frequency, amplitude) in tones {
                let cycles = frequency / sample_rate * n as f64;
                let phase = (2.0 * PI * cycles.fract()) as f32;
                sample.re += amplitude * phase.cos();
                sample.im += amplitude * phase.sin();
            }
            sample
        })
        .collect()
}

/// One parsed columnar event record
#[derive(Debug)]
struct ParsedEvent {
    t_start: f64,
    t_end: f64,
    f_center: f64,
    bandwidth: f64,
    snr_db: f64,
    modulation: String,
    confidence: f64,
}

/// Parses columnar output into event records
fn parse_events(text: &str) -> Vec<ParsedEvent> {
    let mut lines = text.lines();
    match lines.next() {
        Some(header) => assert!(header.starts_with("t_start_s,")),
        None => return Vec::new(),
    }
    lines
        .map(|line| {
            let fields: Vec<&str> = line.split(',').collect();
            assert!(fields.len() >= 9, "short record: {}", line);
            ParsedEvent {
                t_start: fields[0].parse().unwrap(),
                t_end: fields[1].parse().unwrap(),
                f_center: fields[2].parse().unwrap(),
                bandwidth: fields[3].parse().unwrap(),
                snr_db: fields[4].parse().unwrap(),
                modulation: fields[6].to_owned(),
                confidence: fields[7].parse().unwrap(),
            }
        })
        .collect()
}

/// Runs discovery over in-memory samples and returns the report and records
fn run_discovery(
    samples: Vec<Complex32>,
    sample_rate: f64,
    fft_size: usize,
    hop_size: usize,
    pfa: f64,
) -> (Report, Vec<ParsedEvent>) {
    let mut output = Vec::new();
    let mut setup = DiscoverSetup::new(
        samples.into_iter().map(Ok),
        sample_rate,
        fft_size,
        hop_size,
        EventWriter::new(&mut output, EventFormat::Columnar),
    );
    setup.set_cfar(CfarConfig {
        pfa,
        ..CfarConfig::default()
    });
    let report = discover(setup).unwrap();
    let events = parse_events(&String::from_utf8(output).unwrap());
    assert_eq!(report.events(), events.len() as u64);
    (report, events)
}

#[test]
fn clean_tone_produces_one_event() {
    let sample_rate = 2e6;
    let fft_size = 2048;
    let samples = tones_in_noise(2_000_000, sample_rate, &[(500_000.0, 0.95)], 11);
    let (report, events) = run_discovery(samples, sample_rate, fft_size, 512, 1e-6);
    assert_eq!(events.len(), 1, "expected one event, report {:?}", report);
    let event = &events[0];
    assert!(
        (event.f_center - 500_000.0).abs() <= 2.0 * sample_rate / fft_size as f64,
        "center frequency {}",
        event.f_center
    );
    assert!(event.t_end - event.t_start >= 0.9, "duration too short");
    assert!(event.snr_db >= 20.0, "SNR {}", event.snr_db);
    assert!(event.confidence > 0.5);
    // The tone occupies a single bin, so the bandwidth bucket is CW
    assert_eq!(event.modulation, "cw");
}

#[test]
fn noise_only_produces_no_events() {
    let sample_rate = 2e6;
    let samples = tones_in_noise(1_000_000, sample_rate, &[], 13);
    let (report, events) = run_discovery(samples, sample_rate, 2048, 512, 1e-6);
    assert!(
        events.is_empty(),
        "unexpected events in noise: {:?}, report {:?}",
        events,
        report
    );
}

#[test]
fn two_tones_produce_two_events() {
    let sample_rate = 2e6;
    let fft_size = 4096;
    let samples = tones_in_noise(
        1_000_000,
        sample_rate,
        &[(400_000.0, 0.9), (800_000.0, 0.9)],
        17,
    );
    let (_, mut events) = run_discovery(samples, sample_rate, fft_size, 512, 1e-6);
    assert_eq!(events.len(), 2, "events: {:?}", events);
    events.sort_by(|a, b| a.f_center.partial_cmp(&b.f_center).unwrap());
    let bin_width = sample_rate / fft_size as f64;
    assert!((events[0].f_center - 400_000.0).abs() <= bin_width);
    assert!((events[1].f_center - 800_000.0).abs() <= bin_width);
}

#[test]
fn fft_size_sweep_converges_on_the_tone() {
    let sample_rate = 2e6;
    let samples = tones_in_noise(2_000_000, sample_rate, &[(500_000.0, 0.95)], 19);
    for &fft_size in &[1024usize, 2048, 4096] {
        let (_, events) = run_discovery(samples.clone(), sample_rate, fft_size, 512, 1e-6);
        assert_eq!(events.len(), 1, "fft {} events {:?}", fft_size, events);
        let bin_width = sample_rate / fft_size as f64;
        assert!(
            (events[0].f_center - 500_000.0).abs() <= bin_width,
            "fft {} center {}",
            fft_size,
            events[0].f_center
        );
    }
}

#[test]
fn cutouts_cover_the_padded_event() {
    let sample_rate = 2e6;
    let format = SampleFormat::Ci16;
    // Scaled to keep the tone plus the noise inside the ci16 range
    let samples: Vec<Complex32> = tones_in_noise(2_000_000, sample_rate, &[(500_000.0, 0.95)], 23)
        .into_iter()
        .map(|sample| sample * 0.25)
        .collect();

    let dir = tempfile::tempdir().unwrap();
    let recording_path = dir.path().join("capture.iq");
    let mut recording = BufWriter::new(File::create(&recording_path).unwrap());
    for sample in &samples {
        let i = (f64::from(sample.re) * 32768.0).max(-32768.0).min(32767.0) as i16;
        let q = (f64::from(sample.im) * 32768.0).max(-32768.0).min(32767.0) as i16;
        recording.write_all(&i.to_le_bytes()).unwrap();
        recording.write_all(&q.to_le_bytes()).unwrap();
    }
    recording.flush().unwrap();
    drop(recording);

    let cutout_dir = dir.path().join("cutouts");
    let meta = RecordingMeta {
        format,
        sample_rate,
        frequency: None,
        datetime: None,
    };
    let mut output = Vec::new();
    let mut setup = DiscoverSetup::new(
        samples.into_iter().map(Ok),
        sample_rate,
        2048,
        512,
        EventWriter::new(&mut output, EventFormat::Columnar),
    );
    setup.set_cfar(CfarConfig {
        pfa: 1e-6,
        ..CfarConfig::default()
    });
    setup.set_cutout_writer(CutoutWriter::new(&recording_path, meta, &cutout_dir).unwrap());
    let report = discover(setup).unwrap();
    assert_eq!(report.events(), 1);
    assert_eq!(report.cutouts(), 1);

    let events = parse_events(&String::from_utf8(output).unwrap());
    let event = &events[0];

    let data_path = cutout_dir.join("cutout_0000.iq");
    let meta_path = cutout_dir.join("cutout_0000.json");
    assert!(data_path.exists());
    assert!(meta_path.exists());

    // The data file covers the event range padded by 1 ms on each side,
    // clamped to the recording
    let pad = 0.001;
    let total_samples = 2_000_000f64;
    let expected_start = ((event.t_start - pad) * sample_rate).max(0.0).floor();
    let expected_end = ((event.t_end + pad) * sample_rate).ceil().min(total_samples);
    let expected_bytes = (expected_end - expected_start) as u64 * 4;
    assert_eq!(fs::metadata(&data_path).unwrap().len(), expected_bytes);

    // The annotation bounds match the reported center and bandwidth
    let sidecar = Sidecar::from_file(&meta_path).unwrap();
    assert_eq!(sidecar.datatype, "ci16");
    assert_eq!(sidecar.annotations.len(), 1);
    let annotation = &sidecar.annotations[0];
    let bin_width = sample_rate / 2048.0;
    assert!(
        (annotation.freq_lower_edge - (event.f_center - event.bandwidth / 2.0)).abs() <= bin_width
    );
    assert!(
        (annotation.freq_upper_edge - (event.f_center + event.bandwidth / 2.0)).abs() <= bin_width
    );
    let description = &annotation.description;
    assert!(description.contains("SNR"), "description: {}", description);
}

#[test]
fn ci8_bytes_normalize_to_expected_floats() {
    use iqlab_discover::iq::SampleReader;

    let bytes: Vec<u8> = [-128i8, -64, 0, 64, 127]
        .iter()
        .flat_map(|&i| vec![i as u8, 0u8])
        .collect();
    let samples: Vec<Complex32> = SampleReader::new(&bytes[..], SampleFormat::Ci8)
        .collect::<iqlab_discover::Result<_>>()
        .unwrap();
    let expected = [-1.0f32, -0.5, 0.0, 0.5, 0.9921875];
    assert_eq!(samples.len(), expected.len());
    for (sample, &value) in samples.iter().zip(expected.iter()) {
        assert!((sample.re - value).abs() <= 1.0 / 128.0);
        assert_eq!(sample.im, 0.0);
    }
}
