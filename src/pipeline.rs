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
//! Top-level discovery interface
//!
//! The pipeline pulls frames lazily from the sample source and processes
//! each one end to end: transform, power spectrum, detection, clustering,
//! and emission of any events that completed. Everything runs on the
//! calling thread.
//!

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use num_complex::{Complex32, Complex64};
use num_traits::Zero;

use crate::cluster::{ClusterConfig, Clusterer};
use crate::detect::{CfarConfig, OsCfar};
use crate::emit::{CutoutWriter, EventWriter};
use crate::error::{Error, Result};
use crate::event::Event;
use crate::features::{FeatureConfig, FeatureExtractor, Features};
use crate::fft;
use crate::framer::Framer;

/// Default maximum time gap within a cluster, in seconds
pub const DEFAULT_TIME_GAP: f64 = 0.1;
/// Default maximum frequency gap for matching and merging, in hertz
pub const DEFAULT_FREQ_GAP: f64 = 5_000.0;
/// Default cap on simultaneously active clusters
pub const DEFAULT_MAX_CLUSTERS: usize = 100;

/// Consecutive emitter write failures tolerated before aborting
const MAX_WRITE_FAILURES: u32 = 3;

/// Setup for a discovery run
pub struct DiscoverSetup<I, W> {
    /// Sample source
    source: I,
    /// Sample rate of the source, in hertz
    sample_rate: f64,
    /// Transform length
    fft_size: usize,
    /// Sample offset between consecutive frames
    hop_size: usize,
    /// Detector parameters
    cfar: CfarConfig,
    /// Maximum time gap within a cluster, seconds
    max_time_gap: f64,
    /// Maximum frequency gap for matching and merging, hertz
    max_freq_gap: f64,
    /// Cap on simultaneously active clusters
    max_clusters: usize,
    /// Destination for event records
    event_writer: EventWriter<W>,
    /// Optional cutout writer
    cutouts: Option<CutoutWriter>,
    /// Stop flag, used to cancel discovery between frames
    stop: Option<Arc<AtomicBool>>,
}

impl<I, W> DiscoverSetup<I, W> {
    /// Creates a setup with default detector and clustering parameters
    pub fn new(
        source: I,
        sample_rate: f64,
        fft_size: usize,
        hop_size: usize,
        event_writer: EventWriter<W>,
    ) -> Self {
        DiscoverSetup {
            source,
            sample_rate,
            fft_size,
            hop_size,
            cfar: CfarConfig::default(),
            max_time_gap: DEFAULT_TIME_GAP,
            max_freq_gap: DEFAULT_FREQ_GAP,
            max_clusters: DEFAULT_MAX_CLUSTERS,
            event_writer,
            cutouts: None,
            stop: None,
        }
    }

    /// Sets the detector parameters
    pub fn set_cfar(&mut self, cfar: CfarConfig) -> &mut Self {
        self.cfar = cfar;
        self
    }

    /// Sets the maximum time gap within a cluster, in seconds
    pub fn set_max_time_gap(&mut self, gap: f64) -> &mut Self {
        self.max_time_gap = gap;
        self
    }

    /// Sets the maximum frequency gap for matching and merging, in hertz
    pub fn set_max_freq_gap(&mut self, gap: f64) -> &mut Self {
        self.max_freq_gap = gap;
        self
    }

    /// Sets the cap on simultaneously active clusters
    pub fn set_max_clusters(&mut self, max_clusters: usize) -> &mut Self {
        self.max_clusters = max_clusters;
        self
    }

    /// Enables cutout generation through the provided writer
    pub fn set_cutout_writer(&mut self, cutouts: CutoutWriter) -> &mut Self {
        self.cutouts = Some(cutouts);
        self
    }

    /// Sets the stop flag, which cancels discovery between frames
    ///
    /// On cancellation the clusterer is flushed as if the current time were
    /// infinitely far in the future, so events that already collected enough
    /// detections are still emitted.
    pub fn set_stop_flag(&mut self, stop: Arc<AtomicBool>) -> &mut Self {
        self.stop = Some(stop);
        self
    }
}

/// Information about a completed discovery run
#[derive(Debug)]
pub struct Report {
    /// Frames processed
    frames: u64,
    /// Samples consumed
    samples: u64,
    /// Raw detections produced
    detections: u64,
    /// Events emitted
    events: u64,
    /// Detections dropped because the cluster set was full
    dropped_detections: u64,
    /// Cutouts written
    cutouts: u64,
    /// True if the run was cancelled through the stop flag
    cancelled: bool,
    /// Total processing time
    run_time: Duration,
}

impl Report {
    /// Returns the number of frames processed
    pub fn frames(&self) -> u64 {
        self.frames
    }
    /// Returns the number of samples consumed
    pub fn samples(&self) -> u64 {
        self.samples
    }
    /// Returns the number of raw detections produced
    pub fn detections(&self) -> u64 {
        self.detections
    }
    /// Returns the number of events emitted
    pub fn events(&self) -> u64 {
        self.events
    }
    /// Returns the number of detections dropped at cluster capacity
    pub fn dropped_detections(&self) -> u64 {
        self.dropped_detections
    }
    /// Returns the number of cutouts written
    pub fn cutouts(&self) -> u64 {
        self.cutouts
    }
    /// Returns true if the run was cancelled through the stop flag
    pub fn cancelled(&self) -> bool {
        self.cancelled
    }
    /// Returns the total processing time
    pub fn run_time(&self) -> Duration {
        self.run_time
    }
}

/// Discovers signal events using the provided setup
///
/// Frames are processed end to end in source order. Detections are handed
/// to the clusterer in non-decreasing frame time order and events reach the
/// emitter in non-decreasing end time order.
pub fn discover<I, W>(setup: DiscoverSetup<I, W>) -> Result<Report>
where
    I: Iterator<Item = Result<Complex32>>,
    W: Write,
{
    let start_instant = Instant::now();
    let sample_rate = setup.sample_rate;
    if !(sample_rate > 0.0) || !sample_rate.is_finite() {
        return Err(Error::InvalidConfig(format!(
            "sample rate {} must be positive",
            sample_rate
        )));
    }
    let fft_size = setup.fft_size;
    let plan = fft::Plan::new(fft_size, fft::Direction::Forward)?;
    let framer = Framer::new(setup.source, fft_size, setup.hop_size)?;
    let detector = OsCfar::new(fft_size, setup.cfar)?;
    let mut clusterer = Clusterer::new(ClusterConfig {
        max_time_gap: setup.max_time_gap,
        max_freq_gap: setup.max_freq_gap,
        max_clusters: setup.max_clusters,
        sample_rate,
        fft_size,
    })?;
    let extractor = FeatureExtractor::new(FeatureConfig::new(sample_rate))?;
    let stop = setup
        .stop
        .unwrap_or_else(|| Arc::new(AtomicBool::new(false)));

    let mut time_buffer = vec![Complex64::zero(); fft_size];
    let mut spectrum = vec![Complex64::zero(); fft_size];
    let mut power = vec![0.0f64; fft_size];
    let mut have_spectrum = false;

    let mut emitter = Emitter {
        events: setup.event_writer,
        cutouts: setup.cutouts,
        pending: None,
        consecutive_failures: 0,
    };

    let mut frames = 0u64;
    let mut samples = 0u64;
    let mut detections_total = 0u64;
    let mut cancelled = false;
    let mut failure: Option<Error> = None;

    for frame_result in framer {
        if stop.load(Ordering::Relaxed) {
            log::info!("stop requested, flushing {} active clusters", clusterer.active_clusters());
            cancelled = true;
            break;
        }
        let frame = match frame_result {
            Ok(frame) => frame,
            Err(e) => {
                log::error!("source read failed at frame {}: {}", frames, e);
                failure = Some(e);
                break;
            }
        };
        frames += 1;
        samples = frame.start_sample() + fft_size as u64;

        let frame_status = (|| -> Result<()> {
            for (slot, sample) in time_buffer.iter_mut().zip(frame.samples()) {
                *slot = Complex64::new(f64::from(sample.re), f64::from(sample.im));
            }
            plan.execute(&time_buffer, &mut spectrum)?;
            fft::power_spectrum(&spectrum, true, &mut power)?;
            fft::shift(&mut power)?;
            have_spectrum = true;

            let frame_time = frame.start_time(sample_rate);
            let detections = detector.process_frame(&power)?;
            detections_total += detections.len() as u64;
            for detection in &detections {
                // A false return means the cluster set is full; the drop is
                // counted and processing continues
                clusterer.add_detection(detection, frame_time);
            }
            emitter.retry_pending()?;
            for mut event in clusterer.completed_events(frame_time) {
                enrich_event(&mut event, &extractor, &power, fft_size, sample_rate)?;
                emitter.emit(event)?;
            }
            Ok(())
        })();
        if let Err(e) = frame_status {
            log::error!("processing failed at frame {}: {}", frames - 1, e);
            failure = Some(e);
            break;
        }
    }

    // Flush remaining clusters, as on cancellation, even if a frame failed
    let flush_status = (|| -> Result<()> {
        for mut event in clusterer.flush() {
            if have_spectrum {
                enrich_event(&mut event, &extractor, &power, fft_size, sample_rate)?;
            }
            emitter.emit(event)?;
        }
        emitter.finish()
    })();
    if let Some(e) = failure {
        return Err(e);
    }
    flush_status?;

    Ok(Report {
        frames,
        samples,
        detections: detections_total,
        events: emitter.events.events_written(),
        dropped_detections: clusterer.dropped_detections(),
        cutouts: emitter.cutouts.as_ref().map_or(0, |c| c.cutouts_written() as u64),
        cancelled,
        run_time: start_instant.elapsed(),
    })
}

/// Replaces the clusterer's bandwidth proxy and modulation guess with the
/// feature extractor's values when a valid descriptor is available
fn enrich_event(
    event: &mut Event,
    extractor: &FeatureExtractor,
    power: &[f64],
    fft_size: usize,
    sample_rate: f64,
) -> Result<()> {
    let center_bin = ((event.center_frequency / sample_rate + 0.5) * fft_size as f64)
        .round()
        .max(0.0)
        .min((fft_size - 1) as f64) as usize;
    let features: Features = extractor.analyze(power, center_bin, 0)?;
    if features.valid {
        event.bandwidth = features.occupied_bandwidth_hz;
        event.modulation = features.modulation.to_owned();
        event.modulation_confidence = features.modulation_confidence;
    }
    Ok(())
}

/// Event emission with single-record buffering on write failure
///
/// A failed record write is retried on later frames; after three consecutive
/// failures the pipeline aborts. The cutout data file is written before its
/// sidecar, and only after the event record was accepted.
struct Emitter<W> {
    /// Record destination
    events: EventWriter<W>,
    /// Optional cutout writer
    cutouts: Option<CutoutWriter>,
    /// The one buffered record awaiting re-emission
    pending: Option<Event>,
    /// Consecutive write failures
    consecutive_failures: u32,
}

impl<W> Emitter<W>
where
    W: Write,
{
    /// Emits one event, retrying any buffered record first
    fn emit(&mut self, event: Event) -> Result<()> {
        self.retry_pending()?;
        if self.pending.is_some() {
            // Only one record may be buffered
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "event destination is not accepting records",
            )));
        }
        self.try_write(event)
    }

    /// Attempts to re-emit the buffered record, if any
    fn retry_pending(&mut self) -> Result<()> {
        if let Some(event) = self.pending.take() {
            self.try_write(event)?;
        }
        Ok(())
    }

    /// Writes one record, buffering it on failure
    fn try_write(&mut self, event: Event) -> Result<()> {
        match self.events.write_event(&event) {
            Ok(()) => {
                self.consecutive_failures = 0;
                if let Some(cutouts) = self.cutouts.as_mut() {
                    cutouts.write_cutout(&event)?;
                }
                Ok(())
            }
            Err(e) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= MAX_WRITE_FAILURES {
                    log::error!("event write failed {} times, aborting: {}", self.consecutive_failures, e);
                    Err(Error::Io(e))
                } else {
                    log::warn!("event write failed, buffering record: {}", e);
                    self.pending = Some(event);
                    Ok(())
                }
            }
        }
    }

    /// Re-emits any buffered record and flushes the destination
    fn finish(&mut self) -> Result<()> {
        while self.pending.is_some() {
            self.retry_pending()?;
        }
        self.events.flush()?;
        Ok(())
    }
}
