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
//! Aggregation of per-frame detections into coherent events
//!
//! Detections that are close in time and frequency are absorbed into active
//! clusters. A cluster that stays idle longer than the configured time gap
//! is converted into a completed event if it collected enough detections.
//!

use crate::detect::Detection;
use crate::error::{Error, Result};
use crate::event::Event;

/// Minimum number of detections a cluster needs to become an event
const MIN_EVENT_DETECTIONS: u64 = 3;

/// Bandwidth proxy accumulated per absorbed detection, in hertz
const BANDWIDTH_PROXY_HZ: f64 = 1000.0;

/// Floor applied to linear powers before taking logarithms
const POWER_FLOOR: f64 = 1e-20;

/// Clustering engine tuning parameters
#[derive(Debug, Copy, Clone)]
pub struct ClusterConfig {
    /// Maximum time gap in seconds between detections in one cluster
    pub max_time_gap: f64,
    /// Maximum frequency gap in hertz for matching and merging
    pub max_freq_gap: f64,
    /// Cap on simultaneously active clusters
    pub max_clusters: usize,
    /// Sample rate in hertz, for bin-to-frequency conversion
    pub sample_rate: f64,
    /// Spectrum length, for bin-to-frequency conversion
    pub fft_size: usize,
}

/// Aggregation state for one ongoing event
///
/// Owned exclusively by the clustering engine. Center averaging runs in the
/// bin-index domain; conversion to hertz happens once, at event conversion.
#[derive(Debug, Clone)]
struct ActiveCluster {
    /// Time of the first absorbed detection
    start_time: f64,
    /// Time of the most recent absorbed detection
    last_update: f64,
    /// Number of distinct frame times that contributed detections
    frames: u64,
    /// Lowest absorbed bin index
    min_bin: usize,
    /// Highest absorbed bin index
    max_bin: usize,
    /// Running sum of absorbed bin indices
    bin_sum: f64,
    /// Running bandwidth proxy sum
    bandwidth_sum: f64,
    /// Running sum of detection SNRs in decibels
    snr_sum: f64,
    /// Largest absorbed detection SNR in decibels
    peak_snr_db: f64,
    /// Largest absorbed linear bin power
    peak_power: f64,
    /// Number of absorbed detections
    detections: u64,
}

impl ActiveCluster {
    fn new(detection: &Detection, time: f64) -> Self {
        ActiveCluster {
            start_time: time,
            last_update: time,
            frames: 1,
            min_bin: detection.bin,
            max_bin: detection.bin,
            bin_sum: detection.bin as f64,
            bandwidth_sum: BANDWIDTH_PROXY_HZ,
            snr_sum: detection.snr_db,
            peak_snr_db: detection.snr_db,
            peak_power: detection.power,
            detections: 1,
        }
    }

    /// Returns the running mean of absorbed bin indices
    fn mean_bin(&self) -> f64 {
        self.bin_sum / self.detections as f64
    }

    /// Absorbs one detection observed at the provided time
    fn absorb(&mut self, detection: &Detection, time: f64) {
        if time > self.last_update {
            self.frames += 1;
        }
        self.last_update = self.last_update.max(time);
        self.min_bin = self.min_bin.min(detection.bin);
        self.max_bin = self.max_bin.max(detection.bin);
        self.bin_sum += detection.bin as f64;
        self.bandwidth_sum += BANDWIDTH_PROXY_HZ;
        self.snr_sum += detection.snr_db;
        self.peak_snr_db = self.peak_snr_db.max(detection.snr_db);
        self.peak_power = self.peak_power.max(detection.power);
        self.detections += 1;
    }

    /// Merges another cluster into this one, taking the wider bounds and
    /// summing the running aggregates
    fn merge(&mut self, other: ActiveCluster) {
        self.start_time = self.start_time.min(other.start_time);
        self.last_update = self.last_update.max(other.last_update);
        self.frames += other.frames;
        self.min_bin = self.min_bin.min(other.min_bin);
        self.max_bin = self.max_bin.max(other.max_bin);
        self.bin_sum += other.bin_sum;
        self.bandwidth_sum += other.bandwidth_sum;
        self.snr_sum += other.snr_sum;
        self.peak_snr_db = self.peak_snr_db.max(other.peak_snr_db);
        self.peak_power = self.peak_power.max(other.peak_power);
        self.detections += other.detections;
    }

    /// Converts this cluster into a completed event
    fn into_event(self, config: &ClusterConfig) -> Event {
        let duration = self.last_update - self.start_time;
        let mean_bin = self.mean_bin();
        let center_frequency =
            (mean_bin / config.fft_size as f64 - 0.5) * config.sample_rate;
        let bandwidth = self.bandwidth_sum / self.detections as f64;
        let avg_snr_db = self.snr_sum / self.detections as f64;
        let snr_factor = (avg_snr_db / 20.0).max(0.0).min(1.0);
        let duration_factor = duration.max(0.0).min(1.0);
        let confidence = (snr_factor * duration_factor).sqrt();
        let (modulation, modulation_confidence) = if bandwidth < 5_000.0 {
            ("narrowband", 0.7)
        } else if bandwidth < 20_000.0 {
            ("wideband", 0.6)
        } else {
            ("unknown", 0.3)
        };
        Event {
            start_time: self.start_time,
            end_time: self.last_update,
            duration,
            min_bin: self.min_bin,
            max_bin: self.max_bin,
            center_frequency,
            bandwidth,
            peak_snr_db: self.peak_snr_db,
            avg_snr_db,
            peak_power_dbfs: 10.0 * self.peak_power.max(POWER_FLOOR).log10(),
            detections: self.detections,
            confidence,
            modulation: modulation.to_owned(),
            modulation_confidence,
        }
    }
}

/// Transforms a time-ordered stream of detections into completed events
///
/// The engine owns all active clusters exclusively; nothing else holds
/// references into them.
pub struct Clusterer {
    /// Tuning parameters
    config: ClusterConfig,
    /// Active clusters
    clusters: Vec<ActiveCluster>,
    /// Detections dropped because the active set was full
    dropped: u64,
}

impl Clusterer {
    /// Creates a clustering engine
    pub fn new(config: ClusterConfig) -> Result<Clusterer> {
        if !(config.max_time_gap > 0.0) || !config.max_time_gap.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "time gap {} must be positive",
                config.max_time_gap
            )));
        }
        if !(config.max_freq_gap > 0.0) || !config.max_freq_gap.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "frequency gap {} must be positive",
                config.max_freq_gap
            )));
        }
        if config.max_clusters == 0 {
            return Err(Error::InvalidConfig(
                "cluster capacity must be positive".to_owned(),
            ));
        }
        if !(config.sample_rate > 0.0) || !config.sample_rate.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "sample rate {} must be positive",
                config.sample_rate
            )));
        }
        if config.fft_size == 0 {
            return Err(Error::InvalidConfig("FFT size must be positive".to_owned()));
        }
        Ok(Clusterer {
            config,
            clusters: Vec::new(),
            dropped: 0,
        })
    }

    /// Returns the width of one bin in hertz
    fn bin_spacing(&self) -> f64 {
        self.config.sample_rate / self.config.fft_size as f64
    }

    /// Absorbs a detection observed at the provided frame time
    ///
    /// Returns false if the detection was dropped because no cluster matched
    /// and the active set is at capacity. Detections must arrive in
    /// non-decreasing time order.
    pub fn add_detection(&mut self, detection: &Detection, time: f64) -> bool {
        let bin_spacing = self.bin_spacing();
        let mut best: Option<(usize, f64)> = None;
        for (index, cluster) in self.clusters.iter().enumerate() {
            let time_gap = time - cluster.last_update;
            if time_gap > self.config.max_time_gap {
                continue;
            }
            let freq_gap = (detection.bin as f64 - cluster.mean_bin()).abs() * bin_spacing;
            if freq_gap > self.config.max_freq_gap {
                continue;
            }
            let score = 1.0 / (1.0 + time_gap.max(0.0)) * 1.0 / (1.0 + freq_gap / 1000.0);
            // Strict comparison breaks ties toward the smaller cluster index
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((index, score));
            }
        }
        match best {
            Some((index, _)) => self.clusters[index].absorb(detection, time),
            None => {
                if self.clusters.len() >= self.config.max_clusters {
                    self.dropped += 1;
                    log::warn!(
                        "active cluster set full ({}), dropping detection in bin {}",
                        self.config.max_clusters,
                        detection.bin
                    );
                    return false;
                }
                self.clusters.push(ActiveCluster::new(detection, time));
            }
        }
        self.merge_adjacent();
        true
    }

    /// Merges every pair of clusters that are close in both time and frequency
    ///
    /// Quadratic in the active cluster count; the capacity should be sized
    /// for the expected signal density.
    fn merge_adjacent(&mut self) {
        let bin_spacing = self.bin_spacing();
        let mut index = 0;
        while index < self.clusters.len() {
            let mut other = index + 1;
            while other < self.clusters.len() {
                let time_gap =
                    (self.clusters[index].last_update - self.clusters[other].last_update).abs();
                let freq_gap = (self.clusters[index].mean_bin()
                    - self.clusters[other].mean_bin())
                .abs()
                    * bin_spacing;
                if time_gap <= self.config.max_time_gap && freq_gap <= self.config.max_freq_gap {
                    let absorbed = self.clusters.swap_remove(other);
                    self.clusters[index].merge(absorbed);
                    // The merged mean moved; rescan from the same position
                } else {
                    other += 1;
                }
            }
            index += 1;
        }
    }

    /// Removes clusters that have been idle longer than the time gap and
    /// returns those with enough detections as completed events
    ///
    /// Idle clusters below the detection minimum are discarded. Events are
    /// returned in non-decreasing end time order.
    pub fn completed_events(&mut self, now: f64) -> Vec<Event> {
        let max_time_gap = self.config.max_time_gap;
        let mut events = Vec::new();
        let mut index = 0;
        while index < self.clusters.len() {
            if now - self.clusters[index].last_update > max_time_gap {
                let cluster = self.clusters.swap_remove(index);
                if cluster.detections >= MIN_EVENT_DETECTIONS {
                    log::debug!(
                        "cluster with {} detections over {} frames becomes an event",
                        cluster.detections,
                        cluster.frames
                    );
                    events.push(cluster.into_event(&self.config));
                }
            } else {
                index += 1;
            }
        }
        sort_by_end_time(&mut events);
        events
    }

    /// Converts every remaining cluster with enough detections into an event,
    /// as if the current time were infinitely far in the future
    pub fn flush(&mut self) -> Vec<Event> {
        let config = self.config;
        let mut events: Vec<Event> = self
            .clusters
            .drain(..)
            .filter(|cluster| cluster.detections >= MIN_EVENT_DETECTIONS)
            .map(|cluster| cluster.into_event(&config))
            .collect();
        sort_by_end_time(&mut events);
        events
    }

    /// Returns the number of currently active clusters
    pub fn active_clusters(&self) -> usize {
        self.clusters.len()
    }

    /// Returns the number of detections dropped at capacity
    pub fn dropped_detections(&self) -> u64 {
        self.dropped
    }
}

/// Sorts events into non-decreasing end time order
fn sort_by_end_time(events: &mut [Event]) {
    events.sort_by(|a, b| {
        a.end_time
            .partial_cmp(&b.end_time)
            .expect("non-finite event end time")
    });
}

#[cfg(test)]
mod test {
    use super::*;

    fn config() -> ClusterConfig {
        ClusterConfig {
            max_time_gap: 0.1,
            max_freq_gap: 1_000.0,
            max_clusters: 16,
            sample_rate: 12_800.0,
            fft_size: 128,
        }
    }

    fn detection(bin: usize, snr_db: f64) -> Detection {
        Detection {
            bin,
            power: 10.0f64.powf(snr_db / 10.0),
            threshold: 1.0,
            snr_db,
            confidence: 0.8,
        }
    }

    #[test]
    fn test_invalid_configurations() {
        for bad in &[
            ClusterConfig {
                max_time_gap: 0.0,
                ..config()
            },
            ClusterConfig {
                max_freq_gap: -1.0,
                ..config()
            },
            ClusterConfig {
                max_clusters: 0,
                ..config()
            },
            ClusterConfig {
                sample_rate: 0.0,
                ..config()
            },
            ClusterConfig {
                fft_size: 0,
                ..config()
            },
        ] {
            assert!(Clusterer::new(*bad).is_err());
        }
    }

    #[test]
    fn test_single_tone_builds_one_event() {
        let mut clusterer = Clusterer::new(config()).unwrap();
        for frame in 0..10 {
            let time = frame as f64 * 0.01;
            assert!(clusterer.add_detection(&detection(64, 25.0), time));
        }
        assert_eq!(clusterer.active_clusters(), 1);
        assert!(clusterer.completed_events(0.15).is_empty());
        let events = clusterer.completed_events(0.25);
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.detections, 10);
        assert_eq!(event.min_bin, 64);
        assert_eq!(event.max_bin, 64);
        // Bin 64 of 128 is the tuned center frequency
        assert!(event.center_frequency.abs() < 1e-9);
        assert!((event.duration - 0.09).abs() < 1e-9);
        assert!((event.avg_snr_db - 25.0).abs() < 1e-9);
        assert_eq!(event.modulation, "narrowband");
        assert!((event.modulation_confidence - 0.7).abs() < 1e-12);
        // SNR factor saturates at 1; duration factor is 0.09
        assert!((event.confidence - 0.09f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_short_cluster_is_discarded() {
        let mut clusterer = Clusterer::new(config()).unwrap();
        clusterer.add_detection(&detection(30, 10.0), 0.0);
        clusterer.add_detection(&detection(30, 10.0), 0.01);
        let events = clusterer.completed_events(1.0);
        assert!(events.is_empty());
        assert_eq!(clusterer.active_clusters(), 0);
    }

    #[test]
    fn test_distant_tones_stay_separate() {
        let mut clusterer = Clusterer::new(config()).unwrap();
        for frame in 0..5 {
            let time = frame as f64 * 0.01;
            clusterer.add_detection(&detection(30, 20.0), time);
            clusterer.add_detection(&detection(90, 20.0), time);
        }
        assert_eq!(clusterer.active_clusters(), 2);
        let events = clusterer.completed_events(1.0);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_nearby_clusters_merge() {
        // Bin spacing is 100 Hz, so the 1 kHz gap spans 10 bins
        let mut clusterer = Clusterer::new(config()).unwrap();
        clusterer.add_detection(&detection(40, 20.0), 0.0);
        // 11 bins away: does not match, becomes a second cluster
        clusterer.add_detection(&detection(51, 20.0), 0.0);
        assert_eq!(clusterer.active_clusters(), 2);
        // Matches the second cluster and pulls its mean to 48.5, within
        // 10 bins of the first; the pair must merge on this call
        assert!(clusterer.add_detection(&detection(46, 20.0), 0.01));
        assert_eq!(clusterer.active_clusters(), 1);
        let events = clusterer.completed_events(1.0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].detections, 3);
        assert_eq!(events[0].min_bin, 40);
        assert_eq!(events[0].max_bin, 51);
    }

    #[test]
    fn test_events_sorted_by_end_time() {
        let mut clusterer = Clusterer::new(config()).unwrap();
        for frame in 0..8 {
            let time = frame as f64 * 0.01;
            if frame < 5 {
                clusterer.add_detection(&detection(100, 15.0), time);
            }
            clusterer.add_detection(&detection(20, 15.0), time);
        }
        let events = clusterer.completed_events(10.0);
        assert_eq!(events.len(), 2);
        assert!(events[0].end_time <= events[1].end_time);
        assert_eq!(events[0].min_bin, 100);
        assert_eq!(events[1].min_bin, 20);
    }

    #[test]
    fn test_capacity_drops_detections() {
        let mut clusterer = Clusterer::new(ClusterConfig {
            max_clusters: 1,
            ..config()
        })
        .unwrap();
        assert!(clusterer.add_detection(&detection(10, 15.0), 0.0));
        assert!(!clusterer.add_detection(&detection(100, 15.0), 0.0));
        assert_eq!(clusterer.dropped_detections(), 1);
        assert_eq!(clusterer.active_clusters(), 1);
    }

    #[test]
    fn test_flush_yields_remaining_clusters() {
        let mut clusterer = Clusterer::new(config()).unwrap();
        for frame in 0..4 {
            clusterer.add_detection(&detection(64, 18.0), frame as f64 * 0.01);
        }
        let events = clusterer.flush();
        assert_eq!(events.len(), 1);
        assert_eq!(clusterer.active_clusters(), 0);
    }

    #[test]
    fn test_hysteresis_spans_gaps() {
        let mut clusterer = Clusterer::new(config()).unwrap();
        clusterer.add_detection(&detection(64, 18.0), 0.0);
        // Within the 0.1 s gap tolerance: same cluster
        clusterer.add_detection(&detection(64, 18.0), 0.09);
        clusterer.add_detection(&detection(64, 18.0), 0.18);
        assert_eq!(clusterer.active_clusters(), 1);
        let events = clusterer.flush();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].detections, 3);
    }
}
