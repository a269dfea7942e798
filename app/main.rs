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
//! This binary discovers transient signal events in a raw I/Q recording and
//! writes one structured record per event.
//!

#![warn(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    unused_allocation,
    unused_comparisons,
    unused_parens,
    while_true,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    future_incompatible,
    nonstandard_style,
    rust_2018_compatibility,
    rust_2018_idioms
)]
#![warn(clippy::all)]
// Keep extern crates, like in 2015
#![allow(unused_extern_crates)]

extern crate indicatif;
extern crate iqlab_discover;
extern crate iqlab_discover_config;
extern crate log;
extern crate num_complex;
extern crate signal_hook;
extern crate simplelog;

use indicatif::ProgressBar;
use signal_hook::{flag::register, SIGHUP, SIGINT};
use simplelog::{Config, SimpleLogger, TermLogger, TerminalMode};

use iqlab_discover::emit::EventWriter;
use iqlab_discover::{discover, DiscoverSetup, Report};
use iqlab_discover_config::ConfigError;

mod setup;

use std::error::Error;
use std::io;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use self::setup::{SampleSource, Setup};

fn run() -> Result<Report, Box<dyn Error>> {
    let config = iqlab_discover_config::config_from_command_line()?;
    // Logging
    let log_status = TermLogger::init(config.ui.log_level, Config::default(), TerminalMode::Stderr)
        .or_else(|_| SimpleLogger::init(config.ui.log_level, Config::default()));
    if let Err(e) = log_status {
        eprintln!("Failed to set up simpler logger: {}", e);
    }

    let setup = Setup::from_config(&config)?;

    let progress = create_progress_bar(&setup);

    // Notes about signals on Linux:
    // SIGINT or SIGHUP sets the stop flag to true, but does not interrupt any read calls that are
    // in progress.
    // Set up signal handlers for clean exit
    let stop_flag = Arc::new(AtomicBool::new(false));
    register(SIGINT, Arc::clone(&stop_flag))?;
    register(SIGHUP, Arc::clone(&stop_flag))?;

    let source: SampleSource = match &progress {
        Some(progress) => Box::new(progress.wrap_iter(setup.source)),
        None => setup.source,
    };

    let event_writer = EventWriter::new(setup.destination, setup.event_format);
    let mut discover_setup = DiscoverSetup::new(
        source,
        setup.sample_rate,
        config.spectral.fft_size,
        config.spectral.hop_size,
        event_writer,
    );
    discover_setup
        .set_cfar(iqlab_discover::detect::CfarConfig {
            pfa: config.detector.pfa,
            ref_cells: config.detector.ref_cells,
            guard_cells: config.detector.guard_cells,
            rank: config.detector.os_rank,
        })
        .set_max_time_gap(config.clustering.max_time_gap_ms / 1000.0)
        .set_max_freq_gap(config.clustering.max_freq_gap_hz)
        .set_max_clusters(config.clustering.max_clusters)
        .set_stop_flag(stop_flag);
    if let Some(cutouts) = setup.cutouts {
        discover_setup.set_cutout_writer(cutouts);
    }

    let report = discover(discover_setup)?;

    if let Some(progress) = progress {
        progress.finish();
    }

    Ok(report)
}

fn main() {
    match run() {
        Ok(report) => {
            log::info!(
                "processed {} frames ({} samples) in {:.3} s",
                report.frames(),
                report.samples(),
                report.run_time().as_secs_f64()
            );
            log::info!(
                "{} detections, {} events, {} cutouts, {} detections dropped",
                report.detections(),
                report.events(),
                report.cutouts(),
                report.dropped_detections()
            );
            if report.cancelled() {
                log::warn!("processing was interrupted; events were flushed early");
            }
        }
        Err(e) => {
            eprintln!("{}", e);
            process::exit(exit_status(&*e));
        }
    }
}

/// Maps an error to the process exit status
///
/// Configuration rejections, I/O failures, and internal errors are
/// distinguished from other failures.
fn exit_status(error: &(dyn Error + 'static)) -> i32 {
    if let Some(error) = error.downcast_ref::<iqlab_discover::Error>() {
        error.exit_status()
    } else if error.downcast_ref::<ConfigError>().is_some() {
        2
    } else if error.downcast_ref::<io::Error>().is_some() {
        3
    } else {
        1
    }
}

/// Creates and sets up a progress bar, if the source length is known
fn create_progress_bar(setup: &Setup) -> Option<ProgressBar> {
    setup.source_samples.map(|samples| {
        let progress = indicatif::ProgressBar::new(samples);
        progress.set_position(0);
        progress.set_draw_delta(samples / 1000 + 1);
        progress.set_style(
            indicatif::ProgressStyle::default_bar().template("{bar:40} {percent}% ETA {eta}"),
        );
        progress
    })
}
