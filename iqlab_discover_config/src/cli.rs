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
//! Configuration from command-line arguments
//!

use std::error::Error;
use std::ffi::OsStr;
use std::fs;
use std::str::FromStr;

use clap::{crate_authors, crate_name, crate_version, App, Arg, ArgMatches};

use crate::{
    Clustering, Config, ConfigError, Destination, Detector, EventFormat, Input, Output,
    SampleFormat, Spectral, UserInterface,
};

const ABOUT: &str = "This program reads a raw I/Q recording, discovers transient signal events \
using overlapped FFTs, OS-CFAR detection, and time-frequency clustering, and writes one \
structured record per event, optionally together with narrow-band I/Q cutouts. Command-line \
arguments cover the common single-file case; a configuration file can express everything.";

/// Reads command-line options and either reads a configuration from a file or builds a
/// configuration from the command-line options
///
/// The returned configuration has passed range validation. This function
/// causes the process to exit if a command-line argument is invalid, or if
/// `--help` or `--version` is passed.
pub fn config_from_command_line() -> Result<Config, Box<dyn Error>> {
    let matches = build_app().get_matches();

    let config = if let Some(config_path) = matches.value_of_os("config_file") {
        read_config_file(config_path)?
    } else {
        config_from_matches(&matches)?
    };
    config.validate()?;
    Ok(config)
}

/// Creates and returns an App with command-line arguments
fn build_app() -> App<'static, 'static> {
    App::new(crate_name!())
        .version(crate_version!())
        .about(ABOUT)
        .author(crate_authors!())
        .arg(
            Arg::with_name("config_file")
                .long("config-file")
                .short("c")
                .takes_value(true)
                .value_name("path")
                .help(
                    "The path to a configuration file to read. \
                    This can be used to specify additional options. \
                    If this option is used, no other command-line arguments are permitted.",
                )
                .conflicts_with_all(&[
                    "source",
                    "sample_rate",
                    "sample_format",
                    "metadata",
                    "fft_size",
                    "hop_size",
                    "pfa",
                    "ref_cells",
                    "guard_cells",
                    "os_rank",
                    "time_gap",
                    "freq_gap",
                    "max_clusters",
                    "destination",
                    "output_format",
                    "cutouts",
                    "cutout_dir",
                    "log_level",
                ]),
        )
        .arg(
            Arg::with_name("source")
                .long("source")
                .takes_value(true)
                .value_name("path")
                .help(
                    "A file to read I/Q samples from. If no file is specified, samples will \
                         be read from standard input and --sample-rate is required.",
                ),
        )
        .arg(
            Arg::with_name("sample_rate")
                .long("sample-rate")
                .takes_value(true)
                .validator(validate::<f64>)
                .value_name("hertz")
                .help(
                    "The sample rate of the recording. Optional for files that have a \
                         metadata sidecar.",
                ),
        )
        .arg(
            Arg::with_name("sample_format")
                .long("format")
                .takes_value(true)
                .possible_values(&["ci8", "ci16"])
                .help(
                    "The sample format of the recording. Optional for files that have a \
                         metadata sidecar.",
                ),
        )
        .arg(
            Arg::with_name("metadata")
                .long("metadata")
                .takes_value(true)
                .value_name("path")
                .help(
                    "The path of a metadata sidecar describing the recording. By default, \
                         a sidecar next to the source file is used when present.",
                ),
        )
        .arg(
            Arg::with_name("fft_size")
                .long("fft-size")
                .takes_value(true)
                .default_value("2048")
                .validator(validate::<usize>)
                .help("The FFT size in samples (a power of two)"),
        )
        .arg(
            Arg::with_name("hop_size")
                .long("hop-size")
                .takes_value(true)
                .default_value("512")
                .validator(validate::<usize>)
                .help("The sample offset between consecutive frames"),
        )
        .arg(
            Arg::with_name("pfa")
                .long("pfa")
                .takes_value(true)
                .default_value("1e-4")
                .validator(validate::<f64>)
                .help("The target probability of false alarm per bin per frame"),
        )
        .arg(
            Arg::with_name("ref_cells")
                .long("ref-cells")
                .takes_value(true)
                .default_value("8")
                .validator(validate::<usize>)
                .help("The number of reference cells on each side of the cell under test"),
        )
        .arg(
            Arg::with_name("guard_cells")
                .long("guard-cells")
                .takes_value(true)
                .default_value("2")
                .validator(validate::<usize>)
                .help("The number of guard cells on each side of the cell under test"),
        )
        .arg(
            Arg::with_name("os_rank")
                .long("os-rank")
                .takes_value(true)
                .default_value("12")
                .validator(validate::<usize>)
                .help("Which order statistic of the reference cells to use"),
        )
        .arg(
            Arg::with_name("time_gap")
                .long("max-time-gap")
                .takes_value(true)
                .default_value("100")
                .validator(validate::<f64>)
                .value_name("milliseconds")
                .help("The largest time gap between detections in one event"),
        )
        .arg(
            Arg::with_name("freq_gap")
                .long("max-freq-gap")
                .takes_value(true)
                .default_value("5000")
                .validator(validate::<f64>)
                .value_name("hertz")
                .help("The largest frequency gap between detections in one event"),
        )
        .arg(
            Arg::with_name("max_clusters")
                .long("max-clusters")
                .takes_value(true)
                .default_value("100")
                .validator(validate::<usize>)
                .help("The largest number of simultaneously tracked signals"),
        )
        .arg(
            Arg::with_name("destination")
                .long("destination")
                .takes_value(true)
                .value_name("path")
                .help(
                    "A file to write event records to. If no file is specified, records \
                         will be written to standard output.",
                ),
        )
        .arg(
            Arg::with_name("output_format")
                .long("output-format")
                .takes_value(true)
                .default_value("columnar")
                .possible_values(&["columnar", "one_record_per_line"])
                .help("The event record flavor to write"),
        )
        .arg(
            Arg::with_name("cutouts")
                .long("cutouts")
                .help("Write a narrow-band I/Q cutout and sidecar for each event"),
        )
        .arg(
            Arg::with_name("cutout_dir")
                .long("cutout-dir")
                .takes_value(true)
                .default_value("cutouts")
                .value_name("path")
                .help("The directory to write cutouts into"),
        )
        .arg(
            Arg::with_name("log_level")
                .long("log-level")
                .takes_value(true)
                .default_value("WARN")
                .possible_values(&["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
                .help("The level of logging to enable"),
        )
}

/// Reads a configuration file at the provided path, parses it, and returns it
fn read_config_file(path: &OsStr) -> Result<Config, Box<dyn Error>> {
    let file_bytes = fs::read(path)?;
    let config = toml::from_slice(&file_bytes)
        .map_err(|e| ConfigError::new(format!("malformed configuration file: {}", e)))?;
    Ok(config)
}

/// Creates a configuration from the command-line arguments
fn config_from_matches(matches: &ArgMatches<'_>) -> Result<Config, ConfigError> {
    Ok(Config {
        input: input_from_matches(matches)?,
        spectral: Spectral {
            fft_size: matches.value_of("fft_size").unwrap().parse().unwrap(),
            hop_size: matches.value_of("hop_size").unwrap().parse().unwrap(),
        },
        detector: Detector {
            pfa: matches.value_of("pfa").unwrap().parse().unwrap(),
            ref_cells: matches.value_of("ref_cells").unwrap().parse().unwrap(),
            guard_cells: matches.value_of("guard_cells").unwrap().parse().unwrap(),
            os_rank: matches.value_of("os_rank").unwrap().parse().unwrap(),
        },
        clustering: Clustering {
            max_time_gap_ms: matches.value_of("time_gap").unwrap().parse().unwrap(),
            max_freq_gap_hz: matches.value_of("freq_gap").unwrap().parse().unwrap(),
            max_clusters: matches.value_of("max_clusters").unwrap().parse().unwrap(),
        },
        output: Output {
            destination: match matches.value_of_os("destination") {
                Some(path) => Destination::File { path: path.into() },
                None => Destination::Stdout,
            },
            format: match matches.value_of("output_format").unwrap() {
                "columnar" => EventFormat::Columnar,
                "one_record_per_line" => EventFormat::OneRecordPerLine,
                other => unreachable!("Invalid output format name \"{}\"", other),
            },
            generate_cutouts: matches.is_present("cutouts"),
            cutout_directory: matches.value_of_os("cutout_dir").unwrap().into(),
        },
        ui: UserInterface {
            // This can't panic because the argument has restricted values.
            log_level: matches.value_of("log_level").unwrap().parse().unwrap(),
        },
    })
}

fn input_from_matches(matches: &ArgMatches<'_>) -> Result<Input, ConfigError> {
    let format = matches.value_of("sample_format").map(|name| match name {
        "ci8" => SampleFormat::Ci8,
        "ci16" => SampleFormat::Ci16,
        other => unreachable!("Invalid sample format name \"{}\"", other),
    });
    let sample_rate = matches
        .value_of("sample_rate")
        .map(|rate| rate.parse().unwrap());
    match matches.value_of_os("source") {
        Some(path) => Ok(Input::File {
            path: path.into(),
            format,
            sample_rate,
            metadata: matches.value_of_os("metadata").map(|path| path.into()),
        }),
        None => Ok(Input::Stdin {
            format: format.unwrap_or(SampleFormat::Ci16),
            sample_rate: sample_rate.ok_or_else(|| {
                ConfigError::new("--sample-rate is required when reading from standard input")
            })?,
        }),
    }
}

/// Validates that a string can be parsed into a value of type T
// As required by clap, this function accepts a String.
#[allow(clippy::needless_pass_by_value)]
fn validate<T>(s: String) -> Result<(), String>
where
    T: FromStr,
    T::Err: ToString,
{
    s.parse::<T>().map(|_| ()).map_err(|e| e.to_string())
}
