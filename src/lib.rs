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
//! This library discovers transient signal events in raw I/Q recordings.
//! It reads interleaved complex samples, transforms them into overlapping
//! power spectra, detects active bins against a locally estimated noise
//! floor, clusters the detections into coherent events, and emits the
//! events as structured records with optional narrow-band cutouts.
//!

#![deny(
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
    bad_style,
    future_incompatible,
    nonstandard_style,
    rust_2018_compatibility,
    rust_2018_idioms,
    missing_docs
)]
#![warn(clippy::all)]
#![warn(unused)]

extern crate byteorder;
extern crate log;
extern crate num_complex;
extern crate num_traits;
extern crate serde;
extern crate serde_json;

// Public modules
pub mod cluster;
pub mod detect;
pub mod emit;
pub mod error;
pub mod event;
pub mod features;
pub mod fft;
pub mod framer;
pub mod iq;

// Private modules
mod pipeline;

pub use crate::error::{Error, Result};
pub use crate::pipeline::{
    discover, DiscoverSetup, Report, DEFAULT_FREQ_GAP, DEFAULT_MAX_CLUSTERS, DEFAULT_TIME_GAP,
};
