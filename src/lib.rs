//! Deterministic traffic allocation for website text experiments.
//!
//! # Overview
//!
//! Every visitor of a customer site carries an opaque visitor id. For each running experiment the
//! visitor is hashed, together with the experiment id, into one of 100 buckets, and the bucket
//! decides which [`Variant`] the visitor sees. The computation is a pure function of its inputs:
//! nothing is stored per visitor, and any process evaluating [`allocate`] for the same pair gets
//! the same answer.
//!
//! On top of the allocation engine, a [`ConfigService`] assembles the per-page payload the
//! delivery snippet consumes. It reads experiments through an [`ExperimentSource`], either the
//! in-process [`InMemoryExperimentSource`] or the hosted datastore via [`RestExperimentSource`].
//! An [`AssignmentLogger`] can be provided to record every served assignment.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum. The allocation engine itself only fails with
//! [`Error::InvalidVariantSet`]; control-flag and weight anomalies are resolved by the documented
//! fallback rules instead (see [`Resolution`]).
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate with target `"hypo"`.
//! The allocation engine never logs; the config service and experiment sources do.

#![warn(rustdoc::missing_crate_level_docs)]

mod assignment_logger;
mod config;
mod error;
mod eval;
mod experiment;
mod exposure;
mod rest_source;
mod service;
mod sharder;
mod source;
mod visitor;

pub use assignment_logger::{AssignmentEvent, AssignmentLogger};
pub use config::{ServiceConfig, SourceConfig};
pub use error::{Error, Result, VariantSetError};
pub use eval::{
    allocate, AllocationDetails, AllocationPolicy, AllocationResult, Allocator, Resolution,
    CONTROL_THRESHOLD, KEY_SEPARATOR, TOTAL_BUCKETS,
};
pub use experiment::{ElementType, Experiment, ExperimentStats, ExperimentStatus, TryParse, Variant};
pub use exposure::{ExposureEvent, ExposureType};
pub use rest_source::RestExperimentSource;
pub use service::{
    ConfigRequest, ConfigResponse, ConfigService, ExperimentAssignment, CORS_HEADERS,
};
pub use sharder::{
    fnv1a_32, Fnv1a, Fnv1aSharder, Sharder, Utf16Fnv1aSharder, FNV_OFFSET_BASIS, FNV_PRIME,
};
pub use source::{filter_active, matches_url, ExperimentSource, InMemoryExperimentSource};
pub use visitor::{
    generate_visitor_id, visitor_cookie, visitor_id_from_cookie, VISITOR_COOKIE_MAX_AGE,
    VISITOR_COOKIE_NAME,
};
