//! Synheart Rhythm - On-device sleep inference and circadian energy engine
//!
//! Rhythm turns raw activity-sensor data into a sleep history and a daily energy
//! rhythm through a deterministic pipeline: sample sanitation → sleep
//! segmentation → sleep need → sleep debt → circadian energy curve → summary.
//!
//! ## Modules
//!
//! - **Segmentation**: Infer nightly sleep sessions from 5-minute activity counts
//! - **Profile**: Estimate sleep need and decayed sleep debt from session history
//! - **Energy curve**: Two-process (circadian + homeostatic) 24-hour alertness curve

pub mod config;
pub mod curve;
pub mod debt;
pub mod encoder;
pub mod error;
pub mod history;
pub mod need;
pub mod pipeline;
pub mod schema;
pub mod segmenter;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::RhythmConfig;
pub use error::ComputeError;
pub use history::{MergeReport, SessionHistory};
pub use pipeline::{
    compute_summary, compute_summary_json, samples_to_summary, RhythmProcessor, RhythmSnapshot,
};
pub use segmenter::{segment, SleepSegmenter};
pub use types::{
    ActivitySample, Chronotype, CurvePoint, DebtSeverity, RhythmSummary, SessionSource,
    SleepAnchors, SleepProfile, SleepSession, TimeOfDay,
};

// Schema exports
pub use schema::{RawActivitySample, SampleAdapter, SCHEMA_VERSION};

/// Rhythm version embedded in all payloads
pub const RHYTHM_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for payloads
pub const PRODUCER_NAME: &str = "synheart-rhythm";
