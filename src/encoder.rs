//! Payload encoding
//!
//! This module wraps a computed snapshot into the versioned JSON payload handed
//! to UI, alarm and storage consumers, adding producer and quality metadata.

use crate::config::NeedConfig;
use crate::error::ComputeError;
use crate::pipeline::RhythmSnapshot;
use crate::types::{RhythmSummary, SleepProfile};
use crate::{PRODUCER_NAME, RHYTHM_VERSION};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current payload schema version
pub const PAYLOAD_VERSION: &str = "1.0.0";

/// Producer metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RhythmProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// How much history backs the profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RhythmQuality {
    pub session_count: usize,
    /// False when need fell back to the default for lack of sessions
    pub has_sufficient_data: bool,
}

/// Versioned output payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RhythmPayload {
    pub rhythm_version: String,
    pub producer: RhythmProducer,
    pub computed_at_utc: String,
    pub quality: RhythmQuality,
    pub profile: SleepProfile,
    pub summary: RhythmSummary,
}

/// Encoder for producing payloads
pub struct RhythmEncoder {
    instance_id: String,
    min_sessions: usize,
}

impl Default for RhythmEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RhythmEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
            min_sessions: NeedConfig::default().min_sessions,
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self {
            instance_id,
            ..Self::new()
        }
    }

    /// Session count below which the data is flagged as insufficient
    pub fn with_min_sessions(mut self, min_sessions: usize) -> Self {
        self.min_sessions = min_sessions;
        self
    }

    /// Encode a snapshot into a payload
    pub fn encode(&self, snapshot: &RhythmSnapshot) -> RhythmPayload {
        RhythmPayload {
            rhythm_version: PAYLOAD_VERSION.to_string(),
            producer: RhythmProducer {
                name: PRODUCER_NAME.to_string(),
                version: RHYTHM_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            computed_at_utc: snapshot.profile.last_computed_at.to_rfc3339(),
            quality: RhythmQuality {
                session_count: snapshot.session_count,
                has_sufficient_data: snapshot.session_count >= self.min_sessions
                    && snapshot.session_count > 0,
            },
            profile: snapshot.profile.clone(),
            summary: snapshot.summary.clone(),
        }
    }

    /// Encode to JSON string
    pub fn encode_to_json(&self, snapshot: &RhythmSnapshot) -> Result<String, ComputeError> {
        let payload = self.encode(snapshot);
        serde_json::to_string_pretty(&payload).map_err(ComputeError::JsonError)
    }
}
