//! Progress and acknowledgment messages
//!
//! Two message kinds travel over the sync channel:
//!
//! 1. Agent → daemon: [`SyncMessage`] reporting one test's status change, or
//!    the fleet-completion sentinel (`script=all, status=Finished`) meaning
//!    "this agent has no more tests".
//! 2. Daemon → agent: [`AckMessage`] echoing the message id, nothing else.
//!
//! Message ids are monotonic per sending process, not globally unique; the
//! client only uses them to match an ack to the request it just sent.

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::wire::{decode_fields, encode_fields};

/// Sentinel script name used by the fleet-completion message.
pub const SCRIPT_ALL: &str = "all";

/// Status value paired with [`SCRIPT_ALL`] in the sentinel message.
pub const STATUS_FINISHED: &str = "Finished";

const FIELD_SYNC: &str = "sync";
const FIELD_SCRIPT: &str = "script";
const FIELD_STATUS: &str = "status";
const FIELD_BUNDLE: &str = "support_bundle";
const FIELD_ACK: &str = "ack";

/// A wire-level progress report from an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncMessage {
    /// Monotonic id within the sending process
    pub id: u64,
    /// Relative script path, or [`SCRIPT_ALL`]
    pub script: String,
    /// Textual `TestResult` value
    pub status: String,
    /// `host:path` reference to a failure bundle, if any
    pub bundle: Option<String>,
}

impl SyncMessage {
    /// Build a progress report for one script.
    pub fn new(id: u64, script: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            id,
            script: script.into(),
            status: status.into(),
            bundle: None,
        }
    }

    /// Build the fleet-completion sentinel.
    pub fn sentinel(id: u64) -> Self {
        Self::new(id, SCRIPT_ALL, STATUS_FINISHED)
    }

    /// Attach a failure bundle reference.
    pub fn with_bundle(mut self, bundle: impl Into<String>) -> Self {
        self.bundle = Some(bundle.into());
        self
    }

    /// True iff this is the fleet-completion sentinel.
    pub fn is_final(&self) -> bool {
        self.script == SCRIPT_ALL && self.status == STATUS_FINISHED
    }

    /// Serialize to wire bytes.
    pub fn encode(&self) -> Bytes {
        let id = self.id.to_string();
        let mut fields = vec![
            (FIELD_SYNC, id.as_str()),
            (FIELD_SCRIPT, self.script.as_str()),
            (FIELD_STATUS, self.status.as_str()),
        ];
        if let Some(bundle) = &self.bundle {
            fields.push((FIELD_BUNDLE, bundle.as_str()));
        }
        encode_fields(&fields)
    }

    /// Parse wire bytes into a `SyncMessage`.
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let fields = decode_fields(payload).ok_or(ProtocolError::Malformed)?;

        let raw_id = fields
            .get(FIELD_SYNC)
            .ok_or(ProtocolError::MissingField(FIELD_SYNC))?;
        let id = raw_id
            .parse::<u64>()
            .map_err(|_| ProtocolError::InvalidField {
                field: FIELD_SYNC,
                value: raw_id.clone(),
            })?;

        let script = fields
            .get(FIELD_SCRIPT)
            .ok_or(ProtocolError::MissingField(FIELD_SCRIPT))?
            .clone();
        let status = fields
            .get(FIELD_STATUS)
            .ok_or(ProtocolError::MissingField(FIELD_STATUS))?
            .clone();

        Ok(Self {
            id,
            script,
            status,
            bundle: fields.get(FIELD_BUNDLE).cloned(),
        })
    }
}

/// A pure acknowledgment carrying only the acknowledged message id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckMessage {
    /// Id of the message being acknowledged
    pub id: u64,
}

impl AckMessage {
    /// Build an ack for the given message id.
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    /// Serialize to wire bytes.
    pub fn encode(&self) -> Bytes {
        let id = self.id.to_string();
        encode_fields(&[(FIELD_ACK, id.as_str())])
    }

    /// Parse wire bytes into an `AckMessage`.
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let fields = decode_fields(payload).ok_or(ProtocolError::Malformed)?;
        let raw_id = fields
            .get(FIELD_ACK)
            .ok_or(ProtocolError::MissingField(FIELD_ACK))?;
        let id = raw_id
            .parse::<u64>()
            .map_err(|_| ProtocolError::InvalidField {
                field: FIELD_ACK,
                value: raw_id.clone(),
            })?;
        Ok(Self { id })
    }
}
