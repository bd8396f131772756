//! Terminal per-item verdicts and the closed failure taxonomy.

use crate::model::content::Publication;
use serde::{Deserialize, Serialize};

/// Closed taxonomy of verification failures. Every failed outcome carries one
/// of these; `Unknown` is reserved for unexpected errors in the per-item
/// pipeline (decode failures, verifier faults, task panics).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    NoSignatureSubmitter,
    InvalidSignatureSubmitter,
    InvalidFormattedTypedData,
    InvalidEventTimestamp,
    TimestampProofInvalidSignature,
    TimestampProofInvalidType,
    TimestampProofInvalidDaId,
    TimestampProofNotSubmitter,
    BlockCantBeReadFromNode,
    BlockTooFar,
    PointerFailedVerification,
    SimulationFailed,
    EventMismatch,
    PotentialReorg,
    Unknown,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FailureReason::NoSignatureSubmitter => "NO_SIGNATURE_SUBMITTER",
            FailureReason::InvalidSignatureSubmitter => "INVALID_SIGNATURE_SUBMITTER",
            FailureReason::InvalidFormattedTypedData => "INVALID_FORMATTED_TYPED_DATA",
            FailureReason::InvalidEventTimestamp => "INVALID_EVENT_TIMESTAMP",
            FailureReason::TimestampProofInvalidSignature => "TIMESTAMP_PROOF_INVALID_SIGNATURE",
            FailureReason::TimestampProofInvalidType => "TIMESTAMP_PROOF_INVALID_TYPE",
            FailureReason::TimestampProofInvalidDaId => "TIMESTAMP_PROOF_INVALID_DA_ID",
            FailureReason::TimestampProofNotSubmitter => "TIMESTAMP_PROOF_NOT_SUBMITTER",
            FailureReason::BlockCantBeReadFromNode => "BLOCK_CANT_BE_READ_FROM_NODE",
            FailureReason::BlockTooFar => "BLOCK_TOO_FAR",
            FailureReason::PointerFailedVerification => "POINTER_FAILED_VERIFICATION",
            FailureReason::SimulationFailed => "SIMULATION_FAILED",
            FailureReason::EventMismatch => "EVENT_MISMATCH",
            FailureReason::PotentialReorg => "POTENTIAL_REORG",
            FailureReason::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

/// The terminal result of checking one item. Produced exactly once per
/// correlated item and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub item_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    /// Verified structure on success; the original publication as audit
    /// context on an expected failure; absent when the payload never decoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication: Option<Publication>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_error_info: Option<String>,
}

impl VerificationOutcome {
    pub fn success(item_id: impl Into<String>, publication: Publication) -> Self {
        Self {
            item_id: item_id.into(),
            success: true,
            failure_reason: None,
            publication: Some(publication),
            extra_error_info: None,
        }
    }

    pub fn failure(
        item_id: impl Into<String>,
        reason: FailureReason,
        context: Option<Publication>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            success: false,
            failure_reason: Some(reason),
            publication: context,
            extra_error_info: None,
        }
    }

    /// Outcome for an unexpected error escaping the per-item pipeline.
    pub fn unknown(item_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            success: false,
            failure_reason: Some(FailureReason::Unknown),
            publication: None,
            extra_error_info: Some(detail.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        !self.success
    }

    /// The failure record to queue for this outcome, if it failed.
    pub fn failed_record(&self, submitter: impl Into<String>) -> Option<FailedRecord> {
        let reason = self.failure_reason?;
        Some(FailedRecord {
            item_id: self.item_id.clone(),
            reason,
            submitter: submitter.into(),
        })
    }
}

/// One row of the failed-submissions log, derived 1:1 from a failing outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRecord {
    pub item_id: String,
    pub reason: FailureReason,
    pub submitter: String,
}
