//! Bulk-fetched payloads and their decoded forms. Raw blob data is a
//! base64-encoded JSON document; decoding keeps the full document so the
//! metadata persisted to storage is lossless.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// A raw stored payload returned by the bulk content provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlob {
    pub id: String,
    /// Address of the submitter that uploaded the payload.
    pub address: String,
    /// Base64-encoded JSON document.
    pub data: String,
}

impl ContentBlob {
    pub fn new(
        id: impl Into<String>,
        address: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            data: data.into(),
        }
    }

    /// Decodes the payload into any deserializable document.
    pub fn decode_json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        let bytes = BASE64_STANDARD
            .decode(&self.data)
            .with_context(|| format!("payload for {} is not valid base64", self.id))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("payload for {} is not valid JSON", self.id))
    }
}

/// Encodes a JSON document the way providers deliver it. Test and tooling
/// helper; the watcher itself only decodes.
pub fn encode_json_payload<T: Serialize>(value: &T) -> Result<String> {
    let bytes = serde_json::to_vec(value).context("failed to serialize payload")?;
    Ok(BASE64_STANDARD.encode(bytes))
}

/// Decoded DA publication. Only the fields the pipeline reads are typed; the
/// rest of the document is retained for metadata persistence and audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    pub event: PublicationEvent,
    #[serde(rename = "timestampProofs")]
    pub timestamp_proofs: TimestampProofsRef,
    #[serde(flatten)]
    pub rest: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicationEvent {
    /// Unix seconds.
    pub timestamp: u64,
    #[serde(flatten)]
    pub rest: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampProofsRef {
    pub response: TimestampProofsResponseRef,
    #[serde(flatten)]
    pub rest: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampProofsResponseRef {
    /// Id of the blob holding the timing-proof data.
    pub id: String,
    #[serde(flatten)]
    pub rest: serde_json::Value,
}

impl Publication {
    /// Id of the timestamp-proof blob this publication references.
    pub fn timestamp_proofs_id(&self) -> &str {
        &self.timestamp_proofs.response.id
    }
}

/// Decoded timing-proof document, correlated 1:1 with a publication. The
/// pipeline treats it as opaque; only the verifier inspects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimestampProofs(pub serde_json::Value);

/// A fully decoded unit of work: one feed entry joined with its publication
/// and timing proofs.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyItem {
    pub id: String,
    pub publication: Publication,
    pub submitter: String,
    pub timestamp_proofs: TimestampProofs,
}

/// The unit of work handed to the dispatcher. An item whose payload could not
/// be decoded still flows through so it settles as an outcome instead of
/// silently vanishing from the page.
#[derive(Debug, Clone, PartialEq)]
pub enum CorrelatedItem {
    Ready(ReadyItem),
    Malformed {
        id: String,
        submitter: String,
        detail: String,
    },
}

impl CorrelatedItem {
    pub fn id(&self) -> &str {
        match self {
            CorrelatedItem::Ready(item) => &item.id,
            CorrelatedItem::Malformed { id, .. } => id,
        }
    }

    pub fn submitter(&self) -> &str {
        match self {
            CorrelatedItem::Ready(item) => &item.submitter,
            CorrelatedItem::Malformed { submitter, .. } => submitter,
        }
    }
}
