//! Shared fixtures and polling helpers for pipeline tests.

use anyhow::{bail, Result};
use proofwatch::{encode_json_payload, ContentBlob, FeedEntry, FeedPage, WatcherConfig};
use serde_json::json;
use std::time::Duration;
use tokio::time::{sleep, Instant};

pub fn init_tracing() {
    proofwatch::init_tracing();
}

/// Fast-interval config so tests never sit in real backoffs.
pub fn test_config() -> WatcherConfig {
    WatcherConfig::builder()
        .environment("MUMBAI")
        .deployment("STAGING")
        .node_url("http://127.0.0.1:8545")
        .empty_poll_interval(Duration::from_millis(5))
        .error_backoff(Duration::from_millis(5))
        .checkpoint_retry_max_backoff(Duration::from_millis(20))
        .metrics_interval(Duration::from_secs(60))
        .build()
        .expect("test config must build")
}

/// A proof-bundle blob whose publication references `proofs_id`.
pub fn publication_blob(id: &str, submitter: &str, proofs_id: &str) -> ContentBlob {
    let document = json!({
        "signature": format!("0xsig-{id}"),
        "event": { "timestamp": 1_700_000_000u64, "sourceId": id },
        "timestampProofs": {
            "type": "BUNDLR",
            "response": { "id": proofs_id }
        }
    });
    ContentBlob::new(
        id,
        submitter,
        encode_json_payload(&document).expect("fixture payload must encode"),
    )
}

/// A timing-proof blob carrying a marker so pairing can be asserted.
pub fn proofs_blob(proofs_id: &str, submitter: &str, for_item: &str) -> ContentBlob {
    let document = json!({ "type": "timestamp proofs", "forItem": for_item });
    ContentBlob::new(
        proofs_id,
        submitter,
        encode_json_payload(&document).expect("fixture payload must encode"),
    )
}

pub fn page(ids: &[&str], end_cursor: &str, has_more: bool) -> FeedPage {
    FeedPage {
        entries: ids
            .iter()
            .map(|id| FeedEntry::new(*id, format!("node-{id}")))
            .collect(),
        end_cursor: Some(end_cursor.to_owned()),
        has_more,
    }
}

/// Polls `condition` until it holds or the timeout elapses.
pub async fn wait_until<F>(what: &str, timeout: Duration, mut condition: F) -> Result<()>
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return Ok(());
        }
        sleep(Duration::from_millis(5)).await;
    }
    bail!("timed out waiting for {what}");
}
