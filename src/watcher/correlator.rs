//! Two-stage correlated batch retrieval.
//!
//! A feed page names proof-bundle blobs; each decoded bundle names a second
//! blob holding its timing proofs. Both bulk fetches are issued and consumed
//! in page order and the results are joined positionally. The provider
//! contract is that the success list preserves request ordering; every
//! returned id is still checked against the requested id so a misordered
//! response fails the page instead of silently pairing a publication with a
//! sibling's proofs.

use crate::model::content::{ContentBlob, CorrelatedItem, Publication, ReadyItem, TimestampProofs};
use crate::model::feed::FeedPage;
use crate::runtime::contracts::{BulkContentProvider, ProviderError, WatcherStore};
use anyhow::anyhow;
use std::sync::Arc;

pub struct Correlator {
    content: Arc<dyn BulkContentProvider>,
    store: Arc<dyn WatcherStore>,
}

/// Decoded first-stage result: one publication, or the malformed marker that
/// will settle as an unknown outcome downstream.
enum DecodedPublication {
    Ok {
        id: String,
        submitter: String,
        publication: Publication,
    },
    Malformed {
        id: String,
        submitter: String,
        detail: String,
    },
}

impl Correlator {
    pub fn new(content: Arc<dyn BulkContentProvider>, store: Arc<dyn WatcherStore>) -> Self {
        Self { content, store }
    }

    /// Joins a feed page into per-item work units.
    ///
    /// Fails only when a bulk fetch reports a timeout/unavailable condition or
    /// violates its ordering/shape contract; individual payloads that fail to
    /// decode flow through as malformed items so they still settle.
    pub async fn correlate(&self, page: &FeedPage) -> Result<Vec<CorrelatedItem>, ProviderError> {
        let ids = page.entry_ids();
        let proof_blobs = self.fetch_ordered("proof bundles", &ids).await?;

        let publications = self.decode_publications(proof_blobs);

        // Second fetch covers only decodable publications, in first-fetch order.
        let timestamp_ids: Vec<String> = publications
            .iter()
            .filter_map(|decoded| match decoded {
                DecodedPublication::Ok { publication, .. } => {
                    Some(publication.timestamp_proofs_id().to_owned())
                }
                DecodedPublication::Malformed { .. } => None,
            })
            .collect();

        let timestamp_blobs = self
            .fetch_ordered("timestamp proofs", &timestamp_ids)
            .await?;

        Ok(self.join_items(publications, timestamp_blobs))
    }

    async fn fetch_ordered(
        &self,
        what: &'static str,
        ids: &[String],
    ) -> Result<Vec<ContentBlob>, ProviderError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let blobs = self.content.fetch_bulk(ids).await?;

        if blobs.len() != ids.len() {
            return Err(ProviderError::Failed(anyhow!(
                "bulk fetch for {what} returned {} blobs for {} ids",
                blobs.len(),
                ids.len()
            )));
        }
        for (requested, blob) in ids.iter().zip(blobs.iter()) {
            if *requested != blob.id {
                return Err(ProviderError::Failed(anyhow!(
                    "bulk fetch for {what} broke request ordering: asked for {requested}, got {}",
                    blob.id
                )));
            }
        }

        Ok(blobs)
    }

    fn decode_publications(&self, blobs: Vec<ContentBlob>) -> Vec<DecodedPublication> {
        blobs
            .into_iter()
            .map(|blob| match blob.decode_json::<Publication>() {
                Ok(publication) => {
                    self.persist_publication_metadata(&blob.id, &publication);
                    DecodedPublication::Ok {
                        id: blob.id,
                        submitter: blob.address,
                        publication,
                    }
                }
                Err(err) => {
                    tracing::warn!(id = %blob.id, error = %err, "proof bundle failed to decode");
                    DecodedPublication::Malformed {
                        id: blob.id,
                        submitter: blob.address,
                        detail: format!("{err:#}"),
                    }
                }
            })
            .collect()
    }

    fn join_items(
        &self,
        publications: Vec<DecodedPublication>,
        timestamp_blobs: Vec<ContentBlob>,
    ) -> Vec<CorrelatedItem> {
        let mut proofs = timestamp_blobs.into_iter();

        publications
            .into_iter()
            .map(|decoded| match decoded {
                DecodedPublication::Malformed {
                    id,
                    submitter,
                    detail,
                } => CorrelatedItem::Malformed {
                    id,
                    submitter,
                    detail,
                },
                DecodedPublication::Ok {
                    id,
                    submitter,
                    publication,
                } => {
                    // fetch_ordered guaranteed one blob per decodable publication.
                    let Some(blob) = proofs.next() else {
                        return CorrelatedItem::Malformed {
                            id,
                            submitter,
                            detail: "timestamp proofs missing from bulk response".into(),
                        };
                    };
                    match blob.decode_json::<TimestampProofs>() {
                        Ok(timestamp_proofs) => {
                            self.persist_timestamp_proofs_metadata(&blob.id, &timestamp_proofs);
                            CorrelatedItem::Ready(ReadyItem {
                                id,
                                publication,
                                submitter,
                                timestamp_proofs,
                            })
                        }
                        Err(err) => {
                            tracing::warn!(
                                id = %id,
                                proofs_id = %blob.id,
                                error = %err,
                                "timestamp proofs failed to decode"
                            );
                            CorrelatedItem::Malformed {
                                id,
                                submitter,
                                detail: format!("{err:#}"),
                            }
                        }
                    }
                }
            })
            .collect()
    }

    /// Metadata writes are bookkeeping, not part of the verification path:
    /// spawned with their own error boundary and never awaited here.
    fn persist_publication_metadata(&self, id: &str, publication: &Publication) {
        let store = Arc::clone(&self.store);
        let id = id.to_owned();
        let publication = publication.clone();
        tokio::spawn(async move {
            if let Err(err) = store.save_publication_metadata(&id, &publication).await {
                tracing::error!(id = %id, error = %err, "failed to persist publication metadata");
            }
        });
    }

    fn persist_timestamp_proofs_metadata(&self, id: &str, proofs: &TimestampProofs) {
        let store = Arc::clone(&self.store);
        let id = id.to_owned();
        let proofs = proofs.clone();
        tokio::spawn(async move {
            if let Err(err) = store.save_timestamp_proofs_metadata(&id, &proofs).await {
                tracing::error!(id = %id, error = %err, "failed to persist timestamp proofs metadata");
            }
        });
    }
}
