use serde::{Deserialize, Serialize};

/// One entry of a feed page: the submission id plus the opaque storage-node
/// reference carried by the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub id: String,
    pub node_id: String,
}

impl FeedEntry {
    pub fn new(id: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_id: node_id.into(),
        }
    }
}

/// An ordered page of feed entries together with its pagination state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPage {
    pub entries: Vec<FeedEntry>,
    pub end_cursor: Option<String>,
    pub has_more: bool,
}

impl FeedPage {
    /// A page with no entries; the poll loop sleeps and retries on these.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            end_cursor: None,
            has_more: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry_ids(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.id.clone()).collect()
    }
}

/// The durable marker of the last fully processed feed position.
///
/// `None` is the start-from-beginning sentinel: a fresh deployment (or a store
/// with no saved cursor) polls from the start of the feed rather than failing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checkpoint(Option<String>);

impl Checkpoint {
    /// Builds a checkpoint from whatever the store returned at startup.
    pub fn from_stored(value: Option<String>) -> Self {
        Self(value)
    }

    pub fn start() -> Self {
        Self(None)
    }

    /// The pagination key to hand to the feed provider.
    pub fn as_key(&self) -> Option<&str> {
        self.0.as_deref()
    }

    /// Replaces the checkpoint with a page's end cursor. Pages observed by the
    /// loop are non-empty, so a missing end cursor leaves the position alone.
    pub fn advance(&mut self, end_cursor: Option<String>) {
        if let Some(cursor) = end_cursor {
            self.0 = Some(cursor);
        }
    }

    pub fn value(&self) -> Option<&String> {
        self.0.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_stored_cursor_is_start_sentinel() {
        let checkpoint = Checkpoint::from_stored(None);
        assert_eq!(checkpoint, Checkpoint::start());
        assert_eq!(checkpoint.as_key(), None);
    }

    #[test]
    fn advance_replaces_the_cursor() {
        let mut checkpoint = Checkpoint::from_stored(Some("abc".into()));
        assert_eq!(checkpoint.as_key(), Some("abc"));

        checkpoint.advance(Some("def".into()));
        assert_eq!(checkpoint.as_key(), Some("def"));
    }

    #[test]
    fn advance_without_end_cursor_keeps_position() {
        let mut checkpoint = Checkpoint::from_stored(Some("abc".into()));
        checkpoint.advance(None);
        assert_eq!(checkpoint.as_key(), Some("abc"));
    }

    #[test]
    fn empty_page_has_no_entries() {
        let page = FeedPage::empty();
        assert!(page.is_empty());
        assert!(page.entry_ids().is_empty());
    }
}
