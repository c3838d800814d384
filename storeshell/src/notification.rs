//! Canonical notification value shared by the gateway, scheduler and presenter

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

/// A notification ready to be presented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// URL to open when the alert is tapped
    pub deep_link_url: Option<String>,
    pub channel_id: String,
    /// Presentations with the same key replace each other
    pub dedup_key: String,
}

impl Notification {
    pub fn new(title: &str, body: &str, channel_id: &str, dedup_key: &str) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            deep_link_url: None,
            channel_id: channel_id.to_string(),
            dedup_key: dedup_key.to_string(),
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.deep_link_url = Some(url.to_string());
        self
    }
}

/// Stable dedup key for an externally triggered alert without an explicit id.
///
/// Identical (title, body, url) triples always produce the same key, so a
/// re-delivered push collapses onto the alert already shown.
pub fn content_dedup_key(title: &str, body: &str, url: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update([0u8]);
    hasher.update(body.as_bytes());
    hasher.update([0u8]);
    hasher.update(url.unwrap_or("").as_bytes());
    let digest = hasher.finalize();

    let hex: String = digest[..16].iter().map(|b| format!("{:02x}", b)).collect();
    format!("push:{}", hex)
}

/// A notification channel as the OS sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: String,
    pub name: String,
}

/// Tracks which channels have been created. Creating twice is a no-op.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: HashMap<String, Channel>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a channel exists; returns true only when it was just created.
    pub fn ensure(&mut self, id: &str, name: &str) -> bool {
        if self.channels.contains_key(id) {
            return false;
        }
        debug!(channel = id, "creating notification channel");
        self.channels.insert(
            id.to_string(),
            Channel {
                id: id.to_string(),
                name: name.to_string(),
            },
        );
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.channels.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_key_is_stable() {
        let a = content_dedup_key("Sale", "50% off", Some("https://store.myshop.com/sale"));
        let b = content_dedup_key("Sale", "50% off", Some("https://store.myshop.com/sale"));
        assert_eq!(a, b);
        assert!(a.starts_with("push:"));
        assert_eq!(a.len(), "push:".len() + 32);
    }

    #[test]
    fn test_dedup_key_separates_fields() {
        // "ab" + "c" must not collide with "a" + "bc"
        assert_ne!(content_dedup_key("ab", "c", None), content_dedup_key("a", "bc", None));
        assert_ne!(
            content_dedup_key("t", "b", None),
            content_dedup_key("t", "b", Some("https://x.com"))
        );
    }

    #[test]
    fn test_channel_registry_is_idempotent() {
        let mut registry = ChannelRegistry::new();
        assert!(registry.ensure("store", "Store updates"));
        assert!(!registry.ensure("store", "Store updates"));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("store"));
    }
}
