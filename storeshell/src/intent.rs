//! Intents for Storeshell
//! The OS hands deep links and notification taps to the app as intents

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::router::{NavigationSource, NavigationTarget};

/// Generic "view" action carried by deep links
pub const ACTION_VIEW: &str = "android.intent.action.VIEW";

/// Extra carrying the URL attached to a tapped notification
pub const EXTRA_NOTIFICATION_URL: &str = "notification_url";

/// An intent delivered by the OS on launch or while running
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub action: Option<String>,
    pub data: Option<String>,
    #[serde(default)]
    pub extras: HashMap<String, String>,
}

impl Intent {
    /// A deep link: VIEW action carrying a URI
    pub fn view(uri: &str) -> Self {
        Self {
            action: Some(ACTION_VIEW.to_string()),
            data: Some(uri.to_string()),
            extras: HashMap::new(),
        }
    }

    /// The intent delivered back when a notification is tapped
    pub fn notification_tap(url: Option<&str>) -> Self {
        let mut extras = HashMap::new();
        if let Some(url) = url {
            extras.insert(EXTRA_NOTIFICATION_URL.to_string(), url.to_string());
        }
        Self {
            action: None,
            data: None,
            extras,
        }
    }

    pub fn with_extra(mut self, key: &str, value: &str) -> Self {
        self.extras.insert(key.to_string(), value.to_string());
        self
    }

    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extras
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn is_view(&self) -> bool {
        self.action.as_deref() == Some(ACTION_VIEW)
    }

    /// Every navigation candidate carried by this intent.
    ///
    /// A tap URL and a VIEW URI can both be present; the router picks
    /// between them by source precedence.
    pub fn navigation_candidates(&self) -> Vec<NavigationTarget> {
        let mut candidates = Vec::new();

        if let Some(url) = self.extra(EXTRA_NOTIFICATION_URL) {
            candidates.push(NavigationTarget::new(url, NavigationSource::NotificationTap));
        }

        if self.is_view() {
            if let Some(uri) = self.data.as_deref().filter(|d| !d.trim().is_empty()) {
                candidates.push(NavigationTarget::new(uri, NavigationSource::DeepLink));
            }
        }

        candidates
    }
}

/// Find a deep link among launch arguments (an argument that looks like a URI)
pub fn intent_from_args<I, S>(args: I) -> Option<Intent>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter()
        .map(|a| a.as_ref().trim().to_string())
        .find(|a| a.contains("://"))
        .map(|uri| Intent::view(&uri))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_intent_is_deep_link() {
        let intent = Intent::view("https://store.myshop.com/products/1");
        let candidates = intent.navigation_candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].source, NavigationSource::DeepLink);
        assert_eq!(candidates[0].url, "https://store.myshop.com/products/1");
    }

    #[test]
    fn test_tap_intent_without_url_has_no_candidates() {
        assert!(Intent::notification_tap(None).navigation_candidates().is_empty());
        let blank = Intent::default().with_extra(EXTRA_NOTIFICATION_URL, "  ");
        assert!(blank.navigation_candidates().is_empty());
    }

    #[test]
    fn test_data_without_view_action_is_ignored() {
        let intent = Intent {
            action: Some("android.intent.action.MAIN".to_string()),
            data: Some("https://store.myshop.com".to_string()),
            extras: HashMap::new(),
        };
        assert!(intent.navigation_candidates().is_empty());
    }

    #[test]
    fn test_both_candidates_present() {
        let intent = Intent::view("https://store.myshop.com/a")
            .with_extra(EXTRA_NOTIFICATION_URL, "https://store.myshop.com/b");
        let sources: Vec<_> = intent
            .navigation_candidates()
            .into_iter()
            .map(|t| t.source)
            .collect();
        assert_eq!(
            sources,
            vec![NavigationSource::NotificationTap, NavigationSource::DeepLink]
        );
    }

    #[test]
    fn test_intent_from_args() {
        let intent = intent_from_args(["--flag", "myshop://products/7"]).unwrap();
        assert_eq!(intent.data.as_deref(), Some("myshop://products/7"));
        assert!(intent_from_args(["--flag", "plain"]).is_none());
    }
}
