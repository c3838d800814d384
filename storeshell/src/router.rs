//! Navigation routing for Storeshell
//!
//! Decides whether a URL is loaded in the embedded browser or handed off to
//! the OS. The allow-list is the primary storefront host plus a fixed set of
//! trusted suffix domains; everything else is delegated.
//!
//! Suffix matching is label-aligned: `checkout.shopifycdn.com` matches the
//! suffix `shopifycdn.com`, `evilshopifycdn.com` does not.

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::ConfigError;

/// What triggered a navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NavigationSource {
    ColdStart,
    NotificationTap,
    DeepLink,
    Reload,
    /// A link activated inside the loaded page
    PageLink,
}

impl NavigationSource {
    /// Higher wins when several candidates arrive at one foreground event
    fn precedence(self) -> u8 {
        match self {
            NavigationSource::NotificationTap => 3,
            NavigationSource::DeepLink => 2,
            NavigationSource::ColdStart => 1,
            NavigationSource::Reload | NavigationSource::PageLink => 0,
        }
    }
}

/// A URL plus the trigger that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationTarget {
    pub url: String,
    pub source: NavigationSource,
}

impl NavigationTarget {
    pub fn new(url: &str, source: NavigationSource) -> Self {
        Self {
            url: url.to_string(),
            source,
        }
    }
}

/// Router decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Navigate the embedded browser in place
    Load(String),
    /// Hand off to the OS URL handler; the current page stays untouched
    Delegate(String),
}

/// Answer to an in-page link activation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkPolicy {
    /// Let the browser engine continue the navigation
    Allow,
    /// Cancel it in the engine; the URL goes to the OS handler
    Cancel(String),
}

/// The storefront host and its trusted family
#[derive(Debug, Clone)]
pub struct AllowListPolicy {
    primary_url: String,
    primary_host: String,
    trusted_suffixes: Vec<String>,
}

impl AllowListPolicy {
    pub fn new<I, S>(primary_url: &str, trusted_suffixes: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let primary_host = Url::parse(primary_url)
            .ok()
            .and_then(|u| u.host_str().map(normalize_host))
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ConfigError::InvalidStoreUrl(primary_url.to_string()))?;

        let trusted_suffixes = trusted_suffixes
            .into_iter()
            .map(|s| normalize_host(s.as_ref().trim().trim_start_matches('.')))
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            primary_url: primary_url.to_string(),
            primary_host,
            trusted_suffixes,
        })
    }

    pub fn primary_url(&self) -> &str {
        &self.primary_url
    }

    pub fn primary_host(&self) -> &str {
        &self.primary_host
    }

    pub fn trusted_suffixes(&self) -> &[String] {
        &self.trusted_suffixes
    }

    /// Whether `host` is the store itself or one of its trusted domains
    pub fn is_trusted_host(&self, host: &str) -> bool {
        let host = normalize_host(host);
        if host.is_empty() {
            return false;
        }
        if host == self.primary_host {
            return true;
        }
        self.trusted_suffixes.iter().any(|suffix| {
            host == *suffix
                || (host.len() > suffix.len()
                    && host.ends_with(suffix.as_str())
                    && host.as_bytes()[host.len() - suffix.len() - 1] == b'.')
        })
    }
}

fn normalize_host(host: &str) -> String {
    host.trim_end_matches('.').to_ascii_lowercase()
}

/// Stateless URL policy over a fixed `AllowListPolicy`
#[derive(Debug, Clone)]
pub struct NavigationRouter {
    policy: AllowListPolicy,
}

impl NavigationRouter {
    pub fn new(policy: AllowListPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &AllowListPolicy {
        &self.policy
    }

    pub fn primary_url(&self) -> &str {
        self.policy.primary_url()
    }

    /// Decide where `target` goes. Never fails: garbage resolves to the storefront.
    pub fn resolve(&self, target: &NavigationTarget) -> Resolution {
        let url = target.url.trim();
        let parsed = match Url::parse(url) {
            Ok(url) => url,
            Err(e) => {
                debug!(url = %target.url, error = %e, "unparsable navigation url, loading storefront");
                return Resolution::Load(self.policy.primary_url().to_string());
            }
        };

        if target.source == NavigationSource::Reload {
            return Resolution::Load(url.to_string());
        }

        let web_scheme = matches!(parsed.scheme(), "http" | "https");
        let resolution = match parsed.host_str() {
            Some(host) if web_scheme && self.policy.is_trusted_host(host) => {
                Resolution::Load(url.to_string())
            }
            _ => Resolution::Delegate(url.to_string()),
        };

        debug!(%url, source = ?target.source, ?resolution, "resolved navigation");
        resolution
    }

    /// Policy for a link activated inside the loaded page
    pub fn intercept(&self, url: &str) -> LinkPolicy {
        match self.resolve(&NavigationTarget::new(url, NavigationSource::PageLink)) {
            Resolution::Load(_) => LinkPolicy::Allow,
            Resolution::Delegate(url) => LinkPolicy::Cancel(url),
        }
    }
}

/// Pick the highest-precedence candidate available at one foreground instant.
///
/// Notification taps beat deep links, both beat the cold-start default. Ties
/// keep the first candidate.
pub fn select_candidate<I>(candidates: I) -> Option<NavigationTarget>
where
    I: IntoIterator<Item = NavigationTarget>,
{
    let mut best: Option<NavigationTarget> = None;
    for candidate in candidates {
        let better = match &best {
            Some(current) => candidate.source.precedence() > current.source.precedence(),
            None => true,
        };
        if better {
            best = Some(candidate);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> NavigationRouter {
        let policy = AllowListPolicy::new(
            "https://store.myshop.com",
            ["shopify.com", ".shopifycdn.com"],
        )
        .unwrap();
        NavigationRouter::new(policy)
    }

    fn resolve(url: &str) -> Resolution {
        router().resolve(&NavigationTarget::new(url, NavigationSource::DeepLink))
    }

    #[test]
    fn test_primary_host_loads() {
        assert_eq!(
            resolve("https://store.myshop.com/products/1"),
            Resolution::Load("https://store.myshop.com/products/1".to_string())
        );
        assert_eq!(
            resolve("https://STORE.myshop.com./cart"),
            Resolution::Load("https://STORE.myshop.com./cart".to_string())
        );
    }

    #[test]
    fn test_untrusted_host_delegates() {
        assert_eq!(
            resolve("https://evil.com/phish"),
            Resolution::Delegate("https://evil.com/phish".to_string())
        );
        // Sibling of the primary host is not the primary host
        assert!(matches!(resolve("https://myshop.com/"), Resolution::Delegate(_)));
        assert!(matches!(resolve("https://www.store.myshop.com/"), Resolution::Delegate(_)));
    }

    #[test]
    fn test_trusted_suffix_loads() {
        assert_eq!(
            resolve("https://checkout.shopifycdn.com/x"),
            Resolution::Load("https://checkout.shopifycdn.com/x".to_string())
        );
        assert!(matches!(resolve("https://shopify.com/pay"), Resolution::Load(_)));
        assert!(matches!(resolve("https://a.b.shopify.com/"), Resolution::Load(_)));
    }

    #[test]
    fn test_suffix_match_is_label_aligned() {
        assert!(matches!(resolve("https://evilshopifycdn.com/x"), Resolution::Delegate(_)));
        assert!(matches!(resolve("https://shopify.com.evil.com/"), Resolution::Delegate(_)));
        assert!(matches!(resolve("https://notshopify.com/"), Resolution::Delegate(_)));
    }

    #[test]
    fn test_unparsable_url_loads_storefront() {
        assert_eq!(
            resolve("not a url at all"),
            Resolution::Load("https://store.myshop.com".to_string())
        );
        assert_eq!(
            resolve(""),
            Resolution::Load("https://store.myshop.com".to_string())
        );
    }

    #[test]
    fn test_non_web_schemes_delegate() {
        assert!(matches!(resolve("mailto:help@myshop.com"), Resolution::Delegate(_)));
        assert!(matches!(resolve("tel:+15550100"), Resolution::Delegate(_)));
        assert!(matches!(resolve("ftp://store.myshop.com/file"), Resolution::Delegate(_)));
    }

    #[test]
    fn test_surrounding_whitespace_is_trimmed() {
        assert_eq!(
            resolve("  https://store.myshop.com/products/1\n"),
            Resolution::Load("https://store.myshop.com/products/1".to_string())
        );
        assert_eq!(
            resolve("\thttps://evil.com/x "),
            Resolution::Delegate("https://evil.com/x".to_string())
        );
        let target = NavigationTarget::new(" https://store.myshop.com/a ", NavigationSource::Reload);
        assert_eq!(
            router().resolve(&target),
            Resolution::Load("https://store.myshop.com/a".to_string())
        );
    }

    #[test]
    fn test_reload_bypasses_host_check() {
        let target = NavigationTarget::new("https://evil.com/page", NavigationSource::Reload);
        assert_eq!(
            router().resolve(&target),
            Resolution::Load("https://evil.com/page".to_string())
        );
    }

    #[test]
    fn test_intercept_page_links() {
        let router = router();
        assert_eq!(router.intercept("https://store.myshop.com/collections"), LinkPolicy::Allow);
        assert_eq!(
            router.intercept("https://instagram.com/myshop"),
            LinkPolicy::Cancel("https://instagram.com/myshop".to_string())
        );
    }

    #[test]
    fn test_candidate_precedence() {
        let cold = NavigationTarget::new("https://store.myshop.com", NavigationSource::ColdStart);
        let deep = NavigationTarget::new("https://store.myshop.com/a", NavigationSource::DeepLink);
        let tap = NavigationTarget::new("https://store.myshop.com/b", NavigationSource::NotificationTap);

        assert_eq!(select_candidate(vec![cold.clone(), deep.clone()]), Some(deep.clone()));
        assert_eq!(select_candidate(vec![deep.clone(), cold.clone()]), Some(deep.clone()));
        assert_eq!(
            select_candidate(vec![cold.clone(), deep, tap.clone()]),
            Some(tap)
        );
        assert_eq!(select_candidate(vec![cold.clone()]), Some(cold));
        assert_eq!(select_candidate(Vec::new()), None);
    }

    #[test]
    fn test_policy_rejects_hostless_primary() {
        assert!(AllowListPolicy::new("not-a-url", ["shopify.com"]).is_err());
    }
}
