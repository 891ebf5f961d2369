//! Webhook URL allowlist.
//!
//! Checked once, at admission. A URL passes when it uses https and matches
//! a configured entry on scheme, host and port, with the entry's path as a
//! prefix. Everything else, including anything that fails to parse, is
//! rejected.

use tracing::warn;
use url::Url;

/// Allowed webhook destinations.
#[derive(Debug, Clone)]
pub struct WebhookAllowlist {
    entries: Vec<Url>,
}

impl WebhookAllowlist {
    /// Build from configured patterns. Entries that do not parse as URLs
    /// are dropped with a warning rather than silently widening the list.
    pub fn new(patterns: impl IntoIterator<Item = String>) -> Self {
        let mut entries = Vec::new();
        for pattern in patterns {
            let pattern = pattern.trim();
            if pattern.is_empty() {
                continue;
            }
            match Url::parse(pattern) {
                Ok(url) => entries.push(url),
                Err(e) => warn!("Ignoring unparsable allowlist entry {:?}: {}", pattern, e),
            }
        }
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether callbacks may be sent to this URL.
    pub fn is_allowed(&self, raw: &str) -> bool {
        let Ok(url) = Url::parse(raw) else {
            return false;
        };
        // Secure transport only; http entries in the config are inert
        if url.scheme() != "https" {
            return false;
        }
        self.entries.iter().any(|allowed| {
            allowed.scheme() == url.scheme()
                && allowed.host_str() == url.host_str()
                && allowed.port_or_known_default() == url.port_or_known_default()
                && url.path().starts_with(allowed.path())
        })
    }
}
