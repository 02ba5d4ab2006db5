//! Outbound header allow-list.

use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Headers forwarded to remote agents unless configured otherwise.
pub const DEFAULT_ALLOWED_HEADERS: [&str; 4] =
    ["authorization", "x-api-key", "x-agent-api-key", "content-type"];

/// Case-insensitive allow-list for outbound headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderAllowList {
    allowed: HashSet<String>,
}

impl HeaderAllowList {
    /// Build the list from the defaults plus `extra` names, trimmed and lower-cased.
    pub fn new<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = DEFAULT_ALLOWED_HEADERS
            .iter()
            .map(|h| (*h).to_string())
            .chain(
                extra
                    .into_iter()
                    .map(|h| h.as_ref().trim().to_ascii_lowercase())
                    .filter(|h| !h.is_empty()),
            )
            .collect();
        Self { allowed }
    }

    /// Whether `name` may be forwarded, ignoring case.
    pub fn allows(&self, name: &str) -> bool {
        self.allowed.contains(&name.to_ascii_lowercase())
    }

    /// Merge per-request headers with agent headers and keep only allowed
    /// names, lower-cased and sorted.
    ///
    /// Agent configuration wins on a name clash, so a caller can add an
    /// allowed header but never replace the agent's own credentials.
    pub fn filter(
        &self,
        agent_headers: &HashMap<String, String>,
        request_headers: &HashMap<String, String>,
    ) -> Vec<(String, String)> {
        let mut merged: HashMap<String, String> = HashMap::new();
        for (name, value) in request_headers.iter().chain(agent_headers.iter()) {
            let lower = name.to_ascii_lowercase();
            if self.allows(&lower) {
                merged.insert(lower, value.clone());
            } else {
                debug!(header = %name, "Dropping header not on the allow-list");
            }
        }
        let mut headers: Vec<_> = merged.into_iter().collect();
        headers.sort();
        headers
    }
}

impl Default for HeaderAllowList {
    fn default() -> Self {
        Self::new(std::iter::empty::<&str>())
    }
}
