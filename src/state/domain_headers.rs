//! Per-domain header composition and user-agent rotation
//!
//! Each domain owns an entry holding its persistent header overrides, its
//! time-limited custom overrides, and its user-agent rotation index. All
//! reads and mutations for one domain go through that entry's async mutex,
//! so two concurrent requests to the same domain can never observe a
//! half-applied override or double-advance the rotation. Entries are created
//! lazily on first use; the map itself sits behind a plain mutex that is
//! never held across an await.

use crate::config::HeadersConfig;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const USER_AGENT_KEY: &str = "user-agent";

#[derive(Debug, Default)]
struct DomainEntry {
    /// Persistent per-domain overrides
    domain_headers: BTreeMap<String, String>,
    /// Time-limited per-domain overrides
    custom_headers: BTreeMap<String, String>,
    /// Bumped on every custom-header mutation; a scheduled expiry only
    /// fires if no newer mutation has replaced the override it belongs to
    custom_epoch: u64,
    /// Round-robin position into the configured user-agent list
    agent_index: usize,
}

/// Composes request headers per domain and serializes their mutation
pub struct HeaderStore {
    defaults: BTreeMap<String, String>,
    user_agents: Vec<String>,
    entries: std::sync::Mutex<HashMap<String, Arc<Mutex<DomainEntry>>>>,
}

impl HeaderStore {
    pub fn new(config: &HeadersConfig) -> Self {
        Self {
            defaults: config.default_headers.clone(),
            user_agents: config.user_agents.clone(),
            entries: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn entry(&self, domain: &str) -> Arc<Mutex<DomainEntry>> {
        let mut entries = self.entries.lock().unwrap();
        entries
            .entry(domain.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(DomainEntry::default())))
            .clone()
    }

    /// Composes the effective headers for a request to `domain`.
    ///
    /// Precedence, later wins: defaults, then the domain's persistent
    /// overrides, then its custom overrides. When user-agents are
    /// configured, the next agent in the domain's independent round-robin
    /// rotation is substituted under `user-agent`.
    pub async fn headers_for(&self, domain: &str) -> BTreeMap<String, String> {
        let entry = self.entry(domain);
        let mut entry = entry.lock().await;

        let mut headers = self.defaults.clone();
        headers.extend(entry.domain_headers.clone());
        headers.extend(entry.custom_headers.clone());

        if !self.user_agents.is_empty() {
            let agent = self.user_agents[entry.agent_index % self.user_agents.len()].clone();
            entry.agent_index = (entry.agent_index + 1) % self.user_agents.len();
            headers.insert(USER_AGENT_KEY.to_string(), agent);
        }

        headers
    }

    /// Replaces the domain's persistent header overrides
    pub async fn set_domain_headers(&self, domain: &str, headers: BTreeMap<String, String>) {
        let entry = self.entry(domain);
        entry.lock().await.domain_headers = headers;
    }

    /// Clears the domain's persistent header overrides
    pub async fn remove_domain_headers(&self, domain: &str) {
        let entry = self.entry(domain);
        entry.lock().await.domain_headers.clear();
    }

    /// Sets time-limited overrides for the domain.
    ///
    /// With a `ttl`, a countdown is scheduled that deletes the override once
    /// the ttl elapses, unless a newer custom-header mutation has replaced
    /// it in the meantime. The countdown is best-effort timing, not an
    /// exact deadline.
    pub async fn set_custom_headers(
        &self,
        domain: &str,
        headers: BTreeMap<String, String>,
        ttl: Option<Duration>,
    ) {
        let entry = self.entry(domain);
        let epoch = {
            let mut entry = entry.lock().await;
            entry.custom_headers = headers;
            entry.custom_epoch += 1;
            entry.custom_epoch
        };

        if let Some(ttl) = ttl {
            let entry = entry.clone();
            let domain = domain.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(ttl).await;
                let mut entry = entry.lock().await;
                if entry.custom_epoch == epoch {
                    entry.custom_headers.clear();
                    tracing::debug!(domain = %domain, "custom headers expired");
                }
            });
        }
    }

    /// Clears all per-domain state unconditionally
    pub fn reset(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Number of domains with live state
    pub fn domain_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}
