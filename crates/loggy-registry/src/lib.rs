//! Source Registry (C3): classifies proxied URLs against declarative
//! vendor rules and tracks domains that look like analytics traffic
//! but matched nothing.

mod domain;
mod glob;
mod seed;

pub use domain::base_domain;
pub use glob::glob_match;
pub use seed::seed_sources;

use chrono::Utc;
use loggy_core::source::{Source, UnmatchedDomain, UnmatchedDomains};
use tokio::sync::RwLock;
use tracing::debug;

/// Path substrings that mark a request as analytics-shaped even when
/// no registered source recognizes it.
const ANALYTICS_HEURISTICS: &[&str] = &[
    "/analytics",
    "/events",
    "/track",
    "/collect",
    "/log",
    "/beacon",
    "/v1/batch",
    "/v1/track",
    "/evs",
    "/telemetry",
    "/metrics",
];

/// Thread-safe registry of sources plus the unmatched-domain feedback
/// list, guarded the way the concurrency model in §5 calls for: one
/// `RwLock` per shared resource, held only for the body of an
/// operation.
pub struct SourceRegistry {
    sources: RwLock<Vec<Source>>,
    unmatched: RwLock<UnmatchedDomains>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
            unmatched: RwLock::new(UnmatchedDomains::new()),
        }
    }

    /// A registry pre-populated with the seed vendor list.
    pub fn with_seed_sources() -> Self {
        Self {
            sources: RwLock::new(seed_sources()),
            unmatched: RwLock::new(UnmatchedDomains::new()),
        }
    }

    /// Classify `url` against the registered sources. Candidates are
    /// those enabled with a matching base domain and path glob; among
    /// candidates the most specific `url_pattern` wins (literal path
    /// segments outscore wildcard ones, an absent pattern scores
    /// lowest), ties broken by insertion order - the scored resolution
    /// of the registry's matching Open Question.
    pub async fn match_url(&self, url: &str) -> Option<Source> {
        let parsed = url::Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        let base = base_domain(host);
        let path = parsed.path();

        let sources = self.sources.read().await;
        let mut best: Option<(i32, &Source)> = None;

        for source in sources.iter() {
            if !source.enabled || source.domain != base {
                continue;
            }
            if !glob_match(path, source.url_pattern.as_deref()) {
                continue;
            }
            let score = pattern_specificity(source.url_pattern.as_deref());
            match &best {
                Some((best_score, _)) if *best_score >= score => {}
                _ => best = Some((score, source)),
            }
        }

        best.map(|(_, source)| source.clone())
    }

    /// Register a new source. Clears any unmatched-domain entry for
    /// its base domain, since it's now accounted for.
    pub async fn add(&self, source: Source) {
        let domain = source.domain.clone();
        self.sources.write().await.push(source);
        self.unmatched.write().await.remove(&domain);
    }

    /// Replace a source by id. A no-op if the id is unknown.
    pub async fn update(&self, source: Source) {
        let mut sources = self.sources.write().await;
        if let Some(slot) = sources.iter_mut().find(|s| s.id == source.id) {
            *slot = source;
        }
    }

    pub async fn remove(&self, id: &str) {
        self.sources.write().await.retain(|s| s.id != id);
    }

    /// Record that `id` produced at least one captured event just now.
    /// A no-op if the source was removed between matching and capture.
    pub async fn record_capture(&self, id: &str) {
        let mut sources = self.sources.write().await;
        if let Some(source) = sources.iter_mut().find(|s| s.id == id) {
            source.stats.record_capture(Utc::now());
        }
    }

    pub async fn sources(&self) -> Vec<Source> {
        self.sources.read().await.clone()
    }

    /// Replace the entire source list, as `POST /sources`'s full-sync
    /// semantics require.
    pub async fn replace_all(&self, sources: Vec<Source>) {
        *self.sources.write().await = sources;
    }

    /// Empty the unmatched-domain feedback map, as `POST /clear` requires.
    pub async fn clear_unmatched(&self) {
        self.unmatched.write().await.clear();
    }

    /// If `url`'s path looks like analytics traffic and no source
    /// matches it, upsert the unmatched-domain feedback entry.
    pub async fn track_unmatched(&self, url: &str, payload: serde_json::Value) {
        let Some(parsed) = url::Url::parse(url).ok() else {
            return;
        };
        let Some(host) = parsed.host_str() else {
            return;
        };
        let path_lower = parsed.path().to_lowercase();
        if !ANALYTICS_HEURISTICS.iter().any(|needle| path_lower.contains(needle)) {
            return;
        }
        if self.match_url(url).await.is_some() {
            return;
        }

        let base = base_domain(host);
        let now = Utc::now();
        let mut unmatched = self.unmatched.write().await;
        unmatched
            .entry(base.clone())
            .and_modify(|entry| {
                entry.last_payload = payload.clone();
                entry.count += 1;
                entry.last_seen = now;
            })
            .or_insert_with(|| {
                debug!("tracking new unmatched analytics-shaped domain: {}", base);
                UnmatchedDomain {
                    domain: base,
                    example_url: url.to_string(),
                    last_payload: payload,
                    count: 1,
                    first_seen: now,
                    last_seen: now,
                }
            });
    }

    /// All unmatched-domain entries, sorted by capture count desc.
    pub async fn unmatched(&self) -> Vec<UnmatchedDomain> {
        let unmatched = self.unmatched.read().await;
        let mut entries: Vec<UnmatchedDomain> = unmatched.values().cloned().collect();
        entries.sort_by(|a, b| b.count.cmp(&a.count));
        entries
    }
}

/// Higher is more specific: a fully literal segment outranks a
/// partial wildcard, which outranks a bare `*`/`**`; an absent
/// pattern (matches any path) scores below all of those.
fn pattern_specificity(pattern: Option<&str>) -> i32 {
    let Some(pattern) = pattern else {
        return -1;
    };
    pattern
        .trim_start_matches('/')
        .split('/')
        .map(|segment| {
            if segment == "*" || segment == "**" {
                0
            } else if segment.contains('*') {
                2
            } else {
                3
            }
        })
        .sum()
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
