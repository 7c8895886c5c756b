use std::sync::Arc;

use reqwest::Url;
use tracing::debug;

use crate::{catalog::Catalog, structs::ValidatedCandidate};

/// Preference class of a candidate, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    /// Carries an auth token and parsed as a playlist
    AuthAndValid,
    /// Carries an auth token, manifest not known to be bad
    Auth,
    KnownHost,
    Generic,
    /// Served regardless of the event. Only wins when nothing else exists.
    Decoy,
}

pub struct Prioritizer {
    catalog: Arc<Catalog>,
}

impl Prioritizer {
    #[must_use]
    pub const fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    #[must_use]
    pub fn tier(&self, v: &ValidatedCandidate) -> Tier {
        let c = &v.candidate;

        if self.catalog.is_decoy(&c.url) {
            return Tier::Decoy;
        }

        match (c.has_auth_token, v.manifest_valid) {
            (true, Some(true)) => Tier::AuthAndValid,
            (true, None) => Tier::Auth,
            _ if self.is_known_host(&c.url) => Tier::KnownHost,
            _ => Tier::Generic,
        }
    }

    /// Picks the single best candidate: lowest tier, then reachable before
    /// unreachable, then discovery order. `None` only for an empty slice.
    #[must_use]
    pub fn select<'a>(&self, candidates: &'a [ValidatedCandidate]) -> Option<&'a ValidatedCandidate> {
        let (_, winner) = candidates
            .iter()
            .enumerate()
            .min_by_key(|(i, v)| (self.tier(v), !v.reachable, *i))?;

        debug!(url = %winner.candidate.url, tier = ?self.tier(winner), "Selected candidate");
        Some(winner)
    }

    fn is_known_host(&self, url: &str) -> bool {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| self.catalog.is_streaming_host(h)))
            .unwrap_or(false)
    }
}
