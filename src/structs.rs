use std::collections::HashSet;

use chrono::{DateTime, Local};
use reqwest::Url;

use crate::{catalog::Catalog, error::Unresolved};

/// One fixture found on the listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub title: String,
    pub page_url: String,
}

/// A fetched document. `url` is where the body actually came from, after redirects.
#[derive(Debug, Clone)]
pub struct PageContent {
    pub url: String,
    pub body: String,
}

/// A URL suspected of being a live manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub url: String,
    /// 0 for the event page itself, +1 per frame level
    pub depth: u32,
    pub has_auth_token: bool,
    pub originating_page: String,
}

impl Candidate {
    #[must_use]
    pub fn new(url: String, depth: u32, originating_page: &str, catalog: &Catalog) -> Self {
        let has_auth_token = has_auth_token(&url, &catalog.auth_params);
        Self {
            url,
            depth,
            has_auth_token,
            originating_page: originating_page.to_string(),
        }
    }
}

/// Whether the URL's query string carries any of `auth_params`
#[must_use]
pub fn has_auth_token(url: &str, auth_params: &[String]) -> bool {
    let Ok(url) = Url::parse(url) else {
        return false;
    };

    url.query_pairs()
        .any(|(key, _)| auth_params.iter().any(|p| p.eq_ignore_ascii_case(&key)))
}

#[derive(Debug, Clone)]
pub struct ValidatedCandidate {
    pub candidate: Candidate,
    pub reachable: bool,
    /// `None` when the probe was skipped or could not complete
    pub manifest_valid: Option<bool>,
}

/// Outcome for one event. Every event gets exactly one of these.
#[derive(Debug, Clone)]
pub struct ResolutionResult {
    pub event: Event,
    pub stream_url: Option<String>,
    pub resolved_at: DateTime<Local>,
    pub failure: Option<Unresolved>,
}

impl ResolutionResult {
    #[must_use]
    pub fn resolved(event: Event, stream_url: String) -> Self {
        Self {
            event,
            stream_url: Some(stream_url),
            resolved_at: Local::now(),
            failure: None,
        }
    }

    #[must_use]
    pub fn unresolved(event: Event, reason: Unresolved) -> Self {
        Self {
            event,
            stream_url: None,
            resolved_at: Local::now(),
            failure: Some(reason),
        }
    }

    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.stream_url.is_some()
    }
}

/// Candidates in discovery order, collapsed on exact URL equality
#[derive(Debug, Default)]
pub struct CandidatePool {
    candidates: Vec<Candidate>,
    seen: HashSet<String>,
}

impl CandidatePool {
    /// Returns `false` if a candidate with the same URL was already admitted
    pub fn admit(&mut self, candidate: Candidate) -> bool {
        if !self.seen.insert(candidate.url.clone()) {
            return false;
        }
        self.candidates.push(candidate);
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Candidate> {
        self.candidates
    }
}

impl Extend<Candidate> for CandidatePool {
    fn extend<T: IntoIterator<Item = Candidate>>(&mut self, iter: T) {
        for candidate in iter {
            self.admit(candidate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(url: &str) -> Candidate {
        Candidate::new(url.to_string(), 0, "https://site.example/", &Catalog::default())
    }

    #[test]
    fn pool_collapses_equal_urls() {
        let urls = [
            "https://a.example/x.m3u8",
            "https://a.example/y.m3u8",
            "https://a.example/x.m3u8",
            "https://A.example/x.m3u8",
        ];

        let mut pool = CandidatePool::default();
        pool.extend(urls.iter().map(|u| candidate(u)));

        let distinct = urls.iter().collect::<HashSet<_>>().len();
        assert_eq!(pool.len(), distinct);
        assert_eq!(pool.into_vec()[0].url, urls[0]);
    }

    #[test]
    fn auth_token_requires_exact_param_name() {
        let catalog = Catalog::default();

        assert!(has_auth_token(
            "https://cdn.example/hls/x/index.m3u8?md5=abc&expiretime=1700000000",
            &catalog.auth_params
        ));
        assert!(has_auth_token("https://cdn.example/a.m3u8?token=t", &catalog.auth_params));
        assert!(!has_auth_token("https://cdn.example/a.m3u8?monkey=1", &catalog.auth_params));
        assert!(!has_auth_token("https://cdn.example/a.m3u8", &catalog.auth_params));
    }
}
