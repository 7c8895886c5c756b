//! Fallback candidate generator.
//!
//! The source sites rotate the manifest path per match but keep the token
//! scheme stable for a while, so a freshly scraped `md5`/`expiretime` pair on a
//! guessed path is often accepted. Speculative by nature: only ever run when
//! nothing was found on the page.

use std::sync::{Arc, LazyLock};

use anyhow::Result;
use regex::Regex;
use tracing::{debug, info};

use crate::{
    catalog::Catalog,
    structs::{Candidate, Event},
};

static VS_FRAGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/([a-z]+)-vs-([a-z]+)").unwrap());

/// Produces speculative candidates for an event when scanning found nothing
pub trait Synthesizer: Send + Sync {
    fn synthesize(&self, page_texts: &[&str], event: &Event) -> Vec<Candidate>;
}

pub struct TokenSynthesizer {
    catalog: Arc<Catalog>,
    hash_pattern: Regex,
    expiry_pattern: Regex,
}

impl TokenSynthesizer {
    /// # Errors
    /// Errors when the catalog's parameter names blow up the token patterns
    pub fn new(catalog: Arc<Catalog>) -> Result<Self> {
        let hash_pattern = Regex::new(&format!(
            r#"(?i:\b{})["']?\s*[:=]\s*["']?([a-fA-F0-9]{{32}})\b"#,
            regex::escape(&catalog.hash_param)
        ))?;
        let expiry_pattern = Regex::new(&format!(
            r#"(?i:\b{})["']?\s*[:=]\s*["']?(\d{{10}})\b"#,
            regex::escape(&catalog.expiry_param)
        ))?;

        Ok(Self {
            catalog,
            hash_pattern,
            expiry_pattern,
        })
    }

    /// Picks the stream name out of a `/<team1>-vs-<team2>` event URL
    #[must_use]
    pub fn stream_name(&self, event_url: &str) -> String {
        let lower = event_url.to_lowercase();
        VS_FRAGMENT
            .captures(&lower)
            .and_then(|caps| {
                [caps.get(1), caps.get(2)]
                    .into_iter()
                    .flatten()
                    .map(|m| m.as_str())
                    .find(|team| self.catalog.teams.iter().any(|t| t.as_str() == *team))
                    .map(ToString::to_string)
            })
            .unwrap_or_else(|| self.catalog.placeholder_stream.clone())
    }

    fn harvest(pattern: &Regex, page_texts: &[&str]) -> Vec<String> {
        let mut tokens = Vec::<String>::new();
        for caps in page_texts.iter().flat_map(|text| pattern.captures_iter(text)) {
            let token = caps[1].to_string();
            if !tokens.contains(&token) {
                tokens.push(token);
            }
        }
        tokens
    }
}

impl Synthesizer for TokenSynthesizer {
    fn synthesize(&self, page_texts: &[&str], event: &Event) -> Vec<Candidate> {
        let hashes = Self::harvest(&self.hash_pattern, page_texts);
        let expiries = Self::harvest(&self.expiry_pattern, page_texts);

        if hashes.is_empty() || expiries.is_empty() {
            debug!(
                "No usable tokens ({} hashes, {} expiries)",
                hashes.len(),
                expiries.len()
            );
            return Vec::new();
        }

        let stream = self.stream_name(&event.page_url);
        let catalog = &self.catalog;
        let mut candidates = Vec::new();

        for host in &catalog.token_hosts {
            for template in &catalog.path_templates {
                let path = template.replace("{stream}", &stream);
                let path = path.trim_start_matches('/');
                for hash in &hashes {
                    for expiry in &expiries {
                        let url = format!(
                            "https://{host}/{path}?{}={hash}&{}={expiry}",
                            catalog.hash_param, catalog.expiry_param
                        );
                        candidates.push(Candidate::new(url, 0, &event.page_url, catalog));
                    }
                }
            }
        }

        info!(
            "Synthesized {} candidates for stream `{stream}`",
            candidates.len()
        );
        candidates
    }
}
