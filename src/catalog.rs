use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::listing::ListingSelectors;

/// Site knowledge the run relies on: listing layout, token hosts, path
/// templates, team names and decoys. Immutable once loaded and shared by every
/// worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Catalog {
    /// Hosts tried when synthesizing URLs out of harvested tokens
    pub token_hosts: Vec<String>,
    /// Manifest paths relative to a token host; `{stream}` is replaced by the stream name
    pub path_templates: Vec<String>,
    /// Team names recognized in `<team1>-vs-<team2>` event URLs
    pub teams: Vec<String>,
    /// Stream name used when no known team appears in the event URL
    pub placeholder_stream: String,
    pub hash_param: String,
    pub expiry_param: String,
    /// Query parameter names that mark a URL as carrying an auth token
    pub auth_params: Vec<String>,
    /// Hosts known to serve real streams
    pub streaming_hosts: Vec<String>,
    /// Manifest URLs the source serves regardless of the event
    pub decoy_urls: Vec<String>,
    pub listing: ListingSelectors,
}

impl Default for Catalog {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(ToString::to_string).collect::<Vec<_>>();

        Self {
            token_hosts: owned(&["duko.eachna.fun", "liauth.etrhg.fun"]),
            path_templates: owned(&["hls/{stream}/index.m3u8", "hls/{stream}2/index.m3u8"]),
            teams: owned(&[
                "juventus", "juve", "inter", "napoli", "milan", "roma", "lazio", "atalanta",
                "torino",
            ]),
            placeholder_stream: "serie".to_string(),
            hash_param: "md5".to_string(),
            expiry_param: "expiretime".to_string(),
            auth_params: owned(&["md5", "token", "auth", "key", "expiretime"]),
            streaming_hosts: owned(&["duko.eachna.fun", "liauth.etrhg.fun"]),
            decoy_urls: owned(&[
                "https://duko.eachna.fun/hls/juve2/index.m3u8?md5=14ed81b282aada752009ff9068c4c384&expiretime=1746962215",
            ]),
            listing: ListingSelectors::default(),
        }
    }
}

impl Catalog {
    /// Reads a JSON catalog. Missing keys fall back to the built-in defaults.
    ///
    /// # Errors
    /// Errors when the file cannot be read or is not valid JSON
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Reading catalog {}", path.display()))?;

        serde_json::from_str(&raw).with_context(|| format!("Parsing catalog {}", path.display()))
    }

    /// Whether `host` is one of the known streaming hosts or a subdomain of one
    #[must_use]
    pub fn is_streaming_host(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.streaming_hosts.iter().any(|known| {
            let known = known.to_ascii_lowercase();
            host == known
                || host
                    .strip_suffix(known.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    #[must_use]
    pub fn is_decoy(&self, url: &str) -> bool {
        self.decoy_urls.iter().any(|d| d == url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let catalog: Catalog =
            serde_json::from_str(r#"{ "tokenHosts": ["cdn.example"], "decoyUrls": [] }"#).unwrap();

        assert_eq!(catalog.token_hosts, vec!["cdn.example"]);
        assert!(catalog.decoy_urls.is_empty());
        assert_eq!(catalog.hash_param, "md5");
        assert_eq!(catalog.placeholder_stream, "serie");
        assert_eq!(catalog.listing.item, "li");
    }

    #[test]
    fn streaming_host_matches_subdomains_only() {
        let catalog = Catalog {
            streaming_hosts: vec!["eachna.fun".to_string()],
            ..Catalog::default()
        };

        assert!(catalog.is_streaming_host("eachna.fun"));
        assert!(catalog.is_streaming_host("duko.EACHNA.fun"));
        assert!(!catalog.is_streaming_host("noteachna.fun"));
    }

    #[tokio::test]
    async fn load_reads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        tokio::fs::write(&path, r#"{ "teams": ["genoa"] }"#).await.unwrap();

        let catalog = Catalog::load(&path).await.unwrap();
        assert_eq!(catalog.teams, vec!["genoa"]);
        assert!(Catalog::load(&dir.path().join("missing.json")).await.is_err());
    }
}
