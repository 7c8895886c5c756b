use std::{sync::Arc, time::Duration};

use futures_util::{StreamExt as _, stream};
use m3u8_rs::Playlist;
use tracing::{debug, instrument};

use crate::{
    error::ManifestError,
    fetch::{Fetcher, Method, Request},
    structs::{Candidate, ValidatedCandidate},
};

pub struct CandidateValidator {
    fetcher: Arc<dyn Fetcher>,
    timeout: Duration,
    probe_manifests: bool,
}

impl CandidateValidator {
    #[must_use]
    pub fn new(fetcher: Arc<dyn Fetcher>, timeout: Duration, probe_manifests: bool) -> Self {
        Self {
            fetcher,
            timeout,
            probe_manifests,
        }
    }

    /// Probes a candidate. Never fails: problems only lower the candidate's standing.
    #[instrument(skip(self, candidate), fields(url = %candidate.url))]
    pub async fn validate(&self, candidate: Candidate) -> ValidatedCandidate {
        let reachable = self.is_reachable(&candidate.url).await;
        let manifest_valid = if reachable && self.probe_manifests {
            self.probe_manifest(&candidate.url).await
        } else {
            None
        };

        debug!("reachable={reachable} manifest_valid={manifest_valid:?}");
        ValidatedCandidate {
            candidate,
            reachable,
            manifest_valid,
        }
    }

    /// Validates up to `concurrency` candidates at once, keeping discovery order
    pub async fn validate_all(
        &self,
        candidates: Vec<Candidate>,
        concurrency: usize,
    ) -> Vec<ValidatedCandidate> {
        stream::iter(candidates)
            .map(|c| self.validate(c))
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    async fn is_reachable(&self, url: &str) -> bool {
        let head = Request::get(url, self.timeout).method(Method::Head);
        match self.fetcher.fetch(head).await {
            Ok(_) => true,
            // Servers that refuse HEAD get a GET that stops after the first chunk
            Err(e) if matches!(e.status(), Some(403 | 405 | 501)) => {
                let peek = Request::get(url, self.timeout).method(Method::Peek);
                self.fetcher.fetch(peek).await.is_ok()
            }
            Err(e) => {
                debug!("Unreachable: {e}");
                false
            }
        }
    }

    async fn probe_manifest(&self, url: &str) -> Option<bool> {
        let res = match self.fetcher.fetch(Request::get(url, self.timeout)).await {
            Ok(res) => res,
            Err(e) => {
                debug!("Manifest probe failed: {e}");
                return None;
            }
        };

        match parse_manifest(&res.body) {
            Ok(valid) => Some(valid),
            Err(ManifestError::NotAPlaylist) => Some(false),
            Err(e @ ManifestError::Malformed(_)) => {
                debug!("{e}");
                None
            }
        }
    }
}

/// Whether `body` is a usable playlist: a master listing at least one variant,
/// or a media playlist listing at least one segment.
///
/// # Errors
/// `NotAPlaylist` when the body lacks the `#EXTM3U` header, `Malformed` when it
/// has one but does not parse
pub fn parse_manifest(body: &str) -> Result<bool, ManifestError> {
    if !body.trim_start_matches('\u{feff}').trim_start().starts_with("#EXTM3U") {
        return Err(ManifestError::NotAPlaylist);
    }

    match m3u8_rs::parse_playlist_res(body.trim_start_matches('\u{feff}').as_bytes()) {
        Ok(Playlist::MasterPlaylist(master)) => Ok(!master.variants.is_empty()),
        Ok(Playlist::MediaPlaylist(media)) => Ok(!media.segments.is_empty()),
        Err(e) => Err(ManifestError::Malformed(format!("{e:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{catalog::Catalog, fetch::testing::FakeFetcher};

    const MASTER: &str = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1280000,RESOLUTION=1280x720\n720p/index.m3u8\n";
    const MEDIA: &str =
        "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n#EXT-X-MEDIA-SEQUENCE:1\n#EXTINF:6.0,\nseg1.ts\n#EXTINF:6.0,\nseg2.ts\n";

    fn candidate(url: &str) -> Candidate {
        Candidate::new(url.to_string(), 0, "https://site.example/", &Catalog::default())
    }

    #[test]
    fn recognizes_master_and_media_playlists() {
        assert!(parse_manifest(MASTER).unwrap());
        assert!(parse_manifest(MEDIA).unwrap());
        assert!(!parse_manifest("#EXTM3U\n#EXT-X-TARGETDURATION:6\n").unwrap());
        assert!(matches!(
            parse_manifest("<html>403 Forbidden</html>"),
            Err(ManifestError::NotAPlaylist)
        ));
    }

    #[tokio::test]
    async fn valid_manifest_is_reachable_and_valid() {
        let url = "https://cdn.example/live/index.m3u8";
        let validator = CandidateValidator::new(
            Arc::new(FakeFetcher::new().page(url, MASTER)),
            Duration::from_secs(1),
            true,
        );

        let v = validator.validate(candidate(url)).await;
        assert!(v.reachable);
        assert_eq!(v.manifest_valid, Some(true));
    }

    #[tokio::test]
    async fn falls_back_to_streamed_get_when_head_is_refused() {
        let url = "https://cdn.example/live/index.m3u8";
        let fetcher = Arc::new(FakeFetcher::new().page(url, MEDIA).fail(url, Method::Head, 405));
        let validator = CandidateValidator::new(fetcher.clone(), Duration::from_secs(1), false);

        let v = validator.validate(candidate(url)).await;
        assert!(v.reachable);
        assert_eq!(v.manifest_valid, None);
        assert!(
            fetcher
                .requests()
                .iter()
                .any(|(method, u, _)| *method == Method::Peek && u == url)
        );
    }

    #[tokio::test]
    async fn network_failures_are_soft() {
        let down = "https://down.example/a.m3u8";
        let flaky = "https://flaky.example/b.m3u8";
        let fetcher = FakeFetcher::new()
            .page(flaky, MEDIA)
            .fail(flaky, Method::Get, 502);
        let validator =
            CandidateValidator::new(Arc::new(fetcher), Duration::from_secs(1), true);

        let results = validator
            .validate_all(vec![candidate(down), candidate(flaky)], 4)
            .await;

        assert_eq!(results[0].candidate.url, down);
        assert!(!results[0].reachable);
        assert_eq!(results[0].manifest_valid, None);

        assert!(results[1].reachable);
        assert_eq!(results[1].manifest_valid, None);
    }

    #[tokio::test]
    async fn html_body_is_not_a_valid_manifest() {
        let url = "https://cdn.example/fake.m3u8";
        let validator = CandidateValidator::new(
            Arc::new(FakeFetcher::new().page(url, "<html>nope</html>")),
            Duration::from_secs(1),
            true,
        );

        assert_eq!(
            validator.validate(candidate(url)).await.manifest_valid,
            Some(false)
        );
    }
}
