use std::{collections::HashSet, sync::LazyLock, time::Duration};

use futures_util::future::join_all;
use reqwest::Url;
use scraper::{Html, Selector};
use tracing::{debug, instrument};

use crate::{
    catalog::Catalog,
    extract::{absolutize, extract, is_manifest_like, redirect_targets},
    fetch::{Fetcher, Request},
    structs::{Candidate, PageContent},
};

static FRAME_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("iframe[src], frame[src], embed[src]").unwrap());

/// What a traversal found below one page
#[derive(Debug, Default)]
pub struct Traversal {
    pub candidates: Vec<Candidate>,
    /// Every frame body fetched on the way down, for token harvesting
    pub frames: Vec<PageContent>,
}

pub struct FrameTraversal<'a> {
    fetcher: &'a dyn Fetcher,
    catalog: &'a Catalog,
    max_depth: u32,
    timeout: Duration,
}

impl<'a> FrameTraversal<'a> {
    #[must_use]
    pub fn new(
        fetcher: &'a dyn Fetcher,
        catalog: &'a Catalog,
        max_depth: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            catalog,
            max_depth,
            timeout,
        }
    }

    /// Walks the frames embedded in `page`, one depth level at a time.
    ///
    /// A level is only fetched while its parent sits below `max_depth`, and a
    /// URL already in `visited` is never fetched again, so cyclic embeds
    /// terminate. Frames that fail to load are skipped.
    #[instrument(skip(self, page, visited), fields(page = %page.url))]
    pub async fn traverse(
        &self,
        page: &PageContent,
        base_depth: u32,
        visited: &mut HashSet<String>,
    ) -> Traversal {
        let mut found = Traversal::default();
        visited.insert(page.url.clone());

        let mut depth = base_depth;
        let mut frontier = frame_targets(page)
            .into_iter()
            .map(|url| (url, page.url.clone()))
            .collect::<Vec<_>>();

        while depth < self.max_depth && !frontier.is_empty() {
            let level = frontier
                .drain(..)
                .filter(|(url, _)| visited.insert(url.clone()))
                .collect::<Vec<_>>();

            let pages = join_all(
                level
                    .iter()
                    .map(|(url, referer)| self.fetch_frame(url, referer)),
            )
            .await;
            depth += 1;

            for ((frame_url, _), frame) in level.iter().zip(pages) {
                let Some(frame) = frame else {
                    continue;
                };
                visited.insert(frame.url.clone());

                if let Ok(base) = Url::parse(&frame.url) {
                    found.candidates.extend(
                        extract(&frame.body, &base)
                            .into_iter()
                            .map(|url| Candidate::new(url, depth, frame_url, self.catalog)),
                    );
                }

                frontier.extend(
                    frame_targets(&frame)
                        .into_iter()
                        .map(|url| (url, frame.url.clone())),
                );
                found.frames.push(frame);
            }
        }

        debug!(
            "Traversal found {} candidates in {} frames",
            found.candidates.len(),
            found.frames.len()
        );
        found
    }

    async fn fetch_frame(&self, url: &str, referer: &str) -> Option<PageContent> {
        match self
            .fetcher
            .fetch(Request::get(url, self.timeout).referer(referer))
            .await
        {
            Ok(res) => Some(res.into()),
            Err(e) => {
                debug!("Skipping frame: {e}");
                None
            }
        }
    }
}

/// Frame sources and non-manifest redirect targets of a page, absolute
fn frame_targets(page: &PageContent) -> Vec<String> {
    let Ok(base) = Url::parse(&page.url) else {
        return Vec::new();
    };

    let document = Html::parse_document(&page.body);
    let mut targets = document
        .select(&FRAME_SELECTOR)
        .filter_map(|el| el.value().attr("src"))
        .filter_map(|src| absolutize(src, &base))
        .filter(|url| !is_manifest_like(url))
        .collect::<Vec<_>>();

    targets.extend(redirect_targets(&page.body, &base));
    targets
}
