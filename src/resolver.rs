use std::{collections::HashSet, sync::Arc, time::Duration};

use anyhow::Result;
use indicatif::ProgressBar;
use reqwest::Url;
use tokio::{select, sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    catalog::Catalog,
    error::Unresolved,
    extract::extract,
    fetch::{Fetcher, Request},
    prioritize::Prioritizer,
    structs::{Candidate, CandidatePool, Event, PageContent, ResolutionResult},
    synth::{Synthesizer, TokenSynthesizer},
    traverse::FrameTraversal,
    validate::CandidateValidator,
};

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub max_frame_depth: u32,
    pub fetch_timeout: Duration,
    pub probe_timeout: Duration,
    /// GET and parse each reachable candidate as a playlist
    pub probe_manifests: bool,
    /// Candidates validated at once within one event
    pub validation_concurrency: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            max_frame_depth: 3,
            fetch_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            probe_manifests: true,
            validation_concurrency: 4,
        }
    }
}

/// Where an event's resolution currently stands
#[derive(Debug, Clone, Copy)]
enum Stage {
    Init,
    DirectAndFrameScan,
    TokenSynthesis,
    Validation,
    Prioritization,
}

pub struct StreamResolver {
    fetcher: Arc<dyn Fetcher>,
    catalog: Arc<Catalog>,
    synthesizer: Arc<dyn Synthesizer>,
    validator: CandidateValidator,
    prioritizer: Prioritizer,
    settings: ResolverSettings,
}

impl StreamResolver {
    /// # Errors
    /// Errors when the token synthesizer cannot be built from the catalog
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        catalog: Arc<Catalog>,
        settings: ResolverSettings,
    ) -> Result<Self> {
        let synthesizer = Arc::new(TokenSynthesizer::new(catalog.clone())?);

        Ok(Self {
            validator: CandidateValidator::new(
                fetcher.clone(),
                settings.probe_timeout,
                settings.probe_manifests,
            ),
            prioritizer: Prioritizer::new(catalog.clone()),
            fetcher,
            catalog,
            synthesizer,
            settings,
        })
    }

    #[must_use]
    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn Synthesizer>) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    /// Runs the whole cascade for one event. Never fails; the outcome is in the result.
    #[instrument(skip(self, event), fields(title = %event.title))]
    pub async fn resolve(&self, event: &Event) -> ResolutionResult {
        debug!(stage = ?Stage::Init, "Fetching {}", event.page_url);
        let page: PageContent = match self
            .fetcher
            .fetch(Request::get(&event.page_url, self.settings.fetch_timeout))
            .await
        {
            Ok(res) => res.into(),
            Err(e) => {
                warn!("Unresolved `{}`: {e}", event.title);
                return ResolutionResult::unresolved(event.clone(), Unresolved::PageUnavailable);
            }
        };

        debug!(stage = ?Stage::DirectAndFrameScan);
        let mut pool = CandidatePool::default();
        if let Ok(base) = Url::parse(&page.url) {
            pool.extend(
                extract(&page.body, &base)
                    .into_iter()
                    .map(|url| Candidate::new(url, 0, &page.url, &self.catalog)),
            );
        }

        let traversal = FrameTraversal::new(
            self.fetcher.as_ref(),
            &self.catalog,
            self.settings.max_frame_depth,
            self.settings.fetch_timeout,
        )
        .traverse(&page, 0, &mut HashSet::new())
        .await;
        pool.extend(traversal.candidates);

        if pool.is_empty() {
            debug!(stage = ?Stage::TokenSynthesis);
            let texts = std::iter::once(page.body.as_str())
                .chain(traversal.frames.iter().map(|f| f.body.as_str()))
                .collect::<Vec<_>>();
            pool.extend(self.synthesizer.synthesize(&texts, event));
        }

        if pool.is_empty() {
            warn!("Unresolved `{}`: {}", event.title, Unresolved::NoCandidate);
            return ResolutionResult::unresolved(event.clone(), Unresolved::NoCandidate);
        }

        debug!(stage = ?Stage::Validation, "{} candidates", pool.len());
        let validated = self
            .validator
            .validate_all(pool.into_vec(), self.settings.validation_concurrency)
            .await;

        debug!(stage = ?Stage::Prioritization);
        match self.prioritizer.select(&validated) {
            Some(winner) => {
                info!("Resolved `{}`: {}", event.title, winner.candidate.url);
                ResolutionResult::resolved(event.clone(), winner.candidate.url.clone())
            }
            None => {
                warn!("Unresolved `{}`: {}", event.title, Unresolved::NoCandidate);
                ResolutionResult::unresolved(event.clone(), Unresolved::NoCandidate)
            }
        }
    }

    /// Resolves every event with at most `max_workers` in flight.
    ///
    /// Results come back in `events` order. Once `ct` is cancelled, events
    /// still queued or in flight are recorded as `DeadlineExceeded`.
    pub async fn resolve_all(
        self: Arc<Self>,
        events: Vec<Event>,
        max_workers: usize,
        ct: CancellationToken,
        progress: &ProgressBar,
    ) -> Vec<ResolutionResult> {
        let workers = Arc::new(Semaphore::new(max_workers.max(1)));
        let mut tasks = JoinSet::new();

        for (slot, event) in events.iter().cloned().enumerate() {
            let ct = ct.clone();
            let workers = workers.clone();
            let resolver = self.clone();

            tasks.spawn(async move {
                let deadline = || ResolutionResult::unresolved(event.clone(), Unresolved::DeadlineExceeded);

                let _permit = select! {
                    () = ct.cancelled() => return (slot, deadline()),
                    p = workers.acquire() => match p {
                        Ok(p) => p,
                        Err(_) => return (slot, deadline()),
                    }
                };

                let result = select! {
                    () = ct.cancelled() => {
                        warn!("Unresolved `{}`: {}", event.title, Unresolved::DeadlineExceeded);
                        deadline()
                    }
                    r = resolver.resolve(&event) => r,
                };
                (slot, result)
            });
        }

        let mut slots = vec![None; events.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((slot, result)) => slots[slot] = Some(result),
                Err(e) => error!("Resolution task failed: {e}"),
            }
            progress.inc(1);
        }

        // A slot can only be empty if its task panicked
        slots
            .into_iter()
            .zip(events)
            .map(|(result, event)| {
                result.unwrap_or_else(|| ResolutionResult::unresolved(event, Unresolved::NoCandidate))
            })
            .collect()
    }
}
