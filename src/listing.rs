use std::{collections::HashSet, time::Duration};

use anyhow::{Context, Result, anyhow};
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::{
    fetch::{Fetcher, Request},
    structs::Event,
};

/// CSS selectors locating fixtures on the listing page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListingSelectors {
    /// One fixture
    pub item: String,
    /// Competition label, matched against the search term
    pub category: String,
    pub title: String,
    /// Anchor whose `href` is the event page
    pub link: String,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            item: "li".to_string(),
            category: ".kode_ticket_text h6".to_string(),
            title: ".ticket_title h2".to_string(),
            link: ".ticket_btn a".to_string(),
        }
    }
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid selector `{css}`: {e:?}"))
}

/// Element text with every whitespace run, line breaks included, folded to one space
fn text_of(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Finds the events on a listing page whose category contains `search_term`,
/// case-insensitively. An empty term accepts every item.
///
/// Items missing a title or a link are skipped. Links are resolved against
/// `listing_url` and repeated links are kept once.
///
/// # Errors
/// Errors when one of the selectors does not parse
pub fn scan_listing(
    html: &str,
    listing_url: &Url,
    selectors: &ListingSelectors,
    search_term: &str,
) -> Result<Vec<Event>> {
    let item = parse_selector(&selectors.item)?;
    let category = parse_selector(&selectors.category)?;
    let heading = parse_selector(&selectors.title)?;
    let link = parse_selector(&selectors.link)?;

    let term = search_term.to_lowercase();
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut events = Vec::new();

    for el in document.select(&item) {
        let Some(label) = el.select(&category).next().map(text_of) else {
            continue;
        };
        if !label.to_lowercase().contains(&term) {
            continue;
        }

        let Some(title) = el.select(&heading).next().map(text_of).filter(|t| !t.is_empty()) else {
            continue;
        };
        let Some(page_url) = el
            .select(&link)
            .next()
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| listing_url.join(href.trim()).ok())
            .map(String::from)
        else {
            continue;
        };

        if seen.insert(page_url.clone()) {
            info!("Found event: {title} ({page_url})");
            events.push(Event { title, page_url });
        }
    }

    Ok(events)
}

/// # Errors
/// Errors when the listing page cannot be fetched or a selector is invalid
#[instrument(skip(fetcher, selectors))]
pub async fn fetch_listing(
    fetcher: &dyn Fetcher,
    listing_url: &Url,
    selectors: &ListingSelectors,
    search_term: &str,
    timeout: Duration,
) -> Result<Vec<Event>> {
    let res = fetcher
        .fetch(Request::get(listing_url.as_str(), timeout))
        .await
        .context("Fetching listing page")?;

    let base = Url::parse(&res.final_url).unwrap_or_else(|_| listing_url.clone());
    scan_listing(&res.body, &base, selectors, search_term)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::FakeFetcher;

    const LISTING: &str = r#"
        <ul>
          <li>
            <div class="kode_ticket_text"><h6>Serie A - 34a giornata</h6></div>
            <div class="ticket_title"><h2>  Juventus - Inter </h2></div>
            <div class="ticket_btn"><a href="/partita/juve-vs-inter.php">Guarda Gratis</a></div>
          </li>
          <li>
            <div class="kode_ticket_text"><h6>Premier League</h6></div>
            <div class="ticket_title"><h2>Arsenal - Chelsea</h2></div>
            <div class="ticket_btn"><a href="/partita/ars-vs-che.php">Guarda Gratis</a></div>
          </li>
          <li>
            <div class="kode_ticket_text"><h6>SERIE A</h6></div>
            <div class="ticket_title"><h2>Roma - Lazio</h2></div>
            <div class="ticket_btn"><a href="https://other.example/roma-vs-lazio">Guarda Gratis</a></div>
          </li>
          <li>
            <div class="kode_ticket_text"><h6>Serie A</h6></div>
            <div class="ticket_title"><h2>No link</h2></div>
          </li>
          <li><a href="/menu">Menu</a></li>
        </ul>
    "#;

    fn listing_url() -> Url {
        Url::parse("https://listing.example/streaming-gratis-calcio-1.php").unwrap()
    }

    #[test]
    fn filters_by_category_and_resolves_links() {
        let events =
            scan_listing(LISTING, &listing_url(), &ListingSelectors::default(), "Serie A").unwrap();

        assert_eq!(
            events,
            vec![
                Event {
                    title: "Juventus - Inter".to_string(),
                    page_url: "https://listing.example/partita/juve-vs-inter.php".to_string(),
                },
                Event {
                    title: "Roma - Lazio".to_string(),
                    page_url: "https://other.example/roma-vs-lazio".to_string(),
                },
            ]
        );
    }

    #[test]
    fn multi_line_title_is_folded() {
        let html = r#"<ul><li>
            <div class="kode_ticket_text"><h6>Serie
              A</h6></div>
            <div class="ticket_title"><h2>Juventus
                  -	Inter</h2></div>
            <div class="ticket_btn"><a href="/juve-vs-inter">Guarda</a></div>
        </li></ul>"#;

        let events =
            scan_listing(html, &listing_url(), &ListingSelectors::default(), "Serie A").unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Juventus - Inter");
    }

    #[test]
    fn empty_term_accepts_every_item() {
        let events = scan_listing(LISTING, &listing_url(), &ListingSelectors::default(), "").unwrap();
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn bad_selector_is_an_error() {
        let selectors = ListingSelectors {
            item: "li[".to_string(),
            ..ListingSelectors::default()
        };
        assert!(scan_listing(LISTING, &listing_url(), &selectors, "Serie A").is_err());
    }

    #[tokio::test]
    async fn unavailable_listing_is_an_error() {
        let err = fetch_listing(
            &FakeFetcher::new(),
            &listing_url(),
            &ListingSelectors::default(),
            "Serie A",
            Duration::from_secs(1),
        )
        .await;

        assert!(err.is_err());
    }

    #[tokio::test]
    async fn fetches_and_scans() {
        let fetcher = FakeFetcher::new().page(listing_url().as_str(), LISTING);
        let events = fetch_listing(
            &fetcher,
            &listing_url(),
            &ListingSelectors::default(),
            "serie a",
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        assert_eq!(events.len(), 2);
    }
}
