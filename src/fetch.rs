use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultKeyedRateLimiter, Quota};
use reqwest::{Url, header::REFERER};
use tracing::{debug, instrument};

use crate::{error::FetchError, structs::PageContent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    /// GET that only reads the first chunk of the body
    Peek,
}

#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub url: &'a str,
    pub referer: Option<&'a str>,
    pub method: Method,
    pub timeout: Duration,
}

impl<'a> Request<'a> {
    #[must_use]
    pub const fn get(url: &'a str, timeout: Duration) -> Self {
        Self {
            url,
            referer: None,
            method: Method::Get,
            timeout,
        }
    }

    #[must_use]
    pub fn referer(mut self, referer: &'a str) -> Self {
        self.referer = Some(referer);
        self
    }

    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub body: String,
    pub final_url: String,
}

impl From<Response> for PageContent {
    fn from(res: Response) -> Self {
        Self {
            url: res.final_url,
            body: res.body,
        }
    }
}

/// Anything that can turn a URL into a body.
///
/// A headless browser returning the rendered DOM is just another implementation.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// # Errors
    /// Errors on network failure, timeout or an HTTP status >= 400
    async fn fetch(&self, request: Request<'_>) -> Result<Response, FetchError>;
}

/// Plain HTTP fetcher with a minimum spacing between requests to the same host
pub struct HttpFetcher {
    client: reqwest::Client,
    politeness: Option<DefaultKeyedRateLimiter<String>>,
}

impl HttpFetcher {
    /// A zero `politeness_delay` disables spacing entirely
    #[must_use]
    pub fn new(client: reqwest::Client, politeness_delay: Duration) -> Self {
        Self {
            client,
            politeness: Quota::with_period(politeness_delay).map(DefaultKeyedRateLimiter::keyed),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(skip(self, request), fields(url = request.url, method = ?request.method))]
    async fn fetch(&self, request: Request<'_>) -> Result<Response, FetchError> {
        let url =
            Url::parse(request.url).map_err(|_| FetchError::InvalidUrl(request.url.to_string()))?;

        // Keyed per host so a slow host never delays the others
        if let (Some(limiter), Some(host)) = (&self.politeness, url.host_str()) {
            limiter.until_key_ready(&host.to_string()).await;
        }

        let mut req = match request.method {
            Method::Head => self.client.head(url),
            Method::Get | Method::Peek => self.client.get(url),
        }
        .timeout(request.timeout);

        if let Some(referer) = request.referer {
            req = req.header(REFERER, referer);
        }

        let mut res = req
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(request.url, e))?;

        let status = res.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(FetchError::Status {
                url: request.url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = res.url().to_string();
        let body = match request.method {
            Method::Head => String::new(),
            Method::Peek => res
                .chunk()
                .await
                .map_err(|e| FetchError::from_reqwest(request.url, e))?
                .map(|chunk| String::from_utf8_lossy(&chunk).into_owned())
                .unwrap_or_default(),
            Method::Get => res
                .text()
                .await
                .map_err(|e| FetchError::from_reqwest(request.url, e))?,
        };

        debug!("Fetched {} bytes (HTTP {status})", body.len());

        Ok(Response {
            status: status.as_u16(),
            body,
            final_url,
        })
    }
}
