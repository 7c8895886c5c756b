use thiserror::Error;

/// Failure of a single network fetch.
///
/// Never fatal inside the resolver: a branch that hits one simply yields no content.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL `{0}`")]
    InvalidUrl(String),

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },
}

impl FetchError {
    pub(crate) fn from_reqwest(url: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Network {
                url: url.to_string(),
                source: e,
            }
        }
    }

    /// HTTP status carried by the error, if the server answered at all
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Body fetched during validation could not be read as a playlist
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("body is not an M3U playlist")]
    NotAPlaylist,

    #[error("malformed playlist: {0}")]
    Malformed(String),
}

/// Why an event ended up without a stream URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Unresolved {
    /// The event page itself could not be fetched
    #[error("event page unavailable")]
    PageUnavailable,
    /// Every strategy ran and produced nothing
    #[error("no stream candidate found")]
    NoCandidate,
    /// The run deadline (or Ctrl+C) hit before the event finished
    #[error("run deadline exceeded")]
    DeadlineExceeded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_reasons_read_as_sentences() {
        assert_eq!(Unresolved::PageUnavailable.to_string(), "event page unavailable");
        assert_eq!(Unresolved::NoCandidate.to_string(), "no stream candidate found");
        assert_eq!(Unresolved::DeadlineExceeded.to_string(), "run deadline exceeded");
    }

    #[test]
    fn only_http_errors_carry_a_status() {
        let status = FetchError::Status {
            url: "https://a.example/".to_string(),
            status: 405,
        };
        assert_eq!(status.status(), Some(405));
        assert_eq!(FetchError::InvalidUrl("x".to_string()).status(), None);
    }
}
