//! Pulls manifest-looking URLs out of raw page text.
//!
//! Every pattern family runs on the whole page and the results are unioned.
//! None of them short-circuits another: pages routinely carry a decoy in one
//! place and the real stream in another.

use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;
use reqwest::Url;

/// Absolute URL containing `.m3u8`, cut at quotes, whitespace, brackets and commas.
/// `\/` escapes are allowed so JSON-encoded sources match too.
static DIRECT_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?:(?:\\?/){2}[^"'\s<>()\[\]{},]+?\.m3u8[^"'\s<>()\[\]{},]*"#).unwrap()
});

/// `player = "..."`, `var src = '...'`
static ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[A-Za-z_$][\w$]*\s*=\s*["']([^"'\s]+)["']"#).unwrap()
});

/// `{ file: "..." }`, `"source": "..."`
static OBJECT_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)["']?\b(?:source|file|src|url)["']?\s*:\s*["']([^"'\s]+)["']"#).unwrap()
});

/// `data-stream="..."` and friends
static DATA_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bdata-[\w-]+\s*=\s*["']([^"'\s]+)["']"#).unwrap()
});

static FRAME_SRC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<(?:iframe|frame|embed)\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).unwrap()
});

/// `location.href = "..."`, `location.replace("...")`, `location.assign("...")`
static REDIRECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\blocation(?:\s*=\s*|\.href\s*=\s*|\.(?:replace|assign)\(\s*)["']((?:https?:)?(?:\\?/){2}[^"'\s]+)["']"#,
    )
    .unwrap()
});

/// Returns every manifest URL found in `page_text`, made absolute against
/// `page_url`, deduplicated in discovery order.
#[must_use]
pub fn extract(page_text: &str, page_url: &Url) -> Vec<String> {
    let mut found = Vec::new();
    let mut seen = HashSet::new();

    let mut admit = |raw: &str| {
        if let Some(url) = absolutize(raw, page_url) {
            if is_manifest_like(&url) && seen.insert(url.clone()) {
                found.push(url);
            }
        }
    };

    for m in DIRECT_URL.find_iter(page_text) {
        admit(m.as_str());
    }

    for pattern in [
        &*ASSIGNMENT,
        &*OBJECT_KEY,
        &*DATA_ATTRIBUTE,
        &*FRAME_SRC,
        &*REDIRECT,
    ] {
        for caps in pattern.captures_iter(page_text) {
            if let Some(m) = caps.get(1) {
                admit(m.as_str());
            }
        }
    }

    found
}

/// Client-side redirect targets that are pages rather than manifests
#[must_use]
pub fn redirect_targets(page_text: &str, page_url: &Url) -> Vec<String> {
    REDIRECT
        .captures_iter(page_text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| absolutize(m.as_str(), page_url))
        .filter(|url| !is_manifest_like(url))
        .collect()
}

#[must_use]
pub fn is_manifest_like(url: &str) -> bool {
    url.to_ascii_lowercase().contains(".m3u8")
}

/// Unescapes and resolves a raw match into an absolute http(s) URL.
///
/// `//host/...` is promoted to `https:`; anything else relative is joined onto
/// `base`, which is the page the match came from.
#[must_use]
pub fn absolutize(raw: &str, base: &Url) -> Option<String> {
    let unescaped = raw
        .trim()
        .replace("\\/", "/")
        .replace("\\&", "&")
        .replace("\\=", "=")
        .replace("\\u0026", "&")
        .replace("&amp;", "&");
    let cleaned = unescaped.trim_end_matches([')', ']', '}', '\\']);

    if cleaned.is_empty() {
        return None;
    }

    let lower = cleaned.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        // Keep the page's spelling; identity is the exact string
        let url = Url::parse(cleaned).ok()?;
        return url.host_str().map(|_| cleaned.to_string());
    }

    let url = match cleaned.strip_prefix("//") {
        Some(rest) => Url::parse(&format!("https://{rest}")),
        None => base.join(cleaned),
    }
    .ok()?;

    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Some(url.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_url() -> Url {
        Url::parse("https://site.example/partita/juve-vs-inter.php").unwrap()
    }

    #[test]
    fn finds_direct_url_with_tokens() {
        let url = "https://cdn.example/hls/x/index.m3u8?md5=0123456789abcdef0123456789abcdef&expiretime=1700000000";
        let body = format!(
            r##"<script>var player = new Clappr.Player({{ parent: "#p" }}); play("{url}");</script>"##
        );

        assert_eq!(extract(&body, &page_url()), vec![url.to_string()]);
    }

    #[test]
    fn unescapes_json_style_urls() {
        let body = r#"{"hls":"https:\/\/cdn.example\/live\/a.m3u8?token=x&expires=1"}"#;

        assert_eq!(
            extract(body, &page_url()),
            vec!["https://cdn.example/live/a.m3u8?token=x&expires=1".to_string()]
        );
    }

    #[test]
    fn resolves_relative_sources_against_the_page() {
        let body = r#"
            <div data-stream="//edge.example/live/b.m3u8"></div>
            <script>jwplayer("p").setup({ file: "/hls/c.m3u8" });</script>
        "#;
        let other_site = Url::parse("https://mirror.example/watch/1").unwrap();

        let found = extract(body, &other_site);
        assert_eq!(
            found,
            vec![
                "https://edge.example/live/b.m3u8".to_string(),
                "https://mirror.example/hls/c.m3u8".to_string(),
            ]
        );
    }

    #[test]
    fn runs_every_family() {
        let body = r#"
            <iframe src="https://embed.example/live/d.m3u8"></iframe>
            <script>
                var stream = "https://a.example/one.m3u8";
                window.location.href = 'https://b.example/two.m3u8';
                location.replace("https://c.example/page.html");
            </script>
        "#;

        let found = extract(body, &page_url());
        assert_eq!(found.len(), 3);
        assert!(found.contains(&"https://embed.example/live/d.m3u8".to_string()));
        assert!(found.contains(&"https://a.example/one.m3u8".to_string()));
        assert!(found.contains(&"https://b.example/two.m3u8".to_string()));
    }

    #[test]
    fn extraction_is_idempotent() {
        let body = r#"
            source: "https://a.example/x.m3u8?md5=1", "https://a.example/x.m3u8?md5=1"
            <source src="https://b.example/y.m3u8">
        "#;
        let first = extract(body, &page_url());
        let synthetic = first
            .iter()
            .map(|u| format!("<a href=\"{u}\">{u}</a>"))
            .collect::<String>();

        let once = extract(&synthetic, &page_url());
        let twice = extract(&synthetic, &page_url());
        assert_eq!(once, twice);

        let as_set = |v: &[String]| v.iter().cloned().collect::<HashSet<_>>();
        assert_eq!(as_set(&once), as_set(&first));
    }

    #[test]
    fn strips_trailing_brackets_and_promotes_scheme_relative() {
        let base = page_url();

        assert_eq!(
            absolutize(r"https://a.example/x.m3u8)}", &base).as_deref(),
            Some("https://a.example/x.m3u8")
        );
        assert_eq!(
            absolutize("//a.example/x.m3u8", &base).as_deref(),
            Some("https://a.example/x.m3u8")
        );
        assert_eq!(
            absolutize("player.html", &base).as_deref(),
            Some("https://site.example/partita/player.html")
        );
        assert_eq!(absolutize("javascript:void(0)", &base), None);
    }

    #[test]
    fn redirect_targets_skip_manifests() {
        let body = r#"
            location.assign("https://b.example/two.m3u8");
            window.location = "//c.example/next";
        "#;

        assert_eq!(
            redirect_targets(body, &page_url()),
            vec!["https://c.example/next".to_string()]
        );
    }
}
