//! Fetching and reading third-party pages for `/api/scrape`.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::LazyLock;
use std::time::Duration;

use ai_client::truncate_to_char_boundary;
use anyhow::{Context, Result};
use async_trait::async_trait;
use browserless_client::BrowserlessClient;
use lexy_common::{ScrapeResponse, ScrapeSummary};
use regex::Regex;
use spider_transformations::transformation::content::{
    transform_content_input, ReturnFormat, TransformConfig, TransformInput,
};
use thiserror::Error;
use url::Url;

const MAX_URL_LEN: usize = 2048;
const FETCH_TIMEOUT: Duration = Duration::from_secs(20);
const MAX_HTML_BYTES: usize = 2_000_000;
const HEAD_LIMIT: usize = 100_000;
const MAX_CONTENT_BYTES: usize = 30_000;
const MAX_IMAGES: usize = 5;
const MAX_REDIRECTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlRejected {
    #[error("URL too long (max 2048 characters)")]
    TooLong,

    #[error("Invalid URL")]
    Invalid,

    #[error("URL must use http or https scheme")]
    Scheme,

    #[error("URLs pointing to private/loopback addresses are not allowed")]
    PrivateAddress,

    #[error("URLs pointing to internal hosts are not allowed")]
    InternalHost,
}

/// Parse a user-supplied URL and refuse anything that would reach into our own network.
pub fn validate_external_url(raw: &str) -> Result<Url, UrlRejected> {
    let raw = raw.trim();
    if raw.len() > MAX_URL_LEN {
        return Err(UrlRejected::TooLong);
    }
    let url = Url::parse(raw).map_err(|_| UrlRejected::Invalid)?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlRejected::Scheme);
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) if is_private_ip(IpAddr::V4(v4)) => {
            Err(UrlRejected::PrivateAddress)
        }
        Some(url::Host::Ipv6(v6)) if is_private_ip(IpAddr::V6(v6)) => {
            Err(UrlRejected::PrivateAddress)
        }
        Some(url::Host::Domain(domain)) => {
            let lower = domain.to_lowercase();
            if lower == "localhost" || lower.ends_with(".local") || lower.ends_with(".internal") {
                Err(UrlRejected::InternalHost)
            } else {
                Ok(url)
            }
        }
        Some(_) => Ok(url),
        None => Err(UrlRejected::Invalid),
    }
}

/// RFC 1918 / RFC 4193 ranges, loopback and link-local.
fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || o[0] == 10
                || (o[0] == 172 && (16..=31).contains(&o[1]))
                || (o[0] == 192 && o[1] == 168)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback() || v6.is_unspecified() || (v6.segments()[0] & 0xfe00) == 0xfc00
        }
    }
}

// ---------------------------------------------------------------------------
// Fetchers
// ---------------------------------------------------------------------------

/// Retrieves the HTML of a page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<String>;
}

/// Plain HTTP GET. No JavaScript rendering.
pub struct DirectFetcher {
    client: reqwest::Client,
}

impl DirectFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .redirect(redirect_policy())
            .user_agent("Mozilla/5.0 (compatible; LexyBot/1.0)")
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

/// Every hop gets the same checks as the URL the caller submitted.
fn redirect_policy() -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        match validate_external_url(attempt.url().as_str()) {
            Ok(_) => attempt.follow(),
            Err(rejected) => attempt.error(rejected),
        }
    })
}

#[async_trait]
impl PageFetcher for DirectFetcher {
    async fn fetch(&self, url: &Url) -> Result<String> {
        let resp = self
            .client
            .get(url.as_str())
            .send()
            .await
            .with_context(|| format!("Request to {url} failed"))?
            .error_for_status()?;
        let html = resp.text().await.context("Failed to read page body")?;
        Ok(truncate_to_char_boundary(&html, MAX_HTML_BYTES).to_string())
    }
}

/// Rendered HTML through a Browserless instance.
pub struct BrowserlessFetcher {
    client: BrowserlessClient,
}

impl BrowserlessFetcher {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self> {
        Ok(Self {
            client: BrowserlessClient::with_timeout(base_url, token, FETCH_TIMEOUT)?,
        })
    }
}

#[async_trait]
impl PageFetcher for BrowserlessFetcher {
    async fn fetch(&self, url: &Url) -> Result<String> {
        let html = self.client.content(url.as_str()).await?;
        Ok(truncate_to_char_boundary(&html, MAX_HTML_BYTES).to_string())
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

static META_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<meta\b([^>]*)>").unwrap());
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)([a-z:_-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
});
static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>([^<]+)</title>").unwrap());

/// `property`/`name`/`itemprop` → `content` for every meta tag in the head.
fn meta_tags(html: &str) -> HashMap<String, String> {
    let head = truncate_to_char_boundary(html, HEAD_LIMIT);
    let head = head.find("</head>").map(|end| &head[..end]).unwrap_or(head);

    let mut tags = HashMap::new();
    for tag in META_RE.captures_iter(head) {
        let mut key = None;
        let mut content = None;
        for attr in ATTR_RE.captures_iter(&tag[1]) {
            let value = attr
                .get(2)
                .or_else(|| attr.get(3))
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
            match attr[1].to_lowercase().as_str() {
                "property" | "name" | "itemprop" => key = Some(value.to_lowercase()),
                "content" => content = Some(value),
                _ => {}
            }
        }
        if let (Some(key), Some(content)) = (key, content) {
            if !content.is_empty() {
                // first occurrence wins
                tags.entry(key).or_insert(content);
            }
        }
    }
    tags
}

fn first_of(tags: &HashMap<String, String>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| tags.get(*k).cloned())
}

fn decode_basic_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}

/// HTML → markdown of the main article body.
fn readable_content(html: &str, url: &Url) -> String {
    let config = TransformConfig {
        readability: true,
        main_content: true,
        return_format: ReturnFormat::Markdown,
        filter_images: true,
        filter_svg: true,
        clean_html: true,
    };
    let input = TransformInput {
        url: Some(url),
        content: html.as_bytes(),
        screenshot_bytes: None,
        encoding: None,
        selector_config: None,
        ignore_tags: None,
    };
    transform_content_input(input, &config)
}

/// Build the `/api/scrape` response body from a fetched page.
pub fn extract_page(html: &str, url: &Url) -> ScrapeResponse {
    let tags = meta_tags(html);

    let title = first_of(&tags, &["og:title", "twitter:title"]).or_else(|| {
        TITLE_RE
            .captures(html)
            .map(|cap| cap[1].trim().to_string())
            .filter(|t| !t.is_empty())
    });
    let author = first_of(&tags, &["author", "article:author", "twitter:creator"]);
    let published_date = first_of(
        &tags,
        &["article:published_time", "datepublished", "pubdate", "date"],
    );
    let description = first_of(&tags, &["og:description", "description", "twitter:description"]);

    let mut images: Vec<String> = Vec::new();
    for key in ["og:image", "og:image:url", "twitter:image", "image"] {
        if let Some(src) = tags.get(key) {
            let resolved = url.join(src).map(|u| u.to_string()).unwrap_or_else(|_| src.clone());
            if !images.contains(&resolved) {
                images.push(resolved);
            }
        }
    }
    images.truncate(MAX_IMAGES);

    let markdown = readable_content(html, url);
    let main_content = match markdown.trim() {
        "" => description.clone().unwrap_or_default(),
        body => truncate_to_char_boundary(body, MAX_CONTENT_BYTES).to_string(),
    };

    ScrapeResponse {
        summary: ScrapeSummary {
            main_content,
            title: title.map(|t| decode_basic_entities(&t)),
            author: author.map(|a| decode_basic_entities(&a)),
            published_date,
            images,
        },
        semantic_content: description.map(|d| decode_basic_entities(&d)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head>
        <title>Fallback title</title>
        <meta property="og:title" content="Best habit apps &amp; trackers">
        <meta content="Jane Doe" name="author">
        <meta property="article:published_time" content="2024-03-01T10:00:00Z">
        <meta property="og:image" content="/img/cover.png">
        <meta name="description" content="A round-up of what people recommend.">
        </head><body><article><p>Body</p></article></body></html>"#;

    #[test]
    fn rejects_non_http_schemes() {
        assert_eq!(validate_external_url("ftp://example.com"), Err(UrlRejected::Scheme));
        assert_eq!(validate_external_url("not a url"), Err(UrlRejected::Invalid));
    }

    #[test]
    fn rejects_private_and_internal_hosts() {
        for url in [
            "http://127.0.0.1/admin",
            "http://10.1.2.3",
            "http://192.168.0.10:8080",
            "http://172.20.0.1",
            "http://169.254.169.254/latest/meta-data",
            "http://[::1]/",
        ] {
            assert_eq!(validate_external_url(url), Err(UrlRejected::PrivateAddress), "{url}");
        }
        assert_eq!(validate_external_url("http://localhost:3000"), Err(UrlRejected::InternalHost));
        assert_eq!(validate_external_url("http://db.internal"), Err(UrlRejected::InternalHost));
    }

    #[test]
    fn accepts_public_urls() {
        let url = validate_external_url("  https://www.reddit.com/r/fitness/  ").unwrap();
        assert_eq!(url.host_str(), Some("www.reddit.com"));
        assert!(validate_external_url("http://172.32.0.1").is_ok());
    }

    #[test]
    fn too_long_url_is_rejected() {
        let long = format!("https://example.com/{}", "a".repeat(MAX_URL_LEN));
        assert_eq!(validate_external_url(&long), Err(UrlRejected::TooLong));
    }

    #[tokio::test]
    async fn redirect_into_private_network_is_not_followed() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/start"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("{}/secret", server.uri()).as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string("metadata"))
            .expect(0)
            .mount(&server)
            .await;

        let fetcher = DirectFetcher::new().unwrap();
        let start = Url::parse(&format!("{}/start", server.uri())).unwrap();
        assert!(fetcher.fetch(&start).await.is_err());
    }

    #[test]
    fn meta_tags_in_either_attribute_order() {
        let tags = meta_tags(PAGE);
        assert_eq!(tags["og:title"], "Best habit apps &amp; trackers");
        assert_eq!(tags["author"], "Jane Doe");
    }

    #[test]
    fn extracts_summary_fields() {
        let url = Url::parse("https://blog.example.com/posts/habits").unwrap();
        let page = extract_page(PAGE, &url);
        assert_eq!(page.summary.title.as_deref(), Some("Best habit apps & trackers"));
        assert_eq!(page.summary.author.as_deref(), Some("Jane Doe"));
        assert_eq!(page.summary.published_date.as_deref(), Some("2024-03-01T10:00:00Z"));
        assert_eq!(page.summary.images, vec!["https://blog.example.com/img/cover.png"]);
        assert_eq!(
            page.semantic_content.as_deref(),
            Some("A round-up of what people recommend.")
        );
    }

    #[test]
    fn title_falls_back_to_title_tag() {
        let url = Url::parse("https://example.com").unwrap();
        let page = extract_page("<html><head><title> Plain </title></head></html>", &url);
        assert_eq!(page.summary.title.as_deref(), Some("Plain"));
        assert!(page.summary.images.is_empty());
    }
}
