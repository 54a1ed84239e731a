use bytes::Bytes;
use std::time::Duration;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED, USER_AGENT};
use reqwest::{Client, Proxy, StatusCode};
use url::Url;

use super::discovery::find_feed_link;
use crate::config::AppConfig;
use crate::{Error, Result};

const MAX_FEED_BYTES: usize = 5 * 1024 * 1024;
const VALID_SCHEMES: &[&str] = &["http", "https"];
const FEEDSYNC_USER_AGENT: &str = concat!("feedsync/", env!("CARGO_PKG_VERSION"));

/// A fetched and successfully parsed feed document, before normalization
#[derive(Debug)]
pub struct RawFeed {
    /// Final URL of the feed resource
    pub url: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub document: feed_rs::model::Feed,
}

/// Outcome of a conditional fetch
#[derive(Debug)]
pub enum FetchResult {
    Fetched(RawFeed),
    NotModified,
}

/// A successful GET response body with its cache headers
struct Page {
    url: String,
    etag: Option<String>,
    last_modified: Option<String>,
    body: Bytes,
}

enum Response {
    Page(Page),
    NotModified,
}

/// Feed fetcher with conditional GET and single-hop autodiscovery
#[derive(Clone)]
pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    /// Create a new feed fetcher with configuration
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Self::build_client(config.sync.request_timeout_secs, &config.sync.proxy_url)?;
        Ok(Self { client })
    }

    /// Create a fetcher around an existing HTTP client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Build HTTP client with optional proxy
    fn build_client(timeout_secs: u64, proxy_url: &Option<String>) -> Result<Client> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(10));

        if let Some(ref proxy) = proxy_url {
            let proxy = Proxy::all(proxy)
                .map_err(|e| Error::Config(format!("Invalid proxy URL: {}", e)))?;
            builder = builder.proxy(proxy);
            tracing::info!("Using HTTP proxy for feed fetching");
        }

        builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))
    }

    /// Build request headers, including cache validators when known
    fn build_headers(etag: Option<&str>, last_modified: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "application/rss+xml,application/atom+xml,application/feed+json,application/xml;q=0.9,text/html;q=0.8,*/*;q=0.5"
            )
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(FEEDSYNC_USER_AGENT));

        if let Some(value) = etag.and_then(|v| HeaderValue::from_str(v).ok()) {
            headers.insert(IF_NONE_MATCH, value);
        }
        if let Some(value) = last_modified.and_then(|v| HeaderValue::from_str(v).ok()) {
            headers.insert(IF_MODIFIED_SINCE, value);
        }
        headers
    }

    /// Fetch a feed, optionally discovering it from an HTML page.
    ///
    /// Discovery follows at most one `<link rel="alternate">` hop, and the
    /// hop is fetched unconditionally: the supplied cache tokens describe
    /// `url`, not the resource it points to.
    pub async fn fetch(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
        allow_discovery: bool,
    ) -> Result<FetchResult> {
        let url = validate_url(url)?;

        let page = match self.get(&url, etag, last_modified).await? {
            Response::NotModified => {
                tracing::debug!(url = %url, "Feed not modified");
                return Ok(FetchResult::NotModified);
            }
            Response::Page(page) => page,
        };

        let parse_error = match parse_document(&page.body) {
            Ok(document) => return Ok(FetchResult::Fetched(page.into_raw(document))),
            Err(e) => e,
        };

        if !allow_discovery {
            tracing::debug!(url = %page.url, error = %parse_error, "Response is not a feed");
            return Err(Error::Unparsable(format!("{} is not a feed", page.url)));
        }

        let html = String::from_utf8_lossy(&page.body);
        let discovered = find_feed_link(&html, &page.url).ok_or_else(|| {
            tracing::info!(url = %page.url, "Feed discovery found no feed link");
            Error::Unparsable(format!("no feed found at {}", page.url))
        })?;

        tracing::info!(url = %page.url, discovered = %discovered, "Discovered feed link");

        let discovered = validate_url(&discovered)?;
        match self.get(&discovered, None, None).await? {
            Response::NotModified => Ok(FetchResult::NotModified),
            Response::Page(page) => {
                let document = parse_document(&page.body).map_err(|e| {
                    tracing::debug!(url = %page.url, error = %e, "Discovered link is not a feed");
                    Error::Unparsable(format!("discovered link {} is not a feed", page.url))
                })?;
                Ok(FetchResult::Fetched(page.into_raw(document)))
            }
        }
    }

    async fn get(&self, url: &Url, etag: Option<&str>, last_modified: Option<&str>) -> Result<Response> {
        tracing::info!("Fetching feed from: {}", url);

        let response = self.client
            .get(url.as_str())
            .headers(Self::build_headers(etag, last_modified))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok(Response::NotModified);
        }
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let final_url = response.url().to_string();
        let etag = header_string(response.headers(), ETAG);
        let last_modified = header_string(response.headers(), LAST_MODIFIED);

        if let Some(len) = response.content_length() {
            ensure_content_size(len as usize, &final_url)?;
        }
        let body = response.bytes().await?;
        ensure_content_size(body.len(), &final_url)?;

        Ok(Response::Page(Page {
            url: final_url,
            etag,
            last_modified,
            body,
        }))
    }

    /// Look for a favicon at the root of the site behind `site_url`.
    ///
    /// Returns the favicon URL only when a HEAD request answers 200 with an
    /// `image/*` content type and a non-zero length. Any failure means no image.
    pub async fn discover_image(&self, site_url: &str) -> Option<String> {
        tracing::info!("Attempting to discover image for '{}'", site_url);

        let favicon = favicon_url(site_url)?;
        let response = match self.client.head(favicon.as_str()).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(url = %favicon, error = %e, "Favicon request failed");
                return None;
            }
        };

        let good_status = response.status() == StatusCode::OK;
        let good_content_type = header_string(response.headers(), CONTENT_TYPE)
            .map(|ct| ct.starts_with("image/"))
            .unwrap_or(false);
        let good_content_size = header_string(response.headers(), CONTENT_LENGTH)
            .and_then(|len| len.trim().parse::<u64>().ok())
            .map(|len| len > 0)
            .unwrap_or(false);

        if good_status && good_content_type && good_content_size {
            tracing::info!("Image found at '{}'", favicon);
            Some(favicon.to_string())
        } else {
            tracing::info!("No image found for '{}'", site_url);
            None
        }
    }
}

impl Page {
    fn into_raw(self, document: feed_rs::model::Feed) -> RawFeed {
        RawFeed {
            url: self.url,
            etag: self.etag,
            last_modified: self.last_modified,
            document,
        }
    }
}

/// Parse a feed URL, accepting only http and https
pub fn validate_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url.trim())?;
    if !VALID_SCHEMES.contains(&parsed.scheme()) {
        return Err(Error::InvalidUrl(format!("unsupported scheme '{}' in {}", parsed.scheme(), url)));
    }
    Ok(parsed)
}

/// `scheme://host[:port]/favicon.ico` for the given site
fn favicon_url(site_url: &str) -> Option<Url> {
    let site = validate_url(site_url).ok()?;
    site.join("/favicon.ico").ok()
}

/// Parse RSS, Atom or JSON Feed bytes.
///
/// Entries without a source id get an empty id so that the parser can tell
/// them apart and apply its own fallback.
pub(crate) fn parse_document(body: &[u8]) -> std::result::Result<feed_rs::model::Feed, feed_rs::parser::ParseFeedError> {
    feed_rs::parser::Builder::new()
        .id_generator(|_links, _title, _uri| String::new())
        .build()
        .parse(body)
}

fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

fn ensure_content_size(size: usize, url: &str) -> Result<()> {
    if size > MAX_FEED_BYTES {
        return Err(Error::Unparsable(format!(
            "feed too large ({} bytes) for URL: {}",
            size,
            url
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Feed</title>
  <link href="http://example.org/"/>
  <updated>2003-12-13T18:30:02Z</updated>
  <entry>
    <title>Atom-Powered Robots Run Amok</title>
    <link href="http://example.org/2003/12/13/atom03"/>
    <id>urn:uuid:1225c695-cfb8-4ebb-aaaa-80da344efa6a</id>
    <updated>2003-12-13T18:30:02Z</updated>
    <summary>Some text.</summary>
  </entry>
</feed>"#;

    fn fetcher() -> FeedFetcher {
        FeedFetcher::new(&AppConfig::default()).unwrap()
    }

    fn expect_fetched(result: FetchResult) -> RawFeed {
        match result {
            FetchResult::Fetched(raw) => raw,
            FetchResult::NotModified => panic!("expected a fetched feed"),
        }
    }

    #[test]
    fn test_validate_url_schemes() {
        assert!(validate_url("http://example.com/feed").is_ok());
        assert!(validate_url("https://example.com/feed").is_ok());
        assert!(matches!(validate_url("ftp://example.com/feed"), Err(Error::InvalidUrl(_))));
        assert!(matches!(validate_url("file:///etc/passwd"), Err(Error::InvalidUrl(_))));
        assert!(matches!(validate_url("not a url"), Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_favicon_url() {
        assert_eq!(
            favicon_url("https://example.com/blog/index.html?x=1").unwrap().as_str(),
            "https://example.com/favicon.ico"
        );
        assert_eq!(
            favicon_url("http://example.com:8080/a/").unwrap().as_str(),
            "http://example.com:8080/favicon.ico"
        );
        assert!(favicon_url("mailto:someone@example.com").is_none());
    }

    #[tokio::test]
    async fn test_rejects_invalid_scheme_without_network() {
        let result = fetcher().fetch("gopher://example.com/feed", None, None, true).await;
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_fetch_direct_feed_captures_cache_tokens() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(ATOM)
                    .insert_header("Content-Type", "application/atom+xml")
                    .insert_header("ETag", "\"abc123\"")
                    .insert_header("Last-Modified", "Sat, 13 Dec 2003 18:30:02 GMT"),
            )
            .mount(&mock_server)
            .await;

        let url = format!("{}/feed.xml", mock_server.uri());
        let raw = expect_fetched(fetcher().fetch(&url, None, None, true).await.unwrap());

        assert_eq!(raw.url, url);
        assert_eq!(raw.etag.as_deref(), Some("\"abc123\""));
        assert_eq!(raw.last_modified.as_deref(), Some("Sat, 13 Dec 2003 18:30:02 GMT"));
        assert_eq!(raw.document.entries.len(), 1);
    }

    #[tokio::test]
    async fn test_conditional_fetch_not_modified() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("If-None-Match", "\"abc123\""))
            .respond_with(ResponseTemplate::new(304))
            .mount(&mock_server)
            .await;

        let url = format!("{}/feed.xml", mock_server.uri());
        let result = fetcher().fetch(&url, Some("\"abc123\""), None, false).await.unwrap();
        assert!(matches!(result, FetchResult::NotModified));
    }

    #[tokio::test]
    async fn test_if_modified_since_is_sent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("If-Modified-Since", "Sat, 13 Dec 2003 18:30:02 GMT"))
            .respond_with(ResponseTemplate::new(304))
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = format!("{}/feed.xml", mock_server.uri());
        let result = fetcher()
            .fetch(&url, None, Some("Sat, 13 Dec 2003 18:30:02 GMT"), false)
            .await
            .unwrap();
        assert!(matches!(result, FetchResult::NotModified));
    }

    #[tokio::test]
    async fn test_discovery_follows_first_feed_link() {
        let mock_server = MockServer::start().await;
        let html = format!(
            r#"<html><head><link rel="alternate" type="application/rss+xml" href="{}/real-feed.xml"></head></html>"#,
            mock_server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(html)
                    .insert_header("Content-Type", "text/html"),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/real-feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ATOM))
            .expect(1)
            .mount(&mock_server)
            .await;

        let page_url = format!("{}/", mock_server.uri());
        let raw = expect_fetched(fetcher().fetch(&page_url, None, None, true).await.unwrap());
        assert_eq!(raw.url, format!("{}/real-feed.xml", mock_server.uri()));
    }

    #[tokio::test]
    async fn test_discovery_disabled_fails_on_html() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><head><link rel="alternate" type="application/rss+xml" href="/feed.xml"></head></html>"#,
            ))
            .mount(&mock_server)
            .await;

        let result = fetcher().fetch(&mock_server.uri(), None, None, false).await;
        assert!(matches!(result, Err(Error::Unparsable(_))));
    }

    #[tokio::test]
    async fn test_discovery_without_link_fails() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>Just a page</body></html>"))
            .mount(&mock_server)
            .await;

        let result = fetcher().fetch(&mock_server.uri(), None, None, true).await;
        assert!(matches!(result, Err(Error::Unparsable(_))));
    }

    #[tokio::test]
    async fn test_discovery_is_a_single_hop() {
        let mock_server = MockServer::start().await;
        // Both pages point onward; the second must not be followed.
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<link rel="alternate" type="application/rss+xml" href="/page2">"#,
            ))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<link rel="alternate" type="application/rss+xml" href="/page3">"#,
            ))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page3"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ATOM))
            .expect(0)
            .mount(&mock_server)
            .await;

        let result = fetcher()
            .fetch(&format!("{}/page", mock_server.uri()), None, None, true)
            .await;
        assert!(matches!(result, Err(Error::Unparsable(_))));
    }

    #[tokio::test]
    async fn test_discovery_hop_drops_cache_tokens() {
        let mock_server = MockServer::start().await;
        let html = format!(
            r#"<link rel="alternate" type="application/atom+xml" href="{}/real-feed.xml">"#,
            mock_server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(html))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/real-feed.xml"))
            .and(header_exists("If-None-Match"))
            .respond_with(ResponseTemplate::new(304))
            .expect(0)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/real-feed.xml"))
            .and(header_exists("If-Modified-Since"))
            .respond_with(ResponseTemplate::new(304))
            .expect(0)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/real-feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ATOM))
            .expect(1)
            .mount(&mock_server)
            .await;

        let page_url = format!("{}/", mock_server.uri());
        let result = fetcher()
            .fetch(&page_url, Some("\"e\""), Some("Sat, 13 Dec 2003 18:30:02 GMT"), true)
            .await
            .unwrap();
        let raw = expect_fetched(result);
        assert_eq!(raw.url, format!("{}/real-feed.xml", mock_server.uri()));
        mock_server.verify().await;
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(vec![b' '; MAX_FEED_BYTES + 1], "application/xml"))
            .mount(&mock_server)
            .await;

        let result = fetcher().fetch(&mock_server.uri(), None, None, false).await;
        assert!(matches!(result, Err(Error::Unparsable(_))));
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let result = fetcher().fetch(&mock_server.uri(), None, None, true).await;
        assert!(matches!(result, Err(Error::HttpStatus { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_discover_image_accepts_icon() {
        let mock_server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/favicon.ico"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8; 64], "image/x-icon"))
            .mount(&mock_server)
            .await;

        let site = format!("{}/blog/", mock_server.uri());
        let image = fetcher().discover_image(&site).await;
        assert_eq!(image, Some(format!("{}/favicon.ico", mock_server.uri())));
    }

    #[tokio::test]
    async fn test_discover_image_rejects_non_image() {
        let mock_server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/favicon.ico"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"<html></html>".to_vec(), "text/html"))
            .mount(&mock_server)
            .await;

        assert_eq!(fetcher().discover_image(&mock_server.uri()).await, None);
    }

    #[tokio::test]
    async fn test_discover_image_rejects_empty_icon() {
        let mock_server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/favicon.ico"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Type", "image/x-icon"))
            .mount(&mock_server)
            .await;

        assert_eq!(fetcher().discover_image(&mock_server.uri()).await, None);
    }

    #[tokio::test]
    async fn test_discover_image_missing() {
        let mock_server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        assert_eq!(fetcher().discover_image(&mock_server.uri()).await, None);
    }
}
