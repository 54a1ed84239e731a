use chrono::Utc;
use feed_rs::model;
use sha1::{Digest, Sha1};

use super::fetcher::RawFeed;
use super::models::{ParsedEntry, ParsedFeed};

/// Content types whose bodies are already HTML
const HTML_MIME_TYPES: &[&str] = &["text/html", "application/xhtml+xml"];

/// Identity string hashed when an entry has neither an id nor a title
const MISSING_GUID_SOURCE: &str = "None";

/// Normalize a fetched document into a [`ParsedFeed`].
///
/// `image_url` is left empty; favicon lookup needs the network and is done
/// by the caller when wanted.
pub fn parse_feed(raw: RawFeed) -> ParsedFeed {
    let RawFeed { url, etag, last_modified, document } = raw;

    let feed_author = document.authors.first().map(|a| a.name.clone());
    let link = site_link(&document.links);
    let title = document.title.map(|t| t.content);

    let entries = document
        .entries
        .into_iter()
        .map(|entry| parse_entry(entry, feed_author.as_deref()))
        .collect();

    ParsedFeed {
        title,
        url,
        link,
        etag,
        last_modified,
        last_refresh_date: Utc::now().timestamp(),
        image_url: None,
        entries,
    }
}

fn parse_entry(entry: model::Entry, feed_author: Option<&str>) -> ParsedEntry {
    let title = entry.title.map(|t| t.content);
    let link = entry.links.first().map(|l| l.href.clone());

    let author = entry
        .authors
        .first()
        .map(|a| a.name.clone())
        .filter(|name| !name.trim().is_empty())
        .or_else(|| feed_author.map(str::to_string));

    let content = entry
        .content
        .and_then(|c| {
            let is_html = is_html_type(&c.content_type.essence().to_string());
            c.body.map(|body| escape_unless_html(body, is_html))
        })
        .or_else(|| {
            entry.summary.map(|s| {
                let is_html = is_html_type(&s.content_type.essence().to_string());
                escape_unless_html(s.content, is_html)
            })
        })
        .unwrap_or_default();

    let date = entry
        .updated
        .or(entry.published)
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|| Utc::now().timestamp());

    let id = Some(entry.id).filter(|id| !id.is_empty());
    let guid = compute_guid(id.as_deref(), title.as_deref());

    ParsedEntry {
        author,
        content,
        date,
        title,
        link,
        guid,
    }
}

/// SHA-1 of the source id, falling back to the title and then to a fixed
/// string. Entries lacking both collide on purpose: the fallback must be
/// stable across fetches.
pub fn compute_guid(id: Option<&str>, title: Option<&str>) -> String {
    let source = id.or(title).unwrap_or(MISSING_GUID_SOURCE);
    format!("{:x}", Sha1::digest(source.as_bytes()))
}

/// The feed's site link: first link without a rel or with rel="alternate"
fn site_link(links: &[model::Link]) -> Option<String> {
    links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.first())
        .map(|l| l.href.clone())
}

fn is_html_type(essence: &str) -> bool {
    HTML_MIME_TYPES.contains(&essence)
}

fn escape_unless_html(text: String, is_html: bool) -> String {
    if is_html {
        text
    } else {
        htmlescape::encode_minimal(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::fetcher::parse_document;

    const FIXTURE: &[u8] = include_bytes!("../../tests/data/awesome-blog.xml");

    fn raw(xml: &str) -> RawFeed {
        raw_bytes(xml.as_bytes())
    }

    fn raw_bytes(bytes: &[u8]) -> RawFeed {
        let document = parse_document(bytes).unwrap();
        RawFeed {
            url: "http://example.com/feed.xml".to_string(),
            etag: Some("\"v1\"".to_string()),
            last_modified: None,
            document,
        }
    }

    fn rss(items: &str) -> String {
        format!(
            r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <title>Example</title>
  <link>http://example.com/</link>
  <description>Example feed</description>
  {}
</channel></rss>"#,
            items
        )
    }

    #[test]
    fn test_compute_guid_known_values() {
        assert_eq!(
            compute_guid(None, None),
            "6eef6648406c333a4035cd5e60d0bf2ecf2606d7"
        );
        assert_eq!(
            compute_guid(None, Some("Return of the OPPO Find 5")),
            "9c77bb19a6995114f579f68430686e8d4f6a5f90"
        );
        assert_eq!(
            compute_guid(Some("None"), Some("ignored")),
            compute_guid(None, None)
        );
    }

    #[test]
    fn test_distinct_ids_give_distinct_guids() {
        let items: String = (0..5)
            .map(|i| format!("<item><guid>item-{i}</guid><title>Same title</title></item>"))
            .collect();
        let parsed = parse_feed(raw(&rss(&items)));

        assert_eq!(parsed.entries.len(), 5);
        let mut guids: Vec<_> = parsed.entries.iter().map(|e| e.guid.clone()).collect();
        guids.sort();
        guids.dedup();
        assert_eq!(guids.len(), 5);
    }

    #[test]
    fn test_missing_id_and_title_is_deterministic() {
        let xml = rss("<item><description>Only a body</description></item>");
        let first = parse_feed(raw(&xml));
        let second = parse_feed(raw(&xml));

        assert_eq!(first.entries[0].guid, second.entries[0].guid);
        assert_eq!(first.entries[0].guid, compute_guid(None, None));
        assert_eq!(first.entries[0].title, None);
    }

    #[test]
    fn test_title_is_guid_fallback() {
        let parsed = parse_feed(raw(&rss("<item><title>Hello</title></item>")));
        assert_eq!(parsed.entries[0].guid, compute_guid(None, Some("Hello")));
    }

    #[test]
    fn test_feed_metadata() {
        let parsed = parse_feed(raw(&rss("")));
        assert_eq!(parsed.title.as_deref(), Some("Example"));
        assert!(parsed.link.as_deref().unwrap().starts_with("http://example.com"));
        assert_eq!(parsed.url, "http://example.com/feed.xml");
        assert_eq!(parsed.etag.as_deref(), Some("\"v1\""));
        assert_eq!(parsed.last_modified, None);
        assert_eq!(parsed.image_url, None);
        assert!(parsed.last_refresh_date > 0);
    }

    #[test]
    fn test_plain_text_content_is_escaped() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>T</title>
  <entry>
    <id>a</id>
    <title>A</title>
    <updated>2020-01-01T00:00:00Z</updated>
    <content type="text">1 &lt; 2 &amp; 3</content>
  </entry>
  <entry>
    <id>b</id>
    <title>B</title>
    <updated>2020-01-01T00:00:00Z</updated>
    <content type="html">&lt;b&gt;bold&lt;/b&gt;</content>
  </entry>
</feed>"#;
        let parsed = parse_feed(raw(xml));
        assert_eq!(parsed.entries[0].content, "1 &lt; 2 &amp; 3");
        assert_eq!(parsed.entries[1].content, "<b>bold</b>");
    }

    #[test]
    fn test_summary_used_when_no_content() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>T</title>
  <entry>
    <id>a</id>
    <updated>2020-01-01T00:00:00Z</updated>
    <summary type="text">a &lt;tag&gt;</summary>
  </entry>
  <entry>
    <id>b</id>
    <updated>2020-01-01T00:00:00Z</updated>
  </entry>
</feed>"#;
        let parsed = parse_feed(raw(xml));
        assert_eq!(parsed.entries[0].content, "a &lt;tag&gt;");
        assert_eq!(parsed.entries[1].content, "");
    }

    #[test]
    fn test_date_fallback_order() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>T</title>
  <entry>
    <id>both</id>
    <published>2020-01-01T00:00:00Z</published>
    <updated>2020-01-02T00:00:00Z</updated>
  </entry>
  <entry>
    <id>published-only</id>
    <published>2020-01-01T00:00:00Z</published>
  </entry>
  <entry>
    <id>neither</id>
  </entry>
</feed>"#;
        let before = Utc::now().timestamp();
        let parsed = parse_feed(raw(xml));

        assert_eq!(parsed.entries[0].date, 1577923200);
        assert_eq!(parsed.entries[1].date, 1577836800);
        assert!(parsed.entries[2].date >= before);
    }

    #[test]
    fn test_author_fallback() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>T</title>
  <author><name>Feed Author</name></author>
  <entry>
    <id>a</id>
    <author><name>Entry Author</name></author>
  </entry>
  <entry>
    <id>b</id>
  </entry>
</feed>"#;
        let parsed = parse_feed(raw(xml));
        assert_eq!(parsed.entries[0].author.as_deref(), Some("Entry Author"));
        assert_eq!(parsed.entries[1].author.as_deref(), Some("Feed Author"));

        let anonymous = parse_feed(raw(&rss("<item><guid>x</guid></item>")));
        assert_eq!(anonymous.entries[0].author, None);
    }

    #[test]
    fn test_awesome_blog_fixture() {
        let parsed = parse_feed(raw_bytes(FIXTURE));

        assert_eq!(parsed.title.as_deref(), Some("David Yan's CMPT 376W Blog"));
        assert_eq!(parsed.link.as_deref(), Some("http://awesome-blog.github.io/"));

        let entry = &parsed.entries[0];
        assert_eq!(entry.title.as_deref(), Some("Return of the OPPO Find 5"));
        assert_eq!(entry.guid, "57785a2b321c948508451096cb98f23a2a697c01");
        assert_eq!(entry.author.as_deref(), Some("David Yan"));
        assert_eq!(entry.date, 1384934400);
        assert_eq!(
            entry.link.as_deref(),
            Some("http://awesome-blog.github.io/2013/11/20/return-of-the-oppo-find-5.html")
        );
        assert!(entry.content.starts_with("<p>Yesterday, "));
    }
}
