//! Feed autodiscovery from HTML pages
//!
//! See <http://www.rssboard.org/rss-autodiscovery>. Only `<link>` tags with
//! `rel="alternate"` and an RSS or Atom media type are considered.

use url::Url;

/// Link type attribute values that indicate a feed
pub const FEED_MIME_TYPES: &[&str] = &["application/rss+xml", "application/atom+xml"];

/// Return the first feed URL advertised by an HTML document, resolved
/// against `page_url`.
pub fn find_feed_link(html: &str, page_url: &str) -> Option<String> {
    let base = Url::parse(page_url).ok();

    link_tags(html)
        .filter(|attrs| is_feed_link(attrs))
        .filter_map(|attrs| attr(&attrs, "href").map(str::to_string))
        .find(|href| !href.trim().is_empty())
        .map(|href| resolve(href.trim(), base.as_ref()))
}

type Attrs = Vec<(String, String)>;

fn attr<'a>(attrs: &'a Attrs, name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn is_feed_link(attrs: &Attrs) -> bool {
    let alternate = attr(attrs, "rel")
        .map(|rel| {
            rel.split_ascii_whitespace()
                .any(|token| token.eq_ignore_ascii_case("alternate"))
        })
        .unwrap_or(false);

    let feed_type = attr(attrs, "type")
        .map(|ty| {
            let ty = ty.trim().to_ascii_lowercase();
            FEED_MIME_TYPES.contains(&ty.as_str())
        })
        .unwrap_or(false);

    alternate && feed_type
}

/// Iterate over the attribute lists of every `<link ...>` tag in the document
fn link_tags(html: &str) -> impl Iterator<Item = Attrs> + '_ {
    let mut rest = html;

    std::iter::from_fn(move || loop {
        let start = find_ascii_ci(rest, "<link")?;
        let after = &rest[start + "<link".len()..];

        // `<linkfoo` is a different element
        match after.chars().next() {
            Some(c) if c.is_ascii_whitespace() || c == '/' || c == '>' => {}
            _ => {
                rest = after;
                continue;
            }
        }

        let end = after.find('>').unwrap_or(after.len());
        rest = &after[end..];
        return Some(parse_attrs(&after[..end]));
    })
}

/// Parse `name="value" name='value' name=value name` sequences
fn parse_attrs(tag: &str) -> Attrs {
    let mut attrs = Vec::new();
    let mut chars = tag.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_ascii_whitespace() || c == '/' {
            chars.next();
            continue;
        }

        let mut name_end = tag.len();
        while let Some(&(i, c)) = chars.peek() {
            if c == '=' || c.is_ascii_whitespace() || c == '/' {
                name_end = i;
                break;
            }
            chars.next();
        }
        let name = tag[start..name_end].to_ascii_lowercase();

        while matches!(chars.peek(), Some(&(_, c)) if c.is_ascii_whitespace()) {
            chars.next();
        }

        let mut value = String::new();
        if matches!(chars.peek(), Some(&(_, '='))) {
            chars.next();
            while matches!(chars.peek(), Some(&(_, c)) if c.is_ascii_whitespace()) {
                chars.next();
            }
            match chars.peek().map(|&(_, c)| c) {
                Some(quote @ ('"' | '\'')) => {
                    chars.next();
                    for (_, c) in chars.by_ref() {
                        if c == quote {
                            break;
                        }
                        value.push(c);
                    }
                }
                _ => {
                    while let Some(&(_, c)) = chars.peek() {
                        if c.is_ascii_whitespace() {
                            break;
                        }
                        value.push(c);
                        chars.next();
                    }
                }
            }
        }

        if !name.is_empty() {
            attrs.push((name, value));
        }
    }

    attrs
}

fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}

fn resolve(href: &str, base: Option<&Url>) -> String {
    match base {
        Some(base) => base
            .join(href)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| href.to_string()),
        None => href.to_string(),
    }
}
