//! RSS 2.0 / RSS 1.0 (RDF) / Atom parsing into one normalized item shape.

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use quick_xml::de::from_str;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use serde::Deserialize;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::{OffsetDateTime, UtcOffset};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    Rss,
    Rdf,
    Atom,
}

/// One feed entry, whichever schema it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub content: String,
    pub link: String,
    pub published: Option<u64>,
    pub id: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFeed {
    pub kind: FeedKind,
    pub title: String,
    /// Site permalink (`channel/link`, Atom alternate link), empty if absent.
    pub site_link: String,
    /// Items present in the document, before any cap.
    pub total_items: usize,
    pub items: Vec<FeedItem>,
}

// Elements are matched by local name, so `media:title`, `atom:link`,
// `itunes:author` and friends land in the same fields as the plain ones.
// Every text field is therefore a list and the first non-empty value wins.

// ---------- RSS 2.0 ----------

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(default)]
    title: Vec<Text>,
    #[serde(default)]
    link: Vec<Text>,
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    #[serde(default)]
    title: Vec<Text>,
    #[serde(default)]
    link: Vec<Text>,
    #[serde(default)]
    description: Vec<Text>,
    #[serde(alias = "content:encoded", default)]
    encoded: Vec<Text>,
    #[serde(rename = "pubDate", default)]
    pub_date: Vec<Text>,
    /// `dc:date`, RSS 1.0's only date element.
    #[serde(rename = "date", alias = "dc:date", default)]
    dc_date: Vec<Text>,
    #[serde(default)]
    guid: Vec<Text>,
    #[serde(default)]
    author: Vec<Text>,
    #[serde(alias = "dc:creator", default)]
    creator: Vec<Text>,
}

// ---------- RSS 1.0 ----------

#[derive(Debug, Deserialize)]
struct Rdf {
    channel: Option<Channel>,
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

// ---------- Atom ----------

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(default)]
    title: Vec<Text>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    #[serde(default)]
    title: Vec<Text>,
    #[serde(default)]
    id: Vec<Text>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    #[serde(default)]
    content: Vec<Text>,
    #[serde(default)]
    summary: Vec<Text>,
    #[serde(default)]
    published: Vec<Text>,
    #[serde(default)]
    updated: Vec<Text>,
    #[serde(default)]
    author: Vec<AtomPerson>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href", default)]
    href: String,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomPerson {
    #[serde(default)]
    name: Vec<Text>,
}

/// Element text that may carry attributes (`type="html"`, `isPermaLink`).
#[derive(Debug, Default, Deserialize)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

fn first_text(values: Vec<Text>) -> Option<String> {
    values
        .into_iter()
        .map(|t| t.value.trim().to_string())
        .find(|v| !v.is_empty())
}

/// `rel="alternate"` (or no rel) first, then whatever link comes first.
fn alternate_href(links: &[AtomLink]) -> String {
    links
        .iter()
        .filter(|l| !l.href.trim().is_empty())
        .find(|l| l.rel.as_deref().is_none_or(|r| r == "alternate"))
        .or_else(|| links.iter().find(|l| !l.href.trim().is_empty()))
        .map(|l| l.href.trim().to_string())
        .unwrap_or_default()
}

/// Look at the root element to decide which schema applies.
pub fn detect_kind(xml: &str) -> Result<FeedKind> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event().context("reading feed root element")? {
            Event::Start(e) | Event::Empty(e) => {
                return match e.local_name().as_ref() {
                    b"rss" => Ok(FeedKind::Rss),
                    b"RDF" => Ok(FeedKind::Rdf),
                    b"feed" => Ok(FeedKind::Atom),
                    other => bail!(
                        "unsupported feed root element <{}>",
                        String::from_utf8_lossy(other)
                    ),
                };
            }
            Event::Eof => bail!("document has no root element"),
            _ => {}
        }
    }
}

/// Parse an RSS or Atom document. At most `max_items` items are returned.
pub fn parse_feed(xml: &str, max_items: usize) -> Result<ParsedFeed> {
    let xml = scrub_html_entities_for_xml(xml);
    let kind = detect_kind(&xml)?;
    let (title, site_link, all): (String, String, Vec<FeedItem>) = match kind {
        FeedKind::Rss => {
            let rss: Rss = from_str(&xml).context("parsing rss xml")?;
            let c = rss.channel;
            (
                first_text(c.title).unwrap_or_default(),
                first_text(c.link).unwrap_or_default(),
                c.items.into_iter().map(rss_item).collect(),
            )
        }
        FeedKind::Rdf => {
            let rdf: Rdf = from_str(&xml).context("parsing rdf xml")?;
            let (title, link) = rdf
                .channel
                .map(|c| (first_text(c.title), first_text(c.link)))
                .unwrap_or_default();
            (
                title.unwrap_or_default(),
                link.unwrap_or_default(),
                rdf.items.into_iter().map(rss_item).collect(),
            )
        }
        FeedKind::Atom => {
            let atom: AtomFeed = from_str(&xml).context("parsing atom xml")?;
            (
                first_text(atom.title).unwrap_or_default(),
                alternate_href(&atom.links),
                atom.entries.into_iter().map(atom_entry).collect(),
            )
        }
    };

    let total_items = all.len();
    Ok(ParsedFeed {
        kind,
        title: strip_markup(&title),
        site_link,
        total_items,
        items: all.into_iter().take(max_items).collect(),
    })
}

fn rss_item(it: RssItem) -> FeedItem {
    let body = first_text(it.description)
        .or_else(|| first_text(it.encoded))
        .unwrap_or_default();
    let published = first_text(it.pub_date)
        .as_deref()
        .and_then(parse_rfc2822_to_unix)
        .or_else(|| first_text(it.dc_date).as_deref().and_then(parse_rfc3339_to_unix));
    FeedItem {
        title: strip_markup(&first_text(it.title).unwrap_or_default()),
        content: strip_markup(&body),
        link: first_text(it.link).unwrap_or_default(),
        published,
        id: first_text(it.guid),
        author: first_text(it.author).or_else(|| first_text(it.creator)),
    }
}

fn atom_entry(e: AtomEntry) -> FeedItem {
    let body = first_text(e.content)
        .or_else(|| first_text(e.summary))
        .unwrap_or_default();
    FeedItem {
        title: strip_markup(&first_text(e.title).unwrap_or_default()),
        content: strip_markup(&body),
        link: alternate_href(&e.links),
        published: first_text(e.published)
            .or_else(|| first_text(e.updated))
            .as_deref()
            .and_then(parse_rfc3339_to_unix),
        id: first_text(e.id),
        author: e.author.into_iter().find_map(|a| first_text(a.name)),
    }
}

fn parse_rfc2822_to_unix(ts: &str) -> Option<u64> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|x| u64::try_from(x).ok())
}

fn parse_rfc3339_to_unix(ts: &str) -> Option<u64> {
    OffsetDateTime::parse(ts.trim(), &Rfc3339)
        .ok()
        .map(|dt| dt.unix_timestamp())
        .and_then(|x| u64::try_from(x).ok())
}

/// Decode entities, drop tags, collapse whitespace.
pub fn strip_markup(s: &str) -> String {
    static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws regex"));
    let decoded = html_escape::decode_html_entities(s);
    let out = RE_TAGS.replace_all(&decoded, " ");
    RE_WS.replace_all(&out, " ").trim().to_string()
}

/// XML only knows five named entities; feeds routinely use HTML ones.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", "&#160;")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>World &amp; Security</title>
    <link>https://news.example/</link>
    <item>
      <title>Attack on &lt;b&gt;convoy&lt;/b&gt;</title>
      <link>https://news.example/a</link>
      <description><![CDATA[<p>Gunmen attacked a convoy&nbsp;today.</p>]]></description>
      <pubDate>Tue, 10 Jun 2025 08:30:00 +0000</pubDate>
      <guid isPermaLink="false">news-a</guid>
      <dc:creator>Jane Roe</dc:creator>
    </item>
    <item>
      <title>No guid here</title>
      <link>https://news.example/b</link>
      <description>Plain text.</description>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="text">Atom Wire</title>
  <entry>
    <title type="html">Border clash</title>
    <link rel="self" href="https://wire.example/self/1"/>
    <link rel="alternate" href="https://wire.example/1"/>
    <id>urn:wire:1</id>
    <updated>2025-06-10T09:00:00Z</updated>
    <summary>Troops exchanged fire.</summary>
    <author><name>Desk</name></author>
  </entry>
</feed>"#;

    #[test]
    fn detects_schema_from_root() {
        assert_eq!(detect_kind(RSS).unwrap(), FeedKind::Rss);
        assert_eq!(detect_kind(ATOM).unwrap(), FeedKind::Atom);
        assert!(detect_kind("<html><body/></html>").is_err());
        assert!(detect_kind("").is_err());
    }

    #[test]
    fn parses_rss_items() {
        let f = parse_feed(RSS, 10).unwrap();
        assert_eq!(f.kind, FeedKind::Rss);
        assert_eq!(f.title, "World & Security");
        assert_eq!(f.site_link, "https://news.example/");
        assert_eq!(f.total_items, 2);
        let a = &f.items[0];
        assert_eq!(a.title, "Attack on convoy");
        assert_eq!(a.content, "Gunmen attacked a convoy today.");
        assert_eq!(a.id.as_deref(), Some("news-a"));
        assert_eq!(a.published, Some(1_749_544_200));
        assert_eq!(f.items[1].id, None);
    }

    #[test]
    fn parses_atom_entries_preferring_alternate_link() {
        let f = parse_feed(ATOM, 10).unwrap();
        assert_eq!(f.kind, FeedKind::Atom);
        assert_eq!(f.title, "Atom Wire");
        let e = &f.items[0];
        assert_eq!(e.link, "https://wire.example/1");
        assert_eq!(e.id.as_deref(), Some("urn:wire:1"));
        assert_eq!(e.content, "Troops exchanged fire.");
        assert_eq!(e.author.as_deref(), Some("Desk"));
        assert_eq!(e.published, Some(1_749_546_000));
    }

    #[test]
    fn caps_item_count() {
        let mut xml = String::from("<rss><channel><title>Big</title>");
        for i in 0..15 {
            xml.push_str(&format!(
                "<item><title>t{i}</title><link>https://x/{i}</link></item>"
            ));
        }
        xml.push_str("</channel></rss>");
        let f = parse_feed(&xml, 10).unwrap();
        assert_eq!(f.total_items, 15);
        assert_eq!(f.items.len(), 10);
        assert_eq!(f.items[9].title, "t9");
    }

    #[test]
    fn namespaced_duplicates_do_not_break_items() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>Daily Wire</title>
    <atom:link href="https://wire.example/rss" rel="self" type="application/rss+xml"/>
    <link>https://wire.example/</link>
    <item>
      <title>Terror attack downtown</title>
      <atom:link href="https://wire.example/amp/1" rel="amphtml"/>
      <link>https://wire.example/1</link>
      <description>Police sealed off the square.</description>
      <media:description>Photo caption</media:description>
      <media:title>Photo</media:title>
      <media:content url="https://img.example/1.jpg" medium="image">
        <media:title>Photo</media:title>
      </media:content>
    </item>
    <item>
      <title>Second story</title>
      <link>https://wire.example/2</link>
    </item>
  </channel>
</rss>"#;
        let f = parse_feed(xml, 10).unwrap();
        assert_eq!(f.title, "Daily Wire");
        assert_eq!(f.site_link, "https://wire.example/");
        assert_eq!(f.total_items, 2);
        let a = &f.items[0];
        assert_eq!(a.title, "Terror attack downtown");
        assert_eq!(a.link, "https://wire.example/1");
        assert_eq!(a.content, "Police sealed off the square.");
        assert_eq!(f.items[1].title, "Second story");
    }

    #[test]
    fn rdf_items_take_dc_date() {
        let xml = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns="http://purl.org/rss/1.0/" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel rdf:about="https://old.example/">
    <title>Old Wire</title>
    <link>https://old.example/</link>
  </channel>
  <item rdf:about="https://old.example/1">
    <title>Embassy alert</title>
    <link>https://old.example/1</link>
    <description>Staff were evacuated.</description>
    <dc:date>2025-06-10T09:00:00Z</dc:date>
    <dc:creator>Night Desk</dc:creator>
  </item>
</rdf:RDF>"#;
        let f = parse_feed(xml, 10).unwrap();
        assert_eq!(f.kind, FeedKind::Rdf);
        assert_eq!(f.title, "Old Wire");
        assert_eq!(f.site_link, "https://old.example/");
        let a = &f.items[0];
        assert_eq!(a.published, Some(1_749_546_000));
        assert_eq!(a.author.as_deref(), Some("Night Desk"));
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(parse_feed("<rss><channel><item></channel>", 10).is_err());
    }
}
