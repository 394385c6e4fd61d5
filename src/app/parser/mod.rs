//! Streaming RSS feed parser
//!
//! A single forward pass over the document with quick-xml. Channel metadata
//! is collected as it is met; each `<item>` is identified and handed to the
//! [`ParseStrategy`] before it is kept. A strategy may cancel the whole parse
//! from the channel dates, which is reported as [`ParseError::Cancelled`]
//! and is the normal "nothing new" outcome rather than a failure.
//!
//! # Examples
//!
//! ```rust
//! use castkeeper::app::parser::{parse_feed, PreviewStrategy};
//!
//! let document = r#"<rss><channel><title>Show</title>
//!   <item><guid>g1</guid><enclosure url="https://example.com/1.mp3"/></item>
//! </channel></rss>"#;
//! let mut strategy = PreviewStrategy::new(None, None);
//! let feed = parse_feed(document, &mut strategy).unwrap();
//! assert_eq!(feed.channel.title, "Show");
//! assert_eq!(feed.items.len(), 1);
//! ```

pub mod dates;
mod elements;
pub mod strategy;

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, warn};

use crate::app::hash::ItemHash;
use crate::app::models::{AtomLink, ChannelXml, Funding, ItemXml};
use crate::errors::{ParseError, ParseResult};

pub use dates::parse_feed_date;
pub use strategy::{ItemDecision, ParseStrategy, PreviewStrategy, UpdateStrategy};

use elements::{
    attribute, element_name, next_event, read_categories, read_channel_image, read_item,
    read_optional_text, read_text, skip_element,
};

/// An item accepted by the strategy
#[derive(Debug, Clone)]
pub struct ParsedItem {
    pub hash: ItemHash,
    pub normalized_url: String,
    pub xml: ItemXml,
}

/// An item that could not be identified
#[derive(Debug)]
pub struct RejectedItem {
    pub title: String,
    pub error: ParseError,
}

/// Result of a completed parse
#[derive(Debug)]
pub struct ParsedFeed {
    pub channel: ChannelXml,
    /// Accepted items in document order
    pub items: Vec<ParsedItem>,
    pub rejected: Vec<RejectedItem>,
    /// Items dropped because the strategy already knew them
    pub skipped: usize,
}

/// Parse a feed document
///
/// # Errors
///
/// * `ParseError::Cancelled` when the strategy cancels on a channel date
/// * `ParseError::MissingChannel` when no `<channel>` element exists
/// * `ParseError::Xml` when the document is not well-formed
pub fn parse_feed(document: &str, strategy: &mut dyn ParseStrategy) -> ParseResult<ParsedFeed> {
    let mut reader = Reader::from_str(document);
    reader.trim_text(true);

    seek_channel(&mut reader)?;

    let mut feed = ParsedFeed {
        channel: ChannelXml::default(),
        items: Vec::new(),
        rejected: Vec::new(),
        skipped: 0,
    };
    let mut cancel_remaining = false;

    loop {
        match next_event(&mut reader)? {
            Event::Start(start) => {
                let name = element_name(&start);
                let channel = &mut feed.channel;
                match name.as_str() {
                    "item" => {
                        if cancel_remaining {
                            skip_element(&mut reader)?;
                            feed.skipped += 1;
                        } else {
                            let xml = read_item(&mut reader)?;
                            cancel_remaining = accept_item(xml, strategy, &mut feed);
                        }
                    }
                    "pubdate" => {
                        let text = read_optional_text(&mut reader)?;
                        if let Some(date) = text.as_deref().and_then(parse_feed_date) {
                            if strategy.cancel_on_pub_date(&date) {
                                return Err(ParseError::Cancelled {
                                    reason: format!("channel pubDate {} has not advanced", date),
                                });
                            }
                        }
                        channel.pub_date = text;
                    }
                    "lastbuilddate" => {
                        let text = read_optional_text(&mut reader)?;
                        if let Some(date) = text.as_deref().and_then(parse_feed_date) {
                            if strategy.cancel_on_build_date(&date) {
                                return Err(ParseError::Cancelled {
                                    reason: format!(
                                        "channel lastBuildDate {} has not advanced",
                                        date
                                    ),
                                });
                            }
                        }
                        channel.last_build_date = text;
                    }
                    "title" => channel.title = read_text(&mut reader)?,
                    "link" => channel.link = read_optional_text(&mut reader)?,
                    "description" => channel.description = read_optional_text(&mut reader)?,
                    "language" => channel.language = read_optional_text(&mut reader)?,
                    "copyright" => channel.copyright = read_optional_text(&mut reader)?,
                    "generator" => channel.generator = read_optional_text(&mut reader)?,
                    "image" => channel.image = Some(read_channel_image(&mut reader)?),
                    "itunes:image" => {
                        channel.itunes_image = attribute(&start, "href");
                        skip_element(&mut reader)?;
                    }
                    "itunes:author" => channel.author = read_optional_text(&mut reader)?,
                    "itunes:summary" => channel.summary = read_optional_text(&mut reader)?,
                    "itunes:type" => channel.itunes_type = read_optional_text(&mut reader)?,
                    "itunes:explicit" => channel.explicit = read_optional_text(&mut reader)?,
                    "itunes:new-feed-url" => {
                        channel.new_feed_url = read_optional_text(&mut reader)?
                    }
                    "itunes:category" => {
                        read_categories(&mut reader, &start, &mut channel.categories)?
                    }
                    "atom:link" => {
                        push_atom_link(&start, &mut channel.atom_links);
                        skip_element(&mut reader)?;
                    }
                    "podcast:guid" => channel.podcast_guid = read_optional_text(&mut reader)?,
                    "podcast:locked" => channel.locked = read_optional_text(&mut reader)?,
                    "podcast:funding" => {
                        let url = attribute(&start, "url").unwrap_or_default();
                        let text = read_text(&mut reader)?;
                        channel.funding.push(Funding { url, text });
                    }
                    _ => skip_element(&mut reader)?,
                }
            }
            Event::Empty(start) => {
                let channel = &mut feed.channel;
                match element_name(&start).as_str() {
                    "itunes:image" => channel.itunes_image = attribute(&start, "href"),
                    "atom:link" => push_atom_link(&start, &mut channel.atom_links),
                    "itunes:category" => channel.categories.extend(attribute(&start, "text")),
                    _ => {}
                }
            }
            Event::End(_) | Event::Eof => break,
            _ => {}
        }
    }

    debug!(
        "Parsed '{}': {} items accepted, {} skipped, {} rejected",
        feed.channel.title,
        feed.items.len(),
        feed.skipped,
        feed.rejected.len()
    );
    Ok(feed)
}

/// Advance the reader to just inside `<channel>`
fn seek_channel(reader: &mut Reader<&[u8]>) -> ParseResult<()> {
    loop {
        match next_event(reader)? {
            Event::Start(start) if element_name(&start) == "channel" => return Ok(()),
            Event::Eof => return Err(ParseError::MissingChannel),
            _ => {}
        }
    }
}

/// Identify an item and apply the strategy's decision; returns true when the
/// rest of the items should be dropped
fn accept_item(xml: ItemXml, strategy: &mut dyn ParseStrategy, feed: &mut ParsedFeed) -> bool {
    let (guid, url) = match (xml.identity_guid(), xml.enclosure_url()) {
        (Some(guid), Some(url)) => (guid.to_string(), url.to_string()),
        _ => {
            warn!("Item '{}' has no enclosure, ignoring it", xml.title);
            feed.rejected.push(RejectedItem {
                error: ParseError::MissingEnclosure {
                    title: xml.title.clone(),
                },
                title: xml.title,
            });
            return false;
        }
    };

    let (hash, normalized_url) = match strategy.item_hash(&guid, &url) {
        Ok(identity) => identity,
        Err(error) => {
            warn!("Cannot identify item '{}': {}", xml.title, error);
            feed.rejected.push(RejectedItem {
                title: xml.title,
                error,
            });
            return false;
        }
    };

    match strategy.skip_item(&hash) {
        ItemDecision::Parse => {
            feed.items.push(ParsedItem {
                hash,
                normalized_url,
                xml,
            });
            false
        }
        ItemDecision::Skip => {
            feed.skipped += 1;
            false
        }
        ItemDecision::CancelRemaining => {
            feed.skipped += 1;
            true
        }
    }
}

fn push_atom_link(start: &quick_xml::events::BytesStart, links: &mut Vec<AtomLink>) {
    if let Some(href) = attribute(start, "href") {
        links.push(AtomLink {
            href,
            rel: attribute(start, "rel"),
            link_type: attribute(start, "type"),
        });
    }
}
