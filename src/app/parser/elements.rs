//! Element-level readers over a quick-xml event stream
//!
//! Element names are matched on their qualified name lowercased, so
//! `pubDate`, `PUBDATE` and `pubdate` are the same element while
//! `itunes:image` stays distinct from `image`.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::dates::parse_feed_date;
use crate::app::models::{ChannelImage, Enclosure, ItemXml, Person};
use crate::errors::{ParseError, ParseResult};

/// Read the next event, attaching the byte position to failures
pub(crate) fn next_event<'a>(reader: &mut Reader<&'a [u8]>) -> ParseResult<Event<'a>> {
    reader.read_event().map_err(|source| ParseError::Xml {
        position: reader.buffer_position(),
        source,
    })
}

/// Lowercased qualified name of an element
pub(crate) fn element_name(start: &BytesStart) -> String {
    String::from_utf8_lossy(start.name().as_ref()).to_ascii_lowercase()
}

/// Attribute value by case-insensitive name
///
/// Malformed attributes are ignored rather than failing the document.
pub(crate) fn attribute(start: &BytesStart, name: &str) -> Option<String> {
    start
        .attributes()
        .with_checks(false)
        .flatten()
        .find(|attr| attr.key.as_ref().eq_ignore_ascii_case(name.as_bytes()))
        .map(|attr| {
            attr.unescape_value()
                .map(|value| value.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned())
        })
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Collect the text content of the element just opened, consuming its end
///
/// Text and CDATA are concatenated; markup nested inside (HTML in
/// descriptions that was not escaped) is dropped.
pub(crate) fn read_text(reader: &mut Reader<&[u8]>) -> ParseResult<String> {
    let mut text = String::new();
    let mut depth = 0usize;
    loop {
        match next_event(reader)? {
            Event::Text(content) => match content.unescape() {
                Ok(value) => text.push_str(&value),
                Err(_) => text.push_str(&String::from_utf8_lossy(&content)),
            },
            Event::CData(content) => text.push_str(&String::from_utf8_lossy(&content.into_inner())),
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(text.trim().to_string())
}

/// Text content as an option, empty meaning absent
pub(crate) fn read_optional_text(reader: &mut Reader<&[u8]>) -> ParseResult<Option<String>> {
    let text = read_text(reader)?;
    Ok(if text.is_empty() { None } else { Some(text) })
}

/// Skip the element just opened, including all of its children
pub(crate) fn skip_element(reader: &mut Reader<&[u8]>) -> ParseResult<()> {
    let mut depth = 0usize;
    loop {
        match next_event(reader)? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                if depth == 0 {
                    return Ok(());
                }
                depth -= 1;
            }
            Event::Eof => return Ok(()),
            _ => {}
        }
    }
}

/// RSS `<image>` block
pub(crate) fn read_channel_image(reader: &mut Reader<&[u8]>) -> ParseResult<ChannelImage> {
    let mut image = ChannelImage::default();
    loop {
        match next_event(reader)? {
            Event::Start(start) => match element_name(&start).as_str() {
                "url" => image.url = read_text(reader)?,
                "title" => image.title = read_optional_text(reader)?,
                "link" => image.link = read_optional_text(reader)?,
                _ => skip_element(reader)?,
            },
            Event::End(_) | Event::Eof => break,
            _ => {}
        }
    }
    Ok(image)
}

/// Category text of an `itunes:category` element and its nested
/// subcategories, in document order
pub(crate) fn read_categories(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart,
    categories: &mut Vec<String>,
) -> ParseResult<()> {
    categories.extend(attribute(start, "text"));
    let mut depth = 0usize;
    loop {
        match next_event(reader)? {
            Event::Start(nested) => {
                if element_name(&nested) == "itunes:category" {
                    categories.extend(attribute(&nested, "text"));
                }
                depth += 1;
            }
            Event::Empty(nested) => {
                if element_name(&nested) == "itunes:category" {
                    categories.extend(attribute(&nested, "text"));
                }
            }
            Event::End(_) => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(())
}

fn enclosure_from(start: &BytesStart) -> Enclosure {
    Enclosure {
        url: attribute(start, "url").unwrap_or_default(),
        length: attribute(start, "length")
            .and_then(|length| length.parse().ok())
            .unwrap_or(0),
        mime_type: attribute(start, "type").unwrap_or_default(),
    }
}

fn person_from(start: &BytesStart, name: String) -> Person {
    Person {
        name,
        role: attribute(start, "role"),
        group: attribute(start, "group"),
        href: attribute(start, "href"),
        img: attribute(start, "img"),
    }
}

/// Read an `<item>` element body into its metadata
pub(crate) fn read_item(reader: &mut Reader<&[u8]>) -> ParseResult<ItemXml> {
    let mut item = ItemXml::default();
    let mut itunes_author = None;

    loop {
        match next_event(reader)? {
            Event::Start(start) => {
                let name = element_name(&start);
                match name.as_str() {
                    "title" => item.title = read_text(reader)?,
                    "link" => item.link = read_optional_text(reader)?,
                    "description" => item.description = read_optional_text(reader)?,
                    "content:encoded" => item.content_encoded = read_optional_text(reader)?,
                    "guid" => {
                        item.guid_is_permalink = attribute(&start, "isPermaLink")
                            .map(|value| !value.eq_ignore_ascii_case("false"));
                        item.guid = read_optional_text(reader)?;
                    }
                    "pubdate" => {
                        let text = read_optional_text(reader)?;
                        item.pub_time = text.as_deref().and_then(parse_feed_date);
                        item.pub_date = text;
                    }
                    "author" => item.author = read_optional_text(reader)?,
                    "itunes:author" => itunes_author = read_optional_text(reader)?,
                    "enclosure" => {
                        item.enclosure = Some(enclosure_from(&start));
                        skip_element(reader)?;
                    }
                    "itunes:image" => {
                        item.image = attribute(&start, "href");
                        skip_element(reader)?;
                    }
                    "itunes:episode" => item.episode = read_optional_text(reader)?,
                    "itunes:season" => item.season = read_optional_text(reader)?,
                    "itunes:episodetype" => item.episode_type = read_optional_text(reader)?,
                    "itunes:duration" => item.duration = read_optional_text(reader)?,
                    "itunes:explicit" => item.explicit = read_optional_text(reader)?,
                    "itunes:subtitle" => item.subtitle = read_optional_text(reader)?,
                    "itunes:summary" => item.summary = read_optional_text(reader)?,
                    "podcast:episode" => item.podcast_episode = read_optional_text(reader)?,
                    "podcast:season" => item.podcast_season = read_optional_text(reader)?,
                    "podcast:person" => {
                        let person_name = read_text(reader)?;
                        item.persons.push(person_from(&start, person_name));
                    }
                    _ => skip_element(reader)?,
                }
            }
            Event::Empty(start) => match element_name(&start).as_str() {
                "enclosure" => item.enclosure = Some(enclosure_from(&start)),
                "itunes:image" => item.image = attribute(&start, "href"),
                _ => {}
            },
            Event::End(_) | Event::Eof => break,
            _ => {}
        }
    }

    if item.author.is_none() {
        item.author = itunes_author;
    }
    Ok(item)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader_at_first_start(document: &str) -> Reader<&[u8]> {
        let mut reader = Reader::from_str(document);
        reader.trim_text(true);
        loop {
            if let Event::Start(_) = next_event(&mut reader).unwrap() {
                return reader;
            }
        }
    }

    #[test]
    fn test_read_item_fields() {
        let document = r#"<item>
            <Title>Ep &amp; One</Title>
            <guid isPermaLink="false">abc-1</guid>
            <PUBDATE>Wed, 17 May 2023 08:00:00 +0000</PUBDATE>
            <enclosure url="https://cdn.example.com/ep1.mp3" length="1234" type="audio/mpeg"/>
            <itunes:episode>7</itunes:episode>
            <itunes:image href="https://example.com/ep1.jpg"/>
            <itunes:author>Host</itunes:author>
            <podcast:person role="guest" href="https://example.com/g">Guest Name</podcast:person>
            <unknown><nested>ignored</nested></unknown>
        </item>"#;
        let mut reader = reader_at_first_start(document);
        let item = read_item(&mut reader).unwrap();

        assert_eq!(item.title, "Ep & One");
        assert_eq!(item.guid.as_deref(), Some("abc-1"));
        assert_eq!(item.guid_is_permalink, Some(false));
        assert!(item.pub_time.is_some());
        let enclosure = item.enclosure.unwrap();
        assert_eq!(enclosure.url, "https://cdn.example.com/ep1.mp3");
        assert_eq!(enclosure.length, 1234);
        assert_eq!(enclosure.mime_type, "audio/mpeg");
        assert_eq!(item.episode.as_deref(), Some("7"));
        assert_eq!(item.image.as_deref(), Some("https://example.com/ep1.jpg"));
        assert_eq!(item.author.as_deref(), Some("Host"));
        assert_eq!(item.persons.len(), 1);
        assert_eq!(item.persons[0].name, "Guest Name");
        assert_eq!(item.persons[0].role.as_deref(), Some("guest"));
    }

    #[test]
    fn test_cdata_description() {
        let document = "<item><description><![CDATA[<p>Hello</p>]]></description></item>";
        let mut reader = reader_at_first_start(document);
        let item = read_item(&mut reader).unwrap();
        assert_eq!(item.description.as_deref(), Some("<p>Hello</p>"));
    }

    #[test]
    fn test_nested_categories() {
        let document = r#"<itunes:category text="Society &amp; Culture"><itunes:category text="History"/></itunes:category>"#;
        let mut reader = Reader::from_str(document);
        reader.trim_text(true);
        let start = match next_event(&mut reader).unwrap() {
            Event::Start(start) => start,
            other => panic!("unexpected event {:?}", other),
        };
        let mut categories = Vec::new();
        read_categories(&mut reader, &start, &mut categories).unwrap();
        assert_eq!(categories, vec!["Society & Culture", "History"]);
    }
}
