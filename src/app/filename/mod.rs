//! Filename template engine
//!
//! Renders a feed's configured pattern into a filesystem-safe filename for an
//! item. Placeholders are replaced once each, left to right:
//!
//! | Token                     | Value                                              |
//! |---------------------------|----------------------------------------------------|
//! | `#shortname#`             | feed shortname                                     |
//! | `#linkfinalpath#`         | last path segment of the item link                 |
//! | `#episode#`               | upstream episode number, zero padded               |
//! | `#count#`                 | internal sequence number, zero padded              |
//! | `#season#`                | upstream season number                             |
//! | `#date#`                  | publication date (`YYYYMMDD`)                      |
//! | `#title#`                 | title with spaces as underscores                   |
//! | `#titleregex:N#`          | Nth capture of the feed regex applied to the title |
//! | `#ext#` / `#extension#`   | enclosure extension, without the dot               |
//! | `#urlfilename#`           | enclosure basename                                 |
//!
//! An empty pattern uses the enclosure basename. Missing link, episode and
//! negative count values fall back to the publication date.
//!
//! When a collision probe is supplied and reports the name as taken, a
//! single letter suffix (`.A` to `.L`) is inserted before the extension. The
//! chosen letter is stored with the item so regeneration reproduces the same
//! name without probing.

pub mod clean;

use regex::Regex;
use url::Url;

use crate::app::hash::ItemHash;
use crate::app::models::ItemXml;
use crate::constants::filenames;
use crate::errors::{FilenameError, FilenameResult};

pub use clean::FilenameCleaner;

use clean::{collapse_dots, tidy_component, underscore_spaces};

const TITLE_REGEX_PREFIX: &str = "#titleregex:";

/// Outcome of rendering a filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFilename {
    pub filename: String,
    /// Collision suffix letter, if one was needed
    pub suffix: Option<char>,
}

/// Compiled per-feed filename template
#[derive(Debug, Clone)]
pub struct FilenameTemplate {
    pattern: String,
    shortname: String,
    title_regex: Option<Regex>,
    episode_pad: usize,
    skip_file_trim: bool,
    cleaner: FilenameCleaner,
}

impl FilenameTemplate {
    /// Compile a template
    ///
    /// # Errors
    ///
    /// Returns `FilenameError::InvalidRegex` if `title_regex` does not compile
    pub fn new(
        pattern: impl Into<String>,
        shortname: impl Into<String>,
        title_regex: Option<&str>,
        episode_pad: usize,
        skip_file_trim: bool,
        cleaner: FilenameCleaner,
    ) -> FilenameResult<Self> {
        let title_regex = match title_regex.filter(|pattern| !pattern.is_empty()) {
            Some(pattern) => Some(Regex::new(pattern).map_err(|source| {
                FilenameError::InvalidRegex {
                    pattern: pattern.to_string(),
                    source,
                }
            })?),
            None => None,
        };

        Ok(Self {
            pattern: pattern.into(),
            shortname: shortname.into(),
            title_regex,
            episode_pad,
            skip_file_trim,
            cleaner,
        })
    }

    /// The raw pattern
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Render a filename, probing for collisions when `probe` is given
    ///
    /// # Errors
    ///
    /// Returns `FilenameError::SuffixExhausted` when the base name and all
    /// twelve suffixed variants are reported as taken
    pub fn render(
        &self,
        xml: &ItemXml,
        count: i64,
        probe: Option<&dyn Fn(&str) -> bool>,
    ) -> FilenameResult<RenderedFilename> {
        let base = self.base_name(xml, count)?;

        let probe = match probe {
            Some(probe) => probe,
            None => {
                return Ok(RenderedFilename {
                    filename: base,
                    suffix: None,
                })
            }
        };

        if !probe(&base) {
            return Ok(RenderedFilename {
                filename: base,
                suffix: None,
            });
        }

        for letter in filenames::COLLISION_SUFFIXES {
            let candidate = self.cleaner.with_suffix(&base, letter);
            if !probe(&candidate) {
                return Ok(RenderedFilename {
                    filename: candidate,
                    suffix: Some(letter),
                });
            }
        }

        Err(FilenameError::SuffixExhausted { filename: base })
    }

    /// Reproduce a previously rendered name from its stored suffix
    pub fn render_with_suffix(
        &self,
        xml: &ItemXml,
        count: i64,
        suffix: Option<char>,
    ) -> FilenameResult<String> {
        let base = self.base_name(xml, count)?;
        Ok(match suffix {
            Some(letter) => self.cleaner.with_suffix(&base, letter),
            None => base,
        })
    }

    /// Name used when rendering fails for reasons other than exhaustion
    pub fn placeholder(&self, xml: &ItemXml, hash: &ItemHash) -> String {
        let encoded = hash.to_base64();
        let prefix: String = encoded
            .chars()
            .take(filenames::PLACEHOLDER_HASH_CHARS)
            .collect();
        self.cleaner.clean(&format!(
            "{}_{}.{}",
            self.shortname,
            prefix,
            extension(xml)
        ))
    }

    /// Render the template without collision handling
    pub fn base_name(&self, xml: &ItemXml, count: i64) -> FilenameResult<String> {
        let rendered = if self.pattern.trim().is_empty() {
            let basename = url_basename(xml).ok_or_else(|| FilenameError::InvalidUrl {
                url: xml.enclosure_url().unwrap_or_default().to_string(),
            })?;
            tidy_component(&basename)
        } else {
            self.substitute(xml, count)
        };

        let cleaned = self.cleaner.clean(&rendered);
        if cleaned.is_empty() {
            return Err(FilenameError::EmptyResult {
                template: self.pattern.clone(),
            });
        }
        Ok(cleaned)
    }

    fn substitute(&self, xml: &ItemXml, count: i64) -> String {
        let mut name = self.pattern.clone();
        let fallback = date_string(xml);

        if name.contains("#shortname#") {
            replace_once(&mut name, "#shortname#", &self.shortname);
        }
        if name.contains("#linkfinalpath#") {
            let value = link_final_path(xml).unwrap_or_else(|| fallback.clone());
            replace_once(&mut name, "#linkfinalpath#", &value);
        }
        if name.contains("#episode#") {
            let value = xml
                .episode_number()
                .map(|episode| self.pad(episode))
                .unwrap_or_else(|| fallback.clone());
            replace_once(&mut name, "#episode#", &value);
        }
        if name.contains("#count#") {
            let value = if count < 0 {
                fallback.clone()
            } else {
                self.pad(&count.to_string())
            };
            replace_once(&mut name, "#count#", &value);
        }
        if name.contains("#season#") {
            replace_once(&mut name, "#season#", xml.season_number().unwrap_or(""));
        }
        if name.contains("#date#") {
            replace_once(&mut name, "#date#", &fallback);
        }
        if name.contains("#title#") {
            replace_once(&mut name, "#title#", &underscore_spaces(xml.title.trim()));
        }
        if name.contains(TITLE_REGEX_PREFIX) {
            name = self.substitute_title_regex(&name, &xml.title);
        }
        if name.contains("#extension#") {
            replace_once(&mut name, "#extension#", &extension(xml));
        }
        if name.contains("#ext#") {
            replace_once(&mut name, "#ext#", &extension(xml));
        }
        if name.contains("#urlfilename#") {
            let basename = url_basename(xml).unwrap_or_default();
            let value = if self.skip_file_trim {
                basename
            } else {
                tidy_component(&basename)
            };
            replace_once(&mut name, "#urlfilename#", &value);
        }

        name
    }

    /// Replace every `#titleregex:N#` token with the Nth capture
    fn substitute_title_regex(&self, name: &str, title: &str) -> String {
        let captures = self
            .title_regex
            .as_ref()
            .and_then(|regex| regex.captures(title));

        let mut result = String::with_capacity(name.len());
        let mut rest = name;
        while let Some(start) = rest.find(TITLE_REGEX_PREFIX) {
            let after = &rest[start + TITLE_REGEX_PREFIX.len()..];
            let digits_len = after.chars().take_while(|c| c.is_ascii_digit()).count();
            let index = after[..digits_len].parse::<usize>().ok();
            let closed = after[digits_len..].starts_with('#');

            match (index, closed) {
                (Some(index), true) => {
                    result.push_str(&rest[..start]);
                    let value = match &captures {
                        Some(captures) => captures
                            .get(index)
                            .map(|m| m.as_str().to_string())
                            .unwrap_or_default(),
                        None if index == 1 => title.to_string(),
                        None => String::new(),
                    };
                    result.push_str(&collapse_dots(&underscore_spaces(value.trim())));
                    rest = &after[digits_len + 1..];
                }
                _ => {
                    let literal_end = start + TITLE_REGEX_PREFIX.len();
                    result.push_str(&rest[..literal_end]);
                    rest = &rest[literal_end..];
                }
            }
        }
        result.push_str(rest);
        result
    }

    fn pad(&self, value: &str) -> String {
        format!("{:0>width$}", value.trim(), width = self.episode_pad)
    }
}

fn replace_once(name: &mut String, token: &str, value: &str) {
    *name = name.replacen(token, value, 1);
}

fn date_string(xml: &ItemXml) -> String {
    xml.pub_time
        .map(|time| time.format(filenames::DATE_FORMAT).to_string())
        .unwrap_or_else(|| filenames::MISSING_DATE.to_string())
}

fn link_final_path(xml: &ItemXml) -> Option<String> {
    let link = Url::parse(xml.link.as_deref()?.trim()).ok()?;
    let segment = link
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()?
        .to_string();
    Some(tidy_component(&segment))
}

/// Last path segment of the enclosure URL, query string excluded
fn url_basename(xml: &ItemXml) -> Option<String> {
    let raw = xml.enclosure_url()?;
    let path = match Url::parse(raw) {
        Ok(url) => url.path().to_string(),
        Err(_) => raw.split(['?', '#']).next().unwrap_or(raw).to_string(),
    };
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Extension of the enclosure, falling back to its MIME type
pub fn extension(xml: &ItemXml) -> String {
    let from_url = url_basename(xml).and_then(|basename| {
        basename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_string())
            .filter(|ext| !ext.is_empty() && ext.len() <= 5)
            .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
    });
    if let Some(ext) = from_url {
        return ext;
    }

    let mime = xml
        .enclosure
        .as_ref()
        .map(|enclosure| enclosure.mime_type.to_ascii_lowercase())
        .unwrap_or_default();
    match mime.as_str() {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/mp4" | "audio/x-m4a" | "audio/m4a" => "m4a",
        "video/mp4" => "mp4",
        "audio/ogg" => "ogg",
        _ => filenames::DEFAULT_EXTENSION,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::Enclosure;
    use chrono::{TimeZone, Utc};
    use std::cell::RefCell;
    use std::collections::HashSet;

    fn item(title: &str, url: &str) -> ItemXml {
        ItemXml {
            title: title.to_string(),
            enclosure: Some(Enclosure {
                url: url.to_string(),
                length: 100,
                mime_type: "audio/mpeg".to_string(),
            }),
            pub_time: Some(Utc.with_ymd_and_hms(2023, 5, 17, 8, 0, 0).unwrap()),
            ..Default::default()
        }
    }

    fn template(pattern: &str, regex: Option<&str>, pad: usize) -> FilenameTemplate {
        FilenameTemplate::new(pattern, "foo", regex, pad, false, FilenameCleaner::default())
            .unwrap()
    }

    #[test]
    fn test_shortname_and_padded_episode() {
        let mut xml = item("Episode seven", "https://cdn.example.com/e7.mp3");
        xml.episode = Some("7".to_string());

        let rendered = template("#shortname#_#episode#.mp3", None, 3)
            .render(&xml, 1, None)
            .unwrap();
        assert_eq!(rendered.filename, "foo_007.mp3");
        assert_eq!(rendered.suffix, None);
    }

    #[test]
    fn test_title_regex_capture_and_fallback() {
        let template = template("#titleregex:1#.mp3", Some(r"^Ep(\d+):"), 2);

        let matched = item("Ep42: Launch", "https://cdn.example.com/a.mp3");
        assert_eq!(template.base_name(&matched, 1).unwrap(), "42.mp3");

        let unmatched = item("Launch Day", "https://cdn.example.com/b.mp3");
        assert_eq!(template.base_name(&unmatched, 2).unwrap(), "Launch_Day.mp3");
    }

    #[test]
    fn test_title_regex_index_beyond_captures_is_empty() {
        let template = template("ep#titleregex:1##titleregex:3#.mp3", Some(r"^Ep(\d+):"), 2);
        let xml = item("Ep42: Launch", "https://cdn.example.com/a.mp3");
        assert_eq!(template.base_name(&xml, 1).unwrap(), "ep42.mp3");
    }

    #[test]
    fn test_empty_template_uses_url_basename() {
        let xml = item("x", "https://cdn.example.com/shows/My%20Episode.mp3?token=abc");
        let rendered = template("", None, 2).render(&xml, 1, None).unwrap();
        assert_eq!(rendered.filename, "My_Episode.mp3");
    }

    #[test]
    fn test_fallbacks_use_publication_date() {
        let xml = item("x", "https://cdn.example.com/a.mp3");
        let template = template("#episode#-#linkfinalpath#-#count#.#ext#", None, 2);
        assert_eq!(
            template.base_name(&xml, -1).unwrap(),
            "20230517-20230517-20230517.mp3"
        );
        assert_eq!(
            template.base_name(&xml, 4).unwrap(),
            "20230517-20230517-04.mp3"
        );
    }

    #[test]
    fn test_link_final_path_and_season() {
        let mut xml = item("x", "https://cdn.example.com/a.mp3");
        xml.link = Some("https://example.com/episodes/the-launch/".to_string());
        xml.season = Some("2".to_string());
        let template = template("S#season#-#linkfinalpath#.#extension#", None, 2);
        assert_eq!(template.base_name(&xml, 1).unwrap(), "S2-the-launch.mp3");
    }

    #[test]
    fn test_tokens_replaced_once() {
        let xml = item("x", "https://cdn.example.com/a.mp3");
        let template = template("#shortname#-#shortname#.mp3", None, 2);
        assert_eq!(template.base_name(&xml, 1).unwrap(), "foo-#shortname#.mp3");
    }

    #[test]
    fn test_extension_from_mime_when_url_has_none() {
        let mut xml = item("x", "https://cdn.example.com/stream/12345");
        xml.enclosure.as_mut().unwrap().mime_type = "audio/x-m4a".to_string();
        assert_eq!(extension(&xml), "m4a");
    }

    #[test]
    fn test_urlfilename_skip_trim() {
        let xml = item("x", "https://cdn.example.com/My%20Show.mp3");
        let trimmed = template("#urlfilename#", None, 2);
        assert_eq!(trimmed.base_name(&xml, 1).unwrap(), "My_Show.mp3");

        let untrimmed = FilenameTemplate::new(
            "#urlfilename#",
            "foo",
            None,
            2,
            true,
            FilenameCleaner::default(),
        )
        .unwrap();
        assert_eq!(untrimmed.base_name(&xml, 1).unwrap(), "My%20Show.mp3");
    }

    #[test]
    fn test_collisions_use_suffixes_in_order() {
        let template = template("#shortname#.mp3", None, 2);
        let xml = item("x", "https://cdn.example.com/a.mp3");
        let taken = RefCell::new(HashSet::new());

        let mut names = Vec::new();
        for _ in 0..13 {
            let probe = |name: &str| taken.borrow().contains(name);
            let rendered = template.render(&xml, 1, Some(&probe)).unwrap();
            taken.borrow_mut().insert(rendered.filename.clone());
            names.push((rendered.filename, rendered.suffix));
        }

        assert_eq!(names[0], ("foo.mp3".to_string(), None));
        assert_eq!(names[1], ("foo.A.mp3".to_string(), Some('A')));
        assert_eq!(names[2], ("foo.B.mp3".to_string(), Some('B')));
        assert_eq!(names[12], ("foo.L.mp3".to_string(), Some('L')));

        let probe = |name: &str| taken.borrow().contains(name);
        let exhausted = template.render(&xml, 1, Some(&probe));
        assert!(matches!(
            exhausted,
            Err(FilenameError::SuffixExhausted { .. })
        ));
    }

    #[test]
    fn test_render_with_suffix_reproduces_name() {
        let template = template("#shortname#.mp3", None, 2);
        let xml = item("x", "https://cdn.example.com/a.mp3");
        assert_eq!(
            template.render_with_suffix(&xml, 1, Some('C')).unwrap(),
            "foo.C.mp3"
        );
        assert_eq!(
            FilenameCleaner::default().with_suffix("noext", 'A'),
            "noext.A"
        );
    }

    #[test]
    fn test_suffixed_name_respects_max_length() {
        let template = FilenameTemplate::new(
            "#title#.#extension#",
            "foo",
            None,
            2,
            false,
            FilenameCleaner::new('_', 24),
        )
        .unwrap();
        let xml = item("An extremely long episode title", "https://cdn.example.com/a.mp3");

        let base = template.base_name(&xml, 1).unwrap();
        assert_eq!(base.len(), 24);

        let taken = |name: &str| name == base;
        let rendered = template.render(&xml, 1, Some(&taken)).unwrap();
        assert_eq!(rendered.suffix, Some('A'));
        assert!(rendered.filename.len() <= 24);
        assert!(rendered.filename.ends_with(".A.mp3"));
        assert_eq!(
            template.render_with_suffix(&xml, 1, Some('A')).unwrap(),
            rendered.filename
        );
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let result =
            FilenameTemplate::new("#title#", "foo", Some("("), 2, false, FilenameCleaner::default());
        assert!(matches!(result, Err(FilenameError::InvalidRegex { .. })));
    }

    #[test]
    fn test_placeholder_name() {
        let template = template("#title#", None, 2);
        let xml = item("x", "https://cdn.example.com/a.mp3");
        let hash = ItemHash::compute("g1", "https://cdn.example.com/ep1.mp3");
        assert_eq!(template.placeholder(&xml, &hash), "foo_tx_ccsvDwxCN.mp3");
    }
}
