//! Filesystem-safe filename cleaning

use crate::constants::filenames;

/// Characters never allowed in generated filenames
const FORBIDDEN: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Makes rendered names safe to use as a file in the active directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameCleaner {
    /// Replacement for forbidden and control characters
    pub replacement: char,
    /// Maximum length in bytes; the extension is preserved when truncating
    pub max_length: usize,
}

impl Default for FilenameCleaner {
    fn default() -> Self {
        Self {
            replacement: filenames::DEFAULT_REPLACEMENT,
            max_length: filenames::DEFAULT_MAX_LENGTH,
        }
    }
}

impl FilenameCleaner {
    pub fn new(replacement: char, max_length: usize) -> Self {
        Self {
            replacement,
            max_length,
        }
    }

    /// Clean a complete filename
    pub fn clean(&self, name: &str) -> String {
        let replaced: String = name
            .chars()
            .map(|c| {
                if FORBIDDEN.contains(&c) || c.is_control() {
                    self.replacement
                } else {
                    c
                }
            })
            .collect();

        let collapsed = collapse_dots(&replaced);
        let trimmed = collapsed.trim().trim_start_matches('.').trim_end();
        self.truncate(trimmed)
    }

    /// Insert a collision letter before the extension, shortening the stem
    /// so the suffixed name still fits in `max_length`
    pub fn with_suffix(&self, name: &str, letter: char) -> String {
        let (stem, tail) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{}.{}", letter, ext)),
            _ => (name, format!(".{}", letter)),
        };
        let stem = if self.max_length == 0 {
            stem
        } else {
            truncate_on_char_boundary(stem, self.max_length.saturating_sub(tail.len()))
        };
        format!("{}{}", stem, tail)
    }

    fn truncate(&self, name: &str) -> String {
        if self.max_length == 0 || name.len() <= self.max_length {
            return name.to_string();
        }

        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && ext.len() + 1 < self.max_length / 2 => {
                let budget = self.max_length - ext.len() - 1;
                format!("{}.{}", truncate_on_char_boundary(stem, budget), ext)
            }
            _ => truncate_on_char_boundary(name, self.max_length).to_string(),
        }
    }
}

/// Tidy a single template component: percent-decoding, whitespace to
/// underscores and repeated dots collapsed
pub fn tidy_component(value: &str) -> String {
    let decoded = urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| value.to_string());
    collapse_dots(&underscore_spaces(decoded.trim()))
}

/// Replace every whitespace character with an underscore
pub fn underscore_spaces(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Collapse runs of dots into a single dot
pub fn collapse_dots(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut previous_dot = false;
    for c in value.chars() {
        if c == '.' {
            if !previous_dot {
                result.push(c);
            }
            previous_dot = true;
        } else {
            result.push(c);
            previous_dot = false;
        }
    }
    result
}

fn truncate_on_char_boundary(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}
