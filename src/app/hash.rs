//! Item identity hashing and enclosure URL normalization
//!
//! An item's identity is the SHA-1 of its guid followed by its normalized
//! enclosure URL. The same (guid, URL) pair always yields the same hash, which
//! is how an episode is recognised across runs.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tracing::warn;
use url::Url;

use crate::errors::{ParseError, ParseResult};

/// SHA-1 identity of a feed item stored as its raw 20 bytes
///
/// Displayed and serialized as padded base64url, which is also the form
/// persisted in the item table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemHash([u8; 20]);

impl ItemHash {
    /// Compute the identity of a (guid, normalized URL) pair
    pub fn compute(guid: &str, normalized_url: &str) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(guid.as_bytes());
        hasher.update(normalized_url.as_bytes());
        ItemHash(hasher.finalize().into())
    }

    /// Parse the base64url text form
    pub fn from_base64(text: &str) -> ParseResult<Self> {
        let bytes = URL_SAFE
            .decode(text.as_bytes())
            .map_err(|_| ParseError::InvalidHash {
                hash: text.to_string(),
            })?;
        let bytes: [u8; 20] = bytes.try_into().map_err(|_| ParseError::InvalidHash {
            hash: text.to_string(),
        })?;
        Ok(ItemHash(bytes))
    }

    /// Render as padded base64url
    pub fn to_base64(&self) -> String {
        URL_SAFE.encode(self.0)
    }

    /// Get the raw byte array representation
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for ItemHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

impl FromStr for ItemHash {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base64(s)
    }
}

impl Serialize for ItemHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for ItemHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        Self::from_base64(&text).map_err(serde::de::Error::custom)
    }
}

/// Normalize an enclosure URL for identity purposes
///
/// Query string and fragment are dropped. When `rewrite_rule` is set, the
/// path is split on the first occurrence of the rule and the rule becomes the
/// new host, with the remainder of the path kept. This strips tracking and
/// CDN prefixes that wrap the canonical location. A rule that does not occur
/// in the path leaves the URL as-is and logs a warning.
pub fn normalize_url(url: &str, rewrite_rule: Option<&str>) -> ParseResult<String> {
    let mut parsed = Url::parse(url.trim()).map_err(|e| ParseError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    parsed.set_query(None);
    parsed.set_fragment(None);

    if let Some(rule) = rewrite_rule.filter(|rule| !rule.is_empty()) {
        let path = parsed.path().to_string();
        match path.split_once(rule) {
            Some((_, remainder)) => {
                let host = rule.trim_matches('/');
                let remainder = remainder.trim_start_matches('/');
                let rewritten = format!("{}://{}/{}", parsed.scheme(), host, remainder);
                parsed = Url::parse(&rewritten).map_err(|e| ParseError::InvalidUrl {
                    url: rewritten.clone(),
                    reason: e.to_string(),
                })?;
            }
            None => {
                warn!(
                    "URL rewrite marker '{}' not found in {}, using path unmodified",
                    rule, url
                );
            }
        }
    }

    Ok(parsed.to_string())
}

/// Normalize `url` and compute the identity hash for `guid`
pub fn identity_hash(
    guid: &str,
    url: &str,
    rewrite_rule: Option<&str>,
) -> ParseResult<(ItemHash, String)> {
    let normalized = normalize_url(url, rewrite_rule)?;
    Ok((ItemHash::compute(guid, &normalized), normalized))
}
