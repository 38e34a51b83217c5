//! Rich-text facets: extraction from AS1 tags and synthesis back to tags.
//!
//! Facet offsets are byte offsets into the UTF-8 encoding of the post text.
//! AS1 tag offsets are character offsets. Conversion between the two is done
//! by encoding the prefix, never by assuming one byte per character.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::as1::Tag;
use crate::client::XrpcClient;
use crate::error::Result;
use crate::uri::{BSKY_APP_HOST, is_did};

/// A byte range into the UTF-8 text. Start inclusive, end exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

/// Annotation of a substring within rich text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facet {
    pub index: ByteSlice,
    pub features: Vec<FacetFeature>,
}

impl Facet {
    pub fn new(byte_start: usize, byte_end: usize, feature: FacetFeature) -> Self {
        Facet {
            index: ByteSlice {
                byte_start,
                byte_end,
            },
            features: vec![feature],
        }
    }
}

/// One annotation kind anchored by a facet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum FacetFeature {
    #[serde(rename = "app.bsky.richtext.facet#link")]
    Link { uri: String },
    #[serde(rename = "app.bsky.richtext.facet#mention")]
    Mention { did: String },
    #[serde(rename = "app.bsky.richtext.facet#tag")]
    Tag { tag: String },
}

/// Extract facets for a post from its AS1 tags.
///
/// Tags with explicit character offsets are converted to byte offsets.
/// Hashtags and mentions without offsets are located by scanning the text.
/// Mentions that can't be resolved to a DID are omitted; the text keeps
/// the plain `@name`.
pub fn facets_from_tags(
    text: &str,
    tags: &[Tag],
    client: Option<&dyn XrpcClient>,
) -> Result<Vec<Facet>> {
    let mut facets = Vec::new();

    for tag in tags {
        let kind = tag.object_type.as_deref().unwrap_or("");

        let range = match (tag.start_index, tag.length) {
            (Some(start), Some(length)) => explicit_range(text, start, length),
            _ => match kind {
                "hashtag" => tag.display_name.as_deref().and_then(|n| {
                    guess_hashtag(text, n.trim_start_matches('#'))
                }),
                "mention" => tag
                    .display_name
                    .as_deref()
                    .and_then(|n| guess_mention(text, &mention_handle(n))),
                _ => None,
            },
        };
        let Some((byte_start, byte_end)) = range else {
            continue;
        };

        let feature = match kind {
            "mention" => match resolve_mention_did(tag, client)? {
                Some(did) => FacetFeature::Mention { did },
                None => {
                    debug!(name = ?tag.display_name, "omitting unresolvable mention");
                    continue;
                }
            },
            "hashtag" => {
                let Some(name) = tag.display_name.as_deref() else {
                    continue;
                };
                FacetFeature::Tag {
                    tag: name.trim_start_matches('#').to_lowercase(),
                }
            }
            _ => {
                let Some(uri) = tag.url.clone() else {
                    continue;
                };
                FacetFeature::Link { uri }
            }
        };

        facets.push(Facet::new(byte_start, byte_end, feature));
    }

    Ok(facets)
}

/// Synthesize AS1 tags from a record's facets, the inverse direction.
pub fn tags_from_facets(text: &str, facets: &[Facet]) -> Vec<Tag> {
    let mut tags = Vec::new();

    for facet in facets {
        let start = facet.index.byte_start.min(text.len());
        let end = facet.index.byte_end.clamp(start, text.len());
        let Some(slice) = text.get(start..end) else {
            continue;
        };
        let start_index = text[..start].chars().count();
        let length = slice.chars().count();

        for feature in &facet.features {
            let tag = match feature {
                FacetFeature::Link { uri } => Tag {
                    object_type: Some("link".to_string()),
                    url: Some(uri.clone()),
                    display_name: Some(slice.to_string()),
                    start_index: Some(start_index),
                    length: Some(length),
                    ..Default::default()
                },
                FacetFeature::Mention { did } => Tag {
                    object_type: Some("mention".to_string()),
                    url: Some(format!("https://{BSKY_APP_HOST}/profile/{did}")),
                    display_name: Some(slice.to_string()),
                    start_index: Some(start_index),
                    length: Some(length),
                    ..Default::default()
                },
                FacetFeature::Tag { tag } => Tag {
                    object_type: Some("hashtag".to_string()),
                    display_name: Some(tag.clone()),
                    start_index: Some(start_index),
                    length: Some(length),
                    ..Default::default()
                },
            };
            tags.push(tag);
        }
    }

    tags
}

/// Convert explicit character offsets to a byte range. Tags starting at or
/// past the end of the text are dropped; ends past the text are clipped.
fn explicit_range(text: &str, start: usize, length: usize) -> Option<(usize, usize)> {
    let char_count = text.chars().count();
    if start >= char_count {
        return None;
    }
    let end = (start + length).min(char_count);
    Some((char_to_byte(text, start), char_to_byte(text, end)))
}

/// Byte offset of the `n`th character.
fn char_to_byte(text: &str, n: usize) -> usize {
    text.char_indices().nth(n).map_or(text.len(), |(i, _)| i)
}

/// The handle part of a mention display name: leading `@` stripped, any
/// trailing `@server` suffix dropped.
fn mention_handle(name: &str) -> String {
    name.trim_start_matches('@')
        .split('@')
        .next()
        .unwrap_or("")
        .to_string()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Locate `#{name}` in the text, case-insensitively, at a punctuation or
/// word boundary on both sides.
fn guess_hashtag(text: &str, name: &str) -> Option<(usize, usize)> {
    if name.is_empty() {
        return None;
    }
    let pattern = format!(r"(?i)(?:^|[^\w#])(\#{})", regex::escape(name));
    scan_bounded(text, &pattern, |next| !is_word_char(next))
}

/// Locate `@{handle}` in the text, anchored at the start or after a
/// non-word character.
fn guess_mention(text: &str, handle: &str) -> Option<(usize, usize)> {
    if handle.is_empty() {
        return None;
    }
    let pattern = format!(r"(?i)(?:^|[^\w@])(@{})", regex::escape(handle));
    scan_bounded(text, &pattern, |next| !is_word_char(next) || next == '.')
}

/// Run a pattern whose capture group 1 is the candidate span, accepting the
/// first match whose following character passes `boundary`.
fn scan_bounded(
    text: &str,
    pattern: &str,
    boundary: impl Fn(char) -> bool,
) -> Option<(usize, usize)> {
    let re = regex::Regex::new(pattern).ok()?;
    for caps in re.captures_iter(text) {
        let m = caps.get(1)?;
        match text[m.end()..].chars().next() {
            None => return Some((m.start(), m.end())),
            Some(next) if boundary(next) => return Some((m.start(), m.end())),
            Some(_) => continue,
        }
    }
    None
}

/// Resolve a mention tag to a DID: a DID carried on the tag is used
/// directly; a web profile URL yields a handle resolved over the network
/// when a client is available.
fn resolve_mention_did(tag: &Tag, client: Option<&dyn XrpcClient>) -> Result<Option<String>> {
    if let Some(did) = tag.extra.get("did").and_then(|v| v.as_str()) {
        return Ok(Some(did.to_string()));
    }
    let Some(url) = tag.url.as_deref() else {
        return Ok(None);
    };
    if is_did(url) {
        return Ok(Some(url.to_string()));
    }

    // Web profile URL: the last path segment is a DID or a handle.
    let Ok(parsed) = url::Url::parse(url) else {
        return Ok(None);
    };
    if parsed.host_str() != Some(BSKY_APP_HOST) {
        return Ok(None);
    }
    let Some(ident) = parsed
        .path_segments()
        .and_then(|mut s| match (s.next(), s.next()) {
            (Some("profile"), Some(ident)) => Some(ident.to_string()),
            _ => None,
        })
    else {
        return Ok(None);
    };
    if is_did(&ident) {
        return Ok(Some(ident));
    }

    let Some(client) = client else {
        return Ok(None);
    };
    let resp = client.get("com.atproto.identity.resolveHandle", &[("handle", &ident)])?;
    Ok(resp
        .get("did")
        .and_then(|v| v.as_str())
        .map(str::to_string))
}
