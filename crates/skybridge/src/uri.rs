//! AT URI parsing and translation to and from web URLs.

use std::fmt;

use url::Url;

use crate::error::{Error, Result};
use crate::records::{GENERATOR_COLLECTION, LIST_COLLECTION, POST_COLLECTION, PROFILE_COLLECTION};

/// Host serving web profile/post URLs.
pub const BSKY_APP_HOST: &str = "bsky.app";

/// The singleton rkey for profile records.
pub const PROFILE_RKEY: &str = "self";

/// A parsed AT Protocol URI.
///
/// Full form is `at://{authority}/{collection}/{rkey}`; the short form
/// `at://{authority}` addresses a repository/profile. The authority is a
/// DID or a handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AtUri {
    /// The DID or handle of the repository owner.
    pub authority: String,
    /// The collection NSID (e.g., "app.bsky.feed.post").
    pub collection: Option<String>,
    /// The record key.
    pub rkey: Option<String>,
}

impl AtUri {
    /// Parse an AT URI string.
    ///
    /// # Example
    ///
    /// ```
    /// use skybridge::AtUri;
    ///
    /// let uri = AtUri::parse("at://did:plc:abc123/app.bsky.feed.post/3abc").unwrap();
    /// assert_eq!(uri.authority, "did:plc:abc123");
    /// assert_eq!(uri.collection.as_deref(), Some("app.bsky.feed.post"));
    /// assert_eq!(uri.rkey.as_deref(), Some("3abc"));
    /// ```
    pub fn parse(uri: &str) -> Result<Self> {
        if uri.chars().any(char::is_whitespace) {
            return Err(Error::invalid(format!("whitespace in AT URI: {uri}")));
        }

        let rest = uri
            .strip_prefix("at://")
            .ok_or_else(|| Error::invalid(format!("missing at:// prefix: {uri}")))?;

        let parts: Vec<&str> = rest.splitn(3, '/').collect();
        let authority = parts[0];
        if !is_valid_authority(authority) {
            return Err(Error::invalid(format!(
                "authority is neither a DID nor a handle: {uri}"
            )));
        }

        let (collection, rkey) = match parts.as_slice() {
            [_] => (None, None),
            [_, collection, rkey] if !collection.is_empty() && !rkey.is_empty() => {
                (Some(collection.to_string()), Some(rkey.to_string()))
            }
            _ => {
                return Err(Error::invalid(format!(
                    "expected authority or authority/collection/rkey: {uri}"
                )));
            }
        };

        Ok(Self {
            authority: authority.to_string(),
            collection,
            rkey,
        })
    }

    /// Build a record-scoped URI.
    pub fn record(authority: impl Into<String>, collection: &str, rkey: &str) -> Self {
        Self {
            authority: authority.into(),
            collection: Some(collection.to_string()),
            rkey: Some(rkey.to_string()),
        }
    }

    /// Quick rkey extraction without full parsing. Returns the last path
    /// component of any URI-like string.
    pub fn extract_rkey(uri: &str) -> &str {
        uri.rsplit('/').next().unwrap_or("")
    }
}

impl fmt::Display for AtUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at://{}", self.authority)?;
        if let (Some(collection), Some(rkey)) = (&self.collection, &self.rkey) {
            write!(f, "/{}/{}", collection, rkey)?;
        }
        Ok(())
    }
}

/// Whether a string is a DID.
pub fn is_did(s: &str) -> bool {
    s.starts_with("did:") && s.len() > 4
}

/// An AT URI authority must be a DID or a dotted domain handle.
fn is_valid_authority(s: &str) -> bool {
    is_did(s) || (s.contains('.') && !s.starts_with('.') && !s.ends_with('.') && !s.is_empty())
}

/// Convert a bsky.app web URL to an AT URI.
///
/// Recognized shapes: profile root, `/post/{rkey}`, `/feed/{rkey}`,
/// `/lists/{rkey}`. When both `handle` and `did` are given, `did` wins as
/// the authority. Empty input returns `Ok(None)`; a malformed URL is an
/// error.
pub fn web_url_to_at_uri(
    url: &str,
    handle: Option<&str>,
    did: Option<&str>,
) -> Result<Option<AtUri>> {
    if url.is_empty() {
        return Ok(None);
    }
    if url.chars().any(char::is_whitespace) {
        return Err(Error::invalid(format!("whitespace in URL: {url}")));
    }

    let parsed =
        Url::parse(url).map_err(|e| Error::invalid(format!("unparseable URL {url}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str() != Some(BSKY_APP_HOST) {
        return Err(Error::invalid(format!("not a {BSKY_APP_HOST} URL: {url}")));
    }

    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();

    let (ident, collection, rkey) = match segments.as_slice() {
        ["profile", ident] => (*ident, PROFILE_COLLECTION, PROFILE_RKEY),
        ["profile", ident, "post", rkey] => (*ident, POST_COLLECTION, *rkey),
        ["profile", ident, "feed", rkey] => (*ident, GENERATOR_COLLECTION, *rkey),
        ["profile", ident, "lists", rkey] => (*ident, LIST_COLLECTION, *rkey),
        _ => {
            return Err(Error::invalid(format!(
                "unsupported {BSKY_APP_HOST} path: {url}"
            )));
        }
    };

    // DID is the preferred authority; the URL's own identifier is only a
    // fallback when neither argument applies.
    let authority = did
        .filter(|d| !d.is_empty())
        .or(if is_did(ident) { Some(ident) } else { None })
        .or(handle.filter(|h| !h.is_empty()))
        .unwrap_or(ident);

    Ok(Some(AtUri::record(authority, collection, rkey)))
}

/// Convert an AT URI to a bsky.app web URL.
///
/// When `handle` is given it replaces a DID authority in the resulting URL.
/// Collections without a web equivalent return `Ok(None)`.
pub fn at_uri_to_web_url(uri: &str, handle: Option<&str>) -> Result<Option<String>> {
    if uri.is_empty() {
        return Ok(None);
    }

    let parsed = AtUri::parse(uri)?;
    let ident = match handle.filter(|h| !h.is_empty()) {
        Some(h) if is_did(&parsed.authority) => h,
        _ => parsed.authority.as_str(),
    };

    let base = format!("https://{BSKY_APP_HOST}/profile/{ident}");
    let collection = match parsed.collection.as_deref() {
        None | Some(PROFILE_COLLECTION) => return Ok(Some(base)),
        Some(c) => c,
    };
    let rkey = parsed
        .rkey
        .as_deref()
        .ok_or_else(|| Error::invalid(format!("record URI without rkey: {uri}")))?;

    let path = match collection {
        POST_COLLECTION => "post",
        GENERATOR_COLLECTION => "feed",
        LIST_COLLECTION => "lists",
        _ => return Ok(None),
    };
    Ok(Some(format!("{base}/{path}/{rkey}")))
}

/// Convert a web URL to a `did:web` DID. Ports are dropped; URLs with a
/// path are rejected.
pub fn url_to_did_web(url: &str) -> Result<String> {
    let parsed =
        Url::parse(url).map_err(|e| Error::invalid(format!("unparseable URL {url}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::invalid(format!("not an HTTP URL: {url}")));
    }
    let host = parsed
        .host_str()
        .ok_or_else(|| Error::invalid(format!("URL has no host: {url}")))?;
    if !matches!(parsed.path(), "" | "/") {
        return Err(Error::invalid(format!(
            "can't convert URL with path to did:web: {url}"
        )));
    }

    Ok(format!("did:web:{host}"))
}

/// Convert a `did:web` DID back to a URL. Strict inverse of
/// [`url_to_did_web`]: DIDs with path components or a malformed host are
/// rejected.
pub fn did_web_to_url(did: &str) -> Result<String> {
    let host = did
        .strip_prefix("did:web:")
        .ok_or_else(|| Error::invalid(format!("not a did:web DID: {did}")))?;
    if host.is_empty() || host.contains(':') || host.contains('%') || host.contains('/') {
        return Err(Error::invalid(format!(
            "did:web with port or path components: {did}"
        )));
    }
    if !host.contains('.') || host.chars().any(char::is_whitespace) {
        return Err(Error::invalid(format!("malformed did:web host: {did}")));
    }

    Ok(format!("https://{host}/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_record_uri() {
        let uri = AtUri::parse("at://did:plc:abc123/app.bsky.feed.post/3abc").unwrap();
        assert_eq!(uri.authority, "did:plc:abc123");
        assert_eq!(uri.collection.as_deref(), Some("app.bsky.feed.post"));
        assert_eq!(uri.rkey.as_deref(), Some("3abc"));
    }

    #[test]
    fn parse_short_form() {
        let uri = AtUri::parse("at://alice.example.com").unwrap();
        assert_eq!(uri.authority, "alice.example.com");
        assert_eq!(uri.collection, None);
        assert_eq!(uri.rkey, None);
    }

    #[test]
    fn parse_rejects_bad_authority() {
        assert!(AtUri::parse("at://foo").is_err());
    }

    #[test]
    fn parse_rejects_missing_prefix() {
        assert!(AtUri::parse("did:plc:abc/collection/rkey").is_err());
    }

    #[test]
    fn parse_rejects_empty_component() {
        assert!(AtUri::parse("at://did:plc:abc//rkey").is_err());
        assert!(AtUri::parse("at://did:plc:abc/collection").is_err());
    }

    #[test]
    fn parse_rejects_whitespace() {
        assert!(AtUri::parse("at://did:plc:abc/app.bsky.feed.post/3 abc").is_err());
    }

    #[test]
    fn display_roundtrip() {
        for uri in [
            "at://did:plc:abc123/app.bsky.feed.post/xyz789",
            "at://alice.example.com",
        ] {
            assert_eq!(AtUri::parse(uri).unwrap().to_string(), uri);
        }
    }

    #[test]
    fn web_url_to_at_uri_post() {
        let uri = web_url_to_at_uri("https://bsky.app/profile/alice.com/post/123", None, None)
            .unwrap()
            .unwrap();
        assert_eq!(uri.to_string(), "at://alice.com/app.bsky.feed.post/123");
    }

    #[test]
    fn web_url_to_at_uri_prefers_did() {
        let uri = web_url_to_at_uri(
            "https://bsky.app/profile/alice.com/post/123",
            Some("alice.com"),
            Some("did:plc:abc"),
        )
        .unwrap()
        .unwrap();
        assert_eq!(uri.authority, "did:plc:abc");
    }

    #[test]
    fn web_url_to_at_uri_profile() {
        let uri = web_url_to_at_uri("https://bsky.app/profile/did:plc:abc", None, None)
            .unwrap()
            .unwrap();
        assert_eq!(
            uri.to_string(),
            "at://did:plc:abc/app.bsky.actor.profile/self"
        );
    }

    #[test]
    fn web_url_to_at_uri_empty() {
        assert_eq!(web_url_to_at_uri("", None, None).unwrap(), None);
    }

    #[test]
    fn web_url_to_at_uri_bad_host() {
        assert!(web_url_to_at_uri("http://not/bsky.app", None, None).is_err());
        assert!(web_url_to_at_uri("https://example.com/profile/x/post/1", None, None).is_err());
    }

    #[test]
    fn at_uri_to_web_url_uses_handle() {
        let url = at_uri_to_web_url(
            "at://did:plc:abc/app.bsky.feed.post/123",
            Some("alice.com"),
        )
        .unwrap()
        .unwrap();
        assert_eq!(url, "https://bsky.app/profile/alice.com/post/123");
    }

    #[test]
    fn at_uri_to_web_url_rejects_bad_input() {
        assert!(at_uri_to_web_url("at://foo", None).is_err());
        assert!(at_uri_to_web_url("http://not/bsky.app", None).is_err());
    }

    #[test]
    fn at_uri_to_web_url_unknown_collection() {
        let url =
            at_uri_to_web_url("at://did:plc:abc/com.example.custom/123", None).unwrap();
        assert_eq!(url, None);
    }

    // Round trip over every recognized web URL shape.
    #[test]
    fn web_url_roundtrip() {
        for url in [
            "https://bsky.app/profile/alice.com",
            "https://bsky.app/profile/alice.com/post/3abc",
            "https://bsky.app/profile/alice.com/feed/cool-feed",
            "https://bsky.app/profile/alice.com/lists/3xyz",
        ] {
            let uri = web_url_to_at_uri(url, Some("alice.com"), Some("did:plc:abc"))
                .unwrap()
                .unwrap();
            let back = at_uri_to_web_url(&uri.to_string(), Some("alice.com"))
                .unwrap()
                .unwrap();
            assert_eq!(back, url);
        }
    }

    #[test]
    fn url_to_did_web_basic() {
        assert_eq!(url_to_did_web("https://foo.com").unwrap(), "did:web:foo.com");
    }

    #[test]
    fn url_to_did_web_drops_port() {
        assert_eq!(
            url_to_did_web("https://foo.com:3000").unwrap(),
            "did:web:foo.com"
        );
    }

    #[test]
    fn url_to_did_web_rejects_path() {
        assert!(url_to_did_web("https://foo.com/bar").is_err());
    }

    #[test]
    fn did_web_to_url_basic() {
        assert_eq!(did_web_to_url("did:web:foo.com").unwrap(), "https://foo.com/");
    }

    #[test]
    fn did_web_to_url_rejects_path_components() {
        assert!(did_web_to_url("did:web:foo.com:bar").is_err());
        assert!(did_web_to_url("did:web:foo.com%3A3000").is_err());
        assert!(did_web_to_url("did:plc:abc").is_err());
    }

    #[test]
    fn did_web_roundtrip() {
        let did = url_to_did_web("https://foo.com/").unwrap();
        assert_eq!(did_web_to_url(&did).unwrap(), "https://foo.com/");
    }
}
